use anyhow::{Context, Result};
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use time::macros::format_description;
use time::OffsetDateTime;

/// Decodes `raw`, shrinks it to at most `max_width` keeping the aspect
/// ratio, and re-encodes it as JPEG at `quality`.
pub fn recompress(raw: &[u8], max_width: u32, quality: u8) -> Result<Vec<u8>> {
    let img = image::load_from_memory(raw).context("decode frame")?;
    let img = if img.width() > max_width {
        let h = ((u64::from(img.height()) * u64::from(max_width)) / u64::from(img.width())).max(1) as u32;
        img.resize_exact(max_width, h, FilterType::Triangle)
    } else {
        img
    };
    let rgb = img.to_rgb8();
    let mut out = Vec::with_capacity(raw.len() / 2);
    JpegEncoder::new_with_quality(&mut out, quality.clamp(1, 100))
        .encode_image(&rgb)
        .context("encode jpeg")?;
    Ok(out)
}

/// Storage key shared with the remote ingestion side.
pub fn image_key(mission_id: &str, vehicle_id: &str, at: OffsetDateTime) -> Result<String> {
    let ts = at
        .format(format_description!("[year][month][day]_[hour][minute][second]_[subsecond digits:6]"))
        .context("format capture time")?;
    Ok(format!("images/captures/{}/{}/{}.jpg", key_part(mission_id), key_part(vehicle_id), ts))
}

// Ids come off the wire; keep them to one path component.
fn key_part(s: &str) -> String {
    let part: String = s
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect();
    if part.is_empty() {
        "_".to_string()
    } else {
        part
    }
}
