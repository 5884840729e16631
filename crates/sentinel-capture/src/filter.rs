use sentinel_nav::geo::haversine_m;
use sentinel_proto::mission::Position;
use sentinel_proto::vehicle::SensedState;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Skip {
    NoFix,
    TooLow,
    TooClose,
}

/// Drops captures that would add nothing: on the ground, without a
/// position, or too close to the previous one.
#[derive(Debug, Clone)]
pub struct CaptureFilter {
    min_spacing_m: f64,
    min_alt_m: f32,
    last: Option<Position>,
}

impl CaptureFilter {
    pub fn new(min_spacing_m: f64, min_alt_m: f32) -> Self {
        Self { min_spacing_m, min_alt_m, last: None }
    }

    pub fn admit(&self, s: &SensedState) -> Result<(), Skip> {
        if !s.has_fix() {
            return Err(Skip::NoFix);
        }
        if s.position.alt_m < self.min_alt_m {
            return Err(Skip::TooLow);
        }
        if let Some(last) = &self.last {
            if haversine_m(last.lat, last.lon, s.position.lat, s.position.lon) < self.min_spacing_m {
                return Err(Skip::TooClose);
            }
        }
        Ok(())
    }

    /// Call once a capture at `p` has been stored.
    pub fn record(&mut self, p: Position) {
        self.last = Some(p);
    }
}
