pub mod command;
pub mod mission;
pub mod runtime;
pub mod telemetry;
pub mod vehicle;

/// Wire schema version carried by every inbound and outbound message.
pub const SCHEMA_VERSION: u16 = 1;

pub fn now_unix_ms() -> i64 {
    (time::OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000) as i64
}
