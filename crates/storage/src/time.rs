#![forbid(unsafe_code)]

use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use time::macros::format_description;

pub fn now_ms() -> u64 {
    let nanos = OffsetDateTime::now_utc().unix_timestamp_nanos();
    let ms = nanos / 1_000_000i128;
    u64::try_from(ms).unwrap_or(0)
}

fn datetime(ts_ms: u64) -> OffsetDateTime {
    let nanos = i128::from(ts_ms) * 1_000_000i128;
    OffsetDateTime::from_unix_timestamp_nanos(nanos).unwrap_or(OffsetDateTime::UNIX_EPOCH)
}

pub fn ts_ms_to_rfc3339(ts_ms: u64) -> String {
    datetime(ts_ms)
        .format(&Rfc3339)
        .unwrap_or_else(|_| "1970-01-01T00:00:00Z".to_string())
}

/// UTC calendar day (`YYYY-MM-DD`) containing `ts_ms`.
pub fn day_of(ts_ms: u64) -> String {
    datetime(ts_ms)
        .format(format_description!("[year]-[month]-[day]"))
        .unwrap_or_else(|_| "1970-01-01".to_string())
}
