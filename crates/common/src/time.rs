use std::time::{SystemTime, UNIX_EPOCH};

/// Current UTC time as whole seconds since the Unix epoch.
///
/// A clock set before 1970 reports `0` rather than failing.
#[must_use]
pub fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}
