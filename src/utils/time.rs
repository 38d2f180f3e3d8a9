use std::time::{Duration, SystemTime};

/// Seconds (with fractional nanos) since the unix epoch, the representation
/// used by the `modified` stamps on checks and tenants.
pub fn epoch_seconds() -> f64 {
    SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs_f64()
}

/// Converts an epoch-seconds stamp into the remaining time from now, or zero
/// if the stamp is already in the past.
pub fn remaining_until(epoch_secs: f64) -> Duration {
    let now = epoch_seconds();
    if epoch_secs <= now {
        return Duration::ZERO;
    }
    Duration::from_secs_f64(epoch_secs - now)
}

/// Milliseconds-to-Duration helper for the wire representation of check
/// frequencies and timeouts.
pub fn millis(ms: i64) -> Duration {
    Duration::from_millis(ms.max(0) as u64)
}
