use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Milliseconds since the Unix epoch, per the current wall clock. TTLs are
/// stored as absolute deadlines in this unit so that `PEXPIREAT`, which is
/// already expressed this way on the wire, needs no conversion.
pub fn epoch_ms() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::ZERO)
        .as_millis()
}
