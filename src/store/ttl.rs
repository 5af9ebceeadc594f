//! Entry lifetime parsing and clamping.

use std::time::Duration;

use crate::error::ClipError;

/// Longest accepted lifetime. Expiry times are signed unix seconds.
pub const MAX_TTL_SECS: u64 = i64::MAX as u64;

/// Parse `30`, `30s`, `10m`, `2h`, `7d` or `1w`. A bare number is seconds.
pub fn parse_duration(s: &str) -> Result<Duration, ClipError> {
    let s = s.trim();
    let split = s.find(|c: char| !c.is_ascii_digit()).unwrap_or(s.len());
    let (digits, unit) = s.split_at(split);
    if digits.is_empty() {
        return Err(ClipError::BadRequest("invalid ttl"));
    }
    let value: u64 = digits
        .parse()
        .map_err(|_| ClipError::BadRequest("invalid ttl"))?;
    let multiplier = match unit {
        "" | "s" => 1,
        "m" => 60,
        "h" => 60 * 60,
        "d" => 24 * 60 * 60,
        "w" => 7 * 24 * 60 * 60,
        _ => return Err(ClipError::BadRequest("invalid ttl")),
    };
    value
        .checked_mul(multiplier)
        .filter(|secs| *secs <= MAX_TTL_SECS)
        .map(Duration::from_secs)
        .ok_or(ClipError::BadRequest("invalid ttl"))
}

/// Effective lifetime of a new entry.
///
/// `max` doubles as the default; zero means entries never expire. A
/// requested ttl (including zero) never outlives `max`.
pub fn resolve_ttl(requested: Option<Duration>, max: Duration) -> Duration {
    match requested {
        None => max,
        Some(ttl) if max.is_zero() => ttl,
        Some(ttl) if ttl.is_zero() || ttl > max => max,
        Some(ttl) => ttl,
    }
}

/// Absolute expiry for a ttl, 0 = never. Saturates instead of wrapping.
pub fn expires_at(ttl: Duration, now: i64) -> i64 {
    if ttl.is_zero() {
        return 0;
    }
    let secs = i64::try_from(ttl.as_secs()).unwrap_or(i64::MAX);
    now.saturating_add(secs)
}
