//! Shared parsing and encoding helpers used across handler modules.

use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use kv_common::{KvError, KvResult};

use crate::resp::{encode_array, encode_bulk};

/// Parses a byte-string argument as `i64`, for index/count arguments.
pub fn parse_i64(arg: &[u8], command: &str) -> KvResult<i64> {
    std::str::from_utf8(arg)
        .ok()
        .and_then(|s| s.parse::<i64>().ok())
        .ok_or_else(|| KvError::NotAnInteger(command.to_string()))
}

/// Normalizes a Redis-style possibly-negative `(start, stop)` range against
/// a collection of length `len` into an inclusive `[lo, hi)` slice range, or
/// `None` if the normalized range is empty.
pub fn normalize_range(start: i64, stop: i64, len: usize) -> Option<(usize, usize)> {
    let len = len as i64;
    if len == 0 {
        return None;
    }
    let clamp = |i: i64| -> i64 {
        let idx = if i < 0 { len + i } else { i };
        idx.clamp(0, len)
    };
    let mut lo = clamp(start);
    let hi_inclusive = if stop < 0 { len + stop } else { stop };
    let hi = (hi_inclusive + 1).clamp(0, len);
    if lo >= hi {
        return None;
    }
    if lo > hi {
        lo = hi;
    }
    Some((lo as usize, hi as usize))
}

/// Encodes a list of raw byte members as a RESP array of bulk strings.
pub fn encode_bulk_array(items: impl IntoIterator<Item = Vec<u8>>) -> Vec<u8> {
    let bulks: Vec<Vec<u8>> = items.into_iter().map(|item| encode_bulk(&item)).collect();
    encode_array(&bulks)
}

/// Parses a `SET ... EX|PX|EXAT|PXAT <n>` expiry option into an absolute
/// deadline `Instant`.
pub fn parse_expire_option(option: &str, raw: &[u8]) -> KvResult<Instant> {
    let n = parse_i64(raw, "set")?;
    match option {
        "EX" => Ok(Instant::now() + Duration::from_secs(n.max(0) as u64)),
        "PX" => Ok(Instant::now() + Duration::from_millis(n.max(0) as u64)),
        "EXAT" => Ok(unix_secs_to_instant(n)),
        "PXAT" => Ok(unix_ms_to_instant(n)),
        _ => unreachable!("caller only passes expiry option names"),
    }
}

fn unix_millis() -> i64 {
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_millis() as i64).unwrap_or(0)
}

fn unix_secs_to_instant(target_unix_secs: i64) -> Instant {
    unix_ms_to_instant(target_unix_secs.saturating_mul(1000))
}

fn unix_ms_to_instant(target_unix_ms: i64) -> Instant {
    let now_ms = unix_millis();
    let now = Instant::now();
    if target_unix_ms <= now_ms {
        now
    } else {
        now + Duration::from_millis((target_unix_ms - now_ms) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_range_handles_negative_indices() {
        assert_eq!(normalize_range(0, -1, 3), Some((0, 3)));
        assert_eq!(normalize_range(-2, -1, 3), Some((1, 3)));
        assert_eq!(normalize_range(5, 10, 3), None);
    }

    #[test]
    fn parse_i64_rejects_non_numeric() {
        assert!(parse_i64(b"abc", "lrange").is_err());
        assert_eq!(parse_i64(b"42", "lrange").unwrap(), 42);
    }
}
