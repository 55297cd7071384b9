//! # KeyData
//!
//! The value plus expiry pair the keyspace stores behind each key. A key
//! either exists with a defined `KeyData` or does not exist at all — no
//! half-initialized state is ever visible to readers (§3 invariant).

use std::time::Instant;

use crate::value::Value;

/// `(value, expireAt)`. `expire_at = None` means the key never expires;
/// otherwise the key is *volatile*.
#[derive(Debug, Clone)]
pub struct KeyData {
    pub value: Value,
    pub expire_at: Option<Instant>,
}

impl KeyData {
    /// Builds a non-volatile entry.
    pub fn new(value: Value) -> Self {
        KeyData { value, expire_at: None }
    }

    /// Builds a volatile entry expiring at the given instant.
    pub fn with_expiry(value: Value, expire_at: Instant) -> Self {
        KeyData { value, expire_at: Some(expire_at) }
    }

    /// True when `expire_at` is set and already in the past relative to
    /// `now`. Per §3, any read observing this must behave as if the key did
    /// not exist.
    pub fn is_expired_at(&self, now: Instant) -> bool {
        matches!(self.expire_at, Some(deadline) if deadline <= now)
    }

    /// True when the key carries a TTL at all (volatile, per the GLOSSARY).
    pub fn is_volatile(&self) -> bool {
        self.expire_at.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn non_volatile_key_never_expires() {
        let data = KeyData::new(Value::Integer(1));
        assert!(!data.is_volatile());
        assert!(!data.is_expired_at(Instant::now() + Duration::from_secs(1_000_000)));
    }

    #[test]
    fn volatile_key_expires_after_deadline() {
        let deadline = Instant::now();
        let data = KeyData::with_expiry(Value::Integer(1), deadline);
        assert!(data.is_volatile());
        std::thread::sleep(Duration::from_millis(2));
        assert!(data.is_expired_at(Instant::now()));
    }
}
