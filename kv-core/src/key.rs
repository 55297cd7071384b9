//! # Key
//!
//! A binary-safe key, kept as an owned byte buffer so the keyspace map can
//! hash and compare without assuming UTF-8.

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Key(Vec<u8>);

impl Key {
    /// Builds a key from any byte-convertible input.
    pub fn new<T: AsRef<[u8]>>(data: T) -> Self {
        Key(data.as_ref().to_vec())
    }

    /// Borrows the key as raw bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Returns the key rendered as a lossy UTF-8 string, for logging and
    /// error messages only (never for comparisons).
    pub fn display(&self) -> String {
        String::from_utf8_lossy(&self.0).into_owned()
    }

    /// Consumes the key, returning the owned byte buffer.
    pub fn into_vec(self) -> Vec<u8> {
        self.0
    }
}

impl From<&str> for Key {
    fn from(value: &str) -> Self {
        Key::new(value.as_bytes())
    }
}

impl From<String> for Key {
    fn from(value: String) -> Self {
        Key(value.into_bytes())
    }
}

impl From<Vec<u8>> for Key {
    fn from(value: Vec<u8>) -> Self {
        Key(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_from_str_and_bytes_equivalently() {
        let a = Key::from("alpha");
        let b = Key::new(b"alpha");
        assert_eq!(a, b);
    }

    #[test]
    fn display_is_lossy_not_comparison() {
        let key = Key::new(b"hello");
        assert_eq!(key.display(), "hello");
    }
}
