//! # Shared Error Type
//!
//! Purpose: Give every crate in the workspace one error enum covering the
//! kinds in the error-handling design, so command handlers, the keyspace,
//! the AOF/snapshot engine, and the cluster layer can all propagate through
//! `?` without per-crate translation tables.
//!
//! ## Design Principles
//! 1. **One Kind Per Failure Mode**: each variant maps to exactly one of the
//!    documented error kinds (wrong arity, wrong type, not found, ...).
//! 2. **RESP-Ready Messages**: `Display` produces the human-readable text the
//!    connection layer sends back as a `-ERR ...` reply, verbatim.
//! 3. **No Silent Downgrade**: conversions from I/O or serialization errors
//!    keep the source error via `#[from]` so nothing is swallowed.

/// Result alias used across the workspace.
pub type KvResult<T> = Result<T, KvError>;

/// Every failure mode a command, lock, or durability operation can surface.
#[derive(Debug, thiserror::Error)]
pub enum KvError {
    /// Wrong number of arguments for a command.
    #[error("wrong number of arguments for '{0}' command")]
    WrongArgs(String),

    /// The value stored at a key does not match the type a handler expects.
    #[error("value at key {key} is not a {expected}")]
    WrongType {
        /// Key whose stored value had the wrong type.
        key: String,
        /// Expected type name (e.g. "list", "hash", "set").
        expected: &'static str,
    },

    /// A command that surfaces absence as an error (vs. a null reply).
    #[error("key {0} does not exist")]
    NotFound(String),

    /// `SET ... NX` (or similar) found the key already present.
    #[error("key {0} already exists")]
    AlreadyExists(String),

    /// A numeric argument failed to parse.
    #[error("{0} must be an integer")]
    NotAnInteger(String),

    /// A field inside a hash is not numeric where arithmetic was requested.
    #[error("value at field {0} is not a number")]
    FieldNotANumber(String),

    /// ACL denied the command or key access.
    #[error("unauthorized")]
    Unauthorized,

    /// Context was cancelled while waiting on a lock or channel.
    #[error("operation cancelled")]
    Cancelled,

    /// A write was attempted against a non-leader node with no forwarding
    /// path configured.
    #[error("not cluster leader")]
    NotLeader,

    /// AOF or snapshot sink failed.
    #[error("io failure: {0}")]
    IoFailure(#[from] std::io::Error),

    /// The inbound RESP frame was malformed.
    #[error("protocol error")]
    ProtocolError,

    /// Command name or sub-command is unknown.
    #[error("unknown command '{0}'")]
    UnknownCommand(String),

    /// A key exceeded an implementation-chosen bound.
    #[error("key too long")]
    KeyTooLong,

    /// A value exceeded an implementation-chosen bound.
    #[error("value too long")]
    ValueTooLong,

    /// Anything else: bugs, invariant violations, should-never-happen paths.
    #[error("internal error: {0}")]
    Internal(String),
}

impl KvError {
    /// Returns the text sent to clients after the RESP `-` prefix.
    ///
    /// Kept separate from `Display` only so callers that need the bare
    /// message (no leading `-`, no trailing `\r\n`) have a named accessor;
    /// today it is identical to `Display`, but command handlers should call
    /// this rather than `to_string()` so the two can diverge later without a
    /// call-site sweep.
    pub fn wire_message(&self) -> String {
        self.to_string()
    }

    /// True when the error should close the connection rather than just
    /// reply with a RESP error string (protocol/IO failures only, per §7).
    pub fn is_connection_fatal(&self) -> bool {
        matches!(self, KvError::ProtocolError | KvError::IoFailure(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wrong_type_message_matches_wire_format() {
        let err = KvError::WrongType { key: "k".into(), expected: "list" };
        assert_eq!(err.wire_message(), "value at key k is not a list");
    }

    #[test]
    fn already_exists_message() {
        let err = KvError::AlreadyExists("k5".into());
        assert_eq!(err.wire_message(), "key k5 already exists");
    }

    #[test]
    fn not_found_message() {
        let err = KvError::NotFound("k6".into());
        assert_eq!(err.wire_message(), "key k6 does not exist");
    }

    #[test]
    fn protocol_and_io_are_connection_fatal() {
        assert!(KvError::ProtocolError.is_connection_fatal());
        assert!(!KvError::NotFound("x".into()).is_connection_fatal());
    }
}
