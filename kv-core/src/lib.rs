//! # kv-core
//!
//! The data model shared by every other crate in the workspace: the typed
//! `Value`, the binary-safe `Key`, and the `KeyData` pair the keyspace
//! engine stores behind each key.

pub mod key;
pub mod keydata;
pub mod value;

pub use key::Key;
pub use keydata::KeyData;
pub use value::Value;
