//! # kv-acl
//!
//! User accounts, password verification, and the per-call authorization
//! algorithm gating command dispatch (§4.5).

pub mod store;
pub mod user;

pub use store::{AclStore, AuthRequest};
pub use user::{AclUser, AclUserBuilder};
