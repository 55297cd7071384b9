//! # kv-command
//!
//! The RESP wire codec (§4.3), the declarative command registry (§4.4), and
//! the dispatch pipeline that ties decoding, ACL authorization, and
//! durability/replication routing together.

pub mod dispatch;
pub mod handlers;
pub mod registry;
pub mod resp;

pub use dispatch::{ClusterRouter, DispatchMode, Dispatcher, Session};
pub use handlers::HandlerId;
pub use registry::{Command, CommandRegistry};
pub use resp::{decode_frame, Argv};
