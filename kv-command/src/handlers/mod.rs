//! # Command handlers
//!
//! Each handler is an async function over a [`HandlerEnv`] and the decoded
//! argv, returning the already RESP-encoded reply. Grouped by data type, the
//! way the teacher groups its own command implementations.

pub mod admin;
pub mod common;
pub mod connection;
pub mod hash;
pub mod list;
pub mod set;
pub mod string;

use kv_acl::AclStore;
use kv_common::KvResult;
use kv_engine::{Context, Keyspace};
use kv_persist::{AofHandle, SnapshotEngine, SnapshotSink};

use crate::registry::CommandRegistry;
use crate::resp::Argv;

/// Identifies which handler function a [`crate::registry::Command`] routes
/// to. Kept as a plain enum (rather than an async fn pointer, which Rust
/// cannot express without boxing every call) so dispatch can match on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandlerId {
    Get,
    Set,
    Mget,
    Mset,
    Del,
    LPush,
    RPush,
    LPop,
    RPop,
    LLen,
    LRange,
    LIndex,
    LSet,
    LTrim,
    LRem,
    LMove,
    HSet,
    HSetNx,
    HGet,
    HDel,
    HExists,
    HGetAll,
    HKeys,
    HVals,
    HLen,
    HStrlen,
    HIncrBy,
    HIncrByFloat,
    SAdd,
    SCard,
    SIsMember,
    SMIsMember,
    SMembers,
    SRem,
    SPop,
    SRandMember,
    SMove,
    SUnion,
    SInter,
    SDiff,
    Ping,
    Auth,
    Save,
    LastSave,
    RewriteAof,
    CommandsCatalog,
    DbSize,
    FlushAll,
    ClusterInfo,
}

/// Everything a handler needs beyond the decoded argv: the keyspace, a
/// cancellation context, the durability engines (standalone mode only), the
/// ACL store (for `AUTH`), and the command catalog (for `COMMANDS`).
pub struct HandlerEnv<'a> {
    pub keyspace: &'a Keyspace,
    pub ctx: &'a Context,
    pub acl: &'a AclStore,
    pub registry: &'a CommandRegistry,
    pub aof: Option<&'a AofHandle>,
    pub snapshot: &'a SnapshotEngine,
    pub snapshot_sink: &'a dyn SnapshotSink,
    pub server_id: &'a str,
}

/// Routes to the concrete handler function for `id`.
pub async fn execute(env: &HandlerEnv<'_>, id: HandlerId, argv: &Argv) -> KvResult<Vec<u8>> {
    match id {
        HandlerId::Get => string::get(env, argv).await,
        HandlerId::Set => string::set(env, argv).await,
        HandlerId::Mget => string::mget(env, argv).await,
        HandlerId::Mset => string::mset(env, argv).await,
        HandlerId::Del => string::del(env, argv).await,
        HandlerId::LPush => list::lpush(env, argv).await,
        HandlerId::RPush => list::rpush(env, argv).await,
        HandlerId::LPop => list::lpop(env, argv).await,
        HandlerId::RPop => list::rpop(env, argv).await,
        HandlerId::LLen => list::llen(env, argv).await,
        HandlerId::LRange => list::lrange(env, argv).await,
        HandlerId::LIndex => list::lindex(env, argv).await,
        HandlerId::LSet => list::lset(env, argv).await,
        HandlerId::LTrim => list::ltrim(env, argv).await,
        HandlerId::LRem => list::lrem(env, argv).await,
        HandlerId::LMove => list::lmove(env, argv).await,
        HandlerId::HSet => hash::hset(env, argv).await,
        HandlerId::HSetNx => hash::hsetnx(env, argv).await,
        HandlerId::HGet => hash::hget(env, argv).await,
        HandlerId::HDel => hash::hdel(env, argv).await,
        HandlerId::HExists => hash::hexists(env, argv).await,
        HandlerId::HGetAll => hash::hgetall(env, argv).await,
        HandlerId::HKeys => hash::hkeys(env, argv).await,
        HandlerId::HVals => hash::hvals(env, argv).await,
        HandlerId::HLen => hash::hlen(env, argv).await,
        HandlerId::HStrlen => hash::hstrlen(env, argv).await,
        HandlerId::HIncrBy => hash::hincrby(env, argv).await,
        HandlerId::HIncrByFloat => hash::hincrbyfloat(env, argv).await,
        HandlerId::SAdd => set::sadd(env, argv).await,
        HandlerId::SCard => set::scard(env, argv).await,
        HandlerId::SIsMember => set::sismember(env, argv).await,
        HandlerId::SMIsMember => set::smismember(env, argv).await,
        HandlerId::SMembers => set::smembers(env, argv).await,
        HandlerId::SRem => set::srem(env, argv).await,
        HandlerId::SPop => set::spop(env, argv).await,
        HandlerId::SRandMember => set::srandmember(env, argv).await,
        HandlerId::SMove => set::smove(env, argv).await,
        HandlerId::SUnion => set::sunion(env, argv).await,
        HandlerId::SInter => set::sinter(env, argv).await,
        HandlerId::SDiff => set::sdiff(env, argv).await,
        HandlerId::Ping => connection::ping(env, argv).await,
        HandlerId::Auth => connection::auth(env, argv).await,
        HandlerId::Save => admin::save(env, argv).await,
        HandlerId::LastSave => admin::lastsave(env, argv).await,
        HandlerId::RewriteAof => admin::rewriteaof(env, argv).await,
        HandlerId::CommandsCatalog => admin::commands_catalog(env, argv).await,
        HandlerId::DbSize => admin::dbsize(env, argv).await,
        HandlerId::FlushAll => admin::flushall(env, argv).await,
        HandlerId::ClusterInfo => admin::cluster_info(env, argv).await,
    }
}
