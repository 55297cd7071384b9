//! # Dispatch
//!
//! Implements the five-step algorithm from §4.4: decode (done by the
//! caller), lookup, ACL authorize, write/read classification against the
//! state-copy barrier, then route to the append-only file (standalone) or
//! to the cluster layer (clustered).

use kv_acl::{AclStore, AuthRequest};
use kv_common::{KvError, KvResult};
use kv_engine::{Context, Keyspace, StateCopyBarrier};
use kv_persist::{AofHandle, SnapshotEngine, SnapshotSink};

use crate::handlers::{self, HandlerEnv, HandlerId};
use crate::registry::CommandRegistry;
use crate::resp::Argv;

/// Hook the cluster layer implements to accept replicated writes. Kept here
/// as a trait rather than a concrete dependency on `kv-cluster` so
/// `kv-command` has no upward dependency on it.
///
/// Neither method runs the handler itself: the handler only ever executes
/// once, inside the Raft FSM's `apply`, on whichever node actually commits
/// the entry (§4.4 step 4-5, §4.9). Both methods return the reply that
/// resulted from that application.
#[async_trait::async_trait]
pub trait ClusterRouter: Send + Sync {
    /// True if this node is currently the Raft leader.
    fn is_leader(&self) -> bool;
    /// Proposes `frame` (the raw RESP-encoded command) to the Raft log and
    /// resolves once it is committed and applied, with the applied reply.
    async fn propose_write(&self, frame: &[u8]) -> KvResult<Vec<u8>>;
    /// True if a `forwardCommand` path to the current leader is configured.
    fn can_forward(&self) -> bool;
    /// Forwards `frame` to the current leader, waiting for the leader to
    /// commit and apply it, and returns the applied reply.
    async fn forward_write(&self, frame: &[u8]) -> KvResult<Vec<u8>>;
}

/// Where write commands go once a handler has run successfully.
pub enum DispatchMode {
    Standalone { aof: Option<AofHandle> },
    Clustered { router: std::sync::Arc<dyn ClusterRouter> },
}

/// Per-connection authentication state. `AUTH` mutates this; everything
/// else only reads it.
pub struct Session {
    pub username: String,
}

impl Session {
    pub fn unauthenticated_default() -> Self {
        Session { username: "default".to_string() }
    }
}

pub struct Dispatcher {
    pub registry: CommandRegistry,
    pub keyspace: Keyspace,
    pub acl: AclStore,
    pub barrier: StateCopyBarrier,
    pub snapshot: SnapshotEngine,
    pub snapshot_sink: Box<dyn SnapshotSink>,
    pub mode: DispatchMode,
    pub server_id: String,
}

impl Dispatcher {
    /// Runs one decoded command end to end, returning the RESP-encoded
    /// reply (success or error) the connection layer writes back verbatim.
    pub async fn dispatch(&self, session: &mut Session, argv: Argv) -> Vec<u8> {
        match self.dispatch_inner(session, &argv).await {
            Ok(reply) => reply,
            Err(err) => crate::resp::encode_kv_error(&err),
        }
    }

    async fn dispatch_inner(&self, session: &mut Session, argv: &Argv) -> KvResult<Vec<u8>> {
        if argv.is_empty() {
            return Err(KvError::ProtocolError);
        }

        // Step 1-2: lookup command, resolve sub-command if any.
        let command = self.registry.lookup(&argv[0])?;
        let sub = self.registry.sub_command(command, argv);
        let effective = sub.unwrap_or(command);

        // Step 3: ACL authorize, except AUTH itself (a connection must be
        // able to call AUTH before it is authorized for anything else).
        if effective.name != "auth" {
            let (read_keys, write_keys) = (effective.key_extract)(argv)?;
            let req = AuthRequest {
                username: &session.username,
                command: command.name,
                sub_command: sub.map(|s| s.name),
                categories: effective.categories,
                read_keys: &read_keys,
                write_keys: &write_keys,
            };
            self.acl.authorize(&req)?;
        }

        let ctx = Context::background();
        let env = HandlerEnv {
            keyspace: &self.keyspace,
            ctx: &ctx,
            acl: &self.acl,
            registry: &self.registry,
            aof: self.aof_handle(),
            snapshot: &self.snapshot,
            snapshot_sink: self.snapshot_sink.as_ref(),
            server_id: &self.server_id,
        };

        if effective.is_write() {
            // Step 4: classify as a write; wait out any in-progress state
            // copy, then mark this mutation in flight for the barrier's
            // duration.
            let _mutation_guard = self.barrier.enter_mutation().await;

            // Step 5: standalone nodes run the handler directly and then
            // append to the AOF. Clustered nodes never run the handler here
            // at all — the command must go through Raft first, and the
            // handler only executes once, inside the FSM's `apply`, on
            // whichever node actually commits the entry. Running it here
            // too (or running it on a follower before the leader even sees
            // the write) would double-apply it or skip consensus entirely.
            match &self.mode {
                DispatchMode::Standalone { aof } => {
                    let reply = handlers::execute(&env, effective.handler, argv).await?;
                    if let Some(aof) = aof {
                        let frame = crate::resp::encode_command(argv);
                        aof.append(frame)?;
                    }
                    Ok(reply)
                }
                DispatchMode::Clustered { router } => {
                    let frame = crate::resp::encode_command(argv);
                    if router.is_leader() {
                        router.propose_write(&frame).await
                    } else if router.can_forward() {
                        router.forward_write(&frame).await
                    } else {
                        Err(KvError::NotLeader)
                    }
                }
            }
        } else {
            let reply = handlers::execute(&env, effective.handler, argv).await?;
            if effective.name == "auth" {
                session.username = match argv.len() {
                    3 => String::from_utf8_lossy(&argv[1]).into_owned(),
                    _ => "default".to_string(),
                };
            }
            Ok(reply)
        }
    }

    fn aof_handle(&self) -> Option<&AofHandle> {
        match &self.mode {
            DispatchMode::Standalone { aof } => aof.as_ref(),
            DispatchMode::Clustered { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kv_acl::AclUserBuilder;
    use kv_engine::KeyspaceConfig;

    struct NullSink;

    #[async_trait::async_trait]
    impl SnapshotSink for NullSink {
        async fn write(&self, _bytes: &[u8]) -> KvResult<()> {
            Ok(())
        }
        async fn read(&self) -> KvResult<Vec<u8>> {
            Err(KvError::NotFound("snapshot".into()))
        }
        async fn cancel(&self) -> KvResult<()> {
            Ok(())
        }
    }

    fn test_dispatcher() -> Dispatcher {
        let acl = AclStore::new();
        acl.insert_user(AclUserBuilder::new("default").root().nopass().build());
        Dispatcher {
            registry: CommandRegistry::new(),
            keyspace: Keyspace::new(KeyspaceConfig::default()),
            acl,
            barrier: StateCopyBarrier::new(),
            snapshot: SnapshotEngine::new(),
            snapshot_sink: Box::new(NullSink),
            mode: DispatchMode::Standalone { aof: None },
            server_id: "node-1".to_string(),
        }
    }

    #[tokio::test]
    async fn set_then_get_through_dispatch() {
        let dispatcher = test_dispatcher();
        let mut session = Session::unauthenticated_default();

        let reply =
            dispatcher.dispatch(&mut session, vec![b"set".to_vec(), b"k".to_vec(), b"v".to_vec()]).await;
        assert_eq!(reply, b"+OK\r\n".to_vec());

        let reply = dispatcher.dispatch(&mut session, vec![b"get".to_vec(), b"k".to_vec()]).await;
        assert_eq!(reply, b"$1\r\nv\r\n".to_vec());
    }

    #[tokio::test]
    async fn unauthorized_user_gets_error_reply() {
        let dispatcher = test_dispatcher();
        dispatcher.acl.insert_user(AclUserBuilder::new("reader").include_category("read").build());
        let mut session = Session { username: "reader".to_string() };

        let reply =
            dispatcher.dispatch(&mut session, vec![b"set".to_vec(), b"k".to_vec(), b"v".to_vec()]).await;
        assert_eq!(reply, b"-unauthorized\r\n".to_vec());
    }

    #[tokio::test]
    async fn unknown_command_is_an_error_reply() {
        let dispatcher = test_dispatcher();
        let mut session = Session::unauthenticated_default();
        let reply = dispatcher.dispatch(&mut session, vec![b"nosuch".to_vec()]).await;
        assert!(String::from_utf8_lossy(&reply).starts_with("-unknown command"));
    }
}
