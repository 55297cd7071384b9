//! Entry point: parse CLI flags, layer file config, build the keyspace and
//! durability engines, restore from AOF/snapshot if asked, then start the
//! connection server (and, in clustered mode, the Raft/gossip layer).

use std::sync::Arc;

use clap::Parser;
use kv_acl::{AclStore, AclUserBuilder};
use kv_cluster::{ClusterNode, RaftConfig};
use kv_command::{ClusterRouter, DispatchMode, Dispatcher};
use kv_engine::{Context, Keyspace, KeyspaceConfig, StateCopyBarrier};
use kv_persist::{AofConfig, AofReader, FileSink, SnapshotEngine, SnapshotSink};
use kv_server::config::{AclUserSpec, Cli, ServerConfig};
use kv_server::server::{self, ServerState};
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let config = ServerConfig::load(cli)?;
    std::fs::create_dir_all(&config.data_dir)?;

    let keyspace = Keyspace::new(KeyspaceConfig::default());
    let acl = build_acl_store(&config);
    let snapshot = SnapshotEngine::new();
    let snapshot_sink: Arc<dyn SnapshotSink> =
        Arc::new(FileSink::new(config.data_dir.join("snapshots").join("snapshot.json")));

    if config.restore_snapshot {
        match snapshot.restore(&keyspace, snapshot_sink.as_ref()).await {
            Ok(count) => info!(count, "restored keys from snapshot"),
            Err(err) => warn!(error = %err, "snapshot restore skipped"),
        }
    }

    let shutdown = Context::background();
    keyspace.spawn_expiry_sweeper(shutdown.child());

    let registry = kv_command::CommandRegistry::new();
    let barrier = StateCopyBarrier::new();

    let mode = if config.join_addr.is_some() || config.bootstrap_cluster {
        let raft_config = RaftConfig {
            local_id: config.server_id,
            raft_bind_addr: config.raft_bind_addr(),
            gossip_bind_addr: config.gossip_bind_addr(),
            data_dir: config.data_dir.clone(),
            in_memory: config.in_memory,
            bootstrap_cluster: config.bootstrap_cluster,
            seed_peers: config.join_addr.iter().copied().collect(),
            snapshot_threshold: config.snapshot_threshold,
            snapshot_interval: std::time::Duration::from_secs(config.snapshot_interval_secs),
            ..RaftConfig::default()
        };
        let node = Arc::new(ClusterNode::start(raft_config, keyspace.clone(), snapshot_sink.clone()).await?);
        let serve_node = node.clone();
        tokio::spawn(async move {
            if let Err(err) = serve_node.serve().await {
                warn!(error = %err, "raft rpc listener stopped");
            }
        });

        let gossip_node = kv_cluster::GossipNode::new(kv_cluster::NodeMeta {
            server_id: config.server_id,
            raft_addr: config.raft_bind_addr(),
            gossip_addr: config.gossip_bind_addr(),
        });
        let gossip_raft = node.clone();
        let seeds: Vec<_> = config.join_addr.iter().copied().collect();
        tokio::spawn(async move {
            if let Err(err) = gossip_node.run(gossip_raft, &seeds).await {
                warn!(error = %err, "gossip node stopped");
            }
        });

        DispatchMode::Clustered { router: node as Arc<dyn ClusterRouter> }
    } else {
        let aof_config = AofConfig {
            append_path: config.data_dir.join("aof").join("log.bin"),
            preamble_path: config.data_dir.join("aof").join("preamble.bin"),
            fsync: config.aof_sync_strategy,
        };
        std::fs::create_dir_all(config.data_dir.join("aof"))?;

        if config.restore_aof {
            if let Some(preamble) = AofReader::read_preamble(&aof_config).await? {
                if let Err(err) = snapshot_sink.write(&preamble).await {
                    warn!(error = %err, "failed to stage aof preamble for restore");
                } else if let Err(err) = snapshot.restore(&keyspace, snapshot_sink.as_ref()).await {
                    warn!(error = %err, "aof preamble restore failed");
                }
            }

            let mut frames = Vec::new();
            AofReader::replay_append_log(&aof_config, |frame| {
                frames.push(frame);
                Ok(())
            })
            .await?;

            let ctx = Context::background();
            let replay_acl = AclStore::new();
            replay_acl.insert_user(AclUserBuilder::new("replay").root().nopass().build());
            let replay_registry = kv_command::CommandRegistry::new();
            let mut applied = 0usize;
            for frame in frames {
                let mut buf = bytes::BytesMut::from(&frame[..]);
                let Ok(Some(argv)) = kv_command::decode_frame(&mut buf) else { continue };
                let Ok(command) = replay_registry.lookup(&argv[0]) else { continue };
                let env = kv_command::handlers::HandlerEnv {
                    keyspace: &keyspace,
                    ctx: &ctx,
                    acl: &replay_acl,
                    registry: &replay_registry,
                    aof: None,
                    snapshot: &snapshot,
                    snapshot_sink: snapshot_sink.as_ref(),
                    server_id: "replay",
                };
                if kv_command::handlers::execute(&env, command.handler, &argv).await.is_ok() {
                    applied += 1;
                }
            }
            info!(applied, "replayed aof records");
        }

        let (aof_handle, _join) = kv_persist::aof::spawn_aof_writer(aof_config);
        DispatchMode::Standalone { aof: Some(aof_handle) }
    };

    let dispatcher = Dispatcher {
        registry,
        keyspace,
        acl,
        barrier,
        snapshot,
        snapshot_sink: Box::new(FileSink::new(config.data_dir.join("snapshots").join("snapshot.json"))),
        mode,
        server_id: config.server_id.to_string(),
    };

    let tls_acceptor = build_tls_acceptor(&config)?;
    let state = Arc::new(ServerState::new(dispatcher, tls_acceptor));

    let listener = TcpListener::bind(config.client_bind_addr()).await?;
    let server_shutdown = shutdown.child();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("received shutdown signal");
            server_shutdown.cancel();
        }
    });

    server::run(listener, state, shutdown).await?;
    Ok(())
}

fn build_acl_store(config: &ServerConfig) -> AclStore {
    let acl = AclStore::new();
    if config.acl_users.is_empty() {
        let mut default_user = AclUserBuilder::new("default").root();
        default_user = if config.require_pass {
            match &config.password {
                Some(password) => default_user.password(password),
                None => default_user.nopass(),
            }
        } else {
            default_user.nopass()
        };
        acl.insert_user(default_user.build());
    } else {
        for spec in &config.acl_users {
            acl.insert_user(build_acl_user(spec));
        }
    }
    acl
}

fn build_acl_user(spec: &AclUserSpec) -> kv_acl::AclUser {
    let mut builder = AclUserBuilder::new(spec.name.clone());
    if spec.disabled {
        builder = builder.disabled();
    }
    if spec.root {
        builder = builder.root();
    }
    if spec.nopass {
        builder = builder.nopass();
    }
    if spec.nokeys {
        builder = builder.nokeys();
    }
    for password in &spec.passwords {
        builder = builder.password(password);
    }
    for name in &spec.include_commands {
        builder = builder.include_command(name.clone());
    }
    for name in &spec.exclude_commands {
        builder = builder.exclude_command(name.clone());
    }
    for name in &spec.include_categories {
        builder = builder.include_category(name.clone());
    }
    for name in &spec.exclude_categories {
        builder = builder.exclude_category(name.clone());
    }
    for pattern in &spec.allow_key_patterns {
        builder = builder.allow_key_pattern(pattern.clone());
    }
    for pattern in &spec.deny_key_patterns {
        builder = builder.deny_key_pattern(pattern.clone());
    }
    for pattern in &spec.allow_channel_patterns {
        builder = builder.allow_channel_pattern(pattern.clone());
    }
    builder.build()
}

fn build_tls_acceptor(config: &ServerConfig) -> anyhow::Result<Option<tokio_rustls::TlsAcceptor>> {
    if !config.tls {
        return Ok(None);
    }
    let Some((cert_path, key_path)) = &config.cert_key_pair else {
        anyhow::bail!("tls requested but -certKeyPair was not given");
    };

    let cert_bytes = std::fs::read(cert_path)?;
    let key_bytes = std::fs::read(key_path)?;
    let certs: Vec<_> = rustls_pemfile::certs(&mut cert_bytes.as_slice()).collect::<Result<_, _>>()?;
    let key = rustls_pemfile::private_key(&mut key_bytes.as_slice())?
        .ok_or_else(|| anyhow::anyhow!("no private key found in {}", key_path.display()))?;

    let builder = rustls::ServerConfig::builder();
    let tls_config = if config.mtls {
        let ca_path = config
            .client_ca
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("mtls requested but -clientCA was not given"))?;
        let ca_bytes = std::fs::read(ca_path)?;
        let ca_certs: Vec<_> = rustls_pemfile::certs(&mut ca_bytes.as_slice()).collect::<Result<_, _>>()?;
        let mut roots = rustls::RootCertStore::empty();
        for cert in ca_certs {
            roots.add(cert)?;
        }
        let verifier = rustls::server::WebPkiClientVerifier::builder(Arc::new(roots)).build()?;
        builder.with_client_cert_verifier(verifier).with_single_cert(certs, key)?
    } else {
        builder.with_no_client_auth().with_single_cert(certs, key)?
    };

    Ok(Some(tokio_rustls::TlsAcceptor::from(Arc::new(tls_config))))
}
