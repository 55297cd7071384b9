//! # Raft configuration
//!
//! Fields a clustered node needs at startup, matching the CLI surface
//! described for cluster mode: where this node's log and snapshots live,
//! how it finds peers, and when to checkpoint.

use std::path::PathBuf;

use std::time::Duration;

/// Static configuration for one Raft node, built from CLI flags or a config
/// file by `kv-server`.
#[derive(Debug, Clone)]
pub struct RaftConfig {
    /// This node's Raft identity. Stable across restarts.
    pub local_id: u64,
    /// Address the Raft RPC listener binds to.
    pub raft_bind_addr: std::net::SocketAddr,
    /// Address the gossip (memberlist) listener binds to.
    pub gossip_bind_addr: std::net::SocketAddr,
    /// Directory holding the sled log database and snapshot file.
    pub data_dir: PathBuf,
    /// Keep the Raft log in memory only, for tests; never set in production.
    pub in_memory: bool,
    /// If true, this node forms a brand-new single-node cluster on first
    /// boot rather than waiting to be added by an existing leader.
    pub bootstrap_cluster: bool,
    /// Known peer gossip addresses to seed membership discovery.
    pub seed_peers: Vec<std::net::SocketAddr>,
    /// Number of applied log entries between automatic snapshots.
    pub snapshot_threshold: u64,
    /// Minimum wall-clock interval between automatic snapshots, regardless
    /// of `snapshot_threshold`.
    pub snapshot_interval: Duration,
    /// Raft election timeout bounds, in milliseconds.
    pub election_timeout_min_ms: u64,
    pub election_timeout_max_ms: u64,
    /// Raft heartbeat interval, in milliseconds.
    pub heartbeat_interval_ms: u64,
}

impl Default for RaftConfig {
    fn default() -> Self {
        RaftConfig {
            local_id: 1,
            raft_bind_addr: "127.0.0.1:7000".parse().expect("valid default addr"),
            gossip_bind_addr: "127.0.0.1:7001".parse().expect("valid default addr"),
            data_dir: PathBuf::from("./data"),
            in_memory: false,
            bootstrap_cluster: false,
            seed_peers: Vec::new(),
            snapshot_threshold: 10_000,
            snapshot_interval: Duration::from_secs(300),
            election_timeout_min_ms: 150,
            election_timeout_max_ms: 300,
            heartbeat_interval_ms: 50,
        }
    }
}

impl RaftConfig {
    /// Translates this config into `openraft`'s own tunables.
    pub fn to_openraft_config(&self) -> openraft::Config {
        openraft::Config {
            cluster_name: "kv-cluster".to_string(),
            election_timeout_min: self.election_timeout_min_ms,
            election_timeout_max: self.election_timeout_max_ms,
            heartbeat_interval: self.heartbeat_interval_ms,
            snapshot_policy: openraft::SnapshotPolicy::LogsSinceLast(self.snapshot_threshold),
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_builds_valid_openraft_config() {
        let config = RaftConfig::default();
        let openraft_config = config.to_openraft_config();
        assert_eq!(openraft_config.heartbeat_interval, 50);
    }
}
