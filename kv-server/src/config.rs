//! # Server configuration
//!
//! `ServerConfig` names every flag in the CLI surface as a typed field.
//! Parsing itself (`clap`) is mechanical; the field list and the file-wins
//! precedence are the part that matters. Layering: defaults → CLI →
//! file (when `-config` is given, the file overrides whatever the CLI set).

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;

use clap::Parser;
use kv_persist::FsyncPolicy;
use serde::{Deserialize, Serialize};

/// One configured ACL user, as it appears in an `aclConfig` file.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AclUserSpec {
    pub name: String,
    #[serde(default)]
    pub disabled: bool,
    #[serde(default)]
    pub root: bool,
    #[serde(default)]
    pub nopass: bool,
    #[serde(default)]
    pub nokeys: bool,
    #[serde(default)]
    pub passwords: Vec<String>,
    #[serde(default)]
    pub include_commands: Vec<String>,
    #[serde(default)]
    pub exclude_commands: Vec<String>,
    #[serde(default)]
    pub include_categories: Vec<String>,
    #[serde(default)]
    pub exclude_categories: Vec<String>,
    #[serde(default)]
    pub allow_key_patterns: Vec<String>,
    #[serde(default)]
    pub deny_key_patterns: Vec<String>,
    #[serde(default)]
    pub allow_channel_patterns: Vec<String>,
}

/// A file config layer: every field is optional, since only the fields
/// present in the file should override what the CLI already set.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FileConfig {
    pub tls: Option<bool>,
    pub mtls: Option<bool>,
    pub cert_key_pair: Option<(PathBuf, PathBuf)>,
    pub client_ca: Option<PathBuf>,
    pub port: Option<u16>,
    pub plugin_dir: Option<PathBuf>,
    pub server_id: Option<u64>,
    pub join_addr: Option<SocketAddr>,
    pub bind_addr: Option<IpAddr>,
    pub raft_port: Option<u16>,
    pub ml_port: Option<u16>,
    pub in_memory: Option<bool>,
    pub data_dir: Option<PathBuf>,
    pub bootstrap_cluster: Option<bool>,
    pub acl_config: Option<PathBuf>,
    pub snapshot_threshold: Option<u64>,
    pub snapshot_interval_secs: Option<u64>,
    pub restore_snapshot: Option<bool>,
    pub restore_aof: Option<bool>,
    pub forward_command: Option<bool>,
    pub require_pass: Option<bool>,
    pub password: Option<String>,
    pub aof_sync_strategy: Option<String>,
    #[serde(default)]
    pub acl_users: Vec<AclUserSpec>,
}

/// §6's CLI surface, one field per flag, matched by name.
#[derive(Debug, Clone, Parser)]
#[command(name = "kv-server", about = "RESP-compatible in-memory key/value server")]
pub struct Cli {
    #[arg(long)]
    pub tls: bool,
    #[arg(long)]
    pub mtls: bool,
    #[arg(long, value_names = ["CERT", "KEY"], num_args = 2)]
    pub cert_key_pair: Option<Vec<PathBuf>>,
    #[arg(long)]
    pub client_ca: Option<PathBuf>,
    #[arg(long, default_value_t = 6380)]
    pub port: u16,
    #[arg(long)]
    pub plugin_dir: Option<PathBuf>,
    #[arg(long, default_value_t = 1)]
    pub server_id: u64,
    #[arg(long)]
    pub join_addr: Option<SocketAddr>,
    #[arg(long, default_value = "127.0.0.1")]
    pub bind_addr: IpAddr,
    #[arg(long, default_value_t = 7000)]
    pub raft_port: u16,
    #[arg(long, default_value_t = 7001)]
    pub ml_port: u16,
    #[arg(long)]
    pub in_memory: bool,
    #[arg(long, default_value = "./data")]
    pub data_dir: PathBuf,
    #[arg(long)]
    pub bootstrap_cluster: bool,
    #[arg(long)]
    pub acl_config: Option<PathBuf>,
    #[arg(long, default_value_t = 10_000)]
    pub snapshot_threshold: u64,
    #[arg(long, default_value_t = 300)]
    pub snapshot_interval: u64,
    #[arg(long)]
    pub restore_snapshot: bool,
    #[arg(long)]
    pub restore_aof: bool,
    #[arg(long)]
    pub forward_command: bool,
    #[arg(long)]
    pub require_pass: bool,
    #[arg(long)]
    pub password: Option<String>,
    #[arg(long, value_enum, default_value = "everysec")]
    pub aof_sync_strategy: AofSyncArg,
    #[arg(long)]
    pub config: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum AofSyncArg {
    Always,
    Everysec,
    No,
}

impl From<AofSyncArg> for FsyncPolicy {
    fn from(value: AofSyncArg) -> Self {
        match value {
            AofSyncArg::Always => FsyncPolicy::Always,
            AofSyncArg::Everysec => FsyncPolicy::EverySec,
            AofSyncArg::No => FsyncPolicy::No,
        }
    }
}

/// The fully resolved configuration a node starts with: CLI defaults,
/// overridden field-by-field by an `-config` file when given.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub tls: bool,
    pub mtls: bool,
    pub cert_key_pair: Option<(PathBuf, PathBuf)>,
    pub client_ca: Option<PathBuf>,
    pub port: u16,
    pub plugin_dir: Option<PathBuf>,
    pub server_id: u64,
    pub join_addr: Option<SocketAddr>,
    pub bind_addr: IpAddr,
    pub raft_port: u16,
    pub ml_port: u16,
    pub in_memory: bool,
    pub data_dir: PathBuf,
    pub bootstrap_cluster: bool,
    pub acl_config: Option<PathBuf>,
    pub snapshot_threshold: u64,
    pub snapshot_interval_secs: u64,
    pub restore_snapshot: bool,
    pub restore_aof: bool,
    pub forward_command: bool,
    pub require_pass: bool,
    pub password: Option<String>,
    pub aof_sync_strategy: FsyncPolicy,
    pub acl_users: Vec<AclUserSpec>,
}

impl ServerConfig {
    /// Layers defaults (the CLI's own defaults) → CLI → file. Reads the
    /// file named by `-config`, if any; any field set there overrides what
    /// the CLI parsed.
    pub fn load(cli: Cli) -> std::io::Result<Self> {
        let mut config = ServerConfig {
            tls: cli.tls,
            mtls: cli.mtls,
            cert_key_pair: cli.cert_key_pair.map(|pair| (pair[0].clone(), pair[1].clone())),
            client_ca: cli.client_ca,
            port: cli.port,
            plugin_dir: cli.plugin_dir,
            server_id: cli.server_id,
            join_addr: cli.join_addr,
            bind_addr: cli.bind_addr,
            raft_port: cli.raft_port,
            ml_port: cli.ml_port,
            in_memory: cli.in_memory,
            data_dir: cli.data_dir,
            bootstrap_cluster: cli.bootstrap_cluster,
            acl_config: cli.acl_config.clone(),
            snapshot_threshold: cli.snapshot_threshold,
            snapshot_interval_secs: cli.snapshot_interval,
            restore_snapshot: cli.restore_snapshot,
            restore_aof: cli.restore_aof,
            forward_command: cli.forward_command,
            require_pass: cli.require_pass,
            password: cli.password,
            aof_sync_strategy: cli.aof_sync_strategy.into(),
            acl_users: Vec::new(),
        };

        if let Some(acl_path) = &config.acl_config {
            config.acl_users = load_acl_users(acl_path)?;
        }

        if let Some(config_path) = &cli.config {
            let file = load_file_config(config_path)?;
            config.apply_file(file);
        }

        Ok(config)
    }

    fn apply_file(&mut self, file: FileConfig) {
        macro_rules! overlay {
            ($field:ident) => {
                if let Some(value) = file.$field {
                    self.$field = value;
                }
            };
        }
        overlay!(tls);
        overlay!(mtls);
        overlay!(cert_key_pair);
        overlay!(client_ca);
        overlay!(port);
        overlay!(plugin_dir);
        overlay!(server_id);
        overlay!(join_addr);
        overlay!(bind_addr);
        overlay!(raft_port);
        overlay!(ml_port);
        overlay!(in_memory);
        overlay!(data_dir);
        overlay!(bootstrap_cluster);
        overlay!(acl_config);
        overlay!(snapshot_threshold);
        overlay!(snapshot_interval_secs);
        overlay!(restore_snapshot);
        overlay!(restore_aof);
        overlay!(forward_command);
        overlay!(require_pass);
        overlay!(password);
        if let Some(strategy) = file.aof_sync_strategy {
            self.aof_sync_strategy = match strategy.as_str() {
                "always" => FsyncPolicy::Always,
                "no" => FsyncPolicy::No,
                _ => FsyncPolicy::EverySec,
            };
        }
        if !file.acl_users.is_empty() {
            self.acl_users = file.acl_users;
        }
    }

    pub fn client_bind_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind_addr, self.port)
    }

    pub fn raft_bind_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind_addr, self.raft_port)
    }

    pub fn gossip_bind_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind_addr, self.ml_port)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            tls: false,
            mtls: false,
            cert_key_pair: None,
            client_ca: None,
            port: 6380,
            plugin_dir: None,
            server_id: 1,
            join_addr: None,
            bind_addr: IpAddr::V4(Ipv4Addr::LOCALHOST),
            raft_port: 7000,
            ml_port: 7001,
            in_memory: false,
            data_dir: PathBuf::from("./data"),
            bootstrap_cluster: false,
            acl_config: None,
            snapshot_threshold: 10_000,
            snapshot_interval_secs: 300,
            restore_snapshot: false,
            restore_aof: false,
            forward_command: false,
            require_pass: false,
            password: None,
            aof_sync_strategy: FsyncPolicy::EverySec,
            acl_users: Vec::new(),
        }
    }
}

fn load_file_config(path: &std::path::Path) -> std::io::Result<FileConfig> {
    let bytes = std::fs::read(path)?;
    match path.extension().and_then(|ext| ext.to_str()) {
        Some("json") => serde_json::from_slice(&bytes)
            .map_err(|err| std::io::Error::new(std::io::ErrorKind::InvalidData, err)),
        _ => serde_yaml::from_slice(&bytes)
            .map_err(|err| std::io::Error::new(std::io::ErrorKind::InvalidData, err)),
    }
}

fn load_acl_users(path: &std::path::Path) -> std::io::Result<Vec<AclUserSpec>> {
    let bytes = std::fs::read(path)?;
    serde_yaml::from_slice(&bytes).map_err(|err| std::io::Error::new(std::io::ErrorKind::InvalidData, err))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_binds_loopback() {
        let config = ServerConfig::default();
        assert_eq!(config.client_bind_addr(), "127.0.0.1:6380".parse().unwrap());
    }

    #[test]
    fn file_config_overrides_cli_field() {
        let mut config = ServerConfig::default();
        let file = FileConfig { port: Some(9999), ..Default::default() };
        config.apply_file(file);
        assert_eq!(config.port, 9999);
    }
}
