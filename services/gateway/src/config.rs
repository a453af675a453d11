//! Gateway configuration loading.
//!
//! TOML is the sole config source; no environment variable overrides.
//! Default config path: `/etc/rusty-gateway/gateway.toml`.
//!
//! # Required fields
//! - `schema_version = 1`
//! - `network.bind_host`, `network.bind_port`
//! - `cluster.node_id`
//!
//! # Optional fields fall back to the documented defaults below.

use serde::Deserialize;
use std::path::Path;

// ---------------------------------------------------------------------------
// Config types (validated)
// ---------------------------------------------------------------------------

/// Top-level gateway configuration (§6 Configuration).
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub schema_version: u32,
    pub network: NetworkConfig,
    pub cluster: ClusterConfig,
    pub timeouts: TimeoutConfig,
    pub paths: PathsConfig,
}

#[derive(Debug, Clone)]
pub struct NetworkConfig {
    pub bind_host: String,
    pub bind_port: u16,
    pub library_channel_uri: String,
}

#[derive(Debug, Clone)]
pub struct ClusterConfig {
    pub node_id: i32,
    pub other_node_ids: Vec<i32>,
    pub cluster_channel_uri: String,
}

#[derive(Debug, Clone)]
pub struct TimeoutConfig {
    pub reply_timeout_ms: u64,
}

#[derive(Debug, Clone)]
pub struct PathsConfig {
    pub log_file_dir: String,
    pub monitoring_file_path: String,
}

// ---------------------------------------------------------------------------
// Raw TOML deserialization types (with Option for optional fields)
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct RawConfig {
    schema_version: Option<u32>,
    network: Option<RawNetworkConfig>,
    cluster: Option<RawClusterConfig>,
    timeouts: Option<RawTimeoutConfig>,
    paths: Option<RawPathsConfig>,
}

#[derive(Debug, Deserialize)]
struct RawNetworkConfig {
    bind_host: Option<String>,
    bind_port: Option<u16>,
    library_channel_uri: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawClusterConfig {
    node_id: Option<i32>,
    other_node_ids: Option<Vec<i32>>,
    cluster_channel_uri: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawTimeoutConfig {
    reply_timeout_ms: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct RawPathsConfig {
    log_file_dir: Option<String>,
    monitoring_file_path: Option<String>,
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Load gateway config from a custom path.
pub fn load_config_from_path(path: &Path) -> Result<GatewayConfig, ConfigError> {
    let toml_str = std::fs::read_to_string(path)
        .map_err(|e| ConfigError::Io(format!("reading config file '{}': {}", path.display(), e)))?;
    load_config_from_str(&toml_str)
}

/// Load gateway config from the default path `/etc/rusty-gateway/gateway.toml`.
pub fn load_config() -> Result<GatewayConfig, ConfigError> {
    load_config_from_path(Path::new("/etc/rusty-gateway/gateway.toml"))
}

/// Load gateway config from a TOML string.
pub fn load_config_from_str(toml_str: &str) -> Result<GatewayConfig, ConfigError> {
    let raw: RawConfig = toml::from_str(toml_str).map_err(|e| ConfigError::Parse(e.to_string()))?;

    let schema_version = raw
        .schema_version
        .ok_or_else(|| ConfigError::MissingField("schema_version".to_owned()))?;
    if schema_version != 1 {
        return Err(ConfigError::InvalidValue(format!(
            "schema_version must be 1, got {}",
            schema_version
        )));
    }

    let raw_network = raw
        .network
        .ok_or_else(|| ConfigError::MissingField("network".to_owned()))?;
    let bind_host = raw_network
        .bind_host
        .ok_or_else(|| ConfigError::MissingField("network.bind_host".to_owned()))?;
    let bind_port = raw_network
        .bind_port
        .ok_or_else(|| ConfigError::MissingField("network.bind_port".to_owned()))?;
    let library_channel_uri = raw_network
        .library_channel_uri
        .unwrap_or_else(|| "aeron:ipc?stream-id=10".to_owned());

    let raw_cluster = raw
        .cluster
        .ok_or_else(|| ConfigError::MissingField("cluster".to_owned()))?;
    let node_id = raw_cluster
        .node_id
        .ok_or_else(|| ConfigError::MissingField("cluster.node_id".to_owned()))?;
    let other_node_ids = raw_cluster.other_node_ids.unwrap_or_default();
    let cluster_channel_uri = raw_cluster
        .cluster_channel_uri
        .unwrap_or_else(|| "aeron:udp?endpoint=localhost:9020".to_owned());

    let timeouts = match raw.timeouts {
        Some(t) => TimeoutConfig {
            reply_timeout_ms: t.reply_timeout_ms.unwrap_or(10_000),
        },
        None => TimeoutConfig {
            reply_timeout_ms: 10_000,
        },
    };

    let paths = match raw.paths {
        Some(p) => PathsConfig {
            log_file_dir: p
                .log_file_dir
                .unwrap_or_else(|| "/var/log/rusty-gateway".to_owned()),
            monitoring_file_path: p
                .monitoring_file_path
                .unwrap_or_else(|| "/var/run/rusty-gateway/monitoring.dat".to_owned()),
        },
        None => PathsConfig {
            log_file_dir: "/var/log/rusty-gateway".to_owned(),
            monitoring_file_path: "/var/run/rusty-gateway/monitoring.dat".to_owned(),
        },
    };

    Ok(GatewayConfig {
        schema_version,
        network: NetworkConfig {
            bind_host,
            bind_port,
            library_channel_uri,
        },
        cluster: ClusterConfig {
            node_id,
            other_node_ids,
            cluster_channel_uri,
        },
        timeouts,
        paths,
    })
}

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(String),
    #[error("Parse error: {0}")]
    Parse(String),
    #[error("Missing required field: {0}")]
    MissingField(String),
    #[error("Invalid config value: {0}")]
    InvalidValue(String),
}
