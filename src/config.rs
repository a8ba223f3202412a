// src/config.rs

//! Server configuration: loading, resolving, and validation, using a
//! `RawConfig` (serde defaults) -> `Config` (resolved, validated)
//! two-stage pattern.

use crate::core::persistence::BackupConfig;
use crate::core::types::ObjectAcl;
use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;

/// `connection:{dataDir, noFileCache, port, host, secure, certificates}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionConfig {
    pub data_dir: String,
    pub no_file_cache: bool,
    pub port: u16,
    pub host: String,
    pub secure: bool,
    pub certificates: Option<CertificatesConfig>,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            no_file_cache: false,
            port: default_port(),
            host: default_host(),
            secure: false,
            certificates: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CertificatesConfig {
    pub cert_path: String,
    pub key_path: String,
}

/// Structured logging configuration, resolved into a `tracing-subscriber`
/// `EnvFilter` at startup.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggerConfig {
    pub level: String,
    pub json: bool,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

/// The Prometheus metrics exporter, carried as ambient stack the way the
/// teacher's `MetricsConfig` is — independent of any spec Non-goal on
/// observability surfaces.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct MetricsConfig {
    pub enabled: bool,
    pub port: u16,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    9001
}
fn default_data_dir() -> String {
    "./objectdb_data".to_string()
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_namespace() -> String {
    "objectdb".to_string()
}

/// A raw representation of the config file before validation and defaults
/// resolution.
#[derive(Debug, Deserialize)]
#[serde(default)]
struct RawConfig {
    namespace: String,
    #[serde(rename = "defaultNewAcl")]
    default_new_acl: Option<ObjectAcl>,
    connection: ConnectionConfig,
    backup: BackupConfig,
    logger: LoggerConfig,
    metrics: MetricsConfig,
}

impl Default for RawConfig {
    fn default() -> Self {
        Self {
            namespace: default_namespace(),
            default_new_acl: None,
            connection: ConnectionConfig::default(),
            backup: BackupConfig::default(),
            logger: LoggerConfig::default(),
            metrics: MetricsConfig::default(),
        }
    }
}

/// The final, validated server configuration.
///
/// `auth`, `change`, and `connected` are host-supplied callback hooks
/// (pre-handshake authentication, change notification, connection-state
/// notification), not serializable settings — they are wired
/// programmatically by whatever embeds this crate, not read from a config
/// file. See DESIGN.md.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub namespace: String,
    #[serde(rename = "defaultNewAcl", skip_serializing_if = "Option::is_none")]
    pub default_new_acl: Option<ObjectAcl>,
    pub connection: ConnectionConfig,
    pub backup: BackupConfig,
    pub logger: LoggerConfig,
    pub metrics: MetricsConfig,
}

impl Default for Config {
    fn default() -> Self {
        let raw = RawConfig::default();
        Self {
            namespace: raw.namespace,
            default_new_acl: raw.default_new_acl,
            connection: raw.connection,
            backup: raw.backup,
            logger: raw.logger,
            metrics: raw.metrics,
        }
    }
}

impl Config {
    /// Loads and validates configuration from a TOML file.
    pub fn from_file(path: &str) -> Result<Self> {
        let contents =
            fs::read_to_string(path).with_context(|| format!("Failed to read config file at '{path}'"))?;
        let raw: RawConfig =
            toml::from_str(&contents).with_context(|| format!("Failed to parse TOML from '{path}'"))?;

        let config = Config {
            namespace: raw.namespace,
            default_new_acl: raw.default_new_acl,
            connection: raw.connection,
            backup: raw.backup,
            logger: raw.logger,
            metrics: raw.metrics,
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.connection.port == 0 {
            return Err(anyhow!("connection.port cannot be 0"));
        }
        if self.connection.host.trim().is_empty() {
            return Err(anyhow!("connection.host cannot be empty"));
        }
        if self.connection.data_dir.trim().is_empty() {
            return Err(anyhow!("connection.dataDir cannot be empty"));
        }
        if self.connection.secure && self.connection.certificates.is_none() {
            return Err(anyhow!("connection.secure requires connection.certificates"));
        }
        if let Some(certs) = &self.connection.certificates {
            if certs.cert_path.trim().is_empty() || certs.key_path.trim().is_empty() {
                return Err(anyhow!("connection.certificates paths cannot be empty"));
            }
        }
        if self.metrics.enabled {
            if self.metrics.port == 0 {
                return Err(anyhow!("metrics.port cannot be 0"));
            }
            if self.metrics.port == self.connection.port {
                return Err(anyhow!("metrics.port cannot be the same as connection.port"));
            }
        }
        Ok(())
    }
}
