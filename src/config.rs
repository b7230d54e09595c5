//! wgden Configuration
//!
//! This module provides the global settings for the peer registry and
//! the configuration renderer.

use ipnet::Ipv4Net;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Main wgden configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WgdenConfig {
    /// Tunnel network configuration
    pub network: NetworkConfig,

    /// Filesystem layout
    #[serde(default)]
    pub paths: PathsConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Tunnel network configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// DNS domain peers live under; a peer `alice` resolves as `alice.<domain>`
    pub domain: String,

    /// Name of the single server peer
    pub server_name: String,

    /// The VPN network range (CIDR); peer addresses and the interface
    /// netmask come from this
    pub vpn_net: Ipv4Net,

    /// UDP port the server listens on
    #[serde(default = "default_listen_port")]
    pub listen_port: u16,

    /// Externally reachable host for the server endpoint; defaults to the
    /// server FQDN when unset
    #[serde(default)]
    pub endpoint: Option<String>,

    /// MTU written into client interface files (reduced for tunnels that
    /// traverse constrained transports)
    #[serde(default = "default_client_mtu")]
    pub client_mtu: u16,

    /// PersistentKeepalive interval for clients behind NAT, in seconds
    #[serde(default = "default_keepalive_secs")]
    pub keepalive_secs: u16,
}

/// Filesystem layout
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Directory holding persisted peer records
    #[serde(default = "default_registry_dir")]
    pub registry_dir: PathBuf,

    /// Directory rendered interface files are written to
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,

    /// Base directory for per-interface lifecycle hooks
    #[serde(default = "default_hooks_dir")]
    pub hooks_dir: PathBuf,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

// Default value functions
fn default_listen_port() -> u16 {
    51820
}

fn default_client_mtu() -> u16 {
    1280
}

fn default_keepalive_secs() -> u16 {
    25
}

fn default_registry_dir() -> PathBuf {
    PathBuf::from("/etc/wgden/peers")
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("/etc/wgden/rendered")
}

fn default_hooks_dir() -> PathBuf {
    PathBuf::from("/etc/wgden/hooks")
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            registry_dir: default_registry_dir(),
            output_dir: default_output_dir(),
            hooks_dir: default_hooks_dir(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl WgdenConfig {
    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_str(&content)
    }

    /// Load configuration from a TOML string
    pub fn from_str(content: &str) -> crate::Result<Self> {
        let config: WgdenConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> crate::Result<()> {
        if self.network.domain.is_empty() {
            return Err(crate::Error::Config("network.domain cannot be empty".into()));
        }

        if self.network.server_name.is_empty() {
            return Err(crate::Error::Config(
                "network.server_name cannot be empty".into(),
            ));
        }

        if self.network.listen_port == 0 {
            return Err(crate::Error::Config(
                "network.listen_port cannot be zero".into(),
            ));
        }

        if self.network.client_mtu < 576 {
            return Err(crate::Error::Config(
                "network.client_mtu is below the IPv4 minimum".into(),
            ));
        }

        Ok(())
    }

    /// Fully-qualified hostname for a peer name
    pub fn fqdn(&self, name: &str) -> String {
        format!("{}.{}", name, self.network.domain)
    }

    /// Host part of the server endpoint (explicit override, or the
    /// server's FQDN so DNS stays authoritative)
    pub fn endpoint_host(&self) -> String {
        self.network
            .endpoint
            .clone()
            .unwrap_or_else(|| self.fqdn(&self.network.server_name))
    }

    /// Get the peer registry directory
    pub fn registry_dir(&self) -> &Path {
        &self.paths.registry_dir
    }

    /// Get the rendered-output directory
    pub fn output_dir(&self) -> &Path {
        &self.paths.output_dir
    }

    /// Hook directory for one peer's interface
    pub fn hook_dir_for(&self, peer_name: &str) -> PathBuf {
        self.paths.hooks_dir.join(peer_name)
    }
}
