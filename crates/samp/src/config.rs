// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Hub configuration.
//!
//! One explicitly-constructed value passed to the hub and both profiles; no
//! lazily-initialised globals. Loadable from JSON for the standalone daemon.

use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Sentinel for [`HubConfig::localhost`]: substitute the machine hostname.
pub const HOSTNAME_SENTINEL: &str = "[hostname]";
/// Sentinel for [`HubConfig::localhost`]: substitute the machine IP literal.
pub const HOSTNUMBER_SENTINEL: &str = "[hostnumber]";

/// Environment variable overriding the loopback hostname used in URLs.
pub const ENV_LOCALHOST: &str = "SAMP_LOCALHOST";

/// Hub configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HubConfig {
    /// Address the profiles bind to (default: 127.0.0.1).
    #[serde(default = "default_bind_address")]
    pub bind_address: IpAddr,

    /// Web Profile port (default: 21012). The Standard Profile always asks
    /// the OS for a free port.
    #[serde(default = "default_web_port")]
    pub web_port: u16,

    /// Hostname embedded in published URLs. Plain name, or one of the
    /// `[hostname]` / `[hostnumber]` sentinels.
    #[serde(default = "default_localhost")]
    pub localhost: String,

    /// Explicit lockfile path override (default: `$HOME/.samp`).
    #[serde(default)]
    pub lockfile_path: Option<PathBuf>,

    /// Maximum concurrent registrations.
    #[serde(default = "default_max_clients")]
    pub max_clients: usize,

    /// Maximum pending Web Profile callbacks queued per client.
    #[serde(default = "default_queue_bound")]
    pub callback_queue_bound: usize,

    /// Outbound callback connect/read timeout in seconds.
    #[serde(default = "default_callback_timeout")]
    pub callback_timeout_secs: u64,

    /// Grace period for draining deliveries at shutdown, in milliseconds.
    #[serde(default = "default_shutdown_grace")]
    pub shutdown_grace_ms: u64,

    /// Interval between lockfile liveness checks, in seconds.
    #[serde(default = "default_lockfile_poll")]
    pub lockfile_poll_secs: u64,

    /// Serve the Web Profile in addition to the Standard Profile.
    #[serde(default = "default_true")]
    pub web_profile_enabled: bool,
}

fn default_bind_address() -> IpAddr {
    "127.0.0.1".parse().expect("loopback literal")
}

fn default_web_port() -> u16 {
    21012
}

fn default_localhost() -> String {
    "127.0.0.1".to_string()
}

fn default_max_clients() -> usize {
    4096
}

fn default_queue_bound() -> usize {
    4096
}

fn default_callback_timeout() -> u64 {
    10
}

fn default_shutdown_grace() -> u64 {
    500
}

fn default_lockfile_poll() -> u64 {
    5
}

fn default_true() -> bool {
    true
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            web_port: default_web_port(),
            localhost: default_localhost(),
            lockfile_path: None,
            max_clients: default_max_clients(),
            callback_queue_bound: default_queue_bound(),
            callback_timeout_secs: default_callback_timeout(),
            shutdown_grace_ms: default_shutdown_grace(),
            lockfile_poll_secs: default_lockfile_poll(),
            web_profile_enabled: true,
        }
    }
}

impl HubConfig {
    /// Load configuration from a JSON file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io(e.to_string()))?;
        serde_json::from_str(&content).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Save configuration to a JSON file.
    pub fn to_file(&self, path: &Path) -> Result<(), ConfigError> {
        let content =
            serde_json::to_string_pretty(self).map_err(|e| ConfigError::Parse(e.to_string()))?;
        std::fs::write(path, content).map_err(|e| ConfigError::Io(e.to_string()))
    }

    pub fn callback_timeout(&self) -> Duration {
        Duration::from_secs(self.callback_timeout_secs)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }

    pub fn lockfile_poll(&self) -> Duration {
        Duration::from_secs(self.lockfile_poll_secs)
    }

    /// Validate configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_clients == 0 {
            return Err(ConfigError::Invalid("max_clients cannot be 0".into()));
        }
        if self.callback_queue_bound == 0 {
            return Err(ConfigError::Invalid(
                "callback_queue_bound cannot be 0".into(),
            ));
        }
        if self.localhost.is_empty() {
            return Err(ConfigError::Invalid("localhost cannot be empty".into()));
        }
        Ok(())
    }

    /// The hostname to embed in published URLs, applying the `$SAMP_LOCALHOST`
    /// override and the `[hostname]` / `[hostnumber]` sentinels. Any lookup
    /// failure falls back to `127.0.0.1`.
    pub fn effective_localhost(&self) -> String {
        let raw = std::env::var(ENV_LOCALHOST).unwrap_or_else(|_| self.localhost.clone());
        resolve_localhost(&raw)
    }
}

/// Expand the `[hostname]` / `[hostnumber]` sentinels.
fn resolve_localhost(raw: &str) -> String {
    match raw {
        HOSTNAME_SENTINEL => std::env::var("HOSTNAME")
            .ok()
            .filter(|h| !h.is_empty())
            .unwrap_or_else(|| "127.0.0.1".to_string()),
        HOSTNUMBER_SENTINEL => local_ip().unwrap_or_else(|| "127.0.0.1".to_string()),
        other => other.to_string(),
    }
}

/// Best-effort local IP discovery: the source address of an unconnected UDP
/// socket aimed at a public address. No packets are sent.
fn local_ip() -> Option<String> {
    let socket = std::net::UdpSocket::bind("0.0.0.0:0").ok()?;
    socket.connect("192.0.2.1:9").ok()?;
    Some(socket.local_addr().ok()?.ip().to_string())
}

/// Configuration error types.
#[derive(Debug, Clone, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(String),

    #[error("parse error: {0}")]
    Parse(String),

    #[error("invalid value: {0}")]
    Invalid(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = HubConfig::default();
        assert_eq!(config.web_port, 21012);
        assert_eq!(config.max_clients, 4096);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_json_round_trip() {
        let config = HubConfig {
            web_port: 9000,
            ..Default::default()
        };
        let json = serde_json::to_string(&config).unwrap();
        let parsed: HubConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.web_port, 9000);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let parsed: HubConfig = serde_json::from_str(r#"{"web_port": 1}"#).unwrap();
        assert_eq!(parsed.web_port, 1);
        assert_eq!(parsed.max_clients, default_max_clients());
        assert!(parsed.web_profile_enabled);
    }

    #[test]
    fn test_validation_rejects_zero_bounds() {
        let config = HubConfig {
            max_clients: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = HubConfig {
            callback_queue_bound: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_localhost_sentinel_fallback() {
        // A plain name passes through untouched.
        assert_eq!(resolve_localhost("myhost.example"), "myhost.example");
        // Sentinel resolution never fails outright.
        let ip = resolve_localhost(HOSTNUMBER_SENTINEL);
        assert!(!ip.is_empty());
        let host = resolve_localhost(HOSTNAME_SENTINEL);
        assert!(!host.is_empty());
    }
}
