use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

// =============================================================================
// File config (figment-deserialized from defaults / relay.toml / env vars)
// =============================================================================
//
//   relay.toml:      [server]
//                    port = 9000
//
//   env var:         RELAY_SERVER__PORT=9000   (double underscore = nesting)

/// Default config file, looked up in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "relay.toml";

/// Top-level tunable configuration, deserialized by figment.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct FileConfig {
    #[serde(default)]
    pub server: ServerFileConfig,
    #[serde(default)]
    pub websocket: WebSocketFileConfig,
}

/// Listen address (lives under `[server]` in relay.toml).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerFileConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerFileConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

/// Per-connection tunables (lives under `[websocket]` in relay.toml).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WebSocketFileConfig {
    /// Messages buffered per connection before new ones are dropped.
    #[serde(default = "default_outbox_capacity")]
    pub outbox_capacity: usize,
    /// 0 disables keepalive pings.
    #[serde(default = "default_ping_interval_secs")]
    pub ping_interval_secs: u64,
    /// 0 disables the idle timeout.
    #[serde(default = "default_idle_timeout_secs")]
    pub idle_timeout_secs: u64,
}

impl Default for WebSocketFileConfig {
    fn default() -> Self {
        Self {
            outbox_capacity: default_outbox_capacity(),
            ping_interval_secs: default_ping_interval_secs(),
            idle_timeout_secs: default_idle_timeout_secs(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    3001
}
fn default_outbox_capacity() -> usize {
    256
}
fn default_ping_interval_secs() -> u64 {
    30
}
fn default_idle_timeout_secs() -> u64 {
    90
}

/// Build a figment that layers: defaults → config file → RELAY_* env vars.
///
/// A missing config file contributes nothing.
pub fn load_config(config_file: &Path) -> figment::Figment {
    use figment::{
        Figment,
        providers::{Env, Format, Serialized, Toml},
    };

    Figment::from(Serialized::defaults(FileConfig::default()))
        .merge(Toml::file(config_file))
        .merge(Env::prefixed("RELAY_").split("__"))
}

// =============================================================================
// Runtime config (derived from FileConfig plus CLI overrides)
// =============================================================================

#[derive(Clone, Debug)]
pub struct RelayConfig {
    pub bind_addr: SocketAddr,
    pub websocket: WebSocketConfig,
}

#[derive(Clone, Debug)]
pub struct WebSocketConfig {
    pub outbox_capacity: usize,
    pub ping_interval: Option<Duration>,
    pub idle_timeout: Option<Duration>,
}

impl Default for WebSocketConfig {
    fn default() -> Self {
        Self::from_file(&WebSocketFileConfig::default())
    }
}

impl WebSocketConfig {
    pub fn from_file(fc: &WebSocketFileConfig) -> Self {
        Self {
            // mpsc::channel panics on zero capacity
            outbox_capacity: fc.outbox_capacity.max(1),
            ping_interval: secs_or_disabled(fc.ping_interval_secs),
            idle_timeout: secs_or_disabled(fc.idle_timeout_secs),
        }
    }
}

fn secs_or_disabled(secs: u64) -> Option<Duration> {
    (secs > 0).then(|| Duration::from_secs(secs))
}

/// Values supplied on the command line; they win over every other layer.
#[derive(Clone, Debug, Default)]
pub struct CliOverrides {
    pub host: Option<String>,
    pub port: Option<u16>,
}

impl RelayConfig {
    pub fn from_file(fc: &FileConfig, overrides: &CliOverrides) -> Result<Self> {
        let host = overrides.host.as_deref().unwrap_or(&fc.server.host);
        let port = overrides.port.unwrap_or(fc.server.port);
        let bind_addr: SocketAddr = format!("{}:{}", host, port)
            .parse()
            .with_context(|| format!("Invalid listen address {}:{}", host, port))?;

        Ok(Self {
            bind_addr,
            websocket: WebSocketConfig::from_file(&fc.websocket),
        })
    }

    /// Resolve the full layered configuration.
    pub fn load(config_file: &Path, overrides: &CliOverrides) -> Result<Self> {
        let fc: FileConfig = load_config(config_file)
            .extract()
            .with_context(|| format!("Failed to load config from {}", config_file.display()))?;
        Self::from_file(&fc, overrides)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = RelayConfig::from_file(&FileConfig::default(), &CliOverrides::default()).unwrap();
        assert_eq!(config.bind_addr, "0.0.0.0:3001".parse().unwrap());
        assert_eq!(config.websocket.outbox_capacity, 256);
        assert_eq!(config.websocket.ping_interval, Some(Duration::from_secs(30)));
        assert_eq!(config.websocket.idle_timeout, Some(Duration::from_secs(90)));
    }

    #[test]
    fn test_cli_overrides_win() {
        let overrides = CliOverrides {
            host: Some("127.0.0.1".into()),
            port: Some(8080),
        };
        let config = RelayConfig::from_file(&FileConfig::default(), &overrides).unwrap();
        assert_eq!(config.bind_addr, "127.0.0.1:8080".parse().unwrap());
    }

    #[test]
    fn test_invalid_host_is_an_error() {
        let overrides = CliOverrides {
            host: Some("not a host".into()),
            port: None,
        };
        assert!(RelayConfig::from_file(&FileConfig::default(), &overrides).is_err());
    }

    #[test]
    fn test_zero_disables_timers() {
        let ws = WebSocketConfig::from_file(&WebSocketFileConfig {
            outbox_capacity: 0,
            ping_interval_secs: 0,
            idle_timeout_secs: 0,
        });
        assert_eq!(ws.outbox_capacity, 1);
        assert!(ws.ping_interval.is_none());
        assert!(ws.idle_timeout.is_none());
    }
}
