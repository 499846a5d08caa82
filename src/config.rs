//! Server configuration (spec.md §1, §5 "Global state").

use serde::Deserialize;
use std::net::SocketAddr;
use std::time::Duration;

fn default_listen_addr() -> SocketAddr {
    "127.0.0.1:8815".parse().expect("valid default listen address")
}

fn default_max_message_size() -> usize {
    16 * 1024 * 1024
}

/// Configuration for the Airport Flight server, loadable from a config
/// file or overridden from CLI flags.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    /// Address the gRPC listener binds to.
    #[serde(default = "default_listen_addr")]
    pub listen_addr: SocketAddr,

    /// Maximum encoded size of a single gRPC message, in either
    /// direction (spec.md §7 "oversized message").
    #[serde(default = "default_max_message_size")]
    pub max_message_size: usize,

    /// Idle transaction reap interval; transactions left open past this
    /// long without activity are rolled back (spec.md §4.9 open question,
    /// resolved in DESIGN.md: not enforced by `TransactionManager` itself,
    /// left to the server's housekeeping loop).
    #[serde(default, with = "humantime_serde::option")]
    pub transaction_idle_timeout: Option<Duration>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            max_message_size: default_max_message_size(),
            transaction_idle_timeout: None,
        }
    }
}

impl ServerConfig {
    /// Load configuration from a TOML file, falling back to defaults for
    /// any field the file omits.
    pub fn from_toml_file(path: &std::path::Path) -> crate::error::Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            crate::error::AirportError::Internal(format!("reading config file {path:?}: {e}"))
        })?;
        toml::from_str(&text)
            .map_err(|e| crate::error::AirportError::Internal(format!("parsing config file {path:?}: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_bind_localhost() {
        let cfg = ServerConfig::default();
        assert_eq!(cfg.listen_addr.port(), 8815);
        assert_eq!(cfg.max_message_size, 16 * 1024 * 1024);
        assert!(cfg.transaction_idle_timeout.is_none());
    }

    #[test]
    fn parses_partial_toml_with_defaults() {
        let cfg: ServerConfig = toml::from_str("listen_addr = \"0.0.0.0:9000\"").unwrap();
        assert_eq!(cfg.listen_addr.port(), 9000);
        assert_eq!(cfg.max_message_size, 16 * 1024 * 1024);
    }
}
