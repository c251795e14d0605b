//! Server configuration
//!
//! A small TOML file plus one environment override:
//!
//! ```toml
//! bind = "0.0.0.0:8080"
//!
//! [backend]
//! retry_attempts = 3
//! retry_base_delay_ms = 25
//! ```
//!
//! `SHELFD_BIND` overrides `bind` for containerized deployments. Absent
//! file and absent variables mean defaults; a file that exists but does
//! not parse is an error, never a silent fallback.

use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use shelf_storage::RetryPolicy;

/// Configuration loading failures
#[derive(Debug, Error)]
pub enum ConfigError {
    /// File present but unreadable
    #[error("cannot read config file: {0}")]
    Io(#[from] std::io::Error),
    /// File present but not valid TOML for this shape
    #[error("cannot parse config file: {0}")]
    Parse(#[from] toml::de::Error),
    /// Environment override present but not a socket address
    #[error("invalid bind address '{0}'")]
    BadBind(String),
}

/// Top-level server configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerConfig {
    /// Listen address
    pub bind: SocketAddr,
    /// Backend call tuning
    pub backend: BackendConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            bind: SocketAddr::from(([127, 0, 0, 1], 8080)),
            backend: BackendConfig::default(),
        }
    }
}

/// Tuning for calls into the backing store
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BackendConfig {
    /// Attempts per backend call, including the first
    pub retry_attempts: u32,
    /// Delay before the first retry; doubles per attempt
    pub retry_base_delay_ms: u64,
}

impl Default for BackendConfig {
    fn default() -> Self {
        let policy = RetryPolicy::default();
        BackendConfig {
            retry_attempts: policy.max_attempts,
            retry_base_delay_ms: policy.base_delay.as_millis() as u64,
        }
    }
}

impl ServerConfig {
    /// Load from an optional file, then apply environment overrides
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => toml::from_str(&std::fs::read_to_string(path)?)?,
            None => ServerConfig::default(),
        };
        if let Ok(bind) = std::env::var("SHELFD_BIND") {
            config.bind = bind.parse().map_err(|_| ConfigError::BadBind(bind))?;
        }
        Ok(config)
    }

    /// The retry policy this configuration describes
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.backend.retry_attempts.max(1),
            base_delay: Duration::from_millis(self.backend.retry_base_delay_ms),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = ServerConfig::default();
        assert_eq!(config.bind.port(), 8080);
        assert_eq!(config.backend.retry_attempts, 3);
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "bind = \"0.0.0.0:9100\"").unwrap();
        writeln!(file, "[backend]").unwrap();
        writeln!(file, "retry_attempts = 5").unwrap();
        let config = ServerConfig::load(Some(file.path())).unwrap();
        assert_eq!(config.bind.port(), 9100);
        assert_eq!(config.backend.retry_attempts, 5);
        // Unspecified fields keep defaults.
        assert_eq!(config.backend.retry_base_delay_ms, 25);
    }

    #[test]
    fn test_unknown_keys_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "bindd = \"0.0.0.0:9100\"").unwrap();
        assert!(matches!(
            ServerConfig::load(Some(file.path())),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_retry_policy_floor() {
        let config = ServerConfig {
            backend: BackendConfig {
                retry_attempts: 0,
                retry_base_delay_ms: 1,
            },
            ..Default::default()
        };
        assert_eq!(config.retry_policy().max_attempts, 1, "at least one attempt");
    }
}
