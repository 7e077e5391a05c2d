//! Client configuration snapshot and connection tunables.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Where to connect and which pairing code to log in with.
///
/// Treated as an immutable snapshot: the manager swaps the whole value and
/// each connect attempt reads it once at start.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Companion host name or address
    pub server_host: String,
    /// Companion TCP port
    pub server_port: u16,
    /// Pairing code sent with the login
    pub connection_code: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_host: "127.0.0.1".to_string(),
            server_port: 9000,
            connection_code: String::new(),
        }
    }
}

impl ClientConfig {
    /// `host:port` label used in logs
    pub fn endpoint(&self) -> String {
        format!("{}:{}", self.server_host, self.server_port)
    }
}

/// Connection tunables
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkSettings {
    /// Bound on each transport connect, in milliseconds
    pub connect_timeout_ms: u64,
    /// Fixed pause before every retry after the first attempt, in milliseconds
    pub retry_delay_ms: u64,
    /// Largest accepted frame in bytes
    pub max_frame_size: usize,
    /// Read buffer capacity per session
    pub read_buffer_size: usize,
}

impl Default for LinkSettings {
    fn default() -> Self {
        Self {
            connect_timeout_ms: 3_000,
            retry_delay_ms: 2_000,
            max_frame_size: link_wire::DEFAULT_MAX_FRAME_SIZE,
            read_buffer_size: 64 * 1024,
        }
    }
}

impl LinkSettings {
    /// Connect timeout as a duration
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    /// Retry delay as a duration
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings() {
        let settings = LinkSettings::default();
        assert_eq!(settings.connect_timeout(), Duration::from_secs(3));
        assert_eq!(settings.retry_delay(), Duration::from_secs(2));
    }

    #[test]
    fn test_endpoint_label() {
        let config = ClientConfig {
            server_host: "10.0.0.7".to_string(),
            server_port: 9000,
            connection_code: "ABCD".to_string(),
        };
        assert_eq!(config.endpoint(), "10.0.0.7:9000");
    }
}
