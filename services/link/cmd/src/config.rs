//! Configuration handling for the link client.
//!
//! Reads the optional YAML config file, then applies `LINK_*` environment
//! overrides on top of it.

use anyhow::Result;
use link_session::{ClientConfig, LinkSettings};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{info, warn};

/// Everything the binary needs to build a connection manager
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkConfig {
    /// Companion endpoint and pairing code
    pub client: ClientConfig,
    /// Connection tunables
    pub settings: LinkSettings,
}

/// Root of the YAML file; every section is optional
#[derive(Debug, Deserialize)]
struct RootConfig {
    client: Option<ClientSection>,
    settings: Option<LinkSettings>,
}

#[derive(Debug, Deserialize)]
struct ClientSection {
    server_host: Option<String>,
    server_port: Option<u16>,
    connection_code: Option<String>,
}

impl LinkConfig {
    /// Load configuration from file and environment variables
    pub fn load_from_file<P: AsRef<Path>>(config_path: P) -> Result<Self> {
        let mut config = Self::default();

        match std::fs::read_to_string(&config_path) {
            Ok(content) => match serde_yaml::from_str::<RootConfig>(&content) {
                Ok(root) => {
                    config.apply_root_config(root);
                    info!("Loaded configuration from {:?}", config_path.as_ref());
                }
                Err(e) => warn!(
                    "Failed to parse config file {:?}, using defaults: {}",
                    config_path.as_ref(),
                    e
                ),
            },
            Err(e) => warn!(
                "Could not read config file {:?}, using defaults: {}",
                config_path.as_ref(),
                e
            ),
        }

        config.apply_environment_overrides(|key| std::env::var(key).ok());

        info!(
            "Final link configuration: server={}, retry_delay={}ms, connect_timeout={}ms",
            config.client.endpoint(),
            config.settings.retry_delay_ms,
            config.settings.connect_timeout_ms
        );
        Ok(config)
    }

    fn apply_root_config(&mut self, root: RootConfig) {
        if let Some(client) = root.client {
            if let Some(host) = client.server_host {
                self.client.server_host = host;
            }
            if let Some(port) = client.server_port {
                self.client.server_port = port;
            }
            if let Some(code) = client.connection_code {
                self.client.connection_code = code;
            }
        }
        if let Some(settings) = root.settings {
            self.settings = settings;
        }
    }

    /// Apply `LINK_*` overrides resolved through `lookup`
    fn apply_environment_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(host) = lookup("LINK_SERVER_HOST") {
            info!("Server host overridden by environment: {}", host);
            self.client.server_host = host;
        }

        if let Some(port) = lookup("LINK_SERVER_PORT") {
            match port.parse::<u16>() {
                Ok(port) => {
                    self.client.server_port = port;
                    info!("Server port overridden by environment: {}", port);
                }
                Err(_) => warn!("Ignoring invalid LINK_SERVER_PORT {:?}", port),
            }
        }

        if let Some(code) = lookup("LINK_CONNECTION_CODE") {
            self.client.connection_code = code;
            info!("Connection code overridden by environment");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;
    use std::sync::{Arc, Mutex};
    use tempfile::NamedTempFile;
    use tracing_subscriber::fmt::MakeWriter;

    #[derive(Clone, Default)]
    struct TestWriter {
        buffer: Arc<Mutex<Vec<u8>>>,
    }

    struct TestWriterGuard {
        buffer: Arc<Mutex<Vec<u8>>>,
    }

    impl<'a> MakeWriter<'a> for TestWriter {
        type Writer = TestWriterGuard;

        fn make_writer(&'a self) -> Self::Writer {
            TestWriterGuard {
                buffer: self.buffer.clone(),
            }
        }
    }

    impl Write for TestWriterGuard {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.buffer
                .lock()
                .expect("log buffer")
                .extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl TestWriter {
        fn contents(&self) -> String {
            String::from_utf8_lossy(&self.buffer.lock().expect("log buffer")).into_owned()
        }
    }

    #[test]
    fn test_default_config() {
        let config = LinkConfig::default();
        assert_eq!(config.client.server_host, "127.0.0.1");
        assert_eq!(config.client.server_port, 9000);
        assert_eq!(config.settings.retry_delay_ms, 2_000);
    }

    #[test]
    fn test_load_from_file() {
        let yaml_content = r#"
client:
  server_host: 192.168.1.40
  server_port: 9100
  connection_code: ABCD

settings:
  retry_delay_ms: 500
"#;
        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(yaml_content.as_bytes()).unwrap();

        let config = LinkConfig::load_from_file(temp_file.path()).unwrap();
        assert_eq!(config.client.server_host, "192.168.1.40");
        assert_eq!(config.client.server_port, 9100);
        assert_eq!(config.client.connection_code, "ABCD");
        assert_eq!(config.settings.retry_delay_ms, 500);
        // Unset tunables keep their defaults
        assert_eq!(config.settings.connect_timeout_ms, 3_000);
    }

    #[test]
    fn test_partial_client_section() {
        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file
            .write_all(b"client:\n  connection_code: WXYZ\n")
            .unwrap();

        let config = LinkConfig::load_from_file(temp_file.path()).unwrap();
        assert_eq!(config.client.connection_code, "WXYZ");
        assert_eq!(config.client.server_port, 9000);
    }

    #[test]
    fn test_missing_or_invalid_file_uses_defaults() {
        let missing = LinkConfig::load_from_file("/nonexistent/link.yaml").unwrap();
        assert_eq!(missing.client, ClientConfig::default());

        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(b"client: [not, a, map").unwrap();
        let invalid = LinkConfig::load_from_file(temp_file.path()).unwrap();
        assert_eq!(invalid.settings, LinkSettings::default());
    }

    #[test]
    fn test_read_failure_reports_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let io_error = std::fs::read_to_string(dir.path()).unwrap_err().to_string();

        let writer = TestWriter::default();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(writer.clone())
            .with_ansi(false)
            .finish();
        let config = tracing::subscriber::with_default(subscriber, || {
            LinkConfig::load_from_file(dir.path()).unwrap()
        });

        assert_eq!(config.client, ClientConfig::default());
        let logs = writer.contents();
        assert!(logs.contains("Could not read config file"), "{}", logs);
        assert!(logs.contains(&io_error), "{}", logs);
    }

    #[test]
    fn test_environment_overrides() {
        let env: HashMap<&str, &str> = [
            ("LINK_SERVER_HOST", "10.0.0.9"),
            ("LINK_SERVER_PORT", "not-a-port"),
            ("LINK_CONNECTION_CODE", "EFGH"),
        ]
        .into_iter()
        .collect();

        let mut config = LinkConfig::default();
        config.apply_environment_overrides(|key| env.get(key).map(|v| v.to_string()));

        assert_eq!(config.client.server_host, "10.0.0.9");
        assert_eq!(config.client.server_port, 9000);
        assert_eq!(config.client.connection_code, "EFGH");
    }
}
