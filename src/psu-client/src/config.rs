// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Configuration file support for psuctl.
//!
//! Config is loaded from the `[psuctl]` section of `psu-rs.toml`, searched
//! in the same places as the server's section. The direct fallback path
//! also reads `[psu-server]` for the device settings.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use psu_app::{default_socket_path, validate_log_level, ConfigFile};

/// Top-level client configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// General settings
    pub general: GeneralConfig,
    /// Connection to psu-server
    pub connection: ConnectionConfig,
    /// Monitor dashboard
    pub monitor: MonitorConfig,
}

/// General application settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Log level (trace, debug, info, warn, error)
    pub log_level: Option<String>,
}

/// Socket connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionConfig {
    /// Server socket path; defaults to `$XDG_RUNTIME_DIR/.psu-rs.sock`
    pub socket_path: Option<PathBuf>,
    /// Connect timeout in milliseconds
    pub connect_timeout_ms: u64,
    /// Timeout for sending one request in milliseconds; replies are awaited
    /// without a deadline
    pub io_timeout_ms: u64,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            socket_path: None,
            connect_timeout_ms: 5_000,
            io_timeout_ms: 10_000,
        }
    }
}

/// Monitor settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Dashboard refresh interval in milliseconds
    pub refresh_interval_ms: u64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            refresh_interval_ms: 1_000,
        }
    }
}

impl ClientConfig {
    pub fn validate(&self) -> Result<(), String> {
        validate_log_level(self.general.log_level.as_deref())?;

        if let Some(path) = &self.connection.socket_path {
            if path.as_os_str().is_empty() {
                return Err("[connection].socket_path must not be empty".to_string());
            }
        }
        if self.connection.connect_timeout_ms == 0 {
            return Err("[connection].connect_timeout_ms must be > 0".to_string());
        }
        if self.connection.io_timeout_ms == 0 {
            return Err("[connection].io_timeout_ms must be > 0".to_string());
        }
        if self.monitor.refresh_interval_ms == 0 {
            return Err("[monitor].refresh_interval_ms must be > 0".to_string());
        }
        Ok(())
    }

    /// Socket path from config, or the per-user default.
    pub fn socket_path(&self) -> PathBuf {
        self.connection
            .socket_path
            .clone()
            .unwrap_or_else(default_socket_path)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connection.connect_timeout_ms)
    }

    pub fn io_timeout(&self) -> Duration {
        Duration::from_millis(self.connection.io_timeout_ms)
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_millis(self.monitor.refresh_interval_ms)
    }

    /// Generate an example configuration as a TOML string.
    pub fn example_toml() -> String {
        let example = ClientConfig {
            general: GeneralConfig {
                log_level: Some("warn".to_string()),
            },
            connection: ConnectionConfig {
                socket_path: Some(default_socket_path()),
                ..ConnectionConfig::default()
            },
            monitor: MonitorConfig::default(),
        };
        let wrapped = BTreeMap::from([(Self::section_key(), example)]);
        toml::to_string_pretty(&wrapped).unwrap_or_default()
    }
}

impl ConfigFile for ClientConfig {
    fn section_key() -> &'static str {
        "psuctl"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ClientConfig::default();
        assert!(config.connection.socket_path.is_none());
        assert_eq!(config.connect_timeout(), Duration::from_secs(5));
        assert_eq!(config.io_timeout(), Duration::from_secs(10));
        assert_eq!(config.refresh_interval(), Duration::from_secs(1));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_full_toml() {
        let toml_str = r#"
[general]
log_level = "debug"

[connection]
socket_path = "/tmp/psu-bench.sock"
connect_timeout_ms = 250
io_timeout_ms = 3000

[monitor]
refresh_interval_ms = 500
"#;

        let config: ClientConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.general.log_level.as_deref(), Some("debug"));
        assert_eq!(config.socket_path(), PathBuf::from("/tmp/psu-bench.sock"));
        assert_eq!(config.connect_timeout(), Duration::from_millis(250));
        assert_eq!(config.io_timeout(), Duration::from_secs(3));
        assert_eq!(config.refresh_interval(), Duration::from_millis(500));
    }

    #[test]
    fn test_validate_rejects_zero_intervals() {
        let mut config = ClientConfig::default();
        config.monitor.refresh_interval_ms = 0;
        assert!(config.validate().is_err());

        let mut config = ClientConfig::default();
        config.connection.io_timeout_ms = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_loads_from_shared_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("psu-rs.toml");
        std::fs::write(
            &path,
            "[psu-server.device]\nport = \"/dev/ttyACM2\"\n\n[psuctl.monitor]\nrefresh_interval_ms = 2000\n",
        )
        .unwrap();
        let (config, found) = ClientConfig::load(Some(&path)).unwrap();
        assert_eq!(found.as_deref(), Some(path.as_path()));
        assert_eq!(config.refresh_interval(), Duration::from_secs(2));
    }

    #[test]
    fn test_example_toml_parses() {
        let text = ClientConfig::example_toml();
        assert!(text.contains("[psuctl.connection]"));
        let table: toml::Table = toml::from_str(&text).unwrap();
        let section = toml::to_string(&table["psuctl"]).unwrap();
        let config: ClientConfig = toml::from_str(&section).unwrap();
        assert!(config.validate().is_ok());
    }
}
