// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Configuration file support for psu-server.
//!
//! Config is loaded from the `[psu-server]` section of `psu-rs.toml`.
//! Default search order:
//! 1. Path specified via `--config` CLI argument
//! 2. `./psu-rs.toml`
//! 3. `~/.config/psu-rs/psu-rs.toml`
//! 4. `/etc/psu-rs/psu-rs.toml`

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use psu_app::{default_socket_path, validate_log_level, ConfigFile};
use psu_core::psu::command::DEFAULT_PRESET_SLOTS;
use psu_core::{PsuAccessMethod, SafetyGate, SessionConfig};

/// Top-level server configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// General settings
    pub general: GeneralConfig,
    /// Power supply and serial link
    pub device: DeviceConfig,
    /// Safety confirmation
    pub safety: SafetyConfig,
    /// Unix socket listener
    pub listen: ListenConfig,
}

/// General application settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Log level (trace, debug, info, warn, error)
    pub log_level: Option<String>,
}

/// Power supply backend and serial settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    /// Backend model ("kwr103" or "dummy")
    pub model: String,
    /// Serial port path
    pub port: String,
    /// Baud rate
    pub baud: u32,
    /// Time allowed for a reply line, in milliseconds
    pub timeout_ms: u64,
    /// Re-sends after a timeout
    pub max_retries: u32,
    /// Delay before a re-send, in milliseconds
    pub retry_delay_ms: u64,
    /// Treat a silent set command as acknowledged
    pub ack_on_silence: bool,
    /// Number of preset memory slots
    pub preset_slots: u8,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            model: "kwr103".to_string(),
            port: "/dev/ttyACM0".to_string(),
            baud: 9600,
            timeout_ms: 1000,
            max_retries: 1,
            retry_delay_ms: 0,
            ack_on_silence: true,
            preset_slots: DEFAULT_PRESET_SLOTS,
        }
    }
}

/// Safety confirmation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SafetyConfig {
    /// Ask for confirmation before allowing commands that change the output
    pub device_check: bool,
}

impl Default for SafetyConfig {
    fn default() -> Self {
        Self { device_check: true }
    }
}

/// Unix socket listener configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ListenConfig {
    /// Socket path; defaults to `$XDG_RUNTIME_DIR/.psu-rs.sock`
    pub socket_path: Option<PathBuf>,
}

impl ServerConfig {
    pub fn validate(&self) -> Result<(), String> {
        validate_log_level(self.general.log_level.as_deref())?;

        if self.device.model.trim().is_empty() {
            return Err("[device].model must not be empty".to_string());
        }
        if self.device.port.trim().is_empty() {
            return Err("[device].port must not be empty".to_string());
        }
        if self.device.baud == 0 {
            return Err("[device].baud must be > 0".to_string());
        }
        if self.device.timeout_ms == 0 {
            return Err("[device].timeout_ms must be > 0".to_string());
        }
        if self.device.preset_slots == 0 {
            return Err("[device].preset_slots must be > 0".to_string());
        }
        if let Some(path) = &self.listen.socket_path {
            if path.as_os_str().is_empty() {
                return Err("[listen].socket_path must not be empty".to_string());
            }
        }
        Ok(())
    }

    /// Socket path from config, or the per-user default.
    pub fn socket_path(&self) -> PathBuf {
        self.listen
            .socket_path
            .clone()
            .unwrap_or_else(default_socket_path)
    }

    pub fn access(&self) -> PsuAccessMethod {
        PsuAccessMethod::Serial {
            path: self.device.port.clone(),
            baud: self.device.baud,
        }
    }

    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            timeout: Duration::from_millis(self.device.timeout_ms),
            max_retries: self.device.max_retries,
            retry_delay: Duration::from_millis(self.device.retry_delay_ms),
            ack_on_silence: self.device.ack_on_silence,
            preset_slots: self.device.preset_slots,
        }
    }

    /// Gate for a session, given whether the operator confirmed at startup.
    pub fn safety_gate(&self, confirmed: bool) -> SafetyGate {
        match (self.safety.device_check, confirmed) {
            (false, _) => SafetyGate::disabled(),
            (true, true) => SafetyGate::confirmed(),
            (true, false) => SafetyGate::unconfirmed(),
        }
    }

    /// Generate an example configuration as a TOML string.
    pub fn example_toml() -> String {
        let example = ServerConfig {
            general: GeneralConfig {
                log_level: Some("info".to_string()),
            },
            device: DeviceConfig::default(),
            safety: SafetyConfig::default(),
            listen: ListenConfig {
                socket_path: Some(default_socket_path()),
            },
        };
        let wrapped = BTreeMap::from([(Self::section_key(), example)]);
        toml::to_string_pretty(&wrapped).unwrap_or_default()
    }
}

impl ConfigFile for ServerConfig {
    fn section_key() -> &'static str {
        "psu-server"
    }
}
