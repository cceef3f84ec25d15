// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

use std::io::IsTerminal;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio::signal;
use tracing::{info, warn};

use psu_app::{confirm_device, init_logging, normalize_name, ConfigFile};
use psu_backend::RegistrationContext;
use psu_core::DynResult;
use psu_server::config::ServerConfig;
use psu_server::{task_config, ServerHandle};

const PKG_DESCRIPTION: &str = concat!(env!("CARGO_PKG_NAME"), " - PSU arbitration daemon");

#[derive(Debug, Parser)]
#[command(
    author = env!("CARGO_PKG_AUTHORS"),
    version = env!("CARGO_PKG_VERSION"),
    about = PKG_DESCRIPTION,
)]
struct Cli {
    /// Path to configuration file
    #[arg(long = "config", short = 'C', value_name = "FILE")]
    config: Option<PathBuf>,
    /// Print example configuration and exit
    #[arg(long = "print-config")]
    print_config: bool,
    /// PSU backend to use (kwr103, dummy)
    #[arg(short = 'm', long = "model")]
    model: Option<String>,
    /// Serial port
    #[arg(short = 'p', long = "port")]
    port: Option<String>,
    /// Baud rate
    #[arg(short = 'b', long = "baud")]
    baud: Option<u32>,
    /// Reply timeout in seconds
    #[arg(short = 't', long = "timeout", value_name = "SECONDS")]
    timeout: Option<f64>,
    /// Unix socket path
    #[arg(short = 's', long = "socket", value_name = "PATH")]
    socket: Option<PathBuf>,
    /// Skip safety confirmation (UNSAFE)
    #[arg(long = "no-device-check")]
    no_device_check: bool,
}

/// Merge CLI arguments over the loaded configuration.
fn apply_cli(cli: &Cli, cfg: &mut ServerConfig) -> DynResult<()> {
    if let Some(model) = &cli.model {
        cfg.device.model = model.clone();
    }
    if let Some(port) = &cli.port {
        cfg.device.port = port.clone();
    }
    if let Some(baud) = cli.baud {
        cfg.device.baud = baud;
    }
    if let Some(secs) = cli.timeout {
        if !secs.is_finite() || secs <= 0.0 {
            return Err(format!("--timeout must be > 0 (got {})", secs).into());
        }
        cfg.device.timeout_ms = (secs * 1000.0).round().max(1.0) as u64;
    }
    if let Some(socket) = &cli.socket {
        cfg.listen.socket_path = Some(socket.clone());
    }
    if cli.no_device_check {
        cfg.safety.device_check = false;
    }
    Ok(())
}

/// Ask the operator to confirm the device; unconfirmed when stdin is not
/// interactive or the answer is wrong.
async fn startup_confirmation(cfg: &ServerConfig) -> DynResult<bool> {
    if !cfg.safety.device_check {
        warn!("Device check disabled; all commands are allowed");
        return Ok(false);
    }
    if !std::io::stdin().is_terminal() {
        warn!("stdin is not a terminal; running unconfirmed (read-only)");
        return Ok(false);
    }
    let confirmed = tokio::task::spawn_blocking(confirm_device).await??;
    if !confirmed {
        warn!("Device not confirmed; commands that change the output will be refused");
    }
    Ok(confirmed)
}

#[tokio::main]
async fn main() -> DynResult<()> {
    let cli = Cli::parse();

    if cli.print_config {
        println!("{}", ServerConfig::example_toml());
        return Ok(());
    }

    let (mut cfg, config_path) = ServerConfig::load(cli.config.as_deref())?;
    apply_cli(&cli, &mut cfg)?;
    cfg.validate()
        .map_err(|e| format!("Invalid server configuration: {}", e))?;

    init_logging(cfg.general.log_level.as_deref());

    if let Some(ref path) = config_path {
        info!("Loaded configuration from {}", path.display());
    }

    let registry = RegistrationContext::with_builtin_backends();
    let model = normalize_name(&cfg.device.model);
    if !registry.is_backend_registered(&model) {
        return Err(format!(
            "Unknown PSU model: {} (available: {})",
            model,
            registry.registered_backends().join(", ")
        )
        .into());
    }
    cfg.device.model = model;

    info!(
        "Starting psu-server (model: {}, serial {} @ {} baud, timeout {} ms)",
        cfg.device.model, cfg.device.port, cfg.device.baud, cfg.device.timeout_ms
    );

    let confirmed = startup_confirmation(&cfg).await?;
    let task = task_config(&cfg, Arc::new(registry), confirmed);
    let server = ServerHandle::start(cfg.socket_path(), task)?;

    signal::ctrl_c().await?;
    info!("Ctrl+C received, shutting down");
    server.shutdown().await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_overrides_config() {
        let cli = Cli::parse_from([
            "psu-server",
            "-m",
            "dummy",
            "-p",
            "/dev/ttyACM3",
            "-b",
            "19200",
            "-t",
            "0.25",
            "-s",
            "/tmp/x.sock",
            "--no-device-check",
        ]);
        let mut cfg = ServerConfig::default();
        apply_cli(&cli, &mut cfg).unwrap();
        assert_eq!(cfg.device.model, "dummy");
        assert_eq!(cfg.device.port, "/dev/ttyACM3");
        assert_eq!(cfg.device.baud, 19200);
        assert_eq!(cfg.device.timeout_ms, 250);
        assert_eq!(cfg.socket_path(), PathBuf::from("/tmp/x.sock"));
        assert!(!cfg.safety.device_check);
    }

    #[test]
    fn rejects_non_positive_timeout() {
        let cli = Cli::parse_from(["psu-server", "-t", "0"]);
        let mut cfg = ServerConfig::default();
        assert!(apply_cli(&cli, &mut cfg).is_err());
    }
}
