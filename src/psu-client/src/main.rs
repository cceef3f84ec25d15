// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

mod config;
mod dashboard;
mod guide;
mod monitor;
mod proxy;

use std::io::{self, IsTerminal};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{ArgGroup, Parser};
use tracing::{debug, warn};

use psu_app::{confirm_device, init_cli_logging, normalize_name, ConfigFile};
use psu_backend::RegistrationContext;
use psu_core::psu::controller::FixedPolling;
use psu_core::{DynResult, Payload, PsuCommand, PsuError, PsuResult};
use psu_server::config::ServerConfig;

use config::ClientConfig;
use proxy::{DirectFallback, PsuProxy};

const PKG_DESCRIPTION: &str = concat!(env!("CARGO_PKG_NAME"), " - PSU command line client");

#[derive(Debug, Parser)]
#[command(
    name = "psuctl",
    author = env!("CARGO_PKG_AUTHORS"),
    version = env!("CARGO_PKG_VERSION"),
    about = PKG_DESCRIPTION,
)]
#[command(group(
    ArgGroup::new("action")
        .required(true)
        .args([
            "get_all",
            "get_voltage_set",
            "get_voltage_out",
            "get_current_set",
            "get_current_out",
            "set_voltage",
            "set_current",
            "on",
            "off",
            "lock",
            "unlock",
            "save",
            "load",
            "idn",
            "monitor",
            "guide",
            "print_config",
        ]),
))]
struct Cli {
    /// Read set and output voltage and current
    #[arg(short = 'a', long = "get-all")]
    get_all: bool,
    /// Read configured voltage
    #[arg(long = "get-voltage-set")]
    get_voltage_set: bool,
    /// Read output voltage
    #[arg(long = "get-voltage-out")]
    get_voltage_out: bool,
    /// Read configured current
    #[arg(long = "get-current-set")]
    get_current_set: bool,
    /// Read output current
    #[arg(long = "get-current-out")]
    get_current_out: bool,
    /// Set output voltage
    #[arg(
        short = 'v',
        long = "set-voltage",
        value_name = "VOLTS",
        allow_negative_numbers = true
    )]
    set_voltage: Option<f64>,
    /// Set output current
    #[arg(
        short = 'i',
        long = "set-current",
        value_name = "AMPS",
        allow_negative_numbers = true
    )]
    set_current: Option<f64>,
    /// Enable output
    #[arg(short = 'o', long = "on")]
    on: bool,
    /// Disable output
    #[arg(short = 'f', long = "off")]
    off: bool,
    /// Lock front panel
    #[arg(short = 'l', long = "lock")]
    lock: bool,
    /// Unlock front panel
    #[arg(short = 'u', long = "unlock")]
    unlock: bool,
    /// Save settings to memory slot
    #[arg(short = 's', long = "save", value_name = "SLOT")]
    save: Option<u8>,
    /// Recall memory slot
    #[arg(short = 'r', long = "load", value_name = "SLOT")]
    load: Option<u8>,
    /// Query device identification (*IDN?)
    #[arg(short = 'n', long = "idn")]
    idn: bool,
    /// Live dashboard; starts psu-server in-process if none is running
    #[arg(short = 'm', long = "monitor")]
    monitor: bool,
    /// Show the safety guide and exit
    #[arg(long = "guide")]
    guide: bool,
    /// Print example configuration and exit
    #[arg(long = "print-config")]
    print_config: bool,

    /// Serial port (direct access and in-process server)
    #[arg(short = 'p', long = "port")]
    port: Option<String>,
    /// Baud rate
    #[arg(short = 'b', long = "baud")]
    baud: Option<u32>,
    /// Reply timeout in seconds
    #[arg(short = 't', long = "timeout", value_name = "SECONDS")]
    timeout: Option<f64>,
    /// PSU backend to use (kwr103, dummy)
    #[arg(long = "model")]
    model: Option<String>,
    /// Unix socket path of psu-server
    #[arg(long = "socket", value_name = "PATH")]
    socket: Option<PathBuf>,
    /// Skip safety confirmation (UNSAFE)
    #[arg(long = "no-device-check")]
    no_device_check: bool,
    /// Dashboard refresh interval in seconds
    #[arg(long = "refresh-interval", value_name = "SECONDS")]
    refresh_interval: Option<f64>,
    /// Path to configuration file
    #[arg(long = "config", short = 'C', value_name = "FILE")]
    config: Option<PathBuf>,
}

enum Action {
    Command(PsuCommand),
    Monitor,
}

fn secs_to_ms(flag: &str, secs: f64) -> DynResult<u64> {
    if !secs.is_finite() || secs <= 0.0 {
        return Err(format!("{} must be > 0 (got {})", flag, secs).into());
    }
    Ok((secs * 1000.0).round().max(1.0) as u64)
}

/// Merge CLI arguments over both configuration sections.
fn apply_cli(cli: &Cli, client: &mut ClientConfig, server: &mut ServerConfig) -> DynResult<()> {
    if let Some(model) = &cli.model {
        server.device.model = model.clone();
    }
    if let Some(port) = &cli.port {
        server.device.port = port.clone();
    }
    if let Some(baud) = cli.baud {
        server.device.baud = baud;
    }
    if let Some(secs) = cli.timeout {
        server.device.timeout_ms = secs_to_ms("--timeout", secs)?;
    }
    if let Some(secs) = cli.refresh_interval {
        client.monitor.refresh_interval_ms = secs_to_ms("--refresh-interval", secs)?;
    }
    if let Some(socket) = &cli.socket {
        client.connection.socket_path = Some(socket.clone());
    }
    // Talk to the socket the server section would listen on.
    if client.connection.socket_path.is_none() {
        client.connection.socket_path = server.listen.socket_path.clone();
    }
    server.listen.socket_path = Some(client.socket_path());
    if cli.no_device_check {
        server.safety.device_check = false;
    }
    Ok(())
}

fn action(cli: &Cli, slots: u8) -> PsuResult<Action> {
    let cmd = if cli.monitor {
        return Ok(Action::Monitor);
    } else if cli.get_all {
        PsuCommand::GetAll
    } else if cli.get_voltage_set {
        PsuCommand::GetVoltageSet
    } else if cli.get_voltage_out {
        PsuCommand::GetVoltageOut
    } else if cli.get_current_set {
        PsuCommand::GetCurrentSet
    } else if cli.get_current_out {
        PsuCommand::GetCurrentOut
    } else if let Some(volts) = cli.set_voltage {
        PsuCommand::set_voltage(volts)?
    } else if let Some(amps) = cli.set_current {
        PsuCommand::set_current(amps)?
    } else if cli.on {
        PsuCommand::On
    } else if cli.off {
        PsuCommand::Off
    } else if cli.lock {
        PsuCommand::Lock
    } else if cli.unlock {
        PsuCommand::Unlock
    } else if let Some(slot) = cli.save {
        PsuCommand::save(slot, slots)?
    } else if let Some(slot) = cli.load {
        PsuCommand::load(slot, slots)?
    } else if cli.idn {
        PsuCommand::Idn
    } else {
        return Err(PsuError::invalid_request("no command given"));
    };
    Ok(Action::Command(cmd))
}

fn format_value(cmd: &PsuCommand, value: f64) -> String {
    match cmd.unit() {
        "" => format!("{:.*}", cmd.precision(), value),
        unit => format!("{:.*} {}", cmd.precision(), value, unit),
    }
}

fn format_payload(cmd: &PsuCommand, payload: &Payload) -> String {
    match payload {
        Payload::Numeric { value } => format_value(cmd, *value),
        Payload::Text { value } => value.clone(),
        Payload::Unit => "OK".to_string(),
        Payload::Readings(r) => format!(
            "VSET: {}\nISET: {}\nVOUT: {}\nIOUT: {}",
            format_value(&PsuCommand::GetVoltageSet, r.voltage_set),
            format_value(&PsuCommand::GetCurrentSet, r.current_set),
            format_value(&PsuCommand::GetVoltageOut, r.voltage_out),
            format_value(&PsuCommand::GetCurrentOut, r.current_out),
        ),
    }
}

/// Ask the operator to confirm the device. Unconfirmed when stdin is not
/// interactive.
async fn interactive_confirmation(device_check: bool) -> DynResult<bool> {
    if !device_check {
        return Ok(false);
    }
    if !io::stdin().is_terminal() {
        warn!("stdin is not a terminal; cannot confirm the device");
        return Ok(false);
    }
    Ok(tokio::task::spawn_blocking(confirm_device).await??)
}

async fn run(cli: Cli) -> DynResult<()> {
    if cli.guide {
        let stdin = io::stdin();
        let paged = stdin.is_terminal();
        guide::show_guide(&mut stdin.lock(), &mut io::stdout(), paged)?;
        return Ok(());
    }
    if cli.print_config {
        println!("{}", ClientConfig::example_toml());
        println!("{}", ServerConfig::example_toml());
        return Ok(());
    }

    let (mut client_cfg, config_path) = ClientConfig::load_or_default(cli.config.as_deref())?;
    let (mut server_cfg, _) = ServerConfig::load_or_default(cli.config.as_deref())?;
    apply_cli(&cli, &mut client_cfg, &mut server_cfg)?;
    client_cfg
        .validate()
        .map_err(|e| format!("Invalid client configuration: {}", e))?;
    server_cfg
        .validate()
        .map_err(|e| format!("Invalid server configuration: {}", e))?;

    init_cli_logging(client_cfg.general.log_level.as_deref());
    if let Some(ref path) = config_path {
        debug!("Loaded configuration from {}", path.display());
    }

    let registry = RegistrationContext::with_builtin_backends();
    let model = normalize_name(&server_cfg.device.model);
    if !registry.is_backend_registered(&model) {
        return Err(format!(
            "Unknown PSU model: {} (available: {})",
            model,
            registry.registered_backends().join(", ")
        )
        .into());
    }
    server_cfg.device.model = model;
    let registry = Arc::new(registry);

    let proxy = PsuProxy::from_config(&client_cfg);
    match action(&cli, server_cfg.device.preset_slots)? {
        Action::Monitor => {
            let polling = FixedPolling::new(client_cfg.refresh_interval());
            let confirm = interactive_confirmation(server_cfg.safety.device_check);
            monitor::run_monitor(proxy, polling, &server_cfg, registry, confirm).await
        }
        Action::Command(cmd) => {
            let proxy = if proxy.server_available().await {
                proxy
            } else {
                let confirmed = cmd.is_mutating()
                    && interactive_confirmation(server_cfg.safety.device_check).await?;
                let fallback = DirectFallback::from_server_config(&server_cfg, registry, confirmed);
                debug!("Direct access with {:?}", fallback.gate());
                proxy.with_fallback(fallback)
            };
            let payload = proxy.call(&cmd).await?;
            println!("{}", format_payload(&cmd, &payload));
            Ok(())
        }
    }
}

fn exit_code(err: &(dyn std::error::Error + Send + Sync + 'static)) -> u8 {
    err.downcast_ref::<PsuError>()
        .and_then(|e| u8::try_from(e.kind.exit_code()).ok())
        .unwrap_or(1)
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            return if e.use_stderr() {
                ExitCode::FAILURE
            } else {
                ExitCode::SUCCESS
            };
        }
    };

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {}", err);
            ExitCode::from(exit_code(err.as_ref()))
        }
    }
}
