// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

use tracing::Level;
use tracing_subscriber::FmtSubscriber;

fn parse_level(log_level: Option<&str>, fallback: Level) -> Level {
    log_level
        .and_then(|s| s.parse::<Level>().ok())
        .unwrap_or(fallback)
}

/// Initialize logging with optional level from config.
/// Falls back to INFO if level is None or invalid.
pub fn init_logging(log_level: Option<&str>) {
    FmtSubscriber::builder()
        .with_target(false)
        .with_max_level(parse_level(log_level, Level::INFO))
        .init();
}

/// Initialize logging for interactive tools.
///
/// Writes to stderr so stdout carries only results and the dashboard.
/// Falls back to WARN if level is None or invalid.
pub fn init_cli_logging(log_level: Option<&str>) {
    FmtSubscriber::builder()
        .with_target(false)
        .with_writer(std::io::stderr)
        .with_max_level(parse_level(log_level, Level::WARN))
        .init();
}
