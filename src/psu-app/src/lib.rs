// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

pub mod config;
pub mod logging;
pub mod prompt;
pub mod util;

pub use config::{ConfigError, ConfigFile};
pub use logging::{init_cli_logging, init_logging};
pub use prompt::{confirm_device, confirm_device_with, TESTED_DEVICES};
pub use util::{default_socket_path, normalize_name, validate_log_level};
