// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

pub mod psu;

pub type DynResult<T> = Result<T, Box<dyn std::error::Error + Send + Sync>>;

pub use psu::command::PsuCommand;
pub use psu::controller::{DeviceSession, SafetyGate, SessionConfig};
pub use psu::request::PsuRequest;
pub use psu::response::{ErrorKind, Payload, PsuError, PsuResult, Readings};
pub use psu::state::DeviceState;
pub use psu::{LinkInfo, PsuAccessMethod, PsuTransport};
