// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

use crate::psu::command::PsuCommand;
use crate::psu::response::{PsuError, PsuResult};

/// Refuses mutating commands until the operator has confirmed the device.
///
/// Fixed when a session is built; there is no way to flip it afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SafetyGate {
    pub enabled: bool,
    pub confirmed: bool,
}

impl Default for SafetyGate {
    fn default() -> Self {
        Self::unconfirmed()
    }
}

impl SafetyGate {
    /// Gate turned off (`--no-device-check`).
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            confirmed: false,
        }
    }

    /// Gate on, operator has not confirmed.
    pub fn unconfirmed() -> Self {
        Self {
            enabled: true,
            confirmed: false,
        }
    }

    /// Gate on, operator typed the confirmation.
    pub fn confirmed() -> Self {
        Self {
            enabled: true,
            confirmed: true,
        }
    }

    pub fn allows(&self, cmd: &PsuCommand) -> bool {
        !self.enabled || self.confirmed || !cmd.is_mutating()
    }

    pub fn check(&self, cmd: &PsuCommand) -> PsuResult<()> {
        if self.allows(cmd) {
            Ok(())
        } else {
            Err(PsuError::unconfirmed(format!(
                "{} changes the supply output and the device was not confirmed",
                cmd
            )))
        }
    }
}
