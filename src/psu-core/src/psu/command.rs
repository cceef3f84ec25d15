// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

use std::fmt;

use crate::psu::response::{PsuError, PsuResult};

/// Number of preset memory slots on the RND 320-KWR103 (M1..M5).
pub const DEFAULT_PRESET_SLOTS: u8 = 5;

/// Command executed against the power supply.
#[derive(Debug, Clone, PartialEq)]
pub enum PsuCommand {
    GetVoltageSet,
    GetVoltageOut,
    GetCurrentSet,
    GetCurrentOut,
    /// Batch of the four Get commands, executed back to back.
    GetAll,
    SetVoltage(f64),
    SetCurrent(f64),
    On,
    Off,
    Lock,
    Unlock,
    Save(u8),
    Load(u8),
    Idn,
}

/// Shape of the reply a command expects from the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyShape {
    /// Single decimal token.
    Numeric,
    /// Free-form text line.
    Text,
    /// Empty line or `OK`.
    Ack,
}

impl PsuCommand {
    /// Build a `SetVoltage` command, rejecting negative or non-finite values.
    pub fn set_voltage(volts: f64) -> PsuResult<Self> {
        check_level("voltage", volts)?;
        Ok(Self::SetVoltage(volts))
    }

    /// Build a `SetCurrent` command, rejecting negative or non-finite values.
    pub fn set_current(amps: f64) -> PsuResult<Self> {
        check_level("current", amps)?;
        Ok(Self::SetCurrent(amps))
    }

    /// Build a `Save` command for a slot in `1..=slots`.
    pub fn save(slot: u8, slots: u8) -> PsuResult<Self> {
        check_slot(slot, slots)?;
        Ok(Self::Save(slot))
    }

    /// Build a `Load` command for a slot in `1..=slots`.
    pub fn load(slot: u8, slots: u8) -> PsuResult<Self> {
        check_slot(slot, slots)?;
        Ok(Self::Load(slot))
    }

    /// Re-check the parameters of an already constructed command.
    pub fn validate(&self, slots: u8) -> PsuResult<()> {
        match self {
            Self::SetVoltage(v) => check_level("voltage", *v),
            Self::SetCurrent(i) => check_level("current", *i),
            Self::Save(slot) | Self::Load(slot) => check_slot(*slot, slots),
            _ => Ok(()),
        }
    }

    /// Commands that change device state and are subject to the safety gate.
    pub fn is_mutating(&self) -> bool {
        matches!(
            self,
            Self::SetVoltage(_)
                | Self::SetCurrent(_)
                | Self::On
                | Self::Off
                | Self::Save(_)
                | Self::Load(_)
                | Self::Unlock
        )
    }

    pub fn reply_shape(&self) -> ReplyShape {
        match self {
            Self::GetVoltageSet
            | Self::GetVoltageOut
            | Self::GetCurrentSet
            | Self::GetCurrentOut
            | Self::GetAll => ReplyShape::Numeric,
            Self::Idn => ReplyShape::Text,
            Self::SetVoltage(_)
            | Self::SetCurrent(_)
            | Self::On
            | Self::Off
            | Self::Lock
            | Self::Unlock
            | Self::Save(_)
            | Self::Load(_) => ReplyShape::Ack,
        }
    }

    /// Members of a batch command, in execution order.
    pub fn batch(&self) -> Option<[PsuCommand; 4]> {
        match self {
            Self::GetAll => Some([
                Self::GetVoltageSet,
                Self::GetCurrentSet,
                Self::GetVoltageOut,
                Self::GetCurrentOut,
            ]),
            _ => None,
        }
    }

    /// Decimal places used when printing a value read by this command.
    pub fn precision(&self) -> usize {
        match self {
            Self::GetCurrentSet | Self::GetCurrentOut | Self::SetCurrent(_) => 3,
            _ => 2,
        }
    }

    /// Unit suffix for values read by this command.
    pub fn unit(&self) -> &'static str {
        match self {
            Self::GetVoltageSet | Self::GetVoltageOut | Self::SetVoltage(_) => "V",
            Self::GetCurrentSet | Self::GetCurrentOut | Self::SetCurrent(_) => "A",
            _ => "",
        }
    }
}

impl fmt::Display for PsuCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::GetVoltageSet => write!(f, "get-voltage-set"),
            Self::GetVoltageOut => write!(f, "get-voltage-out"),
            Self::GetCurrentSet => write!(f, "get-current-set"),
            Self::GetCurrentOut => write!(f, "get-current-out"),
            Self::GetAll => write!(f, "get-all"),
            Self::SetVoltage(v) => write!(f, "set-voltage {:.2}", v),
            Self::SetCurrent(i) => write!(f, "set-current {:.3}", i),
            Self::On => write!(f, "on"),
            Self::Off => write!(f, "off"),
            Self::Lock => write!(f, "lock"),
            Self::Unlock => write!(f, "unlock"),
            Self::Save(slot) => write!(f, "save {}", slot),
            Self::Load(slot) => write!(f, "load {}", slot),
            Self::Idn => write!(f, "idn"),
        }
    }
}

fn check_level(what: &str, value: f64) -> PsuResult<()> {
    if !value.is_finite() || value < 0.0 {
        return Err(PsuError::invalid_request(format!(
            "{what} must be a non-negative number (got {value})"
        )));
    }
    Ok(())
}

fn check_slot(slot: u8, slots: u8) -> PsuResult<()> {
    if slot == 0 || slot > slots {
        return Err(PsuError::invalid_request(format!(
            "preset slot must be in 1..={slots} (got {slot})"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::psu::response::ErrorKind;

    #[test]
    fn mutating_commands_are_classified() {
        let mutating = [
            PsuCommand::SetVoltage(1.0),
            PsuCommand::SetCurrent(0.5),
            PsuCommand::On,
            PsuCommand::Off,
            PsuCommand::Save(1),
            PsuCommand::Load(2),
            PsuCommand::Unlock,
        ];
        for cmd in &mutating {
            assert!(cmd.is_mutating(), "{cmd} should be mutating");
        }

        let read_only = [
            PsuCommand::GetVoltageSet,
            PsuCommand::GetVoltageOut,
            PsuCommand::GetCurrentSet,
            PsuCommand::GetCurrentOut,
            PsuCommand::GetAll,
            PsuCommand::Lock,
            PsuCommand::Idn,
        ];
        for cmd in &read_only {
            assert!(!cmd.is_mutating(), "{cmd} should not be mutating");
        }
    }

    #[test]
    fn set_voltage_rejects_negative_and_nan() {
        assert!(PsuCommand::set_voltage(12.5).is_ok());
        assert!(PsuCommand::set_voltage(0.0).is_ok());
        let err = PsuCommand::set_voltage(-1.0).unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidRequest);
        assert!(PsuCommand::set_current(f64::NAN).is_err());
        assert!(PsuCommand::set_current(f64::INFINITY).is_err());
    }

    #[test]
    fn slots_are_bounded_by_preset_count() {
        assert!(PsuCommand::save(1, DEFAULT_PRESET_SLOTS).is_ok());
        assert!(PsuCommand::load(5, DEFAULT_PRESET_SLOTS).is_ok());
        assert!(PsuCommand::save(0, DEFAULT_PRESET_SLOTS).is_err());
        assert!(PsuCommand::load(6, DEFAULT_PRESET_SLOTS).is_err());
        assert!(PsuCommand::Load(9).validate(DEFAULT_PRESET_SLOTS).is_err());
    }

    #[test]
    fn get_all_expands_to_four_reads() {
        let batch = PsuCommand::GetAll.batch().expect("get-all is a batch");
        assert!(batch.iter().all(|c| c.reply_shape() == ReplyShape::Numeric));
        assert!(batch.iter().all(|c| c.batch().is_none()));
        assert!(PsuCommand::Idn.batch().is_none());
    }
}
