// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

use crate::psu::response::{Payload, PsuError, PsuResult, Readings};

/// Point-in-time view of the supply, built from one `GetAll` batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceState {
    pub voltage_set: f64,
    pub current_set: f64,
    pub voltage_out: f64,
    pub current_out: f64,
    /// Inferred from a non-zero output voltage.
    pub output_on: bool,
    pub timestamp: DateTime<Local>,
}

impl DeviceState {
    pub fn from_readings(readings: Readings, timestamp: DateTime<Local>) -> Self {
        Self {
            voltage_set: readings.voltage_set,
            current_set: readings.current_set,
            voltage_out: readings.voltage_out,
            current_out: readings.current_out,
            output_on: readings.voltage_out > 0.0,
            timestamp,
        }
    }

    /// Build a snapshot stamped with the current local time.
    pub fn capture(readings: Readings) -> Self {
        Self::from_readings(readings, Local::now())
    }

    /// Build a snapshot from a `GetAll` payload.
    pub fn from_payload(payload: &Payload) -> PsuResult<Self> {
        match payload {
            Payload::Readings(readings) => Ok(Self::capture(*readings)),
            other => Err(PsuError::protocol_mismatch(format!(
                "expected readings, got {:?}",
                other
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn readings(voltage_out: f64) -> Readings {
        Readings {
            voltage_set: 5.0,
            current_set: 0.5,
            voltage_out,
            current_out: 0.12,
        }
    }

    #[test]
    fn output_on_follows_output_voltage() {
        assert!(DeviceState::capture(readings(4.99)).output_on);
        assert!(!DeviceState::capture(readings(0.0)).output_on);
    }

    #[test]
    fn from_payload_rejects_scalar() {
        let err = DeviceState::from_payload(&Payload::Numeric { value: 1.0 }).unwrap_err();
        assert_eq!(err.kind, crate::ErrorKind::ProtocolMismatch);
        let state = DeviceState::from_payload(&Payload::Readings(readings(5.0))).unwrap();
        assert_eq!(state.voltage_set, 5.0);
        assert_eq!(state.current_out, 0.12);
    }
}
