// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

use std::fmt;

use serde::{Deserialize, Serialize};

/// Category of a failed PSU request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// No complete reply within the session timeout (after retries).
    Timeout,
    /// Serial port unavailable, write failure, EOF or socket failure.
    TransportError,
    /// Reply did not match the shape the command expects.
    ProtocolMismatch,
    /// Mutating command refused because the safety gate was not confirmed.
    Unconfirmed,
    /// Request could not be turned into a valid command.
    InvalidRequest,
}

impl ErrorKind {
    /// Process exit code used by `psuctl` when a request fails with this kind.
    pub fn exit_code(self) -> i32 {
        match self {
            ErrorKind::Timeout => 3,
            ErrorKind::TransportError => 4,
            ErrorKind::ProtocolMismatch => 5,
            ErrorKind::Unconfirmed => 6,
            ErrorKind::InvalidRequest => 7,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::Timeout => "timeout",
            ErrorKind::TransportError => "transport_error",
            ErrorKind::ProtocolMismatch => "protocol_mismatch",
            ErrorKind::Unconfirmed => "unconfirmed",
            ErrorKind::InvalidRequest => "invalid_request",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error type returned by PSU requests.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, Serialize, Deserialize)]
#[error("{kind}: {message}")]
pub struct PsuError {
    pub kind: ErrorKind,
    pub message: String,
}

pub type PsuResult<T> = Result<T, PsuError>;

impl PsuError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Timeout, message)
    }

    pub fn transport(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::TransportError, message)
    }

    pub fn protocol_mismatch(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ProtocolMismatch, message)
    }

    pub fn unconfirmed(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Unconfirmed, message)
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidRequest, message)
    }

    /// Only timeouts are worth re-sending; everything else is final.
    pub fn is_transient(&self) -> bool {
        self.kind == ErrorKind::Timeout
    }
}

/// The four readings returned by a `GetAll` batch.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Readings {
    pub voltage_set: f64,
    pub current_set: f64,
    pub voltage_out: f64,
    pub current_out: f64,
}

/// Successful result of a PSU request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Payload {
    Numeric { value: f64 },
    Text { value: String },
    Unit,
    Readings(Readings),
}

impl Payload {
    pub fn as_numeric(&self) -> Option<f64> {
        match self {
            Payload::Numeric { value } => Some(*value),
            _ => None,
        }
    }
}
