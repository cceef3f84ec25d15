// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Transport DTOs for the JSON line protocol.

use serde::{Deserialize, Serialize};

use psu_core::{ErrorKind, Payload};

/// Request received from clients: `{"command": "set_voltage", "args": [12.5]}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientRequest {
    pub command: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<f64>,
}

/// Response sent back to clients, one per request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ClientResponse {
    Ok {
        payload: Payload,
    },
    Error {
        error_kind: ErrorKind,
        message: String,
    },
}
