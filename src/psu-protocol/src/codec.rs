// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Parsing and formatting of JSON lines.

use serde::Serialize;

use psu_core::{PsuError, PsuResult};

use crate::types::{ClientRequest, ClientResponse};

/// Parse one line into a ClientRequest.
///
/// Malformed JSON is reported as `InvalidRequest` so the server can answer
/// without touching the device.
pub fn parse_request(input: &str) -> PsuResult<ClientRequest> {
    serde_json::from_str::<ClientRequest>(input.trim())
        .map_err(|e| PsuError::invalid_request(format!("malformed request: {}", e)))
}

/// Parse one line into a ClientResponse.
pub fn parse_response(input: &str) -> Result<ClientResponse, serde_json::Error> {
    serde_json::from_str::<ClientResponse>(input.trim())
}

/// Serialize a value as a single JSON line, newline included.
pub fn encode_line<T: Serialize>(value: &T) -> Result<String, serde_json::Error> {
    let mut line = serde_json::to_string(value)?;
    line.push('\n');
    Ok(line)
}
