// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! JSON line protocol between `psuctl` and `psu-server`.
//!
//! This crate provides the wire DTOs, the mapping between them and PSU
//! commands/results, and size-limited line framing shared by both ends.

pub mod codec;
pub mod framing;
pub mod mapping;
pub mod types;

// Re-export commonly used items
pub use codec::{encode_line, parse_request, parse_response};
pub use framing::{read_limited_line, MAX_LINE_BYTES};
pub use mapping::{command_to_request, request_to_command, response_to_result, result_to_response};
pub use types::{ClientRequest, ClientResponse};
