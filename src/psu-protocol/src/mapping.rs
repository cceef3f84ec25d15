// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Bidirectional mapping between wire DTOs and PSU commands/results.

use psu_core::{Payload, PsuCommand, PsuError, PsuResult};

use crate::types::{ClientRequest, ClientResponse};

/// Convert a PsuCommand into the request sent over the socket.
pub fn command_to_request(cmd: &PsuCommand) -> ClientRequest {
    let (command, args) = match cmd {
        PsuCommand::GetVoltageSet => ("get_voltage_set", vec![]),
        PsuCommand::GetVoltageOut => ("get_voltage_out", vec![]),
        PsuCommand::GetCurrentSet => ("get_current_set", vec![]),
        PsuCommand::GetCurrentOut => ("get_current_out", vec![]),
        PsuCommand::GetAll => ("get_all", vec![]),
        PsuCommand::SetVoltage(v) => ("set_voltage", vec![*v]),
        PsuCommand::SetCurrent(i) => ("set_current", vec![*i]),
        PsuCommand::On => ("on", vec![]),
        PsuCommand::Off => ("off", vec![]),
        PsuCommand::Lock => ("lock", vec![]),
        PsuCommand::Unlock => ("unlock", vec![]),
        PsuCommand::Save(slot) => ("save", vec![f64::from(*slot)]),
        PsuCommand::Load(slot) => ("load", vec![f64::from(*slot)]),
        PsuCommand::Idn => ("idn", vec![]),
    };
    ClientRequest {
        command: command.to_string(),
        args,
    }
}

/// Convert a request from the socket into a PsuCommand.
///
/// Checks the argument count and numeric domain; slot bounds are checked by
/// the session, which knows the preset count.
pub fn request_to_command(req: &ClientRequest) -> PsuResult<PsuCommand> {
    let arity = match req.command.as_str() {
        "set_voltage" | "set_current" | "save" | "load" => 1,
        _ => 0,
    };
    if req.args.len() != arity {
        return Err(PsuError::invalid_request(format!(
            "{} takes {} argument(s), got {}",
            req.command,
            arity,
            req.args.len()
        )));
    }

    match req.command.as_str() {
        "get_voltage_set" => Ok(PsuCommand::GetVoltageSet),
        "get_voltage_out" => Ok(PsuCommand::GetVoltageOut),
        "get_current_set" => Ok(PsuCommand::GetCurrentSet),
        "get_current_out" => Ok(PsuCommand::GetCurrentOut),
        "get_all" => Ok(PsuCommand::GetAll),
        "set_voltage" => PsuCommand::set_voltage(req.args[0]),
        "set_current" => PsuCommand::set_current(req.args[0]),
        "on" => Ok(PsuCommand::On),
        "off" => Ok(PsuCommand::Off),
        "lock" => Ok(PsuCommand::Lock),
        "unlock" => Ok(PsuCommand::Unlock),
        "save" => slot_arg(req.args[0]).map(PsuCommand::Save),
        "load" => slot_arg(req.args[0]).map(PsuCommand::Load),
        "idn" => Ok(PsuCommand::Idn),
        other => Err(PsuError::invalid_request(format!(
            "unknown command '{}'",
            other
        ))),
    }
}

fn slot_arg(value: f64) -> PsuResult<u8> {
    if value.fract() != 0.0 || !(1.0..=f64::from(u8::MAX)).contains(&value) {
        return Err(PsuError::invalid_request(format!(
            "slot must be a positive integer (got {})",
            value
        )));
    }
    Ok(value as u8)
}

/// Convert a session result into the response written to the socket.
pub fn result_to_response(result: PsuResult<Payload>) -> ClientResponse {
    match result {
        Ok(payload) => ClientResponse::Ok { payload },
        Err(err) => ClientResponse::Error {
            error_kind: err.kind,
            message: err.message,
        },
    }
}

/// Convert a response read from the socket back into a result.
pub fn response_to_result(resp: ClientResponse) -> PsuResult<Payload> {
    match resp {
        ClientResponse::Ok { payload } => Ok(payload),
        ClientResponse::Error {
            error_kind,
            message,
        } => Err(PsuError::new(error_kind, message)),
    }
}
