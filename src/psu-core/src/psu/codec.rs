// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Wire codec for the RND 320-KWR103 ASCII command set.
//!
//! Commands are single lines terminated by CR LF. Queries answer with one
//! line; set commands answer with nothing or `OK`.

use crate::psu::command::{PsuCommand, ReplyShape};
use crate::psu::response::{Payload, PsuError, PsuResult};

/// Line terminator appended to every command.
pub const COMMAND_TERMINATOR: &[u8] = b"\r\n";

/// Byte that ends a device reply.
pub const REPLY_TERMINATOR: u8 = b'\n';

fn wire_text(cmd: &PsuCommand) -> PsuResult<String> {
    let text = match cmd {
        PsuCommand::GetVoltageSet => "VSET?".to_string(),
        PsuCommand::GetCurrentSet => "ISET?".to_string(),
        PsuCommand::GetVoltageOut => "VOUT?".to_string(),
        PsuCommand::GetCurrentOut => "IOUT?".to_string(),
        PsuCommand::SetVoltage(v) => format!("VSET:{:.2}", v),
        PsuCommand::SetCurrent(i) => format!("ISET:{:.3}", i),
        PsuCommand::On => "OUT:1".to_string(),
        PsuCommand::Off => "OUT:0".to_string(),
        PsuCommand::Lock => "LOCK:1".to_string(),
        PsuCommand::Unlock => "LOCK:0".to_string(),
        PsuCommand::Save(slot) => format!("SAV:{}", slot),
        PsuCommand::Load(slot) => format!("RCL:{}", slot),
        PsuCommand::Idn => "*IDN?".to_string(),
        PsuCommand::GetAll => {
            return Err(PsuError::invalid_request(
                "get-all is a batch and has no single wire form",
            ))
        }
    };
    Ok(text)
}

/// Encode a command into the bytes written to the device.
pub fn encode(cmd: &PsuCommand) -> PsuResult<Vec<u8>> {
    let mut bytes = wire_text(cmd)?.into_bytes();
    bytes.extend_from_slice(COMMAND_TERMINATOR);
    Ok(bytes)
}

/// Strip line endings, surrounding whitespace and NUL padding.
fn clean(raw: &[u8]) -> PsuResult<&str> {
    let text = std::str::from_utf8(raw)
        .map_err(|_| PsuError::protocol_mismatch("reply is not valid ASCII"))?;
    Ok(text.trim_matches(|c: char| c.is_whitespace() || c == '\0'))
}

/// Decode the raw reply to `cmd`.
pub fn decode(cmd: &PsuCommand, raw: &[u8]) -> PsuResult<Payload> {
    if matches!(cmd, PsuCommand::GetAll) {
        return Err(PsuError::invalid_request(
            "get-all replies are decoded per member command",
        ));
    }
    let text = clean(raw)?;
    match cmd.reply_shape() {
        ReplyShape::Numeric => decode_numeric(cmd, text),
        ReplyShape::Text => {
            if text.is_empty() {
                Err(PsuError::protocol_mismatch(format!(
                    "empty reply to {}",
                    cmd
                )))
            } else {
                Ok(Payload::Text {
                    value: text.to_string(),
                })
            }
        }
        ReplyShape::Ack => {
            if text.is_empty() || text.eq_ignore_ascii_case("OK") {
                Ok(Payload::Unit)
            } else {
                Err(PsuError::protocol_mismatch(format!(
                    "unexpected reply to {}: {:?}",
                    cmd, text
                )))
            }
        }
    }
}

fn decode_numeric(cmd: &PsuCommand, text: &str) -> PsuResult<Payload> {
    let mut tokens = text.split_whitespace();
    let (Some(token), None) = (tokens.next(), tokens.next()) else {
        return Err(PsuError::protocol_mismatch(format!(
            "expected one number in reply to {}, got {:?}",
            cmd, text
        )));
    };
    match token.parse::<f64>() {
        Ok(value) if value.is_finite() => Ok(Payload::Numeric { value }),
        _ => Err(PsuError::protocol_mismatch(format!(
            "non-numeric reply to {}: {:?}",
            cmd, token
        ))),
    }
}
