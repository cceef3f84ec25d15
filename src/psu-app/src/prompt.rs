// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Interactive device confirmation.
//!
//! Raw commands are sent without identifying the device, so the operator is
//! asked to confirm once before any command can change the output.

use std::io::{self, BufRead, Write};

/// Supplies this tool has been exercised against.
pub const TESTED_DEVICES: &[&str] = &["RND 320-KWR103"];

/// Word the operator must type.
const CONFIRM_WORD: &str = "confirm";

/// Ask on `output`, read the answer from `input`.
pub fn confirm_device_with<R: BufRead, W: Write>(input: &mut R, output: &mut W) -> io::Result<bool> {
    writeln!(output, "\nWARNING:")?;
    writeln!(output, "This program sends raw serial commands to a power supply.")?;
    writeln!(output, "It has ONLY been tested on the following devices:\n")?;
    for dev in TESTED_DEVICES {
        writeln!(output, "  - {}", dev)?;
    }
    writeln!(output, "\nUsing it with any other device may be unsafe.")?;
    writeln!(output, "Check your device manual before continuing.\n")?;
    writeln!(output, "If you are sure you want to continue, type: {}", CONFIRM_WORD)?;
    write!(output, "> ")?;
    output.flush()?;

    let mut answer = String::new();
    input.read_line(&mut answer)?;
    if answer.trim() != CONFIRM_WORD {
        writeln!(output, "Aborted.")?;
        return Ok(false);
    }
    writeln!(output, "\nConfirmed.")?;
    writeln!(
        output,
        "Tip: to skip this confirmation in the future, use --no-device-check\n"
    )?;
    Ok(true)
}

/// Ask on stderr, read the answer from stdin. Blocks the calling thread.
pub fn confirm_device() -> io::Result<bool> {
    let stdin = io::stdin();
    let mut input = stdin.lock();
    let mut output = io::stderr();
    confirm_device_with(&mut input, &mut output)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_exact_word() {
        let mut input = io::Cursor::new(b"confirm\n".to_vec());
        let mut output = Vec::new();
        assert!(confirm_device_with(&mut input, &mut output).unwrap());
        let text = String::from_utf8(output).unwrap();
        assert!(text.contains("RND 320-KWR103"));
        assert!(text.contains("Confirmed."));
    }

    #[test]
    fn rejects_anything_else() {
        for answer in ["yes\n", "Confirm\n", "\n", ""] {
            let mut input = io::Cursor::new(answer.as_bytes().to_vec());
            let mut output = Vec::new();
            assert!(!confirm_device_with(&mut input, &mut output).unwrap());
        }
    }
}
