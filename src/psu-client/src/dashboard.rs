// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Text dashboard for `psuctl --monitor`.

use std::fmt::Write;
use std::time::Duration;

use psu_core::{DeviceState, ErrorKind, PsuError};

const CLEAR_SCREEN: &str = "\x1b[2J\x1b[H";
const TOP_RULE: &str =
    "================================= PSU =================================";
const BOTTOM_RULE: &str =
    "=======================================================================";

/// What the last poll produced.
#[derive(Debug, Clone, Copy)]
pub enum PollStatus<'a> {
    Fresh,
    /// The poll failed; the state shown, if any, is from an earlier poll.
    Failed(&'a PsuError),
}

fn value(reading: Option<f64>, precision: usize) -> String {
    match reading {
        Some(v) => format!("{:.*}", precision, v),
        None => "?".to_string(),
    }
}

fn refresh_secs(interval: Duration) -> String {
    let secs = interval.as_secs_f64();
    if secs.fract() == 0.0 {
        format!("{}", secs as u64)
    } else {
        format!("{}", secs)
    }
}

/// Render one dashboard frame, starting with a clear-screen sequence.
pub fn render(state: Option<&DeviceState>, status: PollStatus<'_>, interval: Duration) -> String {
    let mut out = String::from(CLEAR_SCREEN);

    let vset = value(state.map(|s| s.voltage_set), 2);
    let vout = value(state.map(|s| s.voltage_out), 2);
    let iset = value(state.map(|s| s.current_set), 3);
    let iout = value(state.map(|s| s.current_out), 3);
    let output = match state {
        Some(s) if s.output_on => "ON",
        Some(_) => "OFF",
        None => "?",
    };

    let _ = writeln!(out, "{}", TOP_RULE);
    let _ = writeln!(
        out,
        "  VSET: {:<8} V                          VOUT: {:<8} V",
        vset, vout
    );
    let _ = writeln!(
        out,
        "  ISET: {:<8} A                          IOUT: {:<8} A\n",
        iset, iout
    );
    let _ = writeln!(out, "                   OUTPUT: {:<3}      MEM: -", output);
    let _ = writeln!(out, "{}", BOTTOM_RULE);

    if let Some(s) = state {
        let _ = writeln!(out, "Last update: {}", s.timestamp.format("%Y-%m-%d %H:%M:%S"));
    }
    if let PollStatus::Failed(err) = status {
        let label = match err.kind {
            ErrorKind::TransportError => "DISCONNECTED",
            _ => "STALE",
        };
        let _ = writeln!(out, "{}: {}", label, err);
    }
    let _ = writeln!(
        out,
        "Refreshing every {} seconds...  (Ctrl+C to stop)",
        refresh_secs(interval)
    );
    out
}
