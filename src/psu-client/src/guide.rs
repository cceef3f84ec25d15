// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Long-form safety guide printed by `psuctl --guide`.

use std::io::{self, BufRead, Write};

use psu_app::TESTED_DEVICES;

/// Raw serial commands sent to the device, for comparison with its manual.
pub const RAW_COMMANDS: &[&str] = &[
    "VSET:<voltage>",
    "VSET?",
    "ISET:<current>",
    "ISET?",
    "VOUT?",
    "IOUT?",
    "OUT:<stat>",
    "LOCK:<stat>",
    "SAV:<slot>",
    "RCL:<slot>",
    "*IDN?",
];

const RULE: &str = "-----------------------------------------------------------------------";

fn page_warning(out: &mut String) {
    out.push_str("\nPSU Controller\n==============\n\n");
    out.push_str("Control and monitor a programmable power supply over a serial interface.\n");
    out.push_str("Supports live monitoring and safe multi-process access via a UNIX socket.\n\n");
    out.push_str(&format!("{RULE}\nSAFETY WARNING\n{RULE}\n\n"));
    out.push_str("This program sends RAW serial commands directly to the device.\n\n");
    out.push_str("It does NOT identify the device automatically.\n");
    out.push_str("It does NOT verify compatibility.\n\n");
    out.push_str("The program has ONLY been tested on the following devices:\n");
    for dev in TESTED_DEVICES {
        out.push_str(&format!("  - {dev}\n"));
    }
}

fn page_confirmation(out: &mut String) {
    out.push_str("\nUsing this program with any other device may be unsafe.\n");
    out.push_str("Always consult your device manual before use.\n\n");
    out.push_str("By default, commands that change the output are refused until the\n");
    out.push_str("device has been confirmed interactively.\n\n");
    out.push_str("To bypass this confirmation, use:\n  --no-device-check\n");
}

fn page_commands(out: &mut String) {
    out.push_str(&format!("\n{RULE}\nMONITOR MODE\n{RULE}\n\n"));
    out.push_str("Start the live dashboard (and psu-server, if none is running):\n\n");
    out.push_str("  psuctl --monitor\n\n");
    out.push_str("While it runs, other terminals can safely issue commands.\n");
    out.push_str("Confirmation is requested once at startup.\n\n");
    out.push_str(&format!("{RULE}\nRAW SERIAL COMMANDS USED\n{RULE}\n\n"));
    for cmd in RAW_COMMANDS {
        out.push_str(&format!("  {cmd}\n"));
    }
    out.push_str("\nCompare these commands with your device manual to ensure compatibility.\n");
}

fn page_options(out: &mut String) {
    out.push_str(&format!("\n{RULE}\nOPTIONS\n{RULE}\n\n"));
    for (flag, help) in [
        ("-m, --monitor", "Start live dashboard"),
        ("-a, --get-all", "Read all four values"),
        ("--get-voltage-set", "Read configured voltage"),
        ("--get-voltage-out", "Read output voltage"),
        ("--get-current-set", "Read configured current"),
        ("--get-current-out", "Read output current"),
        ("-v, --set-voltage <v>", "Set output voltage"),
        ("-i, --set-current <i>", "Set output current"),
        ("-o, --on", "Enable output"),
        ("-f, --off", "Disable output"),
        ("-l, --lock", "Lock front panel"),
        ("-u, --unlock", "Unlock front panel"),
        ("-s, --save <n>", "Save settings to memory slot"),
        ("-r, --load <n>", "Recall memory slot"),
        ("-n, --idn", "Send *IDN? explicitly"),
        ("--no-device-check", "Skip safety confirmation (UNSAFE)"),
    ] {
        out.push_str(&format!("  {flag:<24}{help}\n"));
    }
    out.push_str(&format!("\n{RULE}\nEXAMPLES\n{RULE}\n\n"));
    for example in [
        "psuctl --monitor",
        "psuctl --set-voltage 12.5",
        "psuctl --set-current 2.0",
        "psuctl --on",
    ] {
        out.push_str(&format!("  {example}\n"));
    }
    out.push_str(&format!("\n{RULE}\n"));
}

/// Guide pages, in display order.
pub fn pages() -> Vec<String> {
    let builders: [fn(&mut String); 4] =
        [page_warning, page_confirmation, page_commands, page_options];
    builders
        .iter()
        .map(|build| {
            let mut page = String::new();
            build(&mut page);
            page
        })
        .collect()
}

/// Write the guide to `output`; when `paged`, wait for Enter on `input`
/// between pages.
pub fn show_guide<R: BufRead, W: Write>(input: &mut R, output: &mut W, paged: bool) -> io::Result<()> {
    let pages = pages();
    let last = pages.len().saturating_sub(1);
    for (i, page) in pages.iter().enumerate() {
        output.write_all(page.as_bytes())?;
        if paged && i < last {
            write!(output, "\nPress Enter...")?;
            output.flush()?;
            let mut line = String::new();
            if input.read_line(&mut line)? == 0 {
                writeln!(output)?;
                return Ok(());
            }
        }
    }
    output.flush()
}
