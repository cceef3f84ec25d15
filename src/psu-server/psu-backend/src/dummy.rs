// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Dummy PSU backend for development and testing.
//!
//! Speaks the KWR103 line protocol against in-memory state. Queries are
//! answered immediately; set commands are silent like the real device.
//! No hardware or serial port required.

use std::collections::VecDeque;
use std::io;

use tracing::debug;

use psu_core::psu::command::DEFAULT_PRESET_SLOTS;
use psu_core::psu::IoFuture;
use psu_core::{LinkInfo, PsuAccessMethod, PsuTransport};

/// Resistance of the simulated load, in ohms.
const LOAD_OHMS: f64 = 10.0;

#[derive(Debug, Clone, Copy, Default)]
struct Preset {
    voltage: f64,
    current: f64,
}

pub struct DummyPsu {
    info: LinkInfo,
    voltage_set: f64,
    current_set: f64,
    output: bool,
    locked: bool,
    presets: Vec<Preset>,
    replies: VecDeque<Vec<u8>>,
    line: Vec<u8>,
}

impl DummyPsu {
    pub fn new() -> Self {
        Self {
            info: LinkInfo {
                manufacturer: "Dummy".to_string(),
                model: "dummy".to_string(),
                access: PsuAccessMethod::Simulated,
            },
            voltage_set: 0.0,
            current_set: 0.0,
            output: false,
            locked: false,
            presets: vec![Preset::default(); usize::from(DEFAULT_PRESET_SLOTS)],
            replies: VecDeque::new(),
            line: Vec::new(),
        }
    }

    fn voltage_out(&self) -> f64 {
        if !self.output {
            return 0.0;
        }
        // Constant-current mode once the load would draw more than the limit.
        let amps = self.voltage_set / LOAD_OHMS;
        if amps > self.current_set {
            self.current_set * LOAD_OHMS
        } else {
            self.voltage_set
        }
    }

    fn current_out(&self) -> f64 {
        if !self.output {
            return 0.0;
        }
        (self.voltage_set / LOAD_OHMS).min(self.current_set)
    }

    fn reply(&mut self, text: String) {
        let mut bytes = text.into_bytes();
        bytes.extend_from_slice(b"\r\n");
        self.replies.push_back(bytes);
    }

    fn preset_index(&self, arg: &str) -> Option<usize> {
        let slot: usize = arg.parse().ok()?;
        (1..=self.presets.len()).contains(&slot).then(|| slot - 1)
    }

    fn handle_line(&mut self, line: &str) {
        debug!("dummy PSU <- {}", line);
        let (head, arg) = match line.split_once(':') {
            Some((head, arg)) => (head, Some(arg)),
            None => (line, None),
        };
        match (head, arg) {
            ("VSET?", None) => self.reply(format!("{:.2}", self.voltage_set)),
            ("ISET?", None) => self.reply(format!("{:.3}", self.current_set)),
            ("VOUT?", None) => self.reply(format!("{:.2}", self.voltage_out())),
            ("IOUT?", None) => self.reply(format!("{:.3}", self.current_out())),
            ("*IDN?", None) => self.reply("RND 320-KWR103 V2.0 SN:DUMMY".to_string()),
            ("VSET", Some(v)) => {
                if let Ok(v) = v.parse() {
                    self.voltage_set = v;
                }
            }
            ("ISET", Some(i)) => {
                if let Ok(i) = i.parse() {
                    self.current_set = i;
                }
            }
            ("OUT", Some(state)) => self.output = state == "1",
            ("LOCK", Some(state)) => self.locked = state == "1",
            ("SAV", Some(slot)) => {
                if let Some(idx) = self.preset_index(slot) {
                    self.presets[idx] = Preset {
                        voltage: self.voltage_set,
                        current: self.current_set,
                    };
                }
            }
            ("RCL", Some(slot)) => {
                if let Some(idx) = self.preset_index(slot) {
                    let preset = self.presets[idx];
                    self.voltage_set = preset.voltage;
                    self.current_set = preset.current;
                }
            }
            _ => debug!("dummy PSU ignoring unknown command {:?}", line),
        }
    }

    fn feed(&mut self, bytes: &[u8]) {
        for byte in bytes {
            if *byte == b'\n' {
                let line = std::mem::take(&mut self.line);
                let text = String::from_utf8_lossy(&line);
                let text = text.trim();
                if !text.is_empty() {
                    let text = text.to_string();
                    self.handle_line(&text);
                }
            } else {
                self.line.push(*byte);
            }
        }
    }

    /// Front panel lock state.
    pub fn is_locked(&self) -> bool {
        self.locked
    }
}

impl Default for DummyPsu {
    fn default() -> Self {
        Self::new()
    }
}

impl PsuTransport for DummyPsu {
    fn info(&self) -> &LinkInfo {
        &self.info
    }

    fn write_all<'a>(&'a mut self, bytes: &'a [u8]) -> IoFuture<'a, ()> {
        self.feed(bytes);
        Box::pin(std::future::ready(Ok(())))
    }

    fn read_until<'a>(&'a mut self, _terminator: u8) -> IoFuture<'a, Vec<u8>> {
        match self.replies.pop_front() {
            Some(reply) => Box::pin(std::future::ready(Ok(reply))),
            // Silent like the real device; the session's timeout ends the wait.
            None => Box::pin(std::future::pending::<io::Result<Vec<u8>>>()),
        }
    }

    fn clear_input(&mut self) -> io::Result<()> {
        self.replies.clear();
        Ok(())
    }
}
