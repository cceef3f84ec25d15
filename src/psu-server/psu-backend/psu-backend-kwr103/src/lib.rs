// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Serial transport for the RND 320-KWR103 bench supply (8N1, CR LF lines).

use std::io;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio_serial::{
    ClearBuffer, DataBits, Parity, SerialPort, SerialPortBuilderExt, SerialStream, StopBits,
};
use tracing::debug;

use psu_core::psu::IoFuture;
use psu_core::{DynResult, LinkInfo, PsuAccessMethod, PsuTransport};

/// Transport for the RND 320-KWR103 over USB CDC serial.
pub struct Kwr103 {
    port: SerialStream,
    info: LinkInfo,
    /// Bytes of the line currently being received.
    pending: Vec<u8>,
}

impl Kwr103 {
    pub fn new(path: &str, baud: u32) -> DynResult<Self> {
        let port = tokio_serial::new(path, baud)
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
            .open_native_async()?;
        debug!("Opened {} @ {} baud", path, baud);
        Ok(Self {
            port,
            info: LinkInfo {
                manufacturer: "RND".to_string(),
                model: "320-KWR103".to_string(),
                access: PsuAccessMethod::Serial {
                    path: path.to_string(),
                    baud,
                },
            },
            pending: Vec::with_capacity(32),
        })
    }
}

impl PsuTransport for Kwr103 {
    fn info(&self) -> &LinkInfo {
        &self.info
    }

    fn write_all<'a>(&'a mut self, bytes: &'a [u8]) -> IoFuture<'a, ()> {
        Box::pin(async move {
            self.port.write_all(bytes).await?;
            self.port.flush().await
        })
    }

    fn read_until<'a>(&'a mut self, terminator: u8) -> IoFuture<'a, Vec<u8>> {
        Box::pin(async move {
            loop {
                let mut byte = [0u8; 1];
                self.port.read_exact(&mut byte).await?;
                self.pending.push(byte[0]);
                if byte[0] == terminator {
                    return Ok(std::mem::take(&mut self.pending));
                }
            }
        })
    }

    fn take_partial(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.pending)
    }

    fn clear_input(&mut self) -> io::Result<()> {
        self.pending.clear();
        self.port.clear(ClearBuffer::Input).map_err(io::Error::from)
    }
}
