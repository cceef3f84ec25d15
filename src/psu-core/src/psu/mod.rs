// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

use std::future::Future;
use std::pin::Pin;

use serde::{Deserialize, Serialize};

use crate::DynResult;

/// Alias to reduce type complexity in PsuTransport.
pub type IoFuture<'a, T> = Pin<Box<dyn Future<Output = std::io::Result<T>> + Send + 'a>>;

pub mod codec;
pub mod command;
pub mod controller;
pub mod request;
pub mod response;
pub mod state;

/// How a transport reaches the power supply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PsuAccessMethod {
    Serial { path: String, baud: u32 },
    Simulated,
}

/// Static info describing a transport backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinkInfo {
    pub manufacturer: String,
    pub model: String,
    pub access: PsuAccessMethod,
}

/// Byte-level channel to the power supply.
///
/// Exactly one owner at a time: the device session holds it by value and
/// every method takes `&mut self`.
pub trait PsuTransport: Send {
    fn info(&self) -> &LinkInfo;

    fn write_all<'a>(&'a mut self, bytes: &'a [u8]) -> IoFuture<'a, ()>;

    /// Read bytes up to and including `terminator`.
    ///
    /// Pends until the terminator arrives; callers bound it with a timeout.
    /// Bytes received before a cancelled read are kept for `take_partial`.
    /// Returns `UnexpectedEof` when the link closes.
    fn read_until<'a>(&'a mut self, terminator: u8) -> IoFuture<'a, Vec<u8>>;

    /// Take the bytes of an unfinished line left by a cancelled read.
    fn take_partial(&mut self) -> Vec<u8> {
        Vec::new()
    }

    /// Drop any bytes already buffered from the device.
    fn clear_input(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

/// Opens a fresh transport; used when a session must be rebuilt.
pub type TransportOpener = dyn Fn() -> DynResult<Box<dyn PsuTransport>> + Send + Sync;
