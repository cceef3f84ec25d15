// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

use tokio::sync::oneshot;

use crate::{Payload, PsuCommand, PsuResult};

/// Request sent to the device task.
#[derive(Debug)]
pub struct PsuRequest {
    pub cmd: PsuCommand,
    pub respond_to: oneshot::Sender<PsuResult<Payload>>,
}
