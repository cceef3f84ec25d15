// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! PSU controller components.
//!
//! The device session executes commands against a transport, guarded by the
//! safety gate and paced by the retry policy.

pub mod policies;
pub mod safety;
pub mod session;

pub use policies::{FixedDelay, FixedPolling, NoRetry, PollingPolicy, RetryPolicy};
pub use safety::SafetyGate;
pub use session::{DeviceSession, SessionConfig};
