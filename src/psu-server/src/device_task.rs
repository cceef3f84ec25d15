// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Device task: the single consumer of the request funnel.
//!
//! Owns the device session (and through it the transport) and executes
//! requests strictly in arrival order, one at a time.

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use psu_core::psu::TransportOpener;
use psu_core::{
    DeviceSession, ErrorKind, Payload, PsuCommand, PsuError, PsuRequest, PsuResult, SafetyGate,
    SessionConfig,
};

/// Configuration for the device task.
pub struct DeviceTaskConfig {
    /// Opens the transport at startup and after a transport fault.
    pub opener: Arc<TransportOpener>,
    pub session: SessionConfig,
    pub gate: SafetyGate,
}

fn open_session(config: &DeviceTaskConfig) -> PsuResult<DeviceSession> {
    let transport = (config.opener)()
        .map_err(|e| PsuError::transport(format!("cannot open transport: {}", e)))?;
    let session = DeviceSession::new(transport, config.session.clone(), config.gate);
    info!(
        "Transport ready: {} {} (timeout {:?}, {:?})",
        session.info().manufacturer,
        session.info().model,
        session.config().timeout,
        session.gate()
    );
    Ok(session)
}

/// Execute on the current session; on a transport fault reopen once and
/// re-execute once on the fresh session.
async fn execute_with_recovery(
    config: &DeviceTaskConfig,
    session: &mut Option<DeviceSession>,
    cmd: &PsuCommand,
) -> PsuResult<Payload> {
    if let Some(active) = session.as_mut().filter(|s| !s.is_faulted()) {
        match active.execute(cmd).await {
            Err(err) if err.kind == ErrorKind::TransportError => {
                warn!("Transport fault during {}: {}; reopening", cmd, err.message);
            }
            other => return other,
        }
    }

    // Release the old port before opening it again.
    *session = None;
    let mut fresh = match open_session(config) {
        Ok(fresh) => fresh,
        Err(err) => {
            warn!("{}", err.message);
            return Err(err);
        }
    };
    let result = fresh.execute(cmd).await;
    *session = Some(fresh);
    result
}

fn reply(respond_to: oneshot::Sender<PsuResult<Payload>>, result: PsuResult<Payload>) {
    if respond_to.send(result).is_err() {
        debug!("Requester went away before the result was delivered");
    }
}

/// Run the device task until every request sender is dropped.
pub async fn run_device_task(config: DeviceTaskConfig, mut rx: mpsc::Receiver<PsuRequest>) {
    let mut session = match open_session(&config) {
        Ok(session) => Some(session),
        Err(err) => {
            warn!("{} (will retry on first request)", err.message);
            None
        }
    };

    while let Some(PsuRequest { cmd, respond_to }) = rx.recv().await {
        let started = Instant::now();
        let result = execute_with_recovery(&config, &mut session, &cmd).await;
        debug!("PSU command {} completed in {:?}", cmd, started.elapsed());

        let drain = matches!(&result, Err(err) if err.kind == ErrorKind::TransportError);
        reply(respond_to, result);
        if drain {
            let mut drained = 0usize;
            while let Ok(queued) = rx.try_recv() {
                reply(
                    queued.respond_to,
                    Err(PsuError::transport(format!(
                        "transport unavailable, {} was not sent",
                        queued.cmd
                    ))),
                );
                drained += 1;
            }
            if drained > 0 {
                warn!("Failed {} queued request(s) after transport fault", drained);
            }
        }
    }

    info!("device task shutting down (channel closed)");
}
