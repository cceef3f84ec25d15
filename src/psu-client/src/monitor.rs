// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Live dashboard polling the supply through psu-server.

use std::future::Future;
use std::io::{self, Write};
use std::sync::Arc;

use tokio::signal;
use tokio::time;
use tracing::{info, warn};

use psu_backend::RegistrationContext;
use psu_core::psu::controller::PollingPolicy;
use psu_core::{DeviceState, DynResult, PsuCommand, PsuResult};
use psu_server::config::ServerConfig;
use psu_server::{task_config, ServerHandle};

use crate::dashboard::{render, PollStatus};
use crate::proxy::{ProxyConnection, PsuProxy};

/// Polls `GetAll` over a persistent connection and renders frames.
pub struct Monitor<P: PollingPolicy> {
    proxy: PsuProxy,
    polling: P,
    conn: Option<ProxyConnection>,
    last: Option<DeviceState>,
}

impl<P: PollingPolicy> Monitor<P> {
    pub fn new(proxy: PsuProxy, polling: P) -> Self {
        Self {
            proxy,
            polling,
            conn: None,
            last: None,
        }
    }

    async fn poll(&mut self) -> PsuResult<DeviceState> {
        let mut conn = match self.conn.take() {
            Some(conn) => conn,
            None => self.proxy.connect().await?,
        };
        // A failed call drops the connection; the next tick reconnects.
        let payload = conn.call(&PsuCommand::GetAll).await?;
        self.conn = Some(conn);
        DeviceState::from_payload(&payload)
    }

    /// Poll once and render the resulting frame.
    pub async fn tick(&mut self) -> String {
        let interval = self.polling.interval();
        match self.poll().await {
            Ok(state) => {
                self.last = Some(state);
                render(self.last.as_ref(), PollStatus::Fresh, interval)
            }
            Err(err) => {
                warn!("Monitor poll failed: {}", err);
                self.conn = None;
                render(self.last.as_ref(), PollStatus::Failed(&err), interval)
            }
        }
    }

    /// Render a frame every polling interval until `shutdown` completes.
    pub async fn run<W, F>(&mut self, out: &mut W, shutdown: F) -> io::Result<()>
    where
        W: Write,
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        loop {
            let frame = tokio::select! {
                frame = self.tick() => frame,
                _ = &mut shutdown => break,
            };
            out.write_all(frame.as_bytes())?;
            out.flush()?;

            tokio::select! {
                _ = time::sleep(self.polling.interval()) => {}
                _ = &mut shutdown => break,
            }
        }
        Ok(())
    }
}

/// Attach to a running psu-server, or start one in-process, and show the
/// dashboard until Ctrl+C.
///
/// `confirm` is awaited only when the server has to be started here; its
/// answer confirms that server's safety gate.
pub async fn run_monitor<P, C>(
    proxy: PsuProxy,
    polling: P,
    server_cfg: &ServerConfig,
    registry: Arc<RegistrationContext>,
    confirm: C,
) -> DynResult<()>
where
    P: PollingPolicy,
    C: Future<Output = DynResult<bool>>,
{
    let server = if proxy.server_available().await {
        info!("Attaching to psu-server on {}", proxy.socket_path().display());
        None
    } else {
        let confirmed = confirm.await?;
        info!(
            "Starting in-process psu-server on {}",
            proxy.socket_path().display()
        );
        let task = task_config(server_cfg, registry, confirmed);
        Some(ServerHandle::start(proxy.socket_path().to_path_buf(), task)?)
    };

    let mut monitor = Monitor::new(proxy, polling);
    let mut stdout = io::stdout();
    let result = monitor
        .run(&mut stdout, async {
            if let Err(e) = signal::ctrl_c().await {
                warn!("Failed to listen for Ctrl+C: {}", e);
                std::future::pending::<()>().await;
            }
        })
        .await;

    println!("\nStopping monitor...");
    if let Some(server) = server {
        server.shutdown().await;
        println!("Serial connection closed.");
    }
    result?;
    Ok(())
}
