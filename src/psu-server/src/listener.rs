// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! JSON-over-Unix-socket listener for psu-server.
//!
//! Accepts client connections speaking the `ClientRequest`/`ClientResponse`
//! protocol defined in `psu-protocol`. Each connection is a loop of
//! request/response lines until the client closes it.

use std::path::{Path, PathBuf};

use tokio::io::{AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, error, info};
use uuid::Uuid;

use psu_core::{DynResult, Payload, PsuError, PsuRequest, PsuResult};
use psu_protocol::{
    encode_line, parse_request, read_limited_line, request_to_command, result_to_response,
    MAX_LINE_BYTES,
};

/// `sun_path` is 104 bytes on macOS and 108 on Linux; use the smaller one.
const MAX_SOCKET_PATH: usize = 104;

/// Bind the arbitration socket.
///
/// Removes a stale socket file, creates the parent directory and restricts
/// the socket to its owner. Fails if another server still answers on it.
pub fn bind_socket(socket_path: &Path) -> DynResult<UnixListener> {
    let path_len = socket_path.as_os_str().len();
    if path_len >= MAX_SOCKET_PATH {
        return Err(format!(
            "Socket path too long ({} bytes, max {}): {}",
            path_len,
            MAX_SOCKET_PATH - 1,
            socket_path.display()
        )
        .into());
    }

    if socket_path.exists() {
        if std::os::unix::net::UnixStream::connect(socket_path).is_ok() {
            return Err(format!(
                "Another psu-server is already listening on {}",
                socket_path.display()
            )
            .into());
        }
        std::fs::remove_file(socket_path).map_err(|e| {
            format!(
                "Failed to remove stale socket {}: {}",
                socket_path.display(),
                e
            )
        })?;
    }

    if let Some(parent) = socket_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let listener = std::os::unix::net::UnixListener::bind(socket_path)
        .map_err(|e| format!("Failed to bind socket {}: {}", socket_path.display(), e))?;

    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o600);
        std::fs::set_permissions(socket_path, perms)?;
    }

    listener.set_nonblocking(true)?;
    Ok(UnixListener::from_std(listener)?)
}

async fn wait_for_shutdown(mut shutdown_rx: watch::Receiver<bool>) {
    if *shutdown_rx.borrow() {
        return;
    }
    while shutdown_rx.changed().await.is_ok() {
        if *shutdown_rx.borrow() {
            break;
        }
    }
}

/// Accept client connections until shutdown is signalled.
pub async fn run_listener(
    listener: UnixListener,
    socket_path: PathBuf,
    device_tx: mpsc::Sender<PsuRequest>,
    shutdown_rx: watch::Receiver<bool>,
) {
    info!("Listening on {}", socket_path.display());

    loop {
        let accepted = tokio::select! {
            accepted = listener.accept() => accepted,
            _ = wait_for_shutdown(shutdown_rx.clone()) => break,
        };
        let socket = match accepted {
            Ok((socket, _addr)) => socket,
            Err(e) => {
                error!("Accept failed: {}", e);
                continue;
            }
        };

        let conn_id = Uuid::new_v4();
        debug!("Client {} connected", conn_id);
        let tx = device_tx.clone();
        let conn_shutdown_rx = shutdown_rx.clone();
        tokio::spawn(async move {
            tokio::select! {
                result = handle_client(socket, conn_id, tx) => {
                    if let Err(e) = result {
                        debug!("Client {} closed with error: {}", conn_id, e);
                    }
                }
                _ = wait_for_shutdown(conn_shutdown_rx) => {
                    debug!("Client {} dropped on shutdown", conn_id);
                }
            }
        });
    }

    info!("Listener on {} stopped", socket_path.display());
}

async fn dispatch(tx: &mpsc::Sender<PsuRequest>, line: &str) -> PsuResult<Payload> {
    let request = parse_request(line)?;
    let cmd = request_to_command(&request)?;

    let (respond_to, resp_rx) = oneshot::channel();
    tx.send(PsuRequest { cmd, respond_to })
        .await
        .map_err(|_| PsuError::transport("device task not available"))?;
    resp_rx
        .await
        .map_err(|_| PsuError::transport("device task dropped the request"))?
}

async fn handle_client(
    socket: UnixStream,
    conn_id: Uuid,
    tx: mpsc::Sender<PsuRequest>,
) -> std::io::Result<()> {
    let (reader, mut writer) = socket.into_split();
    let mut reader = BufReader::new(reader);

    loop {
        let line = match read_limited_line(&mut reader, MAX_LINE_BYTES).await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) if e.kind() == std::io::ErrorKind::InvalidInput => {
                // Whole line consumed; answer and keep reading.
                let resp = result_to_response(Err(PsuError::invalid_request(e.to_string())));
                writer.write_all(encode_line(&resp)?.as_bytes()).await?;
                writer.flush().await?;
                continue;
            }
            Err(e) if e.kind() == std::io::ErrorKind::InvalidData => {
                // Framing is lost; answer once and drop the connection.
                let resp = result_to_response(Err(PsuError::invalid_request(e.to_string())));
                writer.write_all(encode_line(&resp)?.as_bytes()).await?;
                writer.flush().await?;
                return Err(e);
            }
            Err(e) => return Err(e),
        };
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        let result = dispatch(&tx, trimmed).await;
        if let Err(err) = &result {
            debug!("Client {} request failed: {}", conn_id, err);
        }
        let resp_line = encode_line(&result_to_response(result))?;
        writer.write_all(resp_line.as_bytes()).await?;
        writer.flush().await?;
    }

    debug!("Client {} disconnected", conn_id);
    Ok(())
}
