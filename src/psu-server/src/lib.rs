// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Arbitration server: one device task behind a Unix socket.
//!
//! Any number of clients connect to the socket; their requests are funnelled
//! into a single device task that owns the serial transport.

pub mod config;
pub mod device_task;
pub mod listener;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use psu_backend::RegistrationContext;
use psu_core::psu::TransportOpener;
use psu_core::{DynResult, PsuAccessMethod, PsuRequest};

use config::ServerConfig;
pub use device_task::{run_device_task, DeviceTaskConfig};

const DEVICE_TASK_CHANNEL_BUFFER: usize = 32;

/// Opener that builds `model` from the registry on every call.
pub fn backend_opener(
    registry: Arc<RegistrationContext>,
    model: String,
    access: PsuAccessMethod,
) -> Arc<TransportOpener> {
    Arc::new(move || registry.build_transport(&model, access.clone()))
}

/// Device task configuration derived from the `[psu-server]` section.
pub fn task_config(
    cfg: &ServerConfig,
    registry: Arc<RegistrationContext>,
    confirmed: bool,
) -> DeviceTaskConfig {
    DeviceTaskConfig {
        opener: backend_opener(registry, cfg.device.model.clone(), cfg.access()),
        session: cfg.session_config(),
        gate: cfg.safety_gate(confirmed),
    }
}

/// Running server; dropping it without `shutdown` leaves the socket file
/// behind for the next start to clean up.
pub struct ServerHandle {
    socket_path: PathBuf,
    shutdown_tx: watch::Sender<bool>,
    listener: JoinHandle<()>,
    device: JoinHandle<()>,
    grace: Duration,
}

impl ServerHandle {
    /// Bind the socket and spawn the listener and device task.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start(socket_path: PathBuf, task: DeviceTaskConfig) -> DynResult<Self> {
        let unix_listener = listener::bind_socket(&socket_path)?;

        // Worst case for a GetAll batch in flight when shutdown starts.
        let attempts = task.session.retry_policy().max_attempts();
        let grace = (task.session.timeout + task.session.retry_delay) * attempts * 4
            + Duration::from_secs(1);

        let (device_tx, device_rx) = mpsc::channel::<PsuRequest>(DEVICE_TASK_CHANNEL_BUFFER);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let device = tokio::spawn(run_device_task(task, device_rx));
        let listener = tokio::spawn(listener::run_listener(
            unix_listener,
            socket_path.clone(),
            device_tx,
            shutdown_rx,
        ));

        Ok(Self {
            socket_path,
            shutdown_tx,
            listener,
            device,
            grace,
        })
    }

    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    /// Stop accepting, let the in-flight command finish, drop the transport
    /// and remove the socket file.
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(true);
        if let Err(e) = self.listener.await {
            warn!("Listener task ended abnormally: {:?}", e);
        }

        let device_abort = self.device.abort_handle();
        match tokio::time::timeout(self.grace, self.device).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!("Device task ended abnormally: {:?}", e),
            Err(_) => {
                warn!("Device task did not stop within {:?}, aborting", self.grace);
                device_abort.abort();
            }
        }

        match std::fs::remove_file(&self.socket_path) {
            Ok(()) => info!("Removed socket {}", self.socket_path.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(
                "Failed to remove socket {}: {}",
                self.socket_path.display(),
                e
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
    use tokio::net::UnixStream;

    use super::*;
    use psu_core::psu::IoFuture;
    use psu_core::{ErrorKind, LinkInfo, PsuTransport, SafetyGate, SessionConfig};
    use psu_protocol::{parse_response, response_to_result};

    /// Tracks how many exchanges overlap on the link.
    struct CountingLink {
        info: LinkInfo,
        in_flight: Arc<AtomicUsize>,
        max_in_flight: Arc<AtomicUsize>,
        exchanges: Arc<AtomicUsize>,
    }

    impl PsuTransport for CountingLink {
        fn info(&self) -> &LinkInfo {
            &self.info
        }

        fn write_all<'a>(&'a mut self, _bytes: &'a [u8]) -> IoFuture<'a, ()> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);
            Box::pin(std::future::ready(Ok(())))
        }

        fn read_until<'a>(&'a mut self, _terminator: u8) -> IoFuture<'a, Vec<u8>> {
            Box::pin(async move {
                tokio::time::sleep(Duration::from_millis(2)).await;
                self.in_flight.fetch_sub(1, Ordering::SeqCst);
                self.exchanges.fetch_add(1, Ordering::SeqCst);
                Ok::<_, io::Error>(b"1.00\r\n".to_vec())
            })
        }
    }

    struct Counters {
        max_in_flight: Arc<AtomicUsize>,
        exchanges: Arc<AtomicUsize>,
    }

    fn counting_task() -> (DeviceTaskConfig, Counters) {
        let in_flight = Arc::new(AtomicUsize::new(0));
        let max_in_flight = Arc::new(AtomicUsize::new(0));
        let exchanges = Arc::new(AtomicUsize::new(0));
        let counters = Counters {
            max_in_flight: max_in_flight.clone(),
            exchanges: exchanges.clone(),
        };
        let opener: Arc<TransportOpener> = Arc::new(move || -> DynResult<Box<dyn PsuTransport>> {
            Ok(Box::new(CountingLink {
                info: LinkInfo {
                    manufacturer: "Test".to_string(),
                    model: "counting".to_string(),
                    access: PsuAccessMethod::Simulated,
                },
                in_flight: in_flight.clone(),
                max_in_flight: max_in_flight.clone(),
                exchanges: exchanges.clone(),
            }))
        });
        let task = DeviceTaskConfig {
            opener,
            session: SessionConfig {
                timeout: Duration::from_millis(200),
                ..SessionConfig::default()
            },
            gate: SafetyGate::unconfirmed(),
        };
        (task, counters)
    }

    async fn request(
        stream: &mut BufReader<UnixStream>,
        line: &str,
    ) -> psu_core::PsuResult<psu_core::Payload> {
        stream.get_mut().write_all(line.as_bytes()).await.unwrap();
        let mut resp = String::new();
        stream.read_line(&mut resp).await.unwrap();
        response_to_result(parse_response(&resp).unwrap())
    }

    #[tokio::test]
    async fn concurrent_clients_never_overlap_on_the_device() {
        let dir = tempfile::TempDir::new().unwrap();
        let socket_path = dir.path().join("psu.sock");
        let (task, counters) = counting_task();
        let server = ServerHandle::start(socket_path.clone(), task).unwrap();

        let mut clients = Vec::new();
        for i in 0..16 {
            let path = socket_path.clone();
            clients.push(tokio::spawn(async move {
                let stream = UnixStream::connect(&path).await.unwrap();
                let mut stream = BufReader::new(stream);
                if i % 4 == 3 {
                    // Disconnect while queued.
                    stream
                        .get_mut()
                        .write_all(b"{\"command\":\"get_all\"}\n")
                        .await
                        .unwrap();
                    return None;
                }
                Some(request(&mut stream, "{\"command\":\"get_voltage_out\"}\n").await)
            }));
        }

        let mut answered = 0;
        for client in clients {
            if let Some(result) = client.await.unwrap() {
                assert_eq!(result.unwrap(), psu_core::Payload::Numeric { value: 1.0 });
                answered += 1;
            }
        }
        assert_eq!(answered, 12);

        // The server keeps serving after clients vanished mid-request.
        let stream = UnixStream::connect(&socket_path).await.unwrap();
        let mut stream = BufReader::new(stream);
        assert!(request(&mut stream, "{\"command\":\"idn\"}\n").await.is_ok());

        assert_eq!(counters.max_in_flight.load(Ordering::SeqCst), 1);
        assert!(counters.exchanges.load(Ordering::SeqCst) >= 13);

        server.shutdown().await;
        assert!(!socket_path.exists());
    }

    #[tokio::test]
    async fn malformed_frames_keep_the_connection_open() {
        let dir = tempfile::TempDir::new().unwrap();
        let socket_path = dir.path().join("psu.sock");
        let (task, counters) = counting_task();
        let server = ServerHandle::start(socket_path.clone(), task).unwrap();

        let stream = UnixStream::connect(&socket_path).await.unwrap();
        let mut stream = BufReader::new(stream);

        let err = request(&mut stream, "this is not json\n").await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidRequest);
        let err = request(&mut stream, "{\"command\":\"self_destruct\"}\n")
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidRequest);
        assert_eq!(counters.exchanges.load(Ordering::SeqCst), 0);

        // Gate is unconfirmed on this server.
        let err = request(&mut stream, "{\"command\":\"on\"}\n").await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::Unconfirmed);

        let ok = request(&mut stream, "{\"command\":\"get_voltage_set\"}\n").await;
        assert!(ok.is_ok());

        server.shutdown().await;
    }

    #[tokio::test]
    async fn non_utf8_line_keeps_the_connection_open() {
        let dir = tempfile::TempDir::new().unwrap();
        let socket_path = dir.path().join("psu.sock");
        let (task, counters) = counting_task();
        let server = ServerHandle::start(socket_path.clone(), task).unwrap();

        let stream = UnixStream::connect(&socket_path).await.unwrap();
        let mut stream = BufReader::new(stream);

        stream.get_mut().write_all(b"\xff\xfe\n").await.unwrap();
        let mut resp = String::new();
        stream.read_line(&mut resp).await.unwrap();
        let err = response_to_result(parse_response(&resp).unwrap()).unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidRequest);
        assert_eq!(counters.exchanges.load(Ordering::SeqCst), 0);

        let ok = request(&mut stream, "{\"command\":\"get_voltage_out\"}\n").await;
        assert_eq!(ok.unwrap(), psu_core::Payload::Numeric { value: 1.0 });

        server.shutdown().await;
    }

    #[tokio::test]
    async fn stale_socket_is_replaced() {
        let dir = tempfile::TempDir::new().unwrap();
        let socket_path = dir.path().join("nested").join("psu.sock");
        std::fs::create_dir_all(socket_path.parent().unwrap()).unwrap();
        std::fs::write(&socket_path, b"stale").unwrap();

        let (task, _counters) = counting_task();
        let server = ServerHandle::start(socket_path.clone(), task).unwrap();
        assert!(UnixStream::connect(&socket_path).await.is_ok());

        // A second server must not steal a live socket.
        let (task, _counters) = counting_task();
        assert!(ServerHandle::start(socket_path.clone(), task).is_err());

        server.shutdown().await;
    }

    #[tokio::test]
    async fn socket_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::TempDir::new().unwrap();
        let socket_path = dir.path().join("psu.sock");
        let (task, _counters) = counting_task();
        let server = ServerHandle::start(socket_path.clone(), task).unwrap();

        let mode = std::fs::metadata(&socket_path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);

        server.shutdown().await;
    }

    #[tokio::test]
    async fn overlong_socket_path_is_rejected() {
        let dir = tempfile::TempDir::new().unwrap();
        let socket_path = dir.path().join("a".repeat(200)).join("psu.sock");
        let (task, _counters) = counting_task();
        let result = ServerHandle::start(socket_path, task);
        assert!(result.is_err());
    }
}
