// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Client side of the arbitration socket.
//!
//! [`PsuProxy::call`] sends one command to psu-server over its Unix socket.
//! When no server is listening it can fall back to opening the device
//! directly through a transient session; that path bypasses arbitration
//! and must not be used while other processes talk to the same port.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncWriteExt, BufReader};
use tokio::net::unix::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::UnixStream;
use tokio::time;
use tracing::{debug, info};

use psu_backend::RegistrationContext;
use psu_core::{
    DeviceSession, Payload, PsuAccessMethod, PsuCommand, PsuError, PsuResult, SafetyGate,
    SessionConfig,
};
use psu_protocol::{
    command_to_request, encode_line, parse_response, read_limited_line, response_to_result,
    MAX_LINE_BYTES,
};
use psu_server::config::ServerConfig;

use crate::config::ClientConfig;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
const IO_TIMEOUT: Duration = Duration::from_secs(10);

/// Device settings for the unarbitrated path.
#[derive(Clone)]
pub struct DirectFallback {
    registry: Arc<RegistrationContext>,
    model: String,
    access: PsuAccessMethod,
    session: SessionConfig,
    gate: SafetyGate,
}

impl DirectFallback {
    pub fn new(
        registry: Arc<RegistrationContext>,
        model: impl Into<String>,
        access: PsuAccessMethod,
        session: SessionConfig,
        gate: SafetyGate,
    ) -> Self {
        Self {
            registry,
            model: model.into(),
            access,
            session,
            gate,
        }
    }

    /// Fallback using the `[psu-server]` device settings.
    pub fn from_server_config(
        cfg: &ServerConfig,
        registry: Arc<RegistrationContext>,
        confirmed: bool,
    ) -> Self {
        Self::new(
            registry,
            cfg.device.model.clone(),
            cfg.access(),
            cfg.session_config(),
            cfg.safety_gate(confirmed),
        )
    }

    pub fn gate(&self) -> SafetyGate {
        self.gate
    }

    /// Open the port, run one command, close the port.
    async fn execute(&self, cmd: &PsuCommand) -> PsuResult<Payload> {
        let transport = self
            .registry
            .build_transport(&self.model, self.access.clone())
            .map_err(|e| PsuError::transport(format!("cannot open {}: {}", self.model, e)))?;
        let mut session = DeviceSession::new(transport, self.session.clone(), self.gate);
        session.execute(cmd).await
    }
}

enum ConnectError {
    /// Socket file missing or nobody accepting on it.
    NoServer(io::Error),
    Failed(PsuError),
}

/// Persistent connection to psu-server.
///
/// After any error the connection should be dropped; a timed-out exchange
/// may still deliver its response later and desynchronize the stream.
pub struct ProxyConnection {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
    io_timeout: Duration,
}

impl ProxyConnection {
    fn new(stream: UnixStream, io_timeout: Duration) -> Self {
        let (reader, writer) = stream.into_split();
        Self {
            reader: BufReader::new(reader),
            writer,
            io_timeout,
        }
    }

    /// Send one command and wait for its result.
    pub async fn call(&mut self, cmd: &PsuCommand) -> PsuResult<Payload> {
        let line = encode_line(&command_to_request(cmd))
            .map_err(|e| PsuError::invalid_request(format!("cannot encode {}: {}", cmd, e)))?;

        let writer = &mut self.writer;
        time::timeout(self.io_timeout, async {
            writer.write_all(line.as_bytes()).await?;
            writer.flush().await
        })
        .await
        .map_err(|_| PsuError::transport("timed out sending request"))?
        .map_err(|e| PsuError::transport(format!("failed to send request: {}", e)))?;

        // No deadline on the reply: the request may still be queued behind
        // other clients, and the server answers every request it accepted.
        let resp_line = read_limited_line(&mut self.reader, MAX_LINE_BYTES)
            .await
            .map_err(|e| PsuError::transport(format!("failed to read response: {}", e)))?
            .ok_or_else(|| PsuError::transport("connection closed by server"))?;

        let resp = parse_response(resp_line.trim())
            .map_err(|e| PsuError::transport(format!("invalid response from server: {}", e)))?;
        response_to_result(resp)
    }
}

/// Entry point for commands issued by psuctl.
pub struct PsuProxy {
    socket_path: PathBuf,
    connect_timeout: Duration,
    io_timeout: Duration,
    fallback: Option<DirectFallback>,
}

impl PsuProxy {
    pub fn new(socket_path: impl Into<PathBuf>) -> Self {
        Self {
            socket_path: socket_path.into(),
            connect_timeout: CONNECT_TIMEOUT,
            io_timeout: IO_TIMEOUT,
            fallback: None,
        }
    }

    pub fn from_config(cfg: &ClientConfig) -> Self {
        Self::new(cfg.socket_path()).with_timeouts(cfg.connect_timeout(), cfg.io_timeout())
    }

    pub fn with_timeouts(mut self, connect_timeout: Duration, io_timeout: Duration) -> Self {
        self.connect_timeout = connect_timeout;
        self.io_timeout = io_timeout;
        self
    }

    /// Use `fallback` when no server is listening.
    pub fn with_fallback(mut self, fallback: DirectFallback) -> Self {
        self.fallback = Some(fallback);
        self
    }

    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    async fn try_connect(&self) -> Result<ProxyConnection, ConnectError> {
        let stream = time::timeout(self.connect_timeout, UnixStream::connect(&self.socket_path))
            .await
            .map_err(|_| {
                ConnectError::Failed(PsuError::transport(format!(
                    "timed out connecting to {}",
                    self.socket_path.display()
                )))
            })?
            .map_err(|e| match e.kind() {
                io::ErrorKind::NotFound | io::ErrorKind::ConnectionRefused => {
                    ConnectError::NoServer(e)
                }
                _ => ConnectError::Failed(PsuError::transport(format!(
                    "failed to connect to {}: {}",
                    self.socket_path.display(),
                    e
                ))),
            })?;
        Ok(ProxyConnection::new(stream, self.io_timeout))
    }

    /// Whether a server accepts connections on the socket.
    ///
    /// A server that is slow to accept still counts as present.
    pub async fn server_available(&self) -> bool {
        !matches!(self.try_connect().await, Err(ConnectError::NoServer(_)))
    }

    /// Open a persistent connection; never falls back.
    pub async fn connect(&self) -> PsuResult<ProxyConnection> {
        match self.try_connect().await {
            Ok(conn) => Ok(conn),
            Err(ConnectError::NoServer(e)) => Err(PsuError::transport(format!(
                "no psu-server on {}: {}",
                self.socket_path.display(),
                e
            ))),
            Err(ConnectError::Failed(err)) => Err(err),
        }
    }

    /// Run one command through the server, or directly when none is
    /// listening and a fallback is configured.
    pub async fn call(&self, cmd: &PsuCommand) -> PsuResult<Payload> {
        match self.try_connect().await {
            Ok(mut conn) => conn.call(cmd).await,
            Err(ConnectError::NoServer(e)) => match &self.fallback {
                Some(fallback) => {
                    info!(
                        "No psu-server on {} ({}), opening the device directly",
                        self.socket_path.display(),
                        e
                    );
                    fallback.execute(cmd).await
                }
                None => {
                    debug!("No psu-server and no fallback configured");
                    Err(PsuError::transport(format!(
                        "no psu-server on {}: {}",
                        self.socket_path.display(),
                        e
                    )))
                }
            },
            Err(ConnectError::Failed(err)) => Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use psu_core::ErrorKind;
    use psu_server::{backend_opener, DeviceTaskConfig, ServerHandle};

    fn session() -> SessionConfig {
        SessionConfig {
            timeout: Duration::from_millis(30),
            ..SessionConfig::default()
        }
    }

    fn registry() -> Arc<RegistrationContext> {
        Arc::new(RegistrationContext::with_builtin_backends())
    }

    fn dummy_server(socket_path: PathBuf, gate: SafetyGate) -> ServerHandle {
        let task = DeviceTaskConfig {
            opener: backend_opener(registry(), "dummy".to_string(), PsuAccessMethod::Simulated),
            session: session(),
            gate,
        };
        ServerHandle::start(socket_path, task).unwrap()
    }

    fn dummy_fallback(gate: SafetyGate) -> DirectFallback {
        DirectFallback::new(registry(), "dummy", PsuAccessMethod::Simulated, session(), gate)
    }

    #[tokio::test]
    async fn calls_go_through_the_server() {
        let dir = tempfile::TempDir::new().unwrap();
        let socket_path = dir.path().join("psu.sock");
        let server = dummy_server(socket_path.clone(), SafetyGate::disabled());

        let proxy = PsuProxy::new(&socket_path);
        assert!(proxy.server_available().await);
        assert_eq!(
            proxy.call(&PsuCommand::SetVoltage(12.5)).await.unwrap(),
            Payload::Unit
        );
        // The server keeps one session, so state survives between calls.
        assert_eq!(
            proxy.call(&PsuCommand::GetVoltageSet).await.unwrap(),
            Payload::Numeric { value: 12.5 }
        );

        server.shutdown().await;
    }

    #[tokio::test]
    async fn persistent_connection_serves_many_calls() {
        let dir = tempfile::TempDir::new().unwrap();
        let socket_path = dir.path().join("psu.sock");
        let server = dummy_server(socket_path.clone(), SafetyGate::disabled());

        let proxy = PsuProxy::new(&socket_path);
        let mut conn = proxy.connect().await.unwrap();
        for _ in 0..3 {
            let payload = conn.call(&PsuCommand::GetAll).await.unwrap();
            assert!(matches!(payload, Payload::Readings(_)));
        }

        server.shutdown().await;
    }

    #[tokio::test]
    async fn queued_sets_outlast_the_send_timeout() {
        let dir = tempfile::TempDir::new().unwrap();
        let socket_path = dir.path().join("psu.sock");
        let server = dummy_server(socket_path.clone(), SafetyGate::disabled());

        // Each silent set holds the device for one session timeout, so the
        // last callers wait far longer than the send timeout.
        let calls: Vec<_> = (1..=10)
            .map(|i| {
                let proxy = PsuProxy::new(&socket_path)
                    .with_timeouts(Duration::from_secs(5), Duration::from_millis(50));
                tokio::spawn(async move { proxy.call(&PsuCommand::SetVoltage(i as f64)).await })
            })
            .collect();
        for call in calls {
            assert_eq!(call.await.unwrap().unwrap(), Payload::Unit);
        }

        match PsuProxy::new(&socket_path)
            .call(&PsuCommand::GetVoltageSet)
            .await
            .unwrap()
        {
            Payload::Numeric { value } => assert!((1.0..=10.0).contains(&value)),
            other => panic!("unexpected payload {:?}", other),
        }

        server.shutdown().await;
    }

    #[tokio::test]
    async fn server_errors_keep_their_kind() {
        let dir = tempfile::TempDir::new().unwrap();
        let socket_path = dir.path().join("psu.sock");
        let server = dummy_server(socket_path.clone(), SafetyGate::unconfirmed());

        let proxy = PsuProxy::new(&socket_path);
        let err = proxy.call(&PsuCommand::On).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::Unconfirmed);
        let err = proxy.call(&PsuCommand::Save(9)).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidRequest);

        server.shutdown().await;
    }

    #[tokio::test]
    async fn missing_socket_without_fallback_is_transport_error() {
        let dir = tempfile::TempDir::new().unwrap();
        let proxy = PsuProxy::new(dir.path().join("absent.sock"));
        assert!(!proxy.server_available().await);
        let err = proxy.call(&PsuCommand::Idn).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::TransportError);
        assert!(proxy.connect().await.is_err());
    }

    #[tokio::test]
    async fn missing_socket_falls_back_to_direct_session() {
        let dir = tempfile::TempDir::new().unwrap();
        let proxy = PsuProxy::new(dir.path().join("absent.sock"))
            .with_fallback(dummy_fallback(SafetyGate::confirmed()));

        match proxy.call(&PsuCommand::Idn).await.unwrap() {
            Payload::Text { value } => assert!(value.contains("KWR103")),
            other => panic!("unexpected payload {:?}", other),
        }
        assert_eq!(proxy.call(&PsuCommand::On).await.unwrap(), Payload::Unit);
    }

    #[tokio::test]
    async fn refused_socket_falls_back_with_its_gate() {
        let dir = tempfile::TempDir::new().unwrap();
        let socket_path = dir.path().join("dead.sock");
        // Leaves the socket file behind with nobody accepting.
        drop(std::os::unix::net::UnixListener::bind(&socket_path).unwrap());

        let proxy = PsuProxy::new(&socket_path)
            .with_fallback(dummy_fallback(SafetyGate::unconfirmed()));
        assert!(!proxy.server_available().await);
        assert!(proxy.call(&PsuCommand::GetVoltageOut).await.is_ok());
        let err = proxy.call(&PsuCommand::SetCurrent(1.0)).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::Unconfirmed);
    }

    #[tokio::test]
    async fn fallback_with_unknown_model_is_transport_error() {
        let dir = tempfile::TempDir::new().unwrap();
        let fallback = DirectFallback::new(
            registry(),
            "no-such-psu",
            PsuAccessMethod::Simulated,
            session(),
            SafetyGate::disabled(),
        );
        let proxy = PsuProxy::new(dir.path().join("absent.sock")).with_fallback(fallback);
        let err = proxy.call(&PsuCommand::Idn).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::TransportError);
    }
}
