// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Device session: one command at a time against an owned transport.

use std::time::Duration;

use tokio::time::{self, Instant};
use tracing::{debug, warn};

use crate::psu::codec::{self, REPLY_TERMINATOR};
use crate::psu::command::{PsuCommand, ReplyShape, DEFAULT_PRESET_SLOTS};
use crate::psu::controller::policies::{FixedDelay, NoRetry, RetryPolicy};
use crate::psu::controller::safety::SafetyGate;
use crate::psu::response::{Payload, PsuError, PsuResult, Readings};
use crate::psu::{LinkInfo, PsuTransport};

/// Tunables applied to every exchange of a session.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionConfig {
    /// Time allowed for a complete reply line.
    pub timeout: Duration,
    /// Re-sends after a timeout.
    pub max_retries: u32,
    pub retry_delay: Duration,
    /// Treat a silent Ack-shaped command as acknowledged.
    pub ack_on_silence: bool,
    pub preset_slots: u8,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(1),
            max_retries: 1,
            retry_delay: Duration::ZERO,
            ack_on_silence: true,
            preset_slots: DEFAULT_PRESET_SLOTS,
        }
    }
}

impl SessionConfig {
    pub fn retry_policy(&self) -> Box<dyn RetryPolicy> {
        if self.max_retries == 0 {
            Box::new(NoRetry)
        } else {
            Box::new(FixedDelay::with_retries(self.max_retries, self.retry_delay))
        }
    }
}

/// Exclusive owner of a transport; executes commands strictly one at a time.
pub struct DeviceSession {
    transport: Box<dyn PsuTransport>,
    config: SessionConfig,
    retry: Box<dyn RetryPolicy>,
    gate: SafetyGate,
    fault: Option<String>,
}

impl DeviceSession {
    pub fn new(transport: Box<dyn PsuTransport>, config: SessionConfig, gate: SafetyGate) -> Self {
        let retry = config.retry_policy();
        Self {
            transport,
            config,
            retry,
            gate,
            fault: None,
        }
    }

    pub fn info(&self) -> &LinkInfo {
        self.transport.info()
    }

    pub fn gate(&self) -> SafetyGate {
        self.gate
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// A transport fault was seen; the session must be rebuilt.
    pub fn is_faulted(&self) -> bool {
        self.fault.is_some()
    }

    /// Execute one command, or the members of a batch back to back.
    pub async fn execute(&mut self, cmd: &PsuCommand) -> PsuResult<Payload> {
        if let Some(reason) = &self.fault {
            return Err(PsuError::transport(format!(
                "session faulted earlier: {}",
                reason
            )));
        }
        cmd.validate(self.config.preset_slots)?;
        self.gate.check(cmd)?;

        let Some(batch) = cmd.batch() else {
            return self.exchange(cmd).await;
        };
        let mut values = [0.0; 4];
        for (value, member) in values.iter_mut().zip(batch.iter()) {
            let payload = self.exchange(member).await?;
            *value = payload.as_numeric().ok_or_else(|| {
                PsuError::protocol_mismatch(format!("{} did not return a number", member))
            })?;
        }
        Ok(Payload::Readings(Readings {
            voltage_set: values[0],
            current_set: values[1],
            voltage_out: values[2],
            current_out: values[3],
        }))
    }

    async fn exchange(&mut self, cmd: &PsuCommand) -> PsuResult<Payload> {
        let bytes = codec::encode(cmd)?;
        let mut attempts = 0u32;
        loop {
            attempts += 1;
            let started = Instant::now();
            let result = self.attempt(cmd, &bytes).await;
            debug!(
                "PSU command {} attempt {} finished in {:?}: {}",
                cmd,
                attempts,
                started.elapsed(),
                if result.is_ok() { "ok" } else { "failed" }
            );
            let err = match result {
                Ok(payload) => return Ok(payload),
                Err(err) => err,
            };
            if err.kind == crate::ErrorKind::TransportError {
                self.fault = Some(err.message.clone());
                return Err(err);
            }
            if !self.retry.should_retry(attempts, &err) {
                return Err(err);
            }
            warn!("PSU command {} failed ({}), retrying", cmd, err);
            let delay = self.retry.delay(attempts);
            if !delay.is_zero() {
                time::sleep(delay).await;
            }
        }
    }

    async fn attempt(&mut self, cmd: &PsuCommand, bytes: &[u8]) -> PsuResult<Payload> {
        self.transport
            .clear_input()
            .map_err(|e| PsuError::transport(format!("clear input: {}", e)))?;
        self.transport
            .write_all(bytes)
            .await
            .map_err(|e| PsuError::transport(format!("write {}: {}", cmd, e)))?;

        match time::timeout(
            self.config.timeout,
            self.transport.read_until(REPLY_TERMINATOR),
        )
        .await
        {
            Ok(Ok(line)) => codec::decode(cmd, &line),
            Ok(Err(e)) => Err(PsuError::transport(format!("read {}: {}", cmd, e))),
            Err(_) => {
                let partial = self.transport.take_partial();
                if partial.is_empty()
                    && self.config.ack_on_silence
                    && cmd.reply_shape() == ReplyShape::Ack
                {
                    return Ok(Payload::Unit);
                }
                Err(PsuError::timeout(format!(
                    "no reply to {} within {:?}",
                    cmd, self.config.timeout
                )))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::io;
    use std::sync::{Arc, Mutex};

    use super::*;
    use crate::psu::{IoFuture, PsuAccessMethod};
    use crate::ErrorKind;

    enum Reply {
        Line(&'static str),
        Silence,
        Eof,
    }

    struct ScriptedLink {
        info: LinkInfo,
        replies: VecDeque<Reply>,
        writes: Arc<Mutex<Vec<String>>>,
    }

    fn scripted(replies: Vec<Reply>) -> (ScriptedLink, Arc<Mutex<Vec<String>>>) {
        let writes = Arc::new(Mutex::new(Vec::new()));
        let link = ScriptedLink {
            info: LinkInfo {
                manufacturer: "Test".to_string(),
                model: "scripted".to_string(),
                access: PsuAccessMethod::Simulated,
            },
            replies: replies.into(),
            writes: writes.clone(),
        };
        (link, writes)
    }

    impl PsuTransport for ScriptedLink {
        fn info(&self) -> &LinkInfo {
            &self.info
        }

        fn write_all<'a>(&'a mut self, bytes: &'a [u8]) -> IoFuture<'a, ()> {
            self.writes
                .lock()
                .unwrap()
                .push(String::from_utf8_lossy(bytes).into_owned());
            Box::pin(std::future::ready(Ok(())))
        }

        fn read_until<'a>(&'a mut self, _terminator: u8) -> IoFuture<'a, Vec<u8>> {
            match self.replies.pop_front() {
                Some(Reply::Line(line)) => {
                    Box::pin(std::future::ready(Ok(format!("{}\r\n", line).into_bytes())))
                }
                Some(Reply::Eof) => Box::pin(std::future::ready(Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "device went away",
                )))),
                Some(Reply::Silence) | None => Box::pin(std::future::pending()),
            }
        }
    }

    fn fast_config() -> SessionConfig {
        SessionConfig {
            timeout: Duration::from_millis(50),
            ..SessionConfig::default()
        }
    }

    #[test]
    fn accessors_reflect_construction() {
        let (link, _writes) = scripted(vec![]);
        let session = DeviceSession::new(Box::new(link), fast_config(), SafetyGate::unconfirmed());
        assert_eq!(session.info().model, "scripted");
        assert_eq!(session.gate(), SafetyGate::unconfirmed());
        assert_eq!(session.config().timeout, Duration::from_millis(50));
        assert!(!session.is_faulted());
    }

    #[tokio::test]
    async fn repeated_queries_are_idempotent() {
        let (link, writes) = scripted(vec![Reply::Line("5.00"), Reply::Line("5.00")]);
        let mut session = DeviceSession::new(Box::new(link), fast_config(), SafetyGate::disabled());

        let first = session.execute(&PsuCommand::GetVoltageSet).await.unwrap();
        let second = session.execute(&PsuCommand::GetVoltageSet).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(*writes.lock().unwrap(), vec!["VSET?\r\n", "VSET?\r\n"]);
    }

    #[tokio::test]
    async fn silent_query_times_out_after_one_retry() {
        let (link, writes) = scripted(vec![]);
        let mut session = DeviceSession::new(Box::new(link), fast_config(), SafetyGate::disabled());

        let started = std::time::Instant::now();
        let err = session.execute(&PsuCommand::GetVoltageOut).await.unwrap_err();
        let elapsed = started.elapsed();

        assert_eq!(err.kind, ErrorKind::Timeout);
        assert_eq!(writes.lock().unwrap().len(), 2);
        assert!(elapsed >= Duration::from_millis(100), "elapsed {:?}", elapsed);
        // Two timeouts plus scheduling slack.
        assert!(elapsed < Duration::from_millis(100 + 150), "elapsed {:?}", elapsed);
        assert!(!session.is_faulted());
    }

    #[tokio::test]
    async fn retry_recovers_from_single_timeout() {
        let (link, writes) = scripted(vec![Reply::Silence, Reply::Line("0.512")]);
        let mut session = DeviceSession::new(Box::new(link), fast_config(), SafetyGate::disabled());

        let payload = session.execute(&PsuCommand::GetCurrentOut).await.unwrap();
        assert_eq!(payload, Payload::Numeric { value: 0.512 });
        assert_eq!(writes.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn zero_retries_sends_once() {
        let (link, writes) = scripted(vec![]);
        let config = SessionConfig {
            max_retries: 0,
            ..fast_config()
        };
        let mut session = DeviceSession::new(Box::new(link), config, SafetyGate::disabled());

        let err = session.execute(&PsuCommand::Idn).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::Timeout);
        assert_eq!(writes.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn unconfirmed_gate_never_touches_transport() {
        let (link, writes) = scripted(vec![Reply::Line("5.00")]);
        let mut session =
            DeviceSession::new(Box::new(link), fast_config(), SafetyGate::unconfirmed());

        let mutating = [
            PsuCommand::SetVoltage(5.0),
            PsuCommand::SetCurrent(0.1),
            PsuCommand::On,
            PsuCommand::Off,
            PsuCommand::Save(1),
            PsuCommand::Load(1),
            PsuCommand::Unlock,
        ];
        for cmd in &mutating {
            let err = session.execute(cmd).await.unwrap_err();
            assert_eq!(err.kind, ErrorKind::Unconfirmed);
        }
        assert!(writes.lock().unwrap().is_empty());

        // Reads still pass through the gate.
        let payload = session.execute(&PsuCommand::GetVoltageSet).await.unwrap();
        assert_eq!(payload, Payload::Numeric { value: 5.0 });
    }

    #[tokio::test]
    async fn silent_set_is_acknowledged() {
        let (link, writes) = scripted(vec![]);
        let mut session = DeviceSession::new(Box::new(link), fast_config(), SafetyGate::confirmed());

        let payload = session.execute(&PsuCommand::SetVoltage(12.5)).await.unwrap();
        assert_eq!(payload, Payload::Unit);
        assert_eq!(*writes.lock().unwrap(), vec!["VSET:12.50\r\n"]);
    }

    #[tokio::test]
    async fn silent_set_times_out_without_ack_on_silence() {
        let (link, _writes) = scripted(vec![]);
        let config = SessionConfig {
            ack_on_silence: false,
            ..fast_config()
        };
        let mut session = DeviceSession::new(Box::new(link), config, SafetyGate::confirmed());

        let err = session.execute(&PsuCommand::On).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::Timeout);
    }

    #[tokio::test]
    async fn transport_fault_fails_fast_afterwards() {
        let (link, writes) = scripted(vec![Reply::Eof, Reply::Line("5.00")]);
        let mut session = DeviceSession::new(Box::new(link), fast_config(), SafetyGate::disabled());

        let err = session.execute(&PsuCommand::GetVoltageSet).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::TransportError);
        assert!(session.is_faulted());

        let err = session.execute(&PsuCommand::GetVoltageSet).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::TransportError);
        assert_eq!(writes.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn get_all_runs_four_exchanges() {
        let (link, writes) = scripted(vec![
            Reply::Line("12.00"),
            Reply::Line("1.000"),
            Reply::Line("11.98"),
            Reply::Line("0.250"),
        ]);
        let mut session = DeviceSession::new(Box::new(link), fast_config(), SafetyGate::disabled());

        let payload = session.execute(&PsuCommand::GetAll).await.unwrap();
        assert_eq!(
            payload,
            Payload::Readings(Readings {
                voltage_set: 12.0,
                current_set: 1.0,
                voltage_out: 11.98,
                current_out: 0.25,
            })
        );
        assert_eq!(
            *writes.lock().unwrap(),
            vec!["VSET?\r\n", "ISET?\r\n", "VOUT?\r\n", "IOUT?\r\n"]
        );
    }

    #[tokio::test]
    async fn mismatched_reply_is_not_retried() {
        let (link, writes) = scripted(vec![Reply::Line("ERR")]);
        let mut session = DeviceSession::new(Box::new(link), fast_config(), SafetyGate::disabled());

        let err = session.execute(&PsuCommand::GetVoltageSet).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::ProtocolMismatch);
        assert_eq!(writes.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn out_of_range_slot_is_rejected_before_writing() {
        let (link, writes) = scripted(vec![]);
        let mut session = DeviceSession::new(Box::new(link), fast_config(), SafetyGate::disabled());

        let err = session.execute(&PsuCommand::Save(9)).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidRequest);
        assert!(writes.lock().unwrap().is_empty());
    }
}
