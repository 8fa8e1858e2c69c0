//! Scripted test doubles for the transport seam.
//!
//! `ScriptedConnection` plays back queued relay replies and records every
//! command, continuation line and payload it receives; `MockDialer` hands
//! out scripted connections in order and records which transport mode each
//! dial requested. Together they let the session driver run end to end
//! without sockets.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use crate::config::MailerConfig;
use crate::errors::{DispatchError, DispatchResult};
use crate::protocol::{SmtpCommand, SmtpResponse};
use crate::transport::{Dialer, SmtpConnection};

// Process-wide event clock, used to order opens and closes across
// connections within one test.
static SEQUENCE: AtomicU64 = AtomicU64::new(1);

fn tick() -> u64 {
    SEQUENCE.fetch_add(1, Ordering::SeqCst)
}

/// Which transport mode a dial requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DialMode {
    /// `dial_plain`: plaintext, expecting a STARTTLS upgrade.
    Plaintext,
    /// `dial_tls`: implicit TLS.
    ImplicitTls,
}

#[derive(Debug, Default)]
struct ScriptedState {
    replies: VecDeque<SmtpResponse>,
    commands: Vec<SmtpCommand>,
    lines: Vec<String>,
    payloads: Vec<Vec<u8>>,
    fail_next: Option<DispatchError>,
    tls_upgraded: bool,
    opened_at: Option<u64>,
    closed_at: Option<u64>,
}

/// A connection that replays a scripted conversation.
///
/// Cloning yields a handle onto the same recorded state, so a test can keep
/// one clone for assertions while the dialer hands the other to the session
/// driver.
#[derive(Debug, Clone, Default)]
pub struct ScriptedConnection {
    state: Arc<Mutex<ScriptedState>>,
}

impl ScriptedConnection {
    /// Creates a connection with an empty script.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues the next relay reply.
    pub fn queue(&self, reply: SmtpResponse) {
        self.state.lock().unwrap().replies.push_back(reply);
    }

    /// Makes the next operation fail with the given error.
    pub fn fail_next(&self, error: DispatchError) {
        self.state.lock().unwrap().fail_next = Some(error);
    }

    /// Returns every command received, in order.
    pub fn commands(&self) -> Vec<SmtpCommand> {
        self.state.lock().unwrap().commands.clone()
    }

    /// Returns every continuation line received, in order.
    pub fn lines(&self) -> Vec<String> {
        self.state.lock().unwrap().lines.clone()
    }

    /// Returns every DATA payload received.
    pub fn payloads(&self) -> Vec<Vec<u8>> {
        self.state.lock().unwrap().payloads.clone()
    }

    /// Returns true once `starttls` has been driven.
    pub fn tls_upgraded(&self) -> bool {
        self.state.lock().unwrap().tls_upgraded
    }

    /// Returns true once the connection has been closed.
    pub fn closed(&self) -> bool {
        self.state.lock().unwrap().closed_at.is_some()
    }

    /// Returns true if this connection was closed before `other` was opened.
    pub fn closed_before(&self, other: &ScriptedConnection) -> bool {
        let closed = self.state.lock().unwrap().closed_at;
        let opened = other.state.lock().unwrap().opened_at;
        matches!((closed, opened), (Some(c), Some(o)) if c < o)
    }

    fn mark_opened(&self) {
        self.state.lock().unwrap().opened_at = Some(tick());
    }

    fn take_failure(&self) -> Option<DispatchError> {
        self.state.lock().unwrap().fail_next.take()
    }

    fn next_reply(&self) -> DispatchResult<SmtpResponse> {
        self.state
            .lock()
            .unwrap()
            .replies
            .pop_front()
            .ok_or_else(|| DispatchError::protocol("scripted conversation exhausted"))
    }
}

#[async_trait]
impl SmtpConnection for ScriptedConnection {
    async fn command(&mut self, command: &SmtpCommand) -> DispatchResult<SmtpResponse> {
        if let Some(error) = self.take_failure() {
            return Err(error);
        }
        self.state.lock().unwrap().commands.push(command.clone());
        self.next_reply()
    }

    async fn write_line(&mut self, line: &str) -> DispatchResult<()> {
        if let Some(error) = self.take_failure() {
            return Err(error);
        }
        self.state.lock().unwrap().lines.push(line.to_string());
        Ok(())
    }

    async fn read_reply(&mut self) -> DispatchResult<SmtpResponse> {
        if let Some(error) = self.take_failure() {
            return Err(error);
        }
        self.next_reply()
    }

    async fn send_payload(&mut self, payload: &[u8]) -> DispatchResult<()> {
        if let Some(error) = self.take_failure() {
            return Err(error);
        }
        self.state.lock().unwrap().payloads.push(payload.to_vec());
        Ok(())
    }

    async fn starttls(&mut self, _host: &str) -> DispatchResult<()> {
        if let Some(error) = self.take_failure() {
            return Err(error);
        }
        self.state.lock().unwrap().tls_upgraded = true;
        Ok(())
    }

    async fn close(&mut self) {
        self.state.lock().unwrap().closed_at = Some(tick());
    }
}

#[derive(Debug, Default)]
struct MockDialerState {
    pending: VecDeque<ScriptedConnection>,
    dials: Vec<DialMode>,
}

/// A dialer that hands out scripted connections in push order.
#[derive(Debug, Default)]
pub struct MockDialer {
    state: Mutex<MockDialerState>,
}

impl MockDialer {
    /// Creates a dialer with no scripted connections.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a connection for the next dial and returns an assertion
    /// handle onto it.
    pub fn push(&self, conn: ScriptedConnection) -> ScriptedConnection {
        let handle = conn.clone();
        self.state.lock().unwrap().pending.push_back(conn);
        handle
    }

    /// Returns the transport mode of each dial, in order.
    pub fn dials(&self) -> Vec<DialMode> {
        self.state.lock().unwrap().dials.clone()
    }

    fn next(&self, mode: DialMode) -> DispatchResult<Box<dyn SmtpConnection>> {
        let mut state = self.state.lock().unwrap();
        state.dials.push(mode);
        let conn = state
            .pending
            .pop_front()
            .ok_or_else(|| DispatchError::dial("no scripted connection available"))?;
        conn.mark_opened();
        Ok(Box::new(conn))
    }
}

#[async_trait]
impl Dialer for MockDialer {
    async fn dial_plain(&self, _config: &MailerConfig) -> DispatchResult<Box<dyn SmtpConnection>> {
        self.next(DialMode::Plaintext)
    }

    async fn dial_tls(&self, _config: &MailerConfig) -> DispatchResult<Box<dyn SmtpConnection>> {
        self.next(DialMode::ImplicitTls)
    }
}
