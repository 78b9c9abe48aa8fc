//! Control-channel command dispatch and reply matching.
//!
//! The dispatcher owns the write half of the control socket plus a spawned
//! reader task (read half → [`LineFramer`] → [`classify_line`]). Exactly one
//! command may be pending at a time; its reply is delivered through a
//! per-request oneshot channel held in the single pending slot. Replies are
//! matched strictly in arrival order — the control channel is half-duplex
//! and cannot attribute replies to overlapping commands, so a second submit
//! while one is pending is rejected outright.

use crate::ftp::error::{FtpError, FtpResult};
use crate::ftp::protocol::{classify_line, ControlLine, LineFramer};
use crate::ftp::types::{lock_state, FtpEvent, Reply, SessionState};
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::TcpStream;
use tokio::sync::{broadcast, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{timeout_at, Duration, Instant};

/// The single in-flight command slot.
#[derive(Debug)]
struct PendingSlot {
    tx: oneshot::Sender<FtpResult<Reply>>,
    /// Keep waiting through 1xx replies (transfer commands expect a 150
    /// before the terminal reply).
    allow_preliminary: bool,
}

type SharedSlot = Arc<Mutex<Option<PendingSlot>>>;

/// Waitable handle for a submitted command.
///
/// The deadline is recorded at submission; transfer orchestration re-arms it
/// after streaming ends via [`PendingReply::wait_until`].
#[derive(Debug)]
pub struct PendingReply {
    command: String,
    deadline: Instant,
    rx: oneshot::Receiver<FtpResult<Reply>>,
    slot: SharedSlot,
}

impl PendingReply {
    /// Wait until the deadline recorded at submission.
    pub async fn wait(self) -> FtpResult<Reply> {
        let deadline = self.deadline;
        self.wait_until(deadline).await
    }

    /// Wait with an explicit deadline.
    ///
    /// On deadline elapse the pending slot is cleared so a stale reply
    /// cannot resolve a later command. The socket is not reset — the session
    /// may be out of sync with the server afterwards.
    pub async fn wait_until(self, deadline: Instant) -> FtpResult<Reply> {
        match timeout_at(deadline, self.rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(FtpError::disconnected(
                "control connection closed while awaiting reply",
            )),
            Err(_) => {
                lock_state(&self.slot).take();
                Err(FtpError::timeout_for(&self.command))
            }
        }
    }

    pub fn command(&self) -> &str {
        &self.command
    }
}

/// Serialises commands onto the control channel and matches their replies.
#[derive(Debug)]
pub struct CommandDispatcher {
    writer: OwnedWriteHalf,
    slot: SharedSlot,
    session: Arc<Mutex<SessionState>>,
    command_timeout: Duration,
    greeting_rx: Option<oneshot::Receiver<FtpResult<Reply>>>,
    reader: JoinHandle<()>,
}

impl CommandDispatcher {
    /// Split the control stream and spawn the reader task.
    ///
    /// The pending slot is pre-armed for the server greeting before the
    /// reader can observe any bytes, so the greeting cannot be lost to a
    /// startup race.
    pub fn new(
        stream: TcpStream,
        session: Arc<Mutex<SessionState>>,
        events: broadcast::Sender<FtpEvent>,
        command_timeout: Duration,
    ) -> Self {
        let (read_half, writer) = stream.into_split();
        let slot: SharedSlot = Arc::new(Mutex::new(None));
        let (greeting_tx, greeting_rx) = oneshot::channel();
        *lock_state(&slot) = Some(PendingSlot {
            tx: greeting_tx,
            allow_preliminary: false,
        });
        let reader = tokio::spawn(read_loop(
            read_half,
            Arc::clone(&slot),
            Arc::clone(&session),
            events,
        ));
        Self {
            writer,
            slot,
            session,
            command_timeout,
            greeting_rx: Some(greeting_rx),
            reader,
        }
    }

    /// Await the server greeting — the first final reply. Must be consumed
    /// once, before any command is submitted.
    pub async fn wait_greeting(&mut self) -> FtpResult<Reply> {
        let rx = self
            .greeting_rx
            .take()
            .ok_or_else(|| FtpError::validation("greeting already consumed"))?;
        match timeout_at(Instant::now() + self.command_timeout, rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(FtpError::disconnected(
                "control connection closed before greeting",
            )),
            Err(_) => {
                lock_state(&self.slot).take();
                Err(FtpError::connection("timed out waiting for server greeting"))
            }
        }
    }

    /// Write a command and arm the pending slot, returning the waitable
    /// handle. Increments the session command counter and records the
    /// (password-redacted) command text regardless of outcome.
    ///
    /// Rejected with a `Validation` error while another command is pending.
    pub async fn submit(
        &mut self,
        command: &str,
        allow_preliminary: bool,
    ) -> FtpResult<PendingReply> {
        if !lock_state(&self.session).connected {
            return Err(FtpError::disconnected("control channel is not connected"));
        }

        let redacted = redact(command);
        let (tx, rx) = oneshot::channel();
        {
            let mut slot = lock_state(&self.slot);
            if slot.is_some() {
                return Err(FtpError::validation(format!(
                    "a command is already pending, cannot send '{}'",
                    redacted
                )));
            }
            *slot = Some(PendingSlot {
                tx,
                allow_preliminary,
            });
        }
        {
            let mut session = lock_state(&self.session);
            session.command_count += 1;
            session.last_command = Some(redacted.clone());
        }

        log::trace!(">>> {}", redacted);
        let line = format!("{}\r\n", command);
        if let Err(e) = self.writer.write_all(line.as_bytes()).await {
            lock_state(&self.slot).take();
            return Err(FtpError::from(e));
        }

        Ok(PendingReply {
            command: redacted,
            deadline: Instant::now() + self.command_timeout,
            rx,
            slot: Arc::clone(&self.slot),
        })
    }

    /// Submit and wait for the matching final reply.
    pub async fn send(&mut self, command: &str, allow_preliminary: bool) -> FtpResult<Reply> {
        self.submit(command, allow_preliminary).await?.wait().await
    }

    /// Tear down the reader task. Idempotent.
    pub fn shutdown(&self) {
        self.reader.abort();
    }
}

impl Drop for CommandDispatcher {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

/// Redact credential text before it reaches logs or session state.
pub(crate) fn redact(command: &str) -> String {
    if command.len() >= 5 && command[..5].eq_ignore_ascii_case("PASS ") {
        "PASS ****".to_string()
    } else {
        command.to_string()
    }
}

// ─── Reader task ─────────────────────────────────────────────────────

async fn read_loop(
    mut reader: tokio::net::tcp::OwnedReadHalf,
    slot: SharedSlot,
    session: Arc<Mutex<SessionState>>,
    events: broadcast::Sender<FtpEvent>,
) {
    let mut framer = LineFramer::new();
    let mut buf = [0u8; 4096];
    loop {
        match reader.read(&mut buf).await {
            Ok(0) => {
                fail_pending(
                    &slot,
                    FtpError::disconnected("server closed the control connection"),
                );
                mark_disconnected(&session);
                let _ = events.send(FtpEvent::Closed);
                return;
            }
            Ok(n) => {
                for line in framer.push(&buf[..n]) {
                    log::trace!("<<< {}", line);
                    let _ = events.send(FtpEvent::Line(line.clone()));
                    if let ControlLine::Reply(reply) = classify_line(&line) {
                        if reply.is_final {
                            resolve_pending(&slot, reply);
                        }
                    }
                }
            }
            Err(e) => {
                let msg = format!("control read error: {}", e);
                fail_pending(&slot, FtpError::disconnected(msg.clone()));
                mark_disconnected(&session);
                let _ = events.send(FtpEvent::Error(msg));
                let _ = events.send(FtpEvent::Closed);
                return;
            }
        }
    }
}

/// Resolve the pending slot against a final reply line.
///
/// A 1xx reply leaves an `allow_preliminary` command armed; any other final
/// reply consumes the slot: [200,400) resolves, everything else rejects with
/// the reply code. Final replies with no pending command are unsolicited and
/// already surfaced as line events.
fn resolve_pending(slot: &SharedSlot, reply: Reply) {
    let mut guard = lock_state(slot);
    let keep_waiting =
        matches!(guard.as_ref(), Some(p) if p.allow_preliminary && reply.is_preliminary());
    if keep_waiting {
        return;
    }
    if let Some(pending) = guard.take() {
        let result = if reply.is_positive() {
            Ok(reply)
        } else {
            Err(FtpError::from_reply(reply.code, &reply.message))
        };
        let _ = pending.tx.send(result);
    }
}

fn fail_pending(slot: &SharedSlot, err: FtpError) {
    if let Some(pending) = lock_state(slot).take() {
        let _ = pending.tx.send(Err(err));
    }
}

fn mark_disconnected(session: &Arc<Mutex<SessionState>>) {
    let mut state = lock_state(session);
    state.connected = false;
    state.authenticated = false;
}
