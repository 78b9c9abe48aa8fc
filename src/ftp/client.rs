//! Stateful FTP client — owns the control session and issues commands.
//!
//! Lifecycle: `connect()` → greeting (220) → USER → PASS → authenticated.
//! Single-command operations live here; transfers are in `file_ops.rs` and
//! directory operations in `directory.rs`.

use crate::ftp::connection;
use crate::ftp::dispatcher::CommandDispatcher;
use crate::ftp::error::{FtpError, FtpErrorKind, FtpResult};
use crate::ftp::types::{
    lock_state, FtpConfig, FtpEvent, RemoteStat, Reply, SessionState, TransferType,
};
use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use std::sync::{Arc, Mutex};
use tokio::sync::broadcast;
use tokio::time::Duration;
use uuid::Uuid;

/// A connected FTP client session.
#[derive(Debug)]
pub struct FtpClient {
    pub id: String,
    pub(crate) dispatcher: CommandDispatcher,
    pub(crate) config: FtpConfig,
    session: Arc<Mutex<SessionState>>,
    events: broadcast::Sender<FtpEvent>,
}

impl FtpClient {
    /// Establish a new FTP session: open the control connection, wait for
    /// the 220 greeting, then authenticate with USER/PASS.
    ///
    /// No command is sent before the greeting arrives; `authenticated`
    /// becomes true only after the full handshake succeeds.
    pub async fn connect(config: FtpConfig) -> FtpResult<Self> {
        if config.host.is_empty() {
            return Err(FtpError::validation("host must not be empty"));
        }

        let id = Uuid::new_v4().to_string();
        let stream = connection::connect(&config).await?;
        let session = Arc::new(Mutex::new(SessionState {
            connected: true,
            ..Default::default()
        }));
        let (events, _) = broadcast::channel(64);
        let mut dispatcher = CommandDispatcher::new(
            stream,
            Arc::clone(&session),
            events.clone(),
            Duration::from_secs(config.command_timeout_secs),
        );
        let _ = events.send(FtpEvent::Connected {
            host: config.host.clone(),
            port: config.port,
        });
        log::info!("[ftp:{}] connected to {}:{}", id, config.host, config.port);

        let greeting = dispatcher.wait_greeting().await?;
        if greeting.code != 220 {
            return Err(FtpError::from_reply(greeting.code, &greeting.message));
        }

        let user = dispatcher
            .send(&format!("USER {}", config.username), false)
            .await?;
        if user.is_intermediate() {
            if user.code != 331 {
                return Err(FtpError::from_reply(user.code, &user.message));
            }
            let pass = dispatcher
                .send(&format!("PASS {}", config.password), false)
                .await?;
            if !pass.is_success() {
                return Err(FtpError::from_reply(pass.code, &pass.message));
            }
        } else if !user.is_success() {
            return Err(FtpError::from_reply(user.code, &user.message));
        }
        lock_state(&session).authenticated = true;
        log::info!("[ftp:{}] authenticated as {}", id, config.username);

        let type_reply = dispatcher.send(config.transfer_type.command(), false).await?;
        if !type_reply.is_success() {
            return Err(FtpError::from_reply(type_reply.code, &type_reply.message));
        }

        Ok(Self {
            id,
            dispatcher,
            config,
            session,
            events,
        })
    }

    /// Close the session: best-effort QUIT (failures swallowed), then tear
    /// down the transport and clear the session flags.
    pub async fn close(&mut self) {
        if lock_state(&self.session).connected {
            if let Err(e) = self.dispatcher.send("QUIT", false).await {
                log::warn!("[ftp:{}] QUIT failed: {}", self.id, e);
            }
        }
        self.dispatcher.shutdown();
        {
            let mut state = lock_state(&self.session);
            state.connected = false;
            state.authenticated = false;
        }
        let _ = self.events.send(FtpEvent::Closed);
        log::info!("[ftp:{}] closed", self.id);
    }

    // ─── Session introspection ───────────────────────────────────

    /// Snapshot of the session flags and counters.
    pub fn session(&self) -> SessionState {
        lock_state(&self.session).clone()
    }

    pub fn is_connected(&self) -> bool {
        lock_state(&self.session).connected
    }

    pub fn is_authenticated(&self) -> bool {
        lock_state(&self.session).authenticated
    }

    /// Subscribe to session notifications (connected, raw reply lines,
    /// errors, closed). Lagging subscribers lose events.
    pub fn subscribe(&self) -> broadcast::Receiver<FtpEvent> {
        self.events.subscribe()
    }

    // ─── Single-command operations ───────────────────────────────

    /// Execute a raw FTP command (for advanced users / debugging).
    pub async fn raw(&mut self, command: &str) -> FtpResult<Reply> {
        self.dispatcher.send(command, false).await
    }

    /// Probe the control connection with NOOP.
    pub async fn noop(&mut self) -> FtpResult<()> {
        self.expect_success("NOOP").await.map(|_| ())
    }

    /// Change the remote working directory.
    pub async fn cd(&mut self, path: &str) -> FtpResult<()> {
        self.expect_success(&format!("CWD {}", path)).await.map(|_| ())
    }

    /// Current remote working directory, parsed from the PWD reply.
    pub async fn pwd(&mut self) -> FtpResult<String> {
        let reply = self.expect_success("PWD").await?;
        extract_quoted(&reply.message)
            .ok_or_else(|| FtpError::parse(format!("cannot parse PWD reply: {}", reply.message)))
    }

    /// Size of a remote file (RFC 3659 SIZE).
    pub async fn size(&mut self, path: &str) -> FtpResult<u64> {
        let reply = self.expect_success(&format!("SIZE {}", path)).await?;
        reply
            .message
            .trim()
            .parse::<u64>()
            .map_err(|_| FtpError::parse(format!("cannot parse SIZE reply: {}", reply.message)))
    }

    /// Modification time of a remote file (RFC 3659 MDTM), reply payload
    /// `YYYYMMDDhhmmss` in UTC.
    pub async fn modified_time(&mut self, path: &str) -> FtpResult<DateTime<Utc>> {
        let reply = self.expect_success(&format!("MDTM {}", path)).await?;
        parse_mdtm(reply.message.trim())
    }

    /// Whether a remote path exists (file or directory).
    pub async fn exists(&mut self, path: &str) -> FtpResult<bool> {
        Ok(self.stat(path).await?.exists)
    }

    /// Probe a remote path: a successful SIZE marks a file; otherwise a CWD
    /// probe (with the working directory restored) detects a directory.
    pub async fn stat(&mut self, path: &str) -> FtpResult<RemoteStat> {
        match self.size(path).await {
            Ok(size) => Ok(RemoteStat {
                exists: true,
                size: Some(size),
                is_file: true,
                is_dir: false,
            }),
            Err(e) if e.kind == FtpErrorKind::Protocol => {
                let previous = self.pwd().await.ok();
                match self.dispatcher.send(&format!("CWD {}", path), false).await {
                    Ok(_) => {
                        if let Some(prev) = previous {
                            let _ = self.dispatcher.send(&format!("CWD {}", prev), false).await;
                        }
                        Ok(RemoteStat {
                            exists: true,
                            size: None,
                            is_file: false,
                            is_dir: true,
                        })
                    }
                    Err(e2) if e2.kind == FtpErrorKind::Protocol => Ok(RemoteStat {
                        exists: false,
                        size: None,
                        is_file: false,
                        is_dir: false,
                    }),
                    Err(e2) => Err(e2),
                }
            }
            Err(e) => Err(e),
        }
    }

    /// Switch the transfer type for subsequent transfers.
    pub async fn set_type(&mut self, tt: TransferType) -> FtpResult<()> {
        self.expect_success(tt.command()).await?;
        self.config.transfer_type = tt;
        Ok(())
    }

    /// Change file permissions via SITE CHMOD (common but not standard).
    pub async fn chmod(&mut self, path: &str, mode: &str) -> FtpResult<()> {
        self.expect_success(&format!("SITE CHMOD {} {}", mode, path))
            .await
            .map(|_| ())
    }

    /// Execute a raw SITE command.
    pub async fn site(&mut self, args: &str) -> FtpResult<Reply> {
        self.dispatcher.send(&format!("SITE {}", args), false).await
    }

    // ─── Internals ───────────────────────────────────────────────

    /// Send a command and require a 2xx completion reply.
    pub(crate) async fn expect_success(&mut self, command: &str) -> FtpResult<Reply> {
        let reply = self.dispatcher.send(command, false).await?;
        if !reply.is_success() {
            return Err(FtpError::from_reply(reply.code, &reply.message));
        }
        Ok(reply)
    }
}

// ─── Helpers ─────────────────────────────────────────────────────────

/// Extract the first double-quoted segment, as in `257 "/some/path" created`.
pub(crate) fn extract_quoted(text: &str) -> Option<String> {
    let start = text.find('"')?;
    let end = text[start + 1..].find('"')?;
    Some(text[start + 1..start + 1 + end].to_string())
}

/// Parse a 14-digit `YYYYMMDDhhmmss` MDTM payload as UTC. Fractional
/// seconds after the 14th digit are ignored.
fn parse_mdtm(text: &str) -> FtpResult<DateTime<Utc>> {
    let digits = text
        .get(..14)
        .filter(|s| s.bytes().all(|b| b.is_ascii_digit()))
        .ok_or_else(|| FtpError::parse(format!("cannot parse MDTM reply: {}", text)))?;
    NaiveDateTime::parse_from_str(digits, "%Y%m%d%H%M%S")
        .map(|dt| Utc.from_utc_datetime(&dt))
        .map_err(|_| FtpError::parse(format!("cannot parse MDTM reply: {}", text)))
}
