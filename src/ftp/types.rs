//! Shared types for the FTP engine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::{Mutex, MutexGuard, PoisonError};

// ─── Connection / Session ────────────────────────────────────────────

/// Configuration for a single FTP connection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FtpConfig {
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_username")]
    pub username: String,
    #[serde(default = "default_password")]
    pub password: String,
    /// Control-connection establishment timeout in seconds.
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
    /// Per-command reply deadline in seconds.
    #[serde(default = "default_command_timeout")]
    pub command_timeout_secs: u64,
    /// Data-channel connect and terminal-reply timeout in seconds.
    #[serde(default = "default_data_timeout")]
    pub data_timeout_secs: u64,
    /// Arm TCP keep-alive probing on the control socket.
    #[serde(default = "default_true")]
    pub keepalive: bool,
    /// Transfer type negotiated after login (RFC 959 TYPE command).
    #[serde(default)]
    pub transfer_type: TransferType,
    /// When set, a transfer whose data socket closed cleanly is declared
    /// successful after this many seconds even if no terminal reply arrived.
    /// Some servers close the data connection without sending 226; leave
    /// unset to require the terminal reply. A late reply then surfaces as an
    /// unsolicited line event.
    #[serde(default)]
    pub completion_grace_secs: Option<u64>,
}

fn default_port() -> u16 {
    21
}
fn default_username() -> String {
    "anonymous".into()
}
fn default_password() -> String {
    "anonymous@".into()
}
fn default_connect_timeout() -> u64 {
    15
}
fn default_command_timeout() -> u64 {
    30
}
fn default_data_timeout() -> u64 {
    30
}
fn default_true() -> bool {
    true
}

impl FtpConfig {
    pub fn new(
        host: impl Into<String>,
        port: u16,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            host: host.into(),
            port,
            username: username.into(),
            password: password.into(),
            ..Self::default()
        }
    }
}

impl Default for FtpConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: default_port(),
            username: default_username(),
            password: default_password(),
            connect_timeout_secs: default_connect_timeout(),
            command_timeout_secs: default_command_timeout(),
            data_timeout_secs: default_data_timeout(),
            keepalive: true,
            transfer_type: TransferType::Binary,
            completion_grace_secs: None,
        }
    }
}

/// Transfer type (RFC 959 TYPE command).
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum TransferType {
    Ascii,
    #[default]
    Binary,
}

impl TransferType {
    pub(crate) fn command(self) -> &'static str {
        match self {
            TransferType::Ascii => "TYPE A",
            TransferType::Binary => "TYPE I",
        }
    }
}

/// Mutable control-session state. One instance per client, shared with the
/// dispatcher and its reader task; mutated only at connect/close/auth
/// transitions and on each command submission.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionState {
    pub connected: bool,
    pub authenticated: bool,
    pub command_count: u64,
    /// Most recently dispatched command, password text redacted.
    pub last_command: Option<String>,
}

/// Lock a state mutex, recovering the data if a previous holder panicked.
pub(crate) fn lock_state<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

// ─── FTP Reply ───────────────────────────────────────────────────────

/// A single parsed control-channel reply line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reply {
    pub code: u16,
    /// Text after the code and separator.
    pub message: String,
    /// The line as received, CRLF stripped.
    pub raw: String,
    /// Space in the 4th column — this line terminates its reply block.
    /// A hyphen means continuation lines with the same code follow.
    pub is_final: bool,
}

impl Reply {
    /// Positive-preliminary reply (1xx).
    pub fn is_preliminary(&self) -> bool {
        (100..200).contains(&self.code)
    }

    /// Positive-completion reply (2xx).
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.code)
    }

    /// Positive-intermediate reply (3xx), expects a follow-up command.
    pub fn is_intermediate(&self) -> bool {
        (300..400).contains(&self.code)
    }

    /// Any reply a pending command resolves on (2xx or 3xx).
    pub fn is_positive(&self) -> bool {
        (200..400).contains(&self.code)
    }
}

// ─── Data channel ────────────────────────────────────────────────────

/// Endpoint advertised by a PASV reply. Consumed once to open exactly one
/// data socket, then discarded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataEndpoint {
    /// Dotted-quad address.
    pub host: String,
    pub port: u16,
}

impl DataEndpoint {
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

// ─── Directory Listing ───────────────────────────────────────────────

/// Type of a remote filesystem entry.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum FtpEntryKind {
    File,
    Directory,
    Symlink,
    Unknown,
}

/// One entry from a directory listing (parsed from LIST output).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FtpEntry {
    pub name: String,
    pub kind: FtpEntryKind,
    pub size: u64,
    pub modified: Option<DateTime<Utc>>,
    pub permissions: Option<String>,
    pub owner: Option<String>,
    pub group: Option<String>,
    pub link_target: Option<String>,
    /// Raw line from the server (for debugging).
    pub raw: Option<String>,
}

/// Result of probing a remote path with SIZE and a CWD fallback.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteStat {
    pub exists: bool,
    pub size: Option<u64>,
    pub is_file: bool,
    pub is_dir: bool,
}

// ─── Session events ──────────────────────────────────────────────────

/// Notifications emitted by a client session.
#[derive(Debug, Clone)]
pub enum FtpEvent {
    Connected { host: String, port: u16 },
    /// A raw control-channel line as received (CRLF stripped).
    Line(String),
    Error(String),
    Closed,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_defaults_from_json() {
        let cfg: FtpConfig = serde_json::from_str(r#"{"host":"ftp.example.com"}"#).unwrap();
        assert_eq!(cfg.port, 21);
        assert_eq!(cfg.username, "anonymous");
        assert_eq!(cfg.command_timeout_secs, 30);
        assert!(cfg.keepalive);
        assert_eq!(cfg.transfer_type, TransferType::Binary);
        assert!(cfg.completion_grace_secs.is_none());
    }

    #[test]
    fn reply_code_classes() {
        let reply = |code| Reply {
            code,
            message: String::new(),
            raw: String::new(),
            is_final: true,
        };
        assert!(reply(150).is_preliminary());
        assert!(reply(226).is_success());
        assert!(reply(350).is_intermediate());
        assert!(reply(226).is_positive() && reply(350).is_positive());
        assert!(!reply(550).is_positive() && !reply(150).is_positive());
    }

    #[test]
    fn endpoint_addr() {
        let ep = DataEndpoint {
            host: "127.0.0.1".into(),
            port: 51250,
        };
        assert_eq!(ep.addr(), "127.0.0.1:51250");
    }
}
