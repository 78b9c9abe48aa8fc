//! FTP-specific error type.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Categorised FTP error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FtpError {
    pub kind: FtpErrorKind,
    pub message: String,
    /// FTP reply code that triggered the error, if any.
    pub code: Option<u16>,
    /// Command whose dispatch failed, if any (credentials redacted).
    pub command: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum FtpErrorKind {
    /// TCP connect failure on the control or data socket, or no greeting.
    Connection,
    /// Server replied 4xx/5xx (or an out-of-protocol code) to a command.
    Protocol,
    /// No final reply arrived before the command deadline.
    Timeout,
    /// Un-parseable PASV, MDTM, SIZE or PWD payload.
    Parse,
    /// Caller error: missing argument, overlapping command.
    Validation,
    /// A local I/O error on the control or data socket.
    Io,
    /// Control connection closed underneath us.
    Disconnected,
}

pub type FtpResult<T> = Result<T, FtpError>;

// ── Construction helpers ─────────────────────────────────────────────

impl FtpError {
    pub fn new(kind: FtpErrorKind, msg: impl Into<String>) -> Self {
        Self {
            kind,
            message: msg.into(),
            code: None,
            command: None,
        }
    }

    pub fn with_code(mut self, code: u16) -> Self {
        self.code = Some(code);
        self
    }

    pub fn with_command(mut self, command: impl Into<String>) -> Self {
        self.command = Some(command.into());
        self
    }

    // ── Convenience constructors ─────────────────────────────────

    pub fn connection(msg: impl Into<String>) -> Self {
        Self::new(FtpErrorKind::Connection, msg)
    }

    pub fn parse(msg: impl Into<String>) -> Self {
        Self::new(FtpErrorKind::Parse, msg)
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::new(FtpErrorKind::Validation, msg)
    }

    pub fn io_error(msg: impl Into<String>) -> Self {
        Self::new(FtpErrorKind::Io, msg)
    }

    pub fn disconnected(msg: impl Into<String>) -> Self {
        Self::new(FtpErrorKind::Disconnected, msg)
    }

    /// The deadline elapsed before a final reply to `command` arrived.
    pub fn timeout_for(command: &str) -> Self {
        Self::new(
            FtpErrorKind::Timeout,
            format!("no final reply to '{}' before deadline", command),
        )
        .with_command(command)
    }

    /// Wrap a server reply that rejects the current command.
    pub fn from_reply(code: u16, text: &str) -> Self {
        Self::new(FtpErrorKind::Protocol, text).with_code(code)
    }
}

impl fmt::Display for FtpError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.code {
            Some(code) => write!(f, "[FTP {:?} {}] {}", self.kind, code, self.message),
            None => write!(f, "[FTP {:?}] {}", self.kind, self.message),
        }
    }
}

impl std::error::Error for FtpError {}

impl From<std::io::Error> for FtpError {
    fn from(e: std::io::Error) -> Self {
        if e.kind() == std::io::ErrorKind::TimedOut {
            Self::new(FtpErrorKind::Timeout, format!("I/O timeout: {}", e))
        } else {
            Self::io_error(e.to_string())
        }
    }
}
