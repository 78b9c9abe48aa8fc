//! # ftpkit — async FTP client engine
//!
//! Implements the RFC 959 subset needed for authenticated passive-mode
//! transfers over raw TCP:
//! - control-channel command dispatch with multi-line reply matching
//! - passive-mode (PASV) data-channel negotiation
//! - transfer orchestration requiring both data-socket closure and a
//!   terminal control reply
//!
//! Architecture:
//! - `types` — config, session state, replies, listing entries
//! - `error` — categorised error type
//! - `protocol` — CRLF line framing and reply-line classification
//! - `dispatcher` — single-pending-slot command dispatch + reader task
//! - `connection` — TCP transport with keep-alive
//! - `client` — stateful client (greeting, USER/PASS, single-command ops)
//! - `transfer` — PASV negotiation and the per-transfer data socket
//! - `file_ops` — upload / download / streamed download orchestration
//! - `directory` — listing, mkdir/rmdir, rename, ensure-dir walk
//! - `parser` — Unix/Windows LIST output parsing

pub mod types;
pub mod error;
pub mod protocol;
pub mod dispatcher;
pub mod connection;
pub mod client;
pub mod transfer;
pub mod file_ops;
pub mod directory;
pub mod parser;

// Re-exports for lib.rs consumers
pub use client::FtpClient;
pub use error::{FtpError, FtpErrorKind, FtpResult};
pub use types::*;
