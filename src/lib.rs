//! Async FTP client library. See [`ftp`] for the engine modules.

pub mod ftp;

pub use ftp::{FtpClient, FtpConfig, FtpError, FtpErrorKind, FtpResult};
