//! TCP transport — establishes the FTP control connection.

use crate::ftp::error::{FtpError, FtpResult};
use crate::ftp::types::FtpConfig;
use socket2::{SockRef, TcpKeepalive};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::timeout;

/// Probe interval armed on the control socket when keep-alive is enabled.
/// Detects dead peers; has no interaction with command/reply matching.
const KEEPALIVE_TIME: Duration = Duration::from_secs(30);

/// Open the control connection.
///
/// Fails with a `Connection` error when the transport cannot be established
/// within `connect_timeout_secs`.
pub async fn connect(config: &FtpConfig) -> FtpResult<TcpStream> {
    let addr = format!("{}:{}", config.host, config.port);
    let dur = Duration::from_secs(config.connect_timeout_secs);

    let tcp = timeout(dur, TcpStream::connect(&addr))
        .await
        .map_err(|_| FtpError::connection(format!("TCP connect to {} timed out", addr)))?
        .map_err(|e| FtpError::connection(format!("TCP connect to {}: {}", addr, e)))?;

    tcp.set_nodelay(true).ok();
    if config.keepalive {
        let ka = TcpKeepalive::new().with_time(KEEPALIVE_TIME);
        SockRef::from(&tcp).set_tcp_keepalive(&ka).ok();
    }
    Ok(tcp)
}
