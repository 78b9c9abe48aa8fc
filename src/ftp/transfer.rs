//! Passive-mode data-channel negotiation (RFC 959 PASV).
//!
//! The server designates the listening endpoint; we parse it from the 227
//! reply and dial it. Each data socket carries exactly one transfer and is
//! then discarded — no pooling or reuse.

use crate::ftp::dispatcher::CommandDispatcher;
use crate::ftp::error::{FtpError, FtpResult};
use crate::ftp::types::DataEndpoint;
use lazy_static::lazy_static;
use regex::Regex;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::timeout;

lazy_static! {
    static ref PASV_RE: Regex =
        Regex::new(r"\((\d{1,3}),(\d{1,3}),(\d{1,3}),(\d{1,3}),(\d{1,3}),(\d{1,3})\)").unwrap();
}

/// Issue `PASV` and parse the advertised endpoint from the reply.
pub async fn negotiate(dispatcher: &mut CommandDispatcher) -> FtpResult<DataEndpoint> {
    let reply = dispatcher.send("PASV", false).await?;
    parse_pasv(&reply.raw)
}

/// Parse `(h1,h2,h3,h4,p1,p2)` from a 227 reply:
/// address `h1.h2.h3.h4`, port `p1*256 + p2`.
pub fn parse_pasv(text: &str) -> FtpResult<DataEndpoint> {
    let caps = PASV_RE
        .captures(text)
        .ok_or_else(|| FtpError::parse(format!("cannot parse PASV reply: {}", text)))?;

    let mut octets = [0u8; 6];
    for (i, octet) in octets.iter_mut().enumerate() {
        *octet = caps[i + 1]
            .parse::<u8>()
            .map_err(|_| FtpError::parse(format!("PASV octet out of range: {}", &caps[i + 1])))?;
    }

    Ok(DataEndpoint {
        host: format!("{}.{}.{}.{}", octets[0], octets[1], octets[2], octets[3]),
        port: u16::from(octets[4]) * 256 + u16::from(octets[5]),
    })
}

/// Open the data connection to a negotiated endpoint.
pub async fn open(endpoint: &DataEndpoint, data_timeout: Duration) -> FtpResult<TcpStream> {
    let addr = endpoint.addr();
    let tcp = timeout(data_timeout, TcpStream::connect(&addr))
        .await
        .map_err(|_| FtpError::connection(format!("data connect to {} timed out", addr)))?
        .map_err(|e| FtpError::connection(format!("data connect to {}: {}", addr, e)))?;
    tcp.set_nodelay(true).ok();
    Ok(tcp)
}
