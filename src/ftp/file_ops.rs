//! File transfers over the passive data channel.
//!
//! Every transfer follows the same shape: negotiate PASV, open the data
//! socket, submit the transfer command with preliminary replies allowed,
//! stream the payload, then reconcile the io outcome against the terminal
//! control reply. The data socket is used for exactly one transfer.

use crate::ftp::client::FtpClient;
use crate::ftp::dispatcher::PendingReply;
use crate::ftp::error::{FtpError, FtpErrorKind, FtpResult};
use crate::ftp::transfer;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::{Duration, Instant};

const CHUNK: usize = 65_536;

impl FtpClient {
    /// Upload a byte buffer to `remote_path` (STOR). Returns the number of
    /// bytes written to the data channel.
    pub async fn upload(&mut self, remote_path: &str, data: &[u8]) -> FtpResult<u64> {
        let (pending, mut stream) = self.open_transfer(&format!("STOR {}", remote_path)).await?;
        let io = async {
            let sent = copy_out(&mut stream, data).await?;
            // Shutdown signals EOF so the server can finish the store.
            stream.shutdown().await.map_err(FtpError::from)?;
            Ok(sent)
        }
        .await;
        drop(stream);
        let sent = self.finish_transfer(pending, io).await?;
        log::debug!("[ftp:{}] uploaded {} bytes to {}", self.id, sent, remote_path);
        Ok(sent)
    }

    /// Download a remote file (RETR) into memory.
    pub async fn download(&mut self, remote_path: &str) -> FtpResult<Vec<u8>> {
        let mut out = Vec::new();
        self.download_streaming(remote_path, &mut out).await?;
        Ok(out)
    }

    /// Download a remote file (RETR), streaming into `writer`. Returns the
    /// number of bytes received.
    pub async fn download_streaming<W>(&mut self, remote_path: &str, writer: &mut W) -> FtpResult<u64>
    where
        W: AsyncWrite + Unpin + ?Sized,
    {
        let (pending, mut stream) = self.open_transfer(&format!("RETR {}", remote_path)).await?;
        let io = drain_in(&mut stream, writer).await;
        drop(stream);
        let received = self.finish_transfer(pending, io).await?;
        log::debug!(
            "[ftp:{}] downloaded {} bytes from {}",
            self.id,
            received,
            remote_path
        );
        Ok(received)
    }

    /// Run a command whose payload arrives on the data channel (LIST and
    /// friends) and collect it as text.
    pub(crate) async fn fetch_text(&mut self, command: &str) -> FtpResult<String> {
        let (pending, mut stream) = self.open_transfer(command).await?;
        let mut out = Vec::new();
        let io = drain_in(&mut stream, &mut out).await;
        drop(stream);
        self.finish_transfer(pending, io).await?;
        Ok(String::from_utf8_lossy(&out).into_owned())
    }

    /// Negotiate the passive endpoint, open the data socket, then submit
    /// the transfer command. The command's pending slot stays armed through
    /// the 150 preliminary reply; the terminal reply resolves it later.
    async fn open_transfer(&mut self, command: &str) -> FtpResult<(PendingReply, TcpStream)> {
        let endpoint = transfer::negotiate(&mut self.dispatcher).await?;
        let data_timeout = Duration::from_secs(self.config.data_timeout_secs);
        let stream = transfer::open(&endpoint, data_timeout).await?;
        let pending = self.dispatcher.submit(command, true).await?;
        Ok((pending, stream))
    }

    /// Reconcile the streaming outcome with the terminal control reply.
    ///
    /// A transfer succeeds only when both sides agree: the data channel
    /// streamed without error AND the server sent a 2xx terminal reply.
    /// With `completion_grace_secs` set, a cleanly closed data socket is
    /// accepted after the grace window even if the terminal reply never
    /// arrives (some servers omit it); a reply arriving later surfaces as
    /// an unsolicited line event.
    async fn finish_transfer(
        &mut self,
        pending: PendingReply,
        io_result: FtpResult<u64>,
    ) -> FtpResult<u64> {
        let data_timeout = Duration::from_secs(self.config.data_timeout_secs);
        let grace = self.config.completion_grace_secs.map(Duration::from_secs);

        let bytes = match io_result {
            Ok(bytes) => bytes,
            Err(e) => {
                // Drain the terminal reply to keep the channel in sync, but
                // report the streaming failure.
                let _ = pending.wait_until(Instant::now() + data_timeout).await;
                return Err(e);
            }
        };

        let deadline = Instant::now() + grace.unwrap_or(data_timeout);
        match pending.wait_until(deadline).await {
            Ok(_) => Ok(bytes),
            Err(e) if e.kind == FtpErrorKind::Timeout && grace.is_some() => {
                log::debug!(
                    "[ftp:{}] no terminal reply within grace window, accepting transfer",
                    self.id
                );
                Ok(bytes)
            }
            Err(e) => Err(e),
        }
    }
}

// ─── Streaming helpers ───────────────────────────────────────────────

/// Write `data` to `dst` in fixed-size chunks.
async fn copy_out<W>(dst: &mut W, data: &[u8]) -> FtpResult<u64>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    let mut sent = 0u64;
    for chunk in data.chunks(CHUNK) {
        dst.write_all(chunk).await?;
        sent += chunk.len() as u64;
    }
    dst.flush().await?;
    Ok(sent)
}

/// Read `src` to EOF, copying into `dst`.
async fn drain_in<R, W>(src: &mut R, dst: &mut W) -> FtpResult<u64>
where
    R: AsyncRead + Unpin + ?Sized,
    W: AsyncWrite + Unpin + ?Sized,
{
    let mut buf = vec![0u8; CHUNK];
    let mut received = 0u64;
    loop {
        let n = src.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        dst.write_all(&buf[..n]).await?;
        received += n as u64;
    }
    dst.flush().await?;
    Ok(received)
}
