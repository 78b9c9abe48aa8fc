//! Control-channel framing and reply classification (RFC 959 §4).
//!
//! Two pure layers, each independently testable:
//! - [`LineFramer`] reassembles CRLF-delimited lines from arbitrarily
//!   chunked socket reads
//! - [`classify_line`] turns a framed line into a [`Reply`] or a raw
//!   notification

use crate::ftp::types::Reply;

/// Reassembles CRLF-delimited lines from a byte stream.
///
/// Retains partial state between calls so it tolerates any chunking of the
/// TCP stream; a trailing unterminated fragment is held until completed by a
/// later chunk. Framing never fails — malformed encodings are passed through
/// lossily for the parser layer to deal with.
#[derive(Debug, Default)]
pub struct LineFramer {
    buf: Vec<u8>,
}

impl LineFramer {
    pub fn new() -> Self {
        Self {
            buf: Vec::with_capacity(1024),
        }
    }

    /// Feed a chunk of bytes, returning every line it completes, in order.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buf.extend_from_slice(chunk);
        let mut lines = Vec::new();
        while let Some(pos) = find_crlf(&self.buf) {
            let line: Vec<u8> = self.buf.drain(..pos + 2).collect();
            lines.push(String::from_utf8_lossy(&line[..pos]).into_owned());
        }
        lines
    }
}

fn find_crlf(buf: &[u8]) -> Option<usize> {
    buf.windows(2).position(|w| w == b"\r\n")
}

/// Classification of a framed control-channel line.
#[derive(Debug, Clone, PartialEq)]
pub enum ControlLine {
    /// A well-formed reply line (final or continuation).
    Reply(Reply),
    /// Anything that cannot carry a reply code: shorter than 4 characters,
    /// non-digit code, code outside 100–599, or unknown separator. Surfaced
    /// as a raw event, never matched against a pending command.
    Notification(String),
}

/// Classify one framed line.
///
/// The 4th column decides finality: `' '` ends the reply block, `'-'` means
/// continuation lines with the same code follow. The finality check never
/// fires on continuation lines even when their code matches.
pub fn classify_line(line: &str) -> ControlLine {
    let bytes = line.as_bytes();
    if bytes.len() < 4 || !bytes[..3].iter().all(|b| b.is_ascii_digit()) {
        return ControlLine::Notification(line.to_string());
    }
    let code = match line[..3].parse::<u16>() {
        Ok(c) if (100..=599).contains(&c) => c,
        _ => return ControlLine::Notification(line.to_string()),
    };
    let is_final = match bytes[3] {
        b' ' => true,
        b'-' => false,
        _ => return ControlLine::Notification(line.to_string()),
    };
    ControlLine::Reply(Reply {
        code,
        message: line[4..].to_string(),
        raw: line.to_string(),
        is_final,
    })
}
