//! Directory operations: listing, creation, removal, renames.

use crate::ftp::client::FtpClient;
use crate::ftp::error::{FtpError, FtpErrorKind, FtpResult};
use crate::ftp::parser::parse_listing;
use crate::ftp::types::{FtpEntry, FtpEntryKind};

impl FtpClient {
    /// Raw LIST output for a remote directory.
    pub async fn list(&mut self, path: &str) -> FtpResult<String> {
        self.fetch_text(&list_command(path)).await
    }

    /// List a remote directory with full entry metadata.
    pub async fn list_detailed(&mut self, path: &str) -> FtpResult<Vec<FtpEntry>> {
        let raw = self.fetch_text(&list_command(path)).await?;
        Ok(parse_listing(&raw))
    }

    /// Create a single remote directory (MKD). The parent must exist.
    pub async fn mkdir(&mut self, path: &str) -> FtpResult<()> {
        self.expect_success(&format!("MKD {}", path)).await.map(|_| ())
    }

    /// Remove an empty remote directory (RMD).
    pub async fn rmdir(&mut self, path: &str) -> FtpResult<()> {
        self.expect_success(&format!("RMD {}", path)).await.map(|_| ())
    }

    /// Delete a remote file (DELE).
    pub async fn delete(&mut self, path: &str) -> FtpResult<()> {
        self.expect_success(&format!("DELE {}", path)).await.map(|_| ())
    }

    /// Remove a remote directory; with `recursive`, its contents first.
    pub async fn remove_dir(&mut self, path: &str, recursive: bool) -> FtpResult<()> {
        if recursive {
            let entries = self.list_detailed(path).await?;
            for entry in entries {
                let child = join_path(path, &entry.name);
                match entry.kind {
                    FtpEntryKind::Directory => {
                        Box::pin(self.remove_dir(&child, true)).await?
                    }
                    _ => self.delete(&child).await?,
                }
            }
        }
        self.rmdir(path).await
    }

    /// Rename or move a remote path (RNFR then RNTO).
    pub async fn rename(&mut self, from: &str, to: &str) -> FtpResult<()> {
        let reply = self.dispatcher.send(&format!("RNFR {}", from), false).await?;
        if reply.code != 350 {
            return Err(FtpError::from_reply(reply.code, &reply.message));
        }
        self.expect_success(&format!("RNTO {}", to)).await.map(|_| ())
    }

    /// Ensure a remote directory path exists, creating what is missing.
    ///
    /// Probes with CWD first. Without `recursive` only the leaf is created.
    /// With `recursive` the ancestor chain is walked upwards (an explicit
    /// loop, bounded by path depth) to the deepest existing ancestor, then
    /// MKD is issued for each missing component shallowest-first. An
    /// "already exists" rejection from a concurrent creator is swallowed.
    /// The working directory is restored afterwards.
    pub async fn ensure_dir(&mut self, path: &str, recursive: bool) -> FtpResult<()> {
        let path = normalize_path(path);
        if is_trivial_dir(&path) {
            return Ok(());
        }

        let previous = self.pwd().await.ok();

        let mut missing: Vec<String> = Vec::new();
        let mut probe = path.clone();
        loop {
            if is_trivial_dir(&probe) || self.probe_dir(&probe).await? {
                break;
            }
            missing.push(probe.clone());
            if !recursive {
                break;
            }
            match parent_path(&probe) {
                Some(parent) => probe = parent,
                None => break,
            }
        }

        let mut outcome = Ok(());
        for dir in missing.iter().rev() {
            if let Err(e) = self.expect_success(&format!("MKD {}", dir)).await {
                if is_already_exists(&e) {
                    log::debug!("[ftp:{}] {} already exists, continuing", self.id, dir);
                    continue;
                }
                outcome = Err(e);
                break;
            }
        }

        if let Some(prev) = previous {
            let _ = self.dispatcher.send(&format!("CWD {}", prev), false).await;
        }
        outcome
    }

    /// Ensure the parent directory of a remote file path exists.
    pub async fn ensure_parent_dir(&mut self, path: &str) -> FtpResult<()> {
        match parent_path(&normalize_path(path)) {
            Some(parent) => self.ensure_dir(&parent, true).await,
            None => Ok(()),
        }
    }

    /// CWD probe: true when the path is an enterable directory, false on a
    /// server rejection, error on transport failure.
    async fn probe_dir(&mut self, path: &str) -> FtpResult<bool> {
        match self.dispatcher.send(&format!("CWD {}", path), false).await {
            Ok(_) => Ok(true),
            Err(e) if e.kind == FtpErrorKind::Protocol => Ok(false),
            Err(e) => Err(e),
        }
    }
}

// ─── Path helpers ────────────────────────────────────────────────────

fn list_command(path: &str) -> String {
    let path = normalize_path(path);
    if is_trivial_dir(&path) {
        "LIST".to_string()
    } else {
        format!("LIST {}", path)
    }
}

/// Normalize separators: backslashes become `/`, runs of separators
/// collapse, any trailing slash is trimmed (the root keeps its slash).
pub(crate) fn normalize_path(path: &str) -> String {
    let mut out = String::with_capacity(path.len());
    let mut prev_sep = false;
    for c in path.trim().chars() {
        let is_sep = c == '/' || c == '\\';
        if is_sep {
            if !prev_sep {
                out.push('/');
            }
        } else {
            out.push(c);
        }
        prev_sep = is_sep;
    }
    if out.len() > 1 && out.ends_with('/') {
        out.pop();
    }
    out
}

/// Parent of a normalized path, or `None` at the top.
pub(crate) fn parent_path(path: &str) -> Option<String> {
    let path = normalize_path(path);
    if is_trivial_dir(&path) {
        return None;
    }
    match path.rfind('/') {
        Some(0) => Some("/".to_string()),
        Some(pos) => Some(path[..pos].to_string()),
        None => None,
    }
}

pub(crate) fn join_path(base: &str, name: &str) -> String {
    let base = normalize_path(base);
    if is_trivial_dir(&base) && base != "/" {
        name.to_string()
    } else if base == "/" {
        format!("/{}", name)
    } else {
        format!("{}/{}", base, name)
    }
}

/// Paths that always exist and never need creating.
fn is_trivial_dir(path: &str) -> bool {
    matches!(path, "" | "/" | ".")
}

/// MKD rejection from a directory that already exists; servers phrase this
/// as a 550 with "exists" somewhere in the text.
fn is_already_exists(err: &FtpError) -> bool {
    err.kind == FtpErrorKind::Protocol
        && matches!(err.code, Some(c) if (500..600).contains(&c))
        && err.message.to_lowercase().contains("exist")
}
