//! LIST response parser.
//!
//! Supports the two formats seen in the wild:
//! 1. **Unix-style** (`ls -l`): `-rwxr-xr-x 1 owner group 1234 Jan  1 12:00 file.txt`
//! 2. **Windows/IIS-style**: `01-01-26  12:00AM       1234 file.txt`
//!
//! Unrecognised lines fall back to a raw entry so no listing data is lost.

use crate::ftp::types::{FtpEntry, FtpEntryKind};
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref UNIX_RE: Regex = Regex::new(
        r"(?x)
        ^([dlcbps-][rwxsStT-]{9})\s+   # permissions
        (\d+)\s+                         # link count
        (\S+)\s+                         # owner
        (\S+)\s+                         # group
        (\d+)\s+                         # size
        (\w{3}\s+\d{1,2}\s+[\d:]+)\s+   # date
        (.+)$                            # filename (possibly with -> target)
        ",
    )
    .unwrap();
    static ref WINDOWS_RE: Regex = Regex::new(
        r"(?x)
        ^(\d{2}-\d{2}-\d{2})\s+         # date
        (\d{1,2}:\d{2}(?:AM|PM)?)\s+    # time
        (<DIR>|\d+)\s+                   # size or <DIR>
        (.+)$                            # filename
        ",
    )
    .unwrap();
}

/// Parse a full multi-line LIST response body.
pub fn parse_listing(raw: &str) -> Vec<FtpEntry> {
    raw.lines()
        .filter(|l| !l.trim().is_empty())
        .filter_map(|line| parse_line(line.trim_end()))
        .filter(|e| e.name != "." && e.name != "..")
        .collect()
}

/// Parse a single line from a listing.
fn parse_line(line: &str) -> Option<FtpEntry> {
    // "total 12" header emitted by many Unix servers.
    if line.starts_with("total ") {
        return None;
    }

    if let Some(e) = parse_unix(line) {
        return Some(e);
    }

    if let Some(e) = parse_windows(line) {
        return Some(e);
    }

    // Fallback: treat the whole line as a filename.
    Some(FtpEntry {
        name: line.to_string(),
        kind: FtpEntryKind::Unknown,
        size: 0,
        modified: None,
        permissions: None,
        owner: None,
        group: None,
        link_target: None,
        raw: Some(line.to_string()),
    })
}

// ─── Unix-style parser ───────────────────────────────────────────────

/// Parse a Unix `ls -l` line:
/// ```text
/// drwxr-xr-x   2 user group  4096 Jan  1 12:00 dirname
/// -rw-r--r--   1 user group  1234 Jan  1  2025 file.txt
/// lrwxrwxrwx   1 user group    42 Jan  1 12:00 link -> target
/// ```
fn parse_unix(line: &str) -> Option<FtpEntry> {
    let caps = UNIX_RE.captures(line)?;

    let perms = caps.get(1)?.as_str();
    let owner = caps.get(3).map(|m| m.as_str().to_string());
    let group = caps.get(4).map(|m| m.as_str().to_string());
    let size = caps.get(5)?.as_str().parse::<u64>().unwrap_or(0);
    let date_str = caps.get(6)?.as_str();
    let name_raw = caps.get(7)?.as_str();

    let kind = match perms.as_bytes().first() {
        Some(b'd') => FtpEntryKind::Directory,
        Some(b'l') => FtpEntryKind::Symlink,
        Some(b'-') => FtpEntryKind::File,
        _ => FtpEntryKind::Unknown,
    };

    let (name, link_target) = if kind == FtpEntryKind::Symlink {
        match name_raw.find(" -> ") {
            Some(pos) => (
                name_raw[..pos].to_string(),
                Some(name_raw[pos + 4..].to_string()),
            ),
            None => (name_raw.to_string(), None),
        }
    } else {
        (name_raw.to_string(), None)
    };

    Some(FtpEntry {
        name,
        kind,
        size,
        modified: parse_unix_date(date_str),
        permissions: Some(perms.to_string()),
        owner,
        group,
        link_target,
        raw: Some(line.to_string()),
    })
}

/// Parse the date portion: "Jan  1 12:00" or "Jan  1  2025"
fn parse_unix_date(s: &str) -> Option<DateTime<Utc>> {
    let normalised: String = s.split_whitespace().collect::<Vec<_>>().join(" ");

    // "Jan 1 12:00" — current year implied.
    if let Ok(dt) = NaiveDateTime::parse_from_str(
        &format!("{} {}", Utc::now().format("%Y"), normalised),
        "%Y %b %d %H:%M",
    ) {
        return Some(Utc.from_utc_datetime(&dt));
    }

    // "Jan 1 2025" — no time.
    if let Ok(date) = NaiveDate::parse_from_str(&normalised, "%b %d %Y") {
        let dt = date.and_time(NaiveTime::from_hms_opt(0, 0, 0)?);
        return Some(Utc.from_utc_datetime(&dt));
    }

    None
}

// ─── Windows-style parser ────────────────────────────────────────────

/// Parse a Windows / IIS style line:
/// ```text
/// 01-01-26  12:00AM       1234 file.txt
/// 01-01-26  12:00PM      <DIR> Directory Name
/// ```
fn parse_windows(line: &str) -> Option<FtpEntry> {
    let caps = WINDOWS_RE.captures(line)?;

    let date_str = caps.get(1)?.as_str();
    let time_str = caps.get(2)?.as_str();
    let size_or_dir = caps.get(3)?.as_str();
    let name = caps.get(4)?.as_str().to_string();

    let (kind, size) = if size_or_dir == "<DIR>" {
        (FtpEntryKind::Directory, 0)
    } else {
        (FtpEntryKind::File, size_or_dir.parse::<u64>().unwrap_or(0))
    };

    Some(FtpEntry {
        name,
        kind,
        size,
        modified: parse_windows_date(date_str, time_str),
        permissions: None,
        owner: None,
        group: None,
        link_target: None,
        raw: Some(line.to_string()),
    })
}

fn parse_windows_date(date: &str, time: &str) -> Option<DateTime<Utc>> {
    let combined = format!("{} {}", date, time);
    if let Ok(dt) = NaiveDateTime::parse_from_str(&combined, "%m-%d-%y %I:%M%p") {
        return Some(Utc.from_utc_datetime(&dt));
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(&combined, "%m-%d-%y %H:%M") {
        return Some(Utc.from_utc_datetime(&dt));
    }
    None
}
