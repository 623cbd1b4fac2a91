//! Extraction of the WAL range a backup needs from its `backup.manifest`.
//!
//! The manifest is an ini-like file of `key="value"` lines grouped under
//! `[section]` headers:
//!
//! ```text
//! [backup]
//! backup-archive-start="00000001000008210000001D"
//! backup-archive-stop="00000001000008210000001F"
//! ```
//!
//! WAL is stored as `archive/{stanza}/{version}/{dir}/{file}` where `dir` is
//! the first [`SEGMENT_DIR_DIGITS`] hex digits of a segment name and `file`
//! starts with the full [`SEGMENT_FILE_DIGITS`] digit segment name. Directory
//! prefixes bound the listing; the file name decides inclusion.

use std::collections::BTreeSet;

use crate::{vault_error, Result};

pub const ARCHIVE_START_KEY: &str = "backup-archive-start";
pub const ARCHIVE_STOP_KEY: &str = "backup-archive-stop";

/// Hex digits of a segment name used as the WAL directory name.
pub const SEGMENT_DIR_DIGITS: usize = 16;

/// Hex digits of a full segment name at the start of a WAL file name.
pub const SEGMENT_FILE_DIGITS: usize = 24;

/// Compressed WAL file extensions that identify segment files.
pub const SEGMENT_EXTENSIONS: [&str; 4] = [".lz4", ".gz", ".zst", ".bz2"];

/// The inclusive range of WAL segments a backup depends on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LsnRange {
    start: String,
    stop: String,
    start_value: u128,
    stop_value: u128,
}

impl LsnRange {
    pub fn new(start: impl Into<String>, stop: impl Into<String>) -> Result<Self> {
        let start = start.into();
        let stop = stop.into();
        let start_value = parse_hex_prefix(&start, SEGMENT_FILE_DIGITS).ok_or_else(|| {
            vault_error!(MalformedManifest {
                description: format!("start segment '{start}' is not a {SEGMENT_FILE_DIGITS} digit hex name"),
            })
        })?;
        let stop_value = parse_hex_prefix(&stop, SEGMENT_FILE_DIGITS).ok_or_else(|| {
            vault_error!(MalformedManifest {
                description: format!("stop segment '{stop}' is not a {SEGMENT_FILE_DIGITS} digit hex name"),
            })
        })?;
        if start_value > stop_value {
            return Err(vault_error!(MalformedManifest {
                description: format!("start segment {start} is after stop segment {stop}"),
            }));
        }
        Ok(Self {
            start,
            stop,
            start_value,
            stop_value,
        })
    }

    pub fn start(&self) -> &str {
        &self.start
    }

    pub fn stop(&self) -> &str {
        &self.stop
    }

    /// Directory prefixes spanned by this range.
    pub fn segment_directories(&self) -> SegmentPrefixes {
        // Both bounds are validated to hold at least SEGMENT_FILE_DIGITS hex digits.
        let start = (self.start_value >> (4 * (SEGMENT_FILE_DIGITS - SEGMENT_DIR_DIGITS))) as u64;
        let stop = (self.stop_value >> (4 * (SEGMENT_FILE_DIGITS - SEGMENT_DIR_DIGITS))) as u64;
        SegmentPrefixes::new(start, stop)
    }

    /// Whether `key` names a WAL segment file inside this range.
    pub fn includes_file(&self, key: &str) -> bool {
        segment_file_lsn(key)
            .is_some_and(|lsn| self.start_value <= lsn && lsn <= self.stop_value)
    }
}

/// Reads the archive start and stop segments out of a manifest.
pub fn parse_manifest(text: &str) -> Result<LsnRange> {
    let mut start = None;
    let mut stop = None;
    for line in text.lines() {
        let Some((key, value)) = line.trim().split_once('=') else {
            continue;
        };
        let value = value.trim().trim_matches('"');
        match key.trim() {
            ARCHIVE_START_KEY => start = Some(value.to_string()),
            ARCHIVE_STOP_KEY => stop = Some(value.to_string()),
            _ => {}
        }
        if start.is_some() && stop.is_some() {
            break;
        }
    }

    match (start, stop) {
        (Some(start), Some(stop)) => LsnRange::new(start, stop),
        (start, _) => {
            let missing = if start.is_none() {
                ARCHIVE_START_KEY
            } else {
                ARCHIVE_STOP_KEY
            };
            Err(vault_error!(MalformedManifest {
                description: format!("missing {missing}"),
            }))
        }
    }
}

/// Enumerates every 16 digit directory prefix between two segment names.
pub fn expand_lsn_range(start: &str, stop: &str) -> Result<SegmentPrefixes> {
    let parse = |value: &str| {
        parse_hex_prefix(value, SEGMENT_DIR_DIGITS).ok_or_else(|| {
            vault_error!(InvalidParameter {
                description: format!(
                    "'{value}' does not start with {SEGMENT_DIR_DIGITS} hex digits"
                ),
            })
        })
    };
    // SEGMENT_DIR_DIGITS hex digits always fit in a u64.
    Ok(SegmentPrefixes::new(parse(start)? as u64, parse(stop)? as u64))
}

/// Keeps the segment files whose full name lies within `range`.
pub fn select_segment_files<I, S>(keys: I, range: &LsnRange) -> BTreeSet<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    keys.into_iter()
        .filter(|key| range.includes_file(key.as_ref()))
        .map(|key| key.as_ref().to_string())
        .collect()
}

/// Full-precision segment number of a WAL file key, if it is one.
pub fn segment_file_lsn(key: &str) -> Option<u128> {
    let filename = key.rsplit('/').next()?;
    if !SEGMENT_EXTENSIONS.iter().any(|ext| filename.ends_with(ext)) {
        return None;
    }
    parse_hex_prefix(filename, SEGMENT_FILE_DIGITS)
}

fn parse_hex_prefix(value: &str, digits: usize) -> Option<u128> {
    let prefix = value.get(..digits)?;
    if !prefix.bytes().all(|b| b.is_ascii_hexdigit()) {
        return None;
    }
    u128::from_str_radix(prefix, 16).ok()
}

/// Lazily yields zero-padded uppercase directory prefixes, inclusive of both
/// ends. Cloning restarts from the current position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentPrefixes {
    next: Option<u64>,
    stop: u64,
}

impl SegmentPrefixes {
    fn new(start: u64, stop: u64) -> Self {
        Self {
            next: (start <= stop).then_some(start),
            stop,
        }
    }
}

impl Iterator for SegmentPrefixes {
    type Item = String;

    fn next(&mut self) -> Option<String> {
        let current = self.next?;
        self.next = if current < self.stop {
            Some(current + 1)
        } else {
            None
        };
        Some(format!("{:0width$X}", current, width = SEGMENT_DIR_DIGITS))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        match self.next {
            Some(next) => {
                let remaining = usize::try_from(self.stop - next).ok().and_then(|n| n.checked_add(1));
                (remaining.unwrap_or(usize::MAX), remaining)
            }
            None => (0, Some(0)),
        }
    }
}
