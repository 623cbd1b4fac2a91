//! Object key layouts of the backup archive.
//!
//! Legacy layout, one directory per provider stanza:
//!
//! ```text
//! crunchybridge/{cluster}/backup/{stanza}/{YYYYMMDD-suffix}/...
//! crunchybridge/{cluster}/archive/{stanza}/...
//! ```
//!
//! V2 layout, one self-contained directory per backup day:
//!
//! ```text
//! crunchybridge/v2/{cluster}/{YYYYMMDD}/...
//! ```

use std::sync::LazyLock;

use chrono::NaiveDate;
use clap::ValueEnum;
use regex::Regex;

use crate::{vault_error, Result};

pub const DEFAULT_NAMESPACE: &str = "crunchybridge";
pub const V2_SEGMENT: &str = "v2";
pub const BACKUP_SEGMENT: &str = "backup";
pub const ARCHIVE_SEGMENT: &str = "archive";
pub const DAY_STAMP_FORMAT: &str = "%Y%m%d";

static DAY_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d{8})(?:-(\w*))?$").expect("day name pattern is valid"));

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum Layout {
    /// `{namespace}/{cluster}/backup/{stanza}/{YYYYMMDD-suffix}/`
    #[default]
    Legacy,
    /// `{namespace}/v2/{cluster}/{YYYYMMDD}/`
    V2,
}

/// One daily backup directory in the archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupDay {
    pub cluster: String,
    /// Provider stanza token; `None` in the v2 layout.
    pub stanza: Option<String>,
    pub date: NaiveDate,
    /// Trailing token after the date, e.g. `010000F`.
    pub suffix: Option<String>,
    /// Full key prefix of the directory, ending in `/`.
    pub prefix: String,
}

impl BackupDay {
    pub fn stamp(&self) -> String {
        format_day_stamp(self.date)
    }
}

/// Splits a day directory name into its date and suffix.
///
/// Names that do not start with a valid `YYYYMMDD` date (such as
/// `backup.history`) yield `None`.
pub fn parse_day_name(name: &str) -> Option<(NaiveDate, Option<String>)> {
    let captures = DAY_NAME.captures(name)?;
    let date = parse_day_stamp(&captures[1]).ok()?;
    let suffix = captures.get(2).map(|m| m.as_str().to_string());
    Some((date, suffix))
}

pub fn parse_day_stamp(value: &str) -> Result<NaiveDate> {
    let invalid = || {
        vault_error!(InvalidDate {
            value: value.to_string(),
        })
    };
    if value.len() != 8 || !value.bytes().all(|b| b.is_ascii_digit()) {
        return Err(invalid());
    }
    let year = value[0..4].parse().map_err(|_| invalid())?;
    let month = value[4..6].parse().map_err(|_| invalid())?;
    let day = value[6..8].parse().map_err(|_| invalid())?;
    NaiveDate::from_ymd_opt(year, month, day).ok_or_else(invalid)
}

pub fn format_day_stamp(date: NaiveDate) -> String {
    date.format(DAY_STAMP_FORMAT).to_string()
}

/// Last path segment of a `/`-terminated prefix.
pub fn last_segment(prefix: &str) -> &str {
    prefix
        .trim_end_matches('/')
        .rsplit('/')
        .next()
        .unwrap_or_default()
}

/// Prefix one level above a `/`-terminated prefix, itself `/`-terminated.
pub fn parent_prefix(prefix: &str) -> Option<&str> {
    let trimmed = prefix.trim_end_matches('/');
    trimmed.rfind('/').map(|end| &trimmed[..=end])
}

/// Builds and rewrites keys below one top-level namespace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyLayout {
    namespace: String,
}

impl Default for KeyLayout {
    fn default() -> Self {
        Self::new(DEFAULT_NAMESPACE)
    }
}

impl KeyLayout {
    pub fn new(namespace: &str) -> Self {
        Self {
            namespace: namespace.trim_matches('/').to_string(),
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// `{namespace}/`
    pub fn root_prefix(&self) -> String {
        format!("{}/", self.namespace)
    }

    /// `{namespace}/v2/`
    pub fn v2_root_prefix(&self) -> String {
        format!("{}/{}/", self.namespace, V2_SEGMENT)
    }

    /// `{namespace}/v2/{cluster}/{YYYYMMDD}/`
    pub fn v2_day_prefix(&self, cluster: &str, stamp: &str) -> String {
        format!("{}{}/{}/", self.v2_root_prefix(), cluster, stamp)
    }

    /// `{namespace}/{cluster}/backup/{stanza}/` to
    /// `{namespace}/{cluster}/archive/{stanza}/`.
    pub fn archive_stanza_prefix(&self, backup_stanza_prefix: &str) -> Result<String> {
        let segments: Vec<&str> = backup_stanza_prefix.trim_end_matches('/').split('/').collect();
        match segments.as_slice() {
            [namespace, cluster, BACKUP_SEGMENT, stanza] if *namespace == self.namespace => {
                Ok(format!("{namespace}/{cluster}/{ARCHIVE_SEGMENT}/{stanza}/"))
            }
            _ => Err(vault_error!(InvalidParameter {
                description: format!("'{backup_stanza_prefix}' is not a legacy stanza prefix"),
            })),
        }
    }

    /// Rewrites a legacy key into the v2 directory of backup day `stamp`,
    /// keeping everything after the cluster name.
    pub fn migrated_key(&self, source_key: &str, stamp: &str) -> Result<String> {
        let mut segments = source_key.splitn(3, '/');
        match (segments.next(), segments.next(), segments.next()) {
            (Some(namespace), Some(cluster), Some(relative))
                if namespace == self.namespace && !cluster.is_empty() && !relative.is_empty() =>
            {
                Ok(format!("{}{}", self.v2_day_prefix(cluster, stamp), relative))
            }
            _ => Err(vault_error!(InvalidParameter {
                description: format!(
                    "'{source_key}' is not a key below {}/{{cluster}}/",
                    self.namespace
                ),
            })),
        }
    }
}
