//! Rewrites legacy backup days into the v2 layout.
//!
//! Only what a restore of that one day needs is carried over: the stanza
//! metadata, the history, the day directory itself and the WAL segments
//! between the manifest's archive start and stop.

use std::fmt;

use chrono::{DateTime, Months, NaiveDate, Utc};
use log::{debug, error, info};

use crate::{
    enumerate::{backup_days, BackupDirectories},
    error_context,
    layout::{parent_prefix, BackupDay, KeyLayout, Layout},
    manifest::{parse_manifest, LsnRange},
    schedule::RETENTION_MONTHS,
    storage::{list_all_keys, ObjectPages, ObjectStore, Placement},
    vault_error, Result, VaultError,
};

pub const DEFAULT_MIGRATION_STORAGE_CLASS: &str = "ONEZONE_IA";
pub const MANIFEST_FILE: &str = "backup.manifest";
pub const BACKUP_INFO_FILES: [&str; 2] = ["backup.info", "backup.info.copy"];
pub const ARCHIVE_INFO_FILES: [&str; 2] = ["archive.info", "archive.info.copy"];
pub const HISTORY_DIR: &str = "backup.history/";

/// One server-side copy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedCopy {
    pub source_key: String,
    pub dest_key: String,
    pub expires: DateTime<Utc>,
    pub storage_class: String,
}

impl PlannedCopy {
    pub fn placement(&self) -> Placement {
        Placement {
            expires: self.expires,
            storage_class: self.storage_class.clone(),
        }
    }
}

impl fmt::Display for PlannedCopy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "s3 copy {} {} StorageClass={} Expires={}",
            self.source_key,
            self.dest_key,
            self.storage_class,
            self.expires.date_naive()
        )
    }
}

/// Midnight UTC of the day the archived copy of `backup_date` expires.
pub fn archive_expiration(backup_date: NaiveDate) -> Result<DateTime<Utc>> {
    backup_date
        .checked_add_months(Months::new(RETENTION_MONTHS))
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|datetime| datetime.and_utc())
        .ok_or_else(|| {
            vault_error!(InvalidParameter {
                description: format!("{backup_date} has no expiration date"),
            })
        })
}

#[derive(Debug, Clone)]
pub struct MigrationOptions {
    pub cluster: Option<String>,
    pub target: Option<NaiveDate>,
    pub storage_class: String,
    pub dry_run: bool,
}

impl Default for MigrationOptions {
    fn default() -> Self {
        Self {
            cluster: None,
            target: None,
            storage_class: DEFAULT_MIGRATION_STORAGE_CLASS.to_string(),
            dry_run: false,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MigrationReport {
    pub days: usize,
    pub copies: usize,
    /// Day prefixes skipped because their manifest could not be used.
    pub failed: Vec<String>,
}

pub struct MigrationPlanner<'a> {
    store: &'a dyn ObjectStore,
    key_layout: KeyLayout,
}

impl<'a> MigrationPlanner<'a> {
    pub fn new(store: &'a dyn ObjectStore, key_layout: KeyLayout) -> Self {
        Self { store, key_layout }
    }

    pub fn read_manifest(&self, day: &BackupDay) -> Result<LsnRange> {
        let bytes = self.store.get_object(&format!("{}{MANIFEST_FILE}", day.prefix))?;
        let text = String::from_utf8(bytes).map_err(|err| {
            vault_error!(MalformedManifest {
                description: format!("manifest is not UTF-8: {err}"),
            })
        })?;
        parse_manifest(&text)
    }

    /// Every legacy key a restore of `day` needs, in copy order.
    pub fn source_keys(&self, day: &BackupDay) -> Result<Vec<String>> {
        let stanza_prefix = parent_prefix(&day.prefix).ok_or_else(|| {
            vault_error!(InvalidParameter {
                description: format!("'{}' has no stanza directory", day.prefix),
            })
        })?;
        let range = self.read_manifest(day)?;

        let mut keys: Vec<String> = BACKUP_INFO_FILES
            .iter()
            .map(|file| format!("{stanza_prefix}{file}"))
            .collect();
        keys.extend(list_all_keys(self.store, &format!("{stanza_prefix}{HISTORY_DIR}"))?);
        keys.extend(list_all_keys(self.store, &day.prefix)?);

        let archive_prefix = self.key_layout.archive_stanza_prefix(stanza_prefix)?;
        keys.extend(
            ARCHIVE_INFO_FILES
                .iter()
                .map(|file| format!("{archive_prefix}{file}")),
        );
        keys.extend(self.segment_files(&archive_prefix, &range)?);
        Ok(keys)
    }

    /// WAL segment keys under every version directory of an archive stanza.
    pub fn segment_files(&self, archive_prefix: &str, range: &LsnRange) -> Result<Vec<String>> {
        let mut files = Vec::new();
        for version_prefix in self.store.list_common_prefixes(archive_prefix)? {
            for directory in range.segment_directories() {
                let prefix = format!("{version_prefix}{directory}/");
                for page in ObjectPages::new(self.store, &prefix) {
                    files.extend(page?.into_iter().filter(|key| range.includes_file(key)));
                }
            }
        }
        debug!(
            "{} segment files between {} and {} under {}",
            files.len(),
            range.start(),
            range.stop(),
            archive_prefix
        );
        Ok(files)
    }

    #[error_context("Failed to plan migration of {}", day.prefix)]
    pub fn plan_day(&self, day: &BackupDay, storage_class: &str) -> Result<Vec<PlannedCopy>> {
        let stamp = day.stamp();
        let expires = archive_expiration(day.date)?;
        self.source_keys(day)?
            .into_iter()
            .map(|source_key| -> Result<PlannedCopy> {
                Ok(PlannedCopy {
                    dest_key: self.key_layout.migrated_key(&source_key, &stamp)?,
                    source_key,
                    expires,
                    storage_class: storage_class.to_string(),
                })
            })
            .collect()
    }

    pub fn execute(&self, copies: &[PlannedCopy], dry_run: bool) -> Result<()> {
        for copy in copies {
            if dry_run {
                println!("{copy}");
            } else {
                self.store
                    .copy_object(&copy.source_key, &copy.dest_key, &copy.placement())?;
            }
        }
        Ok(())
    }

    /// Migrates every matching legacy day.
    ///
    /// A day whose manifest is missing its archive range is logged and
    /// skipped; every other failure ends the run.
    pub fn migrate(&self, options: &MigrationOptions) -> Result<MigrationReport> {
        let mut report = MigrationReport::default();
        let directories = BackupDirectories::new(
            self.store,
            &self.key_layout,
            Layout::Legacy,
            options.cluster.as_deref(),
        );
        for day in backup_days(directories) {
            let day = day?;
            if options.target.is_some_and(|target| target != day.date) {
                continue;
            }
            let copies = match self.plan_day(&day, &options.storage_class) {
                Ok(copies) => copies,
                Err(err @ VaultError::MalformedManifest { .. }) => {
                    error!("{err}");
                    report.failed.push(day.prefix);
                    continue;
                }
                Err(err) => return Err(err),
            };
            info!("Migrating {} ({} objects)", day.prefix, copies.len());
            self.execute(&copies, options.dry_run)?;
            report.days += 1;
            report.copies += copies.len();
        }
        Ok(report)
    }
}
