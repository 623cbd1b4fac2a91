//! Day-to-day ingestion of new provider backups into the v2 layout.

use std::path::PathBuf;

use chrono::{DateTime, Months, NaiveDate, Utc};
use log::info;

use crate::{
    layout::{format_day_stamp, parse_day_stamp, KeyLayout},
    provider::{find_backup, find_cluster, BackupToken, ProviderApi},
    schedule::{is_valid_saturday, RETENTION_MONTHS},
    snitch::Snitch,
    storage::{ObjectStore, Placement},
    transfer::{BulkTransfer, StagedTransfer, TransferProgress},
    vault_error, Result,
};

/// Opens the provider's bucket with the credentials of a backup token.
pub type SourceStoreFactory<'a> = dyn Fn(&BackupToken) -> Result<Box<dyn ObjectStore>> + 'a;

/// The backup day to copy: `target` as `YYYYMMDD`, or `today`.
///
/// Days other than the first and third Saturday of a month are
/// `NotEligibleDay`.
pub fn resolve_target(target: Option<&str>, today: NaiveDate) -> Result<NaiveDate> {
    let date = match target {
        Some(target) => parse_day_stamp(target)?,
        None => today,
    };
    if !is_valid_saturday(date) {
        return Err(vault_error!(NotEligibleDay { date }));
    }
    Ok(date)
}

/// Paths below the repository root that a restore of `backup_name` needs.
/// Entries ending in `/` are copied recursively.
pub fn restore_paths(stanza: &str, backup_name: &str) -> Vec<String> {
    vec![
        format!("archive/{stanza}/archive.info"),
        format!("backup/{stanza}/backup.info"),
        format!("backup/{stanza}/backup.info.copy"),
        format!("backup/{stanza}/backup.history/"),
        format!("backup/{stanza}/{backup_name}/"),
    ]
}

/// Hours, minutes and seconds of a duration in seconds.
pub fn split_duration(seconds: i64) -> (i64, i64, i64) {
    let (minutes, seconds) = (seconds / 60, seconds % 60);
    (minutes / 60, minutes % 60, seconds)
}

#[derive(Debug, Clone)]
pub struct CopyRequest {
    pub cluster: String,
    pub target: NaiveDate,
    pub storage_class: String,
    pub staging_dir: PathBuf,
    pub dry_run: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CopyOutcome {
    Copied {
        objects: usize,
        started: DateTime<Utc>,
        finished: DateTime<Utc>,
    },
    DryRun {
        paths: Vec<String>,
    },
}

pub struct CopyOrchestrator<'a> {
    provider: &'a dyn ProviderApi,
    destination: &'a dyn ObjectStore,
    open_source: &'a SourceStoreFactory<'a>,
    key_layout: KeyLayout,
    snitch: Option<&'a Snitch>,
}

impl<'a> CopyOrchestrator<'a> {
    pub fn new(
        provider: &'a dyn ProviderApi,
        destination: &'a dyn ObjectStore,
        open_source: &'a SourceStoreFactory<'a>,
        key_layout: KeyLayout,
        snitch: Option<&'a Snitch>,
    ) -> Self {
        Self {
            provider,
            destination,
            open_source,
            key_layout,
            snitch,
        }
    }

    pub fn run(&self, request: &CopyRequest) -> Result<CopyOutcome> {
        let started = Utc::now();
        let stamp = format_day_stamp(request.target);

        let cluster = find_cluster(self.provider, &request.cluster)?;
        let token = self.provider.create_backup_token(&cluster.id)?;
        let backups = self.provider.list_backups(&cluster.id)?;
        let backup = find_backup(&backups, &cluster.name, &stamp)?;

        let dest_prefix = self.key_layout.v2_day_prefix(&cluster.name, &stamp);

        let source_root = token.repository_root();
        let staging_dir = request.staging_dir.join(&cluster.name);
        let paths = restore_paths(&token.stanza, &backup.name);

        if request.dry_run {
            info!("Dry run only");
            info!("Downloading from: s3://{}/{}", token.aws.s3_bucket, source_root);
            info!("Downloading to: {}", staging_dir.display());
            info!("Uploading to: {dest_prefix}");
            for path in &paths {
                println!("{source_root}/{path} -> {dest_prefix}{path}");
            }
            return Ok(CopyOutcome::DryRun { paths });
        }

        let expires = started
            .checked_add_months(Months::new(RETENTION_MONTHS))
            .ok_or_else(|| {
                vault_error!(InvalidParameter {
                    description: format!("{started} has no expiration date"),
                })
            })?;
        let source = (self.open_source)(&token)?;
        let transfer = StagedTransfer::new(
            source.as_ref(),
            self.destination,
            staging_dir,
            Placement {
                expires,
                storage_class: request.storage_class.clone(),
            },
        );

        let mut objects = 0;
        for (index, path) in paths.iter().enumerate() {
            objects += transfer.copy_recursive(
                &format!("{source_root}/{path}"),
                &format!("{dest_prefix}{path}"),
                &mut |progress: &TransferProgress| {
                    info!(
                        "Uploaded {} ({} bytes, {}/{})",
                        progress.dest_key, progress.bytes, progress.completed, progress.total
                    )
                },
            )?;
            info!("{} / {} downloads complete", index + 1, paths.len());
        }

        let finished = Utc::now();
        let (hours, minutes, seconds) = split_duration((finished - started).num_seconds());
        info!("Start: {started}");
        info!("Finish: {finished}");
        info!("Total Duration: {hours} hrs, {minutes} minutes, {seconds} seconds");

        if let Some(snitch) = self.snitch {
            snitch.check_in(&cluster.name)?;
        }

        Ok(CopyOutcome::Copied {
            objects,
            started,
            finished,
        })
    }
}
