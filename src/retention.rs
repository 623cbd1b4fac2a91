use std::collections::BTreeMap;

use chrono::NaiveDate;
use log::{debug, info};

use crate::{
    enumerate::{backup_days, BackupDirectories},
    layout::{parent_prefix, KeyLayout, Layout},
    schedule::RetentionPolicy,
    storage::{delete_prefix, ObjectStore},
    vault_error, Result,
};

/// Expired directories one group may lose in a run without `clean_up`.
pub const MAX_UNATTENDED_DELETIONS: usize = 3;

#[derive(Debug, Clone, Default)]
pub struct RetentionOptions {
    pub cluster: Option<String>,
    /// Allow more than [`MAX_UNATTENDED_DELETIONS`] deletions per group.
    pub clean_up: bool,
    pub dry_run: bool,
}

/// Expired day prefixes keyed by group prefix.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RetentionPlan {
    pub expired: BTreeMap<String, Vec<String>>,
}

impl RetentionPlan {
    pub fn is_empty(&self) -> bool {
        self.expired.is_empty()
    }

    pub fn directory_count(&self) -> usize {
        self.expired.values().map(Vec::len).sum()
    }

    pub fn prefixes(&self) -> impl Iterator<Item = &str> {
        self.expired.values().flatten().map(String::as_str)
    }

    /// Fails on the first group above the unattended limit.
    pub fn check_guard(&self, clean_up: bool) -> Result<()> {
        if clean_up {
            return Ok(());
        }
        match self
            .expired
            .iter()
            .find(|(_, prefixes)| prefixes.len() > MAX_UNATTENDED_DELETIONS)
        {
            Some((group, prefixes)) => Err(vault_error!(TooManyDirectoriesForDeletion {
                group: group.clone(),
                count: prefixes.len(),
                limit: MAX_UNATTENDED_DELETIONS,
            })),
            None => Ok(()),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RetentionReport {
    pub directories: usize,
    pub objects: usize,
}

/// Prunes backup days that fall out of the retention window.
pub struct RetentionEnforcer<'a> {
    store: &'a dyn ObjectStore,
    key_layout: KeyLayout,
    layout: Layout,
    policy: RetentionPolicy,
    today: NaiveDate,
}

impl<'a> RetentionEnforcer<'a> {
    pub fn new(
        store: &'a dyn ObjectStore,
        key_layout: KeyLayout,
        layout: Layout,
        today: NaiveDate,
    ) -> Self {
        Self {
            store,
            key_layout,
            layout,
            policy: RetentionPolicy::new(),
            today,
        }
    }

    /// Classifies every backup day without touching the bucket.
    pub fn plan(&self, cluster: Option<&str>) -> Result<RetentionPlan> {
        let mut plan = RetentionPlan::default();
        let directories =
            BackupDirectories::new(self.store, &self.key_layout, self.layout, cluster);
        for day in backup_days(directories) {
            let day = day?;
            if self.policy.retains(day.date, self.today) {
                debug!("Keeping {}", day.prefix);
                continue;
            }
            let group = parent_prefix(&day.prefix).unwrap_or(&day.prefix).to_string();
            plan.expired.entry(group).or_default().push(day.prefix);
        }
        Ok(plan)
    }

    pub fn enforce(&self, options: &RetentionOptions) -> Result<RetentionReport> {
        let plan = self.plan(options.cluster.as_deref())?;
        plan.check_guard(options.clean_up)?;

        let mut report = RetentionReport::default();
        for prefix in plan.prefixes() {
            if options.dry_run {
                println!("{prefix}");
            } else {
                let deleted = delete_prefix(self.store, prefix)?;
                info!("Deleted {deleted} objects under {prefix}");
                report.objects += deleted;
            }
            report.directories += 1;
        }
        info!(
            "Retention run anchored at {}: {} expired directories{}",
            self.today,
            report.directories,
            if options.dry_run { " (dry run)" } else { "" }
        );
        Ok(report)
    }
}
