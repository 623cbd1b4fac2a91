//! Discovery of the daily backup directories stored in a bucket.
//!
//! The walk only lists common prefixes. Object contents are listed later, by
//! whoever consumes a directory.

use std::collections::VecDeque;

use crate::{
    layout::{last_segment, parse_day_name, BackupDay, KeyLayout, Layout, BACKUP_SEGMENT, V2_SEGMENT},
    storage::ObjectStore,
    Result,
};

/// A directory one level below a backup group.
///
/// Not every directory is a backup day; `backup.history/` shows up here too.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupDirectory {
    pub cluster: String,
    /// `{ns}/{cluster}/backup/{stanza}/` in the legacy layout,
    /// `{ns}/v2/{cluster}/` in the v2 layout.
    pub group_prefix: String,
    pub day_prefix: String,
}

impl BackupDirectory {
    pub fn name(&self) -> &str {
        last_segment(&self.day_prefix)
    }

    /// Stanza token of a legacy directory.
    pub fn stanza(&self) -> Option<&str> {
        let mut segments = self.group_prefix.trim_end_matches('/').rsplit('/');
        let stanza = segments.next()?;
        (segments.next() == Some(BACKUP_SEGMENT)).then_some(stanza)
    }

    /// The backup day this directory holds, or `None` for ancillary entries.
    pub fn backup_day(&self) -> Option<BackupDay> {
        let (date, suffix) = parse_day_name(self.name())?;
        Some(BackupDay {
            cluster: self.cluster.clone(),
            stanza: self.stanza().map(str::to_string),
            date,
            suffix,
            prefix: self.day_prefix.clone(),
        })
    }
}

/// Lazy walk over cluster, group and day prefixes.
///
/// Each listing happens only when the previous level is exhausted, so a
/// caller that stops early never pays for the rest of the bucket.
pub struct BackupDirectories<'a> {
    store: &'a dyn ObjectStore,
    layout: Layout,
    key_layout: KeyLayout,
    cluster: Option<String>,
    clusters: Option<VecDeque<String>>,
    groups: VecDeque<(String, String)>,
    days: VecDeque<BackupDirectory>,
    failed: bool,
}

impl<'a> BackupDirectories<'a> {
    pub fn new(
        store: &'a dyn ObjectStore,
        key_layout: &KeyLayout,
        layout: Layout,
        cluster: Option<&str>,
    ) -> Self {
        Self {
            store,
            layout,
            key_layout: key_layout.clone(),
            cluster: cluster.map(str::to_string),
            clusters: None,
            groups: VecDeque::new(),
            days: VecDeque::new(),
            failed: false,
        }
    }

    fn root_prefix(&self) -> String {
        match self.layout {
            Layout::Legacy => self.key_layout.root_prefix(),
            Layout::V2 => self.key_layout.v2_root_prefix(),
        }
    }

    fn wanted_cluster(&self, cluster_prefix: &str) -> bool {
        if self.layout == Layout::Legacy && last_segment(cluster_prefix) == V2_SEGMENT {
            return false;
        }
        match &self.cluster {
            Some(cluster) => cluster_prefix.ends_with(&format!("/{cluster}/")),
            None => true,
        }
    }

    fn step(&mut self) -> Result<Option<BackupDirectory>> {
        loop {
            if let Some(directory) = self.days.pop_front() {
                return Ok(Some(directory));
            }

            if let Some((cluster, group_prefix)) = self.groups.pop_front() {
                let days = self.store.list_common_prefixes(&group_prefix)?;
                self.days.extend(days.into_iter().map(|day_prefix| BackupDirectory {
                    cluster: cluster.clone(),
                    group_prefix: group_prefix.clone(),
                    day_prefix,
                }));
                continue;
            }

            if self.clusters.is_none() {
                let listed = self.store.list_common_prefixes(&self.root_prefix())?;
                let wanted = listed
                    .into_iter()
                    .filter(|prefix| self.wanted_cluster(prefix))
                    .collect();
                self.clusters = Some(wanted);
            }

            let Some(cluster_prefix) = self.clusters.as_mut().and_then(VecDeque::pop_front)
            else {
                return Ok(None);
            };
            let cluster = last_segment(&cluster_prefix).to_string();
            match self.layout {
                Layout::Legacy => {
                    let stanzas = self
                        .store
                        .list_common_prefixes(&format!("{cluster_prefix}{BACKUP_SEGMENT}/"))?;
                    self.groups
                        .extend(stanzas.into_iter().map(|stanza| (cluster.clone(), stanza)));
                }
                Layout::V2 => self.groups.push_back((cluster, cluster_prefix)),
            }
        }
    }
}

impl Iterator for BackupDirectories<'_> {
    type Item = Result<BackupDirectory>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        match self.step() {
            Ok(directory) => directory.map(Ok),
            Err(err) => {
                self.failed = true;
                Some(Err(err))
            }
        }
    }
}

/// Backup days found by a walk; ancillary directories are skipped.
pub fn backup_days<'a>(
    directories: BackupDirectories<'a>,
) -> impl Iterator<Item = Result<BackupDay>> + 'a {
    directories.filter_map(|directory| match directory {
        Ok(directory) => directory.backup_day().map(Ok),
        Err(err) => Some(Err(err)),
    })
}
