use std::{
    collections::BTreeSet,
    fs,
    io::ErrorKind,
    path::{Component, Path, PathBuf},
};

use log::{debug, info};

use crate::{
    layout::last_segment,
    storage::{list_all_keys, ObjectStore, Placement},
    vault_error, Result, ResultExt,
};

/// Progress of one [`BulkTransfer::copy_recursive`] call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferProgress {
    pub dest_key: String,
    pub bytes: u64,
    pub completed: usize,
    pub total: usize,
}

/// Copies objects between two stores.
pub trait BulkTransfer {
    /// Copies `src` to `dst`. A `src` ending in `/` is a prefix and every
    /// object below it lands below `dst` under the same relative path.
    /// Returns the number of objects copied.
    fn copy_recursive(
        &self,
        src: &str,
        dst: &str,
        progress: &mut dyn FnMut(&TransferProgress),
    ) -> Result<usize>;
}

/// Downloads into a local staging directory, then uploads with a fixed
/// expiry and storage class. Objects already present at the destination
/// are not copied again. The staging directory is removed after every call.
pub struct StagedTransfer<'a> {
    source: &'a dyn ObjectStore,
    destination: &'a dyn ObjectStore,
    staging_dir: PathBuf,
    placement: Placement,
}

impl<'a> StagedTransfer<'a> {
    pub fn new(
        source: &'a dyn ObjectStore,
        destination: &'a dyn ObjectStore,
        staging_dir: PathBuf,
        placement: Placement,
    ) -> Self {
        Self {
            source,
            destination,
            staging_dir,
            placement,
        }
    }

    pub fn staging_dir(&self) -> &Path {
        &self.staging_dir
    }

    fn staged_path(&self, relative: &str) -> Result<PathBuf> {
        let relative = Path::new(relative);
        if relative
            .components()
            .any(|component| !matches!(component, Component::Normal(_)))
        {
            return Err(vault_error!(InvalidParameter {
                description: format!("Refusing to stage '{}'", relative.display()),
            }));
        }
        Ok(self.staging_dir.join(relative))
    }

    fn stage(&self, files: &[(String, String)]) -> Result<Vec<PathBuf>> {
        let mut staged = Vec::with_capacity(files.len());
        for (source_key, relative) in files {
            let path = self.staged_path(relative)?;
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)
                    .context(format!("Failed to create {}", parent.display()))?;
            }
            let data = self.source.get_object(source_key)?;
            fs::write(&path, data).context(format!("Failed to stage {source_key}"))?;
            debug!("Staged {} at {}", source_key, path.display());
            staged.push(path);
        }
        Ok(staged)
    }

    fn clear_staging(&self) -> Result<()> {
        match fs::remove_dir_all(&self.staging_dir) {
            Err(err) if err.kind() != ErrorKind::NotFound => Err(err.into()),
            _ => Ok(()),
        }
    }
}

impl BulkTransfer for StagedTransfer<'_> {
    fn copy_recursive(
        &self,
        src: &str,
        dst: &str,
        progress: &mut dyn FnMut(&TransferProgress),
    ) -> Result<usize> {
        let listed: Vec<(String, String)> = if src.ends_with('/') {
            list_all_keys(self.source, src)?
                .into_iter()
                .filter_map(|key| {
                    let relative = key.strip_prefix(src)?.to_string();
                    // Zero-byte folder markers have nothing to stage.
                    (!relative.is_empty() && !relative.ends_with('/')).then_some((key, relative))
                })
                .collect()
        } else {
            vec![(src.to_string(), last_segment(src).to_string())]
        };
        let dest_key = |relative: &str| {
            if src.ends_with('/') {
                format!("{dst}{relative}")
            } else {
                dst.to_string()
            }
        };

        // Uploads are whole-object, so a key already at the destination
        // was fully written by an earlier run.
        let existing: BTreeSet<String> =
            list_all_keys(self.destination, dst)?.into_iter().collect();
        let (present, files): (Vec<_>, Vec<_>) = listed
            .into_iter()
            .partition(|(_, relative)| existing.contains(&dest_key(relative.as_str())));
        if !present.is_empty() {
            info!("{} objects already under {dst}, skipping them", present.len());
        }

        let result = self.stage(&files).and_then(|staged| {
            let total = staged.len();
            for (completed, ((_, relative), path)) in files.iter().zip(&staged).enumerate() {
                let dest_key = dest_key(relative.as_str());
                let data = fs::read(path).context(format!("Failed to read {}", path.display()))?;
                let bytes = data.len() as u64;
                self.destination
                    .put_object(&dest_key, data, Some(&self.placement))?;
                progress(&TransferProgress {
                    dest_key,
                    bytes,
                    completed: completed + 1,
                    total,
                });
            }
            Ok(total)
        });
        self.clear_staging()?;

        let copied = result?;
        info!("Copied {copied} objects from {src} to {dst}");
        Ok(copied)
    }
}
