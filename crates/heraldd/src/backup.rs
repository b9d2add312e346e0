//! Backup rotation for the record set.
//!
//! Every persisted save is preceded by a full snapshot of the previous
//! on-disk document, and the diagnostic path snapshots an unparseable
//! document before it is replaced. Snapshots are pruned to the newest
//! `keep`; names embed a sortable timestamp so reverse-lexicographic
//! order is newest-first.

use std::fs;
use std::path::PathBuf;
use tracing::{debug, error, warn};

/// Snapshot filename prefix: `backup_{stamp}_{reason}.json`
pub const BACKUP_PREFIX: &str = "backup_";

/// Snapshot filename suffix
pub const BACKUP_SUFFIX: &str = ".json";

/// strftime pattern for the sortable timestamp tag
pub const STAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

/// Rotating snapshot writer for one data file
#[derive(Debug, Clone)]
pub struct BackupRotator {
    data_file: PathBuf,
    backup_dir: PathBuf,
    keep: usize,
}

impl BackupRotator {
    pub fn new(data_file: PathBuf, backup_dir: PathBuf, keep: usize) -> Self {
        Self {
            data_file,
            backup_dir,
            keep,
        }
    }

    /// Copy the current on-disk document into the backup directory under
    /// a timestamp+reason name, then prune. Returns success; never
    /// errors. Before the first save there is no document to snapshot.
    pub fn snapshot(&self, stamp: &str, reason: &str) -> bool {
        if !self.data_file.exists() {
            debug!("no data file yet, skipping {} snapshot", reason);
            return false;
        }

        let name = format!("{}{}_{}{}", BACKUP_PREFIX, stamp, reason, BACKUP_SUFFIX);
        let target = self.backup_dir.join(&name);

        match fs::copy(&self.data_file, &target) {
            Ok(_) => {
                debug!("snapshot written: {}", target.display());
                self.prune();
                true
            }
            Err(e) => {
                error!("failed to write snapshot {}: {}", target.display(), e);
                false
            }
        }
    }

    /// Delete everything but the newest `keep` snapshots. Failure is
    /// logged and never blocks the save that triggered it.
    pub fn prune(&self) {
        let entries = match fs::read_dir(&self.backup_dir) {
            Ok(entries) => entries,
            Err(e) => {
                warn!(
                    "cannot list backup dir {}: {}",
                    self.backup_dir.display(),
                    e
                );
                return;
            }
        };

        let mut backups: Vec<String> = entries
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.file_name().to_string_lossy().into_owned())
            .filter(|name| name.starts_with(BACKUP_PREFIX) && name.ends_with(BACKUP_SUFFIX))
            .collect();

        backups.sort_by(|a, b| b.cmp(a));

        for old in backups.iter().skip(self.keep) {
            if let Err(e) = fs::remove_file(self.backup_dir.join(old)) {
                warn!("failed to prune backup {}: {}", old, e);
            }
        }
    }
}
