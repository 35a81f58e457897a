//! Code Store
//!
//! The on-disk home of the agent's own source image and its rolling
//! backups. This is the one genuinely dangerous surface in the runtime, so
//! it is kept narrow: read, snapshot-then-replace, prune. The replace path
//! snapshots the current image first, then writes the candidate to a
//! temporary file in the same directory and renames it over the live image,
//! so a crash at any point leaves the image fully old or fully new.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::Utc;
use tracing::{debug, warn};

use crate::error::StoreError;

/// Suffix for rolling backup files.
const BACKUP_SUFFIX: &str = ".bak";

/// Handle to the backup taken by a successful `snapshot_and_replace`.
#[derive(Debug)]
pub struct BackupHandle {
    pub path: PathBuf,
    pub created_at: String,
}

/// Exclusive owner of the live source image location.
pub struct CodeStore {
    source_path: PathBuf,
    backup_dir: PathBuf,
}

impl CodeStore {
    pub fn new(source_path: impl Into<PathBuf>, backup_dir: impl Into<PathBuf>) -> Self {
        Self {
            source_path: source_path.into(),
            backup_dir: backup_dir.into(),
        }
    }

    pub fn source_path(&self) -> &Path {
        &self.source_path
    }

    /// Read the current source image.
    pub fn read(&self) -> Result<String, StoreError> {
        fs::read_to_string(&self.source_path).map_err(|source| StoreError::Io {
            path: self.source_path.display().to_string(),
            source,
        })
    }

    /// Snapshot the current image into the backup directory, then atomically
    /// replace the live image with `candidate`.
    ///
    /// The snapshot must succeed before the replace is attempted, and the
    /// replace goes through a temporary file plus rename, so on any error the
    /// live image is untouched and the previous image is still recoverable.
    pub fn snapshot_and_replace(&self, candidate: &str) -> Result<BackupHandle, StoreError> {
        let file_name = self.image_file_name();

        fs::create_dir_all(&self.backup_dir).map_err(|source| StoreError::Storage {
            operation: "snapshot",
            source,
        })?;

        // Nanosecond precision keeps the zero-padded name unique per commit
        // and makes lexical order chronological order.
        let created_at = Utc::now();
        let stamp = created_at.format("%Y%m%d%H%M%S%9f").to_string();
        let backup_path = self
            .backup_dir
            .join(format!("{}.{}{}", file_name, stamp, BACKUP_SUFFIX));

        fs::copy(&self.source_path, &backup_path).map_err(|source| StoreError::Storage {
            operation: "snapshot",
            source,
        })?;
        debug!("snapshot written: {}", backup_path.display());

        let tmp_path = self.temp_path(&file_name);
        if let Err(source) = fs::write(&tmp_path, candidate) {
            let _ = fs::remove_file(&tmp_path);
            return Err(StoreError::Storage {
                operation: "write",
                source,
            });
        }

        if let Err(source) = fs::rename(&tmp_path, &self.source_path) {
            let _ = fs::remove_file(&tmp_path);
            return Err(StoreError::Storage {
                operation: "rename",
                source,
            });
        }

        Ok(BackupHandle {
            path: backup_path,
            created_at: created_at.to_rfc3339(),
        })
    }

    /// All backups of this image, newest first, ordered by the creation
    /// timestamp embedded in the file name.
    pub fn list_backups(&self) -> Vec<PathBuf> {
        let file_name = self.image_file_name();
        let prefix = format!("{}.", file_name);

        let entries = match fs::read_dir(&self.backup_dir) {
            Ok(entries) => entries,
            Err(_) => return Vec::new(),
        };

        let mut backups: Vec<PathBuf> = entries
            .flatten()
            .map(|e| e.path())
            .filter(|p| {
                p.file_name()
                    .and_then(|n| n.to_str())
                    .map(|n| n.starts_with(&prefix) && n.ends_with(BACKUP_SUFFIX))
                    .unwrap_or(false)
            })
            .collect();

        backups.sort();
        backups.reverse();
        backups
    }

    /// Delete the oldest backups beyond `max_kept`. Returns how many were
    /// removed. Idempotent: a backup that is already gone counts as pruned.
    pub fn prune_backups(&self, max_kept: usize) -> Result<usize, StoreError> {
        let mut removed = 0;

        for stale in self.list_backups().iter().skip(max_kept) {
            match fs::remove_file(stale) {
                Ok(()) => {
                    debug!("pruned backup: {}", stale.display());
                    removed += 1;
                }
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    warn!("backup already gone: {}", stale.display());
                }
                Err(source) => {
                    return Err(StoreError::Storage {
                        operation: "prune",
                        source,
                    });
                }
            }
        }

        Ok(removed)
    }

    fn image_file_name(&self) -> String {
        self.source_path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "image".to_string())
    }

    fn temp_path(&self, file_name: &str) -> PathBuf {
        // Same directory as the live image so the rename stays on one
        // filesystem and therefore atomic.
        match self.source_path.parent() {
            Some(parent) => parent.join(format!("{}.tmp", file_name)),
            None => PathBuf::from(format!("{}.tmp", file_name)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn store_in(dir: &Path) -> CodeStore {
        CodeStore::new(dir.join("agent.rs"), dir.join(".backups"))
    }

    #[test]
    fn test_read_missing_image_is_io_failure() {
        let dir = tempdir().unwrap();
        let store = store_in(dir.path());
        let err = store.read().unwrap_err();
        assert!(matches!(err, StoreError::Io { .. }));
    }

    #[test]
    fn test_snapshot_and_replace_swaps_image_and_keeps_backup() {
        let dir = tempdir().unwrap();
        let store = store_in(dir.path());
        fs::write(store.source_path(), "fn main() {} // v1").unwrap();

        let handle = store.snapshot_and_replace("fn main() {} // v2").unwrap();

        assert_eq!(store.read().unwrap(), "fn main() {} // v2");
        assert_eq!(
            fs::read_to_string(&handle.path).unwrap(),
            "fn main() {} // v1"
        );
        // No temporary file survives a successful commit.
        assert!(!dir.path().join("agent.rs.tmp").exists());
    }

    #[test]
    fn test_snapshot_failure_leaves_image_untouched() {
        let dir = tempdir().unwrap();
        // Backup "directory" is an existing file, so create_dir_all fails
        // before the replace is ever attempted.
        let blocker = dir.path().join("blocked");
        fs::write(&blocker, "").unwrap();

        let store = CodeStore::new(dir.path().join("agent.rs"), &blocker);
        fs::write(store.source_path(), "fn main() {} // v1").unwrap();

        let err = store.snapshot_and_replace("fn main() {} // v2").unwrap_err();
        assert!(matches!(err, StoreError::Storage { .. }));
        assert_eq!(store.read().unwrap(), "fn main() {} // v1");
    }

    #[test]
    fn test_backup_bound_after_repeated_commits() {
        let dir = tempdir().unwrap();
        let store = store_in(dir.path());
        fs::write(store.source_path(), "// gen 0").unwrap();

        for gen in 1..=5 {
            store
                .snapshot_and_replace(&format!("// gen {}", gen))
                .unwrap();
            store.prune_backups(3).unwrap();
        }

        let backups = store.list_backups();
        assert_eq!(backups.len(), 3);
        // Newest-first: the retained set is exactly the most recent images.
        assert_eq!(fs::read_to_string(&backups[0]).unwrap(), "// gen 4");
        assert_eq!(fs::read_to_string(&backups[2]).unwrap(), "// gen 2");
    }

    #[test]
    fn test_prune_tolerates_already_missing_backups() {
        let dir = tempdir().unwrap();
        let store = store_in(dir.path());
        fs::write(store.source_path(), "// gen 0").unwrap();

        for gen in 1..=4 {
            store
                .snapshot_and_replace(&format!("// gen {}", gen))
                .unwrap();
        }

        // Simulate external tooling deleting a backup between enumeration
        // and the next prune.
        let backups = store.list_backups();
        fs::remove_file(&backups[3]).unwrap();

        let removed = store.prune_backups(2).unwrap();
        assert_eq!(removed, 1);
        assert_eq!(store.list_backups().len(), 2);
    }

    #[test]
    fn test_list_backups_ignores_foreign_files() {
        let dir = tempdir().unwrap();
        let store = store_in(dir.path());
        fs::write(store.source_path(), "// gen 0").unwrap();
        store.snapshot_and_replace("// gen 1").unwrap();

        fs::write(dir.path().join(".backups").join("notes.txt"), "x").unwrap();
        fs::write(dir.path().join(".backups").join("other.rs.1.bak"), "x").unwrap();

        assert_eq!(store.list_backups().len(), 1);
    }
}
