//! Checkpoint artifact cleanup between experiments.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Size of a directory tree in bytes.
pub fn dir_size(path: &Path) -> io::Result<u64> {
    let mut total = 0u64;

    if path.is_dir() {
        for entry in fs::read_dir(path)? {
            let entry = entry?;
            let path = entry.path();
            if path.is_dir() {
                total += dir_size(&path)?;
            } else {
                total += entry.metadata()?.len();
            }
        }
    }

    Ok(total)
}

/// Human-readable byte count.
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];

    if bytes < 1024 {
        return format!("{} B", bytes);
    }

    let mut size = bytes as f64;
    let mut unit = 0;
    while size >= 1024.0 && unit < UNITS.len() - 1 {
        size /= 1024.0;
        unit += 1;
    }

    format!("{:.2} {}", size, UNITS[unit])
}

/// What a purge removed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PurgeReport {
    pub freed_bytes: u64,
    pub removed_entries: usize,
}

/// The checkpoint directory one experiment writes and the next one must not
/// see. Purging empties the directory but keeps it in place, matching
/// `rm -rf <dir>/*`.
#[derive(Debug, Clone)]
pub struct CheckpointStore {
    root: PathBuf,
}

impl CheckpointStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn usage(&self) -> io::Result<u64> {
        dir_size(&self.root)
    }

    pub fn purge(&self) -> io::Result<PurgeReport> {
        if !self.root.is_dir() {
            return Ok(PurgeReport {
                freed_bytes: 0,
                removed_entries: 0,
            });
        }

        let freed_bytes = dir_size(&self.root)?;
        let mut removed_entries = 0;

        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            let path = entry.path();
            if path.is_dir() {
                fs::remove_dir_all(&path)?;
            } else {
                fs::remove_file(&path)?;
            }
            removed_entries += 1;
        }

        tracing::info!(
            root = %self.root.display(),
            freed = %format_bytes(freed_bytes),
            "purged checkpoint artifacts"
        );

        Ok(PurgeReport {
            freed_bytes,
            removed_entries,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(0), "0 B");
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(2048), "2.00 KB");
        assert_eq!(format_bytes(5 * 1024 * 1024), "5.00 MB");
    }

    #[test]
    fn test_purge_empties_but_keeps_the_root() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("checkpoints");
        fs::create_dir(&root).unwrap();
        fs::create_dir(root.join("iter_0000100")).unwrap();
        fs::write(root.join("iter_0000100/model.pt"), vec![0u8; 1024]).unwrap();
        fs::write(root.join("latest"), b"iter_0000100").unwrap();

        let store = CheckpointStore::new(&root);
        let report = store.purge().unwrap();

        assert_eq!(report.removed_entries, 2);
        assert_eq!(report.freed_bytes, 1024 + 12);
        assert!(root.is_dir());
        assert_eq!(fs::read_dir(&root).unwrap().count(), 0);
    }

    #[test]
    fn test_purge_of_missing_root_is_a_no_op() {
        let dir = tempfile::tempdir().unwrap();
        let store = CheckpointStore::new(dir.path().join("never-created"));
        let report = store.purge().unwrap();
        assert_eq!(report.freed_bytes, 0);
        assert_eq!(report.removed_entries, 0);
    }
}
