//! Evicting stale prebuild artefacts.

use crate::error::Result;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

/// What housekeeping should remove from the prebuild folder.
pub enum SweepPolicy {
    /// Delete every file not in the current-prebuilds set.
    AllUnused,
    /// Among files not in the current-prebuilds set, delete those whose
    /// access time is older than `older_than` before now.
    ///
    /// This deliberately uses access time, not mtime, matching the
    /// original tool even though mtime would be a more defensible choice
    /// for this purpose.
    OlderThan(Duration),
}

/// Deletes files from `prebuild_folder` per `policy`, never touching
/// anything in `current`.
pub fn sweep(prebuild_folder: &Path, current: &HashSet<PathBuf>, policy: &SweepPolicy) -> Result<Vec<PathBuf>> {
    if !prebuild_folder.exists() {
        return Ok(Vec::new());
    }

    let mut removed = Vec::new();
    for entry in fs::read_dir(prebuild_folder)? {
        let entry = entry?;
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        if current.contains(&path) {
            continue;
        }

        let should_remove = match policy {
            SweepPolicy::AllUnused => true,
            SweepPolicy::OlderThan(older_than) => {
                let accessed = entry.metadata().and_then(|m| m.accessed()).unwrap_or(SystemTime::now());
                SystemTime::now().duration_since(accessed).map(|age| age > *older_than).unwrap_or(false)
            }
        };

        if should_remove {
            fs::remove_file(&path)?;
            removed.push(path);
        }
    }

    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn all_unused_deletes_everything_not_current() {
        let tmp = tempfile::tempdir().unwrap();
        let prebuild = tmp.path().join("_prebuild");
        fs::create_dir_all(&prebuild).unwrap();
        let keep = prebuild.join("a.1.o");
        let drop = prebuild.join("b.2.o");
        fs::write(&keep, b"x").unwrap();
        fs::write(&drop, b"y").unwrap();

        let current = HashSet::from([keep.clone()]);
        let removed = sweep(&prebuild, &current, &SweepPolicy::AllUnused).unwrap();

        assert_eq!(removed, vec![drop.clone()]);
        assert!(keep.exists());
        assert!(!drop.exists());
    }

    #[test]
    fn never_touches_current_prebuilds() {
        let tmp = tempfile::tempdir().unwrap();
        let prebuild = tmp.path().join("_prebuild");
        fs::create_dir_all(&prebuild).unwrap();
        let a = prebuild.join("a.1.o");
        fs::write(&a, b"x").unwrap();

        let current = HashSet::from([a.clone()]);
        sweep(&prebuild, &current, &SweepPolicy::AllUnused).unwrap();
        assert!(a.exists());
    }

    #[test]
    fn older_than_keeps_recently_accessed_files() {
        let tmp = tempfile::tempdir().unwrap();
        let prebuild = tmp.path().join("_prebuild");
        fs::create_dir_all(&prebuild).unwrap();
        let fresh = prebuild.join("fresh.1.o");
        fs::write(&fresh, b"x").unwrap();

        let removed = sweep(&prebuild, &HashSet::new(), &SweepPolicy::OlderThan(Duration::from_secs(3600))).unwrap();
        assert!(removed.is_empty());
        assert!(fresh.exists());
    }
}
