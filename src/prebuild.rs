//! Content-addressed prebuild store.
//!
//! Files live under `prebuild_folder` as `<stem>.<hex-hash>.<ext>`. The
//! store never looks at mtimes; reuse across runs is entirely governed by
//! whether a combo-hashed filename already exists.

use crate::error::Result;
use crate::hash::hex;
use std::fs;
use std::path::{Path, PathBuf};

/// Deterministic layout: `<prebuild_folder>/<stem>.<combo_hash>.<ext>`.
pub fn path_for(prebuild_folder: &Path, stem: &str, combo_hash: u32, ext: &str) -> PathBuf {
    prebuild_folder.join(format!("{stem}.{}.{ext}", hex(combo_hash)))
}

pub fn exists(path: &Path) -> bool {
    path.exists()
}

/// Byte-preserving copy of `src` into the prebuild store at `dst`.
pub fn stash(src: &Path, dst: &Path) -> Result<()> {
    if let Some(parent) = dst.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::copy(src, dst)?;
    Ok(())
}

/// Byte-preserving copy of a cached prebuild `src` out to `dst`.
pub fn restore(src: &Path, dst: &Path) -> Result<()> {
    if let Some(parent) = dst.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::copy(src, dst)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn path_for_is_deterministic() {
        let folder = Path::new("/ws/proj/build_output/_prebuild");
        let p1 = path_for(folder, "foofile", 0x1eb0c2d1, "o");
        let p2 = path_for(folder, "foofile", 0x1eb0c2d1, "o");
        assert_eq!(p1, p2);
        assert_eq!(p1, PathBuf::from("/ws/proj/build_output/_prebuild/foofile.1eb0c2d1.o"));
    }

    #[test]
    fn stash_and_restore_round_trip() {
        let tmp = tempfile::tempdir().unwrap();
        let src = tmp.path().join("in.mod");
        fs::write(&src, b"interface data").unwrap();

        let prebuild = tmp.path().join("_prebuild");
        let stashed = path_for(&prebuild, "foo", 42, "mod");
        stash(&src, &stashed).unwrap();
        assert!(stashed.exists());

        let restored = tmp.path().join("build_output").join("foo.mod");
        restore(&stashed, &restored).unwrap();
        assert_eq!(fs::read(&restored).unwrap(), b"interface data");
    }
}
