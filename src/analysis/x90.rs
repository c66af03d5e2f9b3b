//! `AnalysedX90`: the external contract an X90 analyser produces.
//!
//! This is constructed with the file hash already resolved to the
//! *original* (un-rewritten) `.x90` source rather than mutating a
//! `file_hash` field after the fact once the parsable-version hash has
//! served its purpose.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

#[derive(Clone, Debug)]
pub struct AnalysedX90 {
    pub fpath: PathBuf,
    file_hash: u32,
    kernel_deps: HashSet<String>,
}

impl AnalysedX90 {
    /// `file_hash` must be the checksum of the original `.x90` file, not of
    /// any parsable rewrite produced along the way — see
    /// [`crate::steps::psyclone::make_parsable_x90`].
    pub fn new(fpath: impl Into<PathBuf>, file_hash: u32, kernel_deps: HashSet<String>) -> Self {
        Self { fpath: fpath.into(), file_hash, kernel_deps }
    }

    pub fn file_hash(&self) -> u32 {
        self.file_hash
    }

    pub fn kernel_deps(&self) -> &HashSet<String> {
        &self.kernel_deps
    }
}

/// Contract for the external X90 analyser.
pub trait X90Analyser: Send + Sync {
    fn analyse(&self, path: &Path) -> crate::error::Result<(AnalysedX90, PathBuf)>;
}
