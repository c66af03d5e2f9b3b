//! Small shared helpers used by several steps.

use crate::config::BuildConfig;
use std::path::{Path, PathBuf};
use std::time::Instant;
use walkdir::WalkDir;

/// Rewrites a path under `config.source_root` to the equivalent path under
/// `config.build_output`, preserving the sub-tree structure. Steps that
/// generate a per-source output (preprocessing, code generation) use this
/// to decide where their result belongs.
pub fn input_to_output_fpath(config: &BuildConfig, input_path: &Path) -> PathBuf {
    match input_path.strip_prefix(&config.source_root) {
        Ok(rel) => config.build_output.join(rel),
        Err(_) => config.build_output.join(input_path.file_name().unwrap_or_default()),
    }
}

/// Filters `paths` down to those ending with one of `suffixes`.
pub fn suffix_filter<'a>(paths: impl IntoIterator<Item = &'a PathBuf>, suffixes: &[&str]) -> Vec<PathBuf> {
    paths
        .into_iter()
        .filter(|p| {
            let s = p.to_string_lossy();
            suffixes.iter().any(|suf| s.ends_with(suf))
        })
        .cloned()
        .collect()
}

/// Recursively lists files under `root`, skipping any path that falls
/// inside one of `ignore_folders` (the prebuild folder, most importantly —
/// kernel source trees are walked for kernel metadata and must not descend
/// into cached build output).
pub fn file_walk(root: &Path, ignore_folders: &[PathBuf]) -> Vec<PathBuf> {
    WalkDir::new(root)
        .into_iter()
        .filter_entry(|entry| !ignore_folders.iter().any(|ignored| entry.path().starts_with(ignored)))
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.into_path())
        .collect()
}

/// RAII timer that emits a `tracing` debug span duration when dropped,
/// mirroring the original `TimerLogger` context manager.
pub struct TimerLogger {
    label: String,
    start: Instant,
}

impl TimerLogger {
    pub fn new(label: impl Into<String>) -> Self {
        let label = label.into();
        tracing::debug!(%label, "starting");
        Self { label, start: Instant::now() }
    }

    pub fn taken(&self) -> std::time::Duration {
        self.start.elapsed()
    }
}

impl Drop for TimerLogger {
    fn drop(&mut self) {
        tracing::debug!(label = %self.label, taken_ms = self.start.elapsed().as_millis(), "finished");
    }
}
