//! Run configuration.
//!
//! A [`BuildConfig`] is immutable once built and is handed to every step by
//! the pipeline runner along with the artefact store.

use crate::artefact_store::ArtefactStore;
use crate::error::{FabError, Result};
use std::env;
use std::path::{Path, PathBuf};

pub const PREBUILD_DIR: &str = "_prebuild";
pub const SOURCE_ROOT: &str = "source";
pub const BUILD_OUTPUT: &str = "build_output";

/// Resolves the default fab workspace: `$FAB_WORKSPACE` if set, else
/// `~/fab-workspace`.
pub fn default_fab_workspace() -> Result<PathBuf> {
    if let Ok(ws) = env::var("FAB_WORKSPACE") {
        return Ok(PathBuf::from(ws));
    }
    dirs::home_dir()
        .map(|home| home.join("fab-workspace"))
        .ok_or_else(|| FabError::Config("could not determine home directory for fab workspace".into()))
}

/// Immutable per-run configuration, created once at pipeline entry.
#[derive(Clone, Debug)]
pub struct BuildConfig {
    pub project_label: String,
    pub workspace_root: PathBuf,
    pub project_workspace: PathBuf,
    pub source_root: PathBuf,
    pub build_output: PathBuf,
    pub prebuild_folder: PathBuf,
    pub multiprocessing: bool,
    pub n_procs: usize,
    pub reuse_artefacts: bool,
    pub verbose: bool,
}

impl BuildConfig {
    /// Convenience function to call [`BuildConfigBuilder::new`].
    pub fn builder(project_label: impl Into<String>) -> BuildConfigBuilder {
        BuildConfigBuilder::new(project_label)
    }

    pub fn metrics_folder(&self) -> PathBuf {
        self.project_workspace.join("metrics").join(&self.project_label)
    }
}

pub struct BuildConfigBuilder {
    project_label: String,
    fab_workspace: Option<PathBuf>,
    multiprocessing: bool,
    n_procs: Option<usize>,
    reuse_artefacts: bool,
    verbose: bool,
}

impl BuildConfigBuilder {
    pub fn new(project_label: impl Into<String>) -> Self {
        Self {
            project_label: project_label.into(),
            fab_workspace: None,
            multiprocessing: true,
            n_procs: None,
            reuse_artefacts: false,
            verbose: false,
        }
    }

    /// Overrides `$FAB_WORKSPACE`.
    #[must_use]
    pub fn fab_workspace(mut self, path: impl Into<PathBuf>) -> Self {
        self.fab_workspace = Some(path.into());
        self
    }

    /// Disables multiprocessing, e.g. to aid debugging.
    #[must_use]
    pub fn multiprocessing(mut self, enabled: bool) -> Self {
        self.multiprocessing = enabled;
        self
    }

    #[must_use]
    pub fn n_procs(mut self, n: usize) -> Self {
        self.n_procs = Some(n);
        self
    }

    #[must_use]
    pub fn reuse_artefacts(mut self, reuse: bool) -> Self {
        self.reuse_artefacts = reuse;
        self
    }

    #[must_use]
    pub fn verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    pub fn build(self) -> Result<BuildConfig> {
        let project_label = self.project_label.replace(' ', "_");

        let fab_workspace = match self.fab_workspace {
            Some(p) => p,
            None => default_fab_workspace()?,
        };

        let project_workspace = fab_workspace.join(&project_label);
        let source_root = project_workspace.join(SOURCE_ROOT);
        let build_output = project_workspace.join(BUILD_OUTPUT);
        let prebuild_folder = build_output.join(PREBUILD_DIR);

        let multiprocessing = self.multiprocessing;
        let n_procs = if multiprocessing {
            self.n_procs.unwrap_or_else(|| num_cpus::get().max(1))
        } else {
            1
        };

        Ok(BuildConfig {
            project_label,
            workspace_root: fab_workspace,
            project_workspace,
            source_root,
            build_output,
            prebuild_folder,
            multiprocessing,
            n_procs,
            reuse_artefacts: self.reuse_artefacts,
            verbose: self.verbose,
        })
    }
}

/// Renders `path` relative to `config.source_root`, for templating and
/// logging purposes (e.g. the `$relative` substitution in flag resolution).
pub fn relative_to_source(config: &BuildConfig, path: &Path) -> PathBuf {
    path.strip_prefix(&config.source_root).map(Path::to_path_buf).unwrap_or_else(|_| path.to_path_buf())
}

/// One run's mutable state, reset at the start of every [`crate::pipeline::run`] call.
pub struct RunState {
    pub config: BuildConfig,
    pub artefact_store: ArtefactStore,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn project_label_spaces_become_underscores() {
        let cfg = BuildConfig::builder("my project").fab_workspace("/tmp/fabws").build().unwrap();
        assert_eq!(cfg.project_label, "my_project");
        assert_eq!(cfg.project_workspace, PathBuf::from("/tmp/fabws/my_project"));
    }

    #[test]
    fn derived_paths_are_consistent() {
        let cfg = BuildConfig::builder("proj").fab_workspace("/ws").build().unwrap();
        assert_eq!(cfg.source_root, PathBuf::from("/ws/proj/source"));
        assert_eq!(cfg.build_output, PathBuf::from("/ws/proj/build_output"));
        assert_eq!(cfg.prebuild_folder, PathBuf::from("/ws/proj/build_output/_prebuild"));
    }

    #[test]
    fn sequential_mode_forces_one_proc() {
        let cfg = BuildConfig::builder("proj").fab_workspace("/ws").multiprocessing(false).build().unwrap();
        assert_eq!(cfg.n_procs, 1);
    }
}
