//! Pipeline runner: ordered execution of steps against a shared
//! artefact store.
//!
//! Mirrors `BuildConfig.run()`'s lifecycle: workspace setup, a default
//! housekeeping step if none was specified, per-step timing, and metrics
//! finalisation on both the success and failure path.

use crate::artefact_store::ArtefactStore;
use crate::config::BuildConfig;
use crate::error::{FabError, Result};
use crate::housekeeping::SweepPolicy;
use crate::metrics::Metrics;
use crate::util::TimerLogger;
use std::fs;
use std::time::Instant;

/// One stage of a build pipeline.
///
/// Steps run strictly in declared order in the main process; any
/// parallelism a step wants internally goes through
/// [`crate::executor::run_mp`].
pub trait Step: Send + Sync {
    fn name(&self) -> &str;

    fn run(&self, store: &mut ArtefactStore, config: &BuildConfig) -> Result<()>;

    /// Identifies housekeeping steps so the runner can tell whether
    /// the user already specified one.
    fn is_housekeeping(&self) -> bool {
        false
    }
}

/// A housekeeping step that deletes every prebuild artefact not marked
/// current. Used both by user pipelines directly and as the default the
/// runner inserts when no housekeeping step is present.
pub struct CleanupPrebuilds {
    pub policy: SweepPolicy,
}

impl CleanupPrebuilds {
    pub fn all_unused() -> Self {
        Self { policy: SweepPolicy::AllUnused }
    }

    pub fn older_than(duration: std::time::Duration) -> Self {
        Self { policy: SweepPolicy::OlderThan(duration) }
    }
}

impl Step for CleanupPrebuilds {
    fn name(&self) -> &str {
        "cleanup prebuilds"
    }

    fn is_housekeeping(&self) -> bool {
        true
    }

    fn run(&self, store: &mut ArtefactStore, config: &BuildConfig) -> Result<()> {
        let current = store.current_prebuilds();
        let removed = crate::housekeeping::sweep(&config.prebuild_folder, &current, &self.policy)?;
        tracing::info!(removed = removed.len(), "housekeeping swept prebuild folder");
        Ok(())
    }
}

/// Runs `steps` against a fresh [`ArtefactStore`], in declared order.
///
/// On any step failure the remaining steps are not run, but the artefacts
/// of steps that already completed remain on disk; metrics and logging are
/// still finalised before the error propagates.
pub fn run(config: &BuildConfig, mut steps: Vec<Box<dyn Step>>) -> Result<()> {
    tracing::info!(project = %config.project_label, "initialising");

    prep_output_folders(config)?;

    let mut metrics = Metrics::new();
    let mut store = ArtefactStore::new();

    if !steps.iter().any(|s| s.is_housekeeping()) {
        tracing::info!("no housekeeping specified, adding a default hard cleanup");
        steps.push(Box::new(CleanupPrebuilds::all_unused()));
    }

    let run_start = Instant::now();
    let outcome = run_steps(&steps, &mut store, config, &mut metrics);

    metrics.record_run("label", config.project_label.clone());
    metrics.record_run("time_taken_ms", run_start.elapsed().as_millis().to_string());
    if let Err(e) = metrics.write_summary(&config.metrics_folder()) {
        tracing::warn!(error = %e, "failed to write metrics summary");
    }

    match outcome {
        Ok(()) => {
            tracing::info!("all steps complete");
            Ok(())
        }
        Err(e) => {
            tracing::error!(error = %e, "error running build steps");
            Err(FabError::Step(format!("error running build steps:\n{e}")))
        }
    }
}

fn run_steps(steps: &[Box<dyn Step>], store: &mut ArtefactStore, config: &BuildConfig, metrics: &mut Metrics) -> Result<()> {
    for step in steps {
        let timer = TimerLogger::new(step.name().to_string());
        step.run(store, config)?;
        metrics.record_step(step.name(), timer.taken());
    }
    Ok(())
}

fn prep_output_folders(config: &BuildConfig) -> Result<()> {
    fs::create_dir_all(&config.project_workspace)?;
    fs::create_dir_all(&config.build_output)?;
    fs::create_dir_all(&config.prebuild_folder)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artefact_store::Collection;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct RecordingStep {
        label: &'static str,
        calls: Arc<AtomicUsize>,
    }

    impl Step for RecordingStep {
        fn name(&self) -> &str {
            self.label
        }

        fn run(&self, store: &mut ArtefactStore, _config: &BuildConfig) -> Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            store.insert("seen", Collection::PathList(vec![PathBuf::from(self.label)]));
            Ok(())
        }
    }

    struct FailingStep;
    impl Step for FailingStep {
        fn name(&self) -> &str {
            "boom"
        }
        fn run(&self, _store: &mut ArtefactStore, _config: &BuildConfig) -> Result<()> {
            Err(FabError::msg("deliberate failure"))
        }
    }

    fn test_config(label: &str) -> BuildConfig {
        let tmp = tempfile::tempdir().unwrap();
        BuildConfig::builder(label).fab_workspace(tmp.into_path()).build().unwrap()
    }

    #[test]
    fn runs_steps_in_order_and_creates_folders() {
        let config = test_config("proj1");
        let calls = Arc::new(AtomicUsize::new(0));
        let steps: Vec<Box<dyn Step>> = vec![Box::new(RecordingStep { label: "a", calls: calls.clone() })];

        run(&config, steps).unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(config.prebuild_folder.exists());
    }

    #[test]
    fn inserts_default_housekeeping_when_absent() {
        let config = test_config("proj2");
        // Leave a stray prebuild file that nothing marks current: default
        // housekeeping should sweep it.
        std::fs::create_dir_all(&config.prebuild_folder).unwrap();
        let stray = config.prebuild_folder.join("stray.1.o");
        std::fs::write(&stray, b"x").unwrap();

        run(&config, vec![]).unwrap();

        assert!(!stray.exists());
    }

    #[test]
    fn user_supplied_housekeeping_is_not_duplicated() {
        let config = test_config("proj3");
        std::fs::create_dir_all(&config.prebuild_folder).unwrap();
        let stray = config.prebuild_folder.join("stray.1.o");
        std::fs::write(&stray, b"x").unwrap();

        let steps: Vec<Box<dyn Step>> = vec![Box::new(CleanupPrebuilds::all_unused())];
        run(&config, steps).unwrap();

        assert!(!stray.exists());
    }

    #[test]
    fn failure_propagates_and_still_writes_metrics() {
        let config = test_config("proj4");
        let steps: Vec<Box<dyn Step>> = vec![Box::new(FailingStep)];
        let err = run(&config, steps).unwrap_err();
        assert!(err.to_string().contains("deliberate failure"));
        assert!(config.metrics_folder().join("metrics.json").exists());
    }
}
