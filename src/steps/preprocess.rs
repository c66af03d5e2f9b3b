//! Generic preprocessor step.
//!
//! Preprocessor command construction isn't implemented here: this module
//! only fixes the step's shape — which sources it reads, where outputs go,
//! what flags apply — and delegates the actual invocation to an injected
//! [`Preprocessor`]. No `cpp`/`fpp` invocation logic lives here.

use crate::artefact_store::{ArtefactStore, ArtefactsGetter, Collection};
use crate::config::BuildConfig;
use crate::error::Result;
use crate::executor::{check_for_errors, run_mp};
use crate::pipeline::Step;
use crate::util::input_to_output_fpath;
use std::path::{Path, PathBuf};

/// External preprocessor contract: given an input file, a target output
/// path, and resolved flags, produce the output. Real implementations
/// shell out to `cpp`/`fpp` or similar; this crate only defines the shape.
pub trait Preprocessor: Send + Sync {
    fn preprocess(&self, input: &Path, output: &Path, flags: &[String]) -> Result<()>;
}

/// Runs an injected [`Preprocessor`] over every source the `source` getter
/// selects, writing results under `output_suffix` and recording them in
/// `output_collection`.
pub struct PreProcessorStep {
    pub tool: Box<dyn Preprocessor>,
    pub source: Box<dyn ArtefactsGetter>,
    pub output_collection: String,
    pub output_suffix: String,
    pub common_flags: Vec<String>,
}

impl PreProcessorStep {
    pub fn new(
        tool: Box<dyn Preprocessor>,
        source: Box<dyn ArtefactsGetter>,
        output_collection: impl Into<String>,
        output_suffix: impl Into<String>,
        common_flags: Vec<String>,
    ) -> Self {
        Self { tool, source, output_collection: output_collection.into(), output_suffix: output_suffix.into(), common_flags }
    }

    fn output_path(&self, config: &BuildConfig, input: &Path) -> PathBuf {
        input_to_output_fpath(config, input).with_extension(self.output_suffix.trim_start_matches('.'))
    }
}

impl Step for PreProcessorStep {
    fn name(&self) -> &str {
        "preprocess"
    }

    fn run(&self, store: &mut ArtefactStore, config: &BuildConfig) -> Result<()> {
        let sources = self.source.get(store);
        let items: Vec<PathBuf> = sources.into_iter().collect();

        let results: Vec<std::result::Result<PathBuf, crate::error::FabError>> = run_mp(config, items, |input| {
            let output = self.output_path(config, &input);
            if let Some(parent) = output.parent() {
                std::fs::create_dir_all(parent)?;
            }
            self.tool.preprocess(&input, &output, &self.common_flags)?;
            Ok(output)
        });
        check_for_errors(&results, "preprocess")?;

        let outputs: Vec<PathBuf> = results.into_iter().filter_map(|r| r.ok()).collect();
        store.insert(self.output_collection.clone(), Collection::PathList(outputs));
        Ok(())
    }
}
