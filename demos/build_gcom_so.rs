//! Illustrative pipeline assembly for a hypothetical "gcom"-style build.
//!
//! Not a shipped binary — CLI argument parsing belongs to a consumer's own
//! run script. This shows how a consumer would wire up a
//! [`fab::BuildConfig`] and a step list for a real project.

use fab::steps::psyclone::Psyclone;
use fab::{BuildConfig, CompileFortran, Step};
use std::path::PathBuf;

/// A no-op stand-in for the external Fortran analyser. A real build would
/// inject an analyser that actually parses `use`/`module` statements.
struct NullFortranAnalyser;

impl fab::analysis::fortran::FortranAnalyser for NullFortranAnalyser {
    fn analyse(&self, path: &std::path::Path) -> fab::Result<(fab::analysis::fortran::AnalysedFortran, PathBuf)> {
        let hash = fab::hash::file_hash(path)?;
        Ok((fab::analysis::fortran::AnalysedFortran::new(path, hash), path.to_path_buf()))
    }
}

struct NullX90Analyser;

impl fab::analysis::x90::X90Analyser for NullX90Analyser {
    fn analyse(&self, path: &std::path::Path) -> fab::Result<(fab::analysis::x90::AnalysedX90, PathBuf)> {
        let hash = fab::hash::file_hash(path)?;
        Ok((fab::analysis::x90::AnalysedX90::new(path, hash, Default::default()), path.to_path_buf()))
    }
}

fn main() -> fab::Result<()> {
    tracing_subscriber::fmt::init();

    let config = BuildConfig::builder("gcom")
        .fab_workspace(std::env::var("FAB_WORKSPACE").unwrap_or_else(|_| "/tmp/fab-workspace".into()))
        .build()?;

    let compiler = CompileFortran::resolve(None)?;

    let psyclone = Psyclone::new(Box::new(NullX90Analyser), Box::new(NullFortranAnalyser))
        .kernel_roots(vec![config.source_root.join("kernels")]);

    let steps: Vec<Box<dyn Step>> = vec![Box::new(psyclone), Box::new(compiler)];

    fab::pipeline::run(&config, steps)
}
