//! PSyclone code-generation step.
//!
//! Turns `.x90` algorithm layer files into plain Fortran (a modified
//! algorithm file plus, usually, a generated PSy layer) by shelling out to
//! the external `psyclone` tool, caching results in the prebuild store
//! keyed by a combo hash of everything that should trigger regeneration:
//! the x90 source, the kernel metadata it depends on, the transformation
//! script, and the CLI arguments.

use crate::analysis::fortran::{AnalysedFortran, FortranAnalyser};
use crate::analysis::x90::{AnalysedX90, X90Analyser};
use crate::artefact_store::{
    ArtefactStore, ArtefactsGetter, Collection, CollectionConcat, CollectionGetter, SuffixFilter, ALL_SOURCE, PREPROCESSED_X90,
    PSYCLONE_OUTPUT,
};
use crate::config::BuildConfig;
use crate::error::{FabError, Result};
use crate::executor::{check_for_errors, run_mp};
use crate::hash::{combine, file_hash, string_hash};
use crate::pipeline::Step;
use crate::prebuild;
use crate::util::{file_walk, input_to_output_fpath, suffix_filter};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

/// Matches `call invoke( name = "...",` (continuation ampersands and
/// whitespace tolerated between tokens), capturing the quoted name.
static NAMED_INVOKE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"call[\s&]+invoke[\s&]*\([\s&]*name[\s&]*=[\s&]*('[^']*'|"[^"]*")[\s&]*,[\s&]*"#).unwrap());

/// Strips comment lines (a `!` name-keyword immediately followed by a
/// comment line has no continuation `&`, which would otherwise produce
/// invalid Fortran) and removes the `name = "..."` keyword from `invoke()`
/// calls, so third-party tooling that doesn't understand the keyword can
/// parse the result. Writes to `<path>.parsable_x90` and returns that path.
///
/// A `!` inside a quoted string on an otherwise-code line is not
/// recognised as a comment opener; this is a known limitation carried over
/// unchanged rather than special-cased.
pub fn make_parsable_x90(x90_path: &Path) -> Result<PathBuf> {
    let src = fs::read_to_string(x90_path)?;
    let no_comment_lines: String = src.lines().filter(|line| !line.trim_start().starts_with('!')).map(|l| format!("{l}\n")).collect();

    let rewritten = NAMED_INVOKE.replace_all(&no_comment_lines, "call invoke(");

    let out_path = x90_path.with_extension("parsable_x90");
    fs::write(&out_path, rewritten.as_bytes())?;
    Ok(out_path)
}

/// The default source selection for the psyclone step: x90 we preprocessed
/// this run, plus any already-preprocessed x90 pulled in from source.
fn default_source_getter() -> Box<dyn ArtefactsGetter> {
    Box::new(CollectionConcat(vec![
        Box::new(CollectionGetter::new(PREPROCESSED_X90)),
        Box::new(SuffixFilter::new(ALL_SOURCE, ".x90")),
    ]))
}

pub struct Psyclone {
    pub kernel_roots: Vec<PathBuf>,
    pub transformation_script: Option<PathBuf>,
    /// "The gross switch which turns off MPI usage is a command-line argument."
    pub cli_args: Vec<String>,
    pub source_getter: Box<dyn ArtefactsGetter>,
    x90_analyser: Box<dyn X90Analyser>,
    fortran_analyser: Box<dyn FortranAnalyser>,
}

impl Psyclone {
    pub fn new(x90_analyser: Box<dyn X90Analyser>, fortran_analyser: Box<dyn FortranAnalyser>) -> Self {
        Self {
            kernel_roots: Vec::new(),
            transformation_script: None,
            cli_args: Vec::new(),
            source_getter: default_source_getter(),
            x90_analyser,
            fortran_analyser,
        }
    }

    #[must_use]
    pub fn kernel_roots(mut self, roots: Vec<PathBuf>) -> Self {
        self.kernel_roots = roots;
        self
    }

    #[must_use]
    pub fn transformation_script(mut self, script: PathBuf) -> Self {
        self.transformation_script = Some(script);
        self
    }

    #[must_use]
    pub fn cli_args(mut self, args: Vec<String>) -> Self {
        self.cli_args = args;
        self
    }

    #[must_use]
    pub fn source_getter(mut self, getter: Box<dyn ArtefactsGetter>) -> Self {
        self.source_getter = getter;
        self
    }

    /// Gathers the data needed to calculate every x90's prebuild hash:
    /// analysed x90s, kernel metadata hashes, and the transformation
    /// script's hash. Returns the prebuild artefacts this analysis work
    /// itself produced, so the caller can mark them current.
    fn analysis_for_prebuilds(
        &self,
        x90s: &HashSet<PathBuf>,
        config: &BuildConfig,
    ) -> Result<(HashMap<PathBuf, AnalysedX90>, HashMap<String, u32>, u32, Vec<PathBuf>)> {
        let transformation_script_hash = match &self.transformation_script {
            Some(script) => file_hash(script)?,
            None => {
                tracing::warn!("no transformation script specified");
                0
            }
        };

        let (analysed_x90, x90_prebuilds) = self.analyse_x90s(x90s, config)?;
        let (kernel_hashes, kernel_prebuilds) = self.analyse_kernels(config)?;

        let mut prebuilds = x90_prebuilds;
        prebuilds.extend(kernel_prebuilds);

        Ok((analysed_x90, kernel_hashes, transformation_script_hash, prebuilds))
    }

    fn analyse_x90s(&self, x90s: &HashSet<PathBuf>, config: &BuildConfig) -> Result<(HashMap<PathBuf, AnalysedX90>, Vec<PathBuf>)> {
        let items: Vec<PathBuf> = x90s.iter().cloned().collect();
        let parsable_results = run_mp(config, items, |p| make_parsable_x90(&p));
        check_for_errors(&parsable_results, "make_parsable_x90")?;
        let parsable: Vec<PathBuf> = parsable_results.into_iter().filter_map(|r| r.ok()).collect();

        let analyse_results = run_mp(config, parsable, |p| self.x90_analyser.analyse(&p));
        check_for_errors(&analyse_results, "x90 analysis")?;

        let mut analysed = HashMap::new();
        let mut prebuilds = Vec::new();
        for r in analyse_results {
            let (analysis, prebuild_path) = r.expect("checked above");
            prebuilds.push(prebuild_path);

            // Key by, and hash from, the original x90 — not the parsable
            // rewrite, which has invoke names stripped out.
            let original = analysis.fpath.with_extension("x90");
            let original_hash = file_hash(&original)?;
            let fixed = AnalysedX90::new(original.clone(), original_hash, analysis.kernel_deps().clone());
            analysed.insert(original, fixed);
        }

        Ok((analysed, prebuilds))
    }

    fn analyse_kernels(&self, config: &BuildConfig) -> Result<(HashMap<String, u32>, Vec<PathBuf>)> {
        // Union of every kernel root's file list — the fixed version of a
        // known source bug where the original unpacked `chain(file_lists)`
        // positionally into `set()` instead of taking their union.
        let mut all_kernel_files: HashSet<PathBuf> = HashSet::new();
        for root in &self.kernel_roots {
            all_kernel_files.extend(file_walk(root, &[config.prebuild_folder.clone()]));
        }
        let kernel_files = suffix_filter(&all_kernel_files, &[".f90"]);

        let results = run_mp(config, kernel_files, |p| self.fortran_analyser.analyse(&p));
        check_for_errors(&results, "kernel analysis")?;

        let mut all_kernel_hashes: HashMap<String, u32> = HashMap::new();
        let mut duplicates = Vec::new();
        let mut prebuilds = Vec::new();

        for r in results {
            let (analysed, prebuild_path): (AnalysedFortran, PathBuf) = r.expect("checked above");
            prebuilds.push(prebuild_path);
            for (name, hash) in analysed.psyclone_kernels() {
                if all_kernel_hashes.contains_key(name) {
                    duplicates.push(name.clone());
                } else {
                    all_kernel_hashes.insert(name.clone(), *hash);
                }
            }
        }

        if !duplicates.is_empty() {
            return Err(FabError::DuplicateKernel(duplicates));
        }

        Ok((all_kernel_hashes, prebuilds))
    }

    fn gen_prebuild_hash(
        &self,
        x90_file: &Path,
        analysed_x90: &HashMap<PathBuf, AnalysedX90>,
        kernel_hashes: &HashMap<String, u32>,
        transformation_script_hash: u32,
    ) -> Result<u32> {
        let analysis = analysed_x90
            .get(x90_file)
            .ok_or_else(|| FabError::msg(format!("no x90 analysis for {}", x90_file.display())))?;

        let kernel_deps_hash = combine(analysis.kernel_deps().iter().map(|name| kernel_hashes.get(name).copied().unwrap_or(0)));

        Ok(combine([
            analysis.file_hash(),
            kernel_deps_hash,
            transformation_script_hash,
            string_hash(&format!("{:?}", self.cli_args)),
        ]))
    }

    fn do_one_file(
        &self,
        x90_file: &Path,
        analysed_x90: &HashMap<PathBuf, AnalysedX90>,
        kernel_hashes: &HashMap<String, u32>,
        transformation_script_hash: u32,
        config: &BuildConfig,
    ) -> Result<(Vec<PathBuf>, Vec<PathBuf>)> {
        let prebuild_hash = self.gen_prebuild_hash(x90_file, analysed_x90, kernel_hashes, transformation_script_hash)?;

        let modified_alg = input_to_output_fpath(config, &x90_file.with_extension("f90"));
        let stem = x90_file.file_stem().map(|s| s.to_string_lossy().to_string()).unwrap_or_default();
        let generated = input_to_output_fpath(config, &x90_file.with_file_name(format!("{stem}_psy.f90")));

        if let Some(parent) = generated.parent() {
            fs::create_dir_all(parent)?;
        }

        let alg_stem = modified_alg.file_stem().map(|s| s.to_string_lossy().to_string()).unwrap_or_default();
        let gen_stem = generated.file_stem().map(|s| s.to_string_lossy().to_string()).unwrap_or_default();
        let prebuilt_alg = prebuild::path_for(&config.prebuild_folder, &alg_stem, prebuild_hash, "f90");
        let prebuilt_gen = prebuild::path_for(&config.prebuild_folder, &gen_stem, prebuild_hash, "f90");

        let mut prebuilds = vec![prebuilt_alg.clone()];

        if prebuilt_alg.exists() {
            prebuild::restore(&prebuilt_alg, &modified_alg)?;
            if prebuilt_gen.exists() {
                prebuild::restore(&prebuilt_gen, &generated)?;
                prebuilds.push(prebuilt_gen.clone());
            }
        } else {
            self.run_psyclone(&generated, &modified_alg, x90_file)?;
            prebuild::stash(&modified_alg, &prebuilt_alg)?;
            if generated.exists() {
                prebuild::stash(&generated, &prebuilt_gen)?;
                prebuilds.push(prebuilt_gen.clone());
            }
        }

        let mut outputs = vec![modified_alg];
        if generated.exists() {
            outputs.push(generated);
        }

        Ok((outputs, prebuilds))
    }

    fn run_psyclone(&self, generated: &Path, modified_alg: &Path, x90_file: &Path) -> Result<()> {
        let mut command = Command::new("psyclone");
        command.arg("-api").arg("dynamo0.3").arg("-l").arg("all");
        for root in &self.kernel_roots {
            command.arg("-d").arg(root);
        }
        command.arg("-opsy").arg(generated).arg("-oalg").arg(modified_alg);
        if let Some(script) = &self.transformation_script {
            command.arg("-s").arg(script);
        }
        command.args(&self.cli_args);
        command.arg(x90_file);

        let output = command.output().map_err(|_| FabError::ToolNotFound("psyclone".to_string()))?;
        if !output.status.success() {
            return Err(FabError::ToolFailed {
                tool: "psyclone".to_string(),
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            });
        }
        Ok(())
    }
}

impl Step for Psyclone {
    fn name(&self) -> &str {
        "psyclone"
    }

    fn run(&self, store: &mut ArtefactStore, config: &BuildConfig) -> Result<()> {
        let x90s = self.source_getter.get(store);

        let (analysed_x90, kernel_hashes, transformation_script_hash, analysis_prebuilds) = self.analysis_for_prebuilds(&x90s, config)?;
        store.add_current_prebuilds(analysis_prebuilds);

        let items: Vec<PathBuf> = x90s.into_iter().collect();
        let results =
            run_mp(config, items, |x90| self.do_one_file(&x90, &analysed_x90, &kernel_hashes, transformation_script_hash, config));
        check_for_errors(&results, "psyclone")?;

        let mut outputs = Vec::new();
        let mut prebuilds = Vec::new();
        for r in results {
            let (out, pre) = r.expect("checked above");
            outputs.extend(out);
            prebuilds.extend(pre);
        }

        store.insert(PSYCLONE_OUTPUT, Collection::PathList(outputs));
        store.add_current_prebuilds(prebuilds);
        Ok(())
    }
}
