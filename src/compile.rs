//! Compile scheduler — the core of the build driver.
//!
//! Schedules Fortran compilation in dependency waves, derives the two
//! combo hashes that drive prebuild reuse (`mods_combo_hash`,
//! `obj_combo_hash`), and propagates module-interface hashes between
//! waves so that a change to an *upstream* module's public surface
//! invalidates downstream objects even when their own source is untouched.

use crate::analysis::fortran::AnalysedFortran;
use crate::artefact_store::{ArtefactStore, Collection, BUILD_TREES};
use crate::config::BuildConfig;
use crate::error::{FabError, Result};
use crate::executor::{check_for_errors, run_mp};
use crate::flags::FlagsConfig;
use crate::hash::{combine, file_hash, string_hash};
use crate::pipeline::Step;
use crate::prebuild;
use std::collections::{HashMap, HashSet};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

/// `(input_path, output_path)` for a compiled Fortran object; the output
/// path lives inside the prebuild store under its combo-hashed name.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CompiledFile {
    pub input_fpath: PathBuf,
    pub output_fpath: PathBuf,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CompilerIdentity {
    pub name: String,
    pub version: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum CompilerFamily {
    GFortran,
    IFort,
    Other,
}

impl CompilerFamily {
    fn of(name: &str) -> Self {
        match name {
            "gfortran" => Self::GFortran,
            "ifort" => Self::IFort,
            _ => Self::Other,
        }
    }

    /// Flags the compile scheduler manages itself (the `-c` it always
    /// passes, and the module-output-directory flag for recognised
    /// families) — `(flag, takes_a_value)` pairs. Stripped from
    /// user-declared flags so they are never duplicated.
    fn managed_flags(self) -> &'static [(&'static str, bool)] {
        match self {
            Self::GFortran => &[("-c", false), ("-J", true)],
            Self::IFort => &[("-c", false), ("-module", true)],
            Self::Other => &[],
        }
    }

    /// The module-output-directory flag this family understands, pointed
    /// at `dir`. Unrecognised compilers get none: the caller is
    /// responsible for passing an equivalent flag of their own (see
    /// `test_unknown_compiler`-style configurations).
    fn module_dir_flag(self, dir: &Path) -> Vec<String> {
        match self {
            Self::GFortran => vec!["-J".to_string(), dir.display().to_string()],
            Self::IFort => vec!["-module".to_string(), dir.display().to_string()],
            Self::Other => vec![],
        }
    }
}

fn strip_managed_flags(tokens: Vec<String>, family: CompilerFamily) -> Vec<String> {
    let managed = family.managed_flags();
    let mut out = Vec::with_capacity(tokens.len());
    let mut iter = tokens.into_iter();
    while let Some(tok) = iter.next() {
        if let Some((_, takes_value)) = managed.iter().find(|(flag, _)| *flag == tok) {
            if *takes_value {
                iter.next();
            }
            continue;
        }
        out.push(tok);
    }
    out
}

/// Probes `$FC`/`compiler_override` (precedence: explicit argument, then
/// environment) for a compiler name plus any leading flags, folds in
/// `$FFLAGS`, and strips flags the scheduler manages itself for
/// recognised compiler families.
fn resolve_compiler(compiler_override: Option<&str>) -> Result<(CompilerIdentity, Vec<String>)> {
    let raw = match compiler_override {
        Some(s) => s.to_string(),
        None => env::var("FC").map_err(|_| FabError::Config("no fortran compiler: set $FC or pass one explicitly".into()))?,
    };

    let mut tokens: Vec<String> = raw.split_whitespace().map(String::from).collect();
    if tokens.is_empty() {
        return Err(FabError::Config("FC must name a compiler".into()));
    }
    let name = tokens.remove(0);

    if let Ok(fflags) = env::var("FFLAGS") {
        tokens.extend(fflags.split_whitespace().map(String::from));
    }

    let family = CompilerFamily::of(&name);
    let common_flags = strip_managed_flags(tokens, family);

    let version = get_compiler_version(&name).unwrap_or_else(|_| "unknown".to_string());

    Ok((CompilerIdentity { name, version }, common_flags))
}

/// Runs `<name> --version` and returns its trimmed first line of output.
pub fn get_compiler_version(name: &str) -> Result<String> {
    let output = Command::new(name).arg("--version").output().map_err(|_| FabError::ToolNotFound(name.to_string()))?;
    let text = String::from_utf8_lossy(&output.stdout);
    Ok(text.lines().next().unwrap_or_default().trim().to_string())
}

/// The generic Fortran preprocessor, resolved from `$FPP` or, failing
/// that, a `fpp`/`cpp` probe.
pub fn get_fortran_preprocessor() -> (String, Vec<String>) {
    if let Ok(fpp) = env::var("FPP") {
        let mut tokens: Vec<String> = fpp.split_whitespace().map(String::from).collect();
        if !tokens.is_empty() {
            let name = tokens.remove(0);
            tokens.push("-P".to_string());
            return (name, tokens);
        }
    }

    if Command::new("fpp").arg("-V").output().is_ok() {
        return ("fpp".to_string(), vec!["-P".to_string()]);
    }

    ("cpp".to_string(), vec!["-traditional-cpp".to_string(), "-P".to_string()])
}

/// Compile-Fortran step: wave-schedules the files named in the
/// `BUILD_TREES` collection, caching each file's `.mod`/`.o` pair in the
/// prebuild store keyed by its combo hash.
pub struct CompileFortran {
    pub compiler: CompilerIdentity,
    pub flags: FlagsConfig,
}

impl CompileFortran {
    pub fn new(compiler: CompilerIdentity, flags: FlagsConfig) -> Self {
        Self { compiler, flags }
    }

    /// Resolves the compiler from `$FC`/`$FFLAGS`, or `compiler_override`
    /// if given (takes precedence over the environment).
    pub fn resolve(compiler_override: Option<&str>) -> Result<Self> {
        let (identity, common_flags) = resolve_compiler(compiler_override)?;
        Ok(Self { compiler: identity, flags: FlagsConfig::new(common_flags, vec![]) })
    }

    /// Hashes the source file plus the compiler's identity: governs the
    /// `.mod` files this source *defines*. Insensitive to flags and to
    /// upstream module interfaces, because the compiler alone determines
    /// a module's public surface given unchanged source.
    pub fn mods_combo_hash(&self, file: &AnalysedFortran) -> u32 {
        combine([file.file_hash(), string_hash(&self.compiler.name), string_hash(&self.compiler.version)])
    }

    /// Hashes everything that affects the object file: the mods combo
    /// hash, this file's resolved flags, and the interface hashes of every
    /// module it depends on.
    pub fn obj_combo_hash(&self, file: &AnalysedFortran, flags: &[String], mod_hashes: &HashMap<String, u32>) -> u32 {
        let flags_hash = string_hash(&flags.join(" "));
        let dep_hashes = file.module_deps().iter().map(|m| mod_hashes.get(m).copied().unwrap_or(0));
        combine(std::iter::once(self.mods_combo_hash(file)).chain(std::iter::once(flags_hash)).chain(dep_hashes))
    }

    /// Compiles `file` if needed, or reuses its prebuilt `.mod`/`.o`.
    /// Returns the compiled-file record plus every prebuild path that is
    /// now current (whether freshly written or found already cached).
    pub fn process_file(&self, file: &AnalysedFortran, mod_hashes: &HashMap<String, u32>, config: &BuildConfig) -> Result<(CompiledFile, Vec<PathBuf>)> {
        let flags = self.flags.flags_for_path(&file.fpath, config);
        let mods_combo_hash = self.mods_combo_hash(file);
        let obj_combo_hash = self.obj_combo_hash(file, &flags, mod_hashes);

        let stem = file.fpath.file_stem().map(|s| s.to_string_lossy().to_string()).unwrap_or_default();
        let object_path = prebuild::path_for(&config.prebuild_folder, &stem, obj_combo_hash, "o");

        let mut mod_defs: Vec<&String> = file.module_defs().iter().collect();
        mod_defs.sort();
        let mod_prebuilds: Vec<(String, PathBuf)> =
            mod_defs.into_iter().map(|m| (m.clone(), prebuild::path_for(&config.prebuild_folder, m, mods_combo_hash, "mod"))).collect();

        let all_cached = mod_prebuilds.iter().all(|(_, p)| p.exists()) && object_path.exists();

        if all_cached {
            for (m, prebuilt) in &mod_prebuilds {
                prebuild::restore(prebuilt, &config.build_output.join(format!("{m}.mod")))?;
            }
        } else {
            self.compile_file(file, &flags, &object_path, config)?;
            for (m, prebuilt) in &mod_prebuilds {
                let built_mod = config.build_output.join(format!("{m}.mod"));
                prebuild::stash(&built_mod, prebuilt)?;
            }
        }

        let mut artefacts = vec![object_path.clone()];
        artefacts.extend(mod_prebuilds.into_iter().map(|(_, p)| p));

        Ok((CompiledFile { input_fpath: file.fpath.clone(), output_fpath: object_path }, artefacts))
    }

    fn compile_file(&self, file: &AnalysedFortran, flags: &[String], output_fpath: &Path, config: &BuildConfig) -> Result<()> {
        if let Some(parent) = output_fpath.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::create_dir_all(&config.build_output)?;

        let family = CompilerFamily::of(&self.compiler.name);
        let mut command = Command::new(&self.compiler.name);
        command.args(flags);
        command.args(family.module_dir_flag(&config.build_output));
        command.arg("-c").arg(&file.fpath).arg("-o").arg(output_fpath);

        let output = command.output().map_err(|_| FabError::ToolNotFound(self.compiler.name.clone()))?;
        if !output.status.success() {
            return Err(FabError::CompileFile { path: file.fpath.clone(), stderr: String::from_utf8_lossy(&output.stderr).into_owned() });
        }
        Ok(())
    }

    /// The files in `uncompiled` whose `file_deps` are all already in
    /// `compiled`. Fails with [`FabError::StalledGraph`] if no progress is
    /// possible while files remain: a non-empty `uncompiled` with no file
    /// ready to compile means the graph cannot advance.
    pub fn get_compile_next(compiled: &HashMap<PathBuf, CompiledFile>, uncompiled: &HashSet<AnalysedFortran>) -> Result<HashSet<AnalysedFortran>> {
        let compile_next: HashSet<AnalysedFortran> =
            uncompiled.iter().filter(|f| f.file_deps().iter().all(|d| compiled.contains_key(d))).cloned().collect();

        if compile_next.is_empty() && !uncompiled.is_empty() {
            let unmet: Vec<(PathBuf, Vec<PathBuf>)> = uncompiled
                .iter()
                .map(|f| (f.fpath.clone(), f.file_deps().iter().filter(|d| !compiled.contains_key(*d)).cloned().collect()))
                .collect();
            return Err(FabError::StalledGraph(unmet));
        }

        Ok(compile_next)
    }

    /// Reads `build_output/<module>.mod` for every module any of `files`
    /// defines and hashes it, so the next wave can tell whether an upstream
    /// module's public interface changed.
    pub fn get_mod_hashes(files: &HashSet<AnalysedFortran>, config: &BuildConfig) -> Result<HashMap<String, u32>> {
        let mut hashes = HashMap::new();
        for file in files {
            for m in file.module_defs() {
                let mod_path = config.build_output.join(format!("{m}.mod"));
                if mod_path.exists() {
                    hashes.insert(m.clone(), file_hash(&mod_path)?);
                }
            }
        }
        Ok(hashes)
    }

    /// Compiles one wave: the subset of `uncompiled` whose dependencies
    /// are already satisfied, in parallel via [`run_mp`]. Mutates
    /// `compiled` and `mod_hashes` in place and returns the remaining
    /// uncompiled set plus this wave's prebuild artefacts.
    pub fn compile_pass(
        &self,
        compiled: &mut HashMap<PathBuf, CompiledFile>,
        uncompiled: HashSet<AnalysedFortran>,
        mod_hashes: &mut HashMap<String, u32>,
        config: &BuildConfig,
    ) -> Result<(HashSet<AnalysedFortran>, Vec<PathBuf>)> {
        let compile_next = Self::get_compile_next(compiled, &uncompiled)?;

        let items: Vec<AnalysedFortran> = compile_next.iter().cloned().collect();
        let hashes_snapshot: &HashMap<String, u32> = mod_hashes;
        let results = run_mp(config, items, |file| self.process_file(&file, hashes_snapshot, config));
        check_for_errors(&results, "compile_fortran")?;

        let mut prebuilds = Vec::new();
        for r in results {
            let (compiled_file, artefacts) = r.expect("checked by check_for_errors");
            compiled.insert(compiled_file.input_fpath.clone(), compiled_file);
            prebuilds.extend(artefacts);
        }

        let new_hashes = Self::get_mod_hashes(&compile_next, config)?;
        mod_hashes.extend(new_hashes);

        let remaining: HashSet<AnalysedFortran> = uncompiled.difference(&compile_next).cloned().collect();
        Ok((remaining, prebuilds))
    }

    /// Groups compiled object files by build root, populating
    /// `OBJECT_FILES`.
    pub fn store_artefacts(compiled: &HashMap<PathBuf, CompiledFile>, build_lists: &HashMap<String, Vec<PathBuf>>, store: &mut ArtefactStore) {
        let mut object_files: HashMap<String, HashSet<PathBuf>> = HashMap::new();
        for (root, paths) in build_lists {
            let objects: HashSet<PathBuf> =
                paths.iter().filter_map(|p| compiled.get(p)).map(|cf| cf.output_fpath.clone()).collect();
            object_files.insert(root.clone(), objects);
        }
        store.insert(crate::artefact_store::OBJECT_FILES, Collection::ObjectFiles(object_files));
    }
}

impl Step for CompileFortran {
    fn name(&self) -> &str {
        "compile fortran"
    }

    fn run(&self, store: &mut ArtefactStore, config: &BuildConfig) -> Result<()> {
        let build_trees = match store.get(BUILD_TREES) {
            Some(Collection::BuildTrees(trees)) => trees.clone(),
            _ => return Err(FabError::msg("compile fortran: no BUILD_TREES in artefact store")),
        };

        let mut universe: HashMap<PathBuf, AnalysedFortran> = HashMap::new();
        for tree in build_trees.values() {
            for (path, af) in tree {
                universe.entry(path.clone()).or_insert_with(|| af.clone());
            }
        }

        let mut uncompiled: HashSet<AnalysedFortran> = universe.values().cloned().collect();
        let mut compiled: HashMap<PathBuf, CompiledFile> = HashMap::new();
        let mut mod_hashes: HashMap<String, u32> = HashMap::new();
        let mut all_prebuilds: Vec<PathBuf> = Vec::new();

        while !uncompiled.is_empty() {
            let (remaining, prebuilds) = self.compile_pass(&mut compiled, uncompiled, &mut mod_hashes, config)?;
            uncompiled = remaining;
            all_prebuilds.extend(prebuilds);
        }

        store.add_current_prebuilds(all_prebuilds);

        let build_lists: HashMap<String, Vec<PathBuf>> = build_trees
            .iter()
            .map(|(root, tree)| (root.clone().unwrap_or_else(|| "root".to_string()), tree.keys().cloned().collect()))
            .collect();
        Self::store_artefacts(&compiled, &build_lists, store);

        Ok(())
    }
}
