//! `AnalysedFortran`: the external contract a Fortran source analyser
//! produces.
//!
//! The Fortran source parser itself isn't implemented here: this module
//! only fixes the shape of its output so the compile scheduler and the
//! psyclone step have something concrete to depend on.

use std::collections::{HashMap, HashSet};
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};

/// One analysed Fortran source file. Built up by an external analyser via
/// the `add_*` methods, then treated as immutable once handed to the rest
/// of the pipeline.
#[derive(Clone, Debug)]
pub struct AnalysedFortran {
    pub fpath: PathBuf,
    file_hash: u32,
    file_deps: HashSet<PathBuf>,
    module_defs: HashSet<String>,
    module_deps: HashSet<String>,
    psyclone_kernels: HashMap<String, u32>,
}

impl AnalysedFortran {
    pub fn new(fpath: impl Into<PathBuf>, file_hash: u32) -> Self {
        Self {
            fpath: fpath.into(),
            file_hash,
            file_deps: HashSet::new(),
            module_defs: HashSet::new(),
            module_deps: HashSet::new(),
            psyclone_kernels: HashMap::new(),
        }
    }

    pub fn with_file_deps(mut self, deps: impl IntoIterator<Item = PathBuf>) -> Self {
        self.file_deps.extend(deps);
        self
    }

    pub fn add_file_dep(&mut self, dep: impl Into<PathBuf>) -> &mut Self {
        self.file_deps.insert(dep.into());
        self
    }

    pub fn add_module_def(&mut self, name: impl Into<String>) -> &mut Self {
        self.module_defs.insert(name.into());
        self
    }

    pub fn add_module_dep(&mut self, name: impl Into<String>) -> &mut Self {
        self.module_deps.insert(name.into());
        self
    }

    pub fn add_kernel(&mut self, name: impl Into<String>, metadata_hash: u32) -> &mut Self {
        self.psyclone_kernels.insert(name.into(), metadata_hash);
        self
    }

    pub fn file_hash(&self) -> u32 {
        self.file_hash
    }

    pub fn file_deps(&self) -> &HashSet<PathBuf> {
        &self.file_deps
    }

    pub fn module_defs(&self) -> &HashSet<String> {
        &self.module_defs
    }

    pub fn module_deps(&self) -> &HashSet<String> {
        &self.module_deps
    }

    pub fn psyclone_kernels(&self) -> &HashMap<String, u32> {
        &self.psyclone_kernels
    }
}

impl PartialEq for AnalysedFortran {
    fn eq(&self, other: &Self) -> bool {
        self.fpath == other.fpath
    }
}
impl Eq for AnalysedFortran {}

impl Hash for AnalysedFortran {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.fpath.hash(state);
    }
}

/// Contract for the external Fortran source analyser: deterministic
/// and pure in the file's content, returning the analysis plus the path of
/// whatever prebuild artefact it wrote for itself.
pub trait FortranAnalyser: Send + Sync {
    fn analyse(&self, path: &Path) -> crate::error::Result<(AnalysedFortran, PathBuf)>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equality_is_by_path_only() {
        let mut a = AnalysedFortran::new("a.f90", 1);
        a.add_module_def("mod_a");
        let b = AnalysedFortran::new("a.f90", 2);
        assert_eq!(a, b);
    }

    #[test]
    fn builders_accumulate() {
        let mut f = AnalysedFortran::new("foofile", 34567);
        f.add_module_dep("mod_dep_1").add_module_dep("mod_dep_2").add_module_def("mod_def_1").add_module_def("mod_def_2");

        assert_eq!(f.module_deps().len(), 2);
        assert_eq!(f.module_defs().len(), 2);
        assert_eq!(f.file_hash(), 34567);
    }
}
