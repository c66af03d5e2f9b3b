//! Typed, named artefact collections shared between steps.
//!
//! The store is process-local: it lives only in the main process. Workers
//! spawned by [`crate::executor::run_mp`] receive read-only copies of
//! whatever they need; mutations inside a worker are local and discarded.

use crate::analysis::fortran::AnalysedFortran;
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;

/// Well-known collection names.
pub const ALL_SOURCE: &str = "all_source";
pub const PREPROCESSED_X90: &str = "preprocessed_x90";
pub const PSYCLONE_OUTPUT: &str = "psyclone_output";
pub const BUILD_TREES: &str = "BUILD_TREES";
pub const OBJECT_FILES: &str = "OBJECT_FILES";
pub const CURRENT_PREBUILDS: &str = "CURRENT_PREBUILDS";

/// One named collection's value. Collections are heterogeneous across the
/// store (a set of paths, a list of paths, or nested mappings), so steps
/// that know what they're looking for match on the variant they expect.
#[derive(Clone, Debug, Default)]
pub enum Collection {
    #[default]
    Empty,
    PathSet(HashSet<PathBuf>),
    PathList(Vec<PathBuf>),
    /// root label -> (file path -> analysis).
    BuildTrees(HashMap<Option<String>, HashMap<PathBuf, AnalysedFortran>>),
    /// root label -> object file paths.
    ObjectFiles(HashMap<String, HashSet<PathBuf>>),
}

/// Process-local mapping from collection name to collection value.
#[derive(Clone, Debug, Default)]
pub struct ArtefactStore {
    collections: HashMap<String, Collection>,
}

impl ArtefactStore {
    /// A fresh store with an empty `CURRENT_PREBUILDS` set, as created at
    /// the start of every [`crate::pipeline::run`].
    pub fn new() -> Self {
        let mut collections = HashMap::new();
        collections.insert(CURRENT_PREBUILDS.to_string(), Collection::PathSet(HashSet::new()));
        Self { collections }
    }

    pub fn get(&self, name: &str) -> Option<&Collection> {
        self.collections.get(name)
    }

    pub fn insert(&mut self, name: impl Into<String>, value: Collection) {
        self.collections.insert(name.into(), value);
    }

    /// Registers `paths` as current prebuilds, so housekeeping retains
    /// them.
    pub fn add_current_prebuilds(&mut self, paths: impl IntoIterator<Item = PathBuf>) {
        match self.collections.entry(CURRENT_PREBUILDS.to_string()).or_insert_with(|| Collection::PathSet(HashSet::new())) {
            Collection::PathSet(set) => set.extend(paths),
            other => *other = Collection::PathSet(paths.into_iter().collect()),
        }
    }

    pub fn current_prebuilds(&self) -> HashSet<PathBuf> {
        match self.collections.get(CURRENT_PREBUILDS) {
            Some(Collection::PathSet(set)) => set.clone(),
            _ => HashSet::new(),
        }
    }

    /// Returns the members of `name` as a flat vec of paths, regardless of
    /// whether it was stored as a set or a list. Used by accessor
    /// combinators below.
    fn members(&self, name: &str) -> Vec<PathBuf> {
        match self.collections.get(name) {
            Some(Collection::PathSet(set)) => set.iter().cloned().collect(),
            Some(Collection::PathList(list)) => list.clone(),
            _ => Vec::new(),
        }
    }
}

/// A pure function of the store, selecting some subset of paths from its
/// collections. Steps use these to describe *where their input comes from*
/// declaratively, rather than reaching into the store by name directly.
pub trait ArtefactsGetter: Send + Sync {
    fn get(&self, store: &ArtefactStore) -> HashSet<PathBuf>;
}

/// Identity accessor: the raw members of one named collection.
pub struct CollectionGetter(pub String);

impl CollectionGetter {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }
}

impl ArtefactsGetter for CollectionGetter {
    fn get(&self, store: &ArtefactStore) -> HashSet<PathBuf> {
        store.members(&self.0).into_iter().collect()
    }
}

/// Members of `collection` whose path ends with `suffix`.
pub struct SuffixFilter {
    pub collection: String,
    pub suffix: String,
}

impl SuffixFilter {
    pub fn new(collection: impl Into<String>, suffix: impl Into<String>) -> Self {
        Self { collection: collection.into(), suffix: suffix.into() }
    }
}

impl ArtefactsGetter for SuffixFilter {
    fn get(&self, store: &ArtefactStore) -> HashSet<PathBuf> {
        store
            .members(&self.collection)
            .into_iter()
            .filter(|p| p.to_string_lossy().ends_with(self.suffix.as_str()))
            .collect()
    }
}

/// Union of several accessors' results. Each item is either a collection
/// name (looked up via [`CollectionGetter`]) or another boxed accessor.
pub struct CollectionConcat(pub Vec<Box<dyn ArtefactsGetter>>);

impl CollectionConcat {
    pub fn of_names(names: impl IntoIterator<Item = &'static str>) -> Self {
        Self(names.into_iter().map(|n| Box::new(CollectionGetter::new(n)) as Box<dyn ArtefactsGetter>).collect())
    }
}

impl ArtefactsGetter for CollectionConcat {
    fn get(&self, store: &ArtefactStore) -> HashSet<PathBuf> {
        let mut out = HashSet::new();
        for getter in &self.0 {
            out.extend(getter.get(store));
        }
        out
    }
}
