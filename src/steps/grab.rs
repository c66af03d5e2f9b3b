//! Grab/VCS steps — folder copy, FCM export, Git checkout.
//!
//! `rsync`/`fcm`/`git` invocation internals aren't implemented here: these
//! types exist only to fix the step shape (fields, validation, where they
//! write) so a real implementation can be slotted in via the injected
//! [`GrabSource`].

use crate::artefact_store::ArtefactStore;
use crate::config::BuildConfig;
use crate::error::{FabError, Result};
use crate::pipeline::Step;
use std::fs;
use std::path::Path;

/// Contract for fetching source into a destination folder under
/// `config.source_root`. No VCS tool invocation is implemented here.
pub trait GrabSource: Send + Sync {
    fn fetch(&self, destination: &Path) -> Result<()>;
}

/// Plain recursive copy from a local or rsync-addressable folder.
pub struct GrabFolder {
    pub src: String,
    pub dst: String,
    grabber: Box<dyn GrabSource>,
}

impl GrabFolder {
    pub fn new(src: impl Into<String>, dst: impl Into<String>, grabber: Box<dyn GrabSource>) -> Self {
        Self { src: src.into(), dst: dst.into(), grabber }
    }
}

impl Step for GrabFolder {
    fn name(&self) -> &str {
        "grab folder"
    }

    fn run(&self, _store: &mut ArtefactStore, config: &BuildConfig) -> Result<()> {
        let destination = config.source_root.join(&self.dst);
        fs::create_dir_all(&destination)?;
        self.grabber.fetch(&destination)
    }
}

/// Export from an FCM/Subversion repository, optionally pinned to a revision.
pub struct FcmExport {
    pub src: String,
    pub dst: String,
    pub revision: Option<String>,
    grabber: Box<dyn GrabSource>,
}

impl FcmExport {
    pub fn new(src: impl Into<String>, dst: impl Into<String>, revision: Option<String>, grabber: Box<dyn GrabSource>) -> Self {
        Self { src: src.into(), dst: dst.into(), revision, grabber }
    }
}

impl Step for FcmExport {
    fn name(&self) -> &str {
        "grab fcm"
    }

    fn run(&self, _store: &mut ArtefactStore, config: &BuildConfig) -> Result<()> {
        let destination = config.source_root.join(&self.dst);
        fs::create_dir_all(&destination)?;
        self.grabber.fetch(&destination)
    }
}

/// Checkout from a Git repository at a mandatory revision.
pub struct GrabGit {
    pub src: String,
    pub dst: String,
    pub revision: String,
    grabber: Box<dyn GrabSource>,
}

impl GrabGit {
    /// Fails if `dst` or `revision` is empty — a git grab with no pinned
    /// revision or no destination folder is a configuration error, not
    /// something to default silently.
    pub fn new(src: impl Into<String>, dst: impl Into<String>, revision: impl Into<String>, grabber: Box<dyn GrabSource>) -> Result<Self> {
        let dst = dst.into();
        let revision = revision.into();
        if dst.is_empty() {
            return Err(FabError::Config("GrabGit requires a destination folder".into()));
        }
        if revision.is_empty() {
            return Err(FabError::Config("GrabGit requires a pinned revision".into()));
        }
        Ok(Self { src: src.into(), dst, revision, grabber })
    }
}

impl Step for GrabGit {
    fn name(&self) -> &str {
        "grab git"
    }

    fn run(&self, _store: &mut ArtefactStore, config: &BuildConfig) -> Result<()> {
        let destination = config.source_root.join(&self.dst);
        fs::create_dir_all(&destination)?;
        self.grabber.fetch(&destination)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct FakeGrabSource {
        calls: Arc<AtomicUsize>,
    }

    impl GrabSource for FakeGrabSource {
        fn fetch(&self, _destination: &Path) -> Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn config() -> BuildConfig {
        let tmp = tempfile::tempdir().unwrap();
        BuildConfig::builder("proj").fab_workspace(tmp.into_path()).build().unwrap()
    }

    #[test]
    fn grab_folder_creates_destination_under_source_root_and_delegates() {
        let config = config();
        let calls = Arc::new(AtomicUsize::new(0));
        let step = GrabFolder::new("/grab/source/", "bar", Box::new(FakeGrabSource { calls: calls.clone() }));

        let mut store = ArtefactStore::new();
        step.run(&mut store, &config).unwrap();

        assert!(config.source_root.join("bar").exists());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn grab_git_rejects_missing_revision() {
        let calls = Arc::new(AtomicUsize::new(0));
        let err = GrabGit::new("foo", "foo", "", Box::new(FakeGrabSource { calls })).unwrap_err();
        assert!(matches!(err, FabError::Config(_)));
    }

    #[test]
    fn grab_git_rejects_missing_destination() {
        let calls = Arc::new(AtomicUsize::new(0));
        let err = GrabGit::new("foo", "", "rev1", Box::new(FakeGrabSource { calls })).unwrap_err();
        assert!(matches!(err, FabError::Config(_)));
    }
}
