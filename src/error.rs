//! Crate-wide error type.

use std::path::PathBuf;

/// Convenience alias used throughout the crate.
pub type Result<T, E = FabError> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum FabError {
    /// A problem with the run's configuration, surfaced before any step runs.
    #[error("config error: {0}")]
    Config(String),

    /// One or more source files failed analysis.
    #[error("analysis failed for {0} file(s):\n{1}")]
    Analyse(usize, String),

    /// One or more files failed to compile.
    #[error("compilation failed for {0} file(s):\n{1}")]
    Compile(usize, String),

    /// Compiler invocation for a single file.
    #[error("compile error in {path}:\n{stderr}")]
    CompileFile { path: PathBuf, stderr: String },

    #[error("tool not found on PATH: {0}")]
    ToolNotFound(String),

    #[error("tool `{tool}` exited with status {status}:\n{stderr}")]
    ToolFailed { tool: String, status: String, stderr: String },

    /// The compile scheduler could not make progress: some files remain
    /// uncompiled but none of them have all their dependencies satisfied.
    #[error("stalled: unresolvable dependencies for {0:?}")]
    StalledGraph(Vec<(PathBuf, Vec<PathBuf>)>),

    /// Two source files define a psyclone kernel of the same name.
    #[error("duplicate kernel name(s): {0:?}")]
    DuplicateKernel(Vec<String>),

    #[error("a build step failed: {0}")]
    Step(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    WalkDir(#[from] walkdir::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl FabError {
    pub fn msg(msg: impl std::fmt::Display) -> Self {
        FabError::Step(msg.to_string())
    }
}
