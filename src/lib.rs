//! Parallel, incremental build driver for scientific Fortran codebases.
//!
//! Source files are analysed into a dependency graph, compiled in
//! topological waves via a [`rayon`] worker pool, and every reusable
//! artefact — compiled objects, module interfaces, PSyclone-generated
//! code — is cached in a content-addressed prebuild store so that
//! unaffected parts of a large build are never redone.
//!
//! The pipeline itself ([`pipeline::run`]) is agnostic to what steps it
//! runs: a consumer assembles a [`Vec<Box<dyn pipeline::Step>>`] from the
//! steps in this crate (grab, preprocess, psyclone, analyse, compile) and
//! whatever custom steps their build needs.

#[macro_use]
extern crate tracing;

pub mod analysis;
pub mod artefact_store;
pub mod compile;
pub mod config;
pub mod error;
pub mod executor;
pub mod flags;
pub mod hash;
pub mod housekeeping;
pub mod metrics;
pub mod pipeline;
pub mod prebuild;
pub mod steps;
pub mod util;

pub use compile::{CompileFortran, CompiledFile, CompilerIdentity};
pub use config::BuildConfig;
pub use error::{FabError, Result};
pub use pipeline::{CleanupPrebuilds, Step};
