//! Contract types for the external source analysers.
//!
//! Fortran source analysis itself — parsing `use`/`module`/`invoke`
//! statements, recognising psyclone kernel metadata blocks — is someone
//! else's job: these types only fix the shape of its output.

pub mod fortran;
pub mod x90;

pub use fortran::{AnalysedFortran, FortranAnalyser};
pub use x90::{AnalysedX90, X90Analyser};
