//! Build steps implementing [`crate::pipeline::Step`] beyond the compile
//! scheduler (which lives at the crate root as `compile.rs`, per its
//! weight as the core of the core).

pub mod grab;
pub mod preprocess;
pub mod psyclone;

pub use grab::{FcmExport, GrabFolder, GrabGit, GrabSource};
pub use preprocess::{PreProcessorStep, Preprocessor};
pub use psyclone::{make_parsable_x90, Psyclone};
