//! Handlers for the filesystem and for each acquisition origin.
//!
//! Origin handlers acquire one artifact from one origin type into a
//! destination directory. They run their tools through the context's
//! [`Runner`](crate::process::Runner) and report command failures as
//! non-success [`ExecutionResult`](crate::process::ExecutionResult)s;
//! only configuration mistakes and missing prerequisites are errors.

pub mod apt;
pub mod download;
pub mod filesystem;
pub mod python;
pub mod ruby;

pub use apt::AptHandler;
pub use download::DownloadHandler;
pub use filesystem::{FilesystemHandler, PathState};
pub use python::PythonHandler;
pub use ruby::RubyHandler;
