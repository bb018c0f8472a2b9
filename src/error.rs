//! Error types for packman.
//!
//! Only conditions that must stop a run are errors. A failed external
//! command is reported through [`crate::process::ExecutionResult`] instead.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Fatal conditions raised by the pipeline.
#[derive(Debug, Error)]
pub enum Error {
    #[error("package configuration for '{0}' was not found")]
    UnknownComponent(String),

    #[error("component '{component}' is missing required field '{field}'")]
    MissingField {
        component: String,
        field: &'static str,
    },

    #[error("component '{component}': {message}")]
    InvalidConfig { component: String, message: String },

    #[error("failed to parse '{}': {message}", path.display())]
    Parse { path: PathBuf, message: String },

    #[error("invalid glob pattern: {0}")]
    Pattern(#[from] glob::PatternError),

    #[error("required tool '{tool}' is not installed (install: {package})")]
    PrerequisiteMissing { tool: String, package: String },

    #[error("template directory '{}' does not exist", .0.display())]
    TemplateDirMissing(PathBuf),

    #[error("template file '{file}' does not exist in '{}'", dir.display())]
    TemplateFileMissing { dir: PathBuf, file: String },

    #[error("failed to render template '{template}': {source}")]
    Render {
        template: String,
        #[source]
        source: minijinja::Error,
    },

    #[error("sources directory '{}' does not exist", .0.display())]
    SourcesMissing(PathBuf),

    #[error("packaging failed: {command} (exit code {exit_code:?}): {output}")]
    PackagingFailed {
        command: String,
        exit_code: Option<i32>,
        output: String,
    },

    #[error("failed to launch '{command}': {source}")]
    Launch {
        command: String,
        #[source]
        source: io::Error,
    },

    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: io::Error,
    },
}

/// Coarse classification of [`Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Configuration,
    Prerequisite,
    Template,
    Packaging,
    Process,
    Filesystem,
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::UnknownComponent(_)
            | Error::MissingField { .. }
            | Error::InvalidConfig { .. }
            | Error::Parse { .. }
            | Error::Pattern(_) => ErrorKind::Configuration,
            Error::PrerequisiteMissing { .. } => ErrorKind::Prerequisite,
            Error::TemplateDirMissing(_)
            | Error::TemplateFileMissing { .. }
            | Error::Render { .. } => ErrorKind::Template,
            Error::SourcesMissing(_) | Error::PackagingFailed { .. } => ErrorKind::Packaging,
            Error::Launch { .. } => ErrorKind::Process,
            Error::Io { .. } => ErrorKind::Filesystem,
        }
    }

    pub(crate) fn invalid(component: &str, message: impl Into<String>) -> Self {
        Error::InvalidConfig {
            component: component.to_string(),
            message: message.into(),
        }
    }
}

/// Attach a description to an [`io::Result`], like `anyhow::Context`.
pub trait IoResultExt<T> {
    fn fs_context<F, S>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> S,
        S: Into<String>;
}

impl<T> IoResultExt<T> for io::Result<T> {
    fn fs_context<F, S>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> S,
        S: Into<String>,
    {
        self.map_err(|source| Error::Io {
            context: f().into(),
            source,
        })
    }
}
