//! Run context shared by handlers and orchestrators.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::log::LogContext;
use crate::process::Runner;

/// Everything a `get`/`pack` run needs besides the component itself.
#[derive(Clone)]
pub struct PackContext {
    runner: Arc<dyn Runner>,
    /// Directory relative script and template paths resolve against.
    base_dir: PathBuf,
    /// Lookup directory for bare template file names.
    templates_dir: PathBuf,
    log: LogContext,
}

impl PackContext {
    pub fn new(
        runner: Arc<dyn Runner>,
        base_dir: PathBuf,
        templates_dir: PathBuf,
        log: LogContext,
    ) -> Self {
        let templates_dir = base_dir.join(templates_dir);
        Self {
            runner,
            base_dir,
            templates_dir,
            log,
        }
    }

    /// Same context, logging scoped to `component`.
    pub fn for_component(&self, component: &str) -> Self {
        Self {
            log: self.log.for_component(component),
            ..self.clone()
        }
    }

    pub fn runner(&self) -> &Arc<dyn Runner> {
        &self.runner
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    pub fn templates_dir(&self) -> &Path {
        &self.templates_dir
    }

    pub fn log(&self) -> &LogContext {
        &self.log
    }
}
