//! Ruby gem origin.

use std::path::Path;
use std::sync::Arc;

use crate::context::PackContext;
use crate::error::Result;
use crate::log::LogContext;
use crate::preflight::require_tool;
use crate::process::{Cmd, ExecutionResult, Runner};

pub struct RubyHandler {
    runner: Arc<dyn Runner>,
    log: LogContext,
}

impl RubyHandler {
    pub fn new(ctx: &PackContext) -> Self {
        Self {
            runner: ctx.runner().clone(),
            log: ctx.log().clone(),
        }
    }

    /// Install `gem` and its dependencies under `dir`.
    pub fn download_gem(&self, gem: &str, dir: &Path) -> Result<ExecutionResult> {
        require_tool(self.runner.as_ref(), "gem", "ruby")?;
        let _span = self.log.enter();
        tracing::debug!("downloading gem {} to {}", gem, dir.display());
        self.runner.execute(
            &Cmd::new("gem")
                .args(["install", "--no-document", "--install-dir"])
                .arg_path(dir)
                .arg(gem)
                .error_msg(&format!("downloading ruby gem {gem} failed")),
        )
    }
}
