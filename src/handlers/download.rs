//! Raw URL downloads via wget.

use std::path::Path;
use std::sync::Arc;

use crate::context::PackContext;
use crate::error::{Error, Result};
use crate::log::LogContext;
use crate::process::{Cmd, ExecutionResult, Runner};

const TIMEOUT: &str = "--timeout=30";

pub struct DownloadHandler {
    runner: Arc<dyn Runner>,
    log: LogContext,
    component: String,
}

impl DownloadHandler {
    pub fn new(ctx: &PackContext, component: &str) -> Self {
        Self {
            runner: ctx.runner().clone(),
            log: ctx.log().clone(),
            component: component.to_string(),
        }
    }

    /// Fetch `url` into directory `dir` (file name taken from the URL) or
    /// to exactly `file`. Exactly one of the two must be given.
    pub fn fetch(
        &self,
        url: &str,
        dir: Option<&Path>,
        file: Option<&Path>,
    ) -> Result<ExecutionResult> {
        let _span = self.log.enter();
        let cmd = match (dir, file) {
            (Some(dir), None) => {
                tracing::debug!("downloading {} to {}", url, dir.display());
                Cmd::new("wget").args([url, TIMEOUT, "-P"]).arg_path(dir)
            }
            (None, Some(file)) => {
                tracing::debug!("downloading {} to {}", url, file.display());
                Cmd::new("wget").args([url, TIMEOUT, "-O"]).arg_path(file)
            }
            _ => {
                tracing::error!("please specify either a directory or file to download to");
                return Err(Error::invalid(
                    &self.component,
                    format!("download of '{url}' needs exactly one of a target directory or file"),
                ));
            }
        };
        self.runner
            .execute(&cmd.error_msg(&format!("failed downloading {url}")))
    }
}
