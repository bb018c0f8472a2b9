//! Preflight checks for host tools.
//!
//! Language-package handlers and the packaging step refuse to run when the
//! tool they drive is absent, instead of failing with a cryptic launch error
//! halfway through a run.
//!
//! # Example
//!
//! ```rust,ignore
//! use packman::preflight::{require_tool, check_required_tools};
//!
//! let fpm = require_tool(&runner, "fpm", "ruby gem 'fpm'")?;
//! check_required_tools(&runner, &[("wget", "wget"), ("apt-get", "apt")])?;
//! ```

use std::path::PathBuf;

use crate::error::{Error, Result};
use crate::process::Runner;

/// Tools needed by the packaging step, as (command, package) pairs.
pub const PACKAGING_TOOLS: &[(&str, &str)] = &[("fpm", "ruby gem 'fpm'"), ("gzip", "gzip")];

/// Locate `tool` or fail with [`Error::PrerequisiteMissing`].
pub fn require_tool(runner: &dyn Runner, tool: &str, package: &str) -> Result<PathBuf> {
    match runner.locate(tool) {
        Some(path) => {
            tracing::debug!("found {} at {}", tool, path.display());
            Ok(path)
        }
        None => {
            tracing::error!("{} is not installed. terminating", tool);
            Err(Error::PrerequisiteMissing {
                tool: tool.to_string(),
                package: package.to_string(),
            })
        }
    }
}

/// Check that all of `tools` are present; reports the first missing one.
pub fn check_required_tools(runner: &dyn Runner, tools: &[(&str, &str)]) -> Result<()> {
    let missing: Vec<_> = tools
        .iter()
        .filter(|(tool, _)| runner.locate(tool).is_none())
        .collect();

    if let Some((tool, package)) = missing.first() {
        for (tool, package) in &missing {
            tracing::error!("missing required host tool: {} (install: {})", tool, package);
        }
        return Err(Error::PrerequisiteMissing {
            tool: tool.to_string(),
            package: package.to_string(),
        });
    }

    Ok(())
}
