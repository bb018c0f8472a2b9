//! apt origin: source repositories, PPAs, keys and cache-only downloads.

use std::cell::Cell;
use std::path::Path;
use std::sync::Arc;

use crate::context::PackContext;
use crate::error::Result;
use crate::log::LogContext;
use crate::process::{Cmd, ExecutionResult, Runner};

const SOURCES_LIST: &str = "/etc/apt/sources.list";

pub struct AptHandler {
    runner: Arc<dyn Runner>,
    log: LogContext,
    refreshed: Cell<bool>,
}

impl AptHandler {
    pub fn new(ctx: &PackContext) -> Self {
        Self {
            runner: ctx.runner().clone(),
            log: ctx.log().clone(),
            refreshed: Cell::new(false),
        }
    }

    /// Insert `<mark> <url>` near the top of the apt sources list.
    pub fn add_source_repo(&self, url: &str, mark: &str) -> Result<ExecutionResult> {
        let _span = self.log.enter();
        tracing::debug!("adding source repository {} mark {}", url, mark);
        self.runner.execute(
            &Cmd::new("sed")
                .arg("-i")
                .arg(format!("2i {} {}", mark, url))
                .arg(SOURCES_LIST)
                .error_msg("adding source repository failed"),
        )
    }

    pub fn add_ppa(&self, ppa: &str) -> Result<ExecutionResult> {
        let _span = self.log.enter();
        tracing::debug!("adding ppa repository {}", ppa);
        self.runner.execute(
            &Cmd::new("add-apt-repository")
                .args(["-y", ppa])
                .error_msg("adding ppa failed"),
        )
    }

    /// Trust a signing key stored in a local file.
    pub fn add_key(&self, key_file: &Path) -> Result<ExecutionResult> {
        let _span = self.log.enter();
        tracing::debug!("adding key {}", key_file.display());
        self.runner.execute(
            &Cmd::new("apt-key")
                .arg("add")
                .arg_path(key_file)
                .error_msg("adding apt key failed"),
        )
    }

    /// Refresh repository metadata.
    pub fn update(&self) -> Result<ExecutionResult> {
        let _span = self.log.enter();
        tracing::debug!("updating local apt repo");
        let result = self
            .runner
            .execute(&Cmd::new("apt-get").arg("update").error_msg("apt-get update failed"))?;
        if result.success {
            self.refreshed.set(true);
        }
        Ok(result)
    }

    /// Download `pkg` (and its dependencies) into `dir` without installing it.
    ///
    /// Refreshes the repository metadata first if this handler has not yet.
    pub fn download(&self, pkg: &str, dir: &Path) -> Result<ExecutionResult> {
        self.ensure_refreshed()?;
        let _span = self.log.enter();
        tracing::debug!("downloading {} to {}", pkg, dir.display());
        self.runner.execute(
            &Cmd::new("apt-get")
                .args(["-y", "install", pkg, "-d"])
                .arg(format!("-o=dir::cache={}", dir.display()))
                .error_msg("apt download failed"),
        )
    }

    /// Download each requirement; one result per requirement, in order.
    pub fn download_requirements(
        &self,
        reqs: &[String],
        dir: &Path,
    ) -> Result<Vec<ExecutionResult>> {
        reqs.iter().map(|req| self.download(req, dir)).collect()
    }

    pub fn install(&self, packages: &[String]) -> Result<Vec<ExecutionResult>> {
        let _span = self.log.enter();
        packages
            .iter()
            .map(|package| {
                tracing::debug!("installing {}", package);
                self.runner
                    .execute(&Cmd::new("apt-get").args(["-y", "install", package.as_str()]))
            })
            .collect()
    }

    /// Completely purge `package` from the system.
    pub fn purge(&self, package: &str) -> Result<ExecutionResult> {
        let _span = self.log.enter();
        tracing::debug!("attempting to purge {}", package);
        self.runner
            .execute(&Cmd::new("apt-get").args(["-y", "purge", package]))
    }

    pub fn autoremove(&self, package: &str) -> Result<ExecutionResult> {
        let _span = self.log.enter();
        tracing::debug!("removing unnecessary dependencies of {}", package);
        self.runner
            .execute(&Cmd::new("apt-get").args(["-y", "autoremove", package]))
    }

    pub fn is_installed(&self, package: &str) -> Result<bool> {
        let _span = self.log.enter();
        tracing::debug!("checking if {} is installed", package);
        let result = self
            .runner
            .execute(&Cmd::new("dpkg").args(["-s", package]).retries(1).capture())?;
        if result.success {
            tracing::debug!("{} is installed", package);
        } else {
            tracing::debug!("{} is not installed", package);
        }
        Ok(result.success)
    }

    /// Rename every .deb in `dir` to the conventional `name_version_arch.deb`.
    pub fn rename_debs(&self, dir: &Path) -> Result<ExecutionResult> {
        let _span = self.log.enter();
        tracing::debug!("renaming deb files in {}", dir.display());
        let debs: Vec<String> = glob::glob(&format!("{}/*.deb", dir.display()))?
            .filter_map(|entry| entry.ok())
            .map(|path| path.display().to_string())
            .collect();
        self.runner.execute(&Cmd::new("dpkg-name").args(debs))
    }

    fn ensure_refreshed(&self) -> Result<()> {
        if !self.refreshed.get() {
            self.update()?;
        }
        Ok(())
    }
}
