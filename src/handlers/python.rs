//! Python package origin: pip downloads and installs, optionally inside a
//! virtualenv.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::context::PackContext;
use crate::error::Result;
use crate::log::LogContext;
use crate::preflight::require_tool;
use crate::process::{Cmd, ExecutionResult, Runner};

pub struct PythonHandler {
    runner: Arc<dyn Runner>,
    log: LogContext,
}

impl PythonHandler {
    pub fn new(ctx: &PackContext) -> Self {
        Self {
            runner: ctx.runner().clone(),
            log: ctx.log().clone(),
        }
    }

    /// Download `module` as a source distribution into `dir`.
    pub fn download_module(
        &self,
        module: &str,
        dir: &Path,
        venv: Option<&Path>,
    ) -> Result<ExecutionResult> {
        let pip = self.pip(venv)?;
        let _span = self.log.enter();
        tracing::debug!("downloading module {} to {}", module, dir.display());
        self.runner.execute(
            &Cmd::new(pip)
                .args(["download", "--no-binary=:all:", "-d"])
                .arg_path(dir)
                .arg(module)
                .error_msg(&format!("downloading python module {module} failed")),
        )
    }

    pub fn install_module(&self, module: &str, venv: Option<&Path>) -> Result<ExecutionResult> {
        let pip = self.pip(venv)?;
        let _span = self.log.enter();
        tracing::debug!("installing module {}", module);
        self.runner.execute(
            &Cmd::new(pip)
                .args(["--default-timeout=45", "install", module])
                .error_msg(&format!("installing python module {module} failed")),
        )
    }

    /// Whether `pip freeze` lists `name`.
    pub fn is_module_installed(&self, name: &str, venv: Option<&Path>) -> Result<bool> {
        let pip = self.pip(venv)?;
        let _span = self.log.enter();
        tracing::debug!("checking whether {} is installed", name);
        let result = self
            .runner
            .execute(&Cmd::new(pip).arg("freeze").unprivileged().capture())?;

        let wanted = normalize(name);
        let installed = result.success
            && result.stdout_str().lines().any(|line| {
                let listed = line.split(['=', ' ', '@']).next().unwrap_or("");
                normalize(listed) == wanted
            });
        if installed {
            tracing::debug!("module {} is installed", name);
        } else {
            tracing::debug!("module {} is not installed", name);
        }
        Ok(installed)
    }

    /// Create an isolated environment at `dir`. Requires `virtualenv`.
    pub fn create_venv(&self, dir: &Path) -> Result<ExecutionResult> {
        require_tool(self.runner.as_ref(), "virtualenv", "virtualenv")?;
        let _span = self.log.enter();
        tracing::debug!("creating virtualenv in {}", dir.display());
        self.runner.execute(
            &Cmd::new("virtualenv")
                .arg_path(dir)
                .unprivileged()
                .error_msg("creating virtualenv failed"),
        )
    }

    /// The pip to use: the venv's own, or the system one.
    fn pip(&self, venv: Option<&Path>) -> Result<String> {
        match venv {
            Some(venv) => {
                let pip: PathBuf = venv.join("bin/pip");
                let pip = pip.display().to_string();
                require_tool(self.runner.as_ref(), &pip, "virtualenv pip")?;
                Ok(pip)
            }
            None => {
                require_tool(self.runner.as_ref(), "pip", "python-pip")?;
                Ok("pip".to_string())
            }
        }
    }
}

fn normalize(name: &str) -> String {
    name.trim().to_ascii_lowercase().replace('_', "-")
}
