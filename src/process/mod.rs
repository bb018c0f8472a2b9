//! External command execution with bounded retries.
//!
//! Every external tool packman drives (apt, wget, pip, gem, fpm, ...) goes
//! through a [`Runner`]. A non-zero exit is never an error: it comes back as
//! an [`ExecutionResult`] with `success == false` after the retry budget is
//! spent, and the calling step decides whether that aborts the run. Only a
//! process that cannot be launched at all is an [`Error::Launch`].
//!
//! # Example
//!
//! ```rust,ignore
//! use packman::process::{Cmd, Runner};
//!
//! let result = runner.execute(
//!     &Cmd::new("apt-get").args(["-y", "install", "curl"]).error_msg("apt-get install failed"),
//! )?;
//! if !result.success {
//!     // logged already; keep going
//! }
//! ```

#[cfg(test)]
pub(crate) mod testing;

use serde::Deserialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::thread;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::log::LogContext;

/// A single external command, built up fluently.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cmd {
    program: String,
    args: Vec<String>,
    dir: Option<PathBuf>,
    elevated: bool,
    capture: bool,
    retries: Option<u32>,
    retry_delay: Option<Duration>,
    error_msg: Option<String>,
}

impl Cmd {
    /// New elevated, non-capturing command.
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            dir: None,
            elevated: true,
            capture: false,
            retries: None,
            retry_delay: None,
            error_msg: None,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn arg_path(self, path: &Path) -> Self {
        self.arg(path.display().to_string())
    }

    /// Working directory for the process.
    pub fn dir(mut self, dir: &Path) -> Self {
        self.dir = Some(dir.to_path_buf());
        self
    }

    /// Run without privilege elevation.
    pub fn unprivileged(mut self) -> Self {
        self.elevated = false;
        self
    }

    /// Capture stdout/stderr instead of inheriting them.
    pub fn capture(mut self) -> Self {
        self.capture = true;
        self
    }

    /// Override the executor's attempt budget for this command.
    pub fn retries(mut self, attempts: u32) -> Self {
        self.retries = Some(attempts);
        self
    }

    /// Override the executor's delay between attempts for this command.
    pub fn retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = Some(delay);
        self
    }

    /// Message logged when the command is still failing after all attempts.
    pub fn error_msg(mut self, msg: &str) -> Self {
        self.error_msg = Some(msg.to_string());
        self
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn get_args(&self) -> &[String] {
        &self.args
    }

    pub fn get_dir(&self) -> Option<&Path> {
        self.dir.as_deref()
    }

    pub fn is_elevated(&self) -> bool {
        self.elevated
    }

    pub fn is_captured(&self) -> bool {
        self.capture
    }
}

impl fmt::Display for Cmd {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            if arg.is_empty() || arg.contains(char::is_whitespace) {
                write!(f, " '{}'", arg)?;
            } else {
                write!(f, " {}", arg)?;
            }
        }
        Ok(())
    }
}

/// Outcome of one command after the executor finished retrying it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionResult {
    pub success: bool,
    pub exit_code: Option<i32>,
    /// Present only for captured commands.
    pub stdout: Option<String>,
    /// Present only for captured commands.
    pub stderr: Option<String>,
    /// Attempts actually made, including the first.
    pub attempts: u32,
}

impl ExecutionResult {
    /// Captured stdout, or an empty string.
    pub fn stdout_str(&self) -> &str {
        self.stdout.as_deref().unwrap_or("")
    }
}

/// Attempt budget and pause between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub retry_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            retry_delay: Duration::from_secs(3),
        }
    }
}

/// How elevated commands get their privileges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Privilege {
    /// Prefix with `sudo` unless already running as root.
    #[default]
    Auto,
    /// Always prefix with `sudo`.
    Sudo,
    /// Never elevate.
    None,
}

impl Privilege {
    fn needs_sudo(self) -> bool {
        match self {
            Privilege::Auto => {
                // SAFETY: geteuid has no preconditions and cannot fail.
                let euid = unsafe { libc::geteuid() };
                euid != 0
            }
            Privilege::Sudo => true,
            Privilege::None => false,
        }
    }
}

/// Anything that can run external commands for the pipeline.
pub trait Runner {
    /// Run `cmd` to completion, retrying on failure.
    ///
    /// Returns `Err` only when the process cannot be launched.
    fn execute(&self, cmd: &Cmd) -> Result<ExecutionResult>;

    /// Resolve a host tool on `PATH`.
    fn locate(&self, tool: &str) -> Option<PathBuf> {
        which::which(tool).ok()
    }
}

/// The real [`Runner`]: spawns processes, sleeps between attempts.
#[derive(Debug, Clone)]
pub struct Executor {
    policy: RetryPolicy,
    privilege: Privilege,
    log: LogContext,
}

impl Executor {
    pub fn new(policy: RetryPolicy, privilege: Privilege, log: LogContext) -> Self {
        Self {
            policy,
            privilege,
            log,
        }
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    fn build(&self, cmd: &Cmd) -> Command {
        let mut command = if cmd.elevated && self.privilege.needs_sudo() {
            let mut sudo = Command::new("sudo");
            sudo.arg(&cmd.program);
            sudo
        } else {
            Command::new(&cmd.program)
        };
        command.args(&cmd.args);
        if let Some(dir) = &cmd.dir {
            command.current_dir(dir);
        }
        command
    }

    fn run_once(&self, cmd: &Cmd) -> Result<ExecutionResult> {
        let mut command = self.build(cmd);
        let launch_err = |source| Error::Launch {
            command: cmd.to_string(),
            source,
        };

        if cmd.capture {
            let output = command
                .stdin(Stdio::null())
                .output()
                .map_err(launch_err)?;
            Ok(ExecutionResult {
                success: output.status.success(),
                exit_code: output.status.code(),
                stdout: Some(String::from_utf8_lossy(&output.stdout).into_owned()),
                stderr: Some(String::from_utf8_lossy(&output.stderr).into_owned()),
                attempts: 1,
            })
        } else {
            let status = command.status().map_err(launch_err)?;
            Ok(ExecutionResult {
                success: status.success(),
                exit_code: status.code(),
                stdout: None,
                stderr: None,
                attempts: 1,
            })
        }
    }
}

impl Runner for Executor {
    fn execute(&self, cmd: &Cmd) -> Result<ExecutionResult> {
        let _span = self.log.enter();
        let max = cmd.retries.unwrap_or(self.policy.max_retries).max(1);
        let delay = cmd.retry_delay.unwrap_or(self.policy.retry_delay);

        tracing::debug!("running command: {}", cmd);
        let mut attempt = 1;
        loop {
            let mut result = self.run_once(cmd)?;
            result.attempts = attempt;
            if result.success {
                tracing::debug!("successfully executed: {}", cmd);
                return Ok(result);
            }
            if attempt >= max {
                tracing::error!(
                    "{}: {} still failing after {} attempt(s) (exit code {:?}): {}",
                    cmd.error_msg.as_deref().unwrap_or("failed to run command"),
                    cmd,
                    attempt,
                    result.exit_code,
                    result.stderr.as_deref().unwrap_or("").trim()
                );
                return Ok(result);
            }
            tracing::warn!(
                "failed to run command: {} - retrying ({}/{})",
                cmd,
                attempt,
                max
            );
            thread::sleep(delay);
            attempt += 1;
        }
    }
}
