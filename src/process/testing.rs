//! Recording [`Runner`] for tests: nothing is spawned.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use super::{Cmd, ExecutionResult, Runner};
use crate::context::PackContext;
use crate::error::Result;
use crate::log::LogContext;

type Hook = Box<dyn Fn(&Cmd) + Send + Sync>;

pub(crate) struct RecordingRunner {
    commands: Mutex<Vec<Cmd>>,
    failing: HashSet<String>,
    missing: HashSet<String>,
    outputs: HashMap<String, String>,
    hook: Option<Hook>,
}

impl RecordingRunner {
    pub(crate) fn new() -> Self {
        Self {
            commands: Mutex::new(Vec::new()),
            failing: HashSet::new(),
            missing: HashSet::new(),
            outputs: HashMap::new(),
            hook: None,
        }
    }

    /// Commands whose program is `program` report failure.
    pub(crate) fn failing(mut self, program: &str) -> Self {
        self.failing.insert(program.to_string());
        self
    }

    /// `locate(tool)` reports the tool as absent.
    pub(crate) fn missing(mut self, tool: &str) -> Self {
        self.missing.insert(tool.to_string());
        self
    }

    /// Captured stdout returned for every command whose program is `program`.
    pub(crate) fn stdout(mut self, program: &str, text: &str) -> Self {
        self.outputs.insert(program.to_string(), text.to_string());
        self
    }

    /// Simulate the side effects of the external tools.
    pub(crate) fn on_execute(mut self, hook: impl Fn(&Cmd) + Send + Sync + 'static) -> Self {
        self.hook = Some(Box::new(hook));
        self
    }

    pub(crate) fn commands(&self) -> Vec<Cmd> {
        self.commands.lock().unwrap().clone()
    }

    /// Recorded commands rendered as command lines.
    pub(crate) fn lines(&self) -> Vec<String> {
        self.commands().iter().map(ToString::to_string).collect()
    }

    pub(crate) fn programs(&self) -> Vec<String> {
        self.commands()
            .iter()
            .map(|cmd| cmd.program().to_string())
            .collect()
    }
}

impl Runner for RecordingRunner {
    fn execute(&self, cmd: &Cmd) -> Result<ExecutionResult> {
        self.commands.lock().unwrap().push(cmd.clone());
        if let Some(hook) = &self.hook {
            hook(cmd);
        }
        let success = !self.failing.contains(cmd.program());
        Ok(ExecutionResult {
            success,
            exit_code: Some(if success { 0 } else { 1 }),
            stdout: cmd
                .is_captured()
                .then(|| self.outputs.get(cmd.program()).cloned().unwrap_or_default()),
            stderr: cmd.is_captured().then(String::new),
            attempts: 1,
        })
    }

    fn locate(&self, tool: &str) -> Option<PathBuf> {
        if self.missing.contains(tool) {
            None
        } else {
            Some(PathBuf::from("/usr/bin").join(tool))
        }
    }
}

/// Context wired to `runner`, resolving relative paths against `base_dir`.
pub(crate) fn context(runner: &Arc<RecordingRunner>, base_dir: &Path) -> PackContext {
    PackContext::new(
        runner.clone(),
        base_dir.to_path_buf(),
        PathBuf::from("package-templates"),
        LogContext::default(),
    )
}
