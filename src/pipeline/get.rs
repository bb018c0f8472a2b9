//! Acquisition: fetch a component's sources into its sources directory.
//!
//! The run is a fixed, ordered [`plan`] of steps. A step whose command fails
//! is logged and recorded in the [`AcquireReport`]; the remaining steps still
//! run. Configuration mistakes and missing prerequisites abort the run.

use std::fmt;
use std::path::{Path, PathBuf};

use crate::component::{AcquireFields, ComponentConfig};
use crate::context::PackContext;
use crate::error::Result;
use crate::handlers::{AptHandler, DownloadHandler, FilesystemHandler, PythonHandler, RubyHandler};
use crate::process::ExecutionResult;

/// Apt source-list mark used for added repositories.
const SOURCE_REPO_MARK: &str = "deb";

/// One acquisition step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    AddSourceRepo(String),
    AddPpa(String),
    FetchSigningKey(String),
    FetchSource(String),
    AddKeyFile(PathBuf),
    RefreshRepositories,
    DownloadRequirement(String),
    DownloadModule(String),
    DownloadGem(String),
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Step::AddSourceRepo(url) => write!(f, "add source repository {url}"),
            Step::AddPpa(ppa) => write!(f, "add ppa {ppa}"),
            Step::FetchSigningKey(url) => write!(f, "fetch signing key {url}"),
            Step::FetchSource(url) => write!(f, "fetch {url}"),
            Step::AddKeyFile(path) => write!(f, "add key file {}", path.display()),
            Step::RefreshRepositories => write!(f, "refresh repository metadata"),
            Step::DownloadRequirement(pkg) => write!(f, "download requirement {pkg}"),
            Step::DownloadModule(module) => write!(f, "download python module {module}"),
            Step::DownloadGem(gem) => write!(f, "download ruby gem {gem}"),
        }
    }
}

/// The ordered steps for `fields`.
pub fn plan(fields: &AcquireFields) -> Vec<Step> {
    let mut steps = Vec::new();
    if let Some(repo) = &fields.source_repo {
        steps.push(Step::AddSourceRepo(repo.clone()));
    }
    if let Some(ppa) = &fields.source_ppa {
        steps.push(Step::AddPpa(ppa.clone()));
    }
    if let Some(key) = &fields.source_key {
        steps.push(Step::FetchSigningKey(key.clone()));
    }
    steps.extend(fields.source_urls.iter().cloned().map(Step::FetchSource));
    if let Some(key_file) = &fields.key_file {
        steps.push(Step::AddKeyFile(key_file.clone()));
        steps.push(Step::RefreshRepositories);
    }
    steps.extend(fields.requirements.iter().cloned().map(Step::DownloadRequirement));
    steps.extend(fields.modules.iter().cloned().map(Step::DownloadModule));
    steps.extend(fields.gems.iter().cloned().map(Step::DownloadGem));
    steps
}

/// What an acquisition run did.
#[derive(Debug, Clone)]
pub struct AcquireReport {
    pub sources_path: PathBuf,
    pub steps: Vec<(Step, ExecutionResult)>,
}

impl AcquireReport {
    /// Steps whose command failed.
    pub fn failed(&self) -> impl Iterator<Item = &Step> {
        self.steps
            .iter()
            .filter(|(_, result)| !result.success)
            .map(|(step, _)| step)
    }

    pub fn is_complete(&self) -> bool {
        self.failed().next().is_none()
    }
}

#[derive(Debug, Clone)]
pub enum GetOutcome {
    /// `auto_get` is off.
    Disabled,
    Completed(AcquireReport),
}

/// Acquire the sources of `component`.
pub fn get(config: &ComponentConfig, component: &str, ctx: &PackContext) -> Result<GetOutcome> {
    let ctx = ctx.for_component(component);
    let fields = match AcquireFields::resolve(config, component, &ctx)? {
        Some(fields) => fields,
        None => {
            let _span = ctx.log().enter();
            tracing::info!("component is set to manual retrieval");
            return Ok(GetOutcome::Disabled);
        }
    };

    let fs = FilesystemHandler::new(&ctx);
    prepare_dirs(&fs, &fields, &ctx)?;

    let acquirer = Acquirer {
        apt: AptHandler::new(&ctx),
        downloads: DownloadHandler::new(&ctx, component),
        python: PythonHandler::new(&ctx),
        ruby: RubyHandler::new(&ctx),
        sources_path: &fields.sources_path,
    };

    let mut report = AcquireReport {
        sources_path: fields.sources_path.clone(),
        steps: Vec::new(),
    };
    for step in plan(&fields) {
        let result = acquirer.run(&step)?;
        let _span = ctx.log().enter();
        if result.success {
            tracing::debug!("{} succeeded", step);
        } else {
            tracing::error!("{} failed, continuing", step);
        }
        report.steps.push((step, result));
    }

    let _span = ctx.log().enter();
    if report.is_complete() {
        tracing::info!("retrieved sources into {}", fields.sources_path.display());
    } else {
        tracing::warn!(
            "retrieved sources into {} with {} failed step(s)",
            fields.sources_path.display(),
            report.failed().count()
        );
    }
    Ok(GetOutcome::Completed(report))
}

fn prepare_dirs(fs: &FilesystemHandler, fields: &AcquireFields, ctx: &PackContext) -> Result<()> {
    if fields.overwrite {
        {
            let _span = ctx.log().enter();
            tracing::info!("overwrite enabled. removing directory before retrieval");
        }
        fs.remove_dir(&fields.sources_path)?;
    } else if fs.exists(&fields.sources_path).is_dir {
        let _span = ctx.log().enter();
        tracing::error!(
            "the destination directory {} already exists and overwrite is disabled",
            fields.sources_path.display()
        );
    }
    if let Some(tmp) = &fields.tmp_package_path {
        fs.ensure_dir(tmp)?;
    }
    fs.ensure_dir(&fields.sources_path)
}

struct Acquirer<'a> {
    apt: AptHandler,
    downloads: DownloadHandler,
    python: PythonHandler,
    ruby: RubyHandler,
    sources_path: &'a Path,
}

impl Acquirer<'_> {
    fn run(&self, step: &Step) -> Result<ExecutionResult> {
        let dir = self.sources_path;
        match step {
            Step::AddSourceRepo(url) => self.apt.add_source_repo(url, SOURCE_REPO_MARK),
            Step::AddPpa(ppa) => self.apt.add_ppa(ppa),
            Step::FetchSigningKey(url) | Step::FetchSource(url) => {
                self.downloads.fetch(url, Some(dir), None)
            }
            Step::AddKeyFile(path) => self.apt.add_key(path),
            Step::RefreshRepositories => self.apt.update(),
            Step::DownloadRequirement(pkg) => self.apt.download(pkg, dir),
            Step::DownloadModule(module) => self.python.download_module(module, dir, None),
            Step::DownloadGem(gem) => self.ruby.download_gem(gem, dir),
        }
    }
}
