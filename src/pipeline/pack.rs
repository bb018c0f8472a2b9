//! Packaging: turn a component's sources into a distributable package.

use std::path::{Path, PathBuf};

use crate::component::{ComponentConfig, PackFields};
use crate::context::PackContext;
use crate::error::{Error, Result};
use crate::handlers::FilesystemHandler;
use crate::preflight::{check_required_tools, PACKAGING_TOOLS};
use crate::process::{Cmd, ExecutionResult};
use crate::template::TemplateRenderer;

use super::fpm::{gzip_command, FpmRequest};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PackOutcome {
    /// `auto_pack` is off.
    Disabled,
    /// Artifacts copied into the package directory.
    Completed { artifacts: Vec<PathBuf> },
}

/// Package `component`.
pub fn pack(config: &ComponentConfig, component: &str, ctx: &PackContext) -> Result<PackOutcome> {
    let ctx = ctx.for_component(component);
    let fields = match PackFields::resolve(config, component, &ctx)? {
        Some(fields) => fields,
        None => {
            let _span = ctx.log().enter();
            tracing::info!("package is set to be packaged manually");
            return Ok(PackOutcome::Disabled);
        }
    };
    let fs = FilesystemHandler::new(&ctx);
    let templates = TemplateRenderer::new(&ctx);

    {
        let _span = ctx.log().enter();
        tracing::info!("cleaning up before packaging...");
    }
    if fields.overwrite {
        let pattern = format!(
            "{}/{}*",
            glob::Pattern::escape(&fields.package_path.display().to_string()),
            glob::Pattern::escape(&fields.name)
        );
        fs.remove_files(&pattern)?;
    }
    if fields.packaging.is_some() {
        fs.remove_dir(&fields.tmp_package_path)?;
        fs.ensure_dir(&fields.tmp_package_path)?;
    }

    {
        let _span = ctx.log().enter();
        tracing::info!("generating package scripts and config files...");
    }
    if !fields.config_templates.is_empty() {
        templates.generate_configs(config, &fields.sources_path, &fields.config_templates)?;
    }
    create_bootstrap_scripts(config, &fields, &fs, &templates, &ctx)?;

    if let Some(packaging) = &fields.packaging {
        {
            let _span = ctx.log().enter();
            tracing::info!("packing {}", fields.name);
        }
        if !fs.exists(&fields.sources_path).is_dir {
            let _span = ctx.log().enter();
            tracing::error!("sources dir {} doesn't exist", fields.sources_path.display());
            return Err(Error::SourcesMissing(fields.sources_path.clone()));
        }
        let request = FpmRequest {
            name: &fields.name,
            packaging,
            sources_path: &fields.sources_path,
            work_dir: &fields.tmp_package_path,
            bootstrap_script: fields.bootstrap_script.as_deref().filter(|p| p.is_file()),
            in_package_script: fields
                .bootstrap_script_in_package
                .as_deref()
                .is_some_and(Path::is_file),
            depends: &fields.depends,
        };
        let tools = if request.needs_gzip() {
            PACKAGING_TOOLS
        } else {
            &PACKAGING_TOOLS[..1]
        };
        check_required_tools(ctx.runner().as_ref(), tools)?;
        run_packaging(&ctx, request.command())?;

        if request.needs_gzip() {
            match gzip_command(&fields.name, &fields.tmp_package_path) {
                Some(cmd) => {
                    run_packaging(&ctx, cmd)?;
                }
                None => {
                    return Err(Error::PackagingFailed {
                        command: format!("gzip {}*", fields.name),
                        exit_code: None,
                        output: format!(
                            "no files matching {}* in {}",
                            fields.name,
                            fields.tmp_package_path.display()
                        ),
                    })
                }
            }
        }
    }

    fs.ensure_dir(&fields.package_path)?;
    let artifacts = match &fields.destination_type {
        Some(dest) => {
            {
                let _span = ctx.log().enter();
                tracing::info!("isolating archives...");
            }
            let pattern = format!(
                "{}/*.{}",
                glob::Pattern::escape(&fields.tmp_package_path.display().to_string()),
                glob::Pattern::escape(dest)
            );
            fs.copy_matching(&pattern, &fields.package_path)?
        }
        None => Vec::new(),
    };

    let _span = ctx.log().enter();
    tracing::info!("package creation completed successfully");
    Ok(PackOutcome::Completed { artifacts })
}

fn create_bootstrap_scripts(
    config: &ComponentConfig,
    fields: &PackFields,
    fs: &FilesystemHandler,
    templates: &TemplateRenderer,
    ctx: &PackContext,
) -> Result<()> {
    let scripts = [
        fields.bootstrap_script.as_deref(),
        fields.bootstrap_script_in_package.as_deref(),
    ];
    if scripts.iter().all(Option::is_none) {
        return Ok(());
    }
    let Some(template) = &fields.bootstrap_template else {
        let _span = ctx.log().enter();
        tracing::warn!("bootstrap script declared without bootstrap_template_path, skipping");
        return Ok(());
    };

    if let Some(script) = &fields.bootstrap_script {
        templates.create_bootstrap_script(config, template, script)?;
    }
    if let Some(script) = &fields.bootstrap_script_in_package {
        templates.create_bootstrap_script(config, template, script)?;
        fs.make_executable(script)?;
        if !fs.exists(&fields.sources_path).is_dir {
            return Err(Error::SourcesMissing(fields.sources_path.clone()));
        }
        {
            let _span = ctx.log().enter();
            tracing::debug!("copying bootstrap script to package directory");
        }
        fs.copy(script, &fields.sources_path, false)?;
    }
    Ok(())
}

/// Run an fpm or gzip invocation; anything but success is fatal.
fn run_packaging(ctx: &PackContext, cmd: Cmd) -> Result<ExecutionResult> {
    let cmd = cmd.capture();
    let result = ctx.runner().execute(&cmd)?;
    if result.success {
        return Ok(result);
    }
    let _span = ctx.log().enter();
    tracing::error!("packaging command failed: {}", cmd);
    Err(Error::PackagingFailed {
        command: cmd.to_string(),
        exit_code: result.exit_code,
        output: [result.stdout.as_deref(), result.stderr.as_deref()]
            .into_iter()
            .flatten()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join("\n"),
    })
}
