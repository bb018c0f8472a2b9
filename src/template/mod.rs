//! Template rendering for config files and bootstrap scripts.
//!
//! Templates are Jinja-style (minijinja) and see the whole component
//! configuration, extra keys included, as their namespace. Undefined names
//! render as empty rather than failing.

use std::fs;
use std::path::{Path, PathBuf};

use minijinja::{Environment, Value};

use crate::component::{ComponentConfig, ConfigTemplateEntry};
use crate::context::PackContext;
use crate::error::{Error, IoResultExt, Result};
use crate::handlers::FilesystemHandler;
use crate::log::LogContext;

/// Render `template_file` from `template_dir` against `config`.
///
/// The directory is checked before the file so the error names what is
/// actually missing.
pub fn render(template_dir: &Path, template_file: &str, config: &ComponentConfig) -> Result<String> {
    if !template_dir.is_dir() {
        tracing::error!("template dir {} missing", template_dir.display());
        return Err(Error::TemplateDirMissing(template_dir.to_path_buf()));
    }
    let path = template_dir.join(template_file);
    if !path.is_file() {
        tracing::error!("template file {} missing", path.display());
        return Err(Error::TemplateFileMissing {
            dir: template_dir.to_path_buf(),
            file: template_file.to_string(),
        });
    }

    let source = fs::read_to_string(&path)
        .fs_context(|| format!("reading template '{}'", path.display()))?;
    tracing::debug!("generating template from {}", path.display());

    let mut env = Environment::new();
    env.set_keep_trailing_newline(true);
    env.render_named_str(template_file, &source, Value::from_serialize(config))
        .map_err(|source| Error::Render {
            template: path.display().to_string(),
            source,
        })
}

/// Split a template path into its directory and file name.
fn split_template(template: &Path) -> Result<(PathBuf, String)> {
    let file = template
        .file_name()
        .and_then(|name| name.to_str())
        .ok_or_else(|| Error::TemplateFileMissing {
            dir: template.to_path_buf(),
            file: String::new(),
        })?;
    let dir = template.parent().unwrap_or_else(|| Path::new("."));
    Ok((dir.to_path_buf(), file.to_string()))
}

/// `name.conf.template` -> `name.conf`. Names without an extension are kept.
fn strip_last_extension(file: &str) -> &str {
    match file.rfind('.') {
        Some(idx) if idx > 0 => &file[..idx],
        _ => file,
    }
}

pub struct TemplateRenderer {
    fs: FilesystemHandler,
    log: LogContext,
}

impl TemplateRenderer {
    pub fn new(ctx: &PackContext) -> Self {
        Self {
            fs: FilesystemHandler::new(ctx),
            log: ctx.log().clone(),
        }
    }

    /// Create or overwrite `path` with `content`. The parent directory must
    /// already exist.
    pub fn write_file(&self, path: &Path, content: &str) -> Result<()> {
        let _span = self.log.enter();
        if self.log.print_templates() {
            tracing::debug!(content = %content, "creating file: {}", path.display());
        }
        fs::write(path, content).fs_context(|| format!("writing '{}'", path.display()))
    }

    /// Render the template at `template` (a path) into `output`.
    pub fn generate_from_template(
        &self,
        config: &ComponentConfig,
        output: &Path,
        template: &Path,
    ) -> Result<()> {
        let (dir, file) = split_template(template)?;
        let text = {
            let _span = self.log.enter();
            tracing::debug!("generating {} from {}", output.display(), template.display());
            render(&dir, &file, config)?
        };
        self.write_file(output, &text)
    }

    /// Produce every config-template entry under `sources_path`, in order.
    /// Returns the files written or copied.
    pub fn generate_configs(
        &self,
        config: &ComponentConfig,
        sources_path: &Path,
        entries: &[(String, ConfigTemplateEntry)],
    ) -> Result<Vec<PathBuf>> {
        let mut produced = Vec::new();
        for (key, entry) in entries {
            {
                let _span = self.log.enter();
                tracing::debug!("generating config entry {}", key);
            }
            let dest = sources_path.join(entry.config_dir());
            self.fs.ensure_dir(&dest)?;

            match entry {
                ConfigTemplateEntry::TemplateFile {
                    template,
                    output_file,
                    ..
                } => {
                    let (_, file) = split_template(template)?;
                    let name = output_file
                        .clone()
                        .unwrap_or_else(|| strip_last_extension(&file).to_string());
                    let output = dest.join(name);
                    self.generate_from_template(config, &output, template)?;
                    produced.push(output);
                }
                ConfigTemplateEntry::TemplateDir { templates, .. } => {
                    if !templates.is_dir() {
                        return Err(Error::TemplateDirMissing(templates.clone()));
                    }
                    let mut files: Vec<String> = fs::read_dir(templates)
                        .fs_context(|| format!("reading '{}'", templates.display()))?
                        .filter_map(|entry| entry.ok())
                        .filter(|entry| entry.path().is_file())
                        .filter_map(|entry| entry.file_name().into_string().ok())
                        .collect();
                    files.sort();

                    for file in files {
                        let output = dest.join(strip_last_extension(&file));
                        let text = render(templates, &file, config)?;
                        self.write_file(&output, &text)?;
                        produced.push(output);
                    }
                }
                ConfigTemplateEntry::StaticFiles { files, .. } => {
                    if !files.is_dir() {
                        return Err(Error::invalid(
                            config.name.as_deref().unwrap_or_default(),
                            format!("config files directory '{}' does not exist", files.display()),
                        ));
                    }
                    self.fs.copy_contents(files, &dest)?;
                    produced.push(dest.clone());
                }
            }
        }
        Ok(produced)
    }

    /// Render a bootstrap script from `template` into `script`.
    pub fn create_bootstrap_script(
        &self,
        config: &ComponentConfig,
        template: &Path,
        script: &Path,
    ) -> Result<()> {
        {
            let _span = self.log.enter();
            tracing::debug!("creating bootstrap script {}", script.display());
        }
        self.generate_from_template(config, script, template)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::log::LogContext;
    use crate::process::testing::{context, RecordingRunner};
    use std::collections::BTreeMap;
    use std::sync::Arc;
    use tempfile::TempDir;
    use tracing_test::traced_test;

    fn nginx() -> ComponentConfig {
        let mut extra = BTreeMap::new();
        extra.insert("listen_port".to_string(), serde_json::json!(8080));
        ComponentConfig {
            name: Some("nginx".into()),
            version: Some("1.25.3".into()),
            depends: Some(vec!["libssl3".into(), "zlib1g".into()]),
            extra,
            ..Default::default()
        }
    }

    fn renderer(dir: &Path) -> TemplateRenderer {
        TemplateRenderer::new(&context(&Arc::new(RecordingRunner::new()), dir))
    }

    #[test]
    fn test_render_uses_component_namespace() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join("nginx.conf.template"),
            "# {{ name }} {{ version }}\nlisten {{ listen_port }};\n\
             {% for dep in depends %}dep {{ dep }}\n{% endfor %}",
        )
        .unwrap();

        let text = render(dir.path(), "nginx.conf.template", &nginx()).unwrap();
        assert_eq!(
            text,
            "# nginx 1.25.3\nlisten 8080;\ndep libssl3\ndep zlib1g\n"
        );
    }

    #[test]
    fn test_render_preserves_trailing_newline_and_is_deterministic() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("a.template"), "v={{ version }}\n\n").unwrap();

        let first = render(dir.path(), "a.template", &nginx()).unwrap();
        let second = render(dir.path(), "a.template", &nginx()).unwrap();
        assert_eq!(first, "v=1.25.3\n\n");
        assert_eq!(first.as_bytes(), second.as_bytes());
    }

    #[test]
    fn test_undefined_names_render_empty() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("a.template"), "[{{ not_declared }}]").unwrap();
        assert_eq!(render(dir.path(), "a.template", &nginx()).unwrap(), "[]");
    }

    #[test]
    fn test_missing_dir_is_reported_before_missing_file() {
        let dir = TempDir::new().unwrap();
        let absent = dir.path().join("absent");

        let err = render(&absent, "x.template", &nginx()).unwrap_err();
        assert!(matches!(err, Error::TemplateDirMissing(ref p) if p == &absent));

        let err = render(dir.path(), "x.template", &nginx()).unwrap_err();
        assert!(matches!(err, Error::TemplateFileMissing { ref file, .. } if file == "x.template"));
        assert_eq!(err.kind(), ErrorKind::Template);
    }

    #[test]
    fn test_broken_template_is_render_error() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("a.template"), "{% for x in %}").unwrap();
        let err = render(dir.path(), "a.template", &nginx()).unwrap_err();
        assert!(matches!(err, Error::Render { .. }));
    }

    #[test]
    fn test_write_file_does_not_create_directories() {
        let dir = TempDir::new().unwrap();
        let templates = renderer(dir.path());

        templates.write_file(&dir.path().join("out"), "one").unwrap();
        templates.write_file(&dir.path().join("out"), "two").unwrap();
        assert_eq!(fs::read_to_string(dir.path().join("out")).unwrap(), "two");

        let err = templates
            .write_file(&dir.path().join("missing/out"), "x")
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Filesystem);
    }

    #[test]
    #[traced_test]
    fn test_print_templates_logs_content() {
        let dir = TempDir::new().unwrap();
        let runner = Arc::new(RecordingRunner::new());
        let ctx = PackContext::new(
            runner,
            dir.path().to_path_buf(),
            PathBuf::from("package-templates"),
            LogContext::new(true),
        );
        TemplateRenderer::new(&ctx)
            .write_file(&dir.path().join("out"), "secret-marker")
            .unwrap();
        assert!(logs_contain("content=secret-marker"));
    }

    #[test]
    fn test_generate_configs_all_entry_kinds() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        let sources = root.join("sources");
        fs::create_dir_all(&sources).unwrap();

        fs::create_dir_all(root.join("tpl/conf.d")).unwrap();
        fs::write(root.join("tpl/nginx.conf.template"), "user {{ name }};\n").unwrap();
        fs::write(root.join("tpl/conf.d/site.conf.template"), "port {{ listen_port }}\n").unwrap();
        fs::write(root.join("tpl/conf.d/mime.types.j2"), "{{ version }}\n").unwrap();
        fs::create_dir_all(root.join("tpl/conf.d/nested")).unwrap();
        fs::create_dir_all(root.join("static")).unwrap();
        fs::write(root.join("static/index.html"), "<html/>").unwrap();

        let entries = vec![
            (
                "__config_dir".to_string(),
                ConfigTemplateEntry::StaticFiles {
                    config_dir: "www".into(),
                    files: root.join("static"),
                },
            ),
            (
                "__template_dir".to_string(),
                ConfigTemplateEntry::TemplateDir {
                    config_dir: "config/conf.d".into(),
                    templates: root.join("tpl/conf.d"),
                },
            ),
            (
                "__template_file".to_string(),
                ConfigTemplateEntry::TemplateFile {
                    config_dir: "config".into(),
                    template: root.join("tpl/nginx.conf.template"),
                    output_file: None,
                },
            ),
            (
                "__template_file_renamed".to_string(),
                ConfigTemplateEntry::TemplateFile {
                    config_dir: "config".into(),
                    template: root.join("tpl/nginx.conf.template"),
                    output_file: Some("main.conf".into()),
                },
            ),
        ];

        let produced = renderer(root)
            .generate_configs(&nginx(), &sources, &entries)
            .unwrap();

        assert_eq!(
            fs::read_to_string(sources.join("www/index.html")).unwrap(),
            "<html/>"
        );
        assert_eq!(
            fs::read_to_string(sources.join("config/conf.d/site.conf")).unwrap(),
            "port 8080\n"
        );
        assert_eq!(
            fs::read_to_string(sources.join("config/conf.d/mime.types")).unwrap(),
            "1.25.3\n"
        );
        assert!(!sources.join("config/conf.d/nested").exists());
        assert_eq!(
            fs::read_to_string(sources.join("config/nginx.conf")).unwrap(),
            "user nginx;\n"
        );
        assert!(sources.join("config/main.conf").is_file());
        assert_eq!(produced.len(), 5);
    }

    #[test]
    fn test_create_bootstrap_script() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join("bootstrap.sh.template"),
            "#!/bin/sh\necho installing {{ name }}\n",
        )
        .unwrap();
        let script = dir.path().join("bootstrap.sh");

        renderer(dir.path())
            .create_bootstrap_script(&nginx(), &dir.path().join("bootstrap.sh.template"), &script)
            .unwrap();
        assert_eq!(
            fs::read_to_string(&script).unwrap(),
            "#!/bin/sh\necho installing nginx\n"
        );
    }

    #[test]
    fn test_strip_last_extension() {
        assert_eq!(strip_last_extension("nginx.conf.template"), "nginx.conf");
        assert_eq!(strip_last_extension("Makefile"), "Makefile");
        assert_eq!(strip_last_extension(".hidden"), ".hidden");
    }
}
