//! Component descriptions: what to fetch, how to package it.
//!
//! A [`ComponentConfig`] is read from the registry (see [`registry`]) and is
//! never mutated afterwards. Every field is optional here; which fields a
//! run actually needs is decided by [`resolve`].
//!
//! # Example
//!
//! ```toml
//! [nginx]
//! name = "nginx"
//! version = "1.25.3"
//! source_urls = ["http://nginx.org/download/nginx-1.25.3.tar.gz"]
//! sources_path = "/packages/nginx"
//! package_path = "/packages"
//! source_package_type = "dir"
//! destination_package_type = "deb"
//!
//! [nginx.config_templates.__template_file_nginx]
//! config_dir = "config"
//! template = "package-templates/nginx.conf.template"
//! ```

pub mod registry;
pub mod resolve;

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

pub use registry::Registry;
pub use resolve::{AcquireFields, FieldSpec, PackFields, Packaging, Requirement};

/// One component as declared in the registry.
///
/// Serializing it yields exactly the keys that were declared; that mapping is
/// the namespace templates are rendered against.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ComponentConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_repo: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_ppa: Option<String>,
    /// URL of a repository signing key, fetched into the sources directory.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_urls: Option<Vec<String>>,
    /// Local signing key to trust before downloading requirements.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_file_path: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requirements: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modules: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gems: Option<Vec<String>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sources_path: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub package_path: Option<PathBuf>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auto_get: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auto_pack: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub overwrite_sources: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub overwrite_package: Option<bool>,

    /// fpm input type (`dir`, `tar`, ...). Declaring it turns packaging on.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_package_type: Option<String>,
    /// fpm output type (`deb`, `rpm`, `tar`, `tar.gz`, ...).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub destination_package_type: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bootstrap_template_path: Option<PathBuf>,
    /// Script attached to the package as its post-install hook.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bootstrap_script_path: Option<PathBuf>,
    /// Script shipped inside the package.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bootstrap_script_in_package_path: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub depends: Option<Vec<String>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config_templates: Option<BTreeMap<String, ConfigTemplateSpec>>,

    /// Undeclared keys, kept for templates.
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

/// Vocabulary of component fields the pipeline reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Field {
    Name,
    Version,
    SourceRepo,
    SourcePpa,
    SourceKey,
    SourceUrls,
    KeyFilePath,
    Requirements,
    Modules,
    Gems,
    SourcesPath,
    PackagePath,
    AutoGet,
    AutoPack,
    OverwriteSources,
    OverwritePackage,
    SourcePackageType,
    DestinationPackageType,
    BootstrapTemplatePath,
    BootstrapScriptPath,
    BootstrapScriptInPackagePath,
    Depends,
    ConfigTemplates,
}

impl Field {
    /// Key of the field in the registry file.
    pub fn key(self) -> &'static str {
        match self {
            Field::Name => "name",
            Field::Version => "version",
            Field::SourceRepo => "source_repo",
            Field::SourcePpa => "source_ppa",
            Field::SourceKey => "source_key",
            Field::SourceUrls => "source_urls",
            Field::KeyFilePath => "key_file_path",
            Field::Requirements => "requirements",
            Field::Modules => "modules",
            Field::Gems => "gems",
            Field::SourcesPath => "sources_path",
            Field::PackagePath => "package_path",
            Field::AutoGet => "auto_get",
            Field::AutoPack => "auto_pack",
            Field::OverwriteSources => "overwrite_sources",
            Field::OverwritePackage => "overwrite_package",
            Field::SourcePackageType => "source_package_type",
            Field::DestinationPackageType => "destination_package_type",
            Field::BootstrapTemplatePath => "bootstrap_template_path",
            Field::BootstrapScriptPath => "bootstrap_script_path",
            Field::BootstrapScriptInPackagePath => "bootstrap_script_in_package_path",
            Field::Depends => "depends",
            Field::ConfigTemplates => "config_templates",
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

impl ComponentConfig {
    /// Whether `field` was declared.
    pub fn is_set(&self, field: Field) -> bool {
        match field {
            Field::Name => self.name.is_some(),
            Field::Version => self.version.is_some(),
            Field::SourceRepo => self.source_repo.is_some(),
            Field::SourcePpa => self.source_ppa.is_some(),
            Field::SourceKey => self.source_key.is_some(),
            Field::SourceUrls => self.source_urls.is_some(),
            Field::KeyFilePath => self.key_file_path.is_some(),
            Field::Requirements => self.requirements.is_some(),
            Field::Modules => self.modules.is_some(),
            Field::Gems => self.gems.is_some(),
            Field::SourcesPath => self.sources_path.is_some(),
            Field::PackagePath => self.package_path.is_some(),
            Field::AutoGet => self.auto_get.is_some(),
            Field::AutoPack => self.auto_pack.is_some(),
            Field::OverwriteSources => self.overwrite_sources.is_some(),
            Field::OverwritePackage => self.overwrite_package.is_some(),
            Field::SourcePackageType => self.source_package_type.is_some(),
            Field::DestinationPackageType => self.destination_package_type.is_some(),
            Field::BootstrapTemplatePath => self.bootstrap_template_path.is_some(),
            Field::BootstrapScriptPath => self.bootstrap_script_path.is_some(),
            Field::BootstrapScriptInPackagePath => self.bootstrap_script_in_package_path.is_some(),
            Field::Depends => self.depends.is_some(),
            Field::ConfigTemplates => self.config_templates.is_some(),
        }
    }

    /// Declared value of a boolean field; `None` for non-boolean fields.
    pub fn flag(&self, field: Field) -> Option<bool> {
        match field {
            Field::AutoGet => self.auto_get,
            Field::AutoPack => self.auto_pack,
            Field::OverwriteSources => self.overwrite_sources,
            Field::OverwritePackage => self.overwrite_package,
            _ => None,
        }
    }
}

/// Raw `config_templates` entry as written in the registry.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigTemplateSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config_dir: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_file: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub templates: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub files: Option<PathBuf>,
}

const TEMPLATE_FILE_PREFIX: &str = "__template_file";
const TEMPLATE_DIR_PREFIX: &str = "__template_dir";
const CONFIG_DIR_PREFIX: &str = "__config_dir";

/// A classified `config_templates` entry. `config_dir` is relative to the
/// component's sources directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigTemplateEntry {
    /// Render one template. The output name defaults to the template's file
    /// name minus its last extension.
    TemplateFile {
        config_dir: PathBuf,
        template: PathBuf,
        output_file: Option<String>,
    },
    /// Render every file directly inside `templates`.
    TemplateDir { config_dir: PathBuf, templates: PathBuf },
    /// Copy the contents of `files` verbatim.
    StaticFiles { config_dir: PathBuf, files: PathBuf },
}

impl ConfigTemplateEntry {
    /// Classify the entry stored under `key` by its prefix.
    pub fn classify(component: &str, key: &str, spec: &ConfigTemplateSpec) -> Result<Self> {
        let require = |value: &Option<PathBuf>, field: &str| {
            value.clone().ok_or_else(|| {
                Error::invalid(
                    component,
                    format!("config template entry '{key}' is missing '{field}'"),
                )
            })
        };
        let reject = |present: bool, field: &str| {
            if present {
                Err(Error::invalid(
                    component,
                    format!("config template entry '{key}' does not take '{field}'"),
                ))
            } else {
                Ok(())
            }
        };

        if key.starts_with(TEMPLATE_FILE_PREFIX) {
            reject(spec.templates.is_some(), "templates")?;
            reject(spec.files.is_some(), "files")?;
            Ok(ConfigTemplateEntry::TemplateFile {
                config_dir: require(&spec.config_dir, "config_dir")?,
                template: require(&spec.template, "template")?,
                output_file: spec.output_file.clone(),
            })
        } else if key.starts_with(TEMPLATE_DIR_PREFIX) {
            reject(spec.template.is_some(), "template")?;
            reject(spec.output_file.is_some(), "output_file")?;
            reject(spec.files.is_some(), "files")?;
            Ok(ConfigTemplateEntry::TemplateDir {
                config_dir: require(&spec.config_dir, "config_dir")?,
                templates: require(&spec.templates, "templates")?,
            })
        } else if key.starts_with(CONFIG_DIR_PREFIX) {
            reject(spec.template.is_some(), "template")?;
            reject(spec.output_file.is_some(), "output_file")?;
            reject(spec.templates.is_some(), "templates")?;
            Ok(ConfigTemplateEntry::StaticFiles {
                config_dir: require(&spec.config_dir, "config_dir")?,
                files: require(&spec.files, "files")?,
            })
        } else {
            Err(Error::invalid(
                component,
                format!(
                    "config template entry '{key}' must start with one of \
                     {TEMPLATE_FILE_PREFIX}, {TEMPLATE_DIR_PREFIX}, {CONFIG_DIR_PREFIX}"
                ),
            ))
        }
    }

    pub fn config_dir(&self) -> &PathBuf {
        match self {
            ConfigTemplateEntry::TemplateFile { config_dir, .. }
            | ConfigTemplateEntry::TemplateDir { config_dir, .. }
            | ConfigTemplateEntry::StaticFiles { config_dir, .. } => config_dir,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn spec(config_dir: &str) -> ConfigTemplateSpec {
        ConfigTemplateSpec {
            config_dir: Some(config_dir.into()),
            ..Default::default()
        }
    }

    #[test]
    fn test_classify_by_prefix() {
        let file = ConfigTemplateEntry::classify(
            "nginx",
            "__template_file_main",
            &ConfigTemplateSpec {
                template: Some("tpl/nginx.conf.template".into()),
                ..spec("config")
            },
        )
        .unwrap();
        assert_eq!(
            file,
            ConfigTemplateEntry::TemplateFile {
                config_dir: "config".into(),
                template: "tpl/nginx.conf.template".into(),
                output_file: None,
            }
        );

        let dir = ConfigTemplateEntry::classify(
            "nginx",
            "__template_dir",
            &ConfigTemplateSpec {
                templates: Some("tpl/conf.d".into()),
                ..spec("config/conf.d")
            },
        )
        .unwrap();
        assert!(matches!(dir, ConfigTemplateEntry::TemplateDir { .. }));

        let files = ConfigTemplateEntry::classify(
            "nginx",
            "__config_dir_static",
            &ConfigTemplateSpec {
                files: Some("static".into()),
                ..spec("www")
            },
        )
        .unwrap();
        assert_eq!(files.config_dir(), &PathBuf::from("www"));
    }

    #[test]
    fn test_unknown_prefix_is_configuration_error() {
        let err = ConfigTemplateEntry::classify("nginx", "templates", &spec("config")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Configuration);
        assert!(err.to_string().contains("'templates'"));
    }

    #[test]
    fn test_missing_entry_field_is_configuration_error() {
        let err =
            ConfigTemplateEntry::classify("nginx", "__template_file", &spec("config")).unwrap_err();
        assert!(err.to_string().contains("missing 'template'"));

        let err = ConfigTemplateEntry::classify(
            "nginx",
            "__config_dir",
            &ConfigTemplateSpec::default(),
        )
        .unwrap_err();
        assert!(err.to_string().contains("missing 'config_dir'"));
    }

    #[test]
    fn test_mismatched_entry_field_is_rejected() {
        let err = ConfigTemplateEntry::classify(
            "nginx",
            "__config_dir",
            &ConfigTemplateSpec {
                files: Some("static".into()),
                template: Some("x.template".into()),
                ..spec("www")
            },
        )
        .unwrap_err();
        assert!(err.to_string().contains("does not take 'template'"));
    }

    #[test]
    fn test_serialization_yields_declared_keys_only() {
        let config: ComponentConfig = toml::from_str(
            r#"
            name = "nginx"
            sources_path = "/packages/nginx"
            listen_port = 8080
            "#,
        )
        .unwrap();

        let value = serde_json::to_value(&config).unwrap();
        let keys: Vec<&String> = value.as_object().unwrap().keys().collect();
        assert_eq!(keys, ["listen_port", "name", "sources_path"]);
        assert_eq!(value["listen_port"], 8080);
    }

    #[test]
    fn test_is_set_and_flag() {
        let config = ComponentConfig {
            auto_get: Some(false),
            gems: Some(vec![]),
            ..Default::default()
        };
        assert!(config.is_set(Field::Gems));
        assert!(!config.is_set(Field::Modules));
        assert_eq!(config.flag(Field::AutoGet), Some(false));
        assert_eq!(config.flag(Field::AutoPack), None);
        assert_eq!(config.flag(Field::Name), None);
    }
}
