//! Field resolution for `get` and `pack`.
//!
//! Each operation declares the fields it reads as [`FieldSpec`]s. Resolution
//! checks required fields, applies defaults, classifies config-template
//! entries and anchors relative paths, all before any side effect runs.

use std::path::{Path, PathBuf};

use crate::context::PackContext;
use crate::error::{Error, Result};

use super::{ComponentConfig, ConfigTemplateEntry, Field};

/// Name of the temporary packaging directory under `package_path`.
pub const ARCHIVES_DIR: &str = "archives";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Requirement {
    Required,
    Optional,
    Default(bool),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldSpec {
    pub field: Field,
    pub requirement: Requirement,
}

const fn field(field: Field, requirement: Requirement) -> FieldSpec {
    FieldSpec { field, requirement }
}

/// Fields read by `get` once `auto_get` is on.
pub const ACQUIRE_FIELDS: &[FieldSpec] = &[
    field(Field::SourcesPath, Requirement::Required),
    field(Field::PackagePath, Requirement::Optional),
    field(Field::OverwriteSources, Requirement::Default(true)),
    field(Field::SourceRepo, Requirement::Optional),
    field(Field::SourcePpa, Requirement::Optional),
    field(Field::SourceKey, Requirement::Optional),
    field(Field::SourceUrls, Requirement::Optional),
    field(Field::KeyFilePath, Requirement::Optional),
    field(Field::Requirements, Requirement::Optional),
    field(Field::Modules, Requirement::Optional),
    field(Field::Gems, Requirement::Optional),
];

/// Fields read by `pack` once `auto_pack` is on.
pub const PACK_FIELDS: &[FieldSpec] = &[
    field(Field::Name, Requirement::Required),
    field(Field::SourcesPath, Requirement::Required),
    field(Field::PackagePath, Requirement::Required),
    field(Field::OverwritePackage, Requirement::Default(true)),
    field(Field::Version, Requirement::Optional),
    field(Field::SourcePackageType, Requirement::Optional),
    field(Field::DestinationPackageType, Requirement::Optional),
    field(Field::BootstrapTemplatePath, Requirement::Optional),
    field(Field::BootstrapScriptPath, Requirement::Optional),
    field(Field::BootstrapScriptInPackagePath, Requirement::Optional),
    field(Field::Depends, Requirement::Optional),
    field(Field::ConfigTemplates, Requirement::Optional),
];

/// Fields that become required once `source_package_type` is declared.
pub const PACKAGING_FIELDS: &[FieldSpec] = &[
    field(Field::Version, Requirement::Required),
    field(Field::DestinationPackageType, Requirement::Required),
];

fn check_required(config: &ComponentConfig, component: &str, specs: &[FieldSpec]) -> Result<()> {
    for spec in specs {
        if spec.requirement == Requirement::Required && !config.is_set(spec.field) {
            tracing::error!("{} is missing required field {}", component, spec.field);
            return Err(Error::MissingField {
                component: component.to_string(),
                field: spec.field.key(),
            });
        }
    }
    Ok(())
}

fn required<'a, T>(value: &'a Option<T>, component: &str, field: Field) -> Result<&'a T> {
    value.as_ref().ok_or_else(|| Error::MissingField {
        component: component.to_string(),
        field: field.key(),
    })
}

/// Declared value of `field`, else its default from `specs`.
fn flag_or_default(config: &ComponentConfig, field: Field, specs: &[FieldSpec]) -> bool {
    config.flag(field).unwrap_or_else(|| {
        specs
            .iter()
            .find(|spec| spec.field == field)
            .and_then(|spec| match spec.requirement {
                Requirement::Default(value) => Some(value),
                _ => None,
            })
            .unwrap_or(false)
    })
}

/// Whether `get` should run at all.
pub fn auto_get(config: &ComponentConfig) -> bool {
    config.auto_get.unwrap_or(true)
}

/// Whether `pack` should run at all.
pub fn auto_pack(config: &ComponentConfig) -> bool {
    config.auto_pack.unwrap_or(true)
}

fn anchor(base_dir: &Path, path: &Path) -> PathBuf {
    base_dir.join(path)
}

/// Where a template reference points: bare file names live in the
/// templates directory, anything with a directory part is anchored at the
/// base directory.
pub fn template_location(ctx: &PackContext, template: &Path) -> PathBuf {
    match template.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => anchor(ctx.base_dir(), template),
        _ => ctx.templates_dir().join(template),
    }
}

fn list(value: &Option<Vec<String>>) -> Vec<String> {
    value.clone().unwrap_or_default()
}

/// Everything `get` needs, resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AcquireFields {
    pub sources_path: PathBuf,
    /// Temporary packaging directory, prepared when `package_path` is known.
    pub tmp_package_path: Option<PathBuf>,
    pub overwrite: bool,
    pub source_repo: Option<String>,
    pub source_ppa: Option<String>,
    pub source_key: Option<String>,
    pub source_urls: Vec<String>,
    pub key_file: Option<PathBuf>,
    pub requirements: Vec<String>,
    pub modules: Vec<String>,
    pub gems: Vec<String>,
}

impl AcquireFields {
    /// Resolve the acquisition fields of `config`. `None` when `auto_get` is
    /// off.
    pub fn resolve(
        config: &ComponentConfig,
        component: &str,
        ctx: &PackContext,
    ) -> Result<Option<Self>> {
        if !auto_get(config) {
            return Ok(None);
        }
        check_required(config, component, ACQUIRE_FIELDS)?;

        let base = ctx.base_dir();
        let sources_path = anchor(base, required(&config.sources_path, component, Field::SourcesPath)?);

        Ok(Some(Self {
            sources_path,
            tmp_package_path: config
                .package_path
                .as_deref()
                .map(|p| anchor(base, p).join(ARCHIVES_DIR)),
            overwrite: flag_or_default(config, Field::OverwriteSources, ACQUIRE_FIELDS),
            source_repo: config.source_repo.clone(),
            source_ppa: config.source_ppa.clone(),
            source_key: config.source_key.clone(),
            source_urls: list(&config.source_urls),
            key_file: config.key_file_path.as_deref().map(|p| anchor(base, p)),
            requirements: list(&config.requirements),
            modules: list(&config.modules),
            gems: list(&config.gems),
        }))
    }
}

/// fpm input and output, present when `source_package_type` is declared.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packaging {
    pub source_type: String,
    pub destination_type: String,
    pub version: String,
}

/// Everything `pack` needs, resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackFields {
    pub name: String,
    pub version: Option<String>,
    pub sources_path: PathBuf,
    pub package_path: PathBuf,
    pub tmp_package_path: PathBuf,
    pub overwrite: bool,
    pub packaging: Option<Packaging>,
    pub destination_type: Option<String>,
    pub bootstrap_template: Option<PathBuf>,
    pub bootstrap_script: Option<PathBuf>,
    pub bootstrap_script_in_package: Option<PathBuf>,
    pub depends: Vec<String>,
    /// Classified entries in key order, with their paths anchored.
    pub config_templates: Vec<(String, ConfigTemplateEntry)>,
}

impl PackFields {
    /// Resolve the packaging fields of `config`. `None` when `auto_pack` is
    /// off.
    pub fn resolve(
        config: &ComponentConfig,
        component: &str,
        ctx: &PackContext,
    ) -> Result<Option<Self>> {
        if !auto_pack(config) {
            return Ok(None);
        }
        check_required(config, component, PACK_FIELDS)?;
        if config.source_package_type.is_some() {
            check_required(config, component, PACKAGING_FIELDS)?;
        }

        let base = ctx.base_dir();
        let name = required(&config.name, component, Field::Name)?.clone();
        let sources_path = anchor(base, required(&config.sources_path, component, Field::SourcesPath)?);
        let package_path = anchor(base, required(&config.package_path, component, Field::PackagePath)?);
        let tmp_package_path = package_path.join(ARCHIVES_DIR);
        check_layout(component, &sources_path, &package_path, &tmp_package_path)?;

        let packaging = match (
            &config.source_package_type,
            &config.destination_package_type,
            &config.version,
        ) {
            (Some(source_type), Some(destination_type), Some(version)) => Some(Packaging {
                source_type: source_type.clone(),
                destination_type: destination_type.clone(),
                version: version.clone(),
            }),
            _ => None,
        };

        let config_templates = match &config.config_templates {
            Some(entries) => entries
                .iter()
                .map(|(key, spec)| {
                    let entry = ConfigTemplateEntry::classify(component, key, spec)?;
                    Ok((key.clone(), anchor_entry(ctx, entry)))
                })
                .collect::<Result<Vec<_>>>()?,
            None => Vec::new(),
        };

        Ok(Some(Self {
            name,
            version: config.version.clone(),
            sources_path,
            package_path,
            tmp_package_path,
            overwrite: flag_or_default(config, Field::OverwritePackage, PACK_FIELDS),
            packaging,
            destination_type: config.destination_package_type.clone(),
            bootstrap_template: config
                .bootstrap_template_path
                .as_deref()
                .map(|p| template_location(ctx, p)),
            bootstrap_script: config
                .bootstrap_script_path
                .as_deref()
                .map(|p| anchor(base, p)),
            bootstrap_script_in_package: config
                .bootstrap_script_in_package_path
                .as_deref()
                .map(|p| anchor(base, p)),
            depends: list(&config.depends),
            config_templates,
        }))
    }
}

/// Reject layouts where packaging would delete the acquired sources: the
/// temporary directory is reset and `<package_path>/<name>*` files are purged.
fn check_layout(
    component: &str,
    sources_path: &Path,
    package_path: &Path,
    tmp_package_path: &Path,
) -> Result<()> {
    let collision = if sources_path.starts_with(tmp_package_path) {
        "lies inside the temporary packaging directory"
    } else if sources_path == package_path {
        "is the package output directory"
    } else {
        return Ok(());
    };
    tracing::error!("source and destination paths must be different to avoid conflicts");
    Err(Error::invalid(
        component,
        format!("sources_path '{}' {collision}", sources_path.display()),
    ))
}

fn anchor_entry(ctx: &PackContext, entry: ConfigTemplateEntry) -> ConfigTemplateEntry {
    let base = ctx.base_dir();
    match entry {
        ConfigTemplateEntry::TemplateFile {
            config_dir,
            template,
            output_file,
        } => ConfigTemplateEntry::TemplateFile {
            config_dir,
            template: template_location(ctx, &template),
            output_file,
        },
        ConfigTemplateEntry::TemplateDir {
            config_dir,
            templates,
        } => ConfigTemplateEntry::TemplateDir {
            config_dir,
            templates: anchor(base, &templates),
        },
        ConfigTemplateEntry::StaticFiles { config_dir, files } => {
            ConfigTemplateEntry::StaticFiles {
                config_dir,
                files: anchor(base, &files),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::ConfigTemplateSpec;
    use crate::error::ErrorKind;
    use crate::process::testing::{context, RecordingRunner};
    use std::collections::BTreeMap;
    use std::sync::Arc;

    fn ctx() -> PackContext {
        context(&Arc::new(RecordingRunner::new()), Path::new("/work"))
    }

    fn packable() -> ComponentConfig {
        ComponentConfig {
            name: Some("nginx".into()),
            sources_path: Some("/packages/nginx".into()),
            package_path: Some("/packages".into()),
            ..Default::default()
        }
    }

    #[test]
    fn test_acquire_defaults() {
        let config = ComponentConfig {
            sources_path: Some("sources".into()),
            package_path: Some("/packages".into()),
            ..Default::default()
        };
        let fields = AcquireFields::resolve(&config, "nginx", &ctx())
            .unwrap()
            .unwrap();

        assert!(fields.overwrite);
        assert_eq!(fields.sources_path, PathBuf::from("/work/sources"));
        assert_eq!(fields.tmp_package_path, Some(PathBuf::from("/packages/archives")));
        assert!(fields.source_urls.is_empty());
        assert!(fields.gems.is_empty());
    }

    #[test]
    fn test_acquire_disabled() {
        let config = ComponentConfig {
            auto_get: Some(false),
            ..Default::default()
        };
        assert_eq!(AcquireFields::resolve(&config, "nginx", &ctx()).unwrap(), None);
    }

    #[test]
    fn test_acquire_missing_required_field() {
        let config = ComponentConfig {
            package_path: Some("/packages".into()),
            ..Default::default()
        };
        let err = AcquireFields::resolve(&config, "nginx", &ctx()).unwrap_err();
        assert!(matches!(
            err,
            Error::MissingField { field: "sources_path", .. }
        ));
    }

    #[test]
    fn test_overwrite_can_be_disabled() {
        let config = ComponentConfig {
            overwrite_sources: Some(false),
            overwrite_package: Some(false),
            ..packable()
        };
        let acquire = AcquireFields::resolve(&config, "nginx", &ctx()).unwrap().unwrap();
        let pack = PackFields::resolve(&config, "nginx", &ctx()).unwrap().unwrap();
        assert!(!acquire.overwrite);
        assert!(!pack.overwrite);
    }

    #[test]
    fn test_pack_requires_name() {
        let config = ComponentConfig {
            name: None,
            ..packable()
        };
        let err = PackFields::resolve(&config, "nginx", &ctx()).unwrap_err();
        assert!(matches!(err, Error::MissingField { field: "name", .. }));
    }

    #[test]
    fn test_source_package_type_requires_version_and_destination() {
        let config = ComponentConfig {
            source_package_type: Some("dir".into()),
            destination_package_type: Some("deb".into()),
            ..packable()
        };
        let err = PackFields::resolve(&config, "nginx", &ctx()).unwrap_err();
        assert!(matches!(err, Error::MissingField { field: "version", .. }));

        let config = ComponentConfig {
            source_package_type: Some("dir".into()),
            version: Some("1.0".into()),
            ..packable()
        };
        let err = PackFields::resolve(&config, "nginx", &ctx()).unwrap_err();
        assert!(matches!(
            err,
            Error::MissingField { field: "destination_package_type", .. }
        ));
    }

    #[test]
    fn test_sources_colliding_with_temp_dir_is_fatal() {
        let config = ComponentConfig {
            sources_path: Some("/packages/archives".into()),
            ..packable()
        };
        let err = PackFields::resolve(&config, "nginx", &ctx()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Configuration);
    }

    #[test]
    fn test_overlapping_layouts_are_fatal() {
        for sources in ["/packages/archives/nginx", "/packages", "/packages/"] {
            let config = ComponentConfig {
                sources_path: Some(sources.into()),
                ..packable()
            };
            let err = PackFields::resolve(&config, "nginx", &ctx()).unwrap_err();
            assert!(
                matches!(err, Error::InvalidConfig { .. }),
                "{sources} should be rejected"
            );
        }
    }

    #[test]
    fn test_sources_beside_packages_are_accepted() {
        for sources in ["/packages/nginx", "/packages/archives-old", "/srv/nginx"] {
            let config = ComponentConfig {
                sources_path: Some(sources.into()),
                ..packable()
            };
            assert!(PackFields::resolve(&config, "nginx", &ctx()).unwrap().is_some());
        }
    }

    #[test]
    fn test_pack_paths_are_anchored() {
        let mut templates = BTreeMap::new();
        templates.insert(
            "__template_file".to_string(),
            ConfigTemplateSpec {
                config_dir: Some("config".into()),
                template: Some("nginx.conf.template".into()),
                ..Default::default()
            },
        );
        templates.insert(
            "__config_dir".to_string(),
            ConfigTemplateSpec {
                config_dir: Some("www".into()),
                files: Some("static".into()),
                ..Default::default()
            },
        );
        let config = ComponentConfig {
            bootstrap_template_path: Some("bootstrap.sh.template".into()),
            bootstrap_script_path: Some("scripts/bootstrap.sh".into()),
            config_templates: Some(templates),
            ..packable()
        };

        let fields = PackFields::resolve(&config, "nginx", &ctx()).unwrap().unwrap();
        assert_eq!(
            fields.bootstrap_template,
            Some(PathBuf::from("/work/package-templates/bootstrap.sh.template"))
        );
        assert_eq!(
            fields.bootstrap_script,
            Some(PathBuf::from("/work/scripts/bootstrap.sh"))
        );
        let keys: Vec<&str> = fields.config_templates.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(keys, ["__config_dir", "__template_file"]);
        assert_eq!(
            fields.config_templates[0].1,
            ConfigTemplateEntry::StaticFiles {
                config_dir: "www".into(),
                files: "/work/static".into(),
            }
        );
        assert!(fields.packaging.is_none());
    }

    #[test]
    fn test_resolution_leaves_config_untouched() {
        let config = ComponentConfig {
            source_package_type: Some("dir".into()),
            destination_package_type: Some("deb".into()),
            version: Some("1.0".into()),
            ..packable()
        };
        let before = config.clone();
        let fields = PackFields::resolve(&config, "nginx", &ctx()).unwrap().unwrap();
        assert_eq!(config, before);
        assert_eq!(
            fields.packaging,
            Some(Packaging {
                source_type: "dir".into(),
                destination_type: "deb".into(),
                version: "1.0".into(),
            })
        );
    }

    #[test]
    fn test_template_location() {
        let ctx = ctx();
        assert_eq!(
            template_location(&ctx, Path::new("a.template")),
            PathBuf::from("/work/package-templates/a.template")
        );
        assert_eq!(
            template_location(&ctx, Path::new("tpl/a.template")),
            PathBuf::from("/work/tpl/a.template")
        );
        assert_eq!(
            template_location(&ctx, Path::new("/abs/a.template")),
            PathBuf::from("/abs/a.template")
        );
    }
}
