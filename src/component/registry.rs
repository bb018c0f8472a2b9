//! Component registry: a TOML (or JSON) file mapping names to components.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{Error, IoResultExt, Result};

use super::ComponentConfig;

#[derive(Debug, Clone, Default)]
pub struct Registry {
    path: PathBuf,
    components: BTreeMap<String, ComponentConfig>,
}

impl Registry {
    /// Load the registry at `path`. Files ending in `.json` are parsed as
    /// JSON, everything else as TOML.
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .fs_context(|| format!("reading registry '{}'", path.display()))?;
        let is_json = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
        let components: BTreeMap<String, ComponentConfig> = if is_json {
            serde_json::from_str(&content).map_err(|e| Error::Parse {
                path: path.to_path_buf(),
                message: e.to_string(),
            })?
        } else {
            Self::parse_toml(path, &content)?
        };
        tracing::debug!("loaded {} components from {}", components.len(), path.display());
        Ok(Self {
            path: path.to_path_buf(),
            components,
        })
    }

    /// Build a registry from already parsed components.
    pub fn from_components(components: BTreeMap<String, ComponentConfig>) -> Self {
        Self {
            path: PathBuf::new(),
            components,
        }
    }

    fn parse_toml(path: &Path, content: &str) -> Result<BTreeMap<String, ComponentConfig>> {
        toml::from_str(content).map_err(|e| Error::Parse {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }

    /// Look up a component by name.
    pub fn get(&self, name: &str) -> Result<&ComponentConfig> {
        self.components.get(name).ok_or_else(|| {
            tracing::error!("package configuration for {} was not found", name);
            Error::UnknownComponent(name.to_string())
        })
    }

    /// Component names in sorted order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.components.keys().map(String::as_str)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> usize {
        self.components.len()
    }

    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }
}
