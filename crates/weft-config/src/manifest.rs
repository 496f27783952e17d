//! Project manifest loading.
//!
//! The manifest is owned by the document toolchain (`_quarto.yml`); weft only
//! reads the declared root list and the citation resources from it.

use std::path::{Path, PathBuf};

use serde::Deserialize;
use serde_yaml::Value;

use crate::ConfigError;
use crate::expand::expand_home;

/// Read-only view of the project manifest.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Manifest {
    /// Declared root files, project-relative, in declaration order.
    pub roots: Vec<String>,
    /// Bibliography file, absolute.
    pub bibliography: Option<PathBuf>,
    /// Citation style file, absolute.
    pub csl: Option<PathBuf>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ManifestRaw {
    project: ProjectSection,
    bibliography: Option<Value>,
    csl: Option<Value>,
    format: Option<serde_yaml::Mapping>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ProjectSection {
    render: Vec<String>,
}

impl Manifest {
    /// Load the manifest at `path`, resolving resource paths against `project_root`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::NotFound`] when the file is missing and
    /// [`ConfigError::Manifest`] when it is not valid YAML.
    pub fn load(path: &Path, project_root: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.to_path_buf()));
        }
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content, project_root)
    }

    /// Parse manifest text.
    ///
    /// `bibliography` and `csl` are taken from the top level when present,
    /// otherwise from the first `format.<name>` mapping that declares them.
    pub fn parse(content: &str, project_root: &Path) -> Result<Self, ConfigError> {
        // An empty document deserializes as null.
        let raw: ManifestRaw = if content.trim().is_empty() {
            ManifestRaw::default()
        } else {
            serde_yaml::from_str(content)?
        };

        let mut bibliography = raw.bibliography.as_ref().and_then(path_value);
        let mut csl = raw.csl.as_ref().and_then(path_value);
        for format in raw.format.iter().flat_map(serde_yaml::Mapping::values) {
            let Some(section) = format.as_mapping() else {
                continue;
            };
            if bibliography.is_none() {
                bibliography = section.get("bibliography").and_then(path_value);
            }
            if csl.is_none() {
                csl = section.get("csl").and_then(path_value);
            }
        }

        let resolve = |value: String| {
            let path = expand_home(&value);
            if path.is_absolute() {
                path
            } else {
                project_root.join(path)
            }
        };

        Ok(Self {
            roots: raw
                .project
                .render
                .into_iter()
                .map(|root| root.trim_start_matches("./").to_owned())
                .collect(),
            bibliography: bibliography.map(resolve),
            csl: csl.map(resolve),
        })
    }
}

/// A single path, or the first entry of a list of paths.
fn path_value(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Sequence(items) => items.first().and_then(Value::as_str).map(str::to_owned),
        _ => None,
    }
}
