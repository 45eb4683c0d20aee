use std::{
    fs, io,
    path::{Path, PathBuf},
    str::FromStr,
};

use indexmap::IndexMap;
use serde_json::Value;

pub const MANIFEST_FILE: &str = "package.json";
pub const NODE_MODULES: &str = "node_modules";

/// Declared dependency set of a project.
///
/// `None` means the key is absent from the manifest, which is distinct from a
/// present-but-empty mapping and hashes differently.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DependencyManifest {
    pub dependencies: Option<IndexMap<String, String>>,
    pub dev_dependencies: Option<IndexMap<String, String>>,
}

#[derive(Debug, thiserror::Error)]
pub enum ManifestError {
    #[error("{} not found", .path.display())]
    NotFound { path: PathBuf },
    #[error("failed to read {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to parse manifest: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("manifest must be a JSON object")]
    NotAnObject,
    #[error("manifest `{section}` must map package names to version strings (bad entry `{name}`)")]
    InvalidEntry { section: &'static str, name: String },
    #[error("manifest `{section}` must be an object")]
    InvalidSection { section: &'static str },
    #[error("manifest declares neither dependencies nor devDependencies")]
    NoDependencies,
}

impl ManifestError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

impl DependencyManifest {
    pub fn read_from(path: &Path) -> Result<Self, ManifestError> {
        let contents = fs::read_to_string(path).map_err(|source| {
            if source.kind() == io::ErrorKind::NotFound {
                ManifestError::NotFound {
                    path: path.to_path_buf(),
                }
            } else {
                ManifestError::Read {
                    path: path.to_path_buf(),
                    source,
                }
            }
        })?;
        contents.parse()
    }

    pub fn from_value(value: &Value) -> Result<Self, ManifestError> {
        let object = value.as_object().ok_or(ManifestError::NotAnObject)?;
        let dependencies = read_section(object.get("dependencies"), "dependencies")?;
        let dev_dependencies = read_section(object.get("devDependencies"), "devDependencies")?;
        if dependencies.is_none() && dev_dependencies.is_none() {
            return Err(ManifestError::NoDependencies);
        }
        Ok(Self {
            dependencies,
            dev_dependencies,
        })
    }

    /// devDependencies overlaid with dependencies; a name present in both
    /// resolves to its `dependencies` version.
    pub fn merged(&self) -> IndexMap<String, String> {
        let mut merged = IndexMap::new();
        for section in [&self.dev_dependencies, &self.dependencies]
            .into_iter()
            .flatten()
        {
            for (name, version) in section {
                merged.insert(name.clone(), version.clone());
            }
        }
        merged
    }
}

impl FromStr for DependencyManifest {
    type Err = ManifestError;

    fn from_str(contents: &str) -> Result<Self, Self::Err> {
        let value: Value = serde_json::from_str(contents)?;
        Self::from_value(&value)
    }
}

fn read_section(
    value: Option<&Value>,
    section: &'static str,
) -> Result<Option<IndexMap<String, String>>, ManifestError> {
    let Some(value) = value else {
        return Ok(None);
    };
    if value.is_null() {
        return Ok(None);
    }
    let table = value
        .as_object()
        .ok_or(ManifestError::InvalidSection { section })?;
    let mut entries = IndexMap::with_capacity(table.len());
    for (name, version) in table {
        let version = version
            .as_str()
            .ok_or_else(|| ManifestError::InvalidEntry {
                section,
                name: name.clone(),
            })?;
        entries.insert(name.clone(), version.to_string());
    }
    Ok(Some(entries))
}
