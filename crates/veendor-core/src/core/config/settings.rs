use std::{
    collections::HashSet,
    env, io,
    path::{Path, PathBuf},
};

use semver::{Version, VersionReq};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;
use veendor_domain::{HashOptions, Suffix};

use super::context::is_valid_alias;
use crate::core::backends::{BackendDescriptor, BackendRegistry, InvalidOptions};
use crate::core::npm::PackageManager;
use crate::core::runtime::process::ProcessError;

pub const CONFIG_FILE: &str = ".veendor.json";
pub const VEENDOR_VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GlobalOptions {
    pub quiet: bool,
    pub verbose: u8,
    pub trace: bool,
    pub json: bool,
    pub no_color: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("config file {} not found", .path.display())]
    NotFound { path: PathBuf },
    #[error("failed to read {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("invalid config {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("`backends` must list at least one backend")]
    NoBackends,
    #[error("backend alias `{alias}` must be a plain name without `/`, `.` or `..`")]
    InvalidAlias { alias: String },
    #[error("backend alias `{alias}` is used more than once")]
    DuplicateAlias { alias: String },
    #[error("backend `{alias}` has unknown kind `{kind}` (known: {known})")]
    UnknownBackend {
        alias: String,
        kind: String,
        known: String,
    },
    #[error("backend `{alias}` has invalid options: {source}")]
    InvalidBackendOptions {
        alias: String,
        #[source]
        source: InvalidOptions,
    },
    #[error("`useGitHistory.depth` must be greater than 0 (got {depth})")]
    InvalidHistoryDepth { depth: i64 },
    #[error("`useGitHistory` requires `installDiff` to be enabled")]
    HistoryWithoutDiff,
    #[error("`{field}` is not a valid version requirement: {requirement}")]
    InvalidVersionRequirement {
        field: &'static str,
        requirement: String,
        #[source]
        source: semver::Error,
    },
    #[error("{tool} {actual} does not satisfy required version {required}")]
    VersionMismatch {
        tool: &'static str,
        required: String,
        actual: String,
    },
    #[error("could not parse {tool} version `{actual}`")]
    UnknownVersion {
        tool: &'static str,
        actual: String,
        #[source]
        source: semver::Error,
    },
    #[error("failed to query the npm version: {0}")]
    NpmVersion(#[source] ProcessError),
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawConfig {
    #[serde(default)]
    pub backends: Vec<RawBackend>,
    pub install_diff: Option<bool>,
    pub fallback_to_npm: Option<bool>,
    pub package_hash: Option<RawPackageHash>,
    pub use_git_history: Option<RawGitHistory>,
    pub veendor_version: Option<String>,
    pub npm_version: Option<String>,
    pub dedupe: Option<bool>,
    pub clear_shared_cache: Option<bool>,
    pub npm_command: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawBackend {
    pub alias: String,
    pub backend: String,
    #[serde(default)]
    pub push: bool,
    #[serde(default)]
    pub push_may_fail: bool,
    #[serde(default)]
    pub options: Value,
}

#[derive(Debug, Default, Deserialize)]
pub struct RawPackageHash {
    pub suffix: Option<RawSuffix>,
}

/// `"text"` or `{"env": "VAR"}`; the latter is read when the hash is computed.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum RawSuffix {
    Text(String),
    Env { env: String },
}

#[derive(Debug, Deserialize)]
pub struct RawGitHistory {
    pub depth: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GitHistory {
    pub depth: usize,
}

/// Validated, fully defaulted configuration. Immutable for the run.
#[derive(Debug, Clone)]
pub struct Config {
    pub backends: Vec<BackendDescriptor>,
    pub install_diff: bool,
    pub fallback_to_npm: bool,
    pub package_hash: HashOptions,
    pub use_git_history: Option<GitHistory>,
    pub npm_version: Option<VersionReq>,
    pub dedupe: bool,
    pub clear_shared_cache: bool,
    pub npm_command: String,
}

impl Config {
    /// Reads and resolves the config file at `path`.
    ///
    /// # Errors
    /// Returns a [`ConfigError`] when the file is missing or unreadable, or
    /// when any field fails validation.
    pub fn load(path: &Path, registry: &BackendRegistry) -> Result<Self, ConfigError> {
        Self::resolve(load_raw(path)?, registry)
    }

    /// Validates `raw` and fills in defaults. Performs no I/O.
    ///
    /// # Errors
    /// Returns the first validation failure found.
    pub fn resolve(raw: RawConfig, registry: &BackendRegistry) -> Result<Self, ConfigError> {
        if let Some(requirement) = raw.veendor_version.as_deref() {
            check_version("veendorVersion", "veendor", requirement, VEENDOR_VERSION)?;
        }
        let npm_version = raw
            .npm_version
            .as_deref()
            .map(|requirement| parse_requirement("npmVersion", requirement))
            .transpose()?;

        let backends = resolve_backends(raw.backends, registry)?;
        let install_diff = raw.install_diff.unwrap_or(true);
        let use_git_history = match raw.use_git_history {
            None => None,
            Some(RawGitHistory { depth }) if depth <= 0 => {
                return Err(ConfigError::InvalidHistoryDepth { depth });
            }
            Some(_) if !install_diff => return Err(ConfigError::HistoryWithoutDiff),
            Some(RawGitHistory { depth }) => Some(GitHistory {
                depth: usize::try_from(depth)
                    .map_err(|_| ConfigError::InvalidHistoryDepth { depth })?,
            }),
        };
        let package_hash = match raw.package_hash.and_then(|hash| hash.suffix) {
            None => HashOptions::default(),
            Some(RawSuffix::Text(text)) => HashOptions::with_suffix(Suffix::Literal(text)),
            Some(RawSuffix::Env { env: var }) => HashOptions::with_suffix(Suffix::computed(
                move || env::var(&var).unwrap_or_default(),
            )),
        };

        Ok(Self {
            backends,
            install_diff,
            fallback_to_npm: raw.fallback_to_npm.unwrap_or(true),
            package_hash,
            use_git_history,
            npm_version,
            dedupe: raw.dedupe.unwrap_or(false),
            clear_shared_cache: raw.clear_shared_cache.unwrap_or(false),
            npm_command: raw
                .npm_command
                .filter(|command| !command.trim().is_empty())
                .unwrap_or_else(|| "npm".to_string()),
        })
    }

    /// Verifies the installed npm against `npmVersion`, if one is configured.
    ///
    /// # Errors
    /// Returns [`ConfigError::VersionMismatch`] when the requirement is not
    /// met, or an error when `npm --version` cannot be run or parsed.
    pub async fn check_npm_version(
        &self,
        npm: &dyn PackageManager,
        dir: &Path,
    ) -> Result<(), ConfigError> {
        let Some(requirement) = &self.npm_version else {
            return Ok(());
        };
        let actual = npm.version(dir).await.map_err(ConfigError::NpmVersion)?;
        debug!(npm = %actual, required = %requirement, "checking npm version");
        let version = Version::parse(&actual).map_err(|source| ConfigError::UnknownVersion {
            tool: "npm",
            actual: actual.clone(),
            source,
        })?;
        if requirement.matches(&version) {
            Ok(())
        } else {
            Err(ConfigError::VersionMismatch {
                tool: "npm",
                required: requirement.to_string(),
                actual,
            })
        }
    }
}

pub fn load_raw(path: &Path) -> Result<RawConfig, ConfigError> {
    let contents = std::fs::read_to_string(path).map_err(|source| {
        if source.kind() == io::ErrorKind::NotFound {
            ConfigError::NotFound {
                path: path.to_path_buf(),
            }
        } else {
            ConfigError::Read {
                path: path.to_path_buf(),
                source,
            }
        }
    })?;
    serde_json::from_str(&contents).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

fn resolve_backends(
    raw: Vec<RawBackend>,
    registry: &BackendRegistry,
) -> Result<Vec<BackendDescriptor>, ConfigError> {
    if raw.is_empty() {
        return Err(ConfigError::NoBackends);
    }
    let mut seen = HashSet::new();
    let mut backends = Vec::with_capacity(raw.len());
    for entry in raw {
        if !is_valid_alias(&entry.alias) {
            return Err(ConfigError::InvalidAlias { alias: entry.alias });
        }
        if !seen.insert(entry.alias.clone()) {
            return Err(ConfigError::DuplicateAlias { alias: entry.alias });
        }
        let backend = match registry.create(&entry.backend, &entry.options) {
            None => {
                return Err(ConfigError::UnknownBackend {
                    alias: entry.alias,
                    kind: entry.backend,
                    known: registry.kinds().collect::<Vec<_>>().join(", "),
                })
            }
            Some(Err(source)) => {
                return Err(ConfigError::InvalidBackendOptions {
                    alias: entry.alias,
                    source,
                })
            }
            Some(Ok(backend)) => backend,
        };
        backends.push(
            BackendDescriptor::new(entry.alias, backend)
                .with_push(entry.push)
                .with_push_may_fail(entry.push_may_fail),
        );
    }
    Ok(backends)
}

fn parse_requirement(field: &'static str, requirement: &str) -> Result<VersionReq, ConfigError> {
    VersionReq::parse(requirement).map_err(|source| ConfigError::InvalidVersionRequirement {
        field,
        requirement: requirement.to_string(),
        source,
    })
}

fn check_version(
    field: &'static str,
    tool: &'static str,
    requirement: &str,
    actual: &str,
) -> Result<(), ConfigError> {
    let parsed = parse_requirement(field, requirement)?;
    let version = Version::parse(actual).map_err(|source| ConfigError::UnknownVersion {
        tool,
        actual: actual.to_string(),
        source,
    })?;
    if parsed.matches(&version) {
        Ok(())
    } else {
        Err(ConfigError::VersionMismatch {
            tool,
            required: requirement.to_string(),
            actual: actual.to_string(),
        })
    }
}
