use std::path::PathBuf;

use veendor_domain::{LockfileError, ManifestError};

use crate::core::config::ConfigError;
use crate::core::runtime::process::ProcessError;
use crate::core::tooling::diagnostics::reasons;
use crate::core::vcs::VcsError;

#[derive(Debug, thiserror::Error)]
pub enum InstallError {
    #[error("{} already exists", .path.display())]
    NodeModulesAlreadyExist { path: PathBuf },
    #[error("package.json not found in {}", .dir.display())]
    PkgJsonNotFound { dir: PathBuf },
    #[error("invalid package.json: {0}")]
    Manifest(#[source] ManifestError),
    #[error(transparent)]
    Lockfile(#[from] LockfileError),
    #[error("git history lookup is enabled but {} is not a git repository", .dir.display())]
    NotAGitRepo { dir: PathBuf },
    #[error("no backend has a bundle for {hash}")]
    BundlesNotFound { hash: String },
    #[error("bundle {hash} already exists on backend `{alias}`")]
    BundleAlreadyExists { alias: String, hash: String },
    #[error("backend `{alias}` failed: {source:#}")]
    Backend {
        alias: String,
        #[source]
        source: anyhow::Error,
    },
    #[error(transparent)]
    Process(#[from] ProcessError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("git history lookup failed: {0}")]
    Vcs(#[from] VcsError),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl From<ManifestError> for InstallError {
    fn from(err: ManifestError) -> Self {
        match err {
            ManifestError::NotFound { path } => Self::PkgJsonNotFound {
                dir: path
                    .parent()
                    .map(PathBuf::from)
                    .unwrap_or_else(|| PathBuf::from(".")),
            },
            other => Self::Manifest(other),
        }
    }
}

impl InstallError {
    /// Stable machine-readable identifier for `--json` output.
    pub fn reason(&self) -> &'static str {
        match self {
            Self::NodeModulesAlreadyExist { .. } => reasons::NODE_MODULES_EXIST,
            Self::PkgJsonNotFound { .. } => reasons::MANIFEST_MISSING,
            Self::Manifest(_) | Self::Lockfile(_) => reasons::MANIFEST_INVALID,
            Self::NotAGitRepo { .. } => reasons::NOT_A_GIT_REPO,
            Self::BundlesNotFound { .. } => reasons::BUNDLES_NOT_FOUND,
            Self::BundleAlreadyExists { .. } => reasons::PUBLISH_RACE,
            Self::Backend { .. } => reasons::BACKEND_FAILED,
            Self::Process(_) => reasons::PROCESS_FAILED,
            Self::Config(_) => reasons::CONFIG_INVALID,
            Self::Vcs(_) => reasons::GIT_FAILED,
            Self::Other(_) => reasons::INTERNAL,
        }
    }

    pub fn hint(&self) -> Option<&'static str> {
        match self {
            Self::NodeModulesAlreadyExist { .. } => {
                Some("remove node_modules or rerun with --force")
            }
            Self::PkgJsonNotFound { .. } => Some("run veendor from the directory holding package.json"),
            Self::NotAGitRepo { .. } => {
                Some("run inside a git checkout or drop `useGitHistory` from the config")
            }
            Self::BundlesNotFound { .. } => {
                Some("enable `fallbackToNpm` or publish a bundle from a machine that can install")
            }
            Self::BundleAlreadyExists { .. } => {
                Some("another run published the same bundle twice; rerun or mark the backend `pushMayFail`")
            }
            Self::Config(_) => Some("fix .veendor.json and rerun"),
            _ => None,
        }
    }

    /// Problems the user can fix by changing their checkout or config.
    pub fn is_user_error(&self) -> bool {
        matches!(
            self,
            Self::NodeModulesAlreadyExist { .. }
                | Self::PkgJsonNotFound { .. }
                | Self::Manifest(_)
                | Self::Lockfile(_)
                | Self::NotAGitRepo { .. }
                | Self::BundlesNotFound { .. }
                | Self::Config(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_manifest_is_distinguished_from_bad_manifest() {
        let missing: InstallError = ManifestError::NotFound {
            path: PathBuf::from("/work/app/package.json"),
        }
        .into();
        assert!(
            matches!(&missing, InstallError::PkgJsonNotFound { dir } if dir == &PathBuf::from("/work/app"))
        );
        assert_eq!(missing.reason(), reasons::MANIFEST_MISSING);

        let invalid: InstallError = ManifestError::NoDependencies.into();
        assert_eq!(invalid.reason(), reasons::MANIFEST_INVALID);
    }

    #[test]
    fn precondition_errors_have_distinct_reasons() {
        let exists = InstallError::NodeModulesAlreadyExist {
            path: PathBuf::from("node_modules"),
        };
        let not_repo = InstallError::NotAGitRepo {
            dir: PathBuf::from("."),
        };
        assert_ne!(exists.reason(), not_repo.reason());
        assert!(exists.is_user_error() && not_repo.is_user_error());
        assert!(exists.hint().is_some() && not_repo.hint().is_some());
    }

    #[test]
    fn backend_failures_are_not_user_errors() {
        let err = InstallError::Backend {
            alias: "s3".to_string(),
            source: anyhow::anyhow!("access denied"),
        };
        assert!(!err.is_user_error());
        assert_eq!(err.to_string(), "backend `s3` failed: access denied");
    }
}
