use std::{
    io,
    path::{Path, PathBuf},
    sync::Arc,
};

use anyhow::Context;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use super::{parse_compression, parse_options, Backend, BackendError, BackendTools, InvalidOptions};
use crate::core::archive::{bundle_file_name, create_bundle, extract_bundle, Compression};

pub const KIND: &str = "local";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct RawLocalOptions {
    directory: Option<PathBuf>,
    compression: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalOptions {
    pub directory: PathBuf,
    pub compression: Compression,
}

pub fn validate_options(raw: &Value) -> Result<LocalOptions, InvalidOptions> {
    let raw: RawLocalOptions = parse_options(raw)?;
    let directory = raw
        .directory
        .filter(|dir| !dir.as_os_str().is_empty())
        .ok_or_else(|| InvalidOptions::new("`directory` is required"))?;
    Ok(LocalOptions {
        directory,
        compression: parse_compression(raw.compression.as_deref())?,
    })
}

pub(crate) fn create(raw: &Value) -> Result<Arc<dyn Backend>, InvalidOptions> {
    Ok(Arc::new(LocalBackend::new(validate_options(raw)?)))
}

/// Bundles kept as files in a directory, e.g. a shared network mount.
#[derive(Debug)]
pub struct LocalBackend {
    options: LocalOptions,
}

impl LocalBackend {
    pub fn new(options: LocalOptions) -> Self {
        Self { options }
    }

    fn bundle_path(&self, hash: &str) -> PathBuf {
        self.options
            .directory
            .join(bundle_file_name(hash, self.options.compression))
    }
}

#[async_trait]
impl Backend for LocalBackend {
    fn kind(&self) -> &'static str {
        KIND
    }

    async fn pull(&self, hash: &str, tools: &BackendTools<'_>) -> Result<(), BackendError> {
        let bundle = self.bundle_path(hash);
        let exists = tokio::fs::try_exists(&bundle)
            .await
            .with_context(|| format!("checking {}", bundle.display()))?;
        if !exists {
            return Err(BackendError::not_found(hash));
        }
        let reporter = tools
            .progress
            .spinner(format!("[{}] extracting {}", tools.alias, bundle.display()));
        extract_bundle(&bundle, tools.project_dir, self.options.compression).await?;
        reporter.finish(format!("[{}] pulled {hash}", tools.alias));
        Ok(())
    }

    async fn push(&self, hash: &str, tools: &BackendTools<'_>) -> Result<(), BackendError> {
        let directory = &self.options.directory;
        tokio::fs::create_dir_all(directory)
            .await
            .with_context(|| format!("creating {}", directory.display()))?;
        let bundle = self.bundle_path(hash);
        let exists = tokio::fs::try_exists(&bundle)
            .await
            .with_context(|| format!("checking {}", bundle.display()))?;
        if exists {
            return Err(BackendError::already_exists(hash));
        }

        let staging = directory.join(format!(
            ".{}.{}.partial",
            bundle_file_name(hash, self.options.compression),
            std::process::id()
        ));
        let reporter = tools
            .progress
            .spinner(format!("[{}] archiving node_modules", tools.alias));
        let archived = create_bundle(tools.project_dir, &staging, self.options.compression).await;
        if let Err(err) = archived {
            let _ = tokio::fs::remove_file(&staging).await;
            return Err(err.into());
        }

        let published = publish_exclusive(&staging, &bundle).await;
        let _ = tokio::fs::remove_file(&staging).await;
        match published {
            Ok(()) => {
                reporter.finish(format!("[{}] pushed {hash}", tools.alias));
                Ok(())
            }
            Err(err) if err.kind() == io::ErrorKind::AlreadyExists => {
                debug!(bundle = %bundle.display(), "lost publish race");
                Err(BackendError::already_exists(hash))
            }
            Err(err) => Err(anyhow::Error::new(err)
                .context(format!("publishing {}", bundle.display()))
                .into()),
        }
    }
}

/// Links the staged archive into place; fails with `AlreadyExists` if another
/// writer got there first.
async fn publish_exclusive(staging: &Path, bundle: &Path) -> io::Result<()> {
    tokio::fs::hard_link(staging, bundle).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::tooling::progress::Progress;
    use serde_json::json;
    use std::fs;
    use tempfile::tempdir;
    use veendor_domain::NODE_MODULES;

    fn tools<'a>(project: &'a Path, cache: &'a Path, progress: &'a Progress) -> BackendTools<'a> {
        BackendTools {
            alias: "local",
            project_dir: project,
            cache_dir: cache,
            progress,
        }
    }

    #[test]
    fn directory_is_required() {
        assert!(validate_options(&json!({})).is_err());
        assert!(validate_options(&Value::Null).is_err());
    }

    #[test]
    fn compression_defaults_to_gzip() {
        let options = validate_options(&json!({"directory": "/tmp/bundles"})).unwrap();
        assert_eq!(options.compression, Compression::Gzip);
        assert_eq!(options.directory, PathBuf::from("/tmp/bundles"));
    }

    #[test]
    fn unknown_compression_is_rejected() {
        let err = validate_options(&json!({"directory": "/tmp", "compression": "zip"}))
            .unwrap_err();
        assert!(err.0.contains("zip"));
    }

    #[test]
    fn unknown_keys_are_rejected() {
        assert!(validate_options(&json!({"directory": "/tmp", "bucket": "x"})).is_err());
    }

    #[tokio::test]
    async fn push_then_pull_round_trips() {
        let store = tempdir().unwrap();
        let source = tempdir().unwrap();
        let target = tempdir().unwrap();
        let cache = tempdir().unwrap();
        let progress = Progress::silent();
        let backend = LocalBackend::new(LocalOptions {
            directory: store.path().to_path_buf(),
            compression: Compression::Gzip,
        });

        let module = source.path().join(NODE_MODULES).join("dep");
        fs::create_dir_all(&module).unwrap();
        fs::write(module.join("index.js"), "exports.x = 1;").unwrap();

        backend
            .push("abc", &tools(source.path(), cache.path(), &progress))
            .await
            .unwrap();
        assert!(store.path().join("abc.tar.gz").is_file());

        backend
            .pull("abc", &tools(target.path(), cache.path(), &progress))
            .await
            .unwrap();
        let restored = target.path().join(NODE_MODULES).join("dep").join("index.js");
        assert_eq!(fs::read_to_string(restored).unwrap(), "exports.x = 1;");
    }

    #[tokio::test]
    async fn missing_bundle_is_not_found() {
        let store = tempdir().unwrap();
        let project = tempdir().unwrap();
        let progress = Progress::silent();
        let backend = LocalBackend::new(LocalOptions {
            directory: store.path().to_path_buf(),
            compression: Compression::Xz,
        });
        let err = backend
            .pull("nope", &tools(project.path(), project.path(), &progress))
            .await
            .unwrap_err();
        assert!(matches!(err, BackendError::BundleNotFound { .. }));
    }

    #[tokio::test]
    async fn second_push_reports_already_exists() {
        let store = tempdir().unwrap();
        let project = tempdir().unwrap();
        fs::create_dir_all(project.path().join(NODE_MODULES)).unwrap();
        let progress = Progress::silent();
        let backend = LocalBackend::new(LocalOptions {
            directory: store.path().to_path_buf(),
            compression: Compression::Gzip,
        });
        let tools = tools(project.path(), project.path(), &progress);
        backend.push("dup", &tools).await.unwrap();
        let err = backend.push("dup", &tools).await.unwrap_err();
        assert!(matches!(err, BackendError::BundleAlreadyExists { .. }));
        let leftovers = fs::read_dir(store.path()).unwrap().count();
        assert_eq!(leftovers, 1, "staging files must be cleaned up");
    }
}
