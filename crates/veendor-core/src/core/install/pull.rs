use std::path::{Path, PathBuf};

use anyhow::Context;
use tracing::{debug, info};

use super::InstallError;
use crate::core::backends::{BackendDescriptor, BackendError, BackendTools};
use crate::core::config::InstallContext;

/// Where a pull landed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PullOutcome {
    /// Index of the first backend that had the bundle; all earlier ones missed.
    Hit(usize),
    Missed,
}

/// Fresh scratch directory for one backend call. Backends that keep their
/// cache get the existing directory back untouched.
pub(crate) async fn prepare_cache(
    ctx: &InstallContext,
    descriptor: &BackendDescriptor,
) -> anyhow::Result<PathBuf> {
    let dir = ctx.cache_dir(&descriptor.alias).ok_or_else(|| {
        anyhow::anyhow!(
            "backend alias `{}` cannot name a cache directory",
            descriptor.alias
        )
    })?;
    let exists = tokio::fs::try_exists(&dir)
        .await
        .with_context(|| format!("checking cache {}", dir.display()))?;
    if !descriptor.backend.keep_cache() && exists {
        tokio::fs::remove_dir_all(&dir)
            .await
            .with_context(|| format!("clearing cache {}", dir.display()))?;
    }
    tokio::fs::create_dir_all(&dir)
        .await
        .with_context(|| format!("creating cache {}", dir.display()))?;
    Ok(dir)
}

pub(crate) async fn release_cache(descriptor: &BackendDescriptor, dir: &Path) {
    if descriptor.backend.keep_cache() {
        return;
    }
    if let Err(err) = tokio::fs::remove_dir_all(dir).await {
        debug!(cache = %dir.display(), error = %err, "failed to remove cache");
    }
}

/// Tries each backend in configured order until one has `hash`.
///
/// Only "not found" moves on to the next backend; any other failure aborts
/// the whole pull.
pub(crate) async fn pull_backends(
    ctx: &InstallContext,
    hash: &str,
) -> Result<PullOutcome, InstallError> {
    for (index, descriptor) in ctx.config().backends.iter().enumerate() {
        let alias = descriptor.alias.as_str();
        debug!(backend = alias, %hash, "pulling");
        let cache = prepare_cache(ctx, descriptor)
            .await
            .map_err(|source| backend_failure(alias, source))?;
        let tools = BackendTools {
            alias,
            project_dir: ctx.project_dir(),
            cache_dir: &cache,
            progress: ctx.progress(),
        };
        let result = descriptor.backend.pull(hash, &tools).await;
        release_cache(descriptor, &cache).await;
        match result {
            Ok(()) => {
                info!(backend = alias, %hash, "bundle pulled");
                return Ok(PullOutcome::Hit(index));
            }
            Err(BackendError::BundleNotFound { .. }) => {
                info!(backend = alias, %hash, "bundle not found");
            }
            Err(BackendError::BundleAlreadyExists { .. }) => {
                return Err(backend_failure(
                    alias,
                    anyhow::anyhow!("pull reported an existing bundle as a conflict"),
                ));
            }
            Err(BackendError::Other(source)) => return Err(backend_failure(alias, source)),
        }
    }
    Ok(PullOutcome::Missed)
}

pub(crate) fn backend_failure(alias: &str, source: anyhow::Error) -> InstallError {
    InstallError::Backend {
        alias: alias.to_string(),
        source,
    }
}
