use futures::stream::{FuturesUnordered, StreamExt};
use tracing::{info, warn};

use super::pull::{backend_failure, prepare_cache, release_cache};
use super::InstallError;
use crate::core::backends::{BackendDescriptor, BackendError, BackendTools};
use crate::core::config::InstallContext;

/// Why the publish phase did not complete.
#[derive(Debug)]
pub(crate) enum PushFailure {
    /// Someone else published this hash first; pull it instead.
    RePullNeeded { alias: String, hash: String },
    Fatal(InstallError),
}

/// Publishes `hash` to every target concurrently and returns the aliases
/// that accepted it.
///
/// Every push runs to completion even after one fails; the first fatal
/// failure in completion order is reported.
pub(crate) async fn push_backends(
    ctx: &InstallContext,
    hash: &str,
    targets: &[&BackendDescriptor],
    re_pull: bool,
) -> Result<Vec<String>, PushFailure> {
    let mut pending = targets
        .iter()
        .map(|descriptor| async move {
            let result = push_one(ctx, descriptor, hash).await;
            (*descriptor, result)
        })
        .collect::<FuturesUnordered<_>>();

    let mut pushed = Vec::new();
    let mut failure = None;
    while let Some((descriptor, result)) = pending.next().await {
        let alias = descriptor.alias.as_str();
        let outcome = match result {
            Ok(()) => {
                info!(backend = alias, %hash, "bundle pushed");
                pushed.push(descriptor.alias.clone());
                continue;
            }
            Err(err) if descriptor.push_may_fail => {
                warn!(backend = alias, error = %err, "push failed; continuing because pushMayFail is set");
                continue;
            }
            Err(BackendError::BundleAlreadyExists { .. }) if !re_pull => {
                PushFailure::RePullNeeded {
                    alias: alias.to_string(),
                    hash: hash.to_string(),
                }
            }
            Err(BackendError::BundleAlreadyExists { .. }) => {
                PushFailure::Fatal(InstallError::BundleAlreadyExists {
                    alias: alias.to_string(),
                    hash: hash.to_string(),
                })
            }
            Err(BackendError::BundleNotFound { .. }) => PushFailure::Fatal(backend_failure(
                alias,
                anyhow::anyhow!("push reported a missing bundle"),
            )),
            Err(BackendError::Other(source)) => PushFailure::Fatal(backend_failure(alias, source)),
        };
        if failure.is_none() {
            failure = Some(outcome);
        } else {
            warn!(backend = alias, "additional push failure ignored");
        }
    }

    match failure {
        Some(failure) => Err(failure),
        None => Ok(pushed),
    }
}

async fn push_one(
    ctx: &InstallContext,
    descriptor: &BackendDescriptor,
    hash: &str,
) -> Result<(), BackendError> {
    let cache = prepare_cache(ctx, descriptor).await?;
    let tools = BackendTools {
        alias: &descriptor.alias,
        project_dir: ctx.project_dir(),
        cache_dir: &cache,
        progress: ctx.progress(),
    };
    let result = descriptor.backend.push(hash, &tools).await;
    release_cache(descriptor, &cache).await;
    result
}
