//! Looking for a bundle of an older manifest revision.

use std::path::PathBuf;

use serde_json::Value;
use tracing::{debug, info, warn};
use veendor_domain::{compute_fingerprint, DependencyManifest};

use super::pull::{pull_backends, PullOutcome};
use super::InstallError;
use crate::core::config::{GitHistory, InstallContext};
use crate::core::vcs::VcsError;

/// An older bundle that was pulled into the project.
#[derive(Debug)]
pub(crate) struct HistoryHit {
    pub manifest: DependencyManifest,
    pub hash: String,
    pub backend: usize,
    pub age: usize,
}

/// Walks back through committed revisions of the manifest (and lockfile),
/// pulling the first older fingerprint any backend has.
///
/// A revision whose fingerprint equals the one tried just before it does
/// not count against `depth`. Returns `None` once the window is exhausted or
/// history runs out.
pub(crate) async fn pull_from_history(
    ctx: &InstallContext,
    history: GitHistory,
    hash: &str,
    lockfile: Option<PathBuf>,
) -> Result<Option<HistoryHit>, InstallError> {
    let paths = [Some(ctx.manifest_path()), lockfile];
    let mut depth = history.depth;
    let mut last_hash = hash.to_string();
    let mut age = 0;

    loop {
        age += 1;
        if age > depth {
            debug!(depth, "history window exhausted");
            return Ok(None);
        }

        let contents = match ctx.vcs().older_revision(ctx.project_dir(), &paths, age).await {
            Ok(contents) => contents,
            Err(VcsError::TooOldRevision { available, .. }) => {
                debug!(age, available, "ran out of history");
                return Ok(None);
            }
            Err(err) => return Err(err.into()),
        };
        let Some((manifest, lockfile)) = parse_revision(&contents, age) else {
            continue;
        };

        let old_hash = compute_fingerprint(
            &manifest,
            lockfile.as_ref(),
            &ctx.config().package_hash,
        );
        if old_hash == last_hash {
            depth += 1;
            debug!(age, depth, "revision does not change the fingerprint");
            continue;
        }
        info!(age, hash = %old_hash, "trying older fingerprint");
        last_hash.clone_from(&old_hash);

        if let PullOutcome::Hit(backend) = pull_backends(ctx, &old_hash).await? {
            return Ok(Some(HistoryHit {
                manifest,
                hash: old_hash,
                backend,
                age,
            }));
        }
    }
}

/// A revision that cannot be understood is skipped; it still uses up one
/// step of the window.
fn parse_revision(
    contents: &[Option<String>],
    age: usize,
) -> Option<(DependencyManifest, Option<Value>)> {
    let Some(Some(raw_manifest)) = contents.first() else {
        warn!(age, "package.json is missing at this revision");
        return None;
    };
    let manifest = match raw_manifest.parse::<DependencyManifest>() {
        Ok(manifest) => manifest,
        Err(err) => {
            warn!(age, error = %err, "skipping unparseable package.json revision");
            return None;
        }
    };
    let lockfile = match contents.get(1).and_then(Option::as_deref) {
        None => None,
        Some(raw) => match serde_json::from_str::<Value>(raw) {
            Ok(value) => Some(value),
            Err(err) => {
                warn!(age, error = %err, "skipping unparseable lockfile revision");
                return None;
            }
        },
    };
    Some((manifest, lockfile))
}
