//! Bundle resolution: pull, walk history, fall back to npm, publish.

use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, warn};
use veendor_domain::{
    compute_fingerprint, detect_lockfile, diff_manifests, read_lockfile, DependencyManifest,
    HashOptions, MANIFEST_FILE, NODE_MODULES,
};

use crate::core::backends::BackendDescriptor;
use crate::core::config::InstallContext;
use crate::core::tooling::timings::TimingGuard;

mod error;
mod history;
mod pull;
mod push;

pub use error::InstallError;

use history::{pull_from_history, HistoryHit};
use pull::{pull_backends, PullOutcome};
use push::{push_backends, PushFailure};

#[derive(Debug, Clone, Copy, Default)]
pub struct InstallRequest {
    /// Replace an existing `node_modules` instead of refusing to run.
    pub force: bool,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BundleSource {
    /// The current fingerprint was pulled directly.
    Backend { alias: String },
    /// An older fingerprint was pulled and the difference installed on top.
    History {
        alias: String,
        hash: String,
        age: usize,
    },
    /// Nothing matched; npm installed everything.
    PackageManager,
}

#[derive(Debug, Clone, Serialize)]
pub struct InstallReport {
    pub hash: String,
    pub source: BundleSource,
    /// Backends that received the bundle.
    pub pushed: Vec<String>,
    /// Whether a lost publish race forced a second pull.
    pub re_pulled: bool,
}

/// Reads the project's manifest and lockfile.
pub(crate) struct ProjectManifest {
    pub manifest: DependencyManifest,
    pub lockfile_path: Option<PathBuf>,
    pub lockfile: Option<Value>,
}

impl ProjectManifest {
    pub(crate) fn read(project_dir: &Path) -> Result<Self, InstallError> {
        let manifest = DependencyManifest::read_from(&project_dir.join(MANIFEST_FILE))?;
        let lockfile_path = detect_lockfile(project_dir);
        let lockfile = lockfile_path.as_deref().map(read_lockfile).transpose()?;
        Ok(Self {
            manifest,
            lockfile_path,
            lockfile,
        })
    }

    pub(crate) fn fingerprint(&self, options: &HashOptions) -> String {
        compute_fingerprint(&self.manifest, self.lockfile.as_ref(), options)
    }
}

/// Fingerprint of the project in `project_dir`.
///
/// # Errors
/// Fails when package.json is missing or invalid, or a lockfile cannot be
/// parsed.
pub fn fingerprint_project(project_dir: &Path, options: &HashOptions) -> Result<String, InstallError> {
    Ok(ProjectManifest::read(project_dir)?.fingerprint(options))
}

/// Makes `node_modules` match package.json, preferring prebuilt bundles.
///
/// A lost publish race triggers exactly one forced re-run that pulls the
/// bundle the other publisher uploaded.
///
/// # Errors
/// Returns an [`InstallError`] describing the first unrecovered failure.
pub async fn install(
    ctx: &InstallContext,
    request: InstallRequest,
) -> Result<InstallReport, InstallError> {
    ctx.config()
        .check_npm_version(ctx.npm(), ctx.project_dir())
        .await?;

    match attempt(ctx, request.force, false).await {
        Ok(report) => Ok(report),
        Err(PushFailure::Fatal(err)) => Err(err),
        Err(PushFailure::RePullNeeded { alias, hash }) => {
            warn!(backend = %alias, %hash, "bundle was published concurrently; pulling it instead");
            match attempt(ctx, true, true).await {
                Ok(report) => Ok(InstallReport {
                    re_pulled: true,
                    ..report
                }),
                Err(PushFailure::Fatal(err)) => Err(err),
                Err(PushFailure::RePullNeeded { alias, hash }) => {
                    Err(InstallError::BundleAlreadyExists { alias, hash })
                }
            }
        }
    }
}

async fn attempt(
    ctx: &InstallContext,
    force: bool,
    re_pull: bool,
) -> Result<InstallReport, PushFailure> {
    let resolved = resolve(ctx, force).await.map_err(PushFailure::Fatal)?;
    let config = ctx.config();

    let targets: Vec<&BackendDescriptor> = match &resolved.source {
        // Backfill only the backends that were skipped on the way.
        BundleSource::Backend { .. } => config.backends[..resolved.first_hit]
            .iter()
            .filter(|backend| backend.push)
            .collect(),
        BundleSource::History { .. } | BundleSource::PackageManager => {
            config.backends.iter().filter(|backend| backend.push).collect()
        }
    };

    let pushed = if targets.is_empty() {
        Vec::new()
    } else {
        let _timing = TimingGuard::new("push");
        push_backends(ctx, &resolved.hash, &targets, re_pull).await?
    };
    Ok(InstallReport {
        hash: resolved.hash,
        source: resolved.source,
        pushed,
        re_pulled: re_pull,
    })
}

struct Resolved {
    hash: String,
    source: BundleSource,
    /// Index of the backend that served the bundle; backends before it missed.
    first_hit: usize,
}

async fn resolve(ctx: &InstallContext, force: bool) -> Result<Resolved, InstallError> {
    prepare_node_modules(ctx, force).await?;
    let project = ProjectManifest::read(ctx.project_dir())?;
    let config = ctx.config();
    let hash = project.fingerprint(&config.package_hash);
    info!(%hash, "resolving bundle");

    let first = {
        let _timing = TimingGuard::new("pull");
        pull_backends(ctx, &hash).await?
    };
    if let PullOutcome::Hit(index) = first {
        return Ok(Resolved {
            hash,
            source: BundleSource::Backend {
                alias: config.backends[index].alias.clone(),
            },
            first_hit: index,
        });
    }

    if let Some(history) = config.use_git_history {
        if !ctx.vcs().is_repo(ctx.project_dir()).await? {
            return Err(InstallError::NotAGitRepo {
                dir: ctx.project_dir().to_path_buf(),
            });
        }
        let hit = {
            let _timing = TimingGuard::new("history");
            pull_from_history(ctx, history, &hash, project.lockfile_path.clone()).await?
        };
        if let Some(hit) = hit {
            install_diff(ctx, &hit, &project.manifest).await?;
            return Ok(Resolved {
                hash,
                source: BundleSource::History {
                    alias: config.backends[hit.backend].alias.clone(),
                    hash: hit.hash,
                    age: hit.age,
                },
                first_hit: hit.backend,
            });
        }
    }

    if !config.fallback_to_npm {
        return Err(InstallError::BundlesNotFound { hash });
    }
    info!(%hash, "no bundle found; installing with npm");
    {
        let _timing = TimingGuard::new("npm");
        ctx.npm().install_all(ctx.project_dir()).await?;
    }
    if config.clear_shared_cache {
        debug!("clearing the shared npm cache");
        ctx.npm().clear_cache(ctx.project_dir()).await?;
    }
    Ok(Resolved {
        hash,
        source: BundleSource::PackageManager,
        first_hit: config.backends.len(),
    })
}

/// Refuses to clobber an existing `node_modules` unless forced, in which
/// case it is removed before any backend writes to the project.
async fn prepare_node_modules(ctx: &InstallContext, force: bool) -> Result<(), InstallError> {
    let path = ctx.node_modules();
    let exists = tokio::fs::try_exists(&path)
        .await
        .with_context(|| format!("checking {}", path.display()))?;
    if !exists {
        return Ok(());
    }
    if !force {
        return Err(InstallError::NodeModulesAlreadyExist { path });
    }
    debug!(path = %path.display(), "removing existing {NODE_MODULES}");
    tokio::fs::remove_dir_all(&path)
        .await
        .with_context(|| format!("removing {}", path.display()))?;
    Ok(())
}

async fn install_diff(
    ctx: &InstallContext,
    hit: &HistoryHit,
    current: &DependencyManifest,
) -> Result<(), InstallError> {
    let _timing = TimingGuard::new("npm-diff");
    let diff = diff_manifests(&hit.manifest, current);
    if diff.is_empty() {
        debug!("older bundle already matches package.json");
    } else {
        info!(
            install = diff.install.len(),
            uninstall = diff.uninstall.len(),
            "installing the difference from the older bundle"
        );
    }
    ctx.npm().uninstall(ctx.project_dir(), &diff.uninstall).await?;
    ctx.npm().install(ctx.project_dir(), &diff.install).await?;
    if ctx.config().dedupe {
        ctx.npm().dedupe(ctx.project_dir()).await?;
    }
    Ok(())
}
