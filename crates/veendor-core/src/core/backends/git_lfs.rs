//! Bundles committed to a git repository (usually LFS-tracked), one tag per
//! fingerprint.
//!
//! The clone lives in the backend's cache directory and survives between
//! runs, so only new tags and the requested LFS object are fetched.

use std::{path::Path, sync::Arc};

use anyhow::{anyhow, Context};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

use super::{parse_compression, parse_options, Backend, BackendError, BackendTools, InvalidOptions};
use crate::core::{
    archive::{bundle_file_name, create_bundle, extract_bundle, Compression},
    runtime::process::ProcessError,
    vcs::{Git, GitError},
};

pub const KIND: &str = "git-lfs";
const REMOTE: &str = "origin";
const DEFAULT_BRANCH: &str = "master";

pub fn tag_name(hash: &str) -> String {
    format!("veendor-{hash}")
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct RawGitLfsOptions {
    repo: Option<String>,
    compression: Option<String>,
    default_branch: Option<String>,
    #[serde(default)]
    check_lfs_availability: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GitLfsOptions {
    pub repo: String,
    pub compression: Compression,
    pub default_branch: String,
    /// Fail early with a clear message when `git lfs` is not installed.
    pub check_lfs_availability: bool,
}

pub fn validate_options(raw: &Value) -> Result<GitLfsOptions, InvalidOptions> {
    let raw: RawGitLfsOptions = parse_options(raw)?;
    let repo = raw
        .repo
        .filter(|repo| !repo.trim().is_empty())
        .ok_or_else(|| InvalidOptions::new("`repo` is required"))?;
    let default_branch = raw
        .default_branch
        .unwrap_or_else(|| DEFAULT_BRANCH.to_string());
    if default_branch.trim().is_empty() || default_branch.starts_with('-') {
        return Err(InvalidOptions::new(format!(
            "`defaultBranch` `{default_branch}` is not a valid branch name"
        )));
    }
    Ok(GitLfsOptions {
        repo,
        compression: parse_compression(raw.compression.as_deref())?,
        default_branch,
        check_lfs_availability: raw.check_lfs_availability,
    })
}

pub(crate) fn create(raw: &Value) -> Result<Arc<dyn Backend>, InvalidOptions> {
    Ok(Arc::new(GitLfsBackend::new(validate_options(raw)?, Git::new())))
}

#[derive(Debug)]
pub struct GitLfsBackend {
    options: GitLfsOptions,
    git: Git,
}

impl GitLfsBackend {
    pub fn new(options: GitLfsOptions, git: Git) -> Self {
        Self { options, git }
    }

    async fn ensure_lfs(&self, clone: &Path) -> anyhow::Result<()> {
        if !self.options.check_lfs_availability {
            return Ok(());
        }
        match self.git.run(clone, &["lfs", "version"]).await {
            Ok(_) => Ok(()),
            Err(err) => Err(anyhow::Error::new(err)
                .context("git-lfs is not available; install it or disable checkLfsAvailability")),
        }
    }

    /// Clones into `clone` on first use, otherwise refreshes tags and branches.
    async fn sync_clone(&self, clone: &Path) -> anyhow::Result<()> {
        let git_dir = clone.join(".git");
        let cloned = tokio::fs::try_exists(&git_dir)
            .await
            .with_context(|| format!("checking {}", git_dir.display()))?;
        if cloned {
            self.git
                .run(clone, &["fetch", "--tags", "--force", "--prune", REMOTE])
                .await
                .with_context(|| format!("fetching {}", self.options.repo))?;
            return Ok(());
        }
        // Leftovers from an interrupted clone.
        let leftover = tokio::fs::try_exists(clone)
            .await
            .with_context(|| format!("checking {}", clone.display()))?;
        if leftover {
            tokio::fs::remove_dir_all(clone)
                .await
                .with_context(|| format!("removing {}", clone.display()))?;
        }
        let parent = clone
            .parent()
            .ok_or_else(|| anyhow!("cache directory {} has no parent", clone.display()))?;
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("creating {}", parent.display()))?;
        let target = clone.to_string_lossy();
        self.git
            .run_with_env(
                parent,
                &["clone", "--no-checkout", &self.options.repo, &target],
                &[("GIT_LFS_SKIP_SMUDGE", "1")],
            )
            .await
            .with_context(|| format!("cloning {}", self.options.repo))?;
        Ok(())
    }

    async fn has_tag(&self, clone: &Path, tag: &str) -> Result<bool, ProcessError> {
        let reference = format!("refs/tags/{tag}");
        self.git
            .check(clone, &["rev-parse", "--quiet", "--verify", &reference])
            .await
    }

    async fn checkout_default_branch(&self, clone: &Path) -> anyhow::Result<()> {
        let branch = self.options.default_branch.as_str();
        let upstream = format!("{REMOTE}/{branch}");
        let upstream = upstream.as_str();
        let has_upstream = self
            .git
            .check(clone, &["rev-parse", "--quiet", "--verify", upstream])
            .await?;
        let args = if has_upstream {
            vec!["checkout", "--force", "-B", branch, upstream]
        } else {
            vec!["checkout", "--force", "--orphan", branch]
        };
        self.git
            .run_with_env(clone, &args, &[("GIT_LFS_SKIP_SMUDGE", "1")])
            .await
            .with_context(|| format!("checking out {branch}"))?;
        Ok(())
    }
}

#[async_trait]
impl Backend for GitLfsBackend {
    fn kind(&self) -> &'static str {
        KIND
    }

    fn keep_cache(&self) -> bool {
        true
    }

    async fn pull(&self, hash: &str, tools: &BackendTools<'_>) -> Result<(), BackendError> {
        let clone = tools.cache_dir.join("repo");
        let tag = tag_name(hash);
        let reporter = tools
            .progress
            .spinner(format!("[{}] fetching {}", tools.alias, self.options.repo));
        self.ensure_lfs(tools.cache_dir).await?;
        self.sync_clone(&clone).await?;
        if !self.has_tag(&clone, &tag).await.map_err(anyhow::Error::new)? {
            return Err(BackendError::not_found(hash));
        }

        let file = bundle_file_name(hash, self.options.compression);
        self.git
            .run_with_env(
                &clone,
                &["checkout", "--force", &tag],
                &[("GIT_LFS_SKIP_SMUDGE", "1")],
            )
            .await
            .with_context(|| format!("checking out {tag}"))?;
        let include = format!("--include={file}");
        self.git
            .run(&clone, &["lfs", "pull", REMOTE, &include])
            .await
            .with_context(|| format!("downloading {file} via git-lfs"))?;

        let archive = clone.join(&file);
        let present = tokio::fs::try_exists(&archive)
            .await
            .with_context(|| format!("checking {}", archive.display()))?;
        if !present {
            return Err(anyhow!("tag {tag} does not contain {file}").into());
        }
        extract_bundle(&archive, tools.project_dir, self.options.compression).await?;
        reporter.finish(format!("[{}] pulled {hash}", tools.alias));
        Ok(())
    }

    async fn push(&self, hash: &str, tools: &BackendTools<'_>) -> Result<(), BackendError> {
        let clone = tools.cache_dir.join("repo");
        let tag = tag_name(hash);
        self.ensure_lfs(tools.cache_dir).await?;
        self.sync_clone(&clone).await?;
        if self.has_tag(&clone, &tag).await.map_err(anyhow::Error::new)? {
            return Err(BackendError::already_exists(hash));
        }
        self.checkout_default_branch(&clone).await?;

        let file = bundle_file_name(hash, self.options.compression);
        let reporter = tools
            .progress
            .spinner(format!("[{}] committing {file}", tools.alias));
        create_bundle(tools.project_dir, &clone.join(&file), self.options.compression).await?;
        let message = format!("veendor bundle {hash}");
        for args in [
            vec!["add", "--", file.as_str()],
            vec!["commit", "--quiet", "-m", message.as_str()],
            vec!["tag", tag.as_str()],
        ] {
            self.git
                .run(&clone, &args)
                .await
                .with_context(|| format!("git {}", args.join(" ")))?;
        }

        let reference = format!("refs/tags/{tag}");
        match self.git.push_ref(&clone, REMOTE, &reference).await {
            Ok(()) => {}
            Err(err) => {
                // Drop the local tag so the next fetch sees the remote one.
                let _ = self.git.run(&clone, &["tag", "-d", &tag]).await;
                return Err(match err {
                    GitError::RefAlreadyExists { .. } => BackendError::already_exists(hash),
                    GitError::Process(err) => {
                        anyhow::Error::new(err).context(format!("pushing {tag}")).into()
                    }
                });
            }
        }
        let branch = self.options.default_branch.as_str();
        if let Err(err) = self.git.run(&clone, &["push", REMOTE, branch]).await {
            warn!(%branch, error = %err, "bundle tag pushed but branch update failed");
        }
        debug!(%tag, "published");
        reporter.finish(format!("[{}] pushed {hash}", tools.alias));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn repo_is_required() {
        let err = validate_options(&json!({"compression": "xz"})).unwrap_err();
        assert!(err.0.contains("repo"));
    }

    #[test]
    fn defaults_apply() {
        let options = validate_options(&json!({"repo": "git@example.com:org/bundles.git"})).unwrap();
        assert_eq!(options.default_branch, "master");
        assert_eq!(options.compression, Compression::Gzip);
        assert!(!options.check_lfs_availability);
    }

    #[test]
    fn branch_must_not_look_like_a_flag() {
        assert!(validate_options(&json!({"repo": "r", "defaultBranch": "--force"})).is_err());
    }

    #[test]
    fn cache_survives_between_runs() {
        let backend = create(&json!({"repo": "r"})).unwrap();
        assert!(backend.keep_cache());
        assert_eq!(backend.kind(), "git-lfs");
    }

    #[test]
    fn tags_are_prefixed() {
        assert_eq!(tag_name("abc"), "veendor-abc");
    }
}
