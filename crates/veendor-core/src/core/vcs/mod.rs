//! Version-control collaborator used by the history walk.

use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use tracing::debug;

use crate::core::runtime::process::ProcessError;

pub mod git;

pub use git::{Git, GitError};

#[derive(Debug, thiserror::Error)]
pub enum VcsError {
    #[error("{} is not inside a git repository", .dir.display())]
    NotARepo { dir: PathBuf },
    #[error("only {available} revision(s) touch the tracked files; revision {age} does not exist")]
    TooOldRevision { age: usize, available: usize },
    #[error("{} is outside the repository at {}", .path.display(), .root.display())]
    PathOutsideRepo { path: PathBuf, root: PathBuf },
    #[error(transparent)]
    Git(#[from] GitError),
}

impl From<ProcessError> for VcsError {
    fn from(err: ProcessError) -> Self {
        Self::Git(GitError::Process(err))
    }
}

#[async_trait]
pub trait VersionControl: Send + Sync {
    async fn is_repo(&self, dir: &Path) -> Result<bool, VcsError>;

    /// Contents of `paths` at the `age`-th most recent commit touching any of
    /// them (`age = 1` is the latest). `None` inputs stay `None`, and so do
    /// paths that did not exist at that commit.
    ///
    /// Relative paths are resolved against `dir`.
    async fn older_revision(
        &self,
        dir: &Path,
        paths: &[Option<PathBuf>],
        age: usize,
    ) -> Result<Vec<Option<String>>, VcsError>;
}

#[derive(Debug, Clone, Default)]
pub struct SystemGit {
    git: Git,
}

impl SystemGit {
    async fn toplevel(&self, dir: &Path) -> Result<PathBuf, VcsError> {
        match self.git.output(dir, &["rev-parse", "--show-toplevel"]).await {
            Ok(root) => Ok(canonical(Path::new(&root))),
            Err(ProcessError::NonZeroExit { .. }) => Err(VcsError::NotARepo {
                dir: dir.to_path_buf(),
            }),
            Err(err) => Err(err.into()),
        }
    }
}

#[async_trait]
impl VersionControl for SystemGit {
    async fn is_repo(&self, dir: &Path) -> Result<bool, VcsError> {
        match self.git.output(dir, &["rev-parse", "--is-inside-work-tree"]).await {
            Ok(answer) => Ok(answer == "true"),
            Err(ProcessError::NonZeroExit { .. }) => Ok(false),
            Err(ProcessError::Spawn { source, .. }) => {
                debug!(error = %source, "git is unavailable");
                Ok(false)
            }
            Err(err) => Err(err.into()),
        }
    }

    async fn older_revision(
        &self,
        dir: &Path,
        paths: &[Option<PathBuf>],
        age: usize,
    ) -> Result<Vec<Option<String>>, VcsError> {
        let root = self.toplevel(dir).await?;
        let relative = paths
            .iter()
            .map(|path| {
                path.as_deref()
                    .map(|path| repo_relative(&root, dir, path))
                    .transpose()
            })
            .collect::<Result<Vec<_>, _>>()?;
        let tracked = relative.iter().flatten().cloned().collect::<Vec<_>>();

        let limit = age.to_string();
        let mut args = vec!["log", "--format=%H", "-n", limit.as_str(), "--"];
        args.extend(tracked.iter().map(String::as_str));
        let log = self.git.output(&root, &args).await?;
        let revisions = log.lines().filter(|line| !line.is_empty()).collect::<Vec<_>>();
        if age == 0 || revisions.len() < age {
            return Err(VcsError::TooOldRevision {
                age,
                available: revisions.len(),
            });
        }
        let revision = revisions[age - 1];
        debug!(%revision, age, "reading historical revision");

        let mut contents = Vec::with_capacity(relative.len());
        for path in relative {
            let Some(path) = path else {
                contents.push(None);
                continue;
            };
            let object = format!("{revision}:{path}");
            if !self.git.check(&root, &["cat-file", "-e", &object]).await? {
                contents.push(None);
                continue;
            }
            contents.push(Some(self.git.show(&root, revision, &path).await?));
        }
        Ok(contents)
    }
}

fn canonical(path: &Path) -> PathBuf {
    std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}

/// Resolves `path` (absolute or relative to `dir`) to a `/`-separated path
/// relative to the repository root.
fn repo_relative(root: &Path, dir: &Path, path: &Path) -> Result<String, VcsError> {
    let joined = if path.is_absolute() {
        path.to_path_buf()
    } else {
        dir.join(path)
    };
    let resolved = match (joined.parent(), joined.file_name()) {
        (Some(parent), Some(name)) => canonical(parent).join(name),
        _ => canonical(&joined),
    };
    let relative = resolved
        .strip_prefix(root)
        .map_err(|_| VcsError::PathOutsideRepo {
            path: resolved.clone(),
            root: root.to_path_buf(),
        })?;
    let parts = relative
        .components()
        .filter_map(|component| match component {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect::<Vec<_>>();
    Ok(parts.join("/"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{fs, process::Command};
    use tempfile::tempdir;

    fn git_available() -> bool {
        which::which("git").is_ok()
    }

    fn git(dir: &Path, args: &[&str]) {
        let status = Command::new("git")
            .args(args)
            .current_dir(dir)
            .env("GIT_AUTHOR_NAME", "veendor")
            .env("GIT_AUTHOR_EMAIL", "veendor@example.com")
            .env("GIT_COMMITTER_NAME", "veendor")
            .env("GIT_COMMITTER_EMAIL", "veendor@example.com")
            .status()
            .expect("git runs");
        assert!(status.success(), "git {args:?} failed");
    }

    fn commit_all(dir: &Path, message: &str) {
        git(dir, &["add", "-A"]);
        git(dir, &["commit", "-q", "-m", message]);
    }

    #[test]
    fn relative_and_absolute_paths_agree() {
        let repo = tempdir().unwrap();
        let root = canonical(repo.path());
        let nested = root.join("app");
        fs::create_dir_all(&nested).unwrap();
        let from_relative = repo_relative(&root, &nested, Path::new("package.json")).unwrap();
        let from_absolute =
            repo_relative(&root, &root, &nested.join("package.json")).unwrap();
        assert_eq!(from_relative, "app/package.json");
        assert_eq!(from_absolute, from_relative);
    }

    #[test]
    fn paths_outside_the_repo_are_rejected() {
        let repo = tempdir().unwrap();
        let other = tempdir().unwrap();
        let err = repo_relative(
            &canonical(repo.path()),
            repo.path(),
            &other.path().join("package.json"),
        )
        .unwrap_err();
        assert!(matches!(err, VcsError::PathOutsideRepo { .. }));
    }

    #[tokio::test]
    async fn walks_back_through_manifest_history() {
        if !git_available() {
            eprintln!("skipping: git not found");
            return;
        }
        let repo = tempdir().unwrap();
        let dir = repo.path();
        git(dir, &["init", "-q"]);
        fs::write(dir.join("package.json"), r#"{"dependencies":{"a":"1"}}"#).unwrap();
        commit_all(dir, "first");
        fs::write(dir.join("package.json"), r#"{"dependencies":{"a":"2"}}"#).unwrap();
        fs::write(dir.join("package-lock.json"), r#"{"lockfileVersion":1}"#).unwrap();
        commit_all(dir, "second");
        fs::write(dir.join("README.md"), "unrelated").unwrap();
        commit_all(dir, "third");

        let vcs = SystemGit::default();
        assert!(vcs.is_repo(dir).await.unwrap());
        let paths = [
            Some(PathBuf::from("package.json")),
            Some(dir.join("package-lock.json")),
            None,
        ];

        let latest = vcs.older_revision(dir, &paths, 1).await.unwrap();
        assert_eq!(latest[0].as_deref(), Some(r#"{"dependencies":{"a":"2"}}"#));
        assert_eq!(latest[1].as_deref(), Some(r#"{"lockfileVersion":1}"#));
        assert_eq!(latest[2], None);

        let older = vcs.older_revision(dir, &paths, 2).await.unwrap();
        assert_eq!(older[0].as_deref(), Some(r#"{"dependencies":{"a":"1"}}"#));
        assert_eq!(older[1], None, "lockfile did not exist yet");

        let err = vcs.older_revision(dir, &paths, 3).await.unwrap_err();
        assert!(matches!(
            err,
            VcsError::TooOldRevision {
                age: 3,
                available: 2
            }
        ));
    }

    #[tokio::test]
    async fn plain_directory_is_not_a_repo() {
        if !git_available() {
            eprintln!("skipping: git not found");
            return;
        }
        let dir = tempdir().unwrap();
        let vcs = SystemGit::default();
        assert!(!vcs.is_repo(dir.path()).await.unwrap());
        let err = vcs
            .older_revision(dir.path(), &[Some(PathBuf::from("package.json"))], 1)
            .await
            .unwrap_err();
        assert!(matches!(err, VcsError::NotARepo { .. }));
    }
}
