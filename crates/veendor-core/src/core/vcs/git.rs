use std::path::Path;

use tracing::debug;

use crate::core::runtime::process::{run_command, ProcessError, RunOptions, RunOutput};

#[derive(Debug, thiserror::Error)]
pub enum GitError {
    #[error("ref {reference} already exists on the remote")]
    RefAlreadyExists { reference: String },
    #[error(transparent)]
    Process(#[from] ProcessError),
}

/// Thin wrapper around the `git` executable.
#[derive(Debug, Clone)]
pub struct Git {
    program: String,
}

impl Default for Git {
    fn default() -> Self {
        Self::new()
    }
}

impl Git {
    pub fn new() -> Self {
        Self::with_program("git")
    }

    pub fn with_program(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    fn options(extra_env: &[(&str, &str)]) -> RunOptions {
        let mut envs = vec![("GIT_TERMINAL_PROMPT".to_string(), "0".to_string())];
        envs.extend(
            extra_env
                .iter()
                .map(|(key, value)| ((*key).to_string(), (*value).to_string())),
        );
        RunOptions {
            envs,
            ..RunOptions::default()
        }
    }

    pub async fn run(&self, cwd: &Path, args: &[&str]) -> Result<RunOutput, ProcessError> {
        self.run_with_env(cwd, args, &[]).await
    }

    pub async fn run_with_env(
        &self,
        cwd: &Path,
        args: &[&str],
        env: &[(&str, &str)],
    ) -> Result<RunOutput, ProcessError> {
        let args = args.iter().map(ToString::to_string).collect::<Vec<_>>();
        run_command(&self.program, &args, cwd, &Self::options(env)).await
    }

    /// Trimmed stdout of a successful invocation.
    pub async fn output(&self, cwd: &Path, args: &[&str]) -> Result<String, ProcessError> {
        Ok(self.run(cwd, args).await?.stdout.trim().to_string())
    }

    /// Succeeds with `false` instead of an error when git exits non-zero.
    pub async fn check(&self, cwd: &Path, args: &[&str]) -> Result<bool, ProcessError> {
        match self.run(cwd, args).await {
            Ok(_) => Ok(true),
            Err(ProcessError::NonZeroExit { .. }) => Ok(false),
            Err(err) => Err(err),
        }
    }

    /// Full contents of `<revision>:<path>`; never truncated.
    pub async fn show(&self, cwd: &Path, revision: &str, path: &str) -> Result<String, ProcessError> {
        let args = vec!["show".to_string(), format!("{revision}:{path}")];
        let options = Self::options(&[]).unbounded();
        Ok(run_command(&self.program, &args, cwd, &options).await?.stdout)
    }

    /// Pushes a single ref, reporting a rejection because the remote already
    /// has it as [`GitError::RefAlreadyExists`].
    pub async fn push_ref(&self, cwd: &Path, remote: &str, reference: &str) -> Result<(), GitError> {
        match self.run(cwd, &["push", remote, reference]).await {
            Ok(_) => Ok(()),
            Err(err) if is_ref_conflict(&err) => {
                debug!(%reference, "remote rejected existing ref");
                Err(GitError::RefAlreadyExists {
                    reference: reference.to_string(),
                })
            }
            Err(err) => Err(err.into()),
        }
    }
}

fn is_ref_conflict(err: &ProcessError) -> bool {
    let Some(stderr) = err.stderr() else {
        return false;
    };
    stderr.contains("already exists") || stderr.contains("[rejected]")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn failed_push(stderr: &str) -> ProcessError {
        ProcessError::NonZeroExit {
            command: "git push origin refs/tags/veendor-abc".to_string(),
            code: 1,
            stdout: String::new(),
            stderr: stderr.to_string(),
        }
    }

    #[test]
    fn rejected_tag_is_a_ref_conflict() {
        let stderr = "To ../remote.git\n ! [rejected]        veendor-abc -> veendor-abc (already exists)\n";
        assert!(is_ref_conflict(&failed_push(stderr)));
    }

    #[test]
    fn auth_failure_is_not_a_ref_conflict() {
        let stderr = "fatal: Authentication failed for 'https://example.com/repo.git/'";
        assert!(!is_ref_conflict(&failed_push(stderr)));
    }
}
