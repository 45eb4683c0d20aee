//! Package-manager collaborator.

use std::{collections::BTreeMap, path::Path, time::Duration};

use async_trait::async_trait;
use tracing::{debug, info};

use crate::core::runtime::process::{run_command, ProcessError, RunOptions};

/// Upper bound for `npm --version`.
const VERSION_TIMEOUT: Duration = Duration::from_secs(30);

#[async_trait]
pub trait PackageManager: Send + Sync {
    async fn version(&self, dir: &Path) -> Result<String, ProcessError>;

    /// Installs everything declared by the project.
    async fn install_all(&self, dir: &Path) -> Result<(), ProcessError>;

    /// Installs `name@version` for each entry without rewriting the manifest.
    async fn install(
        &self,
        dir: &Path,
        packages: &BTreeMap<String, String>,
    ) -> Result<(), ProcessError>;

    async fn uninstall(&self, dir: &Path, names: &[String]) -> Result<(), ProcessError>;

    async fn dedupe(&self, dir: &Path) -> Result<(), ProcessError>;

    /// Clears the package manager's machine-wide download cache.
    async fn clear_cache(&self, dir: &Path) -> Result<(), ProcessError>;
}

#[derive(Debug, Clone)]
pub struct SystemNpm {
    program: String,
}

impl Default for SystemNpm {
    fn default() -> Self {
        Self::new("npm")
    }
}

impl SystemNpm {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    /// Resolves `command` on `PATH`, keeping the bare name when it cannot be
    /// found so the eventual spawn error names it.
    pub fn locate(command: &str) -> Self {
        match which::which(command) {
            Ok(path) => Self::new(path.to_string_lossy()),
            Err(err) => {
                debug!(%command, error = %err, "package manager not found on PATH");
                Self::new(command)
            }
        }
    }

    async fn npm(&self, dir: &Path, args: Vec<String>) -> Result<String, ProcessError> {
        self.npm_with(dir, args, &RunOptions::default()).await
    }

    async fn npm_with(
        &self,
        dir: &Path,
        args: Vec<String>,
        options: &RunOptions,
    ) -> Result<String, ProcessError> {
        Ok(run_command(&self.program, &args, dir, options).await?.stdout)
    }
}

fn strings(args: &[&str]) -> Vec<String> {
    args.iter().map(ToString::to_string).collect()
}

#[async_trait]
impl PackageManager for SystemNpm {
    async fn version(&self, dir: &Path) -> Result<String, ProcessError> {
        let options = RunOptions::default().with_timeout(VERSION_TIMEOUT);
        let version = self.npm_with(dir, strings(&["--version"]), &options).await?;
        Ok(version.trim().to_string())
    }

    async fn install_all(&self, dir: &Path) -> Result<(), ProcessError> {
        info!("running {} install", self.program);
        self.npm(dir, strings(&["install"])).await.map(drop)
    }

    async fn install(
        &self,
        dir: &Path,
        packages: &BTreeMap<String, String>,
    ) -> Result<(), ProcessError> {
        if packages.is_empty() {
            return Ok(());
        }
        let mut args = strings(&["install", "--no-save"]);
        args.extend(
            packages
                .iter()
                .map(|(name, version)| format!("{name}@{version}")),
        );
        info!(count = packages.len(), "installing changed packages");
        self.npm(dir, args).await.map(drop)
    }

    async fn uninstall(&self, dir: &Path, names: &[String]) -> Result<(), ProcessError> {
        if names.is_empty() {
            return Ok(());
        }
        let mut args = strings(&["uninstall", "--no-save"]);
        args.extend(names.iter().cloned());
        info!(count = names.len(), "removing dropped packages");
        self.npm(dir, args).await.map(drop)
    }

    async fn dedupe(&self, dir: &Path) -> Result<(), ProcessError> {
        self.npm(dir, strings(&["dedupe"])).await.map(drop)
    }

    async fn clear_cache(&self, dir: &Path) -> Result<(), ProcessError> {
        self.npm(dir, strings(&["cache", "clean", "--force"]))
            .await
            .map(drop)
    }
}
