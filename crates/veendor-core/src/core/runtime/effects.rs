use std::sync::Arc;

use crate::core::npm::{PackageManager, SystemNpm};
use crate::core::tooling::progress::Progress;
use crate::core::vcs::{SystemGit, VersionControl};

/// Collaborators the install flow talks to, injected so tests can swap them.
pub trait Effects: Send + Sync {
    fn npm(&self) -> &dyn PackageManager;
    fn vcs(&self) -> &dyn VersionControl;
    fn progress(&self) -> &Progress;
}

pub type SharedEffects = Arc<dyn Effects>;

pub struct SystemEffects {
    npm: Arc<SystemNpm>,
    vcs: Arc<SystemGit>,
    progress: Progress,
}

impl SystemEffects {
    #[must_use]
    pub fn new() -> Self {
        Self {
            npm: Arc::new(SystemNpm::default()),
            vcs: Arc::new(SystemGit::default()),
            progress: Progress::from_env(),
        }
    }

    #[must_use]
    pub fn with_npm(mut self, npm: SystemNpm) -> Self {
        self.npm = Arc::new(npm);
        self
    }

    #[must_use]
    pub fn with_progress(mut self, progress: Progress) -> Self {
        self.progress = progress;
        self
    }
}

impl Default for SystemEffects {
    fn default() -> Self {
        Self::new()
    }
}

impl Effects for SystemEffects {
    fn npm(&self) -> &dyn PackageManager {
        self.npm.as_ref()
    }

    fn vcs(&self) -> &dyn VersionControl {
        self.vcs.as_ref()
    }

    fn progress(&self) -> &Progress {
        &self.progress
    }
}
