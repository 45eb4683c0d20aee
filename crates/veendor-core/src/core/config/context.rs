use std::ffi::OsStr;
use std::path::{Component, Path, PathBuf};

use veendor_domain::{MANIFEST_FILE, NODE_MODULES};

use super::Config;
use crate::core::npm::PackageManager;
use crate::core::runtime::effects::SharedEffects;
use crate::core::tooling::progress::Progress;
use crate::core::vcs::VersionControl;

/// Directory under the project that holds per-backend caches.
pub const CACHE_DIR: &str = ".veendor";

/// An alias names its own directory under [`CACHE_DIR`], so it must be a
/// single plain path component.
pub fn is_valid_alias(alias: &str) -> bool {
    let mut components = Path::new(alias).components();
    matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(part)), None) if part == OsStr::new(alias)
    )
}

/// Everything an install run needs: where the project is, how it is
/// configured, and who to talk to.
pub struct InstallContext {
    project_dir: PathBuf,
    config: Config,
    effects: SharedEffects,
}

impl InstallContext {
    pub fn new(project_dir: impl Into<PathBuf>, config: Config, effects: SharedEffects) -> Self {
        Self {
            project_dir: project_dir.into(),
            config,
            effects,
        }
    }

    pub fn project_dir(&self) -> &Path {
        &self.project_dir
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn npm(&self) -> &dyn PackageManager {
        self.effects.npm()
    }

    pub fn vcs(&self) -> &dyn VersionControl {
        self.effects.vcs()
    }

    pub fn progress(&self) -> &Progress {
        self.effects.progress()
    }

    pub fn manifest_path(&self) -> PathBuf {
        self.project_dir.join(MANIFEST_FILE)
    }

    pub fn node_modules(&self) -> PathBuf {
        self.project_dir.join(NODE_MODULES)
    }

    /// `None` when `alias` would resolve outside its own cache directory.
    pub fn cache_dir(&self, alias: &str) -> Option<PathBuf> {
        is_valid_alias(alias).then(|| self.project_dir.join(CACHE_DIR).join(alias))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_names_are_valid_aliases() {
        for alias in ["local", "s3-eu", "cdn.example", "..hidden"] {
            assert!(is_valid_alias(alias), "{alias}");
        }
    }

    #[test]
    fn path_like_aliases_are_rejected() {
        for alias in ["", ".", "..", "a/b", "a/", "/abs", "../up"] {
            assert!(!is_valid_alias(alias), "{alias}");
        }
    }
}
