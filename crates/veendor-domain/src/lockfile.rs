use std::{
    fs, io,
    path::{Path, PathBuf},
};

use serde_json::Value;
use tracing::debug;

/// Recognized lockfiles, highest priority first.
pub const LOCKFILE_NAMES: [&str; 2] = ["npm-shrinkwrap.json", "package-lock.json"];

#[derive(Debug, thiserror::Error)]
pub enum LockfileError {
    #[error("failed to read lockfile {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to parse lockfile {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

pub fn detect_lockfile(project_dir: &Path) -> Option<PathBuf> {
    let found = LOCKFILE_NAMES
        .iter()
        .map(|name| project_dir.join(name))
        .find(|path| path.is_file());
    if let Some(path) = &found {
        debug!(lockfile = %path.display(), "using lockfile");
    }
    found
}

pub fn read_lockfile(path: &Path) -> Result<Value, LockfileError> {
    let contents = fs::read_to_string(path).map_err(|source| LockfileError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&contents).map_err(|source| LockfileError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn shrinkwrap_wins_over_package_lock() {
        let tmp = tempdir().unwrap();
        fs::write(tmp.path().join("package-lock.json"), "{}").unwrap();
        assert_eq!(
            detect_lockfile(tmp.path()),
            Some(tmp.path().join("package-lock.json"))
        );
        fs::write(tmp.path().join("npm-shrinkwrap.json"), "{}").unwrap();
        assert_eq!(
            detect_lockfile(tmp.path()),
            Some(tmp.path().join("npm-shrinkwrap.json"))
        );
    }

    #[test]
    fn no_lockfile_is_none() {
        let tmp = tempdir().unwrap();
        assert_eq!(detect_lockfile(tmp.path()), None);
    }

    #[test]
    fn unparseable_lockfile_is_an_error() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("package-lock.json");
        fs::write(&path, "{ broken").unwrap();
        assert!(matches!(
            read_lockfile(&path),
            Err(LockfileError::Parse { .. })
        ));
    }
}
