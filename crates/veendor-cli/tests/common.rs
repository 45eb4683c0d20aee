#![allow(dead_code)]

use std::{
    fs,
    path::{Path, PathBuf},
};

use serde_json::Value;
use tempfile::TempDir;

pub const PACKAGE_JSON: &str = r#"{
  "name": "sample-app",
  "version": "1.0.0",
  "dependencies": { "left-pad": "1.3.0" },
  "devDependencies": { "is-odd": "3.0.1" }
}"#;

/// Temp project with a package.json and a bundle store next to it.
pub struct Fixture {
    _temp: TempDir,
    pub project: PathBuf,
    pub store: PathBuf,
}

impl Fixture {
    pub fn new(prefix: &str) -> Self {
        let temp = tempfile::Builder::new()
            .prefix(prefix)
            .tempdir()
            .expect("tempdir");
        let project = temp.path().join("app");
        let store = temp.path().join("bundles");
        fs::create_dir_all(&project).expect("project dir");
        fs::write(project.join("package.json"), PACKAGE_JSON).expect("package.json");
        Self {
            _temp: temp,
            project,
            store,
        }
    }

    /// Writes `.veendor.json` with a single `local` backend.
    pub fn write_local_config(&self, npm_command: Option<&Path>) {
        let mut config = serde_json::json!({
            "backends": [{
                "alias": "local",
                "backend": "local",
                "push": true,
                "options": { "directory": self.store }
            }]
        });
        if let Some(npm) = npm_command {
            config["npmCommand"] = Value::from(npm.to_string_lossy().to_string());
        }
        fs::write(
            self.project.join(".veendor.json"),
            serde_json::to_string_pretty(&config).expect("config json"),
        )
        .expect("write config");
    }

    pub fn npm_log(&self) -> Vec<String> {
        fs::read_to_string(self.project.join("npm.log"))
            .map(|log| log.lines().map(str::to_string).collect())
            .unwrap_or_default()
    }
}

/// Shell script standing in for npm: logs its arguments and creates a
/// small node_modules tree on `install`.
#[cfg(unix)]
pub fn fake_npm(dir: &Path) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;

    let path = dir.join("fake-npm");
    let script = r#"#!/bin/sh
echo "$*" >> npm.log
case "$1" in
  --version) echo "10.2.0" ;;
  install)
    mkdir -p node_modules/left-pad
    echo "module.exports = 1;" > node_modules/left-pad/index.js
    ;;
esac
"#;
    fs::write(&path, script).expect("write fake npm");
    let mut perms = fs::metadata(&path).expect("metadata").permissions();
    perms.set_mode(0o755);
    fs::set_permissions(&path, perms).expect("chmod");
    path
}

pub fn parse_json(output: &[u8]) -> Value {
    serde_json::from_slice(output).expect("json envelope")
}
