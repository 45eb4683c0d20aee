use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use veendor_domain::HashOptions;

use crate::core::backends::BackendRegistry;
use crate::core::config::{load_raw, Config, ConfigError, InstallContext, CONFIG_FILE};
use crate::core::install::{self, fingerprint_project, InstallError, InstallRequest};
use crate::core::npm::SystemNpm;
use crate::core::runtime::effects::SystemEffects;
use crate::core::tooling::outcome::ExecutionOutcome;
use crate::core::tooling::progress::Progress;
use crate::core::tooling::{install_error_outcome, install_success_outcome};

/// `--config` if given, else `.veendor.json` in the project.
pub fn config_path(project_dir: &Path, explicit: Option<&Path>) -> PathBuf {
    match explicit {
        Some(path) if path.is_absolute() => path.to_path_buf(),
        Some(path) => project_dir.join(path),
        None => project_dir.join(CONFIG_FILE),
    }
}

/// Loads the config and wires the real collaborators.
///
/// # Errors
/// Returns [`InstallError::Config`] when the config is missing or invalid.
pub fn system_context(
    project_dir: &Path,
    config_file: Option<&Path>,
    progress: Progress,
) -> Result<InstallContext, InstallError> {
    let config = Config::load(
        &config_path(project_dir, config_file),
        &BackendRegistry::builtin(),
    )?;
    let effects = SystemEffects::new()
        .with_npm(SystemNpm::locate(&config.npm_command))
        .with_progress(progress);
    Ok(InstallContext::new(project_dir, config, Arc::new(effects)))
}

pub async fn install_project(ctx: &InstallContext, request: InstallRequest) -> ExecutionOutcome {
    match install::install(ctx, request).await {
        Ok(report) => install_success_outcome(&report),
        Err(err) => install_error_outcome(&err),
    }
}

/// Fingerprint of the project, honoring `packageHash` from the config.
///
/// Without `--config`, a missing `.veendor.json` falls back to the default
/// hash options.
///
/// # Errors
/// Fails on manifest, lockfile or config errors.
pub fn calc_fingerprint(
    project_dir: &Path,
    config_file: Option<&Path>,
) -> Result<String, InstallError> {
    let path = config_path(project_dir, config_file);
    let options = match load_raw(&path) {
        Ok(raw) => Config::resolve(raw, &BackendRegistry::builtin())?.package_hash,
        Err(ConfigError::NotFound { .. }) if config_file.is_none() => HashOptions::default(),
        Err(err) => return Err(err.into()),
    };
    fingerprint_project(project_dir, &options)
}

pub fn error_outcome(err: &InstallError) -> ExecutionOutcome {
    install_error_outcome(err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn calc_without_config_uses_plain_hash() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("package.json"),
            r#"{"dependencies": {"left-pad": "1.3.0"}}"#,
        )
        .unwrap();
        let hash = calc_fingerprint(dir.path(), None).unwrap();
        assert_eq!(hash.len(), 40);
        assert!(hash.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn calc_applies_configured_suffix() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("package.json"),
            r#"{"dependencies": {"left-pad": "1.3.0"}}"#,
        )
        .unwrap();
        let plain = calc_fingerprint(dir.path(), None).unwrap();
        fs::write(
            dir.path().join(CONFIG_FILE),
            r#"{
                "backends": [{"alias": "l", "backend": "local", "options": {"directory": "b"}}],
                "packageHash": {"suffix": "linux-x64"}
            }"#,
        )
        .unwrap();
        assert_eq!(
            calc_fingerprint(dir.path(), None).unwrap(),
            format!("{plain}-linux-x64")
        );
    }

    #[test]
    fn explicit_config_must_exist() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("package.json"), r#"{"dependencies": {}}"#).unwrap();
        let err = calc_fingerprint(dir.path(), Some(Path::new("missing.json"))).unwrap_err();
        assert!(matches!(err, InstallError::Config(ConfigError::NotFound { .. })));
    }

    #[test]
    fn relative_config_paths_resolve_against_the_project() {
        let project = Path::new("/work/app");
        assert_eq!(
            config_path(project, Some(Path::new("ci/veendor.json"))),
            PathBuf::from("/work/app/ci/veendor.json")
        );
        assert_eq!(config_path(project, None), PathBuf::from("/work/app/.veendor.json"));
    }
}
