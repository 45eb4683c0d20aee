use serde_json::{json, Value};

use crate::core::install::{BundleSource, InstallError, InstallReport};
use crate::core::tooling::outcome::ExecutionOutcome;

pub(crate) fn install_success_outcome(report: &InstallReport) -> ExecutionOutcome {
    let message = match &report.source {
        BundleSource::Backend { alias } => format!("pulled {} from {alias}", report.hash),
        BundleSource::History { alias, hash, age } => format!(
            "pulled {hash} from {alias} ({age} revision(s) back) and installed the difference"
        ),
        BundleSource::PackageManager => "installed dependencies with npm".to_string(),
    };
    let details = serde_json::to_value(report).unwrap_or_else(|_| json!({}));
    ExecutionOutcome::success(message, details)
}

pub(crate) fn install_error_outcome(err: &InstallError) -> ExecutionOutcome {
    let mut details = json!({ "reason": err.reason() });
    if let Some(hint) = err.hint() {
        details["hint"] = Value::from(hint);
    }
    match err {
        InstallError::BundlesNotFound { hash } => {
            details["hash"] = Value::from(hash.as_str());
        }
        InstallError::BundleAlreadyExists { alias, hash } => {
            details["backend"] = Value::from(alias.as_str());
            details["hash"] = Value::from(hash.as_str());
        }
        InstallError::Backend { alias, .. } => {
            details["backend"] = Value::from(alias.as_str());
        }
        InstallError::Process(process) => {
            if let Some(stderr) = process.stderr().map(str::trim).filter(|s| !s.is_empty()) {
                details["stderr"] = Value::from(stderr);
            }
        }
        _ => {}
    }
    let message = err.to_string();
    if err.is_user_error() {
        ExecutionOutcome::user_error(message, details)
    } else {
        ExecutionOutcome::failure(message, details)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::tooling::outcome::CommandStatus;
    use std::path::PathBuf;

    #[test]
    fn already_have_deps_is_a_user_error() {
        let outcome = install_error_outcome(&InstallError::NodeModulesAlreadyExist {
            path: PathBuf::from("/app/node_modules"),
        });
        assert_eq!(outcome.status, CommandStatus::UserError);
        assert_eq!(outcome.details["reason"], "node_modules_exist");
        assert!(outcome.details["hint"].as_str().unwrap().contains("--force"));
    }

    #[test]
    fn backend_failure_names_the_backend() {
        let outcome = install_error_outcome(&InstallError::Backend {
            alias: "s3".to_string(),
            source: anyhow::anyhow!("403 Forbidden"),
        });
        assert_eq!(outcome.status, CommandStatus::Failure);
        assert_eq!(outcome.details["backend"], "s3");
    }

    #[test]
    fn success_message_reflects_the_source() {
        let report = InstallReport {
            hash: "abc".to_string(),
            source: BundleSource::Backend {
                alias: "local".to_string(),
            },
            pushed: vec![],
            re_pulled: false,
        };
        let outcome = install_success_outcome(&report);
        assert_eq!(outcome.message, "pulled abc from local");
        assert_eq!(outcome.details["source"]["kind"], "backend");
    }
}
