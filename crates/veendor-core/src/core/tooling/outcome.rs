use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionOutcome {
    pub status: CommandStatus,
    pub message: String,
    #[serde(default)]
    pub details: Value,
}

impl ExecutionOutcome {
    pub fn success(message: impl Into<String>, details: Value) -> Self {
        Self {
            status: CommandStatus::Ok,
            message: message.into(),
            details,
        }
    }

    pub fn failure(message: impl Into<String>, details: Value) -> Self {
        Self {
            status: CommandStatus::Failure,
            message: message.into(),
            details,
        }
    }

    pub fn user_error(message: impl Into<String>, details: Value) -> Self {
        Self {
            status: CommandStatus::UserError,
            message: message.into(),
            details,
        }
    }

    pub fn exit_code(&self) -> i32 {
        match self.status {
            CommandStatus::Ok => 0,
            CommandStatus::UserError => 1,
            CommandStatus::Failure => 2,
        }
    }

    /// `{status, message, details}` envelope printed by `--json`.
    pub fn to_json(&self, command: &str) -> Value {
        let status = match self.status {
            CommandStatus::Ok => "ok",
            CommandStatus::UserError => "user-error",
            CommandStatus::Failure => "error",
        };
        let details = match &self.details {
            Value::Object(_) => self.details.clone(),
            Value::Null => json!({}),
            other => json!({ "value": other }),
        };
        json!({
            "status": status,
            "message": format_status_message(command, &self.message),
            "details": details,
        })
    }
}

#[must_use]
pub fn format_status_message(command: &str, message: &str) -> String {
    let prefix = format!("veendor {command}");
    if message.is_empty() {
        prefix
    } else if message.starts_with(&prefix) {
        message.to_string()
    } else {
        format!("{prefix}: {message}")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum CommandStatus {
    Ok,
    UserError,
    Failure,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_codes_follow_status() {
        assert_eq!(ExecutionOutcome::success("", Value::Null).exit_code(), 0);
        assert_eq!(ExecutionOutcome::user_error("", Value::Null).exit_code(), 1);
        assert_eq!(ExecutionOutcome::failure("", Value::Null).exit_code(), 2);
    }

    #[test]
    fn json_envelope_is_prefixed_and_normalized() {
        let outcome = ExecutionOutcome::user_error("no bundle", json!("raw"));
        let value = outcome.to_json("install");
        assert_eq!(value["status"], "user-error");
        assert_eq!(value["message"], "veendor install: no bundle");
        assert_eq!(value["details"]["value"], "raw");
    }
}
