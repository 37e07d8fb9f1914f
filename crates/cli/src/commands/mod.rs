pub mod config;
pub mod doctor;
pub mod migrate;
pub mod pass;
pub mod preview;
pub mod seed;

use replyguard_core::config::{AppConfig, LoadOptions};
use serde::Serialize;
use serde_json::Value;
use tokio::runtime::Runtime;

pub const EXIT_CONFIG: u8 = 2;
pub const EXIT_RUNTIME_INIT: u8 = 3;
pub const EXIT_DB_CONNECTIVITY: u8 = 4;
pub const EXIT_MIGRATION: u8 = 5;
pub const EXIT_PASS_FAILURE: u8 = 6;
pub const EXIT_INVALID_INPUT: u8 = 7;

#[derive(Debug, Clone)]
pub struct CommandResult {
    pub exit_code: u8,
    pub output: String,
}

#[derive(Debug, Serialize)]
struct CommandOutcome {
    command: String,
    status: String,
    error_class: Option<String>,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<Value>,
}

impl CommandResult {
    pub fn success(command: &str, message: impl Into<String>) -> Self {
        Self::ok(command, message.into(), None)
    }

    /// Success with a structured payload under `details`.
    pub fn success_with(command: &str, message: impl Into<String>, details: Value) -> Self {
        Self::ok(command, message.into(), Some(details))
    }

    pub fn failure(
        command: &str,
        error_class: &str,
        message: impl Into<String>,
        exit_code: u8,
    ) -> Self {
        let payload = CommandOutcome {
            command: command.to_string(),
            status: "error".to_string(),
            error_class: Some(error_class.to_string()),
            message: message.into(),
            details: None,
        };
        Self { exit_code, output: serialize_payload(payload) }
    }

    fn ok(command: &str, message: String, details: Option<Value>) -> Self {
        let payload = CommandOutcome {
            command: command.to_string(),
            status: "ok".to_string(),
            error_class: None,
            message,
            details,
        };
        Self { exit_code: 0, output: serialize_payload(payload) }
    }
}

/// Loads and validates configuration, mapping failure to the config exit code.
pub(crate) fn load_config(command: &str) -> Result<AppConfig, CommandResult> {
    AppConfig::load(LoadOptions::default()).map_err(|error| {
        CommandResult::failure(
            command,
            "config_validation",
            format!("configuration issue: {error}"),
            EXIT_CONFIG,
        )
    })
}

pub(crate) fn build_runtime(command: &str) -> Result<Runtime, CommandResult> {
    tokio::runtime::Builder::new_current_thread().enable_all().build().map_err(|error| {
        CommandResult::failure(
            command,
            "runtime_init",
            format!("failed to initialize async runtime: {error}"),
            EXIT_RUNTIME_INIT,
        )
    })
}

fn serialize_payload(payload: CommandOutcome) -> String {
    serde_json::to_string(&payload).unwrap_or_else(|error| {
        format!(
            "{{\"command\":\"unknown\",\"status\":\"error\",\"error_class\":\"serialization\",\"message\":\"{}\"}}",
            error.to_string().replace('\\', "\\\\").replace('"', "\\\"")
        )
    })
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::CommandResult;

    #[test]
    fn details_are_omitted_unless_present() {
        let plain = CommandResult::success("migrate", "done");
        assert!(!plain.output.contains("details"));

        let detailed = CommandResult::success_with("pass", "done", json!({ "sent": 1 }));
        let payload: serde_json::Value =
            serde_json::from_str(&detailed.output).expect("valid JSON");
        assert_eq!(payload["details"]["sent"], 1);
    }

    #[test]
    fn failure_carries_error_class_and_exit_code() {
        let result = CommandResult::failure("pass", "invalid_input", "seller id is empty", 7);
        assert_eq!(result.exit_code, 7);
        let payload: serde_json::Value = serde_json::from_str(&result.output).expect("valid JSON");
        assert_eq!(payload["status"], "error");
        assert_eq!(payload["error_class"], "invalid_input");
    }
}
