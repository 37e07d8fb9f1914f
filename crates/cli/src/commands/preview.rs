use std::fs;
use std::path::Path;

use chrono::Utc;
use replyguard_core::decision::{PreviewRequest, ReplyGuard};

use crate::commands::{CommandResult, EXIT_INVALID_INPUT, EXIT_RUNTIME_INIT};

/// Gate-and-guardrail preview of a draft. Nothing is sent or persisted.
pub fn run(path: &Path) -> CommandResult {
    let raw = match fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(error) => {
            return CommandResult::failure(
                "preview",
                "invalid_input",
                format!("could not read `{}`: {error}", path.display()),
                EXIT_INVALID_INPUT,
            );
        }
    };
    let request: PreviewRequest = match serde_json::from_str(&raw) {
        Ok(request) => request,
        Err(error) => {
            return CommandResult::failure(
                "preview",
                "invalid_input",
                format!("`{}` is not a valid preview request: {error}", path.display()),
                EXIT_INVALID_INPUT,
            );
        }
    };
    if let Err(error) = request.interaction.validate() {
        return CommandResult::failure(
            "preview",
            "invalid_input",
            error.to_string(),
            EXIT_INVALID_INPUT,
        );
    }

    let guard = match ReplyGuard::new() {
        Ok(guard) => guard,
        Err(error) => {
            return CommandResult::failure(
                "preview",
                error.class(),
                error.to_string(),
                EXIT_RUNTIME_INIT,
            );
        }
    };

    let outcome = guard.preview(&request, Utc::now());
    let message = if outcome.auto_action_allowed {
        "reply would pass every gate".to_string()
    } else {
        format!("reply would not be sent: {}", outcome.reason)
    };
    match serde_json::to_value(&outcome) {
        Ok(details) => CommandResult::success_with("preview", message, details),
        Err(error) => CommandResult::failure(
            "preview",
            "serialization",
            error.to_string(),
            EXIT_INVALID_INPUT,
        ),
    }
}
