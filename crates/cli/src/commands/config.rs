use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use replyguard_core::config::{AppConfig, LoadOptions};
use secrecy::SecretString;
use toml::Value;

/// One rendered setting: dotted key, display value, and the env var that overrides it.
struct Field {
    key: &'static str,
    value: String,
    env_key: &'static str,
}

impl Field {
    fn new(key: &'static str, value: impl ToString, env_key: &'static str) -> Self {
        Self { key, value: value.to_string(), env_key }
    }
}

pub fn run() -> String {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => return format!("config validation failed: {error}"),
    };

    let config_file_path = detect_config_path();
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());

    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];
    for field in effective_fields(&config) {
        let source = field_source(
            field.key,
            field.env_key,
            config_file_doc.as_ref(),
            config_file_path.as_deref(),
        );
        lines.push(format!("- {} = {} (source: {source})", field.key, field.value));
    }

    lines.join("\n")
}

fn effective_fields(config: &AppConfig) -> Vec<Field> {
    let orchestrator = &config.orchestrator;
    vec![
        Field::new("database.url", &config.database.url, "REPLYGUARD_DATABASE_URL"),
        Field::new(
            "database.max_connections",
            config.database.max_connections,
            "REPLYGUARD_DATABASE_MAX_CONNECTIONS",
        ),
        Field::new(
            "database.timeout_secs",
            config.database.timeout_secs,
            "REPLYGUARD_DATABASE_TIMEOUT_SECS",
        ),
        Field::new(
            "draft_generator.base_url",
            &config.draft_generator.base_url,
            "REPLYGUARD_DRAFT_GENERATOR_BASE_URL",
        ),
        Field::new(
            "draft_generator.api_key",
            redact_secret(config.draft_generator.api_key.as_ref()),
            "REPLYGUARD_DRAFT_GENERATOR_API_KEY",
        ),
        Field::new(
            "draft_generator.timeout_secs",
            config.draft_generator.timeout_secs,
            "REPLYGUARD_DRAFT_GENERATOR_TIMEOUT_SECS",
        ),
        Field::new("connector.base_url", &config.connector.base_url, "REPLYGUARD_CONNECTOR_BASE_URL"),
        Field::new(
            "connector.api_key",
            redact_secret(config.connector.api_key.as_ref()),
            "REPLYGUARD_CONNECTOR_API_KEY",
        ),
        Field::new(
            "connector.timeout_secs",
            config.connector.timeout_secs,
            "REPLYGUARD_CONNECTOR_TIMEOUT_SECS",
        ),
        Field::new(
            "orchestrator.max_per_cycle",
            orchestrator.max_per_cycle,
            "REPLYGUARD_ORCHESTRATOR_MAX_PER_CYCLE",
        ),
        Field::new(
            "orchestrator.pass_deadline_secs",
            orchestrator.pass_deadline_secs,
            "REPLYGUARD_ORCHESTRATOR_PASS_DEADLINE_SECS",
        ),
        Field::new(
            "orchestrator.lease_ttl_secs",
            orchestrator.lease_ttl_secs,
            "REPLYGUARD_ORCHESTRATOR_LEASE_TTL_SECS",
        ),
        Field::new(
            "orchestrator.policy_version",
            &orchestrator.policy_version,
            "REPLYGUARD_ORCHESTRATOR_POLICY_VERSION",
        ),
        Field::new(
            "orchestrator.history_window_days",
            orchestrator.history_window_days,
            "REPLYGUARD_ORCHESTRATOR_HISTORY_WINDOW_DAYS",
        ),
        Field::new("logging.level", &config.logging.level, "REPLYGUARD_LOGGING_LEVEL"),
        Field::new(
            "logging.format",
            format!("{:?}", config.logging.format).to_lowercase(),
            "REPLYGUARD_LOGGING_FORMAT",
        ),
    ]
}

fn detect_config_path() -> Option<PathBuf> {
    ["replyguard.toml", "config/replyguard.toml"]
        .into_iter()
        .map(PathBuf::from)
        .find(|path| path.exists())
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let raw = fs::read_to_string(path?).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(
    key_path: &str,
    env_key: &str,
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    if env::var_os(env_key).is_some() {
        return format!("env ({env_key})");
    }

    if let Some(doc) = config_file_doc {
        if contains_path(doc, key_path) {
            let file_path = config_file_path
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| "config file".to_string());
            return format!("file ({file_path})");
        }
    }

    "default".to_string()
}

fn contains_path(root: &Value, key_path: &str) -> bool {
    let mut current = root;
    for key in key_path.split('.') {
        let Some(next) = current.get(key) else {
            return false;
        };
        current = next;
    }
    true
}

fn redact_secret(secret: Option<&SecretString>) -> &'static str {
    if secret.is_some() {
        "<redacted>"
    } else {
        "<unset>"
    }
}

#[cfg(test)]
mod tests {
    use secrecy::SecretString;
    use toml::Value;

    use super::{contains_path, effective_fields, redact_secret};
    use replyguard_core::config::AppConfig;

    #[test]
    fn secrets_are_never_rendered() {
        let mut config = AppConfig::default();
        config.connector.api_key = Some(SecretString::from("connector-secret".to_string()));

        let fields = effective_fields(&config);
        assert!(fields.iter().all(|field| !field.value.contains("connector-secret")));
        assert_eq!(redact_secret(config.connector.api_key.as_ref()), "<redacted>");
        assert_eq!(redact_secret(None), "<unset>");
    }

    #[test]
    fn nested_keys_are_found_in_file_document() {
        let doc: Value = "[orchestrator]\nmax_per_cycle = 5\n".parse().expect("parse toml");
        assert!(contains_path(&doc, "orchestrator.max_per_cycle"));
        assert!(!contains_path(&doc, "orchestrator.policy_version"));
        assert!(!contains_path(&doc, "connector.base_url"));
    }
}
