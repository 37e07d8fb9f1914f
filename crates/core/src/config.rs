use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Hard per-cycle ceiling; configuration may lower it but never raise it.
pub const MAX_INTERACTIONS_PER_CYCLE: u32 = 10;

/// Upper bound of the inter-send delay, part of the worst-case pass duration.
pub const MAX_PACING_SECS: u64 = 12;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub draft_generator: DraftGeneratorConfig,
    pub connector: ConnectorConfig,
    pub orchestrator: OrchestratorConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct DraftGeneratorConfig {
    pub base_url: String,
    pub api_key: Option<SecretString>,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct ConnectorConfig {
    pub base_url: String,
    pub api_key: Option<SecretString>,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct OrchestratorConfig {
    pub max_per_cycle: u32,
    pub pass_deadline_secs: u64,
    pub lease_ttl_secs: u64,
    pub policy_version: String,
    pub history_window_days: u32,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub database_url: Option<String>,
    pub log_level: Option<String>,
    pub log_format: Option<LogFormat>,
    pub max_per_cycle: Option<u32>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                url: "sqlite://replyguard.db".to_string(),
                max_connections: 5,
                timeout_secs: 30,
            },
            draft_generator: DraftGeneratorConfig {
                base_url: "http://localhost:8700".to_string(),
                api_key: None,
                timeout_secs: 30,
            },
            connector: ConnectorConfig {
                base_url: "http://localhost:8710".to_string(),
                api_key: None,
                timeout_secs: 15,
            },
            orchestrator: OrchestratorConfig {
                max_per_cycle: MAX_INTERACTIONS_PER_CYCLE,
                pass_deadline_secs: 240,
                lease_ttl_secs: 600,
                policy_version: "guardrails-v1".to_string(),
                history_window_days: 90,
            },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl OrchestratorConfig {
    /// Longest a single pass can legitimately hold the seller lease.
    pub fn worst_case_pass_secs(&self, generator_timeout: u64, connector_timeout: u64) -> u64 {
        self.pass_deadline_secs + generator_timeout + connector_timeout + MAX_PACING_SECS
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected =
                options.config_path.unwrap_or_else(|| PathBuf::from("replyguard.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(database) = patch.database {
            if let Some(url) = database.url {
                self.database.url = url;
            }
            if let Some(max_connections) = database.max_connections {
                self.database.max_connections = max_connections;
            }
            if let Some(timeout_secs) = database.timeout_secs {
                self.database.timeout_secs = timeout_secs;
            }
        }

        if let Some(generator) = patch.draft_generator {
            if let Some(base_url) = generator.base_url {
                self.draft_generator.base_url = base_url;
            }
            if let Some(api_key) = generator.api_key {
                self.draft_generator.api_key = Some(SecretString::from(api_key));
            }
            if let Some(timeout_secs) = generator.timeout_secs {
                self.draft_generator.timeout_secs = timeout_secs;
            }
        }

        if let Some(connector) = patch.connector {
            if let Some(base_url) = connector.base_url {
                self.connector.base_url = base_url;
            }
            if let Some(api_key) = connector.api_key {
                self.connector.api_key = Some(SecretString::from(api_key));
            }
            if let Some(timeout_secs) = connector.timeout_secs {
                self.connector.timeout_secs = timeout_secs;
            }
        }

        if let Some(orchestrator) = patch.orchestrator {
            if let Some(max_per_cycle) = orchestrator.max_per_cycle {
                self.orchestrator.max_per_cycle = max_per_cycle;
            }
            if let Some(pass_deadline_secs) = orchestrator.pass_deadline_secs {
                self.orchestrator.pass_deadline_secs = pass_deadline_secs;
            }
            if let Some(lease_ttl_secs) = orchestrator.lease_ttl_secs {
                self.orchestrator.lease_ttl_secs = lease_ttl_secs;
            }
            if let Some(policy_version) = orchestrator.policy_version {
                self.orchestrator.policy_version = policy_version;
            }
            if let Some(history_window_days) = orchestrator.history_window_days {
                self.orchestrator.history_window_days = history_window_days;
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env("REPLYGUARD_DATABASE_URL") {
            self.database.url = value;
        }
        if let Some(value) = read_env("REPLYGUARD_DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections =
                parse_u32("REPLYGUARD_DATABASE_MAX_CONNECTIONS", &value)?;
        }
        if let Some(value) = read_env("REPLYGUARD_DATABASE_TIMEOUT_SECS") {
            self.database.timeout_secs = parse_u64("REPLYGUARD_DATABASE_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("REPLYGUARD_DRAFT_GENERATOR_BASE_URL") {
            self.draft_generator.base_url = value;
        }
        if let Some(value) = read_env("REPLYGUARD_DRAFT_GENERATOR_API_KEY") {
            self.draft_generator.api_key = Some(SecretString::from(value));
        }
        if let Some(value) = read_env("REPLYGUARD_DRAFT_GENERATOR_TIMEOUT_SECS") {
            self.draft_generator.timeout_secs =
                parse_u64("REPLYGUARD_DRAFT_GENERATOR_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("REPLYGUARD_CONNECTOR_BASE_URL") {
            self.connector.base_url = value;
        }
        if let Some(value) = read_env("REPLYGUARD_CONNECTOR_API_KEY") {
            self.connector.api_key = Some(SecretString::from(value));
        }
        if let Some(value) = read_env("REPLYGUARD_CONNECTOR_TIMEOUT_SECS") {
            self.connector.timeout_secs = parse_u64("REPLYGUARD_CONNECTOR_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("REPLYGUARD_ORCHESTRATOR_MAX_PER_CYCLE") {
            self.orchestrator.max_per_cycle =
                parse_u32("REPLYGUARD_ORCHESTRATOR_MAX_PER_CYCLE", &value)?;
        }
        if let Some(value) = read_env("REPLYGUARD_ORCHESTRATOR_PASS_DEADLINE_SECS") {
            self.orchestrator.pass_deadline_secs =
                parse_u64("REPLYGUARD_ORCHESTRATOR_PASS_DEADLINE_SECS", &value)?;
        }
        if let Some(value) = read_env("REPLYGUARD_ORCHESTRATOR_LEASE_TTL_SECS") {
            self.orchestrator.lease_ttl_secs =
                parse_u64("REPLYGUARD_ORCHESTRATOR_LEASE_TTL_SECS", &value)?;
        }
        if let Some(value) = read_env("REPLYGUARD_ORCHESTRATOR_POLICY_VERSION") {
            self.orchestrator.policy_version = value;
        }
        if let Some(value) = read_env("REPLYGUARD_ORCHESTRATOR_HISTORY_WINDOW_DAYS") {
            self.orchestrator.history_window_days =
                parse_u32("REPLYGUARD_ORCHESTRATOR_HISTORY_WINDOW_DAYS", &value)?;
        }

        let log_level =
            read_env("REPLYGUARD_LOGGING_LEVEL").or_else(|| read_env("REPLYGUARD_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("REPLYGUARD_LOGGING_FORMAT").or_else(|| read_env("REPLYGUARD_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(database_url) = overrides.database_url {
            self.database.url = database_url;
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
        if let Some(log_format) = overrides.log_format {
            self.logging.format = log_format;
        }
        if let Some(max_per_cycle) = overrides.max_per_cycle {
            self.orchestrator.max_per_cycle = max_per_cycle;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_database(&self.database)?;
        validate_endpoint(
            "draft_generator",
            &self.draft_generator.base_url,
            self.draft_generator.api_key.as_ref(),
            self.draft_generator.timeout_secs,
        )?;
        validate_endpoint(
            "connector",
            &self.connector.base_url,
            self.connector.api_key.as_ref(),
            self.connector.timeout_secs,
        )?;
        validate_orchestrator(
            &self.orchestrator,
            self.draft_generator.timeout_secs,
            self.connector.timeout_secs,
        )?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("replyguard.toml"), PathBuf::from("config/replyguard.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut key = String::new();

            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(next) => key.push(next),
                    None => return Err(ConfigError::UnterminatedInterpolation),
                }
            }

            let value = env::var(&key)
                .map_err(|_| ConfigError::MissingEnvInterpolation { var: key.clone() })?;
            output.push_str(&value);
            continue;
        }

        output.push(ch);
    }

    Ok(output)
}

fn validate_database(database: &DatabaseConfig) -> Result<(), ConfigError> {
    let url = database.url.trim();
    let sqlite_url =
        url.starts_with("sqlite://") || url.starts_with("sqlite::") || url == ":memory:";
    if !sqlite_url {
        return Err(ConfigError::Validation(
            "database.url must be a sqlite URL (`sqlite://...`, `sqlite::...`, or `:memory:`)"
                .to_string(),
        ));
    }

    if database.max_connections == 0 {
        return Err(ConfigError::Validation(
            "database.max_connections must be greater than zero".to_string(),
        ));
    }

    if database.timeout_secs == 0 || database.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "database.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    Ok(())
}

fn validate_endpoint(
    section: &str,
    base_url: &str,
    api_key: Option<&SecretString>,
    timeout_secs: u64,
) -> Result<(), ConfigError> {
    let base_url = base_url.trim();
    if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
        return Err(ConfigError::Validation(format!(
            "{section}.base_url must start with http:// or https://"
        )));
    }

    if api_key.is_some_and(|key| key.expose_secret().trim().is_empty()) {
        return Err(ConfigError::Validation(format!(
            "{section}.api_key is set but empty; remove it or provide a value"
        )));
    }

    if timeout_secs == 0 || timeout_secs > 120 {
        return Err(ConfigError::Validation(format!(
            "{section}.timeout_secs must be in range 1..=120"
        )));
    }

    Ok(())
}

fn validate_orchestrator(
    orchestrator: &OrchestratorConfig,
    generator_timeout: u64,
    connector_timeout: u64,
) -> Result<(), ConfigError> {
    if orchestrator.max_per_cycle == 0 || orchestrator.max_per_cycle > MAX_INTERACTIONS_PER_CYCLE {
        return Err(ConfigError::Validation(format!(
            "orchestrator.max_per_cycle must be in range 1..={MAX_INTERACTIONS_PER_CYCLE}"
        )));
    }

    if orchestrator.pass_deadline_secs == 0 {
        return Err(ConfigError::Validation(
            "orchestrator.pass_deadline_secs must be greater than zero".to_string(),
        ));
    }

    let worst_case = orchestrator.worst_case_pass_secs(generator_timeout, connector_timeout);
    if orchestrator.lease_ttl_secs <= worst_case {
        return Err(ConfigError::Validation(format!(
            "orchestrator.lease_ttl_secs ({}) must exceed the worst-case pass duration of {worst_case}s \
             (deadline + generator timeout + connector timeout + {MAX_PACING_SECS}s pacing)",
            orchestrator.lease_ttl_secs
        )));
    }

    if orchestrator.policy_version.trim().is_empty() {
        return Err(ConfigError::Validation(
            "orchestrator.policy_version must not be empty".to_string(),
        ));
    }

    if orchestrator.history_window_days == 0 {
        return Err(ConfigError::Validation(
            "orchestrator.history_window_days must be greater than zero".to_string(),
        ));
    }

    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_u32(key: &str, value: &str) -> Result<u32, ConfigError> {
    value.parse::<u32>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.parse::<u64>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    database: Option<DatabasePatch>,
    draft_generator: Option<EndpointPatch>,
    connector: Option<EndpointPatch>,
    orchestrator: Option<OrchestratorPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct DatabasePatch {
    url: Option<String>,
    max_connections: Option<u32>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct EndpointPatch {
    base_url: Option<String>,
    api_key: Option<String>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct OrchestratorPatch {
    max_per_cycle: Option<u32>,
    pass_deadline_secs: Option<u64>,
    lease_ttl_secs: Option<u64>,
    policy_version: Option<String>,
    history_window_days: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}
