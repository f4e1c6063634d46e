use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub model: ModelConfig,
    pub assist: AssistConfig,
    pub auto_reply: AutoReplyConfig,
    pub workers: WorkerConfig,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct ModelConfig {
    /// Without a key the client reports itself unavailable and assist degrades.
    pub api_key: Option<SecretString>,
    pub base_url: String,
    pub model: String,
    pub embedding_model: String,
    pub timeout_secs: u64,
    pub max_retries: u32,
    pub retry_base_delay_ms: u64,
    pub rate_limit_padding: f64,
}

#[derive(Clone, Debug)]
pub struct AssistConfig {
    pub agent_language: String,
    pub context_top_k: usize,
    pub fallback_confidence: f64,
}

#[derive(Clone, Debug)]
pub struct AutoReplyConfig {
    pub default_threshold: f64,
}

#[derive(Clone, Debug)]
pub struct WorkerConfig {
    pub worker_count: usize,
    pub queue_capacity: usize,
    pub drain_timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
    pub graceful_shutdown_secs: u64,
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
    pub model_api_key: Option<String>,
    pub model_base_url: Option<String>,
    pub model_name: Option<String>,
    pub agent_language: Option<String>,
    pub worker_count: Option<usize>,
    pub queue_capacity: Option<usize>,
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
                url: "sqlite://parley.db".to_string(),
                max_connections: 5,
                timeout_secs: 30,
            },
            model: ModelConfig {
                api_key: None,
                base_url: "https://generativelanguage.googleapis.com/v1beta".to_string(),
                model: "gemini-1.5-flash".to_string(),
                embedding_model: "text-embedding-004".to_string(),
                timeout_secs: 30,
                max_retries: 3,
                retry_base_delay_ms: 1_000,
                rate_limit_padding: 1.1,
            },
            assist: AssistConfig {
                agent_language: "en".to_string(),
                context_top_k: crate::suggestions::DEFAULT_CONTEXT_TOP_K,
                fallback_confidence: crate::suggestions::FALLBACK_CANDIDATE_CONFIDENCE,
            },
            auto_reply: AutoReplyConfig {
                default_threshold: crate::domain::auto_reply::DEFAULT_AUTO_REPLY_THRESHOLD,
            },
            workers: WorkerConfig { worker_count: 4, queue_capacity: 256, drain_timeout_secs: 30 },
            server: ServerConfig {
                bind_address: "127.0.0.1".to_string(),
                port: 8080,
                graceful_shutdown_secs: 15,
            },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

fn secret_value(value: String) -> SecretString {
    value.into()
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

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("parley.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    pub fn model_available(&self) -> bool {
        self.model.api_key.as_ref().is_some_and(|key| !key.expose_secret().trim().is_empty())
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

        if let Some(model) = patch.model {
            if let Some(model_api_key_value) = model.api_key {
                self.model.api_key = Some(secret_value(model_api_key_value));
            }
            if let Some(base_url) = model.base_url {
                self.model.base_url = base_url;
            }
            if let Some(name) = model.model {
                self.model.model = name;
            }
            if let Some(embedding_model) = model.embedding_model {
                self.model.embedding_model = embedding_model;
            }
            if let Some(timeout_secs) = model.timeout_secs {
                self.model.timeout_secs = timeout_secs;
            }
            if let Some(max_retries) = model.max_retries {
                self.model.max_retries = max_retries;
            }
            if let Some(retry_base_delay_ms) = model.retry_base_delay_ms {
                self.model.retry_base_delay_ms = retry_base_delay_ms;
            }
            if let Some(rate_limit_padding) = model.rate_limit_padding {
                self.model.rate_limit_padding = rate_limit_padding;
            }
        }

        if let Some(assist) = patch.assist {
            if let Some(agent_language) = assist.agent_language {
                self.assist.agent_language = agent_language;
            }
            if let Some(context_top_k) = assist.context_top_k {
                self.assist.context_top_k = context_top_k;
            }
            if let Some(fallback_confidence) = assist.fallback_confidence {
                self.assist.fallback_confidence = fallback_confidence;
            }
        }

        if let Some(auto_reply) = patch.auto_reply {
            if let Some(default_threshold) = auto_reply.default_threshold {
                self.auto_reply.default_threshold = default_threshold;
            }
        }

        if let Some(workers) = patch.workers {
            if let Some(worker_count) = workers.worker_count {
                self.workers.worker_count = worker_count;
            }
            if let Some(queue_capacity) = workers.queue_capacity {
                self.workers.queue_capacity = queue_capacity;
            }
            if let Some(drain_timeout_secs) = workers.drain_timeout_secs {
                self.workers.drain_timeout_secs = drain_timeout_secs;
            }
        }

        if let Some(server) = patch.server {
            if let Some(bind_address) = server.bind_address {
                self.server.bind_address = bind_address;
            }
            if let Some(port) = server.port {
                self.server.port = port;
            }
            if let Some(graceful_shutdown_secs) = server.graceful_shutdown_secs {
                self.server.graceful_shutdown_secs = graceful_shutdown_secs;
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
        if let Some(value) = read_env("PARLEY_DATABASE_URL") {
            self.database.url = value;
        }
        if let Some(value) = read_env("PARLEY_DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections = parse_u32("PARLEY_DATABASE_MAX_CONNECTIONS", &value)?;
        }
        if let Some(value) = read_env("PARLEY_DATABASE_TIMEOUT_SECS") {
            self.database.timeout_secs = parse_u64("PARLEY_DATABASE_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("PARLEY_MODEL_API_KEY") {
            self.model.api_key = Some(secret_value(value));
        }
        if let Some(value) = read_env("PARLEY_MODEL_BASE_URL") {
            self.model.base_url = value;
        }
        if let Some(value) = read_env("PARLEY_MODEL_NAME") {
            self.model.model = value;
        }
        if let Some(value) = read_env("PARLEY_MODEL_EMBEDDING_MODEL") {
            self.model.embedding_model = value;
        }
        if let Some(value) = read_env("PARLEY_MODEL_TIMEOUT_SECS") {
            self.model.timeout_secs = parse_u64("PARLEY_MODEL_TIMEOUT_SECS", &value)?;
        }
        if let Some(value) = read_env("PARLEY_MODEL_MAX_RETRIES") {
            self.model.max_retries = parse_u32("PARLEY_MODEL_MAX_RETRIES", &value)?;
        }

        if let Some(value) = read_env("PARLEY_ASSIST_AGENT_LANGUAGE") {
            self.assist.agent_language = value;
        }
        if let Some(value) = read_env("PARLEY_AUTO_REPLY_DEFAULT_THRESHOLD") {
            self.auto_reply.default_threshold =
                parse_f64("PARLEY_AUTO_REPLY_DEFAULT_THRESHOLD", &value)?;
        }

        if let Some(value) = read_env("PARLEY_WORKERS_COUNT") {
            self.workers.worker_count = parse_usize("PARLEY_WORKERS_COUNT", &value)?;
        }
        if let Some(value) = read_env("PARLEY_WORKERS_QUEUE_CAPACITY") {
            self.workers.queue_capacity = parse_usize("PARLEY_WORKERS_QUEUE_CAPACITY", &value)?;
        }

        if let Some(value) = read_env("PARLEY_SERVER_BIND_ADDRESS") {
            self.server.bind_address = value;
        }
        if let Some(value) = read_env("PARLEY_SERVER_PORT") {
            self.server.port = parse_u16("PARLEY_SERVER_PORT", &value)?;
        }
        if let Some(value) = read_env("PARLEY_SERVER_GRACEFUL_SHUTDOWN_SECS") {
            self.server.graceful_shutdown_secs =
                parse_u64("PARLEY_SERVER_GRACEFUL_SHUTDOWN_SECS", &value)?;
        }

        let log_level = read_env("PARLEY_LOGGING_LEVEL").or_else(|| read_env("PARLEY_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("PARLEY_LOGGING_FORMAT").or_else(|| read_env("PARLEY_LOG_FORMAT"));
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
        if let Some(model_api_key) = overrides.model_api_key {
            self.model.api_key = Some(secret_value(model_api_key));
        }
        if let Some(model_base_url) = overrides.model_base_url {
            self.model.base_url = model_base_url;
        }
        if let Some(model_name) = overrides.model_name {
            self.model.model = model_name;
        }
        if let Some(agent_language) = overrides.agent_language {
            self.assist.agent_language = agent_language;
        }
        if let Some(worker_count) = overrides.worker_count {
            self.workers.worker_count = worker_count;
        }
        if let Some(queue_capacity) = overrides.queue_capacity {
            self.workers.queue_capacity = queue_capacity;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_database(&self.database)?;
        validate_model(&self.model)?;
        validate_assist(&self.assist)?;
        validate_unit_interval("auto_reply.default_threshold", self.auto_reply.default_threshold)?;
        validate_workers(&self.workers)?;
        validate_server(&self.server)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("parley.toml"), PathBuf::from("config/parley.toml")]
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

fn validate_model(model: &ModelConfig) -> Result<(), ConfigError> {
    if !model.base_url.starts_with("http://") && !model.base_url.starts_with("https://") {
        return Err(ConfigError::Validation(
            "model.base_url must start with http:// or https://".to_string(),
        ));
    }

    if model.model.trim().is_empty() || model.embedding_model.trim().is_empty() {
        return Err(ConfigError::Validation(
            "model.model and model.embedding_model must not be empty".to_string(),
        ));
    }

    if model.timeout_secs == 0 || model.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "model.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    if model.max_retries > 10 {
        return Err(ConfigError::Validation(
            "model.max_retries must be at most 10".to_string(),
        ));
    }

    if !(1.0..=3.0).contains(&model.rate_limit_padding) {
        return Err(ConfigError::Validation(
            "model.rate_limit_padding must be in range 1.0..=3.0".to_string(),
        ));
    }

    Ok(())
}

fn validate_assist(assist: &AssistConfig) -> Result<(), ConfigError> {
    if assist.agent_language.trim().is_empty() {
        return Err(ConfigError::Validation(
            "assist.agent_language must not be empty".to_string(),
        ));
    }

    if assist.context_top_k == 0 {
        return Err(ConfigError::Validation(
            "assist.context_top_k must be greater than zero".to_string(),
        ));
    }

    validate_unit_interval("assist.fallback_confidence", assist.fallback_confidence)
}

fn validate_unit_interval(key: &str, value: f64) -> Result<(), ConfigError> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(ConfigError::Validation(format!("{key} must be in range 0.0..=1.0")))
    }
}

fn validate_workers(workers: &WorkerConfig) -> Result<(), ConfigError> {
    if workers.worker_count == 0 {
        return Err(ConfigError::Validation(
            "workers.worker_count must be greater than zero".to_string(),
        ));
    }

    if workers.queue_capacity == 0 {
        return Err(ConfigError::Validation(
            "workers.queue_capacity must be greater than zero".to_string(),
        ));
    }

    Ok(())
}

fn validate_server(server: &ServerConfig) -> Result<(), ConfigError> {
    if server.port == 0 {
        return Err(ConfigError::Validation("server.port must be greater than zero".to_string()));
    }

    if server.graceful_shutdown_secs == 0 {
        return Err(ConfigError::Validation(
            "server.graceful_shutdown_secs must be greater than zero".to_string(),
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

fn parse_u16(key: &str, value: &str) -> Result<u16, ConfigError> {
    value.parse::<u16>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
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

fn parse_usize(key: &str, value: &str) -> Result<usize, ConfigError> {
    value.parse::<usize>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_f64(key: &str, value: &str) -> Result<f64, ConfigError> {
    value.parse::<f64>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    database: Option<DatabasePatch>,
    model: Option<ModelPatch>,
    assist: Option<AssistPatch>,
    auto_reply: Option<AutoReplyPatch>,
    workers: Option<WorkersPatch>,
    server: Option<ServerPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct DatabasePatch {
    url: Option<String>,
    max_connections: Option<u32>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct ModelPatch {
    api_key: Option<String>,
    base_url: Option<String>,
    model: Option<String>,
    embedding_model: Option<String>,
    timeout_secs: Option<u64>,
    max_retries: Option<u32>,
    retry_base_delay_ms: Option<u64>,
    rate_limit_padding: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
struct AssistPatch {
    agent_language: Option<String>,
    context_top_k: Option<usize>,
    fallback_confidence: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
struct AutoReplyPatch {
    default_threshold: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
struct WorkersPatch {
    worker_count: Option<usize>,
    queue_capacity: Option<usize>,
    drain_timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerPatch {
    bind_address: Option<String>,
    port: Option<u16>,
    graceful_shutdown_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}
