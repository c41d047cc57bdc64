use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::query::PartitionFilterPolicy;

pub const DEFAULT_PAGE_SIZE_CAP: usize = 100;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub llm: LlmConfig,
    pub store: StoreConfig,
    pub query: QueryConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct LlmConfig {
    pub provider: LlmProvider,
    pub api_key: Option<SecretString>,
    pub base_url: Option<String>,
    pub model: String,
    pub api_version: Option<String>,
    pub timeout_secs: u64,
    pub max_retries: u32,
    pub max_tokens: u32,
}

#[derive(Clone, Debug)]
pub struct StoreConfig {
    pub endpoint: Option<String>,
    pub key: Option<SecretString>,
    pub database: String,
    pub timeout_secs: u64,
    pub page_size_cap: usize,
}

#[derive(Clone, Debug)]
pub struct QueryConfig {
    pub partition_key_field: String,
    pub container_alias: String,
    pub partition_filter: PartitionFilterPolicy,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LlmProvider {
    OpenAi,
    AzureOpenAi,
    Anthropic,
    Ollama,
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
    pub log_level: Option<String>,
    pub llm_provider: Option<LlmProvider>,
    pub llm_model: Option<String>,
    pub llm_base_url: Option<String>,
    pub store_endpoint: Option<String>,
    pub store_key: Option<String>,
    pub store_database: Option<String>,
    pub page_size_cap: Option<usize>,
    pub partition_filter: Option<PartitionFilterPolicy>,
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
            llm: LlmConfig {
                provider: LlmProvider::Ollama,
                api_key: None,
                base_url: None,
                model: "llama3.1".to_string(),
                api_version: None,
                timeout_secs: 60,
                max_retries: 2,
                max_tokens: 1024,
            },
            store: StoreConfig {
                endpoint: None,
                key: None,
                database: "TwinHumanDB".to_string(),
                timeout_secs: 30,
                page_size_cap: DEFAULT_PAGE_SIZE_CAP,
            },
            query: QueryConfig {
                partition_key_field: "TwinID".to_string(),
                container_alias: "c".to_string(),
                partition_filter: PartitionFilterPolicy::Inject,
            },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

fn secret_value(value: String) -> SecretString {
    value.into()
}

impl std::str::FromStr for LlmProvider {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "openai" => Ok(Self::OpenAi),
            "azure_openai" | "azure" => Ok(Self::AzureOpenAi),
            "anthropic" => Ok(Self::Anthropic),
            "ollama" => Ok(Self::Ollama),
            other => Err(ConfigError::Validation(format!(
                "unsupported llm provider `{other}` (expected openai|azure_openai|anthropic|ollama)"
            ))),
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

impl StoreConfig {
    /// A live store needs both an endpoint and a key; anything less runs in
    /// mock mode.
    pub fn is_configured(&self) -> bool {
        let endpoint = self.endpoint.as_deref().map(str::trim).unwrap_or("");
        let key = self.key.as_ref().map(|key| key.expose_secret().trim().is_empty()).unwrap_or(true);
        !endpoint.is_empty() && !key
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
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("twinquery.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(llm) = patch.llm {
            if let Some(provider) = llm.provider {
                self.llm.provider = provider;
            }
            if let Some(llm_api_key_value) = llm.api_key {
                self.llm.api_key = Some(secret_value(llm_api_key_value));
            }
            if let Some(base_url) = llm.base_url {
                self.llm.base_url = Some(base_url);
            }
            if let Some(model) = llm.model {
                self.llm.model = model;
            }
            if let Some(api_version) = llm.api_version {
                self.llm.api_version = Some(api_version);
            }
            if let Some(timeout_secs) = llm.timeout_secs {
                self.llm.timeout_secs = timeout_secs;
            }
            if let Some(max_retries) = llm.max_retries {
                self.llm.max_retries = max_retries;
            }
            if let Some(max_tokens) = llm.max_tokens {
                self.llm.max_tokens = max_tokens;
            }
        }

        if let Some(store) = patch.store {
            if let Some(endpoint) = store.endpoint {
                self.store.endpoint = Some(endpoint);
            }
            if let Some(store_key_value) = store.key {
                self.store.key = Some(secret_value(store_key_value));
            }
            if let Some(database) = store.database {
                self.store.database = database;
            }
            if let Some(timeout_secs) = store.timeout_secs {
                self.store.timeout_secs = timeout_secs;
            }
            if let Some(page_size_cap) = store.page_size_cap {
                self.store.page_size_cap = page_size_cap;
            }
        }

        if let Some(query) = patch.query {
            if let Some(partition_key_field) = query.partition_key_field {
                self.query.partition_key_field = partition_key_field;
            }
            if let Some(container_alias) = query.container_alias {
                self.query.container_alias = container_alias;
            }
            if let Some(partition_filter) = query.partition_filter {
                self.query.partition_filter = partition_filter;
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
        if let Some(value) = read_env("TWINQUERY_LLM_PROVIDER") {
            self.llm.provider = value.parse()?;
        }
        if let Some(value) = read_env("TWINQUERY_LLM_API_KEY") {
            self.llm.api_key = Some(secret_value(value));
        }
        if let Some(value) = read_env("TWINQUERY_LLM_BASE_URL") {
            self.llm.base_url = Some(value);
        }
        if let Some(value) = read_env("TWINQUERY_LLM_MODEL") {
            self.llm.model = value;
        }
        if let Some(value) = read_env("TWINQUERY_LLM_API_VERSION") {
            self.llm.api_version = Some(value);
        }
        if let Some(value) = read_env("TWINQUERY_LLM_TIMEOUT_SECS") {
            self.llm.timeout_secs = parse_u64("TWINQUERY_LLM_TIMEOUT_SECS", &value)?;
        }
        if let Some(value) = read_env("TWINQUERY_LLM_MAX_RETRIES") {
            self.llm.max_retries = parse_u32("TWINQUERY_LLM_MAX_RETRIES", &value)?;
        }
        if let Some(value) = read_env("TWINQUERY_LLM_MAX_TOKENS") {
            self.llm.max_tokens = parse_u32("TWINQUERY_LLM_MAX_TOKENS", &value)?;
        }

        if let Some(value) = read_env("TWINQUERY_STORE_ENDPOINT") {
            self.store.endpoint = Some(value);
        }
        if let Some(value) = read_env("TWINQUERY_STORE_KEY") {
            self.store.key = Some(secret_value(value));
        }
        if let Some(value) = read_env("TWINQUERY_STORE_DATABASE") {
            self.store.database = value;
        }
        if let Some(value) = read_env("TWINQUERY_STORE_TIMEOUT_SECS") {
            self.store.timeout_secs = parse_u64("TWINQUERY_STORE_TIMEOUT_SECS", &value)?;
        }
        if let Some(value) = read_env("TWINQUERY_STORE_PAGE_SIZE_CAP") {
            self.store.page_size_cap = parse_usize("TWINQUERY_STORE_PAGE_SIZE_CAP", &value)?;
        }

        if let Some(value) = read_env("TWINQUERY_QUERY_PARTITION_KEY_FIELD") {
            self.query.partition_key_field = value;
        }
        if let Some(value) = read_env("TWINQUERY_QUERY_CONTAINER_ALIAS") {
            self.query.container_alias = value;
        }
        if let Some(value) = read_env("TWINQUERY_QUERY_PARTITION_FILTER") {
            self.query.partition_filter = value.parse().map_err(|_| {
                ConfigError::InvalidEnvOverride {
                    key: "TWINQUERY_QUERY_PARTITION_FILTER".to_string(),
                    value: value.clone(),
                }
            })?;
        }

        let log_level =
            read_env("TWINQUERY_LOGGING_LEVEL").or_else(|| read_env("TWINQUERY_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("TWINQUERY_LOGGING_FORMAT").or_else(|| read_env("TWINQUERY_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
        if let Some(llm_provider) = overrides.llm_provider {
            self.llm.provider = llm_provider;
        }
        if let Some(llm_model) = overrides.llm_model {
            self.llm.model = llm_model;
        }
        if let Some(llm_base_url) = overrides.llm_base_url {
            self.llm.base_url = Some(llm_base_url);
        }
        if let Some(store_endpoint) = overrides.store_endpoint {
            self.store.endpoint = Some(store_endpoint);
        }
        if let Some(store_key) = overrides.store_key {
            self.store.key = Some(secret_value(store_key));
        }
        if let Some(store_database) = overrides.store_database {
            self.store.database = store_database;
        }
        if let Some(page_size_cap) = overrides.page_size_cap {
            self.store.page_size_cap = page_size_cap;
        }
        if let Some(partition_filter) = overrides.partition_filter {
            self.query.partition_filter = partition_filter;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_llm(&self.llm)?;
        validate_store(&self.store)?;
        validate_query(&self.query)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

/// The config file `load` would read, if any.
pub fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("twinquery.toml"), PathBuf::from("config/twinquery.toml")]
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

fn validate_llm(llm: &LlmConfig) -> Result<(), ConfigError> {
    if llm.timeout_secs == 0 || llm.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "llm.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    if llm.model.trim().is_empty() {
        return Err(ConfigError::Validation("llm.model must not be empty".to_string()));
    }

    let has_base_url = llm.base_url.as_ref().map(|value| !value.trim().is_empty()).unwrap_or(false);
    let has_api_key =
        llm.api_key.as_ref().map(|value| !value.expose_secret().trim().is_empty()).unwrap_or(false);

    match llm.provider {
        LlmProvider::OpenAi | LlmProvider::Anthropic => {
            if !has_api_key {
                return Err(ConfigError::Validation(
                    "llm.api_key is required for openai/anthropic providers".to_string(),
                ));
            }
        }
        LlmProvider::AzureOpenAi => {
            if !has_api_key || !has_base_url {
                return Err(ConfigError::Validation(
                    "llm.api_key and llm.base_url (resource endpoint) are required for azure_openai"
                        .to_string(),
                ));
            }
        }
        LlmProvider::Ollama => {}
    }

    Ok(())
}

fn validate_store(store: &StoreConfig) -> Result<(), ConfigError> {
    if store.page_size_cap == 0 || store.page_size_cap > 1_000 {
        return Err(ConfigError::Validation(
            "store.page_size_cap must be in range 1..=1000".to_string(),
        ));
    }

    if store.timeout_secs == 0 || store.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "store.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    if store.database.trim().is_empty() {
        return Err(ConfigError::Validation("store.database must not be empty".to_string()));
    }

    let endpoint = store.endpoint.as_deref().map(str::trim).filter(|value| !value.is_empty());
    if let Some(endpoint) = endpoint {
        if !endpoint.starts_with("http://") && !endpoint.starts_with("https://") {
            return Err(ConfigError::Validation(
                "store.endpoint must start with http:// or https://".to_string(),
            ));
        }

        let missing_key =
            store.key.as_ref().map(|key| key.expose_secret().trim().is_empty()).unwrap_or(true);
        if missing_key {
            return Err(ConfigError::Validation(
                "store.endpoint is set but store.key is missing; unset the endpoint to run in mock mode"
                    .to_string(),
            ));
        }
    }

    Ok(())
}

fn validate_query(query: &QueryConfig) -> Result<(), ConfigError> {
    let is_identifier = |value: &str| {
        !value.is_empty()
            && value.chars().all(|ch| ch.is_ascii_alphanumeric() || ch == '_')
            && !value.starts_with(|ch: char| ch.is_ascii_digit())
    };

    if !is_identifier(&query.partition_key_field) {
        return Err(ConfigError::Validation(
            "query.partition_key_field must be a plain identifier".to_string(),
        ));
    }
    if !is_identifier(&query.container_alias) {
        return Err(ConfigError::Validation(
            "query.container_alias must be a plain identifier".to_string(),
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

fn parse_usize(key: &str, value: &str) -> Result<usize, ConfigError> {
    value.parse::<usize>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    llm: Option<LlmPatch>,
    store: Option<StorePatch>,
    query: Option<QueryPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct LlmPatch {
    provider: Option<LlmProvider>,
    api_key: Option<String>,
    base_url: Option<String>,
    model: Option<String>,
    api_version: Option<String>,
    timeout_secs: Option<u64>,
    max_retries: Option<u32>,
    max_tokens: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
struct StorePatch {
    endpoint: Option<String>,
    key: Option<String>,
    database: Option<String>,
    timeout_secs: Option<u64>,
    page_size_cap: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
struct QueryPatch {
    partition_key_field: Option<String>,
    container_alias: Option<String>,
    partition_filter: Option<PartitionFilterPolicy>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}
