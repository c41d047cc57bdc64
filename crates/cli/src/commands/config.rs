use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::{ExposeSecret, SecretString};
use toml::Value;
use twinquery_core::config::{resolve_config_path, AppConfig, ConfigOverrides, LoadOptions};

use super::CommandResult;

/// Effective configuration with per-field source attribution. Secrets are
/// redacted.
pub fn run(options: &LoadOptions) -> CommandResult {
    match AppConfig::load(options.clone()) {
        Ok(config) => render(&config, options),
        Err(error) => CommandResult::failure("config", "config_validation", error.to_string(), 2),
    }
}

pub fn render(config: &AppConfig, options: &LoadOptions) -> CommandResult {
    let file_path = resolve_config_path(options.config_path.as_deref());
    let sources = Sources {
        flags: flag_keys(&options.overrides),
        doc: load_config_file_doc(file_path.as_deref()),
        path: file_path,
    };

    let mut lines =
        vec!["effective config (source precedence: flag > env > file > default):".to_string()];
    let mut push = |key: &str, env_key: &str, value: &str| {
        lines.push(format!("- {key} = {value} (source: {})", sources.field_source(key, env_key)));
    };

    push("llm.provider", "TWINQUERY_LLM_PROVIDER", &format!("{:?}", config.llm.provider));
    push("llm.model", "TWINQUERY_LLM_MODEL", &config.llm.model);
    push(
        "llm.base_url",
        "TWINQUERY_LLM_BASE_URL",
        config.llm.base_url.as_deref().unwrap_or("<unset>"),
    );
    push("llm.api_key", "TWINQUERY_LLM_API_KEY", &redact(config.llm.api_key.as_ref()));
    push("llm.timeout_secs", "TWINQUERY_LLM_TIMEOUT_SECS", &config.llm.timeout_secs.to_string());
    push("llm.max_retries", "TWINQUERY_LLM_MAX_RETRIES", &config.llm.max_retries.to_string());

    push(
        "store.endpoint",
        "TWINQUERY_STORE_ENDPOINT",
        config.store.endpoint.as_deref().unwrap_or("<unset>"),
    );
    push("store.key", "TWINQUERY_STORE_KEY", &redact(config.store.key.as_ref()));
    push("store.database", "TWINQUERY_STORE_DATABASE", &config.store.database);
    push(
        "store.page_size_cap",
        "TWINQUERY_STORE_PAGE_SIZE_CAP",
        &config.store.page_size_cap.to_string(),
    );

    push(
        "query.partition_key_field",
        "TWINQUERY_QUERY_PARTITION_KEY_FIELD",
        &config.query.partition_key_field,
    );
    push("query.container_alias", "TWINQUERY_QUERY_CONTAINER_ALIAS", &config.query.container_alias);
    push(
        "query.partition_filter",
        "TWINQUERY_QUERY_PARTITION_FILTER",
        &format!("{:?}", config.query.partition_filter),
    );

    push("logging.level", "TWINQUERY_LOGGING_LEVEL", &config.logging.level);
    push("logging.format", "TWINQUERY_LOGGING_FORMAT", &format!("{:?}", config.logging.format));

    let mode = if config.store.is_configured() { "live" } else { "mock" };
    lines.push(format!("execution mode: {mode}"));

    CommandResult::text(0, lines.join("\n"))
}

struct Sources {
    flags: Vec<&'static str>,
    doc: Option<Value>,
    path: Option<PathBuf>,
}

impl Sources {
    fn field_source(&self, key_path: &str, env_key: &str) -> String {
        if self.flags.contains(&key_path) {
            return "flag".to_string();
        }

        if env::var_os(env_key).is_some() {
            return format!("env ({env_key})");
        }

        if let Some(doc) = &self.doc {
            if contains_path(doc, key_path) {
                let file_path = self
                    .path
                    .as_ref()
                    .map(|path| path.display().to_string())
                    .unwrap_or_else(|| "config file".to_string());
                return format!("file ({file_path})");
            }
        }

        "default".to_string()
    }
}

/// Config keys set by command-line overrides.
fn flag_keys(overrides: &ConfigOverrides) -> Vec<&'static str> {
    [
        ("logging.level", overrides.log_level.is_some()),
        ("llm.provider", overrides.llm_provider.is_some()),
        ("llm.model", overrides.llm_model.is_some()),
        ("llm.base_url", overrides.llm_base_url.is_some()),
        ("store.endpoint", overrides.store_endpoint.is_some()),
        ("store.key", overrides.store_key.is_some()),
        ("store.database", overrides.store_database.is_some()),
        ("store.page_size_cap", overrides.page_size_cap.is_some()),
        ("query.partition_filter", overrides.partition_filter.is_some()),
    ]
    .into_iter()
    .filter_map(|(key, set)| set.then_some(key))
    .collect()
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let path = path?;
    let raw = fs::read_to_string(path).ok()?;
    raw.parse::<Value>().ok()
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

fn redact(secret: Option<&SecretString>) -> String {
    let Some(secret) = secret else {
        return "<unset>".to_string();
    };
    let trimmed = secret.expose_secret().trim();
    if trimmed.is_empty() {
        return "<empty>".to_string();
    }

    if let Some((prefix, _)) = trimmed.split_once('-') {
        if prefix.len() <= 4 {
            return format!("{prefix}-***");
        }
    }

    "<redacted>".to_string()
}
