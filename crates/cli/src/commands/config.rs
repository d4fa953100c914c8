use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use agentmart_core::config::{AppConfig, LoadOptions};
use secrecy::{ExposeSecret, SecretString};
use toml::Value;

/// One reported setting: dotted key, rendered value, env vars that can set it.
struct Field {
    key: &'static str,
    value: String,
    env_keys: &'static [&'static str],
}

impl Field {
    fn new(key: &'static str, value: impl Into<String>, env_keys: &'static [&'static str]) -> Self {
        Self { key, value: value.into(), env_keys }
    }
}

pub fn run(options: &LoadOptions) -> String {
    let config = match AppConfig::load(options.clone()) {
        Ok(config) => config,
        Err(error) => return format!("config validation failed: {error}"),
    };

    let config_file_path = detect_config_path(options.config_path.as_deref());
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());

    let mut lines =
        vec!["effective config (source precedence: env > file > default):".to_string()];
    for field in fields(&config) {
        let source = field_source(
            field.key,
            field.env_keys,
            config_file_doc.as_ref(),
            config_file_path.as_deref(),
        );
        lines.push(format!("- {} = {} (source: {source})", field.key, field.value));
    }

    lines.join("\n")
}

fn fields(config: &AppConfig) -> Vec<Field> {
    let llm = &config.llm;
    let conversation = &config.conversation;
    vec![
        Field::new("llm.provider", format!("{:?}", llm.provider), &["AGENTMART_LLM_PROVIDER"]),
        Field::new("llm.model", &llm.model, &["AGENTMART_LLM_MODEL"]),
        Field::new("llm.base_url", llm.endpoint(), &["AGENTMART_LLM_BASE_URL"]),
        Field::new(
            "llm.api_key",
            redact_secret(llm.api_key.as_ref()),
            &["AGENTMART_LLM_API_KEY", "OPENAI_API_KEY"],
        ),
        Field::new("llm.temperature", llm.temperature.to_string(), &["AGENTMART_LLM_TEMPERATURE"]),
        Field::new("llm.max_tokens", llm.max_tokens.to_string(), &["AGENTMART_LLM_MAX_TOKENS"]),
        Field::new(
            "llm.token_budget",
            llm.token_budget.to_string(),
            &["AGENTMART_LLM_TOKEN_BUDGET"],
        ),
        Field::new(
            "llm.max_attempts",
            llm.max_attempts.to_string(),
            &["AGENTMART_LLM_MAX_ATTEMPTS"],
        ),
        Field::new(
            "geocoding.api_key",
            redact_secret(config.geocoding.api_key.as_ref()),
            &["AGENTMART_GEOCODING_API_KEY", "GOOGLE_API_KEY"],
        ),
        Field::new(
            "geocoding.base_url",
            &config.geocoding.base_url,
            &["AGENTMART_GEOCODING_BASE_URL"],
        ),
        Field::new("service.base_url", &config.service.base_url, &["AGENTMART_SERVICE_BASE_URL"]),
        Field::new(
            "service.wallet_address",
            &config.service.wallet_address,
            &["AGENTMART_SERVICE_WALLET_ADDRESS"],
        ),
        Field::new("service.flow", &config.service.flow, &["AGENTMART_SERVICE_FLOW"]),
        Field::new(
            "conversation.max_rounds",
            conversation.max_rounds.to_string(),
            &["AGENTMART_CONVERSATION_MAX_ROUNDS"],
        ),
        Field::new(
            "conversation.consultation_rounds",
            conversation.consultation_rounds.to_string(),
            &["AGENTMART_CONVERSATION_CONSULTATION_ROUNDS"],
        ),
        Field::new(
            "conversation.validation_attempts",
            conversation.validation_attempts.to_string(),
            &["AGENTMART_CONVERSATION_VALIDATION_ATTEMPTS"],
        ),
        Field::new(
            "conversation.history_window",
            conversation.history_window.to_string(),
            &["AGENTMART_CONVERSATION_HISTORY_WINDOW"],
        ),
        Field::new(
            "conversation.personal_data_dir",
            conversation
                .personal_data_dir
                .as_ref()
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| "<unset>".to_string()),
            &["AGENTMART_PERSONAL_DATA_DIR"],
        ),
        Field::new(
            "logging.level",
            &config.logging.level,
            &["AGENTMART_LOGGING_LEVEL", "AGENTMART_LOG_LEVEL"],
        ),
        Field::new(
            "logging.format",
            format!("{:?}", config.logging.format),
            &["AGENTMART_LOGGING_FORMAT", "AGENTMART_LOG_FORMAT"],
        ),
    ]
}

fn detect_config_path(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return path.exists().then(|| path.to_path_buf());
    }

    [PathBuf::from("agentmart.toml"), PathBuf::from("config/agentmart.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let path = path?;
    let raw = fs::read_to_string(path).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(
    key_path: &str,
    env_keys: &[&str],
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    if let Some(env_key) = env_keys.iter().find(|key| env::var_os(key).is_some()) {
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

fn redact_secret(secret: Option<&SecretString>) -> String {
    match secret.map(|value| value.expose_secret().trim().to_string()) {
        None => "<unset>".to_string(),
        Some(value) if value.is_empty() => "<empty>".to_string(),
        Some(value) => match value.split_once('-') {
            Some((prefix, _)) if prefix.len() <= 4 => format!("{prefix}-***"),
            _ => "<redacted>".to_string(),
        },
    }
}
