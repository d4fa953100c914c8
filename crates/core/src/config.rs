use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_OLLAMA_BASE_URL: &str = "http://localhost:11434/v1";
pub const DEFAULT_GEOCODING_URL: &str = "https://maps.googleapis.com/maps/api/geocode/json";
/// Upper bound on how many recent entries the sentinel scan may look at.
pub const MAX_HISTORY_WINDOW: usize = 10;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub llm: LlmConfig,
    pub geocoding: GeocodingConfig,
    pub service: ServiceConfig,
    pub conversation: ConversationConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct LlmConfig {
    pub provider: LlmProvider,
    pub api_key: Option<SecretString>,
    pub base_url: Option<String>,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    /// Estimated prompt tokens allowed per request; kept below the provider's
    /// enforced per-minute ceiling.
    pub token_budget: usize,
    pub timeout_secs: u64,
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
}

#[derive(Clone, Debug)]
pub struct GeocodingConfig {
    pub api_key: Option<SecretString>,
    pub base_url: String,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct ServiceConfig {
    pub base_url: String,
    pub wallet_address: String,
    pub flow: String,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct ConversationConfig {
    pub max_rounds: usize,
    pub consultation_rounds: usize,
    pub validation_attempts: u32,
    pub history_window: usize,
    pub personal_data_dir: Option<PathBuf>,
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
    pub llm_api_key: Option<String>,
    pub service_base_url: Option<String>,
    pub max_rounds: Option<usize>,
    pub personal_data_dir: Option<PathBuf>,
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
                provider: LlmProvider::OpenAi,
                api_key: None,
                base_url: None,
                model: "gpt-4o".to_string(),
                temperature: 0.7,
                max_tokens: 1000,
                token_budget: 25_000,
                timeout_secs: 60,
                max_attempts: 3,
                initial_backoff_ms: 1_000,
            },
            geocoding: GeocodingConfig {
                api_key: None,
                base_url: DEFAULT_GEOCODING_URL.to_string(),
                timeout_secs: 15,
            },
            service: ServiceConfig {
                base_url: "http://localhost:8000".to_string(),
                wallet_address: "0xac8CeB5131449e5850030737D10d1E25C6b8D80B".to_string(),
                flow: "regular".to_string(),
                timeout_secs: 30,
            },
            conversation: ConversationConfig {
                max_rounds: 40,
                consultation_rounds: 5,
                validation_attempts: 3,
                history_window: MAX_HISTORY_WINDOW,
                personal_data_dir: None,
            },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

impl LlmConfig {
    /// Chat-completions base URL after provider defaults are applied.
    pub fn endpoint(&self) -> String {
        if let Some(base_url) = self.base_url.as_deref().filter(|url| !url.trim().is_empty()) {
            return base_url.trim_end_matches('/').to_string();
        }

        match self.provider {
            LlmProvider::OpenAi => DEFAULT_OPENAI_BASE_URL.to_string(),
            LlmProvider::Ollama => DEFAULT_OLLAMA_BASE_URL.to_string(),
        }
    }

    pub fn has_credential(&self) -> bool {
        match self.provider {
            LlmProvider::OpenAi => self
                .api_key
                .as_ref()
                .map(|value| !value.expose_secret().trim().is_empty())
                .unwrap_or(false),
            LlmProvider::Ollama => true,
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
            "openai" | "open_ai" => Ok(Self::OpenAi),
            "ollama" => Ok(Self::Ollama),
            other => Err(ConfigError::Validation(format!(
                "unsupported llm provider `{other}` (expected openai|ollama)"
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

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("agentmart.toml"));
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
            if let Some(temperature) = llm.temperature {
                self.llm.temperature = temperature;
            }
            if let Some(max_tokens) = llm.max_tokens {
                self.llm.max_tokens = max_tokens;
            }
            if let Some(token_budget) = llm.token_budget {
                self.llm.token_budget = token_budget;
            }
            if let Some(timeout_secs) = llm.timeout_secs {
                self.llm.timeout_secs = timeout_secs;
            }
            if let Some(max_attempts) = llm.max_attempts {
                self.llm.max_attempts = max_attempts;
            }
            if let Some(initial_backoff_ms) = llm.initial_backoff_ms {
                self.llm.initial_backoff_ms = initial_backoff_ms;
            }
        }

        if let Some(geocoding) = patch.geocoding {
            if let Some(geocoding_api_key_value) = geocoding.api_key {
                self.geocoding.api_key = Some(secret_value(geocoding_api_key_value));
            }
            if let Some(base_url) = geocoding.base_url {
                self.geocoding.base_url = base_url;
            }
            if let Some(timeout_secs) = geocoding.timeout_secs {
                self.geocoding.timeout_secs = timeout_secs;
            }
        }

        if let Some(service) = patch.service {
            if let Some(base_url) = service.base_url {
                self.service.base_url = base_url;
            }
            if let Some(wallet_address) = service.wallet_address {
                self.service.wallet_address = wallet_address;
            }
            if let Some(flow) = service.flow {
                self.service.flow = flow;
            }
            if let Some(timeout_secs) = service.timeout_secs {
                self.service.timeout_secs = timeout_secs;
            }
        }

        if let Some(conversation) = patch.conversation {
            if let Some(max_rounds) = conversation.max_rounds {
                self.conversation.max_rounds = max_rounds;
            }
            if let Some(consultation_rounds) = conversation.consultation_rounds {
                self.conversation.consultation_rounds = consultation_rounds;
            }
            if let Some(validation_attempts) = conversation.validation_attempts {
                self.conversation.validation_attempts = validation_attempts;
            }
            if let Some(history_window) = conversation.history_window {
                self.conversation.history_window = history_window;
            }
            if let Some(personal_data_dir) = conversation.personal_data_dir {
                self.conversation.personal_data_dir = Some(personal_data_dir);
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
        if let Some(value) = read_env("AGENTMART_LLM_PROVIDER") {
            self.llm.provider = value.parse()?;
        }
        let llm_api_key = read_env("AGENTMART_LLM_API_KEY").or_else(|| read_env("OPENAI_API_KEY"));
        if let Some(value) = llm_api_key {
            self.llm.api_key = Some(secret_value(value));
        }
        if let Some(value) = read_env("AGENTMART_LLM_BASE_URL") {
            self.llm.base_url = Some(value);
        }
        if let Some(value) = read_env("AGENTMART_LLM_MODEL") {
            self.llm.model = value;
        }
        if let Some(value) = read_env("AGENTMART_LLM_TEMPERATURE") {
            self.llm.temperature = parse_f32("AGENTMART_LLM_TEMPERATURE", &value)?;
        }
        if let Some(value) = read_env("AGENTMART_LLM_MAX_TOKENS") {
            self.llm.max_tokens = parse_u32("AGENTMART_LLM_MAX_TOKENS", &value)?;
        }
        if let Some(value) = read_env("AGENTMART_LLM_TOKEN_BUDGET") {
            self.llm.token_budget = parse_usize("AGENTMART_LLM_TOKEN_BUDGET", &value)?;
        }
        if let Some(value) = read_env("AGENTMART_LLM_TIMEOUT_SECS") {
            self.llm.timeout_secs = parse_u64("AGENTMART_LLM_TIMEOUT_SECS", &value)?;
        }
        if let Some(value) = read_env("AGENTMART_LLM_MAX_ATTEMPTS") {
            self.llm.max_attempts = parse_u32("AGENTMART_LLM_MAX_ATTEMPTS", &value)?;
        }
        if let Some(value) = read_env("AGENTMART_LLM_INITIAL_BACKOFF_MS") {
            self.llm.initial_backoff_ms = parse_u64("AGENTMART_LLM_INITIAL_BACKOFF_MS", &value)?;
        }

        let geocoding_api_key =
            read_env("AGENTMART_GEOCODING_API_KEY").or_else(|| read_env("GOOGLE_API_KEY"));
        if let Some(value) = geocoding_api_key {
            self.geocoding.api_key = Some(secret_value(value));
        }
        if let Some(value) = read_env("AGENTMART_GEOCODING_BASE_URL") {
            self.geocoding.base_url = value;
        }

        if let Some(value) = read_env("AGENTMART_SERVICE_BASE_URL") {
            self.service.base_url = value;
        }
        if let Some(value) = read_env("AGENTMART_SERVICE_WALLET_ADDRESS") {
            self.service.wallet_address = value;
        }
        if let Some(value) = read_env("AGENTMART_SERVICE_FLOW") {
            self.service.flow = value;
        }

        if let Some(value) = read_env("AGENTMART_CONVERSATION_MAX_ROUNDS") {
            self.conversation.max_rounds =
                parse_usize("AGENTMART_CONVERSATION_MAX_ROUNDS", &value)?;
        }
        if let Some(value) = read_env("AGENTMART_CONVERSATION_CONSULTATION_ROUNDS") {
            self.conversation.consultation_rounds =
                parse_usize("AGENTMART_CONVERSATION_CONSULTATION_ROUNDS", &value)?;
        }
        if let Some(value) = read_env("AGENTMART_CONVERSATION_VALIDATION_ATTEMPTS") {
            self.conversation.validation_attempts =
                parse_u32("AGENTMART_CONVERSATION_VALIDATION_ATTEMPTS", &value)?;
        }
        if let Some(value) = read_env("AGENTMART_CONVERSATION_HISTORY_WINDOW") {
            self.conversation.history_window =
                parse_usize("AGENTMART_CONVERSATION_HISTORY_WINDOW", &value)?;
        }
        if let Some(value) = read_env("AGENTMART_PERSONAL_DATA_DIR") {
            self.conversation.personal_data_dir = Some(PathBuf::from(value));
        }

        let log_level =
            read_env("AGENTMART_LOGGING_LEVEL").or_else(|| read_env("AGENTMART_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("AGENTMART_LOGGING_FORMAT").or_else(|| read_env("AGENTMART_LOG_FORMAT"));
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
        if let Some(llm_api_key) = overrides.llm_api_key {
            self.llm.api_key = Some(secret_value(llm_api_key));
        }
        if let Some(service_base_url) = overrides.service_base_url {
            self.service.base_url = service_base_url;
        }
        if let Some(max_rounds) = overrides.max_rounds {
            self.conversation.max_rounds = max_rounds;
        }
        if let Some(personal_data_dir) = overrides.personal_data_dir {
            self.conversation.personal_data_dir = Some(personal_data_dir);
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_llm(&self.llm)?;
        validate_geocoding(&self.geocoding)?;
        validate_service(&self.service)?;
        validate_conversation(&self.conversation)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("agentmart.toml"), PathBuf::from("config/agentmart.toml")]
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
    if llm.model.trim().is_empty() {
        return Err(ConfigError::Validation("llm.model must not be empty".to_string()));
    }

    if llm.timeout_secs == 0 || llm.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "llm.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    if !(0.0..=2.0).contains(&llm.temperature) {
        return Err(ConfigError::Validation(
            "llm.temperature must be in range 0.0..=2.0".to_string(),
        ));
    }

    if llm.max_tokens == 0 {
        return Err(ConfigError::Validation(
            "llm.max_tokens must be greater than zero".to_string(),
        ));
    }

    if llm.token_budget == 0 {
        return Err(ConfigError::Validation(
            "llm.token_budget must be greater than zero".to_string(),
        ));
    }

    if llm.max_attempts == 0 || llm.max_attempts > 10 {
        return Err(ConfigError::Validation(
            "llm.max_attempts must be in range 1..=10".to_string(),
        ));
    }

    if let Some(base_url) = &llm.base_url {
        if !is_http_url(base_url) {
            return Err(ConfigError::Validation(
                "llm.base_url must start with http:// or https://".to_string(),
            ));
        }
    }

    Ok(())
}

fn validate_geocoding(geocoding: &GeocodingConfig) -> Result<(), ConfigError> {
    if !is_http_url(&geocoding.base_url) {
        return Err(ConfigError::Validation(
            "geocoding.base_url must start with http:// or https://".to_string(),
        ));
    }

    if geocoding.timeout_secs == 0 || geocoding.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "geocoding.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    Ok(())
}

fn validate_service(service: &ServiceConfig) -> Result<(), ConfigError> {
    if !is_http_url(&service.base_url) {
        return Err(ConfigError::Validation(
            "service.base_url must start with http:// or https://".to_string(),
        ));
    }

    if service.timeout_secs == 0 || service.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "service.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    Ok(())
}

fn validate_conversation(conversation: &ConversationConfig) -> Result<(), ConfigError> {
    if conversation.max_rounds == 0 {
        return Err(ConfigError::Validation(
            "conversation.max_rounds must be greater than zero".to_string(),
        ));
    }

    if conversation.consultation_rounds == 0 {
        return Err(ConfigError::Validation(
            "conversation.consultation_rounds must be greater than zero".to_string(),
        ));
    }

    if conversation.validation_attempts == 0 {
        return Err(ConfigError::Validation(
            "conversation.validation_attempts must be greater than zero".to_string(),
        ));
    }

    if !(1..=MAX_HISTORY_WINDOW).contains(&conversation.history_window) {
        return Err(ConfigError::Validation(format!(
            "conversation.history_window must be between 1 and {MAX_HISTORY_WINDOW}, got {}",
            conversation.history_window
        )));
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

fn is_http_url(value: &str) -> bool {
    value.starts_with("http://") || value.starts_with("https://")
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

fn parse_f32(key: &str, value: &str) -> Result<f32, ConfigError> {
    value.parse::<f32>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    llm: Option<LlmPatch>,
    geocoding: Option<GeocodingPatch>,
    service: Option<ServicePatch>,
    conversation: Option<ConversationPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct LlmPatch {
    provider: Option<LlmProvider>,
    api_key: Option<String>,
    base_url: Option<String>,
    model: Option<String>,
    temperature: Option<f32>,
    max_tokens: Option<u32>,
    token_budget: Option<usize>,
    timeout_secs: Option<u64>,
    max_attempts: Option<u32>,
    initial_backoff_ms: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct GeocodingPatch {
    api_key: Option<String>,
    base_url: Option<String>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct ServicePatch {
    base_url: Option<String>,
    wallet_address: Option<String>,
    flow: Option<String>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct ConversationPatch {
    max_rounds: Option<usize>,
    consultation_rounds: Option<usize>,
    validation_attempts: Option<u32>,
    history_window: Option<usize>,
    personal_data_dir: Option<PathBuf>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}
