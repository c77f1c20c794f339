use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::Deserialize;

use crate::dispatch::registry::{DEFAULT_MODEL, Registry};
use crate::error::FysioError;
use crate::resilience::{RateLimiterConfig, RetryPolicy};

pub const DEFAULT_COMPLETION_URL: &str = "https://api.openai.com/v1/chat/completions";
pub const DEFAULT_TRANSCRIPTION_URL: &str = "https://api.openai.com/v1/audio/transcriptions";
pub const DEFAULT_MAX_TOKENS: u32 = 1000;
pub const DEFAULT_CONFIG_FILE: &str = "fysioscribe.toml";

/// Engine settings. Read once at startup; nothing re-reads the environment
/// after construction.
#[derive(Clone)]
pub struct Config {
    /// Absent or blank puts the completion client in demo mode.
    pub api_key: Option<String>,
    pub completion_url: String,
    pub transcription_url: String,
    pub default_model: String,
    pub default_max_tokens: u32,
    pub completion_timeout: Duration,
    pub transcription_timeout: Duration,
    pub retry: RetryPolicy,
    /// Transcription keeps its own attempt cap; backoff timing is shared.
    pub transcription_retry: RetryPolicy,
    pub rate_limit: RateLimiterConfig,
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .field("completion_url", &self.completion_url)
            .field("transcription_url", &self.transcription_url)
            .field("default_model", &self.default_model)
            .field("default_max_tokens", &self.default_max_tokens)
            .field("completion_timeout", &self.completion_timeout)
            .field("transcription_timeout", &self.transcription_timeout)
            .field("retry", &self.retry)
            .field("transcription_retry", &self.transcription_retry)
            .field("rate_limit", &self.rate_limit)
            .finish()
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_key: None,
            completion_url: DEFAULT_COMPLETION_URL.to_string(),
            transcription_url: DEFAULT_TRANSCRIPTION_URL.to_string(),
            default_model: DEFAULT_MODEL.to_string(),
            default_max_tokens: DEFAULT_MAX_TOKENS,
            completion_timeout: Duration::from_secs(60),
            transcription_timeout: Duration::from_secs(120),
            retry: RetryPolicy::default(),
            transcription_retry: RetryPolicy::default(),
            rate_limit: RateLimiterConfig::default(),
        }
    }
}

/// Optional on-disk overrides (`fysioscribe.toml`). Credentials come from
/// the environment only.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    pub completion_url: Option<String>,
    pub transcription_url: Option<String>,
    pub default_model: Option<String>,
    pub max_tokens: Option<u32>,
    pub timeout_secs: Option<u64>,
    pub transcription_timeout_secs: Option<u64>,
    pub max_retries: Option<u32>,
    pub transcription_max_retries: Option<u32>,
    pub retry_base_ms: Option<u64>,
    pub rate_limit_capacity: Option<u32>,
    pub rate_limit_window_secs: Option<u64>,
}

impl FileConfig {
    pub fn parse(text: &str) -> Result<Self, FysioError> {
        toml::from_str(text).map_err(|e| FysioError::Config(format!("invalid config file: {e}")))
    }

    pub fn read(path: &Path) -> Result<Self, FysioError> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            FysioError::Config(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::parse(&text)
    }
}

impl Config {
    /// Config file (if any) then environment overrides.
    pub fn load() -> Self {
        let mut config = Self::default();

        let path = std::env::var("FYSIO_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_FILE));
        if path.exists() {
            match FileConfig::read(&path) {
                Ok(file) => {
                    tracing::info!(path = %path.display(), "loaded config file");
                    config.apply_file(file);
                }
                Err(e) => tracing::warn!(path = %path.display(), "ignoring config file: {e}"),
            }
        }

        config.apply_env(|key| std::env::var(key).ok());
        config.validate_model();
        config
    }

    /// Build from an arbitrary key lookup. Used by tests in place of the
    /// process environment.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();
        config.apply_env(lookup);
        config.validate_model();
        config
    }

    pub fn apply_file(&mut self, file: FileConfig) {
        if let Some(url) = file.completion_url {
            self.completion_url = url;
        }
        if let Some(url) = file.transcription_url {
            self.transcription_url = url;
        }
        if let Some(model) = file.default_model {
            self.default_model = model;
        }
        if let Some(n) = file.max_tokens.filter(|n| *n > 0) {
            self.default_max_tokens = n;
        }
        if let Some(secs) = file.timeout_secs.filter(|s| *s > 0) {
            self.completion_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = file.transcription_timeout_secs.filter(|s| *s > 0) {
            self.transcription_timeout = Duration::from_secs(secs);
        }
        if let Some(n) = file.max_retries.filter(|n| *n > 0) {
            self.retry.max_attempts = n;
        }
        if let Some(n) = file.transcription_max_retries.filter(|n| *n > 0) {
            self.transcription_retry.max_attempts = n;
        }
        if let Some(ms) = file.retry_base_ms {
            self.retry.base_delay = Duration::from_millis(ms);
            self.transcription_retry.base_delay = Duration::from_millis(ms);
        }
        if let Some(n) = file.rate_limit_capacity.filter(|n| *n > 0) {
            self.rate_limit.capacity = n;
        }
        if let Some(secs) = file.rate_limit_window_secs.filter(|s| *s > 0) {
            self.rate_limit.window = Duration::from_secs(secs);
        }
    }

    fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        self.api_key = lookup("OPENAI_API_KEY").filter(|k| !k.trim().is_empty());
        if self.api_key.is_none() {
            tracing::warn!("OPENAI_API_KEY not set — text generation runs in demo mode");
        }

        if let Some(url) = lookup("FYSIO_COMPLETION_URL") {
            self.completion_url = url;
        }
        if let Some(url) = lookup("FYSIO_TRANSCRIPTION_URL") {
            self.transcription_url = url;
        }
        if let Some(model) = lookup("FYSIO_DEFAULT_MODEL") {
            self.default_model = model;
        }
        if let Some(n) = parse_positive::<u32>(&lookup, "FYSIO_MAX_TOKENS") {
            self.default_max_tokens = n;
        }
        if let Some(secs) = parse_positive::<u64>(&lookup, "FYSIO_TIMEOUT_SECS") {
            self.completion_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = parse_positive::<u64>(&lookup, "FYSIO_TRANSCRIPTION_TIMEOUT_SECS") {
            self.transcription_timeout = Duration::from_secs(secs);
        }
        if let Some(n) = parse_positive::<u32>(&lookup, "FYSIO_MAX_RETRIES") {
            self.retry.max_attempts = n;
        }
        if let Some(n) = parse_positive::<u32>(&lookup, "FYSIO_TRANSCRIPTION_MAX_RETRIES") {
            self.transcription_retry.max_attempts = n;
        }
        if let Some(ms) = parse_positive::<u64>(&lookup, "FYSIO_RETRY_BASE_MS") {
            self.retry.base_delay = Duration::from_millis(ms);
            self.transcription_retry.base_delay = Duration::from_millis(ms);
        }
        if let Some(n) = parse_positive::<u32>(&lookup, "FYSIO_RATE_LIMIT_CAPACITY") {
            self.rate_limit.capacity = n;
        }
        if let Some(secs) = parse_positive::<u64>(&lookup, "FYSIO_RATE_LIMIT_WINDOW_SECS") {
            self.rate_limit.window = Duration::from_secs(secs);
        }
    }

    fn validate_model(&mut self) {
        if Registry::get(&self.default_model).is_none() {
            tracing::warn!(
                model = self.default_model,
                suggestions = ?Registry::suggest_models(&self.default_model),
                "unknown default model, using {DEFAULT_MODEL}"
            );
            self.default_model = DEFAULT_MODEL.to_string();
        }
    }
}

/// Positive integer from the lookup; malformed or zero values are ignored.
fn parse_positive<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T>
where
    T: FromStr + PartialOrd + Default,
{
    let raw = lookup(key)?;
    match raw.trim().parse::<T>() {
        Ok(v) if v > T::default() => Some(v),
        _ => {
            tracing::warn!(key = key, value = raw, "ignoring invalid numeric setting");
            None
        }
    }
}
