use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::dispatch::completion::{CompletionClient, CompletionEndpoint};
use crate::dispatch::demo::SectionType;
use crate::dispatch::http::HttpDispatch;
use crate::dispatch::transcription::{TranscriptionClient, TranscriptionEndpoint};
use crate::dispatch::{
    CompletionRequest, CompletionResult, TranscriptionRequest, TranscriptionResult,
};
use crate::parsers::clinical::{self, ClinicalSections};
use crate::resilience::{RateBudget, RateLimiter, RetryExecutor};
use crate::usage::{HealthReport, UsageMetrics, UsageMonitor};

pub const DEFAULT_LANGUAGE: &str = "nl";
pub const DEFAULT_TEMPERATURE: f64 = 0.7;
pub const DEFAULT_TRANSCRIPTION_TEMPERATURE: f64 = 0.0;

/// Per-call knobs for text generation. `None` fields take the configured
/// defaults.
#[derive(Debug, Clone, Default)]
pub struct GenerateOptions {
    pub model: Option<String>,
    pub temperature: Option<f64>,
    pub max_tokens: Option<u32>,
    pub stop_sequences: Option<Vec<String>>,
    pub section_type: SectionType,
    pub cancellation: Option<CancellationToken>,
}

#[derive(Debug, Clone)]
pub struct TranscribeOptions {
    pub mime_type: String,
    pub language: String,
    pub prompt: Option<String>,
    pub temperature: f64,
    pub cancellation: Option<CancellationToken>,
}

impl Default for TranscribeOptions {
    fn default() -> Self {
        Self {
            mime_type: String::new(),
            language: DEFAULT_LANGUAGE.to_string(),
            prompt: None,
            temperature: DEFAULT_TRANSCRIPTION_TEMPERATURE,
            cancellation: None,
        }
    }
}

/// Process-wide context: one rate budget, one usage monitor and the two
/// service clients, shared by every caller.
pub struct Engine {
    config: Config,
    limiter: Arc<RateLimiter>,
    usage: Arc<UsageMonitor>,
    completion: CompletionClient,
    transcription: TranscriptionClient,
}

impl Engine {
    pub fn from_config(config: Config) -> Self {
        let http = Arc::new(HttpDispatch::new());
        let limiter = Arc::new(RateLimiter::new(config.rate_limit));
        let usage = Arc::new(UsageMonitor::new());

        let completion = CompletionClient::new(
            http.clone(),
            CompletionEndpoint {
                url: config.completion_url.clone(),
                api_key: config.api_key.clone(),
                timeout: config.completion_timeout,
            },
            limiter.clone(),
            RetryExecutor::new(config.retry),
            usage.clone(),
        );

        let transcription = TranscriptionClient::new(
            http,
            TranscriptionEndpoint {
                url: config.transcription_url.clone(),
                api_key: config.api_key.clone(),
                timeout: config.transcription_timeout,
            },
            RetryExecutor::new(config.transcription_retry),
            usage.clone(),
        );

        tracing::info!(
            default_model = config.default_model,
            demo_mode = config.api_key.is_none(),
            rate_capacity = config.rate_limit.capacity,
            max_attempts = config.retry.max_attempts,
            "engine ready"
        );

        Self {
            config,
            limiter,
            usage,
            completion,
            transcription,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn completion(&self) -> &CompletionClient {
        &self.completion
    }

    pub fn transcription(&self) -> &TranscriptionClient {
        &self.transcription
    }

    pub fn is_demo_mode(&self) -> bool {
        !self.completion.has_credential()
    }

    /// Generate clinical text. Always yields a terminal result; failures are
    /// reported through `error_kind`, never as a panic or a bare error.
    pub async fn generate_content(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        options: GenerateOptions,
    ) -> CompletionResult {
        let request = CompletionRequest {
            system_prompt: system_prompt.to_string(),
            user_prompt: user_prompt.to_string(),
            model: options
                .model
                .unwrap_or_else(|| self.config.default_model.clone()),
            temperature: options.temperature.unwrap_or(DEFAULT_TEMPERATURE),
            max_tokens: options.max_tokens.unwrap_or(self.config.default_max_tokens),
            stop_sequences: options.stop_sequences,
            section_type: options.section_type,
        };
        self.completion
            .generate(&request, options.cancellation.as_ref())
            .await
    }

    pub async fn transcribe(&self, audio: Vec<u8>, options: TranscribeOptions) -> TranscriptionResult {
        let request = TranscriptionRequest {
            audio,
            mime_type: options.mime_type,
            language: options.language,
            prompt: options.prompt,
            temperature: options.temperature,
        };
        self.transcription
            .transcribe(&request, options.cancellation.as_ref())
            .await
    }

    pub fn parse_clinical_text(&self, raw_text: &str) -> ClinicalSections {
        clinical::parse(raw_text)
    }

    pub fn usage_snapshot(&self) -> UsageMetrics {
        self.usage.snapshot()
    }

    pub fn health(&self) -> HealthReport {
        self.usage.health()
    }

    pub fn reset_usage(&self) {
        self.usage.reset();
    }

    pub async fn rate_budget(&self) -> RateBudget {
        self.limiter.budget().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn demo_engine() -> Engine {
        Engine::from_config(Config::from_lookup(|_| None))
    }

    #[tokio::test]
    async fn demo_mode_serves_section_content() {
        let engine = demo_engine();
        assert!(engine.is_demo_mode());

        let result = engine
            .generate_content(
                "Je bent fysiotherapeut.",
                "Patiënt met lage rugpijn.",
                GenerateOptions {
                    section_type: SectionType::Soap,
                    ..Default::default()
                },
            )
            .await;

        assert!(result.success);
        assert_eq!(result.model, "demo");
        assert_eq!(result.error_kind, Some(ErrorKind::DegradedFallback));
        assert_eq!(engine.completion().network_calls(), 0);
    }

    #[tokio::test]
    async fn invalid_request_is_structural_even_in_demo_mode() {
        let engine = demo_engine();
        let result = engine
            .generate_content(
                "",
                "tekst",
                GenerateOptions {
                    temperature: Some(3.0),
                    ..Default::default()
                },
            )
            .await;
        assert!(!result.success);
        assert_eq!(result.error_kind, Some(ErrorKind::Structural));
    }

    #[tokio::test]
    async fn transcription_without_credential_is_structural() {
        let engine = demo_engine();
        let result = engine
            .transcribe(
                vec![1, 2, 3],
                TranscribeOptions {
                    mime_type: "audio/webm".to_string(),
                    ..Default::default()
                },
            )
            .await;
        assert!(!result.success);
        assert_eq!(result.error_kind, Some(ErrorKind::Structural));
        assert_eq!(engine.transcription().network_calls(), 0);
    }

    #[tokio::test]
    async fn fresh_budget_is_full() {
        let engine = demo_engine();
        let budget = engine.rate_budget().await;
        assert_eq!(budget.capacity, 100);
        assert!((budget.tokens_available - 100.0).abs() < 1e-9);
    }
}
