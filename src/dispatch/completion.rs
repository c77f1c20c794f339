use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;

use crate::dispatch::demo::{self, DEMO_MODEL};
use crate::dispatch::http::{ChatCall, HttpDispatch};
use crate::dispatch::registry::{ModelEntry, PROVIDER, Registry};
use crate::dispatch::{CompletionRequest, CompletionResult, TokenUsage};
use crate::error::{ErrorKind, FysioError};
use crate::resilience::{RateLimiter, RetryExecutor};
use crate::tokens::{self, TokenCounter};
use crate::usage::UsageMonitor;

/// Upper bound on stop sequences accepted by the chat API.
pub const MAX_STOP_SEQUENCES: usize = 4;

/// Endpoint and credential for the text-generation service.
#[derive(Clone)]
pub struct CompletionEndpoint {
    pub url: String,
    /// `None` switches the client into demo mode.
    pub api_key: Option<String>,
    pub timeout: Duration,
}

impl std::fmt::Debug for CompletionEndpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompletionEndpoint")
            .field("url", &self.url)
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .field("timeout", &self.timeout)
            .finish()
    }
}

pub struct CompletionClient {
    http: Arc<HttpDispatch>,
    endpoint: CompletionEndpoint,
    limiter: Arc<RateLimiter>,
    retry: RetryExecutor,
    usage: Arc<UsageMonitor>,
    tokenizer: Option<Arc<dyn TokenCounter>>,
    network_calls: AtomicU64,
}

impl CompletionClient {
    pub fn new(
        http: Arc<HttpDispatch>,
        endpoint: CompletionEndpoint,
        limiter: Arc<RateLimiter>,
        retry: RetryExecutor,
        usage: Arc<UsageMonitor>,
    ) -> Self {
        Self {
            http,
            endpoint,
            limiter,
            retry,
            usage,
            tokenizer: None,
            network_calls: AtomicU64::new(0),
        }
    }

    /// Plug in a model-aware tokenizer for cost estimation.
    pub fn with_tokenizer(mut self, tokenizer: Arc<dyn TokenCounter>) -> Self {
        self.tokenizer = Some(tokenizer);
        self
    }

    pub fn has_credential(&self) -> bool {
        self.endpoint.api_key.is_some()
    }

    /// Number of HTTP attempts issued since construction.
    pub fn network_calls(&self) -> u64 {
        self.network_calls.load(Ordering::Relaxed)
    }

    /// Structural checks done before any network or rate-budget use.
    pub fn validate(req: &CompletionRequest) -> Result<&'static ModelEntry, FysioError> {
        let entry = Registry::resolve(&req.model)?;

        if !req.temperature.is_finite()
            || req.temperature < 0.0
            || req.temperature > entry.max_temperature
        {
            return Err(FysioError::InvalidRequest(format!(
                "temperature must be between 0.0 and {} for {}, got {}",
                entry.max_temperature, entry.model_id, req.temperature
            )));
        }

        if req.max_tokens == 0 || req.max_tokens > entry.max_output_tokens {
            return Err(FysioError::InvalidRequest(format!(
                "max_tokens must be between 1 and {} for {}, got {}",
                entry.max_output_tokens, entry.model_id, req.max_tokens
            )));
        }

        if req.user_prompt.trim().is_empty() {
            return Err(FysioError::InvalidRequest(
                "user prompt must not be empty".to_string(),
            ));
        }

        if let Some(stop) = &req.stop_sequences
            && stop.len() > MAX_STOP_SEQUENCES
        {
            return Err(FysioError::InvalidRequest(format!(
                "at most {MAX_STOP_SEQUENCES} stop sequences are allowed, got {}",
                stop.len()
            )));
        }

        Ok(entry)
    }

    pub async fn generate(
        &self,
        req: &CompletionRequest,
        cancel: Option<&CancellationToken>,
    ) -> CompletionResult {
        let entry = match Self::validate(req) {
            Ok(entry) => entry,
            Err(e) => {
                tracing::warn!(model = req.model, "completion request rejected: {e}");
                return CompletionResult::failure(&req.model, &e, 0);
            }
        };

        let Some(api_key) = self.endpoint.api_key.as_deref() else {
            tracing::info!(
                section = req.section_type.as_str(),
                "no completion credential configured, serving demo content"
            );
            return Self::demo_result(req);
        };

        let start = Instant::now();

        if let Err(e) = self.limiter.acquire(cancel).await {
            return CompletionResult::failure(entry.model_id, &e, 0);
        }

        let call = ChatCall {
            model: entry.model_id,
            system_prompt: &req.system_prompt,
            user_prompt: &req.user_prompt,
            temperature: req.temperature,
            max_tokens: req.max_tokens,
            stop: req.stop_sequences.as_deref(),
        };

        let mut attempts: u32 = 0;
        let result = self
            .retry
            .execute(cancel, |attempt| {
                attempts = attempt + 1;
                self.network_calls.fetch_add(1, Ordering::Relaxed);
                self.http.chat_completion(
                    PROVIDER,
                    &self.endpoint.url,
                    api_key,
                    &call,
                    self.endpoint.timeout,
                )
            })
            .await
            .and_then(|raw| {
                if raw.content.trim().is_empty() {
                    Err(FysioError::EmptyResult {
                        provider: PROVIDER.to_string(),
                        message: "completion content is empty".to_string(),
                    })
                } else {
                    Ok(raw)
                }
            });

        let duration_ms = start.elapsed().as_millis() as u64;

        let raw = match result {
            Ok(raw) => raw,
            Err(e) => {
                if e.kind() != ErrorKind::Cancelled {
                    self.usage.record(duration_ms, 0, 0.0, false, entry.model_id);
                }
                tracing::warn!(
                    provider = PROVIDER,
                    model = entry.model_id,
                    attempts = attempts,
                    kind = %e.kind(),
                    "completion failed: {e}"
                );
                return CompletionResult::failure(entry.model_id, &e, attempts);
            }
        };

        let usage = self.validated_usage(entry, req, &raw.content, raw.usage);
        let cost = entry.estimate_cost(usage.prompt_tokens, usage.completion_tokens);
        self.usage
            .record(duration_ms, usage.total_tokens, cost, true, entry.model_id);

        tracing::info!(
            provider = PROVIDER,
            model = entry.model_id,
            attempts = attempts,
            elapsed_ms = duration_ms,
            upstream_latency_ms = raw.latency_ms,
            total_tokens = usage.total_tokens,
            "completion succeeded"
        );

        CompletionResult {
            success: true,
            content: raw.content,
            model: raw.model.unwrap_or_else(|| entry.model_id.to_string()),
            usage: Some(usage),
            error_kind: None,
            error_message: None,
            estimated_cost: cost,
            attempts,
        }
    }

    /// Provider usage if it is well-formed, otherwise a local estimate.
    fn validated_usage(
        &self,
        entry: &ModelEntry,
        req: &CompletionRequest,
        content: &str,
        reported: Option<TokenUsage>,
    ) -> TokenUsage {
        if let Some(usage) = reported {
            if usage.is_well_formed() {
                return usage;
            }
            tracing::warn!(
                model = entry.model_id,
                prompt_tokens = usage.prompt_tokens,
                completion_tokens = usage.completion_tokens,
                total_tokens = usage.total_tokens,
                "provider usage is inconsistent, falling back to estimate"
            );
        }

        let counter = self.tokenizer.as_deref();
        let prompt_tokens = tokens::count_tokens(counter, entry.model_id, &req.system_prompt)
            + tokens::count_tokens(counter, entry.model_id, &req.user_prompt);
        let completion_tokens = tokens::count_tokens(counter, entry.model_id, content);
        TokenUsage::new(prompt_tokens, completion_tokens)
    }

    fn demo_result(req: &CompletionRequest) -> CompletionResult {
        CompletionResult {
            success: true,
            content: demo::content_for(req.section_type).to_string(),
            model: DEMO_MODEL.to_string(),
            usage: None,
            error_kind: Some(ErrorKind::DegradedFallback),
            error_message: Some(
                "no API credential configured — showing demo content".to_string(),
            ),
            estimated_cost: 0.0,
            attempts: 0,
        }
    }
}
