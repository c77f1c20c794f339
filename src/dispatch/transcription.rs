//! Speech-to-text client.
//!
//! Shares the retry executor's backoff with the completion client but
//! classifies failures with its own table: 401/403 abort at once, 408/429/5xx
//! and network failures retry up to the attempt cap.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use reqwest::multipart::{Form, Part};
use tokio_util::sync::CancellationToken;

use crate::dispatch::http::HttpDispatch;
use crate::dispatch::registry::{PROVIDER, TRANSCRIPTION_COST_PER_MINUTE, TRANSCRIPTION_MODEL};
use crate::dispatch::{TranscriptionRequest, TranscriptionResult};
use crate::error::{ErrorKind, FysioError};
use crate::resilience::RetryExecutor;
use crate::usage::UsageMonitor;

/// Extension used when the declared audio type is not in the table.
pub const DEFAULT_EXTENSION: &str = "webm";

/// Upload cap enforced by the transcription API.
pub const MAX_AUDIO_BYTES: usize = 25 * 1024 * 1024;

/// Declared MIME type → upload file extension.
const MIME_EXTENSIONS: &[(&str, &str)] = &[
    ("audio/webm", "webm"),
    ("video/webm", "webm"),
    ("audio/ogg", "ogg"),
    ("audio/opus", "ogg"),
    ("audio/mpeg", "mp3"),
    ("audio/mp3", "mp3"),
    ("audio/mpga", "mpga"),
    ("audio/mp4", "m4a"),
    ("audio/m4a", "m4a"),
    ("audio/x-m4a", "m4a"),
    ("audio/aac", "m4a"),
    ("video/mp4", "mp4"),
    ("audio/wav", "wav"),
    ("audio/x-wav", "wav"),
    ("audio/wave", "wav"),
    ("audio/flac", "flac"),
    ("audio/x-flac", "flac"),
];

/// Map a declared MIME type to a file extension the API accepts.
///
/// Parameters (`;codecs=opus`) are ignored. Unknown `audio/*` types and a
/// missing type fall back to [`DEFAULT_EXTENSION`]; anything that is clearly
/// not audio is rejected.
pub fn extension_for_mime(mime: &str) -> Result<&'static str, FysioError> {
    let essence = mime
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();

    if essence.is_empty() || essence == "application/octet-stream" {
        return Ok(DEFAULT_EXTENSION);
    }

    if let Some((_, ext)) = MIME_EXTENSIONS.iter().find(|(m, _)| *m == essence) {
        return Ok(*ext);
    }

    if essence.starts_with("audio/") {
        tracing::debug!(mime = essence, "unrecognized audio type, using default extension");
        return Ok(DEFAULT_EXTENSION);
    }

    Err(FysioError::InvalidRequest(format!(
        "unsupported media type for transcription: {essence}"
    )))
}

/// Retry table for transcription calls.
pub fn is_retryable(err: &FysioError) -> bool {
    match err {
        FysioError::RateLimited { .. } | FysioError::Timeout(_) | FysioError::Request(_) => true,
        FysioError::Upstream { status, .. } => match status {
            Some(s) => matches!(*s, 408 | 500 | 502 | 503 | 504),
            // Body read failed mid-stream.
            None => true,
        },
        _ => false,
    }
}

/// Endpoint and credential for the speech-to-text service.
#[derive(Clone)]
pub struct TranscriptionEndpoint {
    pub url: String,
    pub api_key: Option<String>,
    pub timeout: Duration,
}

impl std::fmt::Debug for TranscriptionEndpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TranscriptionEndpoint")
            .field("url", &self.url)
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .field("timeout", &self.timeout)
            .finish()
    }
}

pub struct TranscriptionClient {
    http: Arc<HttpDispatch>,
    endpoint: TranscriptionEndpoint,
    retry: RetryExecutor,
    usage: Arc<UsageMonitor>,
    network_calls: AtomicU64,
}

impl TranscriptionClient {
    /// The executor's classifier is replaced with the transcription table.
    pub fn new(
        http: Arc<HttpDispatch>,
        endpoint: TranscriptionEndpoint,
        retry: RetryExecutor,
        usage: Arc<UsageMonitor>,
    ) -> Self {
        Self {
            http,
            endpoint,
            retry: retry.with_classifier(is_retryable),
            usage,
            network_calls: AtomicU64::new(0),
        }
    }

    pub fn network_calls(&self) -> u64 {
        self.network_calls.load(Ordering::Relaxed)
    }

    pub fn validate(req: &TranscriptionRequest) -> Result<&'static str, FysioError> {
        if req.audio.is_empty() {
            return Err(FysioError::InvalidRequest("audio payload is empty".to_string()));
        }
        if req.audio.len() > MAX_AUDIO_BYTES {
            return Err(FysioError::InvalidRequest(format!(
                "audio payload is {} bytes (max {MAX_AUDIO_BYTES})",
                req.audio.len()
            )));
        }
        if !req.temperature.is_finite() || !(0.0..=1.0).contains(&req.temperature) {
            return Err(FysioError::InvalidRequest(format!(
                "temperature must be between 0.0 and 1.0, got {}",
                req.temperature
            )));
        }
        extension_for_mime(&req.mime_type)
    }

    fn build_form(req: &TranscriptionRequest, extension: &str) -> Result<Form, FysioError> {
        let mime = req
            .mime_type
            .split(';')
            .next()
            .map(str::trim)
            .filter(|m| !m.is_empty())
            .unwrap_or("application/octet-stream")
            .to_string();

        let part = Part::bytes(req.audio.clone())
            .file_name(format!("recording.{extension}"))
            .mime_str(&mime)
            .map_err(|e| FysioError::InvalidRequest(format!("invalid MIME type {mime}: {e}")))?;

        let mut form = Form::new()
            .part("file", part)
            .text("model", TRANSCRIPTION_MODEL)
            .text("response_format", "verbose_json")
            .text("temperature", req.temperature.to_string());

        if !req.language.trim().is_empty() {
            form = form.text("language", req.language.trim().to_string());
        }
        if let Some(prompt) = req.prompt.as_deref().filter(|p| !p.trim().is_empty()) {
            form = form.text("prompt", prompt.to_string());
        }
        Ok(form)
    }

    pub async fn transcribe(
        &self,
        req: &TranscriptionRequest,
        cancel: Option<&CancellationToken>,
    ) -> TranscriptionResult {
        let extension = match Self::validate(req) {
            Ok(ext) => ext,
            Err(e) => {
                tracing::warn!(mime = req.mime_type, "transcription request rejected: {e}");
                return TranscriptionResult::failure(&e, 0);
            }
        };

        let Some(api_key) = self.endpoint.api_key.as_deref() else {
            let e = FysioError::Config(
                "no speech-to-text credential configured (set OPENAI_API_KEY)".to_string(),
            );
            tracing::warn!("{e}");
            return TranscriptionResult::failure(&e, 0);
        };

        let start = Instant::now();
        let payload_bytes = req.audio.len();
        let mut attempts: u32 = 0;

        let result = self
            .retry
            .execute(cancel, |attempt| {
                attempts = attempt + 1;
                self.network_calls.fetch_add(1, Ordering::Relaxed);
                tracing::info!(
                    provider = PROVIDER,
                    attempt = attempt + 1,
                    payload_bytes = payload_bytes,
                    extension = extension,
                    language = req.language,
                    "sending transcription request"
                );
                async move {
                    let form = Self::build_form(req, extension)?;
                    self.http
                        .transcription(
                            PROVIDER,
                            &self.endpoint.url,
                            api_key,
                            form,
                            self.endpoint.timeout,
                        )
                        .await
                        .inspect_err(|e| log_attempt_failure(attempt + 1, e))
                }
            })
            .await;

        let duration_ms = start.elapsed().as_millis() as u64;

        match result {
            Ok(raw) => {
                let cost = raw
                    .duration_seconds
                    .map(|secs| secs / 60.0 * TRANSCRIPTION_COST_PER_MINUTE)
                    .unwrap_or(0.0);
                self.usage
                    .record(duration_ms, 0, cost, true, TRANSCRIPTION_MODEL);

                if raw.text.trim().is_empty() {
                    tracing::info!("transcription returned no speech");
                }
                tracing::info!(
                    provider = PROVIDER,
                    attempts = attempts,
                    elapsed_ms = duration_ms,
                    upstream_latency_ms = raw.latency_ms,
                    chars = raw.text.chars().count(),
                    "transcription succeeded"
                );

                TranscriptionResult {
                    success: true,
                    text: raw.text.trim().to_string(),
                    duration_seconds: raw.duration_seconds,
                    language: raw.language,
                    error_kind: None,
                    error_message: None,
                    attempts,
                }
            }
            Err(e) => {
                if e.kind() != ErrorKind::Cancelled {
                    self.usage
                        .record(duration_ms, 0, 0.0, false, TRANSCRIPTION_MODEL);
                }
                let message = exhaustion_message(&e, attempts);
                tracing::error!(
                    provider = PROVIDER,
                    attempts = attempts,
                    kind = %e.kind(),
                    "transcription failed: {message}"
                );
                TranscriptionResult {
                    error_message: Some(message),
                    ..TranscriptionResult::failure(&e, attempts)
                }
            }
        }
    }
}

fn log_attempt_failure(attempt: u32, err: &FysioError) {
    match err {
        FysioError::AuthFailed { status, cause, .. } => tracing::error!(
            attempt = attempt,
            status = *status,
            cause = ?cause,
            "transcription rejected by authorization layer"
        ),
        FysioError::RateLimited { .. } => {
            tracing::warn!(attempt = attempt, status = 429, "transcription rate limited")
        }
        other => tracing::warn!(
            attempt = attempt,
            status = ?other.status(),
            kind = %other.kind(),
            "transcription attempt failed: {other}"
        ),
    }
}

/// Final message: authorization failures need credential or network work,
/// everything else is worth retrying later.
fn exhaustion_message(err: &FysioError, attempts: u32) -> String {
    match err.kind() {
        ErrorKind::AuthOrWafBlocked => err.user_message(),
        ErrorKind::RateLimited | ErrorKind::TransientService => format!(
            "network failure: transcription service unavailable after {attempts} attempt(s) — \
             try again later ({})",
            err.user_message()
        ),
        _ => err.user_message(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mime_table_and_fallbacks() {
        assert_eq!(extension_for_mime("audio/webm;codecs=opus").unwrap(), "webm");
        assert_eq!(extension_for_mime("Audio/MPEG").unwrap(), "mp3");
        assert_eq!(extension_for_mime("audio/x-m4a").unwrap(), "m4a");
        assert_eq!(extension_for_mime("audio/x-unknown-codec").unwrap(), DEFAULT_EXTENSION);
        assert_eq!(extension_for_mime("").unwrap(), DEFAULT_EXTENSION);
        assert!(extension_for_mime("text/plain").is_err());
        assert!(extension_for_mime("image/png").is_err());
    }

    #[test]
    fn transcription_retry_table() {
        let upstream = |s| FysioError::Upstream {
            provider: "openai".into(),
            message: String::new(),
            status: Some(s),
        };
        assert!(is_retryable(&FysioError::RateLimited {
            provider: "openai".into()
        }));
        assert!(is_retryable(&FysioError::Timeout(120_000)));
        assert!(is_retryable(&upstream(503)));
        assert!(is_retryable(&upstream(408)));
        assert!(!is_retryable(&upstream(413)));
        assert!(!is_retryable(&crate::dispatch::http::error_for_status("openai", 401, "")));
        assert!(!is_retryable(&crate::dispatch::http::error_for_status("openai", 403, "")));
    }

    #[test]
    fn validation() {
        let req = TranscriptionRequest {
            audio: vec![1, 2, 3],
            mime_type: "audio/wav".to_string(),
            language: "nl".to_string(),
            prompt: None,
            temperature: 0.0,
        };
        assert_eq!(TranscriptionClient::validate(&req).unwrap(), "wav");

        let empty = TranscriptionRequest {
            audio: vec![],
            ..req.clone()
        };
        assert!(TranscriptionClient::validate(&empty).is_err());

        let hot = TranscriptionRequest {
            temperature: 1.5,
            ..req
        };
        assert_eq!(
            TranscriptionClient::validate(&hot).unwrap_err().kind(),
            ErrorKind::Structural
        );
    }

    #[test]
    fn exhaustion_distinguishes_auth_from_network() {
        let auth = crate::dispatch::http::error_for_status("openai", 401, "");
        assert!(exhaustion_message(&auth, 1).contains("authorization failure"));

        let net = FysioError::Timeout(120_000);
        let msg = exhaustion_message(&net, 3);
        assert!(msg.contains("network failure"));
        assert!(msg.contains("3 attempt"));
    }
}
