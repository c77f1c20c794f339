use std::time::{Duration, Instant};

use reqwest::multipart::Form;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::{Deserialize, Serialize};

use crate::dispatch::TokenUsage;
use crate::error::{AuthCause, FysioError};

pub const MAX_RESPONSE_BYTES: usize = 2 * 1024 * 1024; // 2MB

/// Bytes of an error body kept for diagnostics.
const ERROR_BODY_PREVIEW: usize = 512;

/// Markers of an HTML challenge page served by an anti-bot layer instead of
/// the provider's JSON error.
const WAF_MARKERS: &[&str] = &[
    "<html",
    "<!doctype",
    "cloudflare",
    "captcha",
    "cf-ray",
    "access denied",
    "attention required",
    "request blocked",
];

pub struct HttpDispatch {
    client: Client,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Serialize)]
struct ChatBody<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f64,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    stop: Option<&'a [String]>,
}

#[derive(Deserialize)]
struct ChatCompletion {
    #[serde(default)]
    model: Option<String>,
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<WireUsage>,
}

#[derive(Deserialize)]
struct Choice {
    message: Message,
}

#[derive(Deserialize)]
struct Message {
    content: Option<String>,
}

#[derive(Deserialize)]
struct WireUsage {
    prompt_tokens: u64,
    completion_tokens: u64,
    total_tokens: u64,
}

#[derive(Deserialize)]
struct WireTranscript {
    #[serde(default)]
    text: String,
    #[serde(default)]
    duration: Option<f64>,
    #[serde(default)]
    language: Option<String>,
}

/// Parsed chat completion before post-validation.
#[derive(Debug)]
pub struct RawCompletion {
    pub content: String,
    pub model: Option<String>,
    pub usage: Option<TokenUsage>,
    pub latency_ms: u64,
}

/// Parsed transcription response.
#[derive(Debug)]
pub struct RawTranscript {
    pub text: String,
    pub duration_seconds: Option<f64>,
    pub language: Option<String>,
    pub latency_ms: u64,
}

/// Prompt pair and sampling options for one chat call.
pub struct ChatCall<'a> {
    pub model: &'a str,
    pub system_prompt: &'a str,
    pub user_prompt: &'a str,
    pub temperature: f64,
    pub max_tokens: u32,
    pub stop: Option<&'a [String]>,
}

impl Default for HttpDispatch {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpDispatch {
    pub fn new() -> Self {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .pool_idle_timeout(Duration::from_secs(90))
            .pool_max_idle_per_host(4)
            .build()
            .expect("failed to build HTTP client");

        Self { client }
    }

    /// One chat-completions call. No retry here; the caller wraps this.
    pub async fn chat_completion(
        &self,
        provider: &str,
        url: &str,
        api_key: &str,
        call: &ChatCall<'_>,
        timeout: Duration,
    ) -> Result<RawCompletion, FysioError> {
        let start = Instant::now();

        let mut messages = Vec::with_capacity(2);
        if !call.system_prompt.trim().is_empty() {
            messages.push(ChatMessage {
                role: "system",
                content: call.system_prompt,
            });
        }
        messages.push(ChatMessage {
            role: "user",
            content: call.user_prompt,
        });

        let body = ChatBody {
            model: call.model,
            messages,
            temperature: call.temperature,
            max_tokens: call.max_tokens,
            stop: call.stop.filter(|s| !s.is_empty()),
        };

        let request = self
            .client
            .post(url)
            .header("Authorization", format!("Bearer {api_key}"))
            .json(&body);

        let response = send(request, timeout, start).await?;
        let bytes = read_success_body(response, provider).await?;

        // A 200 whose body does not parse is a post-validation failure,
        // not a transient one.
        let completion: ChatCompletion =
            serde_json::from_slice(&bytes).map_err(|e| FysioError::EmptyResult {
                provider: provider.to_string(),
                message: format!("failed to parse response: {e}"),
            })?;

        let content = completion
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .unwrap_or_default();

        Ok(RawCompletion {
            content,
            model: completion.model,
            usage: completion.usage.map(|u| TokenUsage {
                prompt_tokens: u.prompt_tokens,
                completion_tokens: u.completion_tokens,
                total_tokens: u.total_tokens,
            }),
            latency_ms: start.elapsed().as_millis() as u64,
        })
    }

    /// One multipart transcription call.
    pub async fn transcription(
        &self,
        provider: &str,
        url: &str,
        api_key: &str,
        form: Form,
        timeout: Duration,
    ) -> Result<RawTranscript, FysioError> {
        let start = Instant::now();

        let request = self
            .client
            .post(url)
            .header("Authorization", format!("Bearer {api_key}"))
            .multipart(form);

        let response = send(request, timeout, start).await?;
        let bytes = read_success_body(response, provider).await?;

        let transcript: WireTranscript =
            serde_json::from_slice(&bytes).map_err(|e| FysioError::EmptyResult {
                provider: provider.to_string(),
                message: format!("failed to parse transcript: {e}"),
            })?;

        Ok(RawTranscript {
            text: transcript.text,
            duration_seconds: transcript.duration.filter(|d| d.is_finite() && *d >= 0.0),
            language: transcript.language,
            latency_ms: start.elapsed().as_millis() as u64,
        })
    }
}

async fn send(
    request: RequestBuilder,
    timeout: Duration,
    start: Instant,
) -> Result<Response, FysioError> {
    request.timeout(timeout).send().await.map_err(|e| {
        if e.is_timeout() {
            FysioError::Timeout(start.elapsed().as_millis() as u64)
        } else {
            FysioError::Request(e)
        }
    })
}

/// Map non-success statuses onto the error taxonomy, otherwise return the
/// body capped at `MAX_RESPONSE_BYTES`.
async fn read_success_body(response: Response, provider: &str) -> Result<Vec<u8>, FysioError> {
    let status = response.status();

    if status == StatusCode::TOO_MANY_REQUESTS {
        return Err(FysioError::RateLimited {
            provider: provider.to_string(),
        });
    }

    if !status.is_success() {
        // Cap error body reads to prevent memory exhaustion
        let error_bytes = response.bytes().await.unwrap_or_default();
        let truncated = &error_bytes[..error_bytes.len().min(ERROR_BODY_PREVIEW)];
        let text = String::from_utf8_lossy(truncated);
        return Err(error_for_status(provider, status.as_u16(), &text));
    }

    if response
        .content_length()
        .is_some_and(|len| len as usize > MAX_RESPONSE_BYTES)
    {
        return Err(FysioError::EmptyResult {
            provider: provider.to_string(),
            message: "response too large".to_string(),
        });
    }

    let bytes = response.bytes().await.map_err(|e| FysioError::Upstream {
        provider: provider.to_string(),
        message: format!("failed to read response body: {e}"),
        status: None,
    })?;

    if bytes.len() > MAX_RESPONSE_BYTES {
        return Err(FysioError::EmptyResult {
            provider: provider.to_string(),
            message: format!(
                "response too large: {} bytes (max {})",
                bytes.len(),
                MAX_RESPONSE_BYTES
            ),
        });
    }

    Ok(bytes.to_vec())
}

/// Build the error for a non-success status and its (truncated) body.
pub fn error_for_status(provider: &str, status: u16, body: &str) -> FysioError {
    match status {
        401 => FysioError::AuthFailed {
            provider: provider.to_string(),
            status,
            cause: AuthCause::InvalidCredential,
            message: "invalid credential".to_string(),
        },
        403 => {
            let cause = if looks_like_waf_block(body) {
                AuthCause::NetworkBlocked
            } else {
                AuthCause::Forbidden
            };
            let message = match cause {
                AuthCause::NetworkBlocked => "blocked by anti-bot network filter",
                _ => "forbidden",
            };
            FysioError::AuthFailed {
                provider: provider.to_string(),
                status,
                cause,
                message: message.to_string(),
            }
        }
        429 => FysioError::RateLimited {
            provider: provider.to_string(),
        },
        _ => FysioError::Upstream {
            provider: provider.to_string(),
            message: format!("HTTP {status}: {}", body.trim()),
            status: Some(status),
        },
    }
}

fn looks_like_waf_block(body: &str) -> bool {
    let lower = body.to_lowercase();
    WAF_MARKERS.iter().any(|m| lower.contains(m))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forbidden_with_html_body_is_network_block() {
        let err = error_for_status(
            "openai",
            403,
            "<!DOCTYPE html><title>Attention Required! | Cloudflare</title>",
        );
        assert!(matches!(
            err,
            FysioError::AuthFailed {
                cause: AuthCause::NetworkBlocked,
                ..
            }
        ));
    }

    #[test]
    fn forbidden_with_json_body_is_plain_forbidden() {
        let err = error_for_status("openai", 403, r#"{"error":{"message":"no access"}}"#);
        assert!(matches!(
            err,
            FysioError::AuthFailed {
                cause: AuthCause::Forbidden,
                ..
            }
        ));
    }

    #[test]
    fn server_errors_keep_status() {
        let err = error_for_status("openai", 503, "overloaded");
        assert_eq!(err.status(), Some(503));
        assert!(err.is_retryable());
    }

    #[test]
    fn chat_body_omits_empty_stop() {
        let body = ChatBody {
            model: "gpt-4o-mini",
            messages: vec![ChatMessage {
                role: "user",
                content: "hi",
            }],
            temperature: 0.3,
            max_tokens: 100,
            stop: None,
        };
        let json = serde_json::to_value(&body).unwrap();
        assert!(json.get("stop").is_none());
        assert_eq!(json["messages"][0]["role"], "user");
        assert_eq!(json["max_tokens"], 100);
    }
}
