use serde::Serialize;
use thiserror::Error;

/// Failure taxonomy surfaced to callers on every terminal result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Invalid request shape, model, temperature, or configuration. Never retried.
    Structural,
    /// 401/403 from the provider. Needs operator action (credential or network).
    AuthOrWafBlocked,
    /// 429 from the provider. Retried with backoff until the attempt cap.
    RateLimited,
    /// 5xx, timeouts and connection failures. Retried until the attempt cap.
    TransientService,
    /// The call succeeded but the payload failed post-validation.
    EmptyResult,
    /// No credential configured; static content was returned. Not a failure.
    DegradedFallback,
    /// The caller cancelled the request.
    Cancelled,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Structural => "structural",
            Self::AuthOrWafBlocked => "auth_or_waf_blocked",
            Self::RateLimited => "rate_limited",
            Self::TransientService => "transient_service",
            Self::EmptyResult => "empty_result",
            Self::DegradedFallback => "degraded_fallback",
            Self::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a provider refused the credential.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthCause {
    /// 401: key missing, revoked or mistyped.
    InvalidCredential,
    /// 403 carrying an HTML/challenge body: an anti-bot or WAF layer in front
    /// of the API rejected the request before it reached the provider.
    NetworkBlocked,
    /// 403 with a regular API body: the key lacks access to the resource.
    Forbidden,
}

#[derive(Debug, Error)]
pub enum FysioError {
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("unsupported model: {model}")]
    UnsupportedModel {
        model: String,
        suggestions: Vec<String>,
    },

    #[error("configuration error: {0}")]
    Config(String),

    #[error("timeout after {0}ms")]
    Timeout(u64),

    #[error("cancelled after {0}ms")]
    Cancelled(u64),

    #[error("rate limited by {provider}")]
    RateLimited { provider: String },

    #[error("upstream error from {provider}: {message}")]
    Upstream {
        provider: String,
        message: String,
        status: Option<u16>,
    },

    #[error("auth failed for {provider} (HTTP {status}): {message}")]
    AuthFailed {
        provider: String,
        status: u16,
        cause: AuthCause,
        message: String,
    },

    #[error("empty result from {provider}: {message}")]
    EmptyResult { provider: String, message: String },

    #[error("request error: {0}")]
    Request(#[from] reqwest::Error),
}

impl FysioError {
    /// Map the error onto the caller-facing taxonomy.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidRequest(_) | Self::UnsupportedModel { .. } | Self::Config(_) => {
                ErrorKind::Structural
            }
            Self::AuthFailed { .. } => ErrorKind::AuthOrWafBlocked,
            Self::RateLimited { .. } => ErrorKind::RateLimited,
            Self::Upstream { status, .. } => match status {
                Some(401 | 403) => ErrorKind::AuthOrWafBlocked,
                Some(429) => ErrorKind::RateLimited,
                Some(400 | 402) => ErrorKind::Structural,
                _ => ErrorKind::TransientService,
            },
            Self::Timeout(_) | Self::Request(_) => ErrorKind::TransientService,
            Self::EmptyResult { .. } => ErrorKind::EmptyResult,
            Self::Cancelled(_) => ErrorKind::Cancelled,
        }
    }

    /// HTTP status carried by the error, if it came from a response.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Upstream { status, .. } => *status,
            Self::AuthFailed { status, .. } => Some(*status),
            Self::RateLimited { .. } => Some(429),
            _ => None,
        }
    }

    /// Default retry classification used for text-generation calls.
    ///
    /// 400/401/402/403 fail on first occurrence; 429, 5xx and any other
    /// status retry up to the attempt cap. Structural, empty-result and
    /// cancellation never retry. Timeouts and connection failures retry.
    pub fn is_retryable(&self) -> bool {
        match self.kind() {
            ErrorKind::Structural
            | ErrorKind::AuthOrWafBlocked
            | ErrorKind::EmptyResult
            | ErrorKind::DegradedFallback
            | ErrorKind::Cancelled => false,
            ErrorKind::RateLimited | ErrorKind::TransientService => true,
        }
    }

    /// Produce a message safe for returning to clients. Names the root cause
    /// and the remediation without leaking URLs or credentials.
    pub fn user_message(&self) -> String {
        match self {
            Self::InvalidRequest(msg) => format!("invalid request: {msg}"),
            Self::UnsupportedModel { model, suggestions } => {
                if suggestions.is_empty() {
                    format!("unsupported model: {model}")
                } else {
                    format!(
                        "unsupported model: {model}. Did you mean: {}?",
                        suggestions.join(", ")
                    )
                }
            }
            Self::Config(msg) => format!("configuration error: {msg}"),
            Self::Timeout(ms) => format!("request timed out after {ms}ms — try again later"),
            Self::Cancelled(ms) => format!("cancelled after {ms}ms"),
            Self::RateLimited { provider } => {
                format!("rate limited by {provider} — will auto-retry, then try again shortly")
            }
            Self::Upstream {
                provider, status, ..
            } => match status {
                Some(s) if *s < 500 => {
                    format!("{provider} rejected the request (HTTP {s}) — check request parameters")
                }
                Some(s) => format!("upstream error from {provider} (HTTP {s}) — try again later"),
                None => format!("upstream error from {provider} — try again later"),
            },
            Self::AuthFailed {
                provider, cause, ..
            } => match cause {
                AuthCause::InvalidCredential => format!(
                    "authorization failure at {provider}: invalid credential — rotate the API key"
                ),
                AuthCause::NetworkBlocked => format!(
                    "authorization failure at {provider}: request blocked by an anti-bot network filter — \
                     check proxy/VPN or network allowlisting"
                ),
                AuthCause::Forbidden => format!(
                    "authorization failure at {provider}: credential lacks access or the request was \
                     blocked by a network filter"
                ),
            },
            Self::EmptyResult { provider, .. } => {
                format!("{provider} returned an empty or malformed result")
            }
            Self::Request(_) => "network failure reaching provider — try again later".to_string(),
        }
    }
}
