pub mod completion;
pub mod demo;
pub mod http;
pub mod registry;
pub mod transcription;

use serde::Serialize;

use crate::dispatch::demo::SectionType;
use crate::error::{ErrorKind, FysioError};

/// Text-generation request. Built per user action and never mutated after
/// it is handed to the completion client.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub system_prompt: String,
    pub user_prompt: String,
    pub model: String,
    /// Sampling temperature, 0.0 to 2.0.
    pub temperature: f64,
    pub max_tokens: u32,
    pub stop_sequences: Option<Vec<String>>,
    /// Which static content to serve when running without a credential.
    pub section_type: SectionType,
}

/// Token accounting reported by the provider (or estimated when absent).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TokenUsage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
}

impl TokenUsage {
    pub fn new(prompt_tokens: u64, completion_tokens: u64) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens.saturating_add(completion_tokens),
        }
    }

    /// Provider numbers are usable only if the total covers both parts.
    pub fn is_well_formed(&self) -> bool {
        self.prompt_tokens
            .checked_add(self.completion_tokens)
            .is_some_and(|sum| sum == self.total_tokens)
    }
}

/// Outcome of one completion request. Produced exactly once.
#[derive(Debug, Clone, Serialize)]
pub struct CompletionResult {
    pub success: bool,
    pub content: String,
    pub model: String,
    pub usage: Option<TokenUsage>,
    /// Set on failures. Demo results carry `DegradedFallback` with `success = true`.
    pub error_kind: Option<ErrorKind>,
    pub error_message: Option<String>,
    pub estimated_cost: f64,
    /// Network attempts made (0 for demo and validation failures).
    pub attempts: u32,
}

impl CompletionResult {
    pub fn failure(model: &str, err: &FysioError, attempts: u32) -> Self {
        Self {
            success: false,
            content: String::new(),
            model: model.to_string(),
            usage: None,
            error_kind: Some(err.kind()),
            error_message: Some(err.user_message()),
            estimated_cost: 0.0,
            attempts,
        }
    }

    pub fn is_degraded(&self) -> bool {
        self.error_kind == Some(ErrorKind::DegradedFallback)
    }
}

/// Speech-to-text request.
#[derive(Debug, Clone)]
pub struct TranscriptionRequest {
    pub audio: Vec<u8>,
    /// Declared MIME type of `audio` (e.g. `audio/webm;codecs=opus`).
    pub mime_type: String,
    pub language: String,
    /// Vocabulary hint passed to the recognizer.
    pub prompt: Option<String>,
    /// Sampling temperature, 0.0 to 1.0.
    pub temperature: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct TranscriptionResult {
    pub success: bool,
    /// May be empty on success (silent audio).
    pub text: String,
    pub duration_seconds: Option<f64>,
    pub language: Option<String>,
    pub error_kind: Option<ErrorKind>,
    pub error_message: Option<String>,
    pub attempts: u32,
}

impl TranscriptionResult {
    pub fn failure(err: &FysioError, attempts: u32) -> Self {
        Self {
            success: false,
            text: String::new(),
            duration_seconds: None,
            language: None,
            error_kind: Some(err.kind()),
            error_message: Some(err.user_message()),
            attempts,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn usage_shape_validation() {
        assert!(TokenUsage::new(10, 5).is_well_formed());
        let bad = TokenUsage {
            prompt_tokens: 10,
            completion_tokens: 5,
            total_tokens: 3,
        };
        assert!(!bad.is_well_formed());
        let overflow = TokenUsage {
            prompt_tokens: u64::MAX,
            completion_tokens: 1,
            total_tokens: u64::MAX,
        };
        assert!(!overflow.is_well_formed());
    }
}
