use schemars::JsonSchema;
use serde::Deserialize;

use crate::dispatch::demo::SectionType;

#[derive(Debug, Deserialize, JsonSchema)]
pub struct GenerateRequest {
    /// The clinical prompt (intake notes, session summary, question).
    pub prompt: String,
    /// System prompt setting the assistant's role (e.g. "Je bent een ervaren fysiotherapeut").
    pub system_prompt: Option<String>,
    /// Model name from `listmodels` output (defaults to the configured model).
    pub model: Option<String>,
    /// Sampling temperature: 0.0 = deterministic, 2.0 = most varied. Default 0.7.
    pub temperature: Option<f64>,
    /// Maximum tokens to generate. Must not exceed the model's output cap.
    pub max_tokens: Option<u32>,
    /// Up to 4 sequences at which generation stops.
    pub stop_sequences: Option<Vec<String>>,
    /// Kind of document requested; selects the demo text when no credential is set.
    pub section_type: Option<SectionType>,
}

impl GenerateRequest {
    pub fn model(&self) -> Option<String> {
        self.model
            .as_deref()
            .map(str::trim)
            .filter(|m| !m.is_empty())
            .map(str::to_string)
    }
}
