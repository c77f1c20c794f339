use crate::error::FysioError;

/// Model used when the caller does not name one.
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";

/// Provider label attached to logs and error messages.
pub const PROVIDER: &str = "openai";

/// Transcription model and its price per audio minute.
pub const TRANSCRIPTION_MODEL: &str = "whisper-1";
pub const TRANSCRIPTION_COST_PER_MINUTE: f64 = 0.006;

/// One row of the supported-model table.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ModelEntry {
    pub model_id: &'static str,
    pub max_temperature: f64,
    pub max_output_tokens: u32,
    /// USD per 1K prompt tokens.
    pub input_cost_per_1k: f64,
    /// USD per 1K completion tokens.
    pub output_cost_per_1k: f64,
}

impl ModelEntry {
    pub fn estimate_cost(&self, prompt_tokens: u64, completion_tokens: u64) -> f64 {
        (prompt_tokens as f64 / 1000.0) * self.input_cost_per_1k
            + (completion_tokens as f64 / 1000.0) * self.output_cost_per_1k
    }
}

const MODELS: &[ModelEntry] = &[
    ModelEntry {
        model_id: "gpt-4o",
        max_temperature: 2.0,
        max_output_tokens: 16_384,
        input_cost_per_1k: 0.0025,
        output_cost_per_1k: 0.01,
    },
    ModelEntry {
        model_id: "gpt-4o-mini",
        max_temperature: 2.0,
        max_output_tokens: 16_384,
        input_cost_per_1k: 0.000_15,
        output_cost_per_1k: 0.000_6,
    },
    ModelEntry {
        model_id: "gpt-4-turbo",
        max_temperature: 2.0,
        max_output_tokens: 4_096,
        input_cost_per_1k: 0.01,
        output_cost_per_1k: 0.03,
    },
    ModelEntry {
        model_id: "gpt-3.5-turbo",
        max_temperature: 2.0,
        max_output_tokens: 4_096,
        input_cost_per_1k: 0.000_5,
        output_cost_per_1k: 0.001_5,
    },
];

pub struct Registry;

impl Registry {
    pub fn get(model: &str) -> Option<&'static ModelEntry> {
        MODELS.iter().find(|m| m.model_id == model)
    }

    pub fn list_models() -> &'static [ModelEntry] {
        MODELS
    }

    /// Resolve a model name or fail with suggestions.
    pub fn resolve(model: &str) -> Result<&'static ModelEntry, FysioError> {
        Self::get(model.trim()).ok_or_else(|| FysioError::UnsupportedModel {
            model: model.to_string(),
            suggestions: Self::suggest_models(model),
        })
    }

    /// Suggest similar model names for a failed lookup (substring match).
    /// Sorted alphabetically, capped at 5 to keep error messages readable.
    pub fn suggest_models(query: &str) -> Vec<String> {
        let q = query.trim().to_lowercase();
        if q.is_empty() {
            return vec![];
        }
        let mut suggestions: Vec<String> = MODELS
            .iter()
            .map(|m| m.model_id)
            .filter(|k| k.contains(q.as_str()) || q.contains(*k))
            .map(str::to_string)
            .collect();
        suggestions.sort();
        suggestions.truncate(5);
        suggestions
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_model_is_supported() {
        assert!(Registry::get(DEFAULT_MODEL).is_some());
    }

    #[test]
    fn unknown_model_carries_suggestions() {
        let err = Registry::resolve("gpt-4").unwrap_err();
        match err {
            FysioError::UnsupportedModel { suggestions, .. } => {
                assert!(suggestions.contains(&"gpt-4o".to_string()));
                assert!(suggestions.contains(&"gpt-4-turbo".to_string()));
            }
            other => panic!("expected UnsupportedModel, got {other:?}"),
        }
    }

    #[test]
    fn cost_uses_split_pricing() {
        let entry = Registry::get("gpt-4o").unwrap();
        let cost = entry.estimate_cost(1000, 1000);
        assert!((cost - 0.0125).abs() < 1e-12);
    }
}
