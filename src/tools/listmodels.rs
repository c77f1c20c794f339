use serde::Serialize;

use crate::dispatch::registry::ModelEntry;

#[derive(Serialize)]
pub struct ModelInfo {
    pub name: String,
    pub max_temperature: f64,
    pub max_output_tokens: u32,
    pub input_cost_per_1k: f64,
    pub output_cost_per_1k: f64,
    pub is_default: bool,
}

impl ModelInfo {
    pub fn new(entry: &ModelEntry, default_model: &str) -> Self {
        Self {
            name: entry.model_id.to_string(),
            max_temperature: entry.max_temperature,
            max_output_tokens: entry.max_output_tokens,
            input_cost_per_1k: entry.input_cost_per_1k,
            output_cost_per_1k: entry.output_cost_per_1k,
            is_default: entry.model_id == default_model,
        }
    }
}

#[derive(Serialize)]
pub struct ListModelsResponse {
    pub models: Vec<ModelInfo>,
}

impl ListModelsResponse {
    pub fn to_markdown(&self) -> String {
        let mut out = String::from(
            "| model | max temp | max output | $/1k in | $/1k out |\n|---|---|---|---|---|\n",
        );
        for m in &self.models {
            let marker = if m.is_default { " (default)" } else { "" };
            out.push_str(&format!(
                "| {}{marker} | {} | {} | {} | {} |\n",
                m.name, m.max_temperature, m.max_output_tokens, m.input_cost_per_1k, m.output_cost_per_1k
            ));
        }
        out
    }
}
