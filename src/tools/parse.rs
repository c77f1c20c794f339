use schemars::JsonSchema;
use serde::Deserialize;

#[derive(Debug, Deserialize, JsonSchema)]
pub struct ParseRequest {
    /// Generated clinical text to structure into PHSB sections and red flags.
    pub text: String,
}
