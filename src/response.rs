use rmcp::model::{CallToolResult, Content};
use serde::Serialize;

use crate::error::ErrorKind;

/// JSON envelope returned by every tool.
/// All tools return Content::text(json_string) so clients parse one shape.
#[derive(Debug, Serialize)]
pub struct ToolResponse {
    pub status: &'static str,
    pub content: String,
    pub content_type: &'static str,
    pub metadata: ToolMetadata,
}

#[derive(Debug, Serialize)]
pub struct ToolMetadata {
    pub tool_name: String,
    pub model_used: String,
    /// Set on failures, and on demo content (`degraded_fallback`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attempts: Option<u32>,
    #[serde(serialize_with = "serialize_finite_f64")]
    pub duration_seconds: f64,
}

impl ToolMetadata {
    pub fn new(tool_name: &str, model_used: &str, duration_seconds: f64) -> Self {
        Self {
            tool_name: tool_name.to_string(),
            model_used: model_used.to_string(),
            error_kind: None,
            attempts: None,
            duration_seconds,
        }
    }

    pub fn with_error_kind(mut self, kind: Option<ErrorKind>) -> Self {
        self.error_kind = kind;
        self
    }

    pub fn with_attempts(mut self, attempts: u32) -> Self {
        self.attempts = Some(attempts);
        self
    }
}

/// Serialize f64, clamping non-finite values (NaN, Inf) to 0.0.
fn serialize_finite_f64<S: serde::Serializer>(v: &f64, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_f64(if v.is_finite() { *v } else { 0.0 })
}

impl ToolResponse {
    pub fn success(content: String, metadata: ToolMetadata) -> Self {
        Self {
            status: "success",
            content,
            content_type: "text",
            metadata,
        }
    }

    /// Success carrying a JSON document in `content`.
    pub fn json<T: Serialize>(value: &T, metadata: ToolMetadata) -> Self {
        match serde_json::to_string(value) {
            Ok(content) => Self {
                status: "success",
                content,
                content_type: "json",
                metadata,
            },
            Err(e) => Self::error(format!("serialization failed: {e}"), metadata),
        }
    }

    pub fn error(message: String, metadata: ToolMetadata) -> Self {
        Self {
            status: "error",
            content: message,
            content_type: "text",
            metadata,
        }
    }

    /// Convert to MCP CallToolResult.
    /// Always returns success at the MCP transport level; the failure is in
    /// the JSON payload (`"status": "error"` plus `error_kind`).
    pub fn into_call_tool_result(self) -> CallToolResult {
        match serde_json::to_string(&self) {
            Ok(json) => CallToolResult::success(vec![Content::text(json)]),
            Err(e) => {
                let escaped = e.to_string().replace('\\', "\\\\").replace('"', "\\\"");
                CallToolResult::success(vec![Content::text(format!(
                    r#"{{"status":"error","content":"serialization failed: {escaped}","content_type":"text","metadata":{{}}}}"#
                ))])
            }
        }
    }
}
