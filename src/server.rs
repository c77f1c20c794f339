use std::sync::Arc;
use std::time::Instant;

use rmcp::handler::server::router::tool::ToolRouter;
use rmcp::handler::server::wrapper::Parameters;
use rmcp::model::{CallToolResult, Implementation, ServerCapabilities, ServerInfo};
use rmcp::{ErrorData as McpError, ServerHandler, tool, tool_handler, tool_router};

use crate::config::Config;
use crate::dispatch::registry::{Registry, TRANSCRIPTION_MODEL};
use crate::dispatch::transcription::MAX_AUDIO_BYTES;
use crate::engine::{
    DEFAULT_LANGUAGE, DEFAULT_TRANSCRIPTION_TEMPERATURE, Engine, GenerateOptions, TranscribeOptions,
};
use crate::response::{ToolMetadata, ToolResponse};
use crate::tools::generate::GenerateRequest;
use crate::tools::listmodels::{ListModelsResponse, ModelInfo};
use crate::tools::parse::ParseRequest;
use crate::tools::transcribe::TranscribeRequest;
use crate::tools::usage::{UsageReport, UsageRequest};

#[derive(Clone)]
pub struct FysioServer {
    engine: Arc<Engine>,
    tool_router: ToolRouter<Self>,
}

#[tool_router]
impl FysioServer {
    pub fn new(config: Config) -> Self {
        Self::with_engine(Arc::new(Engine::from_config(config)))
    }

    pub fn with_engine(engine: Arc<Engine>) -> Self {
        Self {
            engine,
            tool_router: Self::tool_router(),
        }
    }

    #[tool(
        name = "generate_content",
        description = "Generate clinical documentation text (intake, SOAP note, red-flag screen, treatment plan, summary). Without an API key a static Dutch demo text for `section_type` is returned, tagged degraded_fallback. Use `listmodels` for model names.",
        annotations(read_only_hint = true)
    )]
    async fn generate_content(
        &self,
        Parameters(req): Parameters<GenerateRequest>,
    ) -> Result<CallToolResult, McpError> {
        if req.prompt.trim().is_empty() {
            return Err(McpError::invalid_params("prompt must not be empty", None));
        }

        let start = Instant::now();
        let model = req.model();
        let options = GenerateOptions {
            model,
            temperature: req.temperature,
            max_tokens: req.max_tokens,
            stop_sequences: req.stop_sequences,
            section_type: req.section_type.unwrap_or_default(),
            cancellation: None,
        };

        let system_prompt = req.system_prompt.unwrap_or_default();
        let result = self
            .engine
            .generate_content(&system_prompt, &req.prompt, options)
            .await;

        let metadata = ToolMetadata::new(
            "generate_content",
            &result.model,
            start.elapsed().as_secs_f64(),
        )
        .with_error_kind(result.error_kind)
        .with_attempts(result.attempts);

        let response = if result.success {
            ToolResponse::success(result.content, metadata)
        } else {
            let message = result
                .error_message
                .unwrap_or_else(|| "generation failed".to_string());
            ToolResponse::error(message, metadata)
        };

        Ok(response.into_call_tool_result())
    }

    #[tool(
        name = "transcribe",
        description = "Transcribe a recorded consultation (audio file on disk) to text. Requires an API key; language defaults to Dutch (nl).",
        annotations(read_only_hint = true)
    )]
    async fn transcribe(
        &self,
        Parameters(req): Parameters<TranscribeRequest>,
    ) -> Result<CallToolResult, McpError> {
        let start = Instant::now();

        let meta = tokio::fs::metadata(&req.audio_path)
            .await
            .map_err(|e| McpError::invalid_params(format!("cannot read audio_path: {e}"), None))?;
        if !meta.is_file() {
            return Err(McpError::invalid_params("audio_path is not a file", None));
        }
        if meta.len() > MAX_AUDIO_BYTES as u64 {
            return Err(McpError::invalid_params(
                format!("audio file is {} bytes (max {MAX_AUDIO_BYTES})", meta.len()),
                None,
            ));
        }

        let audio = tokio::fs::read(&req.audio_path)
            .await
            .map_err(|e| McpError::invalid_params(format!("cannot read audio_path: {e}"), None))?;

        let options = TranscribeOptions {
            mime_type: req.mime_type(),
            language: req
                .language
                .filter(|l| !l.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_LANGUAGE.to_string()),
            prompt: req.prompt,
            temperature: req.temperature.unwrap_or(DEFAULT_TRANSCRIPTION_TEMPERATURE),
            cancellation: None,
        };

        let result = self.engine.transcribe(audio, options).await;

        let metadata = ToolMetadata::new(
            "transcribe",
            TRANSCRIPTION_MODEL,
            start.elapsed().as_secs_f64(),
        )
        .with_error_kind(result.error_kind)
        .with_attempts(result.attempts);

        let response = if result.success {
            ToolResponse::json(&result, metadata)
        } else {
            let message = result
                .error_message
                .unwrap_or_else(|| "transcription failed".to_string());
            ToolResponse::error(message, metadata)
        };

        Ok(response.into_call_tool_result())
    }

    #[tool(
        name = "parse_clinical_text",
        description = "Structure generated clinical text into PHSB sections (patientNeed, history, impairments, limitations) and a red-flag list. Local and deterministic.",
        annotations(read_only_hint = true)
    )]
    async fn parse_clinical_text(
        &self,
        Parameters(req): Parameters<ParseRequest>,
    ) -> Result<CallToolResult, McpError> {
        let start = Instant::now();
        let sections = self.engine.parse_clinical_text(&req.text);
        let response = ToolResponse::json(
            &sections,
            ToolMetadata::new("parse_clinical_text", "none", start.elapsed().as_secs_f64()),
        );
        Ok(response.into_call_tool_result())
    }

    #[tool(
        name = "listmodels",
        description = "List supported text-generation models with limits and pricing.",
        annotations(read_only_hint = true)
    )]
    async fn listmodels(&self) -> Result<CallToolResult, McpError> {
        let default_model = &self.engine.config().default_model;
        let models = Registry::list_models()
            .iter()
            .map(|entry| ModelInfo::new(entry, default_model))
            .collect();

        let response = ToolResponse::success(
            ListModelsResponse { models }.to_markdown(),
            ToolMetadata::new("listmodels", "none", 0.0),
        );
        Ok(response.into_call_tool_result())
    }

    #[tool(
        name = "usage",
        description = "Report request counts, tokens, estimated cost, error rate, health and remaining rate budget. Pass reset=true to zero the counters afterwards."
    )]
    async fn usage(
        &self,
        Parameters(req): Parameters<UsageRequest>,
    ) -> Result<CallToolResult, McpError> {
        let metrics = self.engine.usage_snapshot();
        let report = UsageReport {
            demo_mode: self.engine.is_demo_mode(),
            error_rate: metrics.error_rate(),
            health: self.engine.health(),
            rate_budget: self.engine.rate_budget().await.into(),
            metrics,
        };

        if req.reset.unwrap_or(false) {
            self.engine.reset_usage();
            tracing::info!("usage counters reset");
        }

        let response = ToolResponse::json(&report, ToolMetadata::new("usage", "none", 0.0));
        Ok(response.into_call_tool_result())
    }
}

#[tool_handler]
impl ServerHandler for FysioServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            server_info: Implementation {
                name: "fysioscribe".to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
                ..Default::default()
            },
            instructions: Some(
                "FysioScribe: clinical documentation for physiotherapy.\n\n\
                 Workflow:\n\
                 1. `transcribe` a recorded consultation (optional).\n\
                 2. `generate_content` with the notes or transcript and a `section_type`.\n\
                 3. `parse_clinical_text` on the generated intake to get PHSB fields and red flags.\n\
                 4. `usage` for cost, error rate and remaining rate budget.\n\n\
                 Every response is a JSON envelope; on failure `metadata.error_kind` names the class \
                 (structural, auth_or_waf_blocked, rate_limited, transient_service, empty_result). \
                 Demo text is marked degraded_fallback."
                    .into(),
            ),
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            ..Default::default()
        }
    }
}
