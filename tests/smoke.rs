use rmcp::ServerHandler;

use fysioscribe::config::Config;
use fysioscribe::engine::{Engine, GenerateOptions};
use fysioscribe::error::ErrorKind;
use fysioscribe::response::{ToolMetadata, ToolResponse};
use fysioscribe::server::FysioServer;

fn offline_config() -> Config {
    Config::from_lookup(|_| None)
}

#[test]
fn tool_response_success_serializes_correctly() {
    let response = ToolResponse::success(
        "**H - Historie:** Pijn".to_string(),
        ToolMetadata::new("generate_content", "gpt-4o-mini", 4.2).with_attempts(1),
    );

    let json_str = serde_json::to_string(&response).unwrap();
    let parsed: serde_json::Value = serde_json::from_str(&json_str).unwrap();

    assert_eq!(parsed["status"], "success");
    assert_eq!(parsed["content"], "**H - Historie:** Pijn");
    assert_eq!(parsed["content_type"], "text");
    assert_eq!(parsed["metadata"]["tool_name"], "generate_content");
    assert_eq!(parsed["metadata"]["model_used"], "gpt-4o-mini");
    assert_eq!(parsed["metadata"]["attempts"], 1);
    assert!(parsed["metadata"]["duration_seconds"].is_f64());
    assert!(parsed["metadata"].get("error_kind").is_none());
}

#[test]
fn tool_response_error_carries_kind() {
    let response = ToolResponse::error(
        "authorization failure at openai: invalid credential".to_string(),
        ToolMetadata::new("transcribe", "whisper-1", 0.3)
            .with_error_kind(Some(ErrorKind::AuthOrWafBlocked)),
    );

    let parsed = serde_json::to_value(&response).unwrap();
    assert_eq!(parsed["status"], "error");
    assert_eq!(parsed["metadata"]["error_kind"], "auth_or_waf_blocked");
}

#[test]
fn non_finite_duration_is_clamped() {
    let response = ToolResponse::success(
        String::new(),
        ToolMetadata::new("usage", "none", f64::NAN),
    );
    let parsed = serde_json::to_value(&response).unwrap();
    assert_eq!(parsed["metadata"]["duration_seconds"], 0.0);
}

#[test]
fn json_content_is_embedded_as_string() {
    let response = ToolResponse::json(
        &serde_json::json!({"history": "Sinds 3 weken"}),
        ToolMetadata::new("parse_clinical_text", "none", 0.0),
    );
    assert_eq!(response.content_type, "json");
    let inner: serde_json::Value = serde_json::from_str(&response.content).unwrap();
    assert_eq!(inner["history"], "Sinds 3 weken");
}

#[tokio::test]
async fn server_info_names_the_service() {
    let server = FysioServer::new(offline_config());
    let info = server.get_info();
    assert_eq!(info.server_info.name, "fysioscribe");
    assert!(info.capabilities.tools.is_some());
}

#[tokio::test]
async fn engine_shares_usage_across_operations() {
    let engine = Engine::from_config(offline_config());

    let generated = engine
        .generate_content("", "Knieklachten", GenerateOptions::default())
        .await;
    assert!(generated.success);
    assert!(generated.is_degraded());

    // Demo content is not a provider call and is not counted.
    assert_eq!(engine.usage_snapshot().request_count, 0);
    assert_eq!(engine.health().request_count, 0);

    let sections = engine.parse_clinical_text("H: Val van trap");
    assert_eq!(sections.history(), "Val van trap");
}
