//! MCP JSON-RPC scan endpoint.
//!
//! Accepts one JSON-RPC envelope, scans the textual payload of its params,
//! and either returns a scan verdict or a JSON-RPC error when the payload
//! must be blocked.

use axum::extract::State;
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};

use citadel_core::Action;

use crate::state::AppState;

/// JSON-RPC error code used for blocked payloads.
pub const BLOCKED_ERROR_CODE: i64 = -32000;

#[derive(Clone, Debug, Deserialize)]
pub struct McpRequest {
    #[serde(default)]
    pub jsonrpc: String,
    #[serde(default)]
    pub id: Option<Value>,
    #[serde(default)]
    pub method: Option<String>,
    #[serde(default)]
    pub params: Option<Value>,
}

/// Collect every string in a JSON value, depth-first.
pub fn collect_text(value: &Value, out: &mut Vec<String>) {
    match value {
        Value::String(s) => out.push(s.clone()),
        Value::Array(items) => {
            for item in items {
                collect_text(item, out);
            }
        }
        Value::Object(map) => {
            for item in map.values() {
                collect_text(item, out);
            }
        }
        _ => {}
    }
}

/// POST /mcp
pub async fn mcp(State(state): State<AppState>, Json(request): Json<McpRequest>) -> Json<Value> {
    let id = request.id.clone().unwrap_or(Value::Null);

    let mut texts = Vec::new();
    if let Some(params) = &request.params {
        collect_text(params, &mut texts);
    }

    if texts.is_empty() {
        return Json(json!({
            "jsonrpc": "2.0",
            "id": id,
            "result": { "decision": "ALLOW", "reason": "no textual payload" },
        }));
    }

    let payload = texts.join("\n");
    match state.engine.scan(&payload).await {
        Ok(result) if result.action == Action::Block => Json(json!({
            "jsonrpc": "2.0",
            "id": id,
            "error": {
                "code": BLOCKED_ERROR_CODE,
                "message": result.reason,
                "data": {
                    "decision": "BLOCK",
                    "risk_level": result.risk_level,
                    "decision_path": result.decision_path,
                },
            },
        })),
        Ok(result) => Json(json!({
            "jsonrpc": "2.0",
            "id": id,
            "result": {
                "decision": result.action,
                "risk_level": result.risk_level,
                "final_score": result.final_score,
                "reason": result.reason,
            },
        })),
        Err(err) => Json(json!({
            "jsonrpc": "2.0",
            "id": id,
            "error": { "code": -32602, "message": err.to_string() },
        })),
    }
}
