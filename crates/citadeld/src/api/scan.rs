//! Scan endpoint.

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};

use citadel_core::{AggregatedResult, DetectionOptions, Error, SignalSource};

use crate::state::AppState;

#[derive(Clone, Debug, Deserialize)]
pub struct ScanRequest {
    pub text: String,
    #[serde(default)]
    pub options: Option<DetectionOptions>,
}

#[derive(Clone, Debug, Serialize)]
pub struct ScanResponse {
    pub decision: String,
    pub heuristic_score: f64,
    pub semantic_score: f64,
    pub latency_ms: f64,
    /// Full aggregation result; carries `reason` and `decision_path`.
    #[serde(flatten)]
    pub result: AggregatedResult,
}

impl From<AggregatedResult> for ScanResponse {
    fn from(result: AggregatedResult) -> Self {
        let score_of = |source: SignalSource| {
            result
                .signals
                .iter()
                .find(|s| s.source == source)
                .map(|s| s.score)
                .unwrap_or(0.0)
        };

        Self {
            decision: result.action.as_str().to_string(),
            heuristic_score: score_of(SignalSource::Heuristic),
            semantic_score: score_of(SignalSource::Semantic),
            latency_ms: result.total_latency_ms,
            result,
        }
    }
}

/// POST /scan
pub async fn scan(
    State(state): State<AppState>,
    Json(request): Json<ScanRequest>,
) -> Result<Json<ScanResponse>, (StatusCode, String)> {
    let options = request.options.unwrap_or_default();

    let result = state
        .engine
        .scan_with_options(&request.text, &options)
        .await
        .map_err(|err| match err {
            Error::InvalidInput(msg) => (StatusCode::BAD_REQUEST, msg),
            other => (StatusCode::INTERNAL_SERVER_ERROR, other.to_string()),
        })?;

    Ok(Json(result.into()))
}
