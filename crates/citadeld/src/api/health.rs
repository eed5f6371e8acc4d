//! Health endpoint.

use axum::extract::State;
use axum::Json;
use serde::Serialize;

use citadel_core::ComponentHealth;

use crate::state::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub ok: bool,
    pub components: ComponentHealth,
}

/// GET /health
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let components = state.engine.health();
    Json(HealthResponse {
        // The heuristic layer is infallible; the engine is healthy as long
        // as it exists.
        ok: components.heuristic,
        components,
    })
}
