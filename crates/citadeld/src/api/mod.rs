//! HTTP API surface.

pub mod health;
pub mod mcp;
pub mod scan;

use axum::routing::{get, post};
use axum::Router;

use crate::state::AppState;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health))
        .route("/scan", post(scan::scan))
        .route("/mcp", post(mcp::mcp))
        .with_state(state)
}
