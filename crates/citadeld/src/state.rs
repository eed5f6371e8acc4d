//! Shared daemon state.

use std::sync::Arc;

use citadel_core::CitadelEngine;

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<CitadelEngine>,
}

impl AppState {
    pub fn new(engine: CitadelEngine) -> Self {
        Self {
            engine: Arc::new(engine),
        }
    }
}
