//! Engine construction from environment and CLI flags.
//!
//! Optional ML components are wired from environment variables so the
//! daemon degrades to heuristic-only when nothing is configured:
//!
//! - `CITADEL_CLASSIFIER_URL` — intent classifier service
//! - `CITADEL_EMBEDDER_URL` + `CITADEL_EMBEDDING_MODEL` — embedding service
//! - `CITADEL_SAFEGUARD_URL` — escalation arbiter

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use citadel_core::{
    transport, CitadelEngine, EngineBuilder, HttpArbiter, HttpClassifier, OllamaEmbedder,
};

const DEFAULT_EMBEDDING_MODEL: &str = "all-minilm";

pub async fn build_engine(seed_dir: Option<PathBuf>, profile: &str) -> CitadelEngine {
    let http = transport::shared_http_client(Duration::from_secs(5));

    let mut builder: EngineBuilder = CitadelEngine::builder().with_profile(profile);

    if let Some(dir) = seed_dir {
        builder = builder.with_seed_dir(dir);
    }

    if let Ok(url) = std::env::var("CITADEL_CLASSIFIER_URL") {
        tracing::info!(%url, "wiring intent classifier");
        builder = builder.with_classifier(Arc::new(HttpClassifier::new(url, http.clone())));
    }

    if let Ok(url) = std::env::var("CITADEL_EMBEDDER_URL") {
        let model = std::env::var("CITADEL_EMBEDDING_MODEL")
            .unwrap_or_else(|_| DEFAULT_EMBEDDING_MODEL.to_string());
        tracing::info!(%url, %model, "wiring embedding provider");
        builder = builder.with_embedder(Arc::new(OllamaEmbedder::new(model, url, http.clone())));
    }

    if let Ok(url) = std::env::var("CITADEL_SAFEGUARD_URL") {
        tracing::info!(%url, "wiring safeguard arbiter");
        builder = builder.with_arbiter(Arc::new(HttpArbiter::new(url, http)));
    }

    builder.build().await
}
