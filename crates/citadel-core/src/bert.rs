//! ML classifier adapter.
//!
//! Wraps any transformer-style binary classifier behind one capability
//! trait. The adapter always feeds *decoded* text (so the model sees the
//! revealed payload), truncates to the model's input limit at the head, and
//! degrades to "no signal" when the backing runtime is unavailable — a
//! missing model must never fail a scan.

use std::time::Instant;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{check_response, Error, Result};
use crate::signal::{DetectionSignal, SignalLabel, SignalSource};

/// Default maximum input the adapter feeds a classifier, in characters.
pub const DEFAULT_MAX_INPUT_CHARS: usize = 8192;

/// Layer weight for classifier signals in the fusion.
pub const CLASSIFIER_WEIGHT: f64 = 0.6;

/// Output of one classification call.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Classification {
    pub label: SignalLabel,
    pub confidence: f64,
    /// Model identifier, when the backend reports one.
    #[serde(default)]
    pub model: String,
}

/// A binary SAFE/INJECTION text classifier.
#[async_trait]
pub trait TextClassifier: Send + Sync {
    /// Classify one text. `Err` means the call failed and no signal should
    /// be recorded; it never aborts the scan.
    async fn classify(&self, text: &str) -> Result<Classification>;

    /// Whether the backing runtime is usable right now.
    fn is_ready(&self) -> bool {
        true
    }

    /// Maximum input size in characters; longer inputs are truncated at
    /// the head by the adapter.
    fn max_input_chars(&self) -> usize {
        DEFAULT_MAX_INPUT_CHARS
    }
}

/// Adapter wrapping a [`TextClassifier`] into the signal pipeline.
///
/// Safe under parallel request fan-out: the only internal mutation is the
/// warm-up, behind a one-time initializer.
pub struct ClassifierAdapter {
    classifier: std::sync::Arc<dyn TextClassifier>,
    warmup: tokio::sync::OnceCell<()>,
}

impl ClassifierAdapter {
    pub fn new(classifier: std::sync::Arc<dyn TextClassifier>) -> Self {
        Self {
            classifier,
            warmup: tokio::sync::OnceCell::new(),
        }
    }

    pub fn is_ready(&self) -> bool {
        self.classifier.is_ready()
    }

    /// Run the classifier over `text`, producing a classifier-sourced
    /// signal. Returns `None` when the classifier is disabled or errored;
    /// the aggregator degrades gracefully either way.
    pub async fn detect(&self, text: &str) -> Option<DetectionSignal> {
        if !self.classifier.is_ready() {
            return None;
        }

        self.warmup
            .get_or_init(|| async {
                let _ = self.classifier.classify("warm-up probe").await;
            })
            .await;

        let limit = self.classifier.max_input_chars();
        let mut truncated = false;
        let input: &str = if text.chars().count() > limit {
            truncated = true;
            let end = text
                .char_indices()
                .nth(limit)
                .map(|(i, _)| i)
                .unwrap_or(text.len());
            &text[..end]
        } else {
            text
        };

        let start = Instant::now();
        match self.classifier.classify(input).await {
            Ok(classification) => {
                let score = match classification.label {
                    SignalLabel::Injection => classification.confidence,
                    SignalLabel::Safe => 1.0 - classification.confidence,
                    SignalLabel::Unknown => 0.0,
                };
                let mut signal = DetectionSignal::new(
                    SignalSource::Bert,
                    score,
                    classification.confidence,
                    classification.label,
                )
                .with_weight(CLASSIFIER_WEIGHT)
                .with_latency_ms(start.elapsed().as_secs_f64() * 1000.0);
                signal.metadata.truncated = truncated;
                if !classification.model.is_empty() {
                    signal.reasons.push(format!("model:{}", classification.model));
                }
                Some(signal)
            }
            Err(err) => {
                tracing::warn!(error = %err, "classifier call failed; dropping signal");
                None
            }
        }
    }
}

/// HTTP client for a remote intent-classification service.
///
/// Protocol: `POST {base_url}/classify` with `{"text": ...}`, response
/// `{"label": "SAFE"|"INJECTION", "confidence": 0.93, "model": "..."}`.
pub struct HttpClassifier {
    base_url: String,
    client: reqwest::Client,
    max_input_chars: usize,
}

#[derive(Serialize)]
struct ClassifyRequest<'a> {
    text: &'a str,
}

#[derive(Deserialize)]
struct ClassifyResponse {
    label: String,
    confidence: f64,
    #[serde(default)]
    model: String,
}

impl HttpClassifier {
    pub fn new(base_url: impl Into<String>, client: reqwest::Client) -> Self {
        Self {
            base_url: base_url.into(),
            client,
            max_input_chars: DEFAULT_MAX_INPUT_CHARS,
        }
    }

    pub fn with_max_input_chars(mut self, limit: usize) -> Self {
        self.max_input_chars = limit;
        self
    }
}

#[async_trait]
impl TextClassifier for HttpClassifier {
    async fn classify(&self, text: &str) -> Result<Classification> {
        let url = format!("{}/classify", self.base_url.trim_end_matches('/'));
        let resp = self
            .client
            .post(&url)
            .json(&ClassifyRequest { text })
            .send()
            .await
            .map_err(|err| Error::ModelUnavailable(format!("classifier request failed: {err}")))?;

        let resp = check_response(resp, "intent-classifier").await?;
        let body: ClassifyResponse = resp
            .json()
            .await
            .map_err(|err| Error::ModelUnavailable(format!("classifier response decode failed: {err}")))?;

        let label = match body.label.to_uppercase().as_str() {
            "INJECTION" | "MALICIOUS" | "UNSAFE" => SignalLabel::Injection,
            "SAFE" | "BENIGN" => SignalLabel::Safe,
            _ => SignalLabel::Unknown,
        };

        Ok(Classification {
            label,
            confidence: body.confidence.clamp(0.0, 1.0),
            model: body.model,
        })
    }

    fn max_input_chars(&self) -> usize {
        self.max_input_chars
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    struct FixedClassifier {
        label: SignalLabel,
        confidence: f64,
        ready: bool,
        limit: usize,
    }

    #[async_trait]
    impl TextClassifier for FixedClassifier {
        async fn classify(&self, _text: &str) -> Result<Classification> {
            Ok(Classification {
                label: self.label,
                confidence: self.confidence,
                model: "fixed".to_string(),
            })
        }

        fn is_ready(&self) -> bool {
            self.ready
        }

        fn max_input_chars(&self) -> usize {
            self.limit
        }
    }

    struct FailingClassifier;

    #[async_trait]
    impl TextClassifier for FailingClassifier {
        async fn classify(&self, _text: &str) -> Result<Classification> {
            Err(Error::ModelUnavailable("no runtime".to_string()))
        }
    }

    #[tokio::test]
    async fn injection_label_maps_confidence_to_score() {
        let adapter = ClassifierAdapter::new(Arc::new(FixedClassifier {
            label: SignalLabel::Injection,
            confidence: 0.9,
            ready: true,
            limit: 512,
        }));
        let signal = adapter.detect("ignore everything").await.unwrap();
        assert_eq!(signal.source, SignalSource::Bert);
        assert!((signal.score - 0.9).abs() < 1e-9);
        assert_eq!(signal.label, SignalLabel::Injection);
        assert!(!signal.metadata.truncated);
    }

    #[tokio::test]
    async fn safe_label_inverts_score() {
        let adapter = ClassifierAdapter::new(Arc::new(FixedClassifier {
            label: SignalLabel::Safe,
            confidence: 0.8,
            ready: true,
            limit: 512,
        }));
        let signal = adapter.detect("hello").await.unwrap();
        assert!((signal.score - 0.2).abs() < 1e-9);
    }

    #[tokio::test]
    async fn long_input_truncated_at_head() {
        let adapter = ClassifierAdapter::new(Arc::new(FixedClassifier {
            label: SignalLabel::Safe,
            confidence: 0.5,
            ready: true,
            limit: 16,
        }));
        let long = "a".repeat(100);
        let signal = adapter.detect(&long).await.unwrap();
        assert!(signal.metadata.truncated);
    }

    #[tokio::test]
    async fn disabled_classifier_yields_no_signal() {
        let adapter = ClassifierAdapter::new(Arc::new(FixedClassifier {
            label: SignalLabel::Safe,
            confidence: 0.5,
            ready: false,
            limit: 512,
        }));
        assert!(adapter.detect("anything").await.is_none());
    }

    #[tokio::test]
    async fn failing_classifier_yields_no_signal() {
        let adapter = ClassifierAdapter::new(Arc::new(FailingClassifier));
        assert!(adapter.detect("anything").await.is_none());
    }
}
