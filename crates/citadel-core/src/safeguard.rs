//! External arbiter for TIER-4 escalation.
//!
//! When the aggregator cannot settle an ambiguous input, the engine hands
//! the decoded text plus the provisional result to a registered arbiter
//! (a cloud or local LLM classifier) and folds its verdict back in as one
//! more signal. The arbiter is optional; when absent, TIER 3 stands.

use std::time::Instant;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::aggregator::AggregatedResult;
use crate::error::{check_response, Error, Result};
use crate::signal::{DetectionSignal, SignalLabel, SignalSource};

/// Layer weight for arbiter signals in the fusion.
pub const SAFEGUARD_WEIGHT: f64 = 0.8;

/// An arbiter's verdict on one input.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ArbiterVerdict {
    pub label: SignalLabel,
    pub score: f64,
    pub confidence: f64,
    #[serde(default)]
    pub reason: String,
}

/// Final-say judgment service invoked on escalation.
#[async_trait]
pub trait SafeguardArbiter: Send + Sync {
    /// Judge the decoded text given the provisional aggregation. `Err`
    /// drops the arbiter signal; it never fails the scan.
    async fn judge(&self, text: &str, provisional: &AggregatedResult) -> Result<ArbiterVerdict>;
}

/// Wrap an arbiter verdict into a safeguard-sourced signal.
pub async fn arbiter_signal(
    arbiter: &dyn SafeguardArbiter,
    text: &str,
    provisional: &AggregatedResult,
) -> Option<DetectionSignal> {
    let start = Instant::now();
    match arbiter.judge(text, provisional).await {
        Ok(verdict) => {
            let mut signal = DetectionSignal::new(
                SignalSource::Safeguard,
                verdict.score,
                verdict.confidence,
                verdict.label,
            )
            .with_weight(SAFEGUARD_WEIGHT)
            .with_latency_ms(start.elapsed().as_secs_f64() * 1000.0);
            if !verdict.reason.is_empty() {
                signal.reasons.push(verdict.reason);
            }
            Some(signal)
        }
        Err(err) => {
            tracing::warn!(error = %err, "arbiter call failed; dropping safeguard signal");
            None
        }
    }
}

/// HTTP arbiter client.
///
/// Protocol: `POST {base_url}/judge` with the text and provisional score,
/// response `{"label", "score", "confidence", "reason"}`.
pub struct HttpArbiter {
    base_url: String,
    client: reqwest::Client,
}

#[derive(Serialize)]
struct JudgeRequest<'a> {
    text: &'a str,
    provisional_score: f64,
    provisional_action: &'a str,
}

#[derive(Deserialize)]
struct JudgeResponse {
    label: String,
    score: f64,
    confidence: f64,
    #[serde(default)]
    reason: String,
}

impl HttpArbiter {
    pub fn new(base_url: impl Into<String>, client: reqwest::Client) -> Self {
        Self {
            base_url: base_url.into(),
            client,
        }
    }
}

#[async_trait]
impl SafeguardArbiter for HttpArbiter {
    async fn judge(&self, text: &str, provisional: &AggregatedResult) -> Result<ArbiterVerdict> {
        let url = format!("{}/judge", self.base_url.trim_end_matches('/'));
        let resp = self
            .client
            .post(&url)
            .json(&JudgeRequest {
                text,
                provisional_score: provisional.final_score,
                provisional_action: provisional.action.as_str(),
            })
            .send()
            .await
            .map_err(|err| Error::ModelUnavailable(format!("arbiter request failed: {err}")))?;

        let resp = check_response(resp, "safeguard").await?;
        let body: JudgeResponse = resp
            .json()
            .await
            .map_err(|err| Error::ModelUnavailable(format!("arbiter response decode failed: {err}")))?;

        let label = match body.label.to_uppercase().as_str() {
            "INJECTION" | "BLOCK" | "MALICIOUS" => SignalLabel::Injection,
            "SAFE" | "ALLOW" | "BENIGN" => SignalLabel::Safe,
            _ => SignalLabel::Unknown,
        };

        Ok(ArbiterVerdict {
            label,
            score: body.score.clamp(0.0, 1.0),
            confidence: body.confidence.clamp(0.0, 1.0),
            reason: body.reason,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregator::SignalAggregator;

    struct FixedArbiter(ArbiterVerdict);

    #[async_trait]
    impl SafeguardArbiter for FixedArbiter {
        async fn judge(
            &self,
            _text: &str,
            _provisional: &AggregatedResult,
        ) -> Result<ArbiterVerdict> {
            Ok(self.0.clone())
        }
    }

    struct DownArbiter;

    #[async_trait]
    impl SafeguardArbiter for DownArbiter {
        async fn judge(
            &self,
            _text: &str,
            _provisional: &AggregatedResult,
        ) -> Result<ArbiterVerdict> {
            Err(Error::Upstream(crate::error::ApiError {
                status: 503,
                body: "unavailable".to_string(),
                service: "safeguard".to_string(),
            }))
        }
    }

    #[tokio::test]
    async fn verdict_becomes_safeguard_signal() {
        let provisional = SignalAggregator::new().aggregate();
        let arbiter = FixedArbiter(ArbiterVerdict {
            label: SignalLabel::Injection,
            score: 0.9,
            confidence: 0.95,
            reason: "instruction override".to_string(),
        });

        let signal = arbiter_signal(&arbiter, "text", &provisional).await.unwrap();
        assert_eq!(signal.source, SignalSource::Safeguard);
        assert!((signal.score - 0.9).abs() < 1e-9);
        assert_eq!(signal.reasons, vec!["instruction override".to_string()]);
    }

    #[tokio::test]
    async fn failed_arbiter_yields_no_signal() {
        let provisional = SignalAggregator::new().aggregate();
        assert!(arbiter_signal(&DownArbiter, "text", &provisional)
            .await
            .is_none());
    }
}
