//! Signal aggregation: tiered precedence over noisy detector opinions.
//!
//! The aggregator walks five tiers in order and returns at the first match:
//!
//! - TIER 0: absolute rules (secrets found, unambiguous high scores)
//! - TIER 1: high-confidence layers that agree win outright
//! - TIER 2: observed obfuscation gives the heuristic layer veto power
//!   over an uncertain classifier
//! - TIER 3: confidence-weighted fusion with escalation hints
//! - TIER 4: an external arbiter's signal is appended by the engine and
//!   the fusion re-runs with escalation suppressed
//!
//! Decision-path strings are part of the public contract.

use serde::{Deserialize, Serialize};

use crate::signal::{
    Action, DetectionSignal, EscalationType, ObfuscationType, RiskLevel, SignalLabel, SignalSource,
};

/// Configurable thresholds for signal aggregation.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct AggregationThresholds {
    /// Any signal at or above this blocks without further analysis.
    pub fast_path_block: f64,
    /// All signals at or below this (and no obfuscation) allow without
    /// escalation.
    pub fast_path_allow: f64,
    /// Escalate to the classifier when the fused score reaches this.
    pub bert_escalation: f64,
    /// Escalate to the arbiter when still ambiguous after classification.
    pub safeguard_escalation: f64,
    /// Multiplier applied when obfuscation is observed alongside an attack.
    pub obfuscation_boost: f64,
    /// Signals at or above this confidence are trusted outright.
    pub high_confidence: f64,
    /// Signals below this confidence trigger bi-directional escalation.
    pub low_confidence: f64,
}

impl Default for AggregationThresholds {
    fn default() -> Self {
        Self {
            fast_path_block: 0.85,
            fast_path_allow: 0.05,
            bert_escalation: 0.30,
            safeguard_escalation: 0.40,
            obfuscation_boost: 1.3,
            high_confidence: 0.85,
            low_confidence: 0.70,
        }
    }
}

/// Block at 0.70, warn at 0.40.
pub const BLOCK_THRESHOLD: f64 = 0.70;
pub const WARN_THRESHOLD: f64 = 0.40;

/// The final decision after combining all signals.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AggregatedResult {
    pub final_score: f64,
    pub action: Action,
    pub risk_level: RiskLevel,
    pub reason: String,
    /// Which precedence tier fired; asserted literally by tests.
    pub decision_path: String,
    pub signals: Vec<DetectionSignal>,
    pub was_deobfuscated: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub obfuscation_types: Vec<ObfuscationType>,
    #[serde(default, skip_serializing_if = "is_no_escalation")]
    pub escalation_needed: EscalationType,
    pub total_latency_ms: f64,
}

fn is_no_escalation(e: &EscalationType) -> bool {
    *e == EscalationType::None
}

/// Map a score to an action under the default thresholds.
pub fn score_to_action(score: f64) -> Action {
    if score >= BLOCK_THRESHOLD {
        Action::Block
    } else if score >= WARN_THRESHOLD {
        Action::Warn
    } else {
        Action::Allow
    }
}

/// Map a score to a risk level. Pure and monotonically non-decreasing.
pub fn score_to_risk_level(score: f64) -> RiskLevel {
    if score >= 0.90 {
        RiskLevel::Critical
    } else if score >= 0.70 {
        RiskLevel::High
    } else if score >= 0.50 {
        RiskLevel::Medium
    } else if score >= 0.30 {
        RiskLevel::Low
    } else {
        RiskLevel::Minimal
    }
}

/// Combines detection signals with precedence logic.
pub struct SignalAggregator {
    thresholds: AggregationThresholds,
    signals: Vec<DetectionSignal>,
    /// Set for the TIER-4 re-run so an arbiter pass never re-escalates.
    suppress_escalation: bool,
}

impl Default for SignalAggregator {
    fn default() -> Self {
        Self::new()
    }
}

impl SignalAggregator {
    pub fn new() -> Self {
        Self::with_thresholds(AggregationThresholds::default())
    }

    pub fn with_thresholds(thresholds: AggregationThresholds) -> Self {
        Self {
            thresholds,
            signals: Vec::new(),
            suppress_escalation: false,
        }
    }

    /// Disable escalation hints (TIER-4 re-run).
    pub fn suppress_escalation(&mut self) {
        self.suppress_escalation = true;
    }

    pub fn add_signal(&mut self, signal: DetectionSignal) {
        self.signals.push(signal);
    }

    pub fn signal(&self, source: SignalSource) -> Option<&DetectionSignal> {
        self.signals.iter().find(|s| s.source == source)
    }

    /// A signal that actually produced an opinion. Errored detectors are
    /// recorded with label UNKNOWN and are invisible to escalation logic.
    fn active_signal(&self, source: SignalSource) -> Option<&DetectionSignal> {
        self.signal(source)
            .filter(|s| s.label != SignalLabel::Unknown)
    }

    pub fn has_signal(&self, source: SignalSource) -> bool {
        self.signal(source).is_some()
    }

    pub fn has_obfuscation(&self) -> bool {
        self.signals.iter().any(|s| s.has_obfuscation())
    }

    /// Unique obfuscation types across all signals, in observation order.
    pub fn all_obfuscation_types(&self) -> Vec<ObfuscationType> {
        let mut types = Vec::new();
        for signal in &self.signals {
            for t in &signal.obfuscation_types {
                if !types.contains(t) {
                    types.push(*t);
                }
            }
        }
        types
    }

    /// Whether classifier analysis is warranted: always on obfuscation
    /// (the model must see the decoded text), otherwise when the fused
    /// score sits in the ambiguous band.
    pub fn should_escalate_to_bert(&self) -> bool {
        if self.has_obfuscation() {
            return true;
        }
        let score = self.weighted_score();
        score >= self.thresholds.bert_escalation && score < self.thresholds.fast_path_block
    }

    /// Whether external arbitration is warranted: classifier and heuristic
    /// disagree hard, the classifier is uncertain about decoded content,
    /// or the fused score sits in the deep ambiguous band with no
    /// high-confidence signal to trust.
    pub fn should_escalate_to_safeguard(&self) -> bool {
        let bert = self.active_signal(SignalSource::Bert);
        let heuristic = self.active_signal(SignalSource::Heuristic);

        if let (Some(bert), Some(heuristic)) = (bert, heuristic) {
            if (bert.score - heuristic.score).abs() > 0.3 {
                return true;
            }
            if bert.is_low_confidence() && self.has_obfuscation() && bert.is_safe() {
                return true;
            }
        }

        let score = self.weighted_score();
        if score >= self.thresholds.safeguard_escalation && score <= 0.70 {
            if self.signals.iter().any(|s| s.is_high_confidence()) {
                return false;
            }
            return true;
        }

        false
    }

    /// Bi-directional feedback: an uncertain classifier hands the input
    /// back to the heuristic layer for deeper analysis.
    pub fn should_trigger_deeper_analysis(&self) -> bool {
        let Some(bert) = self.active_signal(SignalSource::Bert) else {
            return false;
        };

        if bert.confidence < self.thresholds.low_confidence {
            if self.has_obfuscation() && bert.is_safe() {
                return true;
            }
            if let Some(heuristic) = self.active_signal(SignalSource::Heuristic) {
                if bert.is_malicious() && heuristic.score < 0.3 {
                    return true;
                }
                if bert.is_safe() && heuristic.score > 0.4 {
                    return true;
                }
            }
        }

        false
    }

    /// Confidence-weighted mean: `Σ(score·weight·confidence) /
    /// Σ(weight·confidence)`. Errored signals (label UNKNOWN) do not
    /// participate; a zero divisor yields 0.
    pub fn weighted_score(&self) -> f64 {
        let mut weighted_sum = 0.0;
        let mut total_weight = 0.0;

        for signal in &self.signals {
            if signal.label == SignalLabel::Unknown {
                continue;
            }
            let effective = signal.weight * signal.confidence;
            weighted_sum += signal.score * effective;
            total_weight += effective;
        }

        if total_weight == 0.0 {
            0.0
        } else {
            weighted_sum / total_weight
        }
    }

    fn build_reason(&self) -> String {
        if self.signals.is_empty() {
            return "No signals".to_string();
        }

        let parts: Vec<String> = self
            .signals
            .iter()
            .map(|s| {
                let mut part = format!("{}={:.2}", s.source, s.score);
                part.push_str(&format!("({:?})", s.label));
                if s.is_high_confidence() {
                    part.push_str("[HC]");
                } else if s.is_low_confidence() {
                    part.push_str("[LC]");
                }
                part
            })
            .collect();

        parts.join(", ")
    }

    /// Combine all signals into one result, walking the tiers in order.
    pub fn aggregate(&self) -> AggregatedResult {
        let mut result = AggregatedResult {
            final_score: 0.0,
            action: Action::Allow,
            risk_level: RiskLevel::Minimal,
            reason: String::new(),
            decision_path: String::new(),
            signals: self.signals.clone(),
            was_deobfuscated: self.has_obfuscation(),
            obfuscation_types: self.all_obfuscation_types(),
            escalation_needed: EscalationType::None,
            total_latency_ms: self.signals.iter().map(|s| s.latency_ms).sum(),
        };

        // === TIER 0: absolute rules ===
        if self.signals.iter().any(|s| s.metadata.secrets_found) {
            result.final_score = 1.0;
            result.action = Action::Block;
            result.risk_level = RiskLevel::Critical;
            result.reason = "Secrets/credentials detected".to_string();
            result.decision_path = "TIER_0_SECRETS".to_string();
            return result;
        }

        for signal in &self.signals {
            if signal.score >= 0.95 && signal.is_high_confidence() {
                result.final_score = signal.score;
                result.action = Action::Block;
                result.risk_level = RiskLevel::Critical;
                result.reason = format!("{}: {}", signal.source, signal.reasons.join("; "));
                result.decision_path = format!("TIER_0_HIGH_SCORE_{}", signal.source);
                return result;
            }
        }

        // === TIER 1: high-confidence agreement ===
        let mut high_conf: Vec<&DetectionSignal> = self
            .signals
            .iter()
            .filter(|s| s.is_high_confidence() && s.label != SignalLabel::Unknown)
            .collect();

        if !high_conf.is_empty() {
            // Highest confidence first; on ties the later source wins.
            high_conf.sort_by(|a, b| {
                b.confidence
                    .partial_cmp(&a.confidence)
                    .unwrap_or(std::cmp::Ordering::Equal)
                    .then(b.source.rank().cmp(&a.source.rank()))
            });

            let top = high_conf[0];
            let all_agree = high_conf.iter().all(|s| s.label == top.label);

            if all_agree {
                result.final_score = top.score;
                result.action = score_to_action(top.score);
                result.risk_level = score_to_risk_level(top.score);
                result.reason = format!(
                    "High-confidence {}: {:?} ({:.0}%)",
                    top.source,
                    top.label,
                    top.confidence * 100.0
                );
                result.decision_path = "TIER_1_HIGH_CONFIDENCE_AGREEMENT".to_string();
                return result;
            }
            // Disagreement falls through to TIER 2/3.
        }

        // === TIER 2: obfuscation veto ===
        if self.has_obfuscation() {
            let heuristic = self.signal(SignalSource::Heuristic);
            let bert = self.signal(SignalSource::Bert);

            if let (Some(heuristic), Some(bert)) = (heuristic, bert) {
                // Case A: classifier says SAFE without conviction while the
                // decoded text looks suspicious. Distrust the classifier.
                if bert.is_safe() && bert.confidence < self.thresholds.high_confidence {
                    let boosted =
                        (heuristic.score * self.thresholds.obfuscation_boost).min(1.0);
                    if boosted >= 0.5 {
                        result.final_score = boosted;
                        result.action = score_to_action(boosted);
                        result.risk_level = score_to_risk_level(boosted);
                        result.reason = format!(
                            "Obfuscation veto: classifier said SAFE ({:.0}% conf) but {:?} detected",
                            bert.confidence * 100.0,
                            result.obfuscation_types,
                        );
                        result.decision_path = "TIER_2_OBFUSCATION_VETO".to_string();
                        if !self.suppress_escalation {
                            result.escalation_needed = EscalationType::DeeperGo;
                        }
                        return result;
                    }
                }

                // Case B: both layers see the attack. Obfuscation plus
                // agreement is a strong combined signal.
                if bert.is_malicious() && heuristic.score >= 0.4 {
                    let boosted = ((bert.score + heuristic.score) / 2.0
                        * self.thresholds.obfuscation_boost)
                        .min(1.0);
                    result.final_score = boosted;
                    result.action = score_to_action(boosted);
                    result.risk_level = score_to_risk_level(boosted);
                    result.reason = format!(
                        "Obfuscation + agreement: heuristic={:.2}, classifier={:?} ({:.0}%)",
                        heuristic.score,
                        bert.label,
                        bert.confidence * 100.0
                    );
                    result.decision_path = "TIER_2_OBFUSCATION_BOOST".to_string();
                    return result;
                }
            }
        }

        // === TIER 3: confidence-weighted aggregation ===
        let mut score = self.weighted_score();

        if self.has_obfuscation() && (0.3..0.7).contains(&score) {
            score = (score * self.thresholds.obfuscation_boost).min(1.0);
        }

        result.final_score = score;
        result.action = score_to_action(score);
        result.risk_level = score_to_risk_level(score);
        result.reason = self.build_reason();
        result.decision_path = "TIER_3_WEIGHTED_AGGREGATION".to_string();

        if !self.suppress_escalation {
            if self.should_escalate_to_safeguard() && !self.has_signal(SignalSource::Safeguard) {
                result.escalation_needed = EscalationType::Safeguard;
            } else if self.should_trigger_deeper_analysis()
                && !self.has_signal(SignalSource::DeeperGo)
            {
                result.escalation_needed = EscalationType::DeeperGo;
            }
        }

        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signal::SignalMetadata;

    fn signal(
        source: SignalSource,
        score: f64,
        confidence: f64,
        label: SignalLabel,
    ) -> DetectionSignal {
        DetectionSignal::new(source, score, confidence, label).with_weight(0.5)
    }

    #[test]
    fn tier0_secrets_wins_over_everything() {
        let mut agg = SignalAggregator::new();
        let mut s = signal(SignalSource::Heuristic, 0.1, 0.5, SignalLabel::Safe);
        s.metadata = SignalMetadata {
            secrets_found: true,
            ..Default::default()
        };
        agg.add_signal(s);
        agg.add_signal(signal(SignalSource::Bert, 0.0, 0.99, SignalLabel::Safe));

        let result = agg.aggregate();
        assert_eq!(result.decision_path, "TIER_0_SECRETS");
        assert_eq!(result.action, Action::Block);
        assert_eq!(result.risk_level, RiskLevel::Critical);
        assert_eq!(result.final_score, 1.0);
    }

    #[test]
    fn tier0_high_score_names_the_source() {
        let mut agg = SignalAggregator::new();
        agg.add_signal(signal(SignalSource::Heuristic, 0.97, 0.9, SignalLabel::Injection));

        let result = agg.aggregate();
        assert_eq!(result.decision_path, "TIER_0_HIGH_SCORE_heuristic");
        assert_eq!(result.action, Action::Block);
    }

    #[test]
    fn tier1_agreement_uses_top_signal() {
        let mut agg = SignalAggregator::new();
        agg.add_signal(signal(SignalSource::Heuristic, 0.05, 0.90, SignalLabel::Safe));
        agg.add_signal(signal(SignalSource::Bert, 0.10, 0.95, SignalLabel::Safe));

        let result = agg.aggregate();
        assert_eq!(result.decision_path, "TIER_1_HIGH_CONFIDENCE_AGREEMENT");
        assert_eq!(result.action, Action::Allow);
        assert!((result.final_score - 0.10).abs() < 1e-9);
    }

    #[test]
    fn tier1_tie_break_prefers_later_source() {
        let mut agg = SignalAggregator::new();
        agg.add_signal(signal(SignalSource::Heuristic, 0.30, 0.90, SignalLabel::Safe));
        agg.add_signal(signal(SignalSource::Bert, 0.10, 0.90, SignalLabel::Safe));

        let result = agg.aggregate();
        assert_eq!(result.decision_path, "TIER_1_HIGH_CONFIDENCE_AGREEMENT");
        // bert outranks heuristic on equal confidence.
        assert!((result.final_score - 0.10).abs() < 1e-9);
    }

    #[test]
    fn tier1_disagreement_falls_through() {
        let mut agg = SignalAggregator::new();
        agg.add_signal(signal(SignalSource::Heuristic, 0.9, 0.90, SignalLabel::Injection));
        agg.add_signal(signal(SignalSource::Bert, 0.1, 0.95, SignalLabel::Safe));

        let result = agg.aggregate();
        assert_ne!(result.decision_path, "TIER_1_HIGH_CONFIDENCE_AGREEMENT");
    }

    #[test]
    fn tier2_obfuscation_veto() {
        let mut agg = SignalAggregator::new();
        agg.add_signal(
            signal(SignalSource::Heuristic, 0.55, 0.6, SignalLabel::Injection)
                .with_obfuscation(vec![ObfuscationType::Base64]),
        );
        agg.add_signal(signal(SignalSource::Bert, 0.1, 0.6, SignalLabel::Safe));

        let result = agg.aggregate();
        assert_eq!(result.decision_path, "TIER_2_OBFUSCATION_VETO");
        assert_eq!(result.escalation_needed, EscalationType::DeeperGo);
        // 0.55 * 1.3 = 0.715 -> BLOCK
        assert!((result.final_score - 0.715).abs() < 1e-9);
        assert_eq!(result.action, Action::Block);
    }

    #[test]
    fn tier2_boost_on_agreement() {
        let mut agg = SignalAggregator::new();
        agg.add_signal(
            signal(SignalSource::Heuristic, 0.5, 0.6, SignalLabel::Injection)
                .with_obfuscation(vec![ObfuscationType::Hex]),
        );
        agg.add_signal(signal(SignalSource::Bert, 0.7, 0.6, SignalLabel::Injection));

        let result = agg.aggregate();
        assert_eq!(result.decision_path, "TIER_2_OBFUSCATION_BOOST");
        // avg(0.5, 0.7) * 1.3 = 0.78
        assert!((result.final_score - 0.78).abs() < 1e-9);
        assert_eq!(result.action, Action::Block);
    }

    #[test]
    fn tier3_weighted_fusion() {
        let mut agg = SignalAggregator::new();
        agg.add_signal(
            DetectionSignal::new(SignalSource::Heuristic, 0.6, 0.6, SignalLabel::Injection)
                .with_weight(0.4),
        );
        agg.add_signal(
            DetectionSignal::new(SignalSource::Semantic, 0.2, 0.5, SignalLabel::Safe)
                .with_weight(0.6),
        );

        let result = agg.aggregate();
        assert_eq!(result.decision_path, "TIER_3_WEIGHTED_AGGREGATION");
        // (0.6*0.24 + 0.2*0.30) / (0.24 + 0.30) = 0.3777...
        assert!((result.final_score - 0.2040 / 0.54).abs() < 1e-6);
    }

    #[test]
    fn unknown_label_signals_do_not_fuse() {
        let mut agg = SignalAggregator::new();
        agg.add_signal(signal(SignalSource::Heuristic, 0.2, 0.6, SignalLabel::Safe));
        agg.add_signal(signal(SignalSource::Bert, 0.9, 0.9, SignalLabel::Unknown));

        let result = agg.aggregate();
        assert_eq!(result.decision_path, "TIER_3_WEIGHTED_AGGREGATION");
        assert!((result.final_score - 0.2).abs() < 1e-9);
        assert_eq!(result.signals.len(), 2);
    }

    #[test]
    fn no_signals_fuse_to_zero() {
        let agg = SignalAggregator::new();
        let result = agg.aggregate();
        assert_eq!(result.final_score, 0.0);
        assert_eq!(result.action, Action::Allow);
        assert_eq!(result.reason, "No signals");
    }

    #[test]
    fn tier3_obfuscation_boost_in_band() {
        let mut agg = SignalAggregator::new();
        agg.add_signal(
            signal(SignalSource::Heuristic, 0.4, 0.6, SignalLabel::Safe)
                .with_obfuscation(vec![ObfuscationType::Rot13]),
        );

        let result = agg.aggregate();
        assert_eq!(result.decision_path, "TIER_3_WEIGHTED_AGGREGATION");
        assert!((result.final_score - 0.52).abs() < 1e-9);
    }

    #[test]
    fn safeguard_escalation_on_disagreement() {
        let mut agg = SignalAggregator::new();
        agg.add_signal(signal(SignalSource::Heuristic, 0.75, 0.6, SignalLabel::Injection));
        agg.add_signal(signal(SignalSource::Bert, 0.2, 0.75, SignalLabel::Safe));

        assert!(agg.should_escalate_to_safeguard());
        let result = agg.aggregate();
        assert_eq!(result.escalation_needed, EscalationType::Safeguard);
    }

    #[test]
    fn deeper_analysis_when_classifier_uncertain_about_decoded_text() {
        let mut agg = SignalAggregator::new();
        agg.add_signal(
            signal(SignalSource::Heuristic, 0.2, 0.6, SignalLabel::Safe)
                .with_obfuscation(vec![ObfuscationType::Base64]),
        );
        agg.add_signal(signal(SignalSource::Bert, 0.1, 0.5, SignalLabel::Safe));

        assert!(agg.should_trigger_deeper_analysis());
    }

    #[test]
    fn suppressed_escalation_stays_none() {
        let mut agg = SignalAggregator::new();
        agg.add_signal(signal(SignalSource::Heuristic, 0.75, 0.6, SignalLabel::Injection));
        agg.add_signal(signal(SignalSource::Bert, 0.2, 0.75, SignalLabel::Safe));
        agg.suppress_escalation();

        let result = agg.aggregate();
        assert_eq!(result.escalation_needed, EscalationType::None);
    }

    #[test]
    fn bert_escalation_on_obfuscation_or_ambiguity() {
        let mut agg = SignalAggregator::new();
        agg.add_signal(
            signal(SignalSource::Heuristic, 0.05, 0.6, SignalLabel::Safe)
                .with_obfuscation(vec![ObfuscationType::ZeroWidth]),
        );
        assert!(agg.should_escalate_to_bert());

        let mut agg = SignalAggregator::new();
        agg.add_signal(signal(SignalSource::Heuristic, 0.5, 0.6, SignalLabel::Injection));
        assert!(agg.should_escalate_to_bert());

        let mut agg = SignalAggregator::new();
        agg.add_signal(signal(SignalSource::Heuristic, 0.05, 0.6, SignalLabel::Safe));
        assert!(!agg.should_escalate_to_bert());
    }

    #[test]
    fn risk_levels_follow_thresholds() {
        assert_eq!(score_to_risk_level(0.95), RiskLevel::Critical);
        assert_eq!(score_to_risk_level(0.75), RiskLevel::High);
        assert_eq!(score_to_risk_level(0.55), RiskLevel::Medium);
        assert_eq!(score_to_risk_level(0.35), RiskLevel::Low);
        assert_eq!(score_to_risk_level(0.05), RiskLevel::Minimal);
    }
}
