//! Detection signal types shared by every layer.
//!
//! Detectors differ in how they *produce* a signal, never in its shape: each
//! layer emits a [`DetectionSignal`] and the aggregator fuses them.

use serde::{Deserialize, Serialize};

/// A detection verdict for content analysis.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Action {
    #[serde(rename = "ALLOW")]
    Allow,
    #[serde(rename = "WARN")]
    Warn,
    #[serde(rename = "BLOCK")]
    Block,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Allow => "ALLOW",
            Action::Warn => "WARN",
            Action::Block => "BLOCK",
        }
    }
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Risk classification derived from the final score.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum RiskLevel {
    #[serde(rename = "MINIMAL")]
    Minimal,
    #[serde(rename = "LOW")]
    Low,
    #[serde(rename = "MEDIUM")]
    Medium,
    #[serde(rename = "HIGH")]
    High,
    #[serde(rename = "CRITICAL")]
    Critical,
}

impl RiskLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLevel::Minimal => "MINIMAL",
            RiskLevel::Low => "LOW",
            RiskLevel::Medium => "MEDIUM",
            RiskLevel::High => "HIGH",
            RiskLevel::Critical => "CRITICAL",
        }
    }
}

/// Which detection layer produced a signal.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalSource {
    Heuristic,
    Bert,
    Semantic,
    Llm,
    Safeguard,
    DeeperGo,
}

impl SignalSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            SignalSource::Heuristic => "heuristic",
            SignalSource::Bert => "bert",
            SignalSource::Semantic => "semantic",
            SignalSource::Llm => "llm",
            SignalSource::Safeguard => "safeguard",
            SignalSource::DeeperGo => "deeper_go",
        }
    }

    /// Tie-break order used by the aggregator: on equal confidence the
    /// higher-ranked source wins.
    pub(crate) fn rank(&self) -> u8 {
        match self {
            SignalSource::Heuristic => 0,
            SignalSource::Semantic => 1,
            SignalSource::Bert => 2,
            SignalSource::DeeperGo => 3,
            SignalSource::Safeguard => 4,
            SignalSource::Llm => 5,
        }
    }
}

impl std::fmt::Display for SignalSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A detector's opinion of the input.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SignalLabel {
    #[serde(rename = "SAFE")]
    Safe,
    #[serde(rename = "INJECTION")]
    Injection,
    #[default]
    #[serde(rename = "UNKNOWN")]
    Unknown,
}

/// Obfuscation markers recorded by the deobfuscation pipeline.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObfuscationType {
    Nfkc,
    Base64,
    Base32,
    Hex,
    Url,
    Html,
    Rot13,
    UnicodeEscapes,
    OctalEscapes,
    Gzip,
    Homoglyphs,
    UnicodeTags,
    ZeroWidth,
    AsciiArt,
    BlockAscii,
    Reverse,
    Leetspeak,
}

impl ObfuscationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ObfuscationType::Nfkc => "nfkc",
            ObfuscationType::Base64 => "base64",
            ObfuscationType::Base32 => "base32",
            ObfuscationType::Hex => "hex",
            ObfuscationType::Url => "url",
            ObfuscationType::Html => "html",
            ObfuscationType::Rot13 => "rot13",
            ObfuscationType::UnicodeEscapes => "unicode_escapes",
            ObfuscationType::OctalEscapes => "octal_escapes",
            ObfuscationType::Gzip => "gzip",
            ObfuscationType::Homoglyphs => "homoglyphs",
            ObfuscationType::UnicodeTags => "unicode_tags",
            ObfuscationType::ZeroWidth => "zero_width",
            ObfuscationType::AsciiArt => "ascii_art",
            ObfuscationType::BlockAscii => "block_ascii",
            ObfuscationType::Reverse => "reverse",
            ObfuscationType::Leetspeak => "leetspeak",
        }
    }
}

/// What further analysis the aggregator recommends.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EscalationType {
    #[default]
    None,
    /// Needs transformer analysis of the decoded text.
    Bert,
    /// Classifier uncertain; the heuristic layer should re-analyze deeper.
    DeeperGo,
    /// Needs external arbitration.
    Safeguard,
}

/// Recognized metadata attached to a signal.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SignalMetadata {
    /// Credentials (or blocking-level PII under the active sensitivity) were
    /// found.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub secrets_found: bool,
    /// PII was found but no credentials.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub pii_only: bool,
    /// Dominant threat category reported by the layer.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    /// Decoded variant the layer actually scored, when it differs from the
    /// original input.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decoded_variant: Option<String>,
    /// Input was truncated to the model's limit before classification.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub truncated: bool,
}

/// One record emitted per detector invocation.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DetectionSignal {
    pub source: SignalSource,
    /// Probability-like risk estimate in `[0, 1]`.
    pub score: f64,
    /// How sure the detector is of its own score, in `[0, 1]`.
    pub confidence: f64,
    pub label: SignalLabel,
    /// Static layer weight used when fusing, in `(0, 1]`.
    pub weight: f64,
    /// Matched patterns / category names, in match order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub reasons: Vec<String>,
    /// Obfuscation markers observed when the signal scored decoded content.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub obfuscation_types: Vec<ObfuscationType>,
    pub latency_ms: f64,
    #[serde(default)]
    pub metadata: SignalMetadata,
}

impl DetectionSignal {
    pub fn new(source: SignalSource, score: f64, confidence: f64, label: SignalLabel) -> Self {
        Self {
            source,
            score: score.clamp(0.0, 1.0),
            confidence: confidence.clamp(0.0, 1.0),
            label,
            weight: 1.0,
            reasons: Vec::new(),
            obfuscation_types: Vec::new(),
            latency_ms: 0.0,
            metadata: SignalMetadata::default(),
        }
    }

    pub fn with_weight(mut self, weight: f64) -> Self {
        self.weight = weight;
        self
    }

    pub fn with_reasons(mut self, reasons: Vec<String>) -> Self {
        self.reasons = reasons;
        self
    }

    pub fn with_latency_ms(mut self, latency_ms: f64) -> Self {
        self.latency_ms = latency_ms;
        self
    }

    pub fn with_obfuscation(mut self, types: Vec<ObfuscationType>) -> Self {
        self.obfuscation_types = types;
        self
    }

    pub fn is_safe(&self) -> bool {
        self.label == SignalLabel::Safe
    }

    pub fn is_malicious(&self) -> bool {
        self.label == SignalLabel::Injection
    }

    pub fn has_obfuscation(&self) -> bool {
        !self.obfuscation_types.is_empty()
    }

    /// Confidence at-or-above the high-confidence threshold (0.85).
    pub fn is_high_confidence(&self) -> bool {
        self.confidence >= 0.85
    }

    /// Confidence below the low-confidence threshold (0.70).
    pub fn is_low_confidence(&self) -> bool {
        self.confidence < 0.70
    }
}

/// Convert a score to an [`Action`] using explicit thresholds.
pub fn to_action(score: f64, warn_threshold: f64, block_threshold: f64) -> Action {
    if score >= block_threshold {
        Action::Block
    } else if score >= warn_threshold {
        Action::Warn
    } else {
        Action::Allow
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn action_serializes_uppercase() {
        assert_eq!(serde_json::to_string(&Action::Block).unwrap(), "\"BLOCK\"");
        assert_eq!(serde_json::to_string(&Action::Allow).unwrap(), "\"ALLOW\"");
    }

    #[test]
    fn obfuscation_type_serializes_snake_case() {
        assert_eq!(
            serde_json::to_string(&ObfuscationType::Base64).unwrap(),
            "\"base64\""
        );
        assert_eq!(
            serde_json::to_string(&ObfuscationType::UnicodeEscapes).unwrap(),
            "\"unicode_escapes\""
        );
    }

    #[test]
    fn signal_clamps_score_and_confidence() {
        let s = DetectionSignal::new(SignalSource::Heuristic, 1.7, -0.2, SignalLabel::Injection);
        assert_eq!(s.score, 1.0);
        assert_eq!(s.confidence, 0.0);
    }

    #[test]
    fn to_action_thresholds() {
        assert_eq!(to_action(0.75, 0.40, 0.70), Action::Block);
        assert_eq!(to_action(0.50, 0.40, 0.70), Action::Warn);
        assert_eq!(to_action(0.10, 0.40, 0.70), Action::Allow);
    }

    #[test]
    fn source_tiebreak_order() {
        assert!(SignalSource::Llm.rank() > SignalSource::Safeguard.rank());
        assert!(SignalSource::Safeguard.rank() > SignalSource::Bert.rank());
        assert!(SignalSource::Bert.rank() > SignalSource::Semantic.rank());
        assert!(SignalSource::Semantic.rank() > SignalSource::Heuristic.rank());
    }
}
