//! Detection profiles: tunable sensitivity for different deployments.
//!
//! A profile bundles thresholds, context-discount weights, cumulative-risk
//! session behavior, and category toggles. The five built-in profiles are
//! part of the public contract.

use serde::{Deserialize, Serialize};

use crate::signal::Action;

/// Sensitivity profile for threat detection.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct DetectionProfile {
    pub name: &'static str,
    pub description: &'static str,

    /// Layer 1: block if the pattern score reaches this.
    pub pattern_threshold: f64,
    /// Layer 2: flag if semantic similarity reaches this.
    pub semantic_threshold: f64,
    /// Final: block if the combined score reaches this.
    pub block_threshold: f64,
    /// Final: warn if the combined score reaches this.
    pub warn_threshold: f64,

    pub educational_discount: f64,
    pub creative_discount: f64,
    pub historical_discount: f64,
    pub professional_discount: f64,

    /// Per-turn decay rate applied to cumulative session risk.
    pub cumulative_risk_decay: f64,
    pub max_cumulative_risk: f64,
    /// Benign turns before cumulative risk starts decaying.
    pub allow_recovery_turns: u32,

    pub enable_encoding_detection: bool,
    pub enable_multilingual: bool,

    /// What to do with ambiguous cases: "allow", "warn", or "block".
    pub ambiguous_action: &'static str,
}

/// High security: financial, healthcare, legal. Minimal false negatives.
pub const PROFILE_STRICT: DetectionProfile = DetectionProfile {
    name: "strict",
    description: "High security - financial, healthcare, legal. Minimal false negatives.",
    pattern_threshold: 0.40,
    semantic_threshold: 0.55,
    block_threshold: 0.65,
    warn_threshold: 0.45,
    educational_discount: 0.05,
    creative_discount: 0.05,
    historical_discount: 0.05,
    professional_discount: 0.10,
    cumulative_risk_decay: 0.05,
    max_cumulative_risk: 150.0,
    allow_recovery_turns: 5,
    enable_encoding_detection: true,
    enable_multilingual: true,
    ambiguous_action: "warn",
};

/// Default: good balance of security and usability.
pub const PROFILE_BALANCED: DetectionProfile = DetectionProfile {
    name: "balanced",
    description: "Default - good balance of security and usability.",
    pattern_threshold: 0.50,
    semantic_threshold: 0.65,
    block_threshold: 0.75,
    warn_threshold: 0.55,
    educational_discount: 0.15,
    creative_discount: 0.15,
    historical_discount: 0.15,
    professional_discount: 0.20,
    cumulative_risk_decay: 0.10,
    max_cumulative_risk: 120.0,
    allow_recovery_turns: 3,
    enable_encoding_detection: true,
    enable_multilingual: true,
    ambiguous_action: "warn",
};

/// Creative/educational: research, fiction, security education.
pub const PROFILE_PERMISSIVE: DetectionProfile = DetectionProfile {
    name: "permissive",
    description: "Creative/educational - research, fiction, security education. Minimal false positives.",
    pattern_threshold: 0.60,
    semantic_threshold: 0.75,
    block_threshold: 0.85,
    warn_threshold: 0.70,
    educational_discount: 0.30,
    creative_discount: 0.35,
    historical_discount: 0.30,
    professional_discount: 0.35,
    cumulative_risk_decay: 0.20,
    max_cumulative_risk: 100.0,
    allow_recovery_turns: 2,
    enable_encoding_detection: true,
    enable_multilingual: true,
    ambiguous_action: "allow",
};

/// Development/coding: allows security code review and vulnerability talk.
pub const PROFILE_CODE_ASSISTANT: DetectionProfile = DetectionProfile {
    name: "code_assistant",
    description: "Development/coding - allows security code review and vulnerability discussion.",
    pattern_threshold: 0.55,
    semantic_threshold: 0.70,
    block_threshold: 0.80,
    warn_threshold: 0.60,
    educational_discount: 0.20,
    creative_discount: 0.10,
    historical_discount: 0.15,
    professional_discount: 0.30,
    cumulative_risk_decay: 0.15,
    max_cumulative_risk: 110.0,
    allow_recovery_turns: 2,
    enable_encoding_detection: true,
    enable_multilingual: false,
    ambiguous_action: "allow",
};

/// AI safety research: allows attack discussion for defensive purposes.
pub const PROFILE_AI_SAFETY: DetectionProfile = DetectionProfile {
    name: "ai_safety",
    description: "AI safety research - allows attack discussion for defensive purposes.",
    pattern_threshold: 0.65,
    semantic_threshold: 0.80,
    block_threshold: 0.90,
    warn_threshold: 0.75,
    educational_discount: 0.35,
    creative_discount: 0.25,
    historical_discount: 0.35,
    professional_discount: 0.40,
    cumulative_risk_decay: 0.25,
    max_cumulative_risk: 80.0,
    allow_recovery_turns: 1,
    enable_encoding_detection: true,
    enable_multilingual: true,
    ambiguous_action: "allow",
};

/// Resolve a profile by name or alias; unknown names get "balanced".
pub fn get_profile(name: &str) -> &'static DetectionProfile {
    match name.to_lowercase().as_str() {
        "strict" => &PROFILE_STRICT,
        "balanced" | "default" | "" => &PROFILE_BALANCED,
        "permissive" | "creative" | "educational" => &PROFILE_PERMISSIVE,
        "code_assistant" | "code" | "dev" => &PROFILE_CODE_ASSISTANT,
        "ai_safety" | "research" | "red_team" => &PROFILE_AI_SAFETY,
        _ => &PROFILE_BALANCED,
    }
}

/// Positive context detected for profile-based discounting. Scores
/// accumulate 0.2–0.25 per matched phrase.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ContextSignals {
    pub is_educational: bool,
    pub is_creative: bool,
    pub is_historical: bool,
    pub is_professional: bool,
    pub is_code_review: bool,

    pub educational_score: f64,
    pub creative_score: f64,
    pub historical_score: f64,
    pub professional_score: f64,
}

const EDUCATIONAL_PHRASES: &[&str] = &[
    "i'm studying",
    "for my thesis",
    "for my course",
    "i'm learning",
    "educational purposes",
    "for the exam",
    "university",
    "professor",
    "homework",
    "assignment",
    "research paper",
    "academic",
    "can you explain",
    "how does",
    "what is the concept",
];

const CREATIVE_PHRASES: &[&str] = &[
    "in my novel",
    "in my story",
    "fictional",
    "character says",
    "creative writing",
    "screenplay",
    "dialogue for",
    "cyberpunk",
    "sci-fi",
    "fantasy world",
    "imagine a scenario",
    "role-play",
    "write a scene",
    "narrative",
    "plot",
];

const HISTORICAL_PHRASES: &[&str] = &[
    "in history",
    "historically",
    "back in",
    "in 1988",
    "in 19",
    "in 200",
    "the famous",
    "case study",
    "incident of",
    "breach of",
    "hack of",
    "attack on",
    "what happened",
    "morris worm",
    "equifax",
    "solarwinds",
    "target breach",
];

const PROFESSIONAL_PHRASES: &[&str] = &[
    "penetration test",
    "security audit",
    "vulnerability assessment",
    "bug bounty",
    "responsible disclosure",
    "security researcher",
    "pentest report",
    "ethical hacking",
    "compliance",
    "cissp",
    "ceh",
    "oscp",
    "security certification",
    "as a security",
    "for the client",
    "authorized testing",
];

const CODE_REVIEW_PHRASES: &[&str] = &[
    "code review",
    "reviewing code",
    "this function",
    "this snippet",
    "security code",
    "input validation",
    "sanitize",
    "sql injection",
    "xss prevention",
    "csrf token",
    "auth middleware",
    "password hash",
];

/// Analyze text for positive context signals.
pub fn detect_context_signals(text: &str) -> ContextSignals {
    let lower = text.to_lowercase();
    let mut signals = ContextSignals::default();

    for phrase in EDUCATIONAL_PHRASES {
        if lower.contains(phrase) {
            signals.educational_score += 0.2;
        }
    }
    signals.is_educational = signals.educational_score >= 0.2;

    for phrase in CREATIVE_PHRASES {
        if lower.contains(phrase) {
            signals.creative_score += 0.2;
        }
    }
    signals.is_creative = signals.creative_score >= 0.2;

    for phrase in HISTORICAL_PHRASES {
        if lower.contains(phrase) {
            signals.historical_score += 0.2;
        }
    }
    signals.is_historical = signals.historical_score >= 0.2;

    for phrase in PROFESSIONAL_PHRASES {
        if lower.contains(phrase) {
            signals.professional_score += 0.25;
        }
    }
    signals.is_professional = signals.professional_score >= 0.25;

    for phrase in CODE_REVIEW_PHRASES {
        if lower.contains(phrase) {
            signals.is_code_review = true;
            break;
        }
    }

    signals
}

/// Adjust a risk score with the profile's discount weights. Total discount
/// is capped at a 50% reduction.
pub fn apply_context_discount(
    score: f64,
    signals: &ContextSignals,
    profile: &DetectionProfile,
) -> f64 {
    let mut discount = 0.0;

    if signals.is_educational {
        discount += profile.educational_discount * signals.educational_score;
    }
    if signals.is_creative {
        discount += profile.creative_discount * signals.creative_score;
    }
    if signals.is_historical {
        discount += profile.historical_discount * signals.historical_score;
    }
    if signals.is_professional {
        discount += profile.professional_discount * signals.professional_score;
    }

    score * (1.0 - discount.min(0.5))
}

/// Block/warn/allow using the profile's own thresholds.
pub fn profiled_decision(score: f64, profile: &DetectionProfile) -> Action {
    if score >= profile.block_threshold {
        Action::Block
    } else if score >= profile.warn_threshold {
        Action::Warn
    } else {
        Action::Allow
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn profile_lookup_and_aliases() {
        assert_eq!(get_profile("strict").name, "strict");
        assert_eq!(get_profile("default").name, "balanced");
        assert_eq!(get_profile("").name, "balanced");
        assert_eq!(get_profile("creative").name, "permissive");
        assert_eq!(get_profile("dev").name, "code_assistant");
        assert_eq!(get_profile("red_team").name, "ai_safety");
        assert_eq!(get_profile("no_such_profile").name, "balanced");
    }

    #[test]
    fn profiles_order_by_permissiveness() {
        assert!(PROFILE_STRICT.block_threshold < PROFILE_BALANCED.block_threshold);
        assert!(PROFILE_BALANCED.block_threshold < PROFILE_CODE_ASSISTANT.block_threshold);
        assert!(PROFILE_CODE_ASSISTANT.block_threshold < PROFILE_AI_SAFETY.block_threshold);
        assert!(PROFILE_STRICT.educational_discount < PROFILE_AI_SAFETY.educational_discount);
    }

    #[test]
    fn context_signals_accumulate() {
        let signals =
            detect_context_signals("I'm studying for my thesis at university, can you explain?");
        assert!(signals.is_educational);
        assert!(signals.educational_score >= 0.6);
    }

    #[test]
    fn discount_capped_at_half() {
        let signals = ContextSignals {
            is_educational: true,
            educational_score: 3.0,
            is_professional: true,
            professional_score: 3.0,
            ..Default::default()
        };
        let discounted = apply_context_discount(0.8, &signals, &PROFILE_AI_SAFETY);
        assert!(discounted >= 0.4 - 1e-9);
    }

    #[test]
    fn profiled_decision_uses_profile_thresholds() {
        assert_eq!(profiled_decision(0.66, &PROFILE_STRICT), Action::Block);
        assert_eq!(profiled_decision(0.66, &PROFILE_BALANCED), Action::Warn);
        assert_eq!(profiled_decision(0.66, &PROFILE_AI_SAFETY), Action::Allow);
    }
}
