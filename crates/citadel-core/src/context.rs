//! Context detection and score modification.
//!
//! Benign framings (educational questions, defensive how-tos, log excerpts,
//! negated mentions) shrink a raw heuristic score; a high-confidence attack
//! keeps at least 70% of its score no matter how it is dressed up, and an
//! attack with no benign framing at all is boosted.

use serde::{Deserialize, Serialize};

/// Context signals detected in one input.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetectedContext {
    pub is_educational: bool,
    pub is_creative: bool,
    pub is_historical: bool,
    pub is_professional: bool,
    pub is_code_review: bool,
    pub is_defensive: bool,
    pub is_log_context: bool,
    pub is_question: bool,
    pub is_negated: bool,
}

impl DetectedContext {
    pub fn any(&self) -> bool {
        self.is_educational
            || self.is_creative
            || self.is_historical
            || self.is_professional
            || self.is_code_review
            || self.is_defensive
            || self.is_log_context
            || self.is_question
            || self.is_negated
    }
}

/// Result of applying the context modifier to a raw score.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ContextModifierResult {
    pub context: DetectedContext,
    pub raw_score: f64,
    pub modified_score: f64,
    /// Effective multiplier (`modified / raw` when raw > 0).
    pub modifier_applied: f64,
    pub was_modified: bool,
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
    "explain",
    "what is",
    "what are",
    "how does",
    "how do",
    "how can",
    "how to",
];

const CREATIVE_PHRASES: &[&str] = &[
    "in my novel",
    "in my story",
    "fictional",
    "character says",
    "creative writing",
    "screenplay",
    "dialogue for",
    "write a scene",
    "fantasy world",
    "sci-fi",
];

const HISTORICAL_PHRASES: &[&str] = &[
    "in history",
    "historically",
    "case study",
    "incident of",
    "breach of",
    "the famous",
    "what happened",
    "morris worm",
    "equifax",
    "solarwinds",
    "target breach",
];

const PROFESSIONAL_PHRASES: &[&str] = &[
    "penetration test",
    "vulnerability assessment",
    "bug bounty",
    "responsible disclosure",
    "security researcher",
    "pentest report",
    "ethical hacking",
    "authorized testing",
    "as a security",
    "for the client",
    "cissp",
    "oscp",
];

const CODE_REVIEW_PHRASES: &[&str] = &[
    "code review",
    "reviewing code",
    "review this code",
    "security audit",
    "this function",
    "this snippet",
    "input validation",
    "sanitize",
    "xss prevention",
    "csrf token",
    "auth middleware",
    "password hash",
];

const DEFENSIVE_PHRASES: &[&str] = &[
    "prevent",
    "protect against",
    "protect my",
    "defend against",
    "mitigate",
    "blocked",
    "block malicious",
    "detected",
    "detection",
    "firewall",
    "hardening",
    "safely handle",
];

const NEGATED_PHRASES: &[&str] = &[
    "don't",
    "do not",
    "never",
    "shouldn't",
    "should not",
    "must not",
    "it's unethical",
    "is unethical",
];

const QUESTION_STARTERS: &[&str] = &[
    "what", "how", "why", "when", "where", "who", "which", "can", "could", "should", "would",
    "is", "are", "does", "do",
];

fn contains_any(lower: &str, phrases: &[&str]) -> bool {
    phrases.iter().any(|p| lower.contains(p))
}

fn is_log_line(lower: &str) -> bool {
    let trimmed = lower.trim_start();
    let level_prefixed = ["error", "warn", "warning", "info", "debug", "fatal", "trace"]
        .iter()
        .any(|level| {
            trimmed.starts_with(&format!("{level}:"))
                || trimmed.starts_with(&format!("[{level}]"))
                || trimmed.starts_with(&format!("[{level} "))
        });

    level_prefixed
        || lower.contains("stack trace")
        || lower.contains("stacktrace")
        || lower.contains("exception:")
        || lower.contains("] error:")
        || lower.contains("] warn")
}

/// Detect benign context signals in the input.
pub fn detect_context(text: &str) -> DetectedContext {
    let lower = text.to_lowercase();
    let trimmed = lower.trim_start();

    let first_word = trimmed
        .split(|c: char| !c.is_alphanumeric())
        .next()
        .unwrap_or("");

    DetectedContext {
        is_educational: contains_any(&lower, EDUCATIONAL_PHRASES),
        is_creative: contains_any(&lower, CREATIVE_PHRASES),
        is_historical: contains_any(&lower, HISTORICAL_PHRASES),
        is_professional: contains_any(&lower, PROFESSIONAL_PHRASES),
        is_code_review: contains_any(&lower, CODE_REVIEW_PHRASES),
        is_defensive: contains_any(&lower, DEFENSIVE_PHRASES),
        is_log_context: is_log_line(&lower),
        is_question: lower.contains('?') || QUESTION_STARTERS.contains(&first_word),
        is_negated: contains_any(&lower, NEGATED_PHRASES),
    }
}

/// Share of the raw score retained per signal (multiplicative stacking).
const EDUCATIONAL_FACTOR: f64 = 0.55;
const QUESTION_FACTOR: f64 = 0.65;
const DEFENSIVE_FACTOR: f64 = 0.45;
const LOG_FACTOR: f64 = 0.50;
const NEGATED_FACTOR: f64 = 0.70;
const CODE_REVIEW_FACTOR: f64 = 0.70;
const CREATIVE_FACTOR: f64 = 0.70;
const HISTORICAL_FACTOR: f64 = 0.70;
const PROFESSIONAL_FACTOR: f64 = 0.65;

/// At raw score ≥ this, benign framing loses most of its power.
const HIGH_SCORE_GUARD: f64 = 0.85;

/// Maximum reduction allowed for a high-confidence attack (evasion guard).
const HIGH_SCORE_MAX_REDUCTION: f64 = 0.30;

/// Boost for unambiguous attacks with zero benign framing.
const NO_CONTEXT_BOOST: f64 = 1.2;

/// Apply the context modifier to a raw heuristic score.
pub fn evaluate_with_context(text: &str, raw_score: f64) -> ContextModifierResult {
    let context = detect_context(text);

    let mut modified = raw_score;

    if context.is_educational {
        modified *= EDUCATIONAL_FACTOR;
    }
    if context.is_question {
        modified *= QUESTION_FACTOR;
    }
    if context.is_defensive {
        modified *= DEFENSIVE_FACTOR;
    }
    if context.is_log_context {
        modified *= LOG_FACTOR;
    }
    if context.is_negated {
        modified *= NEGATED_FACTOR;
    }
    if context.is_code_review {
        modified *= CODE_REVIEW_FACTOR;
    }
    if context.is_creative {
        modified *= CREATIVE_FACTOR;
    }
    if context.is_historical {
        modified *= HISTORICAL_FACTOR;
    }
    if context.is_professional {
        modified *= PROFESSIONAL_FACTOR;
    }

    // Evasion guard: dressing a real attack up as a question must not
    // launder more than 30% of its score.
    if raw_score >= HIGH_SCORE_GUARD {
        modified = modified.max(raw_score * (1.0 - HIGH_SCORE_MAX_REDUCTION));
    }

    // An unambiguous attack with no benign framing at all reads stronger.
    if raw_score >= HIGH_SCORE_GUARD && !context.any() {
        modified = (raw_score * NO_CONTEXT_BOOST).min(1.0);
    }

    let modifier_applied = if raw_score > 0.0 {
        modified / raw_score
    } else {
        1.0
    };

    ContextModifierResult {
        context,
        raw_score,
        modified_score: modified,
        modifier_applied,
        was_modified: (modified - raw_score).abs() > f64::EPSILON,
    }
}
