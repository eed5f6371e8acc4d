//! Unified threat-category normalizer.
//!
//! Every layer reports categories in its own vocabulary (pattern library
//! names, CWE-style names, seed categories). This module maps them all onto
//! one taxonomy with stable OWASP-LLM tags, so downstream consumers see a
//! single category space.

use serde::{Deserialize, Serialize};

use crate::signal::ObfuscationType;

/// The unified threat category taxonomy. Tagged values are public API.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TisCategory {
    // Core injection types
    InstructionOverride,
    Jailbreak,
    Roleplay,
    // Data security
    DataExfil,
    DataDump,
    // Execution threats
    CommandInjection,
    FileAccess,
    // Context attacks
    ContextManipulation,
    TokenExhaustion,
    GoalHijacking,
    AutonomyAbuse,
    // Advanced attacks
    HallucinationInjection,
    McpInjection,
    PaymentFraud,
    // Social / psychological
    Impersonation,
    Psychological,
    SocialEngineering,
    // Technical evasion
    Obfuscation,
    MultiTurn,
    IndirectInjection,
    // Catch-all
    Unknown,
}

impl TisCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            TisCategory::InstructionOverride => "instruction_override",
            TisCategory::Jailbreak => "jailbreak",
            TisCategory::Roleplay => "roleplay",
            TisCategory::DataExfil => "data_exfil",
            TisCategory::DataDump => "data_dump",
            TisCategory::CommandInjection => "command_injection",
            TisCategory::FileAccess => "file_access",
            TisCategory::ContextManipulation => "context_manipulation",
            TisCategory::TokenExhaustion => "token_exhaustion",
            TisCategory::GoalHijacking => "goal_hijacking",
            TisCategory::AutonomyAbuse => "autonomy_abuse",
            TisCategory::HallucinationInjection => "hallucination_injection",
            TisCategory::McpInjection => "mcp_injection",
            TisCategory::PaymentFraud => "payment_fraud",
            TisCategory::Impersonation => "impersonation",
            TisCategory::Psychological => "psychological",
            TisCategory::SocialEngineering => "social_engineering",
            TisCategory::Obfuscation => "obfuscation",
            TisCategory::MultiTurn => "multi_turn",
            TisCategory::IndirectInjection => "indirect_injection",
            TisCategory::Unknown => "unknown",
        }
    }

    /// Human-readable description for UI and reports.
    pub fn description(&self) -> &'static str {
        match self {
            TisCategory::InstructionOverride => "Core prompt injection - bypass/ignore instructions",
            TisCategory::Jailbreak => "DAN, mode switching, persona attacks",
            TisCategory::Roleplay => "Malicious roleplay persona attacks",
            TisCategory::DataExfil => "System prompt extraction, secrets exposure",
            TisCategory::DataDump => "Memory/context dumping",
            TisCategory::CommandInjection => "Shell/code execution attempts",
            TisCategory::FileAccess => "Unauthorized file operations",
            TisCategory::ContextManipulation => "Context confusion, window manipulation",
            TisCategory::TokenExhaustion => "DoS via token overload",
            TisCategory::GoalHijacking => "Objective/goal manipulation",
            TisCategory::AutonomyAbuse => "Agent loop/spawn abuse",
            TisCategory::HallucinationInjection => "False memory/information injection",
            TisCategory::McpInjection => "MCP tool poisoning, agent attacks",
            TisCategory::PaymentFraud => "Crypto/payment fraud (x402)",
            TisCategory::Impersonation => "Authority impersonation",
            TisCategory::Psychological => "Emotional manipulation",
            TisCategory::SocialEngineering => "Manipulation, urgency, pressure tactics",
            TisCategory::Obfuscation => "Encoding, evasion techniques",
            TisCategory::MultiTurn => "Crescendo, gradual escalation attacks",
            TisCategory::IndirectInjection => "External content injection",
            TisCategory::Unknown => "Unknown/unclassified threat",
        }
    }

    /// OWASP LLM Top 10 mapping (empty for Unknown).
    pub fn owasp(&self) -> &'static str {
        match self {
            TisCategory::InstructionOverride
            | TisCategory::Jailbreak
            | TisCategory::Roleplay
            | TisCategory::Impersonation
            | TisCategory::Psychological
            | TisCategory::SocialEngineering
            | TisCategory::Obfuscation
            | TisCategory::MultiTurn => "LLM01",
            TisCategory::DataExfil | TisCategory::DataDump => "LLM02",
            TisCategory::CommandInjection
            | TisCategory::FileAccess
            | TisCategory::ContextManipulation => "LLM03",
            TisCategory::TokenExhaustion => "LLM04",
            TisCategory::GoalHijacking | TisCategory::AutonomyAbuse => "LLM05",
            TisCategory::IndirectInjection => "LLM08",
            TisCategory::HallucinationInjection => "LLM09",
            TisCategory::McpInjection => "MCP-01",
            TisCategory::PaymentFraud => "AGENT-04",
            TisCategory::Unknown => "",
        }
    }
}

impl std::fmt::Display for TisCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

fn direct_mapping(category: &str) -> Option<TisCategory> {
    let mapped = match category {
        // Semantic threat categories
        "instruction_override" => TisCategory::InstructionOverride,
        "authority_bypass" => TisCategory::Jailbreak,
        "information_extraction" => TisCategory::DataExfil,
        "roleplay_attack" => TisCategory::Roleplay,
        "code_execution" => TisCategory::CommandInjection,

        // Pattern library: multi-turn
        "fiction_frame" => TisCategory::MultiTurn,
        "persona_hijack" => TisCategory::Jailbreak,
        "eval_abuse" => TisCategory::Jailbreak,
        "escalation" => TisCategory::MultiTurn,

        // Pattern library: policy injection
        "safety_disable" => TisCategory::Jailbreak,
        "restrictions_disable" => TisCategory::Jailbreak,
        "filter_disable" => TisCategory::Jailbreak,
        "unsafe_mode" => TisCategory::Jailbreak,
        "admin_override" => TisCategory::Impersonation,
        "elevated_trust" => TisCategory::Impersonation,
        "xml_policy" => TisCategory::InstructionOverride,
        "ini_policy" => TisCategory::InstructionOverride,

        // CWE-style categories
        "xss" => TisCategory::CommandInjection,
        "sql_injection" => TisCategory::CommandInjection,
        "code_injection" => TisCategory::CommandInjection,
        "command_injection" => TisCategory::CommandInjection,
        "path_traversal" => TisCategory::FileAccess,
        "deserialization" => TisCategory::CommandInjection,
        "ssrf" => TisCategory::IndirectInjection,
        "csrf" => TisCategory::IndirectInjection,
        "auth_bypass" => TisCategory::Impersonation,
        "hardcoded_creds" => TisCategory::DataExfil,
        "info_disclosure" => TisCategory::DataExfil,
        "file_upload" => TisCategory::FileAccess,
        "memory_corruption" => TisCategory::CommandInjection,
        "buffer_overflow" => TisCategory::CommandInjection,
        "use_after_free" => TisCategory::CommandInjection,
        "privilege_escalation" => TisCategory::Impersonation,

        // Generic categories
        "vulnerability" => TisCategory::Unknown,
        "injection" => TisCategory::CommandInjection,
        "rce" => TisCategory::CommandInjection,
        "dos" => TisCategory::TokenExhaustion,
        "malware" => TisCategory::IndirectInjection,
        "supply_chain" => TisCategory::IndirectInjection,

        // Taxonomy names map to themselves
        "jailbreak" => TisCategory::Jailbreak,
        "roleplay" => TisCategory::Roleplay,
        "data_exfil" => TisCategory::DataExfil,
        "data_dump" => TisCategory::DataDump,
        "file_access" => TisCategory::FileAccess,
        "context_manipulation" => TisCategory::ContextManipulation,
        "token_exhaustion" => TisCategory::TokenExhaustion,
        "goal_hijacking" => TisCategory::GoalHijacking,
        "autonomy_abuse" => TisCategory::AutonomyAbuse,
        "hallucination_injection" => TisCategory::HallucinationInjection,
        "mcp_injection" => TisCategory::McpInjection,
        "payment_fraud" => TisCategory::PaymentFraud,
        "impersonation" => TisCategory::Impersonation,
        "psychological" => TisCategory::Psychological,
        "social_engineering" => TisCategory::SocialEngineering,
        "obfuscation" => TisCategory::Obfuscation,
        "multi_turn" => TisCategory::MultiTurn,
        "indirect_injection" => TisCategory::IndirectInjection,

        _ => return None,
    };
    Some(mapped)
}

fn contains_any(lower: &str, needles: &[&str]) -> bool {
    needles.iter().any(|n| lower.contains(n))
}

/// Convert any category string to a unified category. Handles pattern
/// library names, CWE-style names, and raw taxonomy names; unknown strings
/// fall back to keyword matching. Idempotent: applied to its own output it
/// returns the same category.
pub fn normalize_category(category: &str) -> TisCategory {
    if category.is_empty() {
        return TisCategory::Unknown;
    }

    if let Some(mapped) = direct_mapping(category) {
        return mapped;
    }

    let lower = category.to_lowercase();
    if contains_any(&lower, &["inject", "override", "ignore", "bypass"]) {
        TisCategory::InstructionOverride
    } else if contains_any(&lower, &["jailbreak", "dan", "unrestrict", "persona"]) {
        TisCategory::Jailbreak
    } else if contains_any(&lower, &["exfil", "extract", "leak", "expose"]) {
        TisCategory::DataExfil
    } else if contains_any(&lower, &["exec", "shell", "command", "code"]) {
        TisCategory::CommandInjection
    } else if contains_any(&lower, &["obfusc", "encod", "evas"]) {
        TisCategory::Obfuscation
    } else if contains_any(&lower, &["social", "manipul", "urgen", "pressure"]) {
        TisCategory::SocialEngineering
    } else if contains_any(&lower, &["multi", "turn", "crescendo", "escal"]) {
        TisCategory::MultiTurn
    } else if contains_any(&lower, &["payment", "fraud", "wallet", "x402"]) {
        TisCategory::PaymentFraud
    } else if contains_any(&lower, &["imperson", "authority", "admin"]) {
        TisCategory::Impersonation
    } else if contains_any(&lower, &["file", "path", "traversal"]) {
        TisCategory::FileAccess
    } else if contains_any(&lower, &["mcp", "tool", "agent"]) {
        TisCategory::McpInjection
    } else {
        TisCategory::Unknown
    }
}

/// Every obfuscation marker normalizes to the obfuscation category.
pub fn normalize_obfuscation_type(_ot: ObfuscationType) -> TisCategory {
    TisCategory::Obfuscation
}

/// A detection category with its normalized taxonomy entry attached.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NormalizedResult {
    pub tis_category: TisCategory,
    pub tis_category_description: String,
    pub owasp_mapping: String,
    pub original_category: String,
}

/// Normalize a raw category into the unified format.
pub fn normalize_result(original_category: &str) -> NormalizedResult {
    let tis = normalize_category(original_category);
    NormalizedResult {
        tis_category: tis,
        tis_category_description: tis.description().to_string(),
        owasp_mapping: tis.owasp().to_string(),
        original_category: original_category.to_string(),
    }
}

/// All taxonomy entries.
pub fn all_categories() -> &'static [TisCategory] {
    &[
        TisCategory::InstructionOverride,
        TisCategory::Jailbreak,
        TisCategory::Roleplay,
        TisCategory::DataExfil,
        TisCategory::DataDump,
        TisCategory::CommandInjection,
        TisCategory::FileAccess,
        TisCategory::ContextManipulation,
        TisCategory::TokenExhaustion,
        TisCategory::GoalHijacking,
        TisCategory::AutonomyAbuse,
        TisCategory::HallucinationInjection,
        TisCategory::McpInjection,
        TisCategory::PaymentFraud,
        TisCategory::Impersonation,
        TisCategory::Psychological,
        TisCategory::SocialEngineering,
        TisCategory::Obfuscation,
        TisCategory::MultiTurn,
        TisCategory::IndirectInjection,
        TisCategory::Unknown,
    ]
}
