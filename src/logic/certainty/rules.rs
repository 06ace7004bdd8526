//! Certainty Scoring Rules & Weights
//!
//! Thresholds, weights and indicator tables for the four factors.
//! KHÔNG chứa logic score - chỉ constants.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::logic::model::ThreatType;

// ============================================================================
// FACTOR WEIGHTS (sum = 1.0)
// ============================================================================

/// Pattern legitimacy (inverted before weighting)
pub const WEIGHT_PATTERN: f64 = 0.30;

/// Sender trust history (inverted)
pub const WEIGHT_TRUST: f64 = 0.25;

/// Contextual naturalness (inverted)
pub const WEIGHT_CONTEXT: f64 = 0.25;

/// Explicit threat strength (NOT inverted - measures threat directly)
pub const WEIGHT_THREAT: f64 = 0.20;

// ============================================================================
// LEGITIMACY INDICATORS
// ============================================================================

/// Words that open an ordinary question
pub const QUESTION_WORDS: &[&str] = &[
    "how", "what", "why", "when", "where", "who", "can", "could", "would",
    "should", "is", "are", "do", "does",
];

/// Keywords common in legitimate support traffic
pub const LEGITIMATE_KEYWORDS: &[&str] = &[
    "password", "reset", "help", "account", "login", "error", "problem",
    "thanks", "please", "how to",
];

/// Conversational openers
pub const OPENERS: &[&str] = &["hi ", "hello", "hey ", "good morning", "good afternoon", "thanks", "thank you"];

/// Imperative verbs that start command-shaped attack text
pub const IMPERATIVE_STARTS: &[&str] = &[
    "ignore", "forget", "disregard", "pretend", "act", "reveal", "print",
    "execute", "run", "bypass", "disable", "override",
];

// ============================================================================
// NATURALNESS BANDS
// ============================================================================

pub const NATURAL_LENGTH_MIN: usize = 10;
pub const NATURAL_LENGTH_MAX: usize = 300;

/// Special-character ratio above this reads as payload, not prose
pub const SPECIAL_RATIO_HIGH: f64 = 0.3;
pub const SPECIAL_RATIO_LOW: f64 = 0.1;

/// Responses faster than this (ms) look scripted
pub const FAST_RESPONSE_MS: u64 = 500;

// ============================================================================
// EXPLICIT THREAT INDICATORS
// ============================================================================

/// High-confidence threat regexes. Each hit contributes strongly to the
/// explicit-threat factor.
pub static THREAT_REGEXES: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"ignore\s+(all\s+)?(previous|prior)\s+instructions",
        r"disregard\s+(all\s+)?(your|previous)\s+instructions",
        r"(run|execute|do)\s+what(ever)?\s+i\s+(tell|say)",
        r"(reveal|print|show)\s+(me\s+)?your\s+(system\s+)?prompt",
        r"you\s+are\s+now\s+(a|an|in)\b",
        r"(export|dump)\s+(the\s+)?(entire|all|full)",
        r"rm\s+-rf",
        r";\s*drop\s+table",
        r"(disable|bypass)\s+(your\s+)?(safety|filters|restrictions)",
    ]
    .iter()
    .filter_map(|p| Regex::new(p).ok())
    .collect()
});

/// Per regex hit (capped)
pub const THREAT_REGEX_HIT: f64 = 0.4;
pub const THREAT_REGEX_CAP: f64 = 0.8;

/// Per threat-type keyword hit (capped)
pub const THREAT_KEYWORD_HIT: f64 = 0.1;
pub const THREAT_KEYWORD_CAP: f64 = 0.2;

/// Keywords specific to each threat type.
pub fn threat_keywords(threat_type: ThreatType) -> &'static [&'static str] {
    match threat_type {
        ThreatType::PromptInjection => {
            &["ignore", "instruction", "override", "disregard", "forget", "jailbreak"]
        }
        ThreatType::DataExfiltration => {
            &["export", "dump", "database", "credentials", "secret", "leak"]
        }
        ThreatType::UnauthorizedAccess => &["admin", "root", "access", "bypass", "privilege"],
        ThreatType::MaliciousInput => &["sudo", "shell", "payload", "exploit"],
        ThreatType::SystemManipulation => &["mode", "restriction", "filter", "disable", "bypass"],
        ThreatType::PrivacyViolation => &["personal", "private", "ssn", "card"],
        ThreatType::RateLimitAbuse => &["flood", "spam", "repeat", "loop"],
        ThreatType::ModelPoisoning => &["training", "remember", "learn", "permanently"],
    }
}
