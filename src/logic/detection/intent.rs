//! Intent Scorer
//!
//! Weighted keyword/context scorer over five intent categories. Stateless,
//! deterministic and explainable - every score carries its reasons.

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::logic::model::{Alert, Event, Severity, ThreatType};

// ============================================================================
// THRESHOLDS & WEIGHTS
// ============================================================================

/// Danger score needed before an intent alert is raised
pub const DANGER_THRESHOLD: f64 = 0.30;

/// Lower threshold for categories that otherwise under-trigger
/// (information extraction, restriction removal)
pub const DANGER_THRESHOLD_LOW: f64 = 0.22;

/// Score added per category keyword hit
const KEYWORD_HIT: f64 = 0.5;

/// Score added per supporting context-phrase hit
const CONTEXT_HIT: f64 = 0.25;

/// Flat danger bonus per behavioral-manipulation keyword (capped)
const BEHAVIOR_BONUS: f64 = 0.05;
const BEHAVIOR_BONUS_CAP: f64 = 0.10;

// ============================================================================
// CATEGORIES
// ============================================================================

/// Intent categories, each with a fixed weight in the overall danger score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IntentCategory {
    InstructionOverride,
    RoleManipulation,
    InformationExtraction,
    RestrictionRemoval,
    CommandExecution,
}

impl IntentCategory {
    pub const ALL: [IntentCategory; 5] = [
        IntentCategory::InstructionOverride,
        IntentCategory::RoleManipulation,
        IntentCategory::InformationExtraction,
        IntentCategory::RestrictionRemoval,
        IntentCategory::CommandExecution,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            IntentCategory::InstructionOverride => "instruction_override",
            IntentCategory::RoleManipulation => "role_manipulation",
            IntentCategory::InformationExtraction => "information_extraction",
            IntentCategory::RestrictionRemoval => "restriction_removal",
            IntentCategory::CommandExecution => "command_execution",
        }
    }

    /// Fixed category weights. Sum = 1.0.
    pub fn weight(&self) -> f64 {
        match self {
            IntentCategory::InstructionOverride => 0.30,
            IntentCategory::RoleManipulation => 0.20,
            IntentCategory::InformationExtraction => 0.20,
            IntentCategory::RestrictionRemoval => 0.15,
            IntentCategory::CommandExecution => 0.15,
        }
    }

    fn threshold(&self) -> f64 {
        match self {
            IntentCategory::InformationExtraction | IntentCategory::RestrictionRemoval => {
                DANGER_THRESHOLD_LOW
            }
            _ => DANGER_THRESHOLD,
        }
    }

    fn keywords(&self) -> &'static [&'static str] {
        match self {
            IntentCategory::InstructionOverride => &[
                "ignore all previous",
                "previous instructions",
                "prior instructions",
                "disregard your instructions",
                "forget your instructions",
                "forget those",
                "new instructions",
                "override your",
                "do not follow",
            ],
            IntentCategory::RoleManipulation => &[
                "you are now",
                "pretend you are",
                "pretend to be",
                "act as if",
                "act as though",
                "roleplay as",
                "you're no longer",
            ],
            IntentCategory::InformationExtraction => &[
                "system prompt",
                "your instructions",
                "initial prompt",
                "show me your",
                "reveal your",
                "print your",
                "repeat everything above",
                "tell me about your",
            ],
            IntentCategory::RestrictionRemoval => &[
                "no restrictions",
                "without restrictions",
                "developer mode",
                "jailbreak",
                "do anything now",
                "bypass your",
                "disable your",
                "no filter",
            ],
            IntentCategory::CommandExecution => &[
                "run this",
                "run what",
                "execute",
                "run the command",
                "sudo",
                "rm -rf",
                "open a shell",
            ],
        }
    }

    fn context_phrases(&self) -> &'static [&'static str] {
        match self {
            IntentCategory::InstructionOverride => {
                &["instead", "from now on", "what i tell you", "what i say"]
            }
            IntentCategory::RoleManipulation => &["character", "persona", "stay in role"],
            IntentCategory::InformationExtraction => &["verbatim", "word for word", "exactly"],
            IntentCategory::RestrictionRemoval => &["hypothetically", "in theory", "fictional"],
            IntentCategory::CommandExecution => &["terminal", "script", "output of"],
        }
    }

    pub fn threat_type(&self) -> ThreatType {
        match self {
            IntentCategory::InstructionOverride | IntentCategory::RoleManipulation => {
                ThreatType::PromptInjection
            }
            IntentCategory::InformationExtraction => ThreatType::DataExfiltration,
            IntentCategory::RestrictionRemoval | IntentCategory::CommandExecution => {
                ThreatType::SystemManipulation
            }
        }
    }
}

/// Behavioral-manipulation keywords. Any hit adds a flat danger bonus.
const BEHAVIOR_KEYWORDS: &[&str] = &[
    "you must",
    "you have to",
    "or else",
    "urgent",
    "immediately",
    "don't tell",
    "keep this secret",
    "between us",
];

// ============================================================================
// ASSESSMENT
// ============================================================================

/// Result of intent scoring for one message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntentAssessment {
    pub dangerous: bool,
    pub intent: IntentCategory,
    pub danger_score: f64,
    pub strongest_category_score: f64,
    pub indicator_count: usize,
    pub confidence: f64,
    pub reasoning: Vec<String>,
}

// ============================================================================
// SCORING
// ============================================================================

/// Score a message's intent across all categories.
pub fn assess(message: &str) -> IntentAssessment {
    let text = message.to_lowercase();
    let mut reasoning = Vec::new();
    let mut danger = 0.0f64;
    let mut strongest = 0.0f64;
    let mut top = IntentCategory::InstructionOverride;
    let mut indicators = 0usize;

    for category in IntentCategory::ALL {
        let mut score = 0.0f64;
        for kw in category.keywords() {
            if text.contains(kw) {
                score += KEYWORD_HIT;
                indicators += 1;
                reasoning.push(format!("{}: keyword '{}'", category.as_str(), kw));
            }
        }
        for ctx in category.context_phrases() {
            if text.contains(ctx) {
                score += CONTEXT_HIT;
                indicators += 1;
                reasoning.push(format!("{}: context '{}'", category.as_str(), ctx));
            }
        }
        let score = score.min(1.0);
        if score > strongest {
            strongest = score;
            top = category;
        }
        danger += category.weight() * score;
    }

    let mut bonus = 0.0f64;
    for kw in BEHAVIOR_KEYWORDS {
        if text.contains(kw) {
            bonus += BEHAVIOR_BONUS;
            indicators += 1;
            reasoning.push(format!("behavioral manipulation: '{}'", kw));
        }
    }
    danger += bonus.min(BEHAVIOR_BONUS_CAP);

    let dangerous = danger > top.threshold();
    let confidence = (0.4
        + 0.1 * indicators.min(4) as f64
        + 0.3 * strongest
        + 0.02 * reasoning.len().min(5) as f64)
        .min(0.95);

    IntentAssessment {
        dangerous,
        intent: top,
        danger_score: danger,
        strongest_category_score: strongest,
        indicator_count: indicators,
        confidence,
        reasoning,
    }
}

/// Map danger score to alert severity.
fn severity_for(danger: f64) -> Severity {
    if danger >= 0.6 {
        Severity::Critical
    } else if danger >= 0.45 {
        Severity::High
    } else if danger >= DANGER_THRESHOLD_LOW {
        Severity::Medium
    } else {
        Severity::Low
    }
}

/// Evaluate an event; produce an alert when the intent is dangerous.
pub fn match_event(event: &Event) -> Option<Alert> {
    if event.message.is_empty() {
        return None;
    }
    let assessment = assess(&event.message);
    if !assessment.dangerous {
        return None;
    }

    let severity = severity_for(assessment.danger_score);
    let alert = Alert::new(
        severity,
        &format!("Dangerous intent: {}", assessment.intent.as_str()),
        &format!(
            "Intent scoring flagged {} (danger {:.2}, {} indicators)",
            assessment.intent.as_str(),
            assessment.danger_score,
            assessment.indicator_count
        ),
        assessment.intent.threat_type(),
        &event.agent_id,
        "intent_scorer",
    )
    .with_fp_probability(1.0 - assessment.confidence)
    .with_evidence("layer", json!("intent"))
    .with_evidence("danger_score", json!(assessment.danger_score))
    .with_evidence("reasoning", json!(assessment.reasoning.clone()));
    Some(alert)
}

// ============================================================================
// TESTS
// ============================================================================
