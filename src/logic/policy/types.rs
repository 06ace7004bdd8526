//! Policy Types
//!
//! KHÔNG chứa logic - chỉ data structures.

use serde::{Deserialize, Serialize};

use crate::logic::model::ThreatType;

// ============================================================================
// DECISION
// ============================================================================

/// Outcome classes of a policy evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PolicyDecision {
    Allow,
    Deny,
    RequireApproval,
}

impl PolicyDecision {
    pub fn as_str(&self) -> &'static str {
        match self {
            PolicyDecision::Allow => "allow",
            PolicyDecision::Deny => "deny",
            PolicyDecision::RequireApproval => "require_approval",
        }
    }
}

/// Full verdict with human-readable reasons.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyVerdict {
    pub decision: PolicyDecision,
    pub reasons: Vec<String>,
}

impl PolicyVerdict {
    pub fn allow(reason: &str) -> Self {
        Self {
            decision: PolicyDecision::Allow,
            reasons: vec![reason.to_string()],
        }
    }

    pub fn deny(reason: &str) -> Self {
        Self {
            decision: PolicyDecision::Deny,
            reasons: vec![reason.to_string()],
        }
    }

    pub fn require_approval(reason: &str) -> Self {
        Self {
            decision: PolicyDecision::RequireApproval,
            reasons: vec![reason.to_string()],
        }
    }
}

// ============================================================================
// CONTEXT
// ============================================================================

/// What the executor knows about the plan when asking for permission.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyContext {
    pub certainty: f64,
    pub lab_context: bool,
    pub threat_type: ThreatType,
}

// ============================================================================
// COLLABORATOR TRAIT
// ============================================================================

/// External policy collaborator.
pub trait PolicyProvider: Send + Sync {
    fn evaluate(
        &self,
        action: &str,
        target: &str,
        owner: &str,
        context: &PolicyContext,
    ) -> PolicyVerdict;
}
