//! Planner Types
//!
//! KHÔNG chứa logic - chỉ data structures.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::logic::model::{ThreatType, ValidationError};

// ============================================================================
// PLAN ACTION
// ============================================================================

/// Primary action class of a plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PlanAction {
    /// Record only; lab/test traffic
    LogOnly,
    /// Block the offending target
    Block,
    /// Open an investigation
    Investigate,
    /// Escalate to a human analyst
    HumanReview,
}

impl PlanAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            PlanAction::LogOnly => "log_only",
            PlanAction::Block => "block",
            PlanAction::Investigate => "investigate",
            PlanAction::HumanReview => "human_review",
        }
    }
}

impl std::fmt::Display for PlanAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// PLAN
// ============================================================================

/// Audit metadata carried alongside the sub-actions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanMetadata {
    pub certainty_score: f64,
    pub lab_context: bool,
    /// Ordered sub-action tokens: `name` or `name:target`
    pub sub_actions: Vec<String>,
}

/// The structured remediation decision derived from one alert.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemediationPlan {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    pub action: PlanAction,
    pub target: String,
    pub justification: String,
    pub owner: String,
    pub threat_type: ThreatType,
    pub agent_id: String,
    pub alert_id: Uuid,
    pub metadata: PlanMetadata,
}

impl RemediationPlan {
    /// Schema check before the plan enters the work queue. Required:
    /// action, target, justification, owner.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.target.is_empty() {
            return Err(ValidationError::MissingField {
                field: "target".to_string(),
            });
        }
        if self.justification.is_empty() {
            return Err(ValidationError::MissingField {
                field: "justification".to_string(),
            });
        }
        if self.owner.is_empty() {
            return Err(ValidationError::MissingField {
                field: "owner".to_string(),
            });
        }
        let c = self.metadata.certainty_score;
        if !(0.0..=1.0).contains(&c) {
            return Err(ValidationError::ProbabilityOutOfRange {
                field: "certainty_score".to_string(),
                value: c,
            });
        }
        Ok(())
    }
}

// ============================================================================
// TESTS
// ============================================================================
