//! Execution Types
//!
//! KHÔNG chứa logic - chỉ data structures.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ============================================================================
// REMEDIATION ACTIONS
// ============================================================================

/// Closed set of dispatchable actions. Sub-action tokens parse into this
/// enum so the dispatcher gets compile-time coverage instead of a runtime
/// "unknown action" fallback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RemediationAction {
    BlockIp,
    SuspendUser,
    IsolateAgent,
    RateLimitIp,
    RateLimitUser,
    FlagUser,
    InitiateForensics,
    EnableEnhancedMonitoring,
    NotifySecurityTeam,
    NotifyComplianceTeam,
    RequireHumanReview,
}

impl RemediationAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            RemediationAction::BlockIp => "block_ip",
            RemediationAction::SuspendUser => "suspend_user",
            RemediationAction::IsolateAgent => "isolate_agent",
            RemediationAction::RateLimitIp => "rate_limit_ip",
            RemediationAction::RateLimitUser => "rate_limit_user",
            RemediationAction::FlagUser => "flag_user",
            RemediationAction::InitiateForensics => "initiate_forensics",
            RemediationAction::EnableEnhancedMonitoring => "enable_enhanced_monitoring",
            RemediationAction::NotifySecurityTeam => "notify_security_team",
            RemediationAction::NotifyComplianceTeam => "notify_compliance_team",
            RemediationAction::RequireHumanReview => "require_human_review",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "block_ip" => Some(RemediationAction::BlockIp),
            "suspend_user" => Some(RemediationAction::SuspendUser),
            "isolate_agent" => Some(RemediationAction::IsolateAgent),
            "rate_limit_ip" => Some(RemediationAction::RateLimitIp),
            "rate_limit_user" => Some(RemediationAction::RateLimitUser),
            "flag_user" => Some(RemediationAction::FlagUser),
            "initiate_forensics" => Some(RemediationAction::InitiateForensics),
            "enable_enhanced_monitoring" => Some(RemediationAction::EnableEnhancedMonitoring),
            "notify_security_team" => Some(RemediationAction::NotifySecurityTeam),
            "notify_compliance_team" => Some(RemediationAction::NotifyComplianceTeam),
            "require_human_review" => Some(RemediationAction::RequireHumanReview),
            _ => None,
        }
    }

    pub fn is_destructive(&self) -> bool {
        matches!(
            self,
            RemediationAction::BlockIp
                | RemediationAction::SuspendUser
                | RemediationAction::IsolateAgent
        )
    }
}

impl std::fmt::Display for RemediationAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One parsed sub-action: action kind plus its resolved target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubAction {
    pub action: RemediationAction,
    pub target: String,
}

// ============================================================================
// EXECUTION STATUS
// ============================================================================

/// Terminal status of one sub-action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecStatus {
    Executed,
    Skipped,
    Failed,
    Denied,
    PendingApproval,
    /// Guardrail refusal: success-shaped so upstream reporting stays intact
    LabTestPrevented,
}

impl ExecStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecStatus::Executed => "executed",
            ExecStatus::Skipped => "skipped",
            ExecStatus::Failed => "failed",
            ExecStatus::Denied => "denied",
            ExecStatus::PendingApproval => "pending_approval",
            ExecStatus::LabTestPrevented => "lab_test_prevented",
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, ExecStatus::Failed)
    }
}

// ============================================================================
// EXECUTION RECORD
// ============================================================================

/// Record of one sub-action outcome. Keyed in the idempotency store by
/// hash(action, target, plan_id); expires after its TTL.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionRecord {
    pub execution_id: Uuid,
    pub plan_id: Uuid,
    pub action: RemediationAction,
    pub target: String,
    pub timestamp: DateTime<Utc>,
    pub status: ExecStatus,
    /// Result text or error description
    pub detail: String,
    pub expires_at: DateTime<Utc>,
}

// ============================================================================
// PLAYBOOK EXECUTION
// ============================================================================

/// Aggregate status over all of a plan's sub-actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlaybookStatus {
    Running,
    /// Every sub-action reached a terminal non-failed status
    Completed,
    /// At least one sub-action failed
    Failed,
    /// The plan itself was rejected before any sub-action ran
    Rejected,
}

/// One plan, fully processed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlaybookExecution {
    pub plan_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub status: PlaybookStatus,
    pub records: Vec<ExecutionRecord>,
}

impl PlaybookExecution {
    pub fn new(plan_id: Uuid) -> Self {
        Self {
            plan_id,
            started_at: Utc::now(),
            finished_at: None,
            status: PlaybookStatus::Running,
            records: Vec::new(),
        }
    }

    /// Fold the records into the aggregate status.
    pub fn finish(&mut self) {
        self.finished_at = Some(Utc::now());
        self.status = if self.records.iter().any(|r| r.status.is_failure()) {
            PlaybookStatus::Failed
        } else {
            PlaybookStatus::Completed
        };
    }
}

// ============================================================================
// EXECUTION ERRORS
// ============================================================================

/// Dispatch-level failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ExecError {
    /// Subprocess or API call failed
    CommandFailed { command: String, detail: String },
    /// Per-attempt deadline elapsed
    Timeout { secs: u64 },
    /// Circuit breaker is open for this action+target
    CircuitOpen,
    /// Sub-action token did not parse
    UnknownAction { token: String },
    /// Network error talking to a collaborator
    NetworkError { message: String },
    /// Other error
    Other { message: String },
}

impl std::fmt::Display for ExecError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExecError::CommandFailed { command, detail } => {
                write!(f, "Command '{}' failed: {}", command, detail)
            }
            ExecError::Timeout { secs } => write!(f, "Attempt timed out after {}s", secs),
            ExecError::CircuitOpen => write!(f, "Circuit open - failing fast"),
            ExecError::UnknownAction { token } => write!(f, "Unknown action token '{}'", token),
            ExecError::NetworkError { message } => write!(f, "Network error: {}", message),
            ExecError::Other { message } => write!(f, "Error: {}", message),
        }
    }
}

impl std::error::Error for ExecError {}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_action_name_round_trip() {
        for action in [
            RemediationAction::BlockIp,
            RemediationAction::SuspendUser,
            RemediationAction::IsolateAgent,
            RemediationAction::RateLimitIp,
            RemediationAction::RateLimitUser,
            RemediationAction::FlagUser,
            RemediationAction::InitiateForensics,
            RemediationAction::EnableEnhancedMonitoring,
            RemediationAction::NotifySecurityTeam,
            RemediationAction::NotifyComplianceTeam,
            RemediationAction::RequireHumanReview,
        ] {
            assert_eq!(RemediationAction::from_name(action.as_str()), Some(action));
        }
        assert_eq!(RemediationAction::from_name("self_destruct"), None);
    }

    #[test]
    fn test_playbook_aggregation() {
        let plan_id = Uuid::new_v4();
        let mut playbook = PlaybookExecution::new(plan_id);
        let record = |status| ExecutionRecord {
            execution_id: Uuid::new_v4(),
            plan_id,
            action: RemediationAction::FlagUser,
            target: "u1".to_string(),
            timestamp: Utc::now(),
            status,
            detail: String::new(),
            expires_at: Utc::now(),
        };

        playbook.records.push(record(ExecStatus::Executed));
        playbook.records.push(record(ExecStatus::Skipped));
        playbook.finish();
        assert_eq!(playbook.status, PlaybookStatus::Completed);

        let mut playbook = PlaybookExecution::new(plan_id);
        playbook.records.push(record(ExecStatus::Executed));
        playbook.records.push(record(ExecStatus::Failed));
        playbook.finish();
        assert_eq!(playbook.status, PlaybookStatus::Failed);
    }

    #[test]
    fn test_lab_prevention_is_not_failure() {
        assert!(!ExecStatus::LabTestPrevented.is_failure());
        assert!(ExecStatus::Failed.is_failure());
    }
}
