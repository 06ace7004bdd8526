//! Default Policy Engine
//!
//! Threshold-based reference implementation of the policy collaborator.
//! Destructive actions need certainty above a floor and the auto-block
//! kill switch on; everything else is allowed outright.

use super::types::{PolicyContext, PolicyProvider, PolicyVerdict};
use crate::logic::config::SafetyConfig;

// ============================================================================
// CONFIG
// ============================================================================

/// Actions that change the world for a user/address.
const DESTRUCTIVE_ACTIONS: &[&str] = &[
    "block_ip",
    "suspend_user",
    "isolate_agent",
];

/// Certainty floor below which destructive actions need a human.
const DESTRUCTIVE_CERTAINTY_FLOOR: f64 = 0.6;

/// Threshold policy engine.
pub struct ThresholdPolicyEngine {
    /// Targets that may never be acted on (operator-maintained).
    denied_targets: Vec<String>,
    destructive_certainty_floor: f64,
}

impl Default for ThresholdPolicyEngine {
    fn default() -> Self {
        Self {
            denied_targets: Vec::new(),
            destructive_certainty_floor: DESTRUCTIVE_CERTAINTY_FLOOR,
        }
    }
}

impl ThresholdPolicyEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_denied_targets(targets: Vec<String>) -> Self {
        Self {
            denied_targets: targets,
            ..Self::default()
        }
    }
}

impl PolicyProvider for ThresholdPolicyEngine {
    fn evaluate(
        &self,
        action: &str,
        target: &str,
        _owner: &str,
        context: &PolicyContext,
    ) -> PolicyVerdict {
        if self.denied_targets.iter().any(|t| t == target) {
            return PolicyVerdict::deny(&format!("Target '{}' is on the deny list", target));
        }

        if DESTRUCTIVE_ACTIONS.contains(&action) {
            if !SafetyConfig::is_auto_block_enabled() {
                return PolicyVerdict::require_approval(
                    "Auto-block disabled; destructive action needs operator approval",
                );
            }
            if context.certainty < self.destructive_certainty_floor {
                return PolicyVerdict::require_approval(&format!(
                    "Certainty {:.2} below destructive floor {:.2}",
                    context.certainty, self.destructive_certainty_floor
                ));
            }
        }

        PolicyVerdict::allow("Within policy")
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logic::model::ThreatType;
    use crate::logic::policy::types::PolicyDecision;

    fn context(certainty: f64) -> PolicyContext {
        PolicyContext {
            certainty,
            lab_context: false,
            threat_type: ThreatType::PromptInjection,
        }
    }

    #[test]
    fn test_destructive_gating() {
        // Single test owns the global kill switch to keep the suite
        // free of cross-test toggling.
        SafetyConfig::set_auto_block(true);
        let engine = ThresholdPolicyEngine::new();

        let verdict = engine.evaluate("block_ip", "203.0.113.1", "soc-pipeline", &context(0.8));
        assert_eq!(verdict.decision, PolicyDecision::Allow);

        let verdict = engine.evaluate("block_ip", "203.0.113.1", "soc-pipeline", &context(0.5));
        assert_eq!(verdict.decision, PolicyDecision::RequireApproval);

        SafetyConfig::set_auto_block(false);
        let verdict = engine.evaluate("block_ip", "203.0.113.1", "soc-pipeline", &context(0.9));
        assert_eq!(verdict.decision, PolicyDecision::RequireApproval);
        SafetyConfig::set_auto_block(true);
    }

    #[test]
    fn test_denied_target() {
        let engine =
            ThresholdPolicyEngine::with_denied_targets(vec!["10.0.0.1".to_string()]);
        let verdict = engine.evaluate("flag_user", "10.0.0.1", "soc-pipeline", &context(0.9));
        assert_eq!(verdict.decision, PolicyDecision::Deny);
    }

    #[test]
    fn test_non_destructive_always_allowed() {
        let engine = ThresholdPolicyEngine::new();
        let verdict =
            engine.evaluate("notify_security_team", "team", "soc-pipeline", &context(0.1));
        assert_eq!(verdict.decision, PolicyDecision::Allow);
    }
}
