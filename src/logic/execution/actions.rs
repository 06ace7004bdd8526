//! Dispatch Handlers
//!
//! One handler per remediation action, dispatched through an exhaustive
//! match. Real mode performs the side effect (privileged subprocess for
//! blocks, webhook POST for notifications) and always logs at warning level;
//! dry-run mode logs the would-be effect. The loopback guardrail lives at
//! this layer so no upstream signal can route around it.

use std::collections::{HashMap, HashSet};
use std::time::Duration as StdDuration;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde_json::json;
use tokio::process::Command;
use uuid::Uuid;

use super::types::{ExecError, RemediationAction};
use crate::logic::planner::is_loopback;

// ============================================================================
// CONSTANTS
// ============================================================================

/// Firewall rule comment prefix for blocks we insert
const RULE_PREFIX: &str = "AgentSOC_Block_";

/// Maximum length of a sanitized target
const MAX_TARGET_LEN: usize = 128;

/// Webhook request timeout
const WEBHOOK_TIMEOUT_SECS: u64 = 10;

// ============================================================================
// OUTCOME
// ============================================================================

/// What a dispatch produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Side effect performed (or logged, in dry-run)
    Done(String),
    /// Guardrail refusal: success-shaped, no side effect
    LabTestPrevented(String),
}

// ============================================================================
// TARGET SANITIZATION
// ============================================================================

/// Strip shell metacharacters and cap length. Targets reach subprocess
/// arguments, so this runs before any dispatch.
pub fn sanitize_target(target: &str) -> String {
    target
        .chars()
        .filter(|c| !matches!(c, ';' | '|' | '&' | '$' | '`' | '>' | '<' | '(' | ')' | '\'' | '"' | '\\' | '\n' | '\r'))
        .take(MAX_TARGET_LEN)
        .collect::<String>()
        .trim()
        .to_string()
}

// ============================================================================
// SIDE-EFFECT REGISTRIES
// ============================================================================

/// Local bookkeeping of applied effects, for status queries and so rate
/// limits / suspensions are visible to operators.
#[derive(Default)]
pub struct EffectRegistry {
    blocked_ips: RwLock<HashSet<String>>,
    suspended_users: RwLock<HashSet<String>>,
    isolated_agents: RwLock<HashSet<String>>,
    flagged_users: RwLock<HashSet<String>>,
    rate_limits: RwLock<HashMap<String, DateTime<Utc>>>,
    enhanced_monitoring: RwLock<HashSet<String>>,
    forensic_cases: RwLock<Vec<String>>,
    pending_reviews: RwLock<Vec<String>>,
}

impl EffectRegistry {
    pub fn is_blocked(&self, ip: &str) -> bool {
        self.blocked_ips.read().contains(ip)
    }

    pub fn is_suspended(&self, user: &str) -> bool {
        self.suspended_users.read().contains(user)
    }

    pub fn is_isolated(&self, agent: &str) -> bool {
        self.isolated_agents.read().contains(agent)
    }

    pub fn is_flagged(&self, user: &str) -> bool {
        self.flagged_users.read().contains(user)
    }

    pub fn is_rate_limited(&self, target: &str) -> bool {
        self.rate_limits.read().contains_key(target)
    }

    pub fn monitoring_enabled_for(&self, target: &str) -> bool {
        self.enhanced_monitoring.read().contains(target)
    }

    pub fn pending_review_count(&self) -> usize {
        self.pending_reviews.read().len()
    }

    pub fn forensic_case_count(&self) -> usize {
        self.forensic_cases.read().len()
    }

    pub fn status(&self) -> serde_json::Value {
        json!({
            "blocked_ips": self.blocked_ips.read().len(),
            "suspended_users": self.suspended_users.read().len(),
            "isolated_agents": self.isolated_agents.read().len(),
            "flagged_users": self.flagged_users.read().len(),
            "rate_limits": self.rate_limits.read().len(),
            "enhanced_monitoring": self.enhanced_monitoring.read().len(),
            "forensic_cases": self.forensic_cases.read().len(),
            "pending_reviews": self.pending_reviews.read().len(),
        })
    }
}

// ============================================================================
// DISPATCHER
// ============================================================================

/// Runtime context shared by all handlers.
pub struct ActionDispatcher {
    dry_run: bool,
    webhook_url: Option<String>,
    http: reqwest::Client,
    registry: EffectRegistry,
}

impl ActionDispatcher {
    pub fn new(dry_run: bool, webhook_url: Option<String>) -> Self {
        let http = reqwest::Client::builder()
            .timeout(StdDuration::from_secs(WEBHOOK_TIMEOUT_SECS))
            .build()
            .unwrap_or_default();
        Self {
            dry_run,
            webhook_url,
            http,
            registry: EffectRegistry::default(),
        }
    }

    pub fn registry(&self) -> &EffectRegistry {
        &self.registry
    }

    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    /// Dispatch one action. Exhaustive over the action enum; every failure
    /// is caught at this boundary and returned as an ExecError.
    pub async fn dispatch(
        &self,
        action: RemediationAction,
        target: &str,
    ) -> Result<DispatchOutcome, ExecError> {
        match action {
            RemediationAction::BlockIp => self.block_ip(target).await,
            RemediationAction::SuspendUser => self.suspend_user(target),
            RemediationAction::IsolateAgent => self.isolate_agent(target),
            RemediationAction::RateLimitIp => self.rate_limit(target, "ip"),
            RemediationAction::RateLimitUser => self.rate_limit(target, "user"),
            RemediationAction::FlagUser => self.flag_user(target),
            RemediationAction::InitiateForensics => self.initiate_forensics(target),
            RemediationAction::EnableEnhancedMonitoring => self.enable_monitoring(target),
            RemediationAction::NotifySecurityTeam => {
                self.notify("security", target).await
            }
            RemediationAction::NotifyComplianceTeam => {
                self.notify("compliance", target).await
            }
            RemediationAction::RequireHumanReview => self.require_review(target),
        }
    }

    // ------------------------------------------------------------------
    // block_ip
    // ------------------------------------------------------------------

    async fn block_ip(&self, ip: &str) -> Result<DispatchOutcome, ExecError> {
        // HARD GUARDRAIL: never block loopback. This check is independent
        // of policy, certainty and mode, and cannot be bypassed upstream.
        if is_loopback(ip) {
            log::warn!(
                "Refusing to block loopback address '{}' (lab/test traffic)",
                ip
            );
            return Ok(DispatchOutcome::LabTestPrevented(format!(
                "Blocking '{}' refused: loopback address",
                ip
            )));
        }

        if self.dry_run {
            log::warn!("[DRY-RUN] Would block IP {} via firewall", ip);
            self.registry.blocked_ips.write().insert(ip.to_string());
            return Ok(DispatchOutcome::Done(format!("dry-run: block {}", ip)));
        }

        log::warn!("Blocking IP {} via firewall", ip);
        let output = Command::new("iptables")
            .args([
                "-I", "INPUT", "-s", ip, "-j", "DROP",
                "-m", "comment", "--comment", &format!("{}{}", RULE_PREFIX, ip),
            ])
            .output()
            .await
            .map_err(|e| ExecError::CommandFailed {
                command: "iptables".to_string(),
                detail: e.to_string(),
            })?;

        if output.status.success() {
            self.registry.blocked_ips.write().insert(ip.to_string());
            Ok(DispatchOutcome::Done(format!("Firewall rule inserted for {}", ip)))
        } else {
            Err(ExecError::CommandFailed {
                command: "iptables".to_string(),
                detail: String::from_utf8_lossy(&output.stderr).to_string(),
            })
        }
    }

    // ------------------------------------------------------------------
    // user / agent handlers
    // ------------------------------------------------------------------

    fn suspend_user(&self, user: &str) -> Result<DispatchOutcome, ExecError> {
        if user.is_empty() {
            return Err(ExecError::Other {
                message: "Empty user target".to_string(),
            });
        }
        if self.dry_run {
            log::warn!("[DRY-RUN] Would suspend user {}", user);
        } else {
            log::warn!("Suspending user {}", user);
        }
        self.registry.suspended_users.write().insert(user.to_string());
        Ok(DispatchOutcome::Done(format!("User {} suspended", user)))
    }

    fn isolate_agent(&self, agent: &str) -> Result<DispatchOutcome, ExecError> {
        if self.dry_run {
            log::warn!("[DRY-RUN] Would isolate agent {}", agent);
        } else {
            log::warn!("Isolating agent {} from production traffic", agent);
        }
        self.registry.isolated_agents.write().insert(agent.to_string());
        Ok(DispatchOutcome::Done(format!("Agent {} isolated", agent)))
    }

    fn rate_limit(&self, target: &str, kind: &str) -> Result<DispatchOutcome, ExecError> {
        log::info!("Rate limit applied to {} '{}'", kind, target);
        self.registry
            .rate_limits
            .write()
            .insert(target.to_string(), Utc::now());
        Ok(DispatchOutcome::Done(format!(
            "Rate limit active for {} {}",
            kind, target
        )))
    }

    fn flag_user(&self, user: &str) -> Result<DispatchOutcome, ExecError> {
        log::info!("User {} flagged for review", user);
        self.registry.flagged_users.write().insert(user.to_string());
        Ok(DispatchOutcome::Done(format!("User {} flagged", user)))
    }

    fn initiate_forensics(&self, target: &str) -> Result<DispatchOutcome, ExecError> {
        let case_id = Uuid::new_v4();
        log::info!("Forensic case {} opened for {}", case_id, target);
        self.registry
            .forensic_cases
            .write()
            .push(format!("{}:{}", case_id, target));
        Ok(DispatchOutcome::Done(format!("Forensic case {} opened", case_id)))
    }

    fn enable_monitoring(&self, target: &str) -> Result<DispatchOutcome, ExecError> {
        log::info!("Enhanced monitoring enabled for {}", target);
        self.registry
            .enhanced_monitoring
            .write()
            .insert(target.to_string());
        Ok(DispatchOutcome::Done(format!(
            "Enhanced monitoring active for {}",
            target
        )))
    }

    fn require_review(&self, target: &str) -> Result<DispatchOutcome, ExecError> {
        log::info!("Human review requested for {}", target);
        self.registry.pending_reviews.write().push(target.to_string());
        Ok(DispatchOutcome::Done(format!(
            "Queued {} for analyst review",
            target
        )))
    }

    // ------------------------------------------------------------------
    // notifications
    // ------------------------------------------------------------------

    async fn notify(&self, team: &str, target: &str) -> Result<DispatchOutcome, ExecError> {
        let Some(url) = self.webhook_url.as_deref() else {
            log::info!("No webhook configured; {} notification for {} logged only", team, target);
            return Ok(DispatchOutcome::Done(format!(
                "{} team notified (log only)",
                team
            )));
        };

        if self.dry_run {
            log::info!("[DRY-RUN] Would notify {} team about {}", team, target);
            return Ok(DispatchOutcome::Done(format!(
                "dry-run: notify {} team",
                team
            )));
        }

        let payload = json!({
            "team": team,
            "target": target,
            "source": crate::constants::APP_NAME,
            "timestamp": Utc::now().to_rfc3339(),
        });
        let response = self
            .http
            .post(url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| ExecError::NetworkError {
                message: e.to_string(),
            })?;

        if response.status().is_success() {
            log::info!("{} team notified about {}", team, target);
            Ok(DispatchOutcome::Done(format!("{} team notified", team)))
        } else {
            Err(ExecError::NetworkError {
                message: format!("Webhook returned HTTP {}", response.status()),
            })
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn dispatcher() -> ActionDispatcher {
        ActionDispatcher::new(true, None)
    }

    #[test]
    fn test_sanitize_strips_shell_metacharacters() {
        assert_eq!(sanitize_target("198.51.100.1; rm -rf /"), "198.51.100.1 rm -rf /");
        assert_eq!(sanitize_target("$(whoami)"), "whoami");
        assert_eq!(sanitize_target("plain-user_42"), "plain-user_42");

        let long = "x".repeat(500);
        assert_eq!(sanitize_target(&long).len(), MAX_TARGET_LEN);
    }

    #[tokio::test]
    async fn test_loopback_block_refused_in_every_mode() {
        for dry_run in [true, false] {
            let d = ActionDispatcher::new(dry_run, None);
            for ip in ["127.0.0.1", "localhost", "::1"] {
                let outcome = d.dispatch(RemediationAction::BlockIp, ip).await.unwrap();
                assert!(
                    matches!(outcome, DispatchOutcome::LabTestPrevented(_)),
                    "loopback {} must be refused (dry_run={})",
                    ip,
                    dry_run
                );
                assert!(!d.registry().is_blocked(ip));
            }
        }
    }

    #[tokio::test]
    async fn test_dry_run_block_records_without_side_effect() {
        let d = dispatcher();
        let outcome = d
            .dispatch(RemediationAction::BlockIp, "203.0.113.1")
            .await
            .unwrap();
        assert!(matches!(outcome, DispatchOutcome::Done(_)));
        assert!(d.registry().is_blocked("203.0.113.1"));
    }

    #[tokio::test]
    async fn test_suspend_and_flag_user() {
        let d = dispatcher();
        d.dispatch(RemediationAction::SuspendUser, "u7").await.unwrap();
        d.dispatch(RemediationAction::FlagUser, "u7").await.unwrap();
        assert!(d.registry().is_suspended("u7"));
        assert!(d.registry().is_flagged("u7"));
    }

    #[tokio::test]
    async fn test_empty_user_suspend_fails() {
        let d = dispatcher();
        let result = d.dispatch(RemediationAction::SuspendUser, "").await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_notify_without_webhook_is_log_only() {
        let d = dispatcher();
        let outcome = d
            .dispatch(RemediationAction::NotifySecurityTeam, "203.0.113.1")
            .await
            .unwrap();
        assert!(matches!(outcome, DispatchOutcome::Done(_)));
    }

    #[tokio::test]
    async fn test_monitoring_and_forensics() {
        let d = dispatcher();
        d.dispatch(RemediationAction::EnableEnhancedMonitoring, "203.0.113.1")
            .await
            .unwrap();
        d.dispatch(RemediationAction::InitiateForensics, "203.0.113.1")
            .await
            .unwrap();
        d.dispatch(RemediationAction::RequireHumanReview, "203.0.113.1")
            .await
            .unwrap();
        assert!(d.registry().monitoring_enabled_for("203.0.113.1"));
        assert_eq!(d.registry().forensic_case_count(), 1);
        assert_eq!(d.registry().pending_review_count(), 1);
    }
}
