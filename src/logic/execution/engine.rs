//! Execution Engine (Remediator)
//!
//! Processes one plan at a time: each sub-action runs through
//! parse -> idempotency check -> policy check -> retry-guarded dispatch ->
//! record. Nothing in this path is allowed to crash the process; every
//! handler failure becomes a recorded failure.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration as StdDuration;

use chrono::{Duration, Utc};
use parking_lot::Mutex;
use rand::Rng;
use serde::Serialize;
use uuid::Uuid;

use super::actions::{sanitize_target, ActionDispatcher, DispatchOutcome};
use super::circuit::CircuitBreaker;
use super::idempotency::{idempotency_key, IdempotencyStore};
use super::types::{
    ExecError, ExecStatus, ExecutionRecord, PlaybookExecution, PlaybookStatus, RemediationAction,
    SubAction,
};
use crate::logic::config::PipelineConfig;
use crate::logic::planner::RemediationPlan;
use crate::logic::policy::{PolicyContext, PolicyDecision, PolicyProvider};

// ============================================================================
// CONSTANTS
// ============================================================================

/// Breaker entries idle longer than this are swept (seconds)
const BREAKER_IDLE_SWEEP_SECS: i64 = 24 * 3600;

/// Finished playbooks older than this are swept (seconds)
const PLAYBOOK_RETENTION_SECS: i64 = 24 * 3600;

/// Bounded action-history buffer size
const MAX_HISTORY: usize = 500;

/// Actions allowed to run in real mode when the whitelist is enabled.
const ACTION_WHITELIST: &[RemediationAction] = &[
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
];

// ============================================================================
// STATISTICS
// ============================================================================

#[derive(Default)]
struct ExecutionStats {
    plans_processed: AtomicU64,
    plans_rejected: AtomicU64,
    executed: AtomicU64,
    skipped: AtomicU64,
    failed: AtomicU64,
    denied: AtomicU64,
    pending_approval: AtomicU64,
    lab_prevented: AtomicU64,
    breaker_fast_fails: AtomicU64,
}

/// Read-only view of the counters.
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionStatsSnapshot {
    pub plans_processed: u64,
    pub plans_rejected: u64,
    pub executed: u64,
    pub skipped: u64,
    pub failed: u64,
    pub denied: u64,
    pub pending_approval: u64,
    pub lab_prevented: u64,
    pub breaker_fast_fails: u64,
}

// ============================================================================
// ENGINE
// ============================================================================

pub struct ExecutionEngine {
    dispatcher: ActionDispatcher,
    idempotency: IdempotencyStore,
    breaker: CircuitBreaker,
    policy: Box<dyn PolicyProvider>,
    playbooks: Mutex<HashMap<Uuid, PlaybookExecution>>,
    history: Mutex<Vec<ExecutionRecord>>,
    stats: ExecutionStats,
    retry_attempts: u32,
    retry_backoff_ms: u64,
    attempt_timeout_secs: u64,
    sanitize_targets: bool,
    schema_validation: bool,
    action_whitelist_enabled: bool,
    dry_run: bool,
}

impl ExecutionEngine {
    pub fn new(config: &PipelineConfig, policy: Box<dyn PolicyProvider>) -> Self {
        Self {
            dispatcher: ActionDispatcher::new(config.dry_run, config.webhook_url.clone()),
            idempotency: IdempotencyStore::new(config.record_ttl_secs),
            breaker: CircuitBreaker::new(
                config.breaker_failure_threshold,
                config.breaker_success_threshold,
                config.breaker_cooldown_secs,
            ),
            policy,
            playbooks: Mutex::new(HashMap::new()),
            history: Mutex::new(Vec::new()),
            stats: ExecutionStats::default(),
            retry_attempts: config.retry_attempts.max(1),
            retry_backoff_ms: config.retry_backoff_ms,
            attempt_timeout_secs: config.attempt_timeout_secs.max(1),
            sanitize_targets: config.sanitize_targets,
            schema_validation: config.schema_validation,
            action_whitelist_enabled: config.action_whitelist_enabled,
            dry_run: config.dry_run,
        }
    }

    pub fn dispatcher(&self) -> &ActionDispatcher {
        &self.dispatcher
    }

    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    pub fn stats(&self) -> ExecutionStatsSnapshot {
        ExecutionStatsSnapshot {
            plans_processed: self.stats.plans_processed.load(Ordering::Relaxed),
            plans_rejected: self.stats.plans_rejected.load(Ordering::Relaxed),
            executed: self.stats.executed.load(Ordering::Relaxed),
            skipped: self.stats.skipped.load(Ordering::Relaxed),
            failed: self.stats.failed.load(Ordering::Relaxed),
            denied: self.stats.denied.load(Ordering::Relaxed),
            pending_approval: self.stats.pending_approval.load(Ordering::Relaxed),
            lab_prevented: self.stats.lab_prevented.load(Ordering::Relaxed),
            breaker_fast_fails: self.stats.breaker_fast_fails.load(Ordering::Relaxed),
        }
    }

    pub fn playbook(&self, plan_id: Uuid) -> Option<PlaybookExecution> {
        self.playbooks.lock().get(&plan_id).cloned()
    }

    /// Most recent execution records, newest last.
    pub fn recent_records(&self, limit: usize) -> Vec<ExecutionRecord> {
        let history = self.history.lock();
        let start = history.len().saturating_sub(limit);
        history[start..].to_vec()
    }

    fn record_history(&self, record: &ExecutionRecord) {
        let mut history = self.history.lock();
        history.push(record.clone());
        let current_len = history.len();
        if current_len > MAX_HISTORY {
            history.drain(0..current_len - MAX_HISTORY);
        }
    }

    // ------------------------------------------------------------------
    // parsing
    // ------------------------------------------------------------------

    /// Parse one `name` or `name:target` token against the plan's default
    /// target.
    fn parse_token(&self, token: &str, default_target: &str) -> Result<SubAction, ExecError> {
        let (name, target) = match token.split_once(':') {
            Some((name, target)) => (name.trim(), target.trim()),
            None => (token.trim(), default_target),
        };
        let action = RemediationAction::from_name(name).ok_or_else(|| ExecError::UnknownAction {
            token: token.to_string(),
        })?;
        let target = if self.sanitize_targets {
            sanitize_target(target)
        } else {
            target.to_string()
        };
        Ok(SubAction { action, target })
    }

    // ------------------------------------------------------------------
    // retry-guarded dispatch
    // ------------------------------------------------------------------

    /// Exponential backoff with jitter for attempt n (1-based).
    fn backoff_delay(&self, attempt: u32) -> StdDuration {
        let base = self.retry_backoff_ms.saturating_mul(1u64 << (attempt - 1).min(8));
        let jitter = rand::thread_rng().gen_range(0..=base / 2 + 1);
        StdDuration::from_millis(base + jitter)
    }

    /// Run one sub-action through the breaker with bounded, timed attempts.
    async fn dispatch_with_retry(
        &self,
        sub: &SubAction,
        breaker_key: &str,
    ) -> Result<DispatchOutcome, ExecError> {
        let mut last_error = ExecError::Other {
            message: "No attempts made".to_string(),
        };

        for attempt in 1..=self.retry_attempts {
            if !self.breaker.allow(breaker_key) {
                self.stats.breaker_fast_fails.fetch_add(1, Ordering::Relaxed);
                return Err(ExecError::CircuitOpen);
            }

            let deadline = StdDuration::from_secs(self.attempt_timeout_secs);
            let result =
                tokio::time::timeout(deadline, self.dispatcher.dispatch(sub.action, &sub.target))
                    .await;

            match result {
                Ok(Ok(outcome)) => {
                    self.breaker.record_success(breaker_key);
                    return Ok(outcome);
                }
                Ok(Err(e)) => {
                    self.breaker.record_failure(breaker_key);
                    log::warn!(
                        "Attempt {}/{} for {} failed: {}",
                        attempt,
                        self.retry_attempts,
                        sub.action,
                        e
                    );
                    last_error = e;
                }
                Err(_) => {
                    self.breaker.record_failure(breaker_key);
                    log::warn!(
                        "Attempt {}/{} for {} timed out after {}s",
                        attempt,
                        self.retry_attempts,
                        sub.action,
                        self.attempt_timeout_secs
                    );
                    last_error = ExecError::Timeout {
                        secs: self.attempt_timeout_secs,
                    };
                }
            }

            if attempt < self.retry_attempts {
                tokio::time::sleep(self.backoff_delay(attempt)).await;
            }
        }
        Err(last_error)
    }

    // ------------------------------------------------------------------
    // record helpers
    // ------------------------------------------------------------------

    fn make_record(
        &self,
        plan_id: Uuid,
        sub: &SubAction,
        status: ExecStatus,
        detail: String,
    ) -> ExecutionRecord {
        match status {
            ExecStatus::Executed => self.stats.executed.fetch_add(1, Ordering::Relaxed),
            ExecStatus::Skipped => self.stats.skipped.fetch_add(1, Ordering::Relaxed),
            ExecStatus::Failed => self.stats.failed.fetch_add(1, Ordering::Relaxed),
            ExecStatus::Denied => self.stats.denied.fetch_add(1, Ordering::Relaxed),
            ExecStatus::PendingApproval => {
                self.stats.pending_approval.fetch_add(1, Ordering::Relaxed)
            }
            ExecStatus::LabTestPrevented => {
                self.stats.lab_prevented.fetch_add(1, Ordering::Relaxed)
            }
        };
        ExecutionRecord {
            execution_id: Uuid::new_v4(),
            plan_id,
            action: sub.action,
            target: sub.target.clone(),
            timestamp: Utc::now(),
            status,
            detail,
            expires_at: Utc::now() + Duration::seconds(self.idempotency.ttl_secs()),
        }
    }

    // ------------------------------------------------------------------
    // plan execution
    // ------------------------------------------------------------------

    /// Process one plan fully. Sub-actions run strictly sequentially so the
    /// idempotency/audit trail stays coherent.
    pub async fn execute(&self, plan: &RemediationPlan) -> PlaybookExecution {
        self.stats.plans_processed.fetch_add(1, Ordering::Relaxed);

        if self.schema_validation {
            if let Err(e) = plan.validate() {
                log::error!("Plan {} rejected: {}", plan.id, e);
                self.stats.plans_rejected.fetch_add(1, Ordering::Relaxed);
                let mut playbook = PlaybookExecution::new(plan.id);
                playbook.finished_at = Some(Utc::now());
                playbook.status = PlaybookStatus::Rejected;
                self.playbooks.lock().insert(plan.id, playbook.clone());
                return playbook;
            }
        }

        let mut playbook = PlaybookExecution::new(plan.id);
        log::info!(
            "Executing plan {} ({} -> {}, {} sub-actions, certainty {:.2})",
            plan.id,
            plan.action,
            plan.target,
            plan.metadata.sub_actions.len(),
            plan.metadata.certainty_score
        );

        let context = PolicyContext {
            certainty: plan.metadata.certainty_score,
            lab_context: plan.metadata.lab_context,
            threat_type: plan.threat_type,
        };

        for token in &plan.metadata.sub_actions {
            // 1. Parse. An unknown token is a recorded failure, never a panic.
            let sub = match self.parse_token(token, &plan.target) {
                Ok(sub) => sub,
                Err(e) => {
                    log::error!("Plan {}: {}", plan.id, e);
                    let sub = SubAction {
                        action: RemediationAction::RequireHumanReview,
                        target: token.clone(),
                    };
                    playbook.records.push(self.make_record(
                        plan.id,
                        &sub,
                        ExecStatus::Failed,
                        e.to_string(),
                    ));
                    continue;
                }
            };

            // 2. Idempotency: a non-expired record means skip, never re-run.
            let key = idempotency_key(sub.action, &sub.target, plan.id);
            if let Some(prev) = self.idempotency.lookup(&key) {
                log::info!(
                    "Skipping duplicate {}:{} for plan {} (prior status {})",
                    sub.action,
                    sub.target,
                    plan.id,
                    prev.status.as_str()
                );
                playbook.records.push(self.make_record(
                    plan.id,
                    &sub,
                    ExecStatus::Skipped,
                    format!("Duplicate within TTL; prior status {}", prev.status.as_str()),
                ));
                continue;
            }

            // 3. Action whitelist (real mode only).
            if self.action_whitelist_enabled
                && !self.dry_run
                && !ACTION_WHITELIST.contains(&sub.action)
            {
                let record = self.make_record(
                    plan.id,
                    &sub,
                    ExecStatus::Denied,
                    "Action not on the execution whitelist".to_string(),
                );
                self.idempotency.insert(&key, record.clone());
                playbook.records.push(record);
                continue;
            }

            // 4. Policy gate.
            let verdict =
                self.policy
                    .evaluate(sub.action.as_str(), &sub.target, &plan.owner, &context);
            match verdict.decision {
                PolicyDecision::Deny => {
                    log::warn!(
                        "Policy denied {}:{} - {}",
                        sub.action,
                        sub.target,
                        verdict.reasons.join("; ")
                    );
                    let record = self.make_record(
                        plan.id,
                        &sub,
                        ExecStatus::Denied,
                        verdict.reasons.join("; "),
                    );
                    self.idempotency.insert(&key, record.clone());
                    playbook.records.push(record);
                    continue;
                }
                PolicyDecision::RequireApproval => {
                    log::info!(
                        "Policy requires approval for {}:{} - {}",
                        sub.action,
                        sub.target,
                        verdict.reasons.join("; ")
                    );
                    let record = self.make_record(
                        plan.id,
                        &sub,
                        ExecStatus::PendingApproval,
                        verdict.reasons.join("; "),
                    );
                    self.idempotency.insert(&key, record.clone());
                    playbook.records.push(record);
                    continue;
                }
                PolicyDecision::Allow => {}
            }

            // 5. Retry-guarded, circuit-broken dispatch.
            let breaker_key = format!("{}|{}", sub.action.as_str(), sub.target);
            let record = match self.dispatch_with_retry(&sub, &breaker_key).await {
                Ok(DispatchOutcome::Done(detail)) => {
                    self.make_record(plan.id, &sub, ExecStatus::Executed, detail)
                }
                Ok(DispatchOutcome::LabTestPrevented(detail)) => {
                    self.make_record(plan.id, &sub, ExecStatus::LabTestPrevented, detail)
                }
                Err(e) => self.make_record(plan.id, &sub, ExecStatus::Failed, e.to_string()),
            };

            // 6. Record for idempotency and audit.
            self.idempotency.insert(&key, record.clone());
            playbook.records.push(record);
        }

        playbook.finish();
        for record in &playbook.records {
            self.record_history(record);
        }
        log::info!(
            "Plan {} finished: {:?} ({} records)",
            plan.id,
            playbook.status,
            playbook.records.len()
        );
        self.playbooks.lock().insert(plan.id, playbook.clone());
        playbook
    }

    // ------------------------------------------------------------------
    // sweeping
    // ------------------------------------------------------------------

    /// Periodic maintenance: evict expired idempotency records, stale
    /// playbooks and long-idle breaker entries. Never blocks the hot path.
    pub fn sweep(&self) -> (usize, usize, usize) {
        let records = self.idempotency.sweep();
        let breakers = self.breaker.sweep(BREAKER_IDLE_SWEEP_SECS);

        let cutoff = Utc::now() - Duration::seconds(PLAYBOOK_RETENTION_SECS);
        let mut playbooks = self.playbooks.lock();
        let before = playbooks.len();
        playbooks.retain(|_, p| p.finished_at.map_or(true, |t| t > cutoff));
        let evicted = before - playbooks.len();

        (records, evicted, breakers)
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logic::model::ThreatType;
    use crate::logic::planner::{PlanAction, PlanMetadata};
    use crate::logic::policy::PolicyVerdict;

    struct AllowAll;
    impl PolicyProvider for AllowAll {
        fn evaluate(&self, _: &str, _: &str, _: &str, _: &PolicyContext) -> PolicyVerdict {
            PolicyVerdict::allow("test")
        }
    }

    struct DenyDestructive;
    impl PolicyProvider for DenyDestructive {
        fn evaluate(&self, action: &str, _: &str, _: &str, _: &PolicyContext) -> PolicyVerdict {
            if action == "block_ip" {
                PolicyVerdict::deny("destructive actions denied in test")
            } else if action == "suspend_user" {
                PolicyVerdict::require_approval("needs sign-off")
            } else {
                PolicyVerdict::allow("test")
            }
        }
    }

    fn test_config() -> PipelineConfig {
        PipelineConfig {
            dry_run: true,
            retry_attempts: 2,
            retry_backoff_ms: 1,
            attempt_timeout_secs: 5,
            ..PipelineConfig::default()
        }
    }

    fn plan_with(sub_actions: Vec<&str>, target: &str) -> RemediationPlan {
        RemediationPlan {
            id: Uuid::new_v4(),
            created_at: Utc::now(),
            action: PlanAction::Block,
            target: target.to_string(),
            justification: "test".to_string(),
            owner: "soc-pipeline".to_string(),
            threat_type: ThreatType::PromptInjection,
            agent_id: "chat-agent-1".to_string(),
            alert_id: Uuid::new_v4(),
            metadata: PlanMetadata {
                certainty_score: 0.8,
                lab_context: false,
                sub_actions: sub_actions.into_iter().map(String::from).collect(),
            },
        }
    }

    #[tokio::test]
    async fn test_block_plan_executes() {
        let engine = ExecutionEngine::new(&test_config(), Box::new(AllowAll));
        let plan = plan_with(
            vec!["block_ip:203.0.113.1", "notify_security_team"],
            "203.0.113.1",
        );
        let playbook = engine.execute(&plan).await;

        assert_eq!(playbook.status, PlaybookStatus::Completed);
        assert_eq!(playbook.records.len(), 2);
        assert!(playbook
            .records
            .iter()
            .all(|r| r.status == ExecStatus::Executed));
        assert!(engine.dispatcher().registry().is_blocked("203.0.113.1"));
    }

    #[tokio::test]
    async fn test_loopback_block_yields_lab_test_prevented() {
        let engine = ExecutionEngine::new(&test_config(), Box::new(AllowAll));
        let plan = plan_with(vec!["block_ip:127.0.0.1"], "127.0.0.1");
        let playbook = engine.execute(&plan).await;

        // Success-shaped: the playbook completes, nothing is blocked.
        assert_eq!(playbook.status, PlaybookStatus::Completed);
        assert_eq!(playbook.records[0].status, ExecStatus::LabTestPrevented);
        assert!(!engine.dispatcher().registry().is_blocked("127.0.0.1"));
    }

    #[tokio::test]
    async fn test_duplicate_action_is_skipped_once() {
        let engine = ExecutionEngine::new(&test_config(), Box::new(AllowAll));
        // The same sub-action twice within one plan (same plan id).
        let plan = plan_with(
            vec!["block_ip:198.51.100.1", "block_ip:198.51.100.1"],
            "198.51.100.1",
        );
        let playbook = engine.execute(&plan).await;

        let executed: Vec<_> = playbook
            .records
            .iter()
            .filter(|r| r.status == ExecStatus::Executed)
            .collect();
        let skipped: Vec<_> = playbook
            .records
            .iter()
            .filter(|r| r.status == ExecStatus::Skipped)
            .collect();
        assert_eq!(executed.len(), 1, "exactly one executed record");
        assert_eq!(skipped.len(), 1, "exactly one skipped record");
        assert_eq!(engine.stats().executed, 1);
    }

    #[tokio::test]
    async fn test_same_action_new_plan_executes_again() {
        let engine = ExecutionEngine::new(&test_config(), Box::new(AllowAll));
        let first = plan_with(vec!["block_ip:198.51.100.9"], "198.51.100.9");
        let second = plan_with(vec!["block_ip:198.51.100.9"], "198.51.100.9");

        let a = engine.execute(&first).await;
        let b = engine.execute(&second).await;
        // Different plan ids hash to different idempotency keys.
        assert_eq!(a.records[0].status, ExecStatus::Executed);
        assert_eq!(b.records[0].status, ExecStatus::Executed);
    }

    #[tokio::test]
    async fn test_policy_deny_and_approval_recorded() {
        let engine = ExecutionEngine::new(&test_config(), Box::new(DenyDestructive));
        let plan = plan_with(
            vec![
                "block_ip:203.0.113.7",
                "suspend_user:u9",
                "notify_security_team",
            ],
            "203.0.113.7",
        );
        let playbook = engine.execute(&plan).await;

        assert_eq!(playbook.records[0].status, ExecStatus::Denied);
        assert_eq!(playbook.records[1].status, ExecStatus::PendingApproval);
        assert_eq!(playbook.records[2].status, ExecStatus::Executed);
        // Denied/pending are not failures; the playbook still completes.
        assert_eq!(playbook.status, PlaybookStatus::Completed);
        assert!(!engine.dispatcher().registry().is_blocked("203.0.113.7"));
    }

    #[tokio::test]
    async fn test_unknown_token_is_recorded_failure() {
        let engine = ExecutionEngine::new(&test_config(), Box::new(AllowAll));
        let plan = plan_with(vec!["self_destruct:everything"], "203.0.113.1");
        let playbook = engine.execute(&plan).await;

        assert_eq!(playbook.records[0].status, ExecStatus::Failed);
        assert_eq!(playbook.status, PlaybookStatus::Failed);
    }

    #[tokio::test]
    async fn test_invalid_plan_rejected() {
        let engine = ExecutionEngine::new(&test_config(), Box::new(AllowAll));
        let mut plan = plan_with(vec!["flag_user:u1"], "u1");
        plan.owner = String::new();
        let playbook = engine.execute(&plan).await;

        assert_eq!(playbook.status, PlaybookStatus::Rejected);
        assert!(playbook.records.is_empty());
        assert_eq!(engine.stats().plans_rejected, 1);
    }

    #[tokio::test]
    async fn test_breaker_opens_and_fails_fast() {
        // Real mode with an unreachable webhook: every notify fails.
        let mut config = test_config();
        config.dry_run = false;
        config.retry_attempts = 1;
        config.breaker_failure_threshold = 5;
        config.webhook_url = Some("http://127.0.0.1:9".to_string());

        let engine = ExecutionEngine::new(&config, Box::new(AllowAll));
        for _ in 0..5 {
            let plan = plan_with(vec!["notify_security_team"], "203.0.113.5");
            let playbook = engine.execute(&plan).await;
            assert_eq!(playbook.records[0].status, ExecStatus::Failed);
        }

        // Sixth call: the breaker is open, the handler is not invoked.
        let plan = plan_with(vec!["notify_security_team"], "203.0.113.5");
        let playbook = engine.execute(&plan).await;
        assert_eq!(playbook.records[0].status, ExecStatus::Failed);
        assert!(playbook.records[0].detail.contains("Circuit open"));
        assert_eq!(engine.stats().breaker_fast_fails, 1);
    }

    #[tokio::test]
    async fn test_target_sanitization_applied() {
        let engine = ExecutionEngine::new(&test_config(), Box::new(AllowAll));
        let plan = plan_with(vec!["flag_user:evil;rm -rf /|user"], "x");
        let playbook = engine.execute(&plan).await;

        assert_eq!(playbook.records[0].status, ExecStatus::Executed);
        assert_eq!(playbook.records[0].target, "evilrm -rf /user");
    }

    #[tokio::test]
    async fn test_recent_records_tracks_outcomes() {
        let engine = ExecutionEngine::new(&test_config(), Box::new(AllowAll));
        let plan = plan_with(vec!["flag_user:u1", "enable_enhanced_monitoring"], "u1");
        engine.execute(&plan).await;

        let recent = engine.recent_records(10);
        assert_eq!(recent.len(), 2);
        assert!(recent.iter().all(|r| r.status == ExecStatus::Executed));

        // Limit applies from the newest end.
        assert_eq!(engine.recent_records(1).len(), 1);
    }

    #[tokio::test]
    async fn test_sweep_reports_counts() {
        let mut config = test_config();
        config.record_ttl_secs = 1;
        let engine = ExecutionEngine::new(&config, Box::new(AllowAll));
        let plan = plan_with(vec!["flag_user:u1"], "u1");
        engine.execute(&plan).await;

        tokio::time::sleep(StdDuration::from_millis(1100)).await;
        let (records, _playbooks, _breakers) = engine.sweep();
        assert_eq!(records, 1);
    }
}
