//! Pipeline Configuration
//!
//! Startup configuration read once from the environment (SOC_* variables),
//! plus runtime kill-switches for emergency degradation.

use std::sync::atomic::{AtomicBool, Ordering};

use serde::{Deserialize, Serialize};

use crate::constants::*;

// ============================================================================
// STARTUP CONFIGURATION
// ============================================================================

/// Queue overflow strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum QueueStrategy {
    /// Wait for capacity (backpressure)
    Block,
    /// Drop the newest item with a logged error
    DropNew,
}

/// Configuration consumed at startup. Not re-read afterward.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// When true, dispatch handlers log instead of performing real side effects
    pub dry_run: bool,
    /// Restrict real-mode execution to whitelisted actions
    pub action_whitelist_enabled: bool,
    /// Strip shell metacharacters from action targets
    pub sanitize_targets: bool,
    /// Validate inbound events and outbound plans against the schema
    pub schema_validation: bool,
    pub queue_capacity: usize,
    pub queue_strategy: QueueStrategy,
    /// Queue put timeout under backpressure (milliseconds)
    pub queue_timeout_ms: u64,
    pub retry_attempts: u32,
    pub retry_backoff_ms: u64,
    pub attempt_timeout_secs: u64,
    pub breaker_failure_threshold: u32,
    pub breaker_success_threshold: u32,
    pub breaker_cooldown_secs: i64,
    pub sweep_interval_secs: u64,
    pub record_ttl_secs: i64,
    pub webhook_url: Option<String>,
    pub text_backend_url: Option<String>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            dry_run: true,
            action_whitelist_enabled: true,
            sanitize_targets: true,
            schema_validation: true,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            queue_strategy: QueueStrategy::Block,
            queue_timeout_ms: 5000,
            retry_attempts: DEFAULT_RETRY_ATTEMPTS,
            retry_backoff_ms: DEFAULT_RETRY_BACKOFF_MS,
            attempt_timeout_secs: DEFAULT_ATTEMPT_TIMEOUT_SECS,
            breaker_failure_threshold: DEFAULT_BREAKER_FAILURE_THRESHOLD,
            breaker_success_threshold: DEFAULT_BREAKER_SUCCESS_THRESHOLD,
            breaker_cooldown_secs: DEFAULT_BREAKER_COOLDOWN_SECS,
            sweep_interval_secs: DEFAULT_SWEEP_INTERVAL_SECS,
            record_ttl_secs: DEFAULT_RECORD_TTL_SECS,
            webhook_url: None,
            text_backend_url: None,
        }
    }
}

impl PipelineConfig {
    /// Build configuration from SOC_* environment variables.
    pub fn from_env() -> Self {
        let mut cfg = Self::default();

        cfg.dry_run = crate::constants::is_dry_run();
        cfg.action_whitelist_enabled = env_bool("SOC_ACTION_WHITELIST", true);
        cfg.sanitize_targets = env_bool("SOC_SANITIZE_TARGETS", true);
        cfg.schema_validation = env_bool("SOC_SCHEMA_VALIDATION", true);

        if let Some(n) = env_parse::<usize>("SOC_QUEUE_CAPACITY") {
            cfg.queue_capacity = n.max(1);
        }
        if let Ok(s) = std::env::var("SOC_QUEUE_STRATEGY") {
            cfg.queue_strategy = match s.to_lowercase().as_str() {
                "drop" | "drop_new" => QueueStrategy::DropNew,
                _ => QueueStrategy::Block,
            };
        }
        if let Some(n) = env_parse::<u64>("SOC_QUEUE_TIMEOUT_MS") {
            cfg.queue_timeout_ms = n;
        }
        if let Some(n) = env_parse::<u32>("SOC_RETRY_ATTEMPTS") {
            cfg.retry_attempts = n.max(1);
        }
        if let Some(n) = env_parse::<u64>("SOC_RETRY_BACKOFF_MS") {
            cfg.retry_backoff_ms = n;
        }
        if let Some(n) = env_parse::<u64>("SOC_ATTEMPT_TIMEOUT_SECS") {
            cfg.attempt_timeout_secs = n.max(1);
        }
        if let Some(n) = env_parse::<u32>("SOC_BREAKER_FAILURES") {
            cfg.breaker_failure_threshold = n.max(1);
        }
        if let Some(n) = env_parse::<u32>("SOC_BREAKER_SUCCESSES") {
            cfg.breaker_success_threshold = n.max(1);
        }
        if let Some(n) = env_parse::<i64>("SOC_BREAKER_COOLDOWN_SECS") {
            cfg.breaker_cooldown_secs = n.max(1);
        }
        if let Some(n) = env_parse::<u64>("SOC_SWEEP_INTERVAL_SECS") {
            cfg.sweep_interval_secs = n.max(1);
        }
        if let Some(n) = env_parse::<i64>("SOC_RECORD_TTL_SECS") {
            cfg.record_ttl_secs = n.max(1);
        }
        cfg.webhook_url = crate::constants::get_webhook_url();
        cfg.text_backend_url = crate::constants::get_text_backend_url();

        cfg
    }
}

fn env_bool(key: &str, default: bool) -> bool {
    std::env::var(key)
        .map(|s| s.to_lowercase() != "false" && s != "0")
        .unwrap_or(default)
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|s| s.parse().ok())
}

// ============================================================================
// RUNTIME KILL-SWITCHES
// ============================================================================

// Safety Configuration (kill-switches)
// Default state: destructive automation on, learning on
static AUTO_BLOCK_ENABLED: AtomicBool = AtomicBool::new(true);
static REALTIME_LEARNING: AtomicBool = AtomicBool::new(true);

pub struct SafetyConfig;

impl SafetyConfig {
    pub fn is_auto_block_enabled() -> bool {
        AUTO_BLOCK_ENABLED.load(Ordering::Relaxed)
    }

    pub fn is_learning_enabled() -> bool {
        REALTIME_LEARNING.load(Ordering::Relaxed)
    }

    // Setters (e.g. from an emergency operator channel)
    pub fn set_auto_block(val: bool) {
        AUTO_BLOCK_ENABLED.store(val, Ordering::Relaxed);
    }
    pub fn set_learning(val: bool) {
        REALTIME_LEARNING.store(val, Ordering::Relaxed);
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_safe() {
        let cfg = PipelineConfig::default();
        assert!(cfg.dry_run, "dry-run must be the default");
        assert!(cfg.sanitize_targets);
        assert!(cfg.schema_validation);
        assert_eq!(cfg.retry_attempts, 3);
    }

    #[test]
    fn test_kill_switches_default_on() {
        assert!(SafetyConfig::is_learning_enabled());
    }
}
