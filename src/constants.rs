//! Central Configuration Constants
//!
//! Single source of truth for all configuration defaults.
//! To change a pipeline default, only edit this file.

/// Maximum accepted message length (characters). Longer events fail schema validation.
pub const MAX_MESSAGE_LENGTH: usize = 2000;

/// Default idempotency record time-to-live (seconds)
pub const DEFAULT_RECORD_TTL_SECS: i64 = 3600;

/// Default number of dispatch attempts per action
pub const DEFAULT_RETRY_ATTEMPTS: u32 = 3;

/// Default base backoff between attempts (milliseconds)
pub const DEFAULT_RETRY_BACKOFF_MS: u64 = 500;

/// Default per-attempt dispatch timeout (seconds)
pub const DEFAULT_ATTEMPT_TIMEOUT_SECS: u64 = 30;

/// Consecutive failures before a circuit opens
pub const DEFAULT_BREAKER_FAILURE_THRESHOLD: u32 = 5;

/// Consecutive half-open successes before a circuit closes again
pub const DEFAULT_BREAKER_SUCCESS_THRESHOLD: u32 = 2;

/// Open-circuit cooldown before probing (seconds)
pub const DEFAULT_BREAKER_COOLDOWN_SECS: i64 = 60;

/// Default bounded queue capacity (events and plans)
pub const DEFAULT_QUEUE_CAPACITY: usize = 256;

/// Background sweep interval (seconds)
pub const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 60;

/// Conversation history capacity per session
pub const CONVERSATION_CAPACITY: usize = 20;

/// Conversation session idle timeout (seconds)
pub const CONVERSATION_IDLE_TIMEOUT_SECS: i64 = 1800;

/// App version
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// App name
pub const APP_NAME: &str = "Agent-SOC";

// ============================================
// Helper functions to read from env with fallback
// ============================================

/// Get the security-team webhook URL, if configured
pub fn get_webhook_url() -> Option<String> {
    std::env::var("SOC_WEBHOOK_URL").ok().filter(|s| !s.is_empty())
}

/// Get the text-generation backend URL, if configured
pub fn get_text_backend_url() -> Option<String> {
    std::env::var("SOC_TEXT_BACKEND_URL").ok().filter(|s| !s.is_empty())
}

/// Check if the pipeline runs in dry-run mode (default: true)
pub fn is_dry_run() -> bool {
    std::env::var("SOC_DRY_RUN")
        .map(|s| s.to_lowercase() != "false" && s != "0")
        .unwrap_or(true)
}
