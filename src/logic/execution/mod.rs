//! Execution Engine (Remediator)
//!
//! Idempotent, policy-gated, retried, circuit-broken execution of plan
//! sub-actions, with a hard loopback guardrail that no upstream signal can
//! bypass.

pub mod actions;
pub mod circuit;
pub mod engine;
pub mod idempotency;
pub mod types;

pub use actions::{sanitize_target, ActionDispatcher, DispatchOutcome};
pub use circuit::{BreakerState, CircuitBreaker};
pub use engine::{ExecutionEngine, ExecutionStatsSnapshot};
pub use idempotency::{idempotency_key, IdempotencyStore};
pub use types::{
    ExecError, ExecStatus, ExecutionRecord, PlaybookExecution, PlaybookStatus, RemediationAction,
};
