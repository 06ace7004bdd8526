//! Policy Gate
//!
//! External policy collaborator seam. Every sub-action passes through
//! `evaluate(action, target, owner, context)` before dispatch. The default
//! engine gates destructive actions on certainty and the kill switch.

pub mod engine;
pub mod types;

pub use engine::ThresholdPolicyEngine;
pub use types::{PolicyContext, PolicyDecision, PolicyProvider, PolicyVerdict};
