//! Remediation Planner
//!
//! Turns (alert, certainty) into a structured remediation plan, or decides
//! the alert is noise. Lab traffic is recognized and never blocked.

pub mod engine;
pub mod types;

pub use engine::{is_lab_context, is_loopback, plan};
pub use types::{PlanAction, PlanMetadata, RemediationPlan};
