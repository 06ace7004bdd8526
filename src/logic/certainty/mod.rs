//! Certainty Scorer
//!
//! Combines pattern legitimacy, sender trust history, contextual naturalness
//! and explicit threat strength into one false-positive probability and
//! threat confidence per alert.

pub mod rules;
pub mod scorer;
pub mod types;

pub use scorer::{score, CertaintyScorer};
pub use types::{CertaintyAssessment, FactorBreakdown, RecommendedAction, UserTrust, UserTrustTracker};
