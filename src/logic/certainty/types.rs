//! Certainty Types
//!
//! KHÔNG chứa logic - chỉ data structures.

use std::collections::HashMap;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::logic::model::Severity;

// ============================================================================
// RECOMMENDED ACTION
// ============================================================================

/// Direct threshold ladder on threat confidence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RecommendedAction {
    Block,
    Investigate,
    Monitor,
    Ignore,
}

impl RecommendedAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecommendedAction::Block => "block",
            RecommendedAction::Investigate => "investigate",
            RecommendedAction::Monitor => "monitor",
            RecommendedAction::Ignore => "ignore",
        }
    }

    /// Ladder: >=0.9 block; >=0.7 block if severity is high/critical else
    /// investigate; >=0.5 investigate; >=0.3 monitor; else ignore.
    pub fn from_confidence(confidence: f64, severity: Severity) -> Self {
        if confidence >= 0.9 {
            RecommendedAction::Block
        } else if confidence >= 0.7 {
            if severity.is_high() {
                RecommendedAction::Block
            } else {
                RecommendedAction::Investigate
            }
        } else if confidence >= 0.5 {
            RecommendedAction::Investigate
        } else if confidence >= 0.3 {
            RecommendedAction::Monitor
        } else {
            RecommendedAction::Ignore
        }
    }
}

// ============================================================================
// FACTOR BREAKDOWN
// ============================================================================

/// How the final confidence was assembled. All factors in [0,1].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FactorBreakdown {
    /// Legitimacy scores as measured (before inversion)
    pub pattern_legitimacy: f64,
    pub sender_trust: f64,
    pub contextual_naturalness: f64,
    /// Threat strength, measured directly (never inverted)
    pub explicit_threat: f64,
    pub threat_confidence: f64,
}

/// Result of certainty scoring for one alert.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CertaintyAssessment {
    pub threat_confidence: f64,
    pub false_positive_probability: f64,
    pub recommended: RecommendedAction,
    pub reasoning: Vec<String>,
    pub breakdown: FactorBreakdown,
}

// ============================================================================
// USER TRUST HISTORY
// ============================================================================

/// Rolling per-user track record.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct UserTrust {
    pub interactions: u64,
    pub alerts: u64,
    pub false_positives: u64,
}

impl UserTrust {
    /// Fraction of this user's alerts that turned out benign.
    pub fn false_positive_rate(&self) -> f64 {
        if self.alerts == 0 {
            0.5
        } else {
            self.false_positives as f64 / self.alerts as f64
        }
    }
}

/// Component-owned trust history. Mutated only through the recording API,
/// read through lookup/snapshot.
#[derive(Default)]
pub struct UserTrustTracker {
    users: Mutex<HashMap<String, UserTrust>>,
}

impl UserTrustTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_interaction(&self, user_id: &str) {
        let mut users = self.users.lock();
        users.entry(user_id.to_string()).or_default().interactions += 1;
    }

    pub fn record_alert(&self, user_id: &str) {
        let mut users = self.users.lock();
        users.entry(user_id.to_string()).or_default().alerts += 1;
    }

    /// Feedback funnel: a past alert for this user was confirmed benign.
    pub fn record_false_positive(&self, user_id: &str) {
        let mut users = self.users.lock();
        users.entry(user_id.to_string()).or_default().false_positives += 1;
    }

    pub fn lookup(&self, user_id: &str) -> Option<UserTrust> {
        self.users.lock().get(user_id).copied()
    }

    pub fn snapshot(&self) -> HashMap<String, UserTrust> {
        self.users.lock().clone()
    }
}

// ============================================================================
// TESTS
// ============================================================================
