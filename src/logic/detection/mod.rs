//! Detection Engine
//!
//! Composes the four detection layers into one alert-or-nothing decision per
//! event. Precedence: a conversation-level alert is preferred when present
//! (it represents a confirmed multi-turn pattern); otherwise the most precise
//! single-message layer wins, with rule matching as the fallback. When the
//! intelligent layers and the rule matcher disagree on severity, the
//! higher-severity alert is kept.

pub mod conversation;
pub mod intent;
pub mod rules;
pub mod semantic;

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

use crate::logic::memory::PatternStore;
use crate::logic::model::{Alert, Event};

pub use conversation::ConversationAnalyzer;
pub use rules::RuleRegistry;
pub use semantic::{EmbeddingBackend, SemanticMatcher};

// ============================================================================
// STATISTICS
// ============================================================================

/// Component-owned counters, exposed via snapshot only.
#[derive(Default)]
pub struct DetectionStats {
    events_processed: AtomicU64,
    alerts_semantic: AtomicU64,
    alerts_intent: AtomicU64,
    alerts_rules: AtomicU64,
    alerts_conversation: AtomicU64,
    layer_errors: AtomicU64,
}

/// Read-only view of the counters.
#[derive(Debug, Clone, Serialize)]
pub struct DetectionStatsSnapshot {
    pub events_processed: u64,
    pub alerts_semantic: u64,
    pub alerts_intent: u64,
    pub alerts_rules: u64,
    pub alerts_conversation: u64,
    pub layer_errors: u64,
}

impl DetectionStats {
    fn snapshot(&self) -> DetectionStatsSnapshot {
        DetectionStatsSnapshot {
            events_processed: self.events_processed.load(Ordering::Relaxed),
            alerts_semantic: self.alerts_semantic.load(Ordering::Relaxed),
            alerts_intent: self.alerts_intent.load(Ordering::Relaxed),
            alerts_rules: self.alerts_rules.load(Ordering::Relaxed),
            alerts_conversation: self.alerts_conversation.load(Ordering::Relaxed),
            layer_errors: self.layer_errors.load(Ordering::Relaxed),
        }
    }
}

// ============================================================================
// ENGINE
// ============================================================================

pub struct DetectionEngine {
    rules: RuleRegistry,
    semantic: SemanticMatcher,
    conversation: ConversationAnalyzer,
    stats: DetectionStats,
}

impl DetectionEngine {
    pub fn new(embedding_backend: Option<Box<dyn EmbeddingBackend>>) -> Self {
        Self {
            rules: RuleRegistry::new(),
            semantic: SemanticMatcher::new(embedding_backend),
            conversation: ConversationAnalyzer::new(),
            stats: DetectionStats::default(),
        }
    }

    /// Seed the semantic corpus from the persistent pattern store.
    pub fn seed_from_store(&self, store: &dyn PatternStore, min_confidence: f64) {
        match store.get_patterns(min_confidence, None) {
            Ok(patterns) => {
                let count = patterns.len();
                for p in patterns {
                    self.semantic.learn_pattern(&p.text, p.threat_type, p.severity);
                }
                if count > 0 {
                    log::info!("Seeded {} patterns from the store", count);
                }
            }
            Err(e) => log::warn!("Pattern store seed failed: {}", e),
        }
    }

    pub fn rules(&self) -> &RuleRegistry {
        &self.rules
    }

    pub fn semantic(&self) -> &SemanticMatcher {
        &self.semantic
    }

    pub fn conversation(&self) -> &ConversationAnalyzer {
        &self.conversation
    }

    pub fn stats(&self) -> DetectionStatsSnapshot {
        self.stats.snapshot()
    }

    /// Evaluate one event. Exactly one alert (or none) leaves this method.
    pub fn detect(&self, event: &Event) -> Option<Alert> {
        self.stats.events_processed.fetch_add(1, Ordering::Relaxed);

        // Conversation analysis always observes the message first so session
        // history stays complete even when another layer alerts.
        let conversation_alert = self.conversation.observe(event);

        // Most precise single-message layer first. A layer failure is logged
        // and treated as "no alert from that layer".
        let semantic_alert = match self.semantic.match_event(event) {
            Ok(alert) => alert,
            Err(e) => {
                self.stats.layer_errors.fetch_add(1, Ordering::Relaxed);
                log::error!("Semantic layer failed: {} - continuing without it", e);
                None
            }
        };
        let intent_alert = intent::match_event(event);
        let intelligent = semantic_alert.or(intent_alert);

        // Rule matching as fallback / corroboration.
        let rule_alert = self.rules.match_event(event);

        // A confirmed multi-turn pattern outranks single-message findings.
        if let Some(alert) = conversation_alert {
            self.stats.alerts_conversation.fetch_add(1, Ordering::Relaxed);
            return Some(alert);
        }

        // Tie-break: keep the higher severity; on equal severity the
        // intelligent alert wins.
        let chosen = match (intelligent, rule_alert) {
            (Some(a), Some(b)) => Some(if b.severity > a.severity { b } else { a }),
            (Some(a), None) => Some(a),
            (None, Some(b)) => Some(b),
            (None, None) => None,
        };

        if let Some(alert) = &chosen {
            match alert.source.as_str() {
                "semantic_matcher" => self.stats.alerts_semantic.fetch_add(1, Ordering::Relaxed),
                "intent_scorer" => self.stats.alerts_intent.fetch_add(1, Ordering::Relaxed),
                _ => self.stats.alerts_rules.fetch_add(1, Ordering::Relaxed),
            };
        }
        chosen
    }
}

// ============================================================================
// TESTS
// ============================================================================
