//! Idempotency Store
//!
//! Time-bounded markers preventing duplicate execution of the same
//! action+target+plan. Keyed by sha256(action|target|plan_id); a non-expired
//! record means the action is skipped, never re-run. Expired records are
//! evicted by the periodic sweep.

use std::collections::HashMap;

use chrono::{Duration, Utc};
use parking_lot::RwLock;
use sha2::{Digest, Sha256};
use uuid::Uuid;

use super::types::{ExecutionRecord, RemediationAction};

// ============================================================================
// KEYING
// ============================================================================

/// Stable idempotency key for one (action, target, plan) triple.
pub fn idempotency_key(action: RemediationAction, target: &str, plan_id: Uuid) -> String {
    let mut hasher = Sha256::new();
    hasher.update(action.as_str().as_bytes());
    hasher.update(b"|");
    hasher.update(target.as_bytes());
    hasher.update(b"|");
    hasher.update(plan_id.as_bytes());
    hex::encode(hasher.finalize())
}

// ============================================================================
// STORE
// ============================================================================

pub struct IdempotencyStore {
    records: RwLock<HashMap<String, ExecutionRecord>>,
    ttl_secs: i64,
}

impl IdempotencyStore {
    pub fn new(ttl_secs: i64) -> Self {
        Self {
            records: RwLock::new(HashMap::new()),
            ttl_secs,
        }
    }

    pub fn ttl_secs(&self) -> i64 {
        self.ttl_secs
    }

    /// Non-expired record for this key, if any.
    pub fn lookup(&self, key: &str) -> Option<ExecutionRecord> {
        let records = self.records.read();
        records
            .get(key)
            .filter(|r| r.expires_at > Utc::now())
            .cloned()
    }

    /// Insert a record under its key, stamping the TTL.
    pub fn insert(&self, key: &str, mut record: ExecutionRecord) {
        record.expires_at = Utc::now() + Duration::seconds(self.ttl_secs);
        self.records.write().insert(key.to_string(), record);
    }

    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }

    /// Evict expired records. Returns the eviction count.
    pub fn sweep(&self) -> usize {
        let now = Utc::now();
        let mut records = self.records.write();
        let before = records.len();
        records.retain(|_, r| r.expires_at > now);
        let evicted = before - records.len();
        if evicted > 0 {
            log::debug!("Idempotency sweep evicted {} records", evicted);
        }
        evicted
    }
}

// ============================================================================
// TESTS
// ============================================================================
