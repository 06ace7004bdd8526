//! Shared Data Model
//!
//! Core types flowing through the pipeline: Event in, Alert out.
//! KHÔNG chứa logic - chỉ data structures và schema validation.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::constants::MAX_MESSAGE_LENGTH;

// ============================================================================
// SEVERITY
// ============================================================================

/// Alert severity, ordered Low < Medium < High < Critical
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "low" => Some(Severity::Low),
            "medium" => Some(Severity::Medium),
            "high" => Some(Severity::High),
            "critical" => Some(Severity::Critical),
            _ => None,
        }
    }

    pub fn is_high(&self) -> bool {
        matches!(self, Severity::High | Severity::Critical)
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// THREAT TYPE
// ============================================================================

/// Threat classification for alerts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThreatType {
    PromptInjection,
    DataExfiltration,
    UnauthorizedAccess,
    MaliciousInput,
    SystemManipulation,
    PrivacyViolation,
    RateLimitAbuse,
    ModelPoisoning,
}

impl ThreatType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ThreatType::PromptInjection => "prompt_injection",
            ThreatType::DataExfiltration => "data_exfiltration",
            ThreatType::UnauthorizedAccess => "unauthorized_access",
            ThreatType::MaliciousInput => "malicious_input",
            ThreatType::SystemManipulation => "system_manipulation",
            ThreatType::PrivacyViolation => "privacy_violation",
            ThreatType::RateLimitAbuse => "rate_limit_abuse",
            ThreatType::ModelPoisoning => "model_poisoning",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "prompt_injection" => Some(ThreatType::PromptInjection),
            "data_exfiltration" => Some(ThreatType::DataExfiltration),
            "unauthorized_access" => Some(ThreatType::UnauthorizedAccess),
            "malicious_input" => Some(ThreatType::MaliciousInput),
            "system_manipulation" => Some(ThreatType::SystemManipulation),
            "privacy_violation" => Some(ThreatType::PrivacyViolation),
            "rate_limit_abuse" => Some(ThreatType::RateLimitAbuse),
            "model_poisoning" => Some(ThreatType::ModelPoisoning),
        _ => None,
        }
    }
}

impl std::fmt::Display for ThreatType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// EVENT
// ============================================================================

/// Inbound interaction record from the agent monitor.
///
/// Timestamp is informative only - arrival order is authoritative.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub timestamp: DateTime<Utc>,
    pub source: String,
    /// May be empty
    pub message: String,
    pub agent_id: String,
    pub user_id: Option<String>,
    pub session_id: Option<String>,
    pub source_ip: Option<String>,
    pub request_id: Option<String>,
    pub response_time_ms: Option<u64>,
    pub status_code: Option<u16>,
    #[serde(default)]
    pub extra: HashMap<String, String>,
}

impl Event {
    pub fn new(source: &str, message: &str, agent_id: &str) -> Self {
        Self {
            timestamp: Utc::now(),
            source: source.to_string(),
            message: message.to_string(),
            agent_id: agent_id.to_string(),
            user_id: None,
            session_id: None,
            source_ip: None,
            request_id: None,
            response_time_ms: None,
            status_code: None,
            extra: HashMap::new(),
        }
    }
}

// ============================================================================
// ALERT
// ============================================================================

/// A single detected suspicious event.
///
/// Exactly one alert (or none) is produced per event. The false-positive
/// probability is set by the producing detector and mutated once by the
/// certainty scorer during planning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alert {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub severity: Severity,
    pub title: String,
    pub description: String,
    pub threat_type: ThreatType,
    pub agent_id: String,
    /// Rule or detector id that produced this alert
    pub source: String,
    pub evidence: HashMap<String, serde_json::Value>,
    pub false_positive_probability: f64,
}

impl Alert {
    pub fn new(
        severity: Severity,
        title: &str,
        description: &str,
        threat_type: ThreatType,
        agent_id: &str,
        source: &str,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            severity,
            title: title.to_string(),
            description: description.to_string(),
            threat_type,
            agent_id: agent_id.to_string(),
            source: source.to_string(),
            evidence: HashMap::new(),
            false_positive_probability: 0.5,
        }
    }

    pub fn with_evidence(mut self, key: &str, value: serde_json::Value) -> Self {
        self.evidence.insert(key.to_string(), value);
        self
    }

    pub fn with_fp_probability(mut self, fp: f64) -> Self {
        self.false_positive_probability = fp.clamp(0.0, 1.0);
        self
    }
}

// ============================================================================
// SCHEMA VALIDATION
// ============================================================================

/// Event/plan schema violation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ValidationError {
    /// Message exceeds the permitted length
    MessageTooLong { len: usize, max: usize },
    /// IP field is present but not IPv4/IPv6-shaped
    MalformedIp { field: String, value: String },
    /// Required field is empty
    MissingField { field: String },
    /// Probability outside [0,1]
    ProbabilityOutOfRange { field: String, value: f64 },
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValidationError::MessageTooLong { len, max } => {
                write!(f, "Message too long: {} > {}", len, max)
            }
            ValidationError::MalformedIp { field, value } => {
                write!(f, "Malformed IP in {}: {}", field, value)
            }
            ValidationError::MissingField { field } => write!(f, "Missing field: {}", field),
            ValidationError::ProbabilityOutOfRange { field, value } => {
                write!(f, "{} out of range: {}", field, value)
            }
        }
    }
}

impl std::error::Error for ValidationError {}

/// Check whether a string is IPv4-shaped, "localhost", or IPv6 (::1 form).
pub fn is_ip_shaped(s: &str) -> bool {
    if s == "localhost" {
        return true;
    }
    if s.contains(':') {
        // IPv6 - accept anything the std parser accepts
        return s.parse::<std::net::Ipv6Addr>().is_ok();
    }
    s.parse::<std::net::Ipv4Addr>().is_ok()
}

/// Validate an inbound event against the schema in effect.
pub fn validate_event(event: &Event) -> Result<(), ValidationError> {
    if event.agent_id.is_empty() {
        return Err(ValidationError::MissingField {
            field: "agent_id".to_string(),
        });
    }
    if event.message.chars().count() > MAX_MESSAGE_LENGTH {
        return Err(ValidationError::MessageTooLong {
            len: event.message.chars().count(),
            max: MAX_MESSAGE_LENGTH,
        });
    }
    if let Some(ip) = &event.source_ip {
        if !is_ip_shaped(ip) {
            return Err(ValidationError::MalformedIp {
                field: "source_ip".to_string(),
                value: ip.clone(),
            });
        }
    }
    Ok(())
}

/// Validate an alert before it is published to the bus.
pub fn validate_alert(alert: &Alert) -> Result<(), ValidationError> {
    if alert.title.is_empty() {
        return Err(ValidationError::MissingField {
            field: "title".to_string(),
        });
    }
    let fp = alert.false_positive_probability;
    if !(0.0..=1.0).contains(&fp) {
        return Err(ValidationError::ProbabilityOutOfRange {
            field: "false_positive_probability".to_string(),
            value: fp,
        });
    }
    Ok(())
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_ordering() {
        assert!(Severity::Critical > Severity::High);
        assert!(Severity::High > Severity::Medium);
        assert!(Severity::Medium > Severity::Low);
    }

    #[test]
    fn test_threat_type_round_trip() {
        for t in [
            ThreatType::PromptInjection,
            ThreatType::DataExfiltration,
            ThreatType::ModelPoisoning,
        ] {
            assert_eq!(ThreatType::from_str(t.as_str()), Some(t));
        }
        assert_eq!(ThreatType::from_str("not_a_threat"), None);
    }

    #[test]
    fn test_validate_event_message_cap() {
        let mut event = Event::new("monitor", "hello", "agent-1");
        assert!(validate_event(&event).is_ok());

        event.message = "x".repeat(MAX_MESSAGE_LENGTH + 1);
        assert!(matches!(
            validate_event(&event),
            Err(ValidationError::MessageTooLong { .. })
        ));
    }

    #[test]
    fn test_validate_event_ip_shape() {
        let mut event = Event::new("monitor", "hello", "agent-1");
        event.source_ip = Some("203.0.113.1".to_string());
        assert!(validate_event(&event).is_ok());

        event.source_ip = Some("::1".to_string());
        assert!(validate_event(&event).is_ok());

        event.source_ip = Some("999.1.2.3".to_string());
        assert!(matches!(
            validate_event(&event),
            Err(ValidationError::MalformedIp { .. })
        ));
    }

    #[test]
    fn test_empty_message_is_valid() {
        let event = Event::new("monitor", "", "agent-1");
        assert!(validate_event(&event).is_ok());
    }
}
