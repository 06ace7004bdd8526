//! Text Backend - Language-Model Collaborator
//!
//! The generation backend is external to the core. It is modeled as a trait
//! with two implementations: a real HTTP backend and a deterministic offline
//! fallback. The pipeline must keep functioning in reduced heuristic-only
//! mode when only the fallback is available.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use serde::{Deserialize, Serialize};

// ============================================================================
// CONSTANTS
// ============================================================================

/// Request timeout for the HTTP backend
const GENERATE_TIMEOUT_SECS: u64 = 20;

/// Cost per 1k tokens used by estimate_cost (USD)
const COST_PER_1K_TOKENS: f64 = 0.002;

// ============================================================================
// ERROR HANDLING
// ============================================================================

#[derive(Debug)]
pub struct TextBackendError(pub String);

impl std::fmt::Display for TextBackendError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "TextBackendError: {}", self.0)
    }
}

impl std::error::Error for TextBackendError {}

// ============================================================================
// COLLABORATOR TRAIT
// ============================================================================

type GenerateFuture<'a> = Pin<Box<dyn Future<Output = Result<String, TextBackendError>> + Send + 'a>>;

/// Text-generation collaborator.
pub trait TextGeneration: Send + Sync {
    /// Generate text for a prompt under a system context.
    fn generate<'a>(&'a self, prompt: &'a str, system_context: &'a str) -> GenerateFuture<'a>;

    /// Estimated cost (USD) for a token count.
    fn estimate_cost(&self, tokens: u64) -> f64 {
        (tokens as f64 / 1000.0) * COST_PER_1K_TOKENS
    }

    /// Whether this backend performs real generation.
    fn is_available(&self) -> bool;

    /// Backend label for logs and evidence ("http" / "offline").
    fn method(&self) -> &'static str;
}

// ============================================================================
// HTTP BACKEND
// ============================================================================

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    prompt: &'a str,
    system: &'a str,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    text: String,
}

/// Real backend: POSTs to a generation endpoint.
pub struct HttpTextBackend {
    client: reqwest::Client,
    base_url: String,
}

impl HttpTextBackend {
    pub fn new(base_url: &str) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(GENERATE_TIMEOUT_SECS))
            .build()
            .unwrap_or_default();
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }
}

impl TextGeneration for HttpTextBackend {
    fn generate<'a>(&'a self, prompt: &'a str, system_context: &'a str) -> GenerateFuture<'a> {
        Box::pin(async move {
            let url = format!("{}/v1/generate", self.base_url);
            let response = self
                .client
                .post(&url)
                .json(&GenerateRequest {
                    prompt,
                    system: system_context,
                })
                .send()
                .await
                .map_err(|e| TextBackendError(format!("Request failed: {}", e)))?;

            if !response.status().is_success() {
                return Err(TextBackendError(format!(
                    "Backend returned HTTP {}",
                    response.status()
                )));
            }

            let body: GenerateResponse = response
                .json()
                .await
                .map_err(|e| TextBackendError(format!("Bad response body: {}", e)))?;
            Ok(body.text)
        })
    }

    fn is_available(&self) -> bool {
        true
    }

    fn method(&self) -> &'static str {
        "http"
    }
}

// ============================================================================
// OFFLINE FALLBACK
// ============================================================================

/// Deterministic fallback used when no backend is configured.
///
/// Produces fixed template rewrites so the attack-variation funnel still
/// works without a model. Never performs I/O.
#[derive(Default)]
pub struct OfflineTextBackend;

impl OfflineTextBackend {
    pub fn new() -> Self {
        Self
    }

    fn template_variations(phrase: &str) -> Vec<String> {
        vec![
            format!("please {}", phrase),
            format!("{} right now", phrase),
            format!("i need you to {}", phrase),
        ]
    }
}

impl TextGeneration for OfflineTextBackend {
    fn generate<'a>(&'a self, prompt: &'a str, _system_context: &'a str) -> GenerateFuture<'a> {
        Box::pin(async move {
            // The only generation request the core issues offline is
            // variation synthesis; answer it from templates.
            let phrase = prompt
                .lines()
                .last()
                .unwrap_or(prompt)
                .trim()
                .to_lowercase();
            Ok(Self::template_variations(&phrase).join("\n"))
        })
    }

    fn estimate_cost(&self, _tokens: u64) -> f64 {
        0.0
    }

    fn is_available(&self) -> bool {
        false
    }

    fn method(&self) -> &'static str {
        "offline"
    }
}

// ============================================================================
// CONSTRUCTION
// ============================================================================

/// Pick the backend for the configured URL, falling back to offline mode.
pub fn build_backend(url: Option<&str>) -> Box<dyn TextGeneration> {
    match url {
        Some(u) if !u.is_empty() => {
            log::info!("Text backend: HTTP ({})", u);
            Box::new(HttpTextBackend::new(u))
        }
        _ => {
            log::info!("Text backend not configured - running in offline heuristic mode");
            Box::new(OfflineTextBackend::new())
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================
