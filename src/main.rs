//! Agent SOC Core - Main Entry Point
//!
//! Headless pipeline service: wires the detection, planning and execution
//! tasks, then runs until interrupted. Events arrive from the external
//! agent-monitoring collaborator via the pipeline's submit handle.

mod logic;
pub mod constants;

use std::sync::Arc;

use logic::ai_backend;
use logic::config::PipelineConfig;
use logic::detection::DetectionEngine;
use logic::memory::{InMemoryStore, PatternStore};
use logic::pipeline::Pipeline;
use logic::policy::ThresholdPolicyEngine;

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    log::info!(
        "Starting {} v{} (SOC pipeline core)...",
        constants::APP_NAME,
        constants::APP_VERSION
    );

    let config = PipelineConfig::from_env();
    if config.dry_run {
        log::info!("Dry-run mode: destructive actions are logged, not applied");
    } else {
        log::warn!("REAL mode: destructive actions will be applied");
    }

    // External collaborators. The store seeds the detectors and receives
    // learned patterns; the text backend degrades to offline heuristics.
    let store: Arc<dyn PatternStore> = Arc::new(InMemoryStore::new());
    let text_backend = ai_backend::build_backend(config.text_backend_url.as_deref());

    let detection = DetectionEngine::new(None);
    detection.seed_from_store(store.as_ref(), 0.5);

    let pipeline = Pipeline::start(
        config,
        detection,
        Box::new(ThresholdPolicyEngine::new()),
        store,
        Arc::from(text_backend),
    );

    log::info!("Pipeline running - press Ctrl+C to stop");
    if let Err(e) = tokio::signal::ctrl_c().await {
        log::error!("Signal listener failed: {}", e);
    }

    pipeline.shutdown().await;
    log::info!("Goodbye");
}
