/// HTTP server for the travel concierge
/// Exposes dispatch, voice transcription and trip planning as REST endpoints

use anyhow::Result;
use tracing_subscriber::EnvFilter;

use concierge::{serve, AppState, ConciergeConfig};

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file
    let _ = dotenv::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    println!("\n╔════════════════════════════════════════════════════════════╗");
    println!("║         Travel Concierge - HTTP API Server                 ║");
    println!("║    Hotel / flight dispatch with retries and clarification  ║");
    println!("╚════════════════════════════════════════════════════════════╝\n");

    let config = match ConciergeConfig::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("[FATAL] Configuration failed: {}", e);
            return Err(e.into());
        }
    };

    println!("[INIT] Server configuration:");
    println!("  Port: {}", config.port);
    println!("  Search API: {}", config.serp_base_url);
    println!("  Router: {:?}", config.router);
    println!("  Summarizer: {:?}", config.summarizer);
    println!(
        "  Retries: {} attempts, {:?}..{:?} backoff",
        config.retry.max_attempts, config.retry.min_wait, config.retry.max_wait
    );
    match &config.openai {
        Some(openai) => println!("  Language model: {} ({})", openai.model, openai.base_url),
        None => println!("  Language model: disabled (no OPENAI_API_KEY)"),
    }

    let state = AppState::from_config(&config)?;

    println!("\n[STARTUP] ✓ Concierge running on http://0.0.0.0:{}", config.port);
    println!("  POST /process            — Dispatch a travel request");
    println!("  POST /api/voice/process  — Transcribe audio or pass text through");
    if state.planner_enabled() {
        println!("  POST /api/trip/create    — Plan a trip from a conversation");
    }
    println!("  GET  /health             — Check server health\n");

    serve(state, config.port).await
}
