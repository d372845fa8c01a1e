/// Search Stub - local stand-in for the hotel/flight search API
///
/// Answers the same `GET /search.json` shape the concierge's search client
/// speaks, with deterministic fixtures:
/// - GET /search.json?engine=google_hotels|google_flights&...&api_key=...
/// - GET /health
///
/// STUB_FAIL_FIRST=n makes the first n searches answer 429 to exercise retries.

mod fixtures;

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use anyhow::Result;
use axum::{
    extract::{Extension, Json, Query},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use tower_http::cors::CorsLayer;
use tracing_subscriber::EnvFilter;
use travel_protocol::{HealthResponse, SearchErrorBody};

/// Stub configuration and the remaining forced failures
struct StubState {
    api_key: String,
    fail_remaining: AtomicU32,
}

impl StubState {
    fn new(api_key: impl Into<String>, fail_first: u32) -> Self {
        Self {
            api_key: api_key.into(),
            fail_remaining: AtomicU32::new(fail_first),
        }
    }

    fn from_env() -> Self {
        let api_key = std::env::var("STUB_API_KEY").unwrap_or_else(|_| "stub-key".to_string());
        let fail_first = std::env::var("STUB_FAIL_FIRST")
            .ok()
            .and_then(|v| v.parse::<u32>().ok())
            .unwrap_or(0);
        Self::new(api_key, fail_first)
    }

    /// Consume one forced failure, if any are left
    fn take_failure(&self) -> bool {
        self.fail_remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

fn search_error(status: StatusCode, error: impl Into<String>) -> Response {
    (status, Json(SearchErrorBody { error: error.into() })).into_response()
}

/// Required query parameter, or the 400 the real API would send
fn require<'a>(params: &'a HashMap<String, String>, name: &str) -> Result<&'a str, Response> {
    params
        .get(name)
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| search_error(StatusCode::BAD_REQUEST, format!("Missing query `{}` parameter.", name)))
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
    })
}

async fn search(
    Extension(state): Extension<Arc<StubState>>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    if params.get("api_key").map(String::as_str) != Some(state.api_key.as_str()) {
        tracing::info!("rejected search with invalid api key");
        return search_error(StatusCode::UNAUTHORIZED, "Invalid API key. Your API key should be here: https://serpapi.com/manage-api-key");
    }

    let engine = match require(&params, "engine") {
        Ok(engine) => engine,
        Err(response) => return response,
    };

    if state.take_failure() {
        tracing::info!(engine, "forced rate limit");
        return search_error(StatusCode::TOO_MANY_REQUESTS, "Your account has run out of searches.");
    }

    match engine {
        "google_hotels" => hotel_search(&params),
        "google_flights" => flight_search(&params),
        other => search_error(StatusCode::BAD_REQUEST, format!("Unsupported `{}` search engine.", other)),
    }
}

fn hotel_search(params: &HashMap<String, String>) -> Response {
    let fields = (|| {
        Ok::<_, Response>((
            require(params, "q")?,
            require(params, "check_in_date")?,
            require(params, "check_out_date")?,
        ))
    })();
    let (query, check_in, check_out) = match fields {
        Ok(fields) => fields,
        Err(response) => return response,
    };
    let adults = params.get("adults").and_then(|a| a.parse::<u32>().ok()).unwrap_or(2);

    tracing::info!(query, check_in, check_out, adults, "hotel search");
    Json(fixtures::hotels(query, adults)).into_response()
}

fn flight_search(params: &HashMap<String, String>) -> Response {
    let fields = (|| {
        Ok::<_, Response>((
            require(params, "departure_id")?,
            require(params, "arrival_id")?,
            require(params, "outbound_date")?,
            require(params, "return_date")?,
        ))
    })();
    let (departure, arrival, outbound, inbound) = match fields {
        Ok(fields) => fields,
        Err(response) => return response,
    };

    tracing::info!(departure, arrival, outbound, inbound, "flight search");
    Json(fixtures::flights(departure, arrival, outbound)).into_response()
}

fn build_router(state: Arc<StubState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/search.json", get(search))
        .layer(CorsLayer::permissive())
        .layer(Extension(state))
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file
    let _ = dotenv::dotenv();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    println!("\n╔════════════════════════════════════════════════════════════╗");
    println!("║          Search Stub - Hotel & Flight Fixtures             ║");
    println!("╚════════════════════════════════════════════════════════════╝\n");

    let port = std::env::var("STUB_PORT")
        .unwrap_or_else(|_| "8001".to_string())
        .parse::<u16>()
        .unwrap_or(8001);
    let state = Arc::new(StubState::from_env());
    let app = build_router(state);

    // Bind and serve
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port)).await?;

    println!("✓ Search stub running on http://0.0.0.0:{}", port);
    println!("  GET /search.json  — engine=google_hotels | google_flights");
    println!("  GET /health       — Check server health\n");

    axum::serve(listener, app).await?;

    Ok(())
}
