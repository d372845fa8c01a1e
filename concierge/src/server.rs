/// HTTP boundary for the concierge
/// Wraps the dispatcher in an axum router; the `concierge-http` binary only
/// loads configuration and serves what `build_router` returns.

use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{
    extract::{rejection::JsonRejection, Extension, Json},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use base64::Engine;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use travel_protocol::{ConciergeResponse, HealthResponse, ProcessRequest, TripRequest, VoiceInputRequest, VoiceTranscript};

use crate::capabilities::travel_registry;
use crate::config::{ConciergeConfig, RouterMode, SummarizerMode};
use crate::dispatcher::Dispatcher;
use crate::extract::{FieldExtractor, PatternExtractor};
use crate::llm::{LlmClassifier, LlmClient, LlmExtractor, TripPlanner};
use crate::normalizer::{http_status, normalize};
use crate::outcome::Outcome;
use crate::registry::{IntentClassifier, KeywordClassifier};
use crate::request::Request;
use crate::retry::RetryingExecutor;
use crate::search::{FlightSearch, HotelSearch, SerpClient};
use crate::summarizer::{LlmSummarizer, Summarizer, TemplateSummarizer};

const MALFORMED_REQUEST: &str = "malformed_request";

/// Shared, read-only state behind every route
#[derive(Clone)]
pub struct AppState {
    dispatcher: Dispatcher,
    summarizer: Option<Arc<dyn Summarizer>>,
    llm: Option<LlmClient>,
    planner: Option<TripPlanner>,
}

impl AppState {
    pub fn new(dispatcher: Dispatcher) -> Self {
        Self {
            dispatcher,
            summarizer: None,
            llm: None,
            planner: None,
        }
    }

    pub fn with_summarizer(mut self, summarizer: Arc<dyn Summarizer>) -> Self {
        self.summarizer = Some(summarizer);
        self
    }

    /// Enables audio transcription and trip planning
    pub fn with_llm(mut self, llm: LlmClient) -> Self {
        self.planner = Some(TripPlanner::new(llm.clone()));
        self.llm = Some(llm);
        self
    }

    /// Wire search clients, router mode and summarizer from configuration
    pub fn from_config(config: &ConciergeConfig) -> Result<Self> {
        let serp = SerpClient::new(&config.serp_base_url, &config.serp_api_key, config.http_timeout)
            .context("failed to build search client")?;
        let registry = travel_registry(
            Arc::new(HotelSearch::new(serp.clone())),
            Arc::new(FlightSearch::new(serp)),
        )?;

        let llm = match &config.openai {
            Some(openai) => Some(
                LlmClient::new(&openai.base_url, &openai.api_key, &openai.model, config.http_timeout)
                    .context("failed to build language model client")?,
            ),
            None => None,
        };

        let (classifier, extractor): (Arc<dyn IntentClassifier>, Arc<dyn FieldExtractor>) =
            match (config.router, &llm) {
                (RouterMode::Llm, Some(client)) => (
                    Arc::new(LlmClassifier::new(client.clone())),
                    Arc::new(LlmExtractor::new(client.clone())),
                ),
                _ => (Arc::new(KeywordClassifier::new()), Arc::new(PatternExtractor::new())),
            };

        let dispatcher = Dispatcher::new(
            Arc::new(registry),
            classifier,
            extractor,
            RetryingExecutor::new(config.retry.clone()),
        );

        let mut state = AppState::new(dispatcher);
        match (config.summarizer, &llm) {
            (SummarizerMode::Template, _) => state = state.with_summarizer(Arc::new(TemplateSummarizer::new())),
            (SummarizerMode::Llm, Some(client)) => {
                state = state.with_summarizer(Arc::new(LlmSummarizer::new(client.clone())))
            }
            _ => {}
        }
        if let Some(client) = llm {
            state = state.with_llm(client);
        }

        Ok(state)
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    pub fn planner_enabled(&self) -> bool {
        self.planner.is_some()
    }

    /// Dispatch one request and shape the result for a caller
    pub async fn process(&self, request: Request, cancel: &CancellationToken) -> (StatusCode, ConciergeResponse) {
        let report = self.dispatcher.dispatch(&request, cancel).await;
        let status = http_status(&report.outcome);
        let mut response = normalize(&report.outcome).with_request_id(report.request_id.clone());

        if let (Outcome::Success(data), Some(summarizer), Some(name)) =
            (&report.outcome, &self.summarizer, &report.capability)
        {
            if let Some(descriptor) = self.dispatcher.registry().get(name) {
                match summarizer.summarize(descriptor.output, data).await {
                    Ok(answer) => response.answer = Some(answer),
                    Err(e) => tracing::warn!(request_id = %report.request_id, error = %e, "summary unavailable"),
                }
            }
        }

        (status, response)
    }
}

fn malformed(message: impl Into<String>) -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(ConciergeResponse::error(MALFORMED_REQUEST, message)),
    )
        .into_response()
}

fn failure(outcome: Outcome) -> Response {
    (http_status(&outcome), Json(normalize(&outcome))).into_response()
}

/// Health check endpoint
async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
    })
}

/// Main dispatch endpoint
async fn process(
    Extension(state): Extension<Arc<AppState>>,
    payload: Result<Json<ProcessRequest>, JsonRejection>,
) -> Response {
    let Json(body) = match payload {
        Ok(body) => body,
        Err(rejection) => {
            tracing::debug!(error = %rejection.body_text(), "rejected /process body");
            return malformed(rejection.body_text());
        }
    };
    if body.question.trim().is_empty() && body.hints.is_empty() {
        return malformed("`question` must not be empty");
    }

    // Cancelled when this future is dropped, i.e. the client went away
    let cancel = CancellationToken::new();
    let _guard = cancel.clone().drop_guard();

    let (status, response) = state.process(Request::from(body), &cancel).await;
    (status, Json(response)).into_response()
}

async fn process_voice(
    Extension(state): Extension<Arc<AppState>>,
    payload: Result<Json<VoiceInputRequest>, JsonRejection>,
) -> Response {
    let Json(body) = match payload {
        Ok(body) => body,
        Err(rejection) => return malformed(rejection.body_text()),
    };

    if let Some(text) = body.text.filter(|t| !t.trim().is_empty()) {
        return Json(VoiceTranscript { transcript: text }).into_response();
    }
    let Some(audio) = body.audio_base64.filter(|a| !a.trim().is_empty()) else {
        return malformed("No audio or text supplied.");
    };
    let Some(llm) = &state.llm else {
        return malformed("audio transcription not configured");
    };
    let bytes = match base64::engine::general_purpose::STANDARD.decode(audio.trim()) {
        Ok(bytes) => bytes,
        Err(e) => return malformed(format!("`audio_base64` is not valid base64: {}", e)),
    };

    let cancel = CancellationToken::new();
    let _guard = cancel.clone().drop_guard();
    let result = state
        .dispatcher
        .executor()
        .execute("transcribe", || llm.transcribe(bytes.clone()), &cancel)
        .await;

    match result {
        Ok(transcript) => Json(VoiceTranscript { transcript }).into_response(),
        Err(e) => {
            tracing::warn!(error = %e, "transcription failed");
            failure(e.into())
        }
    }
}

async fn create_trip_plan(
    Extension(state): Extension<Arc<AppState>>,
    payload: Result<Json<TripRequest>, JsonRejection>,
) -> Response {
    let Json(body) = match payload {
        Ok(body) => body,
        Err(rejection) => return malformed(rejection.body_text()),
    };
    if body.conversation.trim().is_empty() {
        return malformed("`conversation` must not be empty");
    }
    let Some(planner) = &state.planner else {
        return malformed("trip planning not configured");
    };

    tracing::info!(user_id = %body.user_id, conversation_len = body.conversation.len(), "planning trip");
    let cancel = CancellationToken::new();
    let _guard = cancel.clone().drop_guard();
    let result = state
        .dispatcher
        .executor()
        .execute("trip_plan", || planner.plan(&body.conversation), &cancel)
        .await;

    match result {
        Ok(plan) => Json(plan).into_response(),
        Err(e) => {
            tracing::warn!(user_id = %body.user_id, error = %e, "trip planning failed");
            failure(e.into())
        }
    }
}

/// All routes, CORS included. The trip route exists only with a language model.
pub fn build_router(state: Arc<AppState>) -> Router {
    let mut app = Router::new()
        .route("/", get(health))
        .route("/health", get(health))
        .route("/process", post(process))
        .route("/api/voice/process", post(process_voice));

    if state.planner_enabled() {
        app = app.route("/api/trip/create", post(create_trip_plan));
    }

    app.layer(CorsLayer::permissive()).layer(Extension(state))
}

/// Bind and serve until the process is stopped
pub async fn serve(state: AppState, port: u16) -> Result<()> {
    let app = build_router(Arc::new(state));
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port))
        .await
        .with_context(|| format!("failed to bind port {}", port))?;

    tracing::info!(port, "concierge listening");
    axum::serve(listener, app).await.context("server failed")?;
    Ok(())
}
