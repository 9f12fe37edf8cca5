// Main entry point for the manga generation server

use manga_studio::{
    core::{
        types::{MangaDocument, MangaStyle, TextEdit},
        Config,
    },
    document::apply_edit,
    orchestration::{ChannelSink, GenerationEvent, GenerationOrchestrator},
    services::{gemini::random_premise, ApiClient},
    utils::Metrics,
    GenerationRequest,
};

use anyhow::{Context, Result};
use axum::{
    extract::State,
    http::StatusCode,
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Json,
    },
    routing::{get, post},
    Router,
};
use futures::stream::{self, Stream};
use serde::Deserialize;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};

/// Application state shared across handlers
#[derive(Clone)]
struct AppState {
    config: Arc<Config>,
    api_client: Arc<ApiClient>,
    orchestrator: Arc<GenerationOrchestrator>,
    metrics: Metrics,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let config = Arc::new(Config::new().context("Failed to load configuration")?);

    // Initialize logging
    use tracing_subscriber::EnvFilter;
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(config.log_filter()))
        .init();

    info!("=== MANGA STUDIO ===");
    info!(
        "Models: script={} character={} panel={}",
        config.script_model(),
        config.character_image_model(),
        config.panel_image_model()
    );
    info!(
        "Keys={} CallTimeout={}s Retries={}",
        config.api_keys().len(),
        config.call_timeout().as_secs(),
        config.max_retries()
    );

    // Initialize metrics
    let metrics = Metrics::new();

    let api_client = Arc::new(ApiClient::new(config.clone(), None, Some(metrics.clone()))?);
    let orchestrator = Arc::new(GenerationOrchestrator::new(
        api_client.clone(),
        config.call_timeout(),
        Some(metrics.clone()),
    ));

    let state = AppState {
        config: config.clone(),
        api_client,
        orchestrator,
        metrics,
    };

    // Setup CORS
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/metrics", get(metrics_endpoint))
        .route("/stats", get(stats_endpoint))
        .route("/styles", get(styles))
        .route("/surprise", get(surprise))
        .route("/generate", post(generate))
        .route("/edit", post(edit))
        .with_state(state)
        .layer(cors);

    let addr = format!("{}:{}", config.server_host(), config.server_port());
    info!("{}", "=".repeat(70));
    info!("Server starting on http://{}", addr);
    info!("{}", "-".repeat(70));
    info!("Endpoints:");
    info!("  GET  /          - Root endpoint");
    info!("  GET  /health    - Health check with API key and breaker status");
    info!("  GET  /metrics   - Prometheus metrics");
    info!("  GET  /stats     - Detailed statistics");
    info!("  GET  /styles    - Available manga styles");
    info!("  GET  /surprise  - Random story premise");
    info!("  POST /generate  - Generate a manga (server-sent events)");
    info!("  POST /edit      - Apply a text edit to a document");
    info!("{}", "=".repeat(70));

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

async fn root() -> &'static str {
    "Manga Studio - AI manga generation backend"
}

async fn health(State(state): State<AppState>) -> Json<serde_json::Value> {
    state.metrics.record_endpoint_request("health");

    let keys = state.api_client.key_stats().await;
    let (healthy, total) = state.api_client.key_counts().await;
    let circuit = state.api_client.circuit_stats();

    Json(serde_json::json!({
        "status": if healthy > 0 { "healthy" } else { "degraded" },
        "version": env!("CARGO_PKG_VERSION"),
        "total_keys": total,
        "healthy_keys": healthy,
        "keys": keys,
        "circuit_breaker": circuit,
    }))
}

/// Prometheus metrics endpoint
async fn metrics_endpoint(State(state): State<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [("Content-Type", "text/plain; version=0.0.4")],
        state.metrics.to_prometheus(),
    )
}

/// Detailed statistics endpoint (JSON)
async fn stats_endpoint(
    State(state): State<AppState>,
) -> Result<Json<serde_json::Value>, (StatusCode, String)> {
    let snapshot = state.metrics.snapshot();
    serde_json::to_value(snapshot).map(Json).map_err(|e| {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Failed to serialize metrics: {}", e),
        )
    })
}

async fn styles(State(state): State<AppState>) -> Json<Vec<MangaStyle>> {
    state.metrics.record_endpoint_request("styles");
    Json(MangaStyle::ALL.to_vec())
}

async fn surprise(State(state): State<AppState>) -> Json<serde_json::Value> {
    state.metrics.record_endpoint_request("surprise");
    Json(serde_json::json!({ "premise": random_premise() }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateBody {
    premise: String,
    #[serde(default)]
    style: MangaStyle,
    page_count: Option<u32>,
}

/// Generate a manga, streaming progress as server-sent events
///
/// # Events:
/// - `progress`: label of the step about to start
/// - `document`: latest partial document (supersedes earlier ones)
/// - `error`: failing stage and message; the stream ends after it
/// - `complete`: the finished document
///
/// Closing the connection cancels the run.
async fn generate(
    State(state): State<AppState>,
    Json(body): Json<GenerateBody>,
) -> Result<Sse<impl Stream<Item = Result<Event, axum::Error>>>, (StatusCode, String)> {
    state.metrics.record_endpoint_request("generate");

    let premise = body.premise.trim();
    if premise.is_empty() {
        return Err((StatusCode::BAD_REQUEST, "Premise must not be empty".to_string()));
    }

    let request = GenerationRequest::new(
        premise,
        body.style,
        body.page_count
            .unwrap_or_else(|| state.config.default_page_count()),
    );
    info!(
        "Received generate request: style={} pages={}",
        request.style, request.page_count
    );

    let (sink, rx) = ChannelSink::new();
    let cancel = CancellationToken::new();

    let orchestrator = state.orchestrator.clone();
    let run_cancel = cancel.clone();
    tokio::spawn(async move {
        match orchestrator.generate(&request, &sink, &run_cancel).await {
            Ok(document) => sink.send(GenerationEvent::Complete { document }),
            Err(e) if run_cancel.is_cancelled() => warn!("Run abandoned by client: {}", e),
            Err(_) => {}
        }
    });

    // The guard lives as long as the response stream
    let stream = stream::unfold((rx, cancel.drop_guard()), |(mut rx, guard)| async move {
        let event = rx.recv().await?;
        let sse = Event::default().event(event.name()).json_data(&event);
        Some((sse, (rx, guard)))
    });

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

#[derive(Debug, Deserialize)]
struct EditBody {
    document: MangaDocument,
    edit: TextEdit,
}

/// Apply one text edit; the edited document is returned, the input is untouched
async fn edit(State(state): State<AppState>, Json(body): Json<EditBody>) -> Json<MangaDocument> {
    state.metrics.record_endpoint_request("edit");
    Json(apply_edit(&body.document, &body.edit))
}
