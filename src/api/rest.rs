// =============================================================================
// REST API Endpoints — Axum 0.7
// =============================================================================
//
// Read-only status surface under `/api/v1/`.  Nothing here mutates signal
// state; the scheduler loops are the only writers.
//
// CORS is configured permissively; the API exposes no secrets.
// =============================================================================

use std::sync::Arc;

use axum::{
    extract::{Json, State},
    response::IntoResponse,
    routing::get,
    Router,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tower_http::cors::{Any, CorsLayer};

use crate::app_state::AppState;
use crate::lifecycle::OpenSignal;
use crate::lifecycle::engine::format_held;
use crate::reference_tracker::ReferenceMomentum;

// =============================================================================
// Router construction
// =============================================================================

/// Build the status API router with CORS middleware and shared state.
pub fn router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/v1/health", get(health))
        .route("/api/v1/state", get(full_state))
        .route("/api/v1/signals", get(signals))
        .route("/api/v1/reference", get(reference))
        .route("/api/v1/errors", get(errors))
        .layer(cors)
        .with_state(state)
}

// =============================================================================
// Health
// =============================================================================

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    state_version: u64,
    server_time: i64,
    uptime_secs: u64,
}

async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let resp = HealthResponse {
        status: "ok",
        state_version: state.current_state_version(),
        server_time: Utc::now().timestamp_millis(),
        uptime_secs: state.start_time.elapsed().as_secs(),
    };
    Json(resp)
}

// =============================================================================
// Full state snapshot
// =============================================================================

async fn full_state(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.build_snapshot())
}

// =============================================================================
// Open signals
// =============================================================================

/// An open signal plus the figures a dashboard would otherwise recompute.
#[derive(Debug, Serialize)]
struct SignalView {
    #[serde(flatten)]
    signal: OpenSignal,
    first_entry: Option<f64>,
    latest_entry: Option<f64>,
    rungs: usize,
    drawdown_pct: f64,
    held: String,
}

impl SignalView {
    fn new(signal: OpenSignal, now: DateTime<Utc>) -> Self {
        Self {
            first_entry: signal.first_entry(),
            latest_entry: signal.latest_entry(),
            rungs: signal.entry_prices.len(),
            drawdown_pct: signal.drawdown_pct(),
            held: format_held((now - signal.opened_at).num_seconds()),
            signal,
        }
    }
}

async fn signals(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let now = Utc::now();
    let views: Vec<SignalView> = state
        .open_signals()
        .into_iter()
        .map(|s| SignalView::new(s, now))
        .collect();
    Json(views)
}

// =============================================================================
// Reference asset
// =============================================================================

#[derive(Serialize)]
struct ReferenceResponse {
    symbol: String,
    samples: usize,
    last_sample_at: Option<DateTime<Utc>>,
    #[serde(flatten)]
    momentum: ReferenceMomentum,
}

async fn reference(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let resp = {
        let tracker = state.reference.lock();
        ReferenceResponse {
            symbol: tracker.symbol().to_string(),
            samples: tracker.len(),
            last_sample_at: tracker.samples().last().map(|s| s.at),
            momentum: tracker.momentum(Utc::now()),
        }
    };
    Json(resp)
}

// =============================================================================
// Recent errors
// =============================================================================

async fn errors(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.recent_errors.read().clone())
}
