// =============================================================================
// REST API Endpoints — Axum 0.7
// =============================================================================
//
// All endpoints live under `/api/v1/` and are read-only views over the shared
// DashboardState. Monitors are the only writers; nothing here mutates state,
// so every handler is a plain GET.
//
// CORS is configured permissively for development; tighten `allowed_origins`
// in production.
// =============================================================================

use std::sync::Arc;

use axum::{
    extract::{Json, Path, State},
    response::IntoResponse,
    routing::get,
    Router,
};
use serde::Serialize;
use tower_http::cors::{Any, CorsLayer};

use crate::app_state::DashboardState;

// =============================================================================
// Router construction
// =============================================================================

/// Build the full REST API router with CORS middleware and shared state.
pub fn router(state: Arc<DashboardState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // ── Health ──────────────────────────────────────────────────
        .route("/api/v1/health", get(health))
        // ── Dashboard views ─────────────────────────────────────────
        .route("/api/v1/state", get(full_state))
        .route("/api/v1/pairs", get(pairs))
        .route("/api/v1/pairs/:symbol/series", get(pair_series))
        .route("/api/v1/funding/ranks", get(funding_ranks))
        .route("/api/v1/flows", get(money_flow))
        .route("/api/v1/open-interest", get(open_interest))
        .route("/api/v1/narrative", get(narrative))
        // ── WebSocket (handled in ws module but mounted here) ───────
        .route("/api/v1/ws", get(crate::api::ws::ws_handler))
        // ── Middleware & State ──────────────────────────────────────
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
}

async fn health(State(state): State<Arc<DashboardState>>) -> impl IntoResponse {
    let resp = HealthResponse {
        status: "ok",
        state_version: state.current_state_version(),
        server_time: chrono::Utc::now().timestamp_millis(),
    };
    Json(resp)
}

// =============================================================================
// Full state snapshot
// =============================================================================

async fn full_state(State(state): State<Arc<DashboardState>>) -> impl IntoResponse {
    let snapshot = state.build_snapshot();
    Json(snapshot)
}

// =============================================================================
// Watched pairs
// =============================================================================

async fn pairs(State(state): State<Arc<DashboardState>>) -> impl IntoResponse {
    let pairs = state.pair_metrics.read().clone();
    Json(pairs)
}

/// Rolling time series for one watched symbol. The buffer is bounded by the
/// configured history window, so this returns at most a few hours of points.
async fn pair_series(
    Path(symbol): Path<String>,
    State(state): State<Arc<DashboardState>>,
) -> impl IntoResponse {
    let symbol = symbol.to_uppercase();
    let points = state.series.series(&symbol);
    Json(serde_json::json!({
        "symbol": symbol,
        "points": points,
    }))
}

// =============================================================================
// Funding rankings
// =============================================================================

async fn funding_ranks(State(state): State<Arc<DashboardState>>) -> impl IntoResponse {
    let snapshot = state.funding_ranks.read().clone();
    match snapshot {
        Some(s) => Json(s).into_response(),
        None => {
            let body =
                serde_json::json!({ "message": "No funding ranking available yet" });
            Json(body).into_response()
        }
    }
}

// =============================================================================
// Money flow
// =============================================================================

async fn money_flow(State(state): State<Arc<DashboardState>>) -> impl IntoResponse {
    let snapshot = state.money_flow.read().clone();
    match snapshot {
        Some(s) => Json(s).into_response(),
        None => {
            let body =
                serde_json::json!({ "message": "No money flow analysis available yet" });
            Json(body).into_response()
        }
    }
}

// =============================================================================
// Open interest
// =============================================================================

async fn open_interest(State(state): State<Arc<DashboardState>>) -> impl IntoResponse {
    let snapshot = state.open_interest.read().clone();
    match snapshot {
        Some(s) => Json(s).into_response(),
        None => {
            let body =
                serde_json::json!({ "message": "No open interest report available yet" });
            Json(body).into_response()
        }
    }
}

// =============================================================================
// Narrative
// =============================================================================

async fn narrative(State(state): State<Arc<DashboardState>>) -> impl IntoResponse {
    let report = state.narrative.read().clone();
    match report {
        Some(r) => Json(r).into_response(),
        None => {
            let body =
                serde_json::json!({ "message": "No narrative generated yet" });
            Json(body).into_response()
        }
    }
}
