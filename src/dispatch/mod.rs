// Redirect-based dispatch service
//
// The dispatcher never proxies a completion. It classifies the request, asks the
// routing policy for a backend, records the decision and answers with a
// temporary redirect to that backend.

pub mod decision_log;

use axum::{
    extract::{rejection::JsonRejection, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use serde_json::{json, Value};
use std::path::Path;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::error::RouterError;
use crate::models::DispatchRequest;
use crate::routing::policy::RequestDescriptor;
use crate::routing::RoutingPolicy;

pub use decision_log::{DecisionLog, DecisionRecord};

/// Application version from Cargo.toml
const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Path clients POST completion requests to
pub const FORWARD_PATH: &str = "/forward";

/// State shared across dispatch handlers
#[derive(Clone)]
pub struct AppState {
    pub policy: Arc<dyn RoutingPolicy>,
    pub decisions: Arc<DecisionLog>,
}

impl AppState {
    pub fn new(policy: Arc<dyn RoutingPolicy>) -> Self {
        Self {
            policy,
            decisions: Arc::new(DecisionLog::new()),
        }
    }
}

/// Health check routes
pub fn health_routes() -> Router {
    Router::new()
        .route("/", get(root_handler))
        .route("/health", get(health_handler))
}

/// Dispatch and statistics routes
pub fn dispatch_routes(state: AppState) -> Router {
    Router::new()
        .route(FORWARD_PATH, post(forward_handler))
        .route("/stats", get(stats_handler))
        .with_state(state)
}

/// Full dispatcher application
pub fn build_app(state: AppState) -> Router {
    Router::new()
        .merge(health_routes())
        .merge(dispatch_routes(state))
        .layer(TraceLayer::new_for_http())
}

/// GET / - Simple liveness check
async fn root_handler() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "message": "Load balancer is running",
        "version": VERSION
    }))
}

/// GET /health - Liveness with timestamp
async fn health_handler() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "timestamp": Utc::now().to_rfc3339(),
        "version": VERSION
    }))
}

/// POST /forward - Pick a backend and redirect the client to it
async fn forward_handler(
    State(state): State<AppState>,
    payload: Result<Json<DispatchRequest>, JsonRejection>,
) -> Result<Response, RouterError> {
    let Json(request) = payload.map_err(|rejection| {
        tracing::warn!("Rejected dispatch body: {}", rejection.body_text());
        RouterError::from(rejection)
    })?;
    let descriptor = RequestDescriptor::new(request.input_len(), request.max_tokens);
    tracing::debug!("Prompt is length {}", descriptor.input_len);

    let backend = state.policy.select(&descriptor).map_err(|e| {
        tracing::warn!("Routing failed for {:?}: {}", descriptor, e);
        e
    })?;

    tracing::debug!(
        "({}, {:?}) --> ({}, {})",
        descriptor.input_len,
        descriptor.output_len,
        backend.gpu_type,
        backend.address
    );

    state.decisions.append(DecisionRecord {
        timestamp: Utc::now(),
        input_len: descriptor.input_len,
        output_len: descriptor.output_len,
        gpu_type: backend.gpu_type.clone(),
        address: backend.address.clone(),
    });

    Ok(temporary_redirect(backend.completions_url()))
}

/// GET /stats - Decision counts per backend
async fn stats_handler(State(state): State<AppState>) -> Json<Value> {
    let backends: Vec<Value> = state
        .policy
        .backends()
        .iter()
        .map(|b| json!({"gpu_type": b.gpu_type, "address": b.address}))
        .collect();

    Json(json!({
        "policy": state.policy.name(),
        "backends": backends,
        "total_decisions": state.decisions.len(),
        "decisions_by_backend": state.decisions.counts_by_backend(),
    }))
}

/// Non-cacheable redirect with no body; the target can differ between
/// identical requests
fn temporary_redirect(location: String) -> Response {
    (
        StatusCode::TEMPORARY_REDIRECT,
        [
            (header::LOCATION, location),
            (header::CACHE_CONTROL, "no-store".to_string()),
        ],
    )
        .into_response()
}

/// Log the per-backend decision counts and write the decision log to `path`.
///
/// Called once the server has stopped, whether or not it stopped cleanly.
pub fn persist_decisions(decisions: &DecisionLog, path: &Path) -> anyhow::Result<usize> {
    for (gpu_type, count) in decisions.counts_by_backend() {
        tracing::info!("📊 {} requests routed to {}", count, gpu_type);
    }

    let rows = decisions.flush_to_sqlite(path)?;
    tracing::info!("✅ Wrote {} decisions to {}", rows, path.display());
    Ok(rows)
}
