//! HTTP API for health checks, readiness, swap statistics and operator resets

use crate::chain::BridgeSet;
use crate::config::ApiConfig;
use crate::error::{BridgeError, BridgeResult};
use crate::state::{SwapStats, SwapStore};
use crate::types::SwapDirection;
use crate::worker::SwapWorker;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn SwapStore>,
    pub bridges: BridgeSet,
    pub worker: Arc<SwapWorker>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/ready", get(readiness_check))
        .route("/stats", get(get_stats))
        .route("/swaps/:direction/:tx_id/reset", post(reset_swap))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Run the HTTP API server
pub async fn run_server(config: ApiConfig, state: AppState) -> BridgeResult<()> {
    let app = router(state);

    let addr = format!("{}:{}", config.host, config.port);
    info!("Starting API server on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| BridgeError::Internal(format!("bind {}: {}", addr, e)))?;
    axum::serve(listener, app)
        .await
        .map_err(|e| BridgeError::Internal(e.to_string()))?;

    Ok(())
}

/// Liveness
async fn health_check() -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// Readiness: the store and both chains must answer
async fn readiness_check(State(state): State<AppState>) -> impl IntoResponse {
    let database = state.store.health_check().await.is_ok();
    let (src, dst) = state.bridges.health_check().await;
    let ready = database && src && dst;

    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        status,
        Json(ReadinessResponse {
            ready,
            database,
            chains: vec![
                ChainHealth {
                    chain: state.bridges.src.name().to_string(),
                    healthy: src,
                },
                ChainHealth {
                    chain: state.bridges.dst.name().to_string(),
                    healthy: dst,
                },
            ],
        }),
    )
}

/// Swap counts by status
async fn get_stats(State(state): State<AppState>) -> impl IntoResponse {
    match state.store.swap_stats().await {
        Ok(stats) => (StatusCode::OK, Json(stats)),
        Err(e) => {
            warn!("Failed to load swap stats: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, Json(SwapStats::default()))
        }
    }
}

/// Return a failed swap to the pending queue
async fn reset_swap(
    State(state): State<AppState>,
    Path((direction, tx_id)): Path<(String, String)>,
) -> impl IntoResponse {
    let direction = match direction.parse::<SwapDirection>() {
        Ok(direction) => direction,
        Err(message) => return (StatusCode::BAD_REQUEST, Json(ResetResponse { reset: false, message })),
    };

    match state.worker.reset_failed_swap(direction, &tx_id).await {
        Ok(()) => {
            info!("Operator reset {} swap {}", direction, tx_id);
            (
                StatusCode::OK,
                Json(ResetResponse {
                    reset: true,
                    message: format!("{} swap {} queued for settlement", direction, tx_id),
                }),
            )
        }
        Err(e) => {
            let status = match &e {
                BridgeError::UnknownSwap { .. } => StatusCode::NOT_FOUND,
                BridgeError::NotFailed { .. } | BridgeError::AlreadySwapped { .. } => StatusCode::CONFLICT,
                _ => {
                    warn!("Failed to reset {} swap {}: {}", direction, tx_id, e);
                    StatusCode::INTERNAL_SERVER_ERROR
                }
            };
            (
                status,
                Json(ResetResponse {
                    reset: false,
                    message: e.to_string(),
                }),
            )
        }
    }
}

// Response types

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

#[derive(Serialize)]
struct ReadinessResponse {
    ready: bool,
    database: bool,
    chains: Vec<ChainHealth>,
}

#[derive(Serialize)]
struct ChainHealth {
    chain: String,
    healthy: bool,
}

#[derive(Serialize, Deserialize)]
struct ResetResponse {
    reset: bool,
    message: String,
}
