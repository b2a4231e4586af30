//! Prometheus metrics for monitoring
//!
//! Exposes metrics for:
//! - Chain connection status
//! - Swap settlement outcomes
//! - DCRM sign requests

use crate::error::{BridgeError, BridgeResult};
use crate::state::SwapStatus;
use crate::types::SwapDirection;

use axum::{http::StatusCode, routing::get, Router};
use lazy_static::lazy_static;
use prometheus::{
    register_counter_vec, register_gauge_vec, CounterVec, Encoder, GaugeVec, TextEncoder,
};
use std::net::SocketAddr;
use tracing::info;

lazy_static! {
    pub static ref CHAIN_CONNECTED: GaugeVec = register_gauge_vec!(
        "bridge_chain_connected",
        "Chain connection status (1=connected, 0=disconnected)",
        &["chain"]
    ).unwrap();

    pub static ref SWAPS: CounterVec = register_counter_vec!(
        "bridge_swaps_total",
        "Swaps reaching a status, by direction",
        &["direction", "status"]
    ).unwrap();

    pub static ref SIGN_REQUESTS: CounterVec = register_counter_vec!(
        "bridge_sign_requests_total",
        "DCRM sign requests by outcome",
        &["outcome"]
    ).unwrap();

    pub static ref HEALTH_CHECK_SUCCESS: CounterVec = register_counter_vec!(
        "bridge_health_check_success_total",
        "Total successful health checks",
        &[]
    ).unwrap();

    pub static ref HEALTH_CHECK_FAILURE: CounterVec = register_counter_vec!(
        "bridge_health_check_failure_total",
        "Total failed health checks",
        &[]
    ).unwrap();
}

/// Prometheus metrics server
pub struct MetricsServer {
    port: u16,
}

impl MetricsServer {
    pub fn new(port: u16) -> Self {
        Self { port }
    }

    pub async fn run(&self) -> BridgeResult<()> {
        let app = Router::new().route("/metrics", get(metrics_handler));

        let addr = SocketAddr::from(([0, 0, 0, 0], self.port));
        info!("Starting metrics server on {}", addr);

        let listener = tokio::net::TcpListener::bind(&addr)
            .await
            .map_err(|e| BridgeError::Internal(format!("bind {}: {}", addr, e)))?;
        axum::serve(listener, app)
            .await
            .map_err(|e| BridgeError::Internal(e.to_string()))?;

        Ok(())
    }
}

async fn metrics_handler() -> Result<String, StatusCode> {
    render().map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)
}

fn render() -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    encoder.encode(&prometheus::gather(), &mut buffer)?;
    Ok(String::from_utf8_lossy(&buffer).into_owned())
}

pub fn record_chain_health(chain: &str, healthy: bool) {
    CHAIN_CONNECTED
        .with_label_values(&[chain])
        .set(if healthy { 1.0 } else { 0.0 });
}

pub fn record_swap(direction: SwapDirection, status: SwapStatus) {
    SWAPS
        .with_label_values(&[direction.as_str(), status.as_str()])
        .inc();
}

pub fn record_sign_request(success: bool) {
    SIGN_REQUESTS
        .with_label_values(&[if success { "success" } else { "failure" }])
        .inc();
}

pub fn record_health_check() {
    HEALTH_CHECK_SUCCESS.with_label_values(&[]).inc();
}

pub fn record_health_check_failure() {
    HEALTH_CHECK_FAILURE.with_label_values(&[]).inc();
}
