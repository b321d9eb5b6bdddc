//! Health probe endpoints.
//!
//! `/healthz` answers as long as the process serves requests; `/readyz`
//! turns ready once the TinkerbellMachine API has been reached.

use crate::error::ControllerError;
use axum::Router;
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::get;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::net::TcpListener;
use tracing::info;

/// Readiness shared between the controller and the probe server
#[derive(Debug, Clone, Default)]
pub struct ProbeState {
    ready: Arc<AtomicBool>,
}

impl ProbeState {
    pub fn set_ready(&self) {
        self.ready.store(true, Ordering::SeqCst);
    }

    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }
}

async fn readyz(State(state): State<ProbeState>) -> (StatusCode, &'static str) {
    if state.is_ready() {
        (StatusCode::OK, "ok")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "not ready")
    }
}

fn probe_routes(state: ProbeState) -> Router {
    Router::new()
        .route("/healthz", get(|| async { "ok" }))
        .route("/readyz", get(readyz))
        .with_state(state)
}

/// Binds `addr` and serves the probes until the server fails
pub async fn serve(addr: SocketAddr, state: ProbeState) -> Result<(), ControllerError> {
    let listener = TcpListener::bind(addr)
        .await
        .map_err(|e| ControllerError::Probe(format!("binding {addr}: {e}")))?;
    info!("Probe server listening on {}", addr);
    serve_on(listener, state).await
}

async fn serve_on(listener: TcpListener, state: ProbeState) -> Result<(), ControllerError> {
    axum::serve(listener, probe_routes(state))
        .await
        .map_err(|e| ControllerError::Probe(e.to_string()))
}
