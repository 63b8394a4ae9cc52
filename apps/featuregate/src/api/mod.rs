//! # featuregate HTTP API Module
//!
//! This module implements the HTTP server using axum.
//!
//! ## Endpoints
//!
//! - `GET /health` - Health check
//! - `POST /validate-featuregate` - FeatureGate admission review
//! - `GET /features`, `GET /features/{name}` - Read Features
//! - `GET /featuregates`, `GET /featuregates/{name}` - Read FeatureGates
//! - `POST /features/{name}/activate` - Activate a Feature
//! - `POST /features/{name}/deactivate` - Deactivate a Feature
//!
//! Toggles write the FeatureGate and queue the Feature for the controller;
//! the response does not wait for reconciliation.

mod handlers;
mod types;

pub use handlers::{ApiError, status_for};
pub use types::{
    ActivateRequest, AdmissionRequest, AdmissionResponse, ErrorResponse, HealthResponse,
    Operation, ToggleResponse,
};

use crate::SharedStore;
use crate::config::Config;
use crate::controller::{Controller, ControllerSettings};
use axum::{
    Router,
    routing::{get, post},
};
use featuregate_core::FeatureGateError;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tower_http::trace::TraceLayer;

/// Capacity of the reconcile request queue.
const REQUEST_QUEUE_CAPACITY: usize = 1024;

// =============================================================================
// SERVER STATE
// =============================================================================

/// Shared server state.
#[derive(Clone)]
pub struct AppState {
    pub store: SharedStore,
    /// Feature names for the controller to reconcile.
    pub requests: mpsc::Sender<String>,
}

impl AppState {
    #[must_use]
    pub fn new(store: SharedStore, requests: mpsc::Sender<String>) -> Self {
        Self { store, requests }
    }

    /// Queue `feature` for reconciliation. A closed queue only means the
    /// controller is shutting down; the next resync picks the change up.
    pub async fn enqueue(&self, feature: &str) {
        if self.requests.send(feature.to_string()).await.is_err() {
            tracing::warn!(feature = %feature, "reconcile queue closed, request dropped");
        }
    }
}

// =============================================================================
// ROUTER CREATION
// =============================================================================

/// Create the axum router with all endpoints and middleware.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health_handler))
        .route(
            "/validate-featuregate",
            post(handlers::validate_featuregate_handler),
        )
        .route("/features", get(handlers::list_features_handler))
        .route("/features/{name}", get(handlers::get_feature_handler))
        .route(
            "/features/{name}/activate",
            post(handlers::activate_handler),
        )
        .route(
            "/features/{name}/deactivate",
            post(handlers::deactivate_handler),
        )
        .route("/featuregates", get(handlers::list_featuregates_handler))
        .route(
            "/featuregates/{name}",
            get(handlers::get_featuregate_handler),
        )
        .layer(axum::extract::DefaultBodyLimit::max(2 * 1024 * 1024))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// =============================================================================
// SERVER STARTUP
// =============================================================================

/// Start the HTTP server and the controller loop until Ctrl+C.
///
/// Every known Feature is queued once at startup so state written while the
/// server was down converges.
pub async fn run_server(config: &Config, store: SharedStore) -> Result<(), FeatureGateError> {
    let controller = Controller::new(Arc::clone(&store), ControllerSettings::from_config(config));
    let (requests, queue) = mpsc::channel(REQUEST_QUEUE_CAPACITY);
    let (shutdown, shutdown_rx) = watch::channel(false);

    let initial = controller.resync_requests().await?;
    let loop_controller = controller.clone();
    let worker = tokio::spawn(async move { loop_controller.run(queue, shutdown_rx).await });

    let state = AppState::new(store, requests);
    let resync = state.clone();
    tokio::spawn(async move {
        tracing::info!(count = initial.len(), "queueing initial resync");
        for name in initial {
            resync.enqueue(&name).await;
        }
    });

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| FeatureGateError::storage(format!("bind {addr}"), e))?;
    tracing::info!("featuregate HTTP server listening on {}", addr);

    let served = axum::serve(listener, create_router(state))
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "could not listen for Ctrl+C");
            }
        })
        .await
        .map_err(|e| FeatureGateError::storage("serve HTTP", e));

    // The loop may already have stopped if every sender is gone.
    let _ = shutdown.send(true);
    if let Err(e) = worker.await {
        tracing::error!(error = %e, "controller task failed");
    }
    served
}
