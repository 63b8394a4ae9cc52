//! # API Endpoint Handlers
//!
//! Core calls are synchronous and may touch the database, so every handler
//! runs them on the blocking pool.

use super::{
    AppState,
    types::{
        ActivateRequest, AdmissionRequest, AdmissionResponse, ErrorResponse, HealthResponse,
        Operation, ToggleResponse,
    },
};
use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use featuregate_core::{
    AdmissionValidator, ErrorKind, Feature, FeatureGate, FeatureGateClient, FeatureGateError,
    ResourceStore,
};
use std::sync::Arc;
use tracing::{info, warn};

// =============================================================================
// ERROR MAPPING
// =============================================================================

/// A core error rendered as an HTTP response.
#[derive(Debug)]
pub struct ApiError(pub FeatureGateError);

impl From<FeatureGateError> for ApiError {
    fn from(e: FeatureGateError) -> Self {
        Self(e)
    }
}

/// HTTP status for an error class.
#[must_use]
pub fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::AlreadyExists | ErrorKind::TooMany | ErrorKind::Conflict => {
            StatusCode::CONFLICT
        }
        ErrorKind::Forbidden => StatusCode::FORBIDDEN,
        ErrorKind::Invalid => StatusCode::UNPROCESSABLE_ENTITY,
        ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let kind = self.0.kind();
        let status = status_for(kind);
        if status.is_server_error() {
            warn!(error = %self.0, "request failed");
        }
        (status, Json(ErrorResponse::new(kind, self.0.to_string()))).into_response()
    }
}

/// Run a core call on the blocking pool.
async fn blocking<T, F>(f: F) -> Result<T, ApiError>
where
    F: FnOnce() -> Result<T, FeatureGateError> + Send + 'static,
    T: Send + 'static,
{
    let result = tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| FeatureGateError::storage("run request", e))?;
    Ok(result?)
}

fn bad_request(message: impl Into<String>) -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(ErrorResponse::new(ErrorKind::Invalid, message)),
    )
        .into_response()
}

// =============================================================================
// HEALTH HANDLER
// =============================================================================

/// Health check endpoint.
pub async fn health_handler() -> impl IntoResponse {
    Json(HealthResponse::default())
}

// =============================================================================
// ADMISSION HANDLER
// =============================================================================

/// Admit or reject a FeatureGate mutation.
///
/// Rejections are a normal `200` with `allowed: false`; only malformed
/// requests and store failures produce an error status.
pub async fn validate_featuregate_handler(
    State(state): State<AppState>,
    Json(request): Json<AdmissionRequest>,
) -> Response {
    let AdmissionRequest {
        operation,
        object,
        old_object,
    } = request;

    if operation == Operation::Delete {
        if let Some(gate) = old_object.as_ref().or(object.as_ref()) {
            let validator = AdmissionValidator::new(Arc::clone(&state.store));
            if let Err(e) = validator.validate_delete(gate) {
                return ApiError(e).into_response();
            }
        }
        return Json(AdmissionResponse::allowed()).into_response();
    }

    let Some(gate) = object else {
        return bad_request("object is required for CREATE and UPDATE");
    };

    let store = Arc::clone(&state.store);
    let verdict = blocking(move || {
        let previous = match (operation, old_object) {
            (Operation::Update, Some(old)) => Some(old),
            (Operation::Update, None) => Some(
                store
                    .get_feature_gate(gate.name())?
                    .ok_or_else(|| FeatureGateError::gate_not_found(gate.name()))?,
            ),
            _ => None,
        };
        let violations = AdmissionValidator::new(store).violations(&gate, previous.as_ref())?;
        Ok(AdmissionResponse::from_violations(gate.name(), &violations))
    })
    .await;

    match verdict {
        Ok(response) => {
            info!(allowed = response.allowed, operation = ?operation, "admission review");
            Json(response).into_response()
        }
        Err(e) => e.into_response(),
    }
}

// =============================================================================
// READ HANDLERS
// =============================================================================

/// List all Features.
pub async fn list_features_handler(
    State(state): State<AppState>,
) -> Result<Json<Vec<Feature>>, ApiError> {
    let client = FeatureGateClient::new(Arc::clone(&state.store));
    blocking(move || client.get_feature_list()).await.map(Json)
}

/// Get one Feature.
pub async fn get_feature_handler(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<Feature>, ApiError> {
    let client = FeatureGateClient::new(Arc::clone(&state.store));
    blocking(move || client.get_feature(&name)).await.map(Json)
}

/// List all FeatureGates.
pub async fn list_featuregates_handler(
    State(state): State<AppState>,
) -> Result<Json<Vec<FeatureGate>>, ApiError> {
    let client = FeatureGateClient::new(Arc::clone(&state.store));
    blocking(move || client.get_feature_gate_list())
        .await
        .map(Json)
}

/// Get one FeatureGate.
pub async fn get_featuregate_handler(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<FeatureGate>, ApiError> {
    let client = FeatureGateClient::new(Arc::clone(&state.store));
    blocking(move || client.get_feature_gate(&name))
        .await
        .map(Json)
}

// =============================================================================
// TOGGLE HANDLERS
// =============================================================================

/// Activate a Feature and queue it for reconciliation.
pub async fn activate_handler(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Json(request): Json<ActivateRequest>,
) -> Result<Json<ToggleResponse>, ApiError> {
    let client = FeatureGateClient::new(Arc::clone(&state.store));
    let feature = name.clone();
    let outcome = blocking(move || {
        client.activate_feature(&feature, request.permanently_void_all_support_guarantees)
    })
    .await?;

    state.enqueue(&name).await;
    Ok(Json(ToggleResponse {
        feature: name,
        outcome,
    }))
}

/// Deactivate a Feature and queue it for reconciliation.
pub async fn deactivate_handler(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<ToggleResponse>, ApiError> {
    let client = FeatureGateClient::new(Arc::clone(&state.store));
    let feature = name.clone();
    let outcome = blocking(move || client.deactivate_feature(&feature)).await?;

    state.enqueue(&name).await;
    Ok(Json(ToggleResponse {
        feature: name,
        outcome,
    }))
}
