//! Integration tests for the featuregate HTTP API.
//!
//! Uses axum-test to drive the router without binding a socket.

#![allow(clippy::unwrap_used, clippy::panic)]

use axum::http::StatusCode;
use axum_test::TestServer;
use featuregate::SharedStore;
use featuregate::api::{AdmissionResponse, AppState, ErrorResponse, HealthResponse, create_router};
use featuregate_core::{
    AdmittingStore, Feature, FeatureGate, FeatureReference, MemoryStore, ResourceStore,
    StabilityLevel,
};
use serde_json::json;
use std::sync::Arc;
use tokio::sync::mpsc;

// =============================================================================
// HELPER FUNCTIONS
// =============================================================================

struct Fixture {
    server: TestServer,
    backend: Arc<MemoryStore>,
    queue: mpsc::Receiver<String>,
}

/// Features seeded into every fixture.
const FEATURES: &[(&str, StabilityLevel)] = &[
    ("bar", StabilityLevel::TechnicalPreview),
    ("cloud-event-listener", StabilityLevel::Stable),
    ("dodgy-experimental-periscope", StabilityLevel::Experimental),
    ("specialized-toaster", StabilityLevel::Deprecated),
    ("baz", StabilityLevel::TechnicalPreview),
];

/// Seed Features and (unadmitted) gates, then build the router over an
/// admitting view of the same backend.
fn fixture(gates: Vec<FeatureGate>) -> Fixture {
    let backend = Arc::new(MemoryStore::new());
    for (name, level) in FEATURES {
        backend
            .create_feature(Feature::new(*name, format!("{name} feature"), *level))
            .unwrap();
    }
    for gate in gates {
        backend.create_feature_gate(gate).unwrap();
    }

    let store: SharedStore = Arc::new(AdmittingStore::from_shared(Arc::clone(&backend)));
    let (requests, queue) = mpsc::channel(16);
    let router = create_router(AppState::new(store, requests));
    Fixture {
        server: TestServer::new(router).unwrap(),
        backend,
        queue,
    }
}

fn system_gate(references: Vec<FeatureReference>) -> FeatureGate {
    FeatureGate::new("tkg-system", references)
}

// =============================================================================
// HEALTH
// =============================================================================

#[tokio::test]
async fn test_health() {
    let f = fixture(Vec::new());
    let response = f.server.get("/health").await;
    response.assert_status_ok();
    let body: HealthResponse = response.json();
    assert_eq!(body.status, "ok");
}

// =============================================================================
// ADMISSION
// =============================================================================

#[tokio::test]
async fn test_validate_create_allowed() {
    let f = fixture(Vec::new());
    let response = f
        .server
        .post("/validate-featuregate")
        .json(&json!({
            "operation": "CREATE",
            "object": {
                "metadata": {"name": "tkg-system"},
                "spec": {"features": [{"name": "bar", "activate": true}]}
            }
        }))
        .await;
    response.assert_status_ok();
    let body: AdmissionResponse = response.json();
    assert!(body.allowed);
    assert!(body.violations.is_empty());
}

#[tokio::test]
async fn test_validate_create_missing_feature() {
    let f = fixture(Vec::new());
    let response = f
        .server
        .post("/validate-featuregate")
        .json(&json!({
            "operation": "CREATE",
            "object": {
                "metadata": {"name": "tkg-system"},
                "spec": {"features": [{"name": "foo", "activate": true}]}
            }
        }))
        .await;
    response.assert_status_ok();
    let body: AdmissionResponse = response.json();
    assert!(!body.allowed);
    assert_eq!(body.violations.len(), 1);
    assert!(body.violations[0].contains("do not exist"));
    assert!(body.violations[0].contains("[foo]"));
}

#[tokio::test]
async fn test_validate_collects_every_violation() {
    let f = fixture(vec![FeatureGate::new(
        "tanzu-fg",
        vec![FeatureReference::new("baz", false)],
    )]);
    let response = f
        .server
        .post("/validate-featuregate")
        .json(&json!({
            "operation": "CREATE",
            "object": {
                "metadata": {"name": "tkg-system"},
                "spec": {"features": [
                    {"name": "baz", "activate": true},
                    {"name": "cloud-event-listener", "activate": false},
                    {"name": "dodgy-experimental-periscope", "activate": true}
                ]}
            }
        }))
        .await;
    let body: AdmissionResponse = response.json();
    assert!(!body.allowed);
    assert_eq!(body.violations.len(), 3);
    assert!(body.violations[0].contains("multiple featuregates"));
    assert!(body.violations[1].contains("permanentlyVoidAllSupportGuarantees to true"));
    assert!(body.violations[2].contains("immutable"));
    assert!(body.message.unwrap().starts_with("FeatureGate tkg-system is invalid"));
}

#[tokio::test]
async fn test_validate_update_ratchet_uses_stored_previous() {
    let f = fixture(vec![system_gate(vec![
        FeatureReference::new("dodgy-experimental-periscope", true).voiding_warranty(),
    ])]);
    let response = f
        .server
        .post("/validate-featuregate")
        .json(&json!({
            "operation": "UPDATE",
            "object": {
                "metadata": {"name": "tkg-system"},
                "spec": {"features": [{
                    "name": "dodgy-experimental-periscope",
                    "activate": false,
                    "permanentlyVoidAllSupportGuarantees": false
                }]}
            }
        }))
        .await;
    let body: AdmissionResponse = response.json();
    assert!(!body.allowed);
    assert!(body.violations[0].contains("once set to true it is permanent"));
}

#[tokio::test]
async fn test_validate_requires_object() {
    let f = fixture(Vec::new());
    let response = f
        .server
        .post("/validate-featuregate")
        .json(&json!({ "operation": "CREATE" }))
        .await;
    response.assert_status(StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_validate_delete_always_allowed() {
    let f = fixture(Vec::new());
    let response = f
        .server
        .post("/validate-featuregate")
        .json(&json!({
            "operation": "DELETE",
            "oldObject": {"metadata": {"name": "tkg-system"}}
        }))
        .await;
    let body: AdmissionResponse = response.json();
    assert!(body.allowed);
}

// =============================================================================
// READS
// =============================================================================

#[tokio::test]
async fn test_list_features_sorted() {
    let f = fixture(Vec::new());
    let features: Vec<Feature> = f.server.get("/features").await.json();
    let names: Vec<&str> = features.iter().map(Feature::name).collect();
    assert_eq!(
        names,
        vec![
            "bar",
            "baz",
            "cloud-event-listener",
            "dodgy-experimental-periscope",
            "specialized-toaster"
        ]
    );
}

#[tokio::test]
async fn test_get_missing_feature_is_404() {
    let f = fixture(Vec::new());
    let response = f.server.get("/features/foo").await;
    response.assert_status(StatusCode::NOT_FOUND);
    let body: ErrorResponse = response.json();
    assert_eq!(body.kind, "NotFound");
    assert!(body.error.contains("foo"));
}

#[tokio::test]
async fn test_get_featuregate() {
    let f = fixture(vec![system_gate(vec![FeatureReference::new("bar", true)])]);
    let gate: FeatureGate = f.server.get("/featuregates/tkg-system").await.json();
    assert!(gate.spec.features[0].activate);
}

// =============================================================================
// TOGGLES
// =============================================================================

#[tokio::test]
async fn test_activate_requires_warranty_consent() {
    let f = fixture(vec![system_gate(vec![FeatureReference::new(
        "dodgy-experimental-periscope",
        false,
    )])]);
    let response = f
        .server
        .post("/features/dodgy-experimental-periscope/activate")
        .json(&json!({}))
        .await;
    response.assert_status(StatusCode::FORBIDDEN);
    let gate = f.backend.get_feature_gate("tkg-system").unwrap().unwrap();
    assert!(!gate.spec.features[0].activate);
}

#[tokio::test]
async fn test_activate_with_consent_enqueues() {
    let mut f = fixture(vec![system_gate(vec![FeatureReference::new(
        "dodgy-experimental-periscope",
        false,
    )])]);
    let response = f
        .server
        .post("/features/dodgy-experimental-periscope/activate")
        .json(&json!({ "permanentlyVoidAllSupportGuarantees": true }))
        .await;
    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    assert_eq!(body["outcome"]["result"], "toggled");
    assert_eq!(body["outcome"]["gate"], "tkg-system");
    assert_eq!(body["outcome"]["warrantyVoided"], true);

    let gate = f.backend.get_feature_gate("tkg-system").unwrap().unwrap();
    assert!(gate.spec.features[0].activate);
    assert!(gate.spec.features[0].permanently_void_all_support_guarantees);
    assert_eq!(
        f.queue.try_recv().unwrap(),
        "dodgy-experimental-periscope"
    );
}

#[tokio::test]
async fn test_deactivate_immutable_is_forbidden() {
    let f = fixture(vec![system_gate(vec![FeatureReference::new(
        "cloud-event-listener",
        true,
    )])]);
    let response = f
        .server
        .post("/features/cloud-event-listener/deactivate")
        .await;
    response.assert_status(StatusCode::FORBIDDEN);
    let body: ErrorResponse = response.json();
    assert!(body.error.contains("immutable"));
}

#[tokio::test]
async fn test_deactivate_already_deactivated_is_unchanged() {
    let mut f = fixture(vec![system_gate(vec![FeatureReference::new("baz", false)])]);
    let response = f.server.post("/features/baz/deactivate").await;
    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    assert_eq!(body["outcome"]["result"], "unchanged");
    assert_eq!(f.queue.try_recv().unwrap(), "baz");
}

#[tokio::test]
async fn test_toggle_unreferenced_feature_is_404() {
    let f = fixture(Vec::new());
    let response = f.server.post("/features/bar/deactivate").await;
    response.assert_status(StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_toggle_multiply_gated_feature_is_409() {
    let f = fixture(vec![
        system_gate(vec![FeatureReference::new("bar", false)]),
        FeatureGate::new("tanzu-fg", vec![FeatureReference::new("bar", false)]),
    ]);
    let response = f
        .server
        .post("/features/bar/activate")
        .json(&json!({}))
        .await;
    response.assert_status(StatusCode::CONFLICT);
    let body: ErrorResponse = response.json();
    assert_eq!(body.kind, "TooMany");
}
