//! # API Request/Response Types
//!
//! This module defines the JSON structures for the HTTP API.

use featuregate_core::{ErrorKind, FeatureGate, ToggleOutcome, Violation};
use serde::{Deserialize, Serialize};

// =============================================================================
// HEALTH RESPONSE
// =============================================================================

/// Health check response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

impl Default for HealthResponse {
    fn default() -> Self {
        Self {
            status: "ok".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

// =============================================================================
// ADMISSION REVIEW
// =============================================================================

/// The mutation being admitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Operation {
    Create,
    Update,
    Delete,
}

/// Admission request for one FeatureGate mutation.
///
/// `object` is required for CREATE and UPDATE. For UPDATE a missing
/// `oldObject` is read from the store instead.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdmissionRequest {
    pub operation: Operation,
    #[serde(default)]
    pub object: Option<FeatureGate>,
    #[serde(default)]
    pub old_object: Option<FeatureGate>,
}

/// Admission verdict.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdmissionResponse {
    pub allowed: bool,
    /// One human-readable entry per violated rule.
    pub violations: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl AdmissionResponse {
    #[must_use]
    pub fn allowed() -> Self {
        Self {
            allowed: true,
            violations: Vec::new(),
            message: None,
        }
    }

    /// Verdict for a list of violations; empty means allowed.
    #[must_use]
    pub fn from_violations(gate: &str, violations: &[Violation]) -> Self {
        if violations.is_empty() {
            return Self::allowed();
        }
        let violations: Vec<String> = violations.iter().map(ToString::to_string).collect();
        Self {
            allowed: false,
            message: Some(format!(
                "FeatureGate {gate} is invalid: {}",
                violations.join("; ")
            )),
            violations,
        }
    }
}

// =============================================================================
// TOGGLES
// =============================================================================

/// Body of `POST /features/{name}/activate`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ActivateRequest {
    pub permanently_void_all_support_guarantees: bool,
}

/// Result of an activate or deactivate call.
#[derive(Debug, Clone, Serialize)]
pub struct ToggleResponse {
    pub feature: String,
    pub outcome: ToggleOutcome,
}

// =============================================================================
// ERRORS
// =============================================================================

/// Body returned with every non-2xx status.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub kind: String,
}

impl ErrorResponse {
    #[must_use]
    pub fn new(kind: ErrorKind, error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            kind: format!("{kind:?}"),
        }
    }
}
