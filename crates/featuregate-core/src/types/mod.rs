//! # Core Type Definitions
//!
//! This module contains the resource types governed by the policy engine:
//! - Object identity (`ObjectMeta`, `ResourceKind`)
//! - Features (`Feature`, `FeatureSpec`, `FeatureStatus`, `StabilityLevel`)
//! - FeatureGates (`FeatureGate`, `FeatureReference`, `FeatureReferenceResult`)
//! - Admission violations (`Violation`)
//! - Error types (`FeatureGateError`, `ErrorKind`)
//!
//! ## Determinism Guarantees
//!
//! FeatureGate results are held in a `BTreeMap` keyed by Feature name and are
//! serialized as a sequence sorted by that name. Two stores holding the same
//! logical state therefore serialize identical bytes.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

// =============================================================================
// OBJECT IDENTITY
// =============================================================================

/// The two resource collections the engine reads and writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ResourceKind {
    Feature,
    FeatureGate,
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Feature => f.write_str("Feature"),
            Self::FeatureGate => f.write_str("FeatureGate"),
        }
    }
}

/// Identity and revision of a persisted object.
///
/// `resource_version` is assigned by the store on every write. Updates must
/// carry the version that was last read; a mismatch is a write conflict.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectMeta {
    pub name: String,
    #[serde(default)]
    pub resource_version: u64,
}

impl ObjectMeta {
    /// Metadata for an object that has not been persisted yet.
    #[must_use]
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            resource_version: 0,
        }
    }
}

// =============================================================================
// STABILITY LEVEL
// =============================================================================

/// Maturity classification of a Feature.
///
/// The serialized names are the human-readable labels ("Technical Preview",
/// not "TechnicalPreview"). Any label outside the known five decodes to
/// `Unrecognized`, whose policy fails closed (see `policy::policy_for`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum StabilityLevel {
    #[serde(rename = "Work In Progress")]
    WorkInProgress,
    Experimental,
    #[serde(rename = "Technical Preview")]
    TechnicalPreview,
    Stable,
    Deprecated,
    #[serde(other)]
    Unrecognized,
}

impl StabilityLevel {
    /// All recognized levels, in maturity order.
    pub const ALL: [Self; 5] = [
        Self::WorkInProgress,
        Self::Experimental,
        Self::TechnicalPreview,
        Self::Stable,
        Self::Deprecated,
    ];

    /// The label used on the wire and in messages.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::WorkInProgress => "Work In Progress",
            Self::Experimental => "Experimental",
            Self::TechnicalPreview => "Technical Preview",
            Self::Stable => "Stable",
            Self::Deprecated => "Deprecated",
            Self::Unrecognized => "Unrecognized",
        }
    }
}

impl fmt::Display for StabilityLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for StabilityLevel {
    type Err = FeatureGateError;

    /// Parse either the wire label or its compact form ("technical-preview",
    /// "TechnicalPreview"). Unknown input is an error here; only decoding of
    /// persisted data maps it to `Unrecognized`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let compact: String = s
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .map(|c| c.to_ascii_lowercase())
            .collect();
        match compact.as_str() {
            "workinprogress" => Ok(Self::WorkInProgress),
            "experimental" => Ok(Self::Experimental),
            "technicalpreview" => Ok(Self::TechnicalPreview),
            "stable" => Ok(Self::Stable),
            "deprecated" => Ok(Self::Deprecated),
            _ => Err(FeatureGateError::DeserializationError(format!(
                "unknown stability level: {s}"
            ))),
        }
    }
}

// =============================================================================
// FEATURE
// =============================================================================

/// Desired, externally owned attributes of a Feature.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeatureSpec {
    #[serde(default)]
    pub description: String,
    pub stability: StabilityLevel,
}

/// Observed state of a Feature. Written only by the reconciler.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeatureStatus {
    #[serde(default)]
    pub activated: bool,
}

/// A named, toggleable capability.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Feature {
    pub metadata: ObjectMeta,
    pub spec: FeatureSpec,
    #[serde(default)]
    pub status: FeatureStatus,
}

impl Feature {
    /// Create an unpersisted Feature with the default (deactivated) status.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        stability: StabilityLevel,
    ) -> Self {
        Self {
            metadata: ObjectMeta::named(name),
            spec: FeatureSpec {
                description: description.into(),
                stability,
            },
            status: FeatureStatus::default(),
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.metadata.name
    }
}

// =============================================================================
// FEATURE GATE
// =============================================================================

/// One activation intent inside a FeatureGate spec.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeatureReference {
    pub name: String,
    #[serde(default)]
    pub activate: bool,
    /// Consent to deviate from a warranty-voiding default. Ratchet: may be
    /// raised, never lowered.
    #[serde(default)]
    pub permanently_void_all_support_guarantees: bool,
    /// Stored and round-tripped but not consulted by any rule.
    #[serde(default)]
    pub skip_stability_validation: bool,
}

impl FeatureReference {
    #[must_use]
    pub fn new(name: impl Into<String>, activate: bool) -> Self {
        Self {
            name: name.into(),
            activate,
            ..Self::default()
        }
    }

    /// Builder-style setter for the warranty-void consent flag.
    #[must_use]
    pub fn voiding_warranty(mut self) -> Self {
        self.permanently_void_all_support_guarantees = true;
        self
    }
}

/// Outcome class of a FeatureReference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ReferenceStatus {
    #[serde(rename = "applied")]
    Applied,
    #[serde(rename = "no-op")]
    NoOp,
    #[serde(rename = "invalid")]
    Invalid,
}

impl fmt::Display for ReferenceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Applied => f.write_str("applied"),
            Self::NoOp => f.write_str("no-op"),
            Self::Invalid => f.write_str("invalid"),
        }
    }
}

/// Per-Feature result recorded in a FeatureGate status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureReferenceResult {
    pub name: String,
    pub status: ReferenceStatus,
    pub message: String,
}

/// Desired state of a FeatureGate: an ordered list of intents.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeatureGateSpec {
    #[serde(default)]
    pub features: Vec<FeatureReference>,
}

/// Observed state of a FeatureGate.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeatureGateStatus {
    /// Results keyed by Feature name, serialized as a name-sorted sequence.
    #[serde(
        rename = "featureReferenceResults",
        default,
        with = "results_as_sequence"
    )]
    pub results: BTreeMap<String, FeatureReferenceResult>,
}

impl FeatureGateStatus {
    /// Insert or replace the result for `result.name`.
    ///
    /// Returns `true` when the stored status changed.
    pub fn upsert(&mut self, result: FeatureReferenceResult) -> bool {
        match self.results.get(&result.name) {
            Some(existing) if *existing == result => false,
            _ => {
                self.results.insert(result.name.clone(), result);
                true
            }
        }
    }

    /// Drop the result for `feature`. Returns `true` if one was present.
    pub fn remove(&mut self, feature: &str) -> bool {
        self.results.remove(feature).is_some()
    }

    #[must_use]
    pub fn get(&self, feature: &str) -> Option<&FeatureReferenceResult> {
        self.results.get(feature)
    }
}

mod results_as_sequence {
    use super::FeatureReferenceResult;
    use serde::{Deserialize, Deserializer, Serializer};
    use std::collections::BTreeMap;

    pub fn serialize<S: Serializer>(
        results: &BTreeMap<String, FeatureReferenceResult>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(results.values())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<BTreeMap<String, FeatureReferenceResult>, D::Error> {
        let list = Vec::<FeatureReferenceResult>::deserialize(deserializer)?;
        Ok(list.into_iter().map(|r| (r.name.clone(), r)).collect())
    }
}

/// A named collection of activation intents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeatureGate {
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub spec: FeatureGateSpec,
    #[serde(default)]
    pub status: FeatureGateStatus,
}

impl FeatureGate {
    /// Create an unpersisted FeatureGate with the given intents.
    #[must_use]
    pub fn new(name: impl Into<String>, features: Vec<FeatureReference>) -> Self {
        Self {
            metadata: ObjectMeta::named(name),
            spec: FeatureGateSpec { features },
            status: FeatureGateStatus::default(),
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.metadata.name
    }

    /// The first spec entry for `feature`, if any.
    #[must_use]
    pub fn reference(&self, feature: &str) -> Option<&FeatureReference> {
        self.spec.features.iter().find(|r| r.name == feature)
    }

    #[must_use]
    pub fn reference_mut(&mut self, feature: &str) -> Option<&mut FeatureReference> {
        self.spec.features.iter_mut().find(|r| r.name == feature)
    }

    /// Whether the spec holds an intent for `feature`.
    #[must_use]
    pub fn gates(&self, feature: &str) -> bool {
        self.reference(feature).is_some()
    }

    /// Whether the status still carries a result for `feature`.
    #[must_use]
    pub fn reports(&self, feature: &str) -> bool {
        self.status.results.contains_key(feature)
    }
}

// =============================================================================
// ADMISSION VIOLATIONS
// =============================================================================

/// A class of admission failure with the Feature names that triggered it.
///
/// Name lists are sorted and de-duplicated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Violation {
    /// Referenced Features that do not exist.
    Existence(Vec<String>),
    /// Features referenced more than once by the same gate.
    Duplicate(Vec<String>),
    /// Features already gated by a different FeatureGate.
    Conflict(Vec<String>),
    /// Consent flags lowered from true to false.
    Ratchet(Vec<String>),
    /// Deviations from a warranty-voiding default without consent.
    Warranty(Vec<String>),
    /// Deviations from the default of an immutable Feature.
    Immutable(Vec<String>),
}

impl Violation {
    #[must_use]
    pub fn features(&self) -> &[String] {
        match self {
            Self::Existence(names)
            | Self::Duplicate(names)
            | Self::Conflict(names)
            | Self::Ratchet(names)
            | Self::Warranty(names)
            | Self::Immutable(names) => names,
        }
    }
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names = format!("[{}]", self.features().join(", "));
        match self {
            Self::Existence(_) => write!(
                f,
                "some features in the FeatureGate spec do not exist in cluster: {names}"
            ),
            Self::Duplicate(_) => write!(
                f,
                "features {names} are referenced more than once in the FeatureGate spec"
            ),
            Self::Conflict(_) => {
                write!(f, "features {names} cannot be gated by multiple featuregates")
            }
            Self::Ratchet(_) => write!(
                f,
                "cannot set permanentlyVoidAllSupportGuarantees back to false for features {names}: \
                 once set to true it is permanent"
            ),
            Self::Warranty(_) => write!(
                f,
                "cannot toggle features {names} as the stability level of the features indicate \
                 that it should not be activated in production environments. To activate the \
                 feature, you must agree to permanently void all support guarantees for this \
                 environment by setting featureRef.permanentlyVoidAllSupportGuarantees to true"
            ),
            Self::Immutable(_) => write!(f, "cannot toggle immutable features: {names}"),
        }
    }
}

// =============================================================================
// ERROR TYPES
// =============================================================================

/// Coarse classification of a `FeatureGateError`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// A Feature or FeatureGate (or the gate owning a Feature) is missing.
    NotFound,
    /// Create of an object that already exists.
    AlreadyExists,
    /// A stability policy forbids the toggle.
    Forbidden,
    /// The exclusivity invariant is broken.
    TooMany,
    /// Optimistic concurrency check failed; re-read and retry.
    Conflict,
    /// Admission rejected the whole mutation.
    Invalid,
    /// Store I/O or encoding failure.
    Internal,
}

/// Errors that can occur in the FeatureGate engine.
///
/// - No silent failures
/// - Store errors are never swallowed; they carry the failing operation
/// - Policy violations in the reconciler are NOT errors (they become
///   `invalid` results)
#[derive(Debug, Error)]
pub enum FeatureGateError {
    /// The named object does not exist.
    #[error("{kind} {name} not found")]
    NotFound { kind: ResourceKind, name: String },

    /// The Feature exists but no FeatureGate references it.
    #[error("Feature {feature} is not referenced by any FeatureGate")]
    Unreferenced { feature: String },

    /// The named object already exists.
    #[error("{kind} {name} already exists")]
    AlreadyExists { kind: ResourceKind, name: String },

    /// The object changed since it was read.
    #[error(
        "{kind} {name} was modified concurrently (read version {expected}, stored version {found})"
    )]
    Conflict {
        kind: ResourceKind,
        name: String,
        expected: u64,
        found: u64,
    },

    /// A stability policy forbids the operation.
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// More than one FeatureGate references the Feature.
    #[error("Feature {feature} is gated by more than one FeatureGate: [{}]", .gates.join(", "))]
    TooMany { feature: String, gates: Vec<String> },

    /// Admission rejected the FeatureGate.
    #[error("FeatureGate {gate} is invalid: {}", join_violations(.violations))]
    Invalid {
        gate: String,
        violations: Vec<Violation>,
    },

    /// The store failed to perform an operation.
    #[error("could not {operation}: {message}")]
    Storage { operation: String, message: String },

    /// A serialization error occurred.
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// A deserialization error occurred.
    #[error("Deserialization error: {0}")]
    DeserializationError(String),

    /// An error annotated with the operation that produced it.
    #[error("{context}: {source}")]
    Context {
        context: String,
        #[source]
        source: Box<FeatureGateError>,
    },
}

fn join_violations(violations: &[Violation]) -> String {
    violations
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

impl FeatureGateError {
    /// Shorthand for `NotFound` on a Feature.
    #[must_use]
    pub fn feature_not_found(name: impl Into<String>) -> Self {
        Self::NotFound {
            kind: ResourceKind::Feature,
            name: name.into(),
        }
    }

    /// Shorthand for `NotFound` on a FeatureGate.
    #[must_use]
    pub fn gate_not_found(name: impl Into<String>) -> Self {
        Self::NotFound {
            kind: ResourceKind::FeatureGate,
            name: name.into(),
        }
    }

    /// Shorthand for a store failure.
    #[must_use]
    pub fn storage(operation: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::Storage {
            operation: operation.into(),
            message: message.to_string(),
        }
    }

    /// Wrap this error with the operation that was being attempted.
    #[must_use]
    pub fn context(self, context: impl Into<String>) -> Self {
        Self::Context {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// The taxonomy class, looking through any context wrappers.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound { .. } | Self::Unreferenced { .. } => ErrorKind::NotFound,
            Self::AlreadyExists { .. } => ErrorKind::AlreadyExists,
            Self::Conflict { .. } => ErrorKind::Conflict,
            Self::Forbidden(_) => ErrorKind::Forbidden,
            Self::TooMany { .. } => ErrorKind::TooMany,
            Self::Invalid { .. } => ErrorKind::Invalid,
            Self::Storage { .. } | Self::SerializationError(_) | Self::DeserializationError(_) => {
                ErrorKind::Internal
            }
            Self::Context { source, .. } => source.kind(),
        }
    }

    /// Whether re-reading and retrying may succeed.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self.kind(), ErrorKind::Conflict | ErrorKind::Internal)
    }

    /// Admission violations, if this is (or wraps) an `Invalid` error.
    #[must_use]
    pub fn violations(&self) -> &[Violation] {
        match self {
            Self::Invalid { violations, .. } => violations,
            Self::Context { source, .. } => source.violations(),
            _ => &[],
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn result(name: &str, status: ReferenceStatus) -> FeatureReferenceResult {
        FeatureReferenceResult {
            name: name.to_string(),
            status,
            message: String::new(),
        }
    }

    #[test]
    fn stability_level_wire_labels() {
        let json = serde_json::to_string(&StabilityLevel::TechnicalPreview).expect("encode");
        assert_eq!(json, "\"Technical Preview\"");

        let level: StabilityLevel = serde_json::from_str("\"Work In Progress\"").expect("decode");
        assert_eq!(level, StabilityLevel::WorkInProgress);
    }

    #[test]
    fn unknown_stability_label_decodes_to_unrecognized() {
        let level: StabilityLevel = serde_json::from_str("\"Beta\"").expect("decode");
        assert_eq!(level, StabilityLevel::Unrecognized);
    }

    #[test]
    fn stability_level_from_str_accepts_compact_forms() {
        assert_eq!(
            "technical-preview".parse::<StabilityLevel>().expect("parse"),
            StabilityLevel::TechnicalPreview
        );
        assert_eq!(
            "Work In Progress".parse::<StabilityLevel>().expect("parse"),
            StabilityLevel::WorkInProgress
        );
        assert!("beta".parse::<StabilityLevel>().is_err());
    }

    #[test]
    fn status_upsert_reports_change_only_once() {
        let mut status = FeatureGateStatus::default();
        assert!(status.upsert(result("foo", ReferenceStatus::Applied)));
        assert!(!status.upsert(result("foo", ReferenceStatus::Applied)));
        assert!(status.upsert(result("foo", ReferenceStatus::Invalid)));
        assert_eq!(status.results.len(), 1);
        assert!(status.remove("foo"));
        assert!(!status.remove("foo"));
    }

    #[test]
    fn results_serialize_as_sorted_sequence() {
        let mut gate = FeatureGate::new("tkg-system", Vec::new());
        gate.status.upsert(result("zeta", ReferenceStatus::Applied));
        gate.status.upsert(result("alpha", ReferenceStatus::Invalid));

        let value = serde_json::to_value(&gate).expect("encode");
        let results = value["status"]["featureReferenceResults"]
            .as_array()
            .expect("array");
        assert_eq!(results[0]["name"], "alpha");
        assert_eq!(results[0]["status"], "invalid");
        assert_eq!(results[1]["name"], "zeta");

        let back: FeatureGate = serde_json::from_value(value).expect("decode");
        assert_eq!(back, gate);
    }

    #[test]
    fn feature_reference_camel_case_fields() {
        let json = r#"{"name":"foo","activate":true,"permanentlyVoidAllSupportGuarantees":true}"#;
        let reference: FeatureReference = serde_json::from_str(json).expect("decode");
        assert!(reference.activate);
        assert!(reference.permanently_void_all_support_guarantees);
        assert!(!reference.skip_stability_validation);
    }

    #[test]
    fn error_kind_looks_through_context() {
        let err = FeatureGateError::feature_not_found("foo").context("could not get Feature foo");
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert!(!err.is_retryable());
        assert!(err.to_string().contains("Feature foo not found"));

        let conflict = FeatureGateError::Conflict {
            kind: ResourceKind::FeatureGate,
            name: "tkg-system".to_string(),
            expected: 1,
            found: 2,
        };
        assert!(conflict.is_retryable());
    }

    #[test]
    fn invalid_error_lists_every_violation() {
        let err = FeatureGateError::Invalid {
            gate: "tkg-system".to_string(),
            violations: vec![
                Violation::Existence(vec!["ghost".to_string()]),
                Violation::Immutable(vec!["bax".to_string()]),
            ],
        };
        let message = err.to_string();
        assert!(message.contains("do not exist in cluster: [ghost]"));
        assert!(message.contains("cannot toggle immutable features: [bax]"));
        assert_eq!(err.violations().len(), 2);
    }
}
