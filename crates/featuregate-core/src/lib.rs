//! # featuregate-core
//!
//! The stability-policy engine for Feature gating - THE LOGIC.
//!
//! A `Feature` is a named, optional capability with a `StabilityLevel`. A
//! `FeatureGate` holds activation intents (`FeatureReference`s) for a set of
//! Features. This crate decides which intents are legal and converges the
//! observed activation state with them.
//!
//! ## Components
//!
//! - `policy`: the static StabilityLevel → Policy table
//! - `admission`: synchronous validation of FeatureGate create/update
//! - `reconciler`: per-Feature convergence of Feature and FeatureGate status
//! - `client`: imperative activate/deactivate for out-of-band callers
//! - `invariants`: set computations shared by the three paths above
//! - `store`: the `ResourceStore` seam plus in-memory and redb backends
//!
//! ## Architectural Constraints
//!
//! - NO async, NO network dependencies (pure Rust)
//! - Deterministic ordering everywhere (`BTreeMap`/`BTreeSet`)
//! - Storage is injected; there is no process-wide client

// =============================================================================
// MODULES
// =============================================================================

pub mod admission;
pub mod client;
pub mod formats;
pub mod invariants;
pub mod policy;
pub mod primitives;
pub mod reconciler;
pub mod store;
pub mod types;

// =============================================================================
// RE-EXPORTS: Core Types (from types module)
// =============================================================================

pub use types::{
    ErrorKind, Feature, FeatureGate, FeatureGateError, FeatureGateSpec, FeatureGateStatus,
    FeatureReference, FeatureReferenceResult, FeatureSpec, FeatureStatus, ObjectMeta,
    ReferenceStatus, ResourceKind, StabilityLevel, Violation,
};

// =============================================================================
// RE-EXPORTS: Policy Engine
// =============================================================================

pub use admission::{AdmissionValidator, compute_violations};
pub use client::{FeatureGateClient, ToggleOutcome};
pub use invariants::{Evaluation, NameSet, evaluate};
pub use policy::{Policy, policy_for};
pub use reconciler::{ReconcileOutcome, ReconcileReport, Reconciler, feature_requests_for_gate};

// =============================================================================
// RE-EXPORTS: Storage
// =============================================================================

pub use store::{AdmittingStore, MemoryStore, RedbStore, ResourceStore};
