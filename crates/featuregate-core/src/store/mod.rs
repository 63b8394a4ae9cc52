//! # Resource Storage
//!
//! The `ResourceStore` trait is the persistence seam every component is
//! generic over. Two backends ship with the crate:
//!
//! - `MemoryStore`: `RwLock`-guarded `BTreeMap`s, for tests and one-shot use
//! - `RedbStore`: `redb` tables with `postcard`-encoded records
//!
//! `AdmittingStore` wraps either backend and runs the admission validator in
//! front of every FeatureGate create and update.
//!
//! ## Concurrency Contract
//!
//! Every write assigns a new, store-wide monotonic `resource_version`.
//! Updates carry the version that was last read; if the stored version has
//! moved on, the update fails with `FeatureGateError::Conflict` and the
//! caller must re-read. Lists are unfiltered and sorted by name.

mod admitting;
mod memory;
mod redb_store;

pub use admitting::AdmittingStore;
pub use memory::MemoryStore;
pub use redb_store::RedbStore;

use crate::{Feature, FeatureGate, FeatureGateError, ObjectMeta, ResourceKind};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::sync::Arc;

/// Persistence operations for Features and FeatureGates.
pub trait ResourceStore: Send + Sync {
    /// Get a Feature by name. `None` if it does not exist.
    fn get_feature(&self, name: &str) -> Result<Option<Feature>, FeatureGateError>;

    /// All Features, sorted by name.
    fn list_features(&self) -> Result<Vec<Feature>, FeatureGateError>;

    /// Persist a new Feature. Fails with `AlreadyExists` if the name is taken.
    fn create_feature(&self, feature: Feature) -> Result<Feature, FeatureGateError>;

    /// Replace a Feature (spec and status), version-checked.
    fn update_feature(&self, feature: Feature) -> Result<Feature, FeatureGateError>;

    /// Delete a Feature. Returns `false` if it did not exist.
    fn delete_feature(&self, name: &str) -> Result<bool, FeatureGateError>;

    /// Get a FeatureGate by name. `None` if it does not exist.
    fn get_feature_gate(&self, name: &str) -> Result<Option<FeatureGate>, FeatureGateError>;

    /// All FeatureGates, sorted by name.
    fn list_feature_gates(&self) -> Result<Vec<FeatureGate>, FeatureGateError>;

    /// Persist a new FeatureGate. Fails with `AlreadyExists` if the name is taken.
    fn create_feature_gate(&self, gate: FeatureGate) -> Result<FeatureGate, FeatureGateError>;

    /// Replace a FeatureGate spec, version-checked. The stored status is kept.
    fn update_feature_gate(&self, gate: FeatureGate) -> Result<FeatureGate, FeatureGateError>;

    /// Replace a FeatureGate status, version-checked. The stored spec is kept.
    fn update_feature_gate_status(
        &self,
        gate: FeatureGate,
    ) -> Result<FeatureGate, FeatureGateError>;

    /// Delete a FeatureGate. Returns `false` if it did not exist.
    fn delete_feature_gate(&self, name: &str) -> Result<bool, FeatureGateError>;
}

impl<S: ResourceStore + ?Sized> ResourceStore for Arc<S> {
    fn get_feature(&self, name: &str) -> Result<Option<Feature>, FeatureGateError> {
        (**self).get_feature(name)
    }

    fn list_features(&self) -> Result<Vec<Feature>, FeatureGateError> {
        (**self).list_features()
    }

    fn create_feature(&self, feature: Feature) -> Result<Feature, FeatureGateError> {
        (**self).create_feature(feature)
    }

    fn update_feature(&self, feature: Feature) -> Result<Feature, FeatureGateError> {
        (**self).update_feature(feature)
    }

    fn delete_feature(&self, name: &str) -> Result<bool, FeatureGateError> {
        (**self).delete_feature(name)
    }

    fn get_feature_gate(&self, name: &str) -> Result<Option<FeatureGate>, FeatureGateError> {
        (**self).get_feature_gate(name)
    }

    fn list_feature_gates(&self) -> Result<Vec<FeatureGate>, FeatureGateError> {
        (**self).list_feature_gates()
    }

    fn create_feature_gate(&self, gate: FeatureGate) -> Result<FeatureGate, FeatureGateError> {
        (**self).create_feature_gate(gate)
    }

    fn update_feature_gate(&self, gate: FeatureGate) -> Result<FeatureGate, FeatureGateError> {
        (**self).update_feature_gate(gate)
    }

    fn update_feature_gate_status(
        &self,
        gate: FeatureGate,
    ) -> Result<FeatureGate, FeatureGateError> {
        (**self).update_feature_gate_status(gate)
    }

    fn delete_feature_gate(&self, name: &str) -> Result<bool, FeatureGateError> {
        (**self).delete_feature_gate(name)
    }
}

// =============================================================================
// SHARED BACKEND PLUMBING
// =============================================================================

/// A persisted object kind. Lets both backends share one code path.
pub(crate) trait Resource: Clone + Serialize + DeserializeOwned {
    const KIND: ResourceKind;

    fn meta(&self) -> &ObjectMeta;
    fn meta_mut(&mut self) -> &mut ObjectMeta;
}

impl Resource for Feature {
    const KIND: ResourceKind = ResourceKind::Feature;

    fn meta(&self) -> &ObjectMeta {
        &self.metadata
    }

    fn meta_mut(&mut self) -> &mut ObjectMeta {
        &mut self.metadata
    }
}

impl Resource for FeatureGate {
    const KIND: ResourceKind = ResourceKind::FeatureGate;

    fn meta(&self) -> &ObjectMeta {
        &self.metadata
    }

    fn meta_mut(&mut self) -> &mut ObjectMeta {
        &mut self.metadata
    }
}

/// How an update combines the incoming object with the stored one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Merge {
    /// Take the incoming spec, keep the stored status.
    Spec,
    /// Take the incoming status, keep the stored spec.
    Status,
}

/// Apply `merge` to a FeatureGate update.
pub(crate) fn merge_gate(
    stored: &FeatureGate,
    mut incoming: FeatureGate,
    merge: Merge,
) -> FeatureGate {
    match merge {
        Merge::Spec => incoming.status = stored.status.clone(),
        Merge::Status => incoming.spec = stored.spec.clone(),
    }
    incoming
}

/// Fail with `Conflict` unless the incoming object carries the stored version.
pub(crate) fn check_version<R: Resource>(
    stored: &R,
    incoming: &R,
) -> Result<(), FeatureGateError> {
    let expected = incoming.meta().resource_version;
    let found = stored.meta().resource_version;
    if expected != found {
        return Err(FeatureGateError::Conflict {
            kind: R::KIND,
            name: incoming.meta().name.clone(),
            expected,
            found,
        });
    }
    Ok(())
}

pub(crate) fn not_found<R: Resource>(name: &str) -> FeatureGateError {
    FeatureGateError::NotFound {
        kind: R::KIND,
        name: name.to_string(),
    }
}

pub(crate) fn already_exists<R: Resource>(name: &str) -> FeatureGateError {
    FeatureGateError::AlreadyExists {
        kind: R::KIND,
        name: name.to_string(),
    }
}

// =============================================================================
// TESTS
// =============================================================================
