//! # Admitting Store
//!
//! Wraps a `ResourceStore` so every FeatureGate create and spec update passes
//! the admission validator first. Status writes and deletes are not admitted;
//! they belong to the reconciler and to whoever owns the gate.

use super::ResourceStore;
use crate::admission::AdmissionValidator;
use crate::{Feature, FeatureGate, FeatureGateError};
use std::sync::Arc;

/// A `ResourceStore` that validates FeatureGate mutations before writing them.
#[derive(Debug)]
pub struct AdmittingStore<S> {
    inner: Arc<S>,
    validator: AdmissionValidator<Arc<S>>,
}

impl<S> Clone for AdmittingStore<S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            validator: self.validator.clone(),
        }
    }
}

impl<S: ResourceStore> AdmittingStore<S> {
    pub fn new(inner: S) -> Self {
        Self::from_shared(Arc::new(inner))
    }

    /// Wrap a store that other components also hold.
    pub fn from_shared(inner: Arc<S>) -> Self {
        Self {
            validator: AdmissionValidator::new(Arc::clone(&inner)),
            inner,
        }
    }

    /// The unvalidated backend.
    #[must_use]
    pub fn inner(&self) -> &Arc<S> {
        &self.inner
    }

    #[must_use]
    pub fn validator(&self) -> &AdmissionValidator<Arc<S>> {
        &self.validator
    }
}

impl<S: ResourceStore> ResourceStore for AdmittingStore<S> {
    fn get_feature(&self, name: &str) -> Result<Option<Feature>, FeatureGateError> {
        self.inner.get_feature(name)
    }

    fn list_features(&self) -> Result<Vec<Feature>, FeatureGateError> {
        self.inner.list_features()
    }

    fn create_feature(&self, feature: Feature) -> Result<Feature, FeatureGateError> {
        self.inner.create_feature(feature)
    }

    fn update_feature(&self, feature: Feature) -> Result<Feature, FeatureGateError> {
        self.inner.update_feature(feature)
    }

    fn delete_feature(&self, name: &str) -> Result<bool, FeatureGateError> {
        self.inner.delete_feature(name)
    }

    fn get_feature_gate(&self, name: &str) -> Result<Option<FeatureGate>, FeatureGateError> {
        self.inner.get_feature_gate(name)
    }

    fn list_feature_gates(&self) -> Result<Vec<FeatureGate>, FeatureGateError> {
        self.inner.list_feature_gates()
    }

    fn create_feature_gate(&self, gate: FeatureGate) -> Result<FeatureGate, FeatureGateError> {
        self.validator.validate_create(&gate)?;
        self.inner.create_feature_gate(gate)
    }

    fn update_feature_gate(&self, gate: FeatureGate) -> Result<FeatureGate, FeatureGateError> {
        let previous = self
            .inner
            .get_feature_gate(gate.name())?
            .ok_or_else(|| FeatureGateError::gate_not_found(gate.name()))?;
        self.validator.validate_update(&gate, &previous)?;
        self.inner.update_feature_gate(gate)
    }

    fn update_feature_gate_status(
        &self,
        gate: FeatureGate,
    ) -> Result<FeatureGate, FeatureGateError> {
        self.inner.update_feature_gate_status(gate)
    }

    fn delete_feature_gate(&self, name: &str) -> Result<bool, FeatureGateError> {
        if let Some(gate) = self.inner.get_feature_gate(name)? {
            self.validator.validate_delete(&gate)?;
        }
        self.inner.delete_feature_gate(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ErrorKind, FeatureReference, MemoryStore, StabilityLevel};

    fn store() -> AdmittingStore<MemoryStore> {
        let store = AdmittingStore::new(MemoryStore::new());
        store
            .create_feature(Feature::new("bax", "", StabilityLevel::Stable))
            .expect("seed");
        store
    }

    #[test]
    fn rejected_create_writes_nothing() {
        let store = store();
        let err = store
            .create_feature_gate(FeatureGate::new(
                "tkg-system",
                vec![FeatureReference::new("bax", false)],
            ))
            .expect_err("immutable");
        assert_eq!(err.kind(), ErrorKind::Invalid);
        assert!(store.get_feature_gate("tkg-system").expect("get").is_none());
    }

    #[test]
    fn rejected_update_keeps_stored_spec() {
        let store = store();
        let gate = store
            .create_feature_gate(FeatureGate::new(
                "tkg-system",
                vec![FeatureReference::new("bax", true)],
            ))
            .expect("create");

        let mut flipped = gate.clone();
        flipped.spec.features[0].activate = false;
        store.update_feature_gate(flipped).expect_err("immutable");

        let stored = store
            .get_feature_gate("tkg-system")
            .expect("get")
            .expect("present");
        assert!(stored.spec.features[0].activate);
    }

    #[test]
    fn status_writes_bypass_admission() {
        let store = store();
        let gate = store
            .create_feature_gate(FeatureGate::new(
                "tkg-system",
                vec![FeatureReference::new("bax", true)],
            ))
            .expect("create");
        // The Feature disappears; the gate is now inadmissible but its
        // status must still be writable.
        store.delete_feature("bax").expect("delete");
        store.update_feature_gate_status(gate).expect("status");
    }
}
