//! # In-Memory Store
//!
//! `BTreeMap` collections behind a single `RwLock`. Reads take the shared
//! lock, writes take the exclusive lock, so version checks and the revision
//! bump are atomic with the write they guard.

use super::{
    Merge, Resource, ResourceStore, already_exists, check_version, merge_gate, not_found,
};
use crate::{Feature, FeatureGate, FeatureGateError};
use std::collections::BTreeMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

#[derive(Debug, Default)]
struct Collections {
    features: BTreeMap<String, Feature>,
    gates: BTreeMap<String, FeatureGate>,
    revision: u64,
}

/// A volatile `ResourceStore`.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: RwLock<Collections>,
}

impl MemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Collections>, FeatureGateError> {
        self.inner
            .read()
            .map_err(|e| FeatureGateError::storage("read store", e))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Collections>, FeatureGateError> {
        self.inner
            .write()
            .map_err(|e| FeatureGateError::storage("write store", e))
    }
}

fn create<R: Resource>(
    map: &mut BTreeMap<String, R>,
    revision: &mut u64,
    mut resource: R,
) -> Result<R, FeatureGateError> {
    let name = resource.meta().name.clone();
    if map.contains_key(&name) {
        return Err(already_exists::<R>(&name));
    }
    *revision += 1;
    resource.meta_mut().resource_version = *revision;
    map.insert(name, resource.clone());
    Ok(resource)
}

fn update<R: Resource>(
    map: &mut BTreeMap<String, R>,
    revision: &mut u64,
    incoming: R,
    merge: impl FnOnce(&R, R) -> R,
) -> Result<R, FeatureGateError> {
    let name = incoming.meta().name.clone();
    let stored = map.get(&name).ok_or_else(|| not_found::<R>(&name))?;
    check_version(stored, &incoming)?;

    let mut merged = merge(stored, incoming);
    *revision += 1;
    merged.meta_mut().resource_version = *revision;
    map.insert(name, merged.clone());
    Ok(merged)
}

impl ResourceStore for MemoryStore {
    fn get_feature(&self, name: &str) -> Result<Option<Feature>, FeatureGateError> {
        Ok(self.read()?.features.get(name).cloned())
    }

    fn list_features(&self) -> Result<Vec<Feature>, FeatureGateError> {
        Ok(self.read()?.features.values().cloned().collect())
    }

    fn create_feature(&self, feature: Feature) -> Result<Feature, FeatureGateError> {
        let mut guard = self.write()?;
        let Collections {
            features, revision, ..
        } = &mut *guard;
        create(features, revision, feature)
    }

    fn update_feature(&self, feature: Feature) -> Result<Feature, FeatureGateError> {
        let mut guard = self.write()?;
        let Collections {
            features, revision, ..
        } = &mut *guard;
        update(features, revision, feature, |_, incoming| incoming)
    }

    fn delete_feature(&self, name: &str) -> Result<bool, FeatureGateError> {
        Ok(self.write()?.features.remove(name).is_some())
    }

    fn get_feature_gate(&self, name: &str) -> Result<Option<FeatureGate>, FeatureGateError> {
        Ok(self.read()?.gates.get(name).cloned())
    }

    fn list_feature_gates(&self) -> Result<Vec<FeatureGate>, FeatureGateError> {
        Ok(self.read()?.gates.values().cloned().collect())
    }

    fn create_feature_gate(&self, gate: FeatureGate) -> Result<FeatureGate, FeatureGateError> {
        let mut guard = self.write()?;
        let Collections {
            gates, revision, ..
        } = &mut *guard;
        create(gates, revision, gate)
    }

    fn update_feature_gate(&self, gate: FeatureGate) -> Result<FeatureGate, FeatureGateError> {
        let mut guard = self.write()?;
        let Collections {
            gates, revision, ..
        } = &mut *guard;
        update(gates, revision, gate, |stored, incoming| {
            merge_gate(stored, incoming, Merge::Spec)
        })
    }

    fn update_feature_gate_status(
        &self,
        gate: FeatureGate,
    ) -> Result<FeatureGate, FeatureGateError> {
        let mut guard = self.write()?;
        let Collections {
            gates, revision, ..
        } = &mut *guard;
        update(gates, revision, gate, |stored, incoming| {
            merge_gate(stored, incoming, Merge::Status)
        })
    }

    fn delete_feature_gate(&self, name: &str) -> Result<bool, FeatureGateError> {
        Ok(self.write()?.gates.remove(name).is_some())
    }
}
