//! # redb-backed Resource Storage
//!
//! A disk-backed `ResourceStore` using the redb embedded database:
//! - ACID transactions
//! - Crash safety (copy-on-write B-trees)
//! - MVCC (concurrent readers, single writer)
//!
//! Objects are stored as record-format bytes (see `formats::record`) keyed by
//! name. The store-wide revision counter lives in the metadata table and is
//! bumped inside the same write transaction that checks the version, so a
//! conflicting writer always observes the committed revision.

use super::{
    Merge, Resource, ResourceStore, already_exists, check_version, merge_gate, not_found,
};
use crate::formats::{decode_record, encode_record};
use crate::{Feature, FeatureGate, FeatureGateError};
use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition};
use std::path::Path;

/// A table of record-format objects keyed by name.
type ObjectTable = TableDefinition<'static, &'static str, &'static [u8]>;

/// Table for Features: name -> record bytes
const FEATURES: ObjectTable = TableDefinition::new("features");

/// Table for FeatureGates: name -> record bytes
const FEATURE_GATES: ObjectTable = TableDefinition::new("feature_gates");

/// Table for metadata: key string -> value u64
const METADATA: TableDefinition<&str, u64> = TableDefinition::new("metadata");

const REVISION_KEY: &str = "revision";

/// A persistent `ResourceStore` backed by redb.
pub struct RedbStore {
    db: Database,
}

impl std::fmt::Debug for RedbStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedbStore").finish_non_exhaustive()
    }
}

impl RedbStore {
    /// Open or create a store at the given path.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, FeatureGateError> {
        let db = Database::create(path.as_ref())
            .map_err(|e| FeatureGateError::storage("open database", e))?;

        // Initialize tables if they don't exist
        {
            let write_txn = db
                .begin_write()
                .map_err(|e| FeatureGateError::storage("initialize tables", e))?;
            let _ = write_txn
                .open_table(FEATURES)
                .map_err(|e| FeatureGateError::storage("initialize tables", e))?;
            let _ = write_txn
                .open_table(FEATURE_GATES)
                .map_err(|e| FeatureGateError::storage("initialize tables", e))?;
            let _ = write_txn
                .open_table(METADATA)
                .map_err(|e| FeatureGateError::storage("initialize tables", e))?;
            write_txn
                .commit()
                .map_err(|e| FeatureGateError::storage("initialize tables", e))?;
        }

        Ok(Self { db })
    }

    /// The last revision assigned by this store.
    pub fn revision(&self) -> Result<u64, FeatureGateError> {
        let read_txn = self
            .db
            .begin_read()
            .map_err(|e| FeatureGateError::storage("read revision", e))?;
        let table = read_txn
            .open_table(METADATA)
            .map_err(|e| FeatureGateError::storage("read revision", e))?;
        Ok(table
            .get(REVISION_KEY)
            .map_err(|e| FeatureGateError::storage("read revision", e))?
            .map(|v| v.value())
            .unwrap_or(0))
    }

    fn get<R: Resource>(
        &self,
        definition: ObjectTable,
        name: &str,
    ) -> Result<Option<R>, FeatureGateError> {
        let op = format!("get {} {name}", R::KIND);
        let read_txn = self
            .db
            .begin_read()
            .map_err(|e| FeatureGateError::storage(&op, e))?;
        let table = read_txn
            .open_table(definition)
            .map_err(|e| FeatureGateError::storage(&op, e))?;

        match table
            .get(name)
            .map_err(|e| FeatureGateError::storage(&op, e))?
        {
            Some(data) => Ok(Some(decode_record(data.value())?)),
            None => Ok(None),
        }
    }

    fn list<R: Resource>(
        &self,
        definition: ObjectTable,
    ) -> Result<Vec<R>, FeatureGateError> {
        let op = format!("list {}s", R::KIND);
        let read_txn = self
            .db
            .begin_read()
            .map_err(|e| FeatureGateError::storage(&op, e))?;
        let table = read_txn
            .open_table(definition)
            .map_err(|e| FeatureGateError::storage(&op, e))?;

        let mut resources = Vec::new();
        for entry in table
            .iter()
            .map_err(|e| FeatureGateError::storage(&op, e))?
        {
            let (_, value) = entry.map_err(|e| FeatureGateError::storage(&op, e))?;
            resources.push(decode_record(value.value())?);
        }
        Ok(resources)
    }

    /// Write `incoming` under a fresh revision.
    ///
    /// `prepare` sees the currently stored object (if any) and returns the
    /// object to persist, or an error that aborts the transaction.
    fn write<R: Resource>(
        &self,
        definition: ObjectTable,
        op: &str,
        incoming: R,
        prepare: impl FnOnce(Option<R>, R) -> Result<R, FeatureGateError>,
    ) -> Result<R, FeatureGateError> {
        let name = incoming.meta().name.clone();
        let write_txn = self
            .db
            .begin_write()
            .map_err(|e| FeatureGateError::storage(op, e))?;

        let written = {
            let mut table = write_txn
                .open_table(definition)
                .map_err(|e| FeatureGateError::storage(op, e))?;
            let mut meta = write_txn
                .open_table(METADATA)
                .map_err(|e| FeatureGateError::storage(op, e))?;

            let stored: Option<R> = match table
                .get(name.as_str())
                .map_err(|e| FeatureGateError::storage(op, e))?
            {
                Some(data) => Some(decode_record(data.value())?),
                None => None,
            };
            let mut resource = prepare(stored, incoming)?;

            let revision = meta
                .get(REVISION_KEY)
                .map_err(|e| FeatureGateError::storage(op, e))?
                .map(|v| v.value())
                .unwrap_or(0)
                + 1;
            resource.meta_mut().resource_version = revision;

            let bytes = encode_record(&resource)?;
            table
                .insert(name.as_str(), bytes.as_slice())
                .map_err(|e| FeatureGateError::storage(op, e))?;
            meta.insert(REVISION_KEY, revision)
                .map_err(|e| FeatureGateError::storage(op, e))?;
            resource
        };

        write_txn
            .commit()
            .map_err(|e| FeatureGateError::storage(op, e))?;
        Ok(written)
    }

    fn create<R: Resource>(
        &self,
        definition: ObjectTable,
        resource: R,
    ) -> Result<R, FeatureGateError> {
        let op = format!("create {} {}", R::KIND, resource.meta().name);
        self.write(definition, &op, resource, |stored, incoming| match stored {
            Some(existing) => Err(already_exists::<R>(&existing.meta().name)),
            None => Ok(incoming),
        })
    }

    fn update<R: Resource>(
        &self,
        definition: ObjectTable,
        resource: R,
        merge: impl FnOnce(&R, R) -> R,
    ) -> Result<R, FeatureGateError> {
        let op = format!("update {} {}", R::KIND, resource.meta().name);
        self.write(definition, &op, resource, |stored, incoming| {
            let stored = stored.ok_or_else(|| not_found::<R>(&incoming.meta().name))?;
            check_version(&stored, &incoming)?;
            Ok(merge(&stored, incoming))
        })
    }

    fn delete(
        &self,
        definition: ObjectTable,
        op: &str,
        name: &str,
    ) -> Result<bool, FeatureGateError> {
        let write_txn = self
            .db
            .begin_write()
            .map_err(|e| FeatureGateError::storage(op, e))?;
        let existed = {
            let mut table = write_txn
                .open_table(definition)
                .map_err(|e| FeatureGateError::storage(op, e))?;
            table
                .remove(name)
                .map_err(|e| FeatureGateError::storage(op, e))?
                .is_some()
        };
        write_txn
            .commit()
            .map_err(|e| FeatureGateError::storage(op, e))?;
        Ok(existed)
    }
}

impl ResourceStore for RedbStore {
    fn get_feature(&self, name: &str) -> Result<Option<Feature>, FeatureGateError> {
        self.get(FEATURES, name)
    }

    fn list_features(&self) -> Result<Vec<Feature>, FeatureGateError> {
        self.list(FEATURES)
    }

    fn create_feature(&self, feature: Feature) -> Result<Feature, FeatureGateError> {
        self.create(FEATURES, feature)
    }

    fn update_feature(&self, feature: Feature) -> Result<Feature, FeatureGateError> {
        self.update(FEATURES, feature, |_, incoming| incoming)
    }

    fn delete_feature(&self, name: &str) -> Result<bool, FeatureGateError> {
        self.delete(FEATURES, &format!("delete Feature {name}"), name)
    }

    fn get_feature_gate(&self, name: &str) -> Result<Option<FeatureGate>, FeatureGateError> {
        self.get(FEATURE_GATES, name)
    }

    fn list_feature_gates(&self) -> Result<Vec<FeatureGate>, FeatureGateError> {
        self.list(FEATURE_GATES)
    }

    fn create_feature_gate(&self, gate: FeatureGate) -> Result<FeatureGate, FeatureGateError> {
        self.create(FEATURE_GATES, gate)
    }

    fn update_feature_gate(&self, gate: FeatureGate) -> Result<FeatureGate, FeatureGateError> {
        self.update(FEATURE_GATES, gate, |stored, incoming| {
            merge_gate(stored, incoming, Merge::Spec)
        })
    }

    fn update_feature_gate_status(
        &self,
        gate: FeatureGate,
    ) -> Result<FeatureGate, FeatureGateError> {
        self.update(FEATURE_GATES, gate, |stored, incoming| {
            merge_gate(stored, incoming, Merge::Status)
        })
    }

    fn delete_feature_gate(&self, name: &str) -> Result<bool, FeatureGateError> {
        self.delete(FEATURE_GATES, &format!("delete FeatureGate {name}"), name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ErrorKind, StabilityLevel};
    use tempfile::tempdir;

    #[test]
    fn open_creates_empty_store() {
        let dir = tempdir().expect("tempdir");
        let store = RedbStore::open(dir.path().join("fg.redb")).expect("open");
        assert!(store.list_features().expect("list").is_empty());
        assert!(store.list_feature_gates().expect("list").is_empty());
        assert_eq!(store.revision().expect("revision"), 0);
    }

    #[test]
    fn failed_create_does_not_bump_revision() {
        let dir = tempdir().expect("tempdir");
        let store = RedbStore::open(dir.path().join("fg.redb")).expect("open");
        store
            .create_feature(Feature::new("foo", "", StabilityLevel::Stable))
            .expect("create");
        let before = store.revision().expect("revision");

        let err = store
            .create_feature(Feature::new("foo", "", StabilityLevel::Stable))
            .expect_err("duplicate");
        assert_eq!(err.kind(), ErrorKind::AlreadyExists);
        assert_eq!(store.revision().expect("revision"), before);
    }
}
