//! # featuregate
//!
//! Library half of the `featuregate` binary, exposed so the integration
//! tests can drive the controller and the HTTP router directly.

pub mod api;
pub mod cli;
pub mod config;
pub mod controller;
pub mod manifest;

use featuregate_core::{AdmittingStore, FeatureGateError, RedbStore, ResourceStore};
use std::path::Path;
use std::sync::Arc;

/// The store every command and handler shares.
pub type SharedStore = Arc<dyn ResourceStore>;

/// Open the redb database at `path` behind the admission wrapper.
pub fn open_store(path: &Path) -> Result<SharedStore, FeatureGateError> {
    let store = RedbStore::open(path)?;
    Ok(Arc::new(AdmittingStore::new(store)))
}
