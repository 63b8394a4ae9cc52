//! # Manifests
//!
//! JSON documents accepted by `featuregate apply`. A file holds either one
//! document or an array of them; each carries a `kind` of `Feature` or
//! `FeatureGate`.
//!
//! ```json
//! [
//!   {"kind": "Feature", "metadata": {"name": "foo"},
//!    "spec": {"description": "periscope", "stability": "Experimental"}},
//!   {"kind": "FeatureGate", "metadata": {"name": "tkg-system"},
//!    "spec": {"features": [{"name": "foo", "activate": false}]}}
//! ]
//! ```

use featuregate_core::{
    Feature, FeatureGate, FeatureGateError, NameSet, ResourceKind, ResourceStore,
    feature_requests_for_gate,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use tracing::info;

/// Largest manifest file `load` will read (4 MB).
const MAX_MANIFEST_SIZE: u64 = 4 * 1024 * 1024;

/// One resource document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum Manifest {
    Feature(Feature),
    FeatureGate(FeatureGate),
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Documents {
    Many(Vec<Manifest>),
    One(Manifest),
}

/// What `apply` did with one document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Created,
    Configured,
    Unchanged,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Created => f.write_str("created"),
            Self::Configured => f.write_str("configured"),
            Self::Unchanged => f.write_str("unchanged"),
        }
    }
}

/// Per-document result of `apply`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Applied {
    pub kind: ResourceKind,
    pub name: String,
    pub action: Action,
}

/// Parse manifest text.
pub fn parse(contents: &str) -> Result<Vec<Manifest>, FeatureGateError> {
    let documents: Documents = serde_json::from_str(contents)
        .map_err(|e| FeatureGateError::DeserializationError(e.to_string()))?;
    Ok(match documents {
        Documents::Many(list) => list,
        Documents::One(one) => vec![one],
    })
}

/// Read and parse a manifest file.
pub fn load(path: &Path) -> Result<Vec<Manifest>, FeatureGateError> {
    let operation = format!("read manifest {}", path.display());
    let metadata = std::fs::metadata(path).map_err(|e| FeatureGateError::storage(&operation, e))?;
    if metadata.len() > MAX_MANIFEST_SIZE {
        return Err(FeatureGateError::storage(
            operation,
            format!(
                "file size {} bytes exceeds maximum allowed {} bytes",
                metadata.len(),
                MAX_MANIFEST_SIZE
            ),
        ));
    }
    let contents =
        std::fs::read_to_string(path).map_err(|e| FeatureGateError::storage(&operation, e))?;
    parse(&contents).map_err(|e| e.context(format!("invalid manifest {}", path.display())))
}

/// Create or update every document in order and collect the Feature names a
/// reconcile pass must visit afterwards.
///
/// Gate writes go through whatever admission the store applies. The first
/// failing document aborts the rest.
pub fn apply<S: ResourceStore>(
    store: &S,
    manifests: Vec<Manifest>,
) -> Result<(Vec<Applied>, NameSet), FeatureGateError> {
    let mut applied = Vec::with_capacity(manifests.len());
    let mut affected = NameSet::new();

    for manifest in manifests {
        let result = match manifest {
            Manifest::Feature(feature) => {
                affected.insert(feature.name().to_string());
                apply_feature(store, feature)?
            }
            Manifest::FeatureGate(gate) => {
                affected.extend(feature_requests_for_gate(&gate));
                let (result, previous) = apply_gate(store, gate)?;
                if let Some(previous) = previous {
                    affected.extend(feature_requests_for_gate(&previous));
                }
                result
            }
        };
        info!(kind = %result.kind, name = %result.name, action = ?result.action, "applied");
        applied.push(result);
    }
    Ok((applied, affected))
}

/// Features are externally owned: only the description may change once
/// created, and the observed status is never taken from the document.
fn apply_feature<S: ResourceStore>(
    store: &S,
    mut feature: Feature,
) -> Result<Applied, FeatureGateError> {
    let name = feature.name().to_string();
    let applied = |action| Applied {
        kind: ResourceKind::Feature,
        name: name.clone(),
        action,
    };

    let Some(existing) = store.get_feature(&name)? else {
        feature.metadata.resource_version = 0;
        feature.status = Default::default();
        store.create_feature(feature)?;
        return Ok(applied(Action::Created));
    };

    if existing.spec.stability != feature.spec.stability {
        return Err(FeatureGateError::Forbidden(format!(
            "cannot change the stability level of Feature {name} from {} to {}",
            existing.spec.stability, feature.spec.stability
        )));
    }
    if existing.spec == feature.spec {
        return Ok(applied(Action::Unchanged));
    }

    let mut updated = existing;
    updated.spec = feature.spec;
    store.update_feature(updated)?;
    Ok(applied(Action::Configured))
}

fn apply_gate<S: ResourceStore>(
    store: &S,
    mut gate: FeatureGate,
) -> Result<(Applied, Option<FeatureGate>), FeatureGateError> {
    let name = gate.name().to_string();
    let applied = |action| Applied {
        kind: ResourceKind::FeatureGate,
        name: name.clone(),
        action,
    };

    let Some(existing) = store.get_feature_gate(&name)? else {
        gate.metadata.resource_version = 0;
        gate.status = Default::default();
        store.create_feature_gate(gate)?;
        return Ok((applied(Action::Created), None));
    };

    if existing.spec == gate.spec {
        return Ok((applied(Action::Unchanged), Some(existing)));
    }

    gate.metadata.resource_version = existing.metadata.resource_version;
    gate.status = existing.status.clone();
    store.update_feature_gate(gate)?;
    Ok((applied(Action::Configured), Some(existing)))
}
