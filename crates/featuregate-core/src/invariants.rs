//! # Invariant Helpers
//!
//! Set computations shared by admission, reconciliation and the imperative
//! client. Every helper is pure and returns a `NameSet`, so results are
//! sorted and de-duplicated regardless of input order.

use crate::primitives::{MSG_APPLIED, MSG_IMMUTABLE, MSG_VOIDS_WARRANTY};
use crate::{
    Feature, FeatureGate, FeatureGateSpec, FeatureReference, FeatureReferenceResult, Policy,
    ReferenceStatus,
};
use std::collections::{BTreeMap, BTreeSet};

/// A sorted, de-duplicated set of Feature names.
pub type NameSet = BTreeSet<String>;

// =============================================================================
// REFERENCE SETS
// =============================================================================

/// Every Feature name a gate spec references.
#[must_use]
pub fn referenced_names(spec: &FeatureGateSpec) -> NameSet {
    spec.features.iter().map(|r| r.name.clone()).collect()
}

/// Referenced names absent from `features`.
#[must_use]
pub fn missing_features(spec: &FeatureGateSpec, features: &[Feature]) -> NameSet {
    let known: BTreeSet<&str> = features.iter().map(Feature::name).collect();
    spec.features
        .iter()
        .filter(|r| !known.contains(r.name.as_str()))
        .map(|r| r.name.clone())
        .collect()
}

/// Names that appear more than once in the same gate spec.
#[must_use]
pub fn duplicate_references(spec: &FeatureGateSpec) -> NameSet {
    let mut seen = BTreeSet::new();
    spec.features
        .iter()
        .filter(|r| !seen.insert(r.name.as_str()))
        .map(|r| r.name.clone())
        .collect()
}

/// Names `gate` references that some other gate in `gates` also references.
///
/// `gate` itself is skipped by name, so passing the full collection (which
/// may hold a stale copy of `gate`) is fine.
#[must_use]
pub fn conflicting_features(gate: &FeatureGate, gates: &[FeatureGate]) -> NameSet {
    let taken: BTreeSet<&str> = gates
        .iter()
        .filter(|other| other.name() != gate.name())
        .flat_map(|other| other.spec.features.iter().map(|r| r.name.as_str()))
        .collect();
    gate.spec
        .features
        .iter()
        .filter(|r| taken.contains(r.name.as_str()))
        .map(|r| r.name.clone())
        .collect()
}

/// Names referenced by more than one gate across the whole collection.
#[must_use]
pub fn multiply_gated_features(gates: &[FeatureGate]) -> NameSet {
    let mut owners: BTreeMap<&str, BTreeSet<&str>> = BTreeMap::new();
    for gate in gates {
        for reference in &gate.spec.features {
            owners
                .entry(reference.name.as_str())
                .or_default()
                .insert(gate.name());
        }
    }
    owners
        .into_iter()
        .filter(|(_, gates)| gates.len() > 1)
        .map(|(name, _)| name.to_string())
        .collect()
}

// =============================================================================
// POLICY SETS
// =============================================================================

/// Pair each reference with its Feature's policy. Missing Features are skipped.
fn with_policies<'a>(
    spec: &'a FeatureGateSpec,
    features: &'a [Feature],
) -> impl Iterator<Item = (&'a FeatureReference, Policy)> + 'a {
    let index: BTreeMap<&str, &Feature> = features.iter().map(|f| (f.name(), f)).collect();
    spec.features.iter().filter_map(move |reference| {
        index
            .get(reference.name.as_str())
            .map(|feature| (reference, feature.spec.stability.policy()))
    })
}

/// References that move an immutable Feature away from its default.
#[must_use]
pub fn immutable_violations(spec: &FeatureGateSpec, features: &[Feature]) -> NameSet {
    with_policies(spec, features)
        .filter(|(reference, policy)| policy.forbids(reference.activate))
        .map(|(reference, _)| reference.name.clone())
        .collect()
}

/// References that deviate from a warranty-voiding default without consent.
#[must_use]
pub fn warranty_violations(spec: &FeatureGateSpec, features: &[Feature]) -> NameSet {
    with_policies(spec, features)
        .filter(|(reference, policy)| {
            policy.needs_warranty_consent(
                reference.activate,
                reference.permanently_void_all_support_guarantees,
            )
        })
        .map(|(reference, _)| reference.name.clone())
        .collect()
}

/// References whose consent flag was true in `previous` and is false now.
///
/// Only names present in both versions are compared; dropping a reference
/// entirely is not a ratchet violation.
#[must_use]
pub fn ratchet_violations(spec: &FeatureGateSpec, previous: &FeatureGateSpec) -> NameSet {
    let consented: BTreeSet<&str> = previous
        .features
        .iter()
        .filter(|r| r.permanently_void_all_support_guarantees)
        .map(|r| r.name.as_str())
        .collect();
    spec.features
        .iter()
        .filter(|r| !r.permanently_void_all_support_guarantees)
        .filter(|r| consented.contains(r.name.as_str()))
        .map(|r| r.name.clone())
        .collect()
}

// =============================================================================
// EVALUATION
// =============================================================================

/// Outcome of applying a policy to one reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Evaluation {
    pub result: FeatureReferenceResult,
    /// The activation the Feature must converge to.
    pub activated: bool,
}

/// Apply `policy` to `reference`.
///
/// Immutability is checked before the warranty gate; a rejected intent
/// leaves the Feature at its default.
#[must_use]
pub fn evaluate(policy: Policy, reference: &FeatureReference) -> Evaluation {
    let (status, message, activated) = if policy.forbids(reference.activate) {
        (
            ReferenceStatus::Invalid,
            MSG_IMMUTABLE,
            policy.default_activation,
        )
    } else if policy.needs_warranty_consent(
        reference.activate,
        reference.permanently_void_all_support_guarantees,
    ) {
        (
            ReferenceStatus::Invalid,
            MSG_VOIDS_WARRANTY,
            policy.default_activation,
        )
    } else {
        (ReferenceStatus::Applied, MSG_APPLIED, reference.activate)
    };

    Evaluation {
        result: FeatureReferenceResult {
            name: reference.name.clone(),
            status,
            message: message.to_string(),
        },
        activated,
    }
}

// =============================================================================
// OWNERSHIP LOOKUPS
// =============================================================================

/// Gates whose spec references `feature`, sorted by gate name.
#[must_use]
pub fn gates_referencing<'a>(gates: &'a [FeatureGate], feature: &str) -> Vec<&'a FeatureGate> {
    let mut owners: Vec<&FeatureGate> = gates.iter().filter(|g| g.gates(feature)).collect();
    owners.sort_by(|a, b| a.name().cmp(b.name()));
    owners
}

/// Gates whose status still carries a result for `feature`, sorted by name.
#[must_use]
pub fn gates_reporting<'a>(gates: &'a [FeatureGate], feature: &str) -> Vec<&'a FeatureGate> {
    let mut reporters: Vec<&FeatureGate> = gates.iter().filter(|g| g.reports(feature)).collect();
    reporters.sort_by(|a, b| a.name().cmp(b.name()));
    reporters
}

// =============================================================================
// TESTS
// =============================================================================
