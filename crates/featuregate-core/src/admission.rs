//! # Admission Validator
//!
//! Synchronous gatekeeper for FeatureGate create and update.
//!
//! A candidate gate is checked against the whole Feature and FeatureGate
//! collections. Every rule runs; the resulting violations are aggregated
//! into one `FeatureGateError::Invalid` so the caller sees every problem at
//! once. Rejection is atomic: the validator never writes.
//!
//! ## Rules (reported in this order)
//!
//! 1. Existence: every referenced Feature exists
//! 2. Duplicate: a Feature is referenced at most once per gate
//! 3. Conflict: no other gate references the same Feature
//! 4. Ratchet (update only): consent flags are never lowered
//! 5. Warranty: deviating from a warranty-voiding default needs consent
//! 6. Immutable: immutable Features stay at their default
//!
//! Rules 5 and 6 skip references to missing Features; those are already
//! reported under rule 1.

use crate::invariants::{
    NameSet, conflicting_features, duplicate_references, immutable_violations, missing_features,
    ratchet_violations, warranty_violations,
};
use crate::store::ResourceStore;
use crate::{Feature, FeatureGate, FeatureGateError, Violation};
use tracing::{debug, info};

/// Compute the violations of `gate` against explicit collections.
///
/// `previous` is the stored version for updates and `None` for creates.
/// The result is empty when the gate is admissible.
#[must_use]
pub fn compute_violations(
    gate: &FeatureGate,
    previous: Option<&FeatureGate>,
    features: &[Feature],
    gates: &[FeatureGate],
) -> Vec<Violation> {
    let checks: [(fn(Vec<String>) -> Violation, NameSet); 6] = [
        (Violation::Existence, missing_features(&gate.spec, features)),
        (Violation::Duplicate, duplicate_references(&gate.spec)),
        (Violation::Conflict, conflicting_features(gate, gates)),
        (
            Violation::Ratchet,
            previous
                .map(|p| ratchet_violations(&gate.spec, &p.spec))
                .unwrap_or_default(),
        ),
        (Violation::Warranty, warranty_violations(&gate.spec, features)),
        (Violation::Immutable, immutable_violations(&gate.spec, features)),
    ];

    checks
        .into_iter()
        .filter(|(_, names)| !names.is_empty())
        .map(|(violation, names)| violation(names.into_iter().collect()))
        .collect()
}

/// Store-backed admission checks for FeatureGates.
#[derive(Debug, Clone)]
pub struct AdmissionValidator<S> {
    store: S,
}

impl<S: ResourceStore> AdmissionValidator<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Violations of `gate` against the current store contents.
    pub fn violations(
        &self,
        gate: &FeatureGate,
        previous: Option<&FeatureGate>,
    ) -> Result<Vec<Violation>, FeatureGateError> {
        let features = self
            .store
            .list_features()
            .map_err(|e| e.context("could not list Features"))?;
        let gates = self
            .store
            .list_feature_gates()
            .map_err(|e| e.context("could not list FeatureGates"))?;
        Ok(compute_violations(gate, previous, &features, &gates))
    }

    /// Admit a new FeatureGate.
    pub fn validate_create(&self, gate: &FeatureGate) -> Result<(), FeatureGateError> {
        info!(gate = %gate.name(), "validate create");
        let violations = self.violations(gate, None)?;
        reject_if_any(gate, violations)
    }

    /// Admit a change to an existing FeatureGate.
    pub fn validate_update(
        &self,
        gate: &FeatureGate,
        previous: &FeatureGate,
    ) -> Result<(), FeatureGateError> {
        info!(gate = %gate.name(), "validate update");
        let violations = self.violations(gate, Some(previous))?;
        reject_if_any(gate, violations)
    }

    /// Deletes are always admitted.
    pub fn validate_delete(&self, gate: &FeatureGate) -> Result<(), FeatureGateError> {
        info!(gate = %gate.name(), "validate delete");
        Ok(())
    }
}

fn reject_if_any(gate: &FeatureGate, violations: Vec<Violation>) -> Result<(), FeatureGateError> {
    if violations.is_empty() {
        return Ok(());
    }
    debug!(gate = %gate.name(), count = violations.len(), "rejecting FeatureGate");
    Err(FeatureGateError::Invalid {
        gate: gate.name().to_string(),
        violations,
    })
}

// =============================================================================
// TESTS
// =============================================================================
