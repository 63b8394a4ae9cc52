//! # Reconciler
//!
//! Per-Feature convergence step. Given a Feature name, recompute
//! `Feature.status.activated` and the owning FeatureGate's result for that
//! Feature from the current store contents.
//!
//! The step is level-triggered: it reads everything it needs, so running it
//! twice against unchanged state performs no writes the second time. The gate
//! status is written before the Feature; the two writes are independent and
//! each is skipped when it would not change anything.
//!
//! Policy violations are not errors here. They become `invalid` results and
//! leave the Feature at its default. Errors are reserved for the store, and
//! version conflicts are returned so the caller can requeue.

use crate::invariants::{NameSet, evaluate, gates_referencing, gates_reporting};
use crate::primitives::MSG_FEATURE_MISSING;
use crate::store::ResourceStore;
use crate::{Feature, FeatureGate, FeatureGateError, FeatureReferenceResult, ReferenceStatus};
use serde::Serialize;
use tracing::{debug, info, warn};

/// What a reconcile step decided for one Feature.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase", rename_all_fields = "camelCase", tag = "state")]
pub enum ReconcileOutcome {
    /// The Feature does not exist. `gate` is the gate whose result was
    /// marked invalid, if any still reported it.
    Orphaned { gate: Option<String> },
    /// No gate references the Feature; it runs at its default.
    Ungated {
        activated: bool,
        removed_from: Vec<String>,
    },
    /// A gate references the Feature and its intent was evaluated.
    Gated {
        gate: String,
        status: ReferenceStatus,
        activated: bool,
    },
}

/// The outcome of one step plus which writes it performed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconcileReport {
    pub feature: String,
    pub outcome: ReconcileOutcome,
    pub feature_updated: bool,
    pub gates_updated: Vec<String>,
}

impl ReconcileReport {
    /// Whether the step wrote anything.
    #[must_use]
    pub fn changed(&self) -> bool {
        self.feature_updated || !self.gates_updated.is_empty()
    }
}

/// Feature names a change to `gate` must enqueue: spec names plus status
/// names, so removed references get their results dropped.
#[must_use]
pub fn feature_requests_for_gate(gate: &FeatureGate) -> NameSet {
    gate.spec
        .features
        .iter()
        .map(|r| r.name.clone())
        .chain(gate.status.results.keys().cloned())
        .collect()
}

/// Converges Feature and FeatureGate status against a store.
#[derive(Debug, Clone)]
pub struct Reconciler<S> {
    store: S,
}

impl<S: ResourceStore> Reconciler<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    #[must_use]
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Every Feature name a full resync should visit: all Features plus any
    /// name still reported or referenced by a gate.
    pub fn resync_requests(&self) -> Result<NameSet, FeatureGateError> {
        let mut names: NameSet = self
            .store
            .list_features()
            .map_err(|e| e.context("could not list Features"))?
            .iter()
            .map(|f| f.name().to_string())
            .collect();
        for gate in self
            .store
            .list_feature_gates()
            .map_err(|e| e.context("could not list FeatureGates"))?
        {
            names.extend(feature_requests_for_gate(&gate));
        }
        Ok(names)
    }

    /// Run one convergence step for `name`.
    pub fn reconcile(&self, name: &str) -> Result<ReconcileReport, FeatureGateError> {
        debug!(feature = %name, "starting reconcile");

        let feature = self
            .store
            .get_feature(name)
            .map_err(|e| e.context(format!("could not get Feature {name}")))?;
        let gates = self
            .store
            .list_feature_gates()
            .map_err(|e| e.context("could not list FeatureGates"))?;

        let report = match feature {
            None => self.reconcile_deleted(name, &gates)?,
            Some(feature) => {
                let owners = gates_referencing(&gates, name);
                match owners.first() {
                    None => self.reconcile_ungated(feature, &gates)?,
                    Some(owner) => {
                        if owners.len() > 1 {
                            let names: Vec<&str> = owners.iter().map(|g| g.name()).collect();
                            warn!(
                                feature = %name,
                                gates = ?names,
                                chosen = %owner.name(),
                                "Feature is gated by more than one FeatureGate"
                            );
                        }
                        self.reconcile_gated(feature, owner, &gates)?
                    }
                }
            }
        };

        if report.changed() {
            info!(
                feature = %name,
                feature_updated = report.feature_updated,
                gates_updated = ?report.gates_updated,
                "reconciled"
            );
        }
        Ok(report)
    }

    fn reconcile_deleted(
        &self,
        name: &str,
        gates: &[FeatureGate],
    ) -> Result<ReconcileReport, FeatureGateError> {
        let mut gates_updated = Vec::new();
        let reporter = gates_reporting(gates, name).into_iter().next();

        if let Some(gate) = reporter {
            let result = FeatureReferenceResult {
                name: name.to_string(),
                status: ReferenceStatus::Invalid,
                message: MSG_FEATURE_MISSING.to_string(),
            };
            if self.write_result(gate, result)? {
                gates_updated.push(gate.name().to_string());
            }
        }

        Ok(ReconcileReport {
            feature: name.to_string(),
            outcome: ReconcileOutcome::Orphaned {
                gate: reporter.map(|g| g.name().to_string()),
            },
            feature_updated: false,
            gates_updated,
        })
    }

    fn reconcile_ungated(
        &self,
        feature: Feature,
        gates: &[FeatureGate],
    ) -> Result<ReconcileReport, FeatureGateError> {
        let name = feature.name().to_string();
        let gates_updated = self.drop_results(&name, gates, None)?;

        let activated = feature.spec.stability.policy().default_activation;
        let feature_updated = self.write_activation(feature, activated)?;

        Ok(ReconcileReport {
            feature: name,
            outcome: ReconcileOutcome::Ungated {
                activated,
                removed_from: gates_updated.clone(),
            },
            feature_updated,
            gates_updated,
        })
    }

    fn reconcile_gated(
        &self,
        feature: Feature,
        owner: &FeatureGate,
        gates: &[FeatureGate],
    ) -> Result<ReconcileReport, FeatureGateError> {
        let name = feature.name().to_string();
        let Some(reference) = owner.reference(&name) else {
            return Err(FeatureGateError::feature_not_found(&name)
                .context(format!("FeatureGate {} lost its reference", owner.name())));
        };
        let evaluation = evaluate(feature.spec.stability.policy(), reference);
        let status = evaluation.result.status;

        // A reference moved from one gate to another leaves a stale result
        // behind in the old gate.
        let mut gates_updated = self.drop_results(&name, gates, Some(owner.name()))?;
        if self.write_result(owner, evaluation.result)? {
            gates_updated.push(owner.name().to_string());
        }
        let feature_updated = self.write_activation(feature, evaluation.activated)?;

        Ok(ReconcileReport {
            feature: name,
            outcome: ReconcileOutcome::Gated {
                gate: owner.name().to_string(),
                status,
                activated: evaluation.activated,
            },
            feature_updated,
            gates_updated,
        })
    }

    /// Upsert `result` into `gate`'s status. Returns whether a write happened.
    fn write_result(
        &self,
        gate: &FeatureGate,
        result: FeatureReferenceResult,
    ) -> Result<bool, FeatureGateError> {
        let mut gate = gate.clone();
        if !gate.status.upsert(result) {
            return Ok(false);
        }
        self.store
            .update_feature_gate_status(gate.clone())
            .map_err(|e| e.context(format!("could not update {} FeatureGate status", gate.name())))?;
        Ok(true)
    }

    /// Drop `name` from every gate status that reports it, except `keep`.
    fn drop_results(
        &self,
        name: &str,
        gates: &[FeatureGate],
        keep: Option<&str>,
    ) -> Result<Vec<String>, FeatureGateError> {
        let mut updated = Vec::new();
        for gate in gates_reporting(gates, name) {
            if Some(gate.name()) == keep {
                continue;
            }
            let mut gate = gate.clone();
            gate.status.remove(name);
            let gate_name = gate.name().to_string();
            self.store
                .update_feature_gate_status(gate)
                .map_err(|e| e.context(format!("could not update {gate_name} FeatureGate status")))?;
            updated.push(gate_name);
        }
        Ok(updated)
    }

    /// Set the Feature's observed activation. Returns whether a write happened.
    fn write_activation(
        &self,
        mut feature: Feature,
        activated: bool,
    ) -> Result<bool, FeatureGateError> {
        if feature.status.activated == activated {
            return Ok(false);
        }
        feature.status.activated = activated;
        let name = feature.name().to_string();
        self.store
            .update_feature(feature)
            .map_err(|e| e.context(format!("could not update {name} Feature status")))?;
        Ok(true)
    }
}

// =============================================================================
// TESTS
// =============================================================================
