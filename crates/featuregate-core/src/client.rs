//! # Imperative Client
//!
//! Read-validate-write access for callers outside the declarative path, such
//! as a command surface. The client re-applies the stability policy before
//! writing and adds an explicit consent step for warranty-voiding toggles.
//!
//! Writes are full-object FeatureGate spec updates. A version conflict is
//! returned as a retryable `Conflict` error; the client never retries on its
//! own.

use crate::invariants::gates_referencing;
use crate::store::ResourceStore;
use crate::{Feature, FeatureGate, FeatureGateError, FeatureReference};
use serde::Serialize;
use tracing::info;

/// What an activate or deactivate call did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase", rename_all_fields = "camelCase", tag = "result")]
pub enum ToggleOutcome {
    /// The reference already had the requested value.
    Unchanged { gate: String },
    /// The reference was flipped.
    Toggled { gate: String, warranty_voided: bool },
}

impl ToggleOutcome {
    /// Name of the FeatureGate holding the reference.
    #[must_use]
    pub fn gate(&self) -> &str {
        match self {
            Self::Unchanged { gate } | Self::Toggled { gate, .. } => gate,
        }
    }
}

/// Find the first gate (in list order) whose spec references `feature`.
#[must_use]
pub fn feature_ref_from_gate_list<'a>(
    gates: &'a [FeatureGate],
    feature: &str,
) -> Option<(&'a str, &'a FeatureReference)> {
    gates
        .iter()
        .find_map(|gate| gate.reference(feature).map(|r| (gate.name(), r)))
}

/// Imperative Feature toggling against an injected store.
#[derive(Debug, Clone)]
pub struct FeatureGateClient<S> {
    store: S,
}

impl<S: ResourceStore> FeatureGateClient<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    // =========================================================================
    // READS
    // =========================================================================

    pub fn get_feature(&self, name: &str) -> Result<Feature, FeatureGateError> {
        self.store
            .get_feature(name)
            .map_err(|e| e.context(format!("could not get Feature {name}")))?
            .ok_or_else(|| FeatureGateError::feature_not_found(name))
    }

    pub fn get_feature_list(&self) -> Result<Vec<Feature>, FeatureGateError> {
        self.store
            .list_features()
            .map_err(|e| e.context("could not get Features"))
    }

    pub fn get_feature_gate(&self, name: &str) -> Result<FeatureGate, FeatureGateError> {
        self.store
            .get_feature_gate(name)
            .map_err(|e| e.context(format!("could not get FeatureGate {name}")))?
            .ok_or_else(|| FeatureGateError::gate_not_found(name))
    }

    pub fn get_feature_gate_list(&self) -> Result<Vec<FeatureGate>, FeatureGateError> {
        self.store
            .list_feature_gates()
            .map_err(|e| e.context("could not get FeatureGates"))
    }

    /// The observed activation of a Feature.
    pub fn is_feature_activated(&self, name: &str) -> Result<bool, FeatureGateError> {
        self.get_feature(name)
            .map(|f| f.status.activated)
            .map_err(|e| e.context(format!("could not retrieve Feature {name}")))
    }

    // =========================================================================
    // MUTATIONS
    // =========================================================================

    /// Set `activate = true` on the single reference to `name`.
    ///
    /// If activating would void the warranty and consent has not been
    /// recorded yet, `warranty_void_allowed` must be `true`. The consent flag
    /// is then written first, and the activation second.
    ///
    /// Writes carry the version of the gate the decision was made on, so a
    /// concurrent change surfaces as `Conflict`.
    pub fn activate_feature(
        &self,
        name: &str,
        warranty_void_allowed: bool,
    ) -> Result<ToggleOutcome, FeatureGateError> {
        let (feature, mut gate) = self.owner_of(name)?;
        let Some(reference) = gate.reference(name).cloned() else {
            return Err(FeatureGateError::Unreferenced {
                feature: name.to_string(),
            });
        };

        if reference.activate {
            info!(feature = %name, gate = %gate.name(), "Feature is already set to be activated");
            return Ok(ToggleOutcome::Unchanged {
                gate: gate.name().to_string(),
            });
        }

        let policy = feature.spec.stability.policy();
        if policy.forbids(true) {
            return Err(immutable(&feature, &gate));
        }

        let voids_warranty = policy.voids_warranty
            && !reference.permanently_void_all_support_guarantees
            && policy.default_activation == reference.activate;
        if voids_warranty {
            if !warranty_void_allowed {
                return Err(FeatureGateError::Forbidden(format!(
                    "activating Feature {name} in FeatureGate {} voids the warranty, but permission \
                     to void the warranty was not given",
                    gate.name()
                )));
            }
            gate = self.write_reference(gate, name, |r| {
                r.permanently_void_all_support_guarantees = true;
            })?;
            info!(feature = %name, gate = %gate.name(), "support guarantees permanently voided");
        }

        let gate = self.write_reference(gate, name, |r| r.activate = true)?;
        info!(feature = %name, gate = %gate.name(), "Feature activated");
        Ok(ToggleOutcome::Toggled {
            gate: gate.name().to_string(),
            warranty_voided: voids_warranty,
        })
    }

    /// Set `activate = false` on the single reference to `name`.
    pub fn deactivate_feature(&self, name: &str) -> Result<ToggleOutcome, FeatureGateError> {
        let (feature, gate) = self.owner_of(name)?;
        let Some(reference) = gate.reference(name) else {
            return Err(FeatureGateError::Unreferenced {
                feature: name.to_string(),
            });
        };

        if !reference.activate {
            info!(feature = %name, gate = %gate.name(), "Feature is already set to be deactivated");
            return Ok(ToggleOutcome::Unchanged {
                gate: gate.name().to_string(),
            });
        }

        if feature.spec.stability.policy().forbids(false) {
            return Err(immutable(&feature, &gate));
        }

        let gate = self.write_reference(gate, name, |r| r.activate = false)?;
        info!(feature = %name, gate = %gate.name(), "Feature deactivated");
        Ok(ToggleOutcome::Toggled {
            gate: gate.name().to_string(),
            warranty_voided: false,
        })
    }

    /// The Feature plus the one gate that references it.
    fn owner_of(&self, name: &str) -> Result<(Feature, FeatureGate), FeatureGateError> {
        let feature = self.get_feature(name)?;
        let gates = self
            .get_feature_gate_list()
            .map_err(|e| e.context("could not get FeatureGate list"))?;

        let owners = gates_referencing(&gates, name);
        match owners.as_slice() {
            [] => Err(FeatureGateError::Unreferenced {
                feature: name.to_string(),
            }),
            [owner] => Ok((feature, (*owner).clone())),
            many => Err(FeatureGateError::TooMany {
                feature: name.to_string(),
                gates: many.iter().map(|g| g.name().to_string()).collect(),
            }),
        }
    }

    /// Apply `edit` to the reference for `feature` and persist the gate.
    fn write_reference(
        &self,
        mut gate: FeatureGate,
        feature: &str,
        edit: impl FnOnce(&mut FeatureReference),
    ) -> Result<FeatureGate, FeatureGateError> {
        let gate_name = gate.name().to_string();
        let Some(reference) = gate.reference_mut(feature) else {
            return Err(FeatureGateError::feature_not_found(feature)
                .context(format!("Feature {feature} is no longer in FeatureGate {gate_name}")));
        };
        edit(reference);
        self.store
            .update_feature_gate(gate)
            .map_err(|e| e.context(format!("could not update FeatureGate {gate_name}")))
    }
}

fn immutable(feature: &Feature, gate: &FeatureGate) -> FeatureGateError {
    FeatureGateError::Forbidden(format!(
        "Feature {} in FeatureGate {} is immutable at stability level {}",
        feature.name(),
        gate.name(),
        feature.spec.stability
    ))
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ErrorKind, MemoryStore, StabilityLevel};
    use std::sync::atomic::{AtomicBool, Ordering};

    fn client() -> FeatureGateClient<MemoryStore> {
        let store = MemoryStore::new();
        for (name, level) in [
            ("bar", StabilityLevel::TechnicalPreview),
            ("foo", StabilityLevel::Experimental),
            ("stable-thing", StabilityLevel::Stable),
            ("old", StabilityLevel::Deprecated),
            ("loner", StabilityLevel::TechnicalPreview),
        ] {
            store
                .create_feature(Feature::new(name, "", level))
                .expect("seed feature");
        }
        store
            .create_feature_gate(FeatureGate::new(
                "tkg-system",
                vec![
                    FeatureReference::new("bar", false),
                    FeatureReference::new("foo", false),
                    FeatureReference::new("stable-thing", true),
                    FeatureReference::new("old", true),
                ],
            ))
            .expect("seed gate");
        FeatureGateClient::new(store)
    }

    #[test]
    fn activate_technical_preview() {
        let client = client();
        let outcome = client.activate_feature("bar", false).expect("activate");
        assert_eq!(
            outcome,
            ToggleOutcome::Toggled {
                gate: "tkg-system".to_string(),
                warranty_voided: false
            }
        );
        let gates = client.get_feature_gate_list().expect("list");
        let (_, reference) = feature_ref_from_gate_list(&gates, "bar").expect("reference");
        assert!(reference.activate);
        assert!(!reference.permanently_void_all_support_guarantees);
    }

    #[test]
    fn activate_without_consent_is_forbidden_and_writes_nothing() {
        let client = client();
        let before = client.get_feature_gate("tkg-system").expect("gate");
        let err = client.activate_feature("foo", false).expect_err("forbidden");
        assert_eq!(err.kind(), ErrorKind::Forbidden);
        let after = client.get_feature_gate("tkg-system").expect("gate");
        assert_eq!(before, after);
    }

    #[test]
    fn activate_with_consent_sets_flag_then_activates() {
        let client = client();
        let before = client
            .get_feature_gate("tkg-system")
            .expect("gate")
            .metadata
            .resource_version;
        let outcome = client.activate_feature("foo", true).expect("activate");
        assert!(matches!(
            outcome,
            ToggleOutcome::Toggled {
                warranty_voided: true,
                ..
            }
        ));
        let gate = client.get_feature_gate("tkg-system").expect("gate");
        let reference = gate.reference("foo").expect("reference");
        assert!(reference.activate);
        assert!(reference.permanently_void_all_support_guarantees);
        // Two writes: the consent flag and the activation.
        assert_eq!(gate.metadata.resource_version, before + 2);
    }

    #[test]
    fn already_active_is_unchanged() {
        let client = client();
        let outcome = client
            .activate_feature("stable-thing", false)
            .expect("no-op");
        assert_eq!(
            outcome,
            ToggleOutcome::Unchanged {
                gate: "tkg-system".to_string()
            }
        );
    }

    #[test]
    fn deactivate_immutable_is_forbidden() {
        let client = client();
        let err = client
            .deactivate_feature("stable-thing")
            .expect_err("immutable");
        assert_eq!(err.kind(), ErrorKind::Forbidden);
        assert!(err.to_string().contains("stable-thing"));
    }

    #[test]
    fn deactivate_deprecated() {
        let client = client();
        let outcome = client.deactivate_feature("old").expect("deactivate");
        assert_eq!(outcome.gate(), "tkg-system");
        let gate = client.get_feature_gate("tkg-system").expect("gate");
        assert!(!gate.reference("old").expect("reference").activate);
    }

    #[test]
    fn missing_and_unreferenced_are_not_found() {
        let client = client();
        let err = client.activate_feature("ghost", false).expect_err("missing");
        assert_eq!(err.kind(), ErrorKind::NotFound);
        let err = client.deactivate_feature("loner").expect_err("unreferenced");
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert!(err.to_string().contains("loner"));
    }

    /// Rewrites every gate right after listing them, like a concurrent
    /// writer, and can fail Feature reads.
    struct InterferingStore {
        inner: MemoryStore,
        race_gate_list: AtomicBool,
        fail_feature_reads: bool,
    }

    impl InterferingStore {
        fn wrap(client: FeatureGateClient<MemoryStore>, fail_feature_reads: bool) -> Self {
            Self {
                inner: client.store,
                race_gate_list: AtomicBool::new(true),
                fail_feature_reads,
            }
        }
    }

    impl ResourceStore for InterferingStore {
        fn get_feature(&self, name: &str) -> Result<Option<Feature>, FeatureGateError> {
            if self.fail_feature_reads {
                return Err(FeatureGateError::storage("read feature", "disk on fire"));
            }
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
            let gates = self.inner.list_feature_gates()?;
            if self.race_gate_list.swap(false, Ordering::SeqCst) {
                for gate in &gates {
                    let mut raced = gate.clone();
                    raced.spec.features.retain(|r| r.name != "foo");
                    self.inner.update_feature_gate(raced)?;
                }
            }
            Ok(gates)
        }

        fn create_feature_gate(&self, gate: FeatureGate) -> Result<FeatureGate, FeatureGateError> {
            self.inner.create_feature_gate(gate)
        }

        fn update_feature_gate(&self, gate: FeatureGate) -> Result<FeatureGate, FeatureGateError> {
            self.inner.update_feature_gate(gate)
        }

        fn update_feature_gate_status(
            &self,
            gate: FeatureGate,
        ) -> Result<FeatureGate, FeatureGateError> {
            self.inner.update_feature_gate_status(gate)
        }

        fn delete_feature_gate(&self, name: &str) -> Result<bool, FeatureGateError> {
            self.inner.delete_feature_gate(name)
        }
    }

    #[test]
    fn gate_changed_after_decision_is_a_conflict() {
        let client = FeatureGateClient::new(InterferingStore::wrap(client(), false));
        let err = client.activate_feature("bar", false).expect_err("conflict");
        assert_eq!(err.kind(), ErrorKind::Conflict);
        assert!(err.is_retryable());

        // The concurrent edit survives; nothing was written over it.
        let gate = client.get_feature_gate("tkg-system").expect("gate");
        assert!(gate.reference("foo").is_none());
        assert!(!gate.reference("bar").expect("reference").activate);

        // A fresh attempt decides on the new gate and succeeds.
        client.activate_feature("bar", false).expect("retry");
    }

    #[test]
    fn every_read_names_what_failed() {
        let client = FeatureGateClient::new(InterferingStore::wrap(client(), true));
        let err = client.get_feature("bar").expect_err("read fails");
        assert_eq!(err.kind(), ErrorKind::Internal);
        assert!(err.to_string().contains("could not get Feature bar"));

        let err = client.is_feature_activated("bar").expect_err("read fails");
        assert!(err.to_string().contains("could not retrieve Feature bar"));
    }

    #[test]
    fn is_feature_activated_reads_status() {
        let client = client();
        assert!(!client.is_feature_activated("bar").expect("read"));
        assert!(client.is_feature_activated("ghost").is_err());
    }
}
