//! # Property-Based Tests
//!
//! These tests ensure the exclusivity, immutability, ratchet and idempotence
//! invariants hold for arbitrary gate layouts.

use featuregate_core::invariants::{
    conflicting_features, immutable_violations, multiply_gated_features, ratchet_violations,
};
use featuregate_core::{
    Feature, FeatureGate, FeatureReference, MemoryStore, NameSet, ReferenceStatus, Reconciler,
    ResourceStore, StabilityLevel, compute_violations, evaluate,
};
use proptest::collection::vec;
use proptest::prelude::*;

// =============================================================================
// STRATEGIES
// =============================================================================

const FEATURE_NAMES: [&str; 6] = ["foo", "bar", "baz", "bax", "quux", "corge"];

fn level() -> impl Strategy<Value = StabilityLevel> {
    prop::sample::select(StabilityLevel::ALL.to_vec())
}

fn reference() -> impl Strategy<Value = FeatureReference> {
    (
        prop::sample::select(FEATURE_NAMES.to_vec()),
        any::<bool>(),
        any::<bool>(),
    )
        .prop_map(|(name, activate, consent)| {
            let reference = FeatureReference::new(name, activate);
            if consent {
                reference.voiding_warranty()
            } else {
                reference
            }
        })
}

/// Up to five gates named g0..g4, each with up to four references.
fn gates() -> impl Strategy<Value = Vec<FeatureGate>> {
    vec(vec(reference(), 0..4), 0..5).prop_map(|specs| {
        specs
            .into_iter()
            .enumerate()
            .map(|(i, features)| FeatureGate::new(format!("g{i}"), features))
            .collect()
    })
}

fn features() -> impl Strategy<Value = Vec<Feature>> {
    vec(level(), FEATURE_NAMES.len()).prop_map(|levels| {
        FEATURE_NAMES
            .iter()
            .zip(levels)
            .map(|(name, level)| Feature::new(*name, "", level))
            .collect()
    })
}

// =============================================================================
// PROPERTY TESTS
// =============================================================================

proptest! {
    /// The union of per-gate conflicts equals the set of multiply-gated names.
    #[test]
    fn conflict_union_matches_multiply_gated(gates in gates()) {
        let mut union = NameSet::new();
        for gate in &gates {
            union.extend(conflicting_features(gate, &gates));
        }
        let multiply_gated = multiply_gated_features(&gates);
        prop_assert_eq!(&union, &multiply_gated);

        // Empty iff no name is shared between two gates.
        let mut seen = NameSet::new();
        let mut shared = false;
        for gate in &gates {
            let own: NameSet = gate.spec.features.iter().map(|r| r.name.clone()).collect();
            shared |= own.iter().any(|n| seen.contains(n));
            seen.extend(own);
        }
        prop_assert_eq!(multiply_gated.is_empty(), !shared);
    }

    /// An immutable Feature is flagged exactly when the intent leaves its default.
    #[test]
    fn immutability_independent_of_other_fields(reference in reference()) {
        let feature = Feature::new(reference.name.clone(), "", StabilityLevel::Stable);
        let gate = FeatureGate::new("g", vec![reference.clone()]);
        let flagged = immutable_violations(&gate.spec, &[feature]).contains(&reference.name);
        prop_assert_eq!(flagged, !reference.activate);

        let evaluation = evaluate(StabilityLevel::Stable.policy(), &reference);
        prop_assert!(evaluation.activated);
    }

    /// Lowering a consent flag is always reported, whatever else changes.
    #[test]
    fn ratchet_always_rejects_lowering(
        name in prop::sample::select(FEATURE_NAMES.to_vec()),
        extra in vec(reference(), 0..3),
        activate in any::<bool>(),
    ) {
        let previous = FeatureGate::new("g", vec![FeatureReference::new(name, true).voiding_warranty()]);
        let mut features = vec![FeatureReference::new(name, activate)];
        features.extend(extra.into_iter().filter(|r| r.name != name));
        let current = FeatureGate::new("g", features);

        prop_assert!(ratchet_violations(&current.spec, &previous.spec).contains(name));
    }

    /// Warranty gate: consent decides acceptance for off-by-default voiding levels.
    #[test]
    fn warranty_gate_follows_consent(
        level in prop::sample::select(vec![StabilityLevel::WorkInProgress, StabilityLevel::Experimental]),
        consent in any::<bool>(),
    ) {
        let feature = Feature::new("foo", "", level);
        let mut reference = FeatureReference::new("foo", true);
        reference.permanently_void_all_support_guarantees = consent;
        let gate = FeatureGate::new("g", vec![reference.clone()]);

        let violations = compute_violations(&gate, None, &[feature], &[]);
        prop_assert_eq!(violations.is_empty(), consent);

        let evaluation = evaluate(level.policy(), &reference);
        let expected = if consent { ReferenceStatus::Applied } else { ReferenceStatus::Invalid };
        prop_assert_eq!(evaluation.result.status, expected);
    }

    /// Reconciling every Feature twice performs no writes the second time.
    #[test]
    fn reconcile_is_idempotent(features in features(), gates in gates()) {
        let store = MemoryStore::new();
        for feature in features {
            store.create_feature(feature).expect("seed feature");
        }
        for gate in gates {
            store.create_feature_gate(gate).expect("seed gate");
        }
        let reconciler = Reconciler::new(store);
        let names = reconciler.resync_requests().expect("names");

        for name in &names {
            reconciler.reconcile(name).expect("first pass");
        }
        let snapshot = (
            reconciler.store().list_features().expect("list"),
            reconciler.store().list_feature_gates().expect("list"),
        );
        for name in &names {
            let report = reconciler.reconcile(name).expect("second pass");
            prop_assert!(!report.changed(), "second pass wrote for {}", name);
        }
        let again = (
            reconciler.store().list_features().expect("list"),
            reconciler.store().list_feature_gates().expect("list"),
        );
        prop_assert_eq!(snapshot, again);
    }
}
