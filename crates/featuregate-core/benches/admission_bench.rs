//! # Admission Benchmarks
//!
//! Performance benchmarks for conflict detection and full admission.
//!
//! Run with: `cargo bench -p featuregate-core`

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use featuregate_core::invariants::{conflicting_features, multiply_gated_features};
use featuregate_core::{
    Feature, FeatureGate, FeatureReference, StabilityLevel, compute_violations,
};
use std::hint::black_box;

/// `gates` gates with `per_gate` disjoint references each, plus one shared name.
fn layout(gates: usize, per_gate: usize) -> (Vec<Feature>, Vec<FeatureGate>) {
    let mut features = Vec::with_capacity(gates * per_gate + 1);
    let mut list = Vec::with_capacity(gates);
    features.push(Feature::new("shared", "", StabilityLevel::TechnicalPreview));

    for g in 0..gates {
        let mut references = vec![FeatureReference::new("shared", g % 2 == 0)];
        for f in 0..per_gate {
            let name = format!("feature-{g}-{f}");
            let level = StabilityLevel::ALL[f % StabilityLevel::ALL.len()];
            features.push(Feature::new(name.clone(), "", level));
            references.push(FeatureReference::new(name, level.policy().default_activation));
        }
        list.push(FeatureGate::new(format!("gate-{g}"), references));
    }
    (features, list)
}

fn bench_conflicts(c: &mut Criterion) {
    let mut group = c.benchmark_group("conflicts");
    for gates in [10, 100, 500] {
        let (_, list) = layout(gates, 20);
        group.bench_with_input(BenchmarkId::new("per_gate", gates), &list, |b, list| {
            b.iter(|| conflicting_features(black_box(&list[0]), black_box(list)));
        });
        group.bench_with_input(BenchmarkId::new("whole_collection", gates), &list, |b, list| {
            b.iter(|| multiply_gated_features(black_box(list)));
        });
    }
    group.finish();
}

fn bench_admission(c: &mut Criterion) {
    let mut group = c.benchmark_group("admission");
    for gates in [10, 100, 500] {
        let (features, list) = layout(gates, 20);
        group.bench_with_input(
            BenchmarkId::new("compute_violations", gates),
            &(features, list),
            |b, (features, list)| {
                b.iter(|| {
                    compute_violations(
                        black_box(&list[0]),
                        None,
                        black_box(features),
                        black_box(list),
                    )
                });
            },
        );
    }
    group.finish();
}

criterion_group!(benches, bench_conflicts, bench_admission);
criterion_main!(benches);
