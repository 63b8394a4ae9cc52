//! # CLI Command Implementations
//!
//! This module contains the actual implementations of CLI commands.
//!
//! Mutating commands finish with a reconcile pass over the Features they
//! touched, so the printed state is already converged.

use crate::config::Config;
use crate::controller::{Completed, Controller, ControllerSettings};
use crate::{SharedStore, api, manifest, open_store};
use featuregate_core::invariants::{gates_referencing, missing_features};
use featuregate_core::primitives::SYSTEM_FEATURE_GATE;
use featuregate_core::{
    Feature, FeatureGate, FeatureGateClient, FeatureGateError, ReconcileOutcome, ResourceStore,
};
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;

// =============================================================================
// OUTPUT HELPERS
// =============================================================================

fn print_json<T: Serialize>(value: &T) {
    println!(
        "{}",
        serde_json::to_string_pretty(value).unwrap_or_default()
    );
}

fn controller(config: &Config, store: &SharedStore) -> Controller<SharedStore> {
    Controller::new(Arc::clone(store), ControllerSettings::from_config(config))
}

/// Print reconcile results and fail if any of them did.
fn report(json: bool, completed: Vec<Completed>) -> Result<(), FeatureGateError> {
    if json {
        let rows: Vec<_> = completed
            .iter()
            .map(|(name, result)| match result {
                Ok(report) => serde_json::json!({ "feature": name, "report": report }),
                Err(e) => serde_json::json!({ "feature": name, "error": e.to_string() }),
            })
            .collect();
        print_json(&rows);
    } else {
        for (name, result) in &completed {
            match result {
                Ok(report) => println!(
                    "  {:<32} {:<10} {}",
                    name,
                    outcome_label(&report.outcome),
                    if report.changed() { "updated" } else { "in sync" }
                ),
                Err(e) => println!("  {:<32} error: {}", name, e),
            }
        }
    }

    let failures: Vec<&str> = completed
        .iter()
        .filter(|(_, result)| result.is_err())
        .map(|(name, _)| name.as_str())
        .collect();
    if failures.is_empty() {
        Ok(())
    } else {
        Err(FeatureGateError::storage(
            "reconcile",
            format!("failed for [{}]", failures.join(", ")),
        ))
    }
}

fn outcome_label(outcome: &ReconcileOutcome) -> &'static str {
    match outcome {
        ReconcileOutcome::Orphaned { .. } => "orphaned",
        ReconcileOutcome::Ungated { .. } => "ungated",
        ReconcileOutcome::Gated { .. } => "gated",
    }
}

// =============================================================================
// INIT COMMAND
// =============================================================================

/// Create the database file, optionally seeding the system FeatureGate.
pub fn cmd_init(
    config: &Config,
    json: bool,
    force: bool,
    system_gate: bool,
) -> Result<(), FeatureGateError> {
    let path = &config.database;
    if path.exists() {
        if !force {
            return Err(FeatureGateError::storage(
                "initialize database",
                format!("{} already exists (use --force to replace it)", path.display()),
            ));
        }
        std::fs::remove_file(path).map_err(|e| {
            FeatureGateError::storage(format!("remove {}", path.display()), e)
        })?;
    }

    let store = open_store(path)?;
    if system_gate {
        store.create_feature_gate(FeatureGate::new(SYSTEM_FEATURE_GATE, Vec::new()))?;
    }

    if json {
        print_json(&serde_json::json!({
            "database": path.display().to_string(),
            "systemGate": system_gate.then_some(SYSTEM_FEATURE_GATE),
        }));
    } else {
        println!("Initialized database at {}", path.display());
        if system_gate {
            println!("Created FeatureGate {SYSTEM_FEATURE_GATE}");
        }
    }
    Ok(())
}

// =============================================================================
// APPLY COMMAND
// =============================================================================

/// Create or update every document in a manifest, then reconcile.
pub async fn cmd_apply(
    config: &Config,
    json: bool,
    file: &Path,
    reconcile: bool,
) -> Result<(), FeatureGateError> {
    let documents = manifest::load(file)?;
    let store = open_store(&config.database)?;

    let writer = Arc::clone(&store);
    let (applied, affected) =
        tokio::task::spawn_blocking(move || manifest::apply(&writer, documents))
            .await
            .map_err(|e| FeatureGateError::storage("apply manifest", e))??;

    if json {
        print_json(&applied);
    } else {
        for entry in &applied {
            println!("{}/{} {}", entry.kind, entry.name, entry.action);
        }
    }

    if !reconcile || affected.is_empty() {
        return Ok(());
    }
    let completed = controller(config, &store).run_until_idle(affected).await;
    if !json {
        println!();
        println!("Reconciled:");
    }
    report(json, completed)
}

// =============================================================================
// READ COMMANDS
// =============================================================================

/// Which Features `list` prints.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListFilter {
    All,
    Activated,
    Deactivated,
    /// Referenced by a FeatureGate but missing from the store.
    Unavailable,
}

/// A FeatureGate reference to a Feature that does not exist.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Unavailable {
    pub feature: String,
    pub gate: String,
}

/// Every dangling reference, sorted by Feature then gate.
fn unavailable_features(gates: &[FeatureGate], features: &[Feature]) -> Vec<Unavailable> {
    let mut missing: Vec<Unavailable> = gates
        .iter()
        .flat_map(|gate| {
            missing_features(&gate.spec, features)
                .into_iter()
                .map(|feature| Unavailable {
                    feature,
                    gate: gate.name().to_string(),
                })
        })
        .collect();
    missing.sort_by(|a, b| (&a.feature, &a.gate).cmp(&(&b.feature, &b.gate)));
    missing
}

/// List Features, optionally filtered by activation or availability.
pub fn cmd_list(config: &Config, json: bool, filter: ListFilter) -> Result<(), FeatureGateError> {
    let store = open_store(&config.database)?;
    let client = FeatureGateClient::new(Arc::clone(&store));
    let gates = client.get_feature_gate_list()?;
    let all = client.get_feature_list()?;

    if filter == ListFilter::Unavailable {
        let missing = unavailable_features(&gates, &all);
        if json {
            print_json(&missing);
            return Ok(());
        }
        println!("{:<32} GATE", "NAME");
        for entry in &missing {
            println!("{:<32} {}", entry.feature, entry.gate);
        }
        return Ok(());
    }

    let features: Vec<_> = all
        .into_iter()
        .filter(|f| match filter {
            ListFilter::Activated => f.status.activated,
            ListFilter::Deactivated => !f.status.activated,
            ListFilter::All | ListFilter::Unavailable => true,
        })
        .collect();

    if json {
        print_json(&features);
        return Ok(());
    }

    println!(
        "{:<32} {:<18} {:<10} {:<20} DESCRIPTION",
        "NAME", "STABILITY", "ACTIVATED", "GATE"
    );
    for feature in &features {
        let owners: Vec<&str> = gates_referencing(&gates, feature.name())
            .into_iter()
            .map(FeatureGate::name)
            .collect();
        let gate = if owners.is_empty() {
            "-".to_string()
        } else {
            owners.join(",")
        };
        println!(
            "{:<32} {:<18} {:<10} {:<20} {}",
            feature.name(),
            feature.spec.stability.label(),
            feature.status.activated,
            gate,
            feature.spec.description
        );
    }
    Ok(())
}

/// List FeatureGates with their reference counts.
pub fn cmd_gates(config: &Config, json: bool) -> Result<(), FeatureGateError> {
    let store = open_store(&config.database)?;
    let gates = FeatureGateClient::new(store).get_feature_gate_list()?;

    if json {
        print_json(&gates);
        return Ok(());
    }

    println!("{:<32} {:<10} {:<10}", "NAME", "FEATURES", "RESULTS");
    for gate in &gates {
        println!(
            "{:<32} {:<10} {:<10}",
            gate.name(),
            gate.spec.features.len(),
            gate.status.results.len()
        );
    }
    Ok(())
}

/// Show one FeatureGate: its intents and the recorded results.
pub fn cmd_describe(config: &Config, json: bool, name: &str) -> Result<(), FeatureGateError> {
    let store = open_store(&config.database)?;
    let gate = FeatureGateClient::new(store).get_feature_gate(name)?;

    if json {
        print_json(&gate);
        return Ok(());
    }

    println!("FeatureGate: {}", gate.name());
    println!("Version:     {}", gate.metadata.resource_version);
    println!();
    println!("Features:");
    for reference in &gate.spec.features {
        println!(
            "  {:<32} activate={:<5} voidWarranty={}",
            reference.name, reference.activate, reference.permanently_void_all_support_guarantees
        );
    }
    println!();
    println!("Results:");
    for result in gate.status.results.values() {
        println!(
            "  {:<32} {:<8} {}",
            result.name,
            result.status.to_string(),
            result.message
        );
    }
    Ok(())
}

// =============================================================================
// TOGGLE COMMANDS
// =============================================================================

/// Activate a Feature and reconcile it.
pub async fn cmd_activate(
    config: &Config,
    json: bool,
    feature: &str,
    warranty_void_allowed: bool,
) -> Result<(), FeatureGateError> {
    let store = open_store(&config.database)?;
    let client = FeatureGateClient::new(Arc::clone(&store));
    let name = feature.to_string();
    let outcome = tokio::task::spawn_blocking(move || {
        client.activate_feature(&name, warranty_void_allowed)
    })
    .await
    .map_err(|e| FeatureGateError::storage("activate feature", e))??;

    let completed = controller(config, &store)
        .run_until_idle([feature.to_string()])
        .await;
    if json {
        print_json(&serde_json::json!({ "feature": feature, "outcome": outcome }));
        return report_quietly(completed);
    }
    println!("Feature {} activated in FeatureGate {}", feature, outcome.gate());
    report(json, completed)
}

/// Deactivate a Feature and reconcile it.
pub async fn cmd_deactivate(
    config: &Config,
    json: bool,
    feature: &str,
) -> Result<(), FeatureGateError> {
    let store = open_store(&config.database)?;
    let client = FeatureGateClient::new(Arc::clone(&store));
    let name = feature.to_string();
    let outcome = tokio::task::spawn_blocking(move || client.deactivate_feature(&name))
        .await
        .map_err(|e| FeatureGateError::storage("deactivate feature", e))??;

    let completed = controller(config, &store)
        .run_until_idle([feature.to_string()])
        .await;
    if json {
        print_json(&serde_json::json!({ "feature": feature, "outcome": outcome }));
        return report_quietly(completed);
    }
    println!("Feature {} deactivated in FeatureGate {}", feature, outcome.gate());
    report(json, completed)
}

/// Surface the first reconcile error without printing the reports.
fn report_quietly(completed: Vec<Completed>) -> Result<(), FeatureGateError> {
    completed
        .into_iter()
        .find_map(|(_, result)| result.err())
        .map_or(Ok(()), Err)
}

// =============================================================================
// RECONCILE / DELETE COMMANDS
// =============================================================================

/// Reconcile one Feature, or every name a full resync would visit.
pub async fn cmd_reconcile(
    config: &Config,
    json: bool,
    feature: Option<String>,
) -> Result<(), FeatureGateError> {
    let store = open_store(&config.database)?;
    let controller = controller(config, &store);
    let names = match feature {
        Some(name) => vec![name],
        None => controller.resync_requests().await?,
    };
    let completed = controller.run_until_idle(names).await;
    report(json, completed)
}

/// Delete a Feature, then reconcile so gates stop reporting it.
pub async fn cmd_delete_feature(
    config: &Config,
    json: bool,
    name: &str,
) -> Result<(), FeatureGateError> {
    let store = open_store(&config.database)?;
    if !store.delete_feature(name)? {
        return Err(FeatureGateError::feature_not_found(name));
    }

    let completed = controller(config, &store)
        .run_until_idle([name.to_string()])
        .await;
    if !json {
        println!("Feature {name} deleted");
    }

    if !json {
        for (_, result) in &completed {
            if let Ok(report) = result {
                if let ReconcileOutcome::Orphaned { gate: Some(gate) } = &report.outcome {
                    println!(
                        "FeatureGate {gate} still references {name}; its result was marked invalid"
                    );
                }
            }
        }
    }
    report(json, completed)
}

// =============================================================================
// SERVE COMMAND
// =============================================================================

/// Start the HTTP server and the controller loop.
pub async fn cmd_serve(config: &Config) -> Result<(), FeatureGateError> {
    let store = open_store(&config.database)?;

    println!("featuregate starting...");
    println!();
    println!("Configuration:");
    println!("  Host:     {}", config.server.host);
    println!("  Port:     {}", config.server.port);
    println!("  Database: {:?}", config.database);
    println!("  Workers:  {}", config.workers);
    println!();
    println!("Endpoints:");
    println!("  GET  /health                       - Health check");
    println!("  POST /validate-featuregate         - FeatureGate admission");
    println!("  GET  /features[/{{name}}]            - Read Features");
    println!("  GET  /featuregates[/{{name}}]        - Read FeatureGates");
    println!("  POST /features/{{name}}/activate     - Activate a Feature");
    println!("  POST /features/{{name}}/deactivate   - Deactivate a Feature");
    println!();
    println!("Press Ctrl+C to stop");
    println!();

    api::run_server(config, store).await
}
