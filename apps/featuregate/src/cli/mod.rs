//! # featuregate CLI Module
//!
//! ## Available Commands
//!
//! - `init` - Create the database, optionally with the system FeatureGate
//! - `apply` - Create or update Features and FeatureGates from a JSON file
//! - `list` - List Features and their observed activation
//! - `gates` - List FeatureGates
//! - `describe` - Show one FeatureGate with its intents and results
//! - `activate` / `deactivate` - Toggle a Feature through its owning gate
//! - `reconcile` - Run the reconciler once for one or all Features
//! - `delete-feature` - Remove a Feature and reconcile its leftovers
//! - `serve` - Start the admission endpoint and the controller loop

mod commands;

use crate::config::Config;
use clap::{Parser, Subcommand};
use featuregate_core::FeatureGateError;
use std::path::PathBuf;

pub use commands::*;

// =============================================================================
// CLI STRUCTURE
// =============================================================================

/// featuregate - stability-gated Feature toggles
///
/// Admits FeatureGate changes against the stability policy of each Feature
/// and reconciles the observed activation state.
#[derive(Parser, Debug)]
#[command(name = "featuregate")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to the database (overrides the config file)
    #[arg(short = 'D', long, global = true)]
    pub database: Option<PathBuf>,

    /// Path to a featuregate.toml config file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Output in JSON format (for programmatic access)
    #[arg(long, global = true)]
    pub json: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Initialize a new database
    Init {
        /// Replace an existing database
        #[arg(short, long)]
        force: bool,

        /// Also create the empty system FeatureGate
        #[arg(long)]
        system_gate: bool,
    },

    /// Create or update resources from a JSON manifest
    Apply {
        /// Manifest file (one document or an array)
        #[arg(short, long)]
        file: PathBuf,

        /// Skip the reconcile pass after writing
        #[arg(long)]
        no_reconcile: bool,
    },

    /// List Features
    List {
        /// Only activated Features
        #[arg(short, long, conflicts_with_all = ["deactivated", "unavailable"])]
        activated: bool,

        /// Only deactivated Features
        #[arg(short, long, conflicts_with = "unavailable")]
        deactivated: bool,

        /// Only Features a FeatureGate references but that do not exist
        #[arg(short = 'v', long)]
        unavailable: bool,
    },

    /// List FeatureGates
    Gates,

    /// Show a FeatureGate
    Describe {
        /// FeatureGate name
        gate: String,
    },

    /// Activate a Feature
    Activate {
        /// Feature name
        feature: String,

        /// Consent to void all support guarantees if the stability level requires it
        #[arg(long)]
        permanently_void_all_support_guarantees: bool,
    },

    /// Deactivate a Feature
    Deactivate {
        /// Feature name
        feature: String,
    },

    /// Reconcile one Feature, or all of them
    Reconcile {
        /// Feature name (default: every known Feature)
        feature: Option<String>,
    },

    /// Delete a Feature
    DeleteFeature {
        /// Feature name
        name: String,
    },

    /// Start the HTTP admission endpoint and the controller loop
    Serve {
        /// Host to bind to (overrides the config file)
        #[arg(short = 'H', long)]
        host: Option<String>,

        /// Port to bind to (overrides the config file)
        #[arg(short, long)]
        port: Option<u16>,
    },
}

// =============================================================================
// COMMAND EXECUTION
// =============================================================================

/// Execute the CLI with parsed arguments.
pub async fn execute(cli: Cli) -> Result<(), FeatureGateError> {
    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(database) = cli.database {
        config.database = database;
    }
    let json = cli.json;

    match cli.command {
        Commands::Init { force, system_gate } => cmd_init(&config, json, force, system_gate),
        Commands::Apply { file, no_reconcile } => {
            cmd_apply(&config, json, &file, !no_reconcile).await
        }
        Commands::List {
            activated,
            deactivated,
            unavailable,
        } => {
            let filter = match (activated, deactivated, unavailable) {
                (true, _, _) => ListFilter::Activated,
                (_, true, _) => ListFilter::Deactivated,
                (_, _, true) => ListFilter::Unavailable,
                _ => ListFilter::All,
            };
            cmd_list(&config, json, filter)
        }
        Commands::Gates => cmd_gates(&config, json),
        Commands::Describe { gate } => cmd_describe(&config, json, &gate),
        Commands::Activate {
            feature,
            permanently_void_all_support_guarantees,
        } => {
            cmd_activate(
                &config,
                json,
                &feature,
                permanently_void_all_support_guarantees,
            )
            .await
        }
        Commands::Deactivate { feature } => cmd_deactivate(&config, json, &feature).await,
        Commands::Reconcile { feature } => cmd_reconcile(&config, json, feature).await,
        Commands::DeleteFeature { name } => cmd_delete_feature(&config, json, &name).await,
        Commands::Serve { host, port } => {
            if let Some(host) = host {
                config.server.host = host;
            }
            if let Some(port) = port {
                config.server.port = port;
            }
            cmd_serve(&config).await
        }
    }
}
