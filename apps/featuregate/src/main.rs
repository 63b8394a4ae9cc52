//! # featuregate
//!
//! Controller, admission endpoint and command surface for stability-gated
//! Features.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────┐
//! │                 apps/featuregate (THE BINARY)              │
//! │                                                            │
//! │  ┌─────────────┐   ┌──────────────┐   ┌────────────────┐   │
//! │  │    CLI      │   │  HTTP API    │   │   Controller   │   │
//! │  │   (clap)    │   │   (axum)     │   │    (tokio)     │   │
//! │  └──────┬──────┘   └──────┬───────┘   └───────┬────────┘   │
//! │         └─────────────────┼───────────────────┘            │
//! │                           ▼                                │
//! │                  ┌──────────────────┐                      │
//! │                  │ featuregate-core │                      │
//! │                  │   (THE LOGIC)    │                      │
//! │                  └──────────────────┘                      │
//! └────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```bash
//! featuregate init --system-gate
//! featuregate apply -f features.json
//! featuregate activate periscope --permanently-void-all-support-guarantees
//! featuregate serve --port 8443
//! ```

use clap::Parser;
use featuregate::cli;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    // FEATUREGATE_LOG_FORMAT=json switches to machine-parseable output.
    let log_format =
        std::env::var("FEATUREGATE_LOG_FORMAT").unwrap_or_else(|_| "text".to_string());

    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        "featuregate=info,featuregate_core=info,tower_http=debug".into()
    });

    match log_format.as_str() {
        "json" => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
                .init();
        }
    }

    let cli = cli::Cli::parse();

    if let Err(e) = cli::execute(cli).await {
        tracing::error!("Error: {}", e);
        std::process::exit(1);
    }
}
