//! # Cohort - Deterministic Bucketing Service
//!
//! The main binary for the Cohort variant assignment engine.
//!
//! This application provides:
//! - HTTP REST API server (axum-based)
//! - CLI interface for resolutions, audits, and ledger management
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────┐
//! │                apps/cohort (THE BINARY)              │
//! │                                                      │
//! │      ┌─────────────┐        ┌─────────────┐          │
//! │      │    CLI      │        │  HTTP API   │          │
//! │      │   (clap)    │        │   (axum)    │          │
//! │      └──────┬──────┘        └──────┬──────┘          │
//! │             │                      │                 │
//! │             └──────────┬───────────┘                 │
//! │                        ▼                             │
//! │                ┌───────────────┐                     │
//! │                │  cohort-core  │                     │
//! │                │  (THE LOGIC)  │                     │
//! │                └───────────────┘                     │
//! └──────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```bash
//! # Start the HTTP server
//! cohort server --host 0.0.0.0 --port 8080
//!
//! # CLI operations
//! cohort status
//! cohort resolve -i abc123 -n homepage_cta_test -E experiments.toml
//! cohort audit -n homepage_cta_test -E experiments.toml
//! ```

mod api;
mod cli;

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

// =============================================================================
// APPLICATION ENTRY POINT
// =============================================================================

#[tokio::main]
async fn main() {
    // Initialize tracing. COHORT_LOG_FORMAT=json switches to
    // machine-parseable output for log aggregators.
    let log_format = std::env::var("COHORT_LOG_FORMAT").unwrap_or_else(|_| "text".to_string());

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "cohort=info,tower_http=debug".into());

    match log_format.as_str() {
        "json" => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer())
                .init();
        }
    }

    // Parse CLI arguments
    let cli = cli::Cli::parse();

    // Display startup banner
    if !cli.quiet {
        print_banner();
    }

    // Execute command
    if let Err(e) = cli::execute(cli).await {
        tracing::error!("Error: {}", e);
        std::process::exit(1);
    }
}

/// Print the Cohort startup banner.
fn print_banner() {
    println!(
        r#"
   ██████╗ ██████╗ ██╗  ██╗ ██████╗ ██████╗ ████████╗
  ██╔════╝██╔═══██╗██║  ██║██╔═══██╗██╔══██╗╚══██╔══╝
  ██║     ██║   ██║███████║██║   ██║██████╔╝   ██║
  ██║     ██║   ██║██╔══██║██║   ██║██╔══██╗   ██║
  ╚██████╗╚██████╔╝██║  ██║╚██████╔╝██║  ██║   ██║
   ╚═════╝ ╚═════╝ ╚═╝  ╚═╝ ╚═════╝ ╚═╝  ╚═╝   ╚═╝

  Deterministic Bucketing Service v{}

  Deterministic • Sticky • Auditable
"#,
        env!("CARGO_PKG_VERSION")
    );
}
