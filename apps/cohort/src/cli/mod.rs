//! # Cohort CLI Module
//!
//! This module implements the CLI interface for Cohort.
//!
//! ## Available Commands
//!
//! - `server` - Start the HTTP server
//! - `status` - Show session status
//! - `experiments` - List the experiment catalog
//! - `resolve` - Resolve a variant for a subject
//! - `convert` - Record a goal completion
//! - `audit` - Audit an experiment's split against its weights
//! - `assignments` - List stored assignments
//! - `clear` - Remove every stored assignment
//! - `export` - Export the assignment ledger
//! - `import` - Import an assignment ledger
//! - `init` - Initialize a new assignment database
//! - `hash` - Hash a seed with the bucketing hash

mod commands;

use clap::{Parser, Subcommand};
use cohort_core::CohortError;
use std::path::PathBuf;

pub use commands::*;

// =============================================================================
// CLI STRUCTURE
// =============================================================================

/// Cohort - Deterministic Bucketing Service
///
/// Stable A/B variant assignment with no coordination: the same subject
/// and namespace always produce the same variant, on every node.
#[derive(Parser, Debug)]
#[command(name = "cohort")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress banner output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Path to the assignment database
    #[arg(short = 'D', long, global = true, default_value = "cohort.redb")]
    pub database: PathBuf,

    /// Assignment store backend: "redb" (persistent) or "memory" (volatile)
    #[arg(short = 'B', long, global = true, default_value = "redb")]
    pub backend: String,

    /// Path to a TOML experiment catalog
    #[arg(short = 'E', long, global = true)]
    pub experiments: Option<PathBuf>,

    /// Output in JSON format (for programmatic access)
    #[arg(long, global = true)]
    pub json_mode: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start HTTP server
    Server {
        /// Host to bind to
        #[arg(short = 'H', long, default_value = "127.0.0.1")]
        host: String,

        /// Port to bind to
        #[arg(short, long, default_value = "8080")]
        port: u16,
    },

    /// Show session status
    Status,

    /// List the experiment catalog
    Experiments {
        /// Show arms, weights, and audience rules
        #[arg(short, long)]
        detailed: bool,
    },

    /// Resolve a variant for a subject
    Resolve {
        /// Subject identifier
        #[arg(short, long)]
        identifier: String,

        /// Experiment namespace
        #[arg(short, long)]
        namespace: String,
    },

    /// Record a goal completion for a subject
    Convert {
        /// Subject identifier
        #[arg(short, long)]
        identifier: String,

        /// Experiment namespace
        #[arg(short, long)]
        namespace: String,

        /// Goal label, e.g. "signup"
        #[arg(short, long)]
        goal: String,

        /// Goal value (defaults to 1)
        #[arg(long)]
        value: Option<i64>,
    },

    /// Audit an experiment's split against its weights
    Audit {
        /// Experiment namespace
        #[arg(short, long)]
        namespace: String,

        /// Synthetic population size
        #[arg(short, long, default_value = "10000")]
        samples: u32,

        /// Tolerated per-arm drift in basis points
        #[arg(long, default_value = "500")]
        tolerance_bp: u32,
    },

    /// List stored assignments
    Assignments,

    /// Remove every stored assignment
    Clear {
        /// Confirm the removal
        #[arg(short, long)]
        yes: bool,
    },

    /// Export the assignment ledger to a file
    Export {
        /// Output file path
        #[arg(short, long)]
        output: PathBuf,

        /// Export format (canonical, json)
        #[arg(short = 't', long, default_value = "canonical")]
        format: String,
    },

    /// Import an assignment ledger from a file (redb backend only)
    Import {
        /// Input file path
        #[arg(short, long)]
        input: PathBuf,
    },

    /// Initialize a new empty assignment database
    Init {
        /// Force initialization even if the database exists
        #[arg(short, long)]
        force: bool,
    },

    /// Hash a seed with the bucketing hash
    Hash {
        /// Seed string (identifier and namespace, concatenated)
        #[arg(short, long)]
        seed: String,
    },
}

// =============================================================================
// COMMAND EXECUTION
// =============================================================================

/// Execute the CLI with parsed arguments.
pub async fn execute(cli: Cli) -> Result<(), CohortError> {
    let backend = cli.backend.as_str();
    let json_mode = cli.json_mode;
    let catalog_path = cli.experiments.as_deref();

    match cli.command {
        Some(Commands::Server { host, port }) => {
            cmd_server(&cli.database, backend, catalog_path, &host, port).await
        }
        Some(Commands::Status) => cmd_status(&cli.database, backend, catalog_path, json_mode),
        Some(Commands::Experiments { detailed }) => {
            cmd_experiments(catalog_path, json_mode, detailed)
        }
        Some(Commands::Resolve {
            identifier,
            namespace,
        }) => cmd_resolve(
            &cli.database,
            backend,
            catalog_path,
            json_mode,
            &identifier,
            &namespace,
        ),
        Some(Commands::Convert {
            identifier,
            namespace,
            goal,
            value,
        }) => cmd_convert(
            &cli.database,
            backend,
            catalog_path,
            json_mode,
            &identifier,
            &namespace,
            &goal,
            value,
        ),
        Some(Commands::Audit {
            namespace,
            samples,
            tolerance_bp,
        }) => cmd_audit(catalog_path, json_mode, &namespace, samples, tolerance_bp),
        Some(Commands::Assignments) => cmd_assignments(&cli.database, backend, json_mode),
        Some(Commands::Clear { yes }) => cmd_clear(&cli.database, backend, yes),
        Some(Commands::Export { output, format }) => {
            cmd_export(&cli.database, backend, &output, &format)
        }
        Some(Commands::Import { input }) => cmd_import(&cli.database, backend, &input),
        Some(Commands::Init { force }) => cmd_init(&cli.database, backend, force),
        Some(Commands::Hash { seed }) => cmd_hash(json_mode, &seed),
        None => {
            // No subcommand means show status
            cmd_status(&cli.database, backend, catalog_path, json_mode)
        }
    }
}
