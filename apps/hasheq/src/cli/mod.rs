//! # hasheq CLI Module
//!
//! This module implements the CLI interface for hasheq.
//!
//! ## Available Commands
//!
//! - `init` - Initialize a new ledger database
//! - `server` - Start the HTTP server
//! - `artifact` - Register an artifact
//! - `ingest` - Record a HashEqual claim (flags or a JSON batch file)
//! - `query` - List HashEqual claims around up to two artifacts
//! - `status` - Show ledger counts
//! - `compact` - Reclaim free space in the database file

mod commands;

use crate::config::Config;
use crate::error::AppError;
use clap::{Parser, Subcommand};
use hasheq_core::{ArtifactPattern, ArtifactSpec, HashEqualFilter, HashEqualInput, NodeId};
use std::path::PathBuf;

pub use commands::*;

// =============================================================================
// CLI STRUCTURE
// =============================================================================

/// hasheq - HashEqual equivalence ledger
///
/// Records attested claims that two content-addressed artifacts are the
/// same artifact, and answers equivalence queries from either side.
#[derive(Parser, Debug)]
#[command(name = "hasheq")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress the startup banner
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Path to a TOML configuration file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Path to the ledger database (overrides the configuration)
    #[arg(short = 'D', long, global = true)]
    pub database: Option<PathBuf>,

    /// Output in JSON format (for programmatic access)
    #[arg(long = "json", global = true)]
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
        #[arg(short = 'H', long)]
        host: Option<String>,

        /// Port to bind to
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Show ledger status
    Status,

    /// Compact the database file
    Compact,

    /// Initialize a new empty database
    Init {
        /// Force initialization even if database exists
        #[arg(short, long)]
        force: bool,
    },

    /// Register an artifact
    Artifact {
        /// Hash algorithm (e.g. sha256)
        #[arg(short, long)]
        algorithm: String,

        /// Digest value
        #[arg(short, long)]
        digest: String,
    },

    /// Record that two artifacts are equal
    Ingest {
        /// First artifact as algorithm:digest
        #[arg(long, value_parser = parse_artifact, required_unless_present = "file")]
        artifact: Option<ArtifactSpec>,

        /// Second artifact as algorithm:digest
        #[arg(long, value_parser = parse_artifact, required_unless_present = "file")]
        equal_artifact: Option<ArtifactSpec>,

        /// Why the artifacts are considered equal
        #[arg(short, long, default_value = "")]
        justification: String,

        /// Tool or agent that collected the claim
        #[arg(long, default_value = "")]
        collector: String,

        /// Source of the claim
        #[arg(long, default_value = "")]
        origin: String,

        /// JSON batch file: [{"artifact":..,"equal_artifact":..,"hash_equal":..}]
        #[arg(short, long, conflicts_with_all = ["artifact", "equal_artifact"])]
        file: Option<PathBuf>,
    },

    /// Query HashEqual claims
    Query {
        /// Artifact pattern as algorithm:digest (repeatable, at most two)
        #[arg(short, long = "artifact", value_parser = parse_artifact)]
        artifacts: Vec<ArtifactSpec>,

        /// Only claims with this id
        #[arg(long)]
        id: Option<u64>,

        /// Only claims with this justification
        #[arg(long)]
        justification: Option<String>,

        /// Only claims from this collector
        #[arg(long)]
        collector: Option<String>,

        /// Only claims from this origin
        #[arg(long)]
        origin: Option<String>,
    },
}

/// Parse `algorithm:digest`.
pub fn parse_artifact(value: &str) -> Result<ArtifactSpec, String> {
    match value.split_once(':') {
        Some((algorithm, digest)) if !algorithm.is_empty() && !digest.is_empty() => {
            Ok(ArtifactSpec::new(algorithm, digest))
        }
        _ => Err(format!("expected algorithm:digest, got {value:?}")),
    }
}

// =============================================================================
// COMMAND EXECUTION
// =============================================================================

/// Execute the CLI with parsed arguments.
pub async fn execute(cli: Cli) -> Result<(), AppError> {
    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(database) = cli.database {
        config.database = database;
    }
    let json_mode = cli.json_mode;

    match cli.command {
        Some(Commands::Server { host, port }) => {
            if let Some(host) = host {
                config.server.host = host;
            }
            if let Some(port) = port {
                config.server.port = port;
            }
            cmd_server(&config).await
        }
        Some(Commands::Status) | None => cmd_status(&config, json_mode),
        Some(Commands::Init { force }) => cmd_init(&config, force),
        Some(Commands::Compact) => cmd_compact(&config),
        Some(Commands::Artifact { algorithm, digest }) => {
            cmd_artifact(&config, json_mode, &ArtifactSpec::new(algorithm, digest))
        }
        Some(Commands::Ingest {
            artifact,
            equal_artifact,
            justification,
            collector,
            origin,
            file,
        }) => match (file, artifact, equal_artifact) {
            (Some(file), _, _) => cmd_ingest_file(&config, json_mode, &file),
            (None, Some(artifact), Some(equal_artifact)) => cmd_ingest(
                &config,
                json_mode,
                &artifact,
                &equal_artifact,
                &HashEqualInput::new(justification, collector, origin),
            ),
            _ => Err(AppError::Config(
                "ingest needs --artifact and --equal-artifact, or --file".to_string(),
            )),
        },
        Some(Commands::Query {
            artifacts,
            id,
            justification,
            collector,
            origin,
        }) => {
            let filter = HashEqualFilter {
                id: id.map(NodeId),
                artifacts: artifacts
                    .into_iter()
                    .map(|a| ArtifactPattern::exact(a.algorithm, a.digest))
                    .collect(),
                justification,
                collector,
                origin,
            };
            cmd_query(&config, json_mode, &filter)
        }
    }
}
