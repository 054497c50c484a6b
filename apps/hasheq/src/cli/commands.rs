//! # CLI Command Implementations
//!
//! This module contains the actual implementations of CLI commands.
//!
//! Every command opens the redb ledger named by the configuration, runs one
//! ledger operation with a background `Context`, and prints the outcome as
//! text or, with `--json`, as pretty-printed JSON.

use crate::api::{self, AppState, IngestRequest, Ledger};
use crate::config::Config;
use crate::error::AppError;
use hasheq_core::{
    ArtifactSpec, Context, HashEqual, HashEqualFilter, HashEqualInput, HashEqualLedger,
    StorageBackend,
};
use std::path::Path;

// =============================================================================
// FILE SIZE LIMITS
// =============================================================================

/// Maximum size of a JSON batch file for `ingest --file` (100 MB).
const MAX_INGEST_FILE_SIZE: u64 = 100 * 1024 * 1024;

/// Validate file size before reading.
fn validate_file_size(path: &Path, max_size: u64) -> Result<(), AppError> {
    let metadata = std::fs::metadata(path)
        .map_err(|e| AppError::Io(format!("Cannot read '{}': {}", path.display(), e)))?;

    if !metadata.is_file() {
        return Err(AppError::Io(format!(
            "Path '{}' is not a regular file",
            path.display()
        )));
    }
    if metadata.len() > max_size {
        return Err(AppError::Io(format!(
            "File size {} bytes exceeds maximum allowed {} bytes",
            metadata.len(),
            max_size
        )));
    }
    Ok(())
}

// =============================================================================
// SERVER COMMAND
// =============================================================================

/// Start the HTTP server.
pub async fn cmd_server(config: &Config) -> Result<(), AppError> {
    let ledger = open_ledger(config)?;
    let server = &config.server;

    println!("hasheq Server Starting...");
    println!();
    println!("Configuration:");
    println!("  Host:       {}", server.host);
    println!("  Port:       {}", server.port);
    println!("  Database:   {:?}", config.database);
    println!("  Timeout:    {} ms", server.request_timeout_ms);
    println!("  Rate limit: {} req/s", server.rate_limit);
    println!();
    println!("Endpoints:");
    println!("  GET  /health           - Health check");
    println!("  GET  /status           - Ledger counts");
    println!("  POST /artifact         - Register an artifact");
    println!("  POST /hash_equal       - Ingest a HashEqual claim");
    println!("  POST /hash_equal/bulk  - Ingest a batch of claims");
    println!("  POST /hash_equal/query - Query claims");
    println!();
    println!("Press Ctrl+C to stop");
    println!();

    api::run_server(&server.addr(), AppState::new(ledger, server)).await
}

// =============================================================================
// STATUS COMMAND
// =============================================================================

/// Show ledger status.
pub fn cmd_status(config: &Config, json_mode: bool) -> Result<(), AppError> {
    let ledger = open_ledger(config)?;
    let counts = ledger.status(&Context::background())?;

    if json_mode {
        let output = serde_json::json!({
            "database": config.database.to_string_lossy(),
            "backend": ledger.store().kind(),
            "artifacts": counts.artifacts,
            "hash_equals": counts.hash_equals,
            "edges": counts.edges
        });
        println!(
            "{}",
            serde_json::to_string_pretty(&output).unwrap_or_default()
        );
        return Ok(());
    }

    println!("hasheq Ledger Status");
    println!("====================");
    println!("Database: {:?}", config.database);
    println!("Backend:  {}", ledger.store().kind());
    println!();
    println!("Artifacts:   {}", counts.artifacts);
    println!("HashEquals:  {}", counts.hash_equals);
    println!("Edges:       {}", counts.edges);

    Ok(())
}

// =============================================================================
// INIT COMMAND
// =============================================================================

/// Initialize a new, empty database.
pub fn cmd_init(config: &Config, force: bool) -> Result<(), AppError> {
    let path = &config.database;
    if path.exists() {
        if !force {
            return Err(AppError::Io(format!(
                "Database {:?} already exists. Use --force to overwrite.",
                path
            )));
        }
        std::fs::remove_file(path)
            .map_err(|e| AppError::Io(format!("Cannot remove {:?}: {}", path, e)))?;
    }

    let _store = StorageBackend::open(path)?;
    println!("Initialized new redb database at {:?}", path);
    Ok(())
}

// =============================================================================
// COMPACT COMMAND
// =============================================================================

/// Compact an existing database file.
pub fn cmd_compact(config: &Config) -> Result<(), AppError> {
    let path = &config.database;
    if !path.is_file() {
        return Err(AppError::Io(format!("Database {:?} does not exist", path)));
    }

    let mut store = StorageBackend::open(path)?;
    store.compact()?;
    println!("Compacted {:?}", path);
    Ok(())
}

// =============================================================================
// ARTIFACT COMMAND
// =============================================================================

/// Register an artifact and print its id.
pub fn cmd_artifact(config: &Config, json_mode: bool, spec: &ArtifactSpec) -> Result<(), AppError> {
    let ledger = open_ledger(config)?;
    let artifact = ledger.register_artifact(&Context::background(), spec)?;

    if json_mode {
        println!(
            "{}",
            serde_json::to_string_pretty(&artifact).unwrap_or_default()
        );
    } else {
        println!(
            "Artifact {} {}:{}",
            artifact.id, artifact.algorithm, artifact.digest
        );
    }
    Ok(())
}

// =============================================================================
// INGEST COMMANDS
// =============================================================================

/// Record one HashEqual claim.
pub fn cmd_ingest(
    config: &Config,
    json_mode: bool,
    artifact: &ArtifactSpec,
    equal_artifact: &ArtifactSpec,
    input: &HashEqualInput,
) -> Result<(), AppError> {
    let ledger = open_ledger(config)?;
    let record = ledger.ingest_hash_equal(&Context::background(), artifact, equal_artifact, input)?;
    print_records(std::slice::from_ref(&record), json_mode);
    Ok(())
}

/// Record every claim in a JSON batch file.
///
/// The file holds an array of `{"artifact", "equal_artifact", "hash_equal"}`
/// objects, the same shape `POST /hash_equal` accepts. The batch is ingested
/// item by item and stops at the first failure.
pub fn cmd_ingest_file(config: &Config, json_mode: bool, file: &Path) -> Result<(), AppError> {
    validate_file_size(file, MAX_INGEST_FILE_SIZE)?;
    let content = std::fs::read_to_string(file)
        .map_err(|e| AppError::Io(format!("Cannot read '{}': {}", file.display(), e)))?;
    let requests: Vec<IngestRequest> = serde_json::from_str(&content)
        .map_err(|e| AppError::Io(format!("Invalid batch file '{}': {}", file.display(), e)))?;

    let mut artifacts = Vec::with_capacity(requests.len());
    let mut equal_artifacts = Vec::with_capacity(requests.len());
    let mut inputs = Vec::with_capacity(requests.len());
    for request in requests {
        artifacts.push(request.artifact);
        equal_artifacts.push(request.equal_artifact);
        inputs.push(request.hash_equal);
    }

    let ledger = open_ledger(config)?;
    let records = ledger.ingest_hash_equals(
        &Context::background(),
        &artifacts,
        &equal_artifacts,
        &inputs,
    )?;

    if !json_mode {
        println!("Ingested {} HashEqual claims from {:?}", records.len(), file);
    }
    print_records(&records, json_mode);
    Ok(())
}

// =============================================================================
// QUERY COMMAND
// =============================================================================

/// List HashEqual claims matching `filter`.
pub fn cmd_query(config: &Config, json_mode: bool, filter: &HashEqualFilter) -> Result<(), AppError> {
    let ledger = open_ledger(config)?;
    let records = ledger.hash_equal(&Context::background(), filter)?;

    if !json_mode && records.is_empty() {
        println!("No HashEqual claims found");
        return Ok(());
    }
    print_records(&records, json_mode);
    Ok(())
}

// =============================================================================
// HELPER FUNCTIONS
// =============================================================================

/// Open the configured redb ledger with the configured retry policy.
pub fn open_ledger(config: &Config) -> Result<Ledger, AppError> {
    let store = StorageBackend::open(&config.database)?;
    tracing::debug!(database = ?config.database, "opened ledger");
    Ok(HashEqualLedger::with_retry(store, config.retry.policy()))
}

fn print_records(records: &[HashEqual], json_mode: bool) {
    if json_mode {
        println!(
            "{}",
            serde_json::to_string_pretty(records).unwrap_or_default()
        );
        return;
    }

    for record in records {
        let [a, b] = &record.artifacts;
        println!(
            "HashEqual {}: {}:{} == {}:{}",
            record.id, a.algorithm, a.digest, b.algorithm, b.digest
        );
        if !record.justification.is_empty() {
            println!("  justification: {}", record.justification);
        }
        if !record.collector.is_empty() {
            println!("  collector:     {}", record.collector);
        }
        if !record.origin.is_empty() {
            println!("  origin:        {}", record.origin);
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================
