//! # hasheq - HashEqual equivalence ledger
//!
//! The main binary for the hasheq ledger.
//!
//! This application provides:
//! - HTTP REST API server (axum-based)
//! - CLI interface for ledger operations
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────┐
//! │              apps/hasheq (THE BINARY)         │
//! │                                               │
//! │     ┌─────────────┐      ┌─────────────┐      │
//! │     │    CLI      │      │  HTTP API   │      │
//! │     │   (clap)    │      │   (axum)    │      │
//! │     └──────┬──────┘      └──────┬──────┘      │
//! │            └─────────┬──────────┘             │
//! │                      ▼                        │
//! │              ┌───────────────┐                │
//! │              │  hasheq-core  │                │
//! │              │  (THE LOGIC)  │                │
//! │              └───────────────┘                │
//! └───────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```bash
//! # Start the HTTP server
//! hasheq server --host 0.0.0.0 --port 8080
//!
//! # CLI operations
//! hasheq status
//! hasheq ingest --artifact sha256:ab12 --equal-artifact sha512:cd34 --collector scanner
//! hasheq ingest -f claims.json
//! hasheq query -a sha256:ab12
//! ```

use clap::Parser;
use hasheq::cli;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

// =============================================================================
// APPLICATION ENTRY POINT
// =============================================================================

#[tokio::main]
async fn main() {
    // Parse CLI arguments
    let cli = cli::Cli::parse();

    // Initialize tracing; HASHEQ_LOG (or RUST_LOG) sets the filter and
    // HASHEQ_LOG_FORMAT=json enables machine-parseable output.
    let log_format = std::env::var("HASHEQ_LOG_FORMAT").unwrap_or_else(|_| "text".to_string());
    let default_filter = if cli.verbose {
        "hasheq=debug,hasheq_core=debug,tower_http=debug"
    } else {
        "hasheq=info,hasheq_core=info,tower_http=debug"
    };
    let filter = tracing_subscriber::EnvFilter::try_from_env("HASHEQ_LOG")
        .or_else(|_| tracing_subscriber::EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| default_filter.into());

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

    // Display startup banner
    if !cli.quiet && !cli.json_mode {
        print_banner();
    }

    // Execute command
    if let Err(e) = cli::execute(cli).await {
        tracing::error!("Error: {}", e);
        std::process::exit(1);
    }
}

/// Print the hasheq startup banner.
fn print_banner() {
    println!(
        r#"
  hasheq v{}

  HashEqual equivalence ledger
"#,
        env!("CARGO_PKG_VERSION")
    );
}
