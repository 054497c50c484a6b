//! # hasheq-core
//!
//! The HashEqual equivalence ledger - THE LOGIC.
//!
//! A HashEqual claim records that two artifacts, identified by
//! `(algorithm, digest)`, are the same artifact. Claims are stored in a
//! property graph as a hub node joined to both artifacts:
//!
//! ```text
//! artifact --subject--> hash_equal --is_equal--> equal_artifact
//! ```
//!
//! ## Architecture
//!
//! - `types`: identifiers, inputs, records, filters and errors
//! - `graph`: the transactional store seam plus the in-memory store
//! - `storage`: the redb store and the backend selector
//! - `resolver`, `upsert`, `linker`, `query`: the four ledger components
//! - `retry`: whole-operation retry for transient store failures
//! - `ledger`: the facade combining all of the above
//!
//! ## Constraints
//!
//! - Synchronous; no async and no network dependencies
//! - Every operation is one store transaction
//! - No process-wide state: the store is always passed in explicitly

// =============================================================================
// MODULES
// =============================================================================

pub mod context;
pub mod cursor;
pub mod graph;
pub mod ledger;
pub mod linker;
pub mod primitives;
pub mod query;
pub mod resolver;
pub mod retry;
pub mod storage;
pub mod types;
pub mod upsert;

// =============================================================================
// RE-EXPORTS: Core Types (from types module)
// =============================================================================

pub use types::{
    Artifact, ArtifactKey, ArtifactPattern, ArtifactSpec, Edge, EdgeInsert, EdgeKey, EdgeLabel,
    HashEqError, HashEqual, HashEqualDoc, HashEqualFilter, HashEqualInput, HashEqualNode,
    LedgerCounts, NodeId, Provenance, normalize,
};

// =============================================================================
// RE-EXPORTS: Ledger Engine
// =============================================================================

pub use context::Context;
pub use cursor::Cursor;
pub use graph::{Graph, GraphStore, ReadTxn, WriteTxn};
pub use ledger::HashEqualLedger;
pub use linker::{EdgeLinker, LinkOutcome, edge_key};
pub use query::EquivalenceQuery;
pub use resolver::ArtifactResolver;
pub use retry::{Classifier, RetryPolicy};
pub use storage::{RedbGraph, StorageBackend};
pub use upsert::ClaimUpsert;
