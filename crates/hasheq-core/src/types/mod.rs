//! # Core Type Definitions
//!
//! This module contains all core types for the hasheq equivalence ledger:
//! - Graph identifiers (`NodeId`, `EdgeLabel`, `EdgeKey`)
//! - Artifact identity (`ArtifactSpec`, `ArtifactKey`, `Artifact`)
//! - Equivalence claims (`HashEqualInput`, `Provenance`, `HashEqualDoc`, `HashEqualNode`)
//! - Query filters and output records (`ArtifactPattern`, `HashEqualFilter`, `HashEqual`)
//! - Error types (`HashEqError`)
//!
//! ## Normalization
//!
//! Every caller-supplied string that participates in identity (algorithm,
//! digest, justification, collector, origin) is lowercased at the boundary.
//! The normalized types (`ArtifactKey`, `Provenance`) can only be built
//! through the validating constructors below.

use crate::primitives::{
    MAX_ALGORITHM_LENGTH, MAX_DIGEST_LENGTH, MAX_FILTER_ARTIFACTS, MAX_PROVENANCE_LENGTH,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

// =============================================================================
// GRAPH IDENTIFIERS
// =============================================================================

/// Unique identifier for a node in the ledger graph.
///
/// Artifacts and HashEqual claims share one identifier space so that edges
/// can reference either kind of node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NodeId(pub u64);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Label of a directed HashEqual edge.
///
/// One claim is represented by two edges:
/// `artifact --subject--> claim` and `claim --is_equal--> equal_artifact`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum EdgeLabel {
    /// Artifact to claim.
    Subject,
    /// Claim to the equal artifact.
    IsEqual,
}

impl EdgeLabel {
    /// Stable label string.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Subject => "subject",
            Self::IsEqual => "is_equal",
        }
    }

    /// Stable single-byte code used in storage keys.
    #[must_use]
    pub const fn code(self) -> u8 {
        match self {
            Self::Subject => 0,
            Self::IsEqual => 1,
        }
    }
}

impl fmt::Display for EdgeLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Deterministic key of an edge, derived from `(from, to, label)`.
///
/// Built only by [`crate::linker::edge_key`].
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EdgeKey(pub(crate) String);

impl EdgeKey {
    /// Get the key as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EdgeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A directed, labelled edge between two nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Edge {
    pub from: NodeId,
    pub to: NodeId,
    pub label: EdgeLabel,
}

impl Edge {
    #[must_use]
    pub const fn new(from: NodeId, to: NodeId, label: EdgeLabel) -> Self {
        Self { from, to, label }
    }
}

/// Result of an insert-or-ignore edge write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdgeInsert {
    /// The edge did not exist and was written.
    Inserted,
    /// An edge with the same key already existed; nothing was written.
    Ignored,
}

// =============================================================================
// NORMALIZATION
// =============================================================================

/// Lowercase a caller-supplied identity field.
#[must_use]
pub fn normalize(value: &str) -> String {
    value.to_lowercase()
}

fn check_field(name: &str, value: &str, max: usize, allow_empty: bool) -> Result<(), HashEqError> {
    if !allow_empty && value.is_empty() {
        return Err(HashEqError::InvalidInput(format!("{name} must not be empty")));
    }
    if value.len() > max {
        return Err(HashEqError::InvalidInput(format!(
            "{name} length {} exceeds maximum {max} bytes",
            value.len()
        )));
    }
    Ok(())
}

// =============================================================================
// ARTIFACTS
// =============================================================================

/// Caller-supplied artifact identity, as received at the boundary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactSpec {
    pub algorithm: String,
    pub digest: String,
}

impl ArtifactSpec {
    #[must_use]
    pub fn new(algorithm: impl Into<String>, digest: impl Into<String>) -> Self {
        Self {
            algorithm: algorithm.into(),
            digest: digest.into(),
        }
    }

    /// Validate and lowercase into a lookup key.
    pub fn normalize(&self) -> Result<ArtifactKey, HashEqError> {
        // Lowercasing can grow a string, so bounds apply to the stored form.
        let algorithm = normalize(&self.algorithm);
        let digest = normalize(&self.digest);
        check_field("algorithm", &algorithm, MAX_ALGORITHM_LENGTH, false)?;
        check_field("digest", &digest, MAX_DIGEST_LENGTH, false)?;
        Ok(ArtifactKey { algorithm, digest })
    }
}

/// Normalized artifact identity: lowercase `(algorithm, digest)`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ArtifactKey {
    algorithm: String,
    digest: String,
}

impl ArtifactKey {
    #[must_use]
    pub fn algorithm(&self) -> &str {
        &self.algorithm
    }

    #[must_use]
    pub fn digest(&self) -> &str {
        &self.digest
    }
}

impl fmt::Display for ArtifactKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.algorithm, self.digest)
    }
}

/// An artifact node as stored in the graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artifact {
    pub id: NodeId,
    pub algorithm: String,
    pub digest: String,
}

impl Artifact {
    /// Create an artifact node from its normalized key.
    #[must_use]
    pub fn new(id: NodeId, key: &ArtifactKey) -> Self {
        Self {
            id,
            algorithm: key.algorithm.clone(),
            digest: key.digest.clone(),
        }
    }
}

// =============================================================================
// HASHEQUAL CLAIMS
// =============================================================================

/// Caller-supplied provenance of a HashEqual attestation.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct HashEqualInput {
    pub justification: String,
    pub collector: String,
    pub origin: String,
}

impl HashEqualInput {
    #[must_use]
    pub fn new(
        justification: impl Into<String>,
        collector: impl Into<String>,
        origin: impl Into<String>,
    ) -> Self {
        Self {
            justification: justification.into(),
            collector: collector.into(),
            origin: origin.into(),
        }
    }

    /// Validate and lowercase all three fields.
    ///
    /// `collector` is lowercased along with the rest so that stored values
    /// stay comparable with data already written by earlier ingestions.
    pub fn normalize(&self) -> Result<Provenance, HashEqError> {
        let justification = normalize(&self.justification);
        let collector = normalize(&self.collector);
        let origin = normalize(&self.origin);
        check_field("justification", &justification, MAX_PROVENANCE_LENGTH, true)?;
        check_field("collector", &collector, MAX_PROVENANCE_LENGTH, true)?;
        check_field("origin", &origin, MAX_PROVENANCE_LENGTH, true)?;
        Ok(Provenance {
            justification,
            collector,
            origin,
        })
    }
}

/// Normalized provenance triple.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Provenance {
    justification: String,
    collector: String,
    origin: String,
}

impl Provenance {
    #[must_use]
    pub fn justification(&self) -> &str {
        &self.justification
    }

    #[must_use]
    pub fn collector(&self) -> &str {
        &self.collector
    }

    #[must_use]
    pub fn origin(&self) -> &str {
        &self.origin
    }
}

/// The full identity tuple of a HashEqual claim.
///
/// Two documents with equal fields are the same claim.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct HashEqualDoc {
    pub artifact_id: NodeId,
    pub equal_artifact_id: NodeId,
    pub provenance: Provenance,
}

impl HashEqualDoc {
    #[must_use]
    pub fn new(artifact: &Artifact, equal_artifact: &Artifact, provenance: Provenance) -> Self {
        Self {
            artifact_id: artifact.id,
            equal_artifact_id: equal_artifact.id,
            provenance,
        }
    }
}

impl fmt::Display for HashEqualDoc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "(artifact={}, equal_artifact={}, justification={:?}, collector={:?}, origin={:?})",
            self.artifact_id,
            self.equal_artifact_id,
            self.provenance.justification,
            self.provenance.collector,
            self.provenance.origin
        )
    }
}

/// A HashEqual claim node as stored in the graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HashEqualNode {
    pub id: NodeId,
    pub doc: HashEqualDoc,
}

// =============================================================================
// OUTPUT RECORD
// =============================================================================

/// The externally visible equivalence record.
///
/// `artifacts[0]` is the `subject` side, `artifacts[1]` the `is_equal` side,
/// as they were ingested.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HashEqual {
    pub id: NodeId,
    pub artifacts: [Artifact; 2],
    pub justification: String,
    pub collector: String,
    pub origin: String,
}

impl HashEqual {
    /// Combine a claim with its two endpoint artifacts.
    #[must_use]
    pub fn assemble(node: &HashEqualNode, artifact: Artifact, equal_artifact: Artifact) -> Self {
        Self {
            id: node.id,
            artifacts: [artifact, equal_artifact],
            justification: node.doc.provenance.justification.clone(),
            collector: node.doc.provenance.collector.clone(),
            origin: node.doc.provenance.origin.clone(),
        }
    }
}

// =============================================================================
// QUERY FILTERS
// =============================================================================

/// A partial artifact identity used in query filters. Absent fields match anything.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ArtifactPattern {
    #[serde(default)]
    pub id: Option<NodeId>,
    #[serde(default)]
    pub algorithm: Option<String>,
    #[serde(default)]
    pub digest: Option<String>,
}

impl ArtifactPattern {
    /// Pattern matching exactly one `(algorithm, digest)` pair.
    #[must_use]
    pub fn exact(algorithm: impl Into<String>, digest: impl Into<String>) -> Self {
        Self {
            id: None,
            algorithm: Some(algorithm.into()),
            digest: Some(digest.into()),
        }
    }

    /// Lowercase the string fields.
    #[must_use]
    pub fn normalized(&self) -> Self {
        Self {
            id: self.id,
            algorithm: self.algorithm.as_deref().map(normalize),
            digest: self.digest.as_deref().map(normalize),
        }
    }

    /// Full normalized key, when both fields are present.
    #[must_use]
    pub fn key(&self) -> Option<ArtifactKey> {
        match (&self.algorithm, &self.digest) {
            (Some(algorithm), Some(digest)) => Some(ArtifactKey {
                algorithm: normalize(algorithm),
                digest: normalize(digest),
            }),
            _ => None,
        }
    }

    /// Check a stored artifact against an already-normalized pattern.
    #[must_use]
    pub fn matches(&self, artifact: &Artifact) -> bool {
        self.id.is_none_or(|id| id == artifact.id)
            && self
                .algorithm
                .as_deref()
                .is_none_or(|a| a == artifact.algorithm)
            && self.digest.as_deref().is_none_or(|d| d == artifact.digest)
    }
}

/// Filter for HashEqual queries.
///
/// Holds zero, one or two artifact patterns plus optional claim fields.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct HashEqualFilter {
    #[serde(default)]
    pub id: Option<NodeId>,
    #[serde(default)]
    pub artifacts: Vec<ArtifactPattern>,
    #[serde(default)]
    pub justification: Option<String>,
    #[serde(default)]
    pub collector: Option<String>,
    #[serde(default)]
    pub origin: Option<String>,
}

impl HashEqualFilter {
    /// Filter on the given artifact patterns only.
    #[must_use]
    pub fn artifacts(artifacts: Vec<ArtifactPattern>) -> Self {
        Self {
            artifacts,
            ..Self::default()
        }
    }

    /// Reject filters the relation can never satisfy.
    pub fn validate(&self) -> Result<(), HashEqError> {
        if self.artifacts.len() > MAX_FILTER_ARTIFACTS {
            return Err(HashEqError::InvalidInput(format!(
                "cannot specify more than {MAX_FILTER_ARTIFACTS} artifacts in HashEqual filter, got {}",
                self.artifacts.len()
            )));
        }
        Ok(())
    }

    /// Lowercase every string field.
    #[must_use]
    pub fn normalized(&self) -> Self {
        Self {
            id: self.id,
            artifacts: self.artifacts.iter().map(ArtifactPattern::normalized).collect(),
            justification: self.justification.as_deref().map(normalize),
            collector: self.collector.as_deref().map(normalize),
            origin: self.origin.as_deref().map(normalize),
        }
    }

    /// Check a claim's own fields against an already-normalized filter.
    #[must_use]
    pub fn matches_claim(&self, node: &HashEqualNode) -> bool {
        let p = &node.doc.provenance;
        self.id.is_none_or(|id| id == node.id)
            && self
                .justification
                .as_deref()
                .is_none_or(|j| j == p.justification)
            && self.collector.as_deref().is_none_or(|c| c == p.collector)
            && self.origin.as_deref().is_none_or(|o| o == p.origin)
    }
}

// =============================================================================
// STATUS
// =============================================================================

/// Node and edge counts of the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct LedgerCounts {
    pub artifacts: usize,
    pub hash_equals: usize,
    pub edges: usize,
}

// =============================================================================
// ERROR TYPES
// =============================================================================

/// Errors that can occur in the hasheq ledger.
///
/// - No silent failures
/// - Only `TransientStore` is eligible for retry
/// - Cursor exhaustion is not an error and never appears here
#[derive(Debug, Error)]
pub enum HashEqError {
    /// The caller supplied an unusable request.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// A referenced artifact does not exist.
    #[error("artifact not found: algorithm={algorithm} digest={digest}")]
    NotFound { algorithm: String, digest: String },

    /// A connectivity or contention failure that may succeed on retry.
    #[error("transient store error in {operation}: {message}")]
    TransientStore { operation: String, message: String },

    /// A store failure that will not go away by retrying.
    #[error("store error in {operation}: {message}")]
    Store { operation: String, message: String },

    /// A lookup or upsert expected to yield at most one record yielded more.
    #[error("integrity violation in {operation}: {rows} rows for {key}")]
    IntegrityViolation {
        operation: String,
        key: String,
        rows: usize,
    },

    /// A record could not be encoded or decoded.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// The caller cancelled the operation.
    #[error("operation cancelled")]
    Cancelled,

    /// The caller's deadline passed before the operation completed.
    #[error("deadline exceeded")]
    DeadlineExceeded,

    /// Item `index` of a bulk request failed; earlier items were committed.
    #[error("batch item {index}: {source}")]
    BatchItem {
        index: usize,
        #[source]
        source: Box<HashEqError>,
    },
}

impl HashEqError {
    /// Whether the whole operation may be retried.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::TransientStore { .. })
    }

    /// Prefix the operation name of store-level errors with an outer operation.
    #[must_use]
    pub fn within(self, outer: &str) -> Self {
        match self {
            Self::TransientStore { operation, message } => Self::TransientStore {
                operation: format!("{outer}/{operation}"),
                message,
            },
            Self::Store { operation, message } => Self::Store {
                operation: format!("{outer}/{operation}"),
                message,
            },
            Self::IntegrityViolation {
                operation,
                key,
                rows,
            } => Self::IntegrityViolation {
                operation: format!("{outer}/{operation}"),
                key,
                rows,
            },
            Self::BatchItem { index, source } => Self::BatchItem {
                index,
                source: Box::new(source.within(outer)),
            },
            other => other,
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================
