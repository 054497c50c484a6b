//! # HashEqual Ledger
//!
//! The public face of the core: ingestion and retrieval of HashEqual
//! claims over an explicitly supplied `GraphStore`.
//!
//! Every operation:
//! - validates and normalizes its input before the first store call
//! - runs inside exactly one store transaction
//! - is retried as a whole, and only for transient store errors
//!
//! The ledger holds no state besides the store handle and retry policy.

use crate::graph::{GraphStore, ReadTxn, WriteTxn};
use crate::linker::EdgeLinker;
use crate::primitives::MAX_BULK_INGEST;
use crate::query::EquivalenceQuery;
use crate::resolver::ArtifactResolver;
use crate::retry::RetryPolicy;
use crate::upsert::ClaimUpsert;
use crate::{
    Artifact, ArtifactSpec, Context, HashEqError, HashEqual, HashEqualDoc, HashEqualFilter,
    HashEqualInput, LedgerCounts,
};

const INGEST: &str = "IngestHashEqual";
const INGEST_BULK: &str = "IngestHashEquals";
const QUERY: &str = "HashEqual";
const REGISTER: &str = "RegisterArtifact";
const STATUS: &str = "Status";

/// Equivalence ledger over a graph store.
#[derive(Debug)]
pub struct HashEqualLedger<S> {
    store: S,
    retry: RetryPolicy,
}

impl<S: GraphStore> HashEqualLedger<S> {
    /// Create a ledger with the default retry policy.
    pub fn new(store: S) -> Self {
        Self::with_retry(store, RetryPolicy::default())
    }

    pub fn with_retry(store: S, retry: RetryPolicy) -> Self {
        Self { store, retry }
    }

    /// The underlying store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Record that `artifact` and `equal_artifact` are the same artifact.
    ///
    /// Both artifacts must already exist. Repeating the call with the same
    /// (normalized) arguments returns the same record and writes nothing.
    ///
    /// # Errors
    /// - `InvalidInput` for empty or oversized fields
    /// - `NotFound` if either artifact is unknown
    /// - `IntegrityViolation` if the store breaks a cardinality guarantee
    /// - store and context errors, after retries where permitted
    pub fn ingest_hash_equal(
        &self,
        ctx: &Context,
        artifact: &ArtifactSpec,
        equal_artifact: &ArtifactSpec,
        hash_equal: &HashEqualInput,
    ) -> Result<HashEqual, HashEqError> {
        let artifact_key = artifact.normalize()?;
        let equal_key = equal_artifact.normalize()?;
        let provenance = hash_equal.normalize()?;

        self.retry
            .run(ctx, INGEST, |attempt| {
                let mut txn = self.store.begin_write(ctx)?;
                let artifact = ArtifactResolver::resolve(&mut txn, &artifact_key)?;
                let equal_artifact = ArtifactResolver::resolve(&mut txn, &equal_key)?;

                let doc = HashEqualDoc::new(&artifact, &equal_artifact, provenance.clone());
                let claim = ClaimUpsert::upsert(&mut txn, &doc)?;
                let outcome = EdgeLinker::link(&mut txn, &artifact, &claim, &equal_artifact)?;
                txn.commit()?;

                tracing::info!(
                    id = %claim.id,
                    artifact = %artifact_key,
                    equal_artifact = %equal_key,
                    new_edges = outcome.inserted,
                    attempt,
                    "hash_equal ingested"
                );
                Ok(HashEqual::assemble(&claim, artifact, equal_artifact))
            })
            .map_err(|e| e.within(INGEST))
    }

    /// Ingest many claims; item `i` pairs `artifacts[i]` with
    /// `equal_artifacts[i]` under `hash_equals[i]`.
    ///
    /// Each item is an independent atomic ingestion. The first failure
    /// stops the batch and is reported as `BatchItem` with its index; items
    /// before it stay ingested.
    pub fn ingest_hash_equals(
        &self,
        ctx: &Context,
        artifacts: &[ArtifactSpec],
        equal_artifacts: &[ArtifactSpec],
        hash_equals: &[HashEqualInput],
    ) -> Result<Vec<HashEqual>, HashEqError> {
        if artifacts.len() != equal_artifacts.len() || artifacts.len() != hash_equals.len() {
            return Err(HashEqError::InvalidInput(format!(
                "uneven HashEqual batch: {} artifacts, {} equal artifacts, {} hash_equals",
                artifacts.len(),
                equal_artifacts.len(),
                hash_equals.len()
            )));
        }
        if artifacts.len() > MAX_BULK_INGEST {
            return Err(HashEqError::InvalidInput(format!(
                "batch of {} exceeds maximum {MAX_BULK_INGEST}",
                artifacts.len()
            )));
        }

        let mut records = Vec::with_capacity(artifacts.len());
        for (index, ((artifact, equal_artifact), hash_equal)) in artifacts
            .iter()
            .zip(equal_artifacts)
            .zip(hash_equals)
            .enumerate()
        {
            let record = self
                .ingest_hash_equal(ctx, artifact, equal_artifact, hash_equal)
                .map_err(|e| HashEqError::BatchItem {
                    index,
                    source: Box::new(e.within(INGEST_BULK)),
                })?;
            records.push(record);
        }
        tracing::info!(count = records.len(), "hash_equal batch ingested");
        Ok(records)
    }

    /// Every claim matching `filter`, ordered by claim id.
    ///
    /// # Errors
    /// - `InvalidInput` for more than two artifact patterns, before any
    ///   store call
    /// - `IntegrityViolation` for dangling or missing edges
    pub fn hash_equal(
        &self,
        ctx: &Context,
        filter: &HashEqualFilter,
    ) -> Result<Vec<HashEqual>, HashEqError> {
        filter.validate()?;
        self.retry
            .run(ctx, QUERY, |_| {
                let mut txn = self.store.begin_read(ctx)?;
                EquivalenceQuery::run(&mut txn, filter)
            })
            .map_err(|e| e.within(QUERY))
    }

    /// Register an artifact, returning the existing node when present.
    pub fn register_artifact(
        &self,
        ctx: &Context,
        artifact: &ArtifactSpec,
    ) -> Result<Artifact, HashEqError> {
        let key = artifact.normalize()?;
        self.retry
            .run(ctx, REGISTER, |_| {
                let mut txn = self.store.begin_write(ctx)?;
                let artifact = txn.register_artifact(&key)?;
                txn.commit()?;
                tracing::debug!(id = %artifact.id, key = %key, "artifact registered");
                Ok(artifact)
            })
            .map_err(|e| e.within(REGISTER))
    }

    /// Node and edge counts.
    pub fn status(&self, ctx: &Context) -> Result<LedgerCounts, HashEqError> {
        self.retry
            .run(ctx, STATUS, |_| self.store.begin_read(ctx)?.counts())
            .map_err(|e| e.within(STATUS))
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::Graph;
    use crate::{ArtifactPattern, NodeId};

    fn ledger() -> HashEqualLedger<Graph> {
        let ledger = HashEqualLedger::new(Graph::new());
        let ctx = Context::background();
        for (alg, dig) in [("sha256", "aa"), ("sha512", "bb"), ("sha1", "cc")] {
            ledger
                .register_artifact(&ctx, &ArtifactSpec::new(alg, dig))
                .expect("register");
        }
        ledger
    }

    fn provenance() -> HashEqualInput {
        HashEqualInput::new("Same Content", "Tool-X", "Scan-Y")
    }

    #[test]
    fn ingest_returns_normalized_record() {
        let ledger = ledger();
        let record = ledger
            .ingest_hash_equal(
                &Context::background(),
                &ArtifactSpec::new("SHA256", "AA"),
                &ArtifactSpec::new("sha512", "BB"),
                &provenance(),
            )
            .expect("ingest");

        assert_eq!(record.artifacts[0].algorithm, "sha256");
        assert_eq!(record.artifacts[0].digest, "aa");
        assert_eq!(record.artifacts[1].digest, "bb");
        assert_eq!(record.justification, "same content");
        assert_eq!(record.collector, "tool-x");
        assert_eq!(record.origin, "scan-y");
    }

    #[test]
    fn ingest_is_idempotent() {
        let ledger = ledger();
        let ctx = Context::background();
        let a = ArtifactSpec::new("sha256", "aa");
        let b = ArtifactSpec::new("sha512", "bb");

        let first = ledger.ingest_hash_equal(&ctx, &a, &b, &provenance()).expect("ingest");
        let second = ledger.ingest_hash_equal(&ctx, &a, &b, &provenance()).expect("ingest");
        assert_eq!(first, second);

        let counts = ledger.status(&ctx).expect("status");
        assert_eq!(counts.hash_equals, 1);
        assert_eq!(counts.edges, 2);
    }

    #[test]
    fn unknown_artifact_leaves_no_trace() {
        let ledger = ledger();
        let ctx = Context::background();
        let err = ledger
            .ingest_hash_equal(
                &ctx,
                &ArtifactSpec::new("sha256", "aa"),
                &ArtifactSpec::new("md5", "ff"),
                &provenance(),
            )
            .expect_err("missing artifact");
        assert!(matches!(err, HashEqError::NotFound { ref algorithm, .. } if algorithm == "md5"));

        let counts = ledger.status(&ctx).expect("status");
        assert_eq!(counts.hash_equals, 0);
        assert_eq!(counts.edges, 0);
    }

    #[test]
    fn bulk_rejects_uneven_lengths() {
        let ledger = ledger();
        let err = ledger
            .ingest_hash_equals(
                &Context::background(),
                &[ArtifactSpec::new("sha256", "aa")],
                &[],
                &[provenance()],
            )
            .expect_err("uneven");
        assert!(matches!(err, HashEqError::InvalidInput(_)));
    }

    #[test]
    fn bulk_preserves_input_order() {
        let ledger = ledger();
        let records = ledger
            .ingest_hash_equals(
                &Context::background(),
                &[ArtifactSpec::new("sha1", "cc"), ArtifactSpec::new("sha256", "aa")],
                &[ArtifactSpec::new("sha256", "aa"), ArtifactSpec::new("sha512", "bb")],
                &[provenance(), provenance()],
            )
            .expect("bulk");
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].artifacts[0].digest, "cc");
        assert_eq!(records[1].artifacts[0].digest, "aa");
    }

    #[test]
    fn bulk_failure_names_the_item() {
        let ledger = ledger();
        let ctx = Context::background();
        let err = ledger
            .ingest_hash_equals(
                &ctx,
                &[ArtifactSpec::new("sha256", "aa"), ArtifactSpec::new("sha256", "aa")],
                &[ArtifactSpec::new("sha512", "bb"), ArtifactSpec::new("md5", "ff")],
                &[provenance(), provenance()],
            )
            .expect_err("second item is unknown");
        assert!(
            matches!(&err, HashEqError::BatchItem { index: 1, source }
                if matches!(**source, HashEqError::NotFound { .. })),
            "unexpected error: {err:?}"
        );

        let counts = ledger.status(&ctx).expect("status");
        assert_eq!(counts.hash_equals, 1);
    }

    #[test]
    fn query_by_either_side_finds_claim() {
        let ledger = ledger();
        let ctx = Context::background();
        let record = ledger
            .ingest_hash_equal(
                &ctx,
                &ArtifactSpec::new("sha256", "aa"),
                &ArtifactSpec::new("sha512", "bb"),
                &provenance(),
            )
            .expect("ingest");

        for pattern in [
            ArtifactPattern::exact("sha256", "aa"),
            ArtifactPattern::exact("SHA512", "BB"),
        ] {
            let found = ledger
                .hash_equal(&ctx, &HashEqualFilter::artifacts(vec![pattern]))
                .expect("query");
            assert_eq!(found, vec![record.clone()]);
        }

        let by_id = HashEqualFilter {
            id: Some(record.id),
            ..HashEqualFilter::default()
        };
        assert_eq!(ledger.hash_equal(&ctx, &by_id).expect("query").len(), 1);
        let missing = HashEqualFilter {
            id: Some(NodeId(999)),
            ..HashEqualFilter::default()
        };
        assert!(ledger.hash_equal(&ctx, &missing).expect("query").is_empty());
    }

    #[test]
    fn cancelled_context_is_reported() {
        let ledger = ledger();
        let ctx = Context::background();
        ctx.cancel();
        assert!(matches!(
            ledger.hash_equal(&ctx, &HashEqualFilter::default()),
            Err(HashEqError::Cancelled)
        ));
    }
}
