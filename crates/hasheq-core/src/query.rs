//! # Equivalence Query
//!
//! Retrieval of HashEqual records through the claim hub.
//!
//! Equivalence is symmetric, but each claim is stored in one direction:
//!
//! ```text
//! artifact --subject--> hash_equal --is_equal--> equal_artifact
//! ```
//!
//! and nothing says which side of a pair was ingested as `artifact`. A
//! pattern is therefore matched from both ends:
//! - forward: the pattern is the `subject` source, the paired artifact is
//!   the `is_equal` target of the claim
//! - backward: the pattern is the `is_equal` target, the paired artifact is
//!   the `subject` source of the claim
//!
//! Results from both branches are unioned by claim id. Without patterns,
//! claims are enumerated once in the stored direction.

use crate::graph::ReadTxn;
use crate::{
    Artifact, ArtifactPattern, EdgeLabel, HashEqError, HashEqual, HashEqualFilter,
    HashEqualNode, NodeId,
};
use std::collections::BTreeMap;

const OPERATION: &str = "query_hash_equal";

/// Bidirectional HashEqual traversal.
pub struct EquivalenceQuery;

impl EquivalenceQuery {
    /// Run `filter` inside the caller's transaction.
    ///
    /// Records are returned ordered by claim id, each claim at most once.
    ///
    /// # Errors
    /// - `InvalidInput` if the filter names more than two artifacts; raised
    ///   before the first store request
    /// - `IntegrityViolation` if an edge points at a missing node or a claim
    ///   does not have exactly one edge of each label
    pub fn run<T: ReadTxn>(
        txn: &mut T,
        filter: &HashEqualFilter,
    ) -> Result<Vec<HashEqual>, HashEqError> {
        filter.validate()?;
        let filter = filter.normalized();
        let mut found = BTreeMap::new();

        match filter.artifacts.as_slice() {
            [] => Self::scan(txn, &filter, &mut found)?,
            [first] => Self::around(txn, &filter, first, None, &mut found)?,
            [first, second] => Self::around(txn, &filter, first, Some(second), &mut found)?,
            more => {
                return Err(HashEqError::InvalidInput(format!(
                    "cannot specify more than 2 artifacts in HashEqual filter, got {}",
                    more.len()
                )));
            }
        }

        tracing::debug!(
            patterns = filter.artifacts.len(),
            results = found.len(),
            "hash_equal query"
        );
        Ok(found.into_values().collect())
    }

    /// Enumerate every claim in the stored direction.
    fn scan<T: ReadTxn>(
        txn: &mut T,
        filter: &HashEqualFilter,
        found: &mut BTreeMap<NodeId, HashEqual>,
    ) -> Result<(), HashEqError> {
        let mut claims = txn.hash_equals()?;
        while let Some(claim) = claims.read_document()? {
            if !filter.matches_claim(&claim) {
                continue;
            }
            let subject = txn
                .inbound(claim.id, EdgeLabel::Subject)?
                .at_most_one(OPERATION, || format!("subject edge of {}", claim.id))?;
            let equal = txn
                .outbound(claim.id, EdgeLabel::IsEqual)?
                .at_most_one(OPERATION, || format!("is_equal edge of {}", claim.id))?;
            let (Some(subject), Some(equal)) = (subject, equal) else {
                return Err(unlinked(claim.id));
            };
            let artifact = Self::artifact(txn, subject.from)?;
            let equal_artifact = Self::artifact(txn, equal.to)?;
            found.insert(claim.id, HashEqual::assemble(&claim, artifact, equal_artifact));
        }
        Ok(())
    }

    /// Union of the forward and backward branches around `first`.
    fn around<T: ReadTxn>(
        txn: &mut T,
        filter: &HashEqualFilter,
        first: &ArtifactPattern,
        second: Option<&ArtifactPattern>,
        found: &mut BTreeMap<NodeId, HashEqual>,
    ) -> Result<(), HashEqError> {
        let accepts = |other: &Artifact| second.is_none_or(|p| p.matches(other));

        for anchor in Self::candidates(txn, first)? {
            // Forward: anchor --subject--> claim --is_equal--> other
            for edge in txn.outbound(anchor.id, EdgeLabel::Subject)?.drain()? {
                let claim = Self::claim(txn, edge.to)?;
                if !filter.matches_claim(&claim) {
                    continue;
                }
                for is_equal in txn.outbound(claim.id, EdgeLabel::IsEqual)?.drain()? {
                    let other = Self::artifact(txn, is_equal.to)?;
                    if accepts(&other) {
                        found
                            .entry(claim.id)
                            .or_insert_with(|| HashEqual::assemble(&claim, anchor.clone(), other));
                    }
                }
            }

            // Backward: other --subject--> claim --is_equal--> anchor
            for edge in txn.inbound(anchor.id, EdgeLabel::IsEqual)?.drain()? {
                let claim = Self::claim(txn, edge.from)?;
                if !filter.matches_claim(&claim) {
                    continue;
                }
                for subject in txn.inbound(claim.id, EdgeLabel::Subject)?.drain()? {
                    let other = Self::artifact(txn, subject.from)?;
                    if accepts(&other) {
                        found
                            .entry(claim.id)
                            .or_insert_with(|| HashEqual::assemble(&claim, other, anchor.clone()));
                    }
                }
            }
        }
        Ok(())
    }

    /// Artifacts matching a normalized pattern, using the narrowest lookup.
    fn candidates<T: ReadTxn>(
        txn: &mut T,
        pattern: &ArtifactPattern,
    ) -> Result<Vec<Artifact>, HashEqError> {
        if let Some(id) = pattern.id {
            return Ok(txn
                .artifact(id)?
                .filter(|a| pattern.matches(a))
                .into_iter()
                .collect());
        }
        if let Some(key) = pattern.key() {
            return txn.artifacts_by_key(&key)?.drain();
        }

        let mut matching = Vec::new();
        let mut all = txn.artifacts()?;
        while let Some(artifact) = all.read_document()? {
            if pattern.matches(&artifact) {
                matching.push(artifact);
            }
        }
        Ok(matching)
    }

    fn artifact<T: ReadTxn>(txn: &mut T, id: NodeId) -> Result<Artifact, HashEqError> {
        txn.artifact(id)?.ok_or_else(|| dangling(id))
    }

    fn claim<T: ReadTxn>(txn: &mut T, id: NodeId) -> Result<HashEqualNode, HashEqError> {
        txn.hash_equal(id)?.ok_or_else(|| dangling(id))
    }
}

fn dangling(id: NodeId) -> HashEqError {
    tracing::error!(node = %id, "edge points at a missing node");
    HashEqError::IntegrityViolation {
        operation: OPERATION.to_string(),
        key: format!("edge target {id}"),
        rows: 0,
    }
}

fn unlinked(id: NodeId) -> HashEqError {
    tracing::error!(hash_equal = %id, "claim is missing one of its edges");
    HashEqError::IntegrityViolation {
        operation: OPERATION.to_string(),
        key: format!("edges of hash_equal {id}"),
        rows: 0,
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{Graph, GraphStore, WriteTxn};
    use crate::linker::EdgeLinker;
    use crate::upsert::ClaimUpsert;
    use crate::{ArtifactSpec, Context, HashEqualDoc, HashEqualInput};

    /// Graph with A=sha256:aa, B=sha512:bb, C=sha1:cc and claims A≡B, C≡A.
    fn fixture() -> Graph {
        let graph = Graph::new();
        let ctx = Context::background();
        let mut txn = graph.begin_write(&ctx).expect("begin");
        let mut register = |alg: &str, dig: &str| {
            txn.register_artifact(&ArtifactSpec::new(alg, dig).normalize().expect("key"))
                .expect("register")
        };
        let a = register("sha256", "aa");
        let b = register("sha512", "bb");
        let c = register("sha1", "cc");

        for (left, right, collector) in [(&a, &b, "tool-1"), (&c, &a, "tool-2")] {
            let doc = HashEqualDoc::new(
                left,
                right,
                HashEqualInput::new("same", collector, "scan")
                    .normalize()
                    .expect("valid"),
            );
            let claim = ClaimUpsert::upsert(&mut txn, &doc).expect("upsert");
            EdgeLinker::link(&mut txn, left, &claim, right).expect("link");
        }
        txn.commit().expect("commit");
        graph
    }

    fn run(graph: &Graph, filter: &HashEqualFilter) -> Vec<HashEqual> {
        let mut txn = graph.begin_read(&Context::background()).expect("begin");
        EquivalenceQuery::run(&mut txn, filter).expect("query")
    }

    fn pair(record: &HashEqual) -> (String, String) {
        (
            record.artifacts[0].digest.clone(),
            record.artifacts[1].digest.clone(),
        )
    }

    #[test]
    fn empty_filter_lists_every_claim_once() {
        let graph = fixture();
        let all = run(&graph, &HashEqualFilter::default());
        let pairs: Vec<_> = all.iter().map(pair).collect();
        assert_eq!(
            pairs,
            vec![
                ("aa".to_string(), "bb".to_string()),
                ("cc".to_string(), "aa".to_string())
            ]
        );
    }

    #[test]
    fn single_pattern_finds_both_directions() {
        let graph = fixture();
        let around_a = run(
            &graph,
            &HashEqualFilter::artifacts(vec![ArtifactPattern::exact("SHA256", "AA")]),
        );
        assert_eq!(around_a.len(), 2);

        let around_b = run(
            &graph,
            &HashEqualFilter::artifacts(vec![ArtifactPattern::exact("sha512", "bb")]),
        );
        assert_eq!(around_b.len(), 1);
        assert_eq!(pair(&around_b[0]), ("aa".to_string(), "bb".to_string()));
    }

    #[test]
    fn pair_pattern_is_order_independent() {
        let graph = fixture();
        let ab = run(
            &graph,
            &HashEqualFilter::artifacts(vec![
                ArtifactPattern::exact("sha256", "aa"),
                ArtifactPattern::exact("sha512", "bb"),
            ]),
        );
        let ba = run(
            &graph,
            &HashEqualFilter::artifacts(vec![
                ArtifactPattern::exact("sha512", "bb"),
                ArtifactPattern::exact("sha256", "aa"),
            ]),
        );
        assert_eq!(ab.len(), 1);
        assert_eq!(ab, ba);

        let bc = run(
            &graph,
            &HashEqualFilter::artifacts(vec![
                ArtifactPattern::exact("sha512", "bb"),
                ArtifactPattern::exact("sha1", "cc"),
            ]),
        );
        assert!(bc.is_empty());
    }

    #[test]
    fn partial_pattern_scans_artifacts() {
        let graph = fixture();
        let by_algorithm = ArtifactPattern {
            algorithm: Some("SHA1".to_string()),
            ..ArtifactPattern::default()
        };
        let found = run(&graph, &HashEqualFilter::artifacts(vec![by_algorithm]));
        assert_eq!(found.len(), 1);
        assert_eq!(pair(&found[0]), ("cc".to_string(), "aa".to_string()));
    }

    #[test]
    fn provenance_fields_narrow_results() {
        let graph = fixture();
        let filter = HashEqualFilter {
            collector: Some("TOOL-2".to_string()),
            ..HashEqualFilter::artifacts(vec![ArtifactPattern::exact("sha256", "aa")])
        };
        let found = run(&graph, &filter);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].collector, "tool-2");
    }

    #[test]
    fn unknown_artifact_yields_nothing() {
        let graph = fixture();
        let found = run(
            &graph,
            &HashEqualFilter::artifacts(vec![ArtifactPattern::exact("sha256", "ff")]),
        );
        assert!(found.is_empty());
    }

    #[test]
    fn three_patterns_are_invalid() {
        let graph = fixture();
        let mut txn = graph.begin_read(&Context::background()).expect("begin");
        let filter = HashEqualFilter::artifacts(vec![ArtifactPattern::default(); 3]);
        assert!(matches!(
            EquivalenceQuery::run(&mut txn, &filter),
            Err(HashEqError::InvalidInput(_))
        ));
    }
}
