//! # Edge Linker
//!
//! Materializes the two edges that attach a HashEqual claim to its artifacts:
//!
//! ```text
//! artifact --subject--> hash_equal --is_equal--> equal_artifact
//! ```
//!
//! Edge keys are a pure function of `(from, to, label)`, and every write is
//! insert-or-ignore, so linking the same claim any number of times leaves
//! exactly two edges behind.

use crate::graph::WriteTxn;
use crate::primitives::EDGE_COLLECTION;
use crate::{Artifact, Edge, EdgeInsert, EdgeKey, EdgeLabel, HashEqError, HashEqualNode, NodeId};

/// Derive the storage key of an edge.
#[must_use]
pub fn edge_key(from: NodeId, to: NodeId, label: EdgeLabel) -> EdgeKey {
    EdgeKey(format!("{EDGE_COLLECTION}/{label}/{from}/{to}"))
}

/// Outcome of a link call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LinkOutcome {
    /// Edges newly written by this call.
    pub inserted: usize,
    /// Edges that already existed.
    pub ignored: usize,
}

/// Idempotent edge creation for claims.
pub struct EdgeLinker;

impl EdgeLinker {
    /// Ensure the `subject` and `is_equal` edges of `hash_equal` exist.
    pub fn link<T: WriteTxn>(
        txn: &mut T,
        artifact: &Artifact,
        hash_equal: &HashEqualNode,
        equal_artifact: &Artifact,
    ) -> Result<LinkOutcome, HashEqError> {
        let edges = [
            Edge::new(hash_equal.id, equal_artifact.id, EdgeLabel::IsEqual),
            Edge::new(artifact.id, hash_equal.id, EdgeLabel::Subject),
        ];

        let mut outcome = LinkOutcome::default();
        for edge in &edges {
            let key = edge_key(edge.from, edge.to, edge.label);
            match txn.insert_edge(&key, edge)? {
                EdgeInsert::Inserted => outcome.inserted += 1,
                EdgeInsert::Ignored => outcome.ignored += 1,
            }
        }

        tracing::debug!(
            hash_equal = %hash_equal.id,
            inserted = outcome.inserted,
            ignored = outcome.ignored,
            "hash_equal edges linked"
        );
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{Graph, GraphStore, ReadTxn};
    use crate::upsert::ClaimUpsert;
    use crate::{ArtifactSpec, Context, HashEqualDoc, HashEqualInput};

    #[test]
    fn edge_key_is_deterministic() {
        let a = edge_key(NodeId(1), NodeId(2), EdgeLabel::Subject);
        let b = edge_key(NodeId(1), NodeId(2), EdgeLabel::Subject);
        assert_eq!(a, b);
        assert_eq!(a.as_str(), "hashEqualsEdges/subject/1/2");
    }

    #[test]
    fn edge_key_depends_on_direction_and_label() {
        let forward = edge_key(NodeId(1), NodeId(2), EdgeLabel::Subject);
        let reverse = edge_key(NodeId(2), NodeId(1), EdgeLabel::Subject);
        let relabel = edge_key(NodeId(1), NodeId(2), EdgeLabel::IsEqual);
        assert_ne!(forward, reverse);
        assert_ne!(forward, relabel);
    }

    #[test]
    fn linking_twice_keeps_two_edges() {
        let graph = Graph::new();
        let ctx = Context::background();
        let mut txn = graph.begin_write(&ctx).expect("begin");
        let a = txn
            .register_artifact(&ArtifactSpec::new("sha256", "aa").normalize().expect("key"))
            .expect("register");
        let b = txn
            .register_artifact(&ArtifactSpec::new("sha512", "bb").normalize().expect("key"))
            .expect("register");
        let doc = HashEqualDoc::new(
            &a,
            &b,
            HashEqualInput::new("j", "c", "o").normalize().expect("valid"),
        );
        let claim = ClaimUpsert::upsert(&mut txn, &doc).expect("upsert");

        let first = EdgeLinker::link(&mut txn, &a, &claim, &b).expect("link");
        let second = EdgeLinker::link(&mut txn, &a, &claim, &b).expect("link");

        assert_eq!(first, LinkOutcome { inserted: 2, ignored: 0 });
        assert_eq!(second, LinkOutcome { inserted: 0, ignored: 2 });
        assert_eq!(txn.counts().expect("counts").edges, 2);
    }
}
