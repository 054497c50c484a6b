//! # Claim Upsert
//!
//! Create-or-reuse of HashEqual claim nodes keyed by the full tuple
//! `(artifact, equal_artifact, justification, collector, origin)`.
//!
//! The insert-if-absent step is delegated to the store as one request
//! (`WriteTxn::upsert_hash_equal`). The component only enforces the output
//! contract: the upsert must produce exactly one row.

use crate::graph::WriteTxn;
use crate::{HashEqError, HashEqualDoc, HashEqualNode};

/// Idempotent claim creation.
pub struct ClaimUpsert;

impl ClaimUpsert {
    /// Return the claim node for `doc`, creating it if absent.
    ///
    /// # Errors
    /// Returns `IntegrityViolation` when the store produces zero rows or more
    /// than one row for the tuple. Both mean the key derivation or the
    /// uniqueness constraint of the store is broken; neither is retried.
    pub fn upsert<T: WriteTxn>(
        txn: &mut T,
        doc: &HashEqualDoc,
    ) -> Result<HashEqualNode, HashEqError> {
        let node = txn
            .upsert_hash_equal(doc)?
            .at_most_one("upsert_hash_equal", || doc.to_string())?
            .ok_or_else(|| {
                tracing::error!(key = %doc, "upsert produced no rows");
                HashEqError::IntegrityViolation {
                    operation: "upsert_hash_equal".to_string(),
                    key: doc.to_string(),
                    rows: 0,
                }
            })?;

        if node.doc != *doc {
            tracing::error!(key = %doc, id = %node.id, "upsert returned a different tuple");
            return Err(HashEqError::IntegrityViolation {
                operation: "upsert_hash_equal".to_string(),
                key: doc.to_string(),
                rows: 1,
            });
        }

        tracing::debug!(id = %node.id, key = %doc, "hash_equal upserted");
        Ok(node)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{Graph, GraphStore, ReadTxn};
    use crate::{ArtifactSpec, Context, HashEqualInput};

    #[test]
    fn repeated_upsert_yields_same_node() {
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
            HashEqualInput::new("same", "tool", "scan")
                .normalize()
                .expect("valid"),
        );

        let first = ClaimUpsert::upsert(&mut txn, &doc).expect("upsert");
        let second = ClaimUpsert::upsert(&mut txn, &doc).expect("upsert");
        assert_eq!(first, second);
        assert_eq!(txn.counts().expect("counts").hash_equals, 1);
    }

    #[test]
    fn different_provenance_creates_distinct_claims() {
        let graph = Graph::new();
        let ctx = Context::background();
        let mut txn = graph.begin_write(&ctx).expect("begin");
        let a = txn
            .register_artifact(&ArtifactSpec::new("sha256", "aa").normalize().expect("key"))
            .expect("register");
        let b = txn
            .register_artifact(&ArtifactSpec::new("sha512", "bb").normalize().expect("key"))
            .expect("register");

        let one = HashEqualDoc::new(
            &a,
            &b,
            HashEqualInput::new("same", "tool-a", "scan").normalize().expect("valid"),
        );
        let two = HashEqualDoc::new(
            &a,
            &b,
            HashEqualInput::new("same", "tool-b", "scan").normalize().expect("valid"),
        );

        let n1 = ClaimUpsert::upsert(&mut txn, &one).expect("upsert");
        let n2 = ClaimUpsert::upsert(&mut txn, &two).expect("upsert");
        assert_ne!(n1.id, n2.id);
        assert_eq!(txn.counts().expect("counts").hash_equals, 2);
    }
}
