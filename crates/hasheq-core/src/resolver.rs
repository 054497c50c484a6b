//! # Artifact Resolver
//!
//! Resolve a normalized `(algorithm, digest)` pair to its existing artifact
//! node. Artifacts are owned by the identity store; the resolver never
//! creates them.

use crate::graph::ReadTxn;
use crate::{Artifact, ArtifactKey, HashEqError};

/// Lookup of existing artifact nodes.
pub struct ArtifactResolver;

impl ArtifactResolver {
    /// Resolve `key` inside the caller's transaction.
    ///
    /// # Errors
    /// - `NotFound` if no artifact is stored under `key`
    /// - `IntegrityViolation` if the store yields more than one node for `key`
    pub fn resolve<T: ReadTxn>(
        txn: &mut T,
        key: &ArtifactKey,
    ) -> Result<Artifact, HashEqError> {
        txn.artifacts_by_key(key)?
            .at_most_one("resolve_artifact", || key.to_string())?
            .ok_or_else(|| HashEqError::NotFound {
                algorithm: key.algorithm().to_string(),
                digest: key.digest().to_string(),
            })
    }
}
