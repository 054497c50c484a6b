//! # Storage Backends
//!
//! The ledger runs over either backend:
//! - `InMemory`: the in-memory `Graph` (fast, volatile)
//! - `Persistent`: `RedbGraph` for disk-backed ACID storage

mod redb_graph;

pub use redb_graph::{RedbGraph, RedbReader, RedbWriter};

use crate::graph::{Graph, GraphReader, GraphStore, GraphWriter, ReadTxn, WriteTxn};
use crate::{
    Artifact, ArtifactKey, Context, Cursor, Edge, EdgeInsert, EdgeKey, EdgeLabel, HashEqError,
    HashEqualDoc, HashEqualNode, LedgerCounts, NodeId,
};
use std::path::Path;

/// Storage backend selected at startup.
#[derive(Debug)]
pub enum StorageBackend {
    /// In-memory graph (fast, volatile).
    InMemory(Graph),
    /// Disk-backed graph using redb (ACID, persistent).
    Persistent(RedbGraph),
}

impl Default for StorageBackend {
    fn default() -> Self {
        Self::InMemory(Graph::new())
    }
}

impl StorageBackend {
    /// Open or create a persistent backend at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, HashEqError> {
        Ok(Self::Persistent(RedbGraph::open(path)?))
    }

    /// Reclaim free space in the database file. No-op in memory.
    pub fn compact(&mut self) -> Result<(), HashEqError> {
        match self {
            Self::InMemory(_) => Ok(()),
            Self::Persistent(redb) => redb.compact(),
        }
    }

    /// Short name of the backend, for status output.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InMemory(_) => "in-memory",
            Self::Persistent(_) => "redb",
        }
    }
}

/// Read transaction of either backend.
#[derive(Debug)]
pub enum BackendReader {
    InMemory(GraphReader),
    Persistent(RedbReader),
}

/// Write transaction of either backend.
#[derive(Debug)]
pub enum BackendWriter<'a> {
    InMemory(GraphWriter<'a>),
    Persistent(RedbWriter),
}

impl GraphStore for StorageBackend {
    type Reader<'a>
        = BackendReader
    where
        Self: 'a;
    type Writer<'a>
        = BackendWriter<'a>
    where
        Self: 'a;

    fn begin_read(&self, ctx: &Context) -> Result<BackendReader, HashEqError> {
        match self {
            Self::InMemory(graph) => graph.begin_read(ctx).map(BackendReader::InMemory),
            Self::Persistent(redb) => redb.begin_read(ctx).map(BackendReader::Persistent),
        }
    }

    fn begin_write(&self, ctx: &Context) -> Result<BackendWriter<'_>, HashEqError> {
        match self {
            Self::InMemory(graph) => graph.begin_write(ctx).map(BackendWriter::InMemory),
            Self::Persistent(redb) => redb.begin_write(ctx).map(BackendWriter::Persistent),
        }
    }
}

macro_rules! dispatch {
    ($self:ident, $enum:ident, $txn:ident => $body:expr) => {
        match $self {
            $enum::InMemory($txn) => $body,
            $enum::Persistent($txn) => $body,
        }
    };
}

macro_rules! impl_backend_reads {
    ($ty:ty, $enum:ident) => {
        impl ReadTxn for $ty {
            fn artifacts_by_key(
                &mut self,
                key: &ArtifactKey,
            ) -> Result<Cursor<Artifact>, HashEqError> {
                dispatch!(self, $enum, txn => txn.artifacts_by_key(key))
            }

            fn artifacts(&mut self) -> Result<Cursor<Artifact>, HashEqError> {
                dispatch!(self, $enum, txn => txn.artifacts())
            }

            fn artifact(&mut self, id: NodeId) -> Result<Option<Artifact>, HashEqError> {
                dispatch!(self, $enum, txn => txn.artifact(id))
            }

            fn hash_equal(&mut self, id: NodeId) -> Result<Option<HashEqualNode>, HashEqError> {
                dispatch!(self, $enum, txn => txn.hash_equal(id))
            }

            fn hash_equals(&mut self) -> Result<Cursor<HashEqualNode>, HashEqError> {
                dispatch!(self, $enum, txn => txn.hash_equals())
            }

            fn outbound(
                &mut self,
                from: NodeId,
                label: EdgeLabel,
            ) -> Result<Cursor<Edge>, HashEqError> {
                dispatch!(self, $enum, txn => txn.outbound(from, label))
            }

            fn inbound(&mut self, to: NodeId, label: EdgeLabel) -> Result<Cursor<Edge>, HashEqError> {
                dispatch!(self, $enum, txn => txn.inbound(to, label))
            }

            fn counts(&mut self) -> Result<LedgerCounts, HashEqError> {
                dispatch!(self, $enum, txn => txn.counts())
            }
        }
    };
}

impl_backend_reads!(BackendReader, BackendReader);
impl_backend_reads!(BackendWriter<'_>, BackendWriter);

impl WriteTxn for BackendWriter<'_> {
    fn upsert_hash_equal(&mut self, doc: &HashEqualDoc) -> Result<Cursor<HashEqualNode>, HashEqError> {
        dispatch!(self, BackendWriter, txn => txn.upsert_hash_equal(doc))
    }

    fn insert_edge(&mut self, key: &EdgeKey, edge: &Edge) -> Result<EdgeInsert, HashEqError> {
        dispatch!(self, BackendWriter, txn => txn.insert_edge(key, edge))
    }

    fn register_artifact(&mut self, key: &ArtifactKey) -> Result<Artifact, HashEqError> {
        dispatch!(self, BackendWriter, txn => txn.register_artifact(key))
    }

    fn commit(self) -> Result<(), HashEqError> {
        dispatch!(self, BackendWriter, txn => txn.commit())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ArtifactSpec;

    #[test]
    fn backends_behave_alike() {
        let temp = tempfile::tempdir().expect("temp dir");
        let backends = [
            StorageBackend::default(),
            StorageBackend::open(temp.path().join("ledger.redb")).expect("open"),
        ];
        let ctx = Context::background();
        let key = ArtifactSpec::new("sha256", "aa").normalize().expect("key");

        for backend in &backends {
            let mut txn = backend.begin_write(&ctx).expect("begin");
            let stored = txn.register_artifact(&key).expect("register");
            txn.commit().expect("commit");

            let mut reader = backend.begin_read(&ctx).expect("begin");
            let found = reader.artifacts_by_key(&key).expect("lookup").drain().expect("rows");
            assert_eq!(found, vec![stored], "backend {}", backend.kind());
        }
    }

    #[test]
    fn compaction_keeps_data() {
        let temp = tempfile::tempdir().expect("temp dir");
        let path = temp.path().join("ledger.redb");
        let ctx = Context::background();
        let key = ArtifactSpec::new("sha256", "aa").normalize().expect("key");

        for mut backend in [StorageBackend::default(), StorageBackend::open(&path).expect("open")] {
            let mut txn = backend.begin_write(&ctx).expect("begin");
            let stored = txn.register_artifact(&key).expect("register");
            txn.commit().expect("commit");

            backend.compact().expect("compact");

            let mut reader = backend.begin_read(&ctx).expect("begin");
            assert_eq!(reader.artifact(stored.id).expect("get"), Some(stored));
        }
    }
}
