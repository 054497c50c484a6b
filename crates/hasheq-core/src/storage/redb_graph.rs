//! # redb-backed Graph Storage
//!
//! A disk-backed ledger store using the redb embedded database.
//!
//! redb provides everything the ledger delegates to its store:
//! - ACID transactions (ingestion is one write transaction)
//! - A single serialized writer, which makes the claim upsert and the
//!   insert-or-ignore edge writes indivisible
//! - MVCC snapshots for queries, running alongside the writer
//!
//! Unlike the in-memory `Graph`, no state is cached in-process: every
//! identifier counter and index lives in the database.

use crate::graph::{GraphStore, ReadTxn, WriteTxn};
use crate::{
    Artifact, ArtifactKey, Context, Cursor, Edge, EdgeInsert, EdgeKey, EdgeLabel, HashEqError,
    HashEqualDoc, HashEqualNode, LedgerCounts, NodeId,
};
use redb::{
    Database, ReadTransaction, ReadableDatabase, ReadableTable, ReadableTableMetadata,
    TableDefinition, WriteTransaction,
};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::path::Path;

/// Table for artifacts: NodeId(u64) -> serialized Artifact bytes
const ARTIFACTS: TableDefinition<u64, &[u8]> = TableDefinition::new("artifacts");

/// Table for the artifact index: (algorithm, digest) -> NodeId(u64)
const ARTIFACT_INDEX: TableDefinition<(&str, &str), u64> = TableDefinition::new("artifact_index");

/// Table for claims: NodeId(u64) -> serialized HashEqualNode bytes
const HASH_EQUALS: TableDefinition<u64, &[u8]> = TableDefinition::new("hash_equals");

/// Table for the claim index: serialized HashEqualDoc -> NodeId(u64)
const HASH_EQUAL_INDEX: TableDefinition<&[u8], u64> = TableDefinition::new("hash_equal_index");

/// Table for edges: deterministic edge key -> serialized Edge bytes
const EDGES: TableDefinition<&str, &[u8]> = TableDefinition::new("hash_equal_edges");

/// Adjacency: (from, label, to) -> ()
const OUTBOUND: TableDefinition<(u64, u8, u64), ()> = TableDefinition::new("outbound");

/// Adjacency: (to, label, from) -> ()
const INBOUND: TableDefinition<(u64, u8, u64), ()> = TableDefinition::new("inbound");

/// Table for metadata: key string -> value u64
const METADATA: TableDefinition<&str, u64> = TableDefinition::new("metadata");

const NEXT_NODE_ID: &str = "next_node_id";

// =============================================================================
// ERROR MAPPING
// =============================================================================

/// Map a redb error into the ledger taxonomy, tagged with `operation`.
///
/// I/O failures are transient; everything else (corruption, schema
/// mismatch, misuse) is permanent.
fn store_err<E: Into<redb::Error>>(operation: &'static str) -> impl FnOnce(E) -> HashEqError {
    move |e| match e.into() {
        redb::Error::Io(io) => HashEqError::TransientStore {
            operation: operation.to_string(),
            message: io.to_string(),
        },
        other => HashEqError::Store {
            operation: operation.to_string(),
            message: other.to_string(),
        },
    }
}

fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, HashEqError> {
    postcard::to_allocvec(value).map_err(|e| HashEqError::Serialization(e.to_string()))
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, HashEqError> {
    postcard::from_bytes(bytes).map_err(|e| HashEqError::Serialization(e.to_string()))
}

fn label_from_code(code: u8) -> Result<EdgeLabel, HashEqError> {
    match code {
        0 => Ok(EdgeLabel::Subject),
        1 => Ok(EdgeLabel::IsEqual),
        other => Err(HashEqError::Serialization(format!(
            "unknown edge label code {other}"
        ))),
    }
}

// =============================================================================
// REDB GRAPH
// =============================================================================

/// A disk-backed ledger store using redb.
pub struct RedbGraph {
    /// The redb database handle.
    db: Database,
}

impl std::fmt::Debug for RedbGraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedbGraph").finish_non_exhaustive()
    }
}

impl RedbGraph {
    /// Open or create a ledger database at the given path.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, HashEqError> {
        let db = Database::create(path.as_ref()).map_err(store_err("open database"))?;

        // Initialize tables if they don't exist
        let write_txn = db.begin_write().map_err(store_err("begin_write"))?;
        {
            write_txn
                .open_table(ARTIFACTS)
                .map_err(store_err("open artifacts"))?;
            write_txn
                .open_table(ARTIFACT_INDEX)
                .map_err(store_err("open artifact_index"))?;
            write_txn
                .open_table(HASH_EQUALS)
                .map_err(store_err("open hash_equals"))?;
            write_txn
                .open_table(HASH_EQUAL_INDEX)
                .map_err(store_err("open hash_equal_index"))?;
            write_txn
                .open_table(EDGES)
                .map_err(store_err("open edges"))?;
            write_txn
                .open_table(OUTBOUND)
                .map_err(store_err("open outbound"))?;
            write_txn
                .open_table(INBOUND)
                .map_err(store_err("open inbound"))?;
            write_txn
                .open_table(METADATA)
                .map_err(store_err("open metadata"))?;
        }
        write_txn.commit().map_err(store_err("commit"))?;

        tracing::debug!(path = %path.as_ref().display(), "ledger database opened");
        Ok(Self { db })
    }

    /// Compact the database file.
    ///
    /// Needs `&mut self`, so no transaction can be open.
    pub fn compact(&mut self) -> Result<(), HashEqError> {
        self.db.compact().map_err(store_err("compact"))?;
        tracing::debug!("ledger database compacted");
        Ok(())
    }
}

/// Read transaction over a redb snapshot.
pub struct RedbReader {
    ctx: Context,
    txn: ReadTransaction,
}

/// Write transaction on the redb database.
pub struct RedbWriter {
    ctx: Context,
    txn: WriteTransaction,
}

impl std::fmt::Debug for RedbReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedbReader").finish_non_exhaustive()
    }
}

impl std::fmt::Debug for RedbWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedbWriter").finish_non_exhaustive()
    }
}

impl GraphStore for RedbGraph {
    type Reader<'a>
        = RedbReader
    where
        Self: 'a;
    type Writer<'a>
        = RedbWriter
    where
        Self: 'a;

    fn begin_read(&self, ctx: &Context) -> Result<RedbReader, HashEqError> {
        ctx.check()?;
        let txn = self.db.begin_read().map_err(store_err("begin_read"))?;
        Ok(RedbReader {
            ctx: ctx.clone(),
            txn,
        })
    }

    fn begin_write(&self, ctx: &Context) -> Result<RedbWriter, HashEqError> {
        ctx.check()?;
        let txn = self.db.begin_write().map_err(store_err("begin_write"))?;
        // Dropping `txn` on this path aborts it.
        ctx.check()?;
        Ok(RedbWriter {
            ctx: ctx.clone(),
            txn,
        })
    }
}

// =============================================================================
// SHARED READ PATH
// =============================================================================

/// Read helpers written once over any readable table handle.
///
/// redb hands out different table types for read-only and write
/// transactions; both implement `ReadableTable`.
mod read {
    use super::*;

    pub(super) fn artifacts_by_key<I, T>(
        index: &I,
        artifacts: &T,
        key: &ArtifactKey,
    ) -> Result<Vec<Artifact>, HashEqError>
    where
        I: ReadableTable<(&'static str, &'static str), u64>,
        T: ReadableTable<u64, &'static [u8]>,
    {
        let Some(id) = index
            .get((key.algorithm(), key.digest()))
            .map_err(store_err("get artifact_index"))?
            .map(|v| v.value())
        else {
            return Ok(Vec::new());
        };
        Ok(artifact(artifacts, NodeId(id))?.into_iter().collect())
    }

    pub(super) fn artifact<T>(table: &T, id: NodeId) -> Result<Option<Artifact>, HashEqError>
    where
        T: ReadableTable<u64, &'static [u8]>,
    {
        match table.get(id.0).map_err(store_err("get artifact"))? {
            Some(data) => Ok(Some(decode(data.value())?)),
            None => Ok(None),
        }
    }

    pub(super) fn hash_equal<T>(table: &T, id: NodeId) -> Result<Option<HashEqualNode>, HashEqError>
    where
        T: ReadableTable<u64, &'static [u8]>,
    {
        match table.get(id.0).map_err(store_err("get hash_equal"))? {
            Some(data) => Ok(Some(decode(data.value())?)),
            None => Ok(None),
        }
    }

    pub(super) fn all<T, V>(table: &T, operation: &'static str) -> Result<Vec<V>, HashEqError>
    where
        T: ReadableTable<u64, &'static [u8]>,
        V: DeserializeOwned,
    {
        let mut rows = Vec::new();
        for entry in table.iter().map_err(store_err(operation))? {
            let (_, value) = entry.map_err(store_err(operation))?;
            rows.push(decode(value.value())?);
        }
        Ok(rows)
    }

    /// Edges around `anchor`; `outbound` selects which end `anchor` is.
    pub(super) fn edges<T>(
        table: &T,
        anchor: NodeId,
        label: EdgeLabel,
        outbound: bool,
    ) -> Result<Vec<Edge>, HashEqError>
    where
        T: ReadableTable<(u64, u8, u64), ()>,
    {
        let code = label.code();
        let mut edges = Vec::new();
        for entry in table
            .range((anchor.0, code, 0u64)..=(anchor.0, code, u64::MAX))
            .map_err(store_err("range edges"))?
        {
            let (key, _) = entry.map_err(store_err("range edges"))?;
            let (a, l, b) = key.value();
            let label = label_from_code(l)?;
            edges.push(if outbound {
                Edge::new(NodeId(a), NodeId(b), label)
            } else {
                Edge::new(NodeId(b), NodeId(a), label)
            });
        }
        Ok(edges)
    }
}

macro_rules! impl_redb_reads {
    ($ty:ty) => {
        impl ReadTxn for $ty {
            fn artifacts_by_key(
                &mut self,
                key: &ArtifactKey,
            ) -> Result<Cursor<Artifact>, HashEqError> {
                self.ctx.check()?;
                let index = self
                    .txn
                    .open_table(ARTIFACT_INDEX)
                    .map_err(store_err("open artifact_index"))?;
                let artifacts = self
                    .txn
                    .open_table(ARTIFACTS)
                    .map_err(store_err("open artifacts"))?;
                Ok(Cursor::from_rows(read::artifacts_by_key(
                    &index, &artifacts, key,
                )?))
            }

            fn artifacts(&mut self) -> Result<Cursor<Artifact>, HashEqError> {
                self.ctx.check()?;
                let table = self
                    .txn
                    .open_table(ARTIFACTS)
                    .map_err(store_err("open artifacts"))?;
                Ok(Cursor::from_rows(read::all(&table, "scan artifacts")?))
            }

            fn artifact(&mut self, id: NodeId) -> Result<Option<Artifact>, HashEqError> {
                self.ctx.check()?;
                let table = self
                    .txn
                    .open_table(ARTIFACTS)
                    .map_err(store_err("open artifacts"))?;
                read::artifact(&table, id)
            }

            fn hash_equal(&mut self, id: NodeId) -> Result<Option<HashEqualNode>, HashEqError> {
                self.ctx.check()?;
                let table = self
                    .txn
                    .open_table(HASH_EQUALS)
                    .map_err(store_err("open hash_equals"))?;
                read::hash_equal(&table, id)
            }

            fn hash_equals(&mut self) -> Result<Cursor<HashEqualNode>, HashEqError> {
                self.ctx.check()?;
                let table = self
                    .txn
                    .open_table(HASH_EQUALS)
                    .map_err(store_err("open hash_equals"))?;
                Ok(Cursor::from_rows(read::all(&table, "scan hash_equals")?))
            }

            fn outbound(
                &mut self,
                from: NodeId,
                label: EdgeLabel,
            ) -> Result<Cursor<Edge>, HashEqError> {
                self.ctx.check()?;
                let table = self
                    .txn
                    .open_table(OUTBOUND)
                    .map_err(store_err("open outbound"))?;
                Ok(Cursor::from_rows(read::edges(&table, from, label, true)?))
            }

            fn inbound(&mut self, to: NodeId, label: EdgeLabel) -> Result<Cursor<Edge>, HashEqError> {
                self.ctx.check()?;
                let table = self
                    .txn
                    .open_table(INBOUND)
                    .map_err(store_err("open inbound"))?;
                Ok(Cursor::from_rows(read::edges(&table, to, label, false)?))
            }

            fn counts(&mut self) -> Result<LedgerCounts, HashEqError> {
                self.ctx.check()?;
                let artifacts = self
                    .txn
                    .open_table(ARTIFACTS)
                    .map_err(store_err("open artifacts"))?
                    .len()
                    .map_err(store_err("count artifacts"))?;
                let hash_equals = self
                    .txn
                    .open_table(HASH_EQUALS)
                    .map_err(store_err("open hash_equals"))?
                    .len()
                    .map_err(store_err("count hash_equals"))?;
                let edges = self
                    .txn
                    .open_table(EDGES)
                    .map_err(store_err("open edges"))?
                    .len()
                    .map_err(store_err("count edges"))?;
                Ok(LedgerCounts {
                    artifacts: artifacts as usize,
                    hash_equals: hash_equals as usize,
                    edges: edges as usize,
                })
            }
        }
    };
}

impl_redb_reads!(RedbReader);
impl_redb_reads!(RedbWriter);

impl RedbWriter {
    /// Allocate the next NodeId inside this transaction.
    fn allocate(&mut self) -> Result<NodeId, HashEqError> {
        let mut meta = self
            .txn
            .open_table(METADATA)
            .map_err(store_err("open metadata"))?;
        let next = meta
            .get(NEXT_NODE_ID)
            .map_err(store_err("get next_node_id"))?
            .map(|v| v.value())
            .unwrap_or(0);
        meta.insert(NEXT_NODE_ID, next.saturating_add(1))
            .map_err(store_err("set next_node_id"))?;
        Ok(NodeId(next))
    }
}

impl WriteTxn for RedbWriter {
    fn upsert_hash_equal(&mut self, doc: &HashEqualDoc) -> Result<Cursor<HashEqualNode>, HashEqError> {
        self.ctx.check()?;
        let doc_key = encode(doc)?;

        let existing = {
            let index = self
                .txn
                .open_table(HASH_EQUAL_INDEX)
                .map_err(store_err("open hash_equal_index"))?;
            index
                .get(doc_key.as_slice())
                .map_err(store_err("get hash_equal_index"))?
                .map(|v| NodeId(v.value()))
        };

        let id = match existing {
            Some(id) => id,
            None => {
                let id = self.allocate()?;
                let node = HashEqualNode {
                    id,
                    doc: doc.clone(),
                };
                let node_bytes = encode(&node)?;
                {
                    let mut table = self
                        .txn
                        .open_table(HASH_EQUALS)
                        .map_err(store_err("open hash_equals"))?;
                    table
                        .insert(id.0, node_bytes.as_slice())
                        .map_err(store_err("insert hash_equal"))?;
                }
                {
                    let mut index = self
                        .txn
                        .open_table(HASH_EQUAL_INDEX)
                        .map_err(store_err("open hash_equal_index"))?;
                    index
                        .insert(doc_key.as_slice(), id.0)
                        .map_err(store_err("insert hash_equal_index"))?;
                }
                id
            }
        };

        let table = self
            .txn
            .open_table(HASH_EQUALS)
            .map_err(store_err("open hash_equals"))?;
        Ok(Cursor::from_rows(
            read::hash_equal(&table, id)?.into_iter().collect(),
        ))
    }

    fn insert_edge(&mut self, key: &EdgeKey, edge: &Edge) -> Result<EdgeInsert, HashEqError> {
        self.ctx.check()?;
        {
            let mut edges = self
                .txn
                .open_table(EDGES)
                .map_err(store_err("open edges"))?;
            if edges
                .get(key.as_str())
                .map_err(store_err("get edge"))?
                .is_some()
            {
                return Ok(EdgeInsert::Ignored);
            }
            let bytes = encode(edge)?;
            edges
                .insert(key.as_str(), bytes.as_slice())
                .map_err(store_err("insert edge"))?;
        }
        let code = edge.label.code();
        {
            let mut outbound = self
                .txn
                .open_table(OUTBOUND)
                .map_err(store_err("open outbound"))?;
            outbound
                .insert((edge.from.0, code, edge.to.0), ())
                .map_err(store_err("insert outbound"))?;
        }
        {
            let mut inbound = self
                .txn
                .open_table(INBOUND)
                .map_err(store_err("open inbound"))?;
            inbound
                .insert((edge.to.0, code, edge.from.0), ())
                .map_err(store_err("insert inbound"))?;
        }
        Ok(EdgeInsert::Inserted)
    }

    fn register_artifact(&mut self, key: &ArtifactKey) -> Result<Artifact, HashEqError> {
        self.ctx.check()?;
        let existing = self
            .artifacts_by_key(key)?
            .at_most_one("register_artifact", || key.to_string())?;
        if let Some(existing) = existing {
            return Ok(existing);
        }

        let id = self.allocate()?;
        let artifact = Artifact::new(id, key);
        let bytes = encode(&artifact)?;
        {
            let mut table = self
                .txn
                .open_table(ARTIFACTS)
                .map_err(store_err("open artifacts"))?;
            table
                .insert(id.0, bytes.as_slice())
                .map_err(store_err("insert artifact"))?;
        }
        {
            let mut index = self
                .txn
                .open_table(ARTIFACT_INDEX)
                .map_err(store_err("open artifact_index"))?;
            index
                .insert((key.algorithm(), key.digest()), id.0)
                .map_err(store_err("insert artifact_index"))?;
        }
        Ok(artifact)
    }

    fn commit(self) -> Result<(), HashEqError> {
        self.ctx.check()?;
        self.txn.commit().map_err(store_err("commit"))
    }
}
