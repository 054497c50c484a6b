//! # Graph Store
//!
//! The storage seam of the ledger and its in-memory implementation.
//!
//! Every ledger operation runs inside exactly one store transaction:
//! - `ReadTxn` for queries (a consistent snapshot)
//! - `WriteTxn` for ingestion (all-or-nothing; dropping without `commit`
//!   discards every write)
//!
//! Transactions capture the caller's `Context` when they begin and check it
//! before every request, so a cancelled or expired operation stops at the
//! next store call instead of running to completion.
//!
//! All data structures use `BTreeMap`/`BTreeSet` for deterministic ordering.

use crate::{
    Artifact, ArtifactKey, Context, Cursor, Edge, EdgeInsert, EdgeKey, EdgeLabel, HashEqError,
    HashEqualDoc, HashEqualNode, LedgerCounts, NodeId,
};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};

// =============================================================================
// STORE TRAITS
// =============================================================================

/// Read operations available inside any transaction.
pub trait ReadTxn {
    /// All artifact nodes stored under a normalized key.
    ///
    /// A healthy store yields zero or one row.
    fn artifacts_by_key(&mut self, key: &ArtifactKey) -> Result<Cursor<Artifact>, HashEqError>;

    /// Every artifact node, ordered by id.
    fn artifacts(&mut self) -> Result<Cursor<Artifact>, HashEqError>;

    /// Lookup an artifact node by id.
    fn artifact(&mut self, id: NodeId) -> Result<Option<Artifact>, HashEqError>;

    /// Lookup a HashEqual node by id.
    fn hash_equal(&mut self, id: NodeId) -> Result<Option<HashEqualNode>, HashEqError>;

    /// Every HashEqual node, ordered by id.
    fn hash_equals(&mut self) -> Result<Cursor<HashEqualNode>, HashEqError>;

    /// Edges with the given label leaving `from`.
    fn outbound(&mut self, from: NodeId, label: EdgeLabel) -> Result<Cursor<Edge>, HashEqError>;

    /// Edges with the given label arriving at `to`.
    fn inbound(&mut self, to: NodeId, label: EdgeLabel) -> Result<Cursor<Edge>, HashEqError>;

    /// Node and edge counts.
    fn counts(&mut self) -> Result<LedgerCounts, HashEqError>;
}

/// Write operations. Nothing is visible to other transactions until `commit`.
pub trait WriteTxn: ReadTxn {
    /// Return the HashEqual node matching `doc`, creating it if absent.
    ///
    /// Must be a single indivisible request: no other writer can observe or
    /// create the same document between the check and the insert.
    fn upsert_hash_equal(&mut self, doc: &HashEqualDoc) -> Result<Cursor<HashEqualNode>, HashEqError>;

    /// Insert an edge unless an edge with the same key already exists.
    fn insert_edge(&mut self, key: &EdgeKey, edge: &Edge) -> Result<EdgeInsert, HashEqError>;

    /// Return the artifact node for `key`, creating it if absent.
    ///
    /// Entry point for the artifact identity store; the ledger's own
    /// ingestion path never calls it.
    fn register_artifact(&mut self, key: &ArtifactKey) -> Result<Artifact, HashEqError>;

    /// Make every write of this transaction durable and visible.
    fn commit(self) -> Result<(), HashEqError>;
}

/// A transactional graph store.
pub trait GraphStore: Send + Sync {
    type Reader<'a>: ReadTxn
    where
        Self: 'a;
    type Writer<'a>: WriteTxn
    where
        Self: 'a;

    /// Begin a read-only snapshot transaction.
    fn begin_read(&self, ctx: &Context) -> Result<Self::Reader<'_>, HashEqError>;

    /// Begin a write transaction. Writers are serialized by the store.
    fn begin_write(&self, ctx: &Context) -> Result<Self::Writer<'_>, HashEqError>;
}

// =============================================================================
// IN-MEMORY GRAPH
// =============================================================================

/// In-memory graph contents.
#[derive(Debug, Clone, Default)]
struct GraphData {
    /// Artifact storage: NodeId -> Artifact
    artifacts: BTreeMap<NodeId, Artifact>,
    /// Reverse lookup: normalized key -> NodeId
    artifact_index: BTreeMap<ArtifactKey, NodeId>,
    /// Claim storage: NodeId -> HashEqualNode
    hash_equals: BTreeMap<NodeId, HashEqualNode>,
    /// Reverse lookup: full claim tuple -> NodeId
    hash_equal_index: BTreeMap<HashEqualDoc, NodeId>,
    /// Edge storage: deterministic key -> edge
    edges: BTreeMap<EdgeKey, Edge>,
    /// (from, label, to)
    outbound: BTreeSet<(NodeId, EdgeLabel, NodeId)>,
    /// (to, label, from)
    inbound: BTreeSet<(NodeId, EdgeLabel, NodeId)>,
    /// Next available NodeId
    next_node_id: u64,
}

impl GraphData {
    fn allocate(&mut self) -> NodeId {
        let id = NodeId(self.next_node_id);
        self.next_node_id = self.next_node_id.saturating_add(1);
        id
    }

    fn artifacts_by_key(&self, key: &ArtifactKey) -> Vec<Artifact> {
        self.artifact_index
            .get(key)
            .and_then(|id| self.artifacts.get(id))
            .cloned()
            .into_iter()
            .collect()
    }

    fn edges_in(
        set: &BTreeSet<(NodeId, EdgeLabel, NodeId)>,
        anchor: NodeId,
        label: EdgeLabel,
        outbound: bool,
    ) -> Vec<Edge> {
        set.range((anchor, label, NodeId(0))..=(anchor, label, NodeId(u64::MAX)))
            .map(|&(a, l, b)| {
                if outbound {
                    Edge::new(a, b, l)
                } else {
                    Edge::new(b, a, l)
                }
            })
            .collect()
    }

    fn counts(&self) -> LedgerCounts {
        LedgerCounts {
            artifacts: self.artifacts.len(),
            hash_equals: self.hash_equals.len(),
            edges: self.edges.len(),
        }
    }
}

/// In-memory transactional graph.
///
/// Readers see an immutable snapshot; a single writer works on a private
/// copy that replaces the snapshot on commit.
#[derive(Debug, Default)]
pub struct Graph {
    snapshot: RwLock<Arc<GraphData>>,
    writer: Mutex<()>,
}

impl Graph {
    /// Create a new empty graph.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn snapshot(&self) -> Result<Arc<GraphData>, HashEqError> {
        self.snapshot
            .read()
            .map(|guard| Arc::clone(&guard))
            .map_err(|_| poisoned("snapshot"))
    }
}

fn poisoned(what: &str) -> HashEqError {
    HashEqError::Store {
        operation: format!("lock {what}"),
        message: "lock poisoned".to_string(),
    }
}

/// Read transaction over an in-memory snapshot.
#[derive(Debug)]
pub struct GraphReader {
    ctx: Context,
    data: Arc<GraphData>,
}

/// Write transaction over a private copy of the in-memory graph.
#[derive(Debug)]
pub struct GraphWriter<'a> {
    ctx: Context,
    graph: &'a Graph,
    _lock: MutexGuard<'a, ()>,
    staged: GraphData,
}

impl GraphStore for Graph {
    type Reader<'a>
        = GraphReader
    where
        Self: 'a;
    type Writer<'a>
        = GraphWriter<'a>
    where
        Self: 'a;

    fn begin_read(&self, ctx: &Context) -> Result<GraphReader, HashEqError> {
        ctx.check()?;
        Ok(GraphReader {
            ctx: ctx.clone(),
            data: self.snapshot()?,
        })
    }

    fn begin_write(&self, ctx: &Context) -> Result<GraphWriter<'_>, HashEqError> {
        ctx.check()?;
        let lock = self.writer.lock().map_err(|_| poisoned("writer"))?;
        // Waiting on another writer may have outlived the deadline.
        ctx.check()?;
        let staged = GraphData::clone(&*self.snapshot()?);
        Ok(GraphWriter {
            ctx: ctx.clone(),
            graph: self,
            _lock: lock,
            staged,
        })
    }
}

macro_rules! impl_graph_reads {
    ($ty:ty, $data:ident) => {
        impl ReadTxn for $ty {
            fn artifacts_by_key(
                &mut self,
                key: &ArtifactKey,
            ) -> Result<Cursor<Artifact>, HashEqError> {
                self.ctx.check()?;
                Ok(Cursor::from_rows(self.$data.artifacts_by_key(key)))
            }

            fn artifacts(&mut self) -> Result<Cursor<Artifact>, HashEqError> {
                self.ctx.check()?;
                Ok(Cursor::from_rows(
                    self.$data.artifacts.values().cloned().collect(),
                ))
            }

            fn artifact(&mut self, id: NodeId) -> Result<Option<Artifact>, HashEqError> {
                self.ctx.check()?;
                Ok(self.$data.artifacts.get(&id).cloned())
            }

            fn hash_equal(&mut self, id: NodeId) -> Result<Option<HashEqualNode>, HashEqError> {
                self.ctx.check()?;
                Ok(self.$data.hash_equals.get(&id).cloned())
            }

            fn hash_equals(&mut self) -> Result<Cursor<HashEqualNode>, HashEqError> {
                self.ctx.check()?;
                Ok(Cursor::from_rows(
                    self.$data.hash_equals.values().cloned().collect(),
                ))
            }

            fn outbound(
                &mut self,
                from: NodeId,
                label: EdgeLabel,
            ) -> Result<Cursor<Edge>, HashEqError> {
                self.ctx.check()?;
                Ok(Cursor::from_rows(GraphData::edges_in(
                    &self.$data.outbound,
                    from,
                    label,
                    true,
                )))
            }

            fn inbound(&mut self, to: NodeId, label: EdgeLabel) -> Result<Cursor<Edge>, HashEqError> {
                self.ctx.check()?;
                Ok(Cursor::from_rows(GraphData::edges_in(
                    &self.$data.inbound,
                    to,
                    label,
                    false,
                )))
            }

            fn counts(&mut self) -> Result<LedgerCounts, HashEqError> {
                self.ctx.check()?;
                Ok(self.$data.counts())
            }
        }
    };
}

impl_graph_reads!(GraphReader, data);
impl_graph_reads!(GraphWriter<'_>, staged);

impl WriteTxn for GraphWriter<'_> {
    fn upsert_hash_equal(&mut self, doc: &HashEqualDoc) -> Result<Cursor<HashEqualNode>, HashEqError> {
        self.ctx.check()?;
        let data = &mut self.staged;
        let id = match data.hash_equal_index.get(doc) {
            Some(&id) => id,
            None => {
                let id = data.allocate();
                data.hash_equals.insert(
                    id,
                    HashEqualNode {
                        id,
                        doc: doc.clone(),
                    },
                );
                data.hash_equal_index.insert(doc.clone(), id);
                id
            }
        };
        Ok(Cursor::from_rows(
            data.hash_equals.get(&id).cloned().into_iter().collect(),
        ))
    }

    fn insert_edge(&mut self, key: &EdgeKey, edge: &Edge) -> Result<EdgeInsert, HashEqError> {
        self.ctx.check()?;
        let data = &mut self.staged;
        if data.edges.contains_key(key) {
            return Ok(EdgeInsert::Ignored);
        }
        data.edges.insert(key.clone(), *edge);
        data.outbound.insert((edge.from, edge.label, edge.to));
        data.inbound.insert((edge.to, edge.label, edge.from));
        Ok(EdgeInsert::Inserted)
    }

    fn register_artifact(&mut self, key: &ArtifactKey) -> Result<Artifact, HashEqError> {
        self.ctx.check()?;
        let data = &mut self.staged;
        if let Some(existing) = data.artifact_index.get(key).and_then(|id| data.artifacts.get(id)) {
            return Ok(existing.clone());
        }
        let id = data.allocate();
        let artifact = Artifact::new(id, key);
        data.artifacts.insert(id, artifact.clone());
        data.artifact_index.insert(key.clone(), id);
        Ok(artifact)
    }

    fn commit(self) -> Result<(), HashEqError> {
        self.ctx.check()?;
        let mut snapshot = self
            .graph
            .snapshot
            .write()
            .map_err(|_| poisoned("snapshot"))?;
        *snapshot = Arc::new(self.staged);
        Ok(())
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ArtifactSpec, HashEqualInput};
    use std::time::Duration;

    fn key(algorithm: &str, digest: &str) -> ArtifactKey {
        ArtifactSpec::new(algorithm, digest)
            .normalize()
            .expect("valid key")
    }

    #[test]
    fn register_artifact_is_idempotent() {
        let graph = Graph::new();
        let ctx = Context::background();

        let mut txn = graph.begin_write(&ctx).expect("begin");
        let a1 = txn.register_artifact(&key("sha256", "aa")).expect("register");
        let a2 = txn.register_artifact(&key("SHA256", "AA")).expect("register");
        txn.commit().expect("commit");

        assert_eq!(a1, a2);
        let mut reader = graph.begin_read(&ctx).expect("begin");
        assert_eq!(reader.counts().expect("counts").artifacts, 1);
    }

    #[test]
    fn deadline_expiring_while_waiting_for_writer_is_reported() {
        let graph = Graph::new();
        let holder = graph.begin_write(&Context::background()).expect("begin");

        let result = std::thread::scope(|s| {
            let waiter = s.spawn(|| {
                let ctx = Context::with_timeout(Duration::from_millis(50));
                graph.begin_write(&ctx).map(|_| ())
            });
            std::thread::sleep(Duration::from_millis(150));
            drop(holder);
            waiter.join().expect("join")
        });

        assert!(matches!(result, Err(HashEqError::DeadlineExceeded)));
        assert!(graph.begin_write(&Context::background()).is_ok());
    }

    #[test]
    fn uncommitted_writes_are_discarded() {
        let graph = Graph::new();
        let ctx = Context::background();

        {
            let mut txn = graph.begin_write(&ctx).expect("begin");
            txn.register_artifact(&key("sha256", "aa")).expect("register");
        }

        let mut reader = graph.begin_read(&ctx).expect("begin");
        assert_eq!(reader.counts().expect("counts"), LedgerCounts::default());
    }

    #[test]
    fn upsert_reuses_existing_node() {
        let graph = Graph::new();
        let ctx = Context::background();
        let mut txn = graph.begin_write(&ctx).expect("begin");
        let a = txn.register_artifact(&key("sha256", "aa")).expect("register");
        let b = txn.register_artifact(&key("sha512", "bb")).expect("register");
        let provenance = HashEqualInput::new("j", "c", "o").normalize().expect("valid");
        let doc = HashEqualDoc::new(&a, &b, provenance);

        let first = txn.upsert_hash_equal(&doc).expect("upsert").drain().expect("rows");
        let second = txn.upsert_hash_equal(&doc).expect("upsert").drain().expect("rows");
        assert_eq!(first, second);
        assert_eq!(first.len(), 1);
        assert_eq!(txn.counts().expect("counts").hash_equals, 1);
    }

    #[test]
    fn insert_edge_ignores_duplicates() {
        let graph = Graph::new();
        let ctx = Context::background();
        let mut txn = graph.begin_write(&ctx).expect("begin");
        let edge = Edge::new(NodeId(1), NodeId(2), EdgeLabel::Subject);
        let key = crate::linker::edge_key(edge.from, edge.to, edge.label);

        assert_eq!(txn.insert_edge(&key, &edge).expect("insert"), EdgeInsert::Inserted);
        assert_eq!(txn.insert_edge(&key, &edge).expect("insert"), EdgeInsert::Ignored);

        let out = txn
            .outbound(NodeId(1), EdgeLabel::Subject)
            .expect("outbound")
            .drain()
            .expect("rows");
        let inc = txn
            .inbound(NodeId(2), EdgeLabel::Subject)
            .expect("inbound")
            .drain()
            .expect("rows");
        assert_eq!(out, vec![edge]);
        assert_eq!(inc, vec![edge]);
        assert!(
            txn.outbound(NodeId(1), EdgeLabel::IsEqual)
                .expect("outbound")
                .drain()
                .expect("rows")
                .is_empty()
        );
    }

    #[test]
    fn cancelled_context_stops_transaction() {
        let graph = Graph::new();
        let ctx = Context::background();
        let mut txn = graph.begin_write(&ctx).expect("begin");
        ctx.cancel();
        assert!(matches!(
            txn.register_artifact(&key("sha256", "aa")),
            Err(HashEqError::Cancelled)
        ));
        assert!(matches!(graph.begin_read(&ctx), Err(HashEqError::Cancelled)));
    }
}
