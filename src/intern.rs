//! Intern Table
//!
//! Process-local pool deduplicating immutable substructures by structural
//! hash. Interning is bottom-up: a composite is interned only after its
//! children, so equality checks reduce to key comparison plus child
//! identity and never walk subtrees.
//!
//! The table holds only weak references. Representatives stay alive while
//! any compiled config reaches them and become reclaimable as soon as the
//! last holder drops; dead entries are purged opportunistically during
//! insertion and by [`InternTable::purge`].
//!
//! ## Thread-safety
//!
//! Buckets live in a sharded map; lookups are concurrent and insertion is
//! serialized per bucket, so concurrent inserts of equal nodes observe a
//! single representative.

use crate::error::{CompileError, CompileResult};
use crate::node::{kind_eq, structural_hash, Node, NodeData, NodeId, NodeKind};
use crate::stats::PassStats;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

pub(crate) struct InternTable {
    /// Structural hash → weak entries with that hash.
    buckets: DashMap<u64, Vec<Weak<NodeData>>>,
    /// Next serial id. Ids are never reused.
    next_id: AtomicU64,
}

impl InternTable {
    pub fn with_capacity(capacity_hint: usize) -> Self {
        InternTable {
            buckets: DashMap::with_capacity(capacity_hint),
            next_id: AtomicU64::new(0),
        }
    }

    /// Return the representative for a structurally-equal node, adopting
    /// the candidate if none exists.
    pub fn intern(&self, kind: NodeKind, pass: &mut PassStats) -> CompileResult<Node> {
        let hash = structural_hash(&kind);

        // Entry guard serializes insertion for this bucket's shard.
        let mut bucket = self.buckets.entry(hash).or_default();
        bucket.retain(|weak| weak.strong_count() > 0);

        for weak in bucket.iter() {
            if let Some(existing) = weak.upgrade() {
                if kind_eq(&existing.kind, &kind) {
                    pass.record_hit();
                    return Ok(Node::from_data(existing));
                }
            }
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        if id == u64::MAX {
            return Err(CompileError::InternFailure(
                "node id space exhausted".to_string(),
            ));
        }
        pass.record_adoption(kind.variant_name());
        let data = Arc::new(NodeData {
            id: NodeId(id),
            hash,
            kind,
        });
        bucket.push(Arc::downgrade(&data));
        Ok(Node::from_data(data))
    }

    /// Number of live representatives.
    pub fn len(&self) -> usize {
        self.buckets
            .iter()
            .map(|bucket| {
                bucket
                    .value()
                    .iter()
                    .filter(|weak| weak.strong_count() > 0)
                    .count()
            })
            .sum()
    }

    /// Drop dead entries and empty buckets. Returns the number of entries
    /// reclaimed.
    pub fn purge(&self) -> usize {
        let mut reclaimed = 0;
        self.buckets.retain(|_, bucket| {
            let before = bucket.len();
            bucket.retain(|weak| weak.strong_count() > 0);
            reclaimed += before - bucket.len();
            !bucket.is_empty()
        });
        reclaimed
    }
}
