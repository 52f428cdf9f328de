//! Interned Configuration Tree
//!
//! Immutable nodes produced by the compile pass. Every node carries a
//! precomputed structural hash and a serial id assigned by the intern
//! table at adoption. Within one table, pointer equality implies (and is
//! implied by) structural equality, so identity comparisons never walk
//! the tree.
//!
//! Construction happens only inside [`crate::intern::InternTable`]; all
//! public access is read-only.

use crate::raw::{RawMapping, RawNode};
use crate::value::Scalar;
use std::collections::HashSet;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, Weak};

/// Serial id assigned at adoption. Ids are unique for the lifetime of a
/// table and are never reused, which makes them safe identity tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub(crate) u64);

impl NodeId {
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

/// Node variants. Children of composite variants are already interned.
#[derive(Debug)]
pub enum NodeKind {
    Scalar(Scalar),
    /// Ordered `(key, child)` pairs; keys are unique within the mapping.
    Mapping(Vec<(Arc<str>, Node)>),
    Sequence(Vec<Node>),
}

impl NodeKind {
    /// Variant name for statistics bucketing.
    pub fn variant_name(&self) -> &'static str {
        match self {
            NodeKind::Scalar(_) => "scalar",
            NodeKind::Mapping(_) => "mapping",
            NodeKind::Sequence(_) => "sequence",
        }
    }
}

#[derive(Debug)]
pub(crate) struct NodeData {
    pub(crate) id: NodeId,
    pub(crate) hash: u64,
    pub(crate) kind: NodeKind,
}

/// Cheap-clone handle to an interned node.
#[derive(Debug, Clone)]
pub struct Node {
    data: Arc<NodeData>,
}

impl Node {
    pub(crate) fn from_data(data: Arc<NodeData>) -> Self {
        Node { data }
    }

    pub fn id(&self) -> NodeId {
        self.data.id
    }

    /// Precomputed structural hash. Depends only on structural content.
    pub fn structural_hash(&self) -> u64 {
        self.data.hash
    }

    pub fn kind(&self) -> &NodeKind {
        &self.data.kind
    }

    /// Identity comparison. Within one intern table this is equivalent to
    /// structural equality.
    pub fn ptr_eq(a: &Node, b: &Node) -> bool {
        Arc::ptr_eq(&a.data, &b.data)
    }

    pub fn downgrade(&self) -> WeakNode {
        WeakNode(Arc::downgrade(&self.data))
    }

    pub(crate) fn strong_count(&self) -> usize {
        Arc::strong_count(&self.data)
    }

    pub fn as_scalar(&self) -> Option<&Scalar> {
        match &self.data.kind {
            NodeKind::Scalar(s) => Some(s),
            _ => None,
        }
    }

    /// Mapping entries in key order, or `None` for non-mappings.
    pub fn entries(&self) -> Option<&[(Arc<str>, Node)]> {
        match &self.data.kind {
            NodeKind::Mapping(entries) => Some(entries),
            _ => None,
        }
    }

    pub fn items(&self) -> Option<&[Node]> {
        match &self.data.kind {
            NodeKind::Sequence(items) => Some(items),
            _ => None,
        }
    }

    /// Look up a mapping key.
    pub fn get(&self, key: &str) -> Option<&Node> {
        self.entries()?
            .iter()
            .find(|(k, _)| k.as_ref() == key)
            .map(|(_, v)| v)
    }

    /// Walk nested mappings by explicit key segments. Keys containing dots
    /// are single segments here; no splitting is performed.
    pub fn get_path<'a, I>(&self, segments: I) -> Option<&Node>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut current = self;
        for segment in segments {
            current = current.get(segment)?;
        }
        Some(current)
    }

    /// Number of distinct nodes reachable from this one (the optimized
    /// size of a compiled tree).
    pub fn unique_node_count(&self) -> usize {
        fn walk(node: &Node, seen: &mut HashSet<NodeId>) {
            if !seen.insert(node.id()) {
                return;
            }
            match node.kind() {
                NodeKind::Scalar(_) => {}
                NodeKind::Mapping(entries) => {
                    for (_, child) in entries {
                        walk(child, seen);
                    }
                }
                NodeKind::Sequence(items) => {
                    for child in items {
                        walk(child, seen);
                    }
                }
            }
        }
        let mut seen = HashSet::new();
        walk(self, &mut seen);
        seen.len()
    }

    /// Faithful reconstruction of the tree as raw input. Round-tripping
    /// through `to_raw` and `precompile` yields an identity-equal config.
    pub fn to_raw(&self) -> RawNode {
        match self.kind() {
            NodeKind::Scalar(s) => RawNode::Scalar(s.clone()),
            NodeKind::Mapping(entries) => {
                let mut mapping = RawMapping::new();
                for (key, child) in entries {
                    mapping.insert(key.to_string(), child.to_raw());
                }
                RawNode::Mapping(mapping)
            }
            NodeKind::Sequence(items) => {
                RawNode::Sequence(items.iter().map(Node::to_raw).collect())
            }
        }
    }
}

/// Weak handle used by the intern table and cache scopes; does not keep
/// the node alive.
#[derive(Debug, Clone)]
pub struct WeakNode(Weak<NodeData>);

impl WeakNode {
    pub fn upgrade(&self) -> Option<Node> {
        self.0.upgrade().map(Node::from_data)
    }

    pub fn is_alive(&self) -> bool {
        self.0.strong_count() > 0
    }
}

/// Structural hash over a candidate node. Composite nodes hash over their
/// children's precomputed hashes plus the variant discriminant; mapping
/// key order is significant.
pub(crate) fn structural_hash(kind: &NodeKind) -> u64 {
    let mut hasher = DefaultHasher::new();
    match kind {
        NodeKind::Scalar(s) => {
            hasher.write_u8(0);
            s.hash(&mut hasher);
        }
        NodeKind::Mapping(entries) => {
            hasher.write_u8(1);
            hasher.write_usize(entries.len());
            for (key, child) in entries {
                hasher.write_usize(key.len());
                hasher.write(key.as_bytes());
                hasher.write_u64(child.structural_hash());
            }
        }
        NodeKind::Sequence(items) => {
            hasher.write_u8(2);
            hasher.write_usize(items.len());
            for child in items {
                hasher.write_u64(child.structural_hash());
            }
        }
    }
    hasher.finish()
}

/// Structural equality between a candidate and an interned node. Children
/// are already interned on both sides, so child comparison is identity.
pub(crate) fn kind_eq(a: &NodeKind, b: &NodeKind) -> bool {
    match (a, b) {
        (NodeKind::Scalar(x), NodeKind::Scalar(y)) => x == y,
        (NodeKind::Mapping(x), NodeKind::Mapping(y)) => {
            x.len() == y.len()
                && x.iter()
                    .zip(y.iter())
                    .all(|((ka, ca), (kb, cb))| ka == kb && Node::ptr_eq(ca, cb))
        }
        (NodeKind::Sequence(x), NodeKind::Sequence(y)) => {
            x.len() == y.len()
                && x.iter().zip(y.iter()).all(|(ca, cb)| Node::ptr_eq(ca, cb))
        }
        _ => false,
    }
}
