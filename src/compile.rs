//! InternPass and CompiledConfig
//!
//! The compile pass is a single bottom-up traversal: children are
//! transformed first, mappings are pattern-expanded, and every produced
//! node is interned exactly once. The pass accumulates its statistics in
//! a local buffer so a failed compilation leaves the kernel
//! observationally unchanged.
//!
//! [`CompiledConfig`] is the immutable artifact: the interned root plus
//! compilation metadata and a stable identity token derived from the
//! root's serial id. Identity equality is pointer equality of roots, so
//! compiling structurally-equal inputs yields identity-equal configs.

use crate::cache::QueryCache;
use crate::error::{CompileError, CompileResult, TreePath};
use crate::expand::{expand_mapping, WildcardSet};
use crate::hierarchy::HierarchyIndex;
use crate::intern::InternTable;
use crate::node::{Node, NodeKind};
use crate::raw::RawNode;
use crate::stats::PassStats;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::{Arc, Weak};

/// Opaque identity token for a compiled config. Stable for the lifetime
/// of the kernel; never reused, never derived from addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CompiledId(pub(crate) u64);

pub(crate) struct PassContext<'a> {
    pub table: &'a InternTable,
    pub index: &'a HierarchyIndex,
    pub wildcards: &'a WildcardSet,
    pub max_depth: usize,
}

impl PassContext<'_> {
    /// Run the full pass, returning the interned root and the pass
    /// statistics buffer.
    pub fn run(&self, raw: &RawNode) -> CompileResult<(Node, PassStats)> {
        let mut pass = PassStats::default();
        let mut path: Vec<String> = Vec::new();
        let root = self.transform(raw, 0, &mut path, &mut pass)?;
        Ok((root, pass))
    }

    fn transform(
        &self,
        raw: &RawNode,
        depth: usize,
        path: &mut Vec<String>,
        pass: &mut PassStats,
    ) -> CompileResult<Node> {
        if depth >= self.max_depth {
            return Err(CompileError::DepthExceeded {
                limit: self.max_depth,
            });
        }

        match raw {
            RawNode::Scalar(scalar) => {
                if scalar.is_nan() {
                    return Err(CompileError::InvalidInput {
                        path: TreePath::from_segments(path.iter().cloned()),
                        reason: "NaN float scalars are not supported".to_string(),
                    });
                }
                self.table.intern(NodeKind::Scalar(scalar.clone()), pass)
            }
            RawNode::Sequence(items) => {
                let mut children = Vec::with_capacity(items.len());
                for item in items {
                    children.push(self.transform(item, depth + 1, path, pass)?);
                }
                self.table.intern(NodeKind::Sequence(children), pass)
            }
            RawNode::Mapping(mapping) => {
                let mut children = Vec::with_capacity(mapping.len());
                for (key, value) in mapping.iter() {
                    if key.is_empty() {
                        return Err(CompileError::InvalidInput {
                            path: TreePath::from_segments(path.iter().cloned()),
                            reason: "empty mapping key".to_string(),
                        });
                    }
                    // Dotted keys contribute their segments to the
                    // hierarchy context of nested wildcards.
                    let added = key.split('.').count();
                    path.extend(key.split('.').map(str::to_string));
                    let child = self.transform(value, depth + 1, path, pass);
                    path.truncate(path.len() - added);
                    children.push((key.to_string(), child?));
                }
                let expanded = expand_mapping(
                    children,
                    path,
                    self.index,
                    self.wildcards,
                    self.max_depth,
                    pass,
                )?;
                self.table.intern(NodeKind::Mapping(expanded), pass)
            }
        }
    }
}

/// Compilation metadata captured at `precompile` time.
#[derive(Debug, Clone, Serialize)]
pub struct CompileMetadata {
    /// When the compilation finished.
    pub compiled_at: DateTime<Utc>,
    /// Node count of the raw input.
    pub source_nodes: usize,
    /// Distinct interned nodes reachable from the root.
    pub compiled_nodes: usize,
    /// Intern requests issued by this pass.
    pub intern_requests: u64,
    /// Intern requests answered by an existing representative.
    pub intern_hits: u64,
    /// Pattern keys expanded by this pass.
    pub patterns_expanded: u64,
    /// Concrete keys emitted by expansion.
    pub keys_emitted: u64,
    /// Wall-clock compile duration in microseconds.
    pub duration_micros: u64,
}

struct CompiledInner {
    root: Node,
    identity: CompiledId,
    metadata: CompileMetadata,
    /// Back-reference for eager cache-scope release; the kernel itself
    /// keeps no strong reference to compiled configs.
    cache: Weak<QueryCache>,
}

impl Drop for CompiledInner {
    fn drop(&mut self) {
        // Root strong references come only from compiled-config handles,
        // so a count of one means this is the last handle for this
        // identity. Races between two last-ish handles are caught by the
        // cache's lazy liveness probe.
        if self.root.strong_count() == 1 {
            if let Some(cache) = self.cache.upgrade() {
                cache.discard_scope(self.identity);
            }
        }
    }
}

/// Immutable compiled configuration. Cloning shares the artifact; all
/// access is read-only.
#[derive(Clone)]
pub struct CompiledConfig {
    inner: Arc<CompiledInner>,
}

impl CompiledConfig {
    pub(crate) fn new(root: Node, metadata: CompileMetadata, cache: Weak<QueryCache>) -> Self {
        let identity = CompiledId(root.id().as_u64());
        CompiledConfig {
            inner: Arc::new(CompiledInner {
                root,
                identity,
                metadata,
                cache,
            }),
        }
    }

    /// The interned root node.
    pub fn root(&self) -> &Node {
        &self.inner.root
    }

    /// Identity token; equal iff the interned roots are the same
    /// representative.
    pub fn identity(&self) -> CompiledId {
        self.inner.identity
    }

    pub fn metadata(&self) -> &CompileMetadata {
        &self.inner.metadata
    }

    /// Faithful reconstruction of the compiled tree as raw input.
    pub fn to_raw(&self) -> RawNode {
        self.inner.root.to_raw()
    }
}

impl PartialEq for CompiledConfig {
    fn eq(&self, other: &Self) -> bool {
        self.inner.identity == other.inner.identity
    }
}

impl Eq for CompiledConfig {}

impl std::fmt::Debug for CompiledConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompiledConfig")
            .field("identity", &self.inner.identity)
            .field("compiled_nodes", &self.inner.metadata.compiled_nodes)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hierarchy::Hierarchy;

    fn run_pass(hierarchy: &Hierarchy, raw: &RawNode) -> CompileResult<(Node, PassStats)> {
        let table = InternTable::with_capacity(16);
        let index = HierarchyIndex::build(hierarchy);
        let wildcards = WildcardSet::new(["*"]);
        let ctx = PassContext {
            table: &table,
            index: &index,
            wildcards: &wildcards,
            max_depth: 256,
        };
        ctx.run(raw)
    }

    #[test]
    fn equal_leaves_share_one_instance() {
        let raw = RawNode::map([("a", RawNode::from(1)), ("b", RawNode::from(1))]);
        let (root, _) = run_pass(&Hierarchy::new(), &raw).unwrap();

        let a = root.get("a").unwrap();
        let b = root.get("b").unwrap();
        assert!(Node::ptr_eq(a, b));
        assert_eq!(root.unique_node_count(), 2);
    }

    #[test]
    fn nan_is_rejected_at_input() {
        let raw = RawNode::map([("f", RawNode::from(f64::NAN))]);
        let err = run_pass(&Hierarchy::new(), &raw).unwrap_err();
        match err {
            CompileError::InvalidInput { path, .. } => {
                assert_eq!(path.to_string(), "f");
            }
            other => panic!("expected InvalidInput, got {other:?}"),
        }
    }

    #[test]
    fn depth_guard_rejects_deep_trees() {
        let mut raw = RawNode::from(0);
        for _ in 0..300 {
            raw = RawNode::seq([raw]);
        }
        let err = run_pass(&Hierarchy::new(), &raw).unwrap_err();
        assert!(matches!(err, CompileError::DepthExceeded { limit: 256 }));
    }

    #[test]
    fn expansion_context_includes_dotted_parent_keys() {
        // The wildcard sits under the "service.prod" path contributed by
        // a dotted parent key.
        let hierarchy = Hierarchy::new().define("service.prod", "*", ["x", "y"]);
        let raw = RawNode::map([(
            "service.prod",
            RawNode::map([("*", RawNode::from(1))]),
        )]);

        let (root, pass) = run_pass(&hierarchy, &raw).unwrap();
        let inner = root.get("service.prod").unwrap();
        let keys: Vec<&str> = inner
            .entries()
            .unwrap()
            .iter()
            .map(|(k, _)| k.as_ref())
            .collect();
        assert_eq!(keys, vec!["x", "y"]);
        assert_eq!(pass.patterns_processed, 1);
        assert_eq!(pass.keys_emitted, 2);
    }
}
