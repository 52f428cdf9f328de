//! Property Tests
//!
//! Randomized coverage of the kernel's universal invariants:
//! - Compile determinism (identity-equal artifacts for equal inputs)
//! - Structural sharing (structurally equal reachable nodes are one
//!   instance)
//! - Concrete-only trees as fixed points of the compile pass
//! - Round-trip through `to_raw`
//! - Query determinism

use proptest::prelude::*;
use std::sync::Arc;
use stratum::{
    view_output, CompiledConfig, Hierarchy, Kernel, KernelOptions, Node, NodeKind, Params,
    RawNode, Scalar, ViewOutput,
};

// ============================================================================
// Strategies
// ============================================================================

fn scalar_strategy() -> impl Strategy<Value = Scalar> {
    prop_oneof![
        Just(Scalar::Null),
        any::<bool>().prop_map(Scalar::Bool),
        (-100i64..100).prop_map(Scalar::Int),
        (-8i64..8).prop_map(|n| Scalar::Float(n as f64 / 2.0)),
        "[a-z]{0,6}".prop_map(Scalar::from),
    ]
}

// Concrete keys only; wildcard tokens never appear.
fn raw_tree_strategy() -> impl Strategy<Value = RawNode> {
    let leaf = scalar_strategy().prop_map(RawNode::Scalar);
    leaf.prop_recursive(3, 24, 4, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..4).prop_map(RawNode::Sequence),
            prop::collection::vec(("[a-z]{1,5}", inner), 0..4)
                .prop_map(|pairs| RawNode::map(pairs)),
        ]
    })
}

fn fresh_kernel() -> Kernel {
    Kernel::new(Hierarchy::new(), KernelOptions::default())
}

fn all_nodes(root: &Node) -> Vec<Node> {
    let mut out = vec![root.clone()];
    match root.kind() {
        NodeKind::Scalar(_) => {}
        NodeKind::Mapping(entries) => {
            for (_, child) in entries {
                out.extend(all_nodes(child));
            }
        }
        NodeKind::Sequence(items) => {
            for child in items {
                out.extend(all_nodes(child));
            }
        }
    }
    out
}

// ============================================================================
// Properties
// ============================================================================

proptest! {
    #[test]
    fn prop_precompile_is_deterministic(raw in raw_tree_strategy()) {
        let kernel = fresh_kernel();
        let first = kernel.precompile(&raw).unwrap();
        let second = kernel.precompile(&raw).unwrap();
        prop_assert_eq!(first.identity(), second.identity());
        prop_assert!(Node::ptr_eq(first.root(), second.root()));
    }

    #[test]
    fn prop_structurally_equal_nodes_are_pointer_equal(raw in raw_tree_strategy()) {
        let kernel = fresh_kernel();
        let compiled = kernel.precompile(&raw).unwrap();
        let nodes = all_nodes(compiled.root());

        for a in &nodes {
            for b in &nodes {
                if a.to_raw() == b.to_raw() {
                    prop_assert!(Node::ptr_eq(a, b));
                    prop_assert_eq!(a.structural_hash(), b.structural_hash());
                }
            }
        }
    }

    #[test]
    fn prop_concrete_trees_are_fixed_points(raw in raw_tree_strategy()) {
        let kernel = fresh_kernel();
        let compiled = kernel.precompile(&raw).unwrap();
        prop_assert_eq!(compiled.to_raw(), raw);
        prop_assert_eq!(compiled.metadata().patterns_expanded, 0);
    }

    #[test]
    fn prop_round_trip_is_identity_equal(raw in raw_tree_strategy()) {
        let kernel = fresh_kernel();
        let compiled = kernel.precompile(&raw).unwrap();
        let recompiled = kernel.precompile(&compiled.to_raw()).unwrap();
        prop_assert_eq!(compiled.identity(), recompiled.identity());
    }

    #[test]
    fn prop_queries_are_deterministic(raw in raw_tree_strategy(), n in 0i64..100) {
        let kernel = fresh_kernel();
        kernel
            .register_view(
                "size_plus",
                Arc::new(|config: &CompiledConfig, params: &Params| -> anyhow::Result<ViewOutput> {
                    let base = config.root().unique_node_count() as i64;
                    let n = params.get("n").and_then(|s| s.as_int()).unwrap_or(0);
                    Ok(view_output(base + n))
                }),
            )
            .unwrap();

        let compiled = kernel.precompile(&raw).unwrap();
        let params = Params::new().with("n", n);
        let first = kernel.query("size_plus", &params, &compiled).unwrap();
        let second = kernel.query("size_plus", &params, &compiled).unwrap();

        // Cached repeats return the same reference, hence equal results.
        prop_assert!(Arc::ptr_eq(&first, &second));
        prop_assert_eq!(
            first.downcast_ref::<i64>(),
            Some(&(compiled.root().unique_node_count() as i64 + n))
        );
    }

    #[test]
    fn prop_legacy_path_matches_precompiled_path(raw in raw_tree_strategy()) {
        let kernel = fresh_kernel();
        kernel
            .register_view(
                "digest",
                Arc::new(|config: &CompiledConfig, _: &Params| -> anyhow::Result<ViewOutput> {
                    Ok(view_output(config.root().structural_hash()))
                }),
            )
            .unwrap();

        let legacy = kernel.query("digest", &Params::new(), &raw).unwrap();
        let compiled = kernel.precompile(&raw).unwrap();
        let fast = kernel.query("digest", &Params::new(), &compiled).unwrap();
        prop_assert_eq!(
            legacy.downcast_ref::<u64>(),
            fast.downcast_ref::<u64>()
        );
    }
}

// ============================================================================
// Directed Sharing Cases
// ============================================================================

#[test]
fn test_k_copies_of_a_subtree_intern_to_one_representative() {
    let kernel = fresh_kernel();
    let subtree = RawNode::map([
        ("threshold", RawNode::from(99)),
        ("tags", RawNode::seq([RawNode::from("a"), RawNode::from("b")])),
    ]);

    let raw = RawNode::map(
        (0..10).map(|i| (format!("copy{i}"), subtree.clone())),
    );
    let compiled = kernel.precompile(&raw).unwrap();

    let representatives: Vec<&Node> = compiled
        .root()
        .entries()
        .unwrap()
        .iter()
        .map(|(_, child)| child)
        .collect();
    for other in &representatives[1..] {
        assert!(Node::ptr_eq(representatives[0], other));
    }

    // root + subtree mapping + scalar + sequence + two strings
    assert_eq!(compiled.metadata().compiled_nodes, 6);
    assert_eq!(compiled.metadata().source_nodes, 1 + 10 * 5);
}
