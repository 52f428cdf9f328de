//! Pattern Expander
//!
//! Resolves wildcard-bearing mapping keys into concrete keys using the
//! hierarchy index. A key is a dotted path; any segment equal to a
//! configured wildcard token makes the key a pattern. Expansion emits the
//! Cartesian product of the per-position hierarchy expansions, in
//! hierarchy-declared order, and broadcasts the value subtree to every
//! emitted key.
//!
//! ## Ordering and overrides
//!
//! Final key order interleaves concrete keys (original declaration order)
//! with pattern expansions inserted at the pattern's declaration position.
//! A concrete key anywhere in the mapping wins over a pattern expansion of
//! the same name; the pattern's slot for that name is elided. Two patterns
//! expanding to the same concrete key abort compilation.
//!
//! The context for the k-th wildcard segment is the mapping's tree path
//! plus the key's literal preceding segments (earlier wildcards as
//! written), which keeps every position's expansion list independent of
//! sibling choices.

use crate::error::{CompileError, CompileResult, TreePath};
use crate::hierarchy::HierarchyIndex;
use crate::node::Node;
use crate::stats::PassStats;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// Wildcard tokens fixed at kernel construction. A key segment equal to
/// any member is a wildcard position.
#[derive(Debug, Clone)]
pub(crate) struct WildcardSet {
    tokens: HashSet<String>,
}

impl WildcardSet {
    pub fn new<I, S>(tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        WildcardSet {
            tokens: tokens.into_iter().map(Into::into).collect(),
        }
    }

    pub fn is_wildcard(&self, segment: &str) -> bool {
        self.tokens.contains(segment)
    }

    fn key_is_pattern(&self, key: &str) -> bool {
        key.split('.').any(|segment| self.is_wildcard(segment))
    }
}

/// Resolve a token at a context into concrete names. Hierarchy entries may
/// name further wildcard tokens; those re-expand under a depth guard so a
/// self-referential description fails instead of looping.
fn resolve_token(
    index: &HierarchyIndex,
    wildcards: &WildcardSet,
    context: &[String],
    token: &str,
    depth: usize,
    limit: usize,
) -> CompileResult<Vec<String>> {
    if depth >= limit {
        return Err(CompileError::CyclicExpansion {
            context: TreePath::from_segments(context.iter().cloned()),
            token: token.to_string(),
        });
    }
    let names = index.expand(context, token).ok_or_else(|| {
        CompileError::UnknownWildcardContext {
            context: TreePath::from_segments(context.iter().cloned()),
            token: token.to_string(),
        }
    })?;

    let mut resolved = Vec::with_capacity(names.len());
    for name in names {
        if wildcards.is_wildcard(name) {
            resolved.extend(resolve_token(
                index, wildcards, context, name, depth + 1, limit,
            )?);
        } else {
            resolved.push(name.clone());
        }
    }
    Ok(resolved)
}

/// Expand one mapping's entries. Children are already transformed, so
/// broadcasting a value is a handle clone of the shared subtree.
pub(crate) fn expand_mapping(
    entries: Vec<(String, Node)>,
    path: &[String],
    index: &HierarchyIndex,
    wildcards: &WildcardSet,
    expansion_depth_limit: usize,
    pass: &mut PassStats,
) -> CompileResult<Vec<(Arc<str>, Node)>> {
    if !entries.iter().any(|(key, _)| wildcards.key_is_pattern(key)) {
        // Concrete-only mappings are a fixed point of expansion.
        return Ok(entries
            .into_iter()
            .map(|(key, value)| (Arc::from(key.as_str()), value))
            .collect());
    }

    let concrete: HashSet<&str> = entries
        .iter()
        .filter(|(key, _)| !wildcards.key_is_pattern(key))
        .map(|(key, _)| key.as_str())
        .collect();

    // Emitted concrete key → the pattern that produced it.
    let mut produced: HashMap<String, String> = HashMap::new();
    let mut out: Vec<(Arc<str>, Node)> = Vec::with_capacity(entries.len());

    for (key, value) in &entries {
        if !wildcards.key_is_pattern(key) {
            out.push((Arc::from(key.as_str()), value.clone()));
            continue;
        }

        let segments: Vec<&str> = key.split('.').collect();

        // Choice lists per wildcard position, left to right.
        let mut positions: Vec<(usize, Vec<String>)> = Vec::new();
        for (pos, segment) in segments.iter().enumerate() {
            if wildcards.is_wildcard(segment) {
                let mut context: Vec<String> = path.to_vec();
                context.extend(segments[..pos].iter().map(|s| (*s).to_string()));
                let names = resolve_token(
                    index,
                    wildcards,
                    &context,
                    segment,
                    0,
                    expansion_depth_limit,
                )?;
                positions.push((pos, names));
            }
        }

        // Cartesian product, leftmost position outermost.
        let mut choices: Vec<Vec<&str>> = vec![Vec::new()];
        for (_, names) in &positions {
            let mut next = Vec::with_capacity(choices.len() * names.len());
            for prefix in &choices {
                for name in names {
                    let mut extended = prefix.clone();
                    extended.push(name.as_str());
                    next.push(extended);
                }
            }
            choices = next;
        }

        for choice in &choices {
            let mut emitted_segments = segments.clone();
            for ((pos, _), name) in positions.iter().zip(choice) {
                emitted_segments[*pos] = *name;
            }
            let emitted = emitted_segments.join(".");

            if concrete.contains(emitted.as_str()) {
                // Explicit concrete override wins; elide this slot.
                continue;
            }
            if let Some(first) = produced.get(&emitted) {
                return Err(CompileError::PatternCollision {
                    path: TreePath::from_segments(path.iter().cloned()),
                    key: emitted,
                    first: first.clone(),
                    second: key.clone(),
                });
            }
            produced.insert(emitted.clone(), key.clone());
            out.push((Arc::from(emitted.as_str()), value.clone()));
            pass.keys_emitted += 1;
        }
        pass.patterns_processed += 1;
    }

    Ok(out)
}
