//! Hierarchy Index
//!
//! Read-only lookup from wildcard tokens to concrete expansions. The
//! hierarchy description is supplied at kernel construction; the index is
//! built once and shared across all compilations with lock-free reads.
//!
//! Iteration order is the insertion order of the description, so two runs
//! over the same description produce byte-identical expansion sequences.
//!
//! ## Example
//!
//! ```
//! use stratum::Hierarchy;
//!
//! let hierarchy = Hierarchy::new()
//!     .define("", "*", ["edge", "core"])
//!     .define("edge", "*", ["tokyo", "osaka"]);
//! ```

use std::collections::HashMap;

/// One `(context, token) → names` rule of the description.
#[derive(Debug, Clone)]
struct HierarchyEntry {
    context: Vec<String>,
    token: String,
    names: Vec<String>,
}

/// User-supplied hierarchy description. Contexts are dotted paths
/// (`""` is the root); redefining a `(context, token)` pair replaces the
/// earlier names in place.
#[derive(Debug, Clone, Default)]
pub struct Hierarchy {
    entries: Vec<HierarchyEntry>,
}

fn split_context(context: &str) -> Vec<String> {
    if context.is_empty() {
        Vec::new()
    } else {
        context.split('.').map(str::to_string).collect()
    }
}

impl Hierarchy {
    pub fn new() -> Self {
        Hierarchy::default()
    }

    /// Declare the ordered expansion of `token` at `context`.
    pub fn define<I, S>(mut self, context: &str, token: &str, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let context = split_context(context);
        let names: Vec<String> = names.into_iter().map(Into::into).collect();
        if let Some(entry) = self
            .entries
            .iter_mut()
            .find(|e| e.context == context && e.token == token)
        {
            entry.names = names;
        } else {
            self.entries.push(HierarchyEntry {
                context,
                token: token.to_string(),
                names,
            });
        }
        self
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Index built once at kernel init. Immutable afterwards; reads take no
/// locks.
#[derive(Debug)]
pub(crate) struct HierarchyIndex {
    entries: Vec<HierarchyEntry>,
    /// `(joined context, token)` → entry position.
    by_key: HashMap<(String, String), usize>,
    /// Joined context → ordered deduplicated union of names across all
    /// tokens at that context.
    members: HashMap<String, Vec<String>>,
}

impl HierarchyIndex {
    pub fn build(hierarchy: &Hierarchy) -> Self {
        let entries = hierarchy.entries.clone();
        let mut by_key = HashMap::with_capacity(entries.len());
        let mut members: HashMap<String, Vec<String>> = HashMap::new();

        for (pos, entry) in entries.iter().enumerate() {
            let context_key = entry.context.join(".");
            by_key.insert((context_key.clone(), entry.token.clone()), pos);
            let union = members.entry(context_key).or_default();
            for name in &entry.names {
                if !union.contains(name) {
                    union.push(name.clone());
                }
            }
        }

        HierarchyIndex {
            entries,
            by_key,
            members,
        }
    }

    /// Ordered expansion of `token` at `context`, or `None` when the
    /// description has no rule for that position.
    pub fn expand(&self, context: &[String], token: &str) -> Option<&[String]> {
        let key = (context.join("."), token.to_string());
        self.by_key
            .get(&key)
            .map(|&pos| self.entries[pos].names.as_slice())
    }

    /// Ordered enumeration of every concrete name declared at `context`.
    pub fn members(&self, context: &[String]) -> &[String] {
        self.members
            .get(&context.join("."))
            .map_or(&[], Vec::as_slice)
    }
}
