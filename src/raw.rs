//! Raw Configuration Tree
//!
//! The input model consumed by `precompile`: an in-memory tree of
//! order-preserving mappings, sequences, and scalars. Mapping keys may
//! contain wildcard tokens (pattern keys); the compile pass expands them.
//!
//! Hosts that keep configuration in their own mapping type can feed the
//! kernel through [`MappingSource`] instead of rebuilding a [`RawMapping`]
//! by hand.
//!
//! ## Example
//!
//! ```
//! use stratum::RawNode;
//!
//! let raw = RawNode::map([
//!     ("a", RawNode::from(1)),
//!     ("b", RawNode::seq([RawNode::from("x"), RawNode::from(true)])),
//! ]);
//! assert_eq!(raw.as_mapping().unwrap().len(), 2);
//! ```

use crate::value::Scalar;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// A raw configuration sub-tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawNode {
    Scalar(Scalar),
    Sequence(Vec<RawNode>),
    Mapping(RawMapping),
}

impl RawNode {
    /// Build a mapping node from `(key, value)` pairs, preserving order.
    /// A repeated key replaces the earlier value in place.
    pub fn map<I, K>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, RawNode)>,
        K: Into<String>,
    {
        let mut mapping = RawMapping::new();
        for (key, value) in entries {
            mapping.insert(key.into(), value);
        }
        RawNode::Mapping(mapping)
    }

    /// Build a sequence node.
    pub fn seq<I>(items: I) -> Self
    where
        I: IntoIterator<Item = RawNode>,
    {
        RawNode::Sequence(items.into_iter().collect())
    }

    pub fn as_scalar(&self) -> Option<&Scalar> {
        match self {
            RawNode::Scalar(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_mapping(&self) -> Option<&RawMapping> {
        match self {
            RawNode::Mapping(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_sequence(&self) -> Option<&[RawNode]> {
        match self {
            RawNode::Sequence(items) => Some(items),
            _ => None,
        }
    }

    /// Total node count of the tree, used for the source-size estimate.
    pub fn node_count(&self) -> usize {
        match self {
            RawNode::Scalar(_) => 1,
            RawNode::Sequence(items) => 1 + items.iter().map(RawNode::node_count).sum::<usize>(),
            RawNode::Mapping(m) => {
                1 + m.iter().map(|(_, v)| v.node_count()).sum::<usize>()
            }
        }
    }
}

impl From<Scalar> for RawNode {
    fn from(value: Scalar) -> Self {
        RawNode::Scalar(value)
    }
}

macro_rules! raw_from_scalar {
    ($($ty:ty),*) => {
        $(impl From<$ty> for RawNode {
            fn from(value: $ty) -> Self {
                RawNode::Scalar(value.into())
            }
        })*
    };
}

raw_from_scalar!(bool, i32, i64, f64, &str, String);

/// Order-preserving string-keyed mapping with unique keys.
#[derive(Debug, Clone, Default)]
pub struct RawMapping {
    entries: Vec<(String, RawNode)>,
    index: HashMap<String, usize>,
}

impl Serialize for RawMapping {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        use serde::ser::SerializeMap;
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (key, value) in &self.entries {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for RawMapping {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct MappingVisitor;

        impl<'de> serde::de::Visitor<'de> for MappingVisitor {
            type Value = RawMapping;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a string-keyed mapping")
            }

            fn visit_map<A: serde::de::MapAccess<'de>>(
                self,
                mut access: A,
            ) -> Result<RawMapping, A::Error> {
                let mut mapping = RawMapping::new();
                // MapAccess yields entries in document order.
                while let Some((key, value)) = access.next_entry::<String, RawNode>()? {
                    mapping.insert(key, value);
                }
                Ok(mapping)
            }
        }

        deserializer.deserialize_map(MappingVisitor)
    }
}

impl RawMapping {
    pub fn new() -> Self {
        RawMapping::default()
    }

    /// Insert a key, keeping insertion order. Re-inserting an existing key
    /// replaces its value without moving it.
    pub fn insert(&mut self, key: String, value: RawNode) {
        if let Some(&pos) = self.index.get(&key) {
            self.entries[pos].1 = value;
        } else {
            self.index.insert(key.clone(), self.entries.len());
            self.entries.push((key, value));
        }
    }

    pub fn get(&self, key: &str) -> Option<&RawNode> {
        self.index.get(key).map(|&pos| &self.entries[pos].1)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.index.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &RawNode)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }
}

impl PartialEq for RawMapping {
    fn eq(&self, other: &Self) -> bool {
        self.entries == other.entries
    }
}

impl From<Vec<(String, RawNode)>> for RawMapping {
    fn from(pairs: Vec<(String, RawNode)>) -> Self {
        let mut mapping = RawMapping::new();
        for (key, value) in pairs {
            mapping.insert(key, value);
        }
        mapping
    }
}

impl From<RawMapping> for Vec<(String, RawNode)> {
    fn from(mapping: RawMapping) -> Self {
        mapping.entries
    }
}

impl FromIterator<(String, RawNode)> for RawMapping {
    fn from_iter<I: IntoIterator<Item = (String, RawNode)>>(iter: I) -> Self {
        Vec::from_iter(iter).into()
    }
}

/// Capability set the kernel needs from a host mapping: ordered iteration,
/// lookup by key, and size. Implemented by [`RawMapping`] and by plain
/// pair vectors; host adapters implement it for their own mapping types.
pub trait MappingSource {
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn get(&self, key: &str) -> Option<&RawNode>;

    /// Key-value pairs in insertion order.
    fn iter_entries<'a>(&'a self) -> Box<dyn Iterator<Item = (&'a str, &'a RawNode)> + 'a>;
}

impl MappingSource for RawMapping {
    fn len(&self) -> usize {
        RawMapping::len(self)
    }

    fn get(&self, key: &str) -> Option<&RawNode> {
        RawMapping::get(self, key)
    }

    fn iter_entries<'a>(&'a self) -> Box<dyn Iterator<Item = (&'a str, &'a RawNode)> + 'a> {
        Box::new(self.iter())
    }
}

impl MappingSource for Vec<(String, RawNode)> {
    fn len(&self) -> usize {
        Vec::len(self)
    }

    fn get(&self, key: &str) -> Option<&RawNode> {
        self.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    fn iter_entries<'a>(&'a self) -> Box<dyn Iterator<Item = (&'a str, &'a RawNode)> + 'a> {
        Box::new(self.iter().map(|(k, v)| (k.as_str(), v)))
    }
}

impl RawMapping {
    /// Copy any [`MappingSource`] into the kernel's own mapping type.
    pub fn from_source(source: &dyn MappingSource) -> Self {
        source
            .iter_entries()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }
}
