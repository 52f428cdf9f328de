//! # Stratum Configuration Kernel
//!
//! A configuration compilation and query kernel: compile a raw tree of
//! mappings, sequences and scalars (with wildcard pattern keys) into an
//! immutable, structurally-deduplicated artifact once, then run
//! parameterized views against it at near-lookup cost.
//!
//! ## Pipeline Architecture
//!
//! ```text
//! Raw Configuration Tree
//!     ↓
//! [Pattern Expander]    → wildcard keys resolved against the hierarchy
//!     ↓
//! [InternPass]          → bottom-up structural deduplication
//!     ↓
//! CompiledConfig        → immutable root + identity token + metadata
//!     ↓
//! [Query Cache]         → (identity, view, params) → cached result
//!     ↓
//! Results
//! ```
//!
//! The performance contract is **pre-compile then query**: everything
//! expensive (expansion, interning, index construction) happens once in
//! [`Kernel::precompile`]; [`Kernel::query`] then answers repeated
//! invocations from a three-level cache with single-flight execution.
//! Passing a raw tree to `query` still works but recompiles every call;
//! it exists for callers migrating from the pre-compilation API.
//!
//! ## Usage
//!
//! ```
//! use std::sync::Arc;
//! use stratum::{view_output, Hierarchy, Kernel, KernelOptions, Params, RawNode, ViewOutput};
//!
//! // Hierarchy: `*` at the root expands to the declared members.
//! let hierarchy = Hierarchy::new().define("", "*", ["tokyo", "osaka"]);
//! let kernel = Kernel::new(hierarchy, KernelOptions::default());
//!
//! // `*.latency` broadcasts one value to every member.
//! let raw = RawNode::map([
//!     ("*.latency", RawNode::from(25)),
//!     ("tokyo.latency", RawNode::from(5)),
//! ]);
//! let compiled = kernel.precompile(&raw)?;
//!
//! kernel.register_view("latency", Arc::new(
//!     |config: &stratum::CompiledConfig, params: &Params| -> anyhow::Result<ViewOutput> {
//!         let region = params.get("region").and_then(|s| s.as_str()).unwrap_or("tokyo");
//!         let value = config
//!             .root()
//!             .get(&format!("{region}.latency"))
//!             .and_then(|n| n.as_scalar())
//!             .and_then(|s| s.as_int());
//!         Ok(view_output(value))
//!     },
//! ))?;
//!
//! let fast = kernel.query("latency", &Params::new().with("region", "tokyo"), &compiled)?;
//! assert_eq!(fast.downcast_ref::<Option<i64>>(), Some(&Some(5)));
//!
//! let broadcast = kernel.query("latency", &Params::new().with("region", "osaka"), &compiled)?;
//! assert_eq!(broadcast.downcast_ref::<Option<i64>>(), Some(&Some(25)));
//! # Ok::<(), anyhow::Error>(())
//! ```
//!
//! ## Module Organization
//!
//! | Module | Purpose |
//! |--------|---------|
//! | `value` | Scalar leaves with canonical numeric hashing |
//! | `raw` | Raw input tree and the `MappingSource` host-adapter trait |
//! | `node` | Interned immutable tree with precomputed structural hashes |
//! | `intern` | Weak-reference structural dedup pool |
//! | `hierarchy` | Wildcard token → concrete member index |
//! | `expand` | Pattern expansion, broadcasting, override rules |
//! | `compile` | The InternPass and the `CompiledConfig` artifact |
//! | `view` | View registry and ordered query parameters |
//! | `cache` | Three-level query cache with single-flight |
//! | `kernel` | Public façade: `precompile`, `query`, statistics |
//! | `config` | Kernel options with figment TOML/env layering |
//! | `stats` | Opt-in statistics counters and snapshots |

pub mod compile;
pub mod config;
pub mod error;
pub mod hierarchy;
pub mod kernel;
pub mod node;
pub mod raw;
pub mod stats;
pub mod value;
pub mod view;

mod cache;
mod expand;
mod intern;

pub use compile::{CompileMetadata, CompiledConfig, CompiledId};
pub use config::KernelOptions;
pub use error::{
    CompileError, CompileResult, QueryError, QueryResult, RegisterError, TreePath,
};
pub use hierarchy::Hierarchy;
pub use kernel::{ConfigInput, DeprecationHandler, DeprecationNotice, Kernel};
pub use node::{Node, NodeId, NodeKind, WeakNode};
pub use raw::{MappingSource, RawMapping, RawNode};
pub use stats::{CacheStats, CompileTimings, ExpansionStats, InternStats, StatsSnapshot};
pub use value::Scalar;
pub use view::{view_output, Params, ViewFn, ViewOutput};
