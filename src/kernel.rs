//! Kernel Façade
//!
//! Public entry point tying the pipeline together:
//!
//! ```text
//! raw tree
//!     ↓
//! [Pattern Expander]   ← Hierarchy Index
//!     ↓
//! [InternPass]         ← Intern Table
//!     ↓
//! CompiledConfig ──→ query(view, params, compiled)
//!                        ↓
//!                    [Query Cache]  (identity, view, params) → result
//! ```
//!
//! `precompile` does all expensive work once; `query` answers repeated
//! parameterized view invocations at near-lookup cost. A raw tree passed
//! straight to `query` still works (the legacy path) but recompiles on
//! every call and emits a deprecation signal.
//!
//! ## Example
//!
//! ```
//! use std::sync::Arc;
//! use stratum::{view_output, Hierarchy, Kernel, KernelOptions, Params, RawNode, ViewOutput};
//!
//! let hierarchy = Hierarchy::new().define("", "*", ["x", "y"]);
//! let kernel = Kernel::new(hierarchy, KernelOptions::default());
//!
//! kernel.register_view("timeout_of", Arc::new(|config: &stratum::CompiledConfig,
//!                                              params: &Params| -> anyhow::Result<ViewOutput> {
//!     let member = params.get("member").and_then(|s| s.as_str()).unwrap_or("x");
//!     let key = format!("{member}.timeout");
//!     let value = config.root().get(&key).and_then(|n| n.as_scalar()).cloned();
//!     Ok(view_output(value))
//! })).unwrap();
//!
//! let raw = RawNode::map([("*.timeout", RawNode::from(500))]);
//! let compiled = kernel.precompile(&raw).unwrap();
//! let params = Params::new().with("member", "y");
//! let result = kernel.query("timeout_of", &params, &compiled).unwrap();
//! # assert!(result.downcast_ref::<Option<stratum::Scalar>>().is_some());
//! ```

use crate::cache::QueryCache;
use crate::compile::{CompileMetadata, CompiledConfig, PassContext};
use crate::config::KernelOptions;
use crate::error::{CompileResult, QueryError, QueryResult, RegisterError};
use crate::expand::WildcardSet;
use crate::hierarchy::{Hierarchy, HierarchyIndex};
use crate::intern::InternTable;
use crate::raw::RawNode;
use crate::stats::{StatsCollector, StatsSnapshot};
use crate::view::{Params, ViewFn, ViewOutput, ViewRegistry};
use chrono::Utc;
use parking_lot::RwLock;
use std::sync::Arc;
use std::time::Instant;

/// Advisory notice routed through the deprecation handler.
#[derive(Debug, Clone)]
pub struct DeprecationNotice {
    /// The deprecated entry point, e.g. `"compile"`.
    pub api: &'static str,
    pub message: &'static str,
}

/// Host-supplied sink for deprecation signals. The default routes
/// through `tracing::warn!`.
pub type DeprecationHandler = Arc<dyn Fn(&DeprecationNotice) + Send + Sync>;

/// Tagged union accepted by [`Kernel::query`]: either an already
/// compiled config (fast path) or a raw tree (legacy path).
pub enum ConfigInput {
    Compiled(CompiledConfig),
    Raw(RawNode),
}

impl From<CompiledConfig> for ConfigInput {
    fn from(compiled: CompiledConfig) -> Self {
        ConfigInput::Compiled(compiled)
    }
}

impl From<&CompiledConfig> for ConfigInput {
    fn from(compiled: &CompiledConfig) -> Self {
        ConfigInput::Compiled(compiled.clone())
    }
}

impl From<RawNode> for ConfigInput {
    fn from(raw: RawNode) -> Self {
        ConfigInput::Raw(raw)
    }
}

impl From<&RawNode> for ConfigInput {
    fn from(raw: &RawNode) -> Self {
        ConfigInput::Raw(raw.clone())
    }
}

/// Configuration compilation and query kernel. All public operations are
/// safe to invoke concurrently from multiple threads.
pub struct Kernel {
    options: KernelOptions,
    index: HierarchyIndex,
    wildcards: WildcardSet,
    table: InternTable,
    views: ViewRegistry,
    cache: Arc<QueryCache>,
    stats: Arc<StatsCollector>,
    deprecation: RwLock<Option<DeprecationHandler>>,
}

impl Kernel {
    /// Build a kernel over a hierarchy description. The hierarchy is
    /// indexed once here and shared by all compilations.
    pub fn new(hierarchy: Hierarchy, options: KernelOptions) -> Self {
        let stats = Arc::new(StatsCollector::new(options.collect_statistics));
        let cache = Arc::new(QueryCache::new(
            options.query_cache_capacity,
            Arc::clone(&stats),
        ));
        Kernel {
            index: HierarchyIndex::build(&hierarchy),
            wildcards: WildcardSet::new(options.wildcard_tokens.iter().cloned()),
            table: InternTable::with_capacity(options.intern_table_capacity_hint),
            views: ViewRegistry::new(),
            cache,
            stats,
            deprecation: RwLock::new(None),
            options,
        }
    }

    /// Register a view by name. Re-registering the same function under
    /// the same name is a no-op; a different function under an existing
    /// name fails with [`RegisterError::DuplicateView`].
    pub fn register_view(&self, name: &str, view: ViewFn) -> Result<(), RegisterError> {
        self.views.register(name, view)
    }

    /// Registered view names, sorted.
    pub fn view_names(&self) -> Vec<String> {
        self.views.names()
    }

    /// Ordered enumeration of every concrete name the hierarchy declares
    /// at `context` (a dotted path; `""` is the root). Empty when the
    /// hierarchy has no entries there.
    pub fn hierarchy_members(&self, context: &str) -> Vec<String> {
        let segments: Vec<String> = if context.is_empty() {
            Vec::new()
        } else {
            context.split('.').map(str::to_string).collect()
        };
        self.index.members(&segments).to_vec()
    }

    /// Compile a raw tree into an immutable, cheaply-comparable artifact.
    ///
    /// Expands pattern keys, interns every node bottom-up, and captures
    /// compile metadata. Compiling structurally-equal inputs yields
    /// identity-equal configs. Fails atomically: on error the kernel is
    /// observationally unchanged.
    ///
    /// NaN float scalars are rejected with `CompileError::InvalidInput`;
    /// the intern table never collapses or retains NaN values.
    pub fn precompile(&self, raw: &RawNode) -> CompileResult<CompiledConfig> {
        let started = Instant::now();
        let ctx = PassContext {
            table: &self.table,
            index: &self.index,
            wildcards: &self.wildcards,
            max_depth: self.options.max_depth,
        };
        let (root, pass) = ctx.run(raw)?;
        let duration = started.elapsed();

        let source_nodes = raw.node_count();
        let compiled_nodes = root.unique_node_count();
        self.stats.merge_pass(
            &pass,
            duration,
            source_nodes as u64,
            compiled_nodes as u64,
            self.table.len() as u64,
        );
        tracing::debug!(
            identity = root.id().as_u64(),
            source_nodes,
            compiled_nodes,
            duration_micros = duration.as_micros() as u64,
            "precompiled configuration"
        );

        let metadata = CompileMetadata {
            compiled_at: Utc::now(),
            source_nodes,
            compiled_nodes,
            intern_requests: pass.intern_requests,
            intern_hits: pass.intern_hits,
            patterns_expanded: pass.patterns_processed,
            keys_emitted: pass.keys_emitted,
            duration_micros: duration.as_micros() as u64,
        };
        Ok(CompiledConfig::new(
            root,
            metadata,
            Arc::downgrade(&self.cache),
        ))
    }

    /// Deprecated alias for [`Kernel::precompile`]. Retained for one
    /// major-version transition.
    #[deprecated(since = "0.1.0", note = "use `precompile` instead")]
    pub fn compile(&self, raw: &RawNode) -> CompileResult<CompiledConfig> {
        self.emit_deprecation(&DeprecationNotice {
            api: "compile",
            message: "compile() is deprecated; use precompile()",
        });
        self.precompile(raw)
    }

    /// Run a registered view. With a [`CompiledConfig`] this is the fast
    /// path: at most one execution per `(identity, view, params)` key,
    /// concurrent duplicates wait for the in-flight result. A raw tree
    /// takes the legacy path: compile-then-query on every call, with an
    /// advisory deprecation signal.
    pub fn query(
        &self,
        view: &str,
        params: &Params,
        config: impl Into<ConfigInput>,
    ) -> QueryResult<ViewOutput> {
        let compiled = match config.into() {
            ConfigInput::Compiled(compiled) => compiled,
            ConfigInput::Raw(raw) => {
                self.emit_deprecation(&DeprecationNotice {
                    api: "query(raw)",
                    message: "querying a raw tree recompiles on every call; precompile() it once",
                });
                self.precompile(&raw)?
            }
        };

        let view_fn = self
            .views
            .get(view)
            .ok_or_else(|| QueryError::ViewNotFound(view.to_string()))?;
        let fingerprint = params.fingerprint();
        tracing::trace!(view, fingerprint, identity = ?compiled.identity(), "query");

        self.cache.get_or_compute(
            compiled.identity(),
            compiled.root(),
            view,
            fingerprint,
            || {
                view_fn(&compiled, params).map_err(|error| QueryError::View {
                    view: view.to_string(),
                    error,
                })
            },
        )
    }

    /// Statistics snapshot. All zeros unless `collect_statistics` was
    /// set at construction.
    pub fn stats(&self) -> StatsSnapshot {
        self.stats
            .snapshot(self.table.len() as u64, self.cache.entry_count())
    }

    /// Drop intern entries whose compiled configs have all been
    /// released. Returns the number of entries reclaimed. Reclamation
    /// also happens opportunistically during compilation.
    pub fn reclaim(&self) -> usize {
        self.table.purge()
    }

    /// Route deprecation signals to a host-supplied sink instead of the
    /// default `tracing::warn!`.
    pub fn set_deprecation_handler(&self, handler: DeprecationHandler) {
        *self.deprecation.write() = Some(handler);
    }

    fn emit_deprecation(&self, notice: &DeprecationNotice) {
        if !self.options.emit_deprecation_signals {
            return;
        }
        let handler = self.deprecation.read().clone();
        match handler {
            Some(handler) => handler(notice),
            None => tracing::warn!(api = notice.api, "{}", notice.message),
        }
    }
}
