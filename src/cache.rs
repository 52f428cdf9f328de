//! Query Cache
//!
//! Three-level cache keyed by `(compiled identity, view name, params
//! fingerprint)`. Entries live in per-identity scopes with bounded LRU
//! eviction; a scope is discarded when its compiled config is released.
//!
//! ## Single-flight
//!
//! On a miss the requesting thread claims the key and computes outside
//! the lock; concurrent requests for the same key block on the scope's
//! condvar and observe the leader's result. A failing computation is not
//! memoized: the claim is released, one waiter takes over as the new
//! leader, and the failed leader's error propagates only to its own
//! caller.

use crate::compile::CompiledId;
use crate::node::{Node, WeakNode};
use crate::stats::StatsCollector;
use crate::view::ViewOutput;
use dashmap::DashMap;
use lru::LruCache;
use parking_lot::{Condvar, Mutex};
use std::collections::HashSet;
use std::num::NonZeroUsize;
use std::sync::Arc;

/// `(view name, params fingerprint)`; the identity level is the scope.
type EntryKey = (String, u64);

struct ScopeState {
    entries: LruCache<EntryKey, ViewOutput>,
    in_flight: HashSet<EntryKey>,
}

struct Scope {
    /// Liveness probe for the owning compiled config.
    root: WeakNode,
    state: Mutex<ScopeState>,
    cond: Condvar,
}

pub(crate) struct QueryCache {
    scopes: DashMap<CompiledId, Arc<Scope>>,
    capacity: NonZeroUsize,
    stats: Arc<StatsCollector>,
}

/// Releases a single-flight claim on drop, so waiters are woken even if
/// the computation panics.
struct FlightGuard<'a> {
    scope: &'a Scope,
    key: &'a EntryKey,
}

impl Drop for FlightGuard<'_> {
    fn drop(&mut self) {
        let mut state = self.scope.state.lock();
        state.in_flight.remove(self.key);
        self.scope.cond.notify_all();
    }
}

impl QueryCache {
    pub fn new(capacity: usize, stats: Arc<StatsCollector>) -> Self {
        QueryCache {
            scopes: DashMap::new(),
            capacity: NonZeroUsize::new(capacity.max(1)).expect("capacity is at least one"),
            stats,
        }
    }

    fn scope(&self, identity: CompiledId, root: &Node) -> Arc<Scope> {
        if let Some(existing) = self.scopes.get(&identity) {
            return Arc::clone(&existing);
        }
        // Scope creation is rare (once per compiled config); use it to
        // sweep scopes whose configs were released without an eager
        // discard.
        self.scopes.retain(|_, scope| scope.root.is_alive());
        Arc::clone(
            &self
                .scopes
                .entry(identity)
                .or_insert_with(|| {
                    Arc::new(Scope {
                        root: root.downgrade(),
                        state: Mutex::new(ScopeState {
                            entries: LruCache::new(self.capacity),
                            in_flight: HashSet::new(),
                        }),
                        cond: Condvar::new(),
                    })
                }),
        )
    }

    /// Look up `(identity, view, fingerprint)`, running `compute` at most
    /// once concurrently per key.
    pub fn get_or_compute<E>(
        &self,
        identity: CompiledId,
        root: &Node,
        view_name: &str,
        fingerprint: u64,
        compute: impl FnOnce() -> Result<ViewOutput, E>,
    ) -> Result<ViewOutput, E> {
        let scope = self.scope(identity, root);
        let key: EntryKey = (view_name.to_string(), fingerprint);

        {
            let mut state = scope.state.lock();
            loop {
                if let Some(value) = state.entries.get(&key) {
                    self.stats.record_cache_hit();
                    return Ok(Arc::clone(value));
                }
                if state.in_flight.contains(&key) {
                    self.stats.record_single_flight_wait();
                    scope.cond.wait(&mut state);
                    continue;
                }
                state.in_flight.insert(key.clone());
                break;
            }
        }

        self.stats.record_cache_miss();
        let guard = FlightGuard {
            scope: &scope,
            key: &key,
        };
        let result = compute();

        if let Ok(value) = &result {
            let mut state = scope.state.lock();
            if let Some((evicted, _)) = state.entries.push(key.clone(), Arc::clone(value)) {
                if evicted != key {
                    self.stats.record_eviction();
                }
            }
        }
        drop(guard);
        result
    }

    /// Discard the whole cache scope of a released compiled config.
    pub fn discard_scope(&self, identity: CompiledId) {
        self.scopes.remove(&identity);
    }

    /// Entries currently cached across live scopes.
    pub fn entry_count(&self) -> u64 {
        self.scopes
            .iter()
            .filter(|scope| scope.root.is_alive())
            .map(|scope| scope.state.lock().entries.len() as u64)
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::intern::InternTable;
    use crate::node::NodeKind;
    use crate::stats::PassStats;
    use crate::value::Scalar;
    use crate::view::view_output;
    use std::convert::Infallible;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;

    fn test_root(i: i64) -> Node {
        let table = InternTable::with_capacity(4);
        let mut pass = PassStats::default();
        table
            .intern(NodeKind::Scalar(Scalar::Int(i)), &mut pass)
            .unwrap()
    }

    fn cache(capacity: usize) -> QueryCache {
        QueryCache::new(capacity, Arc::new(StatsCollector::new(true)))
    }

    #[test]
    fn second_lookup_is_a_hit() {
        let cache = cache(8);
        let root = test_root(1);
        let identity = CompiledId(root.id().as_u64());
        let calls = AtomicUsize::new(0);

        for _ in 0..3 {
            let value = cache
                .get_or_compute::<Infallible>(identity, &root, "v", 7, || {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(view_output(42i64))
                })
                .unwrap();
            assert_eq!(value.downcast_ref::<i64>(), Some(&42));
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(cache.entry_count(), 1);
    }

    #[test]
    fn distinct_fingerprints_are_distinct_entries() {
        let cache = cache(8);
        let root = test_root(1);
        let identity = CompiledId(root.id().as_u64());

        for fp in 0..3u64 {
            cache
                .get_or_compute::<Infallible>(identity, &root, "v", fp, || {
                    Ok(view_output(fp))
                })
                .unwrap();
        }
        assert_eq!(cache.entry_count(), 3);
    }

    #[test]
    fn lru_eviction_is_bounded_per_scope() {
        let cache = cache(2);
        let root = test_root(1);
        let identity = CompiledId(root.id().as_u64());

        for fp in 0..4u64 {
            cache
                .get_or_compute::<Infallible>(identity, &root, "v", fp, || {
                    Ok(view_output(fp))
                })
                .unwrap();
        }
        assert_eq!(cache.entry_count(), 2);
    }

    #[test]
    fn failures_are_not_memoized() {
        let cache = cache(8);
        let root = test_root(1);
        let identity = CompiledId(root.id().as_u64());
        let calls = AtomicUsize::new(0);

        let err = cache.get_or_compute::<String>(identity, &root, "v", 7, || {
            calls.fetch_add(1, Ordering::SeqCst);
            Err("boom".to_string())
        });
        assert_eq!(err.unwrap_err(), "boom");

        let ok = cache.get_or_compute::<String>(identity, &root, "v", 7, || {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(view_output(1i64))
        });
        assert!(ok.is_ok());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn single_flight_runs_compute_once() {
        let cache = Arc::new(cache(8));
        let root = test_root(1);
        let identity = CompiledId(root.id().as_u64());
        let calls = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..10 {
            let cache = Arc::clone(&cache);
            let root = root.clone();
            let calls = Arc::clone(&calls);
            handles.push(thread::spawn(move || {
                cache
                    .get_or_compute::<Infallible>(identity, &root, "v", 7, || {
                        calls.fetch_add(1, Ordering::SeqCst);
                        // Widen the race window.
                        thread::sleep(std::time::Duration::from_millis(20));
                        Ok(view_output(9i64))
                    })
                    .unwrap()
            }));
        }
        let results: Vec<ViewOutput> = handles
            .into_iter()
            .map(|h| h.join().expect("query thread panicked"))
            .collect();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        for result in &results {
            assert_eq!(result.downcast_ref::<i64>(), Some(&9));
        }
    }

    #[test]
    fn discarding_a_scope_drops_its_entries() {
        let cache = cache(8);
        let root = test_root(1);
        let identity = CompiledId(root.id().as_u64());

        cache
            .get_or_compute::<Infallible>(identity, &root, "v", 7, || Ok(view_output(1i64)))
            .unwrap();
        assert_eq!(cache.entry_count(), 1);

        cache.discard_scope(identity);
        assert_eq!(cache.entry_count(), 0);
    }
}
