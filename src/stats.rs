//! Statistics Collector
//!
//! Opt-in counters for interning, pattern expansion, query caching and
//! compile timing. When collection is disabled every record call is a
//! single relaxed boolean load. Counters are monotonic and eventually
//! consistent; instantaneous exact values are not guaranteed.
//!
//! Compile-side numbers accumulate in a per-pass [`PassStats`] buffer and
//! merge into the collector only when the pass succeeds, so failed
//! compilations leave the statistics observationally unchanged.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Per-compilation accumulator. Dropped without merging when the pass
/// fails.
#[derive(Debug, Default, Clone)]
pub(crate) struct PassStats {
    pub intern_requests: u64,
    pub intern_hits: u64,
    pub unique_scalars: u64,
    pub unique_mappings: u64,
    pub unique_sequences: u64,
    pub patterns_processed: u64,
    pub keys_emitted: u64,
}

impl PassStats {
    pub fn record_hit(&mut self) {
        self.intern_requests += 1;
        self.intern_hits += 1;
    }

    pub fn record_adoption(&mut self, variant: &'static str) {
        self.intern_requests += 1;
        match variant {
            "scalar" => self.unique_scalars += 1,
            "mapping" => self.unique_mappings += 1,
            _ => self.unique_sequences += 1,
        }
    }
}

/// Process-wide collector owned by the kernel.
#[derive(Debug)]
pub(crate) struct StatsCollector {
    enabled: bool,

    intern_requests: AtomicU64,
    intern_hits: AtomicU64,
    unique_scalars: AtomicU64,
    unique_mappings: AtomicU64,
    unique_sequences: AtomicU64,
    peak_table_size: AtomicU64,

    patterns_processed: AtomicU64,
    keys_emitted: AtomicU64,
    collisions_detected: AtomicU64,

    cache_hits: AtomicU64,
    cache_misses: AtomicU64,
    cache_evictions: AtomicU64,
    single_flight_waits: AtomicU64,

    compiles: AtomicU64,
    last_compile_micros: AtomicU64,
    last_original_size: AtomicU64,
    last_optimized_size: AtomicU64,
}

impl StatsCollector {
    pub fn new(enabled: bool) -> Self {
        StatsCollector {
            enabled,
            intern_requests: AtomicU64::new(0),
            intern_hits: AtomicU64::new(0),
            unique_scalars: AtomicU64::new(0),
            unique_mappings: AtomicU64::new(0),
            unique_sequences: AtomicU64::new(0),
            peak_table_size: AtomicU64::new(0),
            patterns_processed: AtomicU64::new(0),
            keys_emitted: AtomicU64::new(0),
            collisions_detected: AtomicU64::new(0),
            cache_hits: AtomicU64::new(0),
            cache_misses: AtomicU64::new(0),
            cache_evictions: AtomicU64::new(0),
            single_flight_waits: AtomicU64::new(0),
            compiles: AtomicU64::new(0),
            last_compile_micros: AtomicU64::new(0),
            last_original_size: AtomicU64::new(0),
            last_optimized_size: AtomicU64::new(0),
        }
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    /// Fold a successful pass into the collector.
    pub fn merge_pass(
        &self,
        pass: &PassStats,
        duration: Duration,
        original_size: u64,
        optimized_size: u64,
        live_table_size: u64,
    ) {
        if !self.enabled {
            return;
        }
        self.intern_requests
            .fetch_add(pass.intern_requests, Ordering::Relaxed);
        self.intern_hits.fetch_add(pass.intern_hits, Ordering::Relaxed);
        self.unique_scalars
            .fetch_add(pass.unique_scalars, Ordering::Relaxed);
        self.unique_mappings
            .fetch_add(pass.unique_mappings, Ordering::Relaxed);
        self.unique_sequences
            .fetch_add(pass.unique_sequences, Ordering::Relaxed);
        self.patterns_processed
            .fetch_add(pass.patterns_processed, Ordering::Relaxed);
        self.keys_emitted.fetch_add(pass.keys_emitted, Ordering::Relaxed);
        self.peak_table_size
            .fetch_max(live_table_size, Ordering::Relaxed);
        self.compiles.fetch_add(1, Ordering::Relaxed);
        self.last_compile_micros
            .store(duration.as_micros() as u64, Ordering::Relaxed);
        self.last_original_size
            .store(original_size, Ordering::Relaxed);
        self.last_optimized_size
            .store(optimized_size, Ordering::Relaxed);
    }

    pub fn record_cache_hit(&self) {
        if self.enabled {
            self.cache_hits.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_cache_miss(&self) {
        if self.enabled {
            self.cache_misses.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_eviction(&self) {
        if self.enabled {
            self.cache_evictions.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_single_flight_wait(&self) {
        if self.enabled {
            self.single_flight_waits.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn snapshot(&self, live_table_size: u64, cache_entries: u64) -> StatsSnapshot {
        StatsSnapshot {
            intern: InternStats {
                requests: self.intern_requests.load(Ordering::Relaxed),
                hits: self.intern_hits.load(Ordering::Relaxed),
                unique_scalars: self.unique_scalars.load(Ordering::Relaxed),
                unique_mappings: self.unique_mappings.load(Ordering::Relaxed),
                unique_sequences: self.unique_sequences.load(Ordering::Relaxed),
                live_nodes: live_table_size,
                peak_table_size: self.peak_table_size.load(Ordering::Relaxed),
            },
            expansion: ExpansionStats {
                patterns_processed: self.patterns_processed.load(Ordering::Relaxed),
                keys_emitted: self.keys_emitted.load(Ordering::Relaxed),
                collisions_detected: self.collisions_detected.load(Ordering::Relaxed),
            },
            cache: CacheStats {
                hits: self.cache_hits.load(Ordering::Relaxed),
                misses: self.cache_misses.load(Ordering::Relaxed),
                evictions: self.cache_evictions.load(Ordering::Relaxed),
                single_flight_waits: self.single_flight_waits.load(Ordering::Relaxed),
                current_entries: cache_entries,
            },
            compile: CompileTimings {
                compiles: self.compiles.load(Ordering::Relaxed),
                last_duration_micros: self.last_compile_micros.load(Ordering::Relaxed),
                last_original_size: self.last_original_size.load(Ordering::Relaxed),
                last_optimized_size: self.last_optimized_size.load(Ordering::Relaxed),
            },
        }
    }
}

/// Point-in-time view of all counters. All zeros when collection is
/// disabled.
#[derive(Debug, Clone, Default, Serialize)]
pub struct StatsSnapshot {
    pub intern: InternStats,
    pub expansion: ExpansionStats,
    pub cache: CacheStats,
    pub compile: CompileTimings,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct InternStats {
    /// Total intern requests across successful compiles.
    pub requests: u64,
    /// Requests answered by an existing representative.
    pub hits: u64,
    pub unique_scalars: u64,
    pub unique_mappings: u64,
    pub unique_sequences: u64,
    /// Live representatives currently in the table.
    pub live_nodes: u64,
    /// High-water mark of live representatives observed after compiles.
    pub peak_table_size: u64,
}

impl InternStats {
    /// Hit rate over all requests, in `[0, 1]`.
    pub fn hit_rate(&self) -> f64 {
        if self.requests == 0 {
            0.0
        } else {
            self.hits as f64 / self.requests as f64
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ExpansionStats {
    pub patterns_processed: u64,
    pub keys_emitted: u64,
    /// Always 0 after successful compiles; collisions abort the pass
    /// before its statistics merge.
    pub collisions_detected: u64,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub single_flight_waits: u64,
    pub current_entries: u64,
}

impl CacheStats {
    /// Hit rate over all lookups, in `[0, 1]`.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct CompileTimings {
    pub compiles: u64,
    pub last_duration_micros: u64,
    pub last_original_size: u64,
    pub last_optimized_size: u64,
}
