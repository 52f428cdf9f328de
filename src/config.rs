//! Kernel Options
//!
//! Construction-time configuration, loadable from layered sources the
//! same way hosts usually ship it:
//! - `stratum.toml` (checked-in defaults)
//! - `stratum.local.toml` (git-ignored local overrides)
//! - Environment variables (`STRATUM_*` prefix, `__` for nesting)
//!
//! ## Example
//!
//! ```toml
//! # stratum.toml
//! query_cache_capacity = 4096
//! max_depth = 128
//! collect_statistics = true
//! wildcard_tokens = ["*", "?"]
//! ```
//!
//! Environment variable overrides:
//! ```bash
//! STRATUM_QUERY_CACHE_CAPACITY=512
//! STRATUM_COLLECT_STATISTICS=true
//! ```

use figment::providers::{Env, Format, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Kernel construction options.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KernelOptions {
    /// Initial bucket count hint for the intern table.
    #[serde(default = "default_capacity_hint")]
    pub intern_table_capacity_hint: usize,

    /// Maximum cached entries per compiled-config scope.
    #[serde(default = "default_cache_capacity")]
    pub query_cache_capacity: usize,

    /// Maximum traversal depth before compilation fails.
    #[serde(default = "default_max_depth")]
    pub max_depth: usize,

    /// Enable the statistics collector. Off by default; recording is a
    /// single boolean check when disabled.
    #[serde(default)]
    pub collect_statistics: bool,

    /// Key segments treated as wildcards. Fixed for the kernel lifetime.
    #[serde(default = "default_wildcard_tokens")]
    pub wildcard_tokens: Vec<String>,

    /// Emit advisory signals from deprecated entry points.
    #[serde(default = "default_true")]
    pub emit_deprecation_signals: bool,
}

fn default_capacity_hint() -> usize {
    1024
}

fn default_cache_capacity() -> usize {
    1024
}

fn default_max_depth() -> usize {
    256
}

fn default_wildcard_tokens() -> Vec<String> {
    vec!["*".to_string()]
}

fn default_true() -> bool {
    true
}

impl Default for KernelOptions {
    fn default() -> Self {
        KernelOptions {
            intern_table_capacity_hint: default_capacity_hint(),
            query_cache_capacity: default_cache_capacity(),
            max_depth: default_max_depth(),
            collect_statistics: false,
            wildcard_tokens: default_wildcard_tokens(),
            emit_deprecation_signals: true,
        }
    }
}

impl KernelOptions {
    /// Load options from `stratum.toml`, `stratum.local.toml`, and
    /// `STRATUM_*` environment variables, in increasing precedence.
    pub fn load() -> Result<Self, figment::Error> {
        Figment::new()
            .merge(Toml::file("stratum.toml"))
            .merge(Toml::file("stratum.local.toml"))
            .merge(Env::prefixed("STRATUM_").split("__"))
            .extract()
    }

    /// Load options from a specific TOML file plus environment overrides.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self, figment::Error> {
        Figment::new()
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed("STRATUM_").split("__"))
            .extract()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_documented_values() {
        let options = KernelOptions::default();
        assert_eq!(options.intern_table_capacity_hint, 1024);
        assert_eq!(options.query_cache_capacity, 1024);
        assert_eq!(options.max_depth, 256);
        assert!(!options.collect_statistics);
        assert_eq!(options.wildcard_tokens, vec!["*".to_string()]);
        assert!(options.emit_deprecation_signals);
    }

    #[test]
    fn missing_file_yields_defaults() {
        let options: KernelOptions = Figment::new()
            .merge(Toml::file("does-not-exist.toml"))
            .extract()
            .expect("extract defaults");
        assert_eq!(options.max_depth, KernelOptions::default().max_depth);
    }

    #[test]
    fn partial_toml_fills_remaining_defaults() {
        let options: KernelOptions = Figment::new()
            .merge(Toml::string("max_depth = 32\nwildcard_tokens = [\"*\", \"?\"]"))
            .extract()
            .expect("extract partial");
        assert_eq!(options.max_depth, 32);
        assert_eq!(options.wildcard_tokens.len(), 2);
        assert_eq!(
            options.query_cache_capacity,
            KernelOptions::default().query_cache_capacity
        );
    }
}
