//! View Registry and Query Parameters
//!
//! Views are pure functions `(CompiledConfig, Params) → Result` registered
//! by name. The kernel assumes `(view name, params, compiled identity)`
//! fully determines the result; a view observing mutable external state
//! silently corrupts the cache, which is a programming error rather than
//! a runtime-checked condition.
//!
//! Results are opaque to the kernel and cached by reference.
//!
//! ## Example
//!
//! ```
//! use stratum::{view_output, CompiledConfig, Params, ViewFn, ViewOutput};
//! use std::sync::Arc;
//!
//! let view: ViewFn = Arc::new(
//!     |_config: &CompiledConfig, params: &Params| -> anyhow::Result<ViewOutput> {
//!         let n = params.get("n").and_then(|s| s.as_int()).unwrap_or(0);
//!         Ok(view_output(n * 2))
//!     },
//! );
//! ```

use crate::compile::CompiledConfig;
use crate::error::RegisterError;
use crate::value::Scalar;
use parking_lot::RwLock;
use std::any::Any;
use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// View result, opaque to the kernel. Downcast with
/// [`ViewOutput::downcast_ref`] on the `Any` surface.
pub type ViewOutput = Arc<dyn Any + Send + Sync>;

/// Registered view function.
pub type ViewFn =
    Arc<dyn Fn(&CompiledConfig, &Params) -> anyhow::Result<ViewOutput> + Send + Sync>;

/// Wrap a concrete value as a [`ViewOutput`].
pub fn view_output<T: Send + Sync + 'static>(value: T) -> ViewOutput {
    Arc::new(value)
}

/// Insertion-ordered query parameters. Order is significant: the
/// fingerprint hashes the ordered entries, matching the kernel's
/// mapping-key ordering semantics.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Params {
    entries: Vec<(String, Scalar)>,
}

impl Params {
    pub fn new() -> Self {
        Params::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Scalar>) -> Self {
        self.insert(key.into(), value.into());
        self
    }

    /// Insert a parameter, preserving order. Re-inserting an existing key
    /// replaces its value without moving it.
    pub fn insert(&mut self, key: String, value: Scalar) {
        if let Some(entry) = self.entries.iter_mut().find(|(k, _)| *k == key) {
            entry.1 = value;
        } else {
            self.entries.push((key, value));
        }
    }

    pub fn get(&self, key: &str) -> Option<&Scalar> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Scalar)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Structural hash over the ordered entries, used as the third cache
    /// key component.
    pub fn fingerprint(&self) -> u64 {
        let mut hasher = DefaultHasher::new();
        hasher.write_usize(self.entries.len());
        for (key, value) in &self.entries {
            hasher.write_usize(key.len());
            hasher.write(key.as_bytes());
            value.hash(&mut hasher);
        }
        hasher.finish()
    }
}

impl<K: Into<String>, V: Into<Scalar>> FromIterator<(K, V)> for Params {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut params = Params::new();
        for (key, value) in iter {
            params.insert(key.into(), value.into());
        }
        params
    }
}

/// Name → view function mapping.
pub(crate) struct ViewRegistry {
    views: RwLock<HashMap<String, ViewFn>>,
}

impl ViewRegistry {
    pub fn new() -> Self {
        ViewRegistry {
            views: RwLock::new(HashMap::new()),
        }
    }

    /// Register a view. Re-registering the same function under the same
    /// name is a no-op; a different function under an existing name is
    /// rejected.
    pub fn register(&self, name: &str, view: ViewFn) -> Result<(), RegisterError> {
        let mut views = self.views.write();
        if let Some(existing) = views.get(name) {
            if Arc::ptr_eq(existing, &view) {
                return Ok(());
            }
            return Err(RegisterError::DuplicateView(name.to_string()));
        }
        views.insert(name.to_string(), view);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<ViewFn> {
        self.views.read().get(name).cloned()
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.views.read().keys().cloned().collect();
        names.sort();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noop_view() -> ViewFn {
        Arc::new(|_, _| Ok(view_output(())))
    }

    #[test]
    fn fingerprint_is_order_sensitive() {
        let ab: Params = [("a", 1i64), ("b", 2i64)].into_iter().collect();
        let ba: Params = [("b", 2i64), ("a", 1i64)].into_iter().collect();
        assert_ne!(ab.fingerprint(), ba.fingerprint());
    }

    #[test]
    fn fingerprint_is_stable_for_equal_params() {
        let a = Params::new().with("n", 3i64).with("tag", "x");
        let b = Params::new().with("n", 3i64).with("tag", "x");
        assert_eq!(a, b);
        assert_eq!(a.fingerprint(), b.fingerprint());
    }

    #[test]
    fn reinsert_replaces_without_moving() {
        let params = Params::new().with("a", 1i64).with("b", 2i64).with("a", 3i64);
        let keys: Vec<&str> = params.iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["a", "b"]);
        assert_eq!(params.get("a"), Some(&Scalar::Int(3)));
    }

    #[test]
    fn duplicate_registration_is_rejected() {
        let registry = ViewRegistry::new();
        registry.register("v", noop_view()).unwrap();
        let err = registry.register("v", noop_view()).unwrap_err();
        assert!(matches!(err, RegisterError::DuplicateView(name) if name == "v"));
    }

    #[test]
    fn reregistering_the_same_function_is_a_noop() {
        let registry = ViewRegistry::new();
        let view = noop_view();
        registry.register("v", view.clone()).unwrap();
        registry.register("v", view).unwrap();
        assert_eq!(registry.names(), vec!["v".to_string()]);
    }
}
