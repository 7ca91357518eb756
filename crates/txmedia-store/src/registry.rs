//! Store registry
//!
//! Process-wide mapping from symbolic names to configured stores, plus a
//! designated default. Initialized once at startup and read-mostly after
//! that; re-registering a name replaces the prior mapping.

use std::collections::HashMap;
use std::sync::Arc;

use once_cell::sync::Lazy;
use parking_lot::RwLock;
use tracing::info;
use txmedia_core::{ConfigResult, ConfigurationError};

use crate::store::Store;

static GLOBAL: Lazy<StoreRegistry> = Lazy::new(StoreRegistry::new);

/// Named store instances and the process default.
pub struct StoreRegistry {
    stores: RwLock<HashMap<String, Arc<dyn Store>>>,
    default: RwLock<Option<String>>,
}

impl Default for StoreRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl StoreRegistry {
    pub fn new() -> Self {
        Self {
            stores: RwLock::new(HashMap::new()),
            default: RwLock::new(None),
        }
    }

    /// The process-wide registry.
    ///
    /// Opt-in convenience; the lifecycle manager takes an explicit
    /// `Arc<StoreRegistry>` handle as its primary API.
    pub fn global() -> &'static StoreRegistry {
        &GLOBAL
    }

    /// Register a store under `name`, replacing any prior mapping.
    pub fn register(&self, name: impl Into<String>, store: Arc<dyn Store>, default: bool) {
        let name = name.into();
        info!(name = %name, backend = store.name(), default, "store registered");
        self.stores.write().insert(name.clone(), store);
        if default {
            *self.default.write() = Some(name);
        }
    }

    /// Resolve the named store, or the default when `name` is `None`.
    pub fn get(&self, name: Option<&str>) -> ConfigResult<Arc<dyn Store>> {
        let name = match name {
            Some(n) => n.to_string(),
            None => self
                .default
                .read()
                .clone()
                .ok_or(ConfigurationError::NoDefaultStore)?,
        };

        self.stores
            .read()
            .get(&name)
            .cloned()
            .ok_or(ConfigurationError::UnknownStore(name))
    }

    /// Name of the default store, if one is designated.
    pub fn default_name(&self) -> Option<String> {
        self.default.read().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryStore;

    #[test]
    fn test_resolve_named_and_default() {
        let registry = StoreRegistry::new();
        registry.register("main", Arc::new(MemoryStore::new()), true);
        registry.register("cache", Arc::new(MemoryStore::new()), false);

        assert_eq!(registry.get(None).unwrap().name(), "memory");
        assert_eq!(registry.get(Some("cache")).unwrap().name(), "memory");
        assert_eq!(registry.default_name().as_deref(), Some("main"));
    }

    #[test]
    fn test_no_default() {
        let registry = StoreRegistry::new();
        registry.register("only", Arc::new(MemoryStore::new()), false);

        let err = registry.get(None).unwrap_err();
        assert_eq!(err, ConfigurationError::NoDefaultStore);
    }

    #[test]
    fn test_unknown_name() {
        let registry = StoreRegistry::new();
        let err = registry.get(Some("missing")).unwrap_err();
        assert_eq!(err, ConfigurationError::UnknownStore("missing".to_string()));
    }

    #[test]
    fn test_reregistration_replaces() {
        let registry = StoreRegistry::new();
        let first: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let second: Arc<dyn Store> = Arc::new(MemoryStore::new());

        registry.register("main", first.clone(), true);
        registry.register("main", second.clone(), true);

        let resolved = registry.get(Some("main")).unwrap();
        assert!(Arc::ptr_eq(&resolved, &second));
        assert!(!Arc::ptr_eq(&resolved, &first));
    }
}
