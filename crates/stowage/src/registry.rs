//! Registry of live caches, used to fan out scope eviction.

use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use stowage_core::logging::systems::RESOURCE_MANAGER;

use crate::key::Scope;
use crate::metrics::CacheMetrics;

/// The type-erased face of a cache, as seen by the registry and by handles.
pub trait ScopedCache: Send + Sync {
    /// Name used in log output.
    fn name(&self) -> &str;

    /// Drop one reference on `key`. Absent keys are ignored.
    fn release(&self, key: &str);

    /// Remove every entry owned by `scope`; returns how many were removed.
    fn release_by_scope(&self, scope: &Scope) -> usize;

    /// Occupancy snapshot.
    fn metrics(&self) -> CacheMetrics;
}

/// Tracks every live cache so a scope teardown reaches all of them.
///
/// The registry never owns a cache: it keeps weak references and silently
/// drops the ones whose cache is gone. Membership is by identity, so
/// registering the same cache twice is a no-op.
#[derive(Default)]
pub struct CacheRegistry {
    caches: Mutex<Vec<Weak<dyn ScopedCache>>>,
}

impl CacheRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a cache. Registering an already registered cache does nothing.
    pub fn register<C: ScopedCache + 'static>(&self, cache: &Arc<C>) {
        let mut caches = self.caches.lock();
        let address = Arc::as_ptr(cache) as *const ();
        if caches.iter().any(|weak| weak.as_ptr() as *const () == address) {
            return;
        }

        let weak: Weak<dyn ScopedCache> = Arc::downgrade(cache) as Weak<dyn ScopedCache>;
        caches.push(weak);
        tracing::debug!(system = RESOURCE_MANAGER, cache = cache.name(), "Registered cache");
    }

    /// Remove a cache. Unknown caches are ignored.
    pub fn unregister<C: ScopedCache + 'static>(&self, cache: &Arc<C>) {
        let address = Arc::as_ptr(cache) as *const ();
        let mut caches = self.caches.lock();
        let before = caches.len();
        caches.retain(|weak| weak.as_ptr() as *const () != address);
        if caches.len() != before {
            tracing::debug!(system = RESOURCE_MANAGER, cache = cache.name(), "Unregistered cache");
        }
    }

    /// Call [`ScopedCache::release_by_scope`] on every live cache.
    ///
    /// Returns the total number of entries removed.
    pub fn release_all_by_scope(&self, scope: &Scope) -> usize {
        let live = self.live();

        let released: usize = live.iter().map(|cache| cache.release_by_scope(scope)).sum();
        tracing::info!(
            system = RESOURCE_MANAGER,
            scope = %scope,
            caches = live.len(),
            released,
            "Released scope across registry"
        );
        released
    }

    /// Combined occupancy of every live cache.
    pub fn metrics(&self) -> CacheMetrics {
        let mut total = CacheMetrics::default();
        for cache in self.live() {
            total.merge(&cache.metrics());
        }
        total
    }

    /// Number of live registered caches.
    pub fn len(&self) -> usize {
        self.live().len()
    }

    /// Returns `true` if no live cache is registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Upgrade every entry, pruning dead ones.
    ///
    /// The caches are called after the registry lock is released, so a cache
    /// may register or unregister from inside its own callbacks.
    fn live(&self) -> Vec<Arc<dyn ScopedCache>> {
        let mut caches = self.caches.lock();
        let mut live = Vec::with_capacity(caches.len());
        caches.retain(|weak| match weak.upgrade() {
            Some(cache) => {
                live.push(cache);
                true
            }
            None => false,
        });
        live
    }
}
