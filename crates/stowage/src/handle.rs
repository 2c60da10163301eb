//! Resource handles - explicit ownership of one cache acquisition.
//!
//! A handle owns exactly one reference on its cache entry. It can be moved
//! but not cloned, so no two holders can each release the same acquisition.

use std::fmt;
use std::sync::Weak;

use crate::key::CacheKey;
use crate::registry::ScopedCache;

/// Ownership token for one acquisition of a cached resource.
///
/// Disposing the handle (explicitly or by dropping it) releases its reference
/// exactly once. The handle keeps only a weak link to its cache, so it never
/// extends the cache's lifetime; disposing after the cache is gone is a no-op.
///
/// Do not also call [`ResourceCache::release`](crate::ResourceCache::release)
/// for an acquisition that came back as a handle.
///
/// # Example
///
/// ```ignore
/// let mut menu = cache.load_with_handle("ui/main_menu", Some(&scene)).await?;
/// show(menu.asset().unwrap());
///
/// menu.dispose(); // refcount - 1
/// menu.dispose(); // no-op
/// ```
pub struct ResourceHandle<T> {
    key: CacheKey,
    asset: Option<T>,
    cache: Option<Weak<dyn ScopedCache>>,
}

impl<T> ResourceHandle<T> {
    /// Wrap an acquisition that has already been counted on `cache`.
    pub(crate) fn new(key: CacheKey, asset: T, cache: Weak<dyn ScopedCache>) -> Self {
        Self {
            key,
            asset: Some(asset),
            cache: Some(cache),
        }
    }

    /// The key the acquisition is counted against.
    pub fn key(&self) -> &CacheKey {
        &self.key
    }

    /// The held asset, or `None` once disposed.
    pub fn asset(&self) -> Option<&T> {
        self.asset.as_ref()
    }

    /// Returns `true` until the handle is disposed.
    pub fn is_valid(&self) -> bool {
        self.asset.is_some()
    }

    /// Release the acquisition. Only the first call has any effect.
    pub fn dispose(&mut self) {
        if self.asset.take().is_none() {
            return;
        }

        if let Some(cache) = self.cache.take().and_then(|cache| cache.upgrade()) {
            cache.release(self.key.as_str());
        } else {
            tracing::debug!(key = %self.key, "Handle outlived its cache; nothing to release");
        }
    }

    /// Convert the held asset, keeping the same single acquisition.
    ///
    /// Returns `None` (and releases the acquisition) if the handle was
    /// already disposed or `f` yields nothing.
    pub fn filter_map<U>(mut self, f: impl FnOnce(&T) -> Option<U>) -> Option<ResourceHandle<U>> {
        let mapped = self.asset.as_ref().and_then(f)?;

        // Move the acquisition over without releasing it.
        let cache = self.cache.take();
        self.asset = None;
        Some(ResourceHandle {
            key: self.key.clone(),
            asset: Some(mapped),
            cache,
        })
    }
}

impl<T> Drop for ResourceHandle<T> {
    fn drop(&mut self) {
        self.dispose();
    }
}

impl<T: fmt::Debug> fmt::Debug for ResourceHandle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceHandle")
            .field("key", &self.key)
            .field("asset", &self.asset)
            .field("valid", &self.is_valid())
            .finish()
    }
}
