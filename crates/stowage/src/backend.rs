//! The asynchronous asset backend the cache loads through.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::error::BackendError;
use crate::key::CacheKey;

/// Future returned by [`Backend::load`].
pub type LoadFuture<A> = Pin<Box<dyn Future<Output = Result<A, BackendError>> + Send + 'static>>;

/// A content-addressed asset backend.
///
/// The backend hands out an asset handle per successful load. The cache keeps
/// at most one handle per key and gives it back through [`Backend::release`]
/// exactly once.
///
/// # Example
///
/// ```ignore
/// struct Bundles { /* ... */ }
///
/// impl Backend for Bundles {
///     type Asset = Arc<Prefab>;
///
///     fn load(&self, key: &CacheKey) -> LoadFuture<Self::Asset> {
///         let fetch = self.fetch(key.as_str());
///         Box::pin(async move { fetch.await.map_err(|e| BackendError::new(e.to_string())) })
///     }
///
///     fn release(&self, asset: &Self::Asset) {
///         self.unload(asset.id());
///     }
///
///     fn is_valid(&self, asset: &Self::Asset) -> bool {
///         self.is_loaded(asset.id())
///     }
/// }
/// ```
pub trait Backend: Send + Sync + 'static {
    /// The loaded asset handle. Cloning must be cheap and must not load again.
    type Asset: Clone + Send + Sync + 'static;

    /// Start loading the asset behind `key`.
    fn load(&self, key: &CacheKey) -> LoadFuture<Self::Asset>;

    /// Give a loaded asset back to the backend.
    fn release(&self, asset: &Self::Asset);

    /// Whether the backend still considers the asset loaded.
    fn is_valid(&self, asset: &Self::Asset) -> bool;
}

impl<B: Backend> Backend for Arc<B> {
    type Asset = B::Asset;

    fn load(&self, key: &CacheKey) -> LoadFuture<Self::Asset> {
        (**self).load(key)
    }

    fn release(&self, asset: &Self::Asset) {
        (**self).release(asset)
    }

    fn is_valid(&self, asset: &Self::Asset) -> bool {
        (**self).is_valid(asset)
    }
}
