//! Stowage - a scoped, reference-counted async resource cache.
//!
//! This crate sits between gameplay code and an asynchronous asset
//! [`Backend`]:
//!
//! - [`ResourceCache`] loads each key at most once at a time, shares the
//!   result between concurrent callers, counts references and gives the
//!   asset back to the backend when the last one goes
//! - [`ResourceHandle`] owns exactly one acquisition and releases it on drop
//! - [`TypedLoader`] resolves logical `(category, name)` pairs through a
//!   [`PathResolver`] and can extract components from the loaded container
//! - [`CacheRegistry`] and [`ScopeCleanup`] evict everything a scope owns
//!   when that scope is torn down
//!
//! # Quick Start
//!
//! ```ignore
//! use std::sync::Arc;
//! use stowage::*;
//!
//! let registry = Arc::new(CacheRegistry::new());
//! let cache = ResourceCache::new("ui", backend, RetryPolicy::exponential(3));
//! registry.register(&cache);
//!
//! let events = ScopeEvents::default();
//! let _cleanup = ScopeCleanup::spawn(registry.clone(), events.subscribe());
//!
//! let scene = Scope::new("MainMenu");
//! let menu = cache.load_with_handle("ui/main_menu", Some(&scene)).await?;
//!
//! // Scene teardown releases everything it owns.
//! events.unloading(scene);
//! ```

pub mod backend;
pub mod cache;
pub mod cleanup;
pub mod entry;
pub mod error;
pub mod handle;
pub mod key;
pub mod loader;
pub mod metrics;
pub mod registry;
pub mod retry;

pub use backend::{Backend, LoadFuture};
pub use cache::ResourceCache;
pub use cleanup::{ScopeCleanup, ScopeEvent, ScopeEvents};
pub use entry::EntryInfo;
pub use error::{BackendError, CacheError, CacheResult};
pub use handle::ResourceHandle;
pub use key::{CacheKey, Scope};
pub use loader::{ComponentTypedLoader, PathEntry, PathResolver, PathsConfig, TypedLoader};
pub use metrics::CacheMetrics;
pub use registry::{CacheRegistry, ScopedCache};
pub use retry::{RetryConfig, RetryPolicy};
