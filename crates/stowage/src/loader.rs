//! Typed loaders - logical names in, typed assets out.
//!
//! A [`TypedLoader`] resolves a `(category, name)` pair to a [`CacheKey`]
//! through a [`PathResolver`], loads it through a shared [`ResourceCache`]
//! and post-processes the loaded container into the type callers want.

use std::any::type_name;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use stowage_core::alloc::HashMap;
use stowage_core::logging::systems::RESOURCE_MANAGER;

use crate::backend::Backend;
use crate::cache::ResourceCache;
use crate::error::{CacheError, CacheResult};
use crate::handle::ResourceHandle;
use crate::key::{CacheKey, Scope};

/// Maps a logical `(category, name)` pair to a backend key.
pub trait PathResolver: Send + Sync {
    /// Resolve `name` within `category`.
    ///
    /// Fails with [`CacheError::Resolution`] when the category is unmapped.
    fn resolve(&self, category: &str, name: &str) -> CacheResult<CacheKey>;
}

impl<F> PathResolver for F
where
    F: Fn(&str, &str) -> CacheResult<CacheKey> + Send + Sync,
{
    fn resolve(&self, category: &str, name: &str) -> CacheResult<CacheKey> {
        self(category, name)
    }
}

/// One `category -> base path` mapping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathEntry {
    pub category: String,
    pub path: String,
}

#[derive(Deserialize)]
struct PathsDocument {
    #[serde(default)]
    entries: Vec<PathEntry>,
}

/// Config-backed [`PathResolver`]: keys are `"{base path}/{name}"`.
///
/// ```json
/// { "entries": [ { "category": "UICanvas", "path": "Prefabs/UI" } ] }
/// ```
///
/// Later entries for the same category replace earlier ones.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(from = "PathsDocument")]
pub struct PathsConfig {
    paths: HashMap<String, String>,
}

impl PathsConfig {
    /// Build from explicit entries.
    pub fn new(entries: impl IntoIterator<Item = PathEntry>) -> Self {
        Self {
            paths: entries
                .into_iter()
                .map(|entry| (entry.category, entry.path))
                .collect(),
        }
    }

    /// Add or replace one mapping.
    pub fn with_path(mut self, category: impl Into<String>, path: impl Into<String>) -> Self {
        self.paths.insert(category.into(), path.into());
        self
    }

    /// Base path registered for `category`.
    pub fn path(&self, category: &str) -> Option<&str> {
        self.paths.get(category).map(String::as_str)
    }
}

impl From<PathsDocument> for PathsConfig {
    fn from(document: PathsDocument) -> Self {
        PathsConfig::new(document.entries)
    }
}

impl PathResolver for PathsConfig {
    fn resolve(&self, category: &str, name: &str) -> CacheResult<CacheKey> {
        let Some(base) = self.paths.get(category) else {
            return Err(CacheError::Resolution {
                category: category.to_string(),
                name: name.to_string(),
            });
        };

        let name = name.trim_start_matches('/');
        if name.is_empty() {
            return Err(CacheError::validation(format!(
                "empty resource name in category '{}'",
                category
            )));
        }

        let base = base.trim_end_matches('/');
        if base.is_empty() {
            CacheKey::new(name)
        } else {
            CacheKey::new(format!("{}/{}", base, name))
        }
    }
}

type Extractor<A, T> = Arc<dyn Fn(&A) -> Option<T> + Send + Sync>;

/// Loads resources of one category through a shared cache.
///
/// Built with [`TypedLoader::new`] it hands out the backend's container as
/// is. Built with [`TypedLoader::component`] it extracts a sub-object from
/// the container (see [`ComponentTypedLoader`]); references are still
/// counted on the container's key, so several component loaders over one
/// cache share a single entry and a single backend asset.
///
/// Each call is an independent request; the loader holds no state of its own.
///
/// # Example
///
/// ```ignore
/// let canvases = TypedLoader::component(cache.clone(), paths.clone(), "UICanvas", |prefab: &Arc<Prefab>| {
///     prefab.component::<CanvasView>()
/// });
///
/// let view = canvases.load_async("MainMenu").await?;
/// ```
pub struct TypedLoader<B: Backend, T> {
    cache: Arc<ResourceCache<B>>,
    resolver: Arc<dyn PathResolver>,
    category: String,
    scope: Option<Scope>,
    extract: Extractor<B::Asset, T>,
    target: &'static str,
}

/// A [`TypedLoader`] that extracts a component from the loaded container.
pub type ComponentTypedLoader<B, T> = TypedLoader<B, T>;

impl<B: Backend> TypedLoader<B, B::Asset> {
    /// A loader returning the loaded container itself.
    pub fn new(
        cache: Arc<ResourceCache<B>>,
        resolver: Arc<dyn PathResolver>,
        category: impl Into<String>,
    ) -> Self {
        Self {
            cache,
            resolver,
            category: category.into(),
            scope: None,
            extract: Arc::new(|asset: &B::Asset| Some(asset.clone())),
            target: type_name::<B::Asset>(),
        }
    }
}

impl<B: Backend, T> TypedLoader<B, T> {
    /// A loader extracting a `T` from each loaded container.
    ///
    /// When `extract` yields `None` the call fails with
    /// [`CacheError::ComponentExtraction`] and its reference is given back.
    pub fn component(
        cache: Arc<ResourceCache<B>>,
        resolver: Arc<dyn PathResolver>,
        category: impl Into<String>,
        extract: impl Fn(&B::Asset) -> Option<T> + Send + Sync + 'static,
    ) -> Self {
        Self {
            cache,
            resolver,
            category: category.into(),
            scope: None,
            extract: Arc::new(extract),
            target: type_name::<T>(),
        }
    }

    /// Make `scope` the owner of everything this loader acquires.
    pub fn with_scope(mut self, scope: Scope) -> Self {
        self.scope = Some(scope);
        self
    }

    /// The category names are resolved in.
    pub fn category(&self) -> &str {
        &self.category
    }

    /// The owner scope applied to loads, if any.
    pub fn scope(&self) -> Option<&Scope> {
        self.scope.as_ref()
    }

    /// The underlying cache.
    pub fn cache(&self) -> &Arc<ResourceCache<B>> {
        &self.cache
    }

    /// Resolve a logical name to the key this loader would load.
    pub fn resolve(&self, name: &str) -> CacheResult<CacheKey> {
        self.resolver.resolve(&self.category, name).inspect_err(|err| {
            tracing::error!(
                system = RESOURCE_MANAGER,
                cache = self.cache.name(),
                category = %self.category,
                name,
                "{}",
                err
            );
        })
    }

    /// Load by logical name. Unmapped categories fail before the backend is
    /// touched.
    pub async fn load_async(&self, name: &str) -> CacheResult<T> {
        let key = self.resolve(name)?;
        self.load_direct(&key).await
    }

    /// Load a pre-resolved key, bypassing the resolver.
    pub async fn load_direct(&self, key: &CacheKey) -> CacheResult<T> {
        let asset = self.cache.load_key(key, self.scope.as_ref()).await?;
        match (self.extract)(&asset) {
            Some(value) => Ok(value),
            None => {
                self.cache.release(key.as_str());
                Err(self.extraction_error(key))
            }
        }
    }

    /// Handle-returning variant of [`load_async`](Self::load_async).
    pub async fn load_with_handle_async(&self, name: &str) -> CacheResult<ResourceHandle<T>> {
        let key = self.resolve(name)?;
        self.load_with_handle_direct(&key).await
    }

    /// Handle-returning variant of [`load_direct`](Self::load_direct).
    pub async fn load_with_handle_direct(&self, key: &CacheKey) -> CacheResult<ResourceHandle<T>> {
        let handle = self
            .cache
            .load_key_with_handle(key.clone(), self.scope.as_ref())
            .await?;

        // A failed extraction drops the container handle, releasing it.
        handle
            .filter_map(|asset| (self.extract)(asset))
            .ok_or_else(|| self.extraction_error(key))
    }

    /// Force-unload the resource behind a logical name.
    pub fn unload(&self, name: &str) -> CacheResult<()> {
        let key = self.resolve(name)?;
        self.cache.unload(key.as_str())
    }

    /// Force-unload everything in the underlying cache.
    pub fn unload_all(&self) -> CacheResult<()> {
        self.cache.unload_all()
    }

    fn extraction_error(&self, key: &CacheKey) -> CacheError {
        let err = CacheError::ComponentExtraction {
            key: key.to_string(),
            component: self.target,
        };
        tracing::error!(system = RESOURCE_MANAGER, cache = self.cache.name(), key = %key, "{}", err);
        err
    }
}

impl<B: Backend, T> Clone for TypedLoader<B, T> {
    fn clone(&self) -> Self {
        Self {
            cache: Arc::clone(&self.cache),
            resolver: Arc::clone(&self.resolver),
            category: self.category.clone(),
            scope: self.scope.clone(),
            extract: Arc::clone(&self.extract),
            target: self.target,
        }
    }
}

impl<B: Backend, T> fmt::Debug for TypedLoader<B, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypedLoader")
            .field("cache", &self.cache.name())
            .field("category", &self.category)
            .field("scope", &self.scope)
            .field("target", &self.target)
            .finish()
    }
}
