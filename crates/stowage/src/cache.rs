//! The resource cache - load-or-reuse, reference counting, retry and scoped
//! eviction over a [`Backend`].

use std::sync::{Arc, Weak};

use futures::FutureExt;
use futures::future::BoxFuture;
use parking_lot::Mutex;
use stowage_core::alloc::HashMap;
use stowage_core::logging::systems::RESOURCE_MANAGER;
use stowage_core::profiling::profile_function;
use tokio_util::sync::CancellationToken;

use crate::backend::Backend;
use crate::entry::{EntryInfo, EntryState, HandleEntry, SharedLoad};
use crate::error::{CacheError, CacheResult};
use crate::handle::ResourceHandle;
use crate::key::{CacheKey, Scope};
use crate::metrics::CacheMetrics;
use crate::registry::ScopedCache;
use crate::retry::RetryPolicy;

/// Map state guarded by the cache mutex.
struct CacheState<A> {
    entries: HashMap<CacheKey, HandleEntry<A>>,
    next_generation: u64,
}

/// Outcome of taking a reference under the lock.
enum Acquired<A> {
    Ready(A),
    Pending { load: SharedLoad<A>, generation: u64 },
}

/// The reference taken for a caller still waiting on a shared load.
///
/// Gives the reference back if the waiting future is dropped before the load
/// settles (e.g. by `tokio::time::timeout`), since that caller never received
/// anything it could release.
struct PendingAcquisition<'a, B: Backend> {
    cache: &'a ResourceCache<B>,
    key: &'a CacheKey,
    generation: u64,
    armed: bool,
}

impl<B: Backend> PendingAcquisition<'_, B> {
    fn disarm(mut self) {
        self.armed = false;
    }
}

impl<B: Backend> Drop for PendingAcquisition<'_, B> {
    fn drop(&mut self) {
        if self.armed {
            tracing::debug!(
                system = RESOURCE_MANAGER,
                cache = %self.cache.name,
                key = %self.key,
                "Waiter dropped before load settled, giving its reference back"
            );
            self.cache.release_generation(self.key.as_str(), Some(self.generation));
        }
    }
}

/// A scoped, reference-counted cache of backend assets.
///
/// Every acquisition ([`load_async`](Self::load_async),
/// [`load_with_handle`](Self::load_with_handle), [`acquire`](Self::acquire))
/// adds one reference to the key's entry; every [`release`](Self::release)
/// (or handle disposal) removes one. When the count reaches zero the asset is
/// given back to the backend and the entry disappears.
///
/// Concurrent requests for the same key share one backend load, including
/// while that load is waiting between retries. Requests for different keys
/// never wait on each other: the map lock is only held for bookkeeping, never
/// across an `.await`.
///
/// # Example
///
/// ```ignore
/// let cache = ResourceCache::new("ui", backend, RetryPolicy::exponential(3));
/// registry.register(&cache);
///
/// let scene = Scope::new("MainMenu");
/// let menu = cache.load_async("ui/main_menu", Some(&scene)).await?;
///
/// // Later, when the scene is torn down:
/// registry.release_all_by_scope(&scene);
/// ```
pub struct ResourceCache<B: Backend> {
    name: String,
    backend: Arc<B>,
    policy: RetryPolicy,
    state: Mutex<CacheState<B::Asset>>,
    self_ref: Weak<Self>,
}

impl<B: Backend> ResourceCache<B> {
    /// Create a cache. Caches are always shared so handles and in-flight
    /// loads can refer back to them.
    pub fn new(name: impl Into<String>, backend: B, policy: RetryPolicy) -> Arc<Self> {
        let name = name.into();
        tracing::debug!(
            system = RESOURCE_MANAGER,
            cache = %name,
            max_attempts = policy.max_attempts(),
            "Resource cache created"
        );

        Arc::new_cyclic(|self_ref| Self {
            name,
            backend: Arc::new(backend),
            policy,
            state: Mutex::new(CacheState {
                entries: HashMap::new(),
                next_generation: 0,
            }),
            self_ref: self_ref.clone(),
        })
    }

    /// Name used in log output.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The retry policy applied to backend loads.
    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// The backend this cache loads through.
    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Load `key`, or reuse the cached asset, adding one reference.
    ///
    /// Fails with [`CacheError::Validation`] for an empty or malformed key
    /// without touching the backend.
    pub async fn load_async(&self, key: &str, owner_scope: Option<&Scope>) -> CacheResult<B::Asset> {
        let key = match CacheKey::new(key) {
            Ok(key) => key,
            Err(err) => {
                tracing::error!(system = RESOURCE_MANAGER, cache = %self.name, "Rejected key: {}", err);
                return Err(err);
            }
        };
        self.load_key(&key, owner_scope).await
    }

    /// Like [`load_async`](Self::load_async) for an already validated key.
    pub async fn load_key(&self, key: &CacheKey, owner_scope: Option<&Scope>) -> CacheResult<B::Asset> {
        let acquired = {
            let mut state = self.state.lock();
            self.acquire_locked(&mut state, key, owner_scope)
        };

        match acquired {
            Acquired::Ready(asset) => Ok(asset),
            Acquired::Pending { load, generation } => {
                let guard = PendingAcquisition {
                    cache: self,
                    key,
                    generation,
                    armed: true,
                };
                let result = load.await;
                // Settled: the reference now belongs to the caller, or went
                // away with the entry.
                guard.disarm();
                result
            }
        }
    }

    /// Load `key` and wrap the acquisition in a [`ResourceHandle`].
    ///
    /// The handle releases its reference when disposed or dropped; do not
    /// also call [`release`](Self::release) for it.
    pub async fn load_with_handle(
        &self,
        key: &str,
        owner_scope: Option<&Scope>,
    ) -> CacheResult<ResourceHandle<B::Asset>> {
        let key = CacheKey::new(key)?;
        self.load_key_with_handle(key, owner_scope).await
    }

    /// Like [`load_with_handle`](Self::load_with_handle) for an already validated key.
    pub async fn load_key_with_handle(
        &self,
        key: CacheKey,
        owner_scope: Option<&Scope>,
    ) -> CacheResult<ResourceHandle<B::Asset>> {
        let asset = self.load_key(&key, owner_scope).await?;
        Ok(self.wrap(key, asset))
    }

    /// Wrap an acquisition that was already counted.
    pub(crate) fn wrap<T>(&self, key: CacheKey, asset: T) -> ResourceHandle<T> {
        let cache: Weak<dyn ScopedCache> = self.self_ref.clone();
        ResourceHandle::new(key, asset, cache)
    }

    /// Add a reference to an existing entry. Returns `false` if the key is
    /// not cached.
    pub fn acquire(&self, key: &str) -> bool {
        let mut state = self.state.lock();
        let Some(entry) = state.entries.get_mut(key) else {
            return false;
        };

        let ref_count = entry.increment_reference();
        tracing::info!(system = RESOURCE_MANAGER, cache = %self.name, key, ref_count, "Acquired reference");
        true
    }

    /// Drop one reference. Absent keys are ignored.
    ///
    /// At zero the asset goes back to the backend and the entry is removed;
    /// if the load is still in flight it is cancelled.
    pub fn release(&self, key: &str) {
        self.release_generation(key, None);
    }

    /// [`release`](Self::release), restricted to the entry of `generation`
    /// when one is given.
    fn release_generation(&self, key: &str, generation: Option<u64>) {
        let removed = {
            let mut state = self.state.lock();
            let Some(entry) = state.entries.get_mut(key) else {
                return;
            };
            if generation.is_some_and(|generation| generation != entry.generation) {
                return;
            }

            let ref_count = entry.decrement_reference();
            tracing::info!(system = RESOURCE_MANAGER, cache = %self.name, key, ref_count, "Released reference");
            if ref_count > 0 {
                return;
            }
            state.entries.remove(key)
        };

        if let Some(entry) = removed {
            self.dispose_entry(key, entry);
            tracing::info!(system = RESOURCE_MANAGER, cache = %self.name, key, "Fully released");
        }
    }

    /// Remove `key` regardless of its reference count.
    pub fn unload(&self, key: &str) -> CacheResult<()> {
        let removed = self.state.lock().entries.remove(key);
        if let Some(entry) = removed {
            tracing::info!(
                system = RESOURCE_MANAGER,
                cache = %self.name,
                key,
                ref_count = entry.ref_count,
                "Force unloaded"
            );
            self.dispose_entry(key, entry);
        }
        Ok(())
    }

    /// Remove every entry regardless of reference counts.
    pub fn unload_all(&self) -> CacheResult<()> {
        let drained: Vec<_> = self.state.lock().entries.drain().collect();
        let count = drained.len();
        for (key, entry) in drained {
            self.dispose_entry(key.as_str(), entry);
        }

        tracing::info!(system = RESOURCE_MANAGER, cache = %self.name, count, "Unloaded all entries");
        Ok(())
    }

    /// Remove every entry owned by `scope`, regardless of reference counts.
    ///
    /// Returns the number of entries removed.
    pub fn release_by_scope(&self, scope: &Scope) -> usize {
        profile_function!();

        let removed: Vec<_> = {
            let mut state = self.state.lock();
            let keys: Vec<CacheKey> = state
                .entries
                .iter()
                .filter(|(_, entry)| entry.owner_scope.as_ref() == Some(scope))
                .map(|(key, _)| key.clone())
                .collect();

            keys.into_iter()
                .filter_map(|key| state.entries.remove(&key).map(|entry| (key, entry)))
                .collect()
        };

        let count = removed.len();
        for (key, entry) in removed {
            self.dispose_entry(key.as_str(), entry);
            tracing::info!(system = RESOURCE_MANAGER, cache = %self.name, key = %key, scope = %scope, "Released for scope");
        }

        tracing::info!(system = RESOURCE_MANAGER, cache = %self.name, scope = %scope, count, "Released scope");
        count
    }

    /// Current reference count of `key`, if cached.
    pub fn ref_count(&self, key: &str) -> Option<u32> {
        self.state.lock().entries.get(key).map(|entry| entry.ref_count)
    }

    /// Snapshot of one entry, if cached.
    pub fn entry_info(&self, key: &str) -> Option<EntryInfo> {
        self.state.lock().entries.get(key).map(HandleEntry::info)
    }

    /// Returns `true` if `key` has an entry (ready or loading).
    pub fn contains(&self, key: &str) -> bool {
        self.state.lock().entries.contains_key(key)
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    /// Returns `true` if nothing is cached.
    pub fn is_empty(&self) -> bool {
        self.state.lock().entries.is_empty()
    }

    /// Point-in-time occupancy snapshot. O(n) over entries.
    pub fn metrics(&self) -> CacheMetrics {
        profile_function!();

        let state = self.state.lock();
        let mut metrics = CacheMetrics {
            total_handles: state.entries.len(),
            ..CacheMetrics::default()
        };

        for entry in state.entries.values() {
            metrics.total_references += u64::from(entry.ref_count);
            if entry.is_loading() {
                metrics.pending_loads += 1;
            }
            if let Some(scope) = &entry.owner_scope {
                *metrics.handles_by_scope.entry(scope.clone()).or_insert(0) += 1;
            }
        }
        metrics
    }

    /// Take a reference on `key`, starting a load if there is no usable entry.
    fn acquire_locked(
        &self,
        state: &mut CacheState<B::Asset>,
        key: &CacheKey,
        owner_scope: Option<&Scope>,
    ) -> Acquired<B::Asset> {
        if let Some(entry) = state.entries.get_mut(key) {
            match &entry.state {
                EntryState::Ready(asset) if self.backend.is_valid(asset) => {
                    let asset = asset.clone();
                    let ref_count = entry.increment_reference();
                    tracing::info!(system = RESOURCE_MANAGER, cache = %self.name, key = %key, ref_count, "Cache hit");
                    return Acquired::Ready(asset);
                }
                EntryState::Loading(load) => {
                    let load = load.clone();
                    let ref_count = entry.increment_reference();
                    let generation = entry.generation;
                    tracing::info!(system = RESOURCE_MANAGER, cache = %self.name, key = %key, ref_count, "Joined in-flight load");
                    return Acquired::Pending { load, generation };
                }
                EntryState::Ready(_) => {
                    tracing::warn!(system = RESOURCE_MANAGER, cache = %self.name, key = %key, "Cached asset no longer valid, reloading");
                }
            }
        }

        // Either absent or holding an asset the backend already dropped.
        state.entries.remove(key);

        let generation = state.next_generation;
        state.next_generation += 1;

        let cancel = CancellationToken::new();
        let load = self
            .load_with_retry(key.clone(), generation, cancel.clone())
            .shared();
        state.entries.insert(
            key.clone(),
            HandleEntry::pending(load.clone(), owner_scope.cloned(), generation, cancel),
        );

        Acquired::Pending { load, generation }
    }

    /// The backend load with retry, as a future shared by all joined callers.
    ///
    /// The future only holds a weak reference to the cache; it finishes by
    /// publishing (or discarding) its result in the entry of `generation`.
    /// It keeps its own handle on the backend, so an asset that arrives after
    /// the cache is gone can still be given back.
    fn load_with_retry(
        &self,
        key: CacheKey,
        generation: u64,
        cancel: CancellationToken,
    ) -> BoxFuture<'static, CacheResult<B::Asset>> {
        let cache = self.self_ref.clone();
        let backend = Arc::clone(&self.backend);
        let policy = self.policy;
        let name = self.name.clone();

        async move {
            let max_attempts = policy.max_attempts();
            let mut attempt = 1;

            let result = loop {
                let load = backend.load(&key);
                let outcome = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => break Err(CacheError::Cancelled { key: key.to_string() }),
                    outcome = load => outcome,
                };

                let source = match outcome {
                    Ok(asset) => break Ok(asset),
                    Err(source) => source,
                };

                tracing::warn!(
                    system = RESOURCE_MANAGER,
                    cache = %name,
                    key = %key,
                    attempt,
                    max_attempts,
                    "Failed to load: {}",
                    source
                );

                if attempt >= max_attempts {
                    break Err(CacheError::BackendLoad {
                        key: key.to_string(),
                        attempts: attempt,
                        source,
                    });
                }

                let delay = policy.delay_after(attempt);
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => break Err(CacheError::Cancelled { key: key.to_string() }),
                    _ = tokio::time::sleep(delay) => {}
                }
                attempt += 1;
            };

            match cache.upgrade() {
                Some(this) => this.complete_load(&key, generation, result),
                None => {
                    // No entry left to own the asset.
                    if let Ok(asset) = &result {
                        backend.release(asset);
                    }
                    tracing::debug!(system = RESOURCE_MANAGER, cache = %name, key = %key, "Cache dropped before load settled");
                    Err(CacheError::Cancelled { key: key.to_string() })
                }
            }
        }
        .boxed()
    }

    /// Publish a finished load into its entry, if that entry still exists.
    fn complete_load(
        &self,
        key: &CacheKey,
        generation: u64,
        result: CacheResult<B::Asset>,
    ) -> CacheResult<B::Asset> {
        let mut state = self.state.lock();
        let is_current = state
            .entries
            .get(key)
            .is_some_and(|entry| entry.generation == generation);

        match result {
            Ok(asset) if is_current => {
                if let Some(entry) = state.entries.get_mut(key) {
                    entry.mark_ready(asset.clone());
                    tracing::info!(
                        system = RESOURCE_MANAGER,
                        cache = %self.name,
                        key = %key,
                        owner_scope = ?entry.owner_scope,
                        ref_count = entry.ref_count,
                        "Loaded"
                    );
                }
                Ok(asset)
            }
            Ok(asset) => {
                drop(state);
                // Released or evicted while in flight: nobody owns this copy.
                self.backend.release(&asset);
                tracing::info!(system = RESOURCE_MANAGER, cache = %self.name, key = %key, "Discarded load of evicted entry");
                Err(CacheError::Cancelled { key: key.to_string() })
            }
            Err(err) => {
                if is_current {
                    state.entries.remove(key);
                }
                drop(state);
                tracing::error!(system = RESOURCE_MANAGER, cache = %self.name, key = %key, "{}", err);
                Err(err)
            }
        }
    }

    /// Give an entry's asset back to the backend, or cancel its load.
    ///
    /// Must be called without the map lock held.
    fn dispose_entry(&self, key: &str, entry: HandleEntry<B::Asset>) {
        match entry.state {
            EntryState::Ready(asset) => {
                if self.backend.is_valid(&asset) {
                    self.backend.release(&asset);
                } else {
                    tracing::debug!(system = RESOURCE_MANAGER, cache = %self.name, key, "Asset already invalid, skipping backend release");
                }
            }
            EntryState::Loading(_) => {
                entry.cancel.cancel();
                tracing::debug!(system = RESOURCE_MANAGER, cache = %self.name, key, "Cancelled in-flight load");
            }
        }
    }
}

impl<B: Backend> ScopedCache for ResourceCache<B> {
    fn name(&self) -> &str {
        ResourceCache::name(self)
    }

    fn release(&self, key: &str) {
        ResourceCache::release(self, key)
    }

    fn release_by_scope(&self, scope: &Scope) -> usize {
        ResourceCache::release_by_scope(self, scope)
    }

    fn metrics(&self) -> CacheMetrics {
        ResourceCache::metrics(self)
    }
}

impl<B: Backend> Drop for ResourceCache<B> {
    fn drop(&mut self) {
        let remaining = self.state.get_mut().entries.len();
        if remaining > 0 {
            tracing::debug!(
                system = RESOURCE_MANAGER,
                cache = %self.name,
                remaining,
                "Cache dropped with live entries, releasing them"
            );
        }
        let drained: Vec<_> = self.state.get_mut().entries.drain().collect();
        for (key, entry) in drained {
            self.dispose_entry(key.as_str(), entry);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use crate::backend::LoadFuture;

    #[derive(Default)]
    struct CountingBackend {
        loads: AtomicUsize,
        releases: AtomicUsize,
    }

    impl Backend for CountingBackend {
        type Asset = u32;

        fn load(&self, _key: &CacheKey) -> LoadFuture<u32> {
            self.loads.fetch_add(1, Ordering::SeqCst);
            Box::pin(async { Ok(7) })
        }

        fn release(&self, _asset: &u32) {
            self.releases.fetch_add(1, Ordering::SeqCst);
        }

        fn is_valid(&self, _asset: &u32) -> bool {
            true
        }
    }

    #[tokio::test]
    async fn test_load_outliving_cache_gives_asset_back() {
        let backend = Arc::new(CountingBackend::default());
        let cache = ResourceCache::new("test", Arc::clone(&backend), RetryPolicy::no_retry());

        let load = cache.load_with_retry(CacheKey::new("ui/menu").unwrap(), 0, CancellationToken::new());
        drop(cache);

        let err = load.await.unwrap_err();
        assert!(err.is_cancelled());
        assert_eq!(backend.loads.load(Ordering::SeqCst), 1);
        assert_eq!(backend.releases.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_release_generation_ignores_successor() {
        let backend = Arc::new(CountingBackend::default());
        let cache = ResourceCache::new("test", Arc::clone(&backend), RetryPolicy::no_retry());

        cache.load_async("ui/menu", None).await.unwrap();
        let generation = cache.state.lock().entries.get("ui/menu").map(|entry| entry.generation);

        cache.release_generation("ui/menu", generation.map(|g| g + 1));
        assert_eq!(cache.ref_count("ui/menu"), Some(1));

        cache.release_generation("ui/menu", generation);
        assert_eq!(cache.ref_count("ui/menu"), None);
        assert_eq!(backend.releases.load(Ordering::SeqCst), 1);
    }
}
