//! Mock implementation of [`Backend`] for testing.
//!
//! Records every backend call and lets tests script failures, latency and
//! the components each loaded asset carries.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use stowage::{Backend, BackendError, CacheKey, LoadFuture};
use stowage_core::alloc::HashMap;

/// Records a backend call for verification in tests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendCall {
    Load { key: String },
    Release { key: String, serial: u64 },
}

struct MockAssetData {
    key: String,
    serial: u64,
    components: Vec<String>,
    released: AtomicBool,
    invalidated: AtomicBool,
}

/// An asset handed out by [`MockBackend`].
///
/// Clones share identity; use [`ptr_eq`](Self::ptr_eq) to check two callers
/// received the same load.
#[derive(Clone)]
pub struct MockAsset(Arc<MockAssetData>);

impl MockAsset {
    /// The key the asset was loaded for.
    pub fn key(&self) -> &str {
        &self.0.key
    }

    /// Load counter value at the time this asset was produced. Unique per backend.
    pub fn serial(&self) -> u64 {
        self.0.serial
    }

    /// Names of the components this asset carries.
    pub fn components(&self) -> &[String] {
        &self.0.components
    }

    /// Look up a component by name, returning an owned copy of its name.
    pub fn component(&self, name: &str) -> Option<String> {
        self.0.components.iter().find(|c| c.as_str() == name).cloned()
    }

    /// Whether the backend was asked to release this asset.
    pub fn is_released(&self) -> bool {
        self.0.released.load(Ordering::SeqCst)
    }

    /// Same backend load as `other`.
    pub fn ptr_eq(&self, other: &MockAsset) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for MockAsset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MockAsset")
            .field("key", &self.0.key)
            .field("serial", &self.0.serial)
            .field("released", &self.is_released())
            .finish()
    }
}

#[derive(Default)]
struct Script {
    /// Remaining loads that fail. `u32::MAX` fails forever.
    failures: u32,
    components: Vec<String>,
}

#[derive(Default)]
struct Inner {
    calls: Mutex<Vec<BackendCall>>,
    scripts: Mutex<HashMap<String, Script>>,
    assets: Mutex<Vec<MockAsset>>,
    latency: Mutex<Duration>,
    next_serial: AtomicU64,
}

/// Mock backend recording calls for verification.
///
/// Clones share state, so a test can keep one clone for assertions and hand
/// another to the cache.
///
/// # Example
///
/// ```rust
/// use stowage::{ResourceCache, RetryPolicy};
/// use stowage_test_utils::MockBackend;
///
/// let backend = MockBackend::new().fail_first("ui/menu", 2);
/// let cache = ResourceCache::new("ui", backend.clone(), RetryPolicy::exponential(3));
///
/// assert_eq!(backend.total_loads(), 0);
/// ```
#[derive(Clone, Default)]
pub struct MockBackend {
    inner: Arc<Inner>,
}

impl MockBackend {
    /// Create a backend where every load succeeds immediately.
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every load by `latency` (tokio time).
    pub fn with_latency(self, latency: Duration) -> Self {
        *self.inner.latency.lock() = latency;
        self
    }

    /// Fail the first `count` loads of `key`.
    pub fn fail_first(self, key: &str, count: u32) -> Self {
        self.script(key, |script| script.failures = count);
        self
    }

    /// Fail every load of `key`.
    pub fn always_fail(self, key: &str) -> Self {
        self.fail_first(key, u32::MAX)
    }

    /// Give assets loaded for `key` these components.
    pub fn with_components(self, key: &str, components: &[&str]) -> Self {
        self.script(key, |script| {
            script.components = components.iter().map(|c| c.to_string()).collect();
        });
        self
    }

    /// Change the load latency after construction.
    pub fn set_latency(&self, latency: Duration) {
        *self.inner.latency.lock() = latency;
    }

    /// Drop every asset loaded for `key` behind the cache's back.
    pub fn invalidate(&self, key: &str) {
        for asset in self.inner.assets.lock().iter().filter(|a| a.key() == key) {
            asset.0.invalidated.store(true, Ordering::SeqCst);
        }
    }

    /// Get all recorded calls.
    pub fn calls(&self) -> Vec<BackendCall> {
        self.inner.calls.lock().clone()
    }

    /// Count load calls for `key`, failed attempts included.
    pub fn load_count(&self, key: &str) -> usize {
        self.inner
            .calls
            .lock()
            .iter()
            .filter(|call| matches!(call, BackendCall::Load { key: k } if k == key))
            .count()
    }

    /// Count release calls for `key`.
    pub fn release_count(&self, key: &str) -> usize {
        self.inner
            .calls
            .lock()
            .iter()
            .filter(|call| matches!(call, BackendCall::Release { key: k, .. } if k == key))
            .count()
    }

    /// Count all load calls.
    pub fn total_loads(&self) -> usize {
        self.inner
            .calls
            .lock()
            .iter()
            .filter(|call| matches!(call, BackendCall::Load { .. }))
            .count()
    }

    /// Count all release calls.
    pub fn total_releases(&self) -> usize {
        self.inner
            .calls
            .lock()
            .iter()
            .filter(|call| matches!(call, BackendCall::Release { .. }))
            .count()
    }

    /// Clear recorded calls.
    pub fn clear_calls(&self) {
        self.inner.calls.lock().clear();
    }

    fn script(&self, key: &str, edit: impl FnOnce(&mut Script)) {
        edit(self.inner.scripts.lock().entry(key.to_string()).or_default());
    }

    /// Decide the outcome of a load at call time.
    fn next_outcome(&self, key: &str) -> Result<MockAsset, BackendError> {
        let components = {
            let mut scripts = self.inner.scripts.lock();
            match scripts.get_mut(key) {
                Some(script) if script.failures > 0 => {
                    if script.failures != u32::MAX {
                        script.failures -= 1;
                    }
                    return Err(BackendError::new(format!("mock failure for '{}'", key)));
                }
                Some(script) => script.components.clone(),
                None => Vec::new(),
            }
        };

        let serial = self.inner.next_serial.fetch_add(1, Ordering::SeqCst);
        let asset = MockAsset(Arc::new(MockAssetData {
            key: key.to_string(),
            serial,
            components,
            released: AtomicBool::new(false),
            invalidated: AtomicBool::new(false),
        }));
        self.inner.assets.lock().push(asset.clone());
        Ok(asset)
    }
}

impl Backend for MockBackend {
    type Asset = MockAsset;

    fn load(&self, key: &CacheKey) -> LoadFuture<MockAsset> {
        self.inner.calls.lock().push(BackendCall::Load {
            key: key.to_string(),
        });

        let latency = *self.inner.latency.lock();
        let outcome = self.next_outcome(key.as_str());
        Box::pin(async move {
            if !latency.is_zero() {
                tokio::time::sleep(latency).await;
            }
            outcome
        })
    }

    fn release(&self, asset: &MockAsset) {
        asset.0.released.store(true, Ordering::SeqCst);
        self.inner.calls.lock().push(BackendCall::Release {
            key: asset.key().to_string(),
            serial: asset.serial(),
        });
    }

    fn is_valid(&self, asset: &MockAsset) -> bool {
        !asset.is_released() && !asset.0.invalidated.load(Ordering::SeqCst)
    }
}
