//! Per-key cache entries.

use std::time::{Duration, Instant};

use futures::future::{BoxFuture, Shared};
use tokio_util::sync::CancellationToken;

use crate::error::CacheResult;
use crate::key::Scope;

/// A load in flight, shared by every caller that asked for the same key.
pub(crate) type SharedLoad<A> = Shared<BoxFuture<'static, CacheResult<A>>>;

/// Where an entry is in its life.
pub(crate) enum EntryState<A> {
    /// The backend is still being asked (possibly between retries).
    Loading(SharedLoad<A>),
    /// The backend delivered the asset.
    Ready(A),
}

/// Cached state for one key: the backend asset, its reference count and
/// the scope that owns it.
///
/// Created with a reference count of 1 by the acquisition that started the
/// load. The owning cache removes it, and gives the asset back to the
/// backend, when the count drops to zero or the entry is force-evicted.
pub(crate) struct HandleEntry<A> {
    pub(crate) state: EntryState<A>,
    pub(crate) ref_count: u32,
    pub(crate) owner_scope: Option<Scope>,
    pub(crate) loaded_at: Instant,
    /// Distinguishes this entry from a later one under the same key, so a
    /// load finishing after eviction does not touch its successor.
    pub(crate) generation: u64,
    pub(crate) cancel: CancellationToken,
}

impl<A: Clone> HandleEntry<A> {
    pub(crate) fn pending(
        load: SharedLoad<A>,
        owner_scope: Option<Scope>,
        generation: u64,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            state: EntryState::Loading(load),
            ref_count: 1,
            owner_scope,
            loaded_at: Instant::now(),
            generation,
            cancel,
        }
    }

    /// Publish the loaded asset and restart the age clock.
    pub(crate) fn mark_ready(&mut self, asset: A) {
        self.state = EntryState::Ready(asset);
        self.loaded_at = Instant::now();
    }

    pub(crate) fn increment_reference(&mut self) -> u32 {
        self.ref_count = self.ref_count.saturating_add(1);
        self.ref_count
    }

    /// Returns the remaining count.
    pub(crate) fn decrement_reference(&mut self) -> u32 {
        self.ref_count = self.ref_count.saturating_sub(1);
        self.ref_count
    }

    /// Returns `true` while the backend is still loading.
    pub(crate) fn is_loading(&self) -> bool {
        matches!(self.state, EntryState::Loading(_))
    }

    pub(crate) fn info(&self) -> EntryInfo {
        EntryInfo {
            ref_count: self.ref_count,
            owner_scope: self.owner_scope.clone(),
            is_loading: self.is_loading(),
            age: self.loaded_at.elapsed(),
        }
    }
}

/// Point-in-time copy of one entry, returned by
/// [`ResourceCache::entry_info`](crate::ResourceCache::entry_info).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryInfo {
    pub ref_count: u32,
    pub owner_scope: Option<Scope>,
    pub is_loading: bool,
    pub age: Duration,
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::FutureExt;

    fn pending_entry(scope: Option<Scope>) -> HandleEntry<u32> {
        let load: BoxFuture<'static, CacheResult<u32>> = async { Ok(7) }.boxed();
        HandleEntry::pending(load.shared(), scope, 0, CancellationToken::new())
    }

    #[test]
    fn test_new_entry_holds_one_reference() {
        let entry = pending_entry(Some(Scope::new("SceneX")));
        assert_eq!(entry.ref_count, 1);
        assert!(entry.is_loading());
        assert_eq!(entry.owner_scope, Some(Scope::new("SceneX")));
    }

    #[test]
    fn test_reference_counting() {
        let mut entry = pending_entry(None);
        entry.mark_ready(7);
        assert!(!entry.is_loading());
        assert!(matches!(entry.state, EntryState::Ready(7)));

        assert_eq!(entry.increment_reference(), 2);
        assert_eq!(entry.decrement_reference(), 1);
        assert_eq!(entry.decrement_reference(), 0);

        // Never wraps below zero.
        assert_eq!(entry.decrement_reference(), 0);
    }

    #[test]
    fn test_info_snapshot() {
        let entry = pending_entry(Some(Scope::new("SceneX")));
        let info = entry.info();
        assert_eq!(info.ref_count, 1);
        assert_eq!(info.owner_scope, Some(Scope::new("SceneX")));
        assert!(info.is_loading);
    }
}
