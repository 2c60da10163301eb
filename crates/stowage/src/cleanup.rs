//! Scope lifecycle events and the orchestrator that turns them into cache
//! eviction.
//!
//! The scene manager (or whatever owns scope lifetimes) publishes
//! [`ScopeEvent`]s through [`ScopeEvents`]; a [`ScopeCleanup`] task listens and
//! calls [`CacheRegistry::release_all_by_scope`]. Caches never see the
//! publisher.

use std::sync::Arc;

use stowage_core::logging::systems::SCOPE_CLEANUP;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::key::Scope;
use crate::registry::CacheRegistry;

/// Notifications about scope lifetimes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScopeEvent {
    /// The scope finished loading. Informational.
    Loaded(Scope),
    /// The scope is being torn down; its resources must go.
    Unloading(Scope),
}

impl ScopeEvent {
    /// The scope this event is about.
    pub fn scope(&self) -> &Scope {
        match self {
            ScopeEvent::Loaded(scope) | ScopeEvent::Unloading(scope) => scope,
        }
    }

    /// Check if this is a teardown event.
    pub fn is_unloading(&self) -> bool {
        matches!(self, ScopeEvent::Unloading(_))
    }
}

/// Publisher side of the scope event channel.
#[derive(Debug, Clone)]
pub struct ScopeEvents {
    sender: broadcast::Sender<ScopeEvent>,
    capacity: usize,
}

impl ScopeEvents {
    /// Default number of events buffered per subscriber.
    pub const DEFAULT_CAPACITY: usize = 64;

    /// Create a channel buffering `capacity` events per subscriber.
    ///
    /// A listener that falls more than `capacity` events behind loses the
    /// oldest ones. Scopes whose `Unloading` event was lost are not evicted;
    /// they stay cached until released another way, so size the channel for
    /// the largest burst of scope teardowns.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (sender, _) = broadcast::channel(capacity);
        Self { sender, capacity }
    }

    /// Events buffered per subscriber.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Subscribe a new listener.
    pub fn subscribe(&self) -> broadcast::Receiver<ScopeEvent> {
        self.sender.subscribe()
    }

    /// Publish an event. Returns the number of listeners that will see it.
    pub fn publish(&self, event: ScopeEvent) -> usize {
        self.sender.send(event).unwrap_or(0)
    }

    /// Shorthand for publishing [`ScopeEvent::Unloading`].
    pub fn unloading(&self, scope: Scope) -> usize {
        self.publish(ScopeEvent::Unloading(scope))
    }
}

impl Default for ScopeEvents {
    fn default() -> Self {
        Self::new(Self::DEFAULT_CAPACITY)
    }
}

/// Background task releasing cached resources when their scope unloads.
///
/// Dropping the `ScopeCleanup` stops the task.
///
/// # Example
///
/// ```ignore
/// let events = ScopeEvents::default();
/// let cleanup = ScopeCleanup::spawn(registry.clone(), events.subscribe());
///
/// events.unloading(Scope::new("Gameplay"));
/// ```
pub struct ScopeCleanup {
    task: JoinHandle<()>,
}

impl ScopeCleanup {
    /// Spawn the listener on the current tokio runtime.
    ///
    /// Events dropped because the listener lagged are logged at `error`;
    /// see [`ScopeEvents::new`].
    ///
    /// # Panics
    ///
    /// Panics if called outside a tokio runtime.
    pub fn spawn(registry: Arc<CacheRegistry>, mut events: broadcast::Receiver<ScopeEvent>) -> Self {
        let task = tokio::spawn(async move {
            tracing::info!(system = SCOPE_CLEANUP, "Scope cleanup started");
            loop {
                match events.recv().await {
                    Ok(event) => {
                        Self::handle(&registry, &event);
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::error!(
                            system = SCOPE_CLEANUP,
                            skipped,
                            "Missed {} scope events; their scopes stay cached. Raise the ScopeEvents capacity",
                            skipped
                        );
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
            tracing::info!(system = SCOPE_CLEANUP, "Scope event channel closed, cleanup stopped");
        });

        Self { task }
    }

    /// React to one event. Returns the number of entries released.
    pub fn handle(registry: &CacheRegistry, event: &ScopeEvent) -> usize {
        match event {
            ScopeEvent::Unloading(scope) => {
                tracing::info!(system = SCOPE_CLEANUP, scope = %scope, "Cleaning up resources for scope");
                registry.release_all_by_scope(scope)
            }
            ScopeEvent::Loaded(scope) => {
                tracing::debug!(system = SCOPE_CLEANUP, scope = %scope, "Scope loaded");
                0
            }
        }
    }

    /// Returns `true` once the listener has stopped.
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl Drop for ScopeCleanup {
    fn drop(&mut self) {
        self.task.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_accessors() {
        let event = ScopeEvent::Unloading(Scope::new("SceneX"));
        assert!(event.is_unloading());
        assert_eq!(event.scope(), &Scope::new("SceneX"));
        assert!(!ScopeEvent::Loaded(Scope::new("SceneX")).is_unloading());
    }

    #[test]
    fn test_publish_without_listeners() {
        let events = ScopeEvents::default();
        assert_eq!(events.capacity(), ScopeEvents::DEFAULT_CAPACITY);
        assert_eq!(ScopeEvents::new(0).capacity(), 1);
        assert_eq!(events.unloading(Scope::new("SceneX")), 0);

        let _rx = events.subscribe();
        assert_eq!(events.unloading(Scope::new("SceneX")), 1);
    }

    #[test]
    fn test_loaded_event_releases_nothing() {
        let registry = CacheRegistry::new();
        assert_eq!(
            ScopeCleanup::handle(&registry, &ScopeEvent::Loaded(Scope::new("SceneX"))),
            0
        );
    }
}
