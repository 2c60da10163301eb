//! Error types for the resource cache.

use std::fmt;

/// Failure reported by a [`Backend`](crate::Backend) load.
///
/// The cache never inspects it beyond logging; every backend failure is
/// treated as retryable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendError {
    message: String,
}

impl BackendError {
    /// Create a backend error with a message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// The backend's description of the failure.
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for BackendError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for BackendError {}

/// Errors that can occur during cache and loader operations.
///
/// `Clone` so one failed load can be handed to every caller that joined it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheError {
    /// The key was empty or malformed. Reported before any backend call.
    Validation {
        /// Why the key was rejected.
        reason: String,
    },

    /// The resolver has no mapping for the requested category.
    Resolution {
        /// The category that was looked up.
        category: String,
        /// The logical name that was requested.
        name: String,
    },

    /// The backend kept failing until the retry policy gave up.
    BackendLoad {
        /// The key being loaded.
        key: String,
        /// How many backend calls were made.
        attempts: u32,
        /// The last backend failure.
        source: BackendError,
    },

    /// The loaded container does not carry the requested component.
    ComponentExtraction {
        /// Key of the container.
        key: String,
        /// Type name of the missing component.
        component: &'static str,
    },

    /// The entry was released, unloaded or evicted before its load finished.
    Cancelled {
        /// The key whose load was abandoned.
        key: String,
    },
}

impl CacheError {
    /// Shorthand for a [`CacheError::Validation`].
    pub fn validation(reason: impl Into<String>) -> Self {
        CacheError::Validation {
            reason: reason.into(),
        }
    }

    /// Returns `true` for [`CacheError::Cancelled`].
    pub fn is_cancelled(&self) -> bool {
        matches!(self, CacheError::Cancelled { .. })
    }
}

impl fmt::Display for CacheError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CacheError::Validation { reason } => {
                write!(f, "Invalid cache key: {}", reason)
            }
            CacheError::Resolution { category, name } => {
                write!(f, "No path registered for category '{}' (requested '{}')", category, name)
            }
            CacheError::BackendLoad {
                key,
                attempts,
                source,
            } => {
                write!(
                    f,
                    "Failed to load '{}' after {} attempt(s): {}",
                    key, attempts, source
                )
            }
            CacheError::ComponentExtraction { key, component } => {
                write!(f, "Can't find component {} in '{}'", component, key)
            }
            CacheError::Cancelled { key } => {
                write!(f, "Load of '{}' was cancelled", key)
            }
        }
    }
}

impl std::error::Error for CacheError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CacheError::BackendLoad { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// Result type alias for cache operations.
pub type CacheResult<T> = Result<T, CacheError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;

    #[test]
    fn test_backend_load_exposes_source() {
        let err = CacheError::BackendLoad {
            key: "ui/menu".to_string(),
            attempts: 3,
            source: BackendError::new("connection reset"),
        };

        assert_eq!(
            err.to_string(),
            "Failed to load 'ui/menu' after 3 attempt(s): connection reset"
        );
        let source = err.source().map(|s| s.to_string());
        assert_eq!(source.as_deref(), Some("connection reset"));
    }

    #[test]
    fn test_other_variants_have_no_source() {
        let err = CacheError::Resolution {
            category: "LoadingScreen".to_string(),
            name: "splash".to_string(),
        };
        assert!(err.source().is_none());
        assert!(err.to_string().contains("LoadingScreen"));
        assert!(!err.is_cancelled());
        assert!(CacheError::Cancelled { key: "a".into() }.is_cancelled());
    }
}
