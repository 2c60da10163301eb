//! Cache keys and ownership scopes.

use std::borrow::Borrow;
use std::fmt;
use std::sync::Arc;

use crate::error::{CacheError, CacheResult};

/// Identifier of one loadable resource within a [`ResourceCache`](crate::ResourceCache).
///
/// Equality and hashing are exactly those of the underlying string, which is
/// also what the backend receives. Cloning is a reference-count bump.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey(Arc<str>);

impl CacheKey {
    /// Validate and wrap a key.
    ///
    /// Empty and whitespace-only strings are rejected, as are keys with
    /// leading or trailing whitespace, which the backend would never match.
    pub fn new(key: impl AsRef<str>) -> CacheResult<Self> {
        let key = key.as_ref();
        if key.is_empty() {
            return Err(CacheError::validation("key cannot be empty"));
        }
        if key.trim().is_empty() {
            return Err(CacheError::validation("key cannot be blank"));
        }
        if key.trim() != key {
            return Err(CacheError::validation(format!(
                "key '{}' has surrounding whitespace",
                key
            )));
        }
        Ok(Self(Arc::from(key)))
    }

    /// The key as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for CacheKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

// Lets maps keyed by `CacheKey` be queried with a plain `&str`.
impl Borrow<str> for CacheKey {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl TryFrom<&str> for CacheKey {
    type Error = CacheError;

    fn try_from(value: &str) -> CacheResult<Self> {
        CacheKey::new(value)
    }
}

impl TryFrom<String> for CacheKey {
    type Error = CacheError;

    fn try_from(value: String) -> CacheResult<Self> {
        CacheKey::new(value)
    }
}

/// A logical lifetime boundary, such as a loaded scene.
///
/// Entries acquired with an owner scope are evicted together by
/// [`ResourceCache::release_by_scope`](crate::ResourceCache::release_by_scope).
/// The cache knows nothing else about scopes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Scope(Arc<str>);

impl Scope {
    /// Create a scope from its name.
    pub fn new(name: impl AsRef<str>) -> Self {
        Self(Arc::from(name.as_ref()))
    }

    /// The scope name.
    pub fn name(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Scope {
    fn from(value: &str) -> Self {
        Scope::new(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stowage_core::alloc::HashMap;

    #[test]
    fn test_rejects_empty_and_blank_keys() {
        assert!(matches!(CacheKey::new(""), Err(CacheError::Validation { .. })));
        assert!(matches!(CacheKey::new("   "), Err(CacheError::Validation { .. })));
        assert!(matches!(CacheKey::new(" ui/menu"), Err(CacheError::Validation { .. })));
        assert!(CacheKey::new("ui/menu").is_ok());
    }

    #[test]
    fn test_key_equality_is_string_equality() {
        let a = CacheKey::new("ui/menu").unwrap();
        let b = CacheKey::try_from(String::from("ui/menu")).unwrap();
        assert_eq!(a, b);

        let mut map = HashMap::new();
        map.insert(a, 1);
        assert_eq!(map.get("ui/menu"), Some(&1));
        assert_eq!(map.get(&b), Some(&1));
    }

    #[test]
    fn test_scope_display() {
        let scope = Scope::from("MainMenu");
        assert_eq!(scope.to_string(), "MainMenu");
        assert_eq!(scope, Scope::new("MainMenu"));
    }
}
