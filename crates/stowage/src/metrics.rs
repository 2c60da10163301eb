//! Diagnostic snapshots of cache occupancy.

use std::fmt;

use stowage_core::alloc::HashMap;

use crate::key::Scope;

/// Point-in-time copy of a cache's occupancy. Never updated after creation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheMetrics {
    /// Number of entries, pending loads included.
    pub total_handles: usize,
    /// Sum of all reference counts.
    pub total_references: u64,
    /// Entries whose backend load has not finished yet.
    pub pending_loads: usize,
    /// Entry count per owner scope. Unscoped entries are not listed.
    pub handles_by_scope: HashMap<Scope, usize>,
}

impl CacheMetrics {
    /// Entries owned by `scope`.
    pub fn handles_in_scope(&self, scope: &Scope) -> usize {
        self.handles_by_scope.get(scope).copied().unwrap_or(0)
    }

    /// Fold another snapshot into this one, e.g. to total a registry.
    pub fn merge(&mut self, other: &CacheMetrics) {
        self.total_handles += other.total_handles;
        self.total_references += other.total_references;
        self.pending_loads += other.pending_loads;
        for (scope, count) in &other.handles_by_scope {
            *self.handles_by_scope.entry(scope.clone()).or_insert(0) += count;
        }
    }
}

impl fmt::Display for CacheMetrics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Cache Metrics:")?;
        writeln!(f, "  Total Handles: {}", self.total_handles)?;
        writeln!(f, "  Total References: {}", self.total_references)?;
        writeln!(f, "  Pending Loads: {}", self.pending_loads)?;
        writeln!(f, "  By Scope:")?;

        let mut scopes: Vec<_> = self.handles_by_scope.iter().collect();
        scopes.sort_by(|a, b| a.0.cmp(b.0));
        for (scope, count) in scopes {
            writeln!(f, "    {}: {} handles", scope, count)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_and_display() {
        let scene_x = Scope::new("SceneX");
        let scene_y = Scope::new("SceneY");

        let mut total = CacheMetrics {
            total_handles: 2,
            total_references: 3,
            pending_loads: 0,
            handles_by_scope: [(scene_x.clone(), 2)].into_iter().collect(),
        };
        let other = CacheMetrics {
            total_handles: 2,
            total_references: 2,
            pending_loads: 1,
            handles_by_scope: [(scene_x.clone(), 1), (scene_y.clone(), 1)]
                .into_iter()
                .collect(),
        };

        total.merge(&other);
        assert_eq!(total.total_handles, 4);
        assert_eq!(total.total_references, 5);
        assert_eq!(total.pending_loads, 1);
        assert_eq!(total.handles_in_scope(&scene_x), 3);
        assert_eq!(total.handles_in_scope(&scene_y), 1);
        assert_eq!(total.handles_in_scope(&Scope::new("Other")), 0);

        let text = total.to_string();
        assert!(text.contains("Total Handles: 4"));
        assert!(text.find("SceneX").unwrap() < text.find("SceneY").unwrap());
    }
}
