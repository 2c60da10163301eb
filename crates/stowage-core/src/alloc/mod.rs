//! Optimized collection types for Stowage.
//!
//! Cache keys are short strings that are hashed on every lookup, so the
//! AHash-backed map is used everywhere.

pub use ahash::AHashMap as HashMap;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hashmap_ahash() {
        let mut map = HashMap::new();
        map.insert("ui/main_menu", 1u32);
        *map.entry("ui/main_menu").or_insert(0) += 1;
        assert_eq!(map.get("ui/main_menu"), Some(&2));
    }
}
