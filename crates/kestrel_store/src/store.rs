//! The named-map registry. Index backing maps are opened as
//! `index.<index id>`; builder scratch space comes from
//! `next_temporary_map_name`.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;

use kestrel_common::error::{StoreError, StoreResult};

use crate::map::StoreMap;

#[derive(Debug)]
pub struct Store {
    maps: DashMap<String, Arc<StoreMap>>,
    temp_counter: AtomicU64,
}

impl Default for Store {
    fn default() -> Self {
        Self::new()
    }
}

impl Store {
    pub fn new() -> Self {
        Self {
            maps: DashMap::new(),
            temp_counter: AtomicU64::new(0),
        }
    }

    /// Open (or create) an ordered map.
    pub fn open_map(&self, name: &str) -> StoreResult<Arc<StoreMap>> {
        let map = self
            .maps
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(StoreMap::new_ordered(name.to_string())))
            .clone();
        if !map.is_ordered() {
            return Err(StoreError::MapKindMismatch(name.to_string()));
        }
        Ok(map)
    }

    /// Open (or create) an unordered hash map.
    pub fn open_hash_map(&self, name: &str) -> StoreResult<Arc<StoreMap>> {
        let map = self
            .maps
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(StoreMap::new_hash(name.to_string())))
            .clone();
        if map.is_ordered() {
            return Err(StoreError::MapKindMismatch(name.to_string()));
        }
        Ok(map)
    }

    pub fn has_map(&self, name: &str) -> bool {
        self.maps.contains_key(name)
    }

    /// Drop a map and its contents. Returns true if the map existed.
    pub fn remove_map(&self, name: &str) -> bool {
        let removed = self.maps.remove(name).is_some();
        if removed {
            tracing::debug!("store: removed map {}", name);
        }
        removed
    }

    /// Allocate a fresh name for builder scratch space.
    pub fn next_temporary_map_name(&self) -> String {
        format!("temp.{}", self.temp_counter.fetch_add(1, Ordering::SeqCst))
    }

    pub fn map_count(&self) -> usize {
        self.maps.len()
    }

    /// Names of all currently open maps (diagnostics).
    pub fn map_names(&self) -> Vec<String> {
        self.maps.iter().map(|e| e.key().clone()).collect()
    }

    /// Approximate bytes held across all maps.
    pub fn total_bytes(&self) -> u64 {
        self.maps.iter().map(|e| e.value().bytes_used()).sum()
    }
}

#[cfg(test)]
mod store_tests {
    use super::*;

    #[test]
    fn test_open_map_is_idempotent() {
        let store = Store::new();
        let a = store.open_map("index.1").unwrap();
        let b = store.open_map("index.1").unwrap();
        a.insert(vec![1], vec![2]);
        assert_eq!(b.get(&[1]), Some(vec![2]));
        assert_eq!(store.map_count(), 1);
    }

    #[test]
    fn test_kind_mismatch_is_rejected() {
        let store = Store::new();
        store.open_map("index.1").unwrap();
        assert!(matches!(
            store.open_hash_map("index.1"),
            Err(StoreError::MapKindMismatch(_))
        ));
    }

    #[test]
    fn test_temporary_names_are_unique() {
        let store = Store::new();
        let a = store.next_temporary_map_name();
        let b = store.next_temporary_map_name();
        assert_ne!(a, b);
        assert!(a.starts_with("temp."));
    }

    #[test]
    fn test_remove_map() {
        let store = Store::new();
        store.open_map("index.2").unwrap();
        assert!(store.has_map("index.2"));
        assert!(store.remove_map("index.2"));
        assert!(!store.has_map("index.2"));
        assert!(!store.remove_map("index.2"));
    }
}
