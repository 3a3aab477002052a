use super::{LocalStore, StoreUnavailable};

use dashmap::DashMap;
use std::sync::atomic::{AtomicBool, Ordering};

/// In-memory key-value store with an explicit readiness flag.
pub struct MemoryStore {
    data: DashMap<String, String>,
    ready: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            data: DashMap::new(),
            ready: AtomicBool::new(true),
        }
    }

    /// A store that answers `StoreUnavailable` until [`mark_ready`](Self::mark_ready).
    pub fn uninitialized() -> Self {
        Self {
            data: DashMap::new(),
            ready: AtomicBool::new(false),
        }
    }

    pub fn mark_ready(&self) {
        self.ready.store(true, Ordering::Release);
    }

    pub fn insert(&self, key: impl Into<String>, value: impl Into<String>) {
        self.data.insert(key.into(), value.into());
    }

    pub fn remove(&self, key: &str) -> Option<String> {
        self.data.remove(key).map(|(_, value)| value)
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl LocalStore for MemoryStore {
    fn get_local(&self, key: &str) -> Result<Option<String>, StoreUnavailable> {
        if !self.ready.load(Ordering::Acquire) {
            return Err(StoreUnavailable("store is not initialized".to_string()));
        }
        Ok(self.data.get(key).map(|value| value.clone()))
    }
}
