//! Typed key-value caching over pluggable string storage.
//!
//! Caching here is an optimization only: reads that fail or hit corrupt data
//! are misses, and writes that fail are logged and dropped. Every caller keeps
//! a working cold-cache path.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use log::{debug, warn};
use serde::{de::DeserializeOwned, Serialize};

/// Failures raised by a storage medium.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("storage quota exceeded ({needed} bytes needed, {quota} bytes allowed)")]
    QuotaExceeded { needed: usize, quota: usize },
    #[error("sqlite storage error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("storage io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("storage lock poisoned")]
    Poisoned,
}

/// Raw string storage behind a cache tier.
pub trait StorageMedium: Send + Sync {
    fn get_item(&self, key: &str) -> Result<Option<String>, StorageError>;
    fn set_item(&self, key: &str, value: &str) -> Result<(), StorageError>;
    fn remove_item(&self, key: &str) -> Result<(), StorageError>;
    fn clear(&self) -> Result<(), StorageError>;
}

/// Lifetime of a cache tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheScope {
    /// Dropped when the process exits.
    Session,
    /// Kept across runs until explicitly removed.
    Durable,
}

/// Builds the cache key for `identifier` under a stable `prefix`.
pub fn generate_cache_key(prefix: &str, identifier: &str) -> String {
    format!("{prefix}_{identifier}")
}

/// JSON-encoding cache over a shared storage medium.
#[derive(Clone)]
pub struct KeyValueCache {
    scope: CacheScope,
    medium: Arc<dyn StorageMedium>,
}

impl KeyValueCache {
    pub fn new(scope: CacheScope, medium: Arc<dyn StorageMedium>) -> Self {
        Self { scope, medium }
    }

    /// Creates a process-lifetime cache. `quota_bytes == 0` means unbounded.
    pub fn session(quota_bytes: usize) -> Self {
        let store = if quota_bytes == 0 {
            MemoryStore::new()
        } else {
            MemoryStore::with_quota(quota_bytes)
        };
        Self::new(CacheScope::Session, Arc::new(store))
    }

    /// Returns the decoded value at `key`, or `None` when absent, unreadable or
    /// not decodable as `T`.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let raw = match self.medium.get_item(key) {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(err) => {
                warn!("{:?} cache read failed for '{}': {}", self.scope, key, err);
                return None;
            }
        };
        match serde_json::from_str(&raw) {
            Ok(value) => Some(value),
            Err(err) => {
                debug!(
                    "{:?} cache entry '{}' is not decodable, treating as miss: {}",
                    self.scope, key, err
                );
                None
            }
        }
    }

    /// Stores `value` at `key`. Returns whether the write landed.
    pub fn set<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> bool {
        let encoded = match serde_json::to_string(value) {
            Ok(encoded) => encoded,
            Err(err) => {
                warn!("Failed to encode {:?} cache entry '{}': {}", self.scope, key, err);
                return false;
            }
        };
        match self.medium.set_item(key, &encoded) {
            Ok(()) => true,
            Err(err) => {
                warn!("Failed to cache {:?} entry '{}': {}", self.scope, key, err);
                false
            }
        }
    }

    pub fn remove(&self, key: &str) {
        if let Err(err) = self.medium.remove_item(key) {
            warn!("Failed to remove {:?} cache entry '{}': {}", self.scope, key, err);
        }
    }

    pub fn clear(&self) -> bool {
        match self.medium.clear() {
            Ok(()) => true,
            Err(err) => {
                warn!("Failed to clear {:?} cache: {}", self.scope, err);
                false
            }
        }
    }
}

/// In-memory medium with an optional byte budget over keys plus values.
#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
    quota_bytes: Option<usize>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_quota(quota_bytes: usize) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            quota_bytes: Some(quota_bytes),
        }
    }

    fn entry_size(key: &str, value: &str) -> usize {
        key.len().saturating_add(value.len())
    }
}

impl StorageMedium for MemoryStore {
    fn get_item(&self, key: &str) -> Result<Option<String>, StorageError> {
        let entries = self.entries.lock().map_err(|_| StorageError::Poisoned)?;
        Ok(entries.get(key).cloned())
    }

    fn set_item(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let mut entries = self.entries.lock().map_err(|_| StorageError::Poisoned)?;
        if let Some(quota) = self.quota_bytes {
            let used: usize = entries
                .iter()
                .filter(|(existing_key, _)| existing_key.as_str() != key)
                .map(|(existing_key, existing_value)| Self::entry_size(existing_key, existing_value))
                .sum();
            let needed = used.saturating_add(Self::entry_size(key, value));
            if needed > quota {
                return Err(StorageError::QuotaExceeded { needed, quota });
            }
        }
        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove_item(&self, key: &str) -> Result<(), StorageError> {
        let mut entries = self.entries.lock().map_err(|_| StorageError::Poisoned)?;
        entries.remove(key);
        Ok(())
    }

    fn clear(&self) -> Result<(), StorageError> {
        let mut entries = self.entries.lock().map_err(|_| StorageError::Poisoned)?;
        entries.clear();
        Ok(())
    }
}
