use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::errors::{Result, StorageError};

/// Byte-oriented secret storage keyed by a fixed entry name
///
/// Implementations must make `set` atomic: a concurrent `get` observes either
/// the previous value or the new one, never a partial write.
#[async_trait::async_trait]
pub trait SecureStorage: Send + Sync {
    /// Read the value stored under `key`, `None` if nothing is stored
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Store `value` under `key`, replacing any previous value
    async fn set(&self, key: &str, value: &[u8]) -> Result<()>;

    /// Delete the value under `key`; deleting a missing entry is not an error
    async fn delete(&self, key: &str) -> Result<()>;
}

/// In-memory storage for testing and short-lived processes
#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    entries: Arc<RwLock<HashMap<String, Vec<u8>>>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self {
            entries: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Number of stored entries
    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait::async_trait]
impl SecureStorage for MemoryStorage {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let entries = self
            .entries
            .read()
            .map_err(|_| StorageError::ReadFailed("Lock poisoned".to_string()))?;
        Ok(entries.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &[u8]) -> Result<()> {
        self.entries
            .write()
            .map_err(|_| StorageError::WriteFailed("Lock poisoned".to_string()))?
            .insert(key.to_string(), value.to_vec());
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.entries
            .write()
            .map_err(|_| StorageError::DeleteFailed("Lock poisoned".to_string()))?
            .remove(key);
        Ok(())
    }
}
