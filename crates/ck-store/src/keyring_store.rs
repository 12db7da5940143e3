use keyring::Entry;

use crate::errors::{Result, StorageError};
use crate::store::SecureStorage;

/// Storage backed directly by the OS keyring
///
/// Each key maps to one keyring entry under `service`. The platform keystore
/// (Keychain, Credential Manager, Secret Service) encrypts the value at rest.
#[derive(Debug, Clone)]
pub struct KeyringStorage {
    service: String,
}

impl KeyringStorage {
    pub fn new(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
        }
    }

    fn entry(&self, key: &str) -> Result<Entry> {
        Entry::new(&self.service, key)
            .map_err(|e| StorageError::Keyring(format!("Failed to access keyring: {}", e)))
    }
}

#[async_trait::async_trait]
impl SecureStorage for KeyringStorage {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        match self.entry(key)?.get_secret() {
            Ok(secret) => Ok(Some(secret)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(keyring::Error::BadEncoding(_)) => Err(StorageError::Corrupted),
            Err(e) => Err(StorageError::ReadFailed(e.to_string())),
        }
    }

    async fn set(&self, key: &str, value: &[u8]) -> Result<()> {
        self.entry(key)?
            .set_secret(value)
            .map_err(|e| StorageError::WriteFailed(e.to_string()))
    }

    async fn delete(&self, key: &str) -> Result<()> {
        match self.entry(key)?.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(StorageError::DeleteFailed(e.to_string())),
        }
    }
}
