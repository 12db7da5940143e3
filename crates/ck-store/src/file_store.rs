use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use fs2::FileExt;
use tokio::fs;
use tokio::sync::RwLock;
use zeroize::Zeroizing;

use crate::crypto::{self, EncryptedBlob};
use crate::errors::{Result, StorageError};
use crate::key_manager::KeyManager;
use crate::secret::SecretProvider;
use crate::store::SecureStorage;

/// File-based encrypted storage
///
/// Stores each entry as an AES-256-GCM encrypted blob in its own file.
/// Uses OS keyring for key management with passphrase fallback.
///
/// # Directory Structure
/// ```text
/// ~/.config/credkeep/ck-store/
/// ├── meta.json              # Key derivation metadata
/// ├── lock                   # Advisory lock file
/// └── entries/
///     └── credentials.json   # Encrypted stored session
/// ```
pub struct EncryptedFileStorage {
    entries_dir: PathBuf,
    lock_file: PathBuf,
    key_manager: Arc<RwLock<KeyManager>>,
    /// Decrypted values of recently accessed entries
    cache: Arc<RwLock<HashMap<String, Zeroizing<Vec<u8>>>>>,
}

impl EncryptedFileStorage {
    /// Create a new encrypted file storage
    ///
    /// # Arguments
    /// * `storage_dir` - Base directory for storage (e.g., ~/.config/credkeep/ck-store)
    /// * `service` - OS keyring service name holding the encryption key
    /// * `secret_provider` - Provider for passphrase fallback
    pub async fn new(
        storage_dir: impl AsRef<Path>,
        service: &str,
        secret_provider: Arc<dyn SecretProvider>,
    ) -> Result<Self> {
        let storage_dir = storage_dir.as_ref().to_path_buf();
        let entries_dir = storage_dir.join("entries");
        let lock_file = storage_dir.join("lock");

        fs::create_dir_all(&entries_dir).await.map_err(|e| {
            StorageError::WriteFailed(format!("Failed to create storage dir: {}", e))
        })?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let perms = std::fs::Permissions::from_mode(0o700);
            for dir in [&storage_dir, &entries_dir] {
                std::fs::set_permissions(dir, perms.clone()).map_err(|e| {
                    StorageError::WriteFailed(format!("Failed to secure storage dir: {}", e))
                })?;
            }
        }

        let key_manager = KeyManager::new(&storage_dir, service, secret_provider).await?;

        Ok(Self {
            entries_dir,
            lock_file,
            key_manager: Arc::new(RwLock::new(key_manager)),
            cache: Arc::new(RwLock::new(HashMap::new())),
        })
    }

    /// Get default storage directory for the current platform
    pub fn default_storage_dir() -> Result<PathBuf> {
        let project_dirs = directories::ProjectDirs::from("", "", "credkeep").ok_or_else(|| {
            StorageError::ReadFailed("Could not determine config directory".to_string())
        })?;

        Ok(project_dirs.config_dir().join("ck-store"))
    }

    /// Get the path for an entry file
    fn entry_path(&self, key: &str) -> Result<PathBuf> {
        let valid = !key.is_empty()
            && key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.')
            && !key.starts_with('.');
        if !valid {
            return Err(StorageError::InvalidKey(key.to_string()));
        }
        Ok(self.entries_dir.join(format!("{}.json", key)))
    }

    /// Acquire an exclusive lock on the storage
    fn acquire_lock(&self) -> Result<std::fs::File> {
        let lock_file = std::fs::OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&self.lock_file)
            .map_err(|e| StorageError::WriteFailed(format!("Failed to open lock file: {}", e)))?;

        lock_file
            .try_lock_exclusive()
            .map_err(|_| StorageError::Locked)?;

        Ok(lock_file)
    }

    /// Load and decrypt an entry from disk
    async fn load_from_disk(&self, key: &str) -> Result<Option<Zeroizing<Vec<u8>>>> {
        let path = self.entry_path(key)?;

        let content = match fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(StorageError::ReadFailed(e.to_string())),
        };

        let encrypted: EncryptedBlob =
            serde_json::from_str(&content).map_err(|_| StorageError::Corrupted)?;

        let key_manager = self.key_manager.read().await;
        let plaintext = crypto::decrypt(key_manager.key(), &encrypted, key)?;

        Ok(Some(plaintext))
    }

    /// Encrypt and save an entry to disk
    async fn save_to_disk(&self, key: &str, value: &[u8]) -> Result<()> {
        let path = self.entry_path(key)?;

        let key_manager = self.key_manager.read().await;
        let encrypted = crypto::encrypt(key_manager.key(), value, key)?;
        drop(key_manager);

        let encrypted_json = serde_json::to_string_pretty(&encrypted)
            .map_err(|e| StorageError::SerializationFailed(e.to_string()))?;

        // Atomic write: write to temp file, sync, then rename over the entry
        let temp_path = path.with_extension("tmp");
        fs::write(&temp_path, encrypted_json)
            .await
            .map_err(|e| StorageError::WriteFailed(e.to_string()))?;

        let file = std::fs::File::open(&temp_path)
            .map_err(|e| StorageError::WriteFailed(e.to_string()))?;
        file.sync_all()
            .map_err(|e| StorageError::WriteFailed(e.to_string()))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let perms = std::fs::Permissions::from_mode(0o600);
            std::fs::set_permissions(&temp_path, perms)
                .map_err(|e| StorageError::WriteFailed(e.to_string()))?;
        }

        fs::rename(&temp_path, &path)
            .await
            .map_err(|e| StorageError::WriteFailed(e.to_string()))?;

        Ok(())
    }

    /// Names of all stored entries
    pub async fn list_keys(&self) -> Vec<String> {
        let mut keys = Vec::new();

        let mut entries = match fs::read_dir(&self.entries_dir).await {
            Ok(entries) => entries,
            Err(e) => {
                tracing::error!("Failed to read entries directory: {}", e);
                return keys;
            }
        };

        while let Ok(Some(entry)) = entries.next_entry().await {
            let path = entry.path();
            if path.extension().and_then(|s| s.to_str()) == Some("json")
                && let Some(stem) = path.file_stem().and_then(|s| s.to_str())
            {
                keys.push(stem.to_string());
            }
        }

        keys
    }

    /// Rotate encryption key and re-encrypt all entries
    pub async fn rotate_key(&self) -> Result<()> {
        let _lock = self.acquire_lock()?;

        let keys = self.list_keys().await;
        let mut values = Vec::with_capacity(keys.len());
        for key in &keys {
            if let Some(value) = self.load_from_disk(key).await? {
                values.push((key.clone(), value));
            }
        }

        self.key_manager.write().await.rotate().await?;

        for (key, value) in &values {
            self.save_to_disk(key, value).await?;
        }

        self.cache.write().await.clear();
        tracing::info!(entries = values.len(), "Rotated storage encryption key");

        Ok(())
    }
}

impl std::fmt::Debug for EncryptedFileStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EncryptedFileStorage")
            .field("entries_dir", &self.entries_dir)
            .field("lock_file", &self.lock_file)
            .finish_non_exhaustive()
    }
}

#[async_trait::async_trait]
impl SecureStorage for EncryptedFileStorage {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        {
            let cache = self.cache.read().await;
            if let Some(value) = cache.get(key) {
                return Ok(Some(value.to_vec()));
            }
        }

        match self.load_from_disk(key).await? {
            Some(value) => {
                let out = value.to_vec();
                self.cache.write().await.insert(key.to_string(), value);
                Ok(Some(out))
            }
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: &[u8]) -> Result<()> {
        let _lock = self.acquire_lock()?;

        self.save_to_disk(key, value).await?;

        self.cache
            .write()
            .await
            .insert(key.to_string(), Zeroizing::new(value.to_vec()));

        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let _lock = self.acquire_lock()?;

        let path = self.entry_path(key)?;
        match fs::remove_file(&path).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(StorageError::DeleteFailed(e.to_string())),
        }

        self.cache.write().await.remove(key);

        Ok(())
    }
}
