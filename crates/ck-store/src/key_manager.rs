use std::path::{Path, PathBuf};
use std::sync::Arc;

use argon2::{Algorithm, Argon2, Params, Version};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};
use tokio::fs;
use zeroize::Zeroizing;

use crate::crypto::{self, EncryptionKey};
use crate::errors::{Result, StorageError};
use crate::secret::SecretProvider;

const SALT_LEN: usize = 32;
const META_FILE: &str = "meta.json";
const KEYRING_ACCOUNT: &str = "ck-store:v1";

/// Metadata for key derivation and storage format
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeyMeta {
    pub version: u32,
    pub created_at: chrono::DateTime<chrono::Utc>,
    /// Base64-encoded salt for Argon2id (if using passphrase)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub passphrase_salt: Option<String>,
}

impl Default for KeyMeta {
    fn default() -> Self {
        Self {
            version: 1,
            created_at: chrono::Utc::now(),
            passphrase_salt: None,
        }
    }
}

/// Manages the storage encryption key with OS keyring and passphrase fallback
pub struct KeyManager {
    meta: KeyMeta,
    key: EncryptionKey,
    service: String,
    meta_path: PathBuf,
    secret_provider: Arc<dyn SecretProvider>,
}

impl KeyManager {
    /// Load or create the encryption key for `storage_dir`
    ///
    /// Tries the OS keyring entry for `service` first. If it is missing or the
    /// keyring is unavailable, derives the key from a passphrase and tries to
    /// store it in the keyring for next time.
    pub async fn new(
        storage_dir: &Path,
        service: &str,
        secret_provider: Arc<dyn SecretProvider>,
    ) -> Result<Self> {
        let meta_path = storage_dir.join(META_FILE);

        let mut meta = if fs::try_exists(&meta_path).await.unwrap_or(false) {
            let content = fs::read_to_string(&meta_path)
                .await
                .map_err(|e| StorageError::ReadFailed(format!("{}: {}", META_FILE, e)))?;
            serde_json::from_str(&content).map_err(|_| StorageError::Corrupted)?
        } else {
            KeyMeta::default()
        };

        let key = match load_from_keyring(service) {
            Ok(key) => {
                tracing::debug!("Loaded encryption key from OS keyring");
                key
            }
            Err(e) => {
                tracing::debug!("Keyring unavailable ({}), using passphrase fallback", e);

                let key = derive_from_passphrase(&mut meta, &secret_provider).await?;

                if let Err(e) = save_to_keyring(service, &key) {
                    tracing::warn!("Failed to save key to keyring: {}", e);
                }

                key
            }
        };

        write_meta(&meta_path, &meta).await?;

        Ok(Self {
            meta,
            key,
            service: service.to_string(),
            meta_path,
            secret_provider,
        })
    }

    /// Get the encryption key
    pub fn key(&self) -> &EncryptionKey {
        &self.key
    }

    /// Replace the encryption key
    ///
    /// A fresh random key is used when the keyring accepts it; otherwise a new
    /// salt is drawn and the key is re-derived from the passphrase. Callers
    /// must re-encrypt existing data with the returned key.
    pub async fn rotate(&mut self) -> Result<EncryptionKey> {
        let new_key = match EncryptionKey::generate().and_then(|key| {
            save_to_keyring(&self.service, &key)?;
            // Only trust the keyring if the key reads back
            let stored = load_from_keyring(&self.service)?;
            if stored.as_bytes() == key.as_bytes() {
                Ok(key)
            } else {
                Err(StorageError::Keyring("rotated key did not persist".to_string()))
            }
        }) {
            Ok(key) => {
                self.meta.passphrase_salt = None;
                key
            }
            Err(e) => {
                tracing::debug!(
                    "Keyring rejected rotated key ({}), re-deriving from passphrase",
                    e
                );
                self.meta.passphrase_salt = None;
                derive_from_passphrase(&mut self.meta, &self.secret_provider).await?
            }
        };

        self.meta.created_at = chrono::Utc::now();
        write_meta(&self.meta_path, &self.meta).await?;

        self.key = new_key.clone();
        Ok(new_key)
    }
}

impl std::fmt::Debug for KeyManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyManager")
            .field("meta", &self.meta)
            .field("service", &self.service)
            .field("key", &"[REDACTED]")
            .finish()
    }
}

async fn write_meta(meta_path: &Path, meta: &KeyMeta) -> Result<()> {
    let meta_json = serde_json::to_string_pretty(meta)
        .map_err(|e| StorageError::SerializationFailed(format!("{}: {}", META_FILE, e)))?;
    fs::write(meta_path, meta_json)
        .await
        .map_err(|e| StorageError::WriteFailed(format!("{}: {}", META_FILE, e)))
}

#[cfg(feature = "keyring-support")]
fn load_from_keyring(service: &str) -> Result<EncryptionKey> {
    let entry = keyring::Entry::new(service, KEYRING_ACCOUNT)
        .map_err(|e| StorageError::Keyring(format!("Failed to access keyring: {}", e)))?;

    let key_b64 = Zeroizing::new(
        entry
            .get_password()
            .map_err(|e| StorageError::Keyring(format!("Failed to read from keyring: {}", e)))?,
    );

    let key_bytes = Zeroizing::new(
        STANDARD
            .decode(key_b64.as_bytes())
            .map_err(|_| StorageError::Corrupted)?,
    );

    let key: [u8; 32] = key_bytes
        .as_slice()
        .try_into()
        .map_err(|_| StorageError::Corrupted)?;

    Ok(EncryptionKey::from_bytes(key))
}

#[cfg(feature = "keyring-support")]
fn save_to_keyring(service: &str, key: &EncryptionKey) -> Result<()> {
    let entry = keyring::Entry::new(service, KEYRING_ACCOUNT)
        .map_err(|e| StorageError::Keyring(format!("Failed to access keyring: {}", e)))?;

    let key_b64 = Zeroizing::new(STANDARD.encode(key.as_bytes()));

    entry
        .set_password(&key_b64)
        .map_err(|e| StorageError::Keyring(format!("Failed to write to keyring: {}", e)))
}

#[cfg(not(feature = "keyring-support"))]
fn load_from_keyring(_service: &str) -> Result<EncryptionKey> {
    Err(StorageError::Keyring("keyring support is disabled".to_string()))
}

#[cfg(not(feature = "keyring-support"))]
fn save_to_keyring(_service: &str, _key: &EncryptionKey) -> Result<()> {
    Err(StorageError::Keyring("keyring support is disabled".to_string()))
}

/// Derive the key from a passphrase using Argon2id (m=64MB, t=3, p=1)
async fn derive_from_passphrase(
    meta: &mut KeyMeta,
    secret_provider: &Arc<dyn SecretProvider>,
) -> Result<EncryptionKey> {
    let salt = match meta.passphrase_salt {
        Some(ref salt_b64) => STANDARD
            .decode(salt_b64)
            .map_err(|_| StorageError::Corrupted)?,
        None => {
            let mut salt = vec![0u8; SALT_LEN];
            crypto::fill_random(&mut salt)?;
            meta.passphrase_salt = Some(STANDARD.encode(&salt));
            salt
        }
    };

    let passphrase = secret_provider
        .get_passphrase("Enter passphrase for credential storage")
        .await
        .ok_or(StorageError::PassphraseCancelled)?;

    let params = Params::new(65536, 3, 1, Some(32))
        .map_err(|e| StorageError::Crypto(format!("Invalid Argon2 params: {}", e)))?;
    let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);

    let mut key = Zeroizing::new([0u8; 32]);
    argon2
        .hash_password_into(passphrase.as_bytes(), &salt, &mut key[..])
        .map_err(|e| StorageError::Crypto(format!("Key derivation failed: {}", e)))?;

    Ok(EncryptionKey::from_bytes(*key))
}
