use aes_gcm::{
    Aes256Gcm, Nonce,
    aead::{Aead, KeyInit, Payload},
};
use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use zeroize::{ZeroizeOnDrop, Zeroizing};

use crate::errors::{Result, StorageError};

/// Version tag bound into the AAD of every blob
const AAD_VERSION: &str = "v1";

/// AES-256 key (32 bytes)
#[derive(Clone, ZeroizeOnDrop)]
pub struct EncryptionKey {
    key: [u8; 32],
}

impl EncryptionKey {
    /// Generate a new random encryption key
    pub fn generate() -> Result<Self> {
        let mut key = [0u8; 32];
        fill_random(&mut key)?;
        Ok(Self { key })
    }

    /// Create from raw bytes
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self { key: bytes }
    }

    /// Get key bytes (use carefully - sensitive data)
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.key
    }
}

impl std::fmt::Debug for EncryptionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("EncryptionKey([REDACTED])")
    }
}

/// Encrypted data with nonce and authentication tag
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct EncryptedBlob {
    /// Base64url-encoded nonce (12 bytes)
    pub nonce: String,
    /// Base64url-encoded ciphertext + tag
    pub ciphertext: String,
    /// Additional authenticated data version
    pub aad_version: String,
}

/// Fill `buf` from the operating system RNG
pub(crate) fn fill_random(buf: &mut [u8]) -> Result<()> {
    getrandom::fill(buf).map_err(|e| StorageError::Crypto(format!("OS RNG unavailable: {}", e)))
}

fn aad(version: &str, entry_key: &str) -> String {
    format!("ck-store|{}|{}", version, entry_key)
}

/// Encrypt plaintext using AES-256-GCM, binding it to `entry_key`
pub fn encrypt(key: &EncryptionKey, plaintext: &[u8], entry_key: &str) -> Result<EncryptedBlob> {
    let cipher = Aes256Gcm::new(key.as_bytes().into());

    let mut nonce_bytes = [0u8; 12];
    fill_random(&mut nonce_bytes)?;
    let nonce = Nonce::from_slice(&nonce_bytes);

    let aad = aad(AAD_VERSION, entry_key);
    let ciphertext = cipher
        .encrypt(
            nonce,
            Payload {
                msg: plaintext,
                aad: aad.as_bytes(),
            },
        )
        .map_err(|e| StorageError::Crypto(format!("Encryption failed: {}", e)))?;

    Ok(EncryptedBlob {
        nonce: URL_SAFE_NO_PAD.encode(nonce_bytes),
        ciphertext: URL_SAFE_NO_PAD.encode(ciphertext),
        aad_version: AAD_VERSION.to_string(),
    })
}

/// Decrypt a blob produced by [`encrypt`] for the same `entry_key`
pub fn decrypt(
    key: &EncryptionKey,
    blob: &EncryptedBlob,
    entry_key: &str,
) -> Result<Zeroizing<Vec<u8>>> {
    let cipher = Aes256Gcm::new(key.as_bytes().into());

    let nonce_bytes = URL_SAFE_NO_PAD
        .decode(&blob.nonce)
        .map_err(|_| StorageError::Corrupted)?;
    if nonce_bytes.len() != 12 {
        return Err(StorageError::Corrupted);
    }
    let nonce = Nonce::from_slice(&nonce_bytes);

    let ciphertext = URL_SAFE_NO_PAD
        .decode(&blob.ciphertext)
        .map_err(|_| StorageError::Corrupted)?;

    let aad = aad(&blob.aad_version, entry_key);
    let plaintext = cipher
        .decrypt(
            nonce,
            Payload {
                msg: &ciphertext,
                aad: aad.as_bytes(),
            },
        )
        .map_err(|_| StorageError::Corrupted)?;

    Ok(Zeroizing::new(plaintext))
}
