use thiserror::Error;

/// Secure storage error types
///
/// Cloneable so a single failure can be handed to every caller waiting on
/// the same credentials request.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StorageError {
    #[error("Failed to write to secure storage: {0}")]
    WriteFailed(String),

    #[error("Failed to serialize credentials: {0}")]
    SerializationFailed(String),

    #[error("Failed to read from secure storage: {0}")]
    ReadFailed(String),

    #[error("Failed to delete from secure storage: {0}")]
    DeleteFailed(String),

    #[error("Cryptographic operation failed: {0}")]
    Crypto(String),

    #[error("Stored data is corrupted or was encrypted with a different key")]
    Corrupted,

    #[error("Storage is locked by another process")]
    Locked,

    #[error("Keyring error: {0}")]
    Keyring(String),

    #[error("Passphrase entry was cancelled")]
    PassphraseCancelled,

    #[error("Invalid storage key: {0}")]
    InvalidKey(String),
}

pub type Result<T> = std::result::Result<T, StorageError>;
