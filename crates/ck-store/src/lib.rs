//! Encrypted-at-rest storage for serialized credentials
//!
//! The crate exposes a byte-oriented [`SecureStorage`] trait and three
//! backends:
//!
//! - [`MemoryStorage`]: process-local map, for tests and ephemeral sessions
//! - [`EncryptedFileStorage`]: AES-256-GCM encrypted files, with the key held
//!   in the OS keyring or derived from a passphrase with Argon2id
//! - [`KeyringStorage`]: values stored directly as OS keyring secrets
//!   (feature `keyring-support`, enabled by default)
//!
//! # Example
//!
//! ```
//! use ck_store::{MemoryStorage, SecureStorage};
//!
//! # async fn example() -> ck_store::Result<()> {
//! let storage = MemoryStorage::new();
//! storage.set("credentials", b"serialized").await?;
//!
//! if let Some(bytes) = storage.get("credentials").await? {
//!     assert_eq!(bytes, b"serialized");
//! }
//!
//! storage.delete("credentials").await?;
//! # Ok(())
//! # }
//! # tokio_test::block_on(example()).unwrap();
//! ```
//!
//! Without the `keyring-native` feature the `keyring` crate falls back to its
//! in-process mock store, so keys do not survive a restart and
//! [`EncryptedFileStorage`] re-derives its key from the passphrase instead.

pub mod crypto;
pub mod errors;
pub mod file_store;
pub mod key_manager;
#[cfg(feature = "keyring-support")]
pub mod keyring_store;
pub mod secret;
pub mod store;

pub use errors::{Result, StorageError};
pub use file_store::EncryptedFileStorage;
#[cfg(feature = "keyring-support")]
pub use keyring_store::KeyringStorage;
pub use secret::{EnvSecretProvider, SecretProvider};
pub use store::{MemoryStorage, SecureStorage};
