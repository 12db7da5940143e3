//! Session layer: credential lifecycle and user-facing operations
//!
//! - [`CredentialsManager`] stores one credential set and renews it on
//!   demand, sharing a single refresh between concurrent callers
//! - [`Request`] lets every operation be awaited or run with callbacks
//!   delivered on a [`DeliveryContext`]
//! - [`SessionOrchestrator`] ties login, logout, credential retrieval and
//!   Users API calls together
//! - [`Notice`] renders outcomes as short messages
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use ck_auth::{AccountConfig, HttpAuthClient};
//! use ck_session::{CredentialsManager, Notice};
//! use ck_store::MemoryStorage;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = AccountConfig::new("YOUR_CLIENT_ID", "tenant.auth0.com");
//! let auth = Arc::new(HttpAuthClient::new(config.clone())?);
//! let manager = CredentialsManager::new(auth, Arc::new(MemoryStorage::new()), &config);
//!
//! match manager.credentials().await {
//!     Ok(credentials) => println!("{}", Notice::got_credentials(&credentials)),
//!     Err(e) => eprintln!("{}", e),
//! }
//! # Ok(())
//! # }
//! ```

pub mod errors;
pub mod manager;
pub mod notice;
pub mod orchestrator;
pub mod request;

#[cfg(test)]
mod testing;

pub use errors::{CredentialsError, ErrorKind, SessionError};
pub use manager::CredentialsManager;
pub use notice::Notice;
pub use orchestrator::{SessionOrchestrator, random_metadata_patch};
pub use request::{DeliveryContext, DeliveryLoop, Request};
