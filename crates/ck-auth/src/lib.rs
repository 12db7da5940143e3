//! OAuth2 / OIDC client side of the credential manager
//!
//! This crate defines the credential model, the error taxonomy, the account
//! configuration and the collaborator interfaces the session layer consumes:
//!
//! - [`AuthApiClient`]: password login, refresh and code exchange against the
//!   tenant's token endpoint ([`HttpAuthClient`])
//! - [`WebAuthProvider`]: interactive browser login/logout
//!   ([`BrowserAuthProvider`], authorization code + PKCE)
//! - [`ResourceApiClient`]: Users API profile and metadata calls
//!   ([`HttpUsersClient`])
//!
//! # Example
//!
//! ```no_run
//! use ck_auth::{AccountConfig, AuthApiClient, HttpAuthClient, LoginParams};
//!
//! # async fn example() -> Result<(), ck_auth::AuthError> {
//! let config = AccountConfig::new("YOUR_CLIENT_ID", "tenant.auth0.com");
//! let client = HttpAuthClient::new(config.clone())?;
//!
//! let credentials = client
//!     .login("ada@example.com", "password", &config.realm, &LoginParams::default())
//!     .await?;
//! println!("Hello {}", credentials.display_name());
//!
//! if let Some(refresh_token) = &credentials.refresh_token {
//!     let renewed = credentials.renewed(client.refresh(refresh_token).await?);
//!     println!("Token valid until {}", renewed.expires_at);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # Important Notes
//!
//! - Tokens are secrets: `Credentials` redacts them from `Debug` output and
//!   no span records them
//! - Request `offline_access` in the scope to receive a refresh token

pub mod api;
pub mod client;
pub mod config;
pub mod credentials;
pub mod errors;
pub mod id_token;
pub mod models;
pub mod pkce;
pub mod users;
pub mod web_auth;

pub use api::{AuthApiClient, LoginParams, ResourceApiClient, WebAuthParams, WebAuthProvider};
pub use client::HttpAuthClient;
pub use config::{AccountConfig, HttpTimeouts};
pub use credentials::{Credentials, UserIdentity};
pub use errors::{AuthError, ResourceError};
pub use models::UserProfile;
pub use users::HttpUsersClient;
pub use web_auth::{BrowserAuthProvider, UserAgent};
