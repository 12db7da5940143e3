use std::collections::BTreeMap;

use serde_json::{Map, Value};

use crate::credentials::Credentials;
use crate::errors::{AuthError, ResourceError};
use crate::models::UserProfile;

/// Extra parameters for a direct (username/password) login
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoginParams {
    pub scope: Option<String>,
    pub audience: Option<String>,
    /// Additional form parameters sent to the token endpoint
    pub extra: BTreeMap<String, String>,
}

/// Parameters of a browser-based login
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WebAuthParams {
    pub scope: Option<String>,
    pub audience: Option<String>,
    /// Additional query parameters appended to the authorize URL
    pub extra: BTreeMap<String, String>,
}

/// Token endpoint operations of the identity provider
#[async_trait::async_trait]
pub trait AuthApiClient: Send + Sync {
    /// Resource-owner password login against a database `realm`
    async fn login(
        &self,
        username: &str,
        password: &str,
        realm: &str,
        params: &LoginParams,
    ) -> Result<Credentials, AuthError>;

    /// Exchange a refresh token for a new credential set
    async fn refresh(&self, refresh_token: &str) -> Result<Credentials, AuthError>;

    /// Exchange an authorization code obtained by the browser flow
    async fn exchange_code(
        &self,
        code: &str,
        code_verifier: &str,
        redirect_uri: &str,
    ) -> Result<Credentials, AuthError>;
}

/// Interactive login and logout through the system browser
#[async_trait::async_trait]
pub trait WebAuthProvider: Send + Sync {
    /// Fails with [`AuthError::Cancelled`] when the user closes the browser
    async fn login(&self, params: &WebAuthParams) -> Result<Credentials, AuthError>;

    /// Clears the provider's browser session only
    async fn logout(&self) -> Result<(), AuthError>;
}

/// Users API, authorized by the caller's access token
#[async_trait::async_trait]
pub trait ResourceApiClient: Send + Sync {
    async fn get_profile(
        &self,
        user_id: &str,
        access_token: &str,
    ) -> Result<UserProfile, ResourceError>;

    /// Merge `patch` into the user's metadata on the server
    async fn update_metadata(
        &self,
        user_id: &str,
        access_token: &str,
        patch: &Map<String, Value>,
    ) -> Result<UserProfile, ResourceError>;
}
