use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, instrument};
use url::Url;

use crate::api::{AuthApiClient, WebAuthParams, WebAuthProvider};
use crate::config::{AccountConfig, endpoints};
use crate::credentials::Credentials;
use crate::errors::AuthError;
use crate::pkce;

/// Something that can show a URL to the user and report where the browser
/// was redirected
#[async_trait::async_trait]
pub trait UserAgent: Send + Sync {
    /// Open `url` and wait until the browser reaches `redirect_uri`
    ///
    /// Returns the full redirect URL, or `None` if the user closed the
    /// browser first.
    async fn open(&self, url: &Url, redirect_uri: &Url) -> Result<Option<Url>, AuthError>;
}

/// Authorization-code + PKCE login through a [`UserAgent`]
pub struct BrowserAuthProvider<U> {
    config: AccountConfig,
    auth: Arc<dyn AuthApiClient>,
    agent: U,
}

impl<U: UserAgent> BrowserAuthProvider<U> {
    pub fn new(config: AccountConfig, auth: Arc<dyn AuthApiClient>, agent: U) -> Self {
        Self {
            config,
            auth,
            agent,
        }
    }

    /// Build the authorization URL for the user to visit
    pub fn build_authorize_url(
        &self,
        params: &WebAuthParams,
        state: &str,
        code_challenge: &str,
    ) -> Result<Url, AuthError> {
        let mut url = self.config.base_url()?.join(endpoints::AUTHORIZE)?;
        let redirect_uri = self.config.redirect_uri()?;
        let audience = match &params.audience {
            Some(audience) => audience.clone(),
            None => self.config.audience()?,
        };

        url.query_pairs_mut()
            .append_pair("response_type", "code")
            .append_pair("client_id", &self.config.client_id)
            .append_pair("redirect_uri", redirect_uri.as_str())
            .append_pair(
                "scope",
                params.scope.as_deref().unwrap_or(&self.config.scope),
            )
            .append_pair("audience", &audience)
            .append_pair("state", state)
            .append_pair("code_challenge", code_challenge)
            .append_pair("code_challenge_method", "S256");

        for (key, value) in &params.extra {
            url.query_pairs_mut().append_pair(key, value);
        }

        Ok(url)
    }

    /// Build the URL that ends the provider's browser session
    pub fn build_logout_url(&self) -> Result<Url, AuthError> {
        let mut url = self.config.base_url()?.join(endpoints::LOGOUT)?;
        url.query_pairs_mut()
            .append_pair("client_id", &self.config.client_id)
            .append_pair("returnTo", self.config.redirect_uri()?.as_str());
        Ok(url)
    }
}

/// Extract the authorization code from the redirect URL
pub fn parse_redirect(redirect_url: &Url, expected_state: &str) -> Result<String, AuthError> {
    let params: HashMap<_, _> = redirect_url.query_pairs().collect();

    if let Some(error) = params.get("error") {
        if error == "access_denied" {
            return Err(AuthError::Cancelled);
        }
        let description = params
            .get("error_description")
            .map(|d| d.to_string())
            .unwrap_or_else(|| error.to_string());
        return Err(AuthError::rejected(error.to_string(), description));
    }

    match params.get("state") {
        Some(actual) if actual == expected_state => {}
        _ => {
            return Err(AuthError::rejected(
                "invalid_state",
                "OAuth state mismatch in redirect",
            ));
        }
    }

    params
        .get("code")
        .map(|c| c.to_string())
        .ok_or_else(|| AuthError::rejected("invalid_redirect", "Redirect is missing the code"))
}

fn rng_error(e: getrandom::Error) -> AuthError {
    AuthError::Transient(format!("OS RNG unavailable: {}", e))
}

#[async_trait::async_trait]
impl<U: UserAgent> WebAuthProvider for BrowserAuthProvider<U> {
    #[instrument(skip(self))]
    async fn login(&self, params: &WebAuthParams) -> Result<Credentials, AuthError> {
        let state = pkce::generate_state().map_err(rng_error)?;
        let verifier = pkce::generate_code_verifier().map_err(rng_error)?;
        let challenge = pkce::generate_code_challenge(&verifier);

        let url = self.build_authorize_url(params, &state, &challenge)?;
        let redirect_uri = self.config.redirect_uri()?;

        debug!("Opening authorize URL");
        let redirect = self
            .agent
            .open(&url, &redirect_uri)
            .await?
            .ok_or(AuthError::Cancelled)?;

        let code = parse_redirect(&redirect, &state)?;
        self.auth
            .exchange_code(&code, &verifier, redirect_uri.as_str())
            .await
    }

    #[instrument(skip(self))]
    async fn logout(&self) -> Result<(), AuthError> {
        let url = self.build_logout_url()?;
        let redirect_uri = self.config.redirect_uri()?;

        debug!("Opening logout URL");
        self.agent
            .open(&url, &redirect_uri)
            .await?
            .ok_or(AuthError::Cancelled)?;
        Ok(())
    }
}
