use reqwest::{Client, Response, StatusCode};
use tracing::{debug, instrument, warn};
use url::Url;

use crate::api::{AuthApiClient, LoginParams};
use crate::config::{AccountConfig, endpoints, grant_types};
use crate::credentials::{Credentials, UserIdentity};
use crate::errors::AuthError;
use crate::id_token;
use crate::models::{OAuthErrorResponse, TokenResponse};

/// Authentication API client speaking to the tenant's `/oauth/token` endpoint
#[derive(Debug, Clone)]
pub struct HttpAuthClient {
    config: AccountConfig,
    token_url: Url,
    issuer: String,
    http: Client,
}

impl HttpAuthClient {
    /// Create a new authentication client
    pub fn new(config: AccountConfig) -> Result<Self, AuthError> {
        let http = Client::builder()
            .connect_timeout(config.http_timeouts.connect)
            .timeout(config.http_timeouts.request)
            .user_agent(config.user_agent())
            .build()?;

        let token_url = config.base_url()?.join(endpoints::TOKEN)?;
        let issuer = config.issuer()?;

        Ok(Self {
            config,
            token_url,
            issuer,
            http,
        })
    }

    pub fn config(&self) -> &AccountConfig {
        &self.config
    }

    /// POST a grant to the token endpoint and build credentials from the answer
    async fn token_request(
        &self,
        form: &[(&str, &str)],
        requested_scope: &str,
    ) -> Result<Credentials, AuthError> {
        let response = self.http.post(self.token_url.clone()).form(form).send().await?;

        if !response.status().is_success() {
            return Err(error_from_response(response).await);
        }

        let token: TokenResponse = response.json().await?;

        let user = match token.id_token.as_deref() {
            Some(id_token) if !id_token.is_empty() => {
                id_token::identity_from_id_token(id_token, &self.issuer, &self.config.client_id)?
            }
            _ => UserIdentity::default(),
        };

        Credentials::new(
            token.access_token,
            token.id_token.unwrap_or_default(),
            token.refresh_token,
            token.token_type,
            token.expires_in,
            token.scope.unwrap_or_else(|| requested_scope.to_string()),
            user,
        )
    }
}

/// Classify a failed token endpoint response
///
/// Server errors and rate limiting are transient; every other 4xx means the
/// grant itself was refused.
async fn error_from_response(response: Response) -> AuthError {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    let parsed = serde_json::from_str::<OAuthErrorResponse>(&body).ok();

    let description = parsed
        .as_ref()
        .and_then(|e| e.error_description.clone())
        .unwrap_or_else(|| {
            let snippet: String = body.chars().take(200).collect();
            format!("HTTP {}: {}", status, snippet)
        });

    if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
        warn!(%status, "Token endpoint unavailable");
        return AuthError::Transient(description);
    }

    let code = parsed
        .map(|e| e.error)
        .unwrap_or_else(|| status.as_u16().to_string());
    AuthError::Rejected { code, description }
}

#[async_trait::async_trait]
impl AuthApiClient for HttpAuthClient {
    #[instrument(skip(self, username, password, params))]
    async fn login(
        &self,
        username: &str,
        password: &str,
        realm: &str,
        params: &LoginParams,
    ) -> Result<Credentials, AuthError> {
        let scope = params.scope.as_deref().unwrap_or(&self.config.scope);
        let audience = match &params.audience {
            Some(audience) => audience.clone(),
            None => self.config.audience()?,
        };

        let mut form = vec![
            ("grant_type", grant_types::PASSWORD_REALM),
            ("client_id", self.config.client_id.as_str()),
            ("username", username),
            ("password", password),
            ("realm", realm),
            ("scope", scope),
            ("audience", audience.as_str()),
        ];
        form.extend(params.extra.iter().map(|(k, v)| (k.as_str(), v.as_str())));

        debug!("Logging in with password-realm grant");
        self.token_request(&form, scope).await
    }

    #[instrument(skip(self, refresh_token))]
    async fn refresh(&self, refresh_token: &str) -> Result<Credentials, AuthError> {
        let form = [
            ("grant_type", grant_types::REFRESH_TOKEN),
            ("client_id", self.config.client_id.as_str()),
            ("refresh_token", refresh_token),
        ];

        debug!("Refreshing access token");
        self.token_request(&form, "").await
    }

    #[instrument(skip(self, code, code_verifier))]
    async fn exchange_code(
        &self,
        code: &str,
        code_verifier: &str,
        redirect_uri: &str,
    ) -> Result<Credentials, AuthError> {
        let form = [
            ("grant_type", grant_types::AUTHORIZATION_CODE),
            ("client_id", self.config.client_id.as_str()),
            ("code", code),
            ("code_verifier", code_verifier),
            ("redirect_uri", redirect_uri),
        ];

        debug!("Exchanging authorization code for tokens");
        self.token_request(&form, &self.config.scope).await
    }
}
