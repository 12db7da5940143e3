use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use reqwest::{Client, RequestBuilder, StatusCode};
use serde_json::{Map, Value};
use tracing::{debug, instrument};
use url::Url;

use crate::api::ResourceApiClient;
use crate::config::{AccountConfig, endpoints};
use crate::errors::{AuthError, ResourceError};
use crate::models::{ManagementErrorResponse, MetadataPatchRequest, UserProfile};

/// Users API client (`/api/v2/users/{id}`)
///
/// Holds no token; each call is authorized by the access token passed in.
#[derive(Debug, Clone)]
pub struct HttpUsersClient {
    base_url: Url,
    http: Client,
}

impl HttpUsersClient {
    pub fn new(config: &AccountConfig) -> Result<Self, AuthError> {
        let http = Client::builder()
            .connect_timeout(config.http_timeouts.connect)
            .timeout(config.http_timeouts.request)
            .user_agent(config.user_agent())
            .build()?;

        Ok(Self {
            base_url: config.base_url()?,
            http,
        })
    }

    fn user_url(&self, user_id: &str) -> Result<Url, ResourceError> {
        let mut url = self.base_url.join(endpoints::USERS)?;
        let id = utf8_percent_encode(user_id, PATH_SEGMENT);
        let path = format!("{}/{}", url.path().trim_end_matches('/'), id);
        url.set_path(&path);
        Ok(url)
    }

    async fn send(&self, request: RequestBuilder) -> Result<UserProfile, ResourceError> {
        let response = request.send().await?;
        let status = response.status();

        if status.is_success() {
            return Ok(response.json().await?);
        }

        let body = response.text().await.unwrap_or_default();
        let description = serde_json::from_str::<ManagementErrorResponse>(&body)
            .ok()
            .and_then(|e| e.message.or(e.error))
            .unwrap_or_else(|| {
                let snippet: String = body.chars().take(200).collect();
                format!("HTTP {}: {}", status, snippet)
            });

        Err(match status {
            StatusCode::UNAUTHORIZED => ResourceError::Unauthorized(description),
            StatusCode::TOO_MANY_REQUESTS => ResourceError::Transient(description),
            s if s.is_server_error() => ResourceError::Transient(description),
            s => ResourceError::Other {
                status: Some(s.as_u16()),
                description,
            },
        })
    }
}

/// Everything outside the RFC 3986 unreserved set
///
/// User IDs carry the connection prefix (`auth0|42`), which must not reach
/// the server raw.
const PATH_SEGMENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

#[async_trait::async_trait]
impl ResourceApiClient for HttpUsersClient {
    #[instrument(skip(self, access_token))]
    async fn get_profile(
        &self,
        user_id: &str,
        access_token: &str,
    ) -> Result<UserProfile, ResourceError> {
        debug!("Fetching user profile");
        let url = self.user_url(user_id)?;
        self.send(self.http.get(url).bearer_auth(access_token)).await
    }

    #[instrument(skip(self, access_token, patch))]
    async fn update_metadata(
        &self,
        user_id: &str,
        access_token: &str,
        patch: &Map<String, Value>,
    ) -> Result<UserProfile, ResourceError> {
        debug!(keys = patch.len(), "Updating user metadata");
        let url = self.user_url(user_id)?;
        let body = MetadataPatchRequest {
            user_metadata: patch,
        };
        self.send(self.http.patch(url).bearer_auth(access_token).json(&body))
            .await
    }
}
