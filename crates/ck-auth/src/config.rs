use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::errors::AuthError;

/// Identity provider endpoint paths, relative to the tenant base URL
pub mod endpoints {
    pub const TOKEN: &str = "oauth/token";
    pub const AUTHORIZE: &str = "authorize";
    pub const LOGOUT: &str = "v2/logout";
    pub const USERS: &str = "api/v2/users";
    pub const MANAGEMENT_AUDIENCE: &str = "api/v2/";
}

/// OAuth2 grant types
pub mod grant_types {
    pub const PASSWORD_REALM: &str = "http://auth0.com/oauth/grant-type/password-realm";
    pub const REFRESH_TOKEN: &str = "refresh_token";
    pub const AUTHORIZATION_CODE: &str = "authorization_code";
}

/// Scope requested when none is configured
///
/// `offline_access` asks for a refresh token.
pub const DEFAULT_SCOPE: &str =
    "openid profile email read:current_user update:current_user_metadata offline_access";

/// Database connection used for direct login
pub const DEFAULT_REALM: &str = "Username-Password-Authentication";

/// Fixed secure storage key of the stored session
pub const DEFAULT_STORAGE_KEY: &str = "credentials";

/// Time skew for token expiration (refresh 1 minute early)
pub const TOKEN_EXPIRY_SKEW: Duration = Duration::from_secs(60);

/// HTTP client configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HttpTimeouts {
    #[serde(with = "duration_secs", rename = "connect_secs")]
    pub connect: Duration,
    #[serde(with = "duration_secs", rename = "request_secs")]
    pub request: Duration,
}

impl Default for HttpTimeouts {
    fn default() -> Self {
        Self {
            connect: Duration::from_secs(15),
            request: Duration::from_secs(30),
        }
    }
}

/// Account configuration, constructed once at startup and shared by the
/// clients, the browser provider and the credentials manager
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountConfig {
    /// OAuth client ID of the application
    pub client_id: String,

    /// Tenant domain (`tenant.auth0.com`) or full base URL
    pub domain: String,

    /// URL scheme of the browser callback
    #[serde(default = "default_scheme")]
    pub scheme: String,

    /// API audience; defaults to the tenant's management API
    #[serde(default)]
    pub audience: Option<String>,

    #[serde(default = "default_scope")]
    pub scope: String,

    #[serde(default = "default_realm")]
    pub realm: String,

    #[serde(default = "default_storage_key")]
    pub storage_key: String,

    /// Credentials expiring within this margin are treated as expired
    #[serde(default = "default_expiry_skew", rename = "expiry_skew_secs")]
    #[serde(with = "duration_secs")]
    pub expiry_skew: Duration,

    #[serde(default)]
    pub http_timeouts: HttpTimeouts,

    /// Custom user agent (optional)
    #[serde(default)]
    pub user_agent: Option<String>,
}

impl AccountConfig {
    pub fn new(client_id: impl Into<String>, domain: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            domain: domain.into(),
            scheme: default_scheme(),
            audience: None,
            scope: default_scope(),
            realm: default_realm(),
            storage_key: default_storage_key(),
            expiry_skew: default_expiry_skew(),
            http_timeouts: HttpTimeouts::default(),
            user_agent: Some("credkeep".to_string()),
        }
    }

    /// Tenant base URL, always ending in `/`
    pub fn base_url(&self) -> Result<Url, AuthError> {
        let domain = self.domain.trim_end_matches('/');
        let url = if domain.contains("://") {
            Url::parse(&format!("{}/", domain))?
        } else {
            Url::parse(&format!("https://{}/", domain))?
        };
        Ok(url)
    }

    /// Expected `iss` claim of ID tokens
    pub fn issuer(&self) -> Result<String, AuthError> {
        Ok(self.base_url()?.to_string())
    }

    pub fn audience(&self) -> Result<String, AuthError> {
        match &self.audience {
            Some(audience) => Ok(audience.clone()),
            None => Ok(self.base_url()?.join(endpoints::MANAGEMENT_AUDIENCE)?.to_string()),
        }
    }

    /// Browser callback URL, `{scheme}://{host}/callback`
    pub fn redirect_uri(&self) -> Result<Url, AuthError> {
        let base = self.base_url()?;
        let host = base
            .host_str()
            .ok_or_else(|| AuthError::InvalidResponse("domain has no host".to_string()))?;
        let authority = match base.port() {
            Some(port) => format!("{}:{}", host, port),
            None => host.to_string(),
        };
        Ok(Url::parse(&format!("{}://{}/callback", self.scheme, authority))?)
    }

    pub fn user_agent(&self) -> &str {
        self.user_agent.as_deref().unwrap_or("credkeep")
    }
}

fn default_scheme() -> String {
    "https".to_string()
}

fn default_scope() -> String {
    DEFAULT_SCOPE.to_string()
}

fn default_realm() -> String {
    DEFAULT_REALM.to_string()
}

fn default_storage_key() -> String {
    DEFAULT_STORAGE_KEY.to_string()
}

fn default_expiry_skew() -> Duration {
    TOKEN_EXPIRY_SKEW
}

mod duration_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bare_domain_uses_https() {
        let config = AccountConfig::new("client", "tenant.auth0.com");

        assert_eq!(config.base_url().unwrap().as_str(), "https://tenant.auth0.com/");
        assert_eq!(config.issuer().unwrap(), "https://tenant.auth0.com/");
        assert_eq!(config.audience().unwrap(), "https://tenant.auth0.com/api/v2/");
    }

    #[test]
    fn test_full_url_domain_is_kept() {
        let config = AccountConfig::new("client", "http://127.0.0.1:8080/");

        assert_eq!(config.base_url().unwrap().as_str(), "http://127.0.0.1:8080/");
    }

    #[test]
    fn test_redirect_uri_uses_scheme() {
        let mut config = AccountConfig::new("client", "tenant.auth0.com");
        config.scheme = "demo".to_string();

        assert_eq!(
            config.redirect_uri().unwrap().as_str(),
            "demo://tenant.auth0.com/callback"
        );
    }

    #[test]
    fn test_explicit_audience_wins() {
        let mut config = AccountConfig::new("client", "tenant.auth0.com");
        config.audience = Some("https://api.example.com".to_string());

        assert_eq!(config.audience().unwrap(), "https://api.example.com");
    }

    #[test]
    fn test_deserialize_applies_defaults() {
        let config: AccountConfig =
            serde_json::from_str(r#"{"client_id":"abc","domain":"tenant.auth0.com"}"#).unwrap();

        assert_eq!(config.scope, DEFAULT_SCOPE);
        assert_eq!(config.realm, DEFAULT_REALM);
        assert_eq!(config.storage_key, DEFAULT_STORAGE_KEY);
        assert_eq!(config.expiry_skew, TOKEN_EXPIRY_SKEW);
        assert_eq!(config.http_timeouts, HttpTimeouts::default());
    }
}
