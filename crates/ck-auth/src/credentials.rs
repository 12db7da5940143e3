use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::errors::AuthError;

/// Token set issued by the identity provider for one authenticated session
///
/// Immutable once built: a refresh produces a new value through
/// [`Credentials::renewed`]. `expires_at` is absolute, so freshness checks
/// only compare against the clock.
#[derive(Clone, Serialize, Deserialize, PartialEq)]
pub struct Credentials {
    pub access_token: String,
    pub id_token: String,
    /// Present only when offline access was granted
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    pub token_type: String,
    pub expires_at: DateTime<Utc>,
    pub scope: String,
    pub user: UserIdentity,
}

impl Credentials {
    /// Build credentials from a token response, converting the relative
    /// `expires_in` into an absolute expiry
    ///
    /// Fails with [`AuthError::InvalidResponse`] when `expires_in` does not
    /// fit in a timestamp.
    pub fn new(
        access_token: String,
        id_token: String,
        refresh_token: Option<String>,
        token_type: String,
        expires_in: u64,
        scope: String,
        user: UserIdentity,
    ) -> Result<Self, AuthError> {
        let expires_at = i64::try_from(expires_in)
            .ok()
            .and_then(TimeDelta::try_seconds)
            .and_then(|lifetime| Utc::now().checked_add_signed(lifetime))
            .ok_or_else(|| {
                AuthError::InvalidResponse(format!("expires_in out of range: {}", expires_in))
            })?;

        Ok(Self {
            access_token,
            id_token,
            refresh_token,
            token_type,
            expires_at,
            scope,
            user,
        })
    }

    /// True when the access token expires within `skew` from now
    pub fn is_expired(&self, skew: Duration) -> bool {
        let skew = chrono::Duration::from_std(skew).unwrap_or(chrono::Duration::seconds(60));
        Utc::now() + skew >= self.expires_at
    }

    /// Merge a refresh result into a new credential set
    ///
    /// Providers may omit the refresh token, ID token or user claims from a
    /// refresh response; those are carried over from `self`.
    pub fn renewed(&self, fresh: Credentials) -> Credentials {
        let reissued_identity = !fresh.id_token.is_empty();
        Credentials {
            refresh_token: fresh.refresh_token.or_else(|| self.refresh_token.clone()),
            id_token: if reissued_identity {
                fresh.id_token
            } else {
                self.id_token.clone()
            },
            user: if reissued_identity && !fresh.user.id.is_empty() {
                fresh.user
            } else {
                self.user.clone()
            },
            scope: if fresh.scope.is_empty() {
                self.scope.clone()
            } else {
                fresh.scope
            },
            access_token: fresh.access_token,
            token_type: fresh.token_type,
            expires_at: fresh.expires_at,
        }
    }

    pub fn display_name(&self) -> &str {
        self.user.display_name()
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("access_token", &"[REDACTED]")
            .field("id_token", &"[REDACTED]")
            .field(
                "refresh_token",
                &self.refresh_token.as_ref().map(|_| "[REDACTED]"),
            )
            .field("token_type", &self.token_type)
            .field("expires_at", &self.expires_at)
            .field("scope", &self.scope)
            .field("user", &self.user)
            .finish()
    }
}

/// Identity of the signed-in user, taken from the ID token claims
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct UserIdentity {
    /// Subject identifier (`sub`), e.g. `auth0|5f7c8ec7c33c6c004bbafe82`
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    /// Remaining claims
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

impl UserIdentity {
    pub fn display_name(&self) -> &str {
        if !self.name.is_empty() {
            &self.name
        } else if let Some(email) = &self.email {
            email
        } else {
            &self.id
        }
    }
}
