use thiserror::Error;

/// Authentication error types
///
/// Produced by the authentication API client and the browser provider.
/// Cloneable so one refresh failure can be delivered to every waiting caller.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    #[error("User cancelled the authentication flow")]
    Cancelled,

    #[error("{description}")]
    Rejected { code: String, description: String },

    #[error("Network error: {0}")]
    Transient(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

impl AuthError {
    pub fn rejected(code: impl Into<String>, description: impl Into<String>) -> Self {
        Self::Rejected {
            code: code.into(),
            description: description.into(),
        }
    }

    /// Human-readable description suitable for a notification
    pub fn description(&self) -> String {
        match self {
            Self::Rejected { description, .. } => description.clone(),
            other => other.to_string(),
        }
    }

    /// Network or timeout failure; the same request may succeed later
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }

    /// The user dismissed the interactive flow
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

impl From<reqwest::Error> for AuthError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            Self::InvalidResponse(e.to_string())
        } else {
            Self::Transient(e.to_string())
        }
    }
}

impl From<url::ParseError> for AuthError {
    fn from(e: url::ParseError) -> Self {
        Self::InvalidResponse(format!("URL parse error: {}", e))
    }
}

/// Resource (Users API) error types
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResourceError {
    /// The resource server rejected the access token
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Network error: {0}")]
    Transient(String),

    #[error("{description}")]
    Other {
        status: Option<u16>,
        description: String,
    },
}

impl ResourceError {
    pub fn description(&self) -> String {
        match self {
            Self::Other { description, .. } => description.clone(),
            other => other.to_string(),
        }
    }
}

impl From<reqwest::Error> for ResourceError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            Self::Other {
                status: e.status().map(|s| s.as_u16()),
                description: format!("Invalid response: {}", e),
            }
        } else {
            Self::Transient(e.to_string())
        }
    }
}

impl From<url::ParseError> for ResourceError {
    fn from(e: url::ParseError) -> Self {
        Self::Other {
            status: None,
            description: format!("URL parse error: {}", e),
        }
    }
}
