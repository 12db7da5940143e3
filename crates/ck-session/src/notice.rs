use std::fmt;

use ck_auth::{Credentials, UserProfile};
use serde_json::{Map, Value};

use crate::errors::SessionError;

/// Outcome of a session operation, ready to show to the user
#[derive(Debug, Clone, PartialEq)]
pub enum Notice {
    LoggedIn { name: String },
    LoggedOut,
    Cleared,
    GotCredentials { name: String },
    GotProfile { name: String },
    UpdatedMetadata { name: String, metadata: Map<String, Value> },
    Failed(SessionError),
}

impl Notice {
    pub fn logged_in(credentials: &Credentials) -> Self {
        Self::LoggedIn {
            name: credentials.display_name().to_string(),
        }
    }

    pub fn got_credentials(credentials: &Credentials) -> Self {
        Self::GotCredentials {
            name: credentials.display_name().to_string(),
        }
    }

    pub fn got_profile(profile: &UserProfile) -> Self {
        Self::GotProfile {
            name: profile.display_name().to_string(),
        }
    }

    pub fn updated_metadata(profile: &UserProfile) -> Self {
        Self::UpdatedMetadata {
            name: profile.display_name().to_string(),
            metadata: profile.user_metadata.clone(),
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failed(_))
    }
}

impl From<SessionError> for Notice {
    fn from(e: SessionError) -> Self {
        Self::Failed(e)
    }
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::LoggedIn { name } => write!(f, "Hello {}", name),
            Self::LoggedOut => f.write_str("Logged out"),
            Self::Cleared => f.write_str("Cleared stored credentials"),
            Self::GotCredentials { name } => write!(f, "Got credentials for {}", name),
            Self::GotProfile { name } => write!(f, "Got profile for {}", name),
            Self::UpdatedMetadata { name, metadata } => {
                write!(f, "Updated metadata for {} to {}", name, Value::Object(metadata.clone()))
            }
            Self::Failed(e) => f.write_str(&e.user_message()),
        }
    }
}
