use ck_auth::{AuthError, ResourceError};
use ck_store::StorageError;
use thiserror::Error;

/// Credentials manager error types
///
/// Cloneable: every caller attached to a shared refresh receives the same
/// error value.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CredentialsError {
    #[error("No credentials were previously set")]
    NoCredentials,

    #[error("Stored credentials could not be read: {0}")]
    CorruptStorage(String),

    #[error("Credentials expired and no refresh token is available to renew them")]
    ExpiredNoRefresh,

    #[error("Failed to renew credentials: {description}")]
    RefreshFailed { retryable: bool, description: String },

    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl CredentialsError {
    /// A later attempt may succeed without signing in again
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::RefreshFailed { retryable, .. } => *retryable,
            Self::Storage(_) => true,
            _ => false,
        }
    }
}

/// Coarse error classification for rendering
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Cancelled,
    Rejected,
    Transient,
    InvalidResponse,
    NoCredentials,
    CorruptStorage,
    ExpiredNoRefresh,
    RefreshRetryable,
    RefreshTerminal,
    Storage,
    Unauthorized,
    ResourceFailed,
}

/// Error of any session operation, as surfaced to the UI layer
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error(transparent)]
    Credentials(#[from] CredentialsError),

    #[error(transparent)]
    Resource(#[from] ResourceError),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl SessionError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Auth(AuthError::Cancelled) => ErrorKind::Cancelled,
            Self::Auth(AuthError::Rejected { .. }) => ErrorKind::Rejected,
            Self::Auth(AuthError::Transient(_)) => ErrorKind::Transient,
            Self::Auth(AuthError::InvalidResponse(_)) => ErrorKind::InvalidResponse,
            Self::Credentials(CredentialsError::NoCredentials) => ErrorKind::NoCredentials,
            Self::Credentials(CredentialsError::CorruptStorage(_)) => ErrorKind::CorruptStorage,
            Self::Credentials(CredentialsError::ExpiredNoRefresh) => ErrorKind::ExpiredNoRefresh,
            Self::Credentials(CredentialsError::RefreshFailed { retryable: true, .. }) => {
                ErrorKind::RefreshRetryable
            }
            Self::Credentials(CredentialsError::RefreshFailed { retryable: false, .. }) => {
                ErrorKind::RefreshTerminal
            }
            Self::Credentials(CredentialsError::Storage(_)) | Self::Storage(_) => {
                ErrorKind::Storage
            }
            Self::Resource(ResourceError::Unauthorized(_)) => ErrorKind::Unauthorized,
            Self::Resource(ResourceError::Transient(_)) => ErrorKind::Transient,
            Self::Resource(ResourceError::Other { .. }) => ErrorKind::ResourceFailed,
        }
    }

    /// Short message for a user-facing notification
    pub fn user_message(&self) -> String {
        match self {
            Self::Auth(AuthError::Cancelled) => "Browser was closed".to_string(),
            Self::Auth(e) => e.description(),
            Self::Resource(e) => e.description(),
            Self::Credentials(e) => e.to_string(),
            Self::Storage(e) => e.to_string(),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.kind() == ErrorKind::Cancelled
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancelled_renders_distinctly() {
        let err = SessionError::from(AuthError::Cancelled);

        assert!(err.is_cancelled());
        assert_eq!(err.user_message(), "Browser was closed");
    }

    #[test]
    fn test_rejected_uses_server_description() {
        let err = SessionError::from(AuthError::rejected(
            "invalid_grant",
            "Wrong email or password.",
        ));

        assert_eq!(err.kind(), ErrorKind::Rejected);
        assert_eq!(err.user_message(), "Wrong email or password.");
    }

    #[test]
    fn test_refresh_failures_are_classified() {
        let retryable = SessionError::from(CredentialsError::RefreshFailed {
            retryable: true,
            description: "timeout".to_string(),
        });
        let terminal = SessionError::from(CredentialsError::RefreshFailed {
            retryable: false,
            description: "revoked".to_string(),
        });

        assert_eq!(retryable.kind(), ErrorKind::RefreshRetryable);
        assert_eq!(terminal.kind(), ErrorKind::RefreshTerminal);
    }

    #[test]
    fn test_unauthorized_resource_error() {
        let err = SessionError::from(ResourceError::Unauthorized("Invalid token".to_string()));

        assert_eq!(err.kind(), ErrorKind::Unauthorized);
    }
}
