use std::sync::Arc;
use std::time::Duration;

use ck_auth::{AccountConfig, AuthApiClient, AuthError, Credentials};
use ck_store::{SecureStorage, StorageError};
use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

use crate::errors::CredentialsError;
use crate::request::Request;

type SharedRefresh = Shared<BoxFuture<'static, Result<Credentials, CredentialsError>>>;

/// Owns the stored session and keeps it fresh
///
/// Cloning is cheap; clones share storage, the refresh in flight and the
/// lock that orders `save`, `clear` and the decision step of `credentials`.
#[derive(Clone)]
pub struct CredentialsManager {
    inner: Arc<Inner>,
}

struct Inner {
    storage: Arc<dyn SecureStorage>,
    auth: Arc<dyn AuthApiClient>,
    storage_key: String,
    skew: Duration,
    state: Mutex<State>,
}

#[derive(Default)]
struct State {
    /// Bumped by every `save` and `clear`; a refresh started under an older
    /// epoch must not write
    epoch: u64,
    in_flight: Option<SharedRefresh>,
}

impl CredentialsManager {
    pub fn new(
        auth: Arc<dyn AuthApiClient>,
        storage: Arc<dyn SecureStorage>,
        config: &AccountConfig,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                storage,
                auth,
                storage_key: config.storage_key.clone(),
                skew: config.expiry_skew,
                state: Mutex::new(State::default()),
            }),
        }
    }

    /// Persist `credentials`, replacing any stored session
    #[instrument(skip(self, credentials), fields(user = %credentials.user.id))]
    pub async fn save(&self, credentials: &Credentials) -> Result<(), StorageError> {
        let bytes = serde_json::to_vec(credentials)
            .map_err(|e| StorageError::SerializationFailed(e.to_string()))?;

        let mut state = self.inner.state.lock().await;
        self.inner.storage.set(&self.inner.storage_key, &bytes).await?;
        state.epoch += 1;
        state.in_flight = None;

        info!("Saved credentials");
        Ok(())
    }

    /// Remove the stored session
    ///
    /// Idempotent. Backend failures are logged and otherwise ignored.
    #[instrument(skip(self))]
    pub async fn clear(&self) {
        let mut state = self.inner.state.lock().await;
        if let Err(e) = self.inner.storage.delete(&self.inner.storage_key).await {
            warn!("Failed to delete stored credentials: {}", e);
        }
        state.epoch += 1;
        state.in_flight = None;

        info!("Cleared credentials");
    }

    /// Stored credentials, renewed first when they are about to expire
    ///
    /// Callers that need a refresh while one is already running attach to it
    /// and observe the same outcome.
    pub fn credentials(&self) -> Request<Credentials, CredentialsError> {
        let inner = self.inner.clone();
        Request::new(async move { inner.credentials().await })
    }

    /// Whether a session is stored that is fresh or can be renewed
    ///
    /// Never touches the network.
    pub async fn has_valid_credentials(&self) -> bool {
        let _state = self.inner.state.lock().await;
        match self.inner.load().await {
            Ok(stored) => !stored.is_expired(self.inner.skew) || stored.refresh_token.is_some(),
            Err(_) => false,
        }
    }
}

impl std::fmt::Debug for CredentialsManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialsManager")
            .field("storage_key", &self.inner.storage_key)
            .field("skew", &self.inner.skew)
            .finish_non_exhaustive()
    }
}

impl Inner {
    async fn credentials(self: Arc<Self>) -> Result<Credentials, CredentialsError> {
        let refresh = {
            let mut state = self.state.lock().await;

            if let Some(in_flight) = state.in_flight.clone() {
                debug!("Joining refresh in flight");
                in_flight
            } else {
                let stored = self.load().await?;
                if !stored.is_expired(self.skew) {
                    return Ok(stored);
                }

                let Some(refresh_token) = stored.refresh_token.clone() else {
                    return Err(CredentialsError::ExpiredNoRefresh);
                };

                let refresh = self.clone().spawn_refresh(state.epoch, stored, refresh_token);
                state.in_flight = Some(refresh.clone());
                refresh
            }
        };

        refresh.await
    }

    /// Run the refresh on its own task so it outlives any single caller
    fn spawn_refresh(
        self: Arc<Self>,
        epoch: u64,
        stored: Credentials,
        refresh_token: String,
    ) -> SharedRefresh {
        let owner = Arc::downgrade(&self);
        let task = tokio::spawn(self.refresh(epoch, stored, refresh_token));

        async move {
            match task.await {
                Ok(result) => result,
                Err(e) => {
                    warn!("Refresh task failed: {}", e);
                    if let Some(owner) = owner.upgrade() {
                        let mut state = owner.state.lock().await;
                        if state.epoch == epoch {
                            state.in_flight = None;
                        }
                    }
                    Err(CredentialsError::RefreshFailed {
                        retryable: true,
                        description: e.to_string(),
                    })
                }
            }
        }
        .boxed()
        .shared()
    }

    #[instrument(skip(self, stored, refresh_token))]
    async fn refresh(
        self: Arc<Self>,
        epoch: u64,
        stored: Credentials,
        refresh_token: String,
    ) -> Result<Credentials, CredentialsError> {
        info!("Renewing expired credentials");
        let outcome = self.auth.refresh(&refresh_token).await;

        let mut state = self.state.lock().await;
        let current = state.epoch == epoch;
        if current {
            state.in_flight = None;
        } else {
            debug!("Session changed during refresh, not writing result");
        }

        match outcome {
            Ok(fresh) => {
                let renewed = stored.renewed(fresh);
                if current {
                    let bytes = serde_json::to_vec(&renewed)
                        .map_err(|e| StorageError::SerializationFailed(e.to_string()))?;
                    self.storage.set(&self.storage_key, &bytes).await?;
                    info!("Credentials renewed");
                }
                Ok(renewed)
            }
            Err(e @ AuthError::Rejected { .. }) => {
                warn!("Refresh token rejected: {}", e);
                if current {
                    if let Err(e) = self.storage.delete(&self.storage_key).await {
                        warn!("Failed to delete stored credentials: {}", e);
                    }
                    state.epoch += 1;
                }
                Err(CredentialsError::RefreshFailed {
                    retryable: false,
                    description: e.description(),
                })
            }
            Err(e) => {
                warn!("Refresh failed: {}", e);
                Err(CredentialsError::RefreshFailed {
                    retryable: true,
                    description: e.description(),
                })
            }
        }
    }

    async fn load(&self) -> Result<Credentials, CredentialsError> {
        let bytes = match self.storage.get(&self.storage_key).await {
            Ok(Some(bytes)) => bytes,
            Ok(None) => return Err(CredentialsError::NoCredentials),
            Err(StorageError::Corrupted) => {
                return Err(CredentialsError::CorruptStorage(
                    StorageError::Corrupted.to_string(),
                ));
            }
            Err(e) => return Err(CredentialsError::Storage(e)),
        };

        serde_json::from_slice(&bytes).map_err(|e| CredentialsError::CorruptStorage(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MockAuth, creds, test_config, via_callback};
    use ck_store::MemoryStorage;

    fn manager(auth: &Arc<MockAuth>, storage: &Arc<MemoryStorage>) -> CredentialsManager {
        CredentialsManager::new(auth.clone(), storage.clone(), &test_config())
    }

    async fn stored(storage: &MemoryStorage) -> Option<Credentials> {
        storage
            .get("credentials")
            .await
            .unwrap()
            .map(|bytes| serde_json::from_slice(&bytes).unwrap())
    }

    /// Yield until the mock has seen `count` refresh calls
    async fn wait_for_refresh(auth: &MockAuth, count: usize) {
        while auth.refresh_calls() < count {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn test_clear_is_idempotent() {
        let auth = Arc::new(MockAuth::new());
        let storage = Arc::new(MemoryStorage::new());
        let manager = manager(&auth, &storage);

        manager.clear().await;
        manager.clear().await;
        assert_eq!(manager.credentials().await, Err(CredentialsError::NoCredentials));

        manager.save(&creds("a1", 3600, Some("r1"))).await.unwrap();
        manager.clear().await;
        manager.clear().await;
        assert_eq!(manager.credentials().await, Err(CredentialsError::NoCredentials));
    }

    #[tokio::test]
    async fn test_save_then_get_round_trips() {
        let auth = Arc::new(MockAuth::new());
        let storage = Arc::new(MemoryStorage::new());
        let manager = manager(&auth, &storage);
        let saved = creds("a1", 3600, Some("r1"));

        manager.save(&saved).await.unwrap();

        assert_eq!(manager.credentials().await, Ok(saved));
        assert_eq!(auth.refresh_calls(), 0);
    }

    #[tokio::test]
    async fn test_fresh_credentials_skip_network() {
        let auth = Arc::new(MockAuth::new());
        let storage = Arc::new(MemoryStorage::new());
        let manager = manager(&auth, &storage);
        manager.save(&creds("a1", 600, Some("r1"))).await.unwrap();

        for _ in 0..3 {
            let credentials = manager.credentials().await.unwrap();
            assert_eq!(credentials.access_token, "a1");
        }
        assert_eq!(auth.refresh_calls(), 0);
    }

    #[tokio::test]
    async fn test_inside_skew_margin_counts_as_expired() {
        let auth = Arc::new(MockAuth::new());
        auth.set_refresh(Ok(creds("a2", 3600, None)));
        let storage = Arc::new(MemoryStorage::new());
        let manager = manager(&auth, &storage);
        manager.save(&creds("a1", 30, Some("r1"))).await.unwrap();

        let credentials = manager.credentials().await.unwrap();

        assert_eq!(credentials.access_token, "a2");
        assert_eq!(auth.refresh_calls(), 1);
    }

    #[tokio::test]
    async fn test_expired_credentials_are_refreshed_and_persisted() {
        let auth = Arc::new(MockAuth::new());
        auth.set_refresh(Ok(creds("a2", 3600, None)));
        let storage = Arc::new(MemoryStorage::new());
        let manager = manager(&auth, &storage);
        manager.save(&creds("a1", -10, Some("r1"))).await.unwrap();

        let credentials = manager.credentials().await.unwrap();

        assert_eq!(credentials.access_token, "a2");
        assert_eq!(credentials.refresh_token.as_deref(), Some("r1"));
        assert_eq!(auth.refresh_calls(), 1);
        assert_eq!(stored(&storage).await, Some(credentials.clone()));

        assert_eq!(manager.credentials().await, Ok(credentials));
        assert_eq!(auth.refresh_calls(), 1);
    }

    #[tokio::test]
    async fn test_rotated_refresh_token_is_kept() {
        let auth = Arc::new(MockAuth::new());
        auth.set_refresh(Ok(creds("a2", 3600, Some("r2"))));
        let storage = Arc::new(MemoryStorage::new());
        let manager = manager(&auth, &storage);
        manager.save(&creds("a1", -10, Some("r1"))).await.unwrap();

        let credentials = manager.credentials().await.unwrap();

        assert_eq!(credentials.refresh_token.as_deref(), Some("r2"));
        assert_eq!(auth.last_refresh_token().as_deref(), Some("r1"));
    }

    #[tokio::test]
    async fn test_expired_without_refresh_token() {
        let auth = Arc::new(MockAuth::new());
        let storage = Arc::new(MemoryStorage::new());
        let manager = manager(&auth, &storage);
        manager.save(&creds("a1", -10, None)).await.unwrap();

        assert_eq!(manager.credentials().await, Err(CredentialsError::ExpiredNoRefresh));
        assert_eq!(auth.refresh_calls(), 0);
        assert!(!manager.has_valid_credentials().await);
    }

    #[tokio::test]
    async fn test_undecodable_entry_is_corrupt() {
        let auth = Arc::new(MockAuth::new());
        let storage = Arc::new(MemoryStorage::new());
        storage.set("credentials", b"not json").await.unwrap();
        let manager = manager(&auth, &storage);

        let result = manager.credentials().await;

        assert!(matches!(result, Err(CredentialsError::CorruptStorage(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_callers_share_one_refresh() {
        let auth = Arc::new(MockAuth::new().with_refresh_delay(Duration::from_millis(50)));
        auth.set_refresh(Ok(creds("a2", 3600, None)));
        let storage = Arc::new(MemoryStorage::new());
        let manager = manager(&auth, &storage);
        manager.save(&creds("a1", -10, Some("r1"))).await.unwrap();

        let callers = (0..8).map(|_| manager.credentials().into_future());
        let results = futures::future::join_all(callers).await;

        assert_eq!(auth.refresh_calls(), 1);
        for result in &results {
            assert_eq!(result.as_ref().unwrap().access_token, "a2");
        }
        assert!(results.windows(2).all(|pair| pair[0] == pair[1]));
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_callers_share_one_failure() {
        let auth = Arc::new(MockAuth::new().with_refresh_delay(Duration::from_millis(50)));
        auth.set_refresh(Err(AuthError::Transient("connection reset".to_string())));
        let storage = Arc::new(MemoryStorage::new());
        let manager = manager(&auth, &storage);
        manager.save(&creds("a1", -10, Some("r1"))).await.unwrap();

        let callers = (0..5).map(|_| manager.credentials().into_future());
        let results = futures::future::join_all(callers).await;

        assert_eq!(auth.refresh_calls(), 1);
        for result in results {
            let err = result.unwrap_err();
            assert!(err.is_retryable());
            assert!(matches!(err, CredentialsError::RefreshFailed { retryable: true, .. }));
        }

        // Transient failures keep the session for a later attempt
        assert!(stored(&storage).await.is_some());
    }

    #[tokio::test]
    async fn test_rejected_refresh_clears_session() {
        let auth = Arc::new(MockAuth::new());
        auth.set_refresh(Err(AuthError::rejected(
            "invalid_grant",
            "Unknown or invalid refresh token.",
        )));
        let storage = Arc::new(MemoryStorage::new());
        let manager = manager(&auth, &storage);
        manager.save(&creds("a1", -10, Some("r1"))).await.unwrap();

        let err = manager.credentials().await.unwrap_err();

        assert_eq!(
            err,
            CredentialsError::RefreshFailed {
                retryable: false,
                description: "Unknown or invalid refresh token.".to_string(),
            }
        );
        assert_eq!(manager.credentials().await, Err(CredentialsError::NoCredentials));
        assert!(stored(&storage).await.is_none());
    }

    #[tokio::test]
    async fn test_refresh_error_classification() {
        let cases = [
            (AuthError::Cancelled, true),
            (AuthError::Transient("connection reset".to_string()), true),
            (AuthError::InvalidResponse("missing access_token".to_string()), true),
            (AuthError::rejected("invalid_grant", "revoked"), false),
        ];

        for (error, retryable) in cases {
            let auth = Arc::new(MockAuth::new());
            auth.set_refresh(Err(error.clone()));
            let storage = Arc::new(MemoryStorage::new());
            let manager = manager(&auth, &storage);
            manager.save(&creds("a1", -10, Some("r1"))).await.unwrap();

            let err = manager.credentials().await.unwrap_err();

            assert_eq!(
                err,
                CredentialsError::RefreshFailed {
                    retryable,
                    description: error.description(),
                },
                "{:?}",
                error
            );
            assert_eq!(stored(&storage).await.is_some(), retryable, "{:?}", error);
        }
    }

    #[tokio::test]
    async fn test_invalid_id_token_keeps_session() {
        let auth = Arc::new(MockAuth::new());
        auth.set_refresh(Err(AuthError::InvalidResponse(
            "Expiration Time (exp) claim is in the past".to_string(),
        )));
        let storage = Arc::new(MemoryStorage::new());
        let manager = manager(&auth, &storage);
        let saved = creds("a1", -10, Some("r1"));
        manager.save(&saved).await.unwrap();

        let err = manager.credentials().await.unwrap_err();

        assert!(err.is_retryable());
        assert_eq!(stored(&storage).await, Some(saved));
        assert!(manager.has_valid_credentials().await);

        auth.set_refresh(Ok(creds("a2", 3600, None)));
        assert_eq!(manager.credentials().await.unwrap().access_token, "a2");
        assert_eq!(auth.refresh_calls(), 2);
    }

    #[tokio::test]
    async fn test_crashed_refresh_is_retried() {
        let auth = Arc::new(MockAuth::new());
        auth.crash_next_refresh();
        auth.set_refresh(Ok(creds("a2", 3600, None)));
        let storage = Arc::new(MemoryStorage::new());
        let manager = manager(&auth, &storage);
        manager.save(&creds("a1", -10, Some("r1"))).await.unwrap();

        let first = manager.credentials().await.unwrap_err();
        assert!(matches!(first, CredentialsError::RefreshFailed { retryable: true, .. }));
        assert!(stored(&storage).await.is_some());

        let second = manager.credentials().await.unwrap();

        assert_eq!(second.access_token, "a2");
        assert_eq!(auth.refresh_calls(), 2);
        assert_eq!(stored(&storage).await, Some(second));
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropping_one_caller_keeps_refresh_running() {
        let auth = Arc::new(MockAuth::new().with_refresh_delay(Duration::from_millis(50)));
        auth.set_refresh(Ok(creds("a2", 3600, None)));
        let storage = Arc::new(MemoryStorage::new());
        let manager = manager(&auth, &storage);
        manager.save(&creds("a1", -10, Some("r1"))).await.unwrap();

        let first = tokio::spawn(manager.credentials().into_future());
        let second = tokio::spawn(manager.credentials().into_future());
        wait_for_refresh(&auth, 1).await;
        first.abort();

        let credentials = second.await.unwrap().unwrap();

        assert_eq!(credentials.access_token, "a2");
        assert_eq!(auth.refresh_calls(), 1);
        assert_eq!(stored(&storage).await, Some(credentials));
    }

    #[tokio::test(start_paused = true)]
    async fn test_refresh_completes_without_waiters() {
        let auth = Arc::new(MockAuth::new().with_refresh_delay(Duration::from_millis(50)));
        auth.set_refresh(Ok(creds("a2", 3600, None)));
        let storage = Arc::new(MemoryStorage::new());
        let manager = manager(&auth, &storage);
        manager.save(&creds("a1", -10, Some("r1"))).await.unwrap();

        let only = tokio::spawn(manager.credentials().into_future());
        wait_for_refresh(&auth, 1).await;
        only.abort();

        let credentials = manager.credentials().await.unwrap();

        assert_eq!(credentials.access_token, "a2");
        assert_eq!(auth.refresh_calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_clear_during_refresh_is_not_overwritten() {
        let auth = Arc::new(MockAuth::new().with_refresh_delay(Duration::from_millis(50)));
        auth.set_refresh(Ok(creds("a2", 3600, None)));
        let storage = Arc::new(MemoryStorage::new());
        let manager = manager(&auth, &storage);
        manager.save(&creds("a1", -10, Some("r1"))).await.unwrap();

        let pending = tokio::spawn(manager.credentials().into_future());
        wait_for_refresh(&auth, 1).await;
        manager.clear().await;

        let credentials = pending.await.unwrap().unwrap();

        assert_eq!(credentials.access_token, "a2");
        assert!(stored(&storage).await.is_none());
        assert_eq!(manager.credentials().await, Err(CredentialsError::NoCredentials));
    }

    #[tokio::test(start_paused = true)]
    async fn test_save_during_refresh_wins() {
        let auth = Arc::new(MockAuth::new().with_refresh_delay(Duration::from_millis(50)));
        auth.set_refresh(Ok(creds("a2", 3600, None)));
        let storage = Arc::new(MemoryStorage::new());
        let manager = manager(&auth, &storage);
        manager.save(&creds("a1", -10, Some("r1"))).await.unwrap();

        let pending = tokio::spawn(manager.credentials().into_future());
        wait_for_refresh(&auth, 1).await;
        let relogin = creds("b1", 3600, Some("rb"));
        manager.save(&relogin).await.unwrap();
        pending.await.unwrap().unwrap();

        assert_eq!(stored(&storage).await, Some(relogin));
    }

    #[tokio::test]
    async fn test_has_valid_credentials() {
        let auth = Arc::new(MockAuth::new());
        let storage = Arc::new(MemoryStorage::new());
        let manager = manager(&auth, &storage);
        assert!(!manager.has_valid_credentials().await);

        manager.save(&creds("a1", 3600, None)).await.unwrap();
        assert!(manager.has_valid_credentials().await);

        manager.save(&creds("a1", -10, Some("r1"))).await.unwrap();
        assert!(manager.has_valid_credentials().await);
        assert_eq!(auth.refresh_calls(), 0);
    }

    #[tokio::test]
    async fn test_callback_matches_await() {
        let auth = Arc::new(MockAuth::new());
        auth.set_refresh(Err(AuthError::rejected("invalid_grant", "revoked")));
        let storage = Arc::new(MemoryStorage::new());
        let manager = manager(&auth, &storage);

        assert_eq!(via_callback(manager.credentials()).await, manager.credentials().await);

        manager.save(&creds("a1", 3600, Some("r1"))).await.unwrap();
        assert_eq!(via_callback(manager.credentials()).await, manager.credentials().await);
    }
}
