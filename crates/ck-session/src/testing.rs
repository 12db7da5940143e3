//! Collaborator doubles shared by the unit tests

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use ck_auth::{
    AccountConfig, AuthApiClient, AuthError, Credentials, LoginParams, ResourceApiClient,
    ResourceError, UserIdentity, UserProfile, WebAuthParams, WebAuthProvider,
};
use ck_store::{SecureStorage, StorageError};
use serde_json::{Map, Value};
use tokio::runtime::Handle;

use crate::request::{DeliveryContext, Request};

pub fn test_config() -> AccountConfig {
    AccountConfig::new("test-client", "tenant.example.com")
}

/// Credentials for `auth0|ada` expiring `expires_in` seconds from now
pub fn creds(access_token: &str, expires_in: i64, refresh_token: Option<&str>) -> Credentials {
    Credentials {
        access_token: access_token.to_string(),
        id_token: format!("id-{}", access_token),
        refresh_token: refresh_token.map(str::to_string),
        token_type: "Bearer".to_string(),
        expires_at: Utc::now() + chrono::Duration::seconds(expires_in),
        scope: "openid profile email offline_access".to_string(),
        user: UserIdentity {
            id: "auth0|ada".to_string(),
            name: "Ada".to_string(),
            email: Some("ada@example.com".to_string()),
            metadata: Map::new(),
        },
    }
}

/// Run `request` through the callback adapter and collect what was delivered
pub async fn via_callback<T, E>(request: Request<T, E>) -> Result<T, E>
where
    T: Send + 'static,
    E: Send + 'static,
{
    let (context, mut delivery) = DeliveryContext::new(Handle::current());
    let slot = Arc::new(Mutex::new(None));

    let on_success = slot.clone();
    let on_failure = slot.clone();
    let _task = request.start(
        &context,
        move |value| *on_success.lock().unwrap() = Some(Ok(value)),
        move |error| *on_failure.lock().unwrap() = Some(Err(error)),
    );
    drop(context);

    let mut delivered = 0;
    while delivery.run_next().await {
        delivered += 1;
    }
    assert_eq!(delivered, 1, "exactly one handler must run");

    let result = slot.lock().unwrap().take();
    result.expect("no result delivered")
}

/// Scripted token endpoint
pub struct MockAuth {
    login_result: Mutex<Result<Credentials, AuthError>>,
    refresh_result: Mutex<Result<Credentials, AuthError>>,
    refresh_delay: Option<Duration>,
    crash_next_refresh: AtomicBool,
    login_calls: AtomicUsize,
    refresh_calls: AtomicUsize,
    last_login_realm: Mutex<Option<String>>,
    last_refresh_token: Mutex<Option<String>>,
}

impl MockAuth {
    pub fn new() -> Self {
        Self {
            login_result: Mutex::new(Err(AuthError::Transient("login not scripted".to_string()))),
            refresh_result: Mutex::new(Err(AuthError::Transient(
                "refresh not scripted".to_string(),
            ))),
            refresh_delay: None,
            crash_next_refresh: AtomicBool::new(false),
            login_calls: AtomicUsize::new(0),
            refresh_calls: AtomicUsize::new(0),
            last_login_realm: Mutex::new(None),
            last_refresh_token: Mutex::new(None),
        }
    }

    /// Hold every refresh for `delay` before answering
    pub fn with_refresh_delay(mut self, delay: Duration) -> Self {
        self.refresh_delay = Some(delay);
        self
    }

    pub fn set_login(&self, result: Result<Credentials, AuthError>) {
        *self.login_result.lock().unwrap() = result;
    }

    /// Panic inside the next refresh call only
    pub fn crash_next_refresh(&self) {
        self.crash_next_refresh.store(true, Ordering::SeqCst);
    }

    pub fn set_refresh(&self, result: Result<Credentials, AuthError>) {
        *self.refresh_result.lock().unwrap() = result;
    }

    pub fn login_calls(&self) -> usize {
        self.login_calls.load(Ordering::SeqCst)
    }

    pub fn refresh_calls(&self) -> usize {
        self.refresh_calls.load(Ordering::SeqCst)
    }

    pub fn last_login_realm(&self) -> Option<String> {
        self.last_login_realm.lock().unwrap().clone()
    }

    pub fn last_refresh_token(&self) -> Option<String> {
        self.last_refresh_token.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl AuthApiClient for MockAuth {
    async fn login(
        &self,
        _username: &str,
        _password: &str,
        realm: &str,
        _params: &LoginParams,
    ) -> Result<Credentials, AuthError> {
        self.login_calls.fetch_add(1, Ordering::SeqCst);
        *self.last_login_realm.lock().unwrap() = Some(realm.to_string());
        self.login_result.lock().unwrap().clone()
    }

    async fn refresh(&self, refresh_token: &str) -> Result<Credentials, AuthError> {
        self.refresh_calls.fetch_add(1, Ordering::SeqCst);
        *self.last_refresh_token.lock().unwrap() = Some(refresh_token.to_string());
        if let Some(delay) = self.refresh_delay {
            tokio::time::sleep(delay).await;
        }
        if self.crash_next_refresh.swap(false, Ordering::SeqCst) {
            panic!("token endpoint double crashed");
        }
        self.refresh_result.lock().unwrap().clone()
    }

    async fn exchange_code(
        &self,
        _code: &str,
        _code_verifier: &str,
        _redirect_uri: &str,
    ) -> Result<Credentials, AuthError> {
        Err(AuthError::InvalidResponse("code exchange not scripted".to_string()))
    }
}

/// Scripted browser flow
pub struct MockWebAuth {
    login_result: Mutex<Result<Credentials, AuthError>>,
    logout_calls: AtomicUsize,
}

impl MockWebAuth {
    pub fn new() -> Self {
        Self {
            login_result: Mutex::new(Err(AuthError::Cancelled)),
            logout_calls: AtomicUsize::new(0),
        }
    }

    pub fn set_login(&self, result: Result<Credentials, AuthError>) {
        *self.login_result.lock().unwrap() = result;
    }

    pub fn logout_calls(&self) -> usize {
        self.logout_calls.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl WebAuthProvider for MockWebAuth {
    async fn login(&self, _params: &WebAuthParams) -> Result<Credentials, AuthError> {
        self.login_result.lock().unwrap().clone()
    }

    async fn logout(&self) -> Result<(), AuthError> {
        self.logout_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Users API holding one profile in memory
pub struct MockResource {
    metadata: Mutex<Map<String, Value>>,
    failure: Mutex<Option<ResourceError>>,
    calls: AtomicUsize,
    last_token: Mutex<Option<String>>,
}

impl MockResource {
    pub fn new() -> Self {
        Self {
            metadata: Mutex::new(Map::new()),
            failure: Mutex::new(None),
            calls: AtomicUsize::new(0),
            last_token: Mutex::new(None),
        }
    }

    /// Fail every later call with `error`
    pub fn fail_with(&self, error: ResourceError) {
        *self.failure.lock().unwrap() = Some(error);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_token(&self) -> Option<String> {
        self.last_token.lock().unwrap().clone()
    }

    fn record(&self, access_token: &str) -> Result<(), ResourceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_token.lock().unwrap() = Some(access_token.to_string());
        match self.failure.lock().unwrap().clone() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    fn profile(&self, user_id: &str) -> UserProfile {
        UserProfile {
            user_id: user_id.to_string(),
            name: Some("Ada".to_string()),
            email: Some("ada@example.com".to_string()),
            user_metadata: self.metadata.lock().unwrap().clone(),
            ..UserProfile::default()
        }
    }
}

#[async_trait::async_trait]
impl ResourceApiClient for MockResource {
    async fn get_profile(
        &self,
        user_id: &str,
        access_token: &str,
    ) -> Result<UserProfile, ResourceError> {
        self.record(access_token)?;
        Ok(self.profile(user_id))
    }

    async fn update_metadata(
        &self,
        user_id: &str,
        access_token: &str,
        patch: &Map<String, Value>,
    ) -> Result<UserProfile, ResourceError> {
        self.record(access_token)?;
        self.metadata
            .lock()
            .unwrap()
            .extend(patch.iter().map(|(k, v)| (k.clone(), v.clone())));
        Ok(self.profile(user_id))
    }
}

/// Storage that refuses every write
pub struct FailingStorage;

#[async_trait::async_trait]
impl SecureStorage for FailingStorage {
    async fn get(&self, _key: &str) -> ck_store::Result<Option<Vec<u8>>> {
        Ok(None)
    }

    async fn set(&self, _key: &str, _value: &[u8]) -> ck_store::Result<()> {
        Err(StorageError::WriteFailed("disk full".to_string()))
    }

    async fn delete(&self, _key: &str) -> ck_store::Result<()> {
        Ok(())
    }
}
