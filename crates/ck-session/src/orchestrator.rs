use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use ck_auth::{
    AccountConfig, AuthApiClient, Credentials, LoginParams, ResourceApiClient, UserProfile,
    WebAuthParams, WebAuthProvider,
};
use ck_store::SecureStorage;
use serde_json::{Map, Value};
use tracing::{debug, info, instrument};

use crate::errors::SessionError;
use crate::manager::CredentialsManager;
use crate::request::Request;

/// High-level session operations for a UI layer
///
/// Every operation returns a [`Request`], so each can be awaited or started
/// with callbacks. Operations are independent; nothing is retried except the
/// token refresh inside [`CredentialsManager::credentials`].
#[derive(Clone)]
pub struct SessionOrchestrator {
    config: AccountConfig,
    auth: Arc<dyn AuthApiClient>,
    web_auth: Arc<dyn WebAuthProvider>,
    resources: Arc<dyn ResourceApiClient>,
    manager: CredentialsManager,
    persist: Arc<AtomicBool>,
}

impl SessionOrchestrator {
    pub fn new(
        config: AccountConfig,
        auth: Arc<dyn AuthApiClient>,
        web_auth: Arc<dyn WebAuthProvider>,
        resources: Arc<dyn ResourceApiClient>,
        storage: Arc<dyn SecureStorage>,
    ) -> Self {
        let manager = CredentialsManager::new(auth.clone(), storage, &config);
        Self {
            config,
            auth,
            web_auth,
            resources,
            manager,
            persist: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn manager(&self) -> &CredentialsManager {
        &self.manager
    }

    pub fn config(&self) -> &AccountConfig {
        &self.config
    }

    /// Whether the next successful login is saved to secure storage
    pub fn set_persist_credentials(&self, persist: bool) {
        self.persist.store(persist, Ordering::SeqCst);
    }

    pub fn persist_credentials(&self) -> bool {
        self.persist.load(Ordering::SeqCst)
    }

    /// Password login against the configured realm
    pub fn login(&self, email: &str, password: &str) -> Request<Credentials, SessionError> {
        let realm = self.config.realm.clone();
        self.login_with_params(email, password, &realm, LoginParams::default())
    }

    /// Password login against `realm`, with scope, audience or extra
    /// parameters from `params`
    pub fn login_with_params(
        &self,
        email: &str,
        password: &str,
        realm: &str,
        params: LoginParams,
    ) -> Request<Credentials, SessionError> {
        let this = self.clone();
        let email = email.to_string();
        let password = password.to_string();
        let realm = realm.to_string();

        Request::new(async move {
            let credentials = this
                .auth
                .login(&email, &password, &realm, &params)
                .await?;
            this.after_login(credentials).await
        })
    }

    pub fn web_login(&self) -> Request<Credentials, SessionError> {
        self.web_login_with(WebAuthParams::default())
    }

    pub fn web_login_with(&self, params: WebAuthParams) -> Request<Credentials, SessionError> {
        let this = self.clone();

        Request::new(async move {
            let credentials = this.web_auth.login(&params).await?;
            this.after_login(credentials).await
        })
    }

    /// End the provider's browser session
    ///
    /// The locally stored session is left alone; use
    /// [`clear_credentials`](Self::clear_credentials) for that.
    pub fn web_logout(&self) -> Request<(), SessionError> {
        let web_auth = self.web_auth.clone();

        Request::new(async move {
            web_auth.logout().await?;
            info!("Logged out of browser session");
            Ok(())
        })
    }

    pub fn credentials(&self) -> Request<Credentials, SessionError> {
        self.manager.credentials().map_err(SessionError::from)
    }

    pub async fn clear_credentials(&self) {
        self.manager.clear().await;
    }

    pub fn fetch_profile(&self) -> Request<UserProfile, SessionError> {
        let this = self.clone();

        Request::new(async move {
            let credentials = this.manager.credentials().await?;
            let profile = this
                .resources
                .get_profile(&credentials.user.id, &credentials.access_token)
                .await?;
            Ok(profile)
        })
    }

    /// Merge `patch` into the signed-in user's metadata
    pub fn update_metadata(&self, patch: Map<String, Value>) -> Request<UserProfile, SessionError> {
        let this = self.clone();

        Request::new(async move {
            let credentials = this.manager.credentials().await?;
            let profile = this
                .resources
                .update_metadata(&credentials.user.id, &credentials.access_token, &patch)
                .await?;
            Ok(profile)
        })
    }

    #[instrument(skip(self, credentials), fields(user = %credentials.user.id))]
    async fn after_login(&self, credentials: Credentials) -> Result<Credentials, SessionError> {
        info!("Logged in as {}", credentials.display_name());

        if self.persist_credentials() {
            self.manager.save(&credentials).await?;
        } else {
            debug!("Not persisting credentials");
        }

        Ok(credentials)
    }
}

impl std::fmt::Debug for SessionOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionOrchestrator")
            .field("domain", &self.config.domain)
            .field("persist", &self.persist_credentials())
            .finish_non_exhaustive()
    }
}

/// Metadata patch `{"random": n}` with `n` in `0..=100`
pub fn random_metadata_patch() -> Map<String, Value> {
    let n = getrandom::u32()
        .unwrap_or_else(|_| chrono::Utc::now().timestamp_subsec_nanos())
        % 101;

    let mut patch = Map::new();
    patch.insert("random".to_string(), Value::from(n));
    patch
}
