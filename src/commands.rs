use std::sync::{Arc, Mutex};

use anyhow::Context;
use ck_auth::{
    AccountConfig, AuthApiClient, BrowserAuthProvider, HttpAuthClient, HttpUsersClient,
    ResourceApiClient, WebAuthProvider,
};
use ck_session::{
    DeliveryContext, Notice, Request, SessionError, SessionOrchestrator, random_metadata_patch,
};
use ck_store::{EncryptedFileStorage, EnvSecretProvider, KeyringStorage, SecureStorage};
use serde_json::{Map, Value};
use tokio::runtime::Handle;
use tracing::{debug, instrument};

use crate::cli::{Commands, StorageKind};
use crate::console::ConsoleUserAgent;

/// Keyring service and storage namespace
const SERVICE: &str = "credkeep";
const PASSPHRASE_VAR: &str = "CREDKEEP_PASSPHRASE";

pub struct CommandExecutor {
    session: SessionOrchestrator,
    callback: bool,
}

impl CommandExecutor {
    pub async fn new(
        config: AccountConfig,
        storage: StorageKind,
        callback: bool,
    ) -> anyhow::Result<Self> {
        let storage = open_storage(storage).await?;
        let auth: Arc<dyn AuthApiClient> =
            Arc::new(HttpAuthClient::new(config.clone()).context("Failed to build HTTP client")?);
        let web_auth: Arc<dyn WebAuthProvider> = Arc::new(BrowserAuthProvider::new(
            config.clone(),
            auth.clone(),
            ConsoleUserAgent::stdin(),
        ));
        let resources: Arc<dyn ResourceApiClient> =
            Arc::new(HttpUsersClient::new(&config).context("Failed to build HTTP client")?);

        Ok(Self {
            session: SessionOrchestrator::new(config, auth, web_auth, resources, storage),
            callback,
        })
    }

    #[instrument(skip(self, command))]
    pub async fn execute(&self, command: Commands) -> Notice {
        let outcome = match command {
            Commands::Login {
                email,
                password,
                save,
            } => {
                self.session.set_persist_credentials(save);
                self.drive(self.session.login(&email, &password))
                    .await
                    .map(|credentials| Notice::logged_in(&credentials))
            }
            Commands::WebLogin { save } => {
                self.session.set_persist_credentials(save);
                self.drive(self.session.web_login())
                    .await
                    .map(|credentials| Notice::logged_in(&credentials))
            }
            Commands::WebLogout => self
                .drive(self.session.web_logout())
                .await
                .map(|_| Notice::LoggedOut),
            Commands::Credentials => self
                .drive(self.session.credentials())
                .await
                .map(|credentials| Notice::got_credentials(&credentials)),
            Commands::Clear => {
                self.session.clear_credentials().await;
                Ok(Notice::Cleared)
            }
            Commands::Profile => self
                .drive(self.session.fetch_profile())
                .await
                .map(|profile| Notice::got_profile(&profile)),
            Commands::UpdateMetadata { pairs } => {
                let patch = if pairs.is_empty() {
                    random_metadata_patch()
                } else {
                    metadata_patch(pairs)
                };
                self.drive(self.session.update_metadata(patch))
                    .await
                    .map(|profile| Notice::updated_metadata(&profile))
            }
        };

        outcome.unwrap_or_else(Notice::from)
    }

    /// Resolve `request` by awaiting it or through the callback path
    async fn drive<T>(&self, request: Request<T, SessionError>) -> Result<T, SessionError>
    where
        T: Send + 'static,
    {
        if !self.callback {
            return request.await;
        }

        debug!("Delivering result through callbacks");
        let (context, mut delivery) = DeliveryContext::new(Handle::current());
        let slot = Arc::new(Mutex::new(None));

        let on_success = slot.clone();
        let on_failure = slot.clone();
        let _task = request.start(
            &context,
            move |value| store(&on_success, Ok(value)),
            move |error| store(&on_failure, Err(error)),
        );
        drop(context);

        while delivery.run_next().await {}

        let delivered = match slot.lock() {
            Ok(mut slot) => slot.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        delivered.ok_or_else(|| {
            SessionError::Auth(ck_auth::AuthError::InvalidResponse(
                "operation ended without a result".to_string(),
            ))
        })?
    }
}

fn store<T>(slot: &Mutex<Option<T>>, value: T) {
    match slot.lock() {
        Ok(mut slot) => *slot = Some(value),
        Err(poisoned) => *poisoned.into_inner() = Some(value),
    }
}

async fn open_storage(kind: StorageKind) -> anyhow::Result<Arc<dyn SecureStorage>> {
    match kind {
        StorageKind::File => {
            let dir = EncryptedFileStorage::default_storage_dir()?;
            let provider = Arc::new(EnvSecretProvider::new(PASSPHRASE_VAR));
            let storage = EncryptedFileStorage::new(&dir, SERVICE, provider)
                .await
                .with_context(|| format!("Failed to open storage at {}", dir.display()))?;
            Ok(Arc::new(storage))
        }
        StorageKind::Keyring => Ok(Arc::new(KeyringStorage::new(SERVICE))),
    }
}

/// Values that parse as JSON keep their type; anything else is a string
fn metadata_patch(pairs: Vec<(String, String)>) -> Map<String, Value> {
    pairs
        .into_iter()
        .map(|(key, value)| {
            let value = serde_json::from_str(&value).unwrap_or(Value::String(value));
            (key, value)
        })
        .collect()
}
