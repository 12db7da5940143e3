use zeroize::Zeroizing;

/// Source of the passphrase the file backend derives its key from
///
/// Consulted only when the data key cannot be read from or written to the
/// OS keyring.
#[async_trait::async_trait]
pub trait SecretProvider: Send + Sync {
    /// `None` means no passphrase is available and the backend cannot open
    /// its key. `prompt` describes what the passphrase unlocks.
    async fn get_passphrase(&self, prompt: &str) -> Option<Zeroizing<String>>;
}

/// Reads the passphrase from an environment variable at the time it is needed
///
/// An unset or empty variable yields `None`.
#[derive(Debug, Clone)]
pub struct EnvSecretProvider {
    var: String,
}

impl EnvSecretProvider {
    pub fn new(var: impl Into<String>) -> Self {
        Self { var: var.into() }
    }
}

#[async_trait::async_trait]
impl SecretProvider for EnvSecretProvider {
    async fn get_passphrase(&self, prompt: &str) -> Option<Zeroizing<String>> {
        match std::env::var(&self.var) {
            Ok(value) if !value.is_empty() => Some(Zeroizing::new(value)),
            _ => {
                tracing::debug!("{} ({} is not set)", prompt, self.var);
                None
            }
        }
    }
}

/// Passphrase fixed at construction, for backend tests
#[cfg(test)]
pub(crate) struct FixedPassphrase(pub Option<&'static str>);

#[cfg(test)]
#[async_trait::async_trait]
impl SecretProvider for FixedPassphrase {
    async fn get_passphrase(&self, _prompt: &str) -> Option<Zeroizing<String>> {
        self.0.map(|p| Zeroizing::new(p.to_string()))
    }
}
