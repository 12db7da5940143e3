use std::path::{Path, PathBuf};

use anyhow::{Context, bail};
use ck_auth::AccountConfig;
use directories::ProjectDirs;
use tracing::{debug, info};

const CONFIG_FILE: &str = "credkeep.toml";

/// Load the account configuration
///
/// Reads `path`, or `credkeep.toml` in the platform config directory when no
/// path is given. A missing default file is not an error as long as the
/// overrides supply the client ID and domain.
pub async fn load(
    path: Option<&Path>,
    client_id: Option<String>,
    domain: Option<String>,
) -> anyhow::Result<AccountConfig> {
    let (path, explicit) = match path {
        Some(path) => (path.to_path_buf(), true),
        None => (default_config_path()?, false),
    };

    let mut table = match tokio::fs::read_to_string(&path).await {
        Ok(content) => {
            info!("Loading configuration from {}", path.display());
            toml::from_str::<toml::Table>(&content)
                .with_context(|| format!("Failed to parse {}", path.display()))?
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound && !explicit => {
            debug!("No configuration file at {}", path.display());
            toml::Table::new()
        }
        Err(e) => {
            return Err(e).with_context(|| format!("Failed to read {}", path.display()));
        }
    };

    if let Some(client_id) = client_id {
        table.insert("client_id".to_string(), toml::Value::String(client_id));
    }
    if let Some(domain) = domain {
        table.insert("domain".to_string(), toml::Value::String(domain));
    }

    for required in ["client_id", "domain"] {
        if !table.contains_key(required) {
            bail!(
                "Missing `{}`: set it in {} or pass --{}",
                required,
                path.display(),
                required.replace('_', "-")
            );
        }
    }

    toml::Value::Table(table)
        .try_into::<AccountConfig>()
        .with_context(|| format!("Invalid configuration in {}", path.display()))
}

fn default_config_path() -> anyhow::Result<PathBuf> {
    let project_dirs =
        ProjectDirs::from("", "", "credkeep").context("Failed to get project directories")?;
    Ok(project_dirs.config_dir().join(CONFIG_FILE))
}
