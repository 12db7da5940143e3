use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

#[derive(Parser, Debug)]
#[command(name = "credkeep")]
#[command(about = "Sign in to an OAuth2/OIDC tenant and keep the session fresh")]
#[command(version)]
pub struct Args {
    #[command(subcommand)]
    pub command: Commands,

    /// Configuration file (defaults to the platform config directory)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// OAuth client ID, overrides the configuration file
    #[arg(long, env = "CREDKEEP_CLIENT_ID", global = true)]
    pub client_id: Option<String>,

    /// Tenant domain, overrides the configuration file
    #[arg(long, env = "CREDKEEP_DOMAIN", global = true)]
    pub domain: Option<String>,

    /// Where the session is stored
    #[arg(long, value_enum, default_value_t = StorageKind::File, global = true)]
    pub storage: StorageKind,

    /// Deliver the result through callbacks instead of awaiting it
    #[arg(long, global = true)]
    pub callback: bool,

    /// Enable verbose logging
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    pub verbose: bool,

    /// Only log errors
    #[arg(short, long, global = true)]
    pub quiet: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Log in with email and password
    Login {
        #[arg(long)]
        email: String,

        #[arg(long)]
        password: String,

        /// Save the resulting credentials
        #[arg(long)]
        save: bool,
    },

    /// Log in through the browser
    WebLogin {
        /// Save the resulting credentials
        #[arg(long)]
        save: bool,
    },

    /// End the browser session, keeping stored credentials
    WebLogout,

    /// Show the stored credentials, renewing them if needed
    Credentials,

    /// Delete the stored credentials
    Clear,

    /// Fetch the signed-in user's profile
    Profile,

    /// Merge KEY=VALUE pairs into the user's metadata
    ///
    /// Without pairs a random value is written under "random".
    UpdateMetadata {
        #[arg(value_parser = parse_key_value)]
        pairs: Vec<(String, String)>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum StorageKind {
    /// Encrypted files in the config directory
    File,
    /// OS keyring entries
    Keyring,
}

fn parse_key_value(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err(format!("expected KEY=VALUE, got '{}'", s)),
    }
}
