//! CLI command implementations

use clap::{Parser, Subcommand};
use std::io::BufRead;
use std::path::{Path, PathBuf};
use tracing::info;

use latchkey_core::{
    migrate_legacy, LegacyDatabase, SecretStore, Session, StoreConfig, StoreFormat,
};
use latchkey_daemon::DaemonConfig;

use crate::client::{ClientError, Result, VaultClient};

/// Latchkey - password manager
#[derive(Parser)]
#[command(name = "latchkey")]
#[command(about = "Password manager with a background session daemon")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Configuration file (defaults to $LATCHKEY_CONFIG or the XDG config dir)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Read passwords from standard input, one per line, instead of prompting
    #[arg(long, global = true)]
    pub password_stdin: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Show whether the daemon is running and logged in
    Status,

    /// Unlock the store in the daemon
    Login,

    /// List stored names
    List,

    /// Print a stored secret
    Get {
        name: String,
    },

    /// Store a secret, replacing any existing one of the same name
    Add {
        name: String,

        /// Secret value; prompted for when omitted
        #[arg(long)]
        secret: Option<String>,
    },

    /// Stop the daemon
    Stop,

    /// Create a fresh empty store, overwriting whatever is there
    Init,

    /// Print the whole store as JSON
    Export,

    /// Replace the whole store with a JSON export
    Import {
        file: PathBuf,
    },

    /// Copy every login of a legacy store into the current one
    Migrate {
        /// Legacy store file
        #[arg(long)]
        legacy_store: PathBuf,
    },
}

/// Where passwords come from
pub enum Prompt {
    Terminal,
    Stdin,
}

impl Prompt {
    pub fn read(&self, label: &str) -> Result<String> {
        match self {
            Prompt::Terminal => Ok(rpassword::prompt_password(label)?),
            Prompt::Stdin => {
                let mut line = String::new();
                std::io::stdin().lock().read_line(&mut line)?;
                Ok(line.trim_end_matches(['\r', '\n']).to_string())
            }
        }
    }
}

/// Run the CLI
pub async fn run(cli: Cli) -> Result<()> {
    let config_path = cli.config.unwrap_or_else(DaemonConfig::default_path);
    let config = DaemonConfig::load_or_create(&config_path)?;
    let prompt = if cli.password_stdin {
        Prompt::Stdin
    } else {
        Prompt::Terminal
    };

    match cli.command {
        Commands::Status => {
            let client = VaultClient::from_config(&config, Some(config_path))?;
            if !client.is_running().await {
                println!("Latchkey daemon is not running");
                return Ok(());
            }
            let version = client.ping().await?;
            let state = if client.is_logged_in().await? {
                "logged in"
            } else {
                "locked"
            };
            println!("Latchkey daemon v{} is running ({})", version, state);
        }

        Commands::Login => {
            let client = connect(&config, config_path).await?;
            let password = prompt.read("Master password: ")?;
            client.log_in(&password).await?;
            println!("Logged in");
        }

        Commands::List => {
            let client = unlocked(&config, config_path, &prompt).await?;
            for name in client.list_password_names().await? {
                println!("{}", name);
            }
        }

        Commands::Get { name } => {
            let client = unlocked(&config, config_path, &prompt).await?;
            println!("{}", client.get_password(&name).await?);
        }

        Commands::Add { name, secret } => {
            let client = unlocked(&config, config_path, &prompt).await?;
            let secret = match secret {
                Some(secret) => secret,
                None => prompt.read(&format!("Secret for {}: ", name))?,
            };
            client.add_password(&name, &secret).await?;
            println!("Stored {}", name);
        }

        Commands::Stop => {
            let client = VaultClient::from_config(&config, Some(config_path))?;
            if client.is_running().await {
                client.stop_server().await?;
                println!("Latchkey daemon stopped");
            } else {
                println!("Latchkey daemon is not running");
            }
        }

        Commands::Init => {
            let password = new_password(&prompt)?;
            let store = config.store.clone();
            offline(move || init_store(&store, &password)).await?;
            println!("Created empty store at {}", config.store.store_path.display());
        }

        Commands::Export => {
            let password = prompt.read("Master password: ")?;
            let store = config.store.clone();
            println!("{}", offline(move || export_store(&store, &password)).await?);
        }

        Commands::Import { file } => {
            let password = prompt.read("Master password: ")?;
            let store = config.store.clone();
            let count = offline(move || import_store(&store, &password, &file)).await?;
            println!("Imported {} entries", count);
        }

        Commands::Migrate { legacy_store } => {
            let legacy_password = prompt.read("Legacy store password: ")?;
            let password = prompt.read("Master password: ")?;
            let store = config.store.clone();
            let count = offline(move || {
                migrate_store(&store, &password, &legacy_store, &legacy_password)
            })
            .await?;
            println!("Migrated {} logins", count);
        }
    }

    Ok(())
}

/// Store commands open the pipeline directly, which may block on scrypt or
/// the remote
async fn offline<T, F>(task: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(task)
        .await
        .map_err(|e| ClientError::Daemon(e.into()))?
}

async fn connect(config: &DaemonConfig, config_path: PathBuf) -> Result<VaultClient> {
    let client = VaultClient::from_config(config, Some(config_path))?;
    client.ensure_running().await?;
    Ok(client)
}

/// Connected client whose daemon session is logged in, prompting if needed
async fn unlocked(
    config: &DaemonConfig,
    config_path: PathBuf,
    prompt: &Prompt,
) -> Result<VaultClient> {
    let client = connect(config, config_path).await?;
    if !client.is_logged_in().await? {
        let password = prompt.read("Master password: ")?;
        client.log_in(&password).await?;
    }
    Ok(client)
}

fn new_password(prompt: &Prompt) -> Result<String> {
    let password = prompt.read("New master password: ")?;
    if let Prompt::Terminal = prompt {
        if prompt.read("Repeat master password: ")? != password {
            return Err(ClientError::Input("Passwords do not match".to_string()));
        }
    }
    Ok(password)
}

/// Write a fresh empty store under `password`
pub fn init_store(config: &StoreConfig, password: &str) -> Result<()> {
    let mut session = Session::new(config.clone());
    session.log_in(password, false)?;
    session.init_empty();
    session.save()?;
    info!("Initialized store at {:?}", config.store_path);
    Ok(())
}

/// Whole store as pretty JSON
pub fn export_store(config: &StoreConfig, password: &str) -> Result<String> {
    let mut session = Session::new(config.clone());
    session.log_in(password, true)?;
    let doc = session.export_store()?.to_document()?;
    Ok(serde_json::to_string_pretty(&doc)?)
}

/// Replace the store with the export in `file`; returns the entry count
pub fn import_store(config: &StoreConfig, password: &str, file: &Path) -> Result<usize> {
    let doc: serde_json::Value = serde_json::from_slice(&std::fs::read(file)?)?;
    let store = SecretStore::from_document(doc)?;
    let count = store.len();

    let mut session = Session::new(config.clone());
    session.log_in(password, false)?;
    session.replace_store(store);
    session.save()?;
    info!("Imported {} entries from {:?}", count, file);
    Ok(count)
}

/// Merge every login of the legacy store at `legacy_path` into the current
/// store, creating the current store when it does not exist yet
pub fn migrate_store(
    config: &StoreConfig,
    password: &str,
    legacy_path: &Path,
    legacy_password: &str,
) -> Result<usize> {
    let legacy_config = StoreConfig {
        format: StoreFormat::Legacy,
        store_path: legacy_path.to_path_buf(),
        remote_url: None,
        ..config.clone()
    };
    let database = LegacyDatabase::new(legacy_config.build_pipeline(legacy_password)?);
    database.load()?;

    let mut session = Session::new(config.clone());
    let existing = config.remote_url.is_some() || config.store_path.exists();
    session.log_in(password, existing)?;
    if !existing {
        session.init_empty();
    }

    let count = migrate_legacy(&database, &mut session)?;
    session.save()?;
    Ok(count)
}
