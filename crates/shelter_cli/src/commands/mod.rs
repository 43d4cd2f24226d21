//! Shared CLI plumbing: store options, JSON argument parsing and output.

use clap::Args;
use serde_json::Value;
use shelter_core::config::{
    DEFAULT_COLLECTION, ENV_BUSY_TIMEOUT_MS, ENV_COLLECTION, ENV_DB_PATH, ENV_PASSWORD,
    ENV_USERNAME,
};
use shelter_core::{
    ConfigError, ConnectionConfig, Credentials, CrudAccessor, LoggingConfig, SortDirection,
    SortKey, SqliteDocumentRepository,
};
use std::error::Error;
use std::path::PathBuf;
use std::time::Duration;

pub mod admin;
pub mod records;

pub type CommandResult = Result<(), Box<dyn Error>>;

/// Store and logging options shared by every command.
#[derive(Debug, Args)]
pub struct StoreArgs {
    /// Path to the SQLite store file
    #[arg(long, global = true, env = ENV_DB_PATH)]
    pub db: Option<PathBuf>,

    /// Collection holding the records
    #[arg(long, global = true, env = ENV_COLLECTION, default_value = DEFAULT_COLLECTION)]
    pub collection: String,

    /// Store username (required once users are registered)
    #[arg(long, global = true, env = ENV_USERNAME)]
    pub username: Option<String>,

    /// Store password
    #[arg(long, global = true, env = ENV_PASSWORD, hide_env_values = true)]
    pub password: Option<String>,

    /// Milliseconds to wait on a locked store
    #[arg(long, global = true, env = ENV_BUSY_TIMEOUT_MS)]
    pub busy_timeout_ms: Option<u64>,

    /// Directory for rolling log files; logging is off when unset
    #[arg(long, global = true, env = "SHELTER_LOG_DIR")]
    pub log_dir: Option<PathBuf>,

    /// Log level (trace|debug|info|warn|error)
    #[arg(long, global = true, env = "SHELTER_LOG_LEVEL")]
    pub log_level: Option<String>,
}

impl StoreArgs {
    /// Builds the connection settings for the selected store.
    pub fn connection_config(&self) -> Result<ConnectionConfig, Box<dyn Error>> {
        let db = self
            .db
            .as_ref()
            .ok_or("no store selected: pass --db or set SHELTER_DB_PATH")?;

        let mut config = ConnectionConfig::file(db).with_collection(self.collection.trim());
        match (&self.username, &self.password) {
            (Some(username), Some(password)) => {
                config = config.with_credentials(Credentials::new(username.trim(), password));
            }
            (None, None) => {}
            _ => return Err(ConfigError::IncompleteCredentials.into()),
        }
        if let Some(millis) = self.busy_timeout_ms {
            config = config.with_busy_timeout(Duration::from_millis(millis));
        }
        config.validate()?;
        Ok(config)
    }

    pub fn connect(&self) -> Result<CrudAccessor<SqliteDocumentRepository>, Box<dyn Error>> {
        Ok(CrudAccessor::connect(&self.connection_config()?)?)
    }
}

/// Starts file logging when a log directory was given.
pub fn init_logging(store: &StoreArgs) -> CommandResult {
    let Some(log_dir) = &store.log_dir else {
        return Ok(());
    };
    let log_dir = if log_dir.is_absolute() {
        log_dir.clone()
    } else {
        std::env::current_dir()?.join(log_dir)
    };

    let config = match &store.log_level {
        Some(level) => LoggingConfig::new(level.as_str(), log_dir),
        None => LoggingConfig::with_default_level(log_dir),
    };
    shelter_core::init_logging(&config)?;
    Ok(())
}

/// Parses a JSON command-line argument, naming it in the error.
pub fn parse_json(name: &str, raw: &str) -> Result<Value, Box<dyn Error>> {
    serde_json::from_str(raw).map_err(|err| format!("{name} is not valid JSON: {err}").into())
}

/// Parses `field`, `field:asc` or `field:desc`.
pub fn parse_sort_key(raw: &str) -> Result<SortKey, Box<dyn Error>> {
    let (field, direction) = match raw.rsplit_once(':') {
        Some((field, "asc")) => (field, SortDirection::Ascending),
        Some((field, "desc")) => (field, SortDirection::Descending),
        Some((_, other)) => {
            return Err(format!("sort direction must be asc or desc, got `{other}`").into())
        }
        None => (raw, SortDirection::Ascending),
    };
    Ok(SortKey::new(field, direction)?)
}

/// Writes one JSON value as a single output line.
pub fn print_json(value: &Value) -> CommandResult {
    println!("{}", serde_json::to_string(value)?);
    Ok(())
}
