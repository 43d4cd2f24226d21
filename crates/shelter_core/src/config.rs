//! Connection configuration.
//!
//! # Responsibility
//! - Describe where the store lives, which collection to bind and which
//!   credentials to present.
//! - Load the same settings from environment variables.
//!
//! # Invariants
//! - Collection names follow the field-name rules.
//! - Passwords never appear in `Debug` output.

use crate::model::field::validate_field_name;
use std::error::Error;
use std::fmt::{Debug, Display, Formatter};
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_COLLECTION: &str = "animals";
pub const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_millis(5000);

pub const ENV_DB_PATH: &str = "SHELTER_DB_PATH";
pub const ENV_COLLECTION: &str = "SHELTER_COLLECTION";
pub const ENV_USERNAME: &str = "SHELTER_USERNAME";
pub const ENV_PASSWORD: &str = "SHELTER_PASSWORD";
pub const ENV_BUSY_TIMEOUT_MS: &str = "SHELTER_BUSY_TIMEOUT_MS";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    InvalidCollection(String),
    InvalidValue {
        key: &'static str,
        value: String,
        reason: String,
    },
    /// Username without password or the other way round.
    IncompleteCredentials,
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidCollection(name) => write!(f, "invalid collection name `{name}`"),
            Self::InvalidValue { key, value, reason } => {
                write!(f, "invalid value `{value}` for {key}: {reason}")
            }
            Self::IncompleteCredentials => {
                write!(f, "username and password must be provided together")
            }
        }
    }
}

impl Error for ConfigError {}

/// Username/password pair presented when opening a store.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl Debug for Credentials {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreLocation {
    File(PathBuf),
    Memory,
}

/// Settings used to open a connection handle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionConfig {
    pub location: StoreLocation,
    pub collection: String,
    pub credentials: Option<Credentials>,
    pub busy_timeout: Duration,
}

impl ConnectionConfig {
    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self::with_location(StoreLocation::File(path.into()))
    }

    pub fn in_memory() -> Self {
        Self::with_location(StoreLocation::Memory)
    }

    fn with_location(location: StoreLocation) -> Self {
        Self {
            location,
            collection: DEFAULT_COLLECTION.to_string(),
            credentials: None,
            busy_timeout: DEFAULT_BUSY_TIMEOUT,
        }
    }

    pub fn with_collection(mut self, collection: impl Into<String>) -> Self {
        self.collection = collection.into();
        self
    }

    pub fn with_credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = Some(credentials);
        self
    }

    pub fn with_busy_timeout(mut self, busy_timeout: Duration) -> Self {
        self.busy_timeout = busy_timeout;
        self
    }

    /// Checks settings that can be verified without touching storage.
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_field_name(&self.collection)
            .map_err(|_| ConfigError::InvalidCollection(self.collection.clone()))
    }

    /// Loads settings from process environment variables.
    ///
    /// Missing `SHELTER_DB_PATH` selects an in-memory store.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Loads settings through an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let read = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let mut config = match read(ENV_DB_PATH) {
            Some(path) => Self::file(path.trim()),
            None => Self::in_memory(),
        };
        if let Some(collection) = read(ENV_COLLECTION) {
            config.collection = collection.trim().to_string();
        }

        config.credentials = match (read(ENV_USERNAME), read(ENV_PASSWORD)) {
            (Some(username), Some(password)) => Some(Credentials::new(username.trim(), password)),
            (None, None) => None,
            _ => return Err(ConfigError::IncompleteCredentials),
        };

        if let Some(raw) = read(ENV_BUSY_TIMEOUT_MS) {
            let millis = raw
                .trim()
                .parse::<u64>()
                .map_err(|err| ConfigError::InvalidValue {
                    key: ENV_BUSY_TIMEOUT_MS,
                    value: raw.clone(),
                    reason: err.to_string(),
                })?;
            config.busy_timeout = Duration::from_millis(millis);
        }

        config.validate()?;
        Ok(config)
    }
}
