//! Store configuration and connection setup.

use std::str::FromStr;

use sqlx::PgPool;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use thiserror::Error;
use tracing::info;

/// Default size of the connection pool.
pub const DEFAULT_MAX_CONNECTIONS: u32 = 5;

/// Errors raised while reading store configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A required environment variable is not set.
    #[error("{0} environment variable must be set")]
    Missing(&'static str),

    /// An environment variable is set to an unusable value.
    #[error("{name} is invalid: {reason}")]
    Invalid {
        /// The variable name.
        name: &'static str,
        /// Why the value was rejected.
        reason: String,
    },
}

/// Connection settings for the document store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    /// `PostgreSQL` connection URI.
    pub database_url: String,
    /// Overrides the database named in `database_url`.
    pub database_name: Option<String>,
    /// Upper bound on pooled connections.
    pub max_connections: u32,
}

impl StoreConfig {
    /// Reads `DATABASE_URL`, `DATABASE_NAME` and `DATABASE_MAX_CONNECTIONS`.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if `DATABASE_URL` is missing or
    /// `DATABASE_MAX_CONNECTIONS` is not a positive integer.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Reads the same variables through `lookup`.
    ///
    /// # Errors
    ///
    /// See [`StoreConfig::from_env`].
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let database_url = lookup("DATABASE_URL")
            .filter(|v| !v.trim().is_empty())
            .ok_or(ConfigError::Missing("DATABASE_URL"))?;
        let database_name = lookup("DATABASE_NAME").filter(|v| !v.trim().is_empty());
        let max_connections = match lookup("DATABASE_MAX_CONNECTIONS") {
            None => DEFAULT_MAX_CONNECTIONS,
            Some(raw) => match raw.trim().parse::<u32>() {
                Ok(0) => {
                    return Err(ConfigError::Invalid {
                        name: "DATABASE_MAX_CONNECTIONS",
                        reason: "must be at least 1".to_owned(),
                    });
                }
                Ok(n) => n,
                Err(e) => {
                    return Err(ConfigError::Invalid {
                        name: "DATABASE_MAX_CONNECTIONS",
                        reason: e.to_string(),
                    });
                }
            },
        };

        Ok(Self {
            database_url,
            database_name,
            max_connections,
        })
    }

    /// Connect options with the database name override applied.
    ///
    /// # Errors
    ///
    /// Returns `sqlx::Error::Configuration` if the URI cannot be parsed.
    pub fn connect_options(&self) -> Result<PgConnectOptions, sqlx::Error> {
        let options = PgConnectOptions::from_str(&self.database_url)?;
        Ok(match &self.database_name {
            Some(name) => options.database(name),
            None => options,
        })
    }

    /// Opens a connection pool.
    ///
    /// # Errors
    ///
    /// Returns `sqlx::Error` if the URI is invalid or the database cannot be
    /// reached.
    pub async fn connect(&self) -> Result<PgPool, sqlx::Error> {
        let pool = PgPoolOptions::new()
            .max_connections(self.max_connections)
            .connect_with(self.connect_options()?)
            .await?;
        info!(
            database = self.database_name.as_deref().unwrap_or("<from url>"),
            max_connections = self.max_connections,
            "connected to document store"
        );
        Ok(pool)
    }
}
