use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio_postgres::NoTls;
use tracing::{debug, warn};

use super::protocol::PostgresProtocol;
use crate::config::{PrepareMode, SessionOptions};
use crate::error::CrudMiddlewareError;
use crate::session::Session;

/// Connection settings for a Postgres-backed [`Session`].
///
/// Deserialises from JSON so it can live in a config file:
///
/// ```json
/// { "dbname": "app", "host": "localhost", "port": 5432, "user": "app", "password": "secret",
///   "prepare_mode": "adaptive", "operation_timeout_ms": 5000 }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PostgresOptions {
    pub dbname: Option<String>,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub user: Option<String>,
    pub password: Option<String>,
    pub label: Option<String>,
    pub prepare_mode: PrepareMode,
    pub operation_timeout_ms: Option<u64>,
}

impl PostgresOptions {
    /// Parse options from a JSON document.
    ///
    /// # Errors
    /// Returns `ConfigError` if the document is not valid options JSON.
    pub fn from_json_str(json: &str) -> Result<Self, CrudMiddlewareError> {
        serde_json::from_str(json).map_err(|e| {
            CrudMiddlewareError::ConfigError(format!("invalid postgres options: {e}"))
        })
    }

    /// Check that every connection field is present.
    ///
    /// # Errors
    /// Returns `ConfigError` naming the first missing field.
    pub fn validate(&self) -> Result<(), CrudMiddlewareError> {
        if self.dbname.is_none() {
            return Err(CrudMiddlewareError::ConfigError(
                "dbname is required".to_string(),
            ));
        }
        if self.host.is_none() {
            return Err(CrudMiddlewareError::ConfigError(
                "host is required".to_string(),
            ));
        }
        if self.port.is_none() {
            return Err(CrudMiddlewareError::ConfigError(
                "port is required".to_string(),
            ));
        }
        if self.user.is_none() {
            return Err(CrudMiddlewareError::ConfigError(
                "user is required".to_string(),
            ));
        }
        if self.password.is_none() {
            return Err(CrudMiddlewareError::ConfigError(
                "password is required".to_string(),
            ));
        }
        Ok(())
    }

    #[must_use]
    pub fn session_options(&self) -> SessionOptions {
        let mut builder = SessionOptions::builder().prepare_mode(self.prepare_mode);
        if let Some(label) = &self.label {
            builder = builder.label(label.clone());
        } else if let Some(dbname) = &self.dbname {
            builder = builder.label(format!("postgres:{dbname}"));
        }
        if let Some(ms) = self.operation_timeout_ms {
            builder = builder.operation_timeout(Duration::from_millis(ms));
        }
        builder.finish()
    }

    fn pg_config(&self) -> Result<tokio_postgres::Config, CrudMiddlewareError> {
        self.validate()?;
        let mut config = tokio_postgres::Config::new();
        if let Some(dbname) = &self.dbname {
            config.dbname(dbname);
        }
        if let Some(host) = &self.host {
            config.host(host);
        }
        if let Some(port) = self.port {
            config.port(port);
        }
        if let Some(user) = &self.user {
            config.user(user);
        }
        if let Some(password) = &self.password {
            config.password(password);
        }
        Ok(config)
    }

    /// Open one connection and wrap it in a [`Session`].
    ///
    /// The connection task is spawned onto the current tokio runtime.
    ///
    /// # Errors
    /// Returns `ConfigError` for incomplete options and `TransportError` if the server cannot be
    /// reached.
    pub async fn connect(&self) -> Result<Session, CrudMiddlewareError> {
        let config = self.pg_config()?;
        let (client, connection) = config.connect(NoTls).await.map_err(|e| {
            CrudMiddlewareError::TransportError(format!("failed to connect to postgres: {e}"))
        })?;
        tokio::spawn(async move {
            if let Err(err) = connection.await {
                warn!(error = %err, "postgres connection ended with an error");
            }
        });
        let options = self.session_options();
        debug!(label = %options.label, "postgres connection established");
        Ok(Session::new(PostgresProtocol::new(client), options))
    }
}
