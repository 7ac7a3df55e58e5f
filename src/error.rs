use thiserror::Error;

#[derive(Debug, Error)]
pub enum CrudMiddlewareError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Malformed statement input; raised before any server round-trip.
    #[error("Validation error: {0}")]
    ValidationError(String),

    /// A placeholder in the statement has no bound value.
    #[error("Missing binding: {0}")]
    MissingBinding(String),

    #[error("SQL execution error: {0}")]
    ExecutionError(String),

    /// The connection failed or an operation timed out.
    #[error("Transport error: {0}")]
    TransportError(String),

    #[error("Session closed")]
    SessionClosed,

    #[error("Other database error: {0}")]
    Other(String),
}

impl CrudMiddlewareError {
    /// Errors raised synchronously from malformed input.
    #[must_use]
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::ValidationError(_) | Self::MissingBinding(_))
    }

    /// Errors that mean the session can no longer talk to the server.
    #[must_use]
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::TransportError(_) | Self::SessionClosed)
    }
}
