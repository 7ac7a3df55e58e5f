use std::time::Duration;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

/// How statements of a session use server-side preparation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum PrepareMode {
    /// Run the first execution of a shape one-off and prepare on the second.
    #[default]
    Adaptive,
    /// Never prepare; every execution is one-off.
    Direct,
}

/// Options for a [`Session`](crate::session::Session).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionOptions {
    pub label: String,
    pub prepare_mode: PrepareMode,
    /// Upper bound for a single protocol call; expiry is a transport error.
    pub operation_timeout: Option<Duration>,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            label: "session".to_string(),
            prepare_mode: PrepareMode::default(),
            operation_timeout: None,
        }
    }
}

impl SessionOptions {
    #[must_use]
    pub fn builder() -> SessionOptionsBuilder {
        SessionOptionsBuilder::default()
    }
}

/// Fluent builder for [`SessionOptions`].
#[derive(Debug, Clone, Default)]
pub struct SessionOptionsBuilder {
    opts: SessionOptions,
}

impl SessionOptionsBuilder {
    #[must_use]
    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.opts.label = label.into();
        self
    }

    #[must_use]
    pub fn prepare_mode(mut self, prepare_mode: PrepareMode) -> Self {
        self.opts.prepare_mode = prepare_mode;
        self
    }

    #[must_use]
    pub fn operation_timeout(mut self, timeout: Duration) -> Self {
        self.opts.operation_timeout = Some(timeout);
        self
    }

    #[must_use]
    pub fn finish(self) -> SessionOptions {
        self.opts
    }
}
