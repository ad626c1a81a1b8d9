//! Error types for the decision pipeline
//!
//! Only [`PipelineError`] ever reaches the caller of `Pipeline::run`.
//! [`CollaboratorError`] is absorbed per candidate by the stage that issued
//! the call and shows up in that candidate's record instead.

use std::time::Duration;

/// Errors that abort a pipeline run
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// Case failed structural validation; no stage was executed
    #[error("Invalid case input: {0}")]
    InputValidation(String),

    /// A stage broke an ordering or gating invariant
    #[error("Internal invariant violated: {0}")]
    InternalInvariant(String),
}

impl PipelineError {
    pub fn input(msg: impl Into<String>) -> Self {
        Self::InputValidation(msg.into())
    }

    pub fn invariant(msg: impl Into<String>) -> Self {
        Self::InternalInvariant(msg.into())
    }
}

/// Failure of an external collaborator (enrichment service, knowledge store)
#[derive(Debug, thiserror::Error)]
pub enum CollaboratorError {
    #[error("Lookup failed: {0}")]
    Lookup(String),

    #[error("Lookup timed out after {0:?}")]
    Timeout(Duration),

    #[error("Collaborator unavailable: {0}")]
    Unavailable(String),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Parse error: {0}")]
    Parse(String),
}

impl CollaboratorError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, CollaboratorError::Timeout(_))
    }
}

/// Problems loading configuration, rule sets or knowledge files
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for {key}: {value}")]
    InvalidValue { key: String, value: String },

    #[error("Failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse {path}: {source}")]
    Toml {
        path: String,
        #[source]
        source: toml::de::Error,
    },

    #[error("Invalid definition: {0}")]
    Definition(String),
}
