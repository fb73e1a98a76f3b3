//! Error types for the router core.

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while loading intent configuration.
///
/// These are fatal at startup: the engine cannot run without a lexicon,
/// weights and thresholds.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// A configuration file could not be read.
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A configuration file is not valid JSON for its schema.
    #[error("failed to parse {name}: {source}")]
    Parse {
        name: String,
        #[source]
        source: serde_json::Error,
    },

    /// A weight or threshold is outside its allowed range.
    #[error("{name} = {value} is out of range [{min}, {max}]")]
    OutOfRange {
        name: &'static str,
        value: f64,
        min: f64,
        max: f64,
    },

    /// The lexicon has no entries for the default language.
    #[error("lexicon has no domains for default language '{0}'")]
    MissingDefaultLanguage(String),

    /// Any other structural problem.
    #[error("invalid intent configuration: {0}")]
    Invalid(String),
}

/// Errors from the LLM provider.
///
/// Never surfaced to engine callers; the classifier turns them into an
/// absent verdict.
#[derive(Error, Debug)]
pub enum LlmError {
    /// No API URL or key configured.
    #[error("LLM provider not configured")]
    NotConfigured,

    /// HTTP transport failure (connect, TLS, timeout).
    #[error("LLM request failed: {0}")]
    Request(String),

    /// Provider answered with a non-success status.
    #[error("LLM provider returned {status}: {body}")]
    Status { status: u16, body: String },

    /// The response envelope could not be read.
    #[error("failed to parse LLM response: {0}")]
    ResponseParse(String),
}

impl From<reqwest::Error> for LlmError {
    fn from(e: reqwest::Error) -> Self {
        LlmError::Request(e.to_string())
    }
}

/// Internal errors inside a single classification call.
///
/// The engine converts these into an `error`-sourced decision.
#[derive(Error, Debug)]
pub enum IntentError {
    /// A computed score was NaN or infinite.
    #[error("non-finite score for domain '{domain}'")]
    NonFiniteScore { domain: String },

    /// The configured lexicon produced no domains for this call.
    #[error("no domains available for language '{0}'")]
    NoDomains(String),

    /// A collaborator panicked.
    #[error("collaborator panicked: {0}")]
    Panicked(String),
}

/// Result type for configuration loading.
pub type Result<T> = std::result::Result<T, ConfigError>;
