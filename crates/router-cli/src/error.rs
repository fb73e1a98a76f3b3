//! CLI error type.

use router_core::{ConfigError, LlmError};
use router_persistence::PersistenceError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CliError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("LLM setup failed: {0}")]
    Llm(#[from] LlmError),

    #[error("session store error: {0}")]
    Session(#[from] PersistenceError),

    #[error("line editor error: {0}")]
    Readline(#[from] rustyline::error::ReadlineError),

    #[error("failed to encode output: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, CliError>;
