//! Router CLI library.
//!
//! Command-line front-end for the catalog router: one-shot classification,
//! an interactive conversation loop and session inspection.

pub mod cli;
pub mod commands;
pub mod error;
pub mod repl;

pub use error::{CliError, Result};
