//! Router Core - intent decision engine for the catalog router.
//!
//! This crate turns a free-text chat message into a routing decision for
//! the service catalog:
//!
//! - **config**: Shared configuration and state paths
//! - **error**: Error types for configuration, LLM access and classification
//! - **intent**: Lexicon rules, slot extraction, session bias and the
//!   decision engine
//! - **llm**: Chat-completions client and the LLM fallback classifier

pub mod config;
pub mod error;
pub mod intent;
pub mod llm;

pub use config::RouterPaths;
pub use error::{ConfigError, IntentError, LlmError, Result};
pub use intent::{
    DecisionSource, EngineSettings, IntentConfig, IntentDecision, IntentEngine,
    IntentEngineBuilder, SessionSnapshot, Signal, SlotSet, SlotValue,
};
pub use llm::{LlmSettings, OpenRouterClassifier};
