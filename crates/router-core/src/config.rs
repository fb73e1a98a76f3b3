//! Filesystem locations used by the router.
//!
//! ```text
//! <state>/                 ROUTER_STATE_DIR, default ~/.catalog-router
//! ├── config/              ROUTER_CONFIG_DIR overrides this one alone
//! │   ├── .env.local       LLM credentials
//! │   └── intent/          aliases.json, negations.json, weights.json
//! ├── state/sessions.json
//! └── repl_history.txt
//! ```

use std::path::{Path, PathBuf};

pub const STATE_DIR_ENV: &str = "ROUTER_STATE_DIR";
pub const CONFIG_DIR_ENV: &str = "ROUTER_CONFIG_DIR";

const DEFAULT_STATE_DIR: &str = ".catalog-router";

/// Resolved state and configuration directories.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouterPaths {
    state_dir: PathBuf,
    config_dir: PathBuf,
}

impl RouterPaths {
    /// Resolve from explicit overrides, then the environment, then the home
    /// directory. A missing home falls back to a relative `.catalog-router`.
    pub fn resolve(state_dir: Option<PathBuf>, config_dir: Option<PathBuf>) -> Self {
        Self::resolve_with(state_dir, config_dir, |name| std::env::var_os(name).map(PathBuf::from))
    }

    /// Resolve from the environment only.
    pub fn from_env() -> Self {
        Self::resolve(None, None)
    }

    fn resolve_with(
        state_dir: Option<PathBuf>,
        config_dir: Option<PathBuf>,
        var: impl Fn(&str) -> Option<PathBuf>,
    ) -> Self {
        let state_dir = state_dir
            .or_else(|| var(STATE_DIR_ENV))
            .or_else(|| dirs::home_dir().map(|home| home.join(DEFAULT_STATE_DIR)))
            .unwrap_or_else(|| PathBuf::from(DEFAULT_STATE_DIR));
        let config_dir = config_dir
            .or_else(|| var(CONFIG_DIR_ENV))
            .unwrap_or_else(|| state_dir.join("config"));
        Self {
            state_dir,
            config_dir,
        }
    }

    pub fn state_dir(&self) -> &Path {
        &self.state_dir
    }

    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }

    /// Directory holding the intent lexicon, negations and weights.
    pub fn intent_dir(&self) -> PathBuf {
        self.config_dir.join("intent")
    }

    /// File backing the conversation session store.
    pub fn sessions_file(&self) -> PathBuf {
        self.state_dir.join("state").join("sessions.json")
    }

    /// Secrets file loaded before the working directory's `.env`.
    pub fn env_file(&self) -> PathBuf {
        self.config_dir.join(".env.local")
    }

    pub fn history_file(&self) -> PathBuf {
        self.state_dir.join("repl_history.txt")
    }
}
