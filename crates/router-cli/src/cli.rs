//! Command-line interface definition using clap.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use router_core::config::{CONFIG_DIR_ENV, STATE_DIR_ENV};
use router_core::RouterPaths;

/// Conversation key used when `--chat` is not given.
pub const DEFAULT_CHAT: &str = "cli";

/// Catalog Router - classify chat messages into catalog domains
#[derive(Parser, Debug)]
#[command(name = "catalog-router")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Base state directory
    #[arg(long, env = STATE_DIR_ENV, global = true)]
    pub state_dir: Option<PathBuf>,

    /// Configuration directory (intent data and .env.local)
    #[arg(long, env = CONFIG_DIR_ENV, global = true)]
    pub config_dir: Option<PathBuf>,

    /// Never consult the LLM, even if a key is configured
    #[arg(long, global = true)]
    pub no_llm: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Classify one message and print the decision as JSON
    Classify {
        /// Message text
        #[arg(required = true, num_args = 1..)]
        message: Vec<String>,

        /// Language hint (e.g. en, ru, de)
        #[arg(short, long)]
        lang: Option<String>,

        /// Conversation key for session bias
        #[arg(short, long, default_value = DEFAULT_CHAT)]
        chat: String,

        /// Do not read or update the stored session
        #[arg(long)]
        stateless: bool,

        /// Pretty-print the JSON
        #[arg(short, long)]
        pretty: bool,
    },

    /// Start an interactive conversation
    Chat {
        /// Language hint (e.g. en, ru, de)
        #[arg(short, long)]
        lang: Option<String>,

        /// Conversation key for session bias
        #[arg(short, long, default_value = DEFAULT_CHAT)]
        chat: String,
    },

    /// Show or clear the stored session of a conversation
    Session {
        /// Conversation key
        #[arg(default_value = DEFAULT_CHAT)]
        chat: String,

        /// Delete the session
        #[arg(long)]
        clear: bool,
    },

    /// Load and validate the intent configuration, then print a summary
    ConfigCheck,
}

impl Cli {
    /// Directories from the flags, falling back to the environment and home.
    pub fn paths(&self) -> RouterPaths {
        RouterPaths::resolve(self.state_dir.clone(), self.config_dir.clone())
    }

    /// Returns the log level based on verbosity.
    pub fn log_level(&self) -> tracing::Level {
        match self.verbose {
            0 => tracing::Level::WARN,
            1 => tracing::Level::INFO,
            2 => tracing::Level::DEBUG,
            _ => tracing::Level::TRACE,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use std::path::Path;

    #[test]
    fn test_cli_parse_no_args() {
        let cli = Cli::parse_from(["catalog-router"]);
        assert!(cli.command.is_none());
        assert!(!cli.no_llm);
    }

    #[test]
    fn test_cli_parse_classify() {
        let cli = Cli::parse_from([
            "catalog-router",
            "classify",
            "--lang",
            "ru",
            "хочу",
            "пиццу",
        ]);
        match cli.command {
            Some(Commands::Classify {
                message,
                lang,
                chat,
                stateless,
                pretty,
            }) => {
                assert_eq!(message.join(" "), "хочу пиццу");
                assert_eq!(lang.as_deref(), Some("ru"));
                assert_eq!(chat, DEFAULT_CHAT);
                assert!(!stateless);
                assert!(!pretty);
            }
            _ => panic!("Expected Classify command"),
        }
    }

    #[test]
    fn test_cli_classify_requires_message() {
        assert!(Cli::try_parse_from(["catalog-router", "classify"]).is_err());
    }

    #[test]
    fn test_cli_global_flags_after_subcommand() {
        let cli = Cli::parse_from([
            "catalog-router",
            "chat",
            "--chat",
            "42",
            "--no-llm",
            "--state-dir",
            "/tmp/router",
        ]);
        assert!(cli.no_llm);
        let paths = cli.paths();
        assert_eq!(paths.state_dir(), Path::new("/tmp/router"));
        assert_eq!(
            paths.sessions_file(),
            PathBuf::from("/tmp/router/state/sessions.json")
        );
        match cli.command {
            Some(Commands::Chat { chat, .. }) => assert_eq!(chat, "42"),
            _ => panic!("Expected Chat command"),
        }
    }

    #[test]
    fn test_cli_explicit_config_dir() {
        let cli = Cli::parse_from([
            "catalog-router",
            "--state-dir",
            "/tmp/router",
            "--config-dir",
            "/etc/router",
            "config-check",
        ]);
        let paths = cli.paths();
        assert_eq!(paths.intent_dir(), PathBuf::from("/etc/router/intent"));
        assert_eq!(paths.env_file(), PathBuf::from("/etc/router/.env.local"));
        assert_eq!(
            paths.history_file(),
            PathBuf::from("/tmp/router/repl_history.txt")
        );
        assert!(matches!(cli.command, Some(Commands::ConfigCheck)));
    }

    #[test]
    fn test_cli_verbose() {
        let cli = Cli::parse_from(["catalog-router", "-vv"]);
        assert_eq!(cli.verbose, 2);
        assert_eq!(cli.log_level(), tracing::Level::DEBUG);
    }

    #[test]
    fn test_cli_help() {
        Cli::command().debug_assert();
    }
}
