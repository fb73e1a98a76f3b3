//! Interactive conversation loop.
//!
//! Plain lines go to the intent engine; lines starting with `:` control the
//! session. Slash commands such as `/menu` or `/add` are engine commands and
//! are classified like any other message.

use std::path::PathBuf;

use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use tokio::runtime::Handle;
use tracing::debug;

use crate::commands::{render_decision, Router};
use crate::error::Result;

/// A parsed REPL line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplCommand {
    /// Show or set the language hint; `auto` clears it
    Lang(Option<String>),
    /// Show or switch the conversation key
    Chat(Option<String>),
    /// Print the stored session
    Session,
    /// Drop flow state, keep the selected domain
    Reset,
    /// Delete the stored session
    Forget,
    Help,
    Quit,
    Unknown(String),
    /// Message to classify
    Text(String),
}

impl ReplCommand {
    /// Parses input into a REPL command.
    pub fn parse(input: &str) -> Self {
        let input = input.trim();

        let Some(stripped) = input.strip_prefix(':') else {
            return ReplCommand::Text(input.to_string());
        };

        let mut parts = stripped.splitn(2, char::is_whitespace);
        let cmd = parts.next().unwrap_or_default().to_lowercase();
        let arg = parts
            .next()
            .map(str::trim)
            .filter(|a| !a.is_empty())
            .map(String::from);

        match cmd.as_str() {
            "lang" | "l" => ReplCommand::Lang(arg),
            "chat" | "c" => ReplCommand::Chat(arg),
            "session" | "s" => ReplCommand::Session,
            "reset" => ReplCommand::Reset,
            "forget" => ReplCommand::Forget,
            "help" | "h" | "?" => ReplCommand::Help,
            "quit" | "q" | "exit" => ReplCommand::Quit,
            _ => ReplCommand::Unknown(cmd),
        }
    }
}

const HELP: &str = "\
Type a message to classify it. Session commands:
  :lang [code|auto]   show or set the language hint
  :chat [key]         show or switch the conversation
  :session            show the stored session
  :reset              clear flow state, keep the selected domain
  :forget             delete the stored session
  :help               this help
  :quit               exit";

/// REPL state
pub struct Repl {
    editor: DefaultEditor,
    router: Router,
    runtime: Handle,
    chat: String,
    language: Option<String>,
    history_path: PathBuf,
}

impl Repl {
    /// Creates a new REPL that keeps its line history in `history_path`.
    pub fn new(
        router: Router,
        runtime: Handle,
        chat: &str,
        language: Option<String>,
        history_path: PathBuf,
    ) -> Result<Self> {
        let mut editor = DefaultEditor::new()?;
        if history_path.exists() {
            let _ = editor.load_history(&history_path);
        }

        Ok(Self {
            editor,
            router,
            runtime,
            chat: chat.to_string(),
            language,
            history_path,
        })
    }

    /// Runs the REPL loop.
    pub fn run(&mut self) -> Result<()> {
        println!("Catalog Router v{}", env!("CARGO_PKG_VERSION"));
        println!("Type :help for commands, :quit to exit");
        if self.router.engine().llm_enabled() {
            println!("LLM fallback enabled");
        }
        println!();

        loop {
            match self.editor.readline(&self.prompt()) {
                Ok(line) => {
                    if line.trim().is_empty() {
                        continue;
                    }
                    self.editor.add_history_entry(line.as_str())?;

                    let cmd = ReplCommand::parse(&line);
                    debug!(?cmd, "Parsed command");

                    match self.handle_command(cmd) {
                        Ok(true) => break,
                        Ok(false) => {}
                        Err(e) => eprintln!("Error: {e}"),
                    }
                }
                Err(ReadlineError::Interrupted) => println!("^C"),
                Err(ReadlineError::Eof) => break,
                Err(err) => {
                    eprintln!("Error: {err}");
                    break;
                }
            }
        }

        if let Some(parent) = self.history_path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        let _ = self.editor.save_history(&self.history_path);
        println!("Goodbye!");
        Ok(())
    }

    fn prompt(&self) -> String {
        match &self.language {
            Some(lang) => format!("router [{} {}]> ", self.chat, lang),
            None => format!("router [{}]> ", self.chat),
        }
    }

    /// Handles a REPL command. Returns Ok(true) if should quit.
    fn handle_command(&mut self, cmd: ReplCommand) -> Result<bool> {
        match cmd {
            ReplCommand::Text(text) => {
                let decision = self.runtime.block_on(self.router.handle(
                    &self.chat,
                    &text,
                    self.language.as_deref(),
                ));
                println!("{}", render_decision(&decision));
            }
            ReplCommand::Lang(None) => {
                println!("Language: {}", self.language.as_deref().unwrap_or("auto"));
            }
            ReplCommand::Lang(Some(lang)) => {
                self.language = (lang != "auto").then_some(lang);
            }
            ReplCommand::Chat(None) => println!("Conversation: {}", self.chat),
            ReplCommand::Chat(Some(chat)) => self.chat = chat,
            ReplCommand::Session => match self.router.store().get(&self.chat)? {
                Some(session) => println!("{}", serde_json::to_string_pretty(&session)?),
                None => println!("No session for '{}'.", self.chat),
            },
            ReplCommand::Reset => {
                self.router.store().clear_state(&self.chat)?;
                println!("Flow state cleared.");
            }
            ReplCommand::Forget => {
                self.router.store().clear(&self.chat)?;
                println!("Session deleted.");
            }
            ReplCommand::Help => println!("{HELP}"),
            ReplCommand::Quit => return Ok(true),
            ReplCommand::Unknown(cmd) => {
                println!("Unknown command ':{cmd}'. Type :help for commands.");
            }
        }
        Ok(false)
    }
}
