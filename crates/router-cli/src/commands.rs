//! Command handlers and the engine/session wiring they share.

use std::sync::Arc;

use router_core::{
    EngineSettings, IntentConfig, IntentDecision, IntentEngine, LlmSettings,
    OpenRouterClassifier, RouterPaths, SessionSnapshot,
};
use router_persistence::{FileSessionStore, SessionStore, StoredSession};
use tracing::{debug, info, warn};

use crate::cli::{Cli, Commands};
use crate::error::Result;
use crate::repl::Repl;

/// Build the engine from on-disk configuration and the environment.
pub fn build_engine(cli: &Cli, paths: &RouterPaths) -> Result<IntentEngine> {
    let config = IntentConfig::load_or_builtin(&paths.intent_dir())?;
    let mut settings = EngineSettings::from_env()?;
    if cli.no_llm {
        settings.use_llm_fallback = false;
    }

    let mut builder = IntentEngine::builder(config);
    if settings.use_llm_fallback {
        let llm = LlmSettings::from_env()?;
        if llm.is_configured() {
            settings.llm_timeout = llm.timeout;
            info!(model = %llm.model, "LLM fallback configured");
            builder = builder.llm_classifier(Arc::new(OpenRouterClassifier::new(llm)?));
        } else {
            debug!("No LLM API key, fallback tier disabled");
        }
    }
    Ok(builder.settings(settings).build()?)
}

/// Engine plus the store that carries session state between turns.
pub struct Router {
    engine: IntentEngine,
    store: Arc<dyn SessionStore>,
}

impl Router {
    pub fn new(engine: IntentEngine, store: Arc<dyn SessionStore>) -> Self {
        Self { engine, store }
    }

    pub fn engine(&self) -> &IntentEngine {
        &self.engine
    }

    pub fn store(&self) -> &dyn SessionStore {
        self.store.as_ref()
    }

    /// Classify `text` for conversation `chat` and remember the routed domain.
    ///
    /// Store failures are logged and never block classification.
    pub async fn handle(&self, chat: &str, text: &str, language: Option<&str>) -> IntentDecision {
        let snapshot = match self.store.get(chat) {
            Ok(stored) => stored.map(|s| snapshot_of(&s)).unwrap_or_default(),
            Err(e) => {
                warn!(chat, error = %e, "Failed to read session, continuing without it");
                SessionSnapshot::default()
            }
        };

        let decision = self.engine.decide_intent(text, language, &snapshot).await;

        if let Err(e) = self.remember(chat, &decision) {
            warn!(chat, error = %e, "Failed to update session");
        }
        decision
    }

    fn remember(&self, chat: &str, decision: &IntentDecision) -> Result<()> {
        if decision.need_clarification || !decision.source.is_routed() {
            return Ok(());
        }
        let intent = decision.intent.clone();
        let language = decision.language.clone();
        self.store.update(chat, &mut |session: &mut StoredSession| {
            session.selected_domain = Some(intent.clone());
            session.locale = Some(language.clone());
        })?;
        debug!(chat, domain = %decision.intent, "Session domain updated");
        Ok(())
    }
}

/// The engine's read-only view of a stored session.
pub fn snapshot_of(session: &StoredSession) -> SessionSnapshot {
    SessionSnapshot {
        selected_domain: session.selected_domain.clone(),
        locale: session.locale.clone(),
    }
}

/// One-line human summary of a decision.
pub fn render_decision(decision: &IntentDecision) -> String {
    let mut line = format!(
        "{} ({:.2}, {})",
        decision.intent, decision.confidence, decision.source
    );
    for (name, value) in &decision.slots {
        line.push_str(&format!(" {name}={value}"));
    }
    if decision.degraded {
        line.push_str(" [degraded]");
    }
    if let Some(question) = &decision.clarification_question {
        line.push_str("\n  ? ");
        line.push_str(question);
    }
    if let Some(error) = &decision.error {
        line.push_str("\n  ! ");
        line.push_str(error);
    }
    line
}

/// Execute a CLI command.
pub fn execute(cli: &Cli, runtime: &tokio::runtime::Runtime) -> Result<()> {
    let paths = cli.paths();
    match &cli.command {
        None => run_chat(cli, &paths, runtime, None, crate::cli::DEFAULT_CHAT),
        Some(Commands::Chat { lang, chat }) => {
            run_chat(cli, &paths, runtime, lang.clone(), chat)
        }
        Some(Commands::Classify {
            message,
            lang,
            chat,
            stateless,
            pretty,
        }) => cmd_classify(
            cli,
            &paths,
            runtime,
            &message.join(" "),
            lang.as_deref(),
            chat,
            *stateless,
            *pretty,
        ),
        Some(Commands::Session { chat, clear }) => cmd_session(&paths, chat, *clear),
        Some(Commands::ConfigCheck) => cmd_config_check(cli, &paths),
    }
}

fn file_store(paths: &RouterPaths) -> Arc<dyn SessionStore> {
    Arc::new(FileSessionStore::new(paths.sessions_file()))
}

fn run_chat(
    cli: &Cli,
    paths: &RouterPaths,
    runtime: &tokio::runtime::Runtime,
    lang: Option<String>,
    chat: &str,
) -> Result<()> {
    let router = Router::new(build_engine(cli, paths)?, file_store(paths));
    let handle = runtime.handle().clone();
    let mut repl = Repl::new(router, handle, chat, lang, paths.history_file())?;
    repl.run()
}

#[allow(clippy::too_many_arguments)]
fn cmd_classify(
    cli: &Cli,
    paths: &RouterPaths,
    runtime: &tokio::runtime::Runtime,
    text: &str,
    lang: Option<&str>,
    chat: &str,
    stateless: bool,
    pretty: bool,
) -> Result<()> {
    let engine = build_engine(cli, paths)?;
    let decision = if stateless {
        runtime.block_on(engine.decide_intent(text, lang, &SessionSnapshot::default()))
    } else {
        let router = Router::new(engine, file_store(paths));
        runtime.block_on(router.handle(chat, text, lang))
    };

    let json = if pretty {
        serde_json::to_string_pretty(&decision)?
    } else {
        serde_json::to_string(&decision)?
    };
    println!("{json}");
    Ok(())
}

fn cmd_session(paths: &RouterPaths, chat: &str, clear: bool) -> Result<()> {
    let store = FileSessionStore::new(paths.sessions_file());
    if clear {
        if store.clear(chat)? {
            println!("Cleared session '{chat}'.");
        } else {
            println!("No session for '{chat}'.");
        }
        return Ok(());
    }

    match store.get(chat)? {
        Some(session) => println!("{}", serde_json::to_string_pretty(&session)?),
        None => println!("No session for '{chat}'."),
    }
    Ok(())
}

fn cmd_config_check(cli: &Cli, paths: &RouterPaths) -> Result<()> {
    let dir = paths.intent_dir();
    let config = IntentConfig::load_or_builtin(&dir)?;
    let settings = EngineSettings::from_env()?;
    let llm = LlmSettings::from_env()?;

    let source = if IntentConfig::present_in(&dir) {
        dir.display().to_string()
    } else {
        "built-in".to_string()
    };
    println!("Intent configuration: {source}");
    println!(
        "  Languages: {}",
        config.lexicon.languages().collect::<Vec<_>>().join(", ")
    );
    println!("  Domains:   {}", config.lexicon.all_domains().join(", "));

    let mut thresholds = config.thresholds;
    settings.apply(&mut thresholds);
    println!(
        "  Thresholds: route_strong={} candidate=[{}, {}] rules_min={} llm_min={}",
        thresholds.route_strong,
        thresholds.route_candidate_low,
        thresholds.route_candidate_high,
        thresholds.rules_min_conf,
        thresholds.llm_min_conf
    );

    let llm_state = match (settings.use_llm_fallback && !cli.no_llm, llm.is_configured()) {
        (false, _) => "disabled".to_string(),
        (true, false) => "no API key".to_string(),
        (true, true) => format!("{} via {}", llm.model, llm.api_url),
    };
    println!("  LLM fallback: {llm_state}");
    println!("Sessions: {}", paths.sessions_file().display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use router_core::{DecisionSource, SlotValue};
    use router_persistence::MemorySessionStore;

    fn router() -> (Router, Arc<MemorySessionStore>) {
        let engine = IntentEngine::builder(IntentConfig::builtin().unwrap())
            .build()
            .unwrap();
        let store = Arc::new(MemorySessionStore::new());
        (Router::new(engine, store.clone()), store)
    }

    #[tokio::test]
    async fn test_routed_decision_updates_session() {
        let (router, store) = router();

        let decision = router.handle("42", "I want food for 2 people tonight", Some("en")).await;
        assert_eq!(decision.intent, "food");

        let session = store.get("42").unwrap().unwrap();
        assert_eq!(session.selected_domain.as_deref(), Some("food"));
        assert_eq!(session.locale.as_deref(), Some("en"));
    }

    #[tokio::test]
    async fn test_clarification_leaves_session_untouched() {
        let (router, store) = router();

        let decision = router.handle("42", "", None).await;
        assert!(decision.need_clarification);
        assert!(store.get("42").unwrap().is_none());
    }

    #[tokio::test]
    async fn test_stored_domain_biases_next_turn() {
        let (router, store) = router();
        store
            .set("7", StoredSession::new().with_domain("real_estate"))
            .unwrap();

        let decision = router
            .handle("7", "I need a service for my apartment rental business", Some("en"))
            .await;

        assert_eq!(decision.intent, "real_estate");
        assert_eq!(decision.source, DecisionSource::RulesCandidateSessionBiased);
    }

    #[test]
    fn test_render_decision() {
        let mut decision = IntentDecision::routed(
            "food",
            0.9,
            "en",
            Default::default(),
            DecisionSource::Rules,
        );
        decision.slots.insert("people".to_string(), SlotValue::from(2));
        decision.slots.insert("time".to_string(), SlotValue::from("tonight"));

        assert_eq!(
            render_decision(&decision),
            "food (0.90, rules) people=2 time=tonight"
        );
    }

    #[test]
    fn test_snapshot_of_copies_domain_and_locale() {
        let session = StoredSession::new().with_domain("business").with_locale("de");
        let snapshot = snapshot_of(&session);
        assert_eq!(snapshot.selected_domain.as_deref(), Some("business"));
        assert_eq!(snapshot.locale.as_deref(), Some("de"));
    }
}
