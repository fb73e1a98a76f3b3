//! Intent decision engine.
//!
//! Classifies a user message into a catalog domain with a two-tier policy:
//! deterministic lexicon rules first, an optional LLM fallback second, and a
//! clarification question when neither is confident enough.
//!
//! # Decision order
//!
//! 0. Explicit commands (`/menu`, "add service") route at 0.95.
//! 1. Rule scores and slots are computed, then session bias is applied.
//! 2. A top score at or above `route_strong` routes on rules.
//! 3. A candidate-band score for the session's selected domain routes with
//!    a continuity boost.
//! 4. The LLM tier is consulted under a timeout; a verdict at or above
//!    `llm_min_conf` routes.
//! 5. Otherwise the user is asked to clarify.
//!
//! [`IntentEngine::decide_intent`] never fails: collaborator errors and
//! panics become an `error` decision with confidence 0.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use tracing::{debug, error, info, warn};

pub mod bias;
pub mod clarify;
pub mod collaborators;
pub mod rules;
pub mod settings;
pub mod slots;
pub mod types;


pub use bias::apply_session_bias;
pub use clarify::{clarification_question, generic_question, GENERIC_QUESTION};
pub use collaborators::{DisabledClassifier, LlmClassifier, RuleMatcher, SlotRefiner};
pub use rules::{match_command, normalize_text, score_domains, tokenize, LexiconRuleMatcher};
pub use settings::{
    DomainAliases, EngineSettings, IntentConfig, Lexicon, Negations, Thresholds, Weights,
    DEFAULT_LANGUAGE,
};
pub use slots::{extract_slots, PatternSlotRefiner};
pub use types::{
    round_confidence, top_domain, DecisionSource, DomainScore, DomainScores, IntentDecision,
    LlmVerdict, RulesContext, SessionSnapshot, Signal, SlotSet, SlotValue, UNKNOWN_INTENT,
};

use crate::error::{IntentError, Result};

/// Confidence of an explicit command match.
pub const COMMAND_CONFIDENCE: f64 = 0.95;

/// Language tag meaning "undetermined".
const UNDETERMINED: &str = "und";

/// Primary subtag of a language tag, lowercased (`en-US` -> `en`).
pub fn primary_language(tag: &str) -> String {
    tag.trim()
        .split(['-', '_'])
        .next()
        .unwrap_or_default()
        .to_lowercase()
}

/// Pick the language for a call: explicit hint, then session locale, then
/// the default language.
pub fn resolve_language(hint: Option<&str>, session: &SessionSnapshot) -> String {
    let usable = |tag: &&str| {
        let primary = primary_language(tag);
        !primary.is_empty() && primary != UNDETERMINED
    };
    hint.filter(usable)
        .or_else(|| session.locale.as_deref().filter(usable))
        .map(primary_language)
        .unwrap_or_else(|| DEFAULT_LANGUAGE.to_string())
}

/// Two-tier intent classifier.
///
/// Cheap to share: holds only immutable configuration and `Arc`ed
/// collaborators.
pub struct IntentEngine {
    config: Arc<IntentConfig>,
    rules: Arc<dyn RuleMatcher>,
    slots: Arc<dyn SlotRefiner>,
    llm: Arc<dyn LlmClassifier>,
    llm_enabled: bool,
    llm_timeout: Duration,
}

impl std::fmt::Debug for IntentEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IntentEngine")
            .field("thresholds", &self.config.thresholds)
            .field("llm_enabled", &self.llm_enabled)
            .field("llm_timeout", &self.llm_timeout)
            .finish_non_exhaustive()
    }
}

/// Builder for [`IntentEngine`].
pub struct IntentEngineBuilder {
    config: IntentConfig,
    settings: EngineSettings,
    rules: Option<Arc<dyn RuleMatcher>>,
    slots: Option<Arc<dyn SlotRefiner>>,
    llm: Option<Arc<dyn LlmClassifier>>,
}

impl IntentEngineBuilder {
    /// Runtime switches and threshold overrides.
    pub fn settings(mut self, settings: EngineSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Replace the lexicon rule matcher.
    pub fn rule_matcher(mut self, rules: Arc<dyn RuleMatcher>) -> Self {
        self.rules = Some(rules);
        self
    }

    /// Replace the pattern slot refiner.
    pub fn slot_refiner(mut self, slots: Arc<dyn SlotRefiner>) -> Self {
        self.slots = Some(slots);
        self
    }

    /// Install an LLM classifier. Without one the LLM tier is disabled.
    pub fn llm_classifier(mut self, llm: Arc<dyn LlmClassifier>) -> Self {
        self.llm = Some(llm);
        self
    }

    /// Apply overrides, validate and build.
    ///
    /// # Errors
    /// Returns an error if the overridden thresholds are out of range.
    pub fn build(self) -> Result<IntentEngine> {
        let mut config = self.config;
        self.settings.apply(&mut config.thresholds);
        config.validate()?;
        let config = Arc::new(config);

        let rules = self
            .rules
            .unwrap_or_else(|| Arc::new(LexiconRuleMatcher::new(Arc::clone(&config))));
        let slots = self.slots.unwrap_or_else(|| Arc::new(PatternSlotRefiner));
        let llm = self.llm.unwrap_or_else(|| Arc::new(DisabledClassifier));
        let llm_enabled = self.settings.use_llm_fallback && llm.is_available();

        info!(
            llm_enabled,
            route_strong = config.thresholds.route_strong,
            llm_min_conf = config.thresholds.llm_min_conf,
            "Intent engine ready"
        );

        Ok(IntentEngine {
            config,
            rules,
            slots,
            llm,
            llm_enabled,
            llm_timeout: self.settings.llm_timeout,
        })
    }
}

impl IntentEngine {
    /// Start building an engine over `config`.
    pub fn builder(config: IntentConfig) -> IntentEngineBuilder {
        IntentEngineBuilder {
            config,
            settings: EngineSettings::default(),
            rules: None,
            slots: None,
            llm: None,
        }
    }

    /// The validated configuration in use.
    pub fn config(&self) -> &IntentConfig {
        &self.config
    }

    /// Whether the LLM tier will be consulted.
    pub fn llm_enabled(&self) -> bool {
        self.llm_enabled
    }

    /// Classify `text`.
    ///
    /// Never fails and never panics: any internal error or collaborator
    /// panic yields a decision with source `error` and confidence 0.
    pub async fn decide_intent(
        &self,
        text: &str,
        language_hint: Option<&str>,
        session: &SessionSnapshot,
    ) -> IntentDecision {
        let language = resolve_language(language_hint, session);
        let outcome = AssertUnwindSafe(self.decide(text, &language, session))
            .catch_unwind()
            .await;

        let decision = match outcome {
            Ok(Ok(decision)) => decision,
            Ok(Err(e)) => {
                error!(error = %e, "Intent classification failed");
                error_decision(&language, &e)
            }
            Err(payload) => {
                let e = IntentError::Panicked(panic_message(payload.as_ref()));
                error!(error = %e, "Intent classification panicked");
                error_decision(&language, &e)
            }
        };

        info!(
            intent = %decision.intent,
            confidence = decision.confidence,
            source = %decision.source,
            language = %decision.language,
            need_clarification = decision.need_clarification,
            "Intent decided"
        );
        decision
    }

    async fn decide(
        &self,
        text: &str,
        language: &str,
        session: &SessionSnapshot,
    ) -> std::result::Result<IntentDecision, IntentError> {
        let thresholds = &self.config.thresholds;

        if let Some(domain) = rules::match_command(text) {
            let slots = self
                .slots
                .refine(text, language, Some(domain), SlotSet::new())
                .await;
            debug!(domain, "Command matched");
            return Ok(IntentDecision::routed(
                domain,
                COMMAND_CONFIDENCE,
                language,
                slots,
                DecisionSource::RulesCommand,
            ));
        }

        let scores = self.rules.score(text, language).await?;
        let (top, _, _) = summarize(&scores)?;
        let hint = (top != UNKNOWN_INTENT).then_some(top.as_str());
        let slots = self.slots.refine(text, language, hint, SlotSet::new()).await;

        let selected = session.selected_domain.as_deref();
        let scores = apply_session_bias(scores, selected);
        let (top, top_score, signals) = summarize(&scores)?;
        let known = top != UNKNOWN_INTENT;

        if known && top_score >= thresholds.route_strong {
            return Ok(
                IntentDecision::routed(&top, top_score, language, slots, DecisionSource::Rules)
                    .with_signals(signals),
            );
        }

        let in_band = (thresholds.route_candidate_low..=thresholds.route_candidate_high)
            .contains(&top_score);
        if known && in_band && selected == Some(top.as_str()) {
            return Ok(IntentDecision::routed(
                &top,
                (top_score + bias::BIAS_BOOST).min(bias::BIAS_CAP),
                language,
                slots,
                DecisionSource::RulesCandidateSessionBiased,
            )
            .with_signals(signals));
        }

        if self.llm_enabled {
            let context = RulesContext {
                best_guess: top.clone(),
                best_score: top_score,
                allowed_intents: self.rules.domains(),
            };
            if let Some(decision) = self.consult_llm(text, language, &context).await {
                return Ok(decision.with_signals(signals));
            }
        }

        if known && top_score >= thresholds.rules_min_conf {
            return Ok(IntentDecision::clarify(
                &top,
                top_score,
                language,
                slots,
                DecisionSource::RulesLow,
                clarification_question(&top, language),
            )
            .with_signals(signals));
        }

        // Signals describe the top domain; an unknown intent carries none.
        Ok(IntentDecision::clarify(
            UNKNOWN_INTENT,
            0.0,
            language,
            slots,
            DecisionSource::Fallback,
            generic_question(language),
        ))
    }

    /// Ask the LLM tier; `Some` only for a verdict good enough to route on.
    async fn consult_llm(
        &self,
        text: &str,
        language: &str,
        context: &RulesContext,
    ) -> Option<IntentDecision> {
        let verdict = match tokio::time::timeout(
            self.llm_timeout,
            self.llm.classify(text, language, context),
        )
        .await
        {
            Ok(Some(verdict)) => verdict,
            Ok(None) => {
                debug!("LLM tier returned no verdict");
                return None;
            }
            Err(_) => {
                warn!(timeout_ms = self.llm_timeout.as_millis() as u64, "LLM call timed out");
                return None;
            }
        };

        let min_conf = self.config.thresholds.llm_min_conf;
        if verdict.intent == UNKNOWN_INTENT || verdict.confidence < min_conf {
            debug!(
                intent = %verdict.intent,
                confidence = verdict.confidence,
                min_conf,
                "LLM verdict below threshold"
            );
            return None;
        }

        let language = if verdict.language.is_empty() {
            language.to_string()
        } else {
            verdict.language.clone()
        };
        let slots = self
            .slots
            .refine(text, &language, Some(&verdict.intent), verdict.slots)
            .await;
        let mut decision = IntentDecision::routed(
            verdict.intent,
            verdict.confidence,
            language,
            slots,
            DecisionSource::Llm,
        );
        decision.degraded = verdict.degraded;
        Some(decision)
    }
}

/// Top domain name, its score and signals. A zero top score reads as
/// `unknown`.
fn summarize(
    scores: &DomainScores,
) -> std::result::Result<(String, f64, Vec<Signal>), IntentError> {
    if let Some(bad) = scores.values().find(|r| !r.score.is_finite()) {
        return Err(IntentError::NonFiniteScore {
            domain: bad.domain.clone(),
        });
    }
    match top_domain(scores) {
        Some(record) if record.score > 0.0 => Ok((
            record.domain.clone(),
            record.score.clamp(0.0, 1.0),
            record.signals.clone(),
        )),
        _ => Ok((UNKNOWN_INTENT.to_string(), 0.0, Vec::new())),
    }
}

fn error_decision(language: &str, e: &IntentError) -> IntentDecision {
    let mut decision = IntentDecision::clarify(
        UNKNOWN_INTENT,
        0.0,
        language,
        SlotSet::new(),
        DecisionSource::Error,
        generic_question(language),
    );
    decision.error = Some(e.to_string());
    decision
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
