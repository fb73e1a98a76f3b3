//! Type definitions for intent decisions.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Intent name used when no domain could be chosen.
pub const UNKNOWN_INTENT: &str = "unknown";

/// Which rule fired for a domain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Signal {
    /// A strong alias matched as whole tokens.
    AliasStrong,
    /// A weak alias matched as a substring.
    AliasWeak,
    /// A negation word appeared next to a match.
    Negation,
    /// More than one domain had a strong match.
    Conflict,
    /// Boosted for continuity with the session's selected domain.
    SessionBias,
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self {
            Self::AliasStrong => "alias_strong",
            Self::AliasWeak => "alias_weak",
            Self::Negation => "negation",
            Self::Conflict => "conflict",
            Self::SessionBias => "session_bias",
        };
        f.write_str(tag)
    }
}

/// Score of one domain for one message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DomainScore {
    pub domain: String,
    /// Always within [0.0, 1.0].
    pub score: f64,
    /// Rules that fired, in firing order, without duplicates.
    pub signals: Vec<Signal>,
}

impl DomainScore {
    /// A zero score with no signals.
    pub fn empty(domain: impl Into<String>) -> Self {
        Self {
            domain: domain.into(),
            score: 0.0,
            signals: Vec::new(),
        }
    }

    /// Whether `signal` has fired.
    pub fn has(&self, signal: Signal) -> bool {
        self.signals.contains(&signal)
    }

    /// Record `signal` unless it already fired.
    pub fn push_signal(&mut self, signal: Signal) {
        if !self.has(signal) {
            self.signals.push(signal);
        }
    }

    /// Add `delta` and clamp the result to [0.0, 1.0].
    pub fn adjust(&mut self, delta: f64) {
        self.score = (self.score + delta).clamp(0.0, 1.0);
    }
}

/// Domain name -> score, iterated in domain-name order.
pub type DomainScores = BTreeMap<String, DomainScore>;

/// Highest-scoring domain.
///
/// Ties go to the lexicographically smallest domain name. `None` when the
/// map is empty.
pub fn top_domain(scores: &DomainScores) -> Option<&DomainScore> {
    let mut best: Option<&DomainScore> = None;
    for record in scores.values() {
        match best {
            Some(b) if record.score <= b.score => {}
            _ => best = Some(record),
        }
    }
    best
}

/// A slot value: either free text or a count.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SlotValue {
    Int(i64),
    Text(String),
}

impl SlotValue {
    /// The text value, if this is text.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            Self::Int(_) => None,
        }
    }

    /// The integer value, if this is an integer.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(n) => Some(*n),
            Self::Text(_) => None,
        }
    }
}

impl fmt::Display for SlotValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(n) => write!(f, "{n}"),
            Self::Text(s) => f.write_str(s),
        }
    }
}

impl From<&str> for SlotValue {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<String> for SlotValue {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<i64> for SlotValue {
    fn from(n: i64) -> Self {
        Self::Int(n)
    }
}

/// Slot name -> value. A missing key means "not detected".
pub type SlotSet = BTreeMap<String, SlotValue>;

/// Read-only view of the caller's conversation state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    /// Domain the conversation was last routed to.
    pub selected_domain: Option<String>,
    /// Conversation locale, e.g. `en` or `ru-RU`.
    pub locale: Option<String>,
}

impl SessionSnapshot {
    /// Snapshot with a selected domain.
    pub fn with_domain(domain: impl Into<String>) -> Self {
        Self {
            selected_domain: Some(domain.into()),
            locale: None,
        }
    }
}

/// How a decision was reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionSource {
    /// Top rule score reached `route_strong`.
    Rules,
    /// An explicit command such as `/menu` or "add service".
    RulesCommand,
    /// Candidate band score matching the session's selected domain.
    RulesCandidateSessionBiased,
    /// LLM verdict above `llm_min_conf`.
    Llm,
    /// A weak rule guess; clarification needed.
    RulesLow,
    /// Nothing usable; clarification needed.
    Fallback,
    /// An internal failure was absorbed.
    Error,
}

impl DecisionSource {
    /// Whether the caller can route without asking the user.
    pub fn is_routed(self) -> bool {
        matches!(
            self,
            Self::Rules | Self::RulesCommand | Self::RulesCandidateSessionBiased | Self::Llm
        )
    }
}

impl fmt::Display for DecisionSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Rules => "rules",
            Self::RulesCommand => "rules_command",
            Self::RulesCandidateSessionBiased => "rules_candidate_session_biased",
            Self::Llm => "llm",
            Self::RulesLow => "rules_low",
            Self::Fallback => "fallback",
            Self::Error => "error",
        };
        f.write_str(name)
    }
}

/// The engine's answer for one message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntentDecision {
    /// Domain name or `unknown`.
    pub intent: String,
    /// Within [0.0, 1.0], rounded to three decimals.
    pub confidence: f64,
    pub language: String,
    pub slots: SlotSet,
    pub source: DecisionSource,
    pub need_clarification: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub clarification_question: Option<String>,
    #[serde(default)]
    pub next_questions: Vec<String>,
    /// Domain handler the caller should route to, when routed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_domain: Option<String>,
    /// Signals of the top rule domain.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub signals: Vec<Signal>,
    /// Set when the LLM answer had to be recovered by keyword scan.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub degraded: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl IntentDecision {
    /// A routed decision.
    pub fn routed(
        intent: impl Into<String>,
        confidence: f64,
        language: impl Into<String>,
        slots: SlotSet,
        source: DecisionSource,
    ) -> Self {
        let intent = intent.into();
        Self {
            target_domain: Some(intent.clone()),
            intent,
            confidence: round_confidence(confidence),
            language: language.into(),
            slots,
            source,
            need_clarification: false,
            clarification_question: None,
            next_questions: Vec::new(),
            signals: Vec::new(),
            degraded: false,
            error: None,
        }
    }

    /// A decision asking the user to clarify.
    pub fn clarify(
        intent: impl Into<String>,
        confidence: f64,
        language: impl Into<String>,
        slots: SlotSet,
        source: DecisionSource,
        question: impl Into<String>,
    ) -> Self {
        let question = question.into();
        Self {
            intent: intent.into(),
            confidence: round_confidence(confidence),
            language: language.into(),
            slots,
            source,
            need_clarification: true,
            clarification_question: Some(question.clone()),
            next_questions: vec![question],
            target_domain: None,
            signals: Vec::new(),
            degraded: false,
            error: None,
        }
    }

    /// Attach the top domain's rule signals.
    pub fn with_signals(mut self, signals: Vec<Signal>) -> Self {
        self.signals = signals;
        self
    }
}

/// What the rule tier knew when it handed over to the LLM.
#[derive(Debug, Clone, PartialEq)]
pub struct RulesContext {
    /// Top rule domain, or `unknown` when nothing matched.
    pub best_guess: String,
    pub best_score: f64,
    /// Domains the model may answer with, excluding `unknown`.
    pub allowed_intents: Vec<String>,
}

impl RulesContext {
    /// The rule guess, unless it is `unknown`.
    pub fn hint(&self) -> Option<&str> {
        (self.best_guess != UNKNOWN_INTENT).then_some(self.best_guess.as_str())
    }
}

/// A classification produced by the LLM tier.
#[derive(Debug, Clone, PartialEq)]
pub struct LlmVerdict {
    pub intent: String,
    /// Clamped to [0.0, 1.0].
    pub confidence: f64,
    pub language: String,
    pub slots: SlotSet,
    /// The answer was not valid JSON and was recovered by keyword scan.
    pub degraded: bool,
}

/// Clamp to [0, 1] and round to three decimals. NaN becomes 0.
pub fn round_confidence(value: f64) -> f64 {
    if !value.is_finite() {
        return 0.0;
    }
    (value.clamp(0.0, 1.0) * 1000.0).round() / 1000.0
}
