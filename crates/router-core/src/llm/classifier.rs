//! LLM fallback classifier.
//!
//! Builds a constrained prompt, posts it through [`ChatClient`] and parses
//! the answer. A malformed answer is salvaged by a keyword scan and flagged
//! as degraded; provider failures yield no verdict at all.

use std::sync::OnceLock;
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tracing::{debug, warn};

use super::client::{ChatClient, ChatMessage, ChatRequest, ResponseFormat, OPENROUTER_API_URL};
use crate::error::{ConfigError, LlmError};
use crate::intent::collaborators::LlmClassifier;
use crate::intent::primary_language;
use crate::intent::types::{LlmVerdict, RulesContext, SlotSet, SlotValue, UNKNOWN_INTENT};

pub const LLM_API_URL_ENV: &str = "LLM_API_URL";
pub const LLM_API_KEY_ENV: &str = "LLM_API_KEY";
/// Consulted when `LLM_API_KEY` is unset.
pub const OPENROUTER_API_KEY_ENV: &str = "OPENROUTER_API_KEY";
pub const LLM_MODEL_ENV: &str = "LLM_MODEL";
pub const LLM_TIMEOUT_MS_ENV: &str = "LLM_TIMEOUT_MS";

const DEFAULT_MODEL: &str = "openai/gpt-4o-mini";
const DEFAULT_TIMEOUT_MS: u64 = 4000;
const DEFAULT_MAX_TOKENS: u32 = 500;
const DEFAULT_TEMPERATURE: f32 = 0.1;

/// Confidence assigned to an intent recovered by keyword scan.
pub const DEGRADED_CONFIDENCE: f64 = 0.6;

const SYSTEM_PROMPT: &str = "You are an intent classification assistant for a service catalog. \
Analyze the user's message and determine their intent.

Output ONLY a JSON object with exactly these fields:
- intent: one of {intents}
- confidence: a number between 0 and 1 representing your certainty
- language: the ISO 639-1 code of the user's message
- slots: an object with extracted details such as time, location, people, term, cuisine, \
property_type

Guidelines:
1. Infer slots from the message but do not invent facts.
2. If the user asks for a menu or a listing of services, use \"menu\".
3. If the user wants to add a new service, use \"add_service\".
4. For ambiguous messages, give a lower confidence.
5. Respond with the JSON object only.";

/// Provider settings for the LLM tier.
#[derive(Clone, PartialEq)]
pub struct LlmSettings {
    pub api_url: String,
    pub api_key: Option<String>,
    pub model: String,
    pub timeout: Duration,
    pub max_tokens: u32,
    pub temperature: f32,
}

impl std::fmt::Debug for LlmSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmSettings")
            .field("api_url", &self.api_url)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("model", &self.model)
            .field("timeout", &self.timeout)
            .field("max_tokens", &self.max_tokens)
            .field("temperature", &self.temperature)
            .finish()
    }
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            api_url: OPENROUTER_API_URL.to_string(),
            api_key: None,
            model: DEFAULT_MODEL.to_string(),
            timeout: Duration::from_millis(DEFAULT_TIMEOUT_MS),
            max_tokens: DEFAULT_MAX_TOKENS,
            temperature: DEFAULT_TEMPERATURE,
        }
    }
}

impl LlmSettings {
    /// Read settings from the process environment.
    ///
    /// # Errors
    /// Returns an error if `LLM_TIMEOUT_MS` is not a positive integer.
    pub fn from_env() -> crate::error::Result<Self> {
        Self::from_vars(|name| std::env::var(name).ok())
    }

    /// Read settings through `var`, which maps a variable name to its value.
    ///
    /// # Errors
    /// Returns an error if `LLM_TIMEOUT_MS` is not a positive integer.
    pub fn from_vars(var: impl Fn(&str) -> Option<String>) -> crate::error::Result<Self> {
        let non_empty = |name: &str| {
            var(name)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let mut settings = Self::default();

        if let Some(url) = non_empty(LLM_API_URL_ENV) {
            settings.api_url = url;
        }
        settings.api_key = non_empty(LLM_API_KEY_ENV).or_else(|| non_empty(OPENROUTER_API_KEY_ENV));
        if let Some(model) = non_empty(LLM_MODEL_ENV) {
            settings.model = model;
        }
        if let Some(raw) = non_empty(LLM_TIMEOUT_MS_ENV) {
            let ms: u64 = raw
                .parse()
                .ok()
                .filter(|ms| *ms > 0)
                .ok_or_else(|| {
                    ConfigError::Invalid(format!(
                        "{LLM_TIMEOUT_MS_ENV} = {raw:?} is not a positive integer"
                    ))
                })?;
            settings.timeout = Duration::from_millis(ms);
        }
        Ok(settings)
    }

    /// Whether both an endpoint and a key are present.
    pub fn is_configured(&self) -> bool {
        !self.api_url.is_empty() && self.api_key.is_some()
    }
}

/// LLM classifier over an OpenAI-compatible chat endpoint.
#[derive(Debug, Clone)]
pub struct OpenRouterClassifier {
    client: ChatClient,
    settings: LlmSettings,
}

impl OpenRouterClassifier {
    /// Build a classifier from settings.
    ///
    /// # Errors
    /// Returns `NotConfigured` without an API key, or an error if the HTTP
    /// client cannot be built.
    pub fn new(settings: LlmSettings) -> Result<Self, LlmError> {
        let Some(api_key) = settings.api_key.clone() else {
            return Err(LlmError::NotConfigured);
        };
        if settings.api_url.is_empty() {
            return Err(LlmError::NotConfigured);
        }
        let client = ChatClient::new(&settings.api_url, api_key, settings.timeout)?;
        Ok(Self { client, settings })
    }

    pub fn settings(&self) -> &LlmSettings {
        &self.settings
    }

    fn build_request(&self, text: &str, language: &str, context: &RulesContext) -> ChatRequest {
        ChatRequest {
            model: self.settings.model.clone(),
            messages: build_messages(text, language, context),
            max_tokens: Some(self.settings.max_tokens),
            temperature: Some(self.settings.temperature),
            response_format: Some(ResponseFormat::json_object()),
        }
    }

    async fn request_content(
        &self,
        text: &str,
        language: &str,
        context: &RulesContext,
    ) -> Result<String, LlmError> {
        let request = self.build_request(text, language, context);
        let response = self.client.chat(&request).await?;
        response
            .content()
            .map(str::to_string)
            .ok_or_else(|| LlmError::ResponseParse("response has no message content".into()))
    }
}

#[async_trait]
impl LlmClassifier for OpenRouterClassifier {
    async fn classify(
        &self,
        text: &str,
        language: &str,
        context: &RulesContext,
    ) -> Option<LlmVerdict> {
        if text.trim().is_empty() {
            return None;
        }
        match self.request_content(text, language, context).await {
            Ok(content) => {
                let verdict = parse_llm_answer(&content, language, &context.allowed_intents);
                debug!(
                    intent = %verdict.intent,
                    confidence = verdict.confidence,
                    degraded = verdict.degraded,
                    "LLM verdict"
                );
                Some(verdict)
            }
            Err(e) => {
                warn!(error = %e, "LLM classification failed");
                None
            }
        }
    }
}

/// System and user messages for one classification.
pub fn build_messages(text: &str, language: &str, context: &RulesContext) -> Vec<ChatMessage> {
    let mut intents: Vec<String> = context
        .allowed_intents
        .iter()
        .filter(|i| i.as_str() != UNKNOWN_INTENT)
        .map(|i| format!("\"{i}\""))
        .collect();
    intents.push(format!("\"{UNKNOWN_INTENT}\""));
    let system = SYSTEM_PROMPT.replace("{intents}", &intents.join(", "));

    let mut user = json!({
        "message": text,
        "language": language,
    });
    if let Some(hint) = context.hint() {
        user["rules_hint"] = json!({
            "intent": hint,
            "confidence": (context.best_score * 100.0).round() / 100.0,
        });
    }

    vec![ChatMessage::system(system), ChatMessage::user(user.to_string())]
}

#[derive(Debug, Deserialize)]
struct StrictAnswer {
    intent: String,
    confidence: f64,
    language: String,
    slots: Map<String, Value>,
}

/// Parse a model answer into a verdict.
///
/// The answer must be a JSON object with `intent`, `confidence`, `language`
/// and `slots`. Anything else is scanned for intent keywords instead and
/// the verdict is marked degraded. Intents outside `allowed` become
/// `unknown`.
pub fn parse_llm_answer(content: &str, language: &str, allowed: &[String]) -> LlmVerdict {
    let is_allowed = |intent: &str| allowed.iter().any(|a| a == intent);

    match serde_json::from_str::<StrictAnswer>(strip_code_fence(content)) {
        Ok(answer) => {
            let intent = answer.intent.trim().to_lowercase();
            let intent = if is_allowed(&intent) {
                intent
            } else {
                UNKNOWN_INTENT.to_string()
            };
            let language = language_code(&answer.language).unwrap_or_else(|| language.to_string());
            LlmVerdict {
                intent,
                confidence: answer.confidence.clamp(0.0, 1.0),
                language,
                slots: convert_slots(answer.slots),
                degraded: false,
            }
        }
        Err(e) => {
            warn!(error = %e, "LLM answer is not valid JSON, scanning for keywords");
            let intent = keyword_scan(content, allowed).unwrap_or(UNKNOWN_INTENT);
            let confidence = if intent == UNKNOWN_INTENT {
                0.0
            } else {
                DEGRADED_CONFIDENCE
            };
            LlmVerdict {
                intent: intent.to_string(),
                confidence,
                language: language.to_string(),
                slots: SlotSet::new(),
                degraded: true,
            }
        }
    }
}

/// Two-letter primary subtag of a model-reported language, if it is one.
fn language_code(raw: &str) -> Option<String> {
    let code = primary_language(raw.trim());
    (code.len() == 2 && code.bytes().all(|b| b.is_ascii_lowercase())).then_some(code)
}

/// Unwrap a ```json fenced block if the model added one.
fn strip_code_fence(content: &str) -> &str {
    let trimmed = content.trim();
    trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .and_then(|rest| rest.strip_suffix("```"))
        .map(str::trim)
        .unwrap_or(trimmed)
}

fn convert_slots(raw: Map<String, Value>) -> SlotSet {
    raw.into_iter()
        .filter_map(|(key, value)| {
            let value = match value {
                Value::String(s) if !s.trim().is_empty() => SlotValue::Text(s),
                Value::Number(n) => match n.as_i64() {
                    Some(i) => SlotValue::Int(i),
                    None => match n.as_f64() {
                        Some(f) if f.fract() == 0.0 && f.abs() < 1e15 => SlotValue::Int(f as i64),
                        Some(f) => SlotValue::Text(f.to_string()),
                        None => return None,
                    },
                },
                _ => return None,
            };
            Some((key, value))
        })
        .collect()
}

fn keyword_patterns() -> &'static [(&'static str, Regex)] {
    static PATTERNS: OnceLock<Vec<(&'static str, Regex)>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        [
            ("add_service", r"(?i)\b(add|create|new)[\s_]+service\b"),
            ("menu", r"(?i)\b(menu|help|start|categories)\b"),
            ("food", r"(?i)\b(food|restaurant|meal|eat|dining)\b"),
            ("real_estate", r"(?i)\b(real[\s_]estate|rent|apartment|house|property)\b"),
            ("transportation", r"(?i)\b(transport|transportation|taxi|ride|bus|car)\b"),
            ("business", r"(?i)\b(business|service|company|enterprise)\b"),
        ]
        .into_iter()
        .map(|(intent, pattern)| (intent, Regex::new(pattern).expect("keyword pattern is valid")))
        .collect()
    })
}

/// First allowed intent whose keywords appear in `content`.
fn keyword_scan(content: &str, allowed: &[String]) -> Option<&'static str> {
    keyword_patterns()
        .iter()
        .find(|(intent, re)| allowed.iter().any(|a| a == intent) && re.is_match(content))
        .map(|(intent, _)| *intent)
}
