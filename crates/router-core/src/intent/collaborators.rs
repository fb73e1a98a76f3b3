//! Collaborator interfaces injected into the decision engine.
//!
//! The engine awaits every collaborator the same way, whether the concrete
//! implementation does I/O or is pure computation.

use async_trait::async_trait;

use super::types::{DomainScores, LlmVerdict, RulesContext, SlotSet};
use crate::error::IntentError;

/// Scores domains for a message.
#[async_trait]
pub trait RuleMatcher: Send + Sync {
    /// Score every domain known for `language`.
    async fn score(&self, text: &str, language: &str) -> Result<DomainScores, IntentError>;

    /// Every domain this matcher can produce.
    fn domains(&self) -> Vec<String>;
}

/// Extracts or refines slots for a message.
#[async_trait]
pub trait SlotRefiner: Send + Sync {
    /// Merge slots found in `text` into `base`.
    async fn refine(
        &self,
        text: &str,
        language: &str,
        intent_hint: Option<&str>,
        base: SlotSet,
    ) -> SlotSet;
}

/// Probabilistic fallback classifier.
#[async_trait]
pub trait LlmClassifier: Send + Sync {
    /// Classify `text`. `None` means the provider could not answer.
    async fn classify(
        &self,
        text: &str,
        language: &str,
        context: &RulesContext,
    ) -> Option<LlmVerdict>;

    /// Whether this classifier can be called at all.
    fn is_available(&self) -> bool {
        true
    }
}

/// Classifier used when no LLM provider is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct DisabledClassifier;

#[async_trait]
impl LlmClassifier for DisabledClassifier {
    async fn classify(
        &self,
        _text: &str,
        _language: &str,
        _context: &RulesContext,
    ) -> Option<LlmVerdict> {
        None
    }

    fn is_available(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_disabled_classifier() {
        let context = RulesContext {
            best_guess: "food".into(),
            best_score: 0.4,
            allowed_intents: vec!["food".into()],
        };
        assert!(!DisabledClassifier.is_available());
        assert!(DisabledClassifier.classify("hi", "en", &context).await.is_none());
        assert_eq!(context.hint(), Some("food"));
    }
}
