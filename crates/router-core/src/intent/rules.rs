//! Deterministic rule tier: tokenization, command pre-rules and lexicon scoring.

use std::sync::{Arc, OnceLock};

use async_trait::async_trait;
use regex::Regex;
use tracing::debug;

use super::collaborators::RuleMatcher;
use super::settings::{IntentConfig, Lexicon, Weights};
use super::types::{top_domain, DomainScore, DomainScores, Signal};
use crate::error::IntentError;

/// Domain for the catalog menu command.
pub const MENU_DOMAIN: &str = "menu";

/// Domain for the add-service command.
pub const ADD_SERVICE_DOMAIN: &str = "add_service";

fn token_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[\w\-]+").expect("token regex is valid"))
}

fn separator_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[_\-]+").expect("separator regex is valid"))
}

/// Command patterns checked against normalized text, most specific first.
fn command_patterns() -> &'static [(&'static str, Regex)] {
    static PATTERNS: OnceLock<Vec<(&'static str, Regex)>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        vec![
            (
                ADD_SERVICE_DOMAIN,
                Regex::new(concat!(
                    r"^/(add|new|service add)$",
                    r"|\b(add|create|new|register)\s*services?\b",
                    r"|(добавить|создать)\s+(услугу|сервис)|новая\s+услуга",
                ))
                .expect("add_service pattern is valid"),
            ),
            (
                MENU_DOMAIN,
                Regex::new(concat!(
                    r"^/(menu|start|help)$",
                    r"|^(menu|categories|help|what can you do|меню|помощь|категории)\b",
                ))
                .expect("menu pattern is valid"),
            ),
        ]
    })
}

/// Lowercase word tokens. Word characters and hyphens form a token.
pub fn tokenize(text: &str) -> Vec<String> {
    token_regex()
        .find_iter(text)
        .map(|m| m.as_str().to_lowercase())
        .collect()
}

/// Normalize command spellings so `AddService`, `add_service` and
/// `add-service` all read `add service`.
///
/// Splits CamelCase, turns underscores and hyphens into spaces, squeezes
/// whitespace and lowercases.
pub fn normalize_text(text: &str) -> String {
    let mut split = String::with_capacity(text.len() + 4);
    let mut prev_lower = false;
    for ch in text.chars() {
        if prev_lower && ch.is_uppercase() {
            split.push(' ');
        }
        prev_lower = ch.is_lowercase();
        split.push(ch);
    }
    let spaced = separator_regex().replace_all(&split, " ");
    spaced
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Domain of an explicit command such as `/menu` or "add service".
pub fn match_command(text: &str) -> Option<&'static str> {
    let normalized = normalize_text(text);
    if normalized.is_empty() {
        return None;
    }
    command_patterns()
        .iter()
        .find(|(_, re)| re.is_match(&normalized))
        .map(|(domain, _)| *domain)
}

/// Whether `phrase` occurs in `tokens` as a contiguous run of whole tokens.
fn phrase_in_tokens(tokens: &[String], phrase: &str) -> bool {
    let needle = tokenize(phrase);
    if needle.is_empty() || needle.len() > tokens.len() {
        return false;
    }
    tokens.windows(needle.len()).any(|w| w == needle.as_slice())
}

/// Score every domain visible for `language` against `text`.
///
/// `negations` is the pooled, lowercased negation list. Scores are summed,
/// clamped to [0, 1], then domains sharing a strong match take the conflict
/// penalty and are clamped again.
pub fn score_domains(
    text: &str,
    lexicon: &Lexicon,
    language: &str,
    negations: &[String],
    weights: &Weights,
) -> DomainScores {
    let tokens = tokenize(text);
    let lowered = text.to_lowercase();
    let negated = tokens.iter().any(|t| negations.contains(t));

    let mut scores = DomainScores::new();
    for (domain, aliases) in lexicon.domains_for(language) {
        let mut record = DomainScore::empty(domain);
        let mut raw = 0.0;

        let strong = aliases.strong.iter().any(|p| phrase_in_tokens(&tokens, p));
        if strong {
            raw += weights.alias_strong;
            record.push_signal(Signal::AliasStrong);
        }

        let weak = aliases
            .weak
            .iter()
            .any(|p| !p.is_empty() && lowered.contains(&p.to_lowercase()));
        if weak {
            raw += weights.alias_weak;
            record.push_signal(Signal::AliasWeak);
        }

        if (strong || weak) && negated {
            raw += weights.negation;
            record.push_signal(Signal::Negation);
        }

        record.score = raw.clamp(0.0, 1.0);
        scores.insert(domain.to_string(), record);
    }

    let strong_count = scores.values().filter(|r| r.has(Signal::AliasStrong)).count();
    if strong_count > 1 {
        for record in scores.values_mut().filter(|r| r.has(Signal::AliasStrong)) {
            record.adjust(weights.conflict);
            record.push_signal(Signal::Conflict);
        }
    }

    scores
}

/// Rule matcher backed by the loaded lexicon.
#[derive(Debug, Clone)]
pub struct LexiconRuleMatcher {
    config: Arc<IntentConfig>,
    negations: Vec<String>,
}

impl LexiconRuleMatcher {
    pub fn new(config: Arc<IntentConfig>) -> Self {
        let negations = config.negations.pooled();
        Self { config, negations }
    }
}

#[async_trait]
impl RuleMatcher for LexiconRuleMatcher {
    async fn score(&self, text: &str, language: &str) -> Result<DomainScores, IntentError> {
        let scores = score_domains(
            text,
            &self.config.lexicon,
            language,
            &self.negations,
            &self.config.weights,
        );
        if scores.is_empty() {
            return Err(IntentError::NoDomains(language.to_string()));
        }
        if let Some(bad) = scores.values().find(|r| !r.score.is_finite()) {
            return Err(IntentError::NonFiniteScore {
                domain: bad.domain.clone(),
            });
        }

        if let Some(top) = top_domain(&scores) {
            debug!(language, domain = %top.domain, score = top.score, "Rule scores computed");
        }
        Ok(scores)
    }

    fn domains(&self) -> Vec<String> {
        self.config.lexicon.all_domains()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    fn builtin_scores(text: &str, language: &str) -> DomainScores {
        let config = IntentConfig::builtin().unwrap();
        score_domains(
            text,
            &config.lexicon,
            language,
            &config.negations.pooled(),
            &config.weights,
        )
    }

    #[test]
    fn test_tokenize() {
        assert_eq!(
            tokenize("Short-term Rent, please!"),
            vec!["short-term", "rent", "please"]
        );
        assert_eq!(tokenize("Хочу ЕДУ"), vec!["хочу", "еду"]);
        assert!(tokenize("  ?! ").is_empty());
    }

    #[test]
    fn test_normalize_text() {
        assert_eq!(normalize_text("AddService"), "add service");
        assert_eq!(normalize_text("add_service"), "add service");
        assert_eq!(normalize_text("add--service"), "add service");
        assert_eq!(normalize_text("  Show   Menu "), "show menu");
        assert_eq!(normalize_text(""), "");
    }

    #[test]
    fn test_match_command_add_service() {
        for text in [
            "add service",
            "Add Service please",
            "AddService",
            "/add_service",
            "I want to create a new service",
            "create services",
            "добавить услугу",
            "/new",
        ] {
            assert_eq!(match_command(text), Some(ADD_SERVICE_DOMAIN), "{text}");
        }
    }

    #[test]
    fn test_match_command_menu() {
        for text in [
            "/menu",
            "/start",
            "/help",
            "menu",
            "Categories",
            "what can you do?",
            "Меню",
        ] {
            assert_eq!(match_command(text), Some(MENU_DOMAIN), "{text}");
        }
    }

    #[test]
    fn test_match_command_none() {
        assert_eq!(match_command("I want food for 2 people tonight"), None);
        assert_eq!(match_command("show me the menu"), None);
        assert_eq!(match_command("/menus"), None);
        assert_eq!(match_command(""), None);
    }

    #[test]
    fn test_phrase_in_tokens() {
        let tokens = tokenize("please add service now");
        assert!(phrase_in_tokens(&tokens, "add service"));
        assert!(!phrase_in_tokens(&tokens, "service add"));
        assert!(!phrase_in_tokens(&tokens, "serv"));
        assert!(!phrase_in_tokens(&tokens, ""));
    }

    #[test]
    fn test_strong_alias_scores() {
        let scores = builtin_scores("I want food for 2 people tonight", "en");
        let food = &scores["food"];
        assert!(approx(food.score, 0.8));
        assert_eq!(food.signals, vec![Signal::AliasStrong]);
        assert_eq!(top_domain(&scores).unwrap().domain, "food");
        for (domain, record) in &scores {
            if domain != "food" {
                assert_eq!(record.score, 0.0, "{domain}");
            }
        }
    }

    #[test]
    fn test_weak_alias_is_substring() {
        let scores = builtin_scores("pizzas please", "en");
        let food = &scores["food"];
        assert!(approx(food.score, 0.15));
        assert_eq!(food.signals, vec![Signal::AliasWeak]);
    }

    #[test]
    fn test_strong_alias_needs_whole_token() {
        // "eaten" must not hit the strong alias "eat".
        let scores = builtin_scores("already eaten", "en");
        assert_eq!(scores["food"].score, 0.0);
    }

    #[test]
    fn test_negation_penalty() {
        let scores = builtin_scores("I don't want food", "en");
        let food = &scores["food"];
        assert!(approx(food.score, 0.4));
        assert_eq!(food.signals, vec![Signal::AliasStrong, Signal::Negation]);
    }

    #[test]
    fn test_negation_without_match_is_ignored() {
        let scores = builtin_scores("not sure", "en");
        assert!(scores.values().all(|r| r.score == 0.0 && r.signals.is_empty()));
    }

    #[test]
    fn test_conflict_penalty() {
        let scores = builtin_scores("I need a service for my apartment rental business", "en");
        let business = &scores["business"];
        let real_estate = &scores["real_estate"];

        assert!(approx(business.score, 0.5));
        assert!(business.has(Signal::Conflict));
        assert!(approx(real_estate.score, 0.65));
        assert_eq!(
            real_estate.signals,
            vec![Signal::AliasStrong, Signal::AliasWeak, Signal::Conflict]
        );
        assert_eq!(top_domain(&scores).unwrap().domain, "real_estate");
    }

    #[test]
    fn test_conflicted_domain_stays_below_route_strong() {
        let config = IntentConfig::builtin().unwrap();
        let peak =
            config.weights.alias_strong + config.weights.alias_weak + config.weights.conflict;
        assert!(peak < config.thresholds.route_strong);
    }

    #[test]
    fn test_empty_text_scores_zero() {
        let scores = builtin_scores("", "en");
        assert!(!scores.is_empty());
        assert!(scores.values().all(|r| r.score == 0.0));
    }

    #[test]
    fn test_language_specific_aliases() {
        let scores = builtin_scores("хочу поесть", "ru");
        assert!(approx(scores["food"].score, 0.8));

        // Domains missing from German fall back to English.
        let scores = builtin_scores("add service", "de");
        assert!(scores["add_service"].has(Signal::AliasStrong));
    }

    #[test]
    fn test_scores_stay_in_range() {
        for text in [
            "food food food pizza delivery order",
            "no no never not without food",
            "taxi to the airport and an apartment to rent and a restaurant",
        ] {
            for record in builtin_scores(text, "en").values() {
                assert!((0.0..=1.0).contains(&record.score), "{text}: {record:?}");
            }
        }
    }

    #[tokio::test]
    async fn test_lexicon_matcher() {
        let matcher = LexiconRuleMatcher::new(Arc::new(IntentConfig::builtin().unwrap()));
        let scores = matcher.score("taxi to the airport", "en").await.unwrap();
        assert_eq!(top_domain(&scores).unwrap().domain, "transportation");
        assert!(matcher.domains().contains(&"food".to_string()));
    }
}
