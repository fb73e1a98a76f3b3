//! Lexicon, weights and thresholds for intent scoring.
//!
//! Loaded once at startup, either from a config directory holding
//! `aliases.json`, `negations.json` and `weights.json`, or from the copies
//! compiled into the crate. Everything here is immutable after load and is
//! shared between classification calls behind an `Arc`.

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{ConfigError, Result};

/// Language used when a domain has no entry for the requested language.
pub const DEFAULT_LANGUAGE: &str = "en";

const ALIASES_FILE: &str = "aliases.json";
const NEGATIONS_FILE: &str = "negations.json";
const WEIGHTS_FILE: &str = "weights.json";

const BUILTIN_ALIASES: &str = include_str!("../../data/intent/aliases.json");
const BUILTIN_NEGATIONS: &str = include_str!("../../data/intent/negations.json");
const BUILTIN_WEIGHTS: &str = include_str!("../../data/intent/weights.json");

/// Strong and weak alias phrases for one domain.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DomainAliases {
    /// Matched as whole tokens (multi-word phrases as a contiguous run).
    #[serde(default)]
    pub strong: Vec<String>,
    /// Matched as case-insensitive substrings of the raw text.
    #[serde(default)]
    pub weak: Vec<String>,
}

/// Language code -> domain name -> aliases.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Lexicon {
    languages: BTreeMap<String, BTreeMap<String, DomainAliases>>,
}

impl Lexicon {
    /// Build a lexicon from a nested map.
    pub fn new(languages: BTreeMap<String, BTreeMap<String, DomainAliases>>) -> Self {
        Self { languages }
    }

    /// Domains visible for `language`, each resolved to its aliases.
    ///
    /// The domain set is the union of the default-language domains and the
    /// requested language's domains. A domain missing from the requested
    /// language uses its default-language aliases.
    pub fn domains_for(&self, language: &str) -> BTreeMap<&str, &DomainAliases> {
        let mut out = BTreeMap::new();
        if let Some(defaults) = self.languages.get(DEFAULT_LANGUAGE) {
            for (domain, aliases) in defaults {
                out.insert(domain.as_str(), aliases);
            }
        }
        if language != DEFAULT_LANGUAGE {
            if let Some(local) = self.languages.get(language) {
                for (domain, aliases) in local {
                    out.insert(domain.as_str(), aliases);
                }
            }
        }
        out
    }

    /// All domain names across every language, sorted.
    pub fn all_domains(&self) -> Vec<String> {
        let mut domains: Vec<String> = self
            .languages
            .values()
            .flat_map(|d| d.keys().cloned())
            .collect();
        domains.sort();
        domains.dedup();
        domains
    }

    /// Languages with their own entries.
    pub fn languages(&self) -> impl Iterator<Item = &str> {
        self.languages.keys().map(String::as_str)
    }
}

/// Language code -> negation tokens. Pooled across languages when scoring.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Negations {
    by_language: BTreeMap<String, Vec<String>>,
}

impl Negations {
    /// Build from a language map.
    pub fn new(by_language: BTreeMap<String, Vec<String>>) -> Self {
        Self { by_language }
    }

    /// Every negation token of every language, lowercased and deduplicated.
    pub fn pooled(&self) -> Vec<String> {
        let mut all: Vec<String> = self
            .by_language
            .values()
            .flatten()
            .map(|n| n.to_lowercase())
            .collect();
        all.sort();
        all.dedup();
        all
    }
}

/// Additive score contributions.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Weights {
    pub alias_strong: f64,
    pub alias_weak: f64,
    /// Expected negative.
    pub negation: f64,
    /// Expected negative.
    pub conflict: f64,
}

impl Default for Weights {
    fn default() -> Self {
        Self {
            alias_strong: 0.80,
            alias_weak: 0.15,
            negation: -0.40,
            conflict: -0.30,
        }
    }
}

/// Confidence cut-offs used by the decision engine.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Thresholds {
    pub route_strong: f64,
    pub route_candidate_low: f64,
    pub route_candidate_high: f64,
    /// Below this a rule guess is treated as noise rather than `rules_low`.
    pub rules_min_conf: f64,
    pub llm_min_conf: f64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            route_strong: 0.80,
            route_candidate_low: 0.60,
            route_candidate_high: 0.89,
            rules_min_conf: 0.30,
            llm_min_conf: 0.75,
        }
    }
}

#[derive(Debug, Deserialize)]
struct WeightsFile {
    weights: Weights,
    thresholds: Thresholds,
}

/// Complete, validated scoring configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct IntentConfig {
    pub lexicon: Lexicon,
    pub negations: Negations,
    pub weights: Weights,
    pub thresholds: Thresholds,
}

impl IntentConfig {
    /// Load the configuration compiled into the crate.
    ///
    /// # Errors
    /// Returns an error if the bundled files fail to parse or validate.
    pub fn builtin() -> Result<Self> {
        Self::from_json_strs(BUILTIN_ALIASES, BUILTIN_NEGATIONS, BUILTIN_WEIGHTS)
    }

    /// Load from a directory containing the three JSON files.
    ///
    /// # Errors
    /// Returns an error if a file is missing, malformed, or out of range.
    pub fn load_dir(dir: &Path) -> Result<Self> {
        let read = |name: &str| {
            let path = dir.join(name);
            std::fs::read_to_string(&path).map_err(|source| ConfigError::Read { path, source })
        };
        let config = Self::from_json_strs(
            &read(ALIASES_FILE)?,
            &read(NEGATIONS_FILE)?,
            &read(WEIGHTS_FILE)?,
        )?;
        info!(dir = %dir.display(), "Loaded intent configuration");
        Ok(config)
    }

    /// Whether `dir` holds an on-disk configuration.
    pub fn present_in(dir: &Path) -> bool {
        dir.join(ALIASES_FILE).is_file()
    }

    /// Load from `dir` if it holds an `aliases.json`, otherwise the built-in set.
    ///
    /// # Errors
    /// Returns an error if the chosen source fails to load.
    pub fn load_or_builtin(dir: &Path) -> Result<Self> {
        if Self::present_in(dir) {
            Self::load_dir(dir)
        } else {
            debug!(dir = %dir.display(), "No intent config on disk, using built-in lexicon");
            Self::builtin()
        }
    }

    /// Parse and validate the three JSON documents.
    ///
    /// # Errors
    /// Returns an error on malformed JSON or invalid values.
    pub fn from_json_strs(aliases: &str, negations: &str, weights: &str) -> Result<Self> {
        let lexicon: Lexicon = parse(ALIASES_FILE, aliases)?;
        let negations: Negations = parse(NEGATIONS_FILE, negations)?;
        let WeightsFile {
            weights,
            thresholds,
        } = parse(WEIGHTS_FILE, weights)?;

        let config = Self {
            lexicon,
            negations,
            weights,
            thresholds,
        };
        config.validate()?;
        Ok(config)
    }

    /// Check ranges and structural requirements.
    ///
    /// # Errors
    /// Returns the first violation found.
    pub fn validate(&self) -> Result<()> {
        let w = &self.weights;
        for (name, value) in [
            ("alias_strong", w.alias_strong),
            ("alias_weak", w.alias_weak),
            ("negation", w.negation),
            ("conflict", w.conflict),
        ] {
            check_range(name, value, -1.0, 1.0)?;
        }

        let t = &self.thresholds;
        for (name, value) in [
            ("route_strong", t.route_strong),
            ("route_candidate_low", t.route_candidate_low),
            ("route_candidate_high", t.route_candidate_high),
            ("rules_min_conf", t.rules_min_conf),
            ("llm_min_conf", t.llm_min_conf),
        ] {
            check_range(name, value, 0.0, 1.0)?;
        }
        if t.route_candidate_low > t.route_candidate_high {
            return Err(ConfigError::Invalid(format!(
                "route_candidate_low ({}) exceeds route_candidate_high ({})",
                t.route_candidate_low, t.route_candidate_high
            )));
        }

        if self.lexicon.domains_for(DEFAULT_LANGUAGE).is_empty() {
            return Err(ConfigError::MissingDefaultLanguage(
                DEFAULT_LANGUAGE.to_string(),
            ));
        }
        Ok(())
    }
}

/// Enables or disables the LLM tier.
pub const USE_LLM_FALLBACK_ENV: &str = "USE_LLM_FALLBACK";
/// Overrides `thresholds.rules_min_conf`.
pub const RULES_MIN_CONF_ENV: &str = "RULES_MIN_CONF";
/// Overrides `thresholds.llm_min_conf`.
pub const LLM_MIN_CONF_ENV: &str = "LLM_MIN_CONF";
/// Overrides `thresholds.route_strong`.
pub const ROUTE_STRONG_ENV: &str = "ROUTE_STRONG";

/// Runtime switches layered over the file configuration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EngineSettings {
    pub use_llm_fallback: bool,
    /// Upper bound on one LLM call, enforced by the engine.
    pub llm_timeout: Duration,
    pub route_strong: Option<f64>,
    pub rules_min_conf: Option<f64>,
    pub llm_min_conf: Option<f64>,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            use_llm_fallback: true,
            llm_timeout: Duration::from_millis(4000),
            route_strong: None,
            rules_min_conf: None,
            llm_min_conf: None,
        }
    }
}

impl EngineSettings {
    /// Read overrides from the process environment.
    ///
    /// # Errors
    /// Returns an error if a variable is set but unparseable.
    pub fn from_env() -> Result<Self> {
        Self::from_vars(|name| std::env::var(name).ok())
    }

    /// Read overrides through `var`, which maps a variable name to its value.
    ///
    /// # Errors
    /// Returns an error if a variable is set but unparseable.
    pub fn from_vars(var: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut settings = Self::default();
        if let Some(raw) = var(USE_LLM_FALLBACK_ENV) {
            settings.use_llm_fallback = parse_flag(USE_LLM_FALLBACK_ENV, &raw)?;
        }
        settings.route_strong = parse_threshold(ROUTE_STRONG_ENV, var(ROUTE_STRONG_ENV))?;
        settings.rules_min_conf = parse_threshold(RULES_MIN_CONF_ENV, var(RULES_MIN_CONF_ENV))?;
        settings.llm_min_conf = parse_threshold(LLM_MIN_CONF_ENV, var(LLM_MIN_CONF_ENV))?;
        Ok(settings)
    }

    /// Write the threshold overrides into `thresholds`.
    pub fn apply(&self, thresholds: &mut Thresholds) {
        if let Some(v) = self.route_strong {
            thresholds.route_strong = v;
        }
        if let Some(v) = self.rules_min_conf {
            thresholds.rules_min_conf = v;
        }
        if let Some(v) = self.llm_min_conf {
            thresholds.llm_min_conf = v;
        }
    }
}

fn parse_flag(name: &str, raw: &str) -> Result<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(ConfigError::Invalid(format!("{name} = {other:?} is not a boolean"))),
    }
}

fn parse_threshold(name: &str, raw: Option<String>) -> Result<Option<f64>> {
    let Some(raw) = raw.map(|r| r.trim().to_string()).filter(|r| !r.is_empty()) else {
        return Ok(None);
    };
    raw.parse::<f64>()
        .map(Some)
        .map_err(|_| ConfigError::Invalid(format!("{name} = {raw:?} is not a number")))
}

fn parse<T: serde::de::DeserializeOwned>(name: &str, text: &str) -> Result<T> {
    serde_json::from_str(text).map_err(|source| ConfigError::Parse {
        name: name.to_string(),
        source,
    })
}

fn check_range(name: &'static str, value: f64, min: f64, max: f64) -> Result<()> {
    if !value.is_finite() || value < min || value > max {
        return Err(ConfigError::OutOfRange {
            name,
            value,
            min,
            max,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const WEIGHTS: &str = r#"{
        "weights": {"alias_strong": 0.8, "alias_weak": 0.15, "negation": -0.4, "conflict": -0.3},
        "thresholds": {
            "route_strong": 0.8,
            "route_candidate_low": 0.6,
            "route_candidate_high": 0.89,
            "rules_min_conf": 0.3,
            "llm_min_conf": 0.75
        }
    }"#;

    const FOOD_ONLY: &str = r#"{"en": {"food": {"strong": ["food"], "weak": []}}}"#;

    #[test]
    fn test_builtin_loads() {
        let config = IntentConfig::builtin().unwrap();
        assert_eq!(config.weights, Weights::default());
        assert_eq!(config.thresholds, Thresholds::default());
        let domains = config.lexicon.all_domains();
        for d in ["add_service", "business", "food", "menu", "real_estate", "transportation"] {
            assert!(domains.contains(&d.to_string()), "missing {d}");
        }
    }

    #[test]
    fn test_domains_fall_back_to_default_language() {
        let config = IntentConfig::builtin().unwrap();
        let de = config.lexicon.domains_for("de");
        // German has its own food entry but no add_service entry.
        assert!(de["food"].strong.contains(&"essen".to_string()));
        assert!(de["add_service"].strong.contains(&"add service".to_string()));

        let unknown = config.lexicon.domains_for("xx");
        assert_eq!(unknown.len(), config.lexicon.domains_for("en").len());
    }

    #[test]
    fn test_negations_pooled() {
        let config = IntentConfig::builtin().unwrap();
        let pooled = config.negations.pooled();
        assert!(pooled.contains(&"not".to_string()));
        assert!(pooled.contains(&"нет".to_string()));
        assert!(pooled.contains(&"nicht".to_string()));
    }

    #[test]
    fn test_out_of_range_threshold_rejected() {
        let weights = WEIGHTS.replace("\"route_strong\": 0.8", "\"route_strong\": 1.4");
        let err = IntentConfig::from_json_strs(FOOD_ONLY, "{}", &weights).unwrap_err();
        assert!(matches!(err, ConfigError::OutOfRange { name: "route_strong", .. }));
    }

    #[test]
    fn test_inverted_candidate_band_rejected() {
        let weights = WEIGHTS.replace(
            "\"route_candidate_low\": 0.6",
            "\"route_candidate_low\": 0.95",
        );
        let err = IntentConfig::from_json_strs(FOOD_ONLY, "{}", &weights).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn test_missing_default_language_rejected() {
        let aliases = r#"{"ru": {"food": {"strong": ["еда"]}}}"#;
        let err = IntentConfig::from_json_strs(aliases, "{}", WEIGHTS).unwrap_err();
        assert!(matches!(err, ConfigError::MissingDefaultLanguage(_)));
    }

    #[test]
    fn test_malformed_json_rejected() {
        let err = IntentConfig::from_json_strs("{not json", "{}", WEIGHTS).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn test_load_dir_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(ALIASES_FILE), FOOD_ONLY).unwrap();
        std::fs::write(dir.path().join(NEGATIONS_FILE), r#"{"en": ["not"]}"#).unwrap();
        std::fs::write(dir.path().join(WEIGHTS_FILE), WEIGHTS).unwrap();

        let config = IntentConfig::load_or_builtin(dir.path()).unwrap();
        assert_eq!(config.lexicon.all_domains(), vec!["food".to_string()]);
    }

    #[test]
    fn test_load_dir_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = IntentConfig::load_dir(dir.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }

    #[test]
    fn test_load_or_builtin_empty_dir() {
        let dir = tempfile::tempdir().unwrap();
        let config = IntentConfig::load_or_builtin(dir.path()).unwrap();
        assert!(config.lexicon.all_domains().len() >= 6);
    }

    #[test]
    fn test_engine_settings_from_vars() {
        let settings = EngineSettings::from_vars(|name| match name {
            USE_LLM_FALLBACK_ENV => Some("False".to_string()),
            LLM_MIN_CONF_ENV => Some(" 0.9 ".to_string()),
            _ => None,
        })
        .unwrap();
        assert!(!settings.use_llm_fallback);
        assert_eq!(settings.llm_min_conf, Some(0.9));
        assert_eq!(settings.route_strong, None);

        let mut thresholds = Thresholds::default();
        settings.apply(&mut thresholds);
        assert_eq!(thresholds.llm_min_conf, 0.9);
        assert_eq!(thresholds.route_strong, 0.80);
    }

    #[test]
    fn test_engine_settings_defaults() {
        let settings = EngineSettings::from_vars(|_| None).unwrap();
        assert_eq!(settings, EngineSettings::default());
        assert!(settings.use_llm_fallback);
    }

    #[test]
    fn test_engine_settings_reject_garbage() {
        let err = EngineSettings::from_vars(|name| {
            (name == USE_LLM_FALLBACK_ENV).then(|| "maybe".into())
        });
        assert!(matches!(err, Err(ConfigError::Invalid(_))));
        let err =
            EngineSettings::from_vars(|name| (name == ROUTE_STRONG_ENV).then(|| "high".into()));
        assert!(matches!(err, Err(ConfigError::Invalid(_))));
    }
}
