//! Slot extraction by pattern matching.
//!
//! Each slot is independent: a pattern that does not match, or a value that
//! does not parse, leaves the slot unset and never affects the others.

use std::sync::OnceLock;

use async_trait::async_trait;
use regex::Regex;

use super::collaborators::SlotRefiner;
use super::settings::DEFAULT_LANGUAGE;
use super::types::{SlotSet, SlotValue};

/// Largest party size accepted for the `people` slot.
pub const MAX_PEOPLE: i64 = 999;

/// A named, compiled slot pattern.
#[derive(Debug)]
struct SlotPattern {
    language: &'static str,
    regex: Regex,
}

impl SlotPattern {
    fn new(language: &'static str, pattern: &str) -> Self {
        Self {
            language,
            regex: Regex::new(pattern).expect("slot pattern is valid"),
        }
    }
}

fn time_patterns() -> &'static [SlotPattern] {
    static PATTERNS: OnceLock<Vec<SlotPattern>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        vec![
            SlotPattern::new(
                "en",
                r"\b(now|today|tonight|tomorrow|later|\d{1,2}:\d{2}|\d{1,2}\s?(?:am|pm))\b",
            ),
            SlotPattern::new(
                "ru",
                r"\b(сегодня вечером|сейчас|сегодня|завтра|позже|\d{1,2}:\d{2})\b",
            ),
            SlotPattern::new(
                "de",
                r"\b(heute abend|jetzt|heute|morgen|später|\d{1,2}:\d{2}|\d{1,2}\s?uhr)\b",
            ),
            SlotPattern::new(
                "vi",
                r"\b(bây giờ|tối nay|hôm nay|ngày mai|để sau|\d{1,2}:\d{2})\b",
            ),
            // Korean attaches particles directly to words, so no boundaries.
            SlotPattern::new("ko", r"(지금|오늘 밤|오늘|내일|나중|\d{1,2}:\d{2}|\d{1,2}시)"),
        ]
    })
}

fn people_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(concat!(
            r"(?:\b(?:for|для|на|für|cho)\s+)?",
            r"\b(\d+|one|two|three|four|five|six|seven|eight|nine|ten",
            r"|один|одного|два|двоих|три|троих|четыре|пять|шесть|семь|восемь|девять|десять",
            r"|eins|einen|zwei|drei|vier|fünf|sechs|sieben|acht|neun|zehn)",
            r"\s*(?:people|persons|person|guests|человек|людей|гостей",
            r"|personen|leute|gäste|người|명)",
        ))
        .expect("people pattern is valid")
    })
}

fn location_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\b(?:in|at|в|bei|nach|ở)\s+([^\d.,!?;:]+)")
            .expect("location pattern is valid")
    })
}

fn term_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(concat!(
            r"(?P<short>short\s*-?\s*term|на\s*короткий\s*срок|краткосрочн",
            r"|ngắn\s*hạn|kurzfristig|단기)",
            r"|(?P<long>long\s*-?\s*term|на\s*длительный\s*срок|долгосрочн",
            r"|dài\s*hạn|langfristig|장기)",
        ))
        .expect("term pattern is valid")
    })
}

fn cuisine_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(concat!(
            r"\b(italian|chinese|mexican|japanese|thai|indian|vietnamese|korean",
            r"|vegan|vegetarian|gluten-free)\b",
        ))
        .expect("cuisine pattern is valid")
    })
}

fn property_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\b(apartment|house|studio|condo|loft|penthouse|villa|room)\b")
            .expect("property pattern is valid")
    })
}

const DELIVERY_WORDS: &[&str] = &[
    "delivery",
    "deliver",
    "доставк",
    "giao hàng",
    "lieferung",
    "liefern",
    "배달",
];
const VISIT_WORDS: &[&str] = &[
    "visit",
    "dine in",
    "посетить",
    "прийти",
    "đến",
    "besuchen",
    "방문",
];

fn number_word(word: &str) -> Option<i64> {
    let n = match word {
        "one" | "один" | "одного" | "eins" | "einen" => 1,
        "two" | "два" | "двоих" | "zwei" => 2,
        "three" | "три" | "троих" | "drei" => 3,
        "four" | "четыре" | "vier" => 4,
        "five" | "пять" | "fünf" => 5,
        "six" | "шесть" | "sechs" => 6,
        "seven" | "семь" | "sieben" => 7,
        "eight" | "восемь" | "acht" => 8,
        "nine" | "девять" | "neun" => 9,
        "ten" | "десять" | "zehn" => 10,
        _ => return None,
    };
    Some(n)
}

fn extract_time(text: &str, language: &str) -> Option<String> {
    let patterns = time_patterns();
    let local = patterns.iter().find(|p| p.language == language);
    let fallback = patterns.iter().find(|p| p.language == DEFAULT_LANGUAGE);
    local
        .into_iter()
        .chain(fallback)
        .find_map(|p| p.regex.captures(text))
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

fn extract_people(text: &str) -> Option<i64> {
    let caps = people_regex().captures(text)?;
    let raw = caps.get(1)?.as_str();
    let count = if raw.chars().all(|c| c.is_ascii_digit()) {
        raw.parse::<i64>().ok()?
    } else {
        number_word(raw)?
    };
    (1..=MAX_PEOPLE).contains(&count).then_some(count)
}

fn extract_location(text: &str) -> Option<String> {
    let caps = location_regex().captures(text)?;
    let place = caps.get(1)?.as_str().trim();
    (!place.is_empty()).then(|| place.to_string())
}

fn extract_term(text: &str) -> Option<&'static str> {
    let caps = term_regex().captures(text)?;
    if caps.name("short").is_some() {
        Some("short-term")
    } else {
        Some("long-term")
    }
}

fn extract_mode(text: &str) -> Option<&'static str> {
    if DELIVERY_WORDS.iter().any(|w| text.contains(w)) {
        Some("delivery")
    } else if VISIT_WORDS.iter().any(|w| text.contains(w)) {
        Some("visit")
    } else {
        None
    }
}

/// Extract slots from `text` and merge them into `base`.
///
/// Only keys that match are written; everything else in `base` is kept.
/// `intent_hint` enables domain-specific slots (`cuisine` for food,
/// `property_type` for real estate).
pub fn extract_slots(
    text: &str,
    language: &str,
    intent_hint: Option<&str>,
    base: SlotSet,
) -> SlotSet {
    let mut slots = base;
    let lowered = text.to_lowercase();
    if lowered.trim().is_empty() {
        return slots;
    }

    if let Some(time) = extract_time(&lowered, language) {
        slots.insert("time".into(), SlotValue::Text(time));
    }
    if let Some(people) = extract_people(&lowered) {
        slots.insert("people".into(), SlotValue::Int(people));
    }
    if let Some(location) = extract_location(&lowered) {
        slots.insert("location".into(), SlotValue::Text(location));
    }
    if let Some(term) = extract_term(&lowered) {
        slots.insert("term".into(), term.into());
    }
    if let Some(mode) = extract_mode(&lowered) {
        slots.insert("mode".into(), mode.into());
    }

    match intent_hint {
        Some("food") => {
            if let Some(m) = cuisine_regex().find(&lowered) {
                slots.insert("cuisine".into(), m.as_str().into());
            }
        }
        Some("real_estate") => {
            if let Some(m) = property_regex().find(&lowered) {
                slots.insert("property_type".into(), m.as_str().into());
            }
        }
        _ => {}
    }

    slots
}

/// Slot refiner backed by the built-in pattern tables.
#[derive(Debug, Clone, Copy, Default)]
pub struct PatternSlotRefiner;

#[async_trait]
impl SlotRefiner for PatternSlotRefiner {
    async fn refine(
        &self,
        text: &str,
        language: &str,
        intent_hint: Option<&str>,
        base: SlotSet,
    ) -> SlotSet {
        extract_slots(text, language, intent_hint, base)
    }
}
