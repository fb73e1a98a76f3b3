//! Clarification questions by language and domain.

use super::settings::DEFAULT_LANGUAGE;

/// English question used when nothing more specific applies.
pub const GENERIC_QUESTION: &str = "Could you please clarify what you're looking for?";

fn lookup(language: &str, domain: &str) -> Option<&'static str> {
    let question = match (language, domain) {
        ("en", "food") => "Are you looking for food delivery or restaurant options?",
        ("en", "real_estate") => "Are you looking to rent or find real estate?",
        ("en", "transportation") => "Do you need a taxi, ride, or other transportation?",
        ("en", "business") => "Are you inquiring about business services?",
        ("en", "menu") => "Would you like to see the list of service categories?",
        ("en", "add_service") => "Do you want to add a new service to the catalog?",
        ("en", _) => GENERIC_QUESTION,

        ("ru", "food") => "Вы ищете доставку еды или варианты ресторанов?",
        ("ru", "real_estate") => "Вы хотите снять жилье или найти недвижимость?",
        ("ru", "transportation") => "Вам нужно такси, поездка или другой транспорт?",
        ("ru", "business") => "Вы интересуетесь бизнес-услугами?",
        ("ru", "menu") => "Показать список категорий услуг?",
        ("ru", "add_service") => "Вы хотите добавить новую услугу в каталог?",
        ("ru", _) => "Не могли бы вы уточнить, что вы ищете?",

        ("de", "food") => "Suchen Sie Essenslieferung oder ein Restaurant?",
        ("de", "real_estate") => "Möchten Sie eine Immobilie mieten oder finden?",
        ("de", "transportation") => "Brauchen Sie ein Taxi oder eine andere Fahrt?",
        ("de", _) => "Könnten Sie bitte genauer sagen, wonach Sie suchen?",

        ("vi", _) => "Bạn có thể nói rõ hơn bạn đang tìm gì không?",
        ("ko", _) => "찾으시는 것을 좀 더 구체적으로 말씀해 주시겠어요?",

        _ => return None,
    };
    Some(question)
}

/// Clarification question for `domain` in `language`.
///
/// Unmapped domains get the language's generic question; unmapped
/// languages use the English table.
pub fn clarification_question(domain: &str, language: &str) -> &'static str {
    lookup(language, domain)
        .or_else(|| lookup(DEFAULT_LANGUAGE, domain))
        .unwrap_or(GENERIC_QUESTION)
}

/// Generic question for `language`, used for fallback and error decisions.
pub fn generic_question(language: &str) -> &'static str {
    clarification_question(super::types::UNKNOWN_INTENT, language)
}
