//! Corroboration of model-claimed objection categories against the raw transcript.

use std::sync::OnceLock;

use regex::{Regex, RegexBuilder};

const OBJECTION_KEYWORDS: &[(&str, &[&str])] = &[
    (
        "price",
        &["price", "expensive", "cost", "budget", "afford", "cheaper", "too much", "discount"],
    ),
    ("timing", &["later", "not now", "next month", "next year", "busy", "not the right time"]),
    ("authority", &["boss", "manager", "my team", "approval", "decide", "partner", "check with"]),
    ("need", &["don't need", "do not need", "no need", "not interested", "already have"]),
    ("trust", &["scam", "trust", "reviews", "legit", "reliable", "guarantee"]),
    ("competition", &["competitor", "another company", "other provider", "alternative", "elsewhere"]),
];

/// Phrasings the keyword lists cannot express, checked after the keywords.
const OBJECTION_PATTERNS: &[(&str, &str)] = &[
    ("price", r"[$€£]\s?\d|\b\d+(?:[.,]\d+)?\s?(?:dollars|usd|eur|euros|bucks)\b|\bhow much\b"),
    ("timing", r"\b(?:next|this|in a) (?:week|month|quarter|year)\b|\bafter the holidays\b"),
    ("authority", r"\b(?:ask|talk to|run it by) (?:my|our) (?:wife|husband|boss|team|cfo|ceo)\b"),
    ("need", r"\bwe(?:'re| are) (?:fine|good|covered)\b"),
    ("trust", r"\bis (?:this|it) (?:real|safe)\b"),
    ("competition", r"\b(?:cheaper|better) (?:at|from|with) \w+"),
];

fn default_patterns() -> &'static [(&'static str, Regex)] {
    static PATTERNS: OnceLock<Vec<(&'static str, Regex)>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        OBJECTION_PATTERNS
            .iter()
            .filter_map(|(category, pattern)| {
                RegexBuilder::new(pattern)
                    .case_insensitive(true)
                    .build()
                    .ok()
                    .map(|regex| (*category, regex))
            })
            .collect()
    })
}

/// Keeps only the claimed categories that the conversation text supports.
///
/// Known categories need one of their keywords or a match of their default
/// pattern; unknown categories need the category name itself (with `_`/`-`
/// read as spaces) to appear in the text.
pub fn validate_objections(detected: &[String], conversation_text: &str) -> Vec<String> {
    let haystack = conversation_text.to_lowercase();
    let mut confirmed: Vec<String> = Vec::new();

    for claimed in detected {
        let category = normalize_category(claimed);
        if category.is_empty() || confirmed.contains(&category) {
            continue;
        }

        let corroborated = match keywords_for(&category) {
            Some(keywords) => {
                keywords.iter().any(|keyword| haystack.contains(keyword))
                    || matches_default_pattern(&category, conversation_text)
            }
            None => haystack.contains(&category.replace('_', " ")),
        };

        if corroborated {
            confirmed.push(category);
        }
    }

    confirmed
}

fn keywords_for(category: &str) -> Option<&'static [&'static str]> {
    OBJECTION_KEYWORDS
        .iter()
        .find(|(name, _)| *name == category)
        .map(|(_, keywords)| *keywords)
}

fn matches_default_pattern(category: &str, text: &str) -> bool {
    default_patterns()
        .iter()
        .any(|(name, pattern)| *name == category && pattern.is_match(text))
}

fn normalize_category(raw: &str) -> String {
    raw.trim().to_lowercase().replace(['-', ' '], "_")
}
