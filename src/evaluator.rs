//! Post-generation output evaluator (C9): three non-blocking checks that
//! append warning flags to the pipeline's debug metadata.

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;

const REFUSAL_PHRASES: &[&str] = &[
    "i cannot",
    "i can't",
    "i don't have information",
    "i don't have enough information",
    "i do not have",
    "i'm not sure",
    "i am not sure",
    "i'm unable to",
    "i am unable to",
    "outside my knowledge",
    "beyond my scope",
    "not able to help",
    "cannot assist with",
    "no information available",
    "unfortunately, i don't",
    "i apologize, but i",
    "i'm sorry, but i don't",
];

const ALLOWED_TERMS: &[&str] = &["Clearpath", "Clearpath Assistant"];

static PRICE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\$\d+(?:\.\d{2})?(?:\s*/\s*(?:month|year|mo|yr))?").unwrap());
static PROPER_NOUN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b[A-Z][a-z]+(?:\s+[A-Z][a-z]+)+\b").unwrap());

pub fn extract_prices(text: &str) -> HashSet<String> {
    PRICE_RE.find_iter(text).map(|m| m.as_str().to_string()).collect()
}

pub fn extract_proper_nouns(text: &str) -> HashSet<String> {
    PROPER_NOUN_RE
        .find_iter(text)
        .map(|m| m.as_str().to_string())
        .collect()
}

fn check_hallucination(response_text: &str, context: &str) -> bool {
    let response_prices = extract_prices(response_text);
    let context_prices = extract_prices(context);
    if response_prices.iter().any(|p| !context_prices.contains(p)) {
        return true;
    }

    let response_nouns = extract_proper_nouns(response_text);
    let context_nouns = extract_proper_nouns(context);
    response_nouns.iter().any(|noun| {
        !context_nouns.contains(noun) && !ALLOWED_TERMS.contains(&noun.as_str())
    })
}

/// Run the three checks over the generated response and the retrieved
/// context, returning additive warning flags. Never mutates or blocks the
/// response itself.
pub fn evaluate_output(response_text: &str, retrieval_count: usize, chunk_texts: &[String]) -> Vec<String> {
    let mut flags = Vec::new();

    if retrieval_count == 0 {
        flags.push("no_context_warning".to_string());
    }

    let lower = response_text.to_lowercase();
    if REFUSAL_PHRASES.iter().any(|p| lower.contains(p)) {
        flags.push("refusal_detected".to_string());
    }

    let context = chunk_texts.join(" ");
    if check_hallucination(response_text, &context) {
        flags.push("potential_hallucination".to_string());
    }

    flags
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_context_warning_when_nothing_retrieved() {
        let flags = evaluate_output("some answer", 0, &[]);
        assert!(flags.contains(&"no_context_warning".to_string()));
    }

    #[test]
    fn every_refusal_phrase_triggers_flag_exactly_once() {
        for phrase in REFUSAL_PHRASES {
            let resp = format!("prefix {phrase} suffix");
            let flags = evaluate_output(&resp, 1, &["some chunk".to_string()]);
            let count = flags.iter().filter(|f| *f == "refusal_detected").count();
            assert_eq!(count, 1, "phrase: {phrase:?}");
        }
    }

    #[test]
    fn hallucinated_price_is_flagged() {
        let flags = evaluate_output(
            "The Pro plan costs $99/month",
            1,
            &["The Pro plan costs $49/month".to_string()],
        );
        assert!(flags.contains(&"potential_hallucination".to_string()));
    }

    #[test]
    fn price_present_in_context_is_not_flagged() {
        let flags = evaluate_output(
            "The Pro plan costs $49/month",
            1,
            &["The Pro plan costs $49/month".to_string()],
        );
        assert!(!flags.contains(&"potential_hallucination".to_string()));
    }

    #[test]
    fn allowed_terms_do_not_trigger_hallucination() {
        let flags = evaluate_output(
            "Clearpath Assistant is here to help",
            1,
            &["irrelevant context".to_string()],
        );
        assert!(!flags.contains(&"potential_hallucination".to_string()));
    }
}
