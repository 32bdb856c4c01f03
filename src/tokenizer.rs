//! Token counting for the chunker (C1).
//!
//! Uses the WordPiece tokenizer that matches the embedding model's vocabulary
//! to measure token counts consistently with what the embedder will see.
//! Falls back to a word-based approximation (1 token per 0.75 words) if the
//! tokenizer cannot be loaded; the fallback decision is made once and cached.

use std::sync::OnceLock;

use tokenizers::Tokenizer;
use tracing::warn;

const TOKENIZER_REPO_FILE: &str = "tokenizer.json";
const WORDS_PER_TOKEN: f64 = 0.75;

static TOKENIZER: OnceLock<Option<Tokenizer>> = OnceLock::new();

fn get_tokenizer() -> Option<&'static Tokenizer> {
    TOKENIZER
        .get_or_init(|| match Tokenizer::from_file(TOKENIZER_REPO_FILE) {
            Ok(tok) => Some(tok),
            Err(err) => {
                warn!(
                    error = %err,
                    "token counter: failed to load tokenizer, falling back to word-based approximation"
                );
                None
            }
        })
        .as_ref()
}

/// Count the number of tokens in `text`, using the subword tokenizer when
/// available and falling back to `words / 0.75` otherwise.
pub fn count_tokens(text: &str) -> usize {
    if text.is_empty() {
        return 0;
    }

    if let Some(tokenizer) = get_tokenizer() {
        if let Ok(encoding) = tokenizer.encode(text, false) {
            return encoding.get_ids().len();
        }
    }

    let words = text.split_whitespace().count();
    (words as f64 / WORDS_PER_TOKEN) as usize
}

/// Return the last `n` tokens of `text`, decoded back to a string. Used to
/// seed the overlap region of the next chunk during recursive splitting.
pub fn get_last_n_tokens(text: &str, n: usize) -> String {
    if text.is_empty() || n == 0 {
        return String::new();
    }

    if let Some(tokenizer) = get_tokenizer() {
        if let Ok(encoding) = tokenizer.encode(text, false) {
            let ids = encoding.get_ids();
            let start = ids.len().saturating_sub(n);
            if let Ok(decoded) = tokenizer.decode(&ids[start..], true) {
                return decoded;
            }
        }
    }

    let words: Vec<&str> = text.split_whitespace().collect();
    let word_count = ((n as f64) * WORDS_PER_TOKEN).max(1.0) as usize;
    let start = words.len().saturating_sub(word_count);
    words[start..].join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_text_counts_zero() {
        assert_eq!(count_tokens(""), 0);
    }

    #[test]
    fn fallback_approximates_words_over_ratio() {
        let text = "one two three four";
        let count = count_tokens(text);
        assert_eq!(count, (4.0 / WORDS_PER_TOKEN) as usize);
    }

    #[test]
    fn last_n_tokens_of_empty_text_is_empty() {
        assert_eq!(get_last_n_tokens("", 5), "");
    }

    #[test]
    fn last_n_tokens_zero_n_is_empty() {
        assert_eq!(get_last_n_tokens("some words here", 0), "");
    }

    #[test]
    fn last_n_tokens_fallback_takes_tail_words() {
        let text = "alpha beta gamma delta epsilon";
        let out = get_last_n_tokens(text, 4);
        assert!(out.ends_with("epsilon"));
    }
}
