//! Keyword extraction.
//!
//! Produces the bounded keyword fingerprint used both for candidate
//! retrieval and for history records.

use std::collections::HashSet;

/// Maximum number of keywords returned.
pub const MAX_KEYWORDS: usize = 10;

/// Tokens shorter than this are dropped.
const MIN_TOKEN_LEN: usize = 3;

/// Closed-class words plus domain-generic task vocabulary.
const STOP_WORDS: &[&str] = &[
    // articles and determiners
    "the", "and", "for", "are", "but", "not", "you", "all", "any", "can", "her", "was", "one",
    "our", "out", "his", "has", "had", "its", "let", "who", "did", "get", "got", "him", "how",
    "man", "new", "now", "old", "see", "two", "way", "too", "use", "yet", "own", "off", "per",
    "this", "that", "these", "those", "some", "each", "every", "such", "than", "then", "very",
    "much", "many", "more", "most", "other", "only", "also", "just", "same", "both", "few",
    // pronouns
    "she", "they", "them", "their", "theirs", "there", "what", "which", "whom", "whose", "your",
    "yours", "mine", "ours", "myself", "yourself", "itself", "themselves", "ourselves",
    // prepositions and conjunctions
    "with", "from", "into", "onto", "upon", "about", "above", "below", "after", "before",
    "over", "under", "between", "through", "during", "without", "within", "along", "across",
    "against", "among", "around", "behind", "beyond", "toward", "towards", "until", "while",
    "because", "since", "though", "although", "unless", "whether", "either", "neither", "nor",
    "when", "where", "why", "here", "via",
    // auxiliary and modal verbs
    "been", "being", "have", "having", "does", "doing", "done", "will", "would", "shall",
    "should", "could", "might", "must", "may", "were",
    // domain-generic words
    "task", "tasks", "work", "need", "needs", "needed", "want", "make", "thing", "things",
    "stuff", "todo", "item", "items", "please", "etc",
];

fn is_stop_word(token: &str) -> bool {
    STOP_WORDS.contains(&token)
}

/// Extract up to [`MAX_KEYWORDS`] keywords from free text.
///
/// Lowercases, strips everything outside `[a-z0-9]` and whitespace, drops
/// short tokens and stop words, and deduplicates in first-seen order. An
/// empty result means keyword retrieval cannot run.
pub fn extract_keywords(text: &str) -> Vec<String> {
    let cleaned: String = text
        .to_lowercase()
        .chars()
        .filter(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c.is_whitespace())
        .collect();

    let mut seen = HashSet::new();
    cleaned
        .split_whitespace()
        .filter(|token| token.len() >= MIN_TOKEN_LEN)
        .filter(|token| !is_stop_word(token))
        .filter(|token| seen.insert(token.to_string()))
        .take(MAX_KEYWORDS)
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_basic_extraction() {
        let keywords = extract_keywords("Plan the quarterly offsite for the team!");
        assert_eq!(keywords, vec!["plan", "quarterly", "offsite", "team"]);
    }

    #[test]
    fn test_punctuation_is_stripped_not_split() {
        assert_eq!(extract_keywords("re-design API's"), vec!["redesign", "apis"]);
    }

    #[test]
    fn test_deduplicates_in_first_seen_order() {
        let keywords = extract_keywords("Budget review, budget sign-off, REVIEW budget");
        assert_eq!(keywords, vec!["budget", "review", "signoff"]);
    }

    #[test]
    fn test_caps_at_ten() {
        let text = "alpha bravo charlie delta echo foxtrot golf hotel india juliet kilo lima";
        let keywords = extract_keywords(text);
        assert_eq!(keywords.len(), MAX_KEYWORDS);
        assert_eq!(keywords.last().map(String::as_str), Some("juliet"));
    }

    #[test]
    fn test_empty_and_stop_word_only_input() {
        assert!(extract_keywords("").is_empty());
        assert!(extract_keywords("   ").is_empty());
        assert!(extract_keywords("the task that we need to do").is_empty());
    }

    #[test]
    fn test_no_stop_words_leak() {
        let keywords = extract_keywords("Work with them about this task before Friday");
        assert!(keywords.iter().all(|k| !is_stop_word(k)));
        assert_eq!(keywords, vec!["friday"]);
    }

    #[test]
    fn test_is_pure() {
        let text = "Migrate billing database to new cluster";
        assert_eq!(extract_keywords(text), extract_keywords(text));
    }
}
