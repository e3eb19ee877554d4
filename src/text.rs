use lazy_static::lazy_static;
use rust_stemmers::{Algorithm, Stemmer};
use std::collections::{HashMap, HashSet};
use unicode_normalization::UnicodeNormalization;
use unicode_segmentation::UnicodeSegmentation;

lazy_static! {
    /// English stop words dropped before any weighting or overlap check.
    static ref STOP_WORDS: HashSet<&'static str> = [
        "a", "about", "above", "after", "again", "against", "all", "am", "an", "and", "any",
        "are", "aren", "as", "at", "be", "because", "been", "before", "being", "below",
        "between", "both", "but", "by", "can", "cannot", "could", "couldn", "did", "didn",
        "do", "does", "doesn", "doing", "don", "down", "during", "each", "few", "for", "from",
        "further", "had", "hadn", "has", "hasn", "have", "haven", "having", "he", "her",
        "here", "hers", "herself", "him", "himself", "his", "how", "i", "if", "in", "into",
        "is", "isn", "it", "its", "itself", "just", "me", "more", "most", "my", "myself",
        "no", "nor", "not", "now", "of", "off", "on", "once", "only", "or", "other", "our",
        "ours", "ourselves", "out", "over", "own", "s", "said", "same", "she", "should",
        "shouldn", "so", "some", "such", "t", "than", "that", "the", "their", "theirs",
        "them", "themselves", "then", "there", "these", "they", "this", "those", "through",
        "to", "too", "under", "until", "up", "very", "was", "wasn", "we", "were", "weren",
        "what", "when", "where", "which", "while", "who", "whom", "why", "will", "with",
        "won", "would", "wouldn", "you", "your", "yours", "yourself", "yourselves",
    ]
    .into_iter()
    .collect();
}

/// Lowercases, NFC-folds, tokenizes into alphanumeric word tokens,
/// drops stop words, and stems each surviving token.
///
/// This is the single preprocessing path shared by the lexical
/// vectorizer, the keyword-overlap gate, and title generation, so the
/// three can never disagree on what a "term" is.
pub fn preprocess(text: &str) -> Vec<String> {
    let folded: String = text.nfc().collect::<String>().to_lowercase();
    let stemmer = Stemmer::create(Algorithm::English);
    folded
        .unicode_words()
        .filter(|token| token.chars().all(char::is_alphanumeric))
        .filter(|token| !STOP_WORDS.contains(token))
        .map(|token| stemmer.stem(token).to_string())
        .collect()
}

/// Top-k terms by frequency, most frequent first. Ties broken by first
/// occurrence in the token stream, so the result is deterministic for
/// a fixed input.
pub fn top_terms(tokens: &[String], k: usize) -> Vec<String> {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    let mut order: Vec<&str> = Vec::new();
    for token in tokens {
        let entry = counts.entry(token.as_str()).or_insert(0);
        if *entry == 0 {
            order.push(token.as_str());
        }
        *entry += 1;
    }
    let mut ranked: Vec<(usize, &str)> = order
        .iter()
        .enumerate()
        .map(|(first_seen, term)| (first_seen, *term))
        .collect();
    ranked.sort_by(|a, b| counts[b.1].cmp(&counts[a.1]).then(a.0.cmp(&b.0)));
    ranked.into_iter().take(k).map(|(_, t)| t.to_string()).collect()
}
