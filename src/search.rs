//! # Free-text Search
//!
//! The fallback used whenever a query string does not look structured. Queries are split
//! into quoted phrases and stemmed tokens; an entry matches when every phrase occurs in its
//! search text and every token occurs as a substring or, failing that, is one edit away
//! from some word. Matches are ranked by an additive relevance score.

use crate::config::LogConfig;
use crate::extract::search_text;
use crate::types::{EntryIndex, Environment, Level, ParsedLogEntry};
use std::time::Instant;
use tracing::debug;

/// Token that selects entries whose level or environment could not be determined.
pub const UNKNOWN_TOKEN: &str = "unknown";

/// Tried longest first; at most one is stripped.
const STEM_SUFFIXES: &[&str] = &["ing", "ies", "ied", "es", "ed", "ly", "s"];

const PHRASE_SCORE: u32 = 100;
const OCCURRENCE_SCORE: u32 = 10;
const WORD_BOUNDARY_SCORE: u32 = 20;
const PREFIX_SCORE: u32 = 15;
const FUZZY_SCORE: u32 = 5;
const UNKNOWN_SCORE: u32 = 30;

fn is_separator(c: char) -> bool {
    c.is_whitespace()
        || matches!(
            c,
            ',' | ';' | ':' | '!' | '?' | '(' | ')' | '[' | ']' | '{' | '}' | '<' | '>' | '"' | '\'' | '|'
        )
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryTokens {
    /// Stemmed, lowercased words.
    pub tokens: Vec<String>,
    /// Lowercased exact substrings from double quotes.
    pub phrases: Vec<String>,
    /// Set when the query contained the bare word `unknown`.
    pub include_unknown: bool,
}

impl QueryTokens {
    /// Tokens and phrases, ignoring the `unknown` selector.
    pub fn has_terms(&self) -> bool {
        !self.tokens.is_empty() || !self.phrases.is_empty()
    }

    pub fn is_empty(&self) -> bool {
        !self.has_terms() && !self.include_unknown
    }
}

/// One ranked free-text hit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SearchHit {
    pub index: EntryIndex,
    pub score: u32,
}

pub fn tokenize_query(query: &str) -> QueryTokens {
    let lowered = query.to_lowercase();
    let mut result = QueryTokens::default();

    let mut remainder = String::with_capacity(lowered.len());
    let mut rest = lowered.as_str();
    while let Some(open) = rest.find('"') {
        remainder.push_str(&rest[..open]);
        remainder.push(' ');
        let after = &rest[open + 1..];
        match after.find('"') {
            Some(close) => {
                let phrase = after[..close].trim();
                if !phrase.is_empty() {
                    result.phrases.push(phrase.to_string());
                }
                rest = &after[close + 1..];
            }
            None => {
                // Unbalanced quote: the rest is ordinary text.
                rest = after;
                break;
            }
        }
    }
    remainder.push_str(rest);

    for word in remainder.split(is_separator).filter(|w| !w.is_empty()) {
        if word == UNKNOWN_TOKEN {
            result.include_unknown = true;
            continue;
        }
        let token = stem(word);
        if !result.tokens.contains(&token) {
            result.tokens.push(token);
        }
    }
    result
}

/// Strips one common English suffix, keeping at least two characters.
pub fn stem(word: &str) -> String {
    let len = word.chars().count();
    STEM_SUFFIXES
        .iter()
        .find(|suffix| word.ends_with(*suffix) && len - suffix.len() >= 2)
        .map(|suffix| word[..word.len() - suffix.len()].to_string())
        .unwrap_or_else(|| word.to_string())
}

pub fn levenshtein_distance(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();

    // Two rolling rows of the edit-distance table.
    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr = vec![0; b.len() + 1];

    for (i, ca) in a.iter().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let cost = usize::from(ca != cb);
            curr[j + 1] = (prev[j + 1] + 1).min(curr[j] + 1).min(prev[j] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[b.len()]
}

/// True when some word of `text` is within one edit of `token`.
fn fuzzy_matches(text: &str, token: &str, min_word_len: usize) -> bool {
    let token_len = token.chars().count();
    if token_len < min_word_len {
        return false;
    }
    text.split(is_separator).any(|word| {
        let word_len = word.chars().count();
        word_len >= min_word_len
            && word_len.abs_diff(token_len) <= 2
            && levenshtein_distance(word, token) <= 1
    })
}

fn token_matches(search_text: &str, token: &str, config: &LogConfig) -> bool {
    search_text.contains(token)
        || (config.fuzzy && fuzzy_matches(search_text, token, config.fuzzy_min_word_len))
}

/// Every phrase must occur literally; every token literally or fuzzily.
/// A query without tokens or phrases matches everything.
pub fn matches_query(search_text: &str, query: &QueryTokens, config: &LogConfig) -> bool {
    query.phrases.iter().all(|p| search_text.contains(p.as_str()))
        && query.tokens.iter().all(|t| token_matches(search_text, t, config))
}

pub fn calculate_relevance(search_text: &str, query: &QueryTokens, config: &LogConfig) -> u32 {
    let mut score = 0;

    for phrase in &query.phrases {
        if search_text.contains(phrase.as_str()) {
            score += PHRASE_SCORE;
        }
    }

    for token in &query.tokens {
        let mut occurrences = 0;
        let mut on_boundary = false;
        for (at, _) in search_text.match_indices(token.as_str()) {
            occurrences += 1;
            on_boundary |= search_text[..at]
                .chars()
                .next_back()
                .map_or(true, |c| !c.is_alphanumeric());
        }

        if occurrences > 0 {
            score += OCCURRENCE_SCORE * occurrences;
            if on_boundary {
                score += WORD_BOUNDARY_SCORE;
            }
            if search_text.starts_with(token.as_str()) {
                score += PREFIX_SCORE;
            }
        } else if config.fuzzy && fuzzy_matches(search_text, token, config.fuzzy_min_word_len) {
            score += FUZZY_SCORE;
        }
    }
    score
}

fn is_unknown(entry: &ParsedLogEntry) -> bool {
    let n = entry.normalized();
    n.level == Level::Unknown || n.environment == Environment::Unknown
}

/// Ranks `entries` against a free-text `query`, best first. Equal scores keep store order.
pub fn search_entries(entries: &[ParsedLogEntry], query: &str, config: &LogConfig) -> Vec<SearchHit> {
    let start = Instant::now();
    let tokens = tokenize_query(query);

    if tokens.is_empty() {
        return (0..entries.len())
            .map(|index| SearchHit { index, score: 0 })
            .collect();
    }

    let mut hits: Vec<SearchHit> = entries
        .iter()
        .enumerate()
        .filter_map(|(index, entry)| {
            let text = search_text(entry);
            let unknown = tokens.include_unknown && is_unknown(entry);
            let matched = tokens.has_terms() && matches_query(text, &tokens, config);
            if !unknown && !matched {
                return None;
            }
            let mut score = if matched {
                calculate_relevance(text, &tokens, config)
            } else {
                0
            };
            if unknown {
                score += UNKNOWN_SCORE;
            }
            Some(SearchHit { index, score })
        })
        .collect();

    hits.sort_by(|a, b| b.score.cmp(&a.score));
    debug!(
        query,
        tokens = tokens.tokens.len(),
        phrases = tokens.phrases.len(),
        hits = hits.len(),
        elapsed_us = start.elapsed().as_micros() as u64,
        "free-text search"
    );
    hits
}
