//! # Field Indexer
//!
//! Secondary indexes over the entry store: by normalized level, environment and kind, an
//! inverted keyword index, and a timestamp array kept sorted for range queries.
//!
//! The indexer is plain owned data. `build_indexes` rebuilds from scratch, `add_batch` and
//! `add_entry` extend; nothing is ever removed. Incremental methods take `&mut self`, so a
//! multi-threaded host has to serialise writers itself (e.g. behind an `RwLock`).

use crate::config::LogConfig;
use crate::types::{EntryIndex, ParsedLogEntry};
use smallvec::SmallVec;
use std::collections::HashMap;
use std::time::Instant;
use tracing::debug;

/// Words never indexed as keywords.
pub const STOPWORDS: &[&str] = &[
    "the", "and", "or", "but", "a", "an", "is", "are", "was", "to", "of", "in", "on", "at", "by",
    "for", "with", "as", "be", "it", "from",
];

/// Most keywords map to a handful of entries; spill to the heap only when they don't.
type Posting = SmallVec<[EntryIndex; 4]>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimestampSlot {
    pub index: EntryIndex,
    /// Epoch milliseconds.
    pub timestamp: i64,
}

/// The index maps themselves, keyed by lowercased normalized strings.
#[derive(Debug, Clone, Default)]
pub struct FieldIndexes {
    pub by_level: HashMap<String, Vec<EntryIndex>>,
    pub by_environment: HashMap<String, Vec<EntryIndex>>,
    pub by_kind: HashMap<String, Vec<EntryIndex>>,
    pub by_keyword: HashMap<String, Posting>,
    /// Entries whose message had more keywords than the per-message cap.
    pub overflow: Vec<EntryIndex>,
    /// Sorted ascending by `(timestamp, index)`.
    pub timestamps: Vec<TimestampSlot>,
}

#[derive(Debug, Clone)]
pub struct FieldIndexer {
    indexes: FieldIndexes,
    total_entries: usize,
    keyword_limit: usize,
    min_keyword_len: usize,
}

impl Default for FieldIndexer {
    fn default() -> Self {
        Self::new()
    }
}

/// Lowercases, splits on whitespace, drops short words and stopwords and keeps the first
/// `limit` survivors.
pub fn extract_keywords(message: &str, limit: usize, min_len: usize) -> Vec<String> {
    capped_keywords(message, limit, min_len).0
}

/// Same as [`extract_keywords`], also reporting whether the cap cut anything off.
fn capped_keywords(message: &str, limit: usize, min_len: usize) -> (Vec<String>, bool) {
    let lowered = message.to_lowercase();
    let mut eligible = lowered.split_whitespace().filter(|word| is_keyword(word, min_len));
    let kept = eligible.by_ref().take(limit).map(str::to_string).collect();
    (kept, eligible.next().is_some())
}

fn is_keyword(word: &str, min_len: usize) -> bool {
    word.chars().count() >= min_len && !STOPWORDS.contains(&word)
}

impl FieldIndexer {
    pub fn new() -> Self {
        Self::with_config(&LogConfig::default())
    }

    pub fn with_config(config: &LogConfig) -> Self {
        Self {
            indexes: FieldIndexes::default(),
            total_entries: 0,
            keyword_limit: config.keyword_limit,
            min_keyword_len: config.min_keyword_len,
        }
    }

    /// Drops every index and rebuilds from `entries`.
    pub fn build_indexes(&mut self, entries: &[ParsedLogEntry]) {
        let start = Instant::now();
        self.indexes = FieldIndexes::default();
        self.total_entries = 0;
        self.add_batch(entries, 0);
        debug!(
            entries = entries.len(),
            keywords = self.indexes.by_keyword.len(),
            elapsed_us = start.elapsed().as_micros() as u64,
            "rebuilt field indexes"
        );
    }

    /// Indexes `entries` as store positions `start_index..start_index + entries.len()`,
    /// then re-sorts the timestamp array once.
    pub fn add_batch(&mut self, entries: &[ParsedLogEntry], start_index: EntryIndex) {
        for (offset, entry) in entries.iter().enumerate() {
            if let Some(slot) = self.index_entry(entry, start_index + offset) {
                self.indexes.timestamps.push(slot);
            }
        }
        self.indexes
            .timestamps
            .sort_unstable_by_key(|slot| (slot.timestamp, slot.index));
        self.total_entries = self.total_entries.max(start_index + entries.len());
        debug!(
            batch = entries.len(),
            start_index,
            total = self.total_entries,
            "indexed batch"
        );
    }

    /// Indexes one entry, inserting its timestamp in sorted position.
    pub fn add_entry(&mut self, entry: &ParsedLogEntry, index: EntryIndex) {
        if let Some(slot) = self.index_entry(entry, index) {
            let key = (slot.timestamp, slot.index);
            let at = self
                .indexes
                .timestamps
                .partition_point(|s| (s.timestamp, s.index) < key);
            self.indexes.timestamps.insert(at, slot);
        }
        self.total_entries = self.total_entries.max(index + 1);
    }

    /// Adds one entry to every index it has a value for; returns its timestamp slot, if any.
    fn index_entry(&mut self, entry: &ParsedLogEntry, index: EntryIndex) -> Option<TimestampSlot> {
        let normalized = entry.normalized();
        let indexes = &mut self.indexes;

        for (map, key) in [
            (&mut indexes.by_level, normalized.level.as_str()),
            (&mut indexes.by_environment, normalized.environment.as_str()),
            (&mut indexes.by_kind, normalized.kind.as_str()),
        ] {
            map.entry(key.to_string()).or_default().push(index);
        }

        let (keywords, overflowed) =
            capped_keywords(&normalized.message, self.keyword_limit, self.min_keyword_len);
        for keyword in keywords {
            let posting = indexes.by_keyword.entry(keyword).or_default();
            if posting.last() != Some(&index) {
                posting.push(index);
            }
        }
        if overflowed {
            indexes.overflow.push(index);
        }

        normalized
            .timestamp
            .map(|timestamp| TimestampSlot { index, timestamp })
    }

    pub fn query_by_level(&self, level: &str) -> &[EntryIndex] {
        lookup(&self.indexes.by_level, level)
    }

    pub fn query_by_environment(&self, environment: &str) -> &[EntryIndex] {
        lookup(&self.indexes.by_environment, environment)
    }

    pub fn query_by_kind(&self, kind: &str) -> &[EntryIndex] {
        lookup(&self.indexes.by_kind, kind)
    }

    pub fn query_by_keyword(&self, keyword: &str) -> &[EntryIndex] {
        self.indexes
            .by_keyword
            .get(&keyword.to_lowercase())
            .map(|p| p.as_slice())
            .unwrap_or(&[])
    }

    /// Every entry whose message may contain `needle` as a substring, ascending.
    ///
    /// A superset of the real matches: the postings of each keyword containing the needle,
    /// plus every entry that overflowed the keyword cap. Callers re-check candidates.
    /// `None` when the index cannot answer for `needle` (too short, a stopword, or a piece
    /// of one, since stopwords are never indexed).
    pub fn keyword_candidates(&self, needle: &str) -> Option<Vec<EntryIndex>> {
        let needle = needle.to_lowercase();
        if !self.is_indexable_keyword(&needle)
            || STOPWORDS.iter().any(|stopword| stopword.contains(needle.as_str()))
        {
            return None;
        }
        let mut candidates: Vec<EntryIndex> = self
            .indexes
            .by_keyword
            .iter()
            .filter(|(keyword, _)| keyword.contains(needle.as_str()))
            .flat_map(|(_, posting)| posting.iter().copied())
            .chain(self.indexes.overflow.iter().copied())
            .collect();
        candidates.sort_unstable();
        candidates.dedup();
        Some(candidates)
    }

    /// Entries with `start <= timestamp <= end`, in timestamp order. `None` bounds are open.
    pub fn query_timestamp_range(&self, start: Option<i64>, end: Option<i64>) -> Vec<EntryIndex> {
        let slots = &self.indexes.timestamps;
        let from = start.map_or(0, |s| slots.partition_point(|slot| slot.timestamp < s));
        slots[from..]
            .iter()
            .take_while(|slot| end.map_or(true, |e| slot.timestamp <= e))
            .map(|slot| slot.index)
            .collect()
    }

    /// Whether `word` is something the keyword index would have kept.
    pub fn is_indexable_keyword(&self, word: &str) -> bool {
        !word.is_empty()
            && !word.chars().any(char::is_whitespace)
            && is_keyword(&word.to_lowercase(), self.min_keyword_len)
    }

    pub fn total_entries(&self) -> usize {
        self.total_entries
    }

    pub fn indexes(&self) -> &FieldIndexes {
        &self.indexes
    }

    /// Returns a one-line summary of the index sizes.
    pub fn stats(&self) -> String {
        format!(
            "FieldIndexer: entries {} levels {} environments {} kinds {} keywords {} overflowed {} timestamps {}",
            self.total_entries,
            self.indexes.by_level.len(),
            self.indexes.by_environment.len(),
            self.indexes.by_kind.len(),
            self.indexes.by_keyword.len(),
            self.indexes.overflow.len(),
            self.indexes.timestamps.len(),
        )
    }
}

fn lookup<'a>(map: &'a HashMap<String, Vec<EntryIndex>>, key: &str) -> &'a [EntryIndex] {
    map.get(&key.to_lowercase())
        .map(Vec::as_slice)
        .unwrap_or(&[])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{LogEntry, PinoEntry, TextEntry};
    use serde_json::Map;

    fn pino(time: i64, level: u64, msg: &str) -> ParsedLogEntry {
        ParsedLogEntry::new(LogEntry::Pino(PinoEntry {
            time,
            level,
            msg: msg.into(),
            pid: None,
            hostname: None,
            name: None,
            req: None,
            res: None,
            meta: None,
            extra: Map::new(),
        }))
    }

    fn text(line: &str) -> ParsedLogEntry {
        ParsedLogEntry::new(LogEntry::Text(TextEntry { line: line.into() }))
    }

    #[test]
    fn timestamp_range_with_open_end() {
        let entries = vec![pino(100, 30, "a"), pino(200, 30, "b"), pino(300, 30, "c")];
        let mut indexer = FieldIndexer::new();
        indexer.build_indexes(&entries);
        assert_eq!(indexer.query_timestamp_range(Some(150), None), vec![1, 2]);
        assert_eq!(indexer.query_timestamp_range(None, Some(200)), vec![0, 1]);
        assert_eq!(indexer.query_timestamp_range(Some(200), Some(200)), vec![1]);
        assert_eq!(indexer.query_timestamp_range(Some(301), None), Vec::<usize>::new());
    }

    #[test]
    fn range_results_come_back_in_timestamp_order() {
        let entries = vec![pino(300, 30, "a"), pino(100, 30, "b"), pino(200, 30, "c")];
        let mut indexer = FieldIndexer::new();
        indexer.build_indexes(&entries);
        assert_eq!(indexer.query_timestamp_range(None, None), vec![1, 2, 0]);
    }

    #[test]
    fn level_environment_and_kind_lookups() {
        let entries = vec![pino(1, 50, "db timeout"), pino(2, 30, "ok"), text("WARN disk env=prod")];
        let mut indexer = FieldIndexer::new();
        indexer.build_indexes(&entries);
        assert_eq!(indexer.query_by_level("error"), &[0]);
        assert_eq!(indexer.query_by_level("ERROR"), &[0]);
        assert_eq!(indexer.query_by_level("warn"), &[2]);
        assert_eq!(indexer.query_by_environment("prod"), &[2]);
        assert_eq!(indexer.query_by_environment("unknown"), &[0, 1]);
        assert_eq!(indexer.query_by_kind("pino"), &[0, 1]);
        assert!(indexer.query_by_level("nope").is_empty());
        assert!(indexer.query_by_kind("syslog").is_empty());
    }

    #[test]
    fn keyword_extraction_caps_and_filters() {
        let words = extract_keywords(
            "The alpha and beta of gamma delta epsilon zeta eta theta iota kappa lambda mu",
            10,
            3,
        );
        assert_eq!(
            words,
            vec!["alpha", "beta", "gamma", "delta", "epsilon", "zeta", "eta", "theta", "iota", "kappa"]
        );
        assert!(!words.contains(&"lambda".to_string()));
    }

    #[test]
    fn keyword_index_is_capped_per_message() {
        let long = "one1 two2 three3 four4 five5 six6 seven7 eight8 nine9 ten10 eleven11";
        let mut indexer = FieldIndexer::new();
        indexer.build_indexes(&[pino(1, 30, long)]);
        assert_eq!(indexer.query_by_keyword("ten10"), &[0]);
        assert!(indexer.query_by_keyword("eleven11").is_empty());
        assert_eq!(indexer.query_by_keyword("ONE1"), &[0]);
        assert_eq!(indexer.indexes().overflow, vec![0]);
    }

    #[test]
    fn keyword_candidates_cover_partial_tokens_and_overflow() {
        let long = "a1b2 c3d4 e5f6 g7h8 i9j0 k1l2 m3n4 o5p6 q7r8 s9t0 late timeout";
        let entries = vec![
            pino(1, 30, "db timeout"),
            pino(2, 30, "request timeout, retrying"),
            pino(3, 30, "timeouts exceeded"),
            pino(4, 30, "all good"),
            pino(5, 30, long),
        ];
        let mut indexer = FieldIndexer::new();
        indexer.build_indexes(&entries);
        assert_eq!(indexer.query_by_keyword("timeout"), &[0]);
        assert_eq!(indexer.keyword_candidates("Timeout"), Some(vec![0, 1, 2, 4]));
        assert_eq!(indexer.keyword_candidates("good"), Some(vec![3, 4]));
        assert_eq!(indexer.keyword_candidates("db"), None);
        assert_eq!(indexer.keyword_candidates("wit"), None);
    }

    #[test]
    fn repeated_keyword_is_posted_once() {
        let mut indexer = FieldIndexer::new();
        indexer.build_indexes(&[pino(1, 30, "retry retry retry")]);
        assert_eq!(indexer.query_by_keyword("retry"), &[0]);
    }

    #[test]
    fn incremental_matches_rebuild() {
        let entries = vec![
            pino(500, 50, "db timeout"),
            pino(100, 30, "cache hit"),
            text("INFO 2024-05-01T10:00:00Z worker: job started"),
            pino(300, 40, "slow query"),
            text("no level here"),
        ];
        let mut rebuilt = FieldIndexer::new();
        rebuilt.build_indexes(&entries);

        let mut incremental = FieldIndexer::new();
        incremental.add_batch(&entries[..2], 0);
        incremental.add_entry(&entries[2], 2);
        incremental.add_batch(&entries[3..], 3);

        assert_eq!(incremental.total_entries(), entries.len());
        assert_eq!(rebuilt.indexes().timestamps, incremental.indexes().timestamps);
        assert_eq!(rebuilt.indexes().by_level, incremental.indexes().by_level);
        assert_eq!(rebuilt.indexes().by_keyword, incremental.indexes().by_keyword);
        assert_eq!(rebuilt.indexes().overflow, incremental.indexes().overflow);
    }

    #[test]
    fn entries_without_timestamp_are_skipped_only_there() {
        let mut indexer = FieldIndexer::new();
        indexer.build_indexes(&[text("ERROR no timestamp at all")]);
        assert!(indexer.query_timestamp_range(None, None).is_empty());
        assert_eq!(indexer.query_by_level("error"), &[0]);
        assert_eq!(indexer.total_entries(), 1);
    }

    #[test]
    fn indexable_keywords() {
        let indexer = FieldIndexer::new();
        assert!(indexer.is_indexable_keyword("Timeout"));
        assert!(!indexer.is_indexable_keyword("from"));
        assert!(!indexer.is_indexable_keyword("db"));
        assert!(!indexer.is_indexable_keyword("db timeout"));
    }

    #[test]
    fn stats_mentions_counts() {
        let mut indexer = FieldIndexer::new();
        indexer.build_indexes(&[pino(1, 30, "hello world")]);
        assert!(indexer.stats().contains("entries 1"));
    }
}
