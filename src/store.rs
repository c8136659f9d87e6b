//! # Log Store
//!
//! One execution site's entry store plus its [`FieldIndexer`], behind a small facade that
//! routes a raw query string to the structured evaluator or to free-text search.
//!
//! Entries are append-only and addressed by position. A store owns no global state, so a
//! host can keep one per thread or share one behind an `RwLock` (queries take `&self`,
//! appends take `&mut self`).

use crate::ast::QueryNode;
use crate::config::LogConfig;
use crate::error::{QueryError, Result};
use crate::eval::{evaluate_query, EvaluationContext, EvaluationResult};
use crate::indexer::FieldIndexer;
use crate::ingest::read_entries;
use crate::parser::parse_query;
use crate::search::{search_entries, SearchHit};
use crate::types::{EntryIndex, ParsedLogEntry};
use std::io::BufRead;
use std::ops::Range;
use std::path::Path;
use std::time::Instant;
use tracing::debug;

/// What running a query string produced.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryResponse {
    /// The input parsed as a structured query.
    Structured {
        ast: QueryNode,
        result: EvaluationResult,
    },
    /// The input was free text; hits are best first.
    Legacy {
        hits: Vec<SearchHit>,
        elapsed_ms: f64,
    },
    /// The input looked structured but is malformed. Nothing was evaluated.
    Invalid { errors: Vec<QueryError> },
}

impl QueryResponse {
    /// Matched entry indices, in result order.
    pub fn indices(&self) -> Vec<EntryIndex> {
        match self {
            QueryResponse::Structured { result, .. } => result.matched_indices.clone(),
            QueryResponse::Legacy { hits, .. } => hits.iter().map(|h| h.index).collect(),
            QueryResponse::Invalid { .. } => Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            QueryResponse::Structured { result, .. } => result.matched_indices.len(),
            QueryResponse::Legacy { hits, .. } => hits.len(),
            QueryResponse::Invalid { .. } => 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn errors(&self) -> &[QueryError] {
        match self {
            QueryResponse::Invalid { errors } => errors,
            _ => &[],
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct LogStore {
    entries: Vec<ParsedLogEntry>,
    indexer: FieldIndexer,
    config: LogConfig,
}

impl LogStore {
    /// Creates an empty store with the default configuration.
    pub fn new() -> Self {
        Self::with_config(LogConfig::default())
    }

    pub fn with_config(config: LogConfig) -> Self {
        Self {
            entries: Vec::new(),
            indexer: FieldIndexer::with_config(&config),
            config,
        }
    }

    /// Creates an empty store configured from a JSON file.
    pub fn from_config_file(path: impl AsRef<Path>) -> Result<Self> {
        let config = LogConfig::from_file(path)?;
        Ok(Self::with_config(config))
    }

    /// Appends one entry and indexes it.
    pub fn push(&mut self, entry: ParsedLogEntry) -> EntryIndex {
        let index = self.entries.len();
        self.indexer.add_entry(&entry, index);
        self.entries.push(entry);
        index
    }

    /// Appends a batch, indexing it in one pass. Returns the new entries' positions.
    pub fn push_batch(&mut self, batch: Vec<ParsedLogEntry>) -> Range<EntryIndex> {
        let start = self.entries.len();
        self.indexer.add_batch(&batch, start);
        self.entries.extend(batch);
        start..self.entries.len()
    }

    /// Ingests every non-blank line of `reader`; returns how many entries were added.
    pub fn ingest_from_reader<R: BufRead>(&mut self, reader: R) -> Result<usize> {
        let batch = read_entries(reader)?;
        Ok(self.push_batch(batch).len())
    }

    /// Throws the indexes away and rebuilds them from the stored entries.
    pub fn rebuild_indexes(&mut self) {
        self.indexer = FieldIndexer::with_config(&self.config);
        self.indexer.build_indexes(&self.entries);
    }

    /// Parses `query` and evaluates it, or falls back to free-text search.
    pub fn run_query(&self, query: &str) -> QueryResponse {
        let outcome = parse_query(query);
        if !outcome.errors.is_empty() {
            debug!(query, errors = outcome.errors.len(), "query rejected");
            return QueryResponse::Invalid {
                errors: outcome.errors,
            };
        }

        match outcome.ast {
            Some(ast) if !outcome.is_legacy_text_search => {
                let result = evaluate_query(&ast, &self.context());
                QueryResponse::Structured { ast, result }
            }
            _ => {
                let start = Instant::now();
                let hits = search_entries(&self.entries, query, &self.config);
                QueryResponse::Legacy {
                    hits,
                    elapsed_ms: start.elapsed().as_secs_f64() * 1000.0,
                }
            }
        }
    }

    pub fn context(&self) -> EvaluationContext<'_> {
        EvaluationContext::new(&self.entries).with_indexer(&self.indexer)
    }

    /// Resolves indices to entries, skipping any that are out of range.
    pub fn entries_for(&self, indices: &[EntryIndex]) -> Vec<&ParsedLogEntry> {
        indices.iter().filter_map(|&i| self.entries.get(i)).collect()
    }

    pub fn get(&self, index: EntryIndex) -> Option<&ParsedLogEntry> {
        self.entries.get(index)
    }

    pub fn entries(&self) -> &[ParsedLogEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn indexer(&self) -> &FieldIndexer {
        &self.indexer
    }

    pub fn config(&self) -> &LogConfig {
        &self.config
    }

    pub fn stats(&self) -> String {
        format!("{}\n{}", self.indexer.stats(), self.config.stats())
    }
}
