//! # Query Evaluator
//!
//! Walks a [`QueryNode`] tree over an entry slice and returns the matching entry indices.
//!
//! Leaves are answered from the [`FieldIndexer`] when one is supplied and the predicate is
//! index-eligible:
//!
//! - `level = v`, `environment = v` use the exact-match maps,
//! - `timestamp (= | > | < | >= | <=) "<date>"` uses the sorted timestamp array,
//! - `contains(message, "word")` narrows candidates through the keyword index (every keyword
//!   containing the word, plus entries past the keyword cap) and then re-checks each one.
//!
//! Everything else is a full scan through the field extractor. A missing field never
//! matches, not even `!=`.

use crate::ast::{Argument, CompareOp, FunctionName, Literal, QueryNode, ValueType};
use crate::extract::extract_field_value;
use crate::indexer::FieldIndexer;
use crate::normalize::parse_timestamp;
use crate::parser::compile_regex;
use crate::types::{EntryIndex, Environment, FieldValue, Level, ParsedLogEntry};
use regex::Regex;
use std::cmp::Ordering;
use std::collections::HashSet;
use std::time::Instant;
use tracing::{debug, trace, warn};

/// What a query runs against. Cheap to build; borrow-only.
#[derive(Debug, Clone, Copy)]
pub struct EvaluationContext<'a> {
    pub entries: &'a [ParsedLogEntry],
    pub indexer: Option<&'a FieldIndexer>,
}

impl<'a> EvaluationContext<'a> {
    pub fn new(entries: &'a [ParsedLogEntry]) -> Self {
        Self {
            entries,
            indexer: None,
        }
    }

    pub fn with_indexer(mut self, indexer: &'a FieldIndexer) -> Self {
        self.indexer = Some(indexer);
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct EvaluationResult {
    /// Deduplicated; ascending except where a bare index lookup returned timestamp order.
    pub matched_indices: Vec<EntryIndex>,
    /// True when at least one leaf was answered from an index.
    pub used_indexes: bool,
    pub evaluation_time_ms: f64,
}

/// Evaluates `ast` against `context`. Never fails: bad regexes and missing fields only
/// make the affected predicate false.
pub fn evaluate_query(ast: &QueryNode, context: &EvaluationContext<'_>) -> EvaluationResult {
    let start = Instant::now();

    let indexer = context.indexer.filter(|indexer| {
        let fresh = indexer.total_entries() == context.entries.len();
        if !fresh {
            warn!(
                indexed = indexer.total_entries(),
                entries = context.entries.len(),
                "indexer out of sync with entries, falling back to full scan"
            );
        }
        fresh
    });

    let mut evaluator = Evaluator {
        entries: context.entries,
        indexer,
        used_indexes: false,
    };
    let matched_indices = evaluator.eval(ast);
    let evaluation_time_ms = start.elapsed().as_secs_f64() * 1000.0;

    debug!(
        matches = matched_indices.len(),
        entries = context.entries.len(),
        used_indexes = evaluator.used_indexes,
        evaluation_time_ms,
        "evaluated query"
    );

    EvaluationResult {
        matched_indices,
        used_indexes: evaluator.used_indexes,
        evaluation_time_ms,
    }
}

struct Evaluator<'a> {
    entries: &'a [ParsedLogEntry],
    indexer: Option<&'a FieldIndexer>,
    used_indexes: bool,
}

impl<'a> Evaluator<'a> {
    fn eval(&mut self, node: &QueryNode) -> Vec<EntryIndex> {
        let matched = match node {
            QueryNode::And(terms) => {
                let mut matched: Option<Vec<EntryIndex>> = None;
                for term in terms {
                    let hits = self.eval(term);
                    matched = Some(match matched {
                        None => hits,
                        Some(so_far) => {
                            let hits: HashSet<EntryIndex> = hits.into_iter().collect();
                            so_far.into_iter().filter(|i| hits.contains(i)).collect()
                        }
                    });
                    if matched.as_ref().is_some_and(Vec::is_empty) {
                        break;
                    }
                }
                matched.unwrap_or_else(|| (0..self.entries.len()).collect())
            }
            QueryNode::Or(terms) => {
                let mut union: HashSet<EntryIndex> = HashSet::new();
                for term in terms {
                    union.extend(self.eval(term));
                }
                let mut merged: Vec<EntryIndex> = union.into_iter().collect();
                merged.sort_unstable();
                merged
            }
            QueryNode::Not(inner) => {
                let excluded: HashSet<EntryIndex> = self.eval(inner).into_iter().collect();
                (0..self.entries.len())
                    .filter(|i| !excluded.contains(i))
                    .collect()
            }
            QueryNode::Comparison {
                field,
                operator,
                value,
            } => {
                let expected = coerce_literal(&field.name, value);
                match self.indexed_comparison(&field.name, *operator, value, &expected) {
                    Some(hits) => hits,
                    None => self.scan(|entry| {
                        extract_field_value(entry, &field.name)
                            .is_some_and(|actual| compare_values(&actual, *operator, &expected))
                    }),
                }
            }
            QueryNode::Function {
                field,
                function,
                argument,
            } => self.eval_function(&field.name, *function, argument),
        };
        trace!(node = %node, matches = matched.len(), "evaluated node");
        matched
    }

    fn scan(&self, predicate: impl Fn(&ParsedLogEntry) -> bool) -> Vec<EntryIndex> {
        self.entries
            .iter()
            .enumerate()
            .filter(|(_, entry)| predicate(entry))
            .map(|(i, _)| i)
            .collect()
    }

    /// Answers a comparison from the indexes, or `None` when it is not index-eligible.
    fn indexed_comparison(
        &mut self,
        field: &str,
        operator: CompareOp,
        literal: &Literal,
        expected: &FieldValue,
    ) -> Option<Vec<EntryIndex>> {
        let indexer = self.indexer?;
        let hits = match (field, operator, expected) {
            ("level", CompareOp::Eq, FieldValue::Str(level)) => indexer.query_by_level(level).to_vec(),
            ("environment" | "env", CompareOp::Eq, FieldValue::Str(env)) => {
                indexer.query_by_environment(env).to_vec()
            }
            ("timestamp", _, FieldValue::Num(ts)) if literal.value_type == ValueType::String => {
                let ts = *ts as i64;
                let (start, end) = match operator {
                    CompareOp::Eq => (Some(ts), Some(ts)),
                    CompareOp::Gt => (Some(ts.saturating_add(1)), None),
                    CompareOp::Ge => (Some(ts), None),
                    CompareOp::Lt => (None, Some(ts.saturating_sub(1))),
                    CompareOp::Le => (None, Some(ts)),
                    CompareOp::Ne => return None,
                };
                indexer.query_timestamp_range(start, end)
            }
            _ => return None,
        };
        self.used_indexes = true;
        Some(hits)
    }

    fn eval_function(&mut self, field: &str, function: FunctionName, argument: &Argument) -> Vec<EntryIndex> {
        match (function, argument) {
            (FunctionName::Matches, Argument::Regex { pattern, flags }) => {
                self.eval_matches(field, pattern, flags)
            }
            (FunctionName::Matches, Argument::Text(pattern)) => self.eval_matches(field, pattern, ""),
            (_, Argument::Regex { .. }) => Vec::new(),
            (_, Argument::Text(needle)) => {
                let needle = needle.to_lowercase();
                let test = |entry: &ParsedLogEntry| {
                    extract_field_value(entry, field).is_some_and(|value| {
                        let haystack = value.to_string().to_lowercase();
                        match function {
                            FunctionName::Contains => haystack.contains(&needle),
                            FunctionName::StartsWith => haystack.starts_with(&needle),
                            FunctionName::EndsWith => haystack.ends_with(&needle),
                            FunctionName::Matches => false,
                        }
                    })
                };

                if function == FunctionName::Contains && field == "message" {
                    if let Some(candidates) = self.keyword_candidates(&needle) {
                        return candidates
                            .into_iter()
                            .filter(|&i| self.entries.get(i).is_some_and(&test))
                            .collect();
                    }
                }
                self.scan(test)
            }
        }
    }

    /// Keyword-index candidates for `needle`, when the index can answer for it.
    fn keyword_candidates(&mut self, needle: &str) -> Option<Vec<EntryIndex>> {
        let candidates = self.indexer?.keyword_candidates(needle)?;
        self.used_indexes = true;
        Some(candidates)
    }

    fn eval_matches(&self, field: &str, pattern: &str, flags: &str) -> Vec<EntryIndex> {
        let regex: Regex = match compile_regex(pattern, flags) {
            Ok(regex) => regex,
            Err(err) => {
                debug!(pattern, flags, error = %err, "invalid regex, predicate is false");
                return Vec::new();
            }
        };
        self.scan(|entry| {
            extract_field_value(entry, field).is_some_and(|value| regex.is_match(&value.to_string()))
        })
    }
}

/// Turns a literal into the value entries are compared against.
///
/// Used by both the index and the scan path: a date string on `timestamp` becomes epoch
/// milliseconds, and a known level or environment alias becomes its canonical name.
pub fn coerce_literal(field: &str, literal: &Literal) -> FieldValue {
    let raw = literal.value.as_str();
    match field {
        "timestamp" if literal.value_type == ValueType::String => {
            if let Some(ms) = parse_timestamp(raw) {
                return FieldValue::Num(ms as f64);
            }
        }
        "level" => {
            if let Some(level) = Level::from_alias(raw) {
                return FieldValue::from(level.as_str());
            }
        }
        "environment" | "env" => {
            if let Some(env) = Environment::from_alias(raw) {
                return FieldValue::from(env.as_str());
            }
        }
        _ => {}
    }

    match literal.value_type {
        ValueType::Number => raw
            .parse::<f64>()
            .map(FieldValue::Num)
            .unwrap_or_else(|_| FieldValue::from(raw)),
        ValueType::Boolean => FieldValue::Bool(raw == "true"),
        ValueType::String => FieldValue::from(raw),
    }
}

/// Numbers compare numerically. Any other pairing compares the string renderings:
/// case-insensitively for `=`/`!=`, byte-wise for ordering.
pub fn compare_values(actual: &FieldValue, operator: CompareOp, expected: &FieldValue) -> bool {
    let ordering = match (actual, expected) {
        (FieldValue::Num(a), FieldValue::Num(b)) => match a.partial_cmp(b) {
            Some(ordering) => ordering,
            None => return false,
        },
        _ => {
            let a = actual.to_string();
            let b = expected.to_string();
            match operator {
                CompareOp::Eq => return a.to_lowercase() == b.to_lowercase(),
                CompareOp::Ne => return a.to_lowercase() != b.to_lowercase(),
                _ => a.cmp(&b),
            }
        }
    };

    match operator {
        CompareOp::Eq => ordering == Ordering::Equal,
        CompareOp::Ne => ordering != Ordering::Equal,
        CompareOp::Gt => ordering == Ordering::Greater,
        CompareOp::Lt => ordering == Ordering::Less,
        CompareOp::Ge => ordering != Ordering::Less,
        CompareOp::Le => ordering != Ordering::Greater,
    }
}
