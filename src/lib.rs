//! # logchaos
//!
//! In-memory query core for heterogeneous log streams: a structured query language with a
//! free-text fallback, evaluated over seven log formats with optional secondary indexes.
//!
//! ```
//! use logchaos::{LogStore, QueryResponse};
//!
//! let mut store = LogStore::new();
//! let lines = "{\"time\":1,\"level\":50,\"msg\":\"db timeout\"}\nINFO all good\n";
//! store.ingest_from_reader(lines.as_bytes()).unwrap();
//!
//! match store.run_query("level=error AND contains(message, \"timeout\")") {
//!     QueryResponse::Structured { result, .. } => assert_eq!(result.matched_indices, vec![0]),
//!     other => panic!("{other:?}"),
//! }
//! ```
pub mod ast;
pub mod config;
pub mod error;
pub mod eval;
pub mod extract;
pub mod indexer;
pub mod ingest;
pub mod lexer;
pub mod normalize;
pub mod parser;
pub mod search;
pub mod store;
pub mod types;

// Re-export main types
pub use config::LogConfig;
pub use error::{LoadError, QueryError};
pub use store::{LogStore, QueryResponse};
pub use types::{Environment, Level, LogEntry, LogKind, ParsedLogEntry};

// Re-export the query pipeline for callers that drive it directly
pub use ast::QueryNode;
pub use eval::{evaluate_query, EvaluationContext, EvaluationResult};
pub use extract::extract_field_value;
pub use indexer::FieldIndexer;
pub use parser::{parse_query, validate_query, ParseOutcome, Validation};
pub use search::{calculate_relevance, matches_query, search_entries, tokenize_query, QueryTokens};
