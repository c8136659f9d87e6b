use thiserror::Error;

/// A syntax problem in a structured query.
///
/// Reported inside [`crate::parser::ParseOutcome::errors`]; the parser never returns it as
/// an `Err`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}{}", at_position(.position))]
pub struct QueryError {
    pub message: String,
    /// Byte offset into the query string, when the problem has a location.
    pub position: Option<usize>,
}

impl QueryError {
    pub fn at(message: impl Into<String>, position: usize) -> Self {
        Self {
            message: message.into(),
            position: Some(position),
        }
    }
}

fn at_position(position: &Option<usize>) -> String {
    position
        .map(|pos| format!(" (at position {pos})"))
        .unwrap_or_default()
}

/// Errors raised while loading configuration or ingesting log lines.
#[derive(Error, Debug)]
pub enum LoadError {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid json: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, LoadError>;
