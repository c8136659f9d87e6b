//! # Line Ingestion
//!
//! Turns raw log lines into [`ParsedLogEntry`] values. JSON objects are classified by key
//! shape, first match wins:
//!
//! | kind       | required keys                 |
//! |------------|-------------------------------|
//! | `pino`     | `time`, `level`, `msg`        |
//! | `winston`  | `timestamp`, `level`, `message` |
//! | `loki`     | `ts`, `labels`, `line`        |
//! | `promtail` | `ts`, `level`, `message`      |
//! | `docker`   | `log`, `stream`, `time`       |
//!
//! A shape whose values have the wrong types falls through to the next one. Any other JSON
//! object is `unknown-json`; everything else is kept verbatim as `text`.

use crate::error::Result;
use crate::types::{
    DockerEntry, LogEntry, LogKind, LokiEntry, ParsedLogEntry, PinoEntry, PromtailEntry,
    TextEntry, WinstonEntry,
};
use serde::Deserialize;
use serde_json::Value;
use std::io::BufRead;
use tracing::{debug, warn};

const SHAPES: &[(LogKind, &[&str])] = &[
    (LogKind::Pino, &["time", "level", "msg"]),
    (LogKind::Winston, &["timestamp", "level", "message"]),
    (LogKind::Loki, &["ts", "labels", "line"]),
    (LogKind::Promtail, &["ts", "level", "message"]),
    (LogKind::Docker, &["log", "stream", "time"]),
];

/// Classifies one line. Blank lines yield `None`.
pub fn parse_line(line: &str) -> Option<ParsedLogEntry> {
    let line = line.trim_end_matches(|c| c == '\n' || c == '\r');
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return None;
    }

    if trimmed.starts_with('{') {
        match serde_json::from_str::<Value>(trimmed) {
            Ok(value @ Value::Object(_)) => return Some(ParsedLogEntry::new(classify(value))),
            Ok(_) => {}
            Err(err) => warn!(error = %err, "line looks like JSON but does not parse, keeping as text"),
        }
    }

    Some(ParsedLogEntry::new(LogEntry::Text(TextEntry {
        line: line.to_string(),
    })))
}

/// Picks the first record shape `value` fits, or `unknown-json`.
pub fn classify(value: Value) -> LogEntry {
    for (kind, keys) in SHAPES {
        let fits = value
            .as_object()
            .is_some_and(|obj| keys.iter().all(|k| obj.contains_key(*k)));
        if !fits {
            continue;
        }
        if let Some(entry) = typed(*kind, &value) {
            return entry;
        }
        debug!(kind = %kind, "record has the keys of a known shape but not the types");
    }
    LogEntry::UnknownJson(value)
}

fn typed(kind: LogKind, value: &Value) -> Option<LogEntry> {
    let entry = match kind {
        LogKind::Pino => LogEntry::Pino(PinoEntry::deserialize(value).ok()?),
        LogKind::Winston => LogEntry::Winston(WinstonEntry::deserialize(value).ok()?),
        LogKind::Loki => LogEntry::Loki(LokiEntry::deserialize(value).ok()?),
        LogKind::Promtail => LogEntry::Promtail(PromtailEntry::deserialize(value).ok()?),
        LogKind::Docker => LogEntry::Docker(DockerEntry::deserialize(value).ok()?),
        LogKind::UnknownJson | LogKind::Text => return None,
    };
    Some(entry)
}

/// Reads every line of `reader`, skipping blank ones.
pub fn read_entries<R: BufRead>(reader: R) -> Result<Vec<ParsedLogEntry>> {
    let mut entries = Vec::new();
    for line in reader.lines() {
        if let Some(entry) = parse_line(&line?) {
            entries.push(entry);
        }
    }
    Ok(entries)
}
