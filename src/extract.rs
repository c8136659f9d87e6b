//! # Field Extractor
//!
//! Resolves a field name against a [`ParsedLogEntry`]. Resolution happens in three steps:
//!
//! 1. fields every kind has (`level`, `message`, `timestamp`, `environment`, `kind`, and
//!    the HTTP fields lifted out by normalization),
//! 2. the per-kind field table,
//! 3. a dynamic lookup on the raw record, following dot-separated paths through nested
//!    objects (`req.method`, `labels.app`, `meta.userId`).
//!
//! Nothing here panics; a field that cannot be resolved is `None`, and `None` never matches
//! a predicate.

use crate::types::{
    DockerEntry, FieldValue, LogEntry, LokiEntry, ParsedLogEntry, PinoEntry, PromtailEntry,
    TextEntry, WinstonEntry,
};
use serde_json::{Map, Value};

type Accessor<T> = fn(&T) -> Option<FieldValue>;

const PINO_FIELDS: &[(&str, Accessor<PinoEntry>)] = &[
    ("pid", |p| p.pid.map(|n| FieldValue::Num(n as f64))),
    ("hostname", |p| p.hostname.as_deref().map(FieldValue::from)),
    ("name", |p| p.name.as_deref().map(FieldValue::from)),
    ("service", |p| p.name.as_deref().map(FieldValue::from)),
    ("time", |p| Some(FieldValue::Num(p.time as f64))),
    ("rawLevel", |p| Some(FieldValue::Num(p.level as f64))),
];

const WINSTON_FIELDS: &[(&str, Accessor<WinstonEntry>)] = &[
    ("rawLevel", |w| Some(FieldValue::from(w.level.as_str()))),
];

const LOKI_FIELDS: &[(&str, Accessor<LokiEntry>)] = &[
    ("ts", |l| Some(FieldValue::from(l.ts.as_str()))),
    ("line", |l| Some(FieldValue::from(l.line.as_str()))),
    ("service", |l| l.labels.get("app").and_then(FieldValue::from_json)),
    ("host", |l| l.labels.get("instance").and_then(FieldValue::from_json)),
];

const PROMTAIL_FIELDS: &[(&str, Accessor<PromtailEntry>)] = &[
    ("ts", |p| Some(FieldValue::from(p.ts.as_str()))),
    ("rawLevel", |p| Some(FieldValue::from(p.level.as_str()))),
];

const DOCKER_FIELDS: &[(&str, Accessor<DockerEntry>)] = &[
    ("stream", |d| Some(FieldValue::from(d.stream.as_str()))),
    ("log", |d| Some(FieldValue::from(d.log.as_str()))),
    ("time", |d| Some(FieldValue::from(d.time.as_str()))),
];

const TEXT_FIELDS: &[(&str, Accessor<TextEntry>)] = &[
    ("line", |t| Some(FieldValue::from(t.line.as_str()))),
];

/// Returns the typed value of `field` on `entry`, or `None`.
pub fn extract_field_value(entry: &ParsedLogEntry, field: &str) -> Option<FieldValue> {
    let field = field.trim();
    if field.is_empty() {
        return None;
    }
    if let Some(resolved) = common_field(entry, field) {
        return resolved;
    }
    if let Some(resolved) = kind_field(entry.entry(), field) {
        return resolved;
    }
    dynamic_lookup(entry.entry(), field).and_then(FieldValue::from_json)
}

/// Normalized message text of an entry.
pub fn extract_message(entry: &ParsedLogEntry) -> &str {
    &entry.normalized().message
}

/// Epoch-millisecond timestamp of an entry.
pub fn extract_timestamp(entry: &ParsedLogEntry) -> Option<i64> {
    entry.normalized().timestamp
}

/// The lowercased blob free-text search runs against.
pub fn search_text(entry: &ParsedLogEntry) -> &str {
    &entry.normalized().search_text
}

/// `Some(_)` when `field` is one of the cross-kind names, even if the entry has no value.
fn common_field(entry: &ParsedLogEntry, field: &str) -> Option<Option<FieldValue>> {
    let n = entry.normalized();
    let http = n.http.as_ref();
    let value = match field {
        "kind" => Some(FieldValue::from(n.kind.as_str())),
        "level" => Some(FieldValue::from(n.level.as_str())),
        "environment" | "env" => Some(FieldValue::from(n.environment.as_str())),
        "message" | "msg" => Some(FieldValue::from(n.message.as_str())),
        "timestamp" => n.timestamp.map(|ts| FieldValue::Num(ts as f64)),
        "method" => http.and_then(|h| h.method.as_deref()).map(FieldValue::from),
        "url" => http.and_then(|h| h.url.as_deref()).map(FieldValue::from),
        "statusCode" | "status" => http
            .and_then(|h| h.status_code)
            .map(|c| FieldValue::Num(c as f64)),
        "responseTimeMs" => http.and_then(|h| h.response_time_ms).map(FieldValue::Num),
        _ => return None,
    };
    Some(value)
}

fn kind_field(entry: &LogEntry, field: &str) -> Option<Option<FieldValue>> {
    fn lookup<T>(table: &[(&str, Accessor<T>)], record: &T, field: &str) -> Option<Option<FieldValue>> {
        table
            .iter()
            .find(|(name, _)| *name == field)
            .map(|(_, accessor)| accessor(record))
    }

    match entry {
        LogEntry::Pino(p) => lookup(PINO_FIELDS, p, field),
        LogEntry::Winston(w) => lookup(WINSTON_FIELDS, w, field),
        LogEntry::Loki(l) => lookup(LOKI_FIELDS, l, field),
        LogEntry::Promtail(p) => lookup(PROMTAIL_FIELDS, p, field),
        LogEntry::Docker(d) => lookup(DOCKER_FIELDS, d, field),
        LogEntry::Text(t) => lookup(TEXT_FIELDS, t, field),
        LogEntry::UnknownJson(_) => None,
    }
}

/// Best-effort lookup on the raw record for names no table knows about.
fn dynamic_lookup<'a>(entry: &'a LogEntry, field: &str) -> Option<&'a Value> {
    let segments: Vec<&str> = field.split('.').collect();
    if segments.iter().any(|s| s.is_empty()) {
        return None;
    }
    let (head, rest) = segments.split_first()?;

    match entry {
        LogEntry::Pino(p) => match *head {
            "req" => walk(p.req.as_ref()?, rest),
            "res" => walk(p.res.as_ref()?, rest),
            "meta" => walk(p.meta.as_ref()?, rest),
            _ => walk_map(&p.extra, &segments),
        },
        LogEntry::Winston(w) => match *head {
            "meta" => walk(w.meta.as_ref()?, rest),
            _ => walk_map(&w.extra, &segments).or_else(|| {
                w.meta
                    .as_ref()
                    .and_then(Value::as_object)
                    .and_then(|meta| walk_map(meta, &segments))
            }),
        },
        LogEntry::Loki(l) => match *head {
            "labels" => walk_map(&l.labels, rest),
            _ => walk_map(&l.labels, &segments),
        },
        LogEntry::Promtail(p) => walk_map(&p.extra, &segments),
        LogEntry::UnknownJson(v) => walk(v, &segments),
        LogEntry::Docker(_) | LogEntry::Text(_) => None,
    }
}

fn walk_map<'a>(map: &'a Map<String, Value>, segments: &[&str]) -> Option<&'a Value> {
    let (head, rest) = segments.split_first()?;
    walk(map.get(*head)?, rest)
}

/// Follows object keys and numeric array indexes.
fn walk<'a>(mut current: &'a Value, segments: &[&str]) -> Option<&'a Value> {
    for segment in segments {
        current = match current {
            Value::Object(obj) => obj.get(*segment)?,
            Value::Array(arr) => arr.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parsed(raw: serde_json::Value) -> ParsedLogEntry {
        serde_json::from_value(raw).unwrap()
    }

    fn pino() -> ParsedLogEntry {
        parsed(json!({
            "kind": "pino",
            "entry": {
                "time": 1700000000000i64,
                "level": 50,
                "msg": "db timeout",
                "hostname": "host-3",
                "name": "billing",
                "req": {"method": "POST", "url": "/api/orders", "headers": ["a", "b"]},
                "res": {"statusCode": 500, "responseTimeMs": 120},
                "region": "eu"
            }
        }))
    }

    #[test]
    fn common_fields_use_normalized_values() {
        let e = pino();
        assert_eq!(extract_field_value(&e, "level"), Some("error".into()));
        assert_eq!(extract_field_value(&e, "message"), Some("db timeout".into()));
        assert_eq!(extract_field_value(&e, "kind"), Some("pino".into()));
        assert_eq!(
            extract_field_value(&e, "timestamp"),
            Some(FieldValue::Num(1_700_000_000_000.0))
        );
        assert_eq!(extract_field_value(&e, "statusCode"), Some(FieldValue::Num(500.0)));
    }

    #[test]
    fn table_and_dot_paths() {
        let e = pino();
        assert_eq!(extract_field_value(&e, "service"), Some("billing".into()));
        assert_eq!(extract_field_value(&e, "rawLevel"), Some(FieldValue::Num(50.0)));
        assert_eq!(extract_field_value(&e, "req.method"), Some("POST".into()));
        assert_eq!(extract_field_value(&e, "req.headers.1"), Some("b".into()));
        assert_eq!(extract_field_value(&e, "region"), Some("eu".into()));
    }

    #[test]
    fn missing_and_malformed_fields_are_none() {
        let e = pino();
        assert_eq!(extract_field_value(&e, "req.nope"), None);
        assert_eq!(extract_field_value(&e, "req"), None);
        assert_eq!(extract_field_value(&e, "req..method"), None);
        assert_eq!(extract_field_value(&e, ""), None);
        assert_eq!(extract_field_value(&e, "meta.traceId"), None);
    }

    #[test]
    fn loki_labels_resolve_bare_and_prefixed() {
        let e = parsed(json!({
            "kind": "loki",
            "entry": {"ts": "2024-05-01T10:00:00Z", "labels": {"app": "search", "job": "app-logs"}, "line": "Cache hit"}
        }));
        assert_eq!(extract_field_value(&e, "job"), Some("app-logs".into()));
        assert_eq!(extract_field_value(&e, "labels.app"), Some("search".into()));
        assert_eq!(extract_field_value(&e, "service"), Some("search".into()));
    }

    #[test]
    fn winston_falls_back_to_meta() {
        let e = parsed(json!({
            "kind": "winston",
            "entry": {"timestamp": "garbage", "level": "silly", "message": "hi", "meta": {"userId": 7}}
        }));
        assert_eq!(extract_field_value(&e, "userId"), Some(FieldValue::Num(7.0)));
        assert_eq!(extract_field_value(&e, "meta.userId"), Some(FieldValue::Num(7.0)));
        assert_eq!(extract_field_value(&e, "level"), Some("trace".into()));
        assert_eq!(extract_field_value(&e, "timestamp"), None);
    }

    #[test]
    fn message_timestamp_and_search_text_helpers() {
        let e = pino();
        assert_eq!(extract_message(&e), "db timeout");
        assert_eq!(extract_timestamp(&e), Some(1_700_000_000_000));
        assert!(search_text(&e).starts_with("db timeout pino error unknown"));
        assert!(search_text(&e).contains("billing"));

        let docker = parsed(json!({
            "kind": "docker",
            "entry": {"log": "Disk LOW\n", "stream": "stderr", "time": "not a date"}
        }));
        assert_eq!(extract_message(&docker), "Disk LOW");
        assert_eq!(extract_timestamp(&docker), None);
        assert_eq!(search_text(&docker), "disk low docker error unknown stderr");
    }
}
