//! Per-kind normalization rules.
//!
//! The field extractor and the field indexer both derive level, environment, timestamp and
//! message through these functions, so an index lookup and a full scan always agree on
//! what an entry's `level` is.

use crate::types::{Environment, HttpInfo, Level, LogEntry, NormalizedEntry};
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde_json::{Map, Value};
use std::borrow::Cow;

const TIMESTAMP_KEYS: &[&str] = &["timestamp", "time", "ts", "@timestamp"];
const MESSAGE_KEYS: &[&str] = &["message", "msg", "line", "log"];
const LEVEL_KEYS: &[&str] = &["level", "severity", "lvl"];
const ENVIRONMENT_KEYS: &[&str] = &["environment", "env"];

/// Builds the full normalized projection for an entry.
pub fn normalize(entry: &LogEntry) -> NormalizedEntry {
    let level = level_of(entry);
    let environment = environment_of(entry);
    let message = message_of(entry).into_owned();
    let timestamp = timestamp_of(entry);
    let (http, meta) = match entry {
        LogEntry::Pino(p) => (http_of(p.req.as_ref(), p.res.as_ref()), p.meta.clone()),
        LogEntry::Winston(w) => (None, w.meta.clone()),
        _ => (None, None),
    };

    let mut search_text = String::with_capacity(message.len() + 48);
    // Message first: the search prefix bonus applies to message words.
    for part in [
        message.as_str(),
        entry.kind().as_str(),
        level.as_str(),
        environment.as_str(),
    ] {
        search_text.push_str(part);
        search_text.push(' ');
    }
    for extra in descriptors(entry) {
        search_text.push_str(&extra);
        search_text.push(' ');
    }
    let search_text = search_text.trim_end().to_lowercase();

    NormalizedEntry {
        kind: entry.kind(),
        level,
        environment,
        message,
        timestamp,
        http,
        meta,
        search_text,
    }
}

pub fn level_of(entry: &LogEntry) -> Level {
    match entry {
        LogEntry::Pino(p) => Level::from_pino(p.level),
        LogEntry::Winston(w) => Level::from_alias(&w.level).unwrap_or(Level::Unknown),
        LogEntry::Promtail(p) => Level::from_alias(&p.level).unwrap_or(Level::Unknown),
        LogEntry::Loki(l) => first_str(&l.labels, LEVEL_KEYS)
            .and_then(Level::from_alias)
            .unwrap_or(Level::Unknown),
        LogEntry::Docker(d) => embedded_value(&d.log, "level")
            .and_then(Level::from_alias)
            .unwrap_or(match d.stream.as_str() {
                "stderr" => Level::Error,
                "stdout" => Level::Info,
                _ => Level::Unknown,
            }),
        LogEntry::UnknownJson(v) => v
            .as_object()
            .and_then(|obj| LEVEL_KEYS.iter().find_map(|k| obj.get(*k)))
            .map(|raw| match raw {
                Value::Number(n) => n.as_u64().map(Level::from_pino).unwrap_or(Level::Unknown),
                Value::String(s) => Level::from_alias(s).unwrap_or(Level::Unknown),
                _ => Level::Unknown,
            })
            .unwrap_or(Level::Unknown),
        LogEntry::Text(t) => t
            .line
            .split_whitespace()
            .next()
            .map(|tok| tok.trim_matches(|c: char| matches!(c, '[' | ']' | ':')).to_uppercase())
            .and_then(|tok| Level::from_alias(&tok))
            .unwrap_or(Level::Unknown),
    }
}

pub fn environment_of(entry: &LogEntry) -> Environment {
    let raw = match entry {
        LogEntry::Pino(p) => {
            first_str(&p.extra, ENVIRONMENT_KEYS).or_else(|| nested_env(p.meta.as_ref()))
        }
        LogEntry::Winston(w) => {
            first_str(&w.extra, ENVIRONMENT_KEYS).or_else(|| nested_env(w.meta.as_ref()))
        }
        LogEntry::Loki(l) => first_str(&l.labels, ENVIRONMENT_KEYS),
        LogEntry::Promtail(p) => first_str(&p.extra, ENVIRONMENT_KEYS),
        LogEntry::Docker(d) => embedded_env(&d.log),
        LogEntry::UnknownJson(v) => v
            .as_object()
            .and_then(|obj| first_str(obj, ENVIRONMENT_KEYS)),
        LogEntry::Text(t) => embedded_env(&t.line),
    };
    raw.and_then(Environment::from_alias)
        .unwrap_or(Environment::Unknown)
}

/// Epoch milliseconds, or `None` when the record's timestamp is missing or unparseable.
pub fn timestamp_of(entry: &LogEntry) -> Option<i64> {
    match entry {
        LogEntry::Pino(p) => Some(p.time),
        LogEntry::Winston(w) => parse_timestamp(&w.timestamp),
        LogEntry::Loki(l) => parse_timestamp(&l.ts),
        LogEntry::Promtail(p) => parse_timestamp(&p.ts),
        LogEntry::Docker(d) => parse_timestamp(&d.time),
        LogEntry::UnknownJson(v) => {
            let obj = v.as_object()?;
            TIMESTAMP_KEYS
                .iter()
                .find_map(|k| obj.get(*k))
                .and_then(|raw| match raw {
                    Value::Number(n) => n.as_i64(),
                    Value::String(s) => parse_timestamp(s),
                    _ => None,
                })
        }
        LogEntry::Text(t) => t
            .line
            .split_whitespace()
            .take(3)
            .find_map(|tok| parse_timestamp(tok.trim_matches(|c: char| matches!(c, '[' | ']')))),
    }
}

pub fn message_of(entry: &LogEntry) -> Cow<'_, str> {
    match entry {
        LogEntry::Pino(p) => Cow::Borrowed(p.msg.as_str()),
        LogEntry::Winston(w) => Cow::Borrowed(w.message.as_str()),
        LogEntry::Loki(l) => Cow::Borrowed(l.line.as_str()),
        LogEntry::Promtail(p) => Cow::Borrowed(p.message.as_str()),
        LogEntry::Docker(d) => Cow::Borrowed(d.log.trim_end_matches(|c| c == '\n' || c == '\r')),
        LogEntry::UnknownJson(v) => match v
            .as_object()
            .and_then(|obj| MESSAGE_KEYS.iter().find_map(|k| obj.get(*k)))
            .and_then(Value::as_str)
        {
            Some(s) => Cow::Borrowed(s),
            None => Cow::Owned(v.to_string()),
        },
        LogEntry::Text(t) => Cow::Borrowed(t.line.as_str()),
    }
}

/// Parses the date formats found in log records into epoch milliseconds.
///
/// Accepts RFC 3339 (with or without fractional seconds and offset), naive
/// `YYYY-MM-DD[T ]HH:MM:SS[.fff]` taken as UTC, and bare `YYYY-MM-DD` (midnight UTC).
pub fn parse_timestamp(raw: &str) -> Option<i64> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.timestamp_millis());
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, fmt) {
            return Some(naive.and_utc().timestamp_millis());
        }
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc().timestamp_millis())
}

/// Finds a `key=value` token inside free text, e.g. `level=warn`.
pub fn embedded_value<'a>(text: &'a str, key: &str) -> Option<&'a str> {
    text.split_whitespace().find_map(|tok| {
        let (k, v) = tok.split_once('=')?;
        (k.eq_ignore_ascii_case(key) && !v.is_empty())
            .then(|| v.trim_matches(|c: char| matches!(c, '"' | '\'' | ',' | ';')))
    })
}

fn embedded_env(text: &str) -> Option<&str> {
    ENVIRONMENT_KEYS
        .iter()
        .find_map(|key| embedded_value(text, key))
}

fn first_str<'a>(map: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a str> {
    keys.iter()
        .find_map(|k| map.get(*k))
        .and_then(Value::as_str)
}

fn nested_env(meta: Option<&Value>) -> Option<&str> {
    meta.and_then(Value::as_object)
        .and_then(|obj| first_str(obj, ENVIRONMENT_KEYS))
}

fn http_of(req: Option<&Value>, res: Option<&Value>) -> Option<HttpInfo> {
    if req.is_none() && res.is_none() {
        return None;
    }
    let get = |v: Option<&Value>, key: &str| v.and_then(|v| v.get(key)).cloned();
    Some(HttpInfo {
        method: get(req, "method").and_then(|v| v.as_str().map(str::to_string)),
        url: get(req, "url").and_then(|v| v.as_str().map(str::to_string)),
        status_code: get(res, "statusCode").and_then(|v| v.as_u64()),
        response_time_ms: get(res, "responseTimeMs").and_then(|v| v.as_f64()),
    })
}

/// Extra per-kind strings folded into the search text.
fn descriptors(entry: &LogEntry) -> Vec<String> {
    let mut out = Vec::new();
    match entry {
        LogEntry::Pino(p) => {
            out.extend(p.hostname.iter().cloned());
            out.extend(p.name.iter().cloned());
            if let Some(http) = http_of(p.req.as_ref(), p.res.as_ref()) {
                out.extend(http.method);
                out.extend(http.url);
                out.extend(http.status_code.map(|c| c.to_string()));
            }
        }
        LogEntry::Loki(l) => {
            out.extend(l.labels.values().filter_map(|v| v.as_str().map(str::to_string)));
        }
        LogEntry::Docker(d) => out.push(d.stream.clone()),
        LogEntry::Winston(_)
        | LogEntry::Promtail(_)
        | LogEntry::UnknownJson(_)
        | LogEntry::Text(_) => {}
    }
    out
}
