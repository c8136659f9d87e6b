//! Core types shared by the query core.
//!
//! A [`ParsedLogEntry`] wraps one of seven per-format records ([`LogEntry`]) and lazily
//! caches its [`NormalizedEntry`] projection. Entries are addressed by their position in
//! the entry store ([`EntryIndex`]) everywhere else in the crate.

use crate::normalize;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};
use std::fmt;
use std::sync::OnceLock;

/// Position of an entry in the entry store.
pub type EntryIndex = usize;

/// Discriminator of the tagged log entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LogKind {
    Pino,
    Winston,
    Loki,
    Promtail,
    Docker,
    UnknownJson,
    Text,
}

impl LogKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogKind::Pino => "pino",
            LogKind::Winston => "winston",
            LogKind::Loki => "loki",
            LogKind::Promtail => "promtail",
            LogKind::Docker => "docker",
            LogKind::UnknownJson => "unknown-json",
            LogKind::Text => "text",
        }
    }
}

impl fmt::Display for LogKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Normalized severity, shared by every format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
    Fatal,
    Unknown,
}

impl Level {
    pub fn as_str(&self) -> &'static str {
        match self {
            Level::Trace => "trace",
            Level::Debug => "debug",
            Level::Info => "info",
            Level::Warn => "warn",
            Level::Error => "error",
            Level::Fatal => "fatal",
            Level::Unknown => "unknown",
        }
    }

    /// Maps a native level name onto a normalized level.
    ///
    /// Returns `None` for names that are not a recognised alias, so callers can tell
    /// "explicitly unknown" apart from "not a level at all".
    pub fn from_alias(raw: &str) -> Option<Level> {
        let level = match raw.trim().to_ascii_lowercase().as_str() {
            "trace" | "silly" => Level::Trace,
            "debug" | "verbose" => Level::Debug,
            "info" | "http" | "notice" => Level::Info,
            "warn" | "warning" => Level::Warn,
            "error" | "err" => Level::Error,
            "fatal" | "critical" | "crit" | "panic" => Level::Fatal,
            "unknown" => Level::Unknown,
            _ => return None,
        };
        Some(level)
    }

    /// Pino numeric level codes.
    pub fn from_pino(code: u64) -> Level {
        match code {
            10 => Level::Trace,
            20 => Level::Debug,
            30 => Level::Info,
            40 => Level::Warn,
            50 => Level::Error,
            60 => Level::Fatal,
            _ => Level::Unknown,
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Normalized deployment environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Dev,
    Staging,
    Prod,
    Unknown,
}

impl Environment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Dev => "dev",
            Environment::Staging => "staging",
            Environment::Prod => "prod",
            Environment::Unknown => "unknown",
        }
    }

    pub fn from_alias(raw: &str) -> Option<Environment> {
        let env = match raw.trim().to_ascii_lowercase().as_str() {
            "dev" | "development" | "local" => Environment::Dev,
            "staging" | "stage" => Environment::Staging,
            "prod" | "production" => Environment::Prod,
            "unknown" => Environment::Unknown,
            _ => return None,
        };
        Some(env)
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A pino record: epoch-millisecond `time`, numeric `level`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PinoEntry {
    pub time: i64,
    pub level: u64,
    pub msg: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pid: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub req: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub res: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WinstonEntry {
    pub timestamp: String,
    pub level: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LokiEntry {
    pub ts: String,
    pub labels: Map<String, Value>,
    pub line: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromtailEntry {
    pub ts: String,
    pub level: String,
    pub message: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A docker json-file driver record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DockerEntry {
    pub log: String,
    pub stream: String,
    pub time: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextEntry {
    pub line: String,
}

/// The format-specific payload, tagged the way the ingestion pipeline emits it:
/// `{"kind": "pino", "entry": {...}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "entry", rename_all = "kebab-case")]
pub enum LogEntry {
    Pino(PinoEntry),
    Winston(WinstonEntry),
    Loki(LokiEntry),
    Promtail(PromtailEntry),
    Docker(DockerEntry),
    UnknownJson(Value),
    Text(TextEntry),
}

impl LogEntry {
    pub fn kind(&self) -> LogKind {
        match self {
            LogEntry::Pino(_) => LogKind::Pino,
            LogEntry::Winston(_) => LogKind::Winston,
            LogEntry::Loki(_) => LogKind::Loki,
            LogEntry::Promtail(_) => LogKind::Promtail,
            LogEntry::Docker(_) => LogKind::Docker,
            LogEntry::UnknownJson(_) => LogKind::UnknownJson,
            LogEntry::Text(_) => LogKind::Text,
        }
    }
}

/// HTTP request/response details lifted out of a record, when it carries any.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct HttpInfo {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_time_ms: Option<f64>,
}

/// Format-independent projection of an entry, computed once and then frozen.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NormalizedEntry {
    pub kind: LogKind,
    pub level: Level,
    pub environment: Environment,
    pub message: String,
    /// Epoch milliseconds.
    pub timestamp: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub http: Option<HttpInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta: Option<Value>,
    /// Lowercased blob the free-text matcher searches.
    #[serde(skip)]
    pub search_text: String,
}

/// One log record as stored by the query core.
///
/// The payload is immutable; the normalized projection is filled on first use and never
/// changes afterwards, so an entry can be shared freely between threads.
#[derive(Debug, Clone)]
pub struct ParsedLogEntry {
    entry: LogEntry,
    normalized: OnceLock<NormalizedEntry>,
}

impl ParsedLogEntry {
    pub fn new(entry: LogEntry) -> Self {
        Self {
            entry,
            normalized: OnceLock::new(),
        }
    }

    #[inline]
    pub fn kind(&self) -> LogKind {
        self.entry.kind()
    }

    #[inline]
    pub fn entry(&self) -> &LogEntry {
        &self.entry
    }

    /// Returns the cached normalized projection, computing it on first access.
    pub fn normalized(&self) -> &NormalizedEntry {
        self.normalized
            .get_or_init(|| normalize::normalize(&self.entry))
    }
}

impl From<LogEntry> for ParsedLogEntry {
    fn from(entry: LogEntry) -> Self {
        Self::new(entry)
    }
}

impl PartialEq for ParsedLogEntry {
    fn eq(&self, other: &Self) -> bool {
        self.entry == other.entry
    }
}

impl Serialize for ParsedLogEntry {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.entry.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for ParsedLogEntry {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        LogEntry::deserialize(deserializer).map(Self::new)
    }
}

/// Scalar a field resolves to.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Str(String),
    Num(f64),
    Bool(bool),
}

impl FieldValue {
    /// Converts a JSON scalar. Containers and `null` have no scalar value.
    pub fn from_json(value: &Value) -> Option<FieldValue> {
        match value {
            Value::String(s) => Some(FieldValue::Str(s.clone())),
            Value::Number(n) => n.as_f64().map(FieldValue::Num),
            Value::Bool(b) => Some(FieldValue::Bool(*b)),
            Value::Null | Value::Array(_) | Value::Object(_) => None,
        }
    }
}

impl From<&str> for FieldValue {
    fn from(s: &str) -> Self {
        FieldValue::Str(s.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(s: String) -> Self {
        FieldValue::Str(s)
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Str(s) => f.write_str(s),
            // Integral numbers render without a trailing ".0" so "200" == 200 as strings.
            FieldValue::Num(n) if n.fract() == 0.0 && n.abs() < 1e15 => write!(f, "{}", *n as i64),
            FieldValue::Num(n) => write!(f, "{n}"),
            FieldValue::Bool(b) => write!(f, "{b}"),
        }
    }
}
