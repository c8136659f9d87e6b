use logchaos::indexer::FieldIndexer;
use logchaos::search::{search_entries, tokenize_query};
use logchaos::{evaluate_query, parse_query, EvaluationContext, LogConfig, LogStore, ParsedLogEntry, QueryResponse};
use serde_json::json;

fn pino(time: i64, level: u64, msg: &str) -> ParsedLogEntry {
    serde_json::from_value(json!({
        "kind": "pino",
        "entry": {"time": time, "level": level, "pid": 1, "hostname": "api-1", "name": "orders", "msg": msg}
    }))
    .unwrap()
}

fn two_entries() -> Vec<ParsedLogEntry> {
    vec![pino(1_000, 50, "db timeout"), pino(2_000, 30, "ok")]
}

fn matched(query: &str, entries: &[ParsedLogEntry], indexer: Option<&FieldIndexer>) -> Vec<usize> {
    let outcome = parse_query(query);
    assert!(outcome.errors.is_empty());
    assert!(!outcome.is_legacy_text_search);
    let ast = outcome.ast.unwrap();
    let context = match indexer {
        Some(indexer) => EvaluationContext::new(entries).with_indexer(indexer),
        None => EvaluationContext::new(entries),
    };
    let mut hits = evaluate_query(&ast, &context).matched_indices;
    hits.sort_unstable();
    hits
}

#[test]
fn level_equality_matches_error_entry() {
    let entries = two_entries();
    assert_eq!(matched("level=error", &entries, None), vec![0]);
}

#[test]
fn contains_matches_regardless_of_indexer() {
    let entries = two_entries();
    let mut indexer = FieldIndexer::new();
    indexer.build_indexes(&entries);
    let query = r#"contains(message, "timeout")"#;
    assert_eq!(matched(query, &entries, None), vec![0]);
    assert_eq!(matched(query, &entries, Some(&indexer)), vec![0]);
}

#[test]
fn malformed_operator_is_a_syntax_error() {
    let outcome = parse_query("level===error");
    assert!(!outcome.is_legacy_text_search);
    assert!(!outcome.errors.is_empty());
    assert!(outcome.ast.is_none());
}

#[test]
fn typo_is_found_by_fuzzy_search() {
    let entries = vec![
        pino(1, 30, "cache warmed"),
        pino(2, 40, "databse conection eror"),
        pino(3, 30, "user login"),
    ];
    let outcome = parse_query("database error");
    assert!(outcome.is_legacy_text_search);

    let hits = search_entries(&entries, "database error", &LogConfig::default());
    let hit = hits.iter().find(|h| h.index == 1).expect("typo entry should match");
    assert!(hit.score > 0);
    assert!(hits.iter().all(|h| h.index == 1));
}

#[test]
fn timestamp_range_with_open_upper_bound() {
    let entries = vec![pino(100, 30, "a"), pino(200, 30, "b"), pino(300, 30, "c")];
    let mut indexer = FieldIndexer::new();
    indexer.build_indexes(&entries);
    assert_eq!(indexer.query_timestamp_range(Some(150), None), vec![1, 2]);
}

#[test]
fn empty_query_returns_everything() {
    let outcome = parse_query("");
    assert!(outcome.is_legacy_text_search);
    assert!(outcome.ast.is_none());
    assert!(outcome.errors.is_empty());

    let tokens = tokenize_query("");
    assert!(tokens.tokens.is_empty());
    assert!(tokens.phrases.is_empty());

    let mut store = LogStore::new();
    store.push_batch(two_entries());
    match store.run_query("") {
        QueryResponse::Legacy { hits, .. } => {
            assert_eq!(hits.iter().map(|h| h.index).collect::<Vec<_>>(), vec![0, 1]);
        }
        other => panic!("unexpected response {other:?}"),
    }
}

#[test]
fn mixed_formats_end_to_end() {
    let lines = [
        r#"{"time":1714557600000,"level":50,"pid":4,"hostname":"api-2","name":"checkout","msg":"Payment failed","req":{"id":"r-9","method":"POST","url":"/api/pay","remoteAddress":"10.0.0.9"},"res":{"statusCode":502,"responseTimeMs":1330},"meta":{"traceId":"t-1","spanId":"s-1"}}"#,
        r#"{"timestamp":"2024-05-01T10:00:01.000Z","level":"http","message":"GET /health 200","meta":{"requestId":"q-1","userId":42}}"#,
        r#"{"ts":"2024-05-01T10:00:02Z","labels":{"job":"app-logs","instance":"node-1","app":"search","environment":"staging"},"line":"Cache miss for key user:42"}"#,
        r#"{"ts":"2024-05-01T10:00:03Z","level":"warning","message":"Disk usage at 91%"}"#,
        r#"{"log":"level=warn retrying upstream\n","stream":"stdout","time":"2024-05-01T10:00:04.123456789Z"}"#,
        "ERROR 2024-05-01T10:00:05Z billing: Payment failed env=prod",
        r#"{"event":"deploy","version":"1.2.3","env":"prod"}"#,
    ]
    .join("\n");

    let mut store = LogStore::new();
    assert_eq!(store.ingest_from_reader(lines.as_bytes()).unwrap(), 7);

    let sorted = |query: &str| {
        let mut hits = store.run_query(query).indices();
        hits.sort_unstable();
        hits
    };

    assert_eq!(sorted("level=warn"), vec![3, 4]);
    assert_eq!(sorted("env=prod"), vec![5, 6]);
    assert_eq!(sorted("environment=staging AND service=search"), vec![2]);
    assert_eq!(sorted(r#"contains(message, "payment")"#), vec![0, 5]);
    assert_eq!(sorted("statusCode>=500 AND req.method=post"), vec![0]);
    assert_eq!(sorted("meta.userId=42"), vec![1]);
    assert_eq!(sorted(r#"timestamp >= "2024-05-01T10:00:04Z""#), vec![4, 5]);
    assert_eq!(sorted("version=1.2.3"), vec![6]);
    assert_eq!(sorted("kind=unknown-json OR kind=docker"), vec![4, 6]);
    assert_eq!(sorted(r#"matches(url, /^\/api\//)"#), vec![0]);
    assert_eq!(sorted(r#""payment failed""#), vec![0, 5]);
}
