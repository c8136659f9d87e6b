use logchaos::indexer::FieldIndexer;
use logchaos::{evaluate_query, parse_query, EvaluationContext, LogConfig, ParsedLogEntry};
use proptest::prelude::*;
use serde_json::json;
use std::collections::BTreeSet;

/// Message vocabulary. Some words carry punctuation or contain other words, so a needle
/// can sit inside a longer keyword; none is a stopword.
const WORDS: &[&str] = &[
    "alpha", "bravo", "charlie", "delta", "echo", "foxtrot", "golf", "hotel", "alpha,", "delta.",
    "alphabet", "echoes", "(bravo)", "x1",
];

const ATOMS: &[&str] = &[
    "level=error",
    "level=info",
    "level!=warn",
    "env=prod",
    "environment=staging",
    r#"contains(message, "alpha")"#,
    r#"contains(message, "delta")"#,
    r#"contains(message, "bravo")"#,
    r#"contains(message, "hotel")"#,
    r#"startsWith(message, "echo")"#,
    r#"timestamp > "1970-01-01T00:00:00.500Z""#,
    r#"timestamp <= "1970-01-01T00:00:00.250Z""#,
    "pid>=3",
    "kind=text",
];

fn pino_entry() -> impl Strategy<Value = ParsedLogEntry> {
    (
        prop::sample::select(vec![10u64, 20, 30, 40, 50, 60]),
        0i64..1000,
        prop::sample::select(vec!["prod", "production", "staging", "dev"]),
        0u64..6,
        prop::collection::vec(prop::sample::select(WORDS.to_vec()), 0..14),
    )
        .prop_map(|(level, time, env, pid, words)| {
            serde_json::from_value(json!({
                "kind": "pino",
                "entry": {"time": time, "level": level, "pid": pid, "env": env, "msg": words.join(" ")}
            }))
            .unwrap()
        })
}

fn text_entry() -> impl Strategy<Value = ParsedLogEntry> {
    (
        prop::sample::select(vec!["ERROR", "INFO", "WARN", "hmm"]),
        prop::collection::vec(prop::sample::select(WORDS.to_vec()), 0..14),
    )
        .prop_map(|(level, words)| {
            serde_json::from_value(json!({
                "kind": "text",
                "entry": {"line": format!("{level} {}", words.join(" "))}
            }))
            .unwrap()
        })
}

fn entries() -> impl Strategy<Value = Vec<ParsedLogEntry>> {
    prop::collection::vec(prop_oneof![3 => pino_entry(), 1 => text_entry()], 0..40)
}

fn atom() -> impl Strategy<Value = &'static str> {
    prop::sample::select(ATOMS.to_vec())
}

fn run(query: &str, entries: &[ParsedLogEntry], indexer: Option<&FieldIndexer>) -> BTreeSet<usize> {
    let outcome = parse_query(query);
    assert!(outcome.errors.is_empty(), "{query}: {:?}", outcome.errors);
    let ast = outcome.ast.expect("structured query");
    let mut context = EvaluationContext::new(entries);
    if let Some(indexer) = indexer {
        context = context.with_indexer(indexer);
    }
    let matched = evaluate_query(&ast, &context).matched_indices;
    let set: BTreeSet<usize> = matched.iter().copied().collect();
    assert_eq!(set.len(), matched.len(), "{query}: duplicate indices");
    set
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn and_is_intersection(entries in entries(), p in atom(), q in atom()) {
        let both = run(&format!("({p}) AND ({q})"), &entries, None);
        let expected: BTreeSet<usize> = run(p, &entries, None)
            .intersection(&run(q, &entries, None))
            .copied()
            .collect();
        prop_assert_eq!(both, expected);
    }

    #[test]
    fn or_is_union(entries in entries(), p in atom(), q in atom()) {
        let either = run(&format!("({p}) OR ({q})"), &entries, None);
        let expected: BTreeSet<usize> = run(p, &entries, None)
            .union(&run(q, &entries, None))
            .copied()
            .collect();
        prop_assert_eq!(either, expected);
    }

    #[test]
    fn not_is_complement(entries in entries(), p in atom()) {
        let negated = run(&format!("NOT ({p})"), &entries, None);
        let positive = run(p, &entries, None);
        let expected: BTreeSet<usize> = (0..entries.len()).filter(|i| !positive.contains(i)).collect();
        prop_assert_eq!(negated, expected);
    }

    #[test]
    fn index_and_scan_agree(entries in entries(), p in atom(), q in atom(), conjunction in any::<bool>()) {
        let mut indexer = FieldIndexer::new();
        indexer.build_indexes(&entries);
        let op = if conjunction { "AND" } else { "OR" };
        for query in [p.to_string(), format!("{p} {op} NOT {q}")] {
            prop_assert_eq!(
                run(&query, &entries, Some(&indexer)),
                run(&query, &entries, None),
                "query {}", query
            );
        }
    }

    #[test]
    fn index_and_scan_agree_under_any_keyword_cap(entries in entries(), limit in 0usize..5, p in atom()) {
        let config = LogConfig { keyword_limit: limit, ..LogConfig::default() };
        let mut indexer = FieldIndexer::with_config(&config);
        indexer.build_indexes(&entries);
        prop_assert_eq!(run(p, &entries, Some(&indexer)), run(p, &entries, None), "query {}", p);
    }

    #[test]
    fn incremental_indexing_matches_rebuild(entries in entries(), split in 0usize..40, p in atom()) {
        let split = split.min(entries.len());
        let mut rebuilt = FieldIndexer::new();
        rebuilt.build_indexes(&entries);
        let mut incremental = FieldIndexer::new();
        incremental.add_batch(&entries[..split], 0);
        for (offset, entry) in entries[split..].iter().enumerate() {
            incremental.add_entry(entry, split + offset);
        }
        prop_assert_eq!(run(p, &entries, Some(&incremental)), run(p, &entries, Some(&rebuilt)));
        prop_assert_eq!(
            incremental.query_timestamp_range(None, None),
            rebuilt.query_timestamp_range(None, None)
        );
    }

    #[test]
    fn parsing_is_idempotent(p in atom(), q in atom(), negate in any::<bool>()) {
        let query = if negate { format!("NOT {p} OR ({q})") } else { format!("{p} AND {q}") };
        let first = parse_query(&query);
        let second = parse_query(&query);
        prop_assert!(first.ast.is_some());
        prop_assert_eq!(first, second);
    }
}
