// src/main.rs

use anyhow::{Context, Result};
use clap::Parser;
use logchaos::parser::validate_query;
use logchaos::{LogConfig, LogStore, ParsedLogEntry, QueryResponse};
use std::fs::File;
use std::io::{self, BufReader};
use std::path::PathBuf;
use std::time::Instant;
use tracing_subscriber::EnvFilter;

/// Query mixed-format log files with a structured query language or free text.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// The file(s) to load. If not provided, reads from stdin.
    #[arg(name = "FILE")]
    files: Vec<PathBuf>,

    /// The query to run in non-interactive mode.
    #[arg(short, long)]
    query: Option<String>,

    /// JSON file overriding the index and search settings.
    #[arg(long)]
    config: Option<PathBuf>,

    /// How many matching entries to print per query.
    #[arg(short, long, default_value_t = 20)]
    limit: usize,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .init();

    let args = Args::parse();
    let config = match &args.config {
        Some(path) => LogConfig::from_file(path)
            .with_context(|| format!("failed to load config from {}", path.display()))?,
        None => LogConfig::default(),
    };
    let mut store = LogStore::with_config(config);

    let start = Instant::now();
    let mut total_lines = 0;

    if args.files.is_empty() {
        println!("Loading from stdin...");
        let stdin = io::stdin();
        total_lines += store.ingest_from_reader(stdin.lock())?;
    } else {
        for path in &args.files {
            println!("Loading from {}...", path.display());
            let file = File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
            total_lines += store.ingest_from_reader(BufReader::new(file))?;
        }
    }

    println!("Loaded {} entries in {:.2?}\n", total_lines, start.elapsed());

    if let Some(query) = args.query {
        run_query(&store, &query, args.limit);
    } else {
        run_interactive_session(&store, args.limit)?;
    }

    Ok(())
}

/// Runs a single query and prints the results.
fn run_query(store: &LogStore, query: &str, limit: usize) {
    let start = Instant::now();
    let response = store.run_query(query);
    let duration = start.elapsed();

    println!("Query: {}", query);
    match &response {
        QueryResponse::Structured { ast, result } => {
            println!("Structured: {}", ast);
            println!(
                "Found {} results in {:.2?} (indexes used: {})",
                result.matched_indices.len(),
                duration,
                result.used_indexes
            );
        }
        QueryResponse::Legacy { hits, .. } => {
            println!("Free-text search: found {} results in {:.2?}", hits.len(), duration);
        }
        QueryResponse::Invalid { errors } => {
            for error in errors {
                println!("error: {}", error);
            }
            return;
        }
    }

    let indices = response.indices();
    for (i, entry) in store.entries_for(&indices).into_iter().take(limit).enumerate() {
        println!("{}: {}", i + 1, render(entry));
    }
    if indices.len() > limit {
        println!("... {} more", indices.len() - limit);
    }
}

fn render(entry: &ParsedLogEntry) -> String {
    let n = entry.normalized();
    let ts = n
        .timestamp
        .and_then(chrono::DateTime::<chrono::Utc>::from_timestamp_millis)
        .map(|dt| dt.to_rfc3339_opts(chrono::SecondsFormat::Millis, true))
        .unwrap_or_else(|| "-".to_string());
    format!("[{}] {} {} {}: {}", n.level, ts, n.kind, n.environment, n.message)
}

/// Starts an interactive REPL session.
fn run_interactive_session(store: &LogStore, limit: usize) -> Result<()> {
    let mut rl = rustyline::Editor::<()>::new()?;
    println!("Welcome to logchaos. Type a query, \":stats\", \":check <query>\" or \"quit\" to exit.");

    loop {
        let readline = rl.readline("> ");
        match readline {
            Ok(line) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                rl.add_history_entry(line);

                if line == "quit" || line == "q" {
                    break;
                }
                if line == ":stats" {
                    println!("{}", store.stats());
                    continue;
                }
                if let Some(query) = line.strip_prefix(":check") {
                    let validation = validate_query(query.trim());
                    if validation.valid {
                        println!("ok");
                    }
                    for error in validation.errors {
                        println!("error: {}", error);
                    }
                    continue;
                }

                run_query(store, line, limit);
                println!(); // Add a newline for spacing
            }
            Err(_) => break, // Ctrl-C or Ctrl-D
        }
    }
    Ok(())
}
