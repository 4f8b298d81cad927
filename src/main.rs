//! TutorBridge Engine CLI
//!
//! Replays a recorded sequence of credit operations through a fresh engine
//! and prints the final balances to stdout.
//!
//! # Usage
//!
//! ```bash
//! cargo run -- ops.csv > balances.csv
//! cargo run -- --config engine.toml ops.csv > balances.csv
//! ```
//!
//! Structured logs go to stderr; control the level with `RUST_LOG`
//! (e.g. `RUST_LOG=tutorbridge_engine=debug`).
//!
//! # Exit Codes
//!
//! - 0: Success (skipped rows are reported in the logs, not the exit code)
//! - 1: Error (file not found, unreadable input, bad configuration)

use std::process;
use std::sync::Arc;
use tutorbridge_engine::cli;
use tutorbridge_engine::config::EngineConfig;
use tutorbridge_engine::engine::CreditEngine;
use tutorbridge_engine::io::OpsReader;
use tutorbridge_engine::notify::LogSink;
use tutorbridge_engine::replay::ReplayRunner;
use tutorbridge_engine::store::{LeadStore, LedgerStore, UserDirectory};
use tutorbridge_engine::types::EngineError;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = cli::parse_args();
    if let Err(e) = run(&args) {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

fn run(args: &cli::CliArgs) -> Result<(), EngineError> {
    let config = match &args.config {
        Some(path) => EngineConfig::load(path)?,
        None => EngineConfig::default(),
    };

    let engine = Arc::new(CreditEngine::new(
        config,
        Arc::new(UserDirectory::new()),
        Arc::new(LedgerStore::new()),
        Arc::new(LeadStore::new()),
        Arc::new(LogSink),
    ));

    let reader = OpsReader::new(&args.input_file)?;
    let mut output = std::io::stdout();
    let summary = ReplayRunner::new(engine).process(reader, &mut output)?;

    tracing::info!(
        applied = summary.applied,
        skipped = summary.skipped,
        "replay complete"
    );
    Ok(())
}
