//! CLI for extracting a referentially-consistent subset of a relational
//! database.
//!
//! This crate provides:
//! - Argument parsing (`Cli`)
//! - Model loading from TOML (`model`)
//! - Database adapter selection by URL scheme (`db`)
//! - Newline-delimited-JSON flat-results output (`output`)

#![forbid(unsafe_code)]

pub mod db;
pub mod error;
pub mod model;
pub mod output;

use std::path::PathBuf;

use clap::Parser;
use subsetter_core::{Engine, SchemaSource};

pub use error::{CliError, CliResult};

/// Extract a referentially-consistent subset of a relational database.
#[derive(Debug, Parser)]
#[command(name = "subset", version, about)]
pub struct Cli {
    /// Path to the TOML extraction model describing subjects and relations.
    #[arg(long)]
    pub model: PathBuf,

    /// Source database connection URL (`sqlite://path` or `postgres://...`).
    #[arg(long)]
    pub database_url: String,

    /// Print each work item's provenance trace instead of only the final
    /// result set.
    #[arg(long)]
    pub explain: bool,

    /// 0 = silent, 1 = summary counters, 2 = per-pass trace.
    #[arg(long, default_value_t = 0)]
    pub verbosity: u8,

    /// Where to write the newline-delimited-JSON result set. `-` (the
    /// default) writes to stdout.
    #[arg(long, default_value = "-")]
    pub output: PathBuf,
}

/// Parse arguments, run the extraction, and print results as newline-delimited
/// JSON to stdout. Returns the process exit code.
pub fn run() -> i32 {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let cli = Cli::parse();
    match run_with(&cli) {
        Ok(()) => 0,
        Err(err) => {
            tracing::error!(error = %err, "extraction failed");
            eprintln!("error: {err}");
            1
        }
    }
}

fn run_with(cli: &Cli) -> CliResult<()> {
    let extraction_model = model::load_model(&cli.model)?;
    let mut database = db::connect(&cli.database_url)?;
    let schema = database.load_schema()?;

    let mut engine = Engine::new(&mut database, schema, extraction_model);
    engine.explain = cli.explain;
    engine.verbosity = cli.verbosity;
    engine.run()?;

    if cli.explain {
        for line in engine.explain_trace() {
            println!("{line}");
        }
    }

    let results = engine.flat_results();
    if cli.output == std::path::Path::new("-") {
        output::write_flat_results(std::io::stdout(), &results)?;
    } else {
        let file = std::fs::File::create(&cli.output)?;
        output::write_flat_results(file, &results)?;
    }

    if cli.verbosity >= 1 {
        tracing::info!(
            fetch_count = engine.fetch_count,
            fetched_row_count = engine.fetched_row_count,
            max_depth = engine.max_depth,
            "extraction complete"
        );
    }

    Ok(())
}
