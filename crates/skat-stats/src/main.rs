use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing::Level;

use skat_stats::config::{ResolvedOutputs, StatsConfig};
use skat_stats::dataset::write_synthetic;
use skat_stats::logging::{init_console, init_logging};
use skat_stats::pipeline::StatsRunner;

/// Hand-signature statistics over Skat solver feeds.
#[derive(Debug, Parser)]
#[command(
    name = "skat-stats",
    author,
    version,
    about = "Aggregate Skat solver records by hand signature"
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    /// Path to the YAML configuration file.
    #[arg(short, long, value_name = "FILE", default_value = "research/stats.yaml")]
    config: PathBuf,

    /// Override the run identifier (substitutes {run_id} templates).
    #[arg(long, value_name = "RUN_ID")]
    run_id: Option<String>,

    /// Override the JSONL feed to analyze.
    #[arg(long, value_name = "FILE")]
    input: Option<PathBuf>,

    /// Override the significance floor for reported buckets.
    #[arg(long, value_name = "COUNT")]
    min_count: Option<u64>,

    /// Exit after validating the configuration (no analysis is run).
    #[arg(long)]
    validate_only: bool,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Deal seeded random hands into a JSONL feed for smoke runs.
    Synth {
        /// RNG seed for the first deal; later deals use consecutive seeds.
        #[arg(long, default_value_t = 0)]
        seed: u64,

        /// Number of hands to deal.
        #[arg(long, default_value_t = 1_000)]
        hands: usize,

        /// Destination JSONL file.
        #[arg(long, value_name = "FILE")]
        out: PathBuf,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if let Some(Command::Synth { seed, hands, out }) = cli.command {
        init_console(Level::INFO);
        let written = write_synthetic(&out, hands, seed)?;
        println!("Wrote {written} synthetic hands to {}", out.display());
        return Ok(());
    }

    let mut config = StatsConfig::from_path(&cli.config)?;

    if let Some(run_id) = cli.run_id {
        config.run_id = run_id;
    }

    if let Some(input) = cli.input {
        config.dataset.path = input;
    }

    if let Some(min_count) = cli.min_count {
        config.report.min_count = min_count;
    }

    config.validate()?;

    let outputs: ResolvedOutputs = config.resolved_outputs();
    let run_id = config.run_id.clone();

    println!(
        "Loaded configuration '{run_id}': {} analysis of {} (min count {})",
        config.analysis.kind.as_str(),
        config.dataset.path.display(),
        config.report.min_count
    );

    if cli.validate_only {
        println!("Validation-only mode: analysis skipped.");
        return Ok(());
    }

    let logging_guard = init_logging(&config.logging, &outputs, &run_id)?;
    let runner = StatsRunner::new(config, outputs);
    let summary = runner.run()?;

    println!(
        "Analysis complete for '{run_id}': {} records ({} skipped) → {} rows",
        summary.records, summary.skipped, summary.rows
    );
    println!("Summary table: {}", summary.summary_path.display());
    println!("Report JSON: {}", summary.report_path.display());
    if let Some(guard) = logging_guard.as_ref() {
        println!("Telemetry log: {}", guard.telemetry_path.display());
    }

    Ok(())
}
