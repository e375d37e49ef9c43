//! StockPrep CLI: rebuild and inspect commands.
//!
//! Commands:
//! - `rebuild`: clean a raw CSV, compute aggregates, publish Parquet artifacts
//! - `inspect`: read published artifacts back and report their shape
//!
//! Logs go to stderr (`RUST_LOG` overrides the default `info` level); the
//! run summary goes to stdout.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use stockprep_runner::{inspect, rebuild, ArtifactSummary, PipelineConfig, RebuildOptions, RunReport};
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "stockprep",
    about = "StockPrep CLI: stock data cleaning and aggregation pipeline"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Rebuild cleaned and aggregate artifacts from a raw CSV file.
    Rebuild {
        /// Raw input CSV.
        #[arg(long)]
        input: PathBuf,

        /// Directory receiving the artifacts.
        #[arg(long)]
        output_dir: PathBuf,

        /// Path to a TOML pipeline config. Defaults apply when omitted.
        #[arg(long)]
        config: Option<PathBuf>,

        /// Replace existing artifacts. Rebuilds always replace; the flag is recorded.
        #[arg(long, default_value_t = false)]
        overwrite: bool,
    },
    /// Read published artifacts and print their shape.
    Inspect {
        /// Artifact directory.
        #[arg(long, default_value = "output")]
        dir: PathBuf,
    },
}

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    match cli.command {
        Commands::Rebuild {
            input,
            output_dir,
            config,
            overwrite,
        } => run_rebuild(input, output_dir, config, overwrite),
        Commands::Inspect { dir } => run_inspect(dir),
    }
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn run_rebuild(
    input: PathBuf,
    output_dir: PathBuf,
    config_path: Option<PathBuf>,
    overwrite: bool,
) -> Result<()> {
    debug!(config = ?config_path, overwrite, "rebuild requested");
    let config = match config_path {
        Some(path) => PipelineConfig::from_file(&path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => PipelineConfig::default(),
    };

    let report = rebuild(&input, &output_dir, &config, RebuildOptions { overwrite })
        .with_context(|| format!("rebuilding from {}", input.display()))?;

    print_summary(&report);
    Ok(())
}

fn print_summary(report: &RunReport) {
    println!();
    println!("=== Rebuild Summary ===");
    println!("Input:            {}", report.input.display());
    let fingerprint = &report.config_fingerprint;
    println!("Config:           {}", fingerprint.get(..12).unwrap_or(fingerprint));
    println!(
        "Rows read:        {} ({} rejected, {:.2}%)",
        report.ingest.rows_read,
        report.ingest.rows_rejected,
        report.ingest.error_rate * 100.0
    );
    if !report.ingest.ignored_columns.is_empty() {
        println!("Ignored columns:  {}", report.ingest.ignored_columns.join(", "));
    }
    println!(
        "Duplicates:       {} removed ({} exact, {} conflicting)",
        report.dedup.removed(),
        report.dedup.exact_repeats,
        report.dedup.conflicting_repeats
    );
    let filled = &report.resolve.filled;
    println!(
        "Filled:           {} (open {}, high {}, low {}, close {}, volume {}, sector {})",
        filled.total(),
        filled.open,
        filled.high,
        filled.low,
        filled.close,
        filled.volume,
        filled.sector
    );
    println!(
        "Dropped:          {} ({} unfillable price, {} missing volume)",
        report.resolve.dropped(),
        report.resolve.dropped_unfillable_price,
        report.resolve.dropped_missing_volume
    );
    println!("Unknown sector:   {} rows", report.resolve.unknown_sector_rows);
    println!("Bound violations: {} rows flagged", report.resolve.bound_violations);
    println!("Cleaned rows:     {}", report.cleaned_rows);
    println!(
        "Aggregates:       {} daily close, {} sector volume, {} returns",
        report.aggregates.daily_close, report.aggregates.sector_volume, report.aggregates.daily_returns
    );
    println!("Duration:         {} ms", report.duration_ms);

    if !report.excluded_symbols.is_empty() {
        println!();
        println!("Excluded symbols (no usable price data):");
        for excluded in &report.excluded_symbols {
            println!("  {} ({} rows)", excluded.symbol, excluded.dropped_rows);
        }
    }

    if !report.ingest.error_samples.is_empty() {
        println!();
        println!("Rejected rows (first {}):", report.ingest.error_samples.len());
        for sample in &report.ingest.error_samples {
            println!("  line {}: {}", sample.line, sample.kind);
        }
    }

    println!();
    println!("Artifacts saved to: {}", report.output_dir.display());
}

fn run_inspect(dir: PathBuf) -> Result<()> {
    let summary = inspect(&dir).with_context(|| format!("inspecting {}", dir.display()))?;
    print_inspection(&summary);
    Ok(())
}

fn print_inspection(summary: &ArtifactSummary) {
    println!("Artifacts in {}", summary.dir.display());
    println!("  Schema version: {}", summary.manifest.schema_version);
    println!("  Cleaned rows:   {}", summary.cleaned_rows);
    println!("  Symbols:        {}", summary.symbols.len());
    match (summary.first_date, summary.last_date) {
        (Some(first), Some(last)) => println!("  Date range:     {first} to {last}"),
        _ => println!("  Date range:     (empty)"),
    }
    println!("  Daily close:    {} rows", summary.aggregates.daily_close);
    println!("  Sector volume:  {} rows", summary.aggregates.sector_volume);
    println!("  Daily returns:  {} rows", summary.aggregates.daily_returns);
    println!("  Data hash:      {}", summary.manifest.cleaned_hash);
}
