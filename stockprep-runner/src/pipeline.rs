//! Rebuild orchestration: ingest → dedupe → resolve → aggregate → publish.
//!
//! Every rebuild recomputes everything from the input file and fully replaces
//! the artifacts in the output directory. A run that fails before publishing
//! leaves earlier artifacts untouched.

use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Instant;
use stockprep_core::aggregate::aggregate;
use stockprep_core::clean::{clean, DatasetError};
use stockprep_core::data::{ArtifactStore, IngestError, Ingestor, Manifest, StoreError};
use thiserror::Error;
use tracing::{info, warn};

use crate::config::{ConfigError, PipelineConfig};
use crate::report::{save_report, AggregateCounts, IngestSummary, RunReport, REPORT_SCHEMA_VERSION};

/// Errors that abort a run.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
    #[error("ingest error: {0}")]
    Ingest(#[from] IngestError),
    #[error("dataset error: {0}")]
    Dataset(#[from] DatasetError),
    #[error("store error: {0}")]
    Store(#[from] StoreError),
    #[error("report error: {0}")]
    Report(String),
    #[error("cleaned artifact hash {actual} does not match manifest hash {expected}")]
    HashMismatch { expected: String, actual: String },
}

/// Options for a single rebuild.
#[derive(Debug, Clone, Copy, Default)]
pub struct RebuildOptions {
    /// Accepted for interface compatibility. Rebuilds always overwrite.
    pub overwrite: bool,
}

/// Run the full pipeline and publish artifacts into `output_dir`.
pub fn rebuild(
    input: &Path,
    output_dir: &Path,
    config: &PipelineConfig,
    options: RebuildOptions,
) -> Result<RunReport, RunError> {
    let started_at = Utc::now();
    let timer = Instant::now();

    config.validate()?;
    let config_fingerprint = config.fingerprint()?;
    info!(
        input = %input.display(),
        output_dir = %output_dir.display(),
        config = %config_fingerprint,
        "rebuild started"
    );

    let ingested = Ingestor::new(config.ingest.clone()).ingest_csv(input)?;
    let ingest = IngestSummary::from_outcome(&ingested);

    let cleaned = clean(
        ingested.observations,
        config.dedupe,
        config.missing.clone(),
    )?;
    for excluded in &cleaned.excluded_symbols {
        warn!(
            symbol = %excluded.symbol,
            dropped_rows = excluded.dropped_rows,
            "symbol excluded: no usable price data"
        );
    }

    let aggregates = aggregate(&cleaned.dataset);

    let store = ArtifactStore::new(output_dir);
    let replaced_existing = store.has_artifacts();
    if replaced_existing && !options.overwrite {
        info!("existing artifacts will be replaced");
    }
    let manifest = store.publish(&cleaned.dataset, &aggregates)?;

    let report = RunReport {
        schema_version: REPORT_SCHEMA_VERSION,
        started_at,
        duration_ms: u64::try_from(timer.elapsed().as_millis()).unwrap_or(u64::MAX),
        input: input.to_path_buf(),
        output_dir: output_dir.to_path_buf(),
        overwrite_requested: options.overwrite,
        replaced_existing,
        config_fingerprint,
        ingest,
        dedup: cleaned.dedup,
        resolve: cleaned.resolve,
        excluded_symbols: cleaned.excluded_symbols,
        cleaned_rows: manifest.cleaned_rows,
        aggregates: AggregateCounts::from_dataset(&aggregates),
        artifacts: store.paths(),
        data_hash: manifest.cleaned_hash,
    };
    save_report(&report, output_dir)?;

    info!(
        cleaned_rows = report.cleaned_rows,
        filled = report.resolve.filled.total(),
        dropped = report.resolve.dropped(),
        duration_ms = report.duration_ms,
        "rebuild complete"
    );
    Ok(report)
}

/// Shape of a published artifact set, as seen by a reader.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactSummary {
    pub dir: PathBuf,
    pub manifest: Manifest,
    pub cleaned_rows: usize,
    pub symbols: Vec<String>,
    pub first_date: Option<NaiveDate>,
    pub last_date: Option<NaiveDate>,
    pub aggregates: AggregateCounts,
}

/// Read both artifacts back and check them against the manifest.
pub fn inspect(dir: &Path) -> Result<ArtifactSummary, RunError> {
    let store = ArtifactStore::new(dir);
    let manifest = store.read_manifest()?;
    let cleaned = store.read_cleaned()?;
    let aggregates = store.read_aggregates()?;

    let actual = cleaned.content_hash();
    if actual != manifest.cleaned_hash {
        return Err(RunError::HashMismatch {
            expected: manifest.cleaned_hash,
            actual,
        });
    }

    let first_date = cleaned.records().iter().map(|r| r.date).min();
    let last_date = cleaned.records().iter().map(|r| r.date).max();
    let symbols = cleaned.symbols().into_iter().map(str::to_string).collect();

    Ok(ArtifactSummary {
        dir: dir.to_path_buf(),
        manifest,
        cleaned_rows: cleaned.len(),
        symbols,
        first_date,
        last_date,
        aggregates: AggregateCounts::from_dataset(&aggregates),
    })
}
