//! Run reports: what a rebuild read, changed, dropped and wrote.
//!
//! Persisted as `run_report.json` next to the artifacts. The file carries a
//! `schema_version`; unknown versions are rejected on load.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use stockprep_core::aggregate::AggregateDataset;
use stockprep_core::clean::{DedupStats, ExcludedSymbol, ResolveStats};
use stockprep_core::data::{ArtifactPaths, IngestOutcome, Manifest, RowError};

use crate::pipeline::RunError;

/// Current schema version of `run_report.json`.
pub const REPORT_SCHEMA_VERSION: u32 = 1;

pub const REPORT_FILE: &str = "run_report.json";

fn default_schema_version() -> u32 {
    REPORT_SCHEMA_VERSION
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngestSummary {
    pub rows_read: usize,
    pub rows_rejected: usize,
    pub error_rate: f64,
    pub ignored_columns: Vec<String>,
    pub error_samples: Vec<RowError>,
}

impl IngestSummary {
    pub fn from_outcome(outcome: &IngestOutcome) -> Self {
        Self {
            rows_read: outcome.rows_read,
            rows_rejected: outcome.rows_rejected,
            error_rate: outcome.error_rate(),
            ignored_columns: outcome.ignored_columns.clone(),
            error_samples: outcome.error_samples.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregateCounts {
    pub daily_close: usize,
    pub sector_volume: usize,
    pub daily_returns: usize,
}

impl AggregateCounts {
    pub fn from_dataset(agg: &AggregateDataset) -> Self {
        Self {
            daily_close: agg.daily_close.len(),
            sector_volume: agg.sector_volume.len(),
            daily_returns: agg.daily_returns.len(),
        }
    }
}

/// Complete record of one rebuild.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    #[serde(default = "default_schema_version")]
    pub schema_version: u32,
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub input: PathBuf,
    pub output_dir: PathBuf,
    /// Recorded only; every rebuild replaces the artifacts.
    pub overwrite_requested: bool,
    pub replaced_existing: bool,
    pub config_fingerprint: String,
    pub ingest: IngestSummary,
    pub dedup: DedupStats,
    pub resolve: ResolveStats,
    pub excluded_symbols: Vec<ExcludedSymbol>,
    pub cleaned_rows: usize,
    pub aggregates: AggregateCounts,
    pub artifacts: ArtifactPaths,
    pub data_hash: String,
}

impl RunReport {
    pub fn manifest_matches(&self, manifest: &Manifest) -> bool {
        manifest.cleaned_hash == self.data_hash && manifest.cleaned_rows == self.cleaned_rows
    }
}

pub fn export_json(report: &RunReport) -> Result<String, RunError> {
    serde_json::to_string_pretty(report)
        .map_err(|e| RunError::Report(format!("failed to serialize run report: {e}")))
}

pub fn import_json(json: &str) -> Result<RunReport, RunError> {
    let report: RunReport = serde_json::from_str(json)
        .map_err(|e| RunError::Report(format!("failed to parse run report: {e}")))?;
    if report.schema_version > REPORT_SCHEMA_VERSION {
        return Err(RunError::Report(format!(
            "unsupported schema version {} (max supported: {})",
            report.schema_version, REPORT_SCHEMA_VERSION
        )));
    }
    Ok(report)
}

/// Write `run_report.json` into `dir` (temp file, then rename).
pub fn save_report(report: &RunReport, dir: &Path) -> Result<PathBuf, RunError> {
    let path = dir.join(REPORT_FILE);
    let tmp = dir.join(format!("{REPORT_FILE}.tmp"));
    let json = export_json(report)?;
    fs::write(&tmp, json)
        .map_err(|e| RunError::Report(format!("failed to write {}: {e}", tmp.display())))?;
    if let Err(e) = fs::rename(&tmp, &path) {
        let _ = fs::remove_file(&tmp);
        return Err(RunError::Report(format!(
            "failed to move report into {}: {e}",
            path.display()
        )));
    }
    Ok(path)
}

pub fn load_report(dir: &Path) -> Result<RunReport, RunError> {
    let path = dir.join(REPORT_FILE);
    let json = fs::read_to_string(&path)
        .map_err(|e| RunError::Report(format!("failed to read {}: {e}", path.display())))?;
    import_json(&json)
}

#[cfg(test)]
mod tests {
    use super::*;
    use stockprep_core::data::RowErrorKind;

    fn sample_report(dir: &Path) -> RunReport {
        RunReport {
            schema_version: REPORT_SCHEMA_VERSION,
            started_at: DateTime::parse_from_rfc3339("2024-05-01T12:00:00Z")
                .unwrap()
                .with_timezone(&Utc),
            duration_ms: 42,
            input: dir.join("raw.csv"),
            output_dir: dir.to_path_buf(),
            overwrite_requested: false,
            replaced_existing: false,
            config_fingerprint: "abc".into(),
            ingest: IngestSummary {
                rows_read: 10,
                rows_rejected: 1,
                error_rate: 0.1,
                ignored_columns: vec!["notes".into()],
                error_samples: vec![RowError {
                    line: 4,
                    kind: RowErrorKind::MissingSymbol,
                }],
            },
            dedup: DedupStats::default(),
            resolve: ResolveStats::default(),
            excluded_symbols: vec![ExcludedSymbol {
                symbol: "ZZZ".into(),
                dropped_rows: 3,
            }],
            cleaned_rows: 6,
            aggregates: AggregateCounts::default(),
            artifacts: ArtifactPaths {
                cleaned: dir.join("cleaned.parquet"),
                aggregates: dir.join("aggregates.parquet"),
                manifest: dir.join("manifest.json"),
            },
            data_hash: "deadbeef".into(),
        }
    }

    #[test]
    fn save_then_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let report = sample_report(dir.path());
        let path = save_report(&report, dir.path()).unwrap();
        assert!(path.ends_with(REPORT_FILE));
        assert!(!dir.path().join("run_report.json.tmp").exists());
        assert_eq!(load_report(dir.path()).unwrap(), report);
    }

    #[test]
    fn newer_schema_version_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut report = sample_report(dir.path());
        report.schema_version = REPORT_SCHEMA_VERSION + 1;
        let json = serde_json::to_string(&report).unwrap();
        let err = import_json(&json).unwrap_err();
        assert!(err.to_string().contains("unsupported schema version"));
    }

    #[test]
    fn missing_schema_version_defaults_to_current() {
        let dir = tempfile::tempdir().unwrap();
        let report = sample_report(dir.path());
        let mut value = serde_json::to_value(&report).unwrap();
        value.as_object_mut().unwrap().remove("schema_version");
        let back = import_json(&value.to_string()).unwrap();
        assert_eq!(back.schema_version, REPORT_SCHEMA_VERSION);
    }
}
