//! Parquet artifact store.
//!
//! Layout: `{dir}/cleaned.parquet`, `{dir}/aggregates.parquet`, `{dir}/manifest.json`
//!
//! Features:
//! - Atomic writes (write to .tmp, rename into place)
//! - `publish` stages every file before renaming any of them and rolls back
//!   a commit that fails partway
//! - Exact schema validation on load
//! - Manifest sidecar (schema version, row counts, content hash)

use super::schema::{AggregateSchema, CleanedSchema, SchemaError, SCHEMA_VERSION};
use crate::aggregate::{AggregateDataset, DailyAverageClose, DailyReturn, SectorVolume};
use crate::clean::{CleanedDataset, DatasetError};
use crate::domain::CleanRecord;
use chrono::{Datelike, NaiveDate};
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

pub const CLEANED_FILE: &str = "cleaned.parquet";
pub const AGGREGATES_FILE: &str = "aggregates.parquet";
pub const MANIFEST_FILE: &str = "manifest.json";

/// Days from 0001-01-01 (CE day 1) to 1970-01-01.
const UNIX_EPOCH_DAYS_FROM_CE: i32 = 719_163;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("artifact not found: {0}")]
    NotFound(String),

    #[error("parquet I/O error: {0}")]
    Parquet(String),

    #[error("schema mismatch: {0}")]
    Schema(#[from] SchemaError),

    #[error("invalid dataset: {0}")]
    Dataset(#[from] DatasetError),

    #[error("manifest error: {0}")]
    Manifest(String),
}

fn io_err(path: &Path) -> impl FnOnce(std::io::Error) -> StoreError + '_ {
    move |source| StoreError::Io {
        path: path.display().to_string(),
        source,
    }
}

/// Sidecar describing a published artifact set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    pub schema_version: u32,
    pub cleaned_rows: usize,
    pub daily_close_rows: usize,
    pub sector_volume_rows: usize,
    pub daily_return_rows: usize,
    pub cleaned_hash: String,
}

impl Manifest {
    pub fn describe(cleaned: &CleanedDataset, aggregates: &AggregateDataset) -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            cleaned_rows: cleaned.len(),
            daily_close_rows: aggregates.daily_close.len(),
            sector_volume_rows: aggregates.sector_volume.len(),
            daily_return_rows: aggregates.daily_returns.len(),
            cleaned_hash: cleaned.content_hash(),
        }
    }
}

/// Paths of a published artifact set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactPaths {
    pub cleaned: PathBuf,
    pub aggregates: PathBuf,
    pub manifest: PathBuf,
}

/// Reads and writes the pipeline artifacts in one directory.
pub struct ArtifactStore {
    dir: PathBuf,
}

impl ArtifactStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn cleaned_path(&self) -> PathBuf {
        self.dir.join(CLEANED_FILE)
    }

    pub fn aggregates_path(&self) -> PathBuf {
        self.dir.join(AGGREGATES_FILE)
    }

    pub fn manifest_path(&self) -> PathBuf {
        self.dir.join(MANIFEST_FILE)
    }

    pub fn paths(&self) -> ArtifactPaths {
        ArtifactPaths {
            cleaned: self.cleaned_path(),
            aggregates: self.aggregates_path(),
            manifest: self.manifest_path(),
        }
    }

    /// True when any artifact is already present.
    pub fn has_artifacts(&self) -> bool {
        self.cleaned_path().exists() || self.aggregates_path().exists()
    }

    fn ensure_dir(&self) -> Result<(), StoreError> {
        fs::create_dir_all(&self.dir).map_err(io_err(&self.dir))
    }

    pub fn write_cleaned(&self, dataset: &CleanedDataset) -> Result<PathBuf, StoreError> {
        self.ensure_dir()?;
        let path = self.cleaned_path();
        let mut df = cleaned_to_dataframe(dataset)?;
        let tmp = stage_parquet(&mut df, &path)?;
        commit(&tmp, &path)?;
        Ok(path)
    }

    pub fn read_cleaned(&self) -> Result<CleanedDataset, StoreError> {
        let df = read_parquet(&self.cleaned_path())?;
        CleanedSchema::validate(&df)?;
        dataframe_to_cleaned(&df)
    }

    pub fn write_aggregates(&self, aggregates: &AggregateDataset) -> Result<PathBuf, StoreError> {
        self.ensure_dir()?;
        let path = self.aggregates_path();
        let mut df = aggregates_to_dataframe(aggregates)?;
        let tmp = stage_parquet(&mut df, &path)?;
        commit(&tmp, &path)?;
        Ok(path)
    }

    pub fn read_aggregates(&self) -> Result<AggregateDataset, StoreError> {
        let df = read_parquet(&self.aggregates_path())?;
        AggregateSchema::validate(&df)?;
        dataframe_to_aggregates(&df)
    }

    pub fn read_manifest(&self) -> Result<Manifest, StoreError> {
        let path = self.manifest_path();
        if !path.exists() {
            return Err(StoreError::NotFound(path.display().to_string()));
        }
        let content = fs::read_to_string(&path).map_err(io_err(&path))?;
        let manifest: Manifest = serde_json::from_str(&content)
            .map_err(|e| StoreError::Manifest(format!("parse {}: {e}", path.display())))?;
        if manifest.schema_version > SCHEMA_VERSION {
            return Err(SchemaError::UnsupportedVersion {
                found: manifest.schema_version,
                supported: SCHEMA_VERSION,
            }
            .into());
        }
        Ok(manifest)
    }

    /// Replace the full artifact set.
    ///
    /// Every file is staged before any is renamed. If staging fails, staged
    /// files are removed and the previous artifacts stay untouched. If a
    /// rename fails while committing, files already swapped in are rolled
    /// back from their `.bak` copies.
    pub fn publish(
        &self,
        cleaned: &CleanedDataset,
        aggregates: &AggregateDataset,
    ) -> Result<Manifest, StoreError> {
        self.ensure_dir()?;
        let manifest = Manifest::describe(cleaned, aggregates);
        let targets = self.paths();

        let mut staged: Vec<(PathBuf, PathBuf)> = Vec::with_capacity(3);
        let result = (|| {
            let mut df = cleaned_to_dataframe(cleaned)?;
            staged.push((stage_parquet(&mut df, &targets.cleaned)?, targets.cleaned.clone()));

            let mut df = aggregates_to_dataframe(aggregates)?;
            staged.push((stage_parquet(&mut df, &targets.aggregates)?, targets.aggregates.clone()));

            let json = serde_json::to_string_pretty(&manifest)
                .map_err(|e| StoreError::Manifest(format!("serialize: {e}")))?;
            staged.push((stage_bytes(json.as_bytes(), &targets.manifest)?, targets.manifest.clone()));
            Ok::<(), StoreError>(())
        })();

        if let Err(e) = result {
            for (tmp, _) in &staged {
                let _ = fs::remove_file(tmp);
            }
            return Err(e);
        }

        commit_all(&staged)?;

        info!(
            dir = %self.dir.display(),
            cleaned_rows = manifest.cleaned_rows,
            aggregate_rows = aggregates.total_rows(),
            "artifacts published"
        );
        Ok(manifest)
    }
}

// ── Atomic file helpers ─────────────────────────────────────────────

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".tmp");
    path.with_file_name(name)
}

/// Write a DataFrame next to `path` and return the temp file path.
fn stage_parquet(df: &mut DataFrame, path: &Path) -> Result<PathBuf, StoreError> {
    let tmp = tmp_path(path);
    let file = fs::File::create(&tmp).map_err(io_err(&tmp))?;
    if let Err(e) = ParquetWriter::new(file).finish(df) {
        let _ = fs::remove_file(&tmp);
        return Err(StoreError::Parquet(format!("write {}: {e}", tmp.display())));
    }
    debug!(path = %tmp.display(), rows = df.height(), "staged parquet");
    Ok(tmp)
}

fn stage_bytes(bytes: &[u8], path: &Path) -> Result<PathBuf, StoreError> {
    let tmp = tmp_path(path);
    fs::write(&tmp, bytes).map_err(io_err(&tmp))?;
    Ok(tmp)
}

/// Atomic rename into place.
fn commit(tmp: &Path, path: &Path) -> Result<(), StoreError> {
    fs::rename(tmp, path).map_err(|e| {
        // Clean up temp file on rename failure
        let _ = fs::remove_file(tmp);
        StoreError::Io {
            path: path.display().to_string(),
            source: e,
        }
    })
}

fn bak_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".bak");
    path.with_file_name(name)
}

/// Move every staged file into place, or none of them.
///
/// Existing targets are first renamed to `.bak`. On any failure the new
/// files are removed, backups are restored and leftover temp files deleted.
/// Backups are removed once every target is committed.
fn commit_all(staged: &[(PathBuf, PathBuf)]) -> Result<(), StoreError> {
    let mut backups: Vec<(PathBuf, PathBuf)> = Vec::new();
    let mut committed: Vec<PathBuf> = Vec::new();

    for (tmp, target) in staged {
        let step = (|| {
            if fs::symlink_metadata(target).is_ok() {
                let bak = bak_path(target);
                fs::rename(target, &bak).map_err(io_err(target))?;
                backups.push((bak, target.clone()));
            }
            fs::rename(tmp, target).map_err(io_err(target))?;
            committed.push(target.clone());
            Ok::<(), StoreError>(())
        })();

        if let Err(e) = step {
            rollback(staged, &committed, &backups);
            return Err(e);
        }
    }

    for (bak, _) in &backups {
        let removed = if bak.is_dir() {
            fs::remove_dir_all(bak)
        } else {
            fs::remove_file(bak)
        };
        if let Err(e) = removed {
            warn!(path = %bak.display(), error = %e, "failed to remove backup");
        }
    }
    Ok(())
}

fn rollback(
    staged: &[(PathBuf, PathBuf)],
    committed: &[PathBuf],
    backups: &[(PathBuf, PathBuf)],
) {
    for target in committed {
        let _ = fs::remove_file(target);
    }
    for (bak, target) in backups {
        if let Err(e) = fs::rename(bak, target) {
            warn!(path = %target.display(), error = %e, "failed to restore backup");
        }
    }
    for (tmp, _) in staged {
        let _ = fs::remove_file(tmp);
    }
}

fn read_parquet(path: &Path) -> Result<DataFrame, StoreError> {
    if !path.exists() {
        return Err(StoreError::NotFound(path.display().to_string()));
    }
    let file = fs::File::open(path).map_err(io_err(path))?;
    ParquetReader::new(file)
        .finish()
        .map_err(|e| StoreError::Parquet(format!("read {}: {e}", path.display())))
}

// ── DataFrame conversion ────────────────────────────────────────────

fn date_to_days(date: NaiveDate) -> i32 {
    date.num_days_from_ce() - UNIX_EPOCH_DAYS_FROM_CE
}

fn days_to_date(days: i32) -> Result<NaiveDate, StoreError> {
    days.checked_add(UNIX_EPOCH_DAYS_FROM_CE)
        .and_then(NaiveDate::from_num_days_from_ce_opt)
        .ok_or_else(|| StoreError::Parquet(format!("date out of range: {days}")))
}

fn date_column(days: Vec<i32>) -> Result<Column, StoreError> {
    Column::new("date".into(), days)
        .cast(&DataType::Date)
        .map_err(|e| StoreError::Parquet(format!("date cast: {e}")))
}

fn cleaned_to_dataframe(dataset: &CleanedDataset) -> Result<DataFrame, StoreError> {
    let recs = dataset.records();
    let dates: Vec<i32> = recs.iter().map(|r| date_to_days(r.date)).collect();
    let symbols: Vec<&str> = recs.iter().map(|r| r.symbol.as_str()).collect();
    let sectors: Vec<&str> = recs.iter().map(|r| r.sector.as_str()).collect();
    let opens: Vec<f64> = recs.iter().map(|r| r.open).collect();
    let highs: Vec<f64> = recs.iter().map(|r| r.high).collect();
    let lows: Vec<f64> = recs.iter().map(|r| r.low).collect();
    let closes: Vec<f64> = recs.iter().map(|r| r.close).collect();
    let volumes: Vec<u64> = recs.iter().map(|r| r.volume).collect();
    let validated: Vec<bool> = recs.iter().map(|r| r.validated).collect();

    DataFrame::new(vec![
        date_column(dates)?,
        Column::new("symbol".into(), symbols),
        Column::new("sector".into(), sectors),
        Column::new("open".into(), opens),
        Column::new("high".into(), highs),
        Column::new("low".into(), lows),
        Column::new("close".into(), closes),
        Column::new("volume".into(), volumes),
        Column::new("validated".into(), validated),
    ])
    .map_err(|e| StoreError::Parquet(format!("dataframe creation: {e}")))
}

fn col_err(name: &str) -> impl Fn(PolarsError) -> StoreError + '_ {
    move |e| StoreError::Parquet(format!("{name} column: {e}"))
}

fn required<T>(value: Option<T>, column: &str, row: usize) -> Result<T, StoreError> {
    value.ok_or_else(|| {
        SchemaError::NullValue {
            column: column.to_string(),
            row,
        }
        .into()
    })
}

/// Physical day numbers of the `date` column.
fn date_days(df: &DataFrame) -> Result<Int32Chunked, StoreError> {
    let col = df.column("date").map_err(col_err("date"))?;
    let phys = col.cast(&DataType::Int32).map_err(col_err("date"))?;
    Ok(phys.i32().map_err(col_err("date"))?.clone())
}

fn dataframe_to_cleaned(df: &DataFrame) -> Result<CleanedDataset, StoreError> {
    let dates = date_days(df)?;
    let symbols = df.column("symbol").and_then(|c| c.str()).map_err(col_err("symbol"))?;
    let sectors = df.column("sector").and_then(|c| c.str()).map_err(col_err("sector"))?;
    let opens = df.column("open").and_then(|c| c.f64()).map_err(col_err("open"))?;
    let highs = df.column("high").and_then(|c| c.f64()).map_err(col_err("high"))?;
    let lows = df.column("low").and_then(|c| c.f64()).map_err(col_err("low"))?;
    let closes = df.column("close").and_then(|c| c.f64()).map_err(col_err("close"))?;
    let volumes = df.column("volume").and_then(|c| c.u64()).map_err(col_err("volume"))?;
    let validated = df
        .column("validated")
        .and_then(|c| c.bool())
        .map_err(col_err("validated"))?;

    let n = df.height();
    let mut records = Vec::with_capacity(n);
    for i in 0..n {
        records.push(CleanRecord {
            date: days_to_date(required(dates.get(i), "date", i)?)?,
            symbol: required(symbols.get(i), "symbol", i)?.to_string(),
            sector: required(sectors.get(i), "sector", i)?.to_string(),
            open: required(opens.get(i), "open", i)?,
            high: required(highs.get(i), "high", i)?,
            low: required(lows.get(i), "low", i)?,
            close: required(closes.get(i), "close", i)?,
            volume: required(volumes.get(i), "volume", i)?,
            validated: required(validated.get(i), "validated", i)?,
        });
    }

    Ok(CleanedDataset::new(records)?)
}

fn aggregates_to_dataframe(agg: &AggregateDataset) -> Result<DataFrame, StoreError> {
    let n = agg.total_rows();
    let mut metric: Vec<&str> = Vec::with_capacity(n);
    let mut dates: Vec<i32> = Vec::with_capacity(n);
    let mut symbol: Vec<Option<&str>> = Vec::with_capacity(n);
    let mut sector: Vec<Option<&str>> = Vec::with_capacity(n);
    let mut value: Vec<Option<f64>> = Vec::with_capacity(n);
    let mut volume: Vec<Option<u64>> = Vec::with_capacity(n);
    let mut count: Vec<Option<u32>> = Vec::with_capacity(n);

    for r in &agg.daily_close {
        metric.push(AggregateSchema::AVG_CLOSE);
        dates.push(date_to_days(r.date));
        symbol.push(None);
        sector.push(None);
        value.push(Some(r.avg_close));
        volume.push(None);
        count.push(Some(r.symbol_count));
    }
    for r in &agg.sector_volume {
        metric.push(AggregateSchema::SECTOR_VOLUME);
        dates.push(date_to_days(r.date));
        symbol.push(None);
        sector.push(Some(r.sector.as_str()));
        value.push(None);
        volume.push(Some(r.total_volume));
        count.push(Some(r.symbol_count));
    }
    for r in &agg.daily_returns {
        metric.push(AggregateSchema::DAILY_RETURN);
        dates.push(date_to_days(r.date));
        symbol.push(Some(r.symbol.as_str()));
        sector.push(None);
        value.push(Some(r.daily_return));
        volume.push(None);
        count.push(None);
    }

    DataFrame::new(vec![
        Column::new("metric".into(), metric),
        date_column(dates)?,
        Column::new("symbol".into(), symbol),
        Column::new("sector".into(), sector),
        Column::new("value".into(), value),
        Column::new("volume".into(), volume),
        Column::new("symbol_count".into(), count),
    ])
    .map_err(|e| StoreError::Parquet(format!("dataframe creation: {e}")))
}

fn dataframe_to_aggregates(df: &DataFrame) -> Result<AggregateDataset, StoreError> {
    let metrics = df.column("metric").and_then(|c| c.str()).map_err(col_err("metric"))?;
    let dates = date_days(df)?;
    let symbols = df.column("symbol").and_then(|c| c.str()).map_err(col_err("symbol"))?;
    let sectors = df.column("sector").and_then(|c| c.str()).map_err(col_err("sector"))?;
    let values = df.column("value").and_then(|c| c.f64()).map_err(col_err("value"))?;
    let volumes = df.column("volume").and_then(|c| c.u64()).map_err(col_err("volume"))?;
    let counts = df
        .column("symbol_count")
        .and_then(|c| c.u32())
        .map_err(col_err("symbol_count"))?;

    let mut out = AggregateDataset::default();
    for i in 0..df.height() {
        let date = days_to_date(required(dates.get(i), "date", i)?)?;
        match required(metrics.get(i), "metric", i)? {
            AggregateSchema::AVG_CLOSE => out.daily_close.push(DailyAverageClose {
                date,
                avg_close: required(values.get(i), "value", i)?,
                symbol_count: required(counts.get(i), "symbol_count", i)?,
            }),
            AggregateSchema::SECTOR_VOLUME => out.sector_volume.push(SectorVolume {
                date,
                sector: required(sectors.get(i), "sector", i)?.to_string(),
                total_volume: required(volumes.get(i), "volume", i)?,
                symbol_count: required(counts.get(i), "symbol_count", i)?,
            }),
            AggregateSchema::DAILY_RETURN => out.daily_returns.push(DailyReturn {
                date,
                symbol: required(symbols.get(i), "symbol", i)?.to_string(),
                daily_return: required(values.get(i), "value", i)?,
            }),
            other => return Err(SchemaError::UnknownMetric(other.to_string()).into()),
        }
    }
    Ok(out)
}
