//! CSV ingestion against a declared observation schema.
//!
//! Headers are normalized (trimmed, lower-cased, non-word runs collapsed to
//! `_`) and mapped onto the eight canonical fields through a fixed alias
//! table. Unknown columns are rejected unless explicitly ignored.
//!
//! Rows that cannot be parsed are skipped and counted. The run only fails
//! outright when the rejected share exceeds `max_error_rate`.

use crate::domain::Observation;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use tracing::{debug, info, warn};

/// Ingestion settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    /// Maximum tolerated share of rejected rows, in `[0, 1]`.
    pub max_error_rate: f64,
    /// How many row errors to keep verbatim for reporting.
    pub max_error_samples: usize,
    /// chrono format strings, tried in order.
    pub date_formats: Vec<String>,
    /// Cell values (case-insensitive, after trimming) that mean "missing".
    pub null_tokens: Vec<String>,
    /// Normalized header names that are dropped instead of rejected.
    pub ignore_columns: Vec<String>,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            max_error_rate: 0.10,
            max_error_samples: 20,
            date_formats: ["%Y-%m-%d", "%m/%d/%Y", "%d/%m/%Y", "%Y/%m/%d"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            null_tokens: ["", "na", "n/a", "null", "none", "nan", "-"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            ignore_columns: ["validated", "currency", "exchange", "notes"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

/// Canonical input fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    Date,
    Symbol,
    Sector,
    Open,
    High,
    Low,
    Close,
    Volume,
}

impl Field {
    pub const ALL: [Field; 8] = [
        Field::Date,
        Field::Symbol,
        Field::Sector,
        Field::Open,
        Field::High,
        Field::Low,
        Field::Close,
        Field::Volume,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Field::Date => "date",
            Field::Symbol => "symbol",
            Field::Sector => "sector",
            Field::Open => "open",
            Field::High => "high",
            Field::Low => "low",
            Field::Close => "close",
            Field::Volume => "volume",
        }
    }

    /// Map a normalized header onto a field.
    pub fn from_header(header: &str) -> Option<Field> {
        match header {
            "date" | "trade_date" => Some(Field::Date),
            "symbol" | "ticker" => Some(Field::Symbol),
            "sector" => Some(Field::Sector),
            "open" | "open_price" => Some(Field::Open),
            "high" | "high_price" => Some(Field::High),
            "low" | "low_price" => Some(Field::Low),
            "close" | "close_price" => Some(Field::Close),
            "volume" => Some(Field::Volume),
            _ => None,
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Normalize a header: trim, lower-case, collapse non-word runs to `_`.
pub fn normalize_header(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut in_gap = false;
    for ch in raw.trim().chars().flat_map(char::to_lowercase) {
        if ch.is_alphanumeric() || ch == '_' {
            out.push(ch);
            in_gap = false;
        } else if !in_gap {
            out.push('_');
            in_gap = true;
        }
    }
    out
}

/// Why a single row was rejected.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RowErrorKind {
    Malformed { message: String },
    MissingDate,
    BadDate { value: String },
    MissingSymbol,
    BadNumber { column: String, value: String },
    NonPositivePrice { column: String, value: f64 },
    BadVolume { value: String },
}

impl fmt::Display for RowErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RowErrorKind::Malformed { message } => write!(f, "malformed record: {message}"),
            RowErrorKind::MissingDate => f.write_str("missing date"),
            RowErrorKind::BadDate { value } => write!(f, "unparseable date '{value}'"),
            RowErrorKind::MissingSymbol => f.write_str("missing symbol"),
            RowErrorKind::BadNumber { column, value } => {
                write!(f, "unparseable number '{value}' in column {column}")
            }
            RowErrorKind::NonPositivePrice { column, value } => {
                write!(f, "non-positive price {value} in column {column}")
            }
            RowErrorKind::BadVolume { value } => write!(f, "invalid volume '{value}'"),
        }
    }
}

/// A rejected row with its 1-based line number in the source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RowError {
    pub line: u64,
    pub kind: RowErrorKind,
}

/// Result of ingesting one source.
#[derive(Debug, Clone)]
pub struct IngestOutcome {
    pub observations: Vec<Observation>,
    pub rows_read: usize,
    pub rows_rejected: usize,
    /// First `max_error_samples` rejections.
    pub error_samples: Vec<RowError>,
    /// Source columns that were dropped via `ignore_columns`.
    pub ignored_columns: Vec<String>,
}

impl IngestOutcome {
    pub fn error_rate(&self) -> f64 {
        if self.rows_read == 0 {
            0.0
        } else {
            self.rows_rejected as f64 / self.rows_read as f64
        }
    }
}

/// Fatal ingestion failures.
#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("failed to open {path}: {source}")]
    Open {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to read CSV header: {0}")]
    Header(#[source] csv::Error),

    #[error("missing required column '{0}'")]
    MissingColumn(Field),

    #[error("unexpected column '{0}' (add it to ignore_columns to drop it)")]
    UnexpectedColumn(String),

    #[error("column '{header}' maps to '{field}', which is already provided")]
    DuplicateColumn { header: String, field: Field },

    #[error(
        "rejected {rejected} of {total} rows ({rate:.2}%), above the {threshold:.2}% threshold"
    )]
    ErrorRateExceeded {
        rejected: usize,
        total: usize,
        rate: f64,
        threshold: f64,
    },
}

/// Column positions for each canonical field.
#[derive(Debug, Clone, Copy)]
struct ColumnMap {
    positions: [usize; 8],
}

impl ColumnMap {
    fn get(&self, field: Field) -> usize {
        self.positions[field as usize]
    }
}

/// CSV ingestor for raw stock rows.
pub struct Ingestor {
    config: IngestConfig,
}

impl Ingestor {
    pub fn new(config: IngestConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &IngestConfig {
        &self.config
    }

    /// Ingest a CSV file.
    pub fn ingest_csv(&self, path: &Path) -> Result<IngestOutcome, IngestError> {
        info!(path = %path.display(), "ingesting CSV");
        let file = File::open(path).map_err(|e| IngestError::Open {
            path: path.display().to_string(),
            source: e,
        })?;
        self.ingest_reader(file)
    }

    /// Ingest CSV from any reader. The first record must be the header.
    pub fn ingest_reader<R: Read>(&self, reader: R) -> Result<IngestOutcome, IngestError> {
        let mut rdr = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(false)
            .from_reader(reader);

        let headers = rdr.headers().map_err(IngestError::Header)?.clone();
        let (columns, ignored_columns) = self.map_columns(&headers)?;

        let mut observations = Vec::new();
        let mut rows_read = 0usize;
        let mut rows_rejected = 0usize;
        let mut error_samples = Vec::new();

        for (idx, result) in rdr.records().enumerate() {
            rows_read += 1;
            // Header is line 1.
            let fallback_line = idx as u64 + 2;
            let parsed = match result {
                Ok(record) => {
                    let line = record
                        .position()
                        .map(|p| p.line())
                        .unwrap_or(fallback_line);
                    self.parse_record(&record, &columns)
                        .map_err(|kind| RowError { line, kind })
                }
                Err(e) => Err(RowError {
                    line: e
                        .position()
                        .map(|p| p.line())
                        .unwrap_or(fallback_line),
                    kind: RowErrorKind::Malformed {
                        message: e.to_string(),
                    },
                }),
            };

            match parsed {
                Ok(obs) => observations.push(obs),
                Err(err) => {
                    debug!(line = err.line, error = %err.kind, "rejected row");
                    rows_rejected += 1;
                    if error_samples.len() < self.config.max_error_samples {
                        error_samples.push(err);
                    }
                }
            }
        }

        let outcome = IngestOutcome {
            observations,
            rows_read,
            rows_rejected,
            error_samples,
            ignored_columns,
        };

        let rate = outcome.error_rate();
        if rate > self.config.max_error_rate {
            return Err(IngestError::ErrorRateExceeded {
                rejected: rows_rejected,
                total: rows_read,
                rate: rate * 100.0,
                threshold: self.config.max_error_rate * 100.0,
            });
        }

        if rows_rejected > 0 {
            warn!(
                rejected = rows_rejected,
                total = rows_read,
                "skipped malformed rows"
            );
        }
        info!(
            rows = outcome.observations.len(),
            rejected = rows_rejected,
            "ingestion complete"
        );

        Ok(outcome)
    }

    fn map_columns(
        &self,
        headers: &csv::StringRecord,
    ) -> Result<(ColumnMap, Vec<String>), IngestError> {
        let mut positions: [Option<usize>; 8] = [None; 8];
        let mut ignored = Vec::new();

        for (pos, raw) in headers.iter().enumerate() {
            let header = normalize_header(raw);
            match Field::from_header(&header) {
                Some(field) => {
                    let slot = &mut positions[field as usize];
                    if slot.is_some() {
                        return Err(IngestError::DuplicateColumn { header, field });
                    }
                    *slot = Some(pos);
                }
                None if self.config.ignore_columns.iter().any(|c| *c == header) => {
                    ignored.push(header);
                }
                None => return Err(IngestError::UnexpectedColumn(header)),
            }
        }

        let mut resolved = [0usize; 8];
        for field in Field::ALL {
            resolved[field as usize] =
                positions[field as usize].ok_or(IngestError::MissingColumn(field))?;
        }

        Ok((ColumnMap { positions: resolved }, ignored))
    }

    /// Returns the trimmed cell, or `None` when it is a null token.
    fn cell<'r>(&self, record: &'r csv::StringRecord, pos: usize) -> Option<&'r str> {
        let value = record.get(pos)?.trim();
        let is_null = self
            .config
            .null_tokens
            .iter()
            .any(|t| t.eq_ignore_ascii_case(value));
        if is_null {
            None
        } else {
            Some(value)
        }
    }

    fn parse_record(
        &self,
        record: &csv::StringRecord,
        columns: &ColumnMap,
    ) -> Result<Observation, RowErrorKind> {
        let raw_date = self
            .cell(record, columns.get(Field::Date))
            .ok_or(RowErrorKind::MissingDate)?;
        let date = self.parse_date(raw_date).ok_or_else(|| RowErrorKind::BadDate {
            value: raw_date.to_string(),
        })?;

        let symbol = self
            .cell(record, columns.get(Field::Symbol))
            .ok_or(RowErrorKind::MissingSymbol)?
            .to_uppercase();

        let sector = self
            .cell(record, columns.get(Field::Sector))
            .map(|s| s.to_lowercase());

        let open = self.parse_price(record, columns, Field::Open)?;
        let high = self.parse_price(record, columns, Field::High)?;
        let low = self.parse_price(record, columns, Field::Low)?;
        let close = self.parse_price(record, columns, Field::Close)?;
        let volume = self
            .cell(record, columns.get(Field::Volume))
            .map(parse_volume)
            .transpose()?;

        Ok(Observation {
            date,
            symbol,
            sector,
            open,
            high,
            low,
            close,
            volume,
        })
    }

    fn parse_date(&self, value: &str) -> Option<NaiveDate> {
        self.config
            .date_formats
            .iter()
            .find_map(|fmt| NaiveDate::parse_from_str(value, fmt).ok())
    }

    fn parse_price(
        &self,
        record: &csv::StringRecord,
        columns: &ColumnMap,
        field: Field,
    ) -> Result<Option<f64>, RowErrorKind> {
        let Some(raw) = self.cell(record, columns.get(field)) else {
            return Ok(None);
        };
        let value: f64 = raw.parse().map_err(|_| RowErrorKind::BadNumber {
            column: field.name().to_string(),
            value: raw.to_string(),
        })?;
        if value.is_nan() {
            return Ok(None);
        }
        if value.is_infinite() {
            return Err(RowErrorKind::BadNumber {
                column: field.name().to_string(),
                value: raw.to_string(),
            });
        }
        if value <= 0.0 {
            return Err(RowErrorKind::NonPositivePrice {
                column: field.name().to_string(),
                value,
            });
        }
        Ok(Some(value))
    }
}

impl Default for Ingestor {
    fn default() -> Self {
        Self::new(IngestConfig::default())
    }
}

/// Volumes are integers; integral floats such as `1200.0` are accepted.
fn parse_volume(raw: &str) -> Result<u64, RowErrorKind> {
    let bad = || RowErrorKind::BadVolume {
        value: raw.to_string(),
    };
    if let Ok(v) = raw.parse::<u64>() {
        return Ok(v);
    }
    let v: f64 = raw.parse().map_err(|_| bad())?;
    if v.is_finite() && v >= 0.0 && v.fract() == 0.0 && v < u64::MAX as f64 {
        Ok(v as u64)
    } else {
        Err(bad())
    }
}
