//! StockPrep Runner: pipeline orchestration, configuration, run reports.
//!
//! This crate builds on `stockprep-core` to provide:
//! - TOML pipeline configuration with validation and fingerprinting
//! - The rebuild operation (ingest, clean, aggregate, publish)
//! - Persisted run reports
//! - Read-back inspection of published artifacts

pub mod config;
pub mod pipeline;
pub mod report;

pub use config::{ConfigError, ConfigFingerprint, PipelineConfig};
pub use pipeline::{inspect, rebuild, ArtifactSummary, RebuildOptions, RunError};
pub use report::{
    load_report, save_report, AggregateCounts, IngestSummary, RunReport, REPORT_FILE,
    REPORT_SCHEMA_VERSION,
};
