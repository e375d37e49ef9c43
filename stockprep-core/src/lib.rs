//! StockPrep Core: record model, ingestion, cleaning, aggregation, persistence.
//!
//! Pipeline stages, each a plain function over owned data:
//! - Ingestion: delimited text to typed observations, bad rows counted and sampled
//! - Deduplication: one observation per `(date, symbol)`
//! - Missing-data resolution: forward-fill prices, zero-fill volume, sector fallback
//! - Aggregation: daily average close, volume by sector, daily returns
//! - Persistence: Parquet artifacts with exact schema checks and atomic publish

pub mod aggregate;
pub mod clean;
pub mod data;
pub mod domain;

#[cfg(test)]
mod tests {
    use super::*;

    /// Compile-time check: pipeline values can cross thread boundaries.
    #[allow(dead_code)]
    fn assert_send_sync() {
        fn require_send<T: Send>() {}
        fn require_sync<T: Sync>() {}

        require_send::<domain::Observation>();
        require_sync::<domain::Observation>();
        require_send::<domain::CleanRecord>();
        require_sync::<domain::CleanRecord>();
        require_send::<clean::CleanedDataset>();
        require_sync::<clean::CleanedDataset>();
        require_send::<aggregate::AggregateDataset>();
        require_sync::<aggregate::AggregateDataset>();
        require_send::<data::Ingestor>();
        require_sync::<data::Ingestor>();
        require_send::<data::ArtifactStore>();
        require_sync::<data::ArtifactStore>();
        require_send::<data::StoreError>();
        require_send::<data::IngestError>();
    }
}
