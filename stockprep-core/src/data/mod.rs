//! Data ingestion and persistence

pub mod ingest;
pub mod schema;
pub mod store;

pub use ingest::{IngestConfig, IngestError, IngestOutcome, Ingestor, RowError, RowErrorKind};
pub use schema::{AggregateSchema, CleanedSchema, SchemaError, SCHEMA_VERSION};
pub use store::{ArtifactPaths, ArtifactStore, Manifest, StoreError};
