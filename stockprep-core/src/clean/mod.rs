//! Cleaning: deduplication followed by missing-data resolution.

pub mod dedupe;
pub mod resolve;

pub use dedupe::{dedupe, DedupPolicy, DedupStats, Deduplicator, KeepStrategy};
pub use resolve::{
    resolve, ExcludedSymbol, FillCounts, MissingDataPolicy, PricePolicy, ResolveOutcome,
    ResolveStats, Resolver, VolumePolicy,
};

use crate::domain::{CleanRecord, Observation, ObservationKey};
use chrono::Datelike;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DatasetError {
    #[error("duplicate row for {symbol} on {date}")]
    DuplicateKey {
        symbol: String,
        date: chrono::NaiveDate,
    },
}

/// Resolved rows, unique by `(date, symbol)` and sorted by `(symbol, date)`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CleanedDataset {
    records: Vec<CleanRecord>,
}

impl CleanedDataset {
    /// Sort and check uniqueness.
    pub fn new(mut records: Vec<CleanRecord>) -> Result<Self, DatasetError> {
        records.sort_by(|a, b| a.symbol.cmp(&b.symbol).then(a.date.cmp(&b.date)));
        if let Some(pair) = records
            .windows(2)
            .find(|w| w[0].symbol == w[1].symbol && w[0].date == w[1].date)
        {
            return Err(DatasetError::DuplicateKey {
                symbol: pair[1].symbol.clone(),
                date: pair[1].date,
            });
        }
        Ok(Self { records })
    }

    pub fn records(&self) -> &[CleanRecord] {
        &self.records
    }

    pub fn into_records(self) -> Vec<CleanRecord> {
        self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = ObservationKey> + '_ {
        self.records.iter().map(CleanRecord::key)
    }

    /// Distinct symbols in row order.
    pub fn symbols(&self) -> Vec<&str> {
        let mut out: Vec<&str> = Vec::new();
        for rec in &self.records {
            if out.last() != Some(&rec.symbol.as_str()) {
                out.push(&rec.symbol);
            }
        }
        out
    }

    /// Deterministic BLAKE3 hash over every row.
    ///
    /// Strings are length-prefixed so field boundaries are unambiguous.
    pub fn content_hash(&self) -> String {
        let mut hasher = blake3::Hasher::new();
        for rec in &self.records {
            hash_str(&mut hasher, &rec.symbol);
            hasher.update(&rec.date.num_days_from_ce().to_le_bytes());
            hash_str(&mut hasher, &rec.sector);
            hasher.update(&rec.open.to_le_bytes());
            hasher.update(&rec.high.to_le_bytes());
            hasher.update(&rec.low.to_le_bytes());
            hasher.update(&rec.close.to_le_bytes());
            hasher.update(&rec.volume.to_le_bytes());
            hasher.update(&[u8::from(rec.validated)]);
        }
        hasher.finalize().to_hex().to_string()
    }
}

fn hash_str(hasher: &mut blake3::Hasher, value: &str) {
    hasher.update(&(value.len() as u64).to_le_bytes());
    hasher.update(value.as_bytes());
}

/// Everything produced by one cleaning pass.
#[derive(Debug, Clone)]
pub struct CleanOutcome {
    pub dataset: CleanedDataset,
    pub dedup: DedupStats,
    pub resolve: ResolveStats,
    pub excluded_symbols: Vec<ExcludedSymbol>,
}

/// Deduplicate, then resolve missing data.
pub fn clean(
    raw: Vec<Observation>,
    dedup_policy: DedupPolicy,
    missing_policy: MissingDataPolicy,
) -> Result<CleanOutcome, DatasetError> {
    let (deduped, dedup) = Deduplicator::new(dedup_policy).run(raw);
    let resolved = Resolver::new(missing_policy).run(deduped);
    let dataset = CleanedDataset::new(resolved.records)?;
    Ok(CleanOutcome {
        dataset,
        dedup,
        resolve: resolved.stats,
        excluded_symbols: resolved.excluded_symbols,
    })
}
