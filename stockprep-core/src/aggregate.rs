//! Fixed aggregations over the cleaned dataset.
//!
//! All three series are recomputed from scratch on each run:
//! - daily average close across symbols
//! - total volume per `(date, sector)`
//! - per-symbol day-over-day close returns
//!
//! Values are plain `f64`; rounding is left to consumers.

use crate::clean::CleanedDataset;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::info;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyAverageClose {
    pub date: NaiveDate,
    pub avg_close: f64,
    pub symbol_count: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SectorVolume {
    pub date: NaiveDate,
    pub sector: String,
    pub total_volume: u64,
    pub symbol_count: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyReturn {
    pub date: NaiveDate,
    pub symbol: String,
    pub daily_return: f64,
}

/// The derived tables, each sorted by its key.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AggregateDataset {
    /// Sorted by date.
    pub daily_close: Vec<DailyAverageClose>,
    /// Sorted by `(date, sector)`.
    pub sector_volume: Vec<SectorVolume>,
    /// Sorted by `(symbol, date)`.
    pub daily_returns: Vec<DailyReturn>,
}

impl AggregateDataset {
    pub fn total_rows(&self) -> usize {
        self.daily_close.len() + self.sector_volume.len() + self.daily_returns.len()
    }

    pub fn daily_close_on(&self, date: NaiveDate) -> Option<f64> {
        self.daily_close
            .iter()
            .find(|r| r.date == date)
            .map(|r| r.avg_close)
    }

    pub fn return_for(&self, symbol: &str, date: NaiveDate) -> Option<f64> {
        self.daily_returns
            .iter()
            .find(|r| r.symbol == symbol && r.date == date)
            .map(|r| r.daily_return)
    }
}

pub fn aggregate(clean: &CleanedDataset) -> AggregateDataset {
    let result = AggregateDataset {
        daily_close: daily_average_close(clean),
        sector_volume: volume_by_sector(clean),
        daily_returns: daily_returns(clean),
    };
    info!(
        daily_close = result.daily_close.len(),
        sector_volume = result.sector_volume.len(),
        daily_returns = result.daily_returns.len(),
        "aggregation complete"
    );
    result
}

pub fn daily_average_close(clean: &CleanedDataset) -> Vec<DailyAverageClose> {
    let mut by_date: BTreeMap<NaiveDate, (f64, u32)> = BTreeMap::new();
    for rec in clean.records() {
        let entry = by_date.entry(rec.date).or_insert((0.0, 0));
        entry.0 += rec.close;
        entry.1 += 1;
    }
    by_date
        .into_iter()
        .map(|(date, (sum, n))| DailyAverageClose {
            date,
            avg_close: sum / f64::from(n),
            symbol_count: n,
        })
        .collect()
}

pub fn volume_by_sector(clean: &CleanedDataset) -> Vec<SectorVolume> {
    let mut by_key: BTreeMap<(NaiveDate, &str), (u64, u32)> = BTreeMap::new();
    for rec in clean.records() {
        let entry = by_key.entry((rec.date, rec.sector.as_str())).or_insert((0, 0));
        entry.0 = entry.0.saturating_add(rec.volume);
        entry.1 += 1;
    }
    by_key
        .into_iter()
        .map(|((date, sector), (total_volume, n))| SectorVolume {
            date,
            sector: sector.to_string(),
            total_volume,
            symbol_count: n,
        })
        .collect()
}

/// Returns between consecutive rows of each symbol's series.
///
/// No value for a symbol's first row, nor when the previous close is zero.
pub fn daily_returns(clean: &CleanedDataset) -> Vec<DailyReturn> {
    let mut out = Vec::new();
    // Records are sorted by (symbol, date), so each symbol is contiguous.
    for pair in clean.records().windows(2) {
        let (prev, cur) = (&pair[0], &pair[1]);
        if prev.symbol != cur.symbol || prev.close == 0.0 {
            continue;
        }
        out.push(DailyReturn {
            date: cur.date,
            symbol: cur.symbol.clone(),
            daily_return: (cur.close - prev.close) / prev.close,
        });
    }
    out
}
