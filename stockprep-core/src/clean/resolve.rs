//! Missing-data resolution over per-symbol date series.
//!
//! Observations are sorted by `(symbol, date)` and scanned left to right once
//! per symbol, carrying the last seen value of each fillable field.
//!
//! - Prices: forward-filled; a row whose price cannot be filled is dropped.
//! - Volume: missing means no trading, so it resolves to zero.
//! - Sector: sticky per symbol; falls back to [`UNKNOWN_SECTOR`].

use crate::domain::{cmp_symbol_date, CleanRecord, Observation, UNKNOWN_SECTOR};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PricePolicy {
    ForwardFill,
    DropRow,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VolumePolicy {
    Zero,
    DropRow,
}

/// Per-field resolution policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MissingDataPolicy {
    pub price: PricePolicy,
    pub volume: VolumePolicy,
    /// Label for rows with no sector observed on or before them.
    pub unknown_sector: String,
}

impl Default for MissingDataPolicy {
    fn default() -> Self {
        Self {
            price: PricePolicy::ForwardFill,
            volume: VolumePolicy::Zero,
            unknown_sector: UNKNOWN_SECTOR.to_string(),
        }
    }
}

/// How many values of each field were filled.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FillCounts {
    pub open: usize,
    pub high: usize,
    pub low: usize,
    pub close: usize,
    pub volume: usize,
    pub sector: usize,
}

impl FillCounts {
    pub fn total(&self) -> usize {
        self.open + self.high + self.low + self.close + self.volume + self.sector
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolveStats {
    pub input_rows: usize,
    pub output_rows: usize,
    pub filled: FillCounts,
    /// Rows dropped because a price had no prior value to fill from.
    pub dropped_unfillable_price: usize,
    /// Rows dropped by `VolumePolicy::DropRow`.
    pub dropped_missing_volume: usize,
    /// Rows labelled with the unknown sector.
    pub unknown_sector_rows: usize,
    /// Rows that failed a price-bound check (kept, flagged).
    pub bound_violations: usize,
}

impl ResolveStats {
    pub fn dropped(&self) -> usize {
        self.dropped_unfillable_price + self.dropped_missing_volume
    }
}

/// A symbol with no usable price data: every row was dropped for a price.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExcludedSymbol {
    pub symbol: String,
    pub dropped_rows: usize,
}

#[derive(Debug, Clone)]
pub struct ResolveOutcome {
    /// Resolved rows, sorted by `(symbol, date)`.
    pub records: Vec<CleanRecord>,
    pub stats: ResolveStats,
    pub excluded_symbols: Vec<ExcludedSymbol>,
}

impl ResolveOutcome {
    /// Resolved rows as observations with every field present.
    pub fn observations(&self) -> Vec<Observation> {
        self.records.iter().cloned().map(Observation::from).collect()
    }
}

/// Last seen value of each forward-filled field within one symbol.
#[derive(Debug, Default)]
struct LastSeen {
    open: Option<f64>,
    high: Option<f64>,
    low: Option<f64>,
    close: Option<f64>,
    sector: Option<String>,
}

pub struct Resolver {
    policy: MissingDataPolicy,
}

impl Resolver {
    pub fn new(policy: MissingDataPolicy) -> Self {
        Self { policy }
    }

    pub fn run(&self, deduped: Vec<Observation>) -> ResolveOutcome {
        let mut rows = deduped;
        // Stable: equal keys keep input order.
        rows.sort_by(cmp_symbol_date);

        let mut stats = ResolveStats {
            input_rows: rows.len(),
            ..ResolveStats::default()
        };
        let mut records = Vec::with_capacity(rows.len());
        let mut excluded_symbols = Vec::new();

        let mut start = 0;
        while start < rows.len() {
            let mut end = start + 1;
            while end < rows.len() && rows[end].symbol == rows[start].symbol {
                end += 1;
            }

            let series = &rows[start..end];
            let price_dropped = self.resolve_series(series, &mut records, &mut stats);
            if price_dropped == series.len() {
                excluded_symbols.push(ExcludedSymbol {
                    symbol: series[0].symbol.clone(),
                    dropped_rows: series.len(),
                });
            }
            start = end;
        }

        stats.output_rows = records.len();

        if !excluded_symbols.is_empty() {
            let names: Vec<&str> = excluded_symbols.iter().map(|e| e.symbol.as_str()).collect();
            warn!(symbols = ?names, "excluded symbols with no usable price data");
        }
        info!(
            input = stats.input_rows,
            output = stats.output_rows,
            filled = stats.filled.total(),
            dropped = stats.dropped(),
            flagged = stats.bound_violations,
            "missing-data resolution complete"
        );

        ResolveOutcome {
            records,
            stats,
            excluded_symbols,
        }
    }

    /// Resolve one symbol's rows (already sorted by date).
    ///
    /// Returns how many rows were dropped for lack of a price.
    fn resolve_series(
        &self,
        series: &[Observation],
        out: &mut Vec<CleanRecord>,
        stats: &mut ResolveStats,
    ) -> usize {
        let mut last = LastSeen::default();
        let mut price_dropped = 0;

        for obs in series {
            // Values on dropped rows still carry forward.
            let open = fill(obs.open, &mut last.open);
            let high = fill(obs.high, &mut last.high);
            let low = fill(obs.low, &mut last.low);
            let close = fill(obs.close, &mut last.close);
            if let Some(sector) = &obs.sector {
                last.sector = Some(sector.clone());
            }

            let (Some(open), Some(high), Some(low), Some(close)) = (open, high, low, close) else {
                stats.dropped_unfillable_price += 1;
                price_dropped += 1;
                continue;
            };
            if self.policy.price == PricePolicy::DropRow && !obs.has_all_prices() {
                stats.dropped_unfillable_price += 1;
                price_dropped += 1;
                continue;
            }

            let volume = match (obs.volume, self.policy.volume) {
                (Some(v), _) => v,
                (None, VolumePolicy::Zero) => {
                    stats.filled.volume += 1;
                    0
                }
                (None, VolumePolicy::DropRow) => {
                    stats.dropped_missing_volume += 1;
                    continue;
                }
            };

            stats.filled.open += usize::from(obs.open.is_none());
            stats.filled.high += usize::from(obs.high.is_none());
            stats.filled.low += usize::from(obs.low.is_none());
            stats.filled.close += usize::from(obs.close.is_none());

            let sector = match (&obs.sector, &last.sector) {
                (Some(s), _) => s.clone(),
                (None, Some(s)) => {
                    stats.filled.sector += 1;
                    s.clone()
                }
                (None, None) => {
                    stats.unknown_sector_rows += 1;
                    self.policy.unknown_sector.clone()
                }
            };

            let mut record = CleanRecord {
                date: obs.date,
                symbol: obs.symbol.clone(),
                sector,
                open,
                high,
                low,
                close,
                volume,
                validated: true,
            };
            if !record.bound_violations().is_empty() {
                record.validated = false;
                stats.bound_violations += 1;
            }
            out.push(record);
        }
        price_dropped
    }
}

impl Default for Resolver {
    fn default() -> Self {
        Self::new(MissingDataPolicy::default())
    }
}

/// Resolve with the default policy.
pub fn resolve(deduped: Vec<Observation>) -> ResolveOutcome {
    Resolver::default().run(deduped)
}

/// Forward-fill one field; a present value updates the carried state.
fn fill(value: Option<f64>, last: &mut Option<f64>) -> Option<f64> {
    match value {
        Some(v) => {
            *last = Some(v);
            Some(v)
        }
        None => *last,
    }
}
