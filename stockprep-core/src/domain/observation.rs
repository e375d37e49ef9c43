//! Observation: a single stock-price row, before and after missing-data resolution.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Sector label given to a symbol whose sector was never observed.
pub const UNKNOWN_SECTOR: &str = "unknown";

/// Logical duplicate key: at most one surviving row per `(date, symbol)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObservationKey {
    pub date: NaiveDate,
    pub symbol: String,
}

/// Raw row-level record as ingested.
///
/// Every field except `date` and `symbol` may be missing. Missing is `None`,
/// never zero or an empty string.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub date: NaiveDate,
    pub symbol: String,
    pub sector: Option<String>,
    pub open: Option<f64>,
    pub high: Option<f64>,
    pub low: Option<f64>,
    pub close: Option<f64>,
    pub volume: Option<u64>,
}

impl Observation {
    pub fn key(&self) -> ObservationKey {
        ObservationKey {
            date: self.date,
            symbol: self.symbol.clone(),
        }
    }

    /// Number of missing optional fields (sector, prices, volume).
    pub fn missing_count(&self) -> usize {
        [
            self.sector.is_none(),
            self.open.is_none(),
            self.high.is_none(),
            self.low.is_none(),
            self.close.is_none(),
            self.volume.is_none(),
        ]
        .iter()
        .filter(|missing| **missing)
        .count()
    }

    /// True when all four price fields are present.
    pub fn has_all_prices(&self) -> bool {
        self.open.is_some() && self.high.is_some() && self.low.is_some() && self.close.is_some()
    }

    /// True when no price field is present at all.
    pub fn has_no_prices(&self) -> bool {
        self.open.is_none() && self.high.is_none() && self.low.is_none() && self.close.is_none()
    }

    /// Price-bound violations among the fields that are present.
    pub fn bound_violations(&self) -> Vec<BoundViolation> {
        check_bounds(self.open, self.high, self.low, self.close)
    }
}

/// Canonical row order: `(symbol, date)` ascending.
pub fn cmp_symbol_date(a: &Observation, b: &Observation) -> Ordering {
    a.symbol.cmp(&b.symbol).then(a.date.cmp(&b.date))
}

/// A fully resolved row: no missing values remain.
///
/// `validated` is false when any price-bound check failed. Such rows are
/// flagged, never corrected.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CleanRecord {
    pub date: NaiveDate,
    pub symbol: String,
    pub sector: String,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: u64,
    pub validated: bool,
}

impl CleanRecord {
    pub fn key(&self) -> ObservationKey {
        ObservationKey {
            date: self.date,
            symbol: self.symbol.clone(),
        }
    }

    pub fn bound_violations(&self) -> Vec<BoundViolation> {
        check_bounds(
            Some(self.open),
            Some(self.high),
            Some(self.low),
            Some(self.close),
        )
    }
}

impl From<CleanRecord> for Observation {
    fn from(rec: CleanRecord) -> Self {
        Observation {
            date: rec.date,
            symbol: rec.symbol,
            sector: Some(rec.sector),
            open: Some(rec.open),
            high: Some(rec.high),
            low: Some(rec.low),
            close: Some(rec.close),
            volume: Some(rec.volume),
        }
    }
}

/// A price relationship that does not hold for a row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BoundViolation {
    CloseAboveHigh,
    CloseBelowLow,
    OpenAboveHigh,
    OpenBelowLow,
    LowAboveHigh,
}

fn check_bounds(
    open: Option<f64>,
    high: Option<f64>,
    low: Option<f64>,
    close: Option<f64>,
) -> Vec<BoundViolation> {
    let mut violations = Vec::new();
    if let (Some(c), Some(h)) = (close, high) {
        if c > h {
            violations.push(BoundViolation::CloseAboveHigh);
        }
    }
    if let (Some(c), Some(l)) = (close, low) {
        if c < l {
            violations.push(BoundViolation::CloseBelowLow);
        }
    }
    if let (Some(o), Some(h)) = (open, high) {
        if o > h {
            violations.push(BoundViolation::OpenAboveHigh);
        }
    }
    if let (Some(o), Some(l)) = (open, low) {
        if o < l {
            violations.push(BoundViolation::OpenBelowLow);
        }
    }
    if let (Some(l), Some(h)) = (low, high) {
        if l > h {
            violations.push(BoundViolation::LowAboveHigh);
        }
    }
    violations
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Observation {
        Observation {
            date: NaiveDate::from_ymd_opt(2024, 1, 2).unwrap(),
            symbol: "AAPL".into(),
            sector: Some("technology".into()),
            open: Some(100.0),
            high: Some(105.0),
            low: Some(98.0),
            close: Some(103.0),
            volume: Some(50_000),
        }
    }

    #[test]
    fn complete_row_has_no_missing_fields() {
        assert_eq!(sample().missing_count(), 0);
        assert!(sample().has_all_prices());
    }

    #[test]
    fn missing_count_tracks_each_optional_field() {
        let mut obs = sample();
        obs.sector = None;
        obs.close = None;
        obs.volume = None;
        assert_eq!(obs.missing_count(), 3);
        assert!(!obs.has_all_prices());
        assert!(!obs.has_no_prices());
    }

    #[test]
    fn bounds_ignore_missing_fields() {
        let mut obs = sample();
        obs.high = None;
        obs.close = Some(500.0);
        assert!(obs.bound_violations().is_empty());
    }

    #[test]
    fn close_above_high_is_flagged() {
        let mut obs = sample();
        obs.close = Some(110.0);
        assert_eq!(obs.bound_violations(), vec![BoundViolation::CloseAboveHigh]);
    }

    #[test]
    fn inverted_range_is_flagged() {
        let mut obs = sample();
        obs.high = Some(97.0);
        let v = obs.bound_violations();
        assert!(v.contains(&BoundViolation::LowAboveHigh));
        assert!(v.contains(&BoundViolation::CloseAboveHigh));
    }

    #[test]
    fn clean_record_converts_to_complete_observation() {
        let rec = CleanRecord {
            date: NaiveDate::from_ymd_opt(2024, 1, 2).unwrap(),
            symbol: "AAPL".into(),
            sector: UNKNOWN_SECTOR.into(),
            open: 1.0,
            high: 2.0,
            low: 0.5,
            close: 1.5,
            volume: 0,
            validated: true,
        };
        let obs: Observation = rec.into();
        assert_eq!(obs.missing_count(), 0);
        assert_eq!(obs.sector.as_deref(), Some("unknown"));
    }

    #[test]
    fn keys_order_by_date_then_symbol() {
        let a = sample().key();
        let mut later = sample();
        later.date = NaiveDate::from_ymd_opt(2024, 1, 3).unwrap();
        assert!(a < later.key());
    }
}
