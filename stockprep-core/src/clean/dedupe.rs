//! Collapse repeating lines to one observation per `(date, symbol)`.

use crate::domain::{cmp_symbol_date, Observation, ObservationKey};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::info;

/// Which record survives among equally complete candidates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeepStrategy {
    /// Later rows are treated as corrections.
    Last,
    First,
}

/// Duplicate tie-break policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DedupPolicy {
    /// Prefer the record with the fewest missing fields before applying `keep`.
    pub prefer_complete: bool,
    pub keep: KeepStrategy,
}

impl Default for DedupPolicy {
    fn default() -> Self {
        Self {
            prefer_complete: true,
            keep: KeepStrategy::Last,
        }
    }
}

/// Counts of rows removed by deduplication.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DedupStats {
    pub input_rows: usize,
    pub output_rows: usize,
    /// Removed rows identical to the surviving record of their group.
    pub exact_repeats: usize,
    /// Removed rows whose values differ from the surviving record.
    pub conflicting_repeats: usize,
}

impl DedupStats {
    pub fn removed(&self) -> usize {
        self.input_rows - self.output_rows
    }
}

pub struct Deduplicator {
    policy: DedupPolicy,
}

impl Deduplicator {
    pub fn new(policy: DedupPolicy) -> Self {
        Self { policy }
    }

    /// Keep one record per key. Output is sorted by `(symbol, date)`.
    pub fn run(&self, raw: Vec<Observation>) -> (Vec<Observation>, DedupStats) {
        let input_rows = raw.len();
        let mut groups: HashMap<ObservationKey, Vec<Observation>> = HashMap::new();
        for obs in raw {
            groups.entry(obs.key()).or_default().push(obs);
        }

        let mut stats = DedupStats {
            input_rows,
            ..DedupStats::default()
        };
        let mut survivors = Vec::with_capacity(groups.len());

        for (_, group) in groups {
            let winner = self.pick(&group);
            for (idx, obs) in group.iter().enumerate() {
                if idx == winner {
                    continue;
                }
                if *obs == group[winner] {
                    stats.exact_repeats += 1;
                } else {
                    stats.conflicting_repeats += 1;
                }
            }
            if let Some(obs) = group.into_iter().nth(winner) {
                survivors.push(obs);
            }
        }

        survivors.sort_by(cmp_symbol_date);
        stats.output_rows = survivors.len();

        info!(
            input = stats.input_rows,
            output = stats.output_rows,
            exact = stats.exact_repeats,
            conflicting = stats.conflicting_repeats,
            "deduplication complete"
        );

        (survivors, stats)
    }

    /// Index of the surviving record within a group (in input order).
    fn pick(&self, group: &[Observation]) -> usize {
        let mut best = 0;
        for idx in 1..group.len() {
            let (cand, cur) = (group[idx].missing_count(), group[best].missing_count());
            let replace = if self.policy.prefer_complete && cand != cur {
                cand < cur
            } else {
                self.policy.keep == KeepStrategy::Last
            };
            if replace {
                best = idx;
            }
        }
        best
    }
}

impl Default for Deduplicator {
    fn default() -> Self {
        Self::new(DedupPolicy::default())
    }
}

/// Deduplicate with the default policy.
pub fn dedupe(raw: Vec<Observation>) -> Vec<Observation> {
    Deduplicator::default().run(raw).0
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn obs(day: u32, symbol: &str, close: Option<f64>) -> Observation {
        Observation {
            date: NaiveDate::from_ymd_opt(2024, 1, day).unwrap(),
            symbol: symbol.into(),
            sector: Some("tech".into()),
            open: Some(10.0),
            high: Some(12.0),
            low: Some(9.0),
            close,
            volume: Some(100),
        }
    }

    #[test]
    fn exact_repeats_collapse() {
        let input = vec![obs(1, "A", Some(10.0)), obs(1, "A", Some(10.0)), obs(2, "A", Some(11.0))];
        let (out, stats) = Deduplicator::default().run(input);
        assert_eq!(out.len(), 2);
        assert_eq!(stats.exact_repeats, 1);
        assert_eq!(stats.conflicting_repeats, 0);
        assert_eq!(stats.removed(), 1);
    }

    #[test]
    fn complete_record_wins_regardless_of_order() {
        let incomplete = obs(1, "A", None);
        let complete = obs(1, "A", Some(10.5));

        let out = dedupe(vec![incomplete.clone(), complete.clone()]);
        assert_eq!(out, vec![complete.clone()]);

        let out = dedupe(vec![complete.clone(), incomplete]);
        assert_eq!(out, vec![complete]);
    }

    #[test]
    fn equally_complete_last_seen_wins() {
        let out = dedupe(vec![obs(1, "A", Some(10.0)), obs(1, "A", Some(11.0))]);
        assert_eq!(out[0].close, Some(11.0));
    }

    #[test]
    fn first_strategy_keeps_earliest() {
        let dedup = Deduplicator::new(DedupPolicy {
            prefer_complete: true,
            keep: KeepStrategy::First,
        });
        let (out, stats) = dedup.run(vec![obs(1, "A", Some(10.0)), obs(1, "A", Some(11.0))]);
        assert_eq!(out[0].close, Some(10.0));
        assert_eq!(stats.conflicting_repeats, 1);
    }

    #[test]
    fn without_completeness_preference_order_decides() {
        let dedup = Deduplicator::new(DedupPolicy {
            prefer_complete: false,
            keep: KeepStrategy::Last,
        });
        let (out, _) = dedup.run(vec![obs(1, "A", Some(10.0)), obs(1, "A", None)]);
        assert_eq!(out[0].close, None);
    }

    #[test]
    fn single_row_group_passes_through() {
        let mut sparse = obs(1, "A", None);
        sparse.sector = None;
        sparse.volume = None;
        let out = dedupe(vec![sparse.clone()]);
        assert_eq!(out, vec![sparse]);
    }

    #[test]
    fn output_sorted_by_symbol_then_date() {
        let out = dedupe(vec![obs(2, "B", Some(1.0)), obs(1, "B", Some(1.0)), obs(3, "A", Some(1.0))]);
        let keys: Vec<(String, u32)> = out
            .iter()
            .map(|o| (o.symbol.clone(), chrono::Datelike::day(&o.date)))
            .collect();
        assert_eq!(
            keys,
            vec![("A".into(), 3), ("B".into(), 1), ("B".into(), 2)]
        );
    }

    #[test]
    fn dedupe_is_idempotent() {
        let input = vec![
            obs(1, "A", None),
            obs(1, "A", Some(10.0)),
            obs(1, "B", Some(20.0)),
            obs(1, "B", Some(20.0)),
        ];
        let once = dedupe(input);
        let twice = dedupe(once.clone());
        assert_eq!(once, twice);
    }
}
