//! Integration tests for the full core pipeline: CSV → clean → aggregate → Parquet.

use chrono::NaiveDate;
use std::fs;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use stockprep_core::aggregate::aggregate;
use stockprep_core::clean::{clean, dedupe, DedupPolicy, MissingDataPolicy};
use stockprep_core::data::{ArtifactStore, IngestConfig, IngestError, Ingestor, RowErrorKind};
use stockprep_core::domain::Observation;

static TEST_COUNTER: AtomicU64 = AtomicU64::new(0);

fn temp_dir() -> PathBuf {
    let id = TEST_COUNTER.fetch_add(1, Ordering::Relaxed);
    let dir = std::env::temp_dir().join(format!(
        "stockprep_pipeline_{}_{id}",
        std::process::id()
    ));
    let _ = fs::remove_dir_all(&dir);
    fs::create_dir_all(&dir).unwrap();
    dir
}

fn day(d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 1, d).unwrap()
}

const RAW_CSV: &str = "\
Trade Date,Ticker,Sector,Open Price,High,Low,Close Price,Volume,Currency
2024-01-02,aapl,Technology,100,105,99,104,1000,USD
2024-01-02,aapl,Technology,100,105,99,104,1000,USD
01/03/2024,AAPL,,104,106,103,,1200,USD
2024-01-04,AAPL,technology,105,107,104,106,NA,USD
2024-01-02,XOM,Energy,50,51,49,,500,USD
2024-01-03,XOM,Energy,50,52,49,51,600,USD
2024-01-03,XOM,Energy,50,52,49,51.5,,USD
2024-01-02,MSFT,,300,310,295,305,2000,USD
2024-01-03,MSFT,,305,312,300,310,2100,USD
";

#[test]
fn csv_to_artifacts_end_to_end() {
    let ingestor = Ingestor::default();
    let ingested = ingestor.ingest_reader(RAW_CSV.as_bytes()).unwrap();
    assert_eq!(ingested.rows_read, 9);
    assert_eq!(ingested.rows_rejected, 0);
    assert_eq!(ingested.ignored_columns, vec!["currency".to_string()]);

    let out = clean(
        ingested.observations,
        DedupPolicy::default(),
        MissingDataPolicy::default(),
    )
    .unwrap();

    // One exact AAPL repeat; the XOM 01-03 pair differs in close and volume.
    assert_eq!(out.dedup.exact_repeats, 1);
    assert_eq!(out.dedup.conflicting_repeats, 1);

    // XOM's first row has no close to fill from and is dropped.
    assert_eq!(out.resolve.dropped_unfillable_price, 1);
    assert!(out.excluded_symbols.is_empty());

    let ds = &out.dataset;
    assert_eq!(ds.len(), 6);
    assert_eq!(ds.symbols(), vec!["AAPL", "MSFT", "XOM"]);

    let aapl: Vec<_> = ds.records().iter().filter(|r| r.symbol == "AAPL").collect();
    assert_eq!(aapl[1].date, day(3));
    assert_eq!(aapl[1].close, 104.0);
    assert_eq!(aapl[1].sector, "technology");
    assert_eq!(aapl[2].volume, 0);

    let msft = ds.records().iter().find(|r| r.symbol == "MSFT").unwrap();
    assert_eq!(msft.sector, "unknown");

    let xom: Vec<_> = ds.records().iter().filter(|r| r.symbol == "XOM").collect();
    assert_eq!(xom.len(), 1);
    // The later 01-03 row lacks volume, so the complete earlier row wins.
    assert_eq!(xom[0].close, 51.0);
    assert_eq!(xom[0].volume, 600);

    let agg = aggregate(ds);
    // 01-02: AAPL 104, MSFT 305 (XOM dropped)
    assert_eq!(agg.daily_close_on(day(2)), Some(204.5));
    assert!((agg.return_for("AAPL", day(3)).unwrap()).abs() < 1e-12);
    assert_eq!(agg.return_for("XOM", day(3)), None);

    let dir = temp_dir();
    let store = ArtifactStore::new(&dir);
    let manifest = store.publish(ds, &agg).unwrap();
    assert_eq!(manifest.cleaned_rows, 6);
    assert_eq!(manifest.cleaned_hash, ds.content_hash());

    assert_eq!(&store.read_cleaned().unwrap(), ds);
    assert_eq!(store.read_aggregates().unwrap(), agg);

    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn ingest_from_file_and_error_threshold() {
    let dir = temp_dir();
    let path = dir.join("raw.csv");
    let mut content = String::from("date,symbol,sector,open,high,low,close,volume\n");
    content.push_str("2024-01-02,A,tech,1,2,0.5,1.5,10\n");
    content.push_str("not-a-date,A,tech,1,2,0.5,1.5,10\n");
    fs::write(&path, &content).unwrap();

    let strict = Ingestor::new(IngestConfig {
        max_error_rate: 0.10,
        ..IngestConfig::default()
    });
    let err = strict.ingest_csv(&path).unwrap_err();
    assert!(matches!(err, IngestError::ErrorRateExceeded { rejected: 1, total: 2, .. }));

    let lenient = Ingestor::new(IngestConfig {
        max_error_rate: 0.5,
        ..IngestConfig::default()
    });
    let outcome = lenient.ingest_csv(&path).unwrap();
    assert_eq!(outcome.observations.len(), 1);
    assert_eq!(outcome.error_samples.len(), 1);
    assert_eq!(outcome.error_samples[0].line, 3);
    assert!(matches!(outcome.error_samples[0].kind, RowErrorKind::BadDate { .. }));

    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn missing_input_file_is_an_error() {
    let err = Ingestor::default()
        .ingest_csv(&temp_dir().join("absent.csv"))
        .unwrap_err();
    assert!(matches!(err, IngestError::Open { .. }));
}

// ── Documented examples ──────────────────────────────────────────────

fn observation(d: u32, symbol: &str, close: Option<f64>) -> Observation {
    Observation {
        date: day(d),
        symbol: symbol.into(),
        sector: Some("tech".into()),
        open: Some(10.0),
        high: Some(25.0),
        low: Some(5.0),
        close,
        volume: Some(1),
    }
}

fn clean_default(rows: Vec<Observation>) -> stockprep_core::clean::CleanOutcome {
    clean(rows, DedupPolicy::default(), MissingDataPolicy::default()).unwrap()
}

#[test]
fn average_close_of_two_symbols() {
    let out = clean_default(vec![
        observation(1, "A", Some(10.0)),
        observation(1, "B", Some(20.0)),
    ]);
    assert_eq!(aggregate(&out.dataset).daily_close_on(day(1)), Some(15.0));
}

#[test]
fn return_between_two_days() {
    let out = clean_default(vec![
        observation(1, "A", Some(10.0)),
        observation(2, "A", Some(11.0)),
    ]);
    let agg = aggregate(&out.dataset);
    assert!((agg.return_for("A", day(2)).unwrap() - 0.1).abs() < 1e-12);
    assert_eq!(agg.return_for("A", day(1)), None);
}

#[test]
fn leading_missing_close_loses_one_row() {
    let out = clean_default(vec![
        observation(1, "A", None),
        observation(2, "A", Some(11.0)),
        observation(3, "A", Some(12.0)),
    ]);
    assert_eq!(out.dataset.len(), 2);
    assert!(out.dataset.keys().all(|k| k.date != day(1)));
}

#[test]
fn missing_close_mid_series_is_forward_filled() {
    let out = clean_default(vec![
        observation(1, "A", Some(10.0)),
        observation(2, "A", None),
    ]);
    assert_eq!(out.dataset.records()[1].close, 10.0);
}

#[test]
fn complete_duplicate_wins_in_either_order() {
    let incomplete = observation(1, "A", None);
    let complete = observation(1, "A", Some(12.0));
    assert_eq!(dedupe(vec![incomplete.clone(), complete.clone()]), vec![complete.clone()]);
    assert_eq!(dedupe(vec![complete.clone(), incomplete]), vec![complete]);
}
