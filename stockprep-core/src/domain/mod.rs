//! Domain types for StockPrep

pub mod observation;

pub use observation::{
    cmp_symbol_date, BoundViolation, CleanRecord, Observation, ObservationKey, UNKNOWN_SECTOR,
};
