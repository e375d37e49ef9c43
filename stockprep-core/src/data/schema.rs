use polars::prelude::*;

/// Version of the persisted artifact schemas. Bump on any column change.
pub const SCHEMA_VERSION: u32 = 1;

/// Declared schema of the cleaned row-level artifact.
pub struct CleanedSchema;

impl CleanedSchema {
    pub fn schema() -> Schema {
        Schema::from_iter(vec![
            Field::new("date".into(), DataType::Date),
            Field::new("symbol".into(), DataType::String),
            Field::new("sector".into(), DataType::String),
            Field::new("open".into(), DataType::Float64),
            Field::new("high".into(), DataType::Float64),
            Field::new("low".into(), DataType::Float64),
            Field::new("close".into(), DataType::Float64),
            Field::new("volume".into(), DataType::UInt64),
            Field::new("validated".into(), DataType::Boolean),
        ])
    }

    pub fn validate(df: &DataFrame) -> Result<(), SchemaError> {
        validate_exact(&Self::schema(), df)
    }
}

/// Declared schema of the aggregate artifact.
///
/// One long table; the `metric` column says which logical table a row belongs to.
pub struct AggregateSchema;

impl AggregateSchema {
    pub const AVG_CLOSE: &'static str = "avg_close";
    pub const SECTOR_VOLUME: &'static str = "sector_volume";
    pub const DAILY_RETURN: &'static str = "daily_return";

    pub fn schema() -> Schema {
        Schema::from_iter(vec![
            Field::new("metric".into(), DataType::String),
            Field::new("date".into(), DataType::Date),
            Field::new("symbol".into(), DataType::String),
            Field::new("sector".into(), DataType::String),
            Field::new("value".into(), DataType::Float64),
            Field::new("volume".into(), DataType::UInt64),
            Field::new("symbol_count".into(), DataType::UInt32),
        ])
    }

    pub fn validate(df: &DataFrame) -> Result<(), SchemaError> {
        validate_exact(&Self::schema(), df)
    }
}

/// Check column names, order, and types. Extra columns are rejected.
fn validate_exact(expected: &Schema, df: &DataFrame) -> Result<(), SchemaError> {
    let actual = df.schema();

    // Check all required columns exist
    for field in expected.iter_fields() {
        if !actual.contains(field.name()) {
            return Err(SchemaError::MissingColumn(field.name().to_string()));
        }
    }

    for name in actual.iter_names() {
        if !expected.contains(name) {
            return Err(SchemaError::UnexpectedColumn(name.to_string()));
        }
    }

    // Check data types match
    for field in expected.iter_fields() {
        let actual_dtype = actual
            .get(field.name())
            .ok_or_else(|| SchemaError::MissingColumn(field.name().to_string()))?;
        if actual_dtype != field.dtype() {
            return Err(SchemaError::TypeMismatch {
                column: field.name().to_string(),
                expected: field.dtype().clone(),
                actual: actual_dtype.clone(),
            });
        }
    }

    let expected_order: Vec<&str> = expected.iter_names().map(|n| n.as_str()).collect();
    let actual_order: Vec<&str> = actual.iter_names().map(|n| n.as_str()).collect();
    if expected_order != actual_order {
        return Err(SchemaError::ColumnOrder {
            expected: expected_order.join(","),
            actual: actual_order.join(","),
        });
    }

    Ok(())
}

#[derive(Debug, thiserror::Error)]
pub enum SchemaError {
    #[error("Missing required column: {0}")]
    MissingColumn(String),

    #[error("Unexpected column: {0}")]
    UnexpectedColumn(String),

    #[error("Type mismatch in column {column}: expected {expected:?}, got {actual:?}")]
    TypeMismatch {
        column: String,
        expected: DataType,
        actual: DataType,
    },

    #[error("Column order mismatch: expected [{expected}], got [{actual}]")]
    ColumnOrder { expected: String, actual: String },

    #[error("Null value in non-nullable column {column} at row {row}")]
    NullValue { column: String, row: usize },

    #[error("Unknown aggregate metric '{0}'")]
    UnknownMetric(String),

    #[error("Unsupported schema version {found} (max supported: {supported})")]
    UnsupportedVersion { found: u32, supported: u32 },
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date_column(days: &[i32]) -> Column {
        Column::new("date".into(), days.to_vec())
            .cast(&DataType::Date)
            .unwrap()
    }

    fn cleaned_frame() -> DataFrame {
        DataFrame::new(vec![
            date_column(&[19724]),
            Column::new("symbol".into(), &["AAPL"]),
            Column::new("sector".into(), &["technology"]),
            Column::new("open".into(), &[100.0]),
            Column::new("high".into(), &[105.0]),
            Column::new("low".into(), &[99.0]),
            Column::new("close".into(), &[103.0]),
            Column::new("volume".into(), &[1_000u64]),
            Column::new("validated".into(), &[true]),
        ])
        .unwrap()
    }

    #[test]
    fn test_schema_has_all_required_columns() {
        let schema = CleanedSchema::schema();
        for name in [
            "date", "symbol", "sector", "open", "high", "low", "close", "volume", "validated",
        ] {
            assert!(schema.contains(name), "missing {name}");
        }
        assert_eq!(AggregateSchema::schema().len(), 7);
    }

    #[test]
    fn test_validate_accepts_valid_dataframe() {
        let result = CleanedSchema::validate(&cleaned_frame());
        if let Err(ref e) = result {
            eprintln!("Validation error: {:?}", e);
        }
        assert!(result.is_ok());
    }

    #[test]
    fn test_validate_rejects_missing_column() {
        let df = cleaned_frame().drop("validated").unwrap();
        let result = CleanedSchema::validate(&df);
        assert!(matches!(result.unwrap_err(), SchemaError::MissingColumn(c) if c == "validated"));
    }

    #[test]
    fn test_validate_rejects_extra_column() {
        let mut df = cleaned_frame();
        df.with_column(Column::new("notes".into(), &["x"])).unwrap();
        let result = CleanedSchema::validate(&df);
        assert!(matches!(result.unwrap_err(), SchemaError::UnexpectedColumn(c) if c == "notes"));
    }

    #[test]
    fn test_validate_rejects_wrong_type() {
        let mut df = cleaned_frame();
        df.with_column(Column::new("volume".into(), &[1_000.0])).unwrap();
        let result = CleanedSchema::validate(&df);
        assert!(matches!(result.unwrap_err(), SchemaError::TypeMismatch { .. }));
    }

    #[test]
    fn test_validate_rejects_reordered_columns() {
        let df = cleaned_frame()
            .select(["symbol", "date", "sector", "open", "high", "low", "close", "volume", "validated"])
            .unwrap();
        let result = CleanedSchema::validate(&df);
        assert!(matches!(result.unwrap_err(), SchemaError::ColumnOrder { .. }));
    }
}
