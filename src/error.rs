use thiserror::Error;

#[derive(Error, Debug)]
pub enum ReconciliationError {
    #[error("Invalid restricted split ratio {0}: must be between 0.0 and 1.0")]
    InvalidSplitRatio(f64),

    #[error("Invalid fiscal periods: {0}")]
    InvalidFiscalPeriods(String),

    #[error("Pivot layout declares no row labels")]
    EmptyPivotRows,

    #[error("Pivot layout declares no column labels")]
    EmptyPivotColumns,

    #[error("Pivot layout declares {axis} label '{label}' more than once")]
    DuplicatePivotLabel { axis: &'static str, label: String },

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, ReconciliationError>;
