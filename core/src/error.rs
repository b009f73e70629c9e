use thiserror::Error;

#[derive(Error, Debug)]
pub enum AnalysisError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Fetch failed for {symbol}: {reason}")]
    Fetch { symbol: String, reason: String },

    #[error("Insufficient data: {0}")]
    InsufficientData(String),

    #[error("Column '{name}' not found")]
    UnknownColumn { name: String },

    #[error("Duplicate column '{name}'")]
    DuplicateColumn { name: String },

    #[error("Shape mismatch: expected {expected} values, got {actual}")]
    ShapeMismatch { expected: usize, actual: usize },

    #[error("Index not strictly increasing at row {row}")]
    UnsortedIndex { row: usize },

    #[error("Invalid date '{value}'")]
    InvalidDate { value: String },

    #[error("Invalid number '{value}' in column '{column}'")]
    InvalidNumber { column: String, value: String },

    #[error("Singular matrix in {context}")]
    SingularMatrix { context: &'static str },

    #[error("Distribution error: {0}")]
    Distribution(String),

    #[error("Stage '{name}' requires {missing}, which no earlier stage produced")]
    MissingInput { name: &'static str, missing: &'static str },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type AnalysisResult<T> = Result<T, AnalysisError>;
