use thiserror::Error;

/// Main error type for densebench
#[derive(Error, Debug)]
pub enum DensebenchError {
    /// Embedding store / run history errors
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// File system I/O errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Encoder endpoint errors
    #[error("Encoder error: {0}")]
    Encoder(String),

    /// Query and document vectors are not comparable
    #[error("Dimension mismatch: expected {expected}, got {got}")]
    Dimension { expected: usize, got: usize },

    /// Malformed dataset files
    #[error("Parse error: {0}")]
    Parse(String),

    /// Relevance judgments that fail validation (negative grades etc.)
    #[error("Invalid qrels: {0}")]
    InvalidQrels(String),

    /// Reference to a document or query id that was never loaded
    #[error("Unknown id: {0}")]
    UnknownId(String),

    /// Same id seen twice where ids must be unique
    #[error("Duplicate id: {0}")]
    DuplicateId(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

/// Convenient Result type using DensebenchError
pub type Result<T> = std::result::Result<T, DensebenchError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = DensebenchError::Config("Test error".to_string());
        assert!(err.to_string().contains("Configuration error"));
        assert!(err.to_string().contains("Test error"));
    }

    #[test]
    fn test_dimension_display() {
        let err = DensebenchError::Dimension { expected: 768, got: 384 };
        assert_eq!(err.to_string(), "Dimension mismatch: expected 768, got 384");
    }

    #[test]
    fn test_error_from_rusqlite() {
        let rusqlite_err = rusqlite::Error::InvalidQuery;
        let err: DensebenchError = rusqlite_err.into();
        assert!(matches!(err, DensebenchError::Database(_)));
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: DensebenchError = io_err.into();
        assert!(matches!(err, DensebenchError::Io(_)));
    }

    #[test]
    fn test_error_from_json() {
        let json_err = serde_json::from_str::<serde_json::Value>("{not json").unwrap_err();
        let err: DensebenchError = json_err.into();
        assert!(matches!(err, DensebenchError::Json(_)));
    }
}
