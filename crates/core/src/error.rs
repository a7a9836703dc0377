//! Error types for boldmetrics

use thiserror::Error;

/// Main error type for boldmetrics operations
#[derive(Error, Debug)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid {what} dimensions: {dims}")]
    InvalidDimensions { what: &'static str, dims: String },

    #[error("Shape mismatch for {what}: expected {expected}, got {actual}")]
    ShapeMismatch {
        what: String,
        expected: String,
        actual: String,
    },

    #[error("Atlas '{atlas}' cannot be conformed to the target geometry: target is {expected}, atlas is {actual}")]
    GeometryMismatch {
        atlas: String,
        expected: String,
        actual: String,
    },

    #[error("Repetition time is not set; frequency cut-offs cannot be mapped to spectral bins")]
    MissingRepetitionTime,

    #[error("Invalid frequency band [{low}, {high}] Hz (Nyquist {nyquist} Hz): {reason}")]
    InvalidBand {
        low: f64,
        high: f64,
        nyquist: f64,
        reason: String,
    },

    #[error("Invalid parameter: {name} = {value} ({reason})")]
    InvalidParameter {
        name: &'static str,
        value: String,
        reason: String,
    },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("{0}")]
    Other(String),
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Config(e.to_string())
    }
}

impl From<ndarray::ShapeError> for Error {
    fn from(e: ndarray::ShapeError) -> Self {
        Error::Other(e.to_string())
    }
}

/// Result type alias for boldmetrics operations
pub type Result<T> = std::result::Result<T, Error>;
