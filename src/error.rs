//! Error types for decon_eqtl

use thiserror::Error;

/// Main error type for deconvolution operations
#[derive(Error, Debug)]
pub enum DeconError {
    /// Bad run configuration (unknown enumeration mode, invalid option
    /// combination). Raised before any matrix work begins; fatal for the run.
    #[error("Invalid configuration: {reason}")]
    Configuration { reason: String },

    /// Input vectors disagree in sample count. Fatal for the locus; the
    /// message names the inputs that are most likely out of sync.
    #[error("Dimension mismatch: {reason}")]
    DimensionMismatch { reason: String },

    /// A model was requested that was already evicted or never created, or a
    /// phase was invoked out of order. Indicates a usage bug upstream, not a
    /// data problem.
    #[error("Invalid state: {reason}")]
    InvalidState { reason: String },

    /// The design matrix is singular or too ill-conditioned to solve.
    #[error("Singular matrix in {operation}: {details}")]
    SingularMatrix { operation: String, details: String },

    #[error("Invalid cell count matrix: {reason}")]
    InvalidCellCounts { reason: String },

    #[error("Invalid input: {reason}")]
    InvalidInput { reason: String },

    #[error("Empty data: {reason}")]
    EmptyData { reason: String },

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
}

/// Result type alias for deconvolution operations
pub type Result<T> = std::result::Result<T, DeconError>;

impl DeconError {
    /// True for errors that mean "skip this locus" rather than "abort the run".
    pub fn is_data_error(&self) -> bool {
        matches!(
            self,
            DeconError::DimensionMismatch { .. } | DeconError::SingularMatrix { .. }
        )
    }
}
