//! Engine error types

use gridcalc_formula::FormulaError;
use thiserror::Error;

/// Result type for engine operations
pub type EngineResult<T> = std::result::Result<T, EngineError>;

/// Structured failure of an engine operation
///
/// Cell-level problems such as `#DIV/0!` are never reported here; they are
/// values in the change-set. An `EngineError` means the operation was
/// refused or aborted and the workbook still holds its last committed state.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Structural workbook failure (unknown sheet, bad address, bad name)
    #[error(transparent)]
    Core(#[from] gridcalc_core::Error),

    /// Fatal formula condition (pathological nesting)
    #[error("{location}: {source}")]
    Formula {
        location: String,
        #[source]
        source: FormulaError,
    },

    /// The cell is still waiting for a recalculation pass
    #[error("{location} is pending recalculation")]
    Stale { location: String },

    /// An edit that cannot be applied
    #[error("Invalid edit for {location}: {reason}")]
    InvalidEdit { location: String, reason: String },

    /// Malformed import or golden-case document
    #[error("Invalid JSON input: {0}")]
    Json(#[from] serde_json::Error),

    /// The worker pool could not be started
    #[error("Failed to build worker pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}

impl EngineError {
    pub(crate) fn invalid_edit(location: impl Into<String>, reason: impl Into<String>) -> Self {
        EngineError::InvalidEdit {
            location: location.into(),
            reason: reason.into(),
        }
    }
}
