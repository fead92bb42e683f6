//! Formula error types

use thiserror::Error;

/// Result type for formula operations
pub type FormulaResult<T> = std::result::Result<T, FormulaError>;

/// Formula failures
///
/// Ordinary syntax problems are not errors: they produce a malformed formula
/// that evaluates to `#ERROR!`. `NestingTooDeep` aborts the edit batch that
/// contained the formula. `RangeTooLarge` is raised when a function would
/// walk every position of a huge range; the calling cell gets `#NUM!`.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum FormulaError {
    /// Nesting depth limit exceeded while parsing
    #[error("Formula nesting exceeds {limit} levels at offset {offset}")]
    NestingTooDeep { limit: usize, offset: usize },

    /// A range is too large to walk position by position
    #[error("Range {range} covers {cells} cells (limit {limit})")]
    RangeTooLarge { range: String, cells: u64, limit: u64 },

    /// Registering a function with an invalid definition
    #[error("Invalid function definition for {name}: {reason}")]
    InvalidFunction { name: String, reason: String },
}
