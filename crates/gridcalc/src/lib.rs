//! # gridcalc
//!
//! A deterministic spreadsheet formula engine with incremental recalculation.
//!
//! gridcalc keeps a workbook of literal and formula cells, tracks which cells
//! read which, and on every edit recalculates exactly the affected formulas
//! in dependency order. All arithmetic is fixed-precision decimal, so the
//! same workbook and edits always produce the same values.
//!
//! ## Features
//!
//! - Formula parsing with a shared parse cache
//! - Dependency graph with aggregate range nodes and cycle detection
//! - Level-by-level recalculation, with wide levels on a worker pool
//! - Cooperative cancellation between levels
//! - Iterative calculation for intentional circular references
//! - Golden-case validation and workbook structure analysis
//!
//! ## Example
//!
//! ```rust
//! use gridcalc::prelude::*;
//!
//! let mut engine = Engine::new(Workbook::new()).unwrap();
//! engine
//!     .calculate(&[
//!         Edit::new("Sheet1", "A1", "0.1"),
//!         Edit::new("Sheet1", "A2", "0.2"),
//!         Edit::new("Sheet1", "A3", "=A1+A2"),
//!     ])
//!     .unwrap();
//! assert_eq!(engine.value("Sheet1", "A3").unwrap().to_string(), "0.3");
//!
//! // Only A3 depends on A1
//! let changes = engine.calculate(&[Edit::new("Sheet1", "A1", "1")]).unwrap();
//! assert_eq!(changes.len(), 2);
//! assert_eq!(changes.value("Sheet1", "A3").unwrap().to_string(), "1.2");
//! ```

pub mod analysis;
pub mod calculation;
pub mod cancel;
pub mod edit;
pub mod engine;
pub mod error;
pub mod executor;
pub mod import;
pub mod prelude;
pub mod validator;

pub use analysis::{FormulaCategory, FormulaInfo, NamedRangeInfo, SheetInfo, WorkbookAnalysis, DEFAULT_MIN_DEPENDENCIES};
pub use calculation::{CalculationStats, CellChange, ChangeSet, NonConvergence};
pub use cancel::CancellationToken;
pub use edit::{Edit, EditInput};
pub use engine::Engine;
pub use error::{EngineError, EngineResult};
pub use executor::{CalculationContext, FormulaExecutor};
pub use import::{NameSource, SheetSource, WorkbookSource};
pub use validator::{
    load_cases, CategoryTally, FormulaValidator, GoldenCase, TolerancePolicy, ValidationFailure, ValidationReport,
};

// Re-export core types
pub use gridcalc_core::{
    CalculationSettings, Cell, CellAddress, CellError, CellInput, CellKey, CellRange, CellValue, Error, NameScope,
    NamedRange, Result, SharedString, Workbook, Worksheet, MAX_COLS, MAX_ROWS, MAX_SHEET_NAME_LEN,
};

// Numbers in cells are fixed-precision decimals
pub use rust_decimal::Decimal;

// Re-export formula types
pub use gridcalc_formula::{
    evaluate, evaluate_formula, parse, ArgKind, CacheStats, DependencyGraph, Evaluated, Evaluation, EvaluationContext, Expr,
    FormulaError, FormulaResult, FunctionDef, FunctionRegistry, FunctionResult, ParseLimits, ParsedFormula, Precedent,
    Reference, Schedule,
};
