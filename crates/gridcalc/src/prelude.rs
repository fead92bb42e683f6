//! Prelude module - common imports for gridcalc users
//!
//! ```rust
//! use gridcalc::prelude::*;
//! ```

pub use crate::{
    // Results
    CalculationStats,
    CancellationToken,
    CellAddress,
    CellChange,
    CellError,
    CellKey,
    // Cell types
    CellValue,
    ChangeSet,

    // Edits
    Edit,
    EditInput,
    // Engine
    Engine,
    EngineError,
    EngineResult,

    // Analysis and validation
    FormulaCategory,
    FormulaValidator,
    GoldenCase,
    NameScope,
    TolerancePolicy,
    WorkbookAnalysis,
    // Workbook
    CalculationSettings,
    Workbook,
    WorkbookSource,
};
