//! # gridcalc-core
//!
//! Core data structures for the gridcalc formula engine.
//!
//! This crate provides the cell model the rest of the workspace computes over:
//! - [`CellValue`] - Closed tagged union of committed values
//! - [`CellAddress`], [`CellRange`] and [`CellKey`] - Cell addressing
//! - [`Workbook`], [`Worksheet`] - Sparse sheets, defined names and settings
//! - [`CalculationSettings`] - Iteration, precision and resource limits
//!
//! ## Example
//!
//! ```rust
//! use gridcalc_core::{CellValue, Workbook};
//!
//! let mut workbook = Workbook::new();
//! let a1 = workbook.key("Sheet1", "A1").unwrap();
//! workbook.set_literal(a1, CellValue::int(42)).unwrap();
//! assert_eq!(workbook.value(a1), CellValue::int(42));
//! ```

pub mod cell;
pub mod error;
pub mod named_range;
pub mod settings;
pub mod workbook;
pub mod worksheet;

pub use cell::{
    split_sheet_prefix, Cell, CellAddress, CellError, CellInput, CellKey, CellRange, CellValue,
    SharedString,
};
pub use error::{Error, Result};
pub use named_range::{NameDefinition, NameScope, NamedRange, NamedRangeCollection};
pub use settings::CalculationSettings;
pub use workbook::{NameTarget, RangeValues, Workbook};
pub use worksheet::Worksheet;

/// Maximum number of rows in a worksheet
pub const MAX_ROWS: u32 = 1_048_576;

/// Maximum number of columns in a worksheet
pub const MAX_COLS: u16 = 16_384;

/// Maximum length of a sheet name
pub const MAX_SHEET_NAME_LEN: usize = 31;
