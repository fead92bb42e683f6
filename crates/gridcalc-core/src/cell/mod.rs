//! Cell-related types and utilities
//!
//! This module contains:
//! - [`CellValue`] - The committed value of a cell
//! - [`CellAddress`] - A cell's location (e.g., "A1")
//! - [`CellRange`] - A range of cells (e.g., "A1:B10")
//! - [`CellKey`] - A cell's workbook-wide identity
//! - [`Cell`] - Input, cached value, dirty flag and version

mod address;
mod storage;
mod value;

pub use address::{split_sheet_prefix, CellAddress, CellKey, CellRange, CellRangeIter};
pub use storage::{Cell, CellInput, CellStorage};
pub use value::{CellError, CellValue, SharedString};
