//! Sparse cell storage
//!
//! Only populated cells are stored, in a row-keyed `BTreeMap` of column-keyed
//! `BTreeMap`s. Sheets with hundreds of thousands of populated cells cost
//! memory proportional to what is populated, and range scans walk only the
//! rows and columns that exist.

use std::collections::BTreeMap;
use std::ops::RangeInclusive;
use std::sync::Arc;

use super::{CellRange, CellValue};

/// What the user entered into a cell
#[derive(Debug, Clone, PartialEq)]
pub enum CellInput {
    /// A literal value, committed as-is
    Literal(CellValue),
    /// Formula text, including the leading `=`
    Formula(Arc<str>),
}

impl CellInput {
    pub fn formula_text(&self) -> Option<&str> {
        match self {
            CellInput::Formula(text) => Some(text),
            CellInput::Literal(_) => None,
        }
    }

    pub fn is_formula(&self) -> bool {
        matches!(self, CellInput::Formula(_))
    }
}

/// A populated cell
///
/// `value` is only meaningful while `dirty` is false. `version` is the
/// recalculation pass that last committed `value`.
#[derive(Debug, Clone, PartialEq)]
pub struct Cell {
    pub input: CellInput,
    pub value: CellValue,
    pub dirty: bool,
    pub version: u64,
}

impl Cell {
    /// A literal cell; its value is committed immediately
    pub fn literal(value: CellValue, version: u64) -> Self {
        Self {
            input: CellInput::Literal(value.clone()),
            value,
            dirty: false,
            version,
        }
    }

    /// A formula cell awaiting evaluation
    pub fn formula(text: Arc<str>) -> Self {
        Self {
            input: CellInput::Formula(text),
            value: CellValue::Empty,
            dirty: true,
            version: 0,
        }
    }

    pub fn is_formula(&self) -> bool {
        self.input.is_formula()
    }

    /// Commit a computed value and clear the dirty flag
    pub fn commit(&mut self, value: CellValue, version: u64) {
        self.value = value;
        self.dirty = false;
        self.version = version;
    }
}

/// Sparse row-major cell map for one worksheet
#[derive(Debug, Default, Clone)]
pub struct CellStorage {
    rows: BTreeMap<u32, BTreeMap<u16, Cell>>,
    formula_count: usize,
}

impl CellStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, row: u32, col: u16) -> Option<&Cell> {
        self.rows.get(&row).and_then(|r| r.get(&col))
    }

    pub fn get_mut(&mut self, row: u32, col: u16) -> Option<&mut Cell> {
        self.rows.get_mut(&row).and_then(|r| r.get_mut(&col))
    }

    /// Insert or replace a cell, returning the previous one
    pub fn insert(&mut self, row: u32, col: u16, cell: Cell) -> Option<Cell> {
        if cell.is_formula() {
            self.formula_count += 1;
        }
        let previous = self.rows.entry(row).or_default().insert(col, cell);
        if previous.as_ref().is_some_and(Cell::is_formula) {
            self.formula_count -= 1;
        }
        previous
    }

    pub fn remove(&mut self, row: u32, col: u16) -> Option<Cell> {
        let row_map = self.rows.get_mut(&row)?;
        let removed = row_map.remove(&col);
        if row_map.is_empty() {
            self.rows.remove(&row);
        }
        if removed.as_ref().is_some_and(Cell::is_formula) {
            self.formula_count -= 1;
        }
        removed
    }

    pub fn cell_count(&self) -> usize {
        self.rows.values().map(BTreeMap::len).sum()
    }

    pub fn formula_count(&self) -> usize {
        self.formula_count
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Bounds of populated cells as (min_row, min_col, max_row, max_col)
    pub fn used_bounds(&self) -> Option<(u32, u16, u32, u16)> {
        let min_row = *self.rows.keys().next()?;
        let max_row = *self.rows.keys().next_back()?;
        let (min_col, max_col) = self.rows.values().fold((u16::MAX, 0), |(lo, hi), cols| {
            let first = cols.keys().next().copied().unwrap_or(lo);
            let last = cols.keys().next_back().copied().unwrap_or(hi);
            (lo.min(first), hi.max(last))
        });
        Some((min_row, min_col, max_row, max_col))
    }

    /// Iterate over all cells in row-major order
    pub fn iter(&self) -> impl Iterator<Item = (u32, u16, &Cell)> {
        self.rows
            .iter()
            .flat_map(|(&row, cols)| cols.iter().map(move |(&col, cell)| (row, col, cell)))
    }

    /// Iterate over the populated cells inside `range`, row-major
    ///
    /// Cost is proportional to the populated rows and columns intersecting the
    /// range, not to the range's area.
    pub fn iter_range(&self, range: CellRange) -> impl Iterator<Item = (u32, u16, &Cell)> {
        let rows: RangeInclusive<u32> = range.start.row..=range.end.row;
        let cols: RangeInclusive<u16> = range.start.col..=range.end.col;
        self.rows.range(rows).flat_map(move |(&row, cells)| {
            cells
                .range(cols.clone())
                .map(move |(&col, cell)| (row, col, cell))
        })
    }
}
