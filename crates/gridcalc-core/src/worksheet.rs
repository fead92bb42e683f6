//! Worksheet type

use crate::cell::{Cell, CellAddress, CellRange, CellStorage, CellValue};
use crate::error::Result;

/// A worksheet (single named grid in a workbook)
#[derive(Debug, Clone)]
pub struct Worksheet {
    name: String,
    cells: CellStorage,
}

impl Worksheet {
    /// Create a new, empty worksheet with the given name
    pub fn new<S: Into<String>>(name: S) -> Self {
        Self {
            name: name.into(),
            cells: CellStorage::new(),
        }
    }

    /// Get the sheet name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get a cell by A1 address
    pub fn cell(&self, address: &str) -> Result<Option<&Cell>> {
        let addr = CellAddress::parse(address)?;
        Ok(self.cell_at(addr.row, addr.col))
    }

    pub fn cell_at(&self, row: u32, col: u16) -> Option<&Cell> {
        self.cells.get(row, col)
    }

    pub(crate) fn cell_at_mut(&mut self, row: u32, col: u16) -> Option<&mut Cell> {
        self.cells.get_mut(row, col)
    }

    /// Committed value at a position; absent cells read as `Empty`
    pub fn value_at(&self, row: u32, col: u16) -> CellValue {
        self.cells
            .get(row, col)
            .map(|c| c.value.clone())
            .unwrap_or_default()
    }

    pub(crate) fn insert(&mut self, row: u32, col: u16, cell: Cell) -> Option<Cell> {
        self.cells.insert(row, col, cell)
    }

    pub(crate) fn remove(&mut self, row: u32, col: u16) -> Option<Cell> {
        self.cells.remove(row, col)
    }

    /// Smallest range covering every populated cell
    pub fn used_range(&self) -> Option<CellRange> {
        self.cells
            .used_bounds()
            .map(|(r0, c0, r1, c1)| CellRange::from_indices(r0, c0, r1, c1))
    }

    /// Populated cells inside `range`, row-major, skipping holes
    pub fn populated(&self, range: CellRange) -> impl Iterator<Item = (u32, u16, &Cell)> {
        self.cells.iter_range(range)
    }

    /// All populated cells, row-major
    pub fn cells(&self) -> impl Iterator<Item = (u32, u16, &Cell)> {
        self.cells.iter()
    }

    /// Formula cells with their text
    pub fn formula_cells(&self) -> impl Iterator<Item = (u32, u16, &str)> {
        self.cells
            .iter()
            .filter_map(|(row, col, cell)| cell.input.formula_text().map(|f| (row, col, f)))
    }

    pub fn cell_count(&self) -> usize {
        self.cells.cell_count()
    }

    pub fn formula_count(&self) -> usize {
        self.cells.formula_count()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_absent_cells_read_empty() {
        let sheet = Worksheet::new("Sheet1");
        assert_eq!(sheet.value_at(10, 10), CellValue::Empty);
        assert!(sheet.cell("B2").unwrap().is_none());
        assert!(sheet.cell("not an address").is_err());
    }

    #[test]
    fn test_used_range_and_formula_cells() {
        let mut sheet = Worksheet::new("Data");
        sheet.insert(1, 1, Cell::literal(CellValue::int(1), 1));
        sheet.insert(4, 2, Cell::formula("=B2*2".into()));

        assert_eq!(sheet.used_range().unwrap().to_string(), "B2:C5");
        let formulas: Vec<_> = sheet.formula_cells().collect();
        assert_eq!(formulas, vec![(4, 2, "=B2*2")]);
        assert_eq!(sheet.formula_count(), 1);
        assert_eq!(sheet.cell_count(), 2);
    }
}
