//! Workbook type - the main document structure

use std::sync::Arc;

use crate::cell::{Cell, CellError, CellKey, CellRange, CellRangeIter, CellValue};
use crate::error::{Error, Result};
use crate::named_range::{NameDefinition, NameScope, NamedRange, NamedRangeCollection};
use crate::settings::CalculationSettings;
use crate::worksheet::Worksheet;
use crate::MAX_SHEET_NAME_LEN;

static EMPTY: CellValue = CellValue::Empty;

/// A workbook: sheets, defined names and calculation settings
///
/// The workbook is a plain value. Every operation takes it explicitly, so two
/// workbooks never share mutable state.
#[derive(Debug, Clone)]
pub struct Workbook {
    worksheets: Vec<Worksheet>,
    names: NamedRangeCollection,
    settings: CalculationSettings,
    version: u64,
}

/// What a defined name resolves to from a given sheet
#[derive(Debug, Clone, PartialEq)]
pub enum NameTarget {
    Range { sheet: usize, range: CellRange },
    Constant(CellValue),
}

impl Workbook {
    /// Create a new workbook with one worksheet named `Sheet1`
    pub fn new() -> Self {
        let mut wb = Self::empty();
        wb.worksheets.push(Worksheet::new("Sheet1"));
        wb
    }

    /// Create an empty workbook with no worksheets
    pub fn empty() -> Self {
        Self {
            worksheets: Vec::new(),
            names: NamedRangeCollection::new(),
            settings: CalculationSettings::default(),
            version: 0,
        }
    }

    pub fn with_settings(mut self, settings: CalculationSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Get the number of worksheets
    pub fn sheet_count(&self) -> usize {
        self.worksheets.len()
    }

    /// Get a worksheet by index
    pub fn worksheet(&self, index: usize) -> Option<&Worksheet> {
        self.worksheets.get(index)
    }

    /// Get a worksheet by name (case-insensitive)
    pub fn worksheet_by_name(&self, name: &str) -> Option<&Worksheet> {
        self.sheet_index(name).and_then(|i| self.worksheets.get(i))
    }

    /// Get the index of a worksheet by name (case-insensitive)
    pub fn sheet_index(&self, name: &str) -> Option<usize> {
        let lower = name.to_lowercase();
        self.worksheets
            .iter()
            .position(|ws| ws.name().to_lowercase() == lower)
    }

    /// Like [`Workbook::sheet_index`] but failing with [`Error::SheetNotFound`]
    pub fn require_sheet(&self, name: &str) -> Result<usize> {
        self.sheet_index(name)
            .ok_or_else(|| Error::SheetNotFound(name.to_string()))
    }

    pub fn sheet_name(&self, index: usize) -> Option<&str> {
        self.worksheets.get(index).map(Worksheet::name)
    }

    /// Iterate over all worksheets
    pub fn worksheets(&self) -> impl Iterator<Item = &Worksheet> {
        self.worksheets.iter()
    }

    /// Add a new worksheet with the given name
    pub fn add_worksheet_with_name(&mut self, name: &str) -> Result<usize> {
        self.validate_sheet_name(name)?;
        let index = self.worksheets.len();
        self.worksheets.push(Worksheet::new(name));
        Ok(index)
    }

    pub fn settings(&self) -> &CalculationSettings {
        &self.settings
    }

    pub fn settings_mut(&mut self) -> &mut CalculationSettings {
        &mut self.settings
    }

    /// Version of the last recalculation pass or literal edit
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Start a new version and return it
    pub fn next_version(&mut self) -> u64 {
        self.version += 1;
        self.version
    }

    // ==================== Cells ====================

    /// Parse `a1` on the named sheet into a key
    pub fn key(&self, sheet: &str, a1: &str) -> Result<CellKey> {
        let sheet = self.require_sheet(sheet)?;
        let addr = crate::CellAddress::parse(a1)?;
        Ok(CellKey::from_address(sheet, addr))
    }

    /// `Sheet!A1` form of a key, quoting the sheet name when needed
    pub fn qualified_address(&self, key: CellKey) -> String {
        let address = key.address();
        match self.sheet_name(key.sheet) {
            Some(name) if needs_quotes(name) => format!("'{}'!{address}", name.replace('\'', "''")),
            Some(name) => format!("{name}!{address}"),
            None => key.to_string(),
        }
    }

    pub fn cell(&self, key: CellKey) -> Option<&Cell> {
        self.worksheets
            .get(key.sheet)
            .and_then(|ws| ws.cell_at(key.row, key.col))
    }

    pub fn cell_mut(&mut self, key: CellKey) -> Option<&mut Cell> {
        self.worksheets
            .get_mut(key.sheet)
            .and_then(|ws| ws.cell_at_mut(key.row, key.col))
    }

    /// Committed value of a cell; absent cells read as `Empty`
    pub fn value(&self, key: CellKey) -> CellValue {
        self.value_ref(key).clone()
    }

    pub fn value_ref(&self, key: CellKey) -> &CellValue {
        self.cell(key).map(|c| &c.value).unwrap_or(&EMPTY)
    }

    fn sheet_mut(&mut self, sheet: usize) -> Result<&mut Worksheet> {
        let count = self.worksheets.len();
        self.worksheets
            .get_mut(sheet)
            .ok_or(Error::SheetOutOfBounds(sheet, count))
    }

    /// Store a literal and commit it as the cell's value
    ///
    /// An `Empty` literal removes the cell. Returns the replaced cell.
    pub fn set_literal(&mut self, key: CellKey, value: CellValue) -> Result<Option<Cell>> {
        self.sheet_mut(key.sheet)?;
        let version = self.next_version();
        let sheet = self.sheet_mut(key.sheet)?;
        if value.is_empty() {
            return Ok(sheet.remove(key.row, key.col));
        }
        Ok(sheet.insert(key.row, key.col, Cell::literal(value, version)))
    }

    /// Store formula text and mark the cell dirty
    ///
    /// The previous committed value is kept so a later commit can tell
    /// whether the value changed.
    pub fn set_formula(&mut self, key: CellKey, text: Arc<str>) -> Result<Option<Cell>> {
        let sheet = self.sheet_mut(key.sheet)?;
        let mut cell = Cell::formula(text);
        if let Some(previous) = sheet.cell_at(key.row, key.col) {
            cell.value = previous.value.clone();
            cell.version = previous.version;
        }
        Ok(sheet.insert(key.row, key.col, cell))
    }

    /// Remove a cell entirely
    pub fn clear(&mut self, key: CellKey) -> Result<Option<Cell>> {
        Ok(self.sheet_mut(key.sheet)?.remove(key.row, key.col))
    }

    /// Flag a formula cell's cached value as stale
    pub fn mark_dirty(&mut self, key: CellKey) {
        if let Some(cell) = self.cell_mut(key) {
            if cell.is_formula() {
                cell.dirty = true;
            }
        }
    }

    /// Lazy row-major values of every position in `range`, `Empty` for holes
    pub fn resolve_range(&self, sheet: usize, range: CellRange) -> Result<RangeValues<'_>> {
        let worksheet = self
            .worksheets
            .get(sheet)
            .ok_or(Error::SheetOutOfBounds(sheet, self.worksheets.len()))?;
        Ok(RangeValues {
            sheet: worksheet,
            positions: range.cells(),
        })
    }

    // ==================== Named Ranges ====================

    /// Define or replace a name
    ///
    /// # Example
    /// ```
    /// use gridcalc_core::{NameScope, Workbook};
    ///
    /// let mut wb = Workbook::new();
    /// wb.define_name("TaxRate", "Sheet1!$B$1", NameScope::Workbook).unwrap();
    /// ```
    pub fn define_name(&mut self, name: &str, refers_to: &str, scope: NameScope) -> Result<Option<NamedRange>> {
        if let NameScope::Sheet(index) = scope {
            if index >= self.worksheets.len() {
                return Err(Error::SheetOutOfBounds(index, self.worksheets.len()));
            }
        }
        let range = NamedRange::new(name, refers_to, scope)?;
        Ok(self.names.define(range))
    }

    pub fn remove_name(&mut self, name: &str, scope: NameScope) -> Result<NamedRange> {
        self.names
            .remove(name, scope)
            .ok_or_else(|| Error::NameNotFound(name.to_string()))
    }

    pub fn names(&self) -> &NamedRangeCollection {
        &self.names
    }

    /// Resolve a name as seen from `scope_sheet`
    ///
    /// Missing names and names whose sheet no longer exists yield `#REF!`.
    pub fn resolve_named_range(&self, name: &str, scope_sheet: usize) -> std::result::Result<NameTarget, CellError> {
        let named = self.names.get(name, scope_sheet).ok_or(CellError::Ref)?;
        match &named.definition {
            NameDefinition::Constant(value) => Ok(NameTarget::Constant(value.clone())),
            NameDefinition::Reference { sheet, range } => {
                let sheet = match (sheet, named.scope) {
                    (Some(sheet_name), _) => self.sheet_index(sheet_name).ok_or(CellError::Ref)?,
                    (None, NameScope::Sheet(index)) => index,
                    (None, NameScope::Workbook) => return Err(CellError::Ref),
                };
                Ok(NameTarget::Range {
                    sheet,
                    range: *range,
                })
            }
        }
    }

    fn validate_sheet_name(&self, name: &str) -> Result<()> {
        if name.is_empty() {
            return Err(Error::InvalidSheetName("Sheet name cannot be empty".into()));
        }
        if name.chars().count() > MAX_SHEET_NAME_LEN {
            return Err(Error::InvalidSheetName(format!(
                "Sheet name too long (max {MAX_SHEET_NAME_LEN} characters)"
            )));
        }

        const INVALID_CHARS: &[char] = &[':', '\\', '/', '?', '*', '[', ']'];
        if let Some(c) = name.chars().find(|c| INVALID_CHARS.contains(c)) {
            return Err(Error::InvalidSheetName(format!("Sheet name cannot contain '{c}'")));
        }
        if name.starts_with('\'') || name.ends_with('\'') {
            return Err(Error::InvalidSheetName(
                "Sheet name cannot start or end with an apostrophe".into(),
            ));
        }

        if self.sheet_index(name).is_some() {
            return Err(Error::DuplicateSheetName(name.into()));
        }
        Ok(())
    }
}

impl Default for Workbook {
    fn default() -> Self {
        Self::new()
    }
}

fn needs_quotes(name: &str) -> bool {
    !name.chars().all(|c| c.is_alphanumeric() || c == '_')
        || name.starts_with(|c: char| c.is_ascii_digit())
}

/// Row-major values of a range, produced on demand
#[derive(Debug, Clone)]
pub struct RangeValues<'a> {
    sheet: &'a Worksheet,
    positions: CellRangeIter,
}

impl<'a> Iterator for RangeValues<'a> {
    type Item = &'a CellValue;

    fn next(&mut self) -> Option<Self::Item> {
        let addr = self.positions.next()?;
        Some(
            self.sheet
                .cell_at(addr.row, addr.col)
                .map(|c| &c.value)
                .unwrap_or(&EMPTY),
        )
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.positions.size_hint()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_new_workbook() {
        let wb = Workbook::new();
        assert_eq!(wb.sheet_count(), 1);
        assert_eq!(wb.worksheet(0).unwrap().name(), "Sheet1");
    }

    #[test]
    fn test_sheet_lookup_is_case_insensitive() {
        let mut wb = Workbook::new();
        let idx = wb.add_worksheet_with_name("Job Costs").unwrap();
        assert_eq!(wb.sheet_index("job costs"), Some(idx));
        assert_eq!(wb.sheet_index("JOB COSTS"), Some(idx));
        assert!(matches!(wb.require_sheet("Missing"), Err(Error::SheetNotFound(_))));
    }

    #[test]
    fn test_duplicate_name() {
        let mut wb = Workbook::new();
        assert!(wb.add_worksheet_with_name("SHEET1").is_err());
        assert!(wb.add_worksheet_with_name("sheet1").is_err());
    }

    #[test]
    fn test_invalid_sheet_name() {
        let mut wb = Workbook::new();
        assert!(wb.add_worksheet_with_name("").is_err());
        assert!(wb.add_worksheet_with_name("Sheet/1").is_err());
        assert!(wb.add_worksheet_with_name("Sheet[1]").is_err());
        assert!(wb.add_worksheet_with_name("'quoted").is_err());
        let long_name = "A".repeat(MAX_SHEET_NAME_LEN + 1);
        assert!(wb.add_worksheet_with_name(&long_name).is_err());
    }

    #[test]
    fn test_literal_and_formula_storage() {
        let mut wb = Workbook::new();
        let a1 = wb.key("Sheet1", "A1").unwrap();
        let a2 = wb.key("Sheet1", "A2").unwrap();

        wb.set_literal(a1, CellValue::int(10)).unwrap();
        assert_eq!(wb.value(a1), CellValue::int(10));
        assert!(!wb.cell(a1).unwrap().dirty);

        wb.set_formula(a2, "=A1*2".into()).unwrap();
        assert!(wb.cell(a2).unwrap().dirty);

        wb.set_literal(a1, CellValue::Empty).unwrap();
        assert!(wb.cell(a1).is_none());
        assert_eq!(wb.value(a1), CellValue::Empty);
    }

    #[test]
    fn test_set_literal_rejects_unknown_sheet() {
        let mut wb = Workbook::new();
        let result = wb.set_literal(CellKey::new(3, 0, 0), CellValue::int(1));
        assert!(matches!(result, Err(Error::SheetOutOfBounds(3, 1))));
    }

    #[test]
    fn test_resolve_range_fills_holes() {
        let mut wb = Workbook::new();
        wb.set_literal(CellKey::new(0, 0, 0), CellValue::int(1)).unwrap();
        wb.set_literal(CellKey::new(0, 2, 0), CellValue::int(3)).unwrap();

        let values: Vec<CellValue> = wb
            .resolve_range(0, CellRange::parse("A1:A3").unwrap())
            .unwrap()
            .cloned()
            .collect();
        assert_eq!(values, vec![CellValue::int(1), CellValue::Empty, CellValue::int(3)]);
    }

    #[test]
    fn test_resolve_named_range() {
        let mut wb = Workbook::new();
        wb.add_worksheet_with_name("Inputs").unwrap();
        wb.define_name("TaxRate", "Inputs!$B$1", NameScope::Workbook).unwrap();
        wb.define_name("Local", "$C$1:$C$3", NameScope::Sheet(0)).unwrap();
        wb.define_name("Ghost", "Nowhere!A1", NameScope::Workbook).unwrap();

        assert_eq!(
            wb.resolve_named_range("taxrate", 0),
            Ok(NameTarget::Range {
                sheet: 1,
                range: CellRange::parse("B1").unwrap()
            })
        );
        assert_eq!(
            wb.resolve_named_range("Local", 0),
            Ok(NameTarget::Range {
                sheet: 0,
                range: CellRange::parse("C1:C3").unwrap()
            })
        );
        assert_eq!(wb.resolve_named_range("Local", 1), Err(CellError::Ref));
        assert_eq!(wb.resolve_named_range("Ghost", 0), Err(CellError::Ref));
        assert_eq!(wb.resolve_named_range("Missing", 0), Err(CellError::Ref));
    }

    #[test]
    fn test_qualified_address() {
        let mut wb = Workbook::new();
        wb.add_worksheet_with_name("Job's Costs").unwrap();
        assert_eq!(wb.qualified_address(CellKey::new(0, 0, 1)), "Sheet1!B1");
        assert_eq!(wb.qualified_address(CellKey::new(1, 2, 0)), "'Job''s Costs'!A3");
    }
}
