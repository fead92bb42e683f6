//! Cell addresses, ranges and keys

use crate::error::{Error, Result};
use crate::{MAX_COLS, MAX_ROWS};
use std::fmt;
use std::str::FromStr;

/// A cell address in A1 notation (`A1`, `$B$2`, `C$3`)
///
/// Rows and columns are 0-based internally. The `$` markers are kept so a
/// formula can be rendered back the way it was written; they do not affect
/// equality of the referenced position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CellAddress {
    pub row: u32,
    pub col: u16,
    pub row_absolute: bool,
    pub col_absolute: bool,
}

impl CellAddress {
    /// Create a relative address
    pub fn new(row: u32, col: u16) -> Self {
        Self::with_absolute(row, col, false, false)
    }

    pub fn with_absolute(row: u32, col: u16, row_absolute: bool, col_absolute: bool) -> Self {
        Self {
            row,
            col,
            row_absolute,
            col_absolute,
        }
    }

    /// Parse an A1-style address
    ///
    /// ```
    /// use gridcalc_core::CellAddress;
    ///
    /// let addr = CellAddress::parse("$B2").unwrap();
    /// assert_eq!((addr.row, addr.col), (1, 1));
    /// assert!(addr.col_absolute && !addr.row_absolute);
    /// ```
    pub fn parse(s: &str) -> Result<Self> {
        let s = s.trim();
        let invalid = |why: &str| Error::InvalidAddress(format!("{why} in '{s}'"));

        let mut rest = s;
        let col_absolute = rest.starts_with('$');
        if col_absolute {
            rest = &rest[1..];
        }

        let letters_len = rest
            .bytes()
            .take_while(|b| b.is_ascii_alphabetic())
            .count();
        if letters_len == 0 {
            return Err(invalid("no column letters"));
        }
        let col = Self::letters_to_column(&rest[..letters_len])?;
        rest = &rest[letters_len..];

        let row_absolute = rest.starts_with('$');
        if row_absolute {
            rest = &rest[1..];
        }
        if rest.is_empty() || !rest.bytes().all(|b| b.is_ascii_digit()) {
            return Err(invalid("no row number"));
        }

        let row: u32 = rest.parse().map_err(|_| invalid("invalid row number"))?;
        if row == 0 {
            return Err(invalid("row number must be >= 1"));
        }
        if row > MAX_ROWS {
            return Err(Error::RowOutOfBounds(row - 1, MAX_ROWS - 1));
        }

        Ok(Self::with_absolute(row - 1, col, row_absolute, col_absolute))
    }

    /// Convert a 0-based column index to letters (0 = A, 26 = AA)
    pub fn column_to_letters(col: u16) -> String {
        let mut letters = Vec::with_capacity(3);
        let mut n = u32::from(col) + 1;
        while n > 0 {
            let rem = (n - 1) % 26;
            letters.push(b'A' + rem as u8);
            n = (n - 1) / 26;
        }
        letters.reverse();
        String::from_utf8(letters).unwrap_or_default()
    }

    /// Convert column letters to a 0-based index (case-insensitive)
    pub fn letters_to_column(letters: &str) -> Result<u16> {
        if letters.is_empty() {
            return Err(Error::InvalidAddress("empty column letters".into()));
        }

        let mut col: u32 = 0;
        for c in letters.chars() {
            if !c.is_ascii_alphabetic() {
                return Err(Error::InvalidAddress(format!("invalid column letter '{c}'")));
            }
            col = col * 26 + (c.to_ascii_uppercase() as u32 - 'A' as u32 + 1);
            if col > u32::from(MAX_COLS) {
                return Err(Error::ColumnOutOfBounds(
                    u16::try_from(col - 1).unwrap_or(u16::MAX),
                    MAX_COLS - 1,
                ));
            }
        }

        Ok((col - 1) as u16)
    }

    /// Format as A1 text, keeping `$` markers
    pub fn to_a1_string(&self) -> String {
        format!(
            "{}{}{}{}",
            if self.col_absolute { "$" } else { "" },
            Self::column_to_letters(self.col),
            if self.row_absolute { "$" } else { "" },
            self.row + 1
        )
    }

    /// Same position without `$` markers
    pub fn relative(&self) -> Self {
        Self::new(self.row, self.col)
    }
}

impl fmt::Display for CellAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_a1_string())
    }
}

impl FromStr for CellAddress {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

/// A rectangular range of cells, normalized so `start` is top-left
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CellRange {
    pub start: CellAddress,
    pub end: CellAddress,
}

impl CellRange {
    /// Create a range from two corners in any order
    pub fn new(a: CellAddress, b: CellAddress) -> Self {
        let (top, bottom) = if a.row <= b.row { (a, b) } else { (b, a) };
        let (left, right) = if a.col <= b.col { (a, b) } else { (b, a) };
        Self {
            start: CellAddress::with_absolute(top.row, left.col, top.row_absolute, left.col_absolute),
            end: CellAddress::with_absolute(
                bottom.row,
                right.col,
                bottom.row_absolute,
                right.col_absolute,
            ),
        }
    }

    pub fn from_indices(start_row: u32, start_col: u16, end_row: u32, end_col: u16) -> Self {
        Self::new(
            CellAddress::new(start_row, start_col),
            CellAddress::new(end_row, end_col),
        )
    }

    pub fn single(addr: CellAddress) -> Self {
        Self {
            start: addr,
            end: addr,
        }
    }

    /// Parse `A1:B10` or a single address
    pub fn parse(s: &str) -> Result<Self> {
        match s.trim().split_once(':') {
            Some((a, b)) => Ok(Self::new(CellAddress::parse(a)?, CellAddress::parse(b)?)),
            None => CellAddress::parse(s).map(Self::single),
        }
    }

    pub fn contains(&self, row: u32, col: u16) -> bool {
        (self.start.row..=self.end.row).contains(&row)
            && (self.start.col..=self.end.col).contains(&col)
    }

    pub fn row_count(&self) -> u32 {
        self.end.row - self.start.row + 1
    }

    pub fn col_count(&self) -> u16 {
        self.end.col - self.start.col + 1
    }

    pub fn cell_count(&self) -> u64 {
        u64::from(self.row_count()) * u64::from(self.col_count())
    }

    pub fn is_single_cell(&self) -> bool {
        self.start.row == self.end.row && self.start.col == self.end.col
    }

    /// Same range without `$` markers, used as an identity key
    pub fn relative(&self) -> Self {
        Self {
            start: self.start.relative(),
            end: self.end.relative(),
        }
    }

    /// Iterate over all addresses, row by row
    pub fn cells(&self) -> CellRangeIter {
        CellRangeIter {
            range: *self,
            row: self.start.row,
            col: self.start.col,
            remaining: self.cell_count(),
        }
    }

    pub fn to_a1_string(&self) -> String {
        if self.start == self.end {
            self.start.to_a1_string()
        } else {
            format!("{}:{}", self.start, self.end)
        }
    }
}

impl fmt::Display for CellRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_a1_string())
    }
}

impl FromStr for CellRange {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

/// Row-major iterator over the addresses of a range
#[derive(Debug, Clone)]
pub struct CellRangeIter {
    range: CellRange,
    row: u32,
    col: u16,
    remaining: u64,
}

impl Iterator for CellRangeIter {
    type Item = CellAddress;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        self.remaining -= 1;

        let addr = CellAddress::new(self.row, self.col);
        if self.col == self.range.end.col {
            self.col = self.range.start.col;
            self.row += 1;
        } else {
            self.col += 1;
        }
        Some(addr)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let n = usize::try_from(self.remaining).unwrap_or(usize::MAX);
        (n, Some(n))
    }
}

/// Workbook-wide identity of a cell
///
/// The derived ordering is (sheet index, row, column), which is the
/// deterministic tie-break used everywhere cells are scheduled or reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CellKey {
    pub sheet: usize,
    pub row: u32,
    pub col: u16,
}

impl CellKey {
    pub fn new(sheet: usize, row: u32, col: u16) -> Self {
        Self { sheet, row, col }
    }

    pub fn from_address(sheet: usize, addr: CellAddress) -> Self {
        Self::new(sheet, addr.row, addr.col)
    }

    pub fn address(&self) -> CellAddress {
        CellAddress::new(self.row, self.col)
    }
}

impl fmt::Display for CellKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}!{}", self.sheet, self.address())
    }
}

/// Split a `Sheet!A1` or `'Sheet Name'!A1:B2` reference into its sheet part
/// and the remainder. Quoted names unescape `''` to `'`.
pub fn split_sheet_prefix(s: &str) -> Result<(Option<String>, &str)> {
    let s = s.trim();
    if let Some(quoted) = s.strip_prefix('\'') {
        let mut name = String::new();
        let mut chars = quoted.char_indices().peekable();
        while let Some((i, c)) = chars.next() {
            if c == '\'' {
                if matches!(chars.peek(), Some((_, '\''))) {
                    name.push('\'');
                    chars.next();
                    continue;
                }
                let rest = &quoted[i + 1..];
                return match rest.strip_prefix('!') {
                    Some(rest) => Ok((Some(name), rest)),
                    None => Err(Error::InvalidRange(format!("expected '!' after sheet in '{s}'"))),
                };
            }
            name.push(c);
        }
        return Err(Error::InvalidRange(format!("unterminated sheet name in '{s}'")));
    }

    match s.rsplit_once('!') {
        Some((sheet, rest)) => Ok((Some(sheet.to_string()), rest)),
        None => Ok((None, s)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_column_letters_roundtrip_edges() {
        assert_eq!(CellAddress::column_to_letters(0), "A");
        assert_eq!(CellAddress::column_to_letters(25), "Z");
        assert_eq!(CellAddress::column_to_letters(26), "AA");
        assert_eq!(CellAddress::column_to_letters(701), "ZZ");
        assert_eq!(CellAddress::column_to_letters(16383), "XFD");
        assert_eq!(CellAddress::letters_to_column("xfd").unwrap(), 16383);
        assert!(CellAddress::letters_to_column("XFE").is_err());
    }

    #[test]
    fn test_cell_address_parse() {
        let addr = CellAddress::parse("A1").unwrap();
        assert_eq!((addr.row, addr.col), (0, 0));
        assert!(!addr.row_absolute && !addr.col_absolute);

        let addr = CellAddress::parse("$A$1").unwrap();
        assert!(addr.row_absolute && addr.col_absolute);

        let addr = CellAddress::parse("A$1").unwrap();
        assert!(addr.row_absolute && !addr.col_absolute);

        let addr = CellAddress::parse("XFD1048576").unwrap();
        assert_eq!((addr.row, addr.col), (1_048_575, 16383));
    }

    #[test]
    fn test_cell_address_parse_errors() {
        for bad in ["", "A", "1", "A0", "A1048577", "XFE1", "A1B"] {
            assert!(CellAddress::parse(bad).is_err(), "{bad} should not parse");
        }
    }

    #[test]
    fn test_absolute_markers_do_not_change_position() {
        let a = CellAddress::parse("$C$3").unwrap();
        let b = CellAddress::parse("C3").unwrap();
        assert_eq!(a.relative(), b);
        assert_eq!(a.to_string(), "$C$3");
    }

    #[test]
    fn test_cell_range_normalizes_corners() {
        let range = CellRange::parse("B3:A1").unwrap();
        assert_eq!(range.to_string(), "A1:B3");
        assert_eq!(range.cell_count(), 6);
        assert!(range.contains(2, 1));
        assert!(!range.contains(3, 0));
    }

    #[test]
    fn test_cell_range_iterator() {
        let cells: Vec<String> = CellRange::parse("A1:B2")
            .unwrap()
            .cells()
            .map(|a| a.to_string())
            .collect();
        assert_eq!(cells, vec!["A1", "B1", "A2", "B2"]);
    }

    #[test]
    fn test_cell_key_ordering() {
        let mut keys = vec![
            CellKey::new(1, 0, 0),
            CellKey::new(0, 2, 0),
            CellKey::new(0, 0, 5),
            CellKey::new(0, 0, 1),
        ];
        keys.sort();
        assert_eq!(
            keys,
            vec![
                CellKey::new(0, 0, 1),
                CellKey::new(0, 0, 5),
                CellKey::new(0, 2, 0),
                CellKey::new(1, 0, 0),
            ]
        );
    }

    #[test]
    fn test_split_sheet_prefix() {
        assert_eq!(split_sheet_prefix("A1").unwrap(), (None, "A1"));
        assert_eq!(
            split_sheet_prefix("Inputs!$B$2").unwrap(),
            (Some("Inputs".to_string()), "$B$2")
        );
        assert_eq!(
            split_sheet_prefix("'Job''s Costs'!A1:B4").unwrap(),
            (Some("Job's Costs".to_string()), "A1:B4")
        );
        assert!(split_sheet_prefix("'Open!A1").is_err());
    }
}
