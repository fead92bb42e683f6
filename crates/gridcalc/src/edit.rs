//! Cell edits and how their input text is interpreted

use std::str::FromStr;

use gridcalc_core::{split_sheet_prefix, CellError, CellValue};
use lazy_regex::regex_is_match;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::{EngineError, EngineResult};

/// One user edit: `input` is typed into `sheet!cell`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Edit {
    pub sheet: String,
    pub cell: String,
    pub input: String,
}

impl Edit {
    pub fn new(sheet: impl Into<String>, cell: impl Into<String>, input: impl Into<String>) -> Self {
        Self {
            sheet: sheet.into(),
            cell: cell.into(),
            input: input.into(),
        }
    }

    pub fn location(&self) -> String {
        format!("{}!{}", self.sheet, self.cell)
    }

    pub fn interpret(&self) -> EditInput {
        EditInput::interpret(&self.input)
    }
}

/// Parses `Sheet!A1=value`; the value may itself start with `=`
impl FromStr for Edit {
    type Err = EngineError;

    fn from_str(s: &str) -> EngineResult<Self> {
        let (target, input) = s
            .split_once('=')
            .ok_or_else(|| EngineError::invalid_edit(s, "expected Sheet!A1=value"))?;
        let (sheet, cell) = split_sheet_prefix(target)?;
        let sheet = sheet.ok_or_else(|| EngineError::invalid_edit(target, "missing sheet name"))?;
        Ok(Edit::new(sheet, cell.trim(), input))
    }
}

/// What an edit's input text means
#[derive(Debug, Clone, PartialEq)]
pub enum EditInput {
    /// Formula text including the leading `=`
    Formula(String),
    Literal(CellValue),
    /// Empty input deletes the cell
    Clear,
}

impl EditInput {
    /// Classify raw input the way a spreadsheet does when text is typed in
    ///
    /// # Example
    /// ```
    /// use gridcalc::{CellValue, EditInput};
    ///
    /// assert_eq!(EditInput::interpret("=A1+1"), EditInput::Formula("=A1+1".into()));
    /// assert_eq!(EditInput::interpret("true"), EditInput::Literal(CellValue::Boolean(true)));
    /// assert_eq!(EditInput::interpret("'42"), EditInput::Literal(CellValue::text("42")));
    /// assert_eq!(EditInput::interpret(""), EditInput::Clear);
    /// ```
    pub fn interpret(input: &str) -> Self {
        if input.starts_with('=') {
            return EditInput::Formula(input.to_string());
        }
        if let Some(text) = input.strip_prefix('\'') {
            return EditInput::Literal(CellValue::text(text));
        }

        let trimmed = input.trim();
        if trimmed.is_empty() {
            return EditInput::Clear;
        }
        if trimmed.eq_ignore_ascii_case("TRUE") {
            return EditInput::Literal(CellValue::Boolean(true));
        }
        if trimmed.eq_ignore_ascii_case("FALSE") {
            return EditInput::Literal(CellValue::Boolean(false));
        }
        if let Some(n) = parse_decimal(trimmed) {
            return EditInput::Literal(CellValue::Number(n));
        }
        if let Some(e) = CellError::parse(trimmed) {
            return EditInput::Literal(CellValue::Error(e));
        }
        EditInput::Literal(CellValue::text(input))
    }
}

/// Decimal literal with optional sign and exponent; out-of-range values
/// stay text
fn parse_decimal(s: &str) -> Option<Decimal> {
    if !regex_is_match!(r"^[+-]?(\d+\.?\d*|\.\d+)([eE][+-]?\d+)?$", s) {
        return None;
    }
    let unsigned = s.strip_prefix('+').unwrap_or(s);
    if unsigned.contains(['e', 'E']) {
        Decimal::from_scientific(unsigned).ok()
    } else {
        Decimal::from_str(unsigned).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn literal(input: &str) -> CellValue {
        match EditInput::interpret(input) {
            EditInput::Literal(value) => value,
            other => panic!("expected a literal for {input:?}, got {other:?}"),
        }
    }

    #[test]
    fn test_interpret_numbers() {
        assert_eq!(literal("10"), CellValue::int(10));
        assert_eq!(literal(" -2.5 "), CellValue::Number(Decimal::new(-25, 1)));
        assert_eq!(literal("+.5"), CellValue::Number(Decimal::new(5, 1)));
        assert_eq!(literal("1.5e3"), CellValue::int(1500));
        assert_eq!(literal("1,000"), CellValue::text("1,000"));
        assert_eq!(literal("12abc"), CellValue::text("12abc"));
    }

    #[test]
    fn test_interpret_other_literals() {
        assert_eq!(literal("FALSE"), CellValue::Boolean(false));
        assert_eq!(literal("#n/a"), CellValue::Error(CellError::Na));
        assert_eq!(literal("'=A1"), CellValue::text("=A1"));
        assert_eq!(literal("'TRUE"), CellValue::text("TRUE"));
        assert_eq!(literal("hello world"), CellValue::text("hello world"));
        assert_eq!(EditInput::interpret("   "), EditInput::Clear);
    }

    #[test]
    fn test_parse_assignment() {
        let edit: Edit = "Sheet1!A3==A1+A2".parse().unwrap();
        assert_eq!(edit, Edit::new("Sheet1", "A3", "=A1+A2"));

        let edit: Edit = "'Job Costs'!B2=15".parse().unwrap();
        assert_eq!(edit, Edit::new("Job Costs", "B2", "15"));
        assert_eq!(edit.location(), "Job Costs!B2");

        assert!("A1=5".parse::<Edit>().is_err());
        assert!("Sheet1!A1".parse::<Edit>().is_err());
    }
}
