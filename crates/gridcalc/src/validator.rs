//! Golden-case regression checks
//!
//! A golden case is a `(sheet, cell, expectedValue, tolerance)` record captured
//! from a reference spreadsheet. Cases are checked against committed values;
//! failures carry the formula category of the checked cell for triage.
//!
//! ```json
//! [
//!   { "sheet": "Quote", "cell": "B7", "expectedValue": 1234.56 },
//!   { "sheet": "Quote", "cell": "B8", "expectedValue": "Approved" },
//!   { "sheet": "Quote", "cell": "B9", "expectedValue": 0.333, "tolerance": 0.001 }
//! ]
//! ```

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::io::Read;

use gridcalc_core::{CellAddress, CellError, CellKey, CellValue, Workbook};
use gridcalc_formula::{parse, ParseLimits};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::analysis::FormulaCategory;
use crate::edit::EditInput;
use crate::engine::Engine;
use crate::error::EngineResult;
use crate::import::{input_text, WorkbookSource};

/// An expected cell value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GoldenCase {
    pub sheet: String,
    pub cell: String,
    /// Number, boolean, string (error literals like `#N/A` included) or null
    pub expected_value: serde_json::Value,
    /// Absolute tolerance for numbers, overriding the policy
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tolerance: Option<Decimal>,
}

impl GoldenCase {
    pub fn new(sheet: impl Into<String>, cell: impl Into<String>, expected: impl Into<serde_json::Value>) -> Self {
        Self {
            sheet: sheet.into(),
            cell: cell.into(),
            expected_value: expected.into(),
            tolerance: None,
        }
    }

    pub fn with_tolerance(mut self, tolerance: Decimal) -> Self {
        self.tolerance = Some(tolerance);
        self
    }

    pub fn location(&self) -> String {
        format!("{}!{}", self.sheet, self.cell)
    }

    /// The expected value read the way cell input is read
    pub fn expected(&self) -> CellValue {
        match input_text(&self.expected_value).map(|text| EditInput::interpret(&text)) {
            Some(EditInput::Literal(value)) => value,
            Some(EditInput::Formula(text)) => CellValue::text(text),
            Some(EditInput::Clear) | None => CellValue::Empty,
        }
    }
}

/// Read a JSON array of golden cases
pub fn load_cases<R: Read>(reader: R) -> EngineResult<Vec<GoldenCase>> {
    Ok(serde_json::from_reader(reader)?)
}

/// Default absolute tolerances for numeric comparisons
///
/// Text, boolean and error values always compare exactly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TolerancePolicy {
    /// Cells whose formula is categorized [`FormulaCategory::Financial`]
    pub financial: Decimal,
    /// Every other number
    pub numeric: Decimal,
}

impl Default for TolerancePolicy {
    fn default() -> Self {
        Self {
            financial: Decimal::new(1, 2),
            numeric: Decimal::ZERO,
        }
    }
}

impl TolerancePolicy {
    pub fn tolerance(&self, category: FormulaCategory, explicit: Option<Decimal>) -> Decimal {
        match explicit {
            Some(tolerance) => tolerance.abs(),
            None if category == FormulaCategory::Financial => self.financial,
            None => self.numeric,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidationFailure {
    /// `Sheet!A1`
    pub cell: String,
    pub expected: CellValue,
    pub actual: CellValue,
    pub category: FormulaCategory,
    /// The cell was pending recalculation, so `actual` is an old value
    pub stale: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CategoryTally {
    pub passed: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ValidationReport {
    pub passed: usize,
    pub failed: Vec<ValidationFailure>,
    pub by_category: BTreeMap<FormulaCategory, CategoryTally>,
}

impl ValidationReport {
    pub fn total(&self) -> usize {
        self.passed + self.failed.len()
    }

    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }

    pub fn report(&self) -> String {
        let mut out = String::new();
        // Writing to a String cannot fail
        let _ = writeln!(out, "Validation: {} passed, {} failed", self.passed, self.failed.len());
        for failure in &self.failed {
            let _ = writeln!(
                out,
                "  FAIL {} [{}]: expected {}, got {}{}",
                failure.cell,
                failure.category,
                failure.expected,
                failure.actual,
                if failure.stale { " (pending recalculation)" } else { "" }
            );
        }
        if !self.by_category.is_empty() {
            let _ = writeln!(out, "By category:");
            for (category, tally) in &self.by_category {
                let _ = writeln!(out, "  {category:<15} {:>6} passed {:>6} failed", tally.passed, tally.failed);
            }
        }
        out
    }
}

/// Checks committed values against golden cases
#[derive(Debug, Clone, Copy, Default)]
pub struct FormulaValidator {
    policy: TolerancePolicy,
}

impl FormulaValidator {
    pub fn new(policy: TolerancePolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &TolerancePolicy {
        &self.policy
    }

    pub fn validate(&self, workbook: &Workbook, cases: &[GoldenCase]) -> ValidationReport {
        let mut report = ValidationReport::default();

        for case in cases {
            let expected = case.expected();
            let Observed { value: actual, category, stale } = observe(workbook, case);
            let tolerance = self.policy.tolerance(category, case.tolerance);
            let tally = report.by_category.entry(category).or_default();

            if !stale && matches(&expected, &actual, tolerance) {
                report.passed += 1;
                tally.passed += 1;
            } else {
                tracing::debug!(
                    "Golden case {} failed: expected {expected}, got {actual}",
                    case.location()
                );
                tally.failed += 1;
                report.failed.push(ValidationFailure {
                    cell: case.location(),
                    expected,
                    actual,
                    category,
                    stale,
                });
            }
        }

        if !report.is_success() {
            tracing::warn!("{} of {} golden cases failed", report.failed.len(), report.total());
        }
        report
    }

    /// Import `source` into a fresh engine and validate its initial state
    pub fn replay(&self, source: &WorkbookSource, cases: &[GoldenCase]) -> EngineResult<ValidationReport> {
        let (engine, _) = Engine::import(source)?;
        Ok(self.validate(engine.workbook(), cases))
    }
}

/// What a case found at its cell
struct Observed {
    value: CellValue,
    category: FormulaCategory,
    /// Dirty cells hold no valid value
    stale: bool,
}

impl Observed {
    fn settled(value: CellValue, category: FormulaCategory) -> Self {
        Self {
            value,
            category,
            stale: false,
        }
    }
}

/// Committed value and category of the cell a case checks
fn observe(workbook: &Workbook, case: &GoldenCase) -> Observed {
    let (Some(sheet), Ok(address)) = (workbook.sheet_index(&case.sheet), CellAddress::parse(&case.cell)) else {
        return Observed::settled(CellValue::Error(CellError::Ref), FormulaCategory::Other);
    };
    let key = CellKey::from_address(sheet, address);
    let Some(cell) = workbook.cell(key) else {
        return Observed::settled(CellValue::Empty, FormulaCategory::Constant);
    };
    let category = match cell.input.formula_text() {
        Some(text) => parse(text, &ParseLimits::from(workbook.settings()))
            .map(|parsed| FormulaCategory::of(&parsed))
            .unwrap_or(FormulaCategory::Other),
        None => FormulaCategory::Constant,
    };
    Observed {
        value: cell.value.clone(),
        category,
        stale: cell.dirty,
    }
}

fn matches(expected: &CellValue, actual: &CellValue, tolerance: Decimal) -> bool {
    match (expected, actual) {
        (CellValue::Number(e), CellValue::Number(a)) => e.checked_sub(*a).is_some_and(|d| d.abs() <= tolerance),
        _ => expected == actual,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cancel::CancellationToken;
    use crate::edit::Edit;
    use crate::error::EngineError;
    use pretty_assertions::assert_eq;
    use std::str::FromStr;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn source() -> WorkbookSource {
        WorkbookSource::from_json(
            r#"{
                "sheets": [{ "name": "Quote", "cells": {
                    "A1": 100000,
                    "A2": "=PMT(0.05/12,360,-A1)",
                    "A3": "=IF(A1>50000,\"Large\",\"Small\")",
                    "A4": "=A1/3",
                    "A5": "=1/0"
                } }]
            }"#,
        )
        .unwrap()
    }

    #[test]
    fn test_load_cases() {
        let json = r#"[
            { "sheet": "Quote", "cell": "A4", "expectedValue": 33333.33, "tolerance": 0.01 },
            { "sheet": "Quote", "cell": "A3", "expectedValue": "Large" }
        ]"#;
        let cases = load_cases(json.as_bytes()).unwrap();
        assert_eq!(cases.len(), 2);
        assert_eq!(cases[0].tolerance, Some(dec("0.01")));
        assert_eq!(cases[0].expected(), CellValue::Number(dec("33333.33")));
        assert_eq!(cases[1].tolerance, None);
        assert_eq!(cases[1].expected(), CellValue::text("Large"));
    }

    #[test]
    fn test_expected_values() {
        assert_eq!(GoldenCase::new("S", "A1", true).expected(), CellValue::Boolean(true));
        assert_eq!(GoldenCase::new("S", "A1", "#DIV/0!").expected(), CellValue::Error(CellError::Div0));
        assert_eq!(
            GoldenCase::new("S", "A1", serde_json::Value::Null).expected(),
            CellValue::Empty
        );
    }

    #[test]
    fn test_policy() {
        let policy = TolerancePolicy::default();
        assert_eq!(policy.tolerance(FormulaCategory::Financial, None), dec("0.01"));
        assert_eq!(policy.tolerance(FormulaCategory::Math, None), Decimal::ZERO);
        assert_eq!(policy.tolerance(FormulaCategory::Math, Some(dec("-0.5"))), dec("0.5"));

        let configured: TolerancePolicy = serde_json::from_str(r#"{ "financial": "0.005" }"#).unwrap();
        assert_eq!(configured.financial, dec("0.005"));
        assert_eq!(configured.numeric, Decimal::ZERO);
    }

    #[test]
    fn test_replay() {
        let cases = vec![
            // 536.8216... rounds within a cent
            GoldenCase::new("Quote", "A2", 536.82),
            GoldenCase::new("Quote", "A3", "Large"),
            GoldenCase::new("Quote", "A4", 33333.33).with_tolerance(dec("0.01")),
            GoldenCase::new("Quote", "A4", 33333.33),
            GoldenCase::new("Quote", "A5", "#DIV/0!"),
            GoldenCase::new("Quote", "A1", 100000),
            GoldenCase::new("Missing", "A1", 1),
        ];
        let report = FormulaValidator::default().replay(&source(), &cases).unwrap();

        assert_eq!(report.passed, 5);
        assert_eq!(report.total(), 7);
        assert!(!report.is_success());
        let failed: Vec<(&str, FormulaCategory)> = report
            .failed
            .iter()
            .map(|failure| (failure.cell.as_str(), failure.category))
            .collect();
        assert_eq!(
            failed,
            vec![
                ("Quote!A4", FormulaCategory::Arithmetic),
                ("Missing!A1", FormulaCategory::Other)
            ]
        );
        assert_eq!(report.failed[1].actual, CellValue::Error(CellError::Ref));
        assert_eq!(
            report.by_category[&FormulaCategory::Financial],
            CategoryTally { passed: 1, failed: 0 }
        );
        assert_eq!(
            report.by_category[&FormulaCategory::Constant],
            CategoryTally { passed: 1, failed: 0 }
        );
        assert!(report.report().contains("FAIL Quote!A4 [Arithmetic]"));
    }

    #[test]
    fn test_financial_tolerance_is_configurable() {
        let cases = vec![GoldenCase::new("Quote", "A2", 536.8)];
        let strict = FormulaValidator::default().replay(&source(), &cases).unwrap();
        assert_eq!(strict.failed.len(), 1);

        let loose = FormulaValidator::new(TolerancePolicy {
            financial: dec("0.05"),
            ..TolerancePolicy::default()
        })
        .replay(&source(), &cases)
        .unwrap();
        assert!(loose.is_success());
    }

    #[test]
    fn test_pending_cells_never_pass() {
        let cases = vec![GoldenCase::new("Quote", "A2", 536.82), GoldenCase::new("Quote", "A3", "Large")];
        let validator = FormulaValidator::default();
        let (mut engine, _) = Engine::import(&source()).unwrap();
        assert!(validator.validate(engine.workbook(), &cases).is_success());

        // Cancelled before the first level: A2 and A3 keep their old values
        let cancel = CancellationToken::new();
        cancel.cancel();
        let changes = engine
            .calculate_with_cancel(&[Edit::new("Quote", "A1", "80000")], &cancel)
            .unwrap();
        assert!(!changes.completed);
        assert!(matches!(engine.value("Quote", "A2"), Err(EngineError::Stale { .. })));
        assert_eq!(engine.value("Quote", "A1").unwrap(), CellValue::int(80000));

        let report = validator.validate(engine.workbook(), &cases);
        assert_eq!(report.passed, 0);
        assert!(report.failed.iter().all(|failure| failure.stale));
        assert!(report
            .report()
            .contains("FAIL Quote!A3 [Logical]: expected Large, got Large (pending recalculation)"));

        engine.calculate(&[]).unwrap();
        let report = validator.validate(engine.workbook(), &cases);
        assert_eq!(report.passed, 1);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].cell, "Quote!A2");
        assert!(!report.failed[0].stale);
    }
}
