//! Helpers for unit tests that evaluate formula text

use std::str::FromStr;

use gridcalc_core::{CellValue, Workbook};
use rust_decimal::Decimal;

use crate::evaluator::{evaluate_formula, EvaluationContext};
use crate::functions::FunctionRegistry;
use crate::parser::{parse, ParseLimits};

pub(crate) fn num(s: &str) -> CellValue {
    CellValue::Number(Decimal::from_str(s).unwrap())
}

/// Workbook whose `Sheet1` holds the given literals
pub(crate) fn sheet(cells: &[(&str, CellValue)]) -> Workbook {
    let mut wb = Workbook::new();
    for (a1, value) in cells {
        let key = wb.key("Sheet1", a1).unwrap();
        wb.set_literal(key, value.clone()).unwrap();
    }
    wb
}

pub(crate) fn eval_in(workbook: &Workbook, formula: &str) -> CellValue {
    let registry = FunctionRegistry::builtin();
    let parsed = parse(formula, &ParseLimits::default()).unwrap();
    let ctx = EvaluationContext::new(workbook, &registry, 0);
    evaluate_formula(&parsed, &ctx)
}

pub(crate) fn eval(formula: &str) -> CellValue {
    eval_in(&Workbook::new(), formula)
}
