//! Evaluate-and-commit step of a recalculation pass

use std::collections::BTreeMap;

use gridcalc_core::{CalculationSettings, CellKey, CellValue, Workbook};
use gridcalc_formula::{evaluate_formula, EvaluationContext, FunctionRegistry, ParsedFormula};

/// Transient state of one recalculation pass
///
/// The evaluation order comes from the dependency schedule, so the context
/// only needs to know what was committed and what it replaced.
#[derive(Debug)]
pub struct CalculationContext<'r> {
    pub registry: &'r FunctionRegistry,
    /// Version stamped on every value committed by this pass
    pub version: u64,
    /// Value each touched cell held before the pass touched it
    baseline: BTreeMap<CellKey, CellValue>,
    /// Formula evaluations performed, iterations included
    pub evaluated: usize,
}

impl<'r> CalculationContext<'r> {
    pub fn new(registry: &'r FunctionRegistry, version: u64) -> Self {
        Self {
            registry,
            version,
            baseline: BTreeMap::new(),
            evaluated: 0,
        }
    }

    /// Remember `previous` as the cell's value before this pass
    ///
    /// Only the first call per cell counts.
    pub fn record(&mut self, key: CellKey, previous: CellValue) {
        self.baseline.entry(key).or_insert(previous);
    }

    /// Cells whose committed value now differs from their baseline, by key
    pub fn changes(&self, workbook: &Workbook) -> Vec<(CellKey, CellValue)> {
        self.baseline
            .iter()
            .filter_map(|(key, before)| {
                let now = workbook.value_ref(*key);
                (now != before).then(|| (*key, now.clone()))
            })
            .collect()
    }
}

/// Computes formula values and writes them into their own cell
pub struct FormulaExecutor;

impl FormulaExecutor {
    /// Value of the formula at `key` against committed state, not written
    pub fn compute(
        workbook: &Workbook,
        registry: &FunctionRegistry,
        key: CellKey,
        parsed: &ParsedFormula,
    ) -> CellValue {
        let ctx = EvaluationContext::for_cell(workbook, registry, key);
        let value = evaluate_formula(parsed, &ctx);
        tracing::trace!("{} = {}", workbook.qualified_address(key), value);
        settle(value, workbook.settings())
    }

    /// Write `value` into the cell at `key`, clearing its dirty flag
    ///
    /// No other cell is touched. Returns whether the committed value changed.
    pub fn commit(workbook: &mut Workbook, key: CellKey, value: CellValue, ctx: &mut CalculationContext<'_>) -> bool {
        let Some(cell) = workbook.cell_mut(key) else {
            return false;
        };
        ctx.record(key, cell.value.clone());
        let changed = cell.value != value;
        cell.commit(value, ctx.version);
        changed
    }

    /// Compute then commit
    pub fn evaluate(
        workbook: &mut Workbook,
        key: CellKey,
        parsed: &ParsedFormula,
        ctx: &mut CalculationContext<'_>,
    ) -> CellValue {
        let value = Self::compute(workbook, ctx.registry, key, parsed);
        ctx.evaluated += 1;
        Self::commit(workbook, key, value.clone(), ctx);
        value
    }
}

/// Round numbers to the committed scale
fn settle(value: CellValue, settings: &CalculationSettings) -> CellValue {
    match value {
        CellValue::Number(n) => CellValue::Number(settings.round(n).normalize()),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gridcalc_core::CellError;
    use gridcalc_formula::{parse, ParseLimits};
    use pretty_assertions::assert_eq;
    use rust_decimal::Decimal;
    use std::str::FromStr;

    #[test]
    fn test_evaluate_commits_only_own_cell() {
        let mut wb = Workbook::new();
        let a1 = wb.key("Sheet1", "A1").unwrap();
        let a2 = wb.key("Sheet1", "A2").unwrap();
        wb.set_literal(a1, CellValue::int(10)).unwrap();
        wb.set_formula(a2, "=A1/4".into()).unwrap();

        let registry = FunctionRegistry::builtin();
        let parsed = parse("=A1/4", &ParseLimits::default()).unwrap();
        let version = wb.next_version();
        let mut ctx = CalculationContext::new(&registry, version);

        let value = FormulaExecutor::evaluate(&mut wb, a2, &parsed, &mut ctx);
        assert_eq!(value, CellValue::Number(Decimal::from_str("2.5").unwrap()));

        let cell = wb.cell(a2).unwrap();
        assert!(!cell.dirty);
        assert_eq!(cell.version, version);
        assert_eq!(wb.value(a1), CellValue::int(10));
        assert_eq!(ctx.changes(&wb), vec![(a2, value)]);
    }

    #[test]
    fn test_results_round_to_scale() {
        let mut wb = Workbook::new();
        wb.settings_mut().decimal_scale = 2;
        let a1 = wb.key("Sheet1", "A1").unwrap();
        wb.set_formula(a1, "=2/3".into()).unwrap();

        let registry = FunctionRegistry::builtin();
        let parsed = parse("=2/3", &ParseLimits::default()).unwrap();
        let value = FormulaExecutor::compute(&wb, &registry, a1, &parsed);
        assert_eq!(value, CellValue::Number(Decimal::from_str("0.67").unwrap()));
    }

    #[test]
    fn test_unchanged_value_is_not_a_change() {
        let mut wb = Workbook::new();
        let a1 = wb.key("Sheet1", "A1").unwrap();
        wb.set_formula(a1, "=1/0".into()).unwrap();

        let registry = FunctionRegistry::builtin();
        let parsed = parse("=1/0", &ParseLimits::default()).unwrap();
        let mut ctx = CalculationContext::new(&registry, 1);
        FormulaExecutor::evaluate(&mut wb, a1, &parsed, &mut ctx);
        assert_eq!(wb.value(a1), CellValue::Error(CellError::Div0));

        let mut again = CalculationContext::new(&registry, 2);
        FormulaExecutor::evaluate(&mut wb, a1, &parsed, &mut again);
        assert!(again.changes(&wb).is_empty());
    }
}
