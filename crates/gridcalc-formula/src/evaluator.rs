//! Formula evaluator
//!
//! Evaluates formula ASTs against the committed values of a [`Workbook`].
//! Evaluation is pure: it reads cells and never writes them. Spreadsheet
//! errors are values, so every path returns a [`CellValue`].

use std::cmp::Ordering;
use std::str::FromStr;

use gridcalc_core::{
    CellError, CellKey, CellRange, CellValue, NameTarget, Workbook, MAX_COLS, MAX_ROWS,
};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, MathematicalOps};

use crate::ast::{BinaryOperator, Expr, SheetTarget, UnaryOperator};
use crate::error::{FormulaError, FormulaResult};
use crate::functions::{ArgKind, Evaluation, FunctionRegistry};
use crate::parser::{FormulaBody, ParsedFormula};

/// Context for formula evaluation
#[derive(Clone, Copy)]
pub struct EvaluationContext<'a> {
    /// Committed cell values
    pub workbook: &'a Workbook,
    pub registry: &'a FunctionRegistry,
    /// Sheet that unqualified references resolve against
    pub sheet: usize,
    /// Cell being evaluated, if any
    pub cell: Option<CellKey>,
    /// Fractional digits used when numbers are rendered as text
    pub scale: u32,
    /// Largest range a function may walk position by position
    pub max_range_cells: u64,
}

impl<'a> EvaluationContext<'a> {
    pub fn new(workbook: &'a Workbook, registry: &'a FunctionRegistry, sheet: usize) -> Self {
        Self {
            workbook,
            registry,
            sheet,
            cell: None,
            scale: workbook.settings().decimal_scale,
            max_range_cells: workbook.settings().max_range_cells,
        }
    }

    /// Context for evaluating the formula stored at `cell`
    pub fn for_cell(workbook: &'a Workbook, registry: &'a FunctionRegistry, cell: CellKey) -> Self {
        Self {
            cell: Some(cell),
            ..Self::new(workbook, registry, cell.sheet)
        }
    }
}

/// A lazy view over a resolved range
///
/// Nothing is materialized: functions pull values on demand, densely with
/// [`RangeView::values`] or sparsely with [`RangeView::populated`].
#[derive(Debug, Clone, Copy)]
pub struct RangeView<'a> {
    workbook: &'a Workbook,
    sheet: usize,
    range: CellRange,
}

impl<'a> RangeView<'a> {
    pub fn new(workbook: &'a Workbook, sheet: usize, range: CellRange) -> Self {
        Self {
            workbook,
            sheet,
            range,
        }
    }

    pub fn sheet(&self) -> usize {
        self.sheet
    }

    pub fn range(&self) -> CellRange {
        self.range
    }

    pub fn rows(&self) -> u32 {
        self.range.row_count()
    }

    pub fn cols(&self) -> u16 {
        self.range.col_count()
    }

    pub fn cell_count(&self) -> u64 {
        self.range.cell_count()
    }

    /// Every position, row-major, `Empty` for holes
    pub fn values(&self) -> impl Iterator<Item = &'a CellValue> + 'a {
        self.workbook
            .resolve_range(self.sheet, self.range)
            .into_iter()
            .flatten()
    }

    /// [`RangeView::values`], refused when the range covers more than `limit` cells
    pub fn dense(&self, limit: u64) -> FormulaResult<impl Iterator<Item = &'a CellValue> + 'a> {
        self.check_size(limit)?;
        Ok(self.values())
    }

    /// [`RangeView::offsets`], refused when the range covers more than `limit` cells
    pub fn dense_offsets(&self, limit: u64) -> FormulaResult<impl Iterator<Item = (u32, u16, &'a CellValue)> + 'a> {
        self.check_size(limit)?;
        Ok(self.offsets())
    }

    fn check_size(&self, limit: u64) -> FormulaResult<()> {
        let cells = self.cell_count();
        if cells > limit {
            return Err(FormulaError::RangeTooLarge {
                range: self.range.to_string(),
                cells,
                limit,
            });
        }
        Ok(())
    }

    /// Stored cells only, row-major
    pub fn populated(&self) -> impl Iterator<Item = &'a CellValue> + 'a {
        let range = self.range;
        self.workbook
            .worksheet(self.sheet)
            .into_iter()
            .flat_map(move |ws| ws.populated(range).map(|(_, _, cell)| &cell.value))
    }

    /// Every position as (row offset, column offset, value)
    pub fn offsets(&self) -> impl Iterator<Item = (u32, u16, &'a CellValue)> + 'a {
        let start = self.range.start;
        self.range
            .cells()
            .zip(self.values())
            .map(move |(addr, value)| (addr.row - start.row, addr.col - start.col, value))
    }

    /// Stored cells as (row offset, column offset, value)
    pub fn populated_offsets(&self) -> impl Iterator<Item = (u32, u16, &'a CellValue)> + 'a {
        let range = self.range;
        self.workbook
            .worksheet(self.sheet)
            .into_iter()
            .flat_map(move |ws| {
                ws.populated(range).map(move |(row, col, cell)| {
                    (row - range.start.row, col - range.start.col, &cell.value)
                })
            })
    }

    /// Same top-left corner with another shape, clipped to the sheet
    pub fn resized(&self, rows: u32, cols: u16) -> Self {
        let start = self.range.start;
        let end_row = (start.row + rows.saturating_sub(1)).min(MAX_ROWS - 1);
        let end_col = (start.col + cols.saturating_sub(1)).min(MAX_COLS - 1);
        Self {
            range: CellRange::from_indices(start.row, start.col, end_row, end_col),
            ..*self
        }
    }

    /// Value at a zero-based offset inside the range
    pub fn get(&self, row: u32, col: u16) -> Option<&'a CellValue> {
        if row >= self.rows() || col >= self.cols() {
            return None;
        }
        let key = CellKey::new(
            self.sheet,
            self.range.start.row + row,
            self.range.start.col + col,
        );
        Some(self.workbook.value_ref(key))
    }

    /// The single cell's value, or `#VALUE!` for a multi-cell range
    pub fn scalar(&self) -> CellValue {
        if self.range.is_single_cell() {
            self.workbook
                .value_ref(CellKey::from_address(self.sheet, self.range.start))
                .clone()
        } else {
            CellValue::Error(CellError::Value)
        }
    }
}

/// An intermediate result: a plain value or a range still to be read
#[derive(Debug, Clone)]
pub enum Evaluated<'a> {
    Value(CellValue),
    Range(RangeView<'a>),
}

impl<'a> Evaluated<'a> {
    /// Collapse to a single value; multi-cell ranges become `#VALUE!`
    pub fn into_scalar(self) -> CellValue {
        match self {
            Evaluated::Value(v) => v,
            Evaluated::Range(view) => view.scalar(),
        }
    }

    pub fn scalar(&self) -> CellValue {
        match self {
            Evaluated::Value(v) => v.clone(),
            Evaluated::Range(view) => view.scalar(),
        }
    }

    /// Error carried by a plain value
    pub fn error(&self) -> Option<CellError> {
        match self {
            Evaluated::Value(v) => v.error(),
            Evaluated::Range(_) => None,
        }
    }

    pub fn as_range(&self) -> Option<&RangeView<'a>> {
        match self {
            Evaluated::Range(view) => Some(view),
            Evaluated::Value(_) => None,
        }
    }
}

impl From<CellValue> for Evaluated<'_> {
    fn from(value: CellValue) -> Self {
        Evaluated::Value(value)
    }
}

/// Evaluate a parsed formula; malformed formulas yield `#ERROR!`
pub fn evaluate_formula(parsed: &ParsedFormula, ctx: &EvaluationContext<'_>) -> CellValue {
    match &parsed.body {
        FormulaBody::Expr(expr) => evaluate(expr, ctx),
        FormulaBody::Malformed(_) => CellValue::Error(CellError::Syntax),
    }
}

/// Evaluate an expression to the value a cell would hold
///
/// A blank result reads as 0, the way a formula pointing at an empty cell
/// displays.
pub fn evaluate(expr: &Expr, ctx: &EvaluationContext<'_>) -> CellValue {
    match evaluate_expr(expr, ctx).into_scalar() {
        CellValue::Empty => CellValue::Number(Decimal::ZERO),
        value => value,
    }
}

/// Evaluate an expression, leaving range results unread
pub fn evaluate_expr<'a>(expr: &Expr, ctx: &EvaluationContext<'a>) -> Evaluated<'a> {
    match expr {
        // === Literals ===
        Expr::Literal(value) => Evaluated::Value(value.clone()),

        // === References ===
        Expr::CellRef(address) => {
            Evaluated::Range(RangeView::new(ctx.workbook, ctx.sheet, CellRange::single(*address)))
        }
        Expr::RangeRef(range) => Evaluated::Range(RangeView::new(ctx.workbook, ctx.sheet, *range)),
        Expr::SheetQualifiedRef { sheet, target } => match ctx.workbook.sheet_index(sheet) {
            Some(index) => {
                let range = match target {
                    SheetTarget::Cell(address) => CellRange::single(*address),
                    SheetTarget::Range(range) => *range,
                };
                Evaluated::Range(RangeView::new(ctx.workbook, index, range))
            }
            None => Evaluated::Value(CellValue::Error(CellError::Ref)),
        },
        Expr::Name(name) => match ctx.workbook.resolve_named_range(name, ctx.sheet) {
            Ok(NameTarget::Range { sheet, range }) => {
                Evaluated::Range(RangeView::new(ctx.workbook, sheet, range))
            }
            Ok(NameTarget::Constant(value)) => Evaluated::Value(value),
            Err(e) => Evaluated::Value(CellValue::Error(e)),
        },

        // === Operators ===
        Expr::BinaryOp { op, left, right } => Evaluated::Value(evaluate_binary_op(*op, left, right, ctx)),
        Expr::UnaryOp { op, operand } => Evaluated::Value(evaluate_unary_op(*op, operand, ctx)),

        // === Functions ===
        Expr::FunctionCall { name, args } => evaluate_function(name, args, ctx),
    }
}

/// Evaluate an expression in a scalar position
pub fn evaluate_scalar(expr: &Expr, ctx: &EvaluationContext<'_>) -> CellValue {
    evaluate_expr(expr, ctx).into_scalar()
}

/// Evaluate a binary operation
///
/// The left operand's error wins and the right operand is never evaluated.
fn evaluate_binary_op(
    op: BinaryOperator,
    left: &Expr,
    right: &Expr,
    ctx: &EvaluationContext<'_>,
) -> CellValue {
    let left = evaluate_scalar(left, ctx);
    if let CellValue::Error(e) = left {
        return CellValue::Error(e);
    }
    let right = evaluate_scalar(right, ctx);
    if let CellValue::Error(e) = right {
        return CellValue::Error(e);
    }

    match op {
        BinaryOperator::Concat => {
            let mut text = match to_text(&left, ctx.scale) {
                Ok(s) => s,
                Err(e) => return CellValue::Error(e),
            };
            match to_text(&right, ctx.scale) {
                Ok(s) => text.push_str(&s),
                Err(e) => return CellValue::Error(e),
            }
            CellValue::text(text)
        }
        op if op.is_comparison() => {
            let ordering = compare_values(&left, &right);
            CellValue::Boolean(match op {
                BinaryOperator::Equal => ordering == Ordering::Equal,
                BinaryOperator::NotEqual => ordering != Ordering::Equal,
                BinaryOperator::LessThan => ordering == Ordering::Less,
                BinaryOperator::LessEqual => ordering != Ordering::Greater,
                BinaryOperator::GreaterThan => ordering == Ordering::Greater,
                _ => ordering != Ordering::Less,
            })
        }
        op => {
            let (l, r) = match (to_number(&left), to_number(&right)) {
                (Ok(l), Ok(r)) => (l, r),
                (Err(e), _) | (_, Err(e)) => return CellValue::Error(e),
            };
            arithmetic(op, l, r)
        }
    }
}

fn arithmetic(op: BinaryOperator, l: Decimal, r: Decimal) -> CellValue {
    let result = match op {
        BinaryOperator::Add => l.checked_add(r),
        BinaryOperator::Subtract => l.checked_sub(r),
        BinaryOperator::Multiply => l.checked_mul(r),
        BinaryOperator::Divide => {
            if r.is_zero() {
                return CellValue::Error(CellError::Div0);
            }
            l.checked_div(r)
        }
        BinaryOperator::Power => return power(l, r),
        _ => return CellValue::Error(CellError::Value),
    };
    number_or_num_error(result)
}

/// `base ^ exponent` in decimal arithmetic
///
/// Integer exponents are exact. A negative base with a fractional exponent,
/// `0^0` and overflow are `#NUM!`; zero to a negative power is `#DIV/0!`.
pub fn power(base: Decimal, exponent: Decimal) -> CellValue {
    if base.is_zero() {
        return match exponent.cmp(&Decimal::ZERO) {
            Ordering::Less => CellValue::Error(CellError::Div0),
            Ordering::Equal => CellValue::Error(CellError::Num),
            Ordering::Greater => CellValue::Number(Decimal::ZERO),
        };
    }
    if exponent.fract().is_zero() {
        if let Some(e) = exponent.to_i64() {
            return number_or_num_error(base.checked_powi(e));
        }
    }
    if base.is_sign_negative() {
        return CellValue::Error(CellError::Num);
    }
    number_or_num_error(base.checked_powd(exponent))
}

/// Map a checked decimal result, treating overflow as `#NUM!`
pub fn number_or_num_error(result: Option<Decimal>) -> CellValue {
    match result {
        Some(n) => CellValue::Number(n),
        None => CellValue::Error(CellError::Num),
    }
}

/// Evaluate a unary operation
fn evaluate_unary_op(op: UnaryOperator, operand: &Expr, ctx: &EvaluationContext<'_>) -> CellValue {
    let value = evaluate_scalar(operand, ctx);
    if let CellValue::Error(e) = value {
        return CellValue::Error(e);
    }

    match op {
        UnaryOperator::Plus => value,
        UnaryOperator::Negate => match to_number(&value) {
            Ok(n) => CellValue::Number(-n),
            Err(e) => CellValue::Error(e),
        },
        UnaryOperator::Percent => match to_number(&value) {
            Ok(n) => number_or_num_error(n.checked_div(Decimal::ONE_HUNDRED)),
            Err(e) => CellValue::Error(e),
        },
    }
}

/// Evaluate a function call through the registry
fn evaluate_function<'a>(name: &str, args: &[Expr], ctx: &EvaluationContext<'a>) -> Evaluated<'a> {
    let Some(def) = ctx.registry.get(name) else {
        return Evaluated::Value(CellValue::Error(CellError::Name));
    };

    if !def.accepts(args.len()) {
        return Evaluated::Value(CellValue::Error(CellError::Value));
    }

    let (implementation, strict) = match def.eval {
        Evaluation::Lazy(implementation) => {
            return implementation(args, ctx).unwrap_or_else(|e| Evaluated::Value(CellValue::Error(e)))
        }
        Evaluation::Strict(implementation) => (implementation, true),
        Evaluation::ErrorAware(implementation) => (implementation, false),
    };

    let mut evaluated = Vec::with_capacity(args.len());
    for arg in args {
        let value = match def.args {
            ArgKind::Range => evaluate_expr(arg, ctx),
            ArgKind::Scalar => Evaluated::Value(evaluate_scalar(arg, ctx)),
        };
        if strict {
            if let Some(e) = value.error() {
                return Evaluated::Value(CellValue::Error(e));
            }
        }
        evaluated.push(value);
    }

    Evaluated::Value(implementation(&evaluated, ctx).unwrap_or_else(CellValue::Error))
}

// === Coercion ===

/// Coerce a value to a number for arithmetic
///
/// Blank is 0, booleans are 1/0, text must parse as a decimal.
pub fn to_number(value: &CellValue) -> Result<Decimal, CellError> {
    match value {
        CellValue::Empty => Ok(Decimal::ZERO),
        CellValue::Number(n) => Ok(*n),
        CellValue::Boolean(b) => Ok(if *b { Decimal::ONE } else { Decimal::ZERO }),
        CellValue::Text(s) => parse_number(s.as_str()).ok_or(CellError::Value),
        CellValue::Error(e) => Err(*e),
    }
}

/// Parse text as a decimal number, accepting exponent notation
pub fn parse_number(text: &str) -> Option<Decimal> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }
    Decimal::from_str(text)
        .or_else(|_| Decimal::from_scientific(text))
        .ok()
}

/// Coerce a value to text for concatenation and text functions
pub fn to_text(value: &CellValue, scale: u32) -> Result<String, CellError> {
    match value {
        CellValue::Empty => Ok(String::new()),
        CellValue::Number(n) => Ok(format_number(*n, scale)),
        CellValue::Text(s) => Ok(s.as_str().to_string()),
        CellValue::Boolean(b) => Ok(if *b { "TRUE" } else { "FALSE" }.to_string()),
        CellValue::Error(e) => Err(*e),
    }
}

/// Render a number without trailing zeros, rounded to `scale` digits
pub fn format_number(n: Decimal, scale: u32) -> String {
    n.round_dp_with_strategy(scale, rust_decimal::RoundingStrategy::MidpointAwayFromZero)
        .normalize()
        .to_string()
}

/// Coerce a value to a boolean for logical functions
pub fn to_bool(value: &CellValue) -> Result<bool, CellError> {
    match value {
        CellValue::Empty => Ok(false),
        CellValue::Boolean(b) => Ok(*b),
        CellValue::Number(n) => Ok(!n.is_zero()),
        CellValue::Text(s) => {
            let s = s.as_str().trim();
            if s.eq_ignore_ascii_case("TRUE") {
                Ok(true)
            } else if s.eq_ignore_ascii_case("FALSE") {
                Ok(false)
            } else {
                Err(CellError::Value)
            }
        }
        CellValue::Error(e) => Err(*e),
    }
}

/// Spreadsheet ordering of two values
///
/// Numbers sort before text, text before booleans. Text compares
/// case-insensitively. A blank compares as the zero value of the other
/// side's type.
pub fn compare_values(left: &CellValue, right: &CellValue) -> Ordering {
    use CellValue::*;

    match (left, right) {
        (Empty, Empty) => Ordering::Equal,
        (Empty, Number(n)) => Decimal::ZERO.cmp(n),
        (Number(n), Empty) => n.cmp(&Decimal::ZERO),
        (Empty, Text(s)) => compare_text("", s.as_str()),
        (Text(s), Empty) => compare_text(s.as_str(), ""),
        (Empty, Boolean(b)) => false.cmp(b),
        (Boolean(b), Empty) => b.cmp(&false),
        (Number(l), Number(r)) => l.cmp(r),
        (Text(l), Text(r)) => compare_text(l.as_str(), r.as_str()),
        (Boolean(l), Boolean(r)) => l.cmp(r),
        (Error(l), Error(r)) => l.type_code().cmp(&r.type_code()),
        _ => type_rank(left).cmp(&type_rank(right)),
    }
}

/// Case-insensitive text ordering
pub fn compare_text(left: &str, right: &str) -> Ordering {
    left.chars()
        .flat_map(char::to_lowercase)
        .cmp(right.chars().flat_map(char::to_lowercase))
}

fn type_rank(value: &CellValue) -> u8 {
    match value {
        CellValue::Empty | CellValue::Number(_) => 0,
        CellValue::Text(_) => 1,
        CellValue::Boolean(_) => 2,
        CellValue::Error(_) => 3,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::{parse, ParseLimits};
    use gridcalc_core::NameScope;
    use pretty_assertions::assert_eq;

    fn num(s: &str) -> CellValue {
        CellValue::Number(Decimal::from_str(s).unwrap())
    }

    fn eval_in(workbook: &Workbook, formula: &str) -> CellValue {
        let registry = FunctionRegistry::builtin();
        let parsed = parse(formula, &ParseLimits::default()).unwrap();
        let ctx = EvaluationContext::new(workbook, &registry, 0);
        evaluate_formula(&parsed, &ctx)
    }

    fn eval(formula: &str) -> CellValue {
        eval_in(&Workbook::new(), formula)
    }

    fn sample() -> Workbook {
        let mut wb = Workbook::new();
        let data = [("A1", CellValue::int(10)), ("A2", CellValue::int(20)), ("B1", CellValue::text("x"))];
        for (a1, value) in data {
            let key = wb.key("Sheet1", a1).unwrap();
            wb.set_literal(key, value).unwrap();
        }
        wb
    }

    #[test]
    fn test_evaluate_arithmetic() {
        assert_eq!(eval("=1+2"), CellValue::int(3));
        assert_eq!(eval("=10-3"), CellValue::int(7));
        assert_eq!(eval("=4*5"), CellValue::int(20));
        assert_eq!(eval("=20/4"), CellValue::int(5));
        assert_eq!(eval("=2^10"), CellValue::int(1024));
    }

    #[test]
    fn test_decimal_addition_is_exact() {
        assert_eq!(eval("=0.1+0.2"), num("0.3"));
    }

    #[test]
    fn test_evaluate_precedence() {
        assert_eq!(eval("=1+2*3"), CellValue::int(7));
        assert_eq!(eval("=(1+2)*3"), CellValue::int(9));
        assert_eq!(eval("=-2^2"), CellValue::int(4));
        assert_eq!(eval("=2^3^2"), CellValue::int(512));
    }

    #[test]
    fn test_evaluate_unary() {
        assert_eq!(eval("=-5"), CellValue::int(-5));
        assert_eq!(eval("=50%"), num("0.5"));
        assert_eq!(eval("=--5"), CellValue::int(5));
    }

    #[test]
    fn test_power_domain() {
        assert_eq!(eval("=2^-1"), num("0.5"));
        assert_eq!(eval("=0^-1"), CellValue::Error(CellError::Div0));
        assert_eq!(eval("=(-8)^0.5"), CellValue::Error(CellError::Num));
        assert_eq!(eval("=0^0"), CellValue::Error(CellError::Num));
    }

    #[test]
    fn test_division_by_zero() {
        assert_eq!(eval("=1/0"), CellValue::Error(CellError::Div0));
    }

    #[test]
    fn test_overflow_is_num_error() {
        assert_eq!(eval("=79228162514264337593543950335*10"), CellValue::Error(CellError::Num));
    }

    #[test]
    fn test_evaluate_comparison() {
        assert_eq!(eval("=1<2"), CellValue::Boolean(true));
        assert_eq!(eval("=5<>5"), CellValue::Boolean(false));
        assert_eq!(eval("=\"abc\"=\"ABC\""), CellValue::Boolean(true));
        assert_eq!(eval("=1<\"a\""), CellValue::Boolean(true));
        assert_eq!(eval("=\"z\"<TRUE"), CellValue::Boolean(true));
    }

    #[test]
    fn test_concat_coerces() {
        assert_eq!(eval("=\"n=\"&1.50"), CellValue::text("n=1.5"));
        assert_eq!(eval("=TRUE&\"\""), CellValue::text("TRUE"));
    }

    #[test]
    fn test_text_that_is_not_a_number_is_value_error() {
        assert_eq!(eval("=\"abc\"+1"), CellValue::Error(CellError::Value));
        assert_eq!(eval("=\"2\"*3"), CellValue::int(6));
    }

    #[test]
    fn test_references_and_blanks() {
        let wb = sample();
        assert_eq!(eval_in(&wb, "=A1+A2"), CellValue::int(30));
        assert_eq!(eval_in(&wb, "=C9"), CellValue::int(0));
        assert_eq!(eval_in(&wb, "=C9&\"!\""), CellValue::text("!"));
        assert_eq!(eval_in(&wb, "=B1+1"), CellValue::Error(CellError::Value));
        assert_eq!(eval_in(&wb, "=A1:A2"), CellValue::Error(CellError::Value));
    }

    #[test]
    fn test_missing_sheet_is_ref_error() {
        assert_eq!(eval("=Nowhere!A1"), CellValue::Error(CellError::Ref));
    }

    #[test]
    fn test_names() {
        let mut wb = sample();
        wb.define_name("Base", "Sheet1!$A$1", NameScope::Workbook).unwrap();
        wb.define_name("Rate", "0.5", NameScope::Workbook).unwrap();
        assert_eq!(eval_in(&wb, "=Base*Rate"), CellValue::int(5));
        assert_eq!(eval_in(&wb, "=Missing+1"), CellValue::Error(CellError::Ref));
    }

    #[test]
    fn test_first_error_wins_left_to_right() {
        assert_eq!(eval("=#N/A+1/0"), CellValue::Error(CellError::Na));
        assert_eq!(eval("=1/0+#N/A"), CellValue::Error(CellError::Div0));
    }

    #[test]
    fn test_unknown_function_and_malformed() {
        assert_eq!(eval("=NOSUCH(1)"), CellValue::Error(CellError::Name));
        assert_eq!(eval("=1+"), CellValue::Error(CellError::Syntax));
    }

    #[test]
    fn test_arity_violation_is_value_error() {
        assert_eq!(eval("=ABS(1,2)"), CellValue::Error(CellError::Value));
        assert_eq!(eval("=ABS()"), CellValue::Error(CellError::Value));
    }

    #[test]
    fn test_range_view_reads_lazily() {
        let wb = sample();
        let view = RangeView::new(&wb, 0, CellRange::parse("A1:B2").unwrap());
        assert_eq!(view.values().count(), 4);
        assert_eq!(view.populated().count(), 3);
        assert_eq!(view.get(1, 0), Some(&CellValue::int(20)));
        assert_eq!(view.get(2, 0), None);
    }

    #[test]
    fn test_range_limit_applies_to_dense_walks_only() {
        let mut wb = sample();
        wb.settings_mut().max_range_cells = 100;
        wb.define_name("Big", "Sheet1!$A$1:$A$1000", NameScope::Workbook).unwrap();

        // Sparse walks ignore the limit
        assert_eq!(eval_in(&wb, "=SUM(A1:A1000)"), CellValue::int(30));
        assert_eq!(eval_in(&wb, "=SUM(Big)"), CellValue::int(30));
        assert_eq!(eval_in(&wb, "=COUNTIF(A:A,\">15\")"), CellValue::int(1));
        assert_eq!(eval_in(&wb, "=VLOOKUP(20,A:B,1,FALSE)"), CellValue::int(20));
        assert_eq!(eval_in(&wb, "=SUMPRODUCT(A1:A100)"), CellValue::int(30));

        for formula in [
            "=SUMPRODUCT(A1:A1000)",
            "=SUMPRODUCT(Big)",
            "=TEXTJOIN(\",\",FALSE,A1:A1000)",
            "=COUNTIF(Big,\"\")",
        ] {
            assert_eq!(eval_in(&wb, formula), CellValue::Error(CellError::Num), "{formula}");
        }
    }

    #[test]
    fn test_omitted_argument_reads_as_blank() {
        let wb = sample();
        assert_eq!(eval_in(&wb, "=SUM(A1:A3,)"), CellValue::int(30));
        assert_eq!(eval("=$"), CellValue::Error(CellError::Syntax));
    }

    #[test]
    fn test_compare_values_blank_matches_type() {
        assert_eq!(compare_values(&CellValue::Empty, &CellValue::int(0)), Ordering::Equal);
        assert_eq!(compare_values(&CellValue::Empty, &CellValue::text("")), Ordering::Equal);
        assert_eq!(compare_values(&CellValue::Empty, &CellValue::Boolean(false)), Ordering::Equal);
    }
}
