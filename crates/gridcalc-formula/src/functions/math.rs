//! Math functions

use gridcalc_core::{CellError, CellValue};
use rust_decimal::{Decimal, MathematicalOps, RoundingStrategy};

use super::criteria::{criteria_pairs, matching_offsets};
use super::{dense_values, for_each_number, int_arg, number, number_arg, number_arg_or, FunctionResult};
use crate::evaluator::{power, EvaluationContext, Evaluated, RangeView};

/// SUM function
pub fn fn_sum(args: &[Evaluated<'_>], _ctx: &EvaluationContext<'_>) -> FunctionResult {
    let mut sum = Decimal::ZERO;
    for_each_number(args, |n| {
        sum = sum.checked_add(n).ok_or(CellError::Num)?;
        Ok(())
    })?;
    Ok(CellValue::Number(sum))
}

/// PRODUCT function; no numbers at all gives 0
pub fn fn_product(args: &[Evaluated<'_>], _ctx: &EvaluationContext<'_>) -> FunctionResult {
    let mut product: Option<Decimal> = None;
    for_each_number(args, |n| {
        let next = product.unwrap_or(Decimal::ONE).checked_mul(n).ok_or(CellError::Num)?;
        product = Some(next);
        Ok(())
    })?;
    Ok(CellValue::Number(product.unwrap_or(Decimal::ZERO)))
}

/// ABS function
pub fn fn_abs(args: &[Evaluated<'_>], _ctx: &EvaluationContext<'_>) -> FunctionResult {
    Ok(CellValue::Number(number_arg(args, 0)?.abs()))
}

/// Round to `digits` places; negative digits round left of the point
fn round_with(n: Decimal, digits: i64, strategy: RoundingStrategy) -> Option<Decimal> {
    if digits >= 0 {
        return Some(n.round_dp_with_strategy(digits.min(28) as u32, strategy));
    }
    let factor = Decimal::from(10).checked_powi(-digits.max(-28))?;
    n.checked_div(factor)?
        .round_dp_with_strategy(0, strategy)
        .checked_mul(factor)
}

fn round_fn(args: &[Evaluated<'_>], strategy: RoundingStrategy) -> FunctionResult {
    let n = number_arg(args, 0)?;
    let digits = match args.get(1) {
        Some(_) => int_arg(args, 1)?,
        None => 0,
    };
    number(round_with(n, digits, strategy))
}

/// ROUND function, halves away from zero
pub fn fn_round(args: &[Evaluated<'_>], _ctx: &EvaluationContext<'_>) -> FunctionResult {
    round_fn(args, RoundingStrategy::MidpointAwayFromZero)
}

/// ROUNDUP function
pub fn fn_roundup(args: &[Evaluated<'_>], _ctx: &EvaluationContext<'_>) -> FunctionResult {
    round_fn(args, RoundingStrategy::AwayFromZero)
}

/// ROUNDDOWN function
pub fn fn_rounddown(args: &[Evaluated<'_>], _ctx: &EvaluationContext<'_>) -> FunctionResult {
    round_fn(args, RoundingStrategy::ToZero)
}

/// INT function (rounds toward negative infinity)
pub fn fn_int(args: &[Evaluated<'_>], _ctx: &EvaluationContext<'_>) -> FunctionResult {
    Ok(CellValue::Number(number_arg(args, 0)?.floor()))
}

/// TRUNC function
pub fn fn_trunc(args: &[Evaluated<'_>], _ctx: &EvaluationContext<'_>) -> FunctionResult {
    round_fn(args, RoundingStrategy::ToZero)
}

/// MOD function; the result takes the divisor's sign
pub fn fn_mod(args: &[Evaluated<'_>], _ctx: &EvaluationContext<'_>) -> FunctionResult {
    let n = number_arg(args, 0)?;
    let d = number_arg(args, 1)?;
    if d.is_zero() {
        return Err(CellError::Div0);
    }

    let mut r = n.checked_rem(d).ok_or(CellError::Num)?;
    if !r.is_zero() && r.is_sign_negative() != d.is_sign_negative() {
        r += d;
    }
    Ok(CellValue::Number(r))
}

/// POWER function
pub fn fn_power(args: &[Evaluated<'_>], _ctx: &EvaluationContext<'_>) -> FunctionResult {
    Ok(power(number_arg(args, 0)?, number_arg(args, 1)?))
}

/// SQRT function
pub fn fn_sqrt(args: &[Evaluated<'_>], _ctx: &EvaluationContext<'_>) -> FunctionResult {
    let n = number_arg(args, 0)?;
    if n.is_sign_negative() && !n.is_zero() {
        return Err(CellError::Num);
    }
    number(n.sqrt())
}

/// SIGN function
pub fn fn_sign(args: &[Evaluated<'_>], _ctx: &EvaluationContext<'_>) -> FunctionResult {
    let n = number_arg(args, 0)?;
    Ok(CellValue::int(match n.cmp(&Decimal::ZERO) {
        std::cmp::Ordering::Less => -1,
        std::cmp::Ordering::Equal => 0,
        std::cmp::Ordering::Greater => 1,
    }))
}

/// CEILING function
pub fn fn_ceiling(args: &[Evaluated<'_>], _ctx: &EvaluationContext<'_>) -> FunctionResult {
    let n = number_arg(args, 0)?;
    let significance = number_arg_or(args, 1, Decimal::ONE)?;
    if significance.is_zero() {
        return Ok(CellValue::Number(Decimal::ZERO));
    }
    if n.is_sign_positive() && !n.is_zero() && significance.is_sign_negative() {
        return Err(CellError::Num);
    }
    let steps = n.checked_div(significance).ok_or(CellError::Num)?.ceil();
    number(steps.checked_mul(significance))
}

/// FLOOR function
pub fn fn_floor(args: &[Evaluated<'_>], _ctx: &EvaluationContext<'_>) -> FunctionResult {
    let n = number_arg(args, 0)?;
    let significance = number_arg_or(args, 1, Decimal::ONE)?;
    if significance.is_zero() {
        return Err(CellError::Div0);
    }
    if n.is_sign_positive() && !n.is_zero() && significance.is_sign_negative() {
        return Err(CellError::Num);
    }
    let steps = n.checked_div(significance).ok_or(CellError::Num)?.floor();
    number(steps.checked_mul(significance))
}

/// SUMPRODUCT function
///
/// Every argument must have the same shape. Inside ranges anything that is
/// not a number multiplies as 0. Arguments are walked in step, so nothing is
/// buffered.
pub fn fn_sumproduct(args: &[Evaluated<'_>], ctx: &EvaluationContext<'_>) -> FunctionResult {
    let mut shape = None;
    let mut columns: Vec<Box<dyn Iterator<Item = Result<Decimal, CellError>> + '_>> = Vec::with_capacity(args.len());

    for arg in args {
        let dims = match arg {
            Evaluated::Range(view) => (view.rows(), view.cols()),
            Evaluated::Value(_) => (1, 1),
        };
        match shape {
            None => shape = Some(dims),
            Some(expected) if expected != dims => return Err(CellError::Value),
            Some(_) => {}
        }
        match arg {
            Evaluated::Range(view) => columns.push(Box::new(dense_values(view, ctx)?.map(factor))),
            Evaluated::Value(value) => columns.push(Box::new(std::iter::once(factor(value)))),
        }
    }
    if columns.is_empty() {
        return Ok(CellValue::Number(Decimal::ZERO));
    }

    let mut total = Decimal::ZERO;
    'positions: loop {
        let mut product = Decimal::ONE;
        for column in columns.iter_mut() {
            let Some(value) = column.next() else {
                break 'positions;
            };
            product = product.checked_mul(value?).ok_or(CellError::Num)?;
        }
        total = total.checked_add(product).ok_or(CellError::Num)?;
    }
    Ok(CellValue::Number(total))
}

/// One SUMPRODUCT factor
fn factor(value: &CellValue) -> Result<Decimal, CellError> {
    match value {
        CellValue::Number(n) => Ok(*n),
        CellValue::Error(e) => Err(*e),
        _ => Ok(Decimal::ZERO),
    }
}

/// Sum and count of the numbers at `offsets` in `view`
fn sum_at(view: &RangeView<'_>, offsets: &[(u32, u16)]) -> Result<(Decimal, usize), CellError> {
    let mut total = Decimal::ZERO;
    let mut count = 0;
    for &(row, col) in offsets {
        match view.get(row, col) {
            Some(CellValue::Number(n)) => {
                total = total.checked_add(*n).ok_or(CellError::Num)?;
                count += 1;
            }
            Some(CellValue::Error(e)) => return Err(*e),
            _ => {}
        }
    }
    Ok((total, count))
}

/// Sum and count behind SUMIF and AVERAGEIF: `(range, criteria, [values])`
///
/// The optional value range takes the criteria range's shape from its own
/// top-left corner.
pub(crate) fn sum_if(args: &[Evaluated<'_>], ctx: &EvaluationContext<'_>) -> Result<(Decimal, usize), CellError> {
    let pairs = criteria_pairs(&args[..2], 0)?;
    let criteria_view = pairs[0].0;
    let values = match args.get(2) {
        Some(Evaluated::Range(view)) => view.resized(criteria_view.rows(), criteria_view.cols()),
        Some(Evaluated::Value(_)) => return Err(CellError::Value),
        None => criteria_view,
    };
    sum_at(&values, &matching_offsets(&pairs, ctx)?)
}

/// SUMIF function
pub fn fn_sumif(args: &[Evaluated<'_>], ctx: &EvaluationContext<'_>) -> FunctionResult {
    let (sum, _) = sum_if(args, ctx)?;
    Ok(CellValue::Number(sum))
}

/// SUMIFS function: `sum_range, criteria_range1, criteria1, ...`
pub fn fn_sumifs(args: &[Evaluated<'_>], ctx: &EvaluationContext<'_>) -> FunctionResult {
    let values = *args[0].as_range().ok_or(CellError::Value)?;
    let pairs = criteria_pairs(args, 1)?;
    if pairs
        .iter()
        .any(|(view, _)| view.rows() != values.rows() || view.cols() != values.cols())
    {
        return Err(CellError::Value);
    }
    let (sum, _) = sum_at(&values, &matching_offsets(&pairs, ctx)?)?;
    Ok(CellValue::Number(sum))
}

/// EXP function
pub fn fn_exp(args: &[Evaluated<'_>], _ctx: &EvaluationContext<'_>) -> FunctionResult {
    number(number_arg(args, 0)?.checked_exp())
}

/// LN function
pub fn fn_ln(args: &[Evaluated<'_>], _ctx: &EvaluationContext<'_>) -> FunctionResult {
    let n = number_arg(args, 0)?;
    if n <= Decimal::ZERO {
        return Err(CellError::Num);
    }
    number(n.checked_ln())
}

/// LOG10 function
pub fn fn_log10(args: &[Evaluated<'_>], _ctx: &EvaluationContext<'_>) -> FunctionResult {
    let n = number_arg(args, 0)?;
    if n <= Decimal::ZERO {
        return Err(CellError::Num);
    }
    number(n.checked_log10())
}

/// PI function
pub fn fn_pi(_args: &[Evaluated<'_>], _ctx: &EvaluationContext<'_>) -> FunctionResult {
    Ok(CellValue::Number(Decimal::PI))
}

#[cfg(test)]
mod tests {
    use crate::testing::{eval, eval_in, num, sheet};
    use gridcalc_core::{CellError, CellValue};
    use pretty_assertions::assert_eq;

    fn data() -> gridcalc_core::Workbook {
        sheet(&[
            ("A1", CellValue::int(1)),
            ("A2", CellValue::int(2)),
            ("A3", CellValue::int(3)),
            ("A4", CellValue::text("skip")),
            ("B1", CellValue::int(10)),
            ("B2", CellValue::int(20)),
            ("B3", CellValue::int(30)),
            ("C1", CellValue::text("apple")),
            ("C2", CellValue::text("pear")),
            ("C3", CellValue::text("apple pie")),
        ])
    }

    #[test]
    fn test_sum_skips_text_in_ranges() {
        let wb = data();
        assert_eq!(eval_in(&wb, "=SUM(A1:A4)"), CellValue::int(6));
        assert_eq!(eval_in(&wb, "=SUM(A1:A3, 4, TRUE)"), CellValue::int(11));
        assert_eq!(eval_in(&wb, "=SUM(A:A)"), CellValue::int(6));
        assert_eq!(eval_in(&wb, "=SUM(A1, \"x\")"), CellValue::Error(CellError::Value));
    }

    #[test]
    fn test_product() {
        let wb = data();
        assert_eq!(eval_in(&wb, "=PRODUCT(A1:A3, 2)"), CellValue::int(12));
        assert_eq!(eval_in(&wb, "=PRODUCT(D1:D5)"), CellValue::int(0));
    }

    #[test]
    fn test_rounding_family() {
        assert_eq!(eval("=ROUND(2.5)"), CellValue::int(3));
        assert_eq!(eval("=ROUND(-2.5)"), CellValue::int(-3));
        assert_eq!(eval("=ROUND(3.14159, 2)"), num("3.14"));
        assert_eq!(eval("=ROUND(1250, -2)"), CellValue::int(1300));
        assert_eq!(eval("=ROUNDUP(3.21, 1)"), num("3.3"));
        assert_eq!(eval("=ROUNDUP(-3.21, 1)"), num("-3.3"));
        assert_eq!(eval("=ROUNDDOWN(3.29, 1)"), num("3.2"));
        assert_eq!(eval("=TRUNC(-8.9)"), CellValue::int(-8));
        assert_eq!(eval("=INT(-8.9)"), CellValue::int(-9));
    }

    #[test]
    fn test_mod_takes_divisor_sign() {
        assert_eq!(eval("=MOD(10, 3)"), CellValue::int(1));
        assert_eq!(eval("=MOD(-3, 2)"), CellValue::int(1));
        assert_eq!(eval("=MOD(3, -2)"), CellValue::int(-1));
        assert_eq!(eval("=MOD(1, 0)"), CellValue::Error(CellError::Div0));
    }

    #[test]
    fn test_domain_errors() {
        assert_eq!(eval("=SQRT(-1)"), CellValue::Error(CellError::Num));
        assert_eq!(eval("=LN(0)"), CellValue::Error(CellError::Num));
        assert_eq!(eval("=LOG10(-5)"), CellValue::Error(CellError::Num));
        assert_eq!(eval("=POWER(0, -1)"), CellValue::Error(CellError::Div0));
        assert_eq!(eval("=FLOOR(5, 0)"), CellValue::Error(CellError::Div0));
        assert_eq!(eval("=CEILING(5, -1)"), CellValue::Error(CellError::Num));
    }

    #[test]
    fn test_transcendental() {
        assert_eq!(eval("=ROUND(SQRT(16), 10)"), CellValue::int(4));
        assert_eq!(eval("=ROUND(LOG10(1000), 10)"), CellValue::int(3));
        assert_eq!(eval("=ROUND(EXP(1), 6)"), num("2.718282"));
        assert_eq!(eval("=ROUND(LN(EXP(2)), 10)"), CellValue::int(2));
        assert_eq!(eval("=ROUND(PI(), 4)"), num("3.1416"));
        assert_eq!(eval("=POWER(2, 0.5)^2 > 1.99"), CellValue::Boolean(true));
    }

    #[test]
    fn test_ceiling_and_floor() {
        assert_eq!(eval("=CEILING(2.3)"), CellValue::int(3));
        assert_eq!(eval("=CEILING(7, 5)"), CellValue::int(10));
        assert_eq!(eval("=CEILING(-2.5, 2)"), CellValue::int(-2));
        assert_eq!(eval("=FLOOR(7, 5)"), CellValue::int(5));
        assert_eq!(eval("=FLOOR(-2.5, -2)"), CellValue::int(-2));
        assert_eq!(eval("=SIGN(-0.5)"), CellValue::int(-1));
        assert_eq!(eval("=ABS(-4)"), CellValue::int(4));
    }

    #[test]
    fn test_sumproduct() {
        let wb = data();
        assert_eq!(eval_in(&wb, "=SUMPRODUCT(A1:A3, B1:B3)"), CellValue::int(140));
        assert_eq!(eval_in(&wb, "=SUMPRODUCT(A1:A4, B1:B4)"), CellValue::int(140));
        assert_eq!(
            eval_in(&wb, "=SUMPRODUCT(A1:A3, B1:B2)"),
            CellValue::Error(CellError::Value)
        );
        assert_eq!(eval_in(&wb, "=SUMPRODUCT(A:A, B:B)"), CellValue::int(140));
        assert_eq!(eval_in(&wb, "=SUMPRODUCT(A1:A3, 2)"), CellValue::Error(CellError::Value));
    }

    #[test]
    fn test_sumif() {
        let wb = data();
        assert_eq!(eval_in(&wb, "=SUMIF(A1:A3, \">1\")"), CellValue::int(5));
        assert_eq!(eval_in(&wb, "=SUMIF(A1:A3, \">1\", B1:B3)"), CellValue::int(50));
        assert_eq!(eval_in(&wb, "=SUMIF(C1:C3, \"apple*\", B1)"), CellValue::int(40));
        assert_eq!(eval_in(&wb, "=SUMIF(C1:C3, \"APPLE\", B1:B3)"), CellValue::int(10));
    }

    #[test]
    fn test_sumifs() {
        let wb = data();
        assert_eq!(
            eval_in(&wb, "=SUMIFS(B1:B3, C1:C3, \"apple*\", A1:A3, \">=2\")"),
            CellValue::int(30)
        );
        assert_eq!(
            eval_in(&wb, "=SUMIFS(B1:B3, C1:C2, \"apple\")"),
            CellValue::Error(CellError::Value)
        );
        assert_eq!(
            eval_in(&wb, "=SUMIFS(B1:B3, C1:C3)"),
            CellValue::Error(CellError::Value)
        );
    }
}
