//! Statistical functions

use gridcalc_core::{CellError, CellValue};
use rust_decimal::{Decimal, MathematicalOps};

use super::criteria::{criteria_pairs, matching_offsets};
use super::math::sum_if;
use super::{collect_numbers, for_each_number, number, FunctionResult};
use crate::evaluator::{parse_number, EvaluationContext, Evaluated};

fn count(n: usize) -> CellValue {
    CellValue::Number(Decimal::from(n))
}

/// AVERAGE function
pub fn fn_average(args: &[Evaluated<'_>], _ctx: &EvaluationContext<'_>) -> FunctionResult {
    let mut sum = Decimal::ZERO;
    let mut n = 0usize;
    for_each_number(args, |value| {
        sum = sum.checked_add(value).ok_or(CellError::Num)?;
        n += 1;
        Ok(())
    })?;

    if n == 0 {
        return Err(CellError::Div0);
    }
    number(sum.checked_div(Decimal::from(n)))
}

/// AVERAGEIF(range, criteria, [average_range])
pub fn fn_averageif(args: &[Evaluated<'_>], ctx: &EvaluationContext<'_>) -> FunctionResult {
    let (sum, n) = sum_if(args, ctx)?;
    if n == 0 {
        return Err(CellError::Div0);
    }
    number(sum.checked_div(Decimal::from(n)))
}

/// MIN function; 0 when there are no numbers
pub fn fn_min(args: &[Evaluated<'_>], _ctx: &EvaluationContext<'_>) -> FunctionResult {
    let mut min: Option<Decimal> = None;
    for_each_number(args, |n| {
        min = Some(min.map_or(n, |m| m.min(n)));
        Ok(())
    })?;
    Ok(CellValue::Number(min.unwrap_or(Decimal::ZERO)))
}

/// MAX function; 0 when there are no numbers
pub fn fn_max(args: &[Evaluated<'_>], _ctx: &EvaluationContext<'_>) -> FunctionResult {
    let mut max: Option<Decimal> = None;
    for_each_number(args, |n| {
        max = Some(max.map_or(n, |m| m.max(n)));
        Ok(())
    })?;
    Ok(CellValue::Number(max.unwrap_or(Decimal::ZERO)))
}

/// COUNT(value1, [value2], ...) - Counts numbers
///
/// Direct arguments count when they can be read as a number. Inside ranges
/// only stored numbers count. Errors are skipped.
pub fn fn_count(args: &[Evaluated<'_>], _ctx: &EvaluationContext<'_>) -> FunctionResult {
    let mut n = 0;
    for arg in args {
        match arg {
            Evaluated::Value(CellValue::Number(_) | CellValue::Boolean(_)) => n += 1,
            Evaluated::Value(CellValue::Text(s)) if parse_number(s.as_str()).is_some() => n += 1,
            Evaluated::Value(_) => {}
            Evaluated::Range(view) => {
                n += view
                    .populated()
                    .filter(|value| matches!(value, CellValue::Number(_)))
                    .count()
            }
        }
    }
    Ok(count(n))
}

/// COUNTA(value1, [value2], ...) - Counts the number of non-empty values
/// including text, booleans and errors
pub fn fn_counta(args: &[Evaluated<'_>], _ctx: &EvaluationContext<'_>) -> FunctionResult {
    let mut n = 0;
    for arg in args {
        match arg {
            Evaluated::Value(value) => {
                if !value.is_empty() {
                    n += 1;
                }
            }
            Evaluated::Range(view) => n += view.populated().filter(|value| !value.is_empty()).count(),
        }
    }
    Ok(count(n))
}

fn is_blank(value: &CellValue) -> bool {
    match value {
        CellValue::Empty => true,
        CellValue::Text(s) => s.is_empty(),
        _ => false,
    }
}

/// COUNTBLANK(range) - Counts empty cells, including empty text
pub fn fn_countblank(args: &[Evaluated<'_>], _ctx: &EvaluationContext<'_>) -> FunctionResult {
    match &args[0] {
        Evaluated::Range(view) => {
            let filled = view.populated().filter(|value| !is_blank(value)).count() as u64;
            Ok(CellValue::Number(Decimal::from(view.cell_count() - filled)))
        }
        Evaluated::Value(value) => Ok(count(usize::from(is_blank(value)))),
    }
}

/// COUNTIF(range, criteria)
pub fn fn_countif(args: &[Evaluated<'_>], ctx: &EvaluationContext<'_>) -> FunctionResult {
    let pairs = criteria_pairs(args, 0)?;
    Ok(count(matching_offsets(&pairs, ctx)?.len()))
}

/// COUNTIFS(criteria_range1, criteria1, [criteria_range2, criteria2], ...)
pub fn fn_countifs(args: &[Evaluated<'_>], ctx: &EvaluationContext<'_>) -> FunctionResult {
    let pairs = criteria_pairs(args, 0)?;
    Ok(count(matching_offsets(&pairs, ctx)?.len()))
}

/// MEDIAN function
pub fn fn_median(args: &[Evaluated<'_>], _ctx: &EvaluationContext<'_>) -> FunctionResult {
    let mut numbers = collect_numbers(args)?;
    if numbers.is_empty() {
        return Err(CellError::Num);
    }
    numbers.sort_unstable();

    let mid = numbers.len() / 2;
    if numbers.len() % 2 == 1 {
        Ok(CellValue::Number(numbers[mid]))
    } else {
        let sum = numbers[mid - 1].checked_add(numbers[mid]);
        number(sum.and_then(|s| s.checked_div(Decimal::from(2))))
    }
}

/// Sample variance; needs at least two numbers
fn sample_variance(args: &[Evaluated<'_>]) -> Result<Decimal, CellError> {
    let numbers = collect_numbers(args)?;
    if numbers.len() < 2 {
        return Err(CellError::Div0);
    }

    let n = Decimal::from(numbers.len());
    let mut sum = Decimal::ZERO;
    for value in &numbers {
        sum = sum.checked_add(*value).ok_or(CellError::Num)?;
    }
    let mean = sum / n;

    let mut squares = Decimal::ZERO;
    for value in &numbers {
        let deviation = *value - mean;
        let square = deviation.checked_mul(deviation).ok_or(CellError::Num)?;
        squares = squares.checked_add(square).ok_or(CellError::Num)?;
    }
    squares.checked_div(n - Decimal::ONE).ok_or(CellError::Num)
}

/// VAR function (sample variance)
pub fn fn_var(args: &[Evaluated<'_>], _ctx: &EvaluationContext<'_>) -> FunctionResult {
    Ok(CellValue::Number(sample_variance(args)?))
}

/// STDEV function (sample standard deviation)
pub fn fn_stdev(args: &[Evaluated<'_>], _ctx: &EvaluationContext<'_>) -> FunctionResult {
    number(sample_variance(args)?.sqrt())
}
