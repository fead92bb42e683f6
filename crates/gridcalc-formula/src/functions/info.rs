//! Information functions

use gridcalc_core::{CellError, CellValue};

use super::{arg, FunctionResult};
use crate::evaluator::{EvaluationContext, Evaluated};

/// ISBLANK function
pub fn fn_isblank(args: &[Evaluated<'_>], _ctx: &EvaluationContext<'_>) -> FunctionResult {
    Ok(CellValue::Boolean(arg(args, 0).is_empty()))
}

/// ISNUMBER function
pub fn fn_isnumber(args: &[Evaluated<'_>], _ctx: &EvaluationContext<'_>) -> FunctionResult {
    Ok(CellValue::Boolean(matches!(arg(args, 0), CellValue::Number(_))))
}

/// ISTEXT function
pub fn fn_istext(args: &[Evaluated<'_>], _ctx: &EvaluationContext<'_>) -> FunctionResult {
    Ok(CellValue::Boolean(matches!(arg(args, 0), CellValue::Text(_))))
}

/// ISLOGICAL function
pub fn fn_islogical(args: &[Evaluated<'_>], _ctx: &EvaluationContext<'_>) -> FunctionResult {
    Ok(CellValue::Boolean(matches!(arg(args, 0), CellValue::Boolean(_))))
}

/// ISERROR function
pub fn fn_iserror(args: &[Evaluated<'_>], _ctx: &EvaluationContext<'_>) -> FunctionResult {
    Ok(CellValue::Boolean(arg(args, 0).is_error()))
}

/// ISERR function - any error except `#N/A`
pub fn fn_iserr(args: &[Evaluated<'_>], _ctx: &EvaluationContext<'_>) -> FunctionResult {
    let error = arg(args, 0).error();
    Ok(CellValue::Boolean(error.is_some_and(|e| e != CellError::Na)))
}

/// ISNA function
pub fn fn_isna(args: &[Evaluated<'_>], _ctx: &EvaluationContext<'_>) -> FunctionResult {
    Ok(CellValue::Boolean(arg(args, 0).error() == Some(CellError::Na)))
}

/// NA function
pub fn fn_na(_args: &[Evaluated<'_>], _ctx: &EvaluationContext<'_>) -> FunctionResult {
    Err(CellError::Na)
}

/// ERROR.TYPE function; `#N/A` when the argument is not an error
pub fn fn_error_type(args: &[Evaluated<'_>], _ctx: &EvaluationContext<'_>) -> FunctionResult {
    match arg(args, 0).error() {
        Some(e) => Ok(CellValue::int(i64::from(e.type_code()))),
        None => Err(CellError::Na),
    }
}

#[cfg(test)]
mod tests {
    use crate::testing::{eval, eval_in, sheet};
    use gridcalc_core::{CellError, CellValue};
    use pretty_assertions::assert_eq;

    #[test]
    fn test_type_predicates() {
        let wb = sheet(&[("A1", CellValue::int(1)), ("A2", CellValue::text("t"))]);
        assert_eq!(eval_in(&wb, "=ISNUMBER(A1)"), CellValue::Boolean(true));
        assert_eq!(eval_in(&wb, "=ISTEXT(A2)"), CellValue::Boolean(true));
        assert_eq!(eval_in(&wb, "=ISBLANK(A3)"), CellValue::Boolean(true));
        assert_eq!(eval_in(&wb, "=ISBLANK(A1)"), CellValue::Boolean(false));
        assert_eq!(eval_in(&wb, "=ISLOGICAL(1=1)"), CellValue::Boolean(true));
        assert_eq!(eval_in(&wb, "=ISNUMBER(\"1\")"), CellValue::Boolean(false));
    }

    #[test]
    fn test_error_predicates_see_errors() {
        assert_eq!(eval("=ISERROR(1/0)"), CellValue::Boolean(true));
        assert_eq!(eval("=ISERR(NA())"), CellValue::Boolean(false));
        assert_eq!(eval("=ISERR(1/0)"), CellValue::Boolean(true));
        assert_eq!(eval("=ISNA(NA())"), CellValue::Boolean(true));
        assert_eq!(eval("=ISERROR(1)"), CellValue::Boolean(false));
    }

    #[test]
    fn test_error_type() {
        assert_eq!(eval("=ERROR.TYPE(1/0)"), CellValue::int(2));
        assert_eq!(eval("=ERROR.TYPE(NA())"), CellValue::int(7));
        assert_eq!(eval("=ERROR.TYPE(1)"), CellValue::Error(CellError::Na));
    }
}
