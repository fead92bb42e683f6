//! Logical functions
//!
//! IF, IFS, IFERROR and IFNA evaluate only the branch they return, so a
//! branch that is not taken can hold an error without affecting the result.

use gridcalc_core::{CellError, CellValue};

use super::{bool_arg, FunctionResult};
use crate::ast::Expr;
use crate::evaluator::{evaluate_expr, evaluate_scalar, to_bool, EvaluationContext, Evaluated};

fn condition(expr: &Expr, ctx: &EvaluationContext<'_>) -> Result<bool, CellError> {
    to_bool(&evaluate_scalar(expr, ctx))
}

/// IF function
pub fn fn_if<'a>(args: &[Expr], ctx: &EvaluationContext<'a>) -> Result<Evaluated<'a>, CellError> {
    if condition(&args[0], ctx)? {
        Ok(evaluate_expr(&args[1], ctx))
    } else {
        match args.get(2) {
            Some(expr) => Ok(evaluate_expr(expr, ctx)),
            None => Ok(CellValue::Boolean(false).into()),
        }
    }
}

/// IFS(condition1, value1, [condition2, value2], ...) - first true condition wins
pub fn fn_ifs<'a>(args: &[Expr], ctx: &EvaluationContext<'a>) -> Result<Evaluated<'a>, CellError> {
    if args.len() % 2 != 0 {
        return Err(CellError::Value);
    }

    for pair in args.chunks(2) {
        if condition(&pair[0], ctx)? {
            return Ok(evaluate_expr(&pair[1], ctx));
        }
    }

    Err(CellError::Na)
}

/// Feed every logical value in `arg` to `visit`
///
/// Plain values are coerced; inside ranges only booleans and numbers count.
/// Returns whether anything was visited.
fn for_each_logical(arg: &Evaluated<'_>, visit: &mut impl FnMut(bool)) -> Result<bool, CellError> {
    match arg {
        Evaluated::Value(CellValue::Empty) => Ok(false),
        Evaluated::Value(value) => {
            visit(to_bool(value)?);
            Ok(true)
        }
        Evaluated::Range(view) => {
            let mut seen = false;
            for value in view.populated() {
                match value {
                    CellValue::Boolean(b) => visit(*b),
                    CellValue::Number(n) => visit(!n.is_zero()),
                    CellValue::Error(e) => return Err(*e),
                    _ => continue,
                }
                seen = true;
            }
            Ok(seen)
        }
    }
}

/// Count true and total logical values over expression arguments
fn tally(args: &[Expr], ctx: &EvaluationContext<'_>) -> Result<(usize, usize), CellError> {
    let mut trues = 0;
    let mut total = 0;
    let mut any = false;
    for expr in args {
        any |= for_each_logical(&evaluate_expr(expr, ctx), &mut |b| {
            total += 1;
            trues += usize::from(b);
        })?;
    }
    if !any {
        return Err(CellError::Value);
    }
    Ok((trues, total))
}

/// AND function; the first error among the arguments wins
pub fn fn_and<'a>(args: &[Expr], ctx: &EvaluationContext<'a>) -> Result<Evaluated<'a>, CellError> {
    let (trues, total) = tally(args, ctx)?;
    Ok(CellValue::Boolean(trues == total).into())
}

/// OR function
pub fn fn_or<'a>(args: &[Expr], ctx: &EvaluationContext<'a>) -> Result<Evaluated<'a>, CellError> {
    let (trues, _) = tally(args, ctx)?;
    Ok(CellValue::Boolean(trues > 0).into())
}

/// XOR function - TRUE when an odd number of arguments are TRUE
pub fn fn_xor(args: &[Evaluated<'_>], _ctx: &EvaluationContext<'_>) -> FunctionResult {
    let mut trues = 0usize;
    let mut any = false;
    for arg in args {
        any |= for_each_logical(arg, &mut |b| trues += usize::from(b))?;
    }
    if !any {
        return Err(CellError::Value);
    }
    Ok(CellValue::Boolean(trues % 2 == 1))
}

/// NOT function
pub fn fn_not(args: &[Evaluated<'_>], _ctx: &EvaluationContext<'_>) -> FunctionResult {
    Ok(CellValue::Boolean(!bool_arg(args, 0)?))
}

/// Error carried by an evaluated argument, looking through single cells
fn carried_error(value: &Evaluated<'_>) -> Option<CellError> {
    match value {
        Evaluated::Value(v) => v.error(),
        Evaluated::Range(view) if view.range().is_single_cell() => view.scalar().error(),
        Evaluated::Range(_) => None,
    }
}

/// IFERROR function
pub fn fn_iferror<'a>(args: &[Expr], ctx: &EvaluationContext<'a>) -> Result<Evaluated<'a>, CellError> {
    let value = evaluate_expr(&args[0], ctx);
    if carried_error(&value).is_some() {
        Ok(evaluate_expr(&args[1], ctx))
    } else {
        Ok(value)
    }
}

/// IFNA function - only `#N/A` is replaced
pub fn fn_ifna<'a>(args: &[Expr], ctx: &EvaluationContext<'a>) -> Result<Evaluated<'a>, CellError> {
    let value = evaluate_expr(&args[0], ctx);
    if carried_error(&value) == Some(CellError::Na) {
        Ok(evaluate_expr(&args[1], ctx))
    } else {
        Ok(value)
    }
}

/// TRUE function
pub fn fn_true(_args: &[Evaluated<'_>], _ctx: &EvaluationContext<'_>) -> FunctionResult {
    Ok(CellValue::Boolean(true))
}

/// FALSE function
pub fn fn_false(_args: &[Evaluated<'_>], _ctx: &EvaluationContext<'_>) -> FunctionResult {
    Ok(CellValue::Boolean(false))
}

#[cfg(test)]
mod tests {
    use crate::testing::{eval, eval_in, sheet};
    use gridcalc_core::{CellError, CellValue};
    use pretty_assertions::assert_eq;

    #[test]
    fn test_if_evaluates_only_the_taken_branch() {
        assert_eq!(eval("=IF(TRUE, 1, 1/0)"), CellValue::int(1));
        assert_eq!(eval("=IF(0, 1/0, \"no\")"), CellValue::text("no"));
        assert_eq!(eval("=IF(FALSE, 1)"), CellValue::Boolean(false));
        assert_eq!(eval("=IF(1/0, 1, 2)"), CellValue::Error(CellError::Div0));
        assert_eq!(eval("=IF(\"maybe\", 1, 2)"), CellValue::Error(CellError::Value));
    }

    #[test]
    fn test_if_passes_ranges_through() {
        let wb = sheet(&[("A1", CellValue::int(2)), ("A2", CellValue::int(3))]);
        assert_eq!(eval_in(&wb, "=SUM(IF(A1>1, A1:A2, 0))"), CellValue::int(5));
    }

    #[test]
    fn test_ifs() {
        assert_eq!(eval("=IFS(1>2, \"a\", TRUE, \"b\")"), CellValue::text("b"));
        assert_eq!(eval("=IFS(FALSE, 1)"), CellValue::Error(CellError::Na));
        assert_eq!(eval("=IFS(TRUE, 1, FALSE)"), CellValue::Error(CellError::Value));
    }

    #[test]
    fn test_and_or() {
        let wb = sheet(&[
            ("A1", CellValue::Boolean(true)),
            ("A2", CellValue::int(1)),
            ("A3", CellValue::text("ignored")),
            ("B1", CellValue::Error(CellError::Ref)),
        ]);
        assert_eq!(eval_in(&wb, "=AND(A1:A3)"), CellValue::Boolean(true));
        assert_eq!(eval_in(&wb, "=AND(A1:A3, FALSE)"), CellValue::Boolean(false));
        assert_eq!(eval_in(&wb, "=OR(FALSE, 0)"), CellValue::Boolean(false));
        assert_eq!(eval_in(&wb, "=OR(FALSE, A2)"), CellValue::Boolean(true));
        assert_eq!(eval_in(&wb, "=OR(TRUE, B1)"), CellValue::Error(CellError::Ref));
        assert_eq!(eval_in(&wb, "=AND(\"x\")"), CellValue::Error(CellError::Value));
        assert_eq!(eval_in(&wb, "=AND(D1:D3)"), CellValue::Error(CellError::Value));
    }

    #[test]
    fn test_xor_and_not() {
        assert_eq!(eval("=XOR(TRUE, TRUE, TRUE)"), CellValue::Boolean(true));
        assert_eq!(eval("=XOR(TRUE, 1)"), CellValue::Boolean(false));
        assert_eq!(eval("=NOT(0)"), CellValue::Boolean(true));
        assert_eq!(eval("=NOT(\"TRUE\")"), CellValue::Boolean(false));
    }

    #[test]
    fn test_iferror_and_ifna() {
        let wb = sheet(&[("A1", CellValue::Error(CellError::Div0))]);
        assert_eq!(eval_in(&wb, "=IFERROR(1/0, \"x\")"), CellValue::text("x"));
        assert_eq!(eval_in(&wb, "=IFERROR(A1, 0)"), CellValue::int(0));
        assert_eq!(eval_in(&wb, "=IFERROR(5, 1/0)"), CellValue::int(5));
        assert_eq!(eval_in(&wb, "=IFNA(NA(), 7)"), CellValue::int(7));
        assert_eq!(eval_in(&wb, "=IFNA(A1, 7)"), CellValue::Error(CellError::Div0));
    }
}
