//! Financial functions
//!
//! Cash flows follow the usual sign convention: money paid out is negative.
//! `type` selects payments at the end (0) or the beginning (1) of a period.

use gridcalc_core::{CellError, CellValue};
use rust_decimal::{Decimal, MathematicalOps};

use super::{collect_numbers, number, number_arg, number_arg_or, FunctionResult};
use crate::evaluator::{power, EvaluationContext, Evaluated};

/// Newton iterations before IRR and RATE give up
const MAX_ITERATIONS: usize = 100;

/// 1e-10
fn tolerance() -> Decimal {
    Decimal::new(1, 10)
}

/// `(1 + rate) ^ nper`
fn growth(rate: Decimal, nper: Decimal) -> Result<Decimal, CellError> {
    let base = Decimal::ONE.checked_add(rate).ok_or(CellError::Num)?;
    match power(base, nper) {
        CellValue::Number(n) => Ok(n),
        CellValue::Error(e) => Err(e),
        _ => Err(CellError::Num),
    }
}

fn payment_type(args: &[Evaluated<'_>], index: usize) -> Result<Decimal, CellError> {
    let kind = number_arg_or(args, index, Decimal::ZERO)?;
    Ok(if kind.is_zero() { Decimal::ZERO } else { Decimal::ONE })
}

/// Value of the time-value equation; zero when the arguments balance
///
/// `pv * f + pmt * (1 + rate * type) * (f - 1) / rate + fv`
fn balance(
    rate: Decimal,
    nper: Decimal,
    pmt: Decimal,
    pv: Decimal,
    fv: Decimal,
    kind: Decimal,
) -> Option<Decimal> {
    if rate.is_zero() {
        return pv.checked_add(pmt.checked_mul(nper)?)?.checked_add(fv);
    }
    let f = growth(rate, nper).ok()?;
    let annuity = pmt
        .checked_mul(Decimal::ONE.checked_add(rate.checked_mul(kind)?)?)?
        .checked_mul(f - Decimal::ONE)?
        .checked_div(rate)?;
    pv.checked_mul(f)?.checked_add(annuity)?.checked_add(fv)
}

/// PMT(rate, nper, pv, [fv], [type])
pub fn fn_pmt(args: &[Evaluated<'_>], _ctx: &EvaluationContext<'_>) -> FunctionResult {
    let rate = number_arg(args, 0)?;
    let nper = number_arg(args, 1)?;
    let pv = number_arg(args, 2)?;
    let fv = number_arg_or(args, 3, Decimal::ZERO)?;
    let kind = payment_type(args, 4)?;

    if nper.is_zero() {
        return Err(CellError::Num);
    }
    if rate.is_zero() {
        return number((-(pv + fv)).checked_div(nper));
    }

    let f = growth(rate, nper)?;
    let numerator = (-(pv.checked_mul(f).ok_or(CellError::Num)? + fv))
        .checked_mul(rate)
        .ok_or(CellError::Num)?;
    let denominator = (Decimal::ONE + rate * kind)
        .checked_mul(f - Decimal::ONE)
        .ok_or(CellError::Num)?;
    if denominator.is_zero() {
        return Err(CellError::Num);
    }
    number(numerator.checked_div(denominator))
}

/// PV(rate, nper, pmt, [fv], [type])
pub fn fn_pv(args: &[Evaluated<'_>], _ctx: &EvaluationContext<'_>) -> FunctionResult {
    let rate = number_arg(args, 0)?;
    let nper = number_arg(args, 1)?;
    let pmt = number_arg(args, 2)?;
    let fv = number_arg_or(args, 3, Decimal::ZERO)?;
    let kind = payment_type(args, 4)?;

    // Solve the balance equation for pv: pv * f = -(annuity + fv)
    let rest = balance(rate, nper, pmt, Decimal::ZERO, fv, kind).ok_or(CellError::Num)?;
    let f = if rate.is_zero() {
        Decimal::ONE
    } else {
        growth(rate, nper)?
    };
    number((-rest).checked_div(f))
}

/// FV(rate, nper, pmt, [pv], [type])
pub fn fn_fv(args: &[Evaluated<'_>], _ctx: &EvaluationContext<'_>) -> FunctionResult {
    let rate = number_arg(args, 0)?;
    let nper = number_arg(args, 1)?;
    let pmt = number_arg(args, 2)?;
    let pv = number_arg_or(args, 3, Decimal::ZERO)?;
    let kind = payment_type(args, 4)?;

    let rest = balance(rate, nper, pmt, pv, Decimal::ZERO, kind).ok_or(CellError::Num)?;
    Ok(CellValue::Number(-rest))
}

/// NPER(rate, pmt, pv, [fv], [type])
pub fn fn_nper(args: &[Evaluated<'_>], _ctx: &EvaluationContext<'_>) -> FunctionResult {
    let rate = number_arg(args, 0)?;
    let pmt = number_arg(args, 1)?;
    let pv = number_arg(args, 2)?;
    let fv = number_arg_or(args, 3, Decimal::ZERO)?;
    let kind = payment_type(args, 4)?;

    if rate.is_zero() {
        if pmt.is_zero() {
            return Err(CellError::Num);
        }
        return number((-(pv + fv)).checked_div(pmt));
    }

    // f = (a - fv) / (a + pv) where a = pmt * (1 + rate * type) / rate
    let a = pmt
        .checked_mul(Decimal::ONE + rate * kind)
        .and_then(|x| x.checked_div(rate))
        .ok_or(CellError::Num)?;
    let ratio = (a - fv).checked_div(a + pv).ok_or(CellError::Num)?;
    let base = Decimal::ONE + rate;
    if ratio <= Decimal::ZERO || base <= Decimal::ZERO {
        return Err(CellError::Num);
    }

    let numerator = ratio.checked_ln().ok_or(CellError::Num)?;
    let denominator = base.checked_ln().ok_or(CellError::Num)?;
    if denominator.is_zero() {
        return Err(CellError::Num);
    }
    number(numerator.checked_div(denominator))
}

/// Present value of `values` discounted from period `first`
fn discounted(rate: Decimal, values: &[Decimal], first: i64) -> Option<Decimal> {
    let factor = Decimal::ONE.checked_div(Decimal::ONE.checked_add(rate)?)?;
    let mut discount = factor.checked_powi(first)?;
    let mut total = Decimal::ZERO;
    for value in values {
        total = total.checked_add(value.checked_mul(discount)?)?;
        discount = discount.checked_mul(factor)?;
    }
    Some(total)
}

/// NPV(rate, value1, [value2], ...) - the first value is discounted one period
pub fn fn_npv(args: &[Evaluated<'_>], _ctx: &EvaluationContext<'_>) -> FunctionResult {
    let rate = number_arg(args, 0)?;
    if rate == Decimal::NEGATIVE_ONE {
        return Err(CellError::Div0);
    }
    let values = collect_numbers(&args[1..])?;
    number(discounted(rate, &values, 1))
}

/// Newton's method from `guess`; `step` returns the next correction
fn solve(mut guess: Decimal, step: impl Fn(Decimal) -> Option<Decimal>) -> Result<Decimal, CellError> {
    for _ in 0..MAX_ITERATIONS {
        let delta = step(guess).ok_or(CellError::Num)?;
        let next = guess.checked_sub(delta).ok_or(CellError::Num)?;
        if delta.abs() < tolerance() {
            return Ok(next);
        }
        if next <= Decimal::NEGATIVE_ONE {
            return Err(CellError::Num);
        }
        guess = next;
    }

    tracing::debug!(iterations = MAX_ITERATIONS, "rate search did not converge");
    Err(CellError::Num)
}

/// IRR(values, [guess])
pub fn fn_irr(args: &[Evaluated<'_>], _ctx: &EvaluationContext<'_>) -> FunctionResult {
    let values = collect_numbers(&args[..1])?;
    let guess = number_arg_or(args, 1, Decimal::new(1, 1))?;

    let has_inflow = values.iter().any(|v| v.is_sign_positive() && !v.is_zero());
    let has_outflow = values.iter().any(|v| v.is_sign_negative() && !v.is_zero());
    if !(has_inflow && has_outflow) {
        return Err(CellError::Num);
    }

    let rate = solve(guess, |rate| {
        let npv = discounted(rate, &values, 0)?;
        // d/dr of v_i / (1 + r)^i is -i * v_i / (1 + r)^(i + 1)
        let weighted: Vec<Decimal> = values
            .iter()
            .enumerate()
            .map(|(i, v)| v.checked_mul(-Decimal::from(i)))
            .collect::<Option<_>>()?;
        let slope = discounted(rate, &weighted, 1)?;
        if slope.is_zero() {
            return None;
        }
        npv.checked_div(slope)
    })?;
    Ok(CellValue::Number(rate))
}

/// RATE(nper, pmt, pv, [fv], [type], [guess])
pub fn fn_rate(args: &[Evaluated<'_>], _ctx: &EvaluationContext<'_>) -> FunctionResult {
    let nper = number_arg(args, 0)?;
    let pmt = number_arg(args, 1)?;
    let pv = number_arg(args, 2)?;
    let fv = number_arg_or(args, 3, Decimal::ZERO)?;
    let kind = payment_type(args, 4)?;
    let guess = number_arg_or(args, 5, Decimal::new(1, 1))?;

    if nper <= Decimal::ZERO {
        return Err(CellError::Num);
    }

    let h = Decimal::new(1, 7);
    let rate = solve(guess, |rate| {
        let value = balance(rate, nper, pmt, pv, fv, kind)?;
        let shifted = balance(rate.checked_add(h)?, nper, pmt, pv, fv, kind)?;
        let slope = shifted.checked_sub(value)?.checked_div(h)?;
        if slope.is_zero() {
            return None;
        }
        value.checked_div(slope)
    })?;
    Ok(CellValue::Number(rate))
}

#[cfg(test)]
mod tests {
    use crate::testing::{eval, eval_in, num, sheet};
    use gridcalc_core::{CellError, CellValue};
    use pretty_assertions::assert_eq;

    #[test]
    fn test_pmt() {
        assert_eq!(eval("=ROUND(PMT(0.08/12, 10, 10000), 2)"), num("-1037.03"));
        assert_eq!(eval("=PMT(0, 10, 1000)"), CellValue::int(-100));
        assert_eq!(eval("=PMT(0.1, 0, 1000)"), CellValue::Error(CellError::Num));
    }

    #[test]
    fn test_pv_and_fv() {
        assert_eq!(eval("=ROUND(PV(0.08/12, 12*20, 500, , 0), 2)"), num("-59777.15"));
        assert_eq!(eval("=ROUND(FV(0.06/12, 10, -200, -500, 1), 2)"), num("2581.40"));
        assert_eq!(eval("=FV(0, 10, -100)"), CellValue::int(1000));
        assert_eq!(eval("=PV(0, 10, -100)"), CellValue::int(1000));
    }

    #[test]
    fn test_nper() {
        assert_eq!(eval("=ROUND(NPER(0.12/12, -100, -1000, 10000, 1), 2)"), num("59.67"));
        assert_eq!(eval("=NPER(0, -100, 1000)"), CellValue::int(10));
        assert_eq!(eval("=NPER(0, 0, 1000)"), CellValue::Error(CellError::Num));
    }

    #[test]
    fn test_npv() {
        assert_eq!(eval("=ROUND(NPV(0.1, -10000, 3000, 4200, 6800), 2)"), num("1188.44"));
        assert_eq!(eval("=NPV(-1, 100)"), CellValue::Error(CellError::Div0));
    }

    #[test]
    fn test_irr() {
        let wb = sheet(&[
            ("A1", CellValue::int(-70000)),
            ("A2", CellValue::int(12000)),
            ("A3", CellValue::int(15000)),
            ("A4", CellValue::int(18000)),
            ("A5", CellValue::int(21000)),
            ("A6", CellValue::int(26000)),
        ]);
        assert_eq!(eval_in(&wb, "=ROUND(IRR(A1:A6), 4)"), num("0.0866"));
        assert_eq!(eval_in(&wb, "=IRR(A2:A6)"), CellValue::Error(CellError::Num));
    }

    #[test]
    fn test_rate() {
        assert_eq!(eval("=ROUND(RATE(4*12, -200, 8000), 4)"), num("0.0077"));
        assert_eq!(eval("=RATE(0, -200, 8000)"), CellValue::Error(CellError::Num));
    }
}
