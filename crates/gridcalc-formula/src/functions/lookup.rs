//! Lookup functions
//!
//! Searches walk stored cells only, so a lookup over a whole column costs
//! what the column holds rather than its million rows.

use std::cmp::Ordering;
use std::mem::discriminant;

use gridcalc_core::{CellError, CellValue};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;

use super::criteria::wildcard_match;
use super::{arg, bool_arg, int_arg, FunctionResult};
use crate::ast::Expr;
use crate::evaluator::{
    compare_text, compare_values, evaluate_expr, evaluate_scalar, to_number, EvaluationContext, Evaluated,
    RangeView,
};

/// How a lookup compares candidates
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MatchMode {
    Exact,
    /// Largest value not above the lookup value, data sorted ascending
    NextSmaller,
    /// Smallest value not below the lookup value, data sorted descending
    NextLarger,
}

fn exact_match(lookup: &CellValue, candidate: &CellValue) -> bool {
    match (lookup, candidate) {
        (CellValue::Text(pattern), CellValue::Text(text)) => {
            let pattern = pattern.as_str();
            if pattern.contains(['*', '?']) {
                let pattern: Vec<char> = pattern.to_lowercase().chars().collect();
                let text: Vec<char> = text.as_str().to_lowercase().chars().collect();
                wildcard_match(&pattern, &text)
            } else {
                compare_text(pattern, text.as_str()) == Ordering::Equal
            }
        }
        (CellValue::Number(a), CellValue::Number(b)) => a == b,
        (CellValue::Boolean(a), CellValue::Boolean(b)) => a == b,
        _ => false,
    }
}

/// Position of the match among `(index, value)` pairs in index order
fn find<'v>(
    line: impl Iterator<Item = (u32, &'v CellValue)>,
    lookup: &CellValue,
    mode: MatchMode,
) -> Option<u32> {
    if mode == MatchMode::Exact {
        return line
            .filter(|(_, value)| exact_match(lookup, value))
            .map(|(index, _)| index)
            .next();
    }

    let mut found = None;
    for (index, value) in line {
        if discriminant(value) != discriminant(lookup) {
            continue;
        }
        let ordering = compare_values(value, lookup);
        let keep = match mode {
            MatchMode::NextSmaller => ordering != Ordering::Greater,
            _ => ordering != Ordering::Less,
        };
        if !keep {
            break;
        }
        found = Some(index);
        if ordering == Ordering::Equal {
            break;
        }
    }
    found
}

fn lookup_value(args: &[Evaluated<'_>]) -> Result<CellValue, CellError> {
    match arg(args, 0) {
        CellValue::Error(e) => Err(e),
        CellValue::Empty => Err(CellError::Na),
        value => Ok(value),
    }
}

fn table_arg<'v, 'a>(args: &'v [Evaluated<'a>], index: usize) -> Result<&'v RangeView<'a>, CellError> {
    args[index].as_range().ok_or(CellError::Value)
}

/// Range lookup flag; TRUE when omitted
fn sorted_mode(args: &[Evaluated<'_>], index: usize) -> Result<MatchMode, CellError> {
    let approximate = match args.get(index) {
        Some(_) => bool_arg(args, index)?,
        None => true,
    };
    Ok(if approximate {
        MatchMode::NextSmaller
    } else {
        MatchMode::Exact
    })
}

/// 1-based index argument checked against `limit`
fn position_arg(args: &[Evaluated<'_>], index: usize, limit: u64) -> Result<u64, CellError> {
    let n = int_arg(args, index)?;
    if n < 1 {
        return Err(CellError::Value);
    }
    let n = n as u64;
    if n > limit {
        return Err(CellError::Ref);
    }
    Ok(n)
}

/// VLOOKUP(lookup_value, table_array, col_index_num, [range_lookup])
pub fn fn_vlookup(args: &[Evaluated<'_>], _ctx: &EvaluationContext<'_>) -> FunctionResult {
    let lookup = lookup_value(args)?;
    let table = table_arg(args, 1)?;
    let col = position_arg(args, 2, u64::from(table.cols()))? as u16;
    let mode = sorted_mode(args, 3)?;

    let first_column = table
        .populated_offsets()
        .filter(|&(_, c, _)| c == 0)
        .map(|(r, _, value)| (r, value));
    let row = find(first_column, &lookup, mode).ok_or(CellError::Na)?;
    Ok(table.get(row, col - 1).cloned().unwrap_or_default())
}

/// HLOOKUP(lookup_value, table_array, row_index_num, [range_lookup])
pub fn fn_hlookup(args: &[Evaluated<'_>], _ctx: &EvaluationContext<'_>) -> FunctionResult {
    let lookup = lookup_value(args)?;
    let table = table_arg(args, 1)?;
    let row = position_arg(args, 2, u64::from(table.rows()))? as u32;
    let mode = sorted_mode(args, 3)?;

    let first_row = table
        .populated_offsets()
        .filter(|&(r, _, _)| r == 0)
        .map(|(_, c, value)| (u32::from(c), value));
    let col = find(first_row, &lookup, mode).ok_or(CellError::Na)?;
    Ok(table.get(row - 1, col as u16).cloned().unwrap_or_default())
}

/// INDEX(array, row_num, [column_num])
///
/// With a single row and no column number the second argument selects a
/// column.
pub fn fn_index(args: &[Evaluated<'_>], _ctx: &EvaluationContext<'_>) -> FunctionResult {
    let view = match &args[0] {
        Evaluated::Range(view) => *view,
        Evaluated::Value(value) => {
            position_arg(args, 1, 1)?;
            if args.len() > 2 {
                position_arg(args, 2, 1)?;
            }
            return Ok(value.clone());
        }
    };

    let (row, col) = if args.len() == 2 && view.rows() == 1 {
        (1, position_arg(args, 1, u64::from(view.cols()))?)
    } else {
        let row = position_arg(args, 1, u64::from(view.rows()))?;
        let col = match args.get(2) {
            Some(_) => position_arg(args, 2, u64::from(view.cols()))?,
            None => 1,
        };
        (row, col)
    };

    Ok(view
        .get((row - 1) as u32, (col - 1) as u16)
        .cloned()
        .unwrap_or_default())
}

/// MATCH(lookup_value, lookup_array, [match_type])
pub fn fn_match(args: &[Evaluated<'_>], _ctx: &EvaluationContext<'_>) -> FunctionResult {
    let lookup = lookup_value(args)?;
    let view = table_arg(args, 1)?;
    let mode = match args.get(2) {
        None => MatchMode::NextSmaller,
        Some(_) => match to_number(&arg(args, 2))? {
            n if n.is_zero() => MatchMode::Exact,
            n if n.is_sign_negative() => MatchMode::NextLarger,
            _ => MatchMode::NextSmaller,
        },
    };

    let position = if view.cols() == 1 {
        find(view.populated_offsets().map(|(r, _, v)| (r, v)), &lookup, mode)
    } else if view.rows() == 1 {
        find(
            view.populated_offsets().map(|(_, c, v)| (u32::from(c), v)),
            &lookup,
            mode,
        )
    } else {
        return Err(CellError::Na);
    };

    let position = position.ok_or(CellError::Na)?;
    Ok(CellValue::Number(Decimal::from(position) + Decimal::ONE))
}

/// CHOOSE(index_num, value1, [value2], ...)
pub fn fn_choose<'a>(args: &[Expr], ctx: &EvaluationContext<'a>) -> Result<Evaluated<'a>, CellError> {
    let index = to_number(&evaluate_scalar(&args[0], ctx))?.trunc();
    if index < Decimal::ONE || index >= Decimal::from(args.len()) {
        return Err(CellError::Value);
    }
    let index = index.to_usize().ok_or(CellError::Value)?;
    Ok(evaluate_expr(&args[index], ctx))
}

/// ROWS function
pub fn fn_rows(args: &[Evaluated<'_>], _ctx: &EvaluationContext<'_>) -> FunctionResult {
    Ok(match &args[0] {
        Evaluated::Range(view) => CellValue::Number(Decimal::from(view.rows())),
        Evaluated::Value(_) => CellValue::int(1),
    })
}

/// COLUMNS function
pub fn fn_columns(args: &[Evaluated<'_>], _ctx: &EvaluationContext<'_>) -> FunctionResult {
    Ok(match &args[0] {
        Evaluated::Range(view) => CellValue::Number(Decimal::from(view.cols())),
        Evaluated::Value(_) => CellValue::int(1),
    })
}
