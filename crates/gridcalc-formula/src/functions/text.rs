//! Text functions
//!
//! Positions and lengths count characters, not bytes.

use gridcalc_core::{CellError, CellValue};
use rust_decimal::Decimal;

use super::criteria::wildcard_match;
use super::{arg, dense_values, int_arg, text_arg, FunctionResult};
use crate::evaluator::{parse_number, to_text, EvaluationContext, Evaluated};

/// Longest text a function may build
const MAX_TEXT_LEN: usize = 32_767;

fn take_left(s: &str, n: usize) -> String {
    s.chars().take(n).collect()
}

fn take_right(s: &str, n: usize) -> String {
    let len = s.chars().count();
    s.chars().skip(len.saturating_sub(n)).collect()
}

/// Non-negative count argument, `default` when omitted
fn count_arg(args: &[Evaluated<'_>], index: usize, default: usize) -> Result<usize, CellError> {
    if args.get(index).is_none() {
        return Ok(default);
    }
    usize::try_from(int_arg(args, index)?).map_err(|_| CellError::Value)
}

/// 1-based start position argument
fn start_arg(args: &[Evaluated<'_>], index: usize) -> Result<usize, CellError> {
    let start = count_arg(args, index, 1)?;
    if start < 1 {
        return Err(CellError::Value);
    }
    Ok(start)
}

fn text_result(s: String) -> FunctionResult {
    if s.chars().count() > MAX_TEXT_LEN {
        return Err(CellError::Value);
    }
    Ok(CellValue::text(s))
}

/// CONCATENATE(text1, [text2], ...)
pub fn fn_concatenate(args: &[Evaluated<'_>], ctx: &EvaluationContext<'_>) -> FunctionResult {
    let mut result = String::new();
    for i in 0..args.len() {
        result.push_str(&text_arg(args, i, ctx)?);
    }
    text_result(result)
}

/// Feed the text of one argument to `push`, ranges in row-major order
///
/// With `skip_empty` only stored cells of a range are visited; otherwise
/// every position is, holes included.
fn for_each_piece(
    arg: &Evaluated<'_>,
    skip_empty: bool,
    ctx: &EvaluationContext<'_>,
    mut push: impl FnMut(&str) -> Result<(), CellError>,
) -> Result<(), CellError> {
    match arg {
        Evaluated::Value(value) => push(&to_text(value, ctx.scale)?),
        Evaluated::Range(view) if skip_empty => {
            view.populated().try_for_each(|value| push(&to_text(value, ctx.scale)?))
        }
        Evaluated::Range(view) => {
            dense_values(view, ctx)?.try_for_each(|value| push(&to_text(value, ctx.scale)?))
        }
    }
}

/// Append to a result under construction, failing once it cannot fit
fn append(result: &mut String, piece: &str) -> Result<(), CellError> {
    // a char is at most 4 bytes, so this only trips when the text is surely too long
    if result.len() + piece.len() > MAX_TEXT_LEN * 4 {
        return Err(CellError::Value);
    }
    result.push_str(piece);
    Ok(())
}

/// CONCAT(text1, [text2], ...) - like CONCATENATE but accepts ranges
pub fn fn_concat(args: &[Evaluated<'_>], ctx: &EvaluationContext<'_>) -> FunctionResult {
    let mut result = String::new();
    for arg in args {
        for_each_piece(arg, true, ctx, |piece| append(&mut result, piece))?;
    }
    text_result(result)
}

/// TEXTJOIN(delimiter, ignore_empty, text1, [text2], ...)
pub fn fn_textjoin(args: &[Evaluated<'_>], ctx: &EvaluationContext<'_>) -> FunctionResult {
    let delimiter = text_arg(args, 0, ctx)?;
    let ignore_empty = super::bool_arg(args, 1)?;

    let mut result = String::new();
    let mut first = true;
    for arg in &args[2..] {
        for_each_piece(arg, ignore_empty, ctx, |piece| {
            if ignore_empty && piece.is_empty() {
                return Ok(());
            }
            if !first {
                append(&mut result, &delimiter)?;
            }
            first = false;
            append(&mut result, piece)
        })?;
    }
    text_result(result)
}

/// LEFT(text, [num_chars])
pub fn fn_left(args: &[Evaluated<'_>], ctx: &EvaluationContext<'_>) -> FunctionResult {
    let s = text_arg(args, 0, ctx)?;
    Ok(CellValue::text(take_left(&s, count_arg(args, 1, 1)?)))
}

/// RIGHT(text, [num_chars])
pub fn fn_right(args: &[Evaluated<'_>], ctx: &EvaluationContext<'_>) -> FunctionResult {
    let s = text_arg(args, 0, ctx)?;
    Ok(CellValue::text(take_right(&s, count_arg(args, 1, 1)?)))
}

/// MID(text, start_num, num_chars)
pub fn fn_mid(args: &[Evaluated<'_>], ctx: &EvaluationContext<'_>) -> FunctionResult {
    let s = text_arg(args, 0, ctx)?;
    let start = start_arg(args, 1)?;
    let n = count_arg(args, 2, 0)?;
    Ok(CellValue::text(s.chars().skip(start - 1).take(n).collect::<String>()))
}

/// LEN(text)
pub fn fn_len(args: &[Evaluated<'_>], ctx: &EvaluationContext<'_>) -> FunctionResult {
    let s = text_arg(args, 0, ctx)?;
    Ok(CellValue::Number(Decimal::from(s.chars().count())))
}

/// UPPER(text)
pub fn fn_upper(args: &[Evaluated<'_>], ctx: &EvaluationContext<'_>) -> FunctionResult {
    Ok(CellValue::text(text_arg(args, 0, ctx)?.to_uppercase()))
}

/// LOWER(text)
pub fn fn_lower(args: &[Evaluated<'_>], ctx: &EvaluationContext<'_>) -> FunctionResult {
    Ok(CellValue::text(text_arg(args, 0, ctx)?.to_lowercase()))
}

/// TRIM(text) - drops leading and trailing spaces and collapses inner runs
pub fn fn_trim(args: &[Evaluated<'_>], ctx: &EvaluationContext<'_>) -> FunctionResult {
    let s = text_arg(args, 0, ctx)?;
    let words: Vec<&str> = s.split(' ').filter(|w| !w.is_empty()).collect();
    Ok(CellValue::text(words.join(" ")))
}

/// EXACT(text1, text2) - case-sensitive comparison
pub fn fn_exact(args: &[Evaluated<'_>], ctx: &EvaluationContext<'_>) -> FunctionResult {
    Ok(CellValue::Boolean(text_arg(args, 0, ctx)? == text_arg(args, 1, ctx)?))
}

/// Search `within` from a 1-based start; returns the 1-based position
fn search_from(
    args: &[Evaluated<'_>],
    ctx: &EvaluationContext<'_>,
    matches_at: impl Fn(&[char], &[char]) -> bool,
    normalize: impl Fn(String) -> String,
) -> FunctionResult {
    let needle: Vec<char> = normalize(text_arg(args, 0, ctx)?).chars().collect();
    let haystack: Vec<char> = normalize(text_arg(args, 1, ctx)?).chars().collect();
    let start = start_arg(args, 2)?;
    if start > haystack.len() + 1 {
        return Err(CellError::Value);
    }

    (start - 1..=haystack.len())
        .find(|&pos| matches_at(&needle, &haystack[pos..]))
        .map(|pos| CellValue::Number(Decimal::from(pos + 1)))
        .ok_or(CellError::Value)
}

/// FIND(find_text, within_text, [start_num]) - case-sensitive, no wildcards
pub fn fn_find(args: &[Evaluated<'_>], ctx: &EvaluationContext<'_>) -> FunctionResult {
    search_from(args, ctx, |needle, rest| rest.starts_with(needle), |s| s)
}

/// SEARCH(find_text, within_text, [start_num]) - case-insensitive, wildcards
pub fn fn_search(args: &[Evaluated<'_>], ctx: &EvaluationContext<'_>) -> FunctionResult {
    search_from(
        args,
        ctx,
        |needle, rest| {
            // Anchored at `rest`'s start, anything may follow
            let mut pattern = needle.to_vec();
            pattern.push('*');
            wildcard_match(&pattern, rest)
        },
        |s| s.to_lowercase(),
    )
}

/// SUBSTITUTE(text, old_text, new_text, [instance_num])
pub fn fn_substitute(args: &[Evaluated<'_>], ctx: &EvaluationContext<'_>) -> FunctionResult {
    let s = text_arg(args, 0, ctx)?;
    let old = text_arg(args, 1, ctx)?;
    let new = text_arg(args, 2, ctx)?;

    if old.is_empty() {
        return Ok(CellValue::text(s));
    }

    let result = match args.get(3) {
        None => s.replace(&old, &new),
        Some(_) => {
            let instance = start_arg(args, 3)?;
            match s.match_indices(&old).nth(instance - 1) {
                Some((at, _)) => format!("{}{}{}", &s[..at], new, &s[at + old.len()..]),
                None => s,
            }
        }
    };
    text_result(result)
}

/// REPT(text, number_times)
pub fn fn_rept(args: &[Evaluated<'_>], ctx: &EvaluationContext<'_>) -> FunctionResult {
    let s = text_arg(args, 0, ctx)?;
    let n = count_arg(args, 1, 0)?;
    if s.chars().count().saturating_mul(n) > MAX_TEXT_LEN {
        return Err(CellError::Value);
    }
    Ok(CellValue::text(s.repeat(n)))
}

/// VALUE(text) - converts text to a number; a trailing `%` divides by 100
pub fn fn_value(args: &[Evaluated<'_>], _ctx: &EvaluationContext<'_>) -> FunctionResult {
    match arg(args, 0) {
        CellValue::Number(n) => Ok(CellValue::Number(n)),
        CellValue::Empty => Ok(CellValue::int(0)),
        CellValue::Text(s) => {
            let s = s.as_str().trim();
            let parsed = match s.strip_suffix('%') {
                Some(body) => parse_number(body).and_then(|n| n.checked_div(Decimal::ONE_HUNDRED)),
                None => parse_number(s),
            };
            parsed.map(CellValue::Number).ok_or(CellError::Value)
        }
        CellValue::Boolean(_) => Err(CellError::Value),
        CellValue::Error(e) => Err(e),
    }
}
