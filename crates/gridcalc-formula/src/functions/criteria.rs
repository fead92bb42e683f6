//! Criteria matching for SUMIF, COUNTIF, AVERAGEIF and related functions
//!
//! A criterion can be:
//! - A number: exact match (e.g., 5)
//! - A text string: case-insensitive match (e.g., "apple")
//! - A comparison expression: ">5", ">=10", "<100", "<=50", "<>0", "=5", ">m"
//! - Wildcards: "*" matches any characters, "?" matches single character
//! - Empty string: matches empty cells

use std::cmp::Ordering;

use gridcalc_core::{CellError, CellValue};
use rust_decimal::Decimal;

use super::dense_offsets;
use crate::evaluator::{compare_text, parse_number, EvaluationContext, Evaluated, RangeView};

/// Criteria matcher for SUMIF/COUNTIF/AVERAGEIF and related functions
#[derive(Debug, Clone)]
pub struct CriteriaMatcher {
    criteria_type: CriteriaType,
}

#[derive(Debug, Clone)]
enum CriteriaType {
    /// Exact number match
    Number(Decimal),
    /// Comparison with a number
    Comparison(ComparisonOp, Decimal),
    /// Comparison with text, case-insensitive
    TextComparison(ComparisonOp, String),
    /// Text match (case-insensitive, with wildcards)
    Text(Vec<char>),
    /// Exact boolean match
    Boolean(bool),
    /// Match empty values
    Empty,
    /// Matches nothing (error criteria)
    Never,
}

#[derive(Debug, Clone, Copy)]
enum ComparisonOp {
    Equal,
    NotEqual,
    LessThan,
    LessEqual,
    GreaterThan,
    GreaterEqual,
}

impl ComparisonOp {
    fn holds(self, ordering: Ordering) -> bool {
        match self {
            ComparisonOp::Equal => ordering == Ordering::Equal,
            ComparisonOp::NotEqual => ordering != Ordering::Equal,
            ComparisonOp::LessThan => ordering == Ordering::Less,
            ComparisonOp::LessEqual => ordering != Ordering::Greater,
            ComparisonOp::GreaterThan => ordering == Ordering::Greater,
            ComparisonOp::GreaterEqual => ordering != Ordering::Less,
        }
    }
}

impl CriteriaMatcher {
    /// Create a new criteria matcher from a criterion value
    pub fn new(criteria: &CellValue) -> Self {
        let criteria_type = match criteria {
            CellValue::Number(n) => CriteriaType::Number(*n),
            CellValue::Boolean(b) => CriteriaType::Boolean(*b),
            CellValue::Text(s) => Self::parse_text_criteria(s.as_str()),
            CellValue::Empty => CriteriaType::Empty,
            CellValue::Error(_) => CriteriaType::Never,
        };

        Self { criteria_type }
    }

    fn parse_text_criteria(s: &str) -> CriteriaType {
        if s.is_empty() {
            return CriteriaType::Empty;
        }

        if let Some(ct) = Self::try_parse_comparison(s) {
            return ct;
        }

        if let Some(n) = parse_number(s) {
            return CriteriaType::Number(n);
        }

        if s.eq_ignore_ascii_case("TRUE") || s.eq_ignore_ascii_case("FALSE") {
            return CriteriaType::Boolean(s.eq_ignore_ascii_case("TRUE"));
        }

        CriteriaType::Text(s.to_lowercase().chars().collect())
    }

    fn try_parse_comparison(s: &str) -> Option<CriteriaType> {
        // Longer operators first
        let (op, rest) = if let Some(rest) = s.strip_prefix(">=") {
            (ComparisonOp::GreaterEqual, rest)
        } else if let Some(rest) = s.strip_prefix("<=") {
            (ComparisonOp::LessEqual, rest)
        } else if let Some(rest) = s.strip_prefix("<>") {
            (ComparisonOp::NotEqual, rest)
        } else if let Some(rest) = s.strip_prefix('>') {
            (ComparisonOp::GreaterThan, rest)
        } else if let Some(rest) = s.strip_prefix('<') {
            (ComparisonOp::LessThan, rest)
        } else if let Some(rest) = s.strip_prefix('=') {
            (ComparisonOp::Equal, rest)
        } else {
            return None;
        };

        if let Some(n) = parse_number(rest) {
            return Some(CriteriaType::Comparison(op, n));
        }
        match (op, rest.is_empty()) {
            // "=" matches blanks, "<>" matches anything non-blank
            (ComparisonOp::Equal, true) => Some(CriteriaType::Empty),
            (ComparisonOp::Equal, false) => Some(CriteriaType::Text(rest.to_lowercase().chars().collect())),
            _ => Some(CriteriaType::TextComparison(op, rest.to_string())),
        }
    }

    /// Check if a value matches the criteria
    pub fn matches(&self, value: &CellValue) -> bool {
        match &self.criteria_type {
            // Text "5" does not match the number 5
            CriteriaType::Number(criteria) => matches!(value, CellValue::Number(n) if n == criteria),

            CriteriaType::Comparison(op, criteria) => match value {
                CellValue::Number(n) => op.holds(n.cmp(criteria)),
                // Anything that is not a number is unequal to one
                CellValue::Empty | CellValue::Text(_) | CellValue::Boolean(_) => {
                    matches!(op, ComparisonOp::NotEqual)
                }
                CellValue::Error(_) => false,
            },

            CriteriaType::TextComparison(op, criteria) => match value {
                CellValue::Text(s) => op.holds(compare_text(s.as_str(), criteria)),
                CellValue::Error(_) => false,
                // "<>x" also counts blanks and non-text values
                _ => matches!(op, ComparisonOp::NotEqual),
            },

            CriteriaType::Text(pattern) => match value {
                CellValue::Text(s) => {
                    let text: Vec<char> = s.as_str().to_lowercase().chars().collect();
                    wildcard_match(pattern, &text)
                }
                _ => false,
            },

            CriteriaType::Boolean(b) => matches!(value, CellValue::Boolean(v) if v == b),

            CriteriaType::Empty => match value {
                CellValue::Empty => true,
                CellValue::Text(s) => s.is_empty(),
                _ => false,
            },

            CriteriaType::Never => false,
        }
    }
}

/// Pair up `(range, criterion)` arguments starting at `first`
pub(crate) fn criteria_pairs<'a>(
    args: &[Evaluated<'a>],
    first: usize,
) -> Result<Vec<(RangeView<'a>, CriteriaMatcher)>, CellError> {
    let rest = args.get(first..).unwrap_or_default();
    if rest.is_empty() || rest.len() % 2 != 0 {
        return Err(CellError::Value);
    }
    rest.chunks(2)
        .map(|pair| {
            let view = *pair[0].as_range().ok_or(CellError::Value)?;
            Ok((view, CriteriaMatcher::new(&pair[1].scalar())))
        })
        .collect()
}

/// Offsets matched by every criterion, row-major
///
/// All ranges must share one shape. When the first criterion cannot match a
/// blank only stored cells are visited, so whole-column criteria stay cheap.
pub(crate) fn matching_offsets(
    pairs: &[(RangeView<'_>, CriteriaMatcher)],
    ctx: &EvaluationContext<'_>,
) -> Result<Vec<(u32, u16)>, CellError> {
    let Some((first, matcher)) = pairs.first() else {
        return Ok(Vec::new());
    };
    if pairs
        .iter()
        .any(|(view, _)| view.rows() != first.rows() || view.cols() != first.cols())
    {
        return Err(CellError::Value);
    }

    let candidates: Vec<(u32, u16)> = if matcher.matches(&CellValue::Empty) {
        dense_offsets(first, ctx)?
            .filter(|(_, _, value)| matcher.matches(value))
            .map(|(row, col, _)| (row, col))
            .collect()
    } else {
        first
            .populated_offsets()
            .filter(|(_, _, value)| matcher.matches(value))
            .map(|(row, col, _)| (row, col))
            .collect()
    };

    Ok(candidates
        .into_iter()
        .filter(|&(row, col)| {
            pairs[1..]
                .iter()
                .all(|(view, m)| view.get(row, col).is_some_and(|value| m.matches(value)))
        })
        .collect())
}

/// Match with wildcards: `*` is any run of characters, `?` one character
pub(crate) fn wildcard_match(pattern: &[char], text: &[char]) -> bool {
    let mut pi = 0; // pattern index
    let mut ti = 0; // text index
    let mut star_pi = None; // position of last * in pattern
    let mut star_ti = 0; // text position when the last * was seen

    while ti < text.len() {
        if pi < pattern.len() && (pattern[pi] == '?' || pattern[pi] == text[ti]) {
            pi += 1;
            ti += 1;
        } else if pi < pattern.len() && pattern[pi] == '*' {
            star_pi = Some(pi);
            star_ti = ti;
            pi += 1; // Try matching * with the empty string first
        } else if let Some(sp) = star_pi {
            pi = sp + 1;
            star_ti += 1;
            ti = star_ti;
        } else {
            return false;
        }
    }

    // Remaining pattern characters must all be *
    while pi < pattern.len() && pattern[pi] == '*' {
        pi += 1;
    }

    pi == pattern.len()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(s: &str) -> CellValue {
        CellValue::text(s)
    }

    #[test]
    fn test_number_criteria() {
        let matcher = CriteriaMatcher::new(&CellValue::int(5));
        assert!(matcher.matches(&CellValue::int(5)));
        assert!(!matcher.matches(&CellValue::int(4)));
        assert!(!matcher.matches(&text("5")));

        // Numeric text criteria behaves like the number
        let matcher = CriteriaMatcher::new(&text("5"));
        assert!(matcher.matches(&CellValue::int(5)));
    }

    #[test]
    fn test_comparison_criteria() {
        let matcher = CriteriaMatcher::new(&text(">5"));
        assert!(matcher.matches(&CellValue::int(6)));
        assert!(!matcher.matches(&CellValue::int(5)));
        assert!(!matcher.matches(&text("abc")));

        let matcher = CriteriaMatcher::new(&text(">=5"));
        assert!(matcher.matches(&CellValue::int(5)));
        assert!(!matcher.matches(&CellValue::int(4)));

        let matcher = CriteriaMatcher::new(&text("<=5"));
        assert!(matcher.matches(&CellValue::int(5)));
        assert!(!matcher.matches(&CellValue::int(6)));

        let matcher = CriteriaMatcher::new(&text("<>5"));
        assert!(matcher.matches(&CellValue::int(6)));
        assert!(!matcher.matches(&CellValue::int(5)));
        assert!(matcher.matches(&text("five")));

        let matcher = CriteriaMatcher::new(&text("=5"));
        assert!(matcher.matches(&CellValue::int(5)));
        assert!(!matcher.matches(&CellValue::int(4)));
    }

    #[test]
    fn test_text_comparison_criteria() {
        let matcher = CriteriaMatcher::new(&text(">m"));
        assert!(matcher.matches(&text("Zebra")));
        assert!(!matcher.matches(&text("apple")));
        assert!(!matcher.matches(&CellValue::int(100)));

        let matcher = CriteriaMatcher::new(&text("<>done"));
        assert!(matcher.matches(&text("open")));
        assert!(!matcher.matches(&text("DONE")));
        assert!(matcher.matches(&CellValue::Empty));
    }

    #[test]
    fn test_text_criteria() {
        let matcher = CriteriaMatcher::new(&text("apple"));
        assert!(matcher.matches(&text("apple")));
        assert!(matcher.matches(&text("APPLE")));
        assert!(!matcher.matches(&text("banana")));
    }

    #[test]
    fn test_wildcard_criteria() {
        let matcher = CriteriaMatcher::new(&text("a*e"));
        assert!(matcher.matches(&text("apple")));
        assert!(matcher.matches(&text("ae")));
        assert!(!matcher.matches(&text("apples")));

        let matcher = CriteriaMatcher::new(&text("a?p*"));
        assert!(matcher.matches(&text("apple")));
        assert!(matcher.matches(&text("app")));
        assert!(!matcher.matches(&text("ap")));
    }

    #[test]
    fn test_empty_and_error_criteria() {
        let matcher = CriteriaMatcher::new(&text(""));
        assert!(matcher.matches(&CellValue::Empty));
        assert!(matcher.matches(&text("")));
        assert!(!matcher.matches(&CellValue::int(0)));

        let matcher = CriteriaMatcher::new(&CellValue::Error(CellError::Na));
        assert!(!matcher.matches(&CellValue::Error(CellError::Na)));
    }

    #[test]
    fn test_boolean_criteria() {
        let matcher = CriteriaMatcher::new(&CellValue::Boolean(true));
        assert!(matcher.matches(&CellValue::Boolean(true)));
        assert!(!matcher.matches(&CellValue::int(1)));
    }
}
