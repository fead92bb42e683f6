//! Built-in spreadsheet functions
//!
//! Dispatch is table-driven: each [`FunctionDef`] declares its arity, the
//! shape of arguments it wants and how errors in those arguments are
//! handled. New functions are added through [`FunctionRegistry::register`]
//! without touching the evaluator.

pub mod criteria;
pub mod financial;
pub mod info;
pub mod logical;
pub mod lookup;
pub mod math;
pub mod statistical;
pub mod text;

use ahash::AHashMap;
use gridcalc_core::{CellError, CellValue};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;

use crate::ast::Expr;
use crate::error::{FormulaError, FormulaResult};
use crate::evaluator::{to_bool, to_number, to_text, EvaluationContext, Evaluated, RangeView};

/// Result of a function; spreadsheet errors travel in the `Err` side
pub type FunctionResult = Result<CellValue, CellError>;

/// Implementation over evaluated arguments
pub type EagerFn = fn(&[Evaluated<'_>], &EvaluationContext<'_>) -> FunctionResult;

/// Implementation over unevaluated arguments
pub type LazyFn = for<'a> fn(&[Expr], &EvaluationContext<'a>) -> Result<Evaluated<'a>, CellError>;

/// How arguments are presented to an eager function
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgKind {
    /// Every argument collapses to one value; a multi-cell range is `#VALUE!`
    Scalar,
    /// References arrive as lazy range views
    Range,
}

/// Evaluation strategy of a function
#[derive(Clone, Copy)]
pub enum Evaluation {
    /// Returns the first error found among plain arguments without calling
    /// the implementation
    Strict(EagerFn),
    /// Receives error arguments as values
    ErrorAware(EagerFn),
    /// Receives the argument expressions and evaluates them itself
    Lazy(LazyFn),
}

impl std::fmt::Debug for Evaluation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Evaluation::Strict(_) => "Strict",
            Evaluation::ErrorAware(_) => "ErrorAware",
            Evaluation::Lazy(_) => "Lazy",
        })
    }
}

/// Function definition
#[derive(Debug, Clone)]
pub struct FunctionDef {
    /// Function name (uppercase)
    pub name: &'static str,
    /// Minimum arguments
    pub min_args: usize,
    /// Maximum arguments (None = unlimited)
    pub max_args: Option<usize>,
    pub args: ArgKind,
    pub eval: Evaluation,
}

impl FunctionDef {
    pub fn accepts(&self, count: usize) -> bool {
        count >= self.min_args && self.max_args.map_or(true, |max| count <= max)
    }
}

/// Function registry
#[derive(Debug)]
pub struct FunctionRegistry {
    functions: AHashMap<String, FunctionDef>,
}

impl Default for FunctionRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

impl FunctionRegistry {
    /// A registry with no functions
    pub fn empty() -> Self {
        Self {
            functions: AHashMap::new(),
        }
    }

    /// Create a registry with all built-in functions
    pub fn builtin() -> Self {
        let mut registry = Self::empty();

        registry.add_math_functions();
        registry.add_statistical_functions();
        registry.add_logical_functions();
        registry.add_info_functions();
        registry.add_lookup_functions();
        registry.add_text_functions();
        registry.add_financial_functions();

        registry
    }

    /// Look up a function by name (case-insensitive)
    pub fn get(&self, name: &str) -> Option<&FunctionDef> {
        match self.functions.get(name) {
            Some(def) => Some(def),
            None => self.functions.get(&name.to_ascii_uppercase()),
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn len(&self) -> usize {
        self.functions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }

    /// Registered names, sorted
    pub fn names(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.functions.values().map(|def| def.name).collect();
        names.sort_unstable();
        names
    }

    /// Register a function, replacing any previous definition of that name
    pub fn register(&mut self, def: FunctionDef) -> FormulaResult<Option<FunctionDef>> {
        let invalid = |reason: &str| FormulaError::InvalidFunction {
            name: def.name.to_string(),
            reason: reason.to_string(),
        };

        let mut chars = def.name.chars();
        if !chars.next().is_some_and(|c| c.is_ascii_alphabetic()) {
            return Err(invalid("name must start with a letter"));
        }
        if !chars.all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '_') {
            return Err(invalid("name may only contain letters, digits, '.' and '_'"));
        }
        if def.max_args.is_some_and(|max| max < def.min_args) {
            return Err(invalid("max_args is below min_args"));
        }

        Ok(self.add(def))
    }

    fn add(&mut self, def: FunctionDef) -> Option<FunctionDef> {
        self.functions.insert(def.name.to_ascii_uppercase(), def)
    }

    fn add_math_functions(&mut self) {
        // SUM
        self.add(FunctionDef {
            name: "SUM",
            min_args: 1,
            max_args: None,
            args: ArgKind::Range,
            eval: Evaluation::Strict(math::fn_sum),
        });

        // PRODUCT
        self.add(FunctionDef {
            name: "PRODUCT",
            min_args: 1,
            max_args: None,
            args: ArgKind::Range,
            eval: Evaluation::Strict(math::fn_product),
        });

        // ABS
        self.add(FunctionDef {
            name: "ABS",
            min_args: 1,
            max_args: Some(1),
            args: ArgKind::Scalar,
            eval: Evaluation::Strict(math::fn_abs),
        });

        // ROUND
        self.add(FunctionDef {
            name: "ROUND",
            min_args: 1,
            max_args: Some(2),
            args: ArgKind::Scalar,
            eval: Evaluation::Strict(math::fn_round),
        });

        // ROUNDUP
        self.add(FunctionDef {
            name: "ROUNDUP",
            min_args: 1,
            max_args: Some(2),
            args: ArgKind::Scalar,
            eval: Evaluation::Strict(math::fn_roundup),
        });

        // ROUNDDOWN
        self.add(FunctionDef {
            name: "ROUNDDOWN",
            min_args: 1,
            max_args: Some(2),
            args: ArgKind::Scalar,
            eval: Evaluation::Strict(math::fn_rounddown),
        });

        // INT
        self.add(FunctionDef {
            name: "INT",
            min_args: 1,
            max_args: Some(1),
            args: ArgKind::Scalar,
            eval: Evaluation::Strict(math::fn_int),
        });

        // TRUNC
        self.add(FunctionDef {
            name: "TRUNC",
            min_args: 1,
            max_args: Some(2),
            args: ArgKind::Scalar,
            eval: Evaluation::Strict(math::fn_trunc),
        });

        // MOD
        self.add(FunctionDef {
            name: "MOD",
            min_args: 2,
            max_args: Some(2),
            args: ArgKind::Scalar,
            eval: Evaluation::Strict(math::fn_mod),
        });

        // POWER
        self.add(FunctionDef {
            name: "POWER",
            min_args: 2,
            max_args: Some(2),
            args: ArgKind::Scalar,
            eval: Evaluation::Strict(math::fn_power),
        });

        // SQRT
        self.add(FunctionDef {
            name: "SQRT",
            min_args: 1,
            max_args: Some(1),
            args: ArgKind::Scalar,
            eval: Evaluation::Strict(math::fn_sqrt),
        });

        // SIGN
        self.add(FunctionDef {
            name: "SIGN",
            min_args: 1,
            max_args: Some(1),
            args: ArgKind::Scalar,
            eval: Evaluation::Strict(math::fn_sign),
        });

        // CEILING
        self.add(FunctionDef {
            name: "CEILING",
            min_args: 1,
            max_args: Some(2),
            args: ArgKind::Scalar,
            eval: Evaluation::Strict(math::fn_ceiling),
        });

        // FLOOR
        self.add(FunctionDef {
            name: "FLOOR",
            min_args: 1,
            max_args: Some(2),
            args: ArgKind::Scalar,
            eval: Evaluation::Strict(math::fn_floor),
        });

        // SUMPRODUCT
        self.add(FunctionDef {
            name: "SUMPRODUCT",
            min_args: 1,
            max_args: None,
            args: ArgKind::Range,
            eval: Evaluation::Strict(math::fn_sumproduct),
        });

        // SUMIF
        self.add(FunctionDef {
            name: "SUMIF",
            min_args: 2,
            max_args: Some(3),
            args: ArgKind::Range,
            eval: Evaluation::Strict(math::fn_sumif),
        });

        // SUMIFS
        self.add(FunctionDef {
            name: "SUMIFS",
            min_args: 3,
            max_args: None, // sum_range + criteria pairs
            args: ArgKind::Range,
            eval: Evaluation::Strict(math::fn_sumifs),
        });

        // EXP
        self.add(FunctionDef {
            name: "EXP",
            min_args: 1,
            max_args: Some(1),
            args: ArgKind::Scalar,
            eval: Evaluation::Strict(math::fn_exp),
        });

        // LN
        self.add(FunctionDef {
            name: "LN",
            min_args: 1,
            max_args: Some(1),
            args: ArgKind::Scalar,
            eval: Evaluation::Strict(math::fn_ln),
        });

        // LOG10
        self.add(FunctionDef {
            name: "LOG10",
            min_args: 1,
            max_args: Some(1),
            args: ArgKind::Scalar,
            eval: Evaluation::Strict(math::fn_log10),
        });

        // PI
        self.add(FunctionDef {
            name: "PI",
            min_args: 0,
            max_args: Some(0),
            args: ArgKind::Scalar,
            eval: Evaluation::Strict(math::fn_pi),
        });
    }

    fn add_statistical_functions(&mut self) {
        // AVERAGE
        self.add(FunctionDef {
            name: "AVERAGE",
            min_args: 1,
            max_args: None,
            args: ArgKind::Range,
            eval: Evaluation::Strict(statistical::fn_average),
        });

        // AVERAGEIF
        self.add(FunctionDef {
            name: "AVERAGEIF",
            min_args: 2,
            max_args: Some(3),
            args: ArgKind::Range,
            eval: Evaluation::Strict(statistical::fn_averageif),
        });

        // MIN
        self.add(FunctionDef {
            name: "MIN",
            min_args: 1,
            max_args: None,
            args: ArgKind::Range,
            eval: Evaluation::Strict(statistical::fn_min),
        });

        // MAX
        self.add(FunctionDef {
            name: "MAX",
            min_args: 1,
            max_args: None,
            args: ArgKind::Range,
            eval: Evaluation::Strict(statistical::fn_max),
        });

        // COUNT (errors are skipped, not propagated)
        self.add(FunctionDef {
            name: "COUNT",
            min_args: 1,
            max_args: None,
            args: ArgKind::Range,
            eval: Evaluation::ErrorAware(statistical::fn_count),
        });

        // COUNTA
        self.add(FunctionDef {
            name: "COUNTA",
            min_args: 1,
            max_args: None,
            args: ArgKind::Range,
            eval: Evaluation::ErrorAware(statistical::fn_counta),
        });

        // COUNTBLANK
        self.add(FunctionDef {
            name: "COUNTBLANK",
            min_args: 1,
            max_args: Some(1),
            args: ArgKind::Range,
            eval: Evaluation::ErrorAware(statistical::fn_countblank),
        });

        // COUNTIF
        self.add(FunctionDef {
            name: "COUNTIF",
            min_args: 2,
            max_args: Some(2),
            args: ArgKind::Range,
            eval: Evaluation::Strict(statistical::fn_countif),
        });

        // COUNTIFS
        self.add(FunctionDef {
            name: "COUNTIFS",
            min_args: 2,
            max_args: None,
            args: ArgKind::Range,
            eval: Evaluation::Strict(statistical::fn_countifs),
        });

        // MEDIAN
        self.add(FunctionDef {
            name: "MEDIAN",
            min_args: 1,
            max_args: None,
            args: ArgKind::Range,
            eval: Evaluation::Strict(statistical::fn_median),
        });

        // STDEV
        self.add(FunctionDef {
            name: "STDEV",
            min_args: 1,
            max_args: None,
            args: ArgKind::Range,
            eval: Evaluation::Strict(statistical::fn_stdev),
        });

        // VAR
        self.add(FunctionDef {
            name: "VAR",
            min_args: 1,
            max_args: None,
            args: ArgKind::Range,
            eval: Evaluation::Strict(statistical::fn_var),
        });
    }

    fn add_logical_functions(&mut self) {
        // IF
        self.add(FunctionDef {
            name: "IF",
            min_args: 2,
            max_args: Some(3),
            args: ArgKind::Range,
            eval: Evaluation::Lazy(logical::fn_if),
        });

        // IFS
        self.add(FunctionDef {
            name: "IFS",
            min_args: 2,
            max_args: None,
            args: ArgKind::Range,
            eval: Evaluation::Lazy(logical::fn_ifs),
        });

        // AND
        self.add(FunctionDef {
            name: "AND",
            min_args: 1,
            max_args: None,
            args: ArgKind::Range,
            eval: Evaluation::Lazy(logical::fn_and),
        });

        // OR
        self.add(FunctionDef {
            name: "OR",
            min_args: 1,
            max_args: None,
            args: ArgKind::Range,
            eval: Evaluation::Lazy(logical::fn_or),
        });

        // XOR
        self.add(FunctionDef {
            name: "XOR",
            min_args: 1,
            max_args: None,
            args: ArgKind::Range,
            eval: Evaluation::Strict(logical::fn_xor),
        });

        // NOT
        self.add(FunctionDef {
            name: "NOT",
            min_args: 1,
            max_args: Some(1),
            args: ArgKind::Scalar,
            eval: Evaluation::Strict(logical::fn_not),
        });

        // IFERROR
        self.add(FunctionDef {
            name: "IFERROR",
            min_args: 2,
            max_args: Some(2),
            args: ArgKind::Range,
            eval: Evaluation::Lazy(logical::fn_iferror),
        });

        // IFNA
        self.add(FunctionDef {
            name: "IFNA",
            min_args: 2,
            max_args: Some(2),
            args: ArgKind::Range,
            eval: Evaluation::Lazy(logical::fn_ifna),
        });

        // TRUE
        self.add(FunctionDef {
            name: "TRUE",
            min_args: 0,
            max_args: Some(0),
            args: ArgKind::Scalar,
            eval: Evaluation::Strict(logical::fn_true),
        });

        // FALSE
        self.add(FunctionDef {
            name: "FALSE",
            min_args: 0,
            max_args: Some(0),
            args: ArgKind::Scalar,
            eval: Evaluation::Strict(logical::fn_false),
        });
    }

    fn add_info_functions(&mut self) {
        // ISERROR
        self.add(FunctionDef {
            name: "ISERROR",
            min_args: 1,
            max_args: Some(1),
            args: ArgKind::Scalar,
            eval: Evaluation::ErrorAware(info::fn_iserror),
        });

        // ISERR
        self.add(FunctionDef {
            name: "ISERR",
            min_args: 1,
            max_args: Some(1),
            args: ArgKind::Scalar,
            eval: Evaluation::ErrorAware(info::fn_iserr),
        });

        // ISNA
        self.add(FunctionDef {
            name: "ISNA",
            min_args: 1,
            max_args: Some(1),
            args: ArgKind::Scalar,
            eval: Evaluation::ErrorAware(info::fn_isna),
        });

        // ISBLANK
        self.add(FunctionDef {
            name: "ISBLANK",
            min_args: 1,
            max_args: Some(1),
            args: ArgKind::Scalar,
            eval: Evaluation::ErrorAware(info::fn_isblank),
        });

        // ISNUMBER
        self.add(FunctionDef {
            name: "ISNUMBER",
            min_args: 1,
            max_args: Some(1),
            args: ArgKind::Scalar,
            eval: Evaluation::ErrorAware(info::fn_isnumber),
        });

        // ISTEXT
        self.add(FunctionDef {
            name: "ISTEXT",
            min_args: 1,
            max_args: Some(1),
            args: ArgKind::Scalar,
            eval: Evaluation::ErrorAware(info::fn_istext),
        });

        // ISLOGICAL
        self.add(FunctionDef {
            name: "ISLOGICAL",
            min_args: 1,
            max_args: Some(1),
            args: ArgKind::Scalar,
            eval: Evaluation::ErrorAware(info::fn_islogical),
        });

        // NA
        self.add(FunctionDef {
            name: "NA",
            min_args: 0,
            max_args: Some(0),
            args: ArgKind::Scalar,
            eval: Evaluation::Strict(info::fn_na),
        });

        // ERROR.TYPE
        self.add(FunctionDef {
            name: "ERROR.TYPE",
            min_args: 1,
            max_args: Some(1),
            args: ArgKind::Scalar,
            eval: Evaluation::ErrorAware(info::fn_error_type),
        });
    }

    fn add_lookup_functions(&mut self) {
        // VLOOKUP
        self.add(FunctionDef {
            name: "VLOOKUP",
            min_args: 3,
            max_args: Some(4),
            args: ArgKind::Range,
            eval: Evaluation::Strict(lookup::fn_vlookup),
        });

        // HLOOKUP
        self.add(FunctionDef {
            name: "HLOOKUP",
            min_args: 3,
            max_args: Some(4),
            args: ArgKind::Range,
            eval: Evaluation::Strict(lookup::fn_hlookup),
        });

        // INDEX
        self.add(FunctionDef {
            name: "INDEX",
            min_args: 2,
            max_args: Some(3),
            args: ArgKind::Range,
            eval: Evaluation::Strict(lookup::fn_index),
        });

        // MATCH
        self.add(FunctionDef {
            name: "MATCH",
            min_args: 2,
            max_args: Some(3),
            args: ArgKind::Range,
            eval: Evaluation::Strict(lookup::fn_match),
        });

        // CHOOSE
        self.add(FunctionDef {
            name: "CHOOSE",
            min_args: 2,
            max_args: None,
            args: ArgKind::Range,
            eval: Evaluation::Lazy(lookup::fn_choose),
        });

        // ROWS
        self.add(FunctionDef {
            name: "ROWS",
            min_args: 1,
            max_args: Some(1),
            args: ArgKind::Range,
            eval: Evaluation::Strict(lookup::fn_rows),
        });

        // COLUMNS
        self.add(FunctionDef {
            name: "COLUMNS",
            min_args: 1,
            max_args: Some(1),
            args: ArgKind::Range,
            eval: Evaluation::Strict(lookup::fn_columns),
        });
    }

    fn add_text_functions(&mut self) {
        // CONCATENATE
        self.add(FunctionDef {
            name: "CONCATENATE",
            min_args: 1,
            max_args: None,
            args: ArgKind::Scalar,
            eval: Evaluation::Strict(text::fn_concatenate),
        });

        // CONCAT (accepts ranges)
        self.add(FunctionDef {
            name: "CONCAT",
            min_args: 1,
            max_args: None,
            args: ArgKind::Range,
            eval: Evaluation::Strict(text::fn_concat),
        });

        // TEXTJOIN
        self.add(FunctionDef {
            name: "TEXTJOIN",
            min_args: 3,
            max_args: None,
            args: ArgKind::Range,
            eval: Evaluation::Strict(text::fn_textjoin),
        });

        // LEFT
        self.add(FunctionDef {
            name: "LEFT",
            min_args: 1,
            max_args: Some(2),
            args: ArgKind::Scalar,
            eval: Evaluation::Strict(text::fn_left),
        });

        // RIGHT
        self.add(FunctionDef {
            name: "RIGHT",
            min_args: 1,
            max_args: Some(2),
            args: ArgKind::Scalar,
            eval: Evaluation::Strict(text::fn_right),
        });

        // MID
        self.add(FunctionDef {
            name: "MID",
            min_args: 3,
            max_args: Some(3),
            args: ArgKind::Scalar,
            eval: Evaluation::Strict(text::fn_mid),
        });

        // LEN
        self.add(FunctionDef {
            name: "LEN",
            min_args: 1,
            max_args: Some(1),
            args: ArgKind::Scalar,
            eval: Evaluation::Strict(text::fn_len),
        });

        // UPPER
        self.add(FunctionDef {
            name: "UPPER",
            min_args: 1,
            max_args: Some(1),
            args: ArgKind::Scalar,
            eval: Evaluation::Strict(text::fn_upper),
        });

        // LOWER
        self.add(FunctionDef {
            name: "LOWER",
            min_args: 1,
            max_args: Some(1),
            args: ArgKind::Scalar,
            eval: Evaluation::Strict(text::fn_lower),
        });

        // TRIM
        self.add(FunctionDef {
            name: "TRIM",
            min_args: 1,
            max_args: Some(1),
            args: ArgKind::Scalar,
            eval: Evaluation::Strict(text::fn_trim),
        });

        // EXACT
        self.add(FunctionDef {
            name: "EXACT",
            min_args: 2,
            max_args: Some(2),
            args: ArgKind::Scalar,
            eval: Evaluation::Strict(text::fn_exact),
        });

        // FIND
        self.add(FunctionDef {
            name: "FIND",
            min_args: 2,
            max_args: Some(3),
            args: ArgKind::Scalar,
            eval: Evaluation::Strict(text::fn_find),
        });

        // SEARCH
        self.add(FunctionDef {
            name: "SEARCH",
            min_args: 2,
            max_args: Some(3),
            args: ArgKind::Scalar,
            eval: Evaluation::Strict(text::fn_search),
        });

        // SUBSTITUTE
        self.add(FunctionDef {
            name: "SUBSTITUTE",
            min_args: 3,
            max_args: Some(4),
            args: ArgKind::Scalar,
            eval: Evaluation::Strict(text::fn_substitute),
        });

        // REPT
        self.add(FunctionDef {
            name: "REPT",
            min_args: 2,
            max_args: Some(2),
            args: ArgKind::Scalar,
            eval: Evaluation::Strict(text::fn_rept),
        });

        // VALUE
        self.add(FunctionDef {
            name: "VALUE",
            min_args: 1,
            max_args: Some(1),
            args: ArgKind::Scalar,
            eval: Evaluation::Strict(text::fn_value),
        });
    }

    fn add_financial_functions(&mut self) {
        // PMT
        self.add(FunctionDef {
            name: "PMT",
            min_args: 3,
            max_args: Some(5),
            args: ArgKind::Scalar,
            eval: Evaluation::Strict(financial::fn_pmt),
        });

        // PV
        self.add(FunctionDef {
            name: "PV",
            min_args: 3,
            max_args: Some(5),
            args: ArgKind::Scalar,
            eval: Evaluation::Strict(financial::fn_pv),
        });

        // FV
        self.add(FunctionDef {
            name: "FV",
            min_args: 3,
            max_args: Some(5),
            args: ArgKind::Scalar,
            eval: Evaluation::Strict(financial::fn_fv),
        });

        // NPER
        self.add(FunctionDef {
            name: "NPER",
            min_args: 3,
            max_args: Some(5),
            args: ArgKind::Scalar,
            eval: Evaluation::Strict(financial::fn_nper),
        });

        // NPV
        self.add(FunctionDef {
            name: "NPV",
            min_args: 2,
            max_args: None,
            args: ArgKind::Range,
            eval: Evaluation::Strict(financial::fn_npv),
        });

        // IRR
        self.add(FunctionDef {
            name: "IRR",
            min_args: 1,
            max_args: Some(2),
            args: ArgKind::Range,
            eval: Evaluation::Strict(financial::fn_irr),
        });

        // RATE
        self.add(FunctionDef {
            name: "RATE",
            min_args: 3,
            max_args: Some(6),
            args: ArgKind::Scalar,
            eval: Evaluation::Strict(financial::fn_rate),
        });
    }
}

// === Argument helpers shared by the implementations ===

/// Scalar value of argument `index`; blank when omitted
pub(crate) fn arg(args: &[Evaluated<'_>], index: usize) -> CellValue {
    args.get(index).map(Evaluated::scalar).unwrap_or_default()
}

pub(crate) fn number_arg(args: &[Evaluated<'_>], index: usize) -> Result<Decimal, CellError> {
    to_number(&arg(args, index))
}

/// Number argument with a default when omitted or left blank
pub(crate) fn number_arg_or(
    args: &[Evaluated<'_>],
    index: usize,
    default: Decimal,
) -> Result<Decimal, CellError> {
    match arg(args, index) {
        CellValue::Empty => Ok(default),
        value => to_number(&value),
    }
}

/// Integer argument, truncated toward zero
pub(crate) fn int_arg(args: &[Evaluated<'_>], index: usize) -> Result<i64, CellError> {
    number_arg(args, index)?.trunc().to_i64().ok_or(CellError::Num)
}

pub(crate) fn text_arg(
    args: &[Evaluated<'_>],
    index: usize,
    ctx: &EvaluationContext<'_>,
) -> Result<String, CellError> {
    to_text(&arg(args, index), ctx.scale)
}

pub(crate) fn bool_arg(args: &[Evaluated<'_>], index: usize) -> Result<bool, CellError> {
    to_bool(&arg(args, index))
}

/// Wrap a checked decimal result, treating overflow as `#NUM!`
pub(crate) fn number(result: Option<Decimal>) -> FunctionResult {
    result.map(CellValue::Number).ok_or(CellError::Num)
}

/// Visit every number an aggregate counts
///
/// Plain arguments are coerced like operands, so text that is not a number
/// is `#VALUE!`. Inside ranges only numbers count; blanks, text and booleans
/// are skipped and errors propagate.
pub(crate) fn for_each_number(
    args: &[Evaluated<'_>],
    mut visit: impl FnMut(Decimal) -> Result<(), CellError>,
) -> Result<(), CellError> {
    for arg in args {
        match arg {
            Evaluated::Value(CellValue::Empty) => {}
            Evaluated::Value(value) => visit(to_number(value)?)?,
            Evaluated::Range(view) => {
                for value in view.populated() {
                    match value {
                        CellValue::Number(n) => visit(*n)?,
                        CellValue::Error(e) => return Err(*e),
                        _ => {}
                    }
                }
            }
        }
    }
    Ok(())
}

/// Every position of `view`, row-major
///
/// Ranges larger than `max_range_cells` are refused with `#NUM!` instead of
/// being walked.
pub(crate) fn dense_values<'a>(
    view: &RangeView<'a>,
    ctx: &EvaluationContext<'_>,
) -> Result<impl Iterator<Item = &'a CellValue> + 'a, CellError> {
    view.dense(ctx.max_range_cells).map_err(|e| too_large(e, ctx))
}

/// Every position of `view` with its offsets; see [`dense_values`]
pub(crate) fn dense_offsets<'a>(
    view: &RangeView<'a>,
    ctx: &EvaluationContext<'_>,
) -> Result<impl Iterator<Item = (u32, u16, &'a CellValue)> + 'a, CellError> {
    view.dense_offsets(ctx.max_range_cells).map_err(|e| too_large(e, ctx))
}

fn too_large(err: FormulaError, ctx: &EvaluationContext<'_>) -> CellError {
    tracing::warn!(cell = ?ctx.cell, "{err}");
    CellError::Num
}

/// Every number an aggregate counts, in argument order
pub(crate) fn collect_numbers(args: &[Evaluated<'_>]) -> Result<Vec<Decimal>, CellError> {
    let mut numbers = Vec::new();
    for_each_number(args, |n| {
        numbers.push(n);
        Ok(())
    })?;
    Ok(numbers)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn fn_double(args: &[Evaluated<'_>], _ctx: &EvaluationContext<'_>) -> FunctionResult {
        number(number_arg(args, 0)?.checked_mul(Decimal::from(2)))
    }

    #[test]
    fn test_lookup_is_case_insensitive() {
        let registry = FunctionRegistry::builtin();
        assert!(registry.contains("sum"));
        assert!(registry.contains("Error.Type"));
        assert!(!registry.contains("RAND"));
    }

    #[test]
    fn test_register_extends_the_table() {
        let mut registry = FunctionRegistry::builtin();
        let before = registry.len();
        let previous = registry
            .register(FunctionDef {
                name: "DOUBLE",
                min_args: 1,
                max_args: Some(1),
                args: ArgKind::Scalar,
                eval: Evaluation::Strict(fn_double),
            })
            .unwrap();
        assert!(previous.is_none());
        assert_eq!(registry.len(), before + 1);
    }

    #[test]
    fn test_register_rejects_bad_definitions() {
        let mut registry = FunctionRegistry::empty();
        let bad_arity = registry.register(FunctionDef {
            name: "BROKEN",
            min_args: 2,
            max_args: Some(1),
            args: ArgKind::Scalar,
            eval: Evaluation::Strict(fn_double),
        });
        assert!(matches!(bad_arity, Err(FormulaError::InvalidFunction { .. })));

        let bad_name = registry.register(FunctionDef {
            name: "1BAD",
            min_args: 0,
            max_args: None,
            args: ArgKind::Scalar,
            eval: Evaluation::Strict(fn_double),
        });
        assert!(bad_name.is_err());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_accepts() {
        let registry = FunctionRegistry::builtin();
        let round = registry.get("ROUND").unwrap();
        assert!(!round.accepts(0));
        assert!(round.accepts(1));
        assert!(round.accepts(2));
        assert!(!round.accepts(3));
    }
}
