//! # gridcalc-formula
//!
//! Formula parser, dependency graph and evaluator for gridcalc.
//!
//! This crate provides:
//! - Formula parsing (text → AST plus references), with a shared parse cache
//! - Formula evaluation (AST → value) against committed workbook state
//! - Built-in spreadsheet functions, dispatched through a registry table
//! - Dependency tracking with aggregate range nodes and cycle detection
//!
//! ## Example
//!
//! ```rust
//! use gridcalc_core::{CellValue, Workbook};
//! use gridcalc_formula::{evaluate_formula, parse, EvaluationContext, FunctionRegistry, ParseLimits};
//!
//! let mut workbook = Workbook::new();
//! let a1 = workbook.key("Sheet1", "A1").unwrap();
//! workbook.set_literal(a1, CellValue::int(4)).unwrap();
//!
//! let registry = FunctionRegistry::builtin();
//! let parsed = parse("=SQRT(A1)+1", &ParseLimits::default()).unwrap();
//! let ctx = EvaluationContext::new(&workbook, &registry, 0);
//! assert_eq!(evaluate_formula(&parsed, &ctx), CellValue::int(3));
//! ```

pub mod ast;
pub mod cache;
pub mod dependency;
pub mod error;
pub mod evaluator;
pub mod functions;
pub mod parser;
pub mod reference;

#[cfg(test)]
mod testing;

pub use ast::{BinaryOperator, Expr, SheetTarget, UnaryOperator};
pub use cache::{CacheStats, FormulaCache};
pub use dependency::{DependencyGraph, Level, Node, Precedent, RangeId, Schedule};
pub use error::{FormulaError, FormulaResult};
pub use evaluator::{evaluate, evaluate_expr, evaluate_formula, EvaluationContext, Evaluated, RangeView};
pub use functions::{ArgKind, Evaluation, FunctionDef, FunctionRegistry, FunctionResult};
pub use parser::{parse, FormulaBody, ParseFailure, ParseLimits, ParsedFormula};
pub use reference::{extract_references, Reference};
