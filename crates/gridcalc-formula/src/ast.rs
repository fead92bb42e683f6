//! Formula Abstract Syntax Tree types

use gridcalc_core::{CellAddress, CellRange, CellValue};

/// Formula expression AST
///
/// Trees are immutable once parsed and shared between cells through
/// [`crate::FormulaCache`].
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// Number, text, boolean or error literal
    Literal(CellValue),
    /// Cell on the formula's own sheet
    CellRef(CellAddress),
    /// Range on the formula's own sheet
    RangeRef(CellRange),
    /// `Sheet!A1` or `'Sheet Name'!A1:B2`
    SheetQualifiedRef { sheet: String, target: SheetTarget },
    /// Defined name
    Name(String),
    /// Function call; `name` is uppercase
    FunctionCall { name: String, args: Vec<Expr> },
    BinaryOp {
        op: BinaryOperator,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    UnaryOp {
        op: UnaryOperator,
        operand: Box<Expr>,
    },
}

/// Target of a sheet-qualified reference
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SheetTarget {
    Cell(CellAddress),
    Range(CellRange),
}

/// Binary operators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOperator {
    // Arithmetic
    Add,
    Subtract,
    Multiply,
    Divide,
    Power,

    // Comparison
    Equal,
    NotEqual,
    LessThan,
    LessEqual,
    GreaterThan,
    GreaterEqual,

    // Text
    Concat,
}

impl BinaryOperator {
    pub fn is_comparison(&self) -> bool {
        matches!(
            self,
            BinaryOperator::Equal
                | BinaryOperator::NotEqual
                | BinaryOperator::LessThan
                | BinaryOperator::LessEqual
                | BinaryOperator::GreaterThan
                | BinaryOperator::GreaterEqual
        )
    }
}

/// Unary operators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOperator {
    Negate,
    Plus,
    Percent,
}

impl Expr {
    /// Visit this node and all of its descendants, parents first
    pub fn walk<'a>(&'a self, visit: &mut impl FnMut(&'a Expr)) {
        visit(self);
        match self {
            Expr::FunctionCall { args, .. } => {
                for arg in args {
                    arg.walk(visit);
                }
            }
            Expr::BinaryOp { left, right, .. } => {
                left.walk(visit);
                right.walk(visit);
            }
            Expr::UnaryOp { operand, .. } => operand.walk(visit),
            Expr::Literal(_)
            | Expr::CellRef(_)
            | Expr::RangeRef(_)
            | Expr::SheetQualifiedRef { .. }
            | Expr::Name(_) => {}
        }
    }

    /// Names of every function called anywhere in the tree, in call order
    pub fn function_names(&self) -> Vec<&str> {
        let mut names = Vec::new();
        self.walk(&mut |node| {
            if let Expr::FunctionCall { name, .. } = node {
                names.push(name.as_str());
            }
        });
        names
    }
}
