//! References extracted from a parsed formula

use std::fmt;

use gridcalc_core::{CellAddress, CellRange};

use crate::ast::{Expr, SheetTarget};

/// A reference a formula reads from
///
/// Addresses are stored without `$` markers; absolute and relative forms of
/// the same cell are one reference. Names are lowercased.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Reference {
    Cell {
        sheet: Option<String>,
        address: CellAddress,
    },
    Range {
        sheet: Option<String>,
        range: CellRange,
    },
    Name(String),
}

impl fmt::Display for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reference::Cell { sheet: Some(s), address } => write!(f, "{s}!{address}"),
            Reference::Cell { sheet: None, address } => write!(f, "{address}"),
            Reference::Range { sheet: Some(s), range } => write!(f, "{s}!{range}"),
            Reference::Range { sheet: None, range } => write!(f, "{range}"),
            Reference::Name(name) => f.write_str(name),
        }
    }
}

/// Collect the references of an expression, deduplicated, in first-seen order
pub fn extract_references(expr: &Expr) -> Vec<Reference> {
    let mut refs: Vec<Reference> = Vec::new();
    expr.walk(&mut |node| {
        let reference = match node {
            Expr::CellRef(address) => Reference::Cell {
                sheet: None,
                address: address.relative(),
            },
            Expr::RangeRef(range) => Reference::Range {
                sheet: None,
                range: range.relative(),
            },
            Expr::SheetQualifiedRef { sheet, target } => match target {
                SheetTarget::Cell(address) => Reference::Cell {
                    sheet: Some(sheet.clone()),
                    address: address.relative(),
                },
                SheetTarget::Range(range) => Reference::Range {
                    sheet: Some(sheet.clone()),
                    range: range.relative(),
                },
            },
            Expr::Name(name) => Reference::Name(name.to_lowercase()),
            _ => return,
        };
        if !refs.contains(&reference) {
            refs.push(reference);
        }
    });
    refs
}
