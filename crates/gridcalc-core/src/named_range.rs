//! Named range definitions
//!
//! Names give a meaningful label to a cell, a range or a constant so formulas
//! can say `=Price * TaxRate` instead of `=B4 * Inputs!$B$1`.
//!
//! # Example
//!
//! ```text
//! workbook.define_name("TaxRate", "Inputs!$B$1", NameScope::Workbook)?;
//! workbook.define_name("Discount", "0.05", NameScope::Sheet(0))?;
//! ```

use std::collections::BTreeMap;
use std::str::FromStr;

use rust_decimal::Decimal;

use crate::cell::{split_sheet_prefix, CellAddress, CellRange, CellValue};
use crate::error::{Error, Result};

/// Scope of a named range
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum NameScope {
    /// Available throughout the workbook (global)
    Workbook,
    /// Scoped to a specific sheet (local)
    Sheet(usize),
}

/// What a name was defined to refer to, before sheet resolution
#[derive(Debug, Clone, PartialEq)]
pub enum NameDefinition {
    /// A cell or range; `sheet` is `None` only for sheet-scoped names, which
    /// then refer to their own sheet
    Reference {
        sheet: Option<String>,
        range: CellRange,
    },
    /// A constant value
    Constant(CellValue),
}

impl NameDefinition {
    /// Parse a `refers_to` expression
    ///
    /// Accepts `Sheet!$A$1`, `'Sheet Name'!A1:B2`, a bare `A1` reference,
    /// numbers, `TRUE`/`FALSE` and double-quoted text. A leading `=` is ignored.
    pub fn parse(refers_to: &str) -> Result<Self> {
        let text = refers_to.trim();
        let text = text.strip_prefix('=').unwrap_or(text).trim();
        if text.is_empty() {
            return Err(Error::InvalidName("empty definition".into()));
        }

        if let Some(inner) = text.strip_prefix('"').and_then(|t| t.strip_suffix('"')) {
            return Ok(NameDefinition::Constant(CellValue::text(inner.replace("\"\"", "\""))));
        }
        if text.eq_ignore_ascii_case("TRUE") {
            return Ok(NameDefinition::Constant(CellValue::Boolean(true)));
        }
        if text.eq_ignore_ascii_case("FALSE") {
            return Ok(NameDefinition::Constant(CellValue::Boolean(false)));
        }
        if let Ok(n) = Decimal::from_str(text).or_else(|_| Decimal::from_scientific(text)) {
            return Ok(NameDefinition::Constant(CellValue::Number(n)));
        }

        let (sheet, rest) = split_sheet_prefix(text)?;
        let range = CellRange::parse(rest)
            .map_err(|_| Error::InvalidName(format!("unsupported definition '{refers_to}'")))?;
        Ok(NameDefinition::Reference {
            sheet,
            range: range.relative(),
        })
    }
}

/// A named range definition
#[derive(Debug, Clone, PartialEq)]
pub struct NamedRange {
    /// The name as written; lookups are case-insensitive
    pub name: String,
    /// Scope of this name (workbook-wide or sheet-specific)
    pub scope: NameScope,
    /// The definition as entered, e.g. `Inputs!$B$1` or `0.0725`
    pub refers_to: String,
    /// Parsed form of `refers_to`
    pub definition: NameDefinition,
}

impl NamedRange {
    /// Create a new named range, validating the name and its definition
    pub fn new(name: impl Into<String>, refers_to: impl Into<String>, scope: NameScope) -> Result<Self> {
        let name = name.into();
        let refers_to = refers_to.into();
        validate_name(&name)?;

        let definition = NameDefinition::parse(&refers_to)?;
        if let (NameDefinition::Reference { sheet: None, .. }, NameScope::Workbook) = (&definition, scope) {
            return Err(Error::InvalidName(format!(
                "workbook-scoped name '{name}' must qualify its sheet"
            )));
        }

        Ok(Self {
            name,
            scope,
            refers_to,
            definition,
        })
    }
}

/// Check the syntactic rules for a defined name
///
/// Names start with a letter or `_`, continue with letters, digits, `_` or
/// `.`, and must not be readable as a cell reference or a boolean.
pub fn validate_name(name: &str) -> Result<()> {
    let mut chars = name.chars();
    let valid_start = chars
        .next()
        .is_some_and(|c| c.is_alphabetic() || c == '_');
    let valid_rest = chars.all(|c| c.is_alphanumeric() || c == '_' || c == '.');
    if !valid_start || !valid_rest {
        return Err(Error::InvalidName(format!("'{name}' is not a valid name")));
    }
    if CellAddress::parse(name).is_ok()
        || name.eq_ignore_ascii_case("TRUE")
        || name.eq_ignore_ascii_case("FALSE")
    {
        return Err(Error::InvalidName(format!("'{name}' collides with a reference")));
    }
    Ok(())
}

/// Collection of named ranges keyed by lowercase name and scope
#[derive(Debug, Default, Clone)]
pub struct NamedRangeCollection {
    ranges: BTreeMap<(String, NameScope), NamedRange>,
}

impl NamedRangeCollection {
    /// Create a new empty collection
    pub fn new() -> Self {
        Self::default()
    }

    fn make_key(name: &str, scope: NameScope) -> (String, NameScope) {
        (name.to_lowercase(), scope)
    }

    /// Define or replace a named range, returning the previous definition
    pub fn define(&mut self, range: NamedRange) -> Option<NamedRange> {
        let key = Self::make_key(&range.name, range.scope);
        self.ranges.insert(key, range)
    }

    /// Look up a name as seen from `current_sheet`
    ///
    /// A sheet-scoped name shadows a workbook-scoped name of the same spelling.
    pub fn get(&self, name: &str, current_sheet: usize) -> Option<&NamedRange> {
        self.get_exact(name, NameScope::Sheet(current_sheet))
            .or_else(|| self.get_exact(name, NameScope::Workbook))
    }

    /// Get a named range by exact scope
    pub fn get_exact(&self, name: &str, scope: NameScope) -> Option<&NamedRange> {
        self.ranges.get(&Self::make_key(name, scope))
    }

    /// Remove a named range
    pub fn remove(&mut self, name: &str, scope: NameScope) -> Option<NamedRange> {
        self.ranges.remove(&Self::make_key(name, scope))
    }

    /// Iterate over all named ranges, ordered by name then scope
    pub fn iter(&self) -> impl Iterator<Item = &NamedRange> {
        self.ranges.values()
    }

    pub fn len(&self) -> usize {
        self.ranges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_definition_parsing() {
        assert_eq!(
            NameDefinition::parse("'Job''s Costs'!$A$1:$B$4").unwrap(),
            NameDefinition::Reference {
                sheet: Some("Job's Costs".into()),
                range: CellRange::parse("A1:B4").unwrap(),
            }
        );
        assert_eq!(
            NameDefinition::parse("=0.0725").unwrap(),
            NameDefinition::Constant(CellValue::Number(Decimal::new(725, 4)))
        );
        assert_eq!(
            NameDefinition::parse("\"USD\"").unwrap(),
            NameDefinition::Constant(CellValue::text("USD"))
        );
        assert!(NameDefinition::parse("SUM(").is_err());
    }

    #[test]
    fn test_name_validation() {
        assert!(validate_name("TaxRate").is_ok());
        assert!(validate_name("_total.net").is_ok());
        assert!(validate_name("A1").is_err());
        assert!(validate_name("1st").is_err());
        assert!(validate_name("true").is_err());
        assert!(validate_name("my name").is_err());
    }

    #[test]
    fn test_workbook_scope_requires_sheet() {
        assert!(NamedRange::new("Rate", "$B$1", NameScope::Workbook).is_err());
        assert!(NamedRange::new("Rate", "$B$1", NameScope::Sheet(0)).is_ok());
    }

    #[test]
    fn test_collection_scope_lookup() {
        let mut coll = NamedRangeCollection::new();
        coll.define(NamedRange::new("Rate", "0.05", NameScope::Workbook).unwrap());
        coll.define(NamedRange::new("Rate", "0.08", NameScope::Sheet(0)).unwrap());

        assert_eq!(coll.get("Rate", 0).unwrap().refers_to, "0.08");
        assert_eq!(coll.get("Rate", 1).unwrap().refers_to, "0.05");
    }

    #[test]
    fn test_case_insensitive() {
        let mut coll = NamedRangeCollection::new();
        coll.define(NamedRange::new("TaxRate", "0.05", NameScope::Workbook).unwrap());

        assert!(coll.get("taxrate", 0).is_some());
        assert!(coll.get("TAXRATE", 0).is_some());

        let previous = coll.define(NamedRange::new("TAXRATE", "0.10", NameScope::Workbook).unwrap());
        assert!(previous.is_some());
        assert_eq!(coll.len(), 1);
    }
}
