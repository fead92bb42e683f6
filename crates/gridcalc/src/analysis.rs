//! Workbook structure analysis
//!
//! Categorizes formulas by the functions they call, finds formulas with many
//! inputs and maps every precedent to the cells that read it.

use std::collections::BTreeMap;
use std::fmt;
use std::fmt::Write as _;

use gridcalc_core::{CellAddress, CellKey, NameScope, Workbook};
use gridcalc_formula::{ParsedFormula, Reference};
use lazy_regex::regex_is_match;
use serde::{Deserialize, Serialize};

use crate::engine::Engine;
use crate::error::EngineResult;

/// Default threshold for [`WorkbookAnalysis::complex_formulas`]
pub const DEFAULT_MIN_DEPENDENCIES: usize = 5;

/// Broad class of a formula, used for reporting and validation triage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum FormulaCategory {
    Financial,
    Lookup,
    Statistical,
    Math,
    Logical,
    Text,
    DateTime,
    /// Operators, references and literals only
    Arithmetic,
    /// A literal cell rather than a formula
    Constant,
    Other,
}

impl FormulaCategory {
    /// Categories that a called function can select, highest priority first
    const BY_PRIORITY: [FormulaCategory; 7] = [
        FormulaCategory::Financial,
        FormulaCategory::Lookup,
        FormulaCategory::Statistical,
        FormulaCategory::Math,
        FormulaCategory::Logical,
        FormulaCategory::Text,
        FormulaCategory::DateTime,
    ];

    /// Whether calling `function` puts a formula in this category
    fn covers(self, function: &str) -> bool {
        match self {
            FormulaCategory::Financial => regex_is_match!(r"^(PMT|PV|FV|RATE|NPV|IRR|NPER)$"i, function),
            FormulaCategory::Lookup => regex_is_match!(r"^(VLOOKUP|HLOOKUP|INDEX|MATCH|XLOOKUP)$"i, function),
            FormulaCategory::Statistical => {
                regex_is_match!(r"^(AVERAGE[\w.]*|STDEV[\w.]*|VAR[\w.]*|MEDIAN|MODE[\w.]*|MIN|MAX|COUNT\w*)$"i, function)
            }
            FormulaCategory::Math => regex_is_match!(
                r"^(SUM\w*|PRODUCT|SQRT|POWER|LOG\w*|LN|EXP|ROUND\w*|ABS|INT|TRUNC|MOD|CEILING|FLOOR|SIGN|PI)$"i,
                function
            ),
            FormulaCategory::Logical => regex_is_match!(r"^(IF\w*|AND|OR|NOT|XOR|TRUE|FALSE)$"i, function),
            FormulaCategory::Text => regex_is_match!(
                r"^(CONCAT\w*|TEXTJOIN|LEFT|RIGHT|MID|LEN|UPPER|LOWER|TRIM|EXACT|FIND|SEARCH|SUBSTITUTE|REPT|VALUE|TEXT)$"i,
                function
            ),
            FormulaCategory::DateTime => regex_is_match!(
                r"^(DATE\w*|TIME\w*|NOW|TODAY|YEAR|MONTH|DAY|HOUR|MINUTE|SECOND|WEEKDAY|EDATE|EOMONTH)$"i,
                function
            ),
            FormulaCategory::Arithmetic | FormulaCategory::Constant | FormulaCategory::Other => false,
        }
    }

    /// Category of a parsed formula
    ///
    /// # Example
    /// ```
    /// use gridcalc::{parse, FormulaCategory, ParseLimits};
    ///
    /// let parsed = parse("=IF(A1>0, PMT(0.05/12, 60, -A1), 0)", &ParseLimits::default()).unwrap();
    /// assert_eq!(FormulaCategory::of(&parsed), FormulaCategory::Financial);
    /// ```
    pub fn of(parsed: &ParsedFormula) -> Self {
        let Some(expr) = parsed.expr() else {
            return FormulaCategory::Other;
        };
        let functions = expr.function_names();
        if functions.is_empty() {
            return FormulaCategory::Arithmetic;
        }
        Self::BY_PRIORITY
            .into_iter()
            .find(|category| functions.iter().any(|f| category.covers(f)))
            .unwrap_or(FormulaCategory::Other)
    }
}

impl fmt::Display for FormulaCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FormulaCategory::Financial => "Financial",
            FormulaCategory::Lookup => "Lookup",
            FormulaCategory::Statistical => "Statistical",
            FormulaCategory::Math => "Math",
            FormulaCategory::Logical => "Logical",
            FormulaCategory::Text => "Text",
            FormulaCategory::DateTime => "DateTime",
            FormulaCategory::Arithmetic => "Arithmetic",
            FormulaCategory::Constant => "Constant",
            FormulaCategory::Other => "Other",
        };
        f.pad(name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SheetInfo {
    pub name: String,
    pub used_rows: u32,
    pub used_columns: u16,
    pub formula_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NamedRangeInfo {
    pub name: String,
    /// `Workbook` or the owning sheet's name
    pub scope: String,
    pub refers_to: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FormulaInfo {
    pub sheet: String,
    pub cell: String,
    pub formula: String,
    pub category: FormulaCategory,
    /// References as `Sheet!A1`, `Sheet!A1:B2` or a name
    pub dependencies: Vec<String>,
}

/// Structural summary of an engine's workbook
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WorkbookAnalysis {
    pub total_formulas: usize,
    pub sheet_count: usize,
    pub sheets: Vec<SheetInfo>,
    pub category_summary: BTreeMap<FormulaCategory, usize>,
    pub named_ranges: Vec<NamedRangeInfo>,
    pub formulas: Vec<FormulaInfo>,
    /// Formulas with at least `min_dependencies` references, most first
    pub complex_formulas: Vec<FormulaInfo>,
    /// Precedent → formula cells that reference it
    pub dependencies: BTreeMap<String, Vec<String>>,
}

impl WorkbookAnalysis {
    pub fn of(engine: &Engine, min_dependencies: usize) -> Self {
        let workbook = engine.workbook();

        let formulas: Vec<FormulaInfo> = engine
            .formula_cells()
            .into_iter()
            .map(|(key, parsed)| FormulaInfo {
                sheet: workbook.sheet_name(key.sheet).unwrap_or_default().to_string(),
                cell: key.address().to_a1_string(),
                formula: parsed.text.to_string(),
                category: FormulaCategory::of(parsed),
                dependencies: parsed
                    .references
                    .iter()
                    .map(|reference| qualify(workbook, key, reference))
                    .collect(),
            })
            .collect();

        let mut category_summary = BTreeMap::new();
        let mut dependencies: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for info in &formulas {
            *category_summary.entry(info.category).or_insert(0) += 1;
            let cell = qualified_cell(workbook, &info.sheet, &info.cell);
            for dependency in &info.dependencies {
                dependencies.entry(dependency.clone()).or_default().push(cell.clone());
            }
        }

        let mut complex_formulas: Vec<FormulaInfo> = formulas
            .iter()
            .filter(|info| info.dependencies.len() >= min_dependencies)
            .cloned()
            .collect();
        complex_formulas.sort_by(|a, b| b.dependencies.len().cmp(&a.dependencies.len()));

        let sheets = workbook
            .worksheets()
            .map(|worksheet| {
                let (used_rows, used_columns) = worksheet
                    .used_range()
                    .map_or((0, 0), |range| (range.end.row + 1, range.end.col + 1));
                SheetInfo {
                    name: worksheet.name().to_string(),
                    used_rows,
                    used_columns,
                    formula_count: worksheet.formula_count(),
                }
            })
            .collect();

        let named_ranges = workbook
            .names()
            .iter()
            .map(|named| NamedRangeInfo {
                name: named.name.clone(),
                scope: match named.scope {
                    NameScope::Workbook => "Workbook".to_string(),
                    NameScope::Sheet(index) => workbook.sheet_name(index).unwrap_or_default().to_string(),
                },
                refers_to: named.refers_to.clone(),
            })
            .collect();

        Self {
            total_formulas: formulas.len(),
            sheet_count: workbook.sheet_count(),
            sheets,
            category_summary,
            named_ranges,
            formulas,
            complex_formulas,
            dependencies,
        }
    }

    pub fn to_json(&self) -> EngineResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Plain-text summary: categories, the most complex formulas and sheets
    pub fn report(&self) -> String {
        let rule = "=".repeat(60);
        let mut out = String::new();
        // Writing to a String cannot fail
        let _ = writeln!(out, "{rule}\nFORMULA ANALYSIS SUMMARY REPORT\n{rule}");
        let _ = writeln!(out, "\nTotal Sheets: {}", self.sheet_count);
        let _ = writeln!(out, "Total Formulas: {}", self.total_formulas);

        let _ = writeln!(out, "\nFormulas by Category:");
        let mut categories: Vec<(&FormulaCategory, &usize)> = self.category_summary.iter().collect();
        categories.sort_by(|a, b| b.1.cmp(a.1).then(a.0.cmp(b.0)));
        for (category, count) in categories {
            let percentage = if self.total_formulas > 0 {
                *count as f64 * 100.0 / self.total_formulas as f64
            } else {
                0.0
            };
            let _ = writeln!(out, "  {category:<15} {count:>6} ({percentage:>5.1}%)");
        }

        let _ = writeln!(out, "\nNamed Ranges: {}", self.named_ranges.len());
        let _ = writeln!(out, "\nTop 5 Most Complex Formulas (by dependency count):");
        for (i, info) in self.complex_formulas.iter().take(5).enumerate() {
            let _ = writeln!(
                out,
                "  {}. {}!{} - {} dependencies",
                i + 1,
                info.sheet,
                info.cell,
                info.dependencies.len()
            );
        }

        let _ = writeln!(out, "\nSheets Overview:");
        for sheet in &self.sheets {
            let _ = writeln!(
                out,
                "  {:<30} {:>6} rows x {:>4} cols, {:>6} formulas",
                sheet.name, sheet.used_rows, sheet.used_columns, sheet.formula_count
            );
        }
        out
    }
}

fn qualified_cell(workbook: &Workbook, sheet: &str, cell: &str) -> String {
    match (workbook.sheet_index(sheet), CellAddress::parse(cell)) {
        (Some(index), Ok(address)) => workbook.qualified_address(CellKey::from_address(index, address)),
        _ => format!("{sheet}!{cell}"),
    }
}

/// Display form of a reference made from the formula at `key`
fn qualify(workbook: &Workbook, key: CellKey, reference: &Reference) -> String {
    let sheet_name = |sheet: &Option<String>| -> String {
        let name = match sheet {
            Some(name) => workbook
                .sheet_index(name)
                .and_then(|index| workbook.sheet_name(index))
                .unwrap_or(name.as_str()),
            None => workbook.sheet_name(key.sheet).unwrap_or_default(),
        };
        if name.chars().all(|c| c.is_alphanumeric() || c == '_') {
            name.to_string()
        } else {
            format!("'{}'", name.replace('\'', "''"))
        }
    };
    match reference {
        Reference::Cell { sheet, address } => format!("{}!{address}", sheet_name(sheet)),
        Reference::Range { sheet, range } => format!("{}!{range}", sheet_name(sheet)),
        Reference::Name(name) => name.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::import::WorkbookSource;
    use gridcalc_formula::{parse, ParseLimits};
    use pretty_assertions::assert_eq;

    fn category(formula: &str) -> FormulaCategory {
        FormulaCategory::of(&parse(formula, &ParseLimits::default()).unwrap())
    }

    #[test]
    fn test_categorize_by_priority() {
        assert_eq!(category("=SUM(A1:A3)*PMT(0.1,2,3)"), FormulaCategory::Financial);
        assert_eq!(category("=IF(A1,VLOOKUP(1,B1:C3,2,FALSE),0)"), FormulaCategory::Lookup);
        assert_eq!(category("=COUNTIFS(A:A,\">1\")"), FormulaCategory::Statistical);
        assert_eq!(category("=ROUND(A1,2)"), FormulaCategory::Math);
        assert_eq!(category("=IFERROR(A1/B1,0)"), FormulaCategory::Logical);
        assert_eq!(category("=left(A1,2)"), FormulaCategory::Text);
        assert_eq!(category("=TODAY()"), FormulaCategory::DateTime);
        assert_eq!(category("=A1*(B1+2)"), FormulaCategory::Arithmetic);
        assert_eq!(category("=ISNUMBER(A1)"), FormulaCategory::Other);
        assert_eq!(category("=SUM(("), FormulaCategory::Other);
    }

    #[test]
    fn test_analysis() {
        let source = WorkbookSource::from_json(
            r#"{
                "sheets": [
                    { "name": "Inputs", "cells": { "A1": 1, "A2": 2, "A3": 3, "B1": 0.05 } },
                    { "name": "Calc", "cells": {
                        "A1": "=SUM(Inputs!A1:A3)",
                        "A2": "=Inputs!A1+Inputs!A2+Inputs!A3+Inputs!B1+A1",
                        "A3": "=PMT(Rate,12,A1)"
                    } }
                ],
                "names": [{ "name": "Rate", "refers_to": "Inputs!$B$1" }]
            }"#,
        )
        .unwrap();
        let (engine, _) = Engine::import(&source).unwrap();
        let analysis = WorkbookAnalysis::of(&engine, 5);

        assert_eq!(analysis.total_formulas, 3);
        assert_eq!(analysis.sheet_count, 2);
        assert_eq!(analysis.category_summary[&FormulaCategory::Math], 1);
        assert_eq!(analysis.category_summary[&FormulaCategory::Arithmetic], 1);
        assert_eq!(analysis.category_summary[&FormulaCategory::Financial], 1);
        assert_eq!(analysis.complex_formulas.len(), 1);
        assert_eq!(analysis.complex_formulas[0].cell, "A2");
        assert_eq!(analysis.dependencies["Calc!A1"], vec!["Calc!A2".to_string(), "Calc!A3".to_string()]);
        assert_eq!(analysis.dependencies["Inputs!A1:A3"], vec!["Calc!A1".to_string()]);
        assert_eq!(analysis.dependencies["rate"], vec!["Calc!A3".to_string()]);
        assert_eq!(
            analysis.sheets[0],
            SheetInfo {
                name: "Inputs".into(),
                used_rows: 3,
                used_columns: 2,
                formula_count: 0
            }
        );
        assert_eq!(analysis.named_ranges[0].scope, "Workbook");

        let report = analysis.report();
        assert!(report.contains("Total Formulas: 3"));
        assert!(report.contains("  1. Calc!A2 - 5 dependencies"));
        assert!(analysis.to_json().unwrap().contains("\"Financial\": 1"));
    }
}
