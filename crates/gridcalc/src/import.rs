//! Bulk import format
//!
//! A workbook arrives as JSON: settings, sheets of `A1 → value` cells and
//! defined names. Formulas are plain strings starting with `=`.
//!
//! ```json
//! {
//!   "sheets": [{ "name": "Sheet1", "cells": { "A1": 10, "A2": "=A1*2" } }],
//!   "names": [{ "name": "Rate", "refers_to": "Sheet1!$A$1" }]
//! }
//! ```

use std::collections::BTreeMap;
use std::io::Read;

use gridcalc_core::{CalculationSettings, NameScope, Workbook};
use serde::{Deserialize, Serialize};

use crate::edit::Edit;
use crate::error::{EngineError, EngineResult};

/// A workbook as loaded at open time
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkbookSource {
    #[serde(default)]
    pub settings: Option<CalculationSettings>,
    #[serde(default)]
    pub sheets: Vec<SheetSource>,
    #[serde(default)]
    pub names: Vec<NameSource>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SheetSource {
    pub name: String,
    #[serde(default)]
    pub cells: BTreeMap<String, serde_json::Value>,
}

/// A defined name; `sheet` set means sheet scope
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NameSource {
    pub name: String,
    pub refers_to: String,
    #[serde(default)]
    pub sheet: Option<String>,
}

impl WorkbookSource {
    pub fn from_json(json: &str) -> EngineResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_reader<R: Read>(reader: R) -> EngineResult<Self> {
        Ok(serde_json::from_reader(reader)?)
    }

    /// Empty workbook with the sheets, names and settings of this source
    ///
    /// With no sheets listed the workbook gets the default `Sheet1`.
    pub fn skeleton(&self) -> EngineResult<Workbook> {
        let mut workbook = if self.sheets.is_empty() {
            Workbook::new()
        } else {
            Workbook::empty()
        };
        if let Some(settings) = &self.settings {
            *workbook.settings_mut() = settings.clone();
        }
        for sheet in &self.sheets {
            workbook.add_worksheet_with_name(&sheet.name)?;
        }
        for name in &self.names {
            let scope = match &name.sheet {
                Some(sheet) => NameScope::Sheet(workbook.require_sheet(sheet)?),
                None => NameScope::Workbook,
            };
            workbook.define_name(&name.name, &name.refers_to, scope)?;
        }
        Ok(workbook)
    }

    /// Every populated cell as an edit, sheet by sheet
    pub fn edits(&self) -> EngineResult<Vec<Edit>> {
        let mut edits = Vec::new();
        for sheet in &self.sheets {
            for (cell, value) in &sheet.cells {
                if let Some(input) = input_text(value) {
                    edits.push(Edit::new(&sheet.name, cell, input));
                } else if !value.is_null() {
                    return Err(EngineError::invalid_edit(
                        format!("{}!{}", sheet.name, cell),
                        "cell values must be numbers, booleans, strings or null",
                    ));
                }
            }
        }
        Ok(edits)
    }
}

/// Edit input for a JSON cell value; `None` for null and containers
pub(crate) fn input_text(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::Number(n) => Some(n.to_string()),
        serde_json::Value::Bool(true) => Some("TRUE".into()),
        serde_json::Value::Bool(false) => Some("FALSE".into()),
        serde_json::Value::String(s) => Some(s.clone()),
        serde_json::Value::Null | serde_json::Value::Array(_) | serde_json::Value::Object(_) => None,
    }
}
