//! Recalculation passes
//!
//! A pass walks a dependency [`Schedule`] level by level. Cells in one level
//! never read each other, so a wide level may be computed on the thread pool
//! against the committed workbook and then committed in key order. Cyclic
//! components are either flagged `#CIRC!` or iterated to convergence.
//!
//! # Example
//!
//! ```rust
//! use gridcalc::{Edit, Engine, Workbook};
//!
//! let mut engine = Engine::new(Workbook::new()).unwrap();
//! engine.calculate(&[Edit::new("Sheet1", "A1", "10"), Edit::new("Sheet1", "A2", "=A1*3")]).unwrap();
//!
//! let changes = engine.calculate(&[Edit::new("Sheet1", "A1", "15")]).unwrap();
//! assert_eq!(changes.len(), 2);
//! println!("Calculated {} cells", changes.stats.cells_calculated);
//! ```

use std::sync::Arc;

use ahash::AHashMap;
use gridcalc_core::{CellError, CellKey, CellValue, Workbook};
use gridcalc_formula::{Level, ParsedFormula, Schedule};
use rayon::prelude::*;
use rayon::ThreadPool;
use rust_decimal::Decimal;
use serde::Serialize;

use crate::cancel::CancellationToken;
use crate::executor::{CalculationContext, FormulaExecutor};

/// A cell whose committed value changed
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CellChange {
    #[serde(skip)]
    pub key: CellKey,
    pub sheet: String,
    /// A1 address within `sheet`
    pub address: String,
    pub value: CellValue,
}

/// Statistics from a calculation pass
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CalculationStats {
    /// Formula cells registered in the workbook
    pub formula_count: usize,
    /// Formula evaluations performed, iterations included
    pub cells_calculated: usize,
    /// Levels committed
    pub levels: usize,
    /// Levels computed on the thread pool
    pub parallel_levels: usize,
    /// Cells that are members of a cyclic component
    pub circular_references: usize,
    /// Sweeps performed over cyclic components in iterative mode
    pub iterations: u32,
    /// Committed values that are errors
    pub errors: usize,
}

/// A cyclic component that did not settle within `max_iterations`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NonConvergence {
    /// `Sheet!A1` addresses of the component, sorted by key
    pub cells: Vec<String>,
    pub iterations: u32,
    /// Largest absolute change during the final sweep
    pub max_delta: Decimal,
}

/// Result of a recalculation pass
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ChangeSet {
    /// Cells whose committed value changed, sorted by key
    pub changes: Vec<CellChange>,
    pub stats: CalculationStats,
    pub non_convergent: Vec<NonConvergence>,
    /// False when the pass was cancelled between levels
    pub completed: bool,
}

impl ChangeSet {
    pub fn len(&self) -> usize {
        self.changes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    /// New value of a changed cell
    pub fn get(&self, key: CellKey) -> Option<&CellValue> {
        self.changes
            .binary_search_by_key(&key, |change| change.key)
            .ok()
            .map(|i| &self.changes[i].value)
    }

    /// New value by sheet name and A1 address
    pub fn value(&self, sheet: &str, address: &str) -> Option<&CellValue> {
        self.changes
            .iter()
            .find(|change| change.sheet.eq_ignore_ascii_case(sheet) && change.address.eq_ignore_ascii_case(address))
            .map(|change| &change.value)
    }

    pub fn iter(&self) -> impl Iterator<Item = &CellChange> {
        self.changes.iter()
    }

    pub(crate) fn from_context(workbook: &Workbook, ctx: &CalculationContext<'_>) -> Self {
        let changes = ctx
            .changes(workbook)
            .into_iter()
            .map(|(key, value)| CellChange {
                key,
                sheet: workbook.sheet_name(key.sheet).unwrap_or_default().to_string(),
                address: key.address().to_a1_string(),
                value,
            })
            .collect();
        Self {
            changes,
            completed: true,
            ..Self::default()
        }
    }
}

/// What a pass left behind
#[derive(Debug, Default)]
pub(crate) struct PassOutcome {
    pub stats: CalculationStats,
    pub non_convergent: Vec<NonConvergence>,
    /// Scheduled cells not evaluated because the pass was cancelled
    pub skipped: Vec<CellKey>,
}

/// One recalculation pass over a schedule
pub(crate) struct Recalculation<'e> {
    pub workbook: &'e mut Workbook,
    pub formulas: &'e AHashMap<CellKey, Arc<ParsedFormula>>,
    pub pool: Option<&'e ThreadPool>,
}

impl Recalculation<'_> {
    pub fn run(mut self, schedule: &Schedule, ctx: &mut CalculationContext<'_>, cancel: &CancellationToken) -> PassOutcome {
        let mut outcome = PassOutcome::default();
        tracing::debug!(
            "Recalculating {} cells in {} levels ({} cyclic components)",
            schedule.len(),
            schedule.levels.len(),
            schedule.cycles.len()
        );

        for (index, level) in schedule.levels.iter().enumerate() {
            if cancel.is_cancelled() {
                outcome.skipped = schedule.levels[index..]
                    .iter()
                    .flat_map(|level| level.cells.iter().chain(level.cycles.iter().flatten()).copied())
                    .collect();
                tracing::warn!(
                    "Recalculation cancelled after {index} of {} levels; {} cells left dirty",
                    schedule.levels.len(),
                    outcome.skipped.len()
                );
                break;
            }

            self.level(level, ctx, &mut outcome);
            outcome.stats.levels += 1;
        }

        outcome.stats.cells_calculated = ctx.evaluated;
        outcome
    }

    fn level(&mut self, level: &Level, ctx: &mut CalculationContext<'_>, outcome: &mut PassOutcome) {
        let settings = self.workbook.settings();
        let parallel = settings.parallel && level.cells.len() >= settings.parallel_threshold.max(2);
        let iterative = settings.iterative;

        if parallel {
            self.commit_parallel(&level.cells, ctx);
            outcome.stats.parallel_levels += 1;
        } else {
            let formulas = self.formulas;
            for &key in &level.cells {
                if let Some(parsed) = formulas.get(&key) {
                    FormulaExecutor::evaluate(self.workbook, key, parsed, ctx);
                }
            }
        }

        for component in &level.cycles {
            outcome.stats.circular_references += component.len();
            if iterative {
                if let Some(failure) = self.iterate(component, ctx, &mut outcome.stats) {
                    outcome.non_convergent.push(failure);
                }
            } else {
                self.flag_circular(component, ctx);
            }
        }
    }

    // Independent cells of one level: compute against the committed
    // workbook, then commit in key order.
    fn commit_parallel(&mut self, cells: &[CellKey], ctx: &mut CalculationContext<'_>) {
        let workbook: &Workbook = self.workbook;
        let registry = ctx.registry;
        let formulas = self.formulas;

        let job = || -> Vec<(CellKey, CellValue)> {
            cells
                .par_iter()
                .filter_map(|&key| {
                    let parsed = formulas.get(&key)?;
                    Some((key, FormulaExecutor::compute(workbook, registry, key, parsed)))
                })
                .collect()
        };
        let results = match self.pool {
            Some(pool) => pool.install(job),
            None => job(),
        };

        for (key, value) in results {
            ctx.evaluated += 1;
            FormulaExecutor::commit(self.workbook, key, value, ctx);
        }
    }

    fn flag_circular(&mut self, component: &[CellKey], ctx: &mut CalculationContext<'_>) {
        let addresses: Vec<String> = component
            .iter()
            .map(|key| self.workbook.qualified_address(*key))
            .collect();
        tracing::warn!("Circular reference: {}", addresses.join(", "));

        for &key in component {
            FormulaExecutor::commit(self.workbook, key, CellValue::Error(CellError::Circular), ctx);
        }
    }

    /// Gauss-Seidel sweeps in key order until the largest change is below
    /// epsilon; `Some` when `max_iterations` ran out first
    fn iterate(
        &mut self,
        component: &[CellKey],
        ctx: &mut CalculationContext<'_>,
        stats: &mut CalculationStats,
    ) -> Option<NonConvergence> {
        let max_iterations = self.workbook.settings().max_iterations.max(1);
        let epsilon = self.workbook.settings().epsilon;
        let formulas = self.formulas;
        let mut max_delta = Decimal::ZERO;

        for iteration in 1..=max_iterations {
            max_delta = Decimal::ZERO;
            let mut settled = true;

            for &key in component {
                let Some(parsed) = formulas.get(&key) else {
                    continue;
                };
                let before = self.workbook.value(key);
                let after = FormulaExecutor::evaluate(self.workbook, key, parsed, ctx);
                match delta(&before, &after) {
                    Some(d) => max_delta = max_delta.max(d),
                    None => settled = false,
                }
            }
            stats.iterations += 1;

            if settled && max_delta < epsilon {
                tracing::debug!(
                    "Cyclic component of {} cells converged after {iteration} iterations",
                    component.len()
                );
                return None;
            }
        }

        let cells: Vec<String> = component
            .iter()
            .map(|key| self.workbook.qualified_address(*key))
            .collect();
        tracing::warn!(
            "No convergence after {max_iterations} iterations (max delta {max_delta}): {}",
            cells.join(", ")
        );
        Some(NonConvergence {
            cells,
            iterations: max_iterations,
            max_delta,
        })
    }
}

/// Absolute change between two iterates; `None` when a non-numeric value
/// changed
fn delta(before: &CellValue, after: &CellValue) -> Option<Decimal> {
    let number = |value: &CellValue| match value {
        CellValue::Number(n) => Some(*n),
        CellValue::Empty => Some(Decimal::ZERO),
        _ => None,
    };
    match (number(before), number(after)) {
        (Some(a), Some(b)) => Some((b - a).abs()),
        _ if before == after => Some(Decimal::ZERO),
        _ => None,
    }
}
