//! The calculation engine
//!
//! [`Engine`] owns a [`Workbook`] together with everything derived from it:
//! parsed formulas, the dependency graph and the parse cache. Edits go in,
//! change-sets come out.

use std::collections::BTreeSet;
use std::sync::Arc;

use ahash::AHashMap;
use gridcalc_core::{CellAddress, CellKey, CellValue, NameScope, NameTarget, Workbook};
use gridcalc_formula::{
    CacheStats, DependencyGraph, FormulaCache, FunctionDef, FunctionRegistry, ParseLimits, ParsedFormula, Precedent,
    Reference,
};
use rayon::ThreadPool;

use crate::calculation::{ChangeSet, Recalculation};
use crate::cancel::CancellationToken;
use crate::edit::{Edit, EditInput};
use crate::error::{EngineError, EngineResult};
use crate::executor::CalculationContext;
use crate::import::WorkbookSource;

/// An edit after preflight, ready to apply
enum Prepared {
    Formula(Arc<ParsedFormula>),
    Literal(CellValue),
    Clear,
}

/// Incremental recalculation engine for one workbook
///
/// Independent engines share nothing and may run on separate threads.
#[derive(Debug)]
pub struct Engine {
    workbook: Workbook,
    graph: DependencyGraph,
    cache: FormulaCache,
    formulas: AHashMap<CellKey, Arc<ParsedFormula>>,
    registry: FunctionRegistry,
    /// Cells still dirty from a cancelled pass
    pending: BTreeSet<CellKey>,
    pool: Option<Arc<ThreadPool>>,
}

impl Engine {
    /// Take ownership of a workbook
    ///
    /// Formula cells already in the workbook are parsed and registered; they
    /// are evaluated by the next pass.
    pub fn new(workbook: Workbook) -> EngineResult<Self> {
        let mut engine = Self {
            workbook,
            graph: DependencyGraph::new(),
            cache: FormulaCache::new(),
            formulas: AHashMap::new(),
            registry: FunctionRegistry::builtin(),
            pending: BTreeSet::new(),
            pool: None,
        };

        let limits = ParseLimits::from(engine.workbook.settings());
        let mut existing: Vec<(CellKey, String)> = Vec::new();
        for (sheet, worksheet) in engine.workbook.worksheets().enumerate() {
            for (row, col, text) in worksheet.formula_cells() {
                existing.push((CellKey::new(sheet, row, col), text.to_string()));
            }
        }
        for (key, text) in existing {
            let parsed = engine
                .cache
                .get_or_parse(&text, &limits)
                .map_err(|source| EngineError::Formula {
                    location: engine.workbook.qualified_address(key),
                    source,
                })?;
            engine.install(key, parsed);
            engine.pending.insert(key);
        }

        Ok(engine)
    }

    /// Bulk import followed by a full recalculation
    ///
    /// The returned change-set is the initial committed state: every
    /// populated cell with its value.
    pub fn import(source: &WorkbookSource) -> EngineResult<(Self, ChangeSet)> {
        let workbook = source.skeleton()?;
        let edits = source.edits()?;
        let mut engine = Self::new(workbook)?;

        let prepared = engine.preflight(&edits)?;
        let baseline = engine.apply(prepared)?;
        let roots: Vec<CellKey> = engine.formulas.keys().copied().collect();
        let changes = engine.run_pass(roots, baseline, &CancellationToken::new());

        tracing::debug!(
            "Imported {} sheets, {} cells, {} formulas",
            engine.workbook.sheet_count(),
            edits.len(),
            engine.formulas.len()
        );
        Ok((engine, changes))
    }

    /// Use a dedicated pool of `threads` workers for wide levels
    pub fn set_thread_count(&mut self, threads: usize) -> EngineResult<()> {
        let pool = rayon::ThreadPoolBuilder::new().num_threads(threads).build()?;
        self.pool = Some(Arc::new(pool));
        Ok(())
    }

    /// Register or replace a function
    ///
    /// Formulas calling it are recalculated by the next pass.
    pub fn register_function(&mut self, def: FunctionDef) -> EngineResult<Option<FunctionDef>> {
        let name = def.name;
        let previous = self.registry.register(def).map_err(|source| EngineError::Formula {
            location: format!("function {name}"),
            source,
        })?;

        for (key, parsed) in &self.formulas {
            let calls = parsed
                .expr()
                .is_some_and(|expr| expr.function_names().iter().any(|f| f.eq_ignore_ascii_case(name)));
            if calls {
                self.pending.insert(*key);
            }
        }
        Ok(previous)
    }

    // ==================== Edits ====================

    /// Apply edits and recalculate everything they affect
    ///
    /// On `Err` nothing was changed.
    ///
    /// # Example
    /// ```
    /// use gridcalc::{CellValue, Edit, Engine, Workbook};
    ///
    /// let mut engine = Engine::new(Workbook::new()).unwrap();
    /// engine
    ///     .calculate(&[
    ///         Edit::new("Sheet1", "A1", "10"),
    ///         Edit::new("Sheet1", "A2", "20"),
    ///         Edit::new("Sheet1", "A3", "=A1+A2"),
    ///     ])
    ///     .unwrap();
    ///
    /// let changes = engine.calculate(&[Edit::new("Sheet1", "A1", "15")]).unwrap();
    /// assert_eq!(changes.value("Sheet1", "A3"), Some(&CellValue::int(35)));
    /// assert_eq!(changes.value("Sheet1", "A2"), None);
    /// ```
    pub fn calculate(&mut self, edits: &[Edit]) -> EngineResult<ChangeSet> {
        self.calculate_with_cancel(edits, &CancellationToken::new())
    }

    /// Like [`Engine::calculate`], stopping between levels once `cancel` is set
    ///
    /// A cancelled pass commits whole levels only and reports
    /// `completed == false`; the remaining cells are folded into the next pass.
    pub fn calculate_with_cancel(&mut self, edits: &[Edit], cancel: &CancellationToken) -> EngineResult<ChangeSet> {
        let prepared = self.preflight(edits)?;
        let roots: Vec<CellKey> = prepared.iter().map(|(key, _)| *key).collect();
        let baseline = self.apply(prepared)?;
        Ok(self.run_pass(roots, baseline, cancel))
    }

    /// Recalculate every formula cell from scratch
    pub fn recalculate_all(&mut self) -> ChangeSet {
        self.recalculate_all_with_cancel(&CancellationToken::new())
    }

    pub fn recalculate_all_with_cancel(&mut self, cancel: &CancellationToken) -> ChangeSet {
        let roots: Vec<CellKey> = self.formulas.keys().copied().collect();
        self.run_pass(roots, Vec::new(), cancel)
    }

    /// Resolve addresses and parse formulas without touching the workbook
    fn preflight(&mut self, edits: &[Edit]) -> EngineResult<Vec<(CellKey, Prepared)>> {
        let limits = ParseLimits::from(self.workbook.settings());
        let mut prepared = Vec::with_capacity(edits.len());

        for edit in edits {
            let sheet = self.workbook.require_sheet(&edit.sheet)?;
            let address = CellAddress::parse(&edit.cell)?;
            let key = CellKey::from_address(sheet, address);

            let input = match edit.interpret() {
                EditInput::Formula(text) => {
                    let parsed = self
                        .cache
                        .get_or_parse(&text, &limits)
                        .map_err(|source| EngineError::Formula {
                            location: edit.location(),
                            source,
                        })?;
                    if let gridcalc_formula::FormulaBody::Malformed(failure) = &parsed.body {
                        tracing::warn!(
                            "Malformed formula at {}: {} (offset {})",
                            edit.location(),
                            failure.message,
                            failure.offset
                        );
                    }
                    Prepared::Formula(parsed)
                }
                EditInput::Literal(value) => Prepared::Literal(value),
                EditInput::Clear => Prepared::Clear,
            };
            prepared.push((key, input));
        }

        Ok(prepared)
    }

    /// Store prepared edits; returns each touched cell's previous value
    fn apply(&mut self, prepared: Vec<(CellKey, Prepared)>) -> EngineResult<Vec<(CellKey, CellValue)>> {
        let mut baseline = Vec::with_capacity(prepared.len());

        for (key, input) in prepared {
            baseline.push((key, self.workbook.value(key)));
            match input {
                Prepared::Formula(parsed) => {
                    self.workbook.set_formula(key, Arc::clone(&parsed.text))?;
                    self.install(key, parsed);
                }
                Prepared::Literal(value) => {
                    self.workbook.set_literal(key, value)?;
                    self.uninstall(key);
                }
                Prepared::Clear => {
                    self.workbook.clear(key)?;
                    self.uninstall(key);
                }
            }
        }

        Ok(baseline)
    }

    fn install(&mut self, key: CellKey, parsed: Arc<ParsedFormula>) {
        let precedents = precedents(&self.workbook, key, &parsed);
        self.graph.register_or_update(key, &precedents);
        self.formulas.insert(key, parsed);
    }

    fn uninstall(&mut self, key: CellKey) {
        if self.formulas.remove(&key).is_some() {
            self.graph.remove(key);
        }
    }

    /// Recompute the precedents of formulas whose references may resolve
    /// differently now
    fn reregister(&mut self, keys: &[CellKey]) {
        for key in keys {
            if let Some(parsed) = self.formulas.get(key).cloned() {
                self.install(*key, parsed);
            }
        }
    }

    fn run_pass(
        &mut self,
        mut roots: Vec<CellKey>,
        baseline: Vec<(CellKey, CellValue)>,
        cancel: &CancellationToken,
    ) -> ChangeSet {
        roots.extend(std::mem::take(&mut self.pending));
        let schedule = self.graph.compute_order(&roots);
        for key in schedule.cells() {
            self.workbook.mark_dirty(key);
        }

        let version = self.workbook.next_version();
        let mut ctx = CalculationContext::new(&self.registry, version);
        for (key, previous) in baseline {
            ctx.record(key, previous);
        }

        let outcome = Recalculation {
            workbook: &mut self.workbook,
            formulas: &self.formulas,
            pool: self.pool.as_deref(),
        }
        .run(&schedule, &mut ctx, cancel);

        let mut changes = ChangeSet::from_context(&self.workbook, &ctx);
        changes.completed = outcome.skipped.is_empty();
        changes.stats = outcome.stats;
        changes.stats.formula_count = self.formulas.len();
        changes.stats.errors = schedule
            .cells()
            .filter(|key| {
                self.workbook
                    .cell(*key)
                    .is_some_and(|cell| !cell.dirty && cell.value.is_error())
            })
            .count();
        changes.non_convergent = outcome.non_convergent;
        self.pending.extend(outcome.skipped);

        tracing::debug!(
            "Pass {version}: {} evaluations, {} changes, {} errors",
            changes.stats.cells_calculated,
            changes.len(),
            changes.stats.errors
        );
        changes
    }

    // ==================== Sheets and names ====================

    /// Add a worksheet; formulas that referred to it by name start resolving
    pub fn add_sheet(&mut self, name: &str) -> EngineResult<ChangeSet> {
        self.workbook.add_worksheet_with_name(name)?;

        let mut affected: Vec<CellKey> = self
            .formulas
            .iter()
            .filter(|(_, parsed)| {
                parsed.references.iter().any(|reference| match reference {
                    Reference::Cell { sheet: Some(s), .. } | Reference::Range { sheet: Some(s), .. } => {
                        s.eq_ignore_ascii_case(name)
                    }
                    Reference::Name(_) => true,
                    _ => false,
                })
            })
            .map(|(key, _)| *key)
            .collect();
        affected.sort_unstable();

        self.reregister(&affected);
        Ok(self.run_pass(affected, Vec::new(), &CancellationToken::new()))
    }

    /// Define or redefine a name and recalculate the formulas using it
    pub fn define_name(&mut self, name: &str, refers_to: &str, scope: NameScope) -> EngineResult<ChangeSet> {
        self.workbook.define_name(name, refers_to, scope)?;
        Ok(self.refresh_name(name))
    }

    /// Remove a name; formulas using it evaluate to `#REF!` or fall back to a
    /// workbook-scoped name of the same spelling
    pub fn remove_name(&mut self, name: &str, scope: NameScope) -> EngineResult<ChangeSet> {
        self.workbook.remove_name(name, scope)?;
        Ok(self.refresh_name(name))
    }

    fn refresh_name(&mut self, name: &str) -> ChangeSet {
        let affected = self.graph.name_dependents(name);
        self.reregister(&affected);
        self.run_pass(affected, Vec::new(), &CancellationToken::new())
    }

    // ==================== Reads ====================

    pub fn workbook(&self) -> &Workbook {
        &self.workbook
    }

    /// Committed value of `sheet!a1`
    ///
    /// A cell left dirty by a cancelled pass has no valid value until a later
    /// pass commits it; reading one is [`EngineError::Stale`].
    pub fn value(&self, sheet: &str, a1: &str) -> EngineResult<CellValue> {
        let key = self.workbook.key(sheet, a1)?;
        match self.workbook.cell(key) {
            Some(cell) if cell.dirty => Err(EngineError::Stale {
                location: self.workbook.qualified_address(key),
            }),
            Some(cell) => Ok(cell.value.clone()),
            None => Ok(CellValue::Empty),
        }
    }

    pub fn formula(&self, key: CellKey) -> Option<&ParsedFormula> {
        self.formulas.get(&key).map(Arc::as_ref)
    }

    /// Every formula cell, sorted by key
    pub fn formula_cells(&self) -> Vec<(CellKey, &ParsedFormula)> {
        let mut cells: Vec<_> = self
            .formulas
            .iter()
            .map(|(key, parsed)| (*key, parsed.as_ref()))
            .collect();
        cells.sort_unstable_by_key(|(key, _)| *key);
        cells
    }

    pub fn graph(&self) -> &DependencyGraph {
        &self.graph
    }

    /// Cyclic components across the whole workbook
    pub fn detect_cycles(&self) -> Vec<Vec<CellKey>> {
        self.graph.detect_cycles()
    }

    pub fn registry(&self) -> &FunctionRegistry {
        &self.registry
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    /// Cells left dirty by a cancelled pass
    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    pub fn into_workbook(self) -> Workbook {
        self.workbook
    }
}

/// Graph precedents of the formula at `key`
///
/// References to sheets that do not exist yet are skipped; they evaluate to
/// `#REF!` until [`Engine::add_sheet`] re-registers them. Names are tracked
/// both by name and by their current target.
fn precedents(workbook: &Workbook, key: CellKey, parsed: &ParsedFormula) -> Vec<Precedent> {
    let sheet_of = |sheet: &Option<String>| match sheet {
        Some(name) => workbook.sheet_index(name),
        None => Some(key.sheet),
    };

    let mut result = Vec::with_capacity(parsed.references.len());
    for reference in &parsed.references {
        match reference {
            Reference::Cell { sheet, address } => {
                if let Some(sheet) = sheet_of(sheet) {
                    result.push(Precedent::Cell(CellKey::from_address(sheet, *address)));
                }
            }
            Reference::Range { sheet, range } => {
                if let Some(sheet) = sheet_of(sheet) {
                    result.push(Precedent::range(sheet, *range));
                }
            }
            Reference::Name(name) => {
                result.push(Precedent::name(name));
                if let Ok(NameTarget::Range { sheet, range }) = workbook.resolve_named_range(name, key.sheet) {
                    result.push(Precedent::range(sheet, range));
                }
            }
        }
    }
    result
}
