//! Tests for incremental recalculation passes

use std::str::FromStr;
use std::sync::OnceLock;

use gridcalc::prelude::*;
use gridcalc::{ArgKind, Evaluated, Evaluation, EvaluationContext, FunctionDef, FunctionResult};
use pretty_assertions::assert_eq;
use rust_decimal::Decimal;

fn num(s: &str) -> CellValue {
    CellValue::Number(Decimal::from_str(s).unwrap())
}

fn edits(cells: &[(&str, &str)]) -> Vec<Edit> {
    cells.iter().map(|(cell, input)| Edit::new("Sheet1", *cell, *input)).collect()
}

fn value_of(engine: &Engine, cell: &str) -> CellValue {
    engine.value("Sheet1", cell).unwrap()
}

fn key(engine: &Engine, cell: &str) -> CellKey {
    engine.workbook().key("Sheet1", cell).unwrap()
}

#[test]
fn test_only_dependents_change() {
    let mut engine = Engine::new(Workbook::new()).unwrap();
    let changes = engine.calculate(&edits(&[("A1", "10"), ("A2", "20"), ("A3", "=A1+A2")])).unwrap();
    assert_eq!(changes.value("Sheet1", "A3"), Some(&CellValue::int(30)));

    let changes = engine.calculate(&edits(&[("A1", "15")])).unwrap();
    let changed: Vec<(String, CellValue)> = changes
        .iter()
        .map(|change| (change.address.clone(), change.value.clone()))
        .collect();
    assert_eq!(
        changed,
        vec![("A1".to_string(), CellValue::int(15)), ("A3".to_string(), CellValue::int(35))]
    );
    assert_eq!(changes.value("Sheet1", "A2"), None);
    assert!(changes.completed);
}

#[test]
fn test_sum_range_uses_one_aggregate_node() {
    let mut engine = Engine::new(Workbook::new()).unwrap();
    engine
        .calculate(&edits(&[("A1", "1"), ("A2", "2"), ("A3", "3"), ("B1", "=SUM(A1:A3)")]))
        .unwrap();
    assert_eq!(value_of(&engine, "B1"), CellValue::int(6));
    let edges = engine.graph().edge_count();
    assert_eq!(engine.graph().range_node_count(), 1);

    let changes = engine.calculate(&edits(&[("A2", "")])).unwrap();
    assert_eq!(changes.value("Sheet1", "B1"), Some(&CellValue::int(4)));
    assert_eq!(changes.value("Sheet1", "A2"), Some(&CellValue::Empty));
    assert_eq!(engine.graph().edge_count(), edges);
    assert_eq!(engine.graph().range_node_count(), 1);
}

#[test]
fn test_precedents_commit_first() {
    // Entered dependents-first; evaluation order comes from the graph
    let mut engine = Engine::new(Workbook::new()).unwrap();
    engine
        .calculate(&edits(&[
            ("D1", "=C1*2"),
            ("C1", "=B1+A1"),
            ("B1", "=A1*10"),
            ("A1", "3"),
            ("E1", "=SUM(B1:D1)"),
        ]))
        .unwrap();
    assert_eq!(value_of(&engine, "B1"), CellValue::int(30));
    assert_eq!(value_of(&engine, "C1"), CellValue::int(33));
    assert_eq!(value_of(&engine, "D1"), CellValue::int(66));
    assert_eq!(value_of(&engine, "E1"), CellValue::int(129));
}

#[test]
fn test_decimal_precision() {
    let mut engine = Engine::new(Workbook::new()).unwrap();
    engine
        .calculate(&edits(&[("A1", "=0.1+0.2"), ("A2", "=A1=0.3"), ("A3", "=1/3*3")]))
        .unwrap();
    assert_eq!(value_of(&engine, "A1"), num("0.3"));
    assert_eq!(value_of(&engine, "A2"), CellValue::Boolean(true));
    assert_eq!(value_of(&engine, "A3"), CellValue::int(1));
}

#[test]
fn test_cycle_isolation() {
    let mut engine = Engine::new(Workbook::new()).unwrap();
    let changes = engine
        .calculate(&edits(&[("A1", "=B1"), ("B1", "=A1"), ("C1", "=A1+1"), ("D1", "5")]))
        .unwrap();

    let circ = CellValue::Error(CellError::Circular);
    assert_eq!(value_of(&engine, "A1"), circ);
    assert_eq!(value_of(&engine, "B1"), circ);
    assert_eq!(value_of(&engine, "C1"), circ);
    assert_eq!(value_of(&engine, "D1"), CellValue::int(5));
    assert_eq!(changes.stats.circular_references, 2);
    assert_eq!(engine.detect_cycles(), vec![vec![key(&engine, "A1"), key(&engine, "B1")]]);

    // Breaking the cycle recovers every member and dependent
    engine.calculate(&edits(&[("B1", "1")])).unwrap();
    assert_eq!(value_of(&engine, "A1"), CellValue::int(1));
    assert_eq!(value_of(&engine, "C1"), CellValue::int(2));
    assert!(engine.detect_cycles().is_empty());
}

#[test]
fn test_iterative_convergence() {
    let settings = CalculationSettings::default().with_iteration(100, Decimal::new(1, 6));
    let mut engine = Engine::new(Workbook::new().with_settings(settings)).unwrap();
    let changes = engine
        .calculate(&edits(&[("A1", "=B1/2+1"), ("B1", "=A1"), ("C1", "=ROUND(A1,3)")]))
        .unwrap();

    assert!(changes.non_convergent.is_empty());
    assert!(changes.stats.iterations > 1);
    let a1 = value_of(&engine, "A1").as_number().unwrap();
    assert!((a1 - Decimal::from(2)).abs() < Decimal::new(1, 5), "A1 = {a1}");
    assert_eq!(value_of(&engine, "C1"), CellValue::int(2));
}

#[test]
fn test_iterative_non_convergence() {
    let settings = CalculationSettings::default().with_iteration(10, Decimal::new(1, 3));
    let mut engine = Engine::new(Workbook::new().with_settings(settings)).unwrap();
    let changes = engine
        .calculate(&edits(&[("A1", "=B1+1"), ("B1", "=A1"), ("C1", "=A1*2")]))
        .unwrap();

    assert_eq!(changes.non_convergent.len(), 1);
    let failure = &changes.non_convergent[0];
    assert_eq!(failure.cells, vec!["Sheet1!A1".to_string(), "Sheet1!B1".to_string()]);
    assert_eq!(failure.iterations, 10);
    assert_eq!(failure.max_delta, Decimal::ONE);
    // The last iterate stays and dependents see it
    assert_eq!(value_of(&engine, "A1"), CellValue::int(10));
    assert_eq!(value_of(&engine, "C1"), CellValue::int(20));
}

static TRIP_TOKEN: OnceLock<CancellationToken> = OnceLock::new();

fn trip_token() -> &'static CancellationToken {
    TRIP_TOKEN.get_or_init(CancellationToken::new)
}

/// Returns its argument and cancels the current pass
fn trip(args: &[Evaluated<'_>], _ctx: &EvaluationContext<'_>) -> FunctionResult {
    trip_token().cancel();
    match args.first() {
        Some(Evaluated::Value(value)) => Ok(value.clone()),
        _ => Err(CellError::Value),
    }
}

#[test]
fn test_cancel_between_levels() {
    let mut engine = Engine::new(Workbook::new()).unwrap();
    engine
        .register_function(FunctionDef {
            name: "TRIP",
            min_args: 1,
            max_args: Some(1),
            args: ArgKind::Scalar,
            eval: Evaluation::Strict(trip),
        })
        .unwrap();
    engine
        .calculate(&edits(&[("A1", "1"), ("B1", "=TRIP(A1)"), ("C1", "=B1+1"), ("D1", "=C1+1")]))
        .unwrap();
    assert_eq!(value_of(&engine, "D1"), CellValue::int(3));

    let token = trip_token();
    token.reset();
    let changes = engine.calculate_with_cancel(&edits(&[("A1", "5")]), token).unwrap();

    // B1's level committed, C1 and D1 were never started
    assert!(!changes.completed);
    assert_eq!(changes.stats.levels, 1);
    assert_eq!(changes.value("Sheet1", "B1"), Some(&CellValue::int(5)));
    assert_eq!(changes.value("Sheet1", "C1"), None);
    assert_eq!(engine.pending(), 2);
    let c1 = engine.workbook().cell(key(&engine, "C1")).unwrap();
    assert!(c1.dirty);
    assert_eq!(c1.value, CellValue::int(2));

    // The next pass picks the leftovers up
    let changes = engine.calculate(&[]).unwrap();
    assert!(changes.completed);
    assert_eq!(engine.pending(), 0);
    assert_eq!(value_of(&engine, "C1"), CellValue::int(6));
    assert_eq!(value_of(&engine, "D1"), CellValue::int(7));
}

#[test]
fn test_cancel_before_first_level() {
    let mut engine = Engine::new(Workbook::new()).unwrap();
    engine.calculate(&edits(&[("A1", "1"), ("A2", "=A1*2")])).unwrap();

    let token = CancellationToken::new();
    token.cancel();
    let changes = engine.calculate_with_cancel(&edits(&[("A1", "4")]), &token).unwrap();
    assert!(!changes.completed);
    assert_eq!(changes.len(), 1);
    assert_eq!(changes.value("Sheet1", "A1"), Some(&CellValue::int(4)));
    // A2 still holds 2 but is not readable until a pass commits it
    assert!(matches!(engine.value("Sheet1", "A2"), Err(EngineError::Stale { .. })));
    assert_eq!(engine.workbook().value(key(&engine, "A2")), CellValue::int(2));

    let changes = engine.recalculate_all();
    assert!(changes.completed);
    assert_eq!(changes.value("Sheet1", "A2"), Some(&CellValue::int(8)));
}

/// B1..B{n} read column A; C1 sums them
fn wide_engine(parallel: bool, n: usize) -> Engine {
    let mut workbook = Workbook::new();
    workbook.settings_mut().parallel = parallel;
    workbook.settings_mut().parallel_threshold = 2;
    let mut engine = Engine::new(workbook).unwrap();
    if parallel {
        engine.set_thread_count(4).unwrap();
    }

    let mut batch = Vec::new();
    for row in 1..=n {
        batch.push(Edit::new("Sheet1", format!("A{row}"), row.to_string()));
        batch.push(Edit::new("Sheet1", format!("B{row}"), format!("=A{row}*1.5+MOD(A{row},7)")));
    }
    batch.push(Edit::new("Sheet1", "C1", format!("=SUM(B1:B{n})")));
    batch.push(Edit::new("Sheet1", "C2", format!("=AVERAGE(B1:B{n})")));
    engine.calculate(&batch).unwrap();
    engine
}

#[test]
fn test_parallel_levels_match_sequential() {
    let mut parallel = wide_engine(true, 200);
    let mut sequential = wide_engine(false, 200);

    let edit = edits(&[("A1", "7"), ("A2", "9"), ("A100", "0.25")]);
    let from_parallel = parallel.calculate(&edit).unwrap();
    let from_sequential = sequential.calculate(&edit).unwrap();

    assert!(from_parallel.stats.parallel_levels >= 1);
    assert_eq!(from_sequential.stats.parallel_levels, 0);
    assert_eq!(from_parallel.changes, from_sequential.changes);
    assert_eq!(value_of(&parallel, "C1"), value_of(&sequential, "C1"));
}

#[test]
fn test_calculate_is_deterministic() {
    let mut first = wide_engine(true, 120);
    let mut second = wide_engine(true, 120);
    let edit = edits(&[("A5", "11"), ("A6", "=A5*2")]);
    assert_eq!(first.calculate(&edit).unwrap(), second.calculate(&edit).unwrap());

    // Nothing changed, so a second pass changes nothing
    let again = first.calculate(&[]).unwrap();
    assert!(again.is_empty());
    assert_eq!(first.recalculate_all().changes, Vec::new());
}

#[test]
fn test_failed_preflight_changes_nothing() {
    let mut engine = Engine::new(Workbook::new()).unwrap();
    engine.calculate(&edits(&[("A1", "1"), ("A2", "=A1+1")])).unwrap();

    let result = engine.calculate(&[
        Edit::new("Sheet1", "A1", "100"),
        Edit::new("Sheet1", "A3", format!("={}1{}", "(".repeat(200), ")".repeat(200))),
    ]);
    assert!(matches!(result, Err(EngineError::Formula { .. })));

    let result = engine.calculate(&[Edit::new("Sheet1", "A1", "100"), Edit::new("Nowhere", "A1", "1")]);
    assert!(matches!(result, Err(EngineError::Core(_))));

    assert_eq!(value_of(&engine, "A1"), CellValue::int(1));
    assert_eq!(value_of(&engine, "A2"), CellValue::int(2));
    assert_eq!(value_of(&engine, "A3"), CellValue::Empty);
}

#[test]
fn test_malformed_formula_is_a_cell_error() {
    let mut engine = Engine::new(Workbook::new()).unwrap();
    engine.calculate(&edits(&[("A1", "=SUM(1,"), ("A2", "=A1+1"), ("A3", "7")])).unwrap();
    assert_eq!(value_of(&engine, "A1"), CellValue::Error(CellError::Syntax));
    assert_eq!(value_of(&engine, "A2"), CellValue::Error(CellError::Syntax));
    assert_eq!(value_of(&engine, "A3"), CellValue::int(7));
}
