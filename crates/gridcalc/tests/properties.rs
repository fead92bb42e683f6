// Property-based tests for incremental recalculation.
// CI: 64 cases (default). Soak: PROPTEST_CASES=5000 cargo test --release

use gridcalc::prelude::*;
use proptest::prelude::*;
use proptest::sample::Index;
use rust_decimal::Decimal;

const INPUTS: usize = 6;

fn config() -> ProptestConfig {
    ProptestConfig {
        cases: std::env::var("PROPTEST_CASES")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(64),
        failure_persistence: None,
        ..ProptestConfig::default()
    }
}

// ---------------------------------------------------------------------------
// Generators
// ---------------------------------------------------------------------------

/// Literal input text with up to two decimals
fn arb_input() -> impl Strategy<Value = String> {
    (-100_000i64..100_000).prop_map(|cents| Decimal::new(cents, 2).to_string())
}

/// One formula in column B: (input column A row, factor, chain to an earlier B, earlier B)
fn arb_formula() -> impl Strategy<Value = (usize, i64, bool, Index)> {
    (0..INPUTS, -5i64..=5, any::<bool>(), any::<Index>())
}

/// Formula text for `B{row + 1}`; chains only reach earlier rows, so the
/// sheet stays acyclic
fn formula_text(row: usize, (input, factor, chain, earlier): &(usize, i64, bool, Index)) -> String {
    let a = input + 1;
    if *chain && row > 0 {
        format!("=A{a}*({factor})+B{}", earlier.index(row) + 1)
    } else if factor % 2 == 0 {
        format!("=SUM(A1:A{a})+({factor})")
    } else {
        format!("=IF(A{a}>0,A{a}*({factor}),ROUND(A{a}/3,2))")
    }
}

fn batch(inputs: &[String], formulas: &[(usize, i64, bool, Index)]) -> Vec<Edit> {
    let mut edits: Vec<Edit> = inputs
        .iter()
        .enumerate()
        .map(|(row, input)| Edit::new("Sheet1", format!("A{}", row + 1), input.as_str()))
        .collect();
    edits.extend(
        formulas
            .iter()
            .enumerate()
            .map(|(row, formula)| Edit::new("Sheet1", format!("B{}", row + 1), formula_text(row, formula))),
    );
    edits
}

fn snapshot(engine: &Engine, rows: usize) -> Vec<CellValue> {
    (1..=rows)
        .map(|row| engine.value("Sheet1", &format!("B{row}")).unwrap())
        .collect()
}

fn engine(parallel: bool) -> Engine {
    let mut workbook = Workbook::new();
    workbook.settings_mut().parallel = parallel;
    workbook.settings_mut().parallel_threshold = 2;
    Engine::new(workbook).unwrap()
}

// ---------------------------------------------------------------------------
// Properties
// ---------------------------------------------------------------------------

proptest! {
    #![proptest_config(config())]

    /// Recalculating only what an edit reaches matches building from scratch
    #[test]
    fn incremental_matches_full(
        inputs in prop::collection::vec(arb_input(), INPUTS),
        formulas in prop::collection::vec(arb_formula(), 1..24),
        changes in prop::collection::vec((0..INPUTS, arb_input()), 1..8),
    ) {
        let mut incremental = engine(false);
        incremental.calculate(&batch(&inputs, &formulas)).unwrap();

        let mut final_inputs = inputs.clone();
        for (row, value) in &changes {
            incremental
                .calculate(&[Edit::new("Sheet1", format!("A{}", row + 1), value.as_str())])
                .unwrap();
            final_inputs[*row] = value.clone();
        }

        let mut full = engine(false);
        full.calculate(&batch(&final_inputs, &formulas)).unwrap();

        prop_assert_eq!(snapshot(&incremental, formulas.len()), snapshot(&full, formulas.len()));
        prop_assert!(incremental.recalculate_all().is_empty());
    }

    /// Edit order and worker pool never change committed values
    #[test]
    fn order_and_parallelism_do_not_matter(
        inputs in prop::collection::vec(arb_input(), INPUTS),
        formulas in prop::collection::vec(arb_formula(), 1..24),
    ) {
        let edits = batch(&inputs, &formulas);
        let mut reversed_edits = edits.clone();
        reversed_edits.reverse();

        let mut sequential = engine(false);
        let first = sequential.calculate(&edits).unwrap();
        let mut parallel = engine(true);
        let second = parallel.calculate(&reversed_edits).unwrap();

        prop_assert_eq!(first.changes, second.changes);
        prop_assert_eq!(snapshot(&sequential, formulas.len()), snapshot(&parallel, formulas.len()));
    }
}
