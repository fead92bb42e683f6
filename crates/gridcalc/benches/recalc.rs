use criterion::{black_box, criterion_group, criterion_main, BatchSize, BenchmarkId, Criterion};
use gridcalc::{Edit, Engine, Workbook};

/// A1 literal, A2..A{n} each read the cell above
fn chain(n: usize) -> Engine {
    let mut engine = Engine::new(Workbook::new()).unwrap();
    let mut edits = vec![Edit::new("Sheet1", "A1", "1")];
    edits.extend((2..=n).map(|row| Edit::new("Sheet1", format!("A{row}"), format!("=A{}*1.0001+1", row - 1))));
    engine.calculate(&edits).unwrap();
    engine
}

/// Column A literals, column B reading them one-to-one, one SUM over B
fn wide(n: usize, parallel: bool) -> Engine {
    let mut workbook = Workbook::new();
    workbook.settings_mut().parallel = parallel;
    let mut engine = Engine::new(workbook).unwrap();
    let mut edits = Vec::with_capacity(2 * n + 1);
    for row in 1..=n {
        edits.push(Edit::new("Sheet1", format!("A{row}"), row.to_string()));
        edits.push(Edit::new("Sheet1", format!("B{row}"), format!("=ROUND(A{row}*1.07+SQRT(A{row}),4)")));
    }
    edits.push(Edit::new("Sheet1", "C1", format!("=SUM(B1:B{n})")));
    engine.calculate(&edits).unwrap();
    engine
}

fn bench_recalculation(c: &mut Criterion) {
    let mut group = c.benchmark_group("Recalc");

    for n in [1_000, 10_000] {
        // --- Edit at the root of a long chain: every cell, one per level ---
        let mut engine = chain(n);
        let mut flip = false;
        group.bench_with_input(BenchmarkId::new("Chain/EditRoot", n), &n, |b, _| {
            b.iter(|| {
                flip = !flip;
                let value = if flip { "2" } else { "1" };
                black_box(engine.calculate(&[Edit::new("Sheet1", "A1", value)]).unwrap())
            })
        });

        // --- One input under a wide aggregate: two cells recalculated ---
        let mut engine = wide(n, false);
        group.bench_with_input(BenchmarkId::new("Wide/EditOne", n), &n, |b, &n| {
            b.iter(|| {
                flip = !flip;
                let value = if flip { "0.5" } else { "1" };
                black_box(engine.calculate(&[Edit::new("Sheet1", format!("A{}", n / 2), value)]).unwrap())
            })
        });

        // --- Full recalculation of a wide level, sequential vs worker pool ---
        for parallel in [false, true] {
            let label = if parallel { "Wide/FullParallel" } else { "Wide/FullSequential" };
            group.bench_with_input(BenchmarkId::new(label, n), &n, |b, &n| {
                b.iter_batched(
                    || wide(n, parallel),
                    |mut engine| black_box(engine.recalculate_all()),
                    BatchSize::LargeInput,
                )
            });
        }
    }

    group.finish();
}

criterion_group!(benches, bench_recalculation);
criterion_main!(benches);
