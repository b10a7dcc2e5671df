//! Criterion benchmarks for Monte Carlo normalization.
//!
//! Compares single-shot and chunked evaluation at equal sample counts, and measures the
//! cost of a full unbinned NLL evaluation whose normalization is integrated numerically.

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use std::hint::black_box;
use std::sync::Arc;

use mlfit_core::{Loss, Parameter, Result, Space};
use mlfit_unbinned::{
    Dataset, FunctionPdf, HaltonSampler, McIntegrator, OneOrMany, PdfRef, RunContext, ShapeFn,
    UnbinnedNll,
};

fn gauss_2d(cols: &[Vec<f64>]) -> Result<Vec<f64>> {
    Ok(cols[0].iter().zip(&cols[1]).map(|(x, y)| (-0.5 * (x * x + y * y)).exp()).collect())
}

fn bench_chunking(c: &mut Criterion) {
    let mut group = c.benchmark_group("mc_integrate_2d");
    let space = Space::new(vec![0, 1], vec![(-3.0, 3.0), (-3.0, 3.0)]).unwrap();
    let draws = 500; // 250k samples

    for &chunk in &[1_000_000usize, 50_000, 10_000] {
        group.bench_with_input(BenchmarkId::new("chunk", chunk), &chunk, |b, &chunk| {
            let mc = McIntegrator::new(draws, chunk, &HaltonSampler).unwrap();
            b.iter(|| black_box(mc.integrate(&gauss_2d, &space, None, None).unwrap()))
        });
    }
    group.finish();
}

fn bench_nll_numeric_norm(c: &mut Criterion) {
    let mut group = c.benchmark_group("unbinned_nll_mc_norm");
    let space = Space::interval(0, -5.0, 5.0).unwrap();
    let mu = Parameter::new("mu", 0.0).unwrap();
    let m = mu.clone();
    let shape: ShapeFn = Arc::new(move |x: &[Vec<f64>]| {
        let mu = m.value();
        Ok(x[0].iter().map(|v| (-0.5 * (v - mu).powi(2)).exp()).collect())
    });
    let pdf: PdfRef =
        Arc::new(FunctionPdf::new("gauss", space.clone(), vec![mu.clone()], shape).unwrap());

    for &n_events in &[1_000usize, 100_000] {
        let xs: Vec<f64> = (0..n_events).map(|i| -4.0 + 8.0 * i as f64 / n_events as f64).collect();
        let data = Arc::new(Dataset::from_values(0, -5.0, 5.0, xs).unwrap());
        let loss = UnbinnedNll::new(
            OneOrMany::One(pdf.clone()),
            OneOrMany::One(data),
            None,
            Arc::new(RunContext::default()),
        )
        .unwrap();
        let mut toggle = false;
        group.bench_with_input(BenchmarkId::new("events", n_events), &n_events, |b, _| {
            b.iter(|| {
                // Move the parameter so the memo never short-circuits the evaluation.
                toggle = !toggle;
                mu.set_value(if toggle { 0.01 } else { 0.0 }).unwrap();
                black_box(loss.value().unwrap())
            })
        });
    }
    group.finish();
}

criterion_group!(benches, bench_chunking, bench_nll_numeric_norm);
criterion_main!(benches);
