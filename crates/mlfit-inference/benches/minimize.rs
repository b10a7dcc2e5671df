use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use mlfit_core::{Parameter, Space};
use mlfit_inference::{LbfgsMinimizer, LbfgsStepMinimizer, Minimizer, ParamSelection, StepConfig};
use mlfit_unbinned::{Dataset, GaussianPdf, OneOrMany, PdfRef, RunContext, UnbinnedNll};
use rand::SeedableRng;
use rand_distr::{Distribution, Normal};
use std::hint::black_box;
use std::sync::Arc;

fn gaussian_nll(n_events: usize) -> (UnbinnedNll, Parameter, Parameter) {
    let mut rng = rand::rngs::StdRng::seed_from_u64(0);
    let normal = Normal::new(0.3, 1.1).unwrap();
    let xs: Vec<f64> = (0..n_events).map(|_| normal.sample(&mut rng).clamp(-5.0, 5.0)).collect();

    let space = Space::interval(0, -5.0, 5.0).unwrap();
    let mu = Parameter::bounded("mu", 0.0, -3.0, 3.0).unwrap();
    let sigma = Parameter::bounded("sigma", 1.0, 0.1, 5.0).unwrap();
    let pdf: PdfRef = Arc::new(GaussianPdf::new(space, mu.clone(), sigma.clone()).unwrap());
    let data = Arc::new(Dataset::from_values(0, -5.0, 5.0, xs).unwrap());
    let nll = UnbinnedNll::new(
        OneOrMany::One(pdf),
        OneOrMany::One(data),
        None,
        Arc::new(RunContext::default()),
    )
    .unwrap();
    (nll, mu, sigma)
}

fn bench_gaussian_fit(c: &mut Criterion) {
    let mut group = c.benchmark_group("gaussian_fit");

    for &n_events in &[1_000usize, 50_000] {
        let (loss, mu, sigma) = gaussian_nll(n_events);
        let reset = || {
            mu.set_value(0.0).unwrap();
            sigma.set_value(1.0).unwrap();
        };

        group.bench_with_input(BenchmarkId::new("argmin_lbfgs", n_events), &n_events, |b, _| {
            let config = StepConfig { tolerance: 1e-4, max_iterations: 500 };
            let mut minimizer = LbfgsMinimizer::new(config, 10).unwrap();
            b.iter(|| {
                reset();
                black_box(minimizer.minimize(&loss, ParamSelection::AllFloating).unwrap().fmin())
            })
        });

        group.bench_with_input(BenchmarkId::new("step_loop", n_events), &n_events, |b, _| {
            let mut minimizer = LbfgsStepMinimizer::default();
            b.iter(|| {
                reset();
                black_box(minimizer.minimize(&loss, ParamSelection::AllFloating).unwrap().fmin())
            })
        });
    }
    group.finish();
}

criterion_group!(benches, bench_gaussian_fit);
criterion_main!(benches);
