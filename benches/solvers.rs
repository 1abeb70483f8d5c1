use criterion::{criterion_group, criterion_main, Criterion};
use ral_nlls::{nalgebra as na, testing::*, Method, Model, NllsOptions, NllsSolver};

fn options(model: Model, method: Method) -> NllsOptions<f64> {
    let mut options = NllsOptions::default();
    options.set_model(model).set_nlls_method(method);
    options
}

fn solve<P: TestProblem<Field = f64>>(p: &P, x: &na::DVector<f64>, options: NllsOptions<f64>) -> bool {
    let mut solver = NllsSolver::builder(p)
        .with_initial(x.as_slice().to_vec())
        .with_options(options)
        .build();

    matches!(solver.solve(), Ok(inform) if inform.converged())
}

fn rosenbrock(c: &mut Criterion) {
    let p = ExtendedRosenbrock::new(10);
    let x = &p.initials()[0];

    for (name, method) in [("dtrs", Method::Dtrs), ("more-sorensen", Method::MoreSorensen)] {
        c.bench_function(&format!("{} gauss-newton rosenbrock", name), |b| {
            b.iter(|| assert!(solve(&p, x, options(Model::GaussNewton, method))))
        });

        c.bench_function(&format!("{} hybrid rosenbrock", name), |b| {
            b.iter(|| assert!(solve(&p, x, options(Model::Hybrid, method))))
        });
    }
}

fn exponential_decay(c: &mut Criterion) {
    let p = ExponentialDecay::new();
    let x = &p.initials()[0];

    c.bench_function("dtrs newton exponential decay", |b| {
        b.iter(|| {
            let mut options = options(Model::Newton, Method::Dtrs);
            options.set_exact_second_derivatives(true);
            assert!(solve(&p, x, options))
        })
    });

    c.bench_function("dtrs hybrid exponential decay", |b| {
        b.iter(|| assert!(solve(&p, x, options(Model::Hybrid, Method::Dtrs))))
    });
}

fn linear_fit(c: &mut Criterion) {
    let p = LinearFit::random(200, 20, 42);
    let x = &p.initials()[0];

    c.bench_function("dtrs gauss-newton linear fit", |b| {
        b.iter(|| assert!(solve(&p, x, options(Model::GaussNewton, Method::Dtrs))))
    });

    c.bench_function("more-sorensen gauss-newton linear fit", |b| {
        b.iter(|| assert!(solve(&p, x, options(Model::GaussNewton, Method::MoreSorensen))))
    });
}

criterion_group!(benches, rosenbrock, exponential_decay, linear_fit);
criterion_main!(benches);
