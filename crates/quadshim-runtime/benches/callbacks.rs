//! Callback overhead benchmarks
//!
//! Measures the per-evaluation cost of the adapter's entry points:
//! - Native n-ary function through `evaluate_at`
//! - Closure through `evaluate_at`
//! - Scalar function through the wrapper pipeline
//! - Activation/deactivation round trips

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use quadshim_runtime::{
    activate_multivariate, activate_wrapper, evaluate_at, MultivariateFunction, ScalarFunction,
};
use std::os::raw::{c_double, c_int};

unsafe extern "C" fn polynomial(n: c_int, args: *mut c_double) -> c_double {
    let args = std::slice::from_raw_parts(args, n as usize + 1);
    let x = args[0];
    args[1..].iter().rev().fold(0.0, |acc, c| acc * x + c)
}

unsafe extern "C" fn square(x: c_double) -> c_double {
    x * x
}

fn bench_native_evaluate(c: &mut Criterion) {
    let mut group = c.benchmark_group("native_evaluate_at");
    for arity in [0_usize, 2, 8, 32] {
        let params: Vec<f64> = (0..arity).map(|i| i as f64).collect();
        group.bench_with_input(BenchmarkId::from_parameter(arity), &params, |b, params| {
            let record =
                activate_multivariate(Some(MultivariateFunction::native(polynomial)), arity, params)
                    .unwrap();
            b.iter(|| evaluate_at(black_box(0.5)));
            record.deactivate().unwrap();
        });
    }
    group.finish();
}

fn bench_closure_evaluate(c: &mut Criterion) {
    c.bench_function("closure_evaluate_at", |b| {
        let f = MultivariateFunction::closure(|a| Ok(a[0] * a[1] + a[2]));
        let record = activate_multivariate(Some(f), 2, &[3.0, 1.0]).unwrap();
        b.iter(|| evaluate_at(black_box(0.5)));
        record.deactivate().unwrap();
    });
}

fn bench_wrapped_scalar(c: &mut Criterion) {
    c.bench_function("wrapped_scalar_evaluate_at", |b| {
        let wrapper = activate_wrapper(ScalarFunction::native(square));
        let record = activate_multivariate(Some(MultivariateFunction::wrapped()), 0, &[]).unwrap();
        b.iter(|| evaluate_at(black_box(0.5)));
        record.deactivate().unwrap();
        wrapper.deactivate().unwrap();
    });
}

fn bench_activation_round_trip(c: &mut Criterion) {
    c.bench_function("activate_deactivate", |b| {
        let f = MultivariateFunction::native(polynomial);
        b.iter(|| {
            let record = activate_multivariate(Some(f.clone()), 2, black_box(&[1.0, 2.0])).unwrap();
            record.deactivate().unwrap();
        });
    });
}

criterion_group!(
    benches,
    bench_native_evaluate,
    bench_closure_evaluate,
    bench_wrapped_scalar,
    bench_activation_round_trip
);
criterion_main!(benches);
