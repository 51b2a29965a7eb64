//! Shared fixtures for the adapter's integration tests
//!
//! The sample integrands use the native n-ary convention, and `simpson` plays
//! the part of an opaque foreign integrator: it only sees a bare
//! `double f(double)` pointer.

#![allow(dead_code)]

use quadshim_runtime::Integrand;
use std::f64::consts::PI;
use std::os::raw::{c_double, c_int};

/// Bessel integrand: `cos(n*t - x*sin t) / pi` with `args = [t, n, x]`
pub unsafe extern "C" fn typical(_n: c_int, args: *mut c_double) -> c_double {
    let args = std::slice::from_raw_parts(args, 3);
    (args[1] * args[0] - args[2] * args[0].sin()).cos() / PI
}

/// `-exp(-x) * ln(x)`; integrates to Euler's constant over `(0, inf)`
pub unsafe extern "C" fn indefinite(_n: c_int, args: *mut c_double) -> c_double {
    let x = *args;
    -(-x).exp() * x.ln()
}

/// `sin(x)`, ignoring any extra parameters
pub unsafe extern "C" fn sin2(_n: c_int, args: *mut c_double) -> c_double {
    (*args).sin()
}

/// Composite Simpson's rule over `[a, b]` with `intervals` subintervals
///
/// `intervals` is rounded up to an even number.
pub fn simpson(f: Integrand, a: f64, b: f64, intervals: usize) -> f64 {
    let n = (intervals.max(2) + 1) & !1;
    let h = (b - a) / n as f64;

    let mut sum = f(a) + f(b);
    for i in 1..n {
        let weight = if i % 2 == 1 { 4.0 } else { 2.0 };
        sum += weight * f(a + i as f64 * h);
    }
    sum * h / 3.0
}

/// Assert two floats agree to an absolute tolerance
pub fn assert_close(actual: f64, expected: f64, tolerance: f64) {
    assert!(
        (actual - expected).abs() <= tolerance,
        "expected {} (within {}), got {}",
        expected,
        tolerance,
        actual
    );
}
