//! Multivariate context tests
//!
//! Argument layout, arity handling and activation failures.

mod common;

use common::{assert_close, indefinite, sin2, typical};
use pretty_assertions::assert_eq;
use proptest::prelude::*;
use quadshim_runtime::multivariate::{multivariate_depth, try_evaluate_at};
use quadshim_runtime::{
    activate_multivariate, active_multivariate, evaluate_at, CallbackError, MultivariateFunction,
};
use rstest::rstest;
use std::cell::RefCell;
use std::f64::consts::PI;
use std::rc::Rc;

/// Closure that records every argument array it is called with
fn recorder() -> (MultivariateFunction, Rc<RefCell<Vec<Vec<f64>>>>) {
    let calls = Rc::new(RefCell::new(Vec::new()));
    let seen = Rc::clone(&calls);
    let f = MultivariateFunction::closure(move |args| {
        seen.borrow_mut().push(args.to_vec());
        Ok(args.iter().sum())
    });
    (f, calls)
}

#[test]
fn test_typical_receives_point_then_parameters() {
    let record =
        activate_multivariate(Some(MultivariateFunction::native(typical)), 2, &[3.0, 1.0]).unwrap();

    let expected = (3.0_f64 * 0.5 - 1.0 * 0.5_f64.sin()).cos() / PI;
    assert_close(evaluate_at(0.5), expected, 1e-15);

    record.deactivate().unwrap();
}

#[test]
fn test_closure_sees_concatenated_arguments() {
    let (f, calls) = recorder();
    let record = activate_multivariate(Some(f), 2, &[3.0, 1.0]).unwrap();

    evaluate_at(0.5);
    record.deactivate().unwrap();

    assert_eq!(*calls.borrow(), vec![vec![0.5, 3.0, 1.0]]);
}

#[test]
fn test_arity_zero_uses_only_the_point() {
    let (f, calls) = recorder();
    let record = activate_multivariate(Some(f), 0, &[]).unwrap();
    assert_eq!(record.arity(), 0);

    assert_eq!(evaluate_at(-2.0), -2.0);
    record.deactivate().unwrap();
    assert_eq!(*calls.borrow(), vec![vec![-2.0]]);
}

#[rstest]
#[case::sine(0.0, 0.0)]
#[case::quarter_turn(PI / 2.0, 1.0)]
#[case::half_turn(PI, 0.0)]
fn test_sin2_ignores_parameters(#[case] x: f64, #[case] expected: f64) {
    let record =
        activate_multivariate(Some(MultivariateFunction::native(sin2)), 3, &[9.0, 8.0, 7.0])
            .unwrap();
    assert_close(evaluate_at(x), expected, 1e-12);
    record.deactivate().unwrap();
}

#[rstest]
#[case::zero(0.0, f64::INFINITY)]
#[case::negative(-1.0, f64::NAN)]
fn test_non_finite_results_pass_through(#[case] x: f64, #[case] expected: f64) {
    let record = activate_multivariate(Some(MultivariateFunction::native(indefinite)), 0, &[])
        .unwrap();
    let value = evaluate_at(x);
    if expected.is_nan() {
        assert!(value.is_nan());
    } else {
        assert_eq!(value, expected);
    }
    record.deactivate().unwrap();
}

#[test]
fn test_native_nan_is_not_a_failure() {
    let record = activate_multivariate(Some(MultivariateFunction::native(indefinite)), 0, &[])
        .unwrap();
    assert!(try_evaluate_at(-1.0).unwrap().is_nan());
    // Later evaluations still run.
    assert_close(evaluate_at(1.0), 0.0, 1e-15);
    record.deactivate().unwrap();
}

#[rstest]
#[case::missing_function(None, 1, vec![1.0])]
#[case::too_few_parameters(Some(MultivariateFunction::native(typical)), 2, vec![3.0])]
#[case::too_many_parameters(Some(MultivariateFunction::native(typical)), 1, vec![3.0, 1.0])]
fn test_failed_activation_leaves_state_unchanged(
    #[case] function: Option<MultivariateFunction>,
    #[case] arity: usize,
    #[case] parameters: Vec<f64>,
) {
    let outer =
        activate_multivariate(Some(MultivariateFunction::native(sin2)), 1, &[4.0]).unwrap();
    let before = active_multivariate();

    let result = activate_multivariate(function, arity, &parameters);
    assert!(matches!(
        result,
        Err(CallbackError::Unresolved { .. }) | Err(CallbackError::ArityMismatch { .. })
    ));

    assert_eq!(active_multivariate(), before);
    assert_eq!(multivariate_depth(), 1);
    assert_close(evaluate_at(PI / 2.0), 1.0, 1e-12);
    outer.deactivate().unwrap();
}

#[test]
fn test_failed_activation_with_nothing_active() {
    assert!(activate_multivariate(None, 0, &[]).is_err());
    assert_eq!(active_multivariate(), None);
}

#[test]
fn test_parameters_copied_at_activation() {
    let mut params = vec![2.0, 5.0];
    let (f, calls) = recorder();
    let record = activate_multivariate(Some(f), 2, &params).unwrap();

    params[0] = 100.0;
    evaluate_at(1.0);
    record.deactivate().unwrap();

    assert_eq!(calls.borrow()[0], vec![1.0, 2.0, 5.0]);
}

#[test]
fn test_state_snapshot() {
    let record =
        activate_multivariate(Some(MultivariateFunction::native(typical)), 2, &[3.0, 1.0]).unwrap();
    let state = active_multivariate().unwrap();
    assert_eq!(state.id, record.id());
    assert_eq!(state.arity, 2);
    assert_eq!(state.parameters, vec![3.0, 1.0]);
    record.deactivate().unwrap();
    assert_eq!(active_multivariate(), None);
}

proptest! {
    #[test]
    fn prop_point_always_first(
        x in -1e6..1e6_f64,
        params in prop::collection::vec(-1e6..1e6_f64, 0..12),
    ) {
        let (f, calls) = recorder();
        let record = activate_multivariate(Some(f), params.len(), &params).unwrap();
        evaluate_at(x);
        record.deactivate().unwrap();

        let mut expected = vec![x];
        expected.extend_from_slice(&params);
        prop_assert_eq!(calls.borrow().clone(), vec![expected]);
        prop_assert_eq!(active_multivariate(), None);
    }
}
