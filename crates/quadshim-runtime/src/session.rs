//! Install a context, run a foreign routine, uninstall the context
//!
//! These helpers are what a binding layer calls around an opaque routine.
//! Each one is an unwind target, so a failure inside any callback (at any
//! nesting depth) surfaces once, at the outermost session, after every
//! context activated along the way has been restored.
//!
//! Nested sessions started from inside a user closure return
//! [`CallbackError::Unwinding`] when something below them failed; closures
//! should propagate it with `?`.
//!
//! ```
//! use quadshim_runtime::session::with_scalar;
//! use quadshim_runtime::wrapper::ScalarFunction;
//!
//! let square = ScalarFunction::closure(|x| Ok(x * x));
//! let sum = with_scalar(Some(square), |f| f(1.0) + f(2.0)).unwrap();
//! assert_eq!(sum, 5.0);
//! ```

use crate::error::{CallbackError, CallbackResult};
use crate::multivariate::{activate_multivariate, evaluate_at, Integrand, MultivariateFunction};
use crate::unwind::protect;
use crate::wrapper::{activate_wrapper, ScalarFunction};

/// Run `routine` with `function` active as a multivariate integrand
///
/// The arity is the number of `parameters`. `routine` receives the callback
/// to hand to the foreign code and is not called when activation fails.
pub fn with_multivariate<R, F>(
    function: Option<MultivariateFunction>,
    parameters: &[f64],
    routine: F,
) -> CallbackResult<R>
where
    F: FnOnce(Integrand) -> R,
{
    protect(|| -> CallbackResult<R> {
        let record = activate_multivariate(function, parameters.len(), parameters)?;
        let value = routine(evaluate_at);
        record.deactivate()?;
        Ok(value)
    })
    .and_then(|result| result)
}

/// Run `routine` with `function` active as a scalar integrand
///
/// The scalar function is driven through the multivariate context, with the
/// wrapper's entry point installed at arity 0.
pub fn with_scalar<R, F>(function: Option<ScalarFunction>, routine: F) -> CallbackResult<R>
where
    F: FnOnce(Integrand) -> R,
{
    let function = function.ok_or(CallbackError::Unresolved { what: "scalar" })?;

    protect(|| -> CallbackResult<R> {
        let wrapper = activate_wrapper(function);
        let record = activate_multivariate(Some(MultivariateFunction::wrapped()), 0, &[])?;
        let value = routine(evaluate_at);
        record.deactivate()?;
        wrapper.deactivate()?;
        Ok(value)
    })
    .and_then(|result| result)
}
