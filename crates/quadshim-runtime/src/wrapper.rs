//! Single-variable wrapper context
//!
//! Presents a plain scalar function `g(x)` through the n-ary calling shape
//! used by the multivariate context, so scalar and multivariate user functions
//! share one pipeline: activate the wrapper with `g`, then activate
//! [`MultivariateFunction::wrapped`](crate::multivariate::MultivariateFunction::wrapped)
//! at arity 0.

use crate::error::{CallbackResult, EvalError};
use crate::stack::{ContextGuard, ContextId, ContextSlot};
use crate::unwind;
use libloading::Library;
use std::ffi::c_void;
use std::os::raw::{c_double, c_int};
use std::rc::Rc;

/// Native scalar user function: `double g(double x)`
pub type ScalarFn = unsafe extern "C" fn(c_double) -> c_double;

/// Rust-side scalar user function
pub type ScalarClosure = dyn Fn(f64) -> Result<f64, EvalError>;

/// A user function of one variable
#[derive(Clone)]
pub enum ScalarFunction {
    /// A native function pointer, optionally pinning its shared library
    Native {
        func: ScalarFn,
        library: Option<Rc<Library>>,
    },
    /// A Rust closure
    Closure(Rc<ScalarClosure>),
}

impl ScalarFunction {
    /// Wrap a native function pointer
    pub fn native(func: ScalarFn) -> Self {
        ScalarFunction::Native {
            func,
            library: None,
        }
    }

    /// Wrap a native function pointer that lives in `library`
    pub fn native_in(func: ScalarFn, library: Rc<Library>) -> Self {
        ScalarFunction::Native {
            func,
            library: Some(library),
        }
    }

    /// Wrap a closure
    pub fn closure<F>(f: F) -> Self
    where
        F: Fn(f64) -> Result<f64, EvalError> + 'static,
    {
        ScalarFunction::Closure(Rc::new(f))
    }

    /// Interpret an opaque pointer as a native scalar function
    ///
    /// Returns `None` for a null pointer.
    ///
    /// # Safety
    ///
    /// A non-null `ptr` must point to a function with the [`ScalarFn`]
    /// signature that stays valid while the result is in use.
    pub unsafe fn from_raw(ptr: *const c_void) -> Option<Self> {
        if ptr.is_null() {
            None
        } else {
            Some(Self::native(std::mem::transmute::<*const c_void, ScalarFn>(
                ptr,
            )))
        }
    }

    fn call(&self, x: f64) -> Result<f64, EvalError> {
        match self {
            // SAFETY: the pointer was resolved with the `ScalarFn` signature.
            ScalarFunction::Native { func, .. } => Ok(unsafe { func(x) }),
            ScalarFunction::Closure(f) => f(x),
        }
    }
}

impl std::fmt::Debug for ScalarFunction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ScalarFunction::Native { func, library } => f
                .debug_struct("Native")
                .field("func", &(*func as *const ()))
                .field("pinned", &library.is_some())
                .finish(),
            ScalarFunction::Closure(_) => f.write_str("Closure(..)"),
        }
    }
}

thread_local! {
    static WRAPPER: ContextSlot<ScalarFunction> = const { ContextSlot::new() };
}

/// Call context record for one wrapper activation
pub struct WrapperRecord {
    guard: ContextGuard<ScalarFunction>,
}

impl WrapperRecord {
    /// Identity of this activation
    pub fn id(&self) -> ContextId {
        self.guard.id()
    }

    /// Identity of the activation this one displaced
    pub fn previous_id(&self) -> Option<ContextId> {
        self.guard.previous_id()
    }

    /// The wrapped function
    pub fn function(&self) -> &ScalarFunction {
        self.guard.current()
    }

    /// Restore the previous wrapper function
    pub fn deactivate(self) -> CallbackResult<()> {
        self.guard.restore()
    }
}

impl std::fmt::Debug for WrapperRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WrapperRecord")
            .field("id", &self.id())
            .field("previous", &self.previous_id())
            .field("function", self.function())
            .finish()
    }
}

/// Make `function` the active wrapper function
///
/// Always succeeds; the wrapper context has no nesting limit.
pub fn activate_wrapper(function: ScalarFunction) -> WrapperRecord {
    WrapperRecord {
        guard: ContextGuard::install_unbounded(&WRAPPER, function, "wrapper"),
    }
}

/// Call the active wrapper function with `args[0]`, ignoring the rest
pub fn try_evaluate_wrapped(args: &[f64]) -> Result<f64, EvalError> {
    let x = *args.first().ok_or(EvalError::MissingArgument)?;
    let function = WRAPPER
        .with(|slot| slot.current())
        .ok_or(EvalError::NoActiveContext("wrapper"))?;
    tracing::trace!(x, "wrapped evaluation");
    function.call(x)
}

/// N-ary entry point for the active wrapper function
///
/// Ignores `n` and evaluates the wrapped function at `args[0]`. `args` must
/// be null or point to at least one readable `double`; null is reported as a
/// fatal evaluation error.
#[allow(clippy::not_unsafe_ptr_arg_deref)]
pub extern "C" fn evaluate_wrapped(_n: c_int, args: *mut c_double) -> c_double {
    unwind::guard_callback(|| {
        if args.is_null() {
            return Err(EvalError::NullArgument);
        }
        // SAFETY: non-null argument arrays hold at least the evaluation point.
        let x = unsafe { *args };
        try_evaluate_wrapped(&[x])
    })
}

/// Identity of the active wrapper activation, if any
pub fn active_wrapper() -> Option<ContextId> {
    WRAPPER.with(|slot| slot.active_id())
}

/// Number of nested wrapper activations on this thread
pub fn wrapper_depth() -> usize {
    WRAPPER.with(|slot| slot.depth())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    unsafe extern "C" fn triple(x: c_double) -> c_double {
        3.0 * x
    }

    #[test]
    fn test_wrapped_ignores_extra_arguments() {
        let record = activate_wrapper(ScalarFunction::native(triple));
        assert_eq!(try_evaluate_wrapped(&[2.0, 100.0, -5.0]), Ok(6.0));
        let mut args = [4.0, 9.0];
        assert_eq!(evaluate_wrapped(7, args.as_mut_ptr()), 12.0);
        record.deactivate().unwrap();
    }

    #[test]
    fn test_empty_arguments_rejected() {
        let record = activate_wrapper(ScalarFunction::closure(Ok));
        assert_eq!(try_evaluate_wrapped(&[]), Err(EvalError::MissingArgument));
        record.deactivate().unwrap();
    }

    #[test]
    fn test_no_active_wrapper() {
        assert_eq!(
            try_evaluate_wrapped(&[1.0]),
            Err(EvalError::NoActiveContext("wrapper"))
        );
        assert_eq!(active_wrapper(), None);
    }

    #[test]
    fn test_activation_swaps_and_restores() {
        let outer = activate_wrapper(ScalarFunction::closure(|x| Ok(x + 1.0)));
        let inner = activate_wrapper(ScalarFunction::closure(|x| Ok(x - 1.0)));
        assert_eq!(inner.previous_id(), Some(outer.id()));
        assert_eq!(try_evaluate_wrapped(&[5.0]), Ok(4.0));
        assert_eq!(wrapper_depth(), 2);

        inner.deactivate().unwrap();
        assert_eq!(active_wrapper(), Some(outer.id()));
        assert_eq!(try_evaluate_wrapped(&[5.0]), Ok(6.0));
        outer.deactivate().unwrap();
        assert_eq!(wrapper_depth(), 0);
    }

    #[test]
    fn test_from_raw_null_is_none() {
        assert!(unsafe { ScalarFunction::from_raw(std::ptr::null()) }.is_none());
    }
}
