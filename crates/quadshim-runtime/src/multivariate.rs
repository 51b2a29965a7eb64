//! Multivariate call context
//!
//! Lets a foreign routine that only knows `f(x)` drive a user function of the
//! form `f(n, [x, p1, ..., pn])`. Activation fixes the function, its arity and
//! the extra parameters; [`evaluate_at`] is the single-argument callback handed
//! to the routine, and prepends the evaluation point to the parameters on
//! every call.
//!
//! # Example
//!
//! ```
//! use quadshim_runtime::multivariate::{activate_multivariate, evaluate_at, MultivariateFunction};
//!
//! let shifted = MultivariateFunction::closure(|args| Ok(args[0] + args[1]));
//! let record = activate_multivariate(Some(shifted), 1, &[10.0]).unwrap();
//! assert_eq!(evaluate_at(2.5), 12.5);
//! record.deactivate().unwrap();
//! ```

use crate::error::{CallbackError, CallbackResult, EvalError};
use crate::stack::{self, ContextGuard, ContextId, ContextSlot};
use crate::unwind;
use libloading::Library;
use smallvec::SmallVec;
use std::cell::RefCell;
use std::ffi::c_void;
use std::os::raw::{c_double, c_int};
use std::rc::Rc;

/// Native n-ary user function: `double f(int n, double *args)`
pub type NaryFn = unsafe extern "C" fn(c_int, *mut c_double) -> c_double;

/// Single-argument callback convention expected by foreign routines
pub type Integrand = extern "C" fn(c_double) -> c_double;

/// By-reference variant of [`Integrand`] (Fortran calling convention)
pub type IntegrandByRef = extern "C" fn(*const c_double) -> c_double;

/// Rust-side n-ary user function
pub type NaryClosure = dyn Fn(&[f64]) -> Result<f64, EvalError>;

/// A user function of the evaluation point and the fixed parameters
#[derive(Clone)]
pub enum MultivariateFunction {
    /// A native function pointer, optionally pinning its shared library
    Native {
        func: NaryFn,
        library: Option<Rc<Library>>,
    },
    /// A Rust closure receiving `[x, p1, ..., pn]`
    Closure(Rc<NaryClosure>),
}

impl MultivariateFunction {
    /// Wrap a native function pointer
    pub fn native(func: NaryFn) -> Self {
        MultivariateFunction::Native {
            func,
            library: None,
        }
    }

    /// Wrap a native function pointer that lives in `library`
    pub fn native_in(func: NaryFn, library: Rc<Library>) -> Self {
        MultivariateFunction::Native {
            func,
            library: Some(library),
        }
    }

    /// Wrap a closure
    pub fn closure<F>(f: F) -> Self
    where
        F: Fn(&[f64]) -> Result<f64, EvalError> + 'static,
    {
        MultivariateFunction::Closure(Rc::new(f))
    }

    /// The single-variable wrapper's entry point, presented as an n-ary
    /// function. Activate it with arity 0 to drive the active wrapper
    /// function through this context.
    pub fn wrapped() -> Self {
        Self::native(crate::wrapper::evaluate_wrapped)
    }

    /// Interpret an opaque pointer as a native n-ary function
    ///
    /// Returns `None` for a null pointer.
    ///
    /// # Safety
    ///
    /// A non-null `ptr` must point to a function with the [`NaryFn`]
    /// signature that stays valid while the result is in use.
    pub unsafe fn from_raw(ptr: *const c_void) -> Option<Self> {
        if ptr.is_null() {
            None
        } else {
            Some(Self::native(std::mem::transmute::<*const c_void, NaryFn>(
                ptr,
            )))
        }
    }

    fn call(&self, arity: c_int, args: &mut [f64]) -> Result<f64, EvalError> {
        match self {
            MultivariateFunction::Native { func, .. } => {
                // SAFETY: `args` holds `arity + 1` values, as the native
                // convention requires.
                Ok(unsafe { func(arity, args.as_mut_ptr()) })
            }
            MultivariateFunction::Closure(f) => f(args),
        }
    }
}

impl std::fmt::Debug for MultivariateFunction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MultivariateFunction::Native { func, library } => f
                .debug_struct("Native")
                .field("func", &(*func as *const ()))
                .field("pinned", &library.is_some())
                .finish(),
            MultivariateFunction::Closure(_) => f.write_str("Closure(..)"),
        }
    }
}

struct ActiveMultivariate {
    function: MultivariateFunction,
    arity: c_int,
    parameters: Rc<[f64]>,
    /// `[x, p1, ..., pn]`, allocated once per activation
    scratch: RefCell<Box<[f64]>>,
}

impl ActiveMultivariate {
    fn evaluate(&self, x: f64) -> Result<f64, EvalError> {
        tracing::trace!(x, arity = self.arity, "multivariate evaluation");

        // Parameters are copied in on every call: a native function may
        // scribble over its argument array.
        match self.scratch.try_borrow_mut() {
            Ok(mut scratch) => {
                scratch[0] = x;
                scratch[1..].copy_from_slice(&self.parameters);
                self.function.call(self.arity, &mut scratch[..])
            }
            Err(_) => {
                // Re-entered at the same level while the buffer is in use.
                let mut args: SmallVec<[f64; 8]> =
                    SmallVec::with_capacity(self.parameters.len() + 1);
                args.push(x);
                args.extend_from_slice(&self.parameters);
                self.function.call(self.arity, &mut args)
            }
        }
    }
}

thread_local! {
    static MULTIVARIATE: ContextSlot<Rc<ActiveMultivariate>> = const { ContextSlot::new() };
}

/// Call context record for one multivariate activation
///
/// Deactivate with [`MultivariateRecord::deactivate`]; dropping the record
/// restores the previous context as well.
pub struct MultivariateRecord {
    guard: ContextGuard<Rc<ActiveMultivariate>>,
}

impl MultivariateRecord {
    /// Identity of this activation
    pub fn id(&self) -> ContextId {
        self.guard.id()
    }

    /// Identity of the activation this one displaced
    pub fn previous_id(&self) -> Option<ContextId> {
        self.guard.previous_id()
    }

    /// Nesting depth of this activation (outermost is 1)
    pub fn depth(&self) -> usize {
        self.guard.depth()
    }

    /// Number of extra parameters
    pub fn arity(&self) -> usize {
        self.guard.current().parameters.len()
    }

    /// The extra parameters, in order
    pub fn parameters(&self) -> &[f64] {
        &self.guard.current().parameters
    }

    /// Restore the previous multivariate context
    ///
    /// Fails with `NestingViolation` when records are deactivated out of
    /// order; the previous context is written back regardless.
    pub fn deactivate(self) -> CallbackResult<()> {
        self.guard.restore()
    }
}

impl std::fmt::Debug for MultivariateRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MultivariateRecord")
            .field("id", &self.id())
            .field("previous", &self.previous_id())
            .field("parameters", &self.parameters())
            .finish()
    }
}

/// Snapshot of the active multivariate context
#[derive(Debug, Clone, PartialEq)]
pub struct MultivariateState {
    pub id: ContextId,
    pub arity: usize,
    pub parameters: Vec<f64>,
}

/// Activate `function` with `arity` extra parameters
///
/// Fails without touching the active context when `function` is absent,
/// when `parameters` does not hold exactly `arity` values, or when the
/// thread's nesting limit is reached. The parameters are copied into the
/// record, so the caller's buffer is free once this returns.
pub fn activate_multivariate(
    function: Option<MultivariateFunction>,
    arity: usize,
    parameters: &[f64],
) -> CallbackResult<MultivariateRecord> {
    let function = function.ok_or(CallbackError::Unresolved {
        what: "multivariate",
    })?;
    if parameters.len() != arity {
        return Err(CallbackError::ArityMismatch {
            declared: arity,
            supplied: parameters.len(),
        });
    }
    let native_arity = c_int::try_from(arity).map_err(|_| CallbackError::ArityOverflow(arity))?;

    let mut scratch = vec![0.0; arity + 1].into_boxed_slice();
    scratch[1..].copy_from_slice(parameters);

    let active = Rc::new(ActiveMultivariate {
        function,
        arity: native_arity,
        parameters: Rc::from(parameters),
        scratch: RefCell::new(scratch),
    });

    let guard = ContextGuard::install(&MULTIVARIATE, active, stack::max_depth(), "multivariate")?;
    Ok(MultivariateRecord { guard })
}

/// Evaluate the active function at `x`, reporting failures to the caller
pub fn try_evaluate_at(x: f64) -> Result<f64, EvalError> {
    let active = MULTIVARIATE
        .with(|slot| slot.current())
        .ok_or(EvalError::NoActiveContext("multivariate"))?;
    active.evaluate(x)
}

/// Callback entry point for foreign routines
///
/// Calls the active function with `[x, p1, ..., pn]` and returns its result
/// unchanged, non-finite values included. A failure is recorded for the
/// enclosing unwind target and NaN is returned.
pub extern "C" fn evaluate_at(x: c_double) -> c_double {
    unwind::guard_callback(|| try_evaluate_at(x))
}

/// By-reference callback entry point
///
/// `x` must be null or point to a readable `double`; null is reported as a
/// fatal evaluation error.
#[allow(clippy::not_unsafe_ptr_arg_deref)]
pub extern "C" fn evaluate_at_ref(x: *const c_double) -> c_double {
    unwind::guard_callback(|| {
        if x.is_null() {
            return Err(EvalError::NullArgument);
        }
        // SAFETY: non-null pointers from the foreign routine are readable.
        try_evaluate_at(unsafe { *x })
    })
}

/// Snapshot of the active context, if any
pub fn active_multivariate() -> Option<MultivariateState> {
    MULTIVARIATE.with(|slot| {
        let id = slot.active_id()?;
        let active = slot.current()?;
        Some(MultivariateState {
            id,
            arity: active.parameters.len(),
            parameters: active.parameters.to_vec(),
        })
    })
}

/// Number of nested multivariate activations on this thread
pub fn multivariate_depth() -> usize {
    MULTIVARIATE.with(|slot| slot.depth())
}
