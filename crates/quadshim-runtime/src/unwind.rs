//! Abnormal unwind across opaque foreign frames
//!
//! A foreign routine cannot be trusted to propagate an error from its
//! callback, and Rust panics must never cross its frames. Instead:
//!
//! - Every callback entry point runs user code under [`guard_callback`]. A
//!   failure there (error result, panic, bad arguments) is recorded in a
//!   thread-local abort token and the callback returns NaN. While the token is
//!   set, later callbacks return NaN immediately without running user code.
//! - [`protect`] marks an unwind target. Targets nest: each saves the previous
//!   target depth and restores it on exit, even when unwinding. When the
//!   protected body returns, the outermost target takes the token and reports
//!   it once as [`CallbackError::Fatal`]; inner targets report
//!   [`CallbackError::Unwinding`] and leave the token for the outer one.
//!
//! Context records activated inside a protected body are restored by their
//! guards before the body returns, so by the time the failure surfaces at the
//! outermost target the active contexts are back to their pre-call values.
//!
//! Records used without any target own the token themselves: restoring the
//! last live record on the thread takes a pending failure and returns it as
//! `Fatal`, and the next activation on an idle thread discards a failure left
//! behind by a stray evaluation. Either way one failure never leaks into an
//! unrelated activation.

use crate::error::{CallbackError, CallbackResult, EvalError};
use crate::stack;
use std::cell::{Cell, RefCell};
use std::panic::{self, AssertUnwindSafe};

thread_local! {
    static TARGET_DEPTH: Cell<usize> = const { Cell::new(0) };
    static ABORT: RefCell<Option<EvalError>> = const { RefCell::new(None) };
}

/// Whether an evaluation failure is waiting to be reported
pub fn is_aborting() -> bool {
    ABORT.with(|a| a.borrow().is_some())
}

/// Number of nested unwind targets on the current thread
pub fn target_depth() -> usize {
    TARGET_DEPTH.try_with(|d| d.get()).unwrap_or(0)
}

/// Record an evaluation failure; the first one wins
pub(crate) fn record_fatal(err: EvalError) {
    ABORT.with(|a| {
        let mut pending = a.borrow_mut();
        if pending.is_none() {
            tracing::warn!(error = %err, depth = target_depth(), "aborting evaluation");
            *pending = Some(err);
        } else {
            tracing::trace!(error = %err, "already aborting; error dropped");
        }
    });
}

pub(crate) fn take_fatal() -> Option<EvalError> {
    ABORT.try_with(|a| a.borrow_mut().take()).ok().flatten()
}

/// Drop a failure left over from an earlier, unprotected evaluation
pub(crate) fn discard_stale() {
    if let Some(stale) = take_fatal() {
        tracing::warn!(error = %stale, "discarding failure recorded outside any unwind target");
    }
}

/// Run user code on behalf of a foreign caller
///
/// Never unwinds. Returns NaN when the evaluation fails or when an earlier
/// failure is still pending.
pub(crate) fn guard_callback<F>(eval: F) -> f64
where
    F: FnOnce() -> Result<f64, EvalError>,
{
    if is_aborting() {
        return f64::NAN;
    }

    match panic::catch_unwind(AssertUnwindSafe(eval)) {
        Ok(Ok(value)) => value,
        Ok(Err(err)) => {
            record_fatal(err);
            f64::NAN
        }
        Err(payload) => {
            record_fatal(EvalError::from_panic(payload.as_ref()));
            f64::NAN
        }
    }
}

/// Restores the previous target depth on every exit path
struct TargetGuard {
    previous: usize,
}

impl TargetGuard {
    fn enter() -> Self {
        let previous = TARGET_DEPTH.with(|d| {
            let previous = d.get();
            d.set(previous + 1);
            previous
        });
        Self { previous }
    }

    fn is_outermost(&self) -> bool {
        self.previous == 0
    }
}

impl Drop for TargetGuard {
    fn drop(&mut self) {
        let _ = TARGET_DEPTH.try_with(|d| d.set(self.previous));
    }
}

/// Run `body` as an unwind target
///
/// Returns `Ok` with the body's value when no evaluation failed inside it.
/// Otherwise the outermost target returns `Fatal` with the first recorded
/// failure and clears it; nested targets return `Unwinding`.
///
/// A panic escaping `body` is reported as `Fatal` at the outermost target
/// and re-raised at nested ones, where the enclosing callback catches it.
pub fn protect<R, F>(body: F) -> CallbackResult<R>
where
    F: FnOnce() -> R,
{
    let target = TargetGuard::enter();

    // A failure pending under a live context record belongs to that record.
    if target.is_outermost() && !stack::guards_active() {
        discard_stale();
    }

    let outcome = panic::catch_unwind(AssertUnwindSafe(body));
    let outermost = target.is_outermost();
    drop(target);

    match outcome {
        Ok(value) => {
            if !is_aborting() {
                Ok(value)
            } else if outermost {
                match take_fatal() {
                    Some(err) => {
                        tracing::error!(error = %err, "evaluation failed");
                        Err(CallbackError::Fatal(err))
                    }
                    None => Ok(value),
                }
            } else {
                Err(CallbackError::Unwinding)
            }
        }
        Err(payload) => {
            if outermost {
                // A failure recorded earlier takes precedence over the panic.
                let err = take_fatal().unwrap_or_else(|| EvalError::from_panic(payload.as_ref()));
                tracing::error!(error = %err, "evaluation failed");
                Err(CallbackError::Fatal(err))
            } else {
                panic::resume_unwind(payload)
            }
        }
    }
}
