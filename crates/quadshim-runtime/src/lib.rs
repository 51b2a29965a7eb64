//! quadshim Runtime - callback adapter for foreign numeric routines
//!
//! Foreign quadrature routines call back into a user function through a bare
//! `double f(double)` pointer with no closure argument. This crate supplies
//! that callback while the actual function and its extra parameters live in
//! per-thread call contexts:
//! - Multivariate context: `f(x, p1, ..., pn)` presented as `g(x)`
//! - Wrapper context: a scalar `g(x)` presented in the n-ary calling shape
//! - Stacked save/restore so integrands may themselves integrate
//! - Abnormal unwind that reports a failed evaluation once, at the outermost
//!   protected boundary
//! - Native user functions resolved by symbol name from shared libraries
//!
//! # Example
//!
//! ```no_run
//! use quadshim_config::ConfigLoader;
//! use quadshim_runtime::{init_logging, with_scalar, Runtime};
//! use std::path::Path;
//!
//! let config = ConfigLoader::new().load_from_directory(Path::new(".")).unwrap();
//! init_logging(config.log_filter());
//!
//! let mut runtime = Runtime::from_config(&config);
//! let cos = unsafe { runtime.resolve_scalar("integrands", "damped_cos") }.unwrap();
//!
//! // `integrate` stands for any foreign routine taking `double (*)(double)`
//! # fn integrate(f: quadshim_runtime::Integrand, a: f64, b: f64) -> f64 { f(a) * (b - a) }
//! let area = with_scalar(Some(cos), |f| integrate(f, 0.0, 1.0)).unwrap();
//! println!("{}", area);
//! ```

/// quadshim runtime version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub mod error;
pub mod ffi;
pub mod multivariate;
pub mod runtime;
pub mod session;
pub mod stack;
pub mod unwind;
pub mod wrapper;


pub use error::{CallbackError, CallbackResult, ContextDescription, EvalError};
pub use ffi::{LibraryLoader, LoadError};
pub use multivariate::{
    activate_multivariate, active_multivariate, evaluate_at, evaluate_at_ref, Integrand,
    IntegrandByRef, MultivariateFunction, MultivariateRecord, MultivariateState, NaryFn,
};
pub use runtime::{init_logging, Runtime};
pub use session::{with_multivariate, with_scalar};
pub use stack::ContextId;
pub use unwind::protect;
pub use wrapper::{activate_wrapper, evaluate_wrapped, ScalarFn, ScalarFunction, WrapperRecord};
