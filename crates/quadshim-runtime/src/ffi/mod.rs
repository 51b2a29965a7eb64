//! Native function resolution
//!
//! Opens shared libraries and looks up user functions by symbol name,
//! producing [`ScalarFunction`](crate::wrapper::ScalarFunction) and
//! [`MultivariateFunction`](crate::multivariate::MultivariateFunction)
//! values that keep their library loaded while they are in use.
//!
//! # Safety
//!
//! Loading a library runs its initialization code, and a symbol is trusted to
//! have the signature it is resolved as. All unsafe code is isolated in this
//! module.

pub mod loader;

pub use loader::{LibraryLoader, LoadError};
