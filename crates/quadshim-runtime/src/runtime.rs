//! Runtime setup for embedding the adapter
//!
//! Applies a loaded [`Config`] to the current thread and owns the native
//! library loader used to resolve user functions by name.

use crate::ffi::{LibraryLoader, LoadError};
use crate::multivariate::MultivariateFunction;
use crate::stack;
use crate::wrapper::ScalarFunction;
use quadshim_config::settings::DEFAULT_LOG_FILTER;
use quadshim_config::Config;
use tracing_subscriber::{fmt, EnvFilter};

/// Adapter runtime
///
/// # Examples
///
/// ```
/// use quadshim_config::Config;
/// use quadshim_runtime::Runtime;
///
/// let runtime = Runtime::from_config(&Config::default());
/// assert_eq!(runtime.max_depth(), None);
/// runtime.apply_limits();
/// ```
pub struct Runtime {
    loader: LibraryLoader,
    max_depth: Option<usize>,
}

impl Runtime {
    /// Create a runtime with default search paths and no nesting limit
    pub fn new() -> Self {
        Self {
            loader: LibraryLoader::new(),
            max_depth: None,
        }
    }

    /// Create a runtime from loaded configuration
    ///
    /// Configured search paths take priority over the platform defaults and
    /// keep their configured order. The nesting limit is applied to the
    /// calling thread.
    pub fn from_config(config: &Config) -> Self {
        let mut loader = LibraryLoader::new();
        for path in config.search_paths().iter().rev() {
            loader.add_search_path(path.clone());
        }

        let runtime = Self {
            loader,
            max_depth: config.max_depth(),
        };
        runtime.apply_limits();
        runtime
    }

    /// Configured nesting limit
    pub fn max_depth(&self) -> Option<usize> {
        self.max_depth
    }

    /// Install this runtime's nesting limit on the calling thread
    ///
    /// Limits are per thread. A runtime is not `Send`; threads that build
    /// their own runtime from the same `Config` get the same limit.
    pub fn apply_limits(&self) {
        stack::set_max_depth(self.max_depth);
        tracing::debug!(max_depth = ?self.max_depth, "applied context limits");
    }

    /// Library loader backing [`Runtime::resolve_scalar`] and
    /// [`Runtime::resolve_multivariate`]
    pub fn loader(&self) -> &LibraryLoader {
        &self.loader
    }

    /// Mutable access to the loader, e.g. to add search paths after setup
    pub fn loader_mut(&mut self) -> &mut LibraryLoader {
        &mut self.loader
    }

    /// Resolve a native scalar user function by library and symbol name
    ///
    /// # Safety
    ///
    /// The symbol must be a function with the
    /// [`ScalarFn`](crate::wrapper::ScalarFn) signature.
    pub unsafe fn resolve_scalar(
        &mut self,
        library: &str,
        symbol: &str,
    ) -> Result<ScalarFunction, LoadError> {
        self.loader.resolve_scalar(library, symbol)
    }

    /// Resolve a native n-ary user function by library and symbol name
    ///
    /// # Safety
    ///
    /// The symbol must be a function with the
    /// [`NaryFn`](crate::multivariate::NaryFn) signature.
    pub unsafe fn resolve_multivariate(
        &mut self,
        library: &str,
        symbol: &str,
    ) -> Result<MultivariateFunction, LoadError> {
        self.loader.resolve_multivariate(library, symbol)
    }
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new()
    }
}

/// Install a stderr `tracing` subscriber
///
/// `filter` uses `EnvFilter` directive syntax; an invalid filter falls back to
/// the default of `warn`. Does nothing if a global subscriber is already set.
pub fn init_logging(filter: &str) {
    let filter =
        EnvFilter::try_new(filter).unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));

    let _ = fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}
