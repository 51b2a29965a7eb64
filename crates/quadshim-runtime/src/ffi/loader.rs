//! Dynamic library loading for native user functions
//!
//! Libraries are looked up in the configured directories, then the working
//! directory, then the usual system directories. Names the system loader
//! understands on its own (`libm.so.6`) fall through to it unchanged.

use crate::multivariate::{MultivariateFunction, NaryFn};
use crate::wrapper::{ScalarFn, ScalarFunction};
use libloading::Library;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::rc::Rc;

/// Library loading errors
#[derive(Debug, Clone, PartialEq)]
pub enum LoadError {
    /// Library file not found in search paths
    LibraryNotFound(String),
    /// Symbol not found in library
    SymbolNotFound { library: String, symbol: String },
    /// Failed to load library
    LoadFailed(String),
}

impl std::fmt::Display for LoadError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LoadError::LibraryNotFound(name) => write!(f, "Library not found: {}", name),
            LoadError::SymbolNotFound { library, symbol } => {
                write!(f, "Symbol '{}' not found in library '{}'", symbol, library)
            }
            LoadError::LoadFailed(msg) => write!(f, "Failed to load library: {}", msg),
        }
    }
}

impl std::error::Error for LoadError {}

/// System library directories searched after the configured ones
#[cfg(target_os = "linux")]
const SYSTEM_DIRS: &[&str] = &[
    "/usr/local/lib",
    "/usr/lib",
    "/lib",
    "/usr/lib64",
    "/lib64",
];
#[cfg(target_os = "macos")]
const SYSTEM_DIRS: &[&str] = &["/usr/local/lib", "/opt/homebrew/lib", "/usr/lib"];
#[cfg(not(any(target_os = "linux", target_os = "macos")))]
const SYSTEM_DIRS: &[&str] = &[];

/// Dynamic library loader with caching and platform-specific path resolution
///
/// Resolved functions hold a reference to their library, so a library stays
/// loaded while any function from it is active, even if the loader is dropped.
pub struct LibraryLoader {
    /// Cache of loaded libraries by resolved path
    loaded: HashMap<PathBuf, Rc<Library>>,
    /// Directories searched in order: configured, working directory, system
    search_paths: Vec<PathBuf>,
}

impl LibraryLoader {
    /// Create a new library loader with default search paths
    pub fn new() -> Self {
        Self {
            loaded: HashMap::new(),
            search_paths: Self::default_search_paths(),
        }
    }

    fn default_search_paths() -> Vec<PathBuf> {
        std::env::current_dir()
            .into_iter()
            .chain(SYSTEM_DIRS.iter().map(PathBuf::from))
            .collect()
    }

    /// Find the file behind `name`
    ///
    /// A name with a directory part is taken as a path. A bare name is tried
    /// in every search directory, first verbatim (`libintegrands.so.1`), then
    /// in the platform's naming convention (`integrands` -> `libintegrands.so`).
    fn locate(&self, name: &str) -> Option<PathBuf> {
        let path = Path::new(name);
        if path.components().count() > 1 {
            return path.is_file().then(|| path.to_path_buf());
        }

        let conventional = libloading::library_filename(name);
        self.search_paths
            .iter()
            .flat_map(|dir| [dir.join(name), dir.join(&conventional)])
            .find(|candidate| candidate.is_file())
    }

    /// Whether `name` looks like a file name the system loader can find itself
    fn is_system_name(name: &str) -> bool {
        let ext = std::env::consts::DLL_EXTENSION;
        !name.contains(std::path::MAIN_SEPARATOR)
            && (name.ends_with(&format!(".{}", ext)) || name.contains(&format!(".{}.", ext)))
    }

    /// Load a library by name or path
    ///
    /// Loads the library if not already loaded, or returns the cached instance.
    /// Library name can be:
    /// - Short name: "integrands" -> lib{integrands}.{ext} in the search paths
    /// - Full path: "/path/to/libfoo.so"
    /// - File name known to the system loader: "libm.so.6"
    ///
    /// Loading a dynamic library executes its initialization code; the caller
    /// must ensure the library is trusted.
    pub fn load(&mut self, name: &str) -> Result<Rc<Library>, LoadError> {
        let path = match self.locate(name) {
            Some(path) => path,
            None if Self::is_system_name(name) => PathBuf::from(name),
            None => return Err(LoadError::LibraryNotFound(name.to_string())),
        };

        if let Some(library) = self.loaded.get(&path) {
            return Ok(Rc::clone(library));
        }

        // SAFETY: see the method docs; initialization code is trusted.
        let library =
            unsafe { Library::new(&path) }.map_err(|e| LoadError::LoadFailed(e.to_string()))?;
        let library = Rc::new(library);

        tracing::debug!(library = %path.display(), "loaded native library");
        self.loaded.insert(path, Rc::clone(&library));
        Ok(library)
    }

    /// Look up `symbol` in `library` as a native scalar function
    ///
    /// # Safety
    ///
    /// The symbol must be a function with the [`ScalarFn`] signature.
    pub unsafe fn resolve_scalar(
        &mut self,
        library: &str,
        symbol: &str,
    ) -> Result<ScalarFunction, LoadError> {
        let lib = self.load(library)?;
        let func = *lookup::<ScalarFn>(&lib, library, symbol)?;
        Ok(ScalarFunction::native_in(func, lib))
    }

    /// Look up `symbol` in `library` as a native n-ary function
    ///
    /// # Safety
    ///
    /// The symbol must be a function with the [`NaryFn`] signature.
    pub unsafe fn resolve_multivariate(
        &mut self,
        library: &str,
        symbol: &str,
    ) -> Result<MultivariateFunction, LoadError> {
        let lib = self.load(library)?;
        let func = *lookup::<NaryFn>(&lib, library, symbol)?;
        Ok(MultivariateFunction::native_in(func, lib))
    }

    /// Add a custom search path (prepended to search list)
    pub fn add_search_path(&mut self, path: PathBuf) {
        self.search_paths.insert(0, path);
    }

    /// Current search paths, highest priority first
    pub fn search_paths(&self) -> &[PathBuf] {
        &self.search_paths
    }

    /// Get the number of loaded libraries
    pub fn loaded_count(&self) -> usize {
        self.loaded.len()
    }
}

impl Default for LibraryLoader {
    fn default() -> Self {
        Self::new()
    }
}

unsafe fn lookup<'lib, T>(
    lib: &'lib Library,
    library: &str,
    symbol: &str,
) -> Result<libloading::Symbol<'lib, T>, LoadError> {
    lib.get(symbol.as_bytes()).map_err(|_| LoadError::SymbolNotFound {
        library: library.to_string(),
        symbol: symbol.to_string(),
    })
}
