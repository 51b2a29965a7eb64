//! Adapter settings (`quadshim.toml` and `~/.quadshim/config.toml`)
//!
//! Both files share one schema; the loader merges them section by section.

use crate::{ConfigError, ConfigResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default logging filter when nothing is configured
pub const DEFAULT_LOG_FILTER: &str = "warn";

/// Settings from a quadshim configuration file
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(deny_unknown_fields)]
pub struct Settings {
    /// Native function resolution
    #[serde(skip_serializing_if = "Option::is_none")]
    pub native: Option<NativeSettings>,

    /// Context activation limits
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<ContextSettings>,

    /// Logging defaults
    #[serde(skip_serializing_if = "Option::is_none")]
    pub logging: Option<LoggingSettings>,
}

/// Where native libraries holding user functions are searched
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(deny_unknown_fields)]
pub struct NativeSettings {
    /// Extra directories, searched before the platform defaults
    #[serde(default)]
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub search_paths: Vec<PathBuf>,
}

/// Limits applied to nested context activations
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(deny_unknown_fields)]
pub struct ContextSettings {
    /// Maximum number of simultaneously active contexts per thread.
    /// Unlimited when absent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_depth: Option<usize>,
}

/// Logging defaults
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(deny_unknown_fields)]
pub struct LoggingSettings {
    /// `tracing` filter directive (e.g. "quadshim_runtime=debug")
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filter: Option<String>,
}

impl Settings {
    /// Load settings from a file
    pub fn load_from_file(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ConfigError::NotFound(path.to_path_buf())
            } else {
                ConfigError::IoError(e)
            }
        })?;

        let settings: Self = toml::from_str(&content).map_err(|e| ConfigError::TomlParseError {
            file: path.to_path_buf(),
            error: e,
        })?;

        settings.validate()?;
        Ok(settings)
    }

    /// Validate the settings
    pub fn validate(&self) -> ConfigResult<()> {
        if let Some(context) = &self.context {
            if context.max_depth == Some(0) {
                return Err(ConfigError::InvalidValue {
                    field: "context.max_depth".to_string(),
                    reason: "must be at least 1".to_string(),
                });
            }
        }

        if let Some(filter) = self.logging.as_ref().and_then(|l| l.filter.as_deref()) {
            if filter.trim().is_empty() {
                return Err(ConfigError::InvalidValue {
                    field: "logging.filter".to_string(),
                    reason: "must not be empty".to_string(),
                });
            }
        }

        if let Some(native) = &self.native {
            if native.search_paths.iter().any(|p| p.as_os_str().is_empty()) {
                return Err(ConfigError::InvalidValue {
                    field: "native.search_paths".to_string(),
                    reason: "contains an empty path".to_string(),
                });
            }
        }

        Ok(())
    }

    /// Get the global settings file path (~/.quadshim/config.toml)
    pub fn global_config_path() -> ConfigResult<PathBuf> {
        let home = dirs::home_dir().ok_or(ConfigError::HomeNotFound)?;
        Ok(home.join(".quadshim").join("config.toml"))
    }

    /// Configured nesting limit
    pub fn max_depth(&self) -> Option<usize> {
        self.context.as_ref().and_then(|c| c.max_depth)
    }

    /// Configured logging filter
    pub fn log_filter(&self) -> Option<&str> {
        self.logging.as_ref().and_then(|l| l.filter.as_deref())
    }

    /// Configured library search paths
    pub fn search_paths(&self) -> &[PathBuf] {
        self.native
            .as_ref()
            .map(|n| n.search_paths.as_slice())
            .unwrap_or(&[])
    }

    /// Merge another settings value into this one
    ///
    /// Other settings take precedence for non-None values. Search paths are
    /// accumulated, with the other file's paths first.
    pub fn merge(&mut self, other: &Settings) {
        if let Some(native) = &other.native {
            let mut paths = native.search_paths.clone();
            paths.extend(self.search_paths().iter().cloned());
            self.native = Some(NativeSettings {
                search_paths: paths,
            });
        }
        if let Some(context) = &other.context {
            if context.max_depth.is_some() {
                self.context = Some(context.clone());
            }
        }
        if let Some(logging) = &other.logging {
            if logging.filter.is_some() {
                self.logging = Some(logging.clone());
            }
        }
    }
}
