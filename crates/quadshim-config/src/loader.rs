//! Configuration Loader
//!
//! Handles loading and merging configuration from multiple sources with proper precedence.

use crate::settings::{
    ContextSettings, LoggingSettings, NativeSettings, Settings, DEFAULT_LOG_FILTER,
};
use crate::{ConfigError, ConfigResult};
use std::env;
use std::path::{Path, PathBuf};

/// Project configuration file name
pub const PROJECT_CONFIG_FILE: &str = "quadshim.toml";

/// Configuration loader
///
/// Loads configuration from multiple sources and merges them with proper precedence:
/// 1. Global config (~/.quadshim/config.toml) - lowest priority
/// 2. Project config (./quadshim.toml) - overrides global
/// 3. Environment variables (QUADSHIM_*) - overrides project
pub struct ConfigLoader {
    /// Cached global config path
    global_config_path: Option<PathBuf>,
}

/// Merged configuration result
#[derive(Debug, Clone, Default)]
pub struct Config {
    /// Effective settings after merging every source
    pub settings: Settings,

    /// Project root directory (where quadshim.toml was found)
    pub project_root: Option<PathBuf>,
}

impl ConfigLoader {
    /// Create a new configuration loader
    pub fn new() -> Self {
        Self {
            global_config_path: None,
        }
    }

    /// Create a loader that reads the global config from a specific path
    pub fn with_global_path(path: PathBuf) -> Self {
        Self {
            global_config_path: Some(path),
        }
    }

    /// Load configuration starting from the given directory
    ///
    /// Walks up the directory tree to find quadshim.toml, merges it over the
    /// global config if one exists, then applies environment overrides.
    pub fn load_from_directory(&mut self, start_dir: &Path) -> ConfigResult<Config> {
        let (project_root, project_settings) = self.find_project_config(start_dir)?;

        let mut settings = self.load_global_config()?;
        settings.merge(&project_settings);
        let settings = self.apply_env_overrides(settings)?;

        Ok(Config {
            settings,
            project_root,
        })
    }

    /// Load configuration from a specific project config file
    pub fn load_from_file(&mut self, config_path: &Path) -> ConfigResult<Config> {
        let project_settings = Settings::load_from_file(config_path)?;

        let mut settings = self.load_global_config()?;
        settings.merge(&project_settings);
        let settings = self.apply_env_overrides(settings)?;

        Ok(Config {
            settings,
            project_root: config_path.parent().map(|p| p.to_path_buf()),
        })
    }

    /// Find project configuration by walking up directory tree
    fn find_project_config(&self, start_dir: &Path) -> ConfigResult<(Option<PathBuf>, Settings)> {
        let mut current = start_dir.to_path_buf();

        loop {
            let config_path = current.join(PROJECT_CONFIG_FILE);

            if config_path.exists() {
                let settings = Settings::load_from_file(&config_path)?;
                return Ok((Some(current), settings));
            }

            match current.parent() {
                Some(parent) => current = parent.to_path_buf(),
                None => return Ok((None, Settings::default())),
            }
        }
    }

    /// Load global configuration
    ///
    /// A missing file (or a missing home directory) yields default settings.
    fn load_global_config(&mut self) -> ConfigResult<Settings> {
        if self.global_config_path.is_none() {
            match Settings::global_config_path() {
                Ok(path) => self.global_config_path = Some(path),
                Err(ConfigError::HomeNotFound) => return Ok(Settings::default()),
                Err(e) => return Err(e),
            }
        }

        match &self.global_config_path {
            Some(path) if path.exists() => Settings::load_from_file(path),
            _ => Ok(Settings::default()),
        }
    }

    /// Apply environment variable overrides
    ///
    /// - `QUADSHIM_LOG`: logging filter
    /// - `QUADSHIM_MAX_DEPTH`: nesting limit
    /// - `QUADSHIM_LIBRARY_PATH`: extra search paths (platform path-list syntax),
    ///   searched before every configured path
    fn apply_env_overrides(&self, mut settings: Settings) -> ConfigResult<Settings> {
        if let Ok(filter) = env::var("QUADSHIM_LOG") {
            settings.logging = Some(LoggingSettings {
                filter: Some(filter),
            });
        }

        if let Ok(depth) = env::var("QUADSHIM_MAX_DEPTH") {
            let max_depth = depth
                .trim()
                .parse::<usize>()
                .map_err(|e| ConfigError::InvalidValue {
                    field: "QUADSHIM_MAX_DEPTH".to_string(),
                    reason: e.to_string(),
                })?;
            settings.context = Some(ContextSettings {
                max_depth: Some(max_depth),
            });
        }

        if let Some(paths) = env::var_os("QUADSHIM_LIBRARY_PATH") {
            let overrides = Settings {
                native: Some(NativeSettings {
                    search_paths: env::split_paths(&paths)
                        .filter(|p| !p.as_os_str().is_empty())
                        .collect(),
                }),
                ..Default::default()
            };
            settings.merge(&overrides);
        }

        settings.validate()?;
        Ok(settings)
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl Config {
    /// Get the effective logging filter (configured > default)
    pub fn log_filter(&self) -> &str {
        self.settings.log_filter().unwrap_or(DEFAULT_LOG_FILTER)
    }

    /// Get the nesting limit, if any
    pub fn max_depth(&self) -> Option<usize> {
        self.settings.max_depth()
    }

    /// Get the extra library search paths
    pub fn search_paths(&self) -> &[PathBuf] {
        self.settings.search_paths()
    }

    /// Get the project root directory
    pub fn project_root(&self) -> Option<&Path> {
        self.project_root.as_deref()
    }

    /// Check if a project config file was found
    pub fn is_project(&self) -> bool {
        self.project_root.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::fs;
    use tempfile::TempDir;

    fn create_config_file(dir: &Path, content: &str) -> PathBuf {
        let config_path = dir.join(PROJECT_CONFIG_FILE);
        fs::write(&config_path, content).unwrap();
        config_path
    }

    fn isolated_loader(dir: &TempDir) -> ConfigLoader {
        ConfigLoader::with_global_path(dir.path().join("no-global.toml"))
    }

    #[test]
    #[serial]
    fn test_load_project_config() {
        let temp_dir = TempDir::new().unwrap();
        create_config_file(
            temp_dir.path(),
            r#"
[context]
max_depth = 16
"#,
        );

        let mut loader = isolated_loader(&temp_dir);
        let config = loader.load_from_directory(temp_dir.path()).unwrap();

        assert_eq!(config.max_depth(), Some(16));
        assert!(config.is_project());
    }

    #[test]
    #[serial]
    fn test_find_config_in_parent() {
        let temp_dir = TempDir::new().unwrap();
        create_config_file(
            temp_dir.path(),
            r#"
[logging]
filter = "info"
"#,
        );

        let sub_dir = temp_dir.path().join("subdir");
        fs::create_dir(&sub_dir).unwrap();

        let mut loader = isolated_loader(&temp_dir);
        let config = loader.load_from_directory(&sub_dir).unwrap();

        assert_eq!(config.log_filter(), "info");
        assert_eq!(config.project_root(), Some(temp_dir.path()));
    }

    #[test]
    #[serial]
    fn test_env_override_max_depth() {
        let temp_dir = TempDir::new().unwrap();
        create_config_file(
            temp_dir.path(),
            r#"
[context]
max_depth = 16
"#,
        );

        env::set_var("QUADSHIM_MAX_DEPTH", "3");

        let mut loader = isolated_loader(&temp_dir);
        let config = loader.load_from_directory(temp_dir.path()).unwrap();

        assert_eq!(config.max_depth(), Some(3));

        env::remove_var("QUADSHIM_MAX_DEPTH");
    }

    #[test]
    #[serial]
    fn test_env_override_invalid_depth() {
        let temp_dir = TempDir::new().unwrap();

        env::set_var("QUADSHIM_MAX_DEPTH", "deep");

        let mut loader = isolated_loader(&temp_dir);
        let result = loader.load_from_directory(temp_dir.path());

        env::remove_var("QUADSHIM_MAX_DEPTH");

        assert!(matches!(result, Err(ConfigError::InvalidValue { .. })));
    }

    #[test]
    fn test_default_log_filter() {
        let config = Config::default();
        assert_eq!(config.log_filter(), DEFAULT_LOG_FILTER);
    }
}
