//! Engine configuration
//!
//! Values are resolved from defaults, then `CHATFLOW_*` environment
//! variables, then an optional `.chatflow/config.yaml` file.

use crate::common::env_loader::EnvLoader;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

const CONFIG_DIR: &str = ".chatflow";
const CONFIG_FILENAME: &str = "config.yaml";
const DEFAULT_MAX_AUTO_ADVANCE_STEPS: usize = 256;

/// Errors that can occur during configuration loading
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read a configuration file from disk
    #[error("Failed to read configuration file {path}: {source}")]
    FileRead {
        /// Path to the configuration file that could not be read
        path: PathBuf,
        /// Underlying I/O error that occurred during file reading
        #[source]
        source: std::io::Error,
    },

    /// Failed to parse YAML content from a configuration file
    #[error("Invalid YAML syntax in {path}:\n{source}\n\nHint: Check for proper indentation and YAML formatting")]
    YamlParse {
        /// Path to the configuration file with invalid YAML content
        path: PathBuf,
        /// Underlying YAML parsing error
        #[source]
        source: serde_yaml::Error,
    },

    /// Invalid configuration value for a specific field
    #[error("Invalid configuration value for '{field}': {value}\n{hint}")]
    InvalidValue {
        /// Name of the configuration field that has an invalid value
        field: String,
        /// The invalid value that was provided
        value: String,
        /// Helpful hint about how to fix the issue
        hint: String,
    },

    /// Configuration validation failed
    #[error("Configuration validation failed: {message}")]
    Validation {
        /// Descriptive message about the validation failure
        message: String,
    },
}

/// Settings for the workflow engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Run action handlers on background tasks (default: false)
    pub background_actions: bool,
    /// Per-handler timeout in milliseconds; `None` or 0 disables it
    pub action_timeout_ms: Option<u64>,
    /// Maximum automatic moves per operation (default: 256)
    pub max_auto_advance_steps: usize,
    /// Directory for persisted workflows; `None` keeps state in memory
    pub state_dir: Option<PathBuf>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            background_actions: false,
            action_timeout_ms: None,
            max_auto_advance_steps: DEFAULT_MAX_AUTO_ADVANCE_STEPS,
            state_dir: None,
        }
    }
}

impl EngineConfig {
    /// Create a configuration with values loaded from:
    /// 1. YAML file (highest precedence)
    /// 2. Environment variables
    /// 3. Defaults (lowest precedence)
    pub fn new() -> Self {
        let mut config = Self::default();
        config.apply_env_vars();

        match YamlConfig::load_or_default() {
            Ok(yaml_config) => yaml_config.apply_to_config(&mut config),
            Err(e) => {
                tracing::warn!(
                    "Failed to load YAML configuration, falling back to env vars and defaults: {}",
                    e
                );
            }
        }

        if let Err(e) = config.validate() {
            tracing::warn!("{}. Using default auto-advance limit.", e);
            config.max_auto_advance_steps = DEFAULT_MAX_AUTO_ADVANCE_STEPS;
        }

        config
    }

    /// Create a configuration from defaults and environment variables only
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env_vars();
        config
    }

    fn apply_env_vars(&mut self) {
        let loader = EnvLoader::new("CHATFLOW");

        self.background_actions = loader.load_flag("BACKGROUND_ACTIONS", self.background_actions);
        self.action_timeout_ms = loader
            .load_optional("ACTION_TIMEOUT_MS")
            .or(self.action_timeout_ms);
        self.max_auto_advance_steps =
            loader.load_parsed("MAX_AUTO_ADVANCE_STEPS", self.max_auto_advance_steps);
        if let Some(state_dir) = loader.load_optional::<PathBuf>("STATE_DIR") {
            self.state_dir = Some(state_dir).filter(|p| !p.as_os_str().is_empty());
        }
    }

    /// Handler timeout as a duration
    pub fn action_timeout(&self) -> Option<Duration> {
        self.action_timeout_ms
            .filter(|ms| *ms > 0)
            .map(Duration::from_millis)
    }

    /// Check value ranges
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_auto_advance_steps == 0 {
            return Err(ConfigError::InvalidValue {
                field: "max_auto_advance_steps".to_string(),
                value: "0".to_string(),
                hint: "max_auto_advance_steps must be at least 1".to_string(),
            });
        }
        Ok(())
    }

    /// Find the configuration file
    ///
    /// The search order is:
    /// 1. Current working directory: `.chatflow/config.yaml`
    /// 2. Home directory: `~/.chatflow/config.yaml`
    pub fn find_yaml_config_file() -> Option<PathBuf> {
        let mut search_paths = vec![PathBuf::from(CONFIG_DIR).join(CONFIG_FILENAME)];
        if let Some(home_dir) = dirs::home_dir() {
            search_paths.push(home_dir.join(CONFIG_DIR).join(CONFIG_FILENAME));
        }

        for config_path in search_paths {
            if let Some(path) = Self::check_config_file(&config_path) {
                tracing::debug!("Found configuration file: {:?}", path);
                return Some(path);
            }
        }

        tracing::debug!("No chatflow configuration file found in any search location");
        None
    }

    /// Return the path if it names a readable file
    pub fn check_config_file(config_path: &Path) -> Option<PathBuf> {
        match config_path.try_exists() {
            Ok(true) if config_path.is_file() => match std::fs::File::open(config_path) {
                Ok(_) => Some(config_path.to_path_buf()),
                Err(e) => {
                    tracing::warn!(
                        "Configuration file {:?} exists but cannot be read: {}",
                        config_path,
                        e
                    );
                    None
                }
            },
            Ok(false) => None,
            Ok(true) => {
                tracing::debug!("Found {:?} but it is not a file", config_path);
                None
            }
            Err(e) => {
                tracing::warn!(
                    "Error checking for configuration file {:?}: {}",
                    config_path,
                    e
                );
                None
            }
        }
    }

    /// Example configuration file content
    pub fn example_yaml_config() -> &'static str {
        r#"# .chatflow/config.yaml

# Run action handlers without waiting for them
background_actions: false

# Give up on a handler after this many milliseconds (0 disables)
action_timeout_ms: 30000

# Stop automatic moves after this many steps
max_auto_advance_steps: 256

# Persist workflows here so they resume after a restart
state_dir: ".chatflow/state"
"#
    }
}

/// Values that may appear in the YAML file
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct YamlConfig {
    /// Run action handlers on background tasks
    pub background_actions: Option<bool>,
    /// Per-handler timeout in milliseconds
    pub action_timeout_ms: Option<u64>,
    /// Maximum automatic moves per operation
    pub max_auto_advance_steps: Option<usize>,
    /// Directory for persisted workflows
    pub state_dir: Option<PathBuf>,
}

impl YamlConfig {
    /// Overlay the values present in the file onto `config`
    pub fn apply_to_config(&self, config: &mut EngineConfig) {
        if let Some(background_actions) = self.background_actions {
            config.background_actions = background_actions;
        }
        if let Some(action_timeout_ms) = self.action_timeout_ms {
            config.action_timeout_ms = Some(action_timeout_ms);
        }
        if let Some(max_auto_advance_steps) = self.max_auto_advance_steps {
            config.max_auto_advance_steps = max_auto_advance_steps;
        }
        if let Some(ref state_dir) = self.state_dir {
            config.state_dir = Some(state_dir.clone());
        }
    }

    /// Read and validate a YAML configuration file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        tracing::info!("Loading YAML configuration from: {:?}", path);

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::FileRead {
            path: path.to_path_buf(),
            source: e,
        })?;

        let config: YamlConfig =
            serde_yaml::from_str(&content).map_err(|e| ConfigError::YamlParse {
                path: path.to_path_buf(),
                source: e,
            })?;

        config.validate_yaml_values()?;
        Ok(config)
    }

    /// Load the discovered configuration file, or an empty one when none exists
    pub fn load_or_default() -> Result<Self, ConfigError> {
        match EngineConfig::find_yaml_config_file() {
            Some(path) => Self::load_from_file(path),
            None => Ok(Self::default()),
        }
    }

    fn validate_yaml_values(&self) -> Result<(), ConfigError> {
        if self.max_auto_advance_steps == Some(0) {
            return Err(ConfigError::InvalidValue {
                field: "max_auto_advance_steps".to_string(),
                value: "0".to_string(),
                hint: "max_auto_advance_steps must be at least 1".to_string(),
            });
        }
        if let Some(ref state_dir) = self.state_dir {
            if state_dir.as_os_str().is_empty() {
                return Err(ConfigError::InvalidValue {
                    field: "state_dir".to_string(),
                    value: String::new(),
                    hint: "state_dir cannot be empty; omit it to keep state in memory".to_string(),
                });
            }
        }
        Ok(())
    }
}
