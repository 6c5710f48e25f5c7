//! Application settings loading and validation.
//!
//! The top-level `Config` aggregates logging, simulation and transport
//! settings. It is read from an optional TOML file, then overridden by the
//! command line (see [`crate::cli`]), and stays immutable afterwards.
//!
//! Settings file lookup order:
//! 1. `--settings <path>`
//! 2. `THERMOSIM_CONFIG` environment variable
//! 3. `/etc/thermosim/config.toml` when it exists
//! 4. built-in defaults

use std::{
    fs,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};
use time::{macros::format_description, OffsetDateTime};
use validator::Validate;

use self::{logger::LoggerConfig, simulation::SimulationConfig};

pub mod logger;
pub mod simulation;

/// Environment variable naming the settings file.
pub const CONFIG_ENV: &str = "THERMOSIM_CONFIG";

/// Settings file used when neither the flag nor the variable is set.
pub const DEFAULT_CONFIG_PATH: &str = "/etc/thermosim/config.toml";

/// Transport settings come straight from the MQTT crate.
pub type TransportConfig = thermosim_mqtt::Config;

/// Timestamp prefix for messages printed before the subscriber exists.
#[doc(hidden)]
pub fn early_timestamp() -> String {
    OffsetDateTime::now_utc()
        .format(format_description!(
            "[year]-[month]-[day]T[hour]:[minute]:[second].[subsecond digits:6]Z"
        ))
        .unwrap_or_default()
}

/// Macros for printing timestamped messages before the tracing subscriber
/// is initialized.
#[macro_export]
macro_rules! print_info {
    ($($arg:tt)*) => {
        println!("{}  {} {}",
            console::style($crate::config::early_timestamp()).dim(),
            console::style("INFO").green(),
            format_args!($($arg)*)
        );
    };
}

#[macro_export]
macro_rules! print_warn {
    ($($arg:tt)*) => {
        println!("{}  {} {}",
            console::style($crate::config::early_timestamp()).dim(),
            console::style("WARN").yellow(),
            format_args!($($arg)*)
        );
    };
}

#[macro_export]
macro_rules! print_error {
    ($($arg:tt)*) => {
        eprintln!("{}  {} {}",
            console::style($crate::config::early_timestamp()).dim(),
            console::style("ERROR").red(),
            format_args!($($arg)*)
        );
    };
}

/// Errors raised while loading or validating settings.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The settings file named explicitly does not exist.
    #[error("Configuration file not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("IO error while reading configuration: {0}")]
    IoError(#[from] std::io::Error),

    /// The file is not valid TOML or has the wrong shape.
    #[error("Parse error while reading configuration: {0}")]
    ParseError(String),

    /// A value is out of range after parsing or command line overrides.
    #[error("Validation error: {0}")]
    ValidationError(String),
}

/// Top-level application settings.
#[derive(Serialize, Deserialize, Debug, Validate, Clone, Default)]
#[serde(default)]
pub struct Config {
    #[validate(nested)]
    pub logger: LoggerConfig,

    /// Sensor source and cycle pacing.
    #[validate(nested)]
    pub simulation: SimulationConfig,

    /// MQTT broker connection.
    #[validate(nested)]
    pub transport: TransportConfig,
}

impl Config {
    /// Locates and loads the settings, falling back to defaults.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if a located file cannot be read, parsed, or
    /// validated. A missing explicit path is an error too; a missing default
    /// path is not.
    pub fn discover(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        let from_env = std::env::var(CONFIG_ENV).ok().filter(|v| !v.is_empty());
        match Self::settings_path(explicit, from_env, Path::new(DEFAULT_CONFIG_PATH)) {
            Some(path) => Self::load(&path),
            None => {
                print_info!("No settings file found, using built-in defaults");
                Ok(Config::default())
            }
        }
    }

    /// Resolves which settings file to read, if any.
    fn settings_path(
        explicit: Option<&Path>,
        from_env: Option<String>,
        fallback: &Path,
    ) -> Option<PathBuf> {
        if let Some(path) = explicit {
            print_info!("Using settings from --settings: {}", path.display());
            return Some(path.to_path_buf());
        }

        if let Some(path) = from_env {
            let path = PathBuf::from(path);
            print_info!("Using settings from {}: {}", CONFIG_ENV, path.display());
            return Some(path);
        }

        if fallback.exists() {
            print_info!("Using default settings path: {}", fallback.display());
            return Some(fallback.to_path_buf());
        }

        None
    }

    /// Loads and validates settings from the specified path.
    ///
    /// # Errors
    ///
    /// Propagates IO, parsing, and validation errors as `ConfigError`.
    pub fn load(path: &Path) -> Result<Config, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.to_path_buf()));
        }

        let contents = fs::read_to_string(path)?;
        let config: Config =
            toml::from_str(&contents).map_err(|e| ConfigError::ParseError(e.to_string()))?;
        config.check()?;

        print_info!("Successfully loaded settings from: {}", path.display());
        Ok(config)
    }

    /// Runs the `validator` rules of every section.
    pub fn check(&self) -> Result<(), ConfigError> {
        self.validate()
            .map_err(|e| ConfigError::ValidationError(e.to_string()))
    }
}
