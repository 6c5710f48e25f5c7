//! Logging configuration.
//!
//! Read from the `[logger]` table of the settings file. The level can also be
//! overridden with `--log-level`, and `RUST_LOG` takes precedence over both at
//! subscriber initialization.
//!
//! ```toml
//! [logger]
//! level = "info"
//!
//! [logger.console]
//! format = "pretty"
//! show_target = true
//!
//! [logger.journald]
//! enabled = true
//! identifier = "thermosim"
//! ```

use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError};

/// Supported log levels, in increasing severity.
pub const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Console output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Single line per event.
    #[default]
    Compact,
    /// Multi-line, human friendly.
    Pretty,
    /// One JSON object per event.
    Json,
}

/// Top-level logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct LoggerConfig {
    /// Global log level (trace, debug, info, warn, error; case-insensitive).
    #[validate(custom(function = "validate_log_level"))]
    pub level: String,

    /// Console output. `None` disables it.
    #[validate(nested)]
    pub console: Option<ConsoleConfig>,

    /// systemd journald output. `None` disables it.
    #[validate(nested)]
    pub journald: Option<JournaldConfig>,
}

fn validate_log_level(level: &str) -> Result<(), ValidationError> {
    if LOG_LEVELS.contains(&level.to_lowercase().as_str()) {
        return Ok(());
    }
    let mut err = ValidationError::new("invalid_log_level");
    err.message = Some(format!("Invalid log level: {}", level).into());
    Err(err)
}

impl Default for LoggerConfig {
    fn default() -> Self {
        LoggerConfig {
            level: "info".to_string(),
            console: Some(ConsoleConfig::default()),
            journald: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct ConsoleConfig {
    pub enabled: bool,

    pub format: LogFormat,

    /// Include the module path of each event.
    pub show_target: bool,

    pub show_thread_ids: bool,

    /// Emit an event when a span closes.
    pub show_spans: bool,

    pub ansi_colors: bool,
}

impl Default for ConsoleConfig {
    fn default() -> Self {
        ConsoleConfig {
            enabled: true,
            format: LogFormat::default(),
            show_target: false,
            show_thread_ids: false,
            show_spans: false,
            ansi_colors: true,
        }
    }
}

/// systemd journald output (Linux only).
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct JournaldConfig {
    #[serde(default)]
    pub enabled: bool,

    /// Syslog identifier of the journal entries.
    #[validate(length(min = 1, message = "Journald identifier must not be empty"))]
    #[serde(default = "default_identifier")]
    pub identifier: String,
}

fn default_identifier() -> String {
    "thermosim".to_string()
}

impl Default for JournaldConfig {
    fn default() -> Self {
        JournaldConfig {
            enabled: false,
            identifier: default_identifier(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_logger_config_is_valid() {
        let config = LoggerConfig::default();
        assert!(config.validate().is_ok());
        assert!(config.journald.is_none());
        assert_eq!(config.console.unwrap().format, LogFormat::Compact);
    }

    #[test]
    fn test_log_level_is_case_insensitive() {
        let config = LoggerConfig {
            level: "DEBUG".into(),
            ..Default::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_unknown_log_level_is_rejected() {
        let config = LoggerConfig {
            level: "verbose".into(),
            ..Default::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("Invalid log level: verbose"));
    }

    #[test]
    fn test_empty_journald_identifier_is_rejected() {
        let config = LoggerConfig {
            journald: Some(JournaldConfig {
                enabled: true,
                identifier: String::new(),
            }),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_format_parses_lowercase() {
        let config: LoggerConfig = toml::from_str(
            r#"
            level = "warn"
            [console]
            format = "json"
            [journald]
            enabled = true
            "#,
        )
        .unwrap();
        assert_eq!(config.console.unwrap().format, LogFormat::Json);
        let journald = config.journald.unwrap();
        assert!(journald.enabled);
        assert_eq!(journald.identifier, "thermosim");
    }
}
