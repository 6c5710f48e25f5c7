//! Sensor registry.
//!
//! Loads the site configuration and turns every room into a validated
//! [`SensorDefinition`]. Both spellings of the site format are accepted:
//!
//! ```json
//! { "rooms": [
//!     { "id": "living", "sensorTopic": "home/living/temperature",
//!       "desiredTemperature": 21.5, "temperatureTolerance": 0.8 },
//!     { "name": "office", "sensor": "home/office/temperature",
//!       "expectedTemp": "22 °C" }
//! ] }
//! ```
//!
//! Keys the simulator has no use for (switch URLs, energy budgets, ...) are
//! ignored.

use std::{
    fs,
    path::{Path, PathBuf},
};

use serde::Deserialize;
use thiserror::Error;
use tracing::debug;
use validator::{Validate, ValidationError, ValidationErrors};

/// Tolerance used when a room does not declare one.
pub const DEFAULT_TOLERANCE: f64 = 1.0;

/// Errors raised while loading the site configuration.
///
/// All of them are fatal and reported before any broker connection.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("Site configuration not found: {}", .0.display())]
    ConfigNotFound(PathBuf),

    /// The document has no rooms.
    #[error("Site configuration contains no rooms")]
    ConfigEmpty,

    /// A room lacks a required field or carries an unusable value.
    #[error("Invalid room '{entry}': {reason}")]
    ConfigInvalid { entry: String, reason: String },

    /// The document is not JSON or does not have the expected shape.
    #[error("Malformed site configuration: {0}")]
    Malformed(String),

    #[error("IO error while reading site configuration: {0}")]
    Io(#[from] std::io::Error),
}

/// One simulated temperature sensor.
#[derive(Debug, Clone, PartialEq, Validate)]
#[validate(schema(function = "validate_target"))]
pub struct SensorDefinition {
    /// Identifier used in logs and error messages.
    pub id: String,

    /// Display name, when the site gives one.
    pub name: Option<String>,

    /// Topic the readings are published to.
    #[validate(length(min = 1, message = "channel must not be empty"))]
    pub channel: String,

    /// Baseline temperature.
    pub target_value: f64,

    /// Half-width of the natural variation band.
    #[validate(range(min = 0.0, message = "tolerance must be a non-negative number"))]
    pub tolerance: f64,
}

fn validate_target(def: &SensorDefinition) -> Result<(), ValidationError> {
    let low = def.target_value - def.tolerance;
    let high = def.target_value + def.tolerance;
    if def.target_value.is_finite() && (high - low).is_finite() {
        return Ok(());
    }
    let mut err = ValidationError::new("not_finite");
    err.message = Some("target value and tolerance band must be finite numbers".into());
    Err(err)
}

impl SensorDefinition {
    pub fn new(id: impl Into<String>, channel: impl Into<String>, target_value: f64) -> Self {
        Self {
            id: id.into(),
            name: None,
            channel: channel.into(),
            target_value,
            tolerance: DEFAULT_TOLERANCE,
        }
    }

    pub fn with_tolerance(mut self, tolerance: f64) -> Self {
        self.tolerance = tolerance;
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
}

#[derive(Debug, Deserialize)]
struct SiteDocument {
    #[serde(default)]
    rooms: Option<Vec<RoomEntry>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RoomEntry {
    id: Option<String>,
    name: Option<String>,
    #[serde(alias = "sensorTopic", alias = "sensor")]
    channel: Option<String>,
    #[serde(alias = "desiredTemperature", alias = "expectedTemp")]
    target_value: Option<NumericField>,
    #[serde(alias = "temperatureTolerance")]
    tolerance: Option<NumericField>,
}

/// A number given either as JSON number or as text with a unit.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum NumericField {
    Number(f64),
    Text(String),
}

impl NumericField {
    fn value(&self) -> Option<f64> {
        match self {
            NumericField::Number(n) => Some(*n),
            NumericField::Text(text) => {
                let digits: String = text
                    .trim()
                    .chars()
                    .filter(|c| c.is_ascii_digit() || matches!(c, '.' | '-'))
                    .collect();
                digits.parse().ok()
            }
        }
    }
}

impl RoomEntry {
    fn into_definition(self, position: usize) -> Result<SensorDefinition, RegistryError> {
        let entry = self
            .id
            .clone()
            .or_else(|| self.name.clone())
            .unwrap_or_else(|| format!("#{position}"));

        let mut missing = Vec::new();
        if self.channel.is_none() {
            missing.push("channel");
        }
        if self.target_value.is_none() {
            missing.push("target value");
        }
        if !missing.is_empty() {
            return Err(RegistryError::ConfigInvalid {
                entry,
                reason: format!("missing {}", missing.join(" and ")),
            });
        }

        let target_value = self
            .target_value
            .as_ref()
            .and_then(NumericField::value)
            .ok_or_else(|| RegistryError::ConfigInvalid {
                entry: entry.clone(),
                reason: "target value is not a number".into(),
            })?;

        let tolerance = match &self.tolerance {
            None => DEFAULT_TOLERANCE,
            Some(field) => field.value().ok_or_else(|| RegistryError::ConfigInvalid {
                entry: entry.clone(),
                reason: "tolerance is not a number".into(),
            })?,
        };

        Ok(SensorDefinition {
            id: entry,
            name: self.name,
            channel: self.channel.unwrap_or_default(),
            target_value,
            tolerance,
        })
    }
}

/// Validated, ordered list of sensors.
///
/// Loaded once at startup and shared read-only across cycles.
#[derive(Debug, Clone, PartialEq)]
pub struct SensorRegistry {
    sensors: Vec<SensorDefinition>,
}

impl SensorRegistry {
    /// Reads and validates the site configuration at `path`.
    ///
    /// # Errors
    ///
    /// `ConfigNotFound` if the file does not exist, otherwise the errors of
    /// [`from_json`](Self::from_json).
    pub fn load(path: &Path) -> Result<Self, RegistryError> {
        if !path.exists() {
            return Err(RegistryError::ConfigNotFound(path.to_path_buf()));
        }
        let contents = fs::read_to_string(path)?;
        let registry = Self::from_json(&contents)?;
        debug!(
            "Loaded {} sensor(s) from {}",
            registry.len(),
            path.display()
        );
        Ok(registry)
    }

    /// Parses and validates a site configuration document.
    pub fn from_json(contents: &str) -> Result<Self, RegistryError> {
        let document: SiteDocument =
            serde_json::from_str(contents).map_err(|e| RegistryError::Malformed(e.to_string()))?;

        let rooms = document.rooms.unwrap_or_default();
        let sensors = rooms
            .into_iter()
            .enumerate()
            .map(|(index, room)| room.into_definition(index + 1))
            .collect::<Result<Vec<_>, _>>()?;

        Self::from_definitions(sensors)
    }

    /// Builds a registry from definitions created in code.
    pub fn from_definitions(sensors: Vec<SensorDefinition>) -> Result<Self, RegistryError> {
        if sensors.is_empty() {
            return Err(RegistryError::ConfigEmpty);
        }
        for sensor in &sensors {
            sensor
                .validate()
                .map_err(|errors| RegistryError::ConfigInvalid {
                    entry: sensor.id.clone(),
                    reason: describe(&errors),
                })?;
        }
        Ok(Self { sensors })
    }

    pub fn iter(&self) -> std::slice::Iter<'_, SensorDefinition> {
        self.sensors.iter()
    }

    pub fn len(&self) -> usize {
        self.sensors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sensors.is_empty()
    }
}

impl<'a> IntoIterator for &'a SensorRegistry {
    type Item = &'a SensorDefinition;
    type IntoIter = std::slice::Iter<'a, SensorDefinition>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Flattens validator messages, schema-level ones included, into one line.
fn describe(errors: &ValidationErrors) -> String {
    let mut messages: Vec<String> = errors
        .field_errors()
        .values()
        .flat_map(|errs| errs.iter())
        .map(|err| match &err.message {
            Some(message) => message.to_string(),
            None => err.code.to_string(),
        })
        .collect();
    messages.sort();
    messages.dedup();
    messages.join(", ")
}
