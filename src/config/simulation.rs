//! Simulation schedule settings.
//!
//! The `[simulation]` table controls where sensors are read from and how the
//! publish cycles are paced:
//!
//! ```toml
//! [simulation]
//! sites = "config/site-config.json"
//! interval = 5.0     # seconds between cycle starts
//! count = 0          # 0 = run until interrupted
//! jitter = 0.5       # extra noise bound in degrees
//! qos = 1
//! concurrent_publish = false
//! # seed = 42        # reproducible readings
//! ```

use std::{path::PathBuf, time::Duration};

use serde::{Deserialize, Serialize};
use validator::Validate;

use super::ConfigError;
use crate::core::SimulationParameters;

#[derive(Debug, Clone, Serialize, Deserialize, Validate, PartialEq)]
#[serde(default)]
pub struct SimulationConfig {
    /// Site configuration listing the rooms to simulate.
    pub sites: PathBuf,

    /// Seconds between the starts of consecutive cycles.
    #[validate(range(exclusive_min = 0.0, message = "Interval must be positive"))]
    pub interval: f64,

    /// Number of cycles to run; 0 runs until interrupted.
    pub count: u64,

    /// Bound of the extra noise added to every reading.
    #[validate(range(min = 0.0, message = "Jitter must not be negative"))]
    pub jitter: f64,

    /// MQTT QoS level of every publish.
    #[validate(range(max = 2, message = "QoS must be 0, 1 or 2"))]
    pub qos: u8,

    /// Publish the readings of a cycle concurrently.
    pub concurrent_publish: bool,

    /// Seed for the random source. Unset draws from OS entropy.
    pub seed: Option<u64>,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        SimulationConfig {
            sites: PathBuf::from("config/site-config.json"),
            interval: 5.0,
            count: 0,
            jitter: 0.5,
            qos: 1,
            concurrent_publish: false,
            seed: None,
        }
    }
}

impl SimulationConfig {
    /// Converts the settings into the immutable parameters of a run.
    ///
    /// # Errors
    ///
    /// `ConfigError::ValidationError` if a value is out of range or not finite.
    pub fn parameters(&self) -> Result<SimulationParameters, ConfigError> {
        self.validate()
            .map_err(|e| ConfigError::ValidationError(e.to_string()))?;

        let interval = Duration::try_from_secs_f64(self.interval)
            .ok()
            .filter(|d| !d.is_zero())
            .ok_or_else(|| {
                ConfigError::ValidationError(format!("interval: invalid value {}", self.interval))
            })?;

        if !(2.0 * self.jitter).is_finite() {
            return Err(ConfigError::ValidationError(format!(
                "jitter: invalid value {}",
                self.jitter
            )));
        }

        Ok(SimulationParameters {
            interval,
            cycle_count: self.count,
            jitter: self.jitter,
            qos: self.qos,
            concurrent_publish: self.concurrent_publish,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_cli_defaults() {
        let params = SimulationConfig::default().parameters().unwrap();
        assert_eq!(params.interval, Duration::from_secs(5));
        assert_eq!(params.cycle_count, 0);
        assert_eq!(params.jitter, 0.5);
        assert_eq!(params.qos, 1);
        assert!(!params.concurrent_publish);
    }

    #[test]
    fn test_fractional_interval() {
        let config = SimulationConfig {
            interval: 0.25,
            ..Default::default()
        };
        assert_eq!(
            config.parameters().unwrap().interval,
            Duration::from_millis(250)
        );
    }

    #[test]
    fn test_non_positive_interval_is_rejected() {
        for interval in [0.0, -1.0, f64::NAN, f64::INFINITY] {
            let config = SimulationConfig {
                interval,
                ..Default::default()
            };
            assert!(
                config.parameters().is_err(),
                "interval {interval} should be rejected"
            );
        }
    }

    #[test]
    fn test_negative_jitter_is_rejected() {
        let config = SimulationConfig {
            jitter: -0.1,
            ..Default::default()
        };
        assert!(matches!(
            config.parameters(),
            Err(ConfigError::ValidationError(_))
        ));
    }

    #[test]
    fn test_unbounded_jitter_is_rejected() {
        for jitter in [1e308, f64::INFINITY, f64::NAN] {
            let config = SimulationConfig {
                jitter,
                ..Default::default()
            };
            assert!(
                matches!(config.parameters(), Err(ConfigError::ValidationError(_))),
                "jitter {jitter} should be rejected"
            );
        }
    }

    #[test]
    fn test_qos_above_two_is_rejected() {
        let config = SimulationConfig {
            qos: 3,
            ..Default::default()
        };
        assert!(config.parameters().is_err());
    }
}
