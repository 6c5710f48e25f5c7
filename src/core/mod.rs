//! Core runtime: sensor registry, reading generation, transport seam,
//! publish cycles and the driver that schedules them.

use std::time::Duration;

pub mod cycle;
pub mod driver;
pub mod reading;
pub mod registry;
pub mod transport;

/// Immutable parameters of one simulation run.
#[derive(Debug, Clone, PartialEq)]
pub struct SimulationParameters {
    /// Time between the starts of consecutive cycles.
    pub interval: Duration,

    /// Number of cycles to run; 0 runs until stopped.
    pub cycle_count: u64,

    /// Bound of the instrument noise added on top of the tolerance band.
    pub jitter: f64,

    /// MQTT QoS level of every publish.
    pub qos: u8,

    /// Publish the readings of a cycle concurrently.
    pub concurrent_publish: bool,
}

impl Default for SimulationParameters {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(5),
            cycle_count: 0,
            jitter: 0.5,
            qos: 1,
            concurrent_publish: false,
        }
    }
}
