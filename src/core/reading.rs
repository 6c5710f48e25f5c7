//! Synthetic readings.
//!
//! A reading is drawn uniformly from the sensor's tolerance band around its
//! target, plus an independent uniform noise term bounded by the jitter:
//!
//! ```text
//! value = round2( U[target - tol, target + tol] + U[-jitter, +jitter] )
//! ```
//!
//! On the wire a reading is the JSON object
//! `{"sensor_id": <channel>, "temperature": <value>, "timestamp": <RFC 3339>}`.

use rand::Rng;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use super::registry::SensorDefinition;

/// One generated temperature sample.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    /// Channel of the sensor that produced the reading.
    #[serde(rename = "sensor_id")]
    pub channel: String,

    /// Temperature rounded to two decimals.
    #[serde(rename = "temperature")]
    pub value: f64,

    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
}

impl Reading {
    pub fn new(channel: impl Into<String>, value: f64, timestamp: OffsetDateTime) -> Self {
        Self {
            channel: channel.into(),
            value,
            timestamp,
        }
    }

    /// JSON bytes published to the broker.
    pub fn to_payload(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec(self)
    }

    /// Parses a payload produced by [`to_payload`](Self::to_payload).
    pub fn from_slice(payload: &[u8]) -> serde_json::Result<Self> {
        serde_json::from_slice(payload)
    }
}

/// Draws one reading for `def` at instant `now`.
///
/// The two draws are independent. Tolerance and jitter are taken by magnitude.
pub fn generate<R: Rng + ?Sized>(
    def: &SensorDefinition,
    jitter: f64,
    now: OffsetDateTime,
    rng: &mut R,
) -> Reading {
    Reading::new(def.channel.clone(), draw_value(def, jitter, rng), now)
}

/// The value part of [`generate`], for callers that stamp the reading later.
///
/// # Panics
///
/// If twice the tolerance or jitter is not finite. Registry and settings
/// validation reject such values.
pub fn draw_value<R: Rng + ?Sized>(def: &SensorDefinition, jitter: f64, rng: &mut R) -> f64 {
    let tolerance = def.tolerance.abs();
    let jitter = jitter.abs();

    let base = rng.gen_range(def.target_value - tolerance..=def.target_value + tolerance);
    let noise = rng.gen_range(-jitter..=jitter);
    round_to_hundredths(base + noise)
}

pub fn round_to_hundredths(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use rand::{rngs::mock::StepRng, rngs::StdRng, SeedableRng};
    use time::macros::datetime;

    use super::*;

    const TRIALS: usize = 10_000;

    fn sensor(target: f64, tolerance: f64) -> SensorDefinition {
        SensorDefinition::new("living", "home/living/temperature", target).with_tolerance(tolerance)
    }

    #[test]
    fn test_values_stay_within_band() {
        let def = sensor(21.5, 1.0);
        let mut rng = StdRng::seed_from_u64(7);
        let now = OffsetDateTime::now_utc();

        for _ in 0..TRIALS {
            let reading = generate(&def, 0.5, now, &mut rng);
            assert!(
                (20.0..=23.0).contains(&reading.value),
                "{} outside band",
                reading.value
            );
            assert_eq!(reading.value, round_to_hundredths(reading.value));
        }
    }

    #[test]
    fn test_values_cover_the_band() {
        let def = sensor(20.0, 2.0);
        let mut rng = StdRng::seed_from_u64(11);
        let now = OffsetDateTime::now_utc();

        let values: Vec<f64> = (0..TRIALS)
            .map(|_| generate(&def, 0.0, now, &mut rng).value)
            .collect();
        let min = values.iter().copied().fold(f64::INFINITY, f64::min);
        let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        assert!(min < 18.2 && max > 21.8, "min {min}, max {max}");
    }

    #[test]
    fn test_zero_spread_is_exact() {
        let def = sensor(22.37, 0.0);
        let mut rng = StdRng::seed_from_u64(3);
        let now = OffsetDateTime::now_utc();

        for _ in 0..TRIALS {
            assert_eq!(generate(&def, 0.0, now, &mut rng).value, 22.37);
        }
    }

    #[test]
    fn test_draws_use_injected_source() {
        // A source that always yields zero picks the lower end of both ranges.
        let mut rng = StepRng::new(0, 0);
        let reading = generate(&sensor(20.0, 1.0), 0.5, OffsetDateTime::now_utc(), &mut rng);
        assert_eq!(reading.value, 18.5);
    }

    #[test]
    fn test_same_seed_same_values() {
        let def = sensor(19.0, 1.5);
        let now = OffsetDateTime::now_utc();
        let mut first = StdRng::seed_from_u64(42);
        let mut second = StdRng::seed_from_u64(42);

        for _ in 0..100 {
            assert_eq!(
                generate(&def, 0.3, now, &mut first),
                generate(&def, 0.3, now, &mut second)
            );
        }
    }

    #[test]
    fn test_reading_carries_channel_and_instant() {
        let now = datetime!(2024-05-01 12:00:00.123456 UTC);
        let reading = generate(&sensor(21.0, 0.0), 0.0, now, &mut StepRng::new(0, 0));
        assert_eq!(reading.channel, "home/living/temperature");
        assert_eq!(reading.timestamp, now);
    }

    #[test]
    fn test_value_matches_generate() {
        let def = sensor(19.0, 1.5);
        let mut first = StdRng::seed_from_u64(5);
        let mut second = StdRng::seed_from_u64(5);

        let reading = generate(&def, 0.3, OffsetDateTime::now_utc(), &mut first);
        assert_eq!(reading.value, draw_value(&def, 0.3, &mut second));
    }

    #[test]
    fn test_wire_format() {
        let reading = Reading {
            channel: "home/living/temperature".into(),
            value: 21.37,
            timestamp: datetime!(2024-05-01 12:00:00.123456 UTC),
        };

        let payload = reading.to_payload().unwrap();
        let json: serde_json::Value = serde_json::from_slice(&payload).unwrap();
        assert_eq!(json["sensor_id"], "home/living/temperature");
        assert_eq!(json["temperature"], 21.37);
        assert_eq!(json["timestamp"], "2024-05-01T12:00:00.123456Z");

        assert_eq!(Reading::from_slice(&payload).unwrap(), reading);
    }

    #[test]
    fn test_rounding() {
        assert_eq!(round_to_hundredths(21.374), 21.37);
        assert_eq!(round_to_hundredths(21.376), 21.38);
        assert_eq!(round_to_hundredths(-0.004), 0.0);
    }
}
