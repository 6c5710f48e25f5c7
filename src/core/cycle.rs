//! One publish cycle: a reading per sensor, delivered in registry order.

use std::sync::Arc;

use rand::Rng;
use time::OffsetDateTime;
use tracing::{error, info, instrument, warn};

use super::{
    reading::{draw_value, Reading},
    registry::SensorRegistry,
    transport::{DeliveryOutcome, Transport},
    SimulationParameters,
};

/// Delivery result for one sensor in a cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct SensorOutcome {
    pub sensor: String,
    pub channel: String,
    pub outcome: DeliveryOutcome,
}

/// Per-sensor outcomes of one cycle, in registry order.
#[derive(Debug, Clone, PartialEq)]
pub struct CycleReport {
    /// 1-based cycle number.
    pub cycle: u64,
    pub outcomes: Vec<SensorOutcome>,
}

impl CycleReport {
    pub fn delivered(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| o.outcome.is_delivered())
            .count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes.len() - self.delivered()
    }
}

struct Prepared {
    sensor: String,
    channel: String,
    value: f64,
}

/// Generates and delivers one reading for every sensor.
///
/// Values are drawn sequentially so a seeded source yields the same values
/// whether publishes run one after another or concurrently. Each reading is
/// timestamped and serialized right before its publish. A failed delivery is
/// logged and the cycle moves on to the next sensor.
#[instrument(skip_all, fields(cycle = cycle))]
pub async fn run_cycle<R: Rng + Send + ?Sized>(
    cycle: u64,
    registry: &SensorRegistry,
    params: &SimulationParameters,
    transport: &Arc<dyn Transport>,
    rng: &mut R,
) -> CycleReport {
    let prepared: Vec<Prepared> = registry
        .iter()
        .map(|def| Prepared {
            sensor: def.id.clone(),
            channel: def.channel.clone(),
            value: draw_value(def, params.jitter, &mut *rng),
        })
        .collect();

    let outcomes = if params.concurrent_publish {
        publish_concurrently(prepared, params.qos, transport).await
    } else {
        let mut outcomes = Vec::with_capacity(prepared.len());
        for item in prepared {
            outcomes.push(deliver(transport.as_ref(), item, params.qos).await);
        }
        outcomes
    };

    let report = CycleReport { cycle, outcomes };
    info!(
        "Cycle {} complete: {} delivered, {} failed",
        cycle,
        report.delivered(),
        report.failed()
    );
    report
}

async fn publish_concurrently(
    prepared: Vec<Prepared>,
    qos: u8,
    transport: &Arc<dyn Transport>,
) -> Vec<SensorOutcome> {
    let tasks: Vec<_> = prepared
        .into_iter()
        .map(|item| {
            let sensor = item.sensor.clone();
            let channel = item.channel.clone();
            let transport = transport.clone();
            let task = tokio::spawn(async move { deliver(transport.as_ref(), item, qos).await });
            (sensor, channel, task)
        })
        .collect();

    // Joined in spawn order, which is registry order.
    let mut outcomes = Vec::with_capacity(tasks.len());
    for (sensor, channel, task) in tasks {
        match task.await {
            Ok(outcome) => outcomes.push(outcome),
            Err(e) => {
                error!("Publish task for '{}' failed: {}", sensor, e);
                outcomes.push(SensorOutcome {
                    sensor,
                    channel,
                    outcome: DeliveryOutcome::Failed(e.to_string()),
                });
            }
        }
    }
    outcomes
}

/// Stamps, serializes and publishes one reading, logging the outcome.
async fn deliver(transport: &dyn Transport, item: Prepared, qos: u8) -> SensorOutcome {
    let reading = Reading::new(item.channel.as_str(), item.value, OffsetDateTime::now_utc());
    let outcome = match reading.to_payload() {
        Ok(payload) => {
            let text = String::from_utf8_lossy(&payload).into_owned();
            let outcome = transport.publish(&item.channel, payload, qos).await;
            if outcome.is_delivered() {
                info!("Published to {}: {}", item.channel, text);
            }
            outcome
        }
        Err(e) => DeliveryOutcome::Failed(format!("could not serialize reading: {e}")),
    };

    if let DeliveryOutcome::Failed(reason) = &outcome {
        warn!(
            "Failed to publish reading of '{}' to {}: {}",
            item.sensor, item.channel, reason
        );
    }
    SensorOutcome {
        sensor: item.sensor,
        channel: item.channel,
        outcome,
    }
}
