//! Scheduling of publish cycles.
//!
//! The `Driver` owns a run from connection to disconnection:
//!
//! ```text
//! Idle ──connect ok──> Connected ──> Running ──done/stop──> Stopping ──> Disconnected
//!   └──connect failed──> Failed
//! ```
//!
//! Cycles never overlap. The wait between two cycle starts is abandoned as
//! soon as a stop is requested; a cycle already in progress is completed.

use std::{fmt, sync::Arc};

use rand::{rngs::StdRng, SeedableRng};
use thiserror::Error;
use tokio::{
    sync::watch,
    time::{sleep, Instant},
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use super::{
    cycle::run_cycle,
    registry::SensorRegistry,
    transport::{Transport, TransportError},
    SimulationParameters,
};

/// Lifecycle phase of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverState {
    Idle,
    Connected,
    Running,
    Stopping,
    Disconnected,
    /// The broker session could not be established; terminal.
    Failed,
}

impl DriverState {
    pub fn as_str(&self) -> &'static str {
        match self {
            DriverState::Idle => "Idle",
            DriverState::Connected => "Connected",
            DriverState::Running => "Running",
            DriverState::Stopping => "Stopping",
            DriverState::Disconnected => "Disconnected",
            DriverState::Failed => "Failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, DriverState::Disconnected | DriverState::Failed)
    }
}

impl fmt::Display for DriverState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Totals of a finished run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub cycles: u64,
    pub delivered: u64,
    pub failed: u64,
    /// The run ended because a stop was requested.
    pub interrupted: bool,
    /// QoS 1/2 publishes acknowledged by the broker before disconnect.
    pub acknowledged: u64,
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} cycle(s), {} delivered, {} failed, {} acknowledged",
            self.cycles, self.delivered, self.failed, self.acknowledged
        )?;
        if self.interrupted {
            write!(f, " (interrupted)")?;
        }
        Ok(())
    }
}

#[derive(Debug, Error)]
pub enum DriverError {
    #[error(transparent)]
    Connect(#[from] TransportError),
}

/// Runs publish cycles at a fixed interval until the configured count is
/// reached or the cancellation token fires.
pub struct Driver {
    registry: Arc<SensorRegistry>,
    params: SimulationParameters,
    transport: Arc<dyn Transport>,
    cancel: CancellationToken,
    rng: StdRng,
    state_tx: watch::Sender<DriverState>,
}

impl Driver {
    pub fn new(
        registry: Arc<SensorRegistry>,
        params: SimulationParameters,
        transport: Arc<dyn Transport>,
        cancel: CancellationToken,
    ) -> Self {
        let (state_tx, _) = watch::channel(DriverState::Idle);
        Self {
            registry,
            params,
            transport,
            cancel,
            rng: StdRng::from_entropy(),
            state_tx,
        }
    }

    /// Replaces the entropy-seeded random source, e.g. for reproducible runs.
    pub fn with_rng(mut self, rng: StdRng) -> Self {
        self.rng = rng;
        self
    }

    /// Receiver that observes every state transition.
    pub fn subscribe(&self) -> watch::Receiver<DriverState> {
        self.state_tx.subscribe()
    }

    fn set_state(&self, state: DriverState) {
        let old_state = self.state_tx.send_replace(state);
        debug!("Driver state changed: {} -> {}", old_state, state);
    }

    /// Connects, runs the cycles and disconnects.
    ///
    /// The transport is disconnected exactly once on every path out of this
    /// function.
    ///
    /// # Errors
    ///
    /// `DriverError::Connect` if the broker session cannot be established.
    /// No cycle runs in that case.
    pub async fn run(mut self) -> Result<RunSummary, DriverError> {
        let connected = tokio::select! {
            biased;

            _ = self.cancel.cancelled() => None,
            result = self.transport.connect() => Some(result),
        };

        match connected {
            None => {
                info!("Stop requested before the broker session was established");
                let summary = RunSummary {
                    interrupted: true,
                    ..Default::default()
                };
                return Ok(self.shut_down(summary).await);
            }
            Some(Err(e)) => {
                error!("Could not connect to broker: {}", e);
                self.transport.disconnect().await;
                self.set_state(DriverState::Failed);
                return Err(e.into());
            }
            Some(Ok(())) => self.set_state(DriverState::Connected),
        }

        self.set_state(DriverState::Running);
        info!(
            "Publishing {} sensor(s) every {:.2}s ({})",
            self.registry.len(),
            self.params.interval.as_secs_f64(),
            match self.params.cycle_count {
                0 => "until stopped".to_string(),
                n => format!("{n} cycle(s)"),
            }
        );

        let mut summary = RunSummary::default();
        loop {
            if self.cancel.is_cancelled() {
                summary.interrupted = true;
                break;
            }

            let started = Instant::now();
            summary.cycles += 1;
            let report = run_cycle(
                summary.cycles,
                &self.registry,
                &self.params,
                &self.transport,
                &mut self.rng,
            )
            .await;
            summary.delivered += report.delivered() as u64;
            summary.failed += report.failed() as u64;

            if self.params.cycle_count > 0 && summary.cycles >= self.params.cycle_count {
                break;
            }

            let wait = self.params.interval.saturating_sub(started.elapsed());
            tokio::select! {
                biased;

                _ = self.cancel.cancelled() => {
                    summary.interrupted = true;
                    break;
                }
                _ = sleep(wait) => {}
            }
        }

        Ok(self.shut_down(summary).await)
    }

    async fn shut_down(&self, mut summary: RunSummary) -> RunSummary {
        self.set_state(DriverState::Stopping);
        self.transport.disconnect().await;
        summary.acknowledged = self.transport.acknowledged();
        self.set_state(DriverState::Disconnected);
        info!("Run finished: {}", summary);
        summary
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tracing_test::traced_test;

    use super::*;
    use crate::core::{registry::SensorDefinition, transport::mock::MockTransport};

    fn registry() -> Arc<SensorRegistry> {
        Arc::new(
            SensorRegistry::from_definitions(vec![
                SensorDefinition::new("a", "home/a/temperature", 20.0),
                SensorDefinition::new("b", "home/b/temperature", 21.0),
                SensorDefinition::new("c", "home/c/temperature", 22.0),
            ])
            .unwrap(),
        )
    }

    fn build_driver(
        mock: Arc<MockTransport>,
        params: SimulationParameters,
    ) -> (Driver, CancellationToken) {
        let cancel = CancellationToken::new();
        let driver = Driver::new(registry(), params, mock, cancel.clone())
            .with_rng(StdRng::seed_from_u64(5));
        (driver, cancel)
    }

    #[test]
    fn test_state_display() {
        assert_eq!(DriverState::Stopping.to_string(), "Stopping");
        assert!(DriverState::Failed.is_terminal());
        assert!(!DriverState::Running.is_terminal());
    }

    #[test]
    fn test_summary_display() {
        let summary = RunSummary {
            cycles: 2,
            delivered: 5,
            failed: 1,
            interrupted: true,
            acknowledged: 5,
        };
        assert_eq!(
            summary.to_string(),
            "2 cycle(s), 5 delivered, 1 failed, 5 acknowledged (interrupted)"
        );
    }

    #[tokio::test(start_paused = true)]
    #[traced_test]
    async fn test_bounded_run_stops_after_count() {
        let mock = Arc::new(MockTransport::default());
        let params = SimulationParameters {
            cycle_count: 3,
            interval: Duration::from_secs(5),
            ..Default::default()
        };
        let (driver, _cancel) = build_driver(mock.clone(), params);
        let state_rx = driver.subscribe();
        let started = Instant::now();

        let summary = driver.run().await.unwrap();

        assert_eq!(summary.cycles, 3);
        assert_eq!(summary.delivered, 9);
        assert_eq!(summary.failed, 0);
        assert_eq!(summary.acknowledged, 9);
        assert!(!summary.interrupted);
        assert_eq!(mock.published_channels().len(), 9);
        assert_eq!(mock.connect_count(), 1);
        assert_eq!(mock.disconnect_count(), 1);
        assert_eq!(*state_rx.borrow(), DriverState::Disconnected);
        // Two waits between three cycles, none after the last.
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_secs(10) && elapsed < Duration::from_secs(11));
        assert!(logs_contain("Run finished: 3 cycle(s)"));
    }

    #[tokio::test]
    async fn test_connect_failure_runs_no_cycle() {
        let mock = Arc::new(MockTransport::refusing());
        let (driver, _cancel) = build_driver(mock.clone(), SimulationParameters::default());
        let state_rx = driver.subscribe();

        let result = driver.run().await;

        assert!(matches!(
            result,
            Err(DriverError::Connect(TransportError::Connect(_)))
        ));
        assert!(mock.published_channels().is_empty());
        assert_eq!(mock.disconnect_count(), 1);
        assert_eq!(*state_rx.borrow(), DriverState::Failed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_during_wait_disconnects_promptly() {
        let mock = Arc::new(MockTransport::default());
        let params = SimulationParameters {
            interval: Duration::from_secs(3600),
            ..Default::default()
        };
        let (driver, cancel) = build_driver(mock.clone(), params);
        let started = Instant::now();
        let handle = tokio::spawn(driver.run());

        sleep(Duration::from_secs(1)).await;
        cancel.cancel();
        let summary = handle.await.unwrap().unwrap();

        assert!(summary.interrupted);
        assert_eq!(summary.cycles, 1);
        assert_eq!(mock.disconnect_count(), 1);
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_during_cycle_finishes_it() {
        let mock = Arc::new(MockTransport {
            publish_delay: Some(Duration::from_secs(2)),
            ..Default::default()
        });
        let params = SimulationParameters {
            interval: Duration::from_secs(60),
            ..Default::default()
        };
        let (driver, cancel) = build_driver(mock.clone(), params);
        let mut state_rx = driver.subscribe();
        let handle = tokio::spawn(driver.run());

        sleep(Duration::from_secs(1)).await;
        assert_eq!(*state_rx.borrow_and_update(), DriverState::Running);
        cancel.cancel();
        let summary = handle.await.unwrap().unwrap();

        assert!(summary.interrupted);
        assert_eq!(summary.cycles, 1);
        assert_eq!(summary.delivered, 3);
        assert_eq!(mock.published_channels().len(), 3);
        assert_eq!(mock.disconnect_count(), 1);
    }

    #[tokio::test]
    async fn test_stop_before_connect() {
        let mock = Arc::new(MockTransport::default());
        let (driver, cancel) = build_driver(mock.clone(), SimulationParameters::default());
        cancel.cancel();

        let summary = driver.run().await.unwrap();

        assert!(summary.interrupted);
        assert_eq!(summary.cycles, 0);
        assert_eq!(mock.connect_count(), 0);
        assert_eq!(mock.disconnect_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_state_transitions() {
        let mock = Arc::new(MockTransport::default());
        let params = SimulationParameters {
            cycle_count: 1,
            ..Default::default()
        };
        let (driver, _cancel) = build_driver(mock, params);
        let mut state_rx = driver.subscribe();
        assert_eq!(*state_rx.borrow(), DriverState::Idle);

        let handle = tokio::spawn(driver.run());
        let mut seen = Vec::new();
        while state_rx.changed().await.is_ok() {
            let state = *state_rx.borrow_and_update();
            seen.push(state);
            if state.is_terminal() {
                break;
            }
        }
        handle.await.unwrap().unwrap();

        // The receiver may coalesce fast transitions but always ends terminal.
        assert_eq!(seen.last(), Some(&DriverState::Disconnected));
    }
}
