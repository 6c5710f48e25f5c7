use std::{process, sync::Arc};

use clap::Parser;
use rand::{rngs::StdRng, SeedableRng};
use thermosim::{
    cli::Cli,
    config::{Config, ConfigError},
    core::{
        driver::Driver,
        registry::SensorRegistry,
        transport::{MqttTransport, Transport},
    },
    logger::LoggerManager,
    print_error,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

const EXIT_CONFIG: i32 = 1;
const EXIT_CONNECTION: i32 = 2;
const EXIT_LOGGER: i32 = 3;

fn load_config(cli: &Cli) -> Result<Config, ConfigError> {
    let mut config = Config::discover(cli.settings.as_deref())?;
    cli.apply(&mut config)?;
    Ok(config)
}

fn log_sensor_table(registry: &SensorRegistry) {
    let id_width = registry
        .iter()
        .map(|s| s.id.len())
        .max()
        .unwrap_or(0)
        .max("Sensor".len());
    let channel_width = registry
        .iter()
        .map(|s| s.channel.len())
        .max()
        .unwrap_or(0)
        .max("Channel".len());

    info!(
        "{:<id_width$} | {:<channel_width$} | Target | Tolerance",
        "Sensor", "Channel"
    );
    info!("{}-+-{}-+--------+----------", "-".repeat(id_width), "-".repeat(channel_width));
    for sensor in registry {
        info!(
            "{:<id_width$} | {:<channel_width$} | {:>6.2} | {:>9.2}",
            sensor.id, sensor.channel, sensor.target_value, sensor.tolerance
        );
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let cfg = load_config(&cli).unwrap_or_else(|e| {
        print_error!("{}", e);
        process::exit(EXIT_CONFIG);
    });

    let logger_manager = LoggerManager::new(cfg.logger.clone()).unwrap_or_else(|e| {
        print_error!("Failed to setup Log Manager: {}", e);
        process::exit(EXIT_LOGGER);
    });
    logger_manager.init().unwrap_or_else(|e| {
        print_error!("Failed to init Log Manager: {}", e);
        process::exit(EXIT_LOGGER);
    });
    info!("Starting thermosim version {}...", env!("CARGO_PKG_VERSION"));
    info!("Log level: {}", cfg.logger.level);
    debug!("{:#?}", cfg.simulation);

    let params = cfg.simulation.parameters().unwrap_or_else(|e| {
        error!("{}", e);
        process::exit(EXIT_CONFIG);
    });

    let registry = SensorRegistry::load(&cfg.simulation.sites).unwrap_or_else(|e| {
        error!("{}", e);
        process::exit(EXIT_CONFIG);
    });
    log_sensor_table(&registry);

    info!(
        "Broker: {} (keep-alive {}s, QoS {})",
        cfg.transport.endpoint(),
        cfg.transport.keep_alive,
        params.qos
    );
    let transport: Arc<dyn Transport> = Arc::new(MqttTransport::new(cfg.transport.clone()));

    let cancel = CancellationToken::new();
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => {
                    info!("Received Ctrl+C, initiating graceful shutdown...");
                    cancel.cancel();
                }
                Err(e) => warn!("Unable to listen for Ctrl+C: {}", e),
            }
        }
    });

    let mut driver = Driver::new(Arc::new(registry), params, transport, cancel);
    if let Some(seed) = cfg.simulation.seed {
        debug!("Using fixed seed {}", seed);
        driver = driver.with_rng(StdRng::seed_from_u64(seed));
    }

    match driver.run().await {
        Ok(summary) if summary.interrupted => info!("Shutdown complete"),
        Ok(_) => info!("All cycles published"),
        Err(e) => {
            error!("{}", e);
            process::exit(EXIT_CONNECTION);
        }
    }
}
