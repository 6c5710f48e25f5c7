//! Command line interface.
//!
//! Every flag is optional. A flag that is given overrides the matching value
//! from the settings file, which in turn overrides the built-in default.

use std::path::PathBuf;

use clap::Parser;

use crate::config::{Config, ConfigError};

/// Publishes synthetic room temperature readings to an MQTT broker.
#[derive(Debug, Default, Parser)]
#[command(author, version, about)]
pub struct Cli {
    /// Broker hostname [default: localhost]
    #[arg(long)]
    pub host: Option<String>,

    /// Broker port [default: 1883]
    #[arg(long)]
    pub port: Option<u16>,

    /// Site configuration listing the rooms [default: config/site-config.json]
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Seconds between cycle starts [default: 5.0]
    #[arg(long, value_name = "SECONDS")]
    pub interval: Option<f64>,

    /// Number of cycles, 0 runs until interrupted [default: 0]
    #[arg(long)]
    pub count: Option<u64>,

    /// Extra noise bound added to every reading [default: 0.5]
    #[arg(long)]
    pub jitter: Option<f64>,

    /// Settings file (TOML) [default: $THERMOSIM_CONFIG, then /etc/thermosim/config.toml]
    #[arg(long, value_name = "PATH")]
    pub settings: Option<PathBuf>,

    /// MQTT client identifier [default: generated]
    #[arg(long)]
    pub client_id: Option<String>,

    #[arg(long)]
    pub username: Option<String>,

    #[arg(long)]
    pub password: Option<String>,

    /// Keep-alive interval in seconds [default: 60]
    #[arg(long, value_name = "SECONDS")]
    pub keep_alive: Option<u64>,

    /// QoS level of every publish [default: 1]
    #[arg(long, value_parser = clap::value_parser!(u8).range(0..=2))]
    pub qos: Option<u8>,

    /// Publish the readings of a cycle concurrently
    #[arg(long)]
    pub concurrent: bool,

    /// Seed for reproducible readings
    #[arg(long)]
    pub seed: Option<u64>,

    /// Log level: trace, debug, info, warn, error [default: info]
    #[arg(long, value_name = "LEVEL")]
    pub log_level: Option<String>,
}

impl Cli {
    /// Writes the given flags over `config` and re-validates it.
    ///
    /// # Errors
    ///
    /// `ConfigError::ValidationError` if an override is out of range.
    pub fn apply(&self, config: &mut Config) -> Result<(), ConfigError> {
        let transport = &mut config.transport;
        if let Some(host) = &self.host {
            transport.host = host.clone();
        }
        if let Some(port) = self.port {
            transport.port = port;
        }
        if let Some(client_id) = &self.client_id {
            transport.client_id = client_id.clone();
        }
        if let Some(username) = &self.username {
            transport.username = Some(username.clone());
        }
        if let Some(password) = &self.password {
            transport.password = Some(password.clone());
        }
        if let Some(keep_alive) = self.keep_alive {
            transport.keep_alive = keep_alive;
        }

        let simulation = &mut config.simulation;
        if let Some(sites) = &self.config {
            simulation.sites = sites.clone();
        }
        if let Some(interval) = self.interval {
            simulation.interval = interval;
        }
        if let Some(count) = self.count {
            simulation.count = count;
        }
        if let Some(jitter) = self.jitter {
            simulation.jitter = jitter;
        }
        if let Some(qos) = self.qos {
            simulation.qos = qos;
        }
        if self.concurrent {
            simulation.concurrent_publish = true;
        }
        if self.seed.is_some() {
            simulation.seed = self.seed;
        }

        if let Some(level) = &self.log_level {
            config.logger.level = level.clone();
        }

        config.check()
    }
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("thermosim").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn test_cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_no_flags_keeps_settings() {
        let mut config = Config::default();
        config.transport.host = "from-file".into();
        config.simulation.count = 7;

        Cli::default().apply(&mut config).unwrap();
        assert_eq!(config.transport.host, "from-file");
        assert_eq!(config.simulation.count, 7);
    }

    #[test]
    fn test_flags_override_settings() {
        let cli = parse(&[
            "--host",
            "broker.local",
            "--port",
            "1884",
            "--config",
            "sites.json",
            "--interval",
            "0.5",
            "--count",
            "3",
            "--jitter",
            "0",
            "--qos",
            "2",
            "--concurrent",
            "--username",
            "sim",
            "--password",
            "pw",
            "--log-level",
            "debug",
        ]);
        let mut config = Config::default();
        cli.apply(&mut config).unwrap();

        assert_eq!(config.transport.endpoint(), "broker.local:1884");
        assert_eq!(config.transport.username.as_deref(), Some("sim"));
        assert_eq!(config.simulation.sites, PathBuf::from("sites.json"));
        assert_eq!(config.simulation.interval, 0.5);
        assert_eq!(config.simulation.count, 3);
        assert_eq!(config.simulation.jitter, 0.0);
        assert_eq!(config.simulation.qos, 2);
        assert!(config.simulation.concurrent_publish);
        assert_eq!(config.logger.level, "debug");
    }

    #[test]
    fn test_invalid_override_is_rejected() {
        let cli = parse(&["--interval=-2"]);
        let mut config = Config::default();
        assert!(matches!(
            cli.apply(&mut config),
            Err(ConfigError::ValidationError(_))
        ));

        let cli = parse(&["--log-level", "chatty"]);
        assert!(cli.apply(&mut Config::default()).is_err());
    }

    #[test]
    fn test_settings_flag_ignores_environment() {
        std::env::set_var(crate::config::CONFIG_ENV, "/tmp/from-env.toml");
        let cli = parse(&[]);
        std::env::remove_var(crate::config::CONFIG_ENV);
        assert!(cli.settings.is_none());

        let cli = parse(&["--settings", "/tmp/explicit.toml"]);
        assert_eq!(cli.settings, Some(PathBuf::from("/tmp/explicit.toml")));
    }

    #[test]
    fn test_qos_out_of_range_fails_to_parse() {
        let result = Cli::try_parse_from(["thermosim", "--qos", "3"]);
        assert!(result.is_err());
    }
}
