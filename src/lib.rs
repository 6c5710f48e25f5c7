//! thermosim: synthetic room temperature sensors for MQTT
//!
//! Stands in for real temperature sensors while a temperature control system
//! is developed. Every cycle it draws one plausible reading per configured
//! room and publishes it as JSON to the room's sensor topic.
//!
//! ## Modules
//!
//! * `config`: Settings file structures, loading and validation
//!   (`[logger]`, `[simulation]`, `[transport]`).
//!
//! * `cli`: Command line flags and how they override the settings.
//!
//! * `core`: Runtime components:
//!   - Sensor registry loaded from the site configuration
//!   - Reading generation
//!   - Transport abstraction over the MQTT session
//!   - Publish cycles and the driver that schedules them
//!
//! * `logger`: `tracing` subscriber setup with console output in several
//!   formats and optional systemd journald integration.
//!
//! The MQTT session itself lives in the `thermosim-mqtt` workspace crate.

pub mod cli;
pub mod config;
pub mod core;
pub mod logger;
