//! Configuration management for the obsim engine.
//!
//! Loads the mock service catalog and per-engine settings from `obsim.toml`,
//! filling anything unspecified with defaults.

pub mod config;
pub mod types;

pub use config::{
    AlertSettings, LogSettings, ServiceSettings, SimulationConfig, SimulationSettings,
    TraceSettings, CONFIG_FILE_NAME,
};
pub use types::{ConfigError, Result};
