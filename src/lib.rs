//! Synthetic observability data engine.
//!
//! Facade over the workspace crates: configuration lives in
//! [`obsim_config`], generation engines and analyses in [`obsim_core`].

pub use obsim_config::{config, ConfigError, SimulationConfig, CONFIG_FILE_NAME};
pub use obsim_core::{alerts, api, logs, metrics, random, traces, types};
pub use obsim_core::{EngineError, MockApi, RandomSource, Result, Snapshot};
