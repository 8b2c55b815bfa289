//! Configuration for the planet LOD driver.
//!
//! Settings persist to disk as RON, accept CLI overrides via clap, support
//! hot-reload detection, and are validated before use.

mod cli;
mod config;
mod error;

pub use cli::CliArgs;
pub use config::{
    BudgetConfig, Config, DebugConfig, LodConfig, PlanetConfig, PlanetKind, SimConfig,
    TerrainConfig, WorkersConfig,
};
pub use error::ConfigError;
