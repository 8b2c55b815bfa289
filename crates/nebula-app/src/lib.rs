//! Headless planet LOD driver.
//!
//! Loads configuration, starts the terrain workers, and flies a scripted
//! viewer over the planet at a fixed tick rate.

pub mod driver;
pub mod pacing;
pub mod platform;
pub mod viewer;
