//! Command-line argument parsing.

use std::path::PathBuf;

use clap::Parser;

use crate::{Config, PlanetKind};

/// Planet LOD driver command-line arguments.
///
/// CLI values override settings loaded from `config.ron`.
#[derive(Parser, Debug, Default)]
#[command(name = "nebula", about = "Headless planet LOD driver")]
pub struct CliArgs {
    /// Worker threads (0 = auto).
    #[arg(long)]
    pub workers: Option<usize>,

    /// Deepest LOD level.
    #[arg(long)]
    pub max_level: Option<u32>,

    /// Grid cells per chunk edge.
    #[arg(long)]
    pub segments: Option<u32>,

    /// Per-tick budget in milliseconds.
    #[arg(long)]
    pub budget_ms: Option<f64>,

    /// Ticks to simulate.
    #[arg(long)]
    pub ticks: Option<u64>,

    /// Generate a flat grid instead of a sphere.
    #[arg(long)]
    pub flat: bool,

    /// Log level (error, warn, info, debug, trace).
    #[arg(long)]
    pub log_level: Option<String>,

    /// Path to config directory (overrides default location).
    #[arg(long)]
    pub config: Option<PathBuf>,
}

impl Config {
    /// Apply CLI overrides to a loaded config.
    pub fn apply_cli_overrides(&mut self, args: &CliArgs) {
        if let Some(workers) = args.workers {
            self.workers.count = workers;
        }
        if let Some(level) = args.max_level {
            self.lod.max_level = level;
        }
        if let Some(segments) = args.segments {
            self.lod.segments = segments;
            self.lod.placeholder_segments = self.lod.placeholder_segments.min(segments);
        }
        if let Some(ms) = args.budget_ms {
            self.budget.frame_budget_ms = ms;
        }
        if let Some(ticks) = args.ticks {
            self.sim.ticks = ticks;
        }
        if args.flat {
            self.planet.kind = PlanetKind::Flat;
        }
        if let Some(ref level) = args.log_level {
            self.debug.log_level = level.clone();
        }
    }
}
