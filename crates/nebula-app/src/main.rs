//! The binary entry point for the planet LOD driver.

use std::process::ExitCode;

use clap::Parser;
use nebula_app::driver::{AppError, Driver, RunSummary, build_planet, pool_config, terrain_noise};
use nebula_app::pacing::TickPacer;
use nebula_app::platform::PlatformDirs;
use nebula_app::viewer::ViewerPath;
use nebula_config::{CliArgs, Config};
use nebula_terrain::WorkerPool;
use tracing::info;

fn main() -> ExitCode {
    let args = CliArgs::parse();
    match run(&args) {
        Ok(summary) => {
            println!(
                "{} ticks in {:.2}s: {} splits, {} unifies, {} cancelled, {} failures, {} visible meshes",
                summary.ticks,
                summary.elapsed.as_secs_f64(),
                summary.splits,
                summary.unifies,
                summary.cancelled,
                summary.failures,
                summary.final_stats.visible_meshes,
            );
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("nebula: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run(args: &CliArgs) -> Result<RunSummary, AppError> {
    let dirs = match &args.config {
        Some(dir) => PlatformDirs::with_config_dir(dir.clone()),
        None => PlatformDirs::resolve()?,
    };
    dirs.create_dirs()?;

    let mut config = Config::load_or_create(&dirs.config_dir)?;
    config.apply_cli_overrides(args);
    config.validate()?;

    nebula_log::init_logging(Some(&dirs.log_dir), config.debug.file_logging, Some(&config));
    info!(
        config_dir = %dirs.config_dir.display(),
        kind = ?config.planet.kind,
        max_level = config.lod.max_level,
        ticks = config.sim.ticks,
        "starting planet driver"
    );

    let pool = WorkerPool::new(&pool_config(&config.workers), terrain_noise(&config.terrain))?;
    let planet = build_planet(&config, pool)?;
    let mut driver = Driver::new(planet, ViewerPath::from_config(&config));
    let summary = driver.run(config.sim.ticks, &mut TickPacer::new(config.sim.tick_rate_hz));

    let mut planet = driver.into_planet();
    planet.backend_mut().shutdown();
    info!(
        ticks = summary.ticks,
        deferred_ticks = summary.deferred_ticks,
        stale = summary.stale,
        leases_reclaimed = planet.backend().transport().reclaimed_count(),
        "planet driver stopped"
    );
    Ok(summary)
}
