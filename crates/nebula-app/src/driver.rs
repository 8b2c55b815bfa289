//! Wires configuration, the worker pool and the planet into a headless run.

use std::sync::Arc;
use std::time::{Duration, Instant};

use nebula_config::{Config, ConfigError, PlanetKind, TerrainConfig, WorkersConfig};
use nebula_lod::{BudgetSettings, LodError, LodSettings, LodThresholds, Planet, PlanetStats, TickReport};
use nebula_mesh::RenderEvent;
use nebula_terrain::{
    GenerationBackend, GenerationError, NoiseSettings, PlanetNoise, TerrainNoise, WorkerPoolConfig,
};
use tracing::{debug, info};

use crate::pacing::TickPacer;
use crate::platform::PlatformError;
use crate::viewer::ViewerPath;

/// Anything that stops the driver from starting.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error(transparent)]
    Platform(#[from] PlatformError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Lod(#[from] LodError),
    #[error(transparent)]
    Generation(#[from] GenerationError),
}

pub fn terrain_noise(config: &TerrainConfig) -> Arc<dyn TerrainNoise> {
    Arc::new(PlanetNoise::new(&NoiseSettings {
        seed: config.seed,
        octaves: config.octaves,
        base_frequency: config.base_frequency,
        height_amplitude: config.height_amplitude,
        color_seed: config.color_seed,
        color_frequency: config.color_frequency,
    }))
}

pub fn pool_config(config: &WorkersConfig) -> WorkerPoolConfig {
    WorkerPoolConfig {
        threads: config.count,
        task_capacity: config.task_queue_capacity,
        result_capacity: config.result_queue_capacity,
        partitions_per_chunk: config.partitions_per_chunk,
        transport_budget_floats: config.transport_budget_floats,
    }
}

pub fn lod_settings(config: &Config) -> Result<LodSettings, LodError> {
    let lod = &config.lod;
    let budget = &config.budget;
    Ok(LodSettings {
        max_level: lod.max_level,
        thresholds: LodThresholds::uniform(lod.split_factor, lod.unify_factor)?,
        segments: lod.segments,
        placeholder_segments: lod.placeholder_segments,
        max_transport_retries: lod.max_transport_retries,
        budget: BudgetSettings {
            frame_budget: Duration::from_secs_f64(budget.frame_budget_ms.max(0.0) / 1000.0),
            transitions_per_tick: budget.transitions_per_tick,
            traversal_batch: budget.traversal_batch,
            integration_batch: budget.integration_batch,
            dispatch_batch: budget.dispatch_batch,
        },
    })
}

/// Build the planet described by `config` on top of `backend`.
pub fn build_planet<B: GenerationBackend>(config: &Config, backend: B) -> Result<Planet<B>, LodError> {
    let settings = lod_settings(config)?;
    let planet = &config.planet;
    match planet.kind {
        PlanetKind::Sphere => Planet::sphere(
            glam::DVec3::from_array(planet.center),
            planet.radius,
            settings,
            backend,
        ),
        PlanetKind::Flat => Planet::flat(planet.flat_grid, planet.flat_extent, settings, backend),
    }
}

/// Totals over a run.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub ticks: u64,
    /// Ticks that ran out of budget and deferred work.
    pub deferred_ticks: u64,
    pub splits: usize,
    pub unifies: usize,
    pub cancelled: usize,
    pub failures: usize,
    pub stale: usize,
    pub tasks_dispatched: usize,
    pub shows: usize,
    pub hides: usize,
    pub deletes: usize,
    /// Slowest tick.
    pub worst_tick: Duration,
    pub elapsed: Duration,
    pub final_stats: PlanetStats,
}

impl RunSummary {
    fn record(&mut self, report: &TickReport) {
        self.ticks += 1;
        self.deferred_ticks += u64::from(report.deferred);
        self.splits += report.splits_completed;
        self.unifies += report.unifies_completed;
        self.cancelled += report.transitions_cancelled;
        self.failures += report.failures;
        self.stale += report.stale;
        self.tasks_dispatched += report.tasks_dispatched;
        self.worst_tick = self.worst_tick.max(report.elapsed);
    }

    fn record_events(&mut self, events: &[RenderEvent]) {
        for event in events {
            match event {
                RenderEvent::Show(_) => self.shows += 1,
                RenderEvent::Hide(_) => self.hides += 1,
                RenderEvent::Delete(_) => self.deletes += 1,
            }
        }
    }
}

/// Moves the viewer along its path and ticks the planet.
///
/// There is no renderer: render events are drained and counted each tick.
pub struct Driver<B: GenerationBackend> {
    planet: Planet<B>,
    path: ViewerPath,
    summary: RunSummary,
}

impl<B: GenerationBackend> Driver<B> {
    pub fn new(planet: Planet<B>, path: ViewerPath) -> Self {
        Self {
            planet,
            path,
            summary: RunSummary::default(),
        }
    }

    pub fn planet(&self) -> &Planet<B> {
        &self.planet
    }

    pub fn into_planet(self) -> Planet<B> {
        self.planet
    }

    /// Run one tick at the path position for `tick`.
    pub fn step(&mut self, tick: u64) -> TickReport {
        let viewer = self.path.position(tick);
        let report = self.planet.tick(viewer);
        let events = self.planet.drain_render_events();
        self.summary.record(&report);
        self.summary.record_events(&events);
        report
    }

    /// Run `ticks` ticks paced by `pacer`, logging a summary every second.
    pub fn run(&mut self, ticks: u64, pacer: &mut TickPacer) -> RunSummary {
        let started = Instant::now();
        let mut window_start = started;
        let mut window = RunSummary::default();

        for tick in 0..ticks {
            let report = self.step(tick);
            window.record(&report);

            if window_start.elapsed() >= Duration::from_secs(1) {
                let stats = self.planet.stats();
                info!(
                    tick,
                    altitude = self.path.altitude(tick),
                    nodes = stats.nodes,
                    max_depth = stats.max_depth,
                    visible = stats.visible_meshes,
                    in_flight = stats.in_flight_tasks,
                    queued = stats.generation_queue,
                    splits = window.splits,
                    unifies = window.unifies,
                    deferred_ticks = window.deferred_ticks,
                    worst_tick_ms = window.worst_tick.as_secs_f64() * 1000.0,
                    "planet summary"
                );
                window = RunSummary::default();
                window_start = Instant::now();
            }
            pacer.wait();
        }

        self.summary.elapsed = started.elapsed();
        self.summary.final_stats = self.planet.stats();
        debug!(late_ticks = pacer.late_ticks(), resets = pacer.resets(), "run finished");
        self.summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nebula_terrain::{InlineGenerator, WorkerPool};

    fn small_config(kind: PlanetKind) -> Config {
        let mut config = Config::default();
        config.planet.kind = kind;
        config.planet.radius = 500.0;
        config.planet.flat_grid = 2;
        config.planet.flat_extent = 1000.0;
        config.lod.max_level = 4;
        config.lod.segments = 4;
        config.lod.placeholder_segments = 2;
        config.workers.count = 2;
        config.sim.ticks = 200;
        config.sim.tick_rate_hz = 0;
        config.sim.start_altitude = 2000.0;
        config.sim.end_altitude = 10.0;
        config.budget.frame_budget_ms = 1000.0;
        config
    }

    #[test]
    fn test_lod_settings_follow_config() {
        let config = small_config(PlanetKind::Sphere);
        let settings = lod_settings(&config).unwrap();
        assert_eq!(settings.max_level, 4);
        assert_eq!(settings.segments, 4);
        assert_eq!(settings.budget.frame_budget, Duration::from_secs(1));
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_inverted_factors_are_rejected() {
        let mut config = small_config(PlanetKind::Sphere);
        config.lod.unify_factor = 1.0;
        assert!(lod_settings(&config).is_err());
    }

    #[test]
    fn test_inline_run_refines_near_viewer() {
        let config = small_config(PlanetKind::Flat);
        let noise = terrain_noise(&config.terrain);
        let planet = build_planet(&config, InlineGenerator::new(noise, 2)).unwrap();
        let mut driver = Driver::new(planet, ViewerPath::from_config(&config));

        let summary = driver.run(config.sim.ticks, &mut TickPacer::new(0));

        assert_eq!(summary.ticks, 200);
        assert!(summary.splits > 0);
        assert!(summary.shows > 0);
        assert_eq!(summary.failures, 0);
        assert_eq!(summary.final_stats.max_depth, 4);
        assert!(summary.final_stats.visible_meshes >= 4);
    }

    #[test]
    fn test_worker_pool_run_shuts_down_cleanly() {
        let config = small_config(PlanetKind::Sphere);
        let pool = WorkerPool::new(&pool_config(&config.workers), terrain_noise(&config.terrain))
            .unwrap();
        let planet = build_planet(&config, pool).unwrap();
        let mut driver = Driver::new(planet, ViewerPath::from_config(&config));

        let summary = driver.run(config.sim.ticks, &mut TickPacer::new(0));
        assert_eq!(summary.ticks, 200);
        assert!(summary.tasks_dispatched >= 12);

        let mut planet = driver.into_planet();
        planet.backend_mut().shutdown();
        assert_eq!(planet.backend().thread_count(), 0);
        assert_eq!(planet.backend().transport().live_leases(), 0);
    }
}
