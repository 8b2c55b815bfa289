//! Configuration structs with sensible defaults and RON persistence.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Top-level configuration of the planet LOD driver.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Quadtree detail settings.
    pub lod: LodConfig,
    /// Terrain worker pool settings.
    pub workers: WorkersConfig,
    /// Per-tick work budget.
    pub budget: BudgetConfig,
    /// Planet shape.
    pub planet: PlanetConfig,
    /// Height and colour noise.
    pub terrain: TerrainConfig,
    /// Debug/development settings.
    pub debug: DebugConfig,
    /// Scripted viewer run.
    pub sim: SimConfig,
}

/// Quadtree detail configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LodConfig {
    /// Deepest subdivision level; roots are level 1.
    pub max_level: u32,
    /// Split when the viewer is closer than `size * split_factor`.
    pub split_factor: f64,
    /// Unify when the viewer is farther than `size * unify_factor`.
    /// Must exceed `split_factor`.
    pub unify_factor: f64,
    /// Grid cells per chunk edge.
    pub segments: u32,
    /// Grid cells per edge for chunks that keep failing to generate.
    pub placeholder_segments: u32,
    /// Failed generation attempts before using the placeholder.
    pub max_transport_retries: u32,
}

/// Worker pool configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct WorkersConfig {
    /// Worker threads (0 = one per core, leaving one for the main loop).
    pub count: usize,
    /// Bound of the task channel.
    pub task_queue_capacity: usize,
    /// Bound of the result channel.
    pub result_queue_capacity: usize,
    /// Row bands each chunk is split into across workers.
    pub partitions_per_chunk: u32,
    /// Floats that may be held in result buffers at once.
    pub transport_budget_floats: usize,
}

/// Per-tick budget configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct BudgetConfig {
    /// Milliseconds of bookkeeping allowed per tick.
    pub frame_budget_ms: f64,
    /// Split/unify intents executed per tick.
    pub transitions_per_tick: usize,
    /// Nodes visited per traversal batch.
    pub traversal_batch: usize,
    /// Worker results applied per integration batch.
    pub integration_batch: usize,
    /// Chunks submitted per dispatch batch.
    pub dispatch_batch: usize,
}

/// Shape of the generated body.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum PlanetKind {
    /// Six cube faces projected onto a sphere.
    Sphere,
    /// A square grid of flat patches in the XZ plane.
    Flat,
}

/// Planet configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PlanetConfig {
    pub kind: PlanetKind,
    /// Sphere radius in world units.
    pub radius: f64,
    /// Sphere centre.
    pub center: [f64; 3],
    /// Roots per side of a flat planet.
    pub flat_grid: u32,
    /// Edge length of a flat planet.
    pub flat_extent: f64,
}

/// Terrain noise configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TerrainConfig {
    pub seed: u32,
    pub octaves: u32,
    /// Cycles per world unit of the first octave.
    pub base_frequency: f64,
    /// Displacement of the first octave in world units.
    pub height_amplitude: f64,
    pub color_seed: u32,
    pub color_frequency: f64,
}

/// Debug/development configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DebugConfig {
    /// Log level override (e.g., "debug", "info", "warn").
    pub log_level: String,
    /// Also write JSON logs to `nebula.log` in the log directory.
    pub file_logging: bool,
}

/// Scripted viewer run.
///
/// The viewer descends from `start_altitude` to `end_altitude` above the
/// surface over the first `descent_fraction` of the run, then orbits.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SimConfig {
    /// Ticks to run.
    pub ticks: u64,
    /// Tick rate (0 = as fast as possible).
    pub tick_rate_hz: u32,
    pub start_altitude: f64,
    pub end_altitude: f64,
    pub descent_fraction: f64,
    /// Orbit angular speed in radians per tick.
    pub orbit_speed: f64,
}

impl Default for LodConfig {
    fn default() -> Self {
        Self {
            max_level: 8,
            split_factor: 2.0,
            unify_factor: 2.5,
            segments: 16,
            placeholder_segments: 4,
            max_transport_retries: 3,
        }
    }
}

impl Default for WorkersConfig {
    fn default() -> Self {
        Self {
            count: 0,
            task_queue_capacity: 256,
            result_queue_capacity: 256,
            partitions_per_chunk: 2,
            transport_budget_floats: 32 * 1024 * 1024,
        }
    }
}

impl Default for BudgetConfig {
    fn default() -> Self {
        Self {
            frame_budget_ms: 1000.0 / 32.0,
            transitions_per_tick: 16,
            traversal_batch: 64,
            integration_batch: 32,
            dispatch_batch: 32,
        }
    }
}

impl Default for PlanetConfig {
    fn default() -> Self {
        Self {
            kind: PlanetKind::Sphere,
            radius: 1000.0,
            center: [0.0; 3],
            flat_grid: 4,
            flat_extent: 4000.0,
        }
    }
}

impl Default for TerrainConfig {
    fn default() -> Self {
        Self {
            seed: 64,
            octaves: 4,
            base_frequency: 0.004,
            height_amplitude: 16.0,
            color_seed: 32786,
            color_frequency: 1.0 / 64.0,
        }
    }
}

impl Default for DebugConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            file_logging: cfg!(debug_assertions),
        }
    }
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            ticks: 32 * 60,
            tick_rate_hz: 32,
            start_altitude: 3000.0,
            end_altitude: 20.0,
            descent_fraction: 0.5,
            orbit_speed: 0.002,
        }
    }
}

// --- Validation ---

fn invalid(message: impl Into<String>) -> ConfigError {
    ConfigError::Validation(message.into())
}

impl Config {
    /// Reject settings the planet could not run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let lod = &self.lod;
        if lod.max_level == 0 {
            return Err(invalid("lod.max_level must be at least 1"));
        }
        if !(lod.split_factor.is_finite() && lod.split_factor > 0.0) {
            return Err(invalid("lod.split_factor must be positive"));
        }
        if !lod.unify_factor.is_finite() || lod.unify_factor <= lod.split_factor {
            return Err(invalid(format!(
                "lod.unify_factor ({}) must exceed lod.split_factor ({})",
                lod.unify_factor, lod.split_factor
            )));
        }
        if lod.segments == 0 {
            return Err(invalid("lod.segments must be non-zero"));
        }
        if lod.placeholder_segments == 0 || lod.placeholder_segments > lod.segments {
            return Err(invalid("lod.placeholder_segments must be in 1..=lod.segments"));
        }

        let workers = &self.workers;
        if workers.task_queue_capacity == 0
            || workers.result_queue_capacity == 0
            || workers.partitions_per_chunk == 0
            || workers.transport_budget_floats == 0
        {
            return Err(invalid("worker queue capacities and budgets must be non-zero"));
        }

        let budget = &self.budget;
        if !(budget.frame_budget_ms.is_finite() && budget.frame_budget_ms > 0.0) {
            return Err(invalid("budget.frame_budget_ms must be positive"));
        }
        if budget.transitions_per_tick == 0
            || budget.traversal_batch == 0
            || budget.integration_batch == 0
            || budget.dispatch_batch == 0
        {
            return Err(invalid("budget quotas and batch sizes must be non-zero"));
        }

        let planet = &self.planet;
        match planet.kind {
            PlanetKind::Sphere => {
                if !(planet.radius.is_finite() && planet.radius > 0.0) {
                    return Err(invalid("planet.radius must be positive"));
                }
            }
            PlanetKind::Flat => {
                if planet.flat_grid == 0 || !(planet.flat_extent > 0.0) {
                    return Err(invalid("flat planets need a non-empty grid and extent"));
                }
            }
        }

        let sim = &self.sim;
        if !(0.0..=1.0).contains(&sim.descent_fraction) {
            return Err(invalid("sim.descent_fraction must be within 0..=1"));
        }
        Ok(())
    }
}

// --- Load / Save / Reload ---

impl Config {
    /// Load config from the given directory, or create a default config file.
    pub fn load_or_create(config_dir: &Path) -> Result<Self, ConfigError> {
        let config_path = config_dir.join("config.ron");

        if config_path.exists() {
            let contents = std::fs::read_to_string(&config_path).map_err(ConfigError::ReadError)?;
            let config: Config = ron::from_str(&contents).map_err(ConfigError::ParseError)?;
            log::info!("Loaded config from {}", config_path.display());
            Ok(config)
        } else {
            let config = Config::default();
            config.save(config_dir)?;
            log::info!("Created default config at {}", config_path.display());
            Ok(config)
        }
    }

    /// Save config to the given directory as `config.ron`.
    pub fn save(&self, config_dir: &Path) -> Result<(), ConfigError> {
        std::fs::create_dir_all(config_dir).map_err(ConfigError::WriteError)?;

        let config_path = config_dir.join("config.ron");
        let pretty = ron::ser::PrettyConfig::new()
            .depth_limit(3)
            .separate_tuple_members(true)
            .enumerate_arrays(false);

        let serialized =
            ron::ser::to_string_pretty(self, pretty).map_err(ConfigError::SerializeError)?;

        std::fs::write(&config_path, serialized).map_err(ConfigError::WriteError)?;
        Ok(())
    }

    /// Hot-reload: returns `Some(new_config)` if the file changed, `None` otherwise.
    pub fn reload(&self, config_dir: &Path) -> Result<Option<Self>, ConfigError> {
        let config_path = config_dir.join("config.ron");
        let contents = std::fs::read_to_string(&config_path).map_err(ConfigError::ReadError)?;
        let new_config: Config = ron::from_str(&contents).map_err(ConfigError::ParseError)?;

        if &new_config != self {
            log::info!("Config reloaded with changes");
            Ok(Some(new_config))
        } else {
            Ok(None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_serializes() {
        let config = Config::default();
        let ron_str =
            ron::ser::to_string_pretty(&config, ron::ser::PrettyConfig::new().depth_limit(3))
                .unwrap();
        assert!(ron_str.contains("max_level: 8"));
        assert!(ron_str.contains("kind: Sphere"));
    }

    #[test]
    fn test_default_config_is_valid() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn test_missing_section_uses_default() {
        let ron_str = "(lod: (max_level: 3), planet: (kind: Flat))";
        let config: Config = ron::from_str(ron_str).unwrap();
        assert_eq!(config.lod.max_level, 3);
        assert_eq!(config.lod.segments, LodConfig::default().segments);
        assert_eq!(config.planet.kind, PlanetKind::Flat);
        assert_eq!(config.workers, WorkersConfig::default());
    }

    #[test]
    fn test_extra_field_ignored() {
        let result: Result<Config, _> = ron::from_str("(future_setting: true)");
        assert!(result.is_ok());
    }

    #[test]
    fn test_unify_factor_must_exceed_split_factor() {
        let mut config = Config::default();
        config.lod.unify_factor = config.lod.split_factor;
        assert!(matches!(config.validate(), Err(ConfigError::Validation(_))));
    }

    #[test]
    fn test_zero_segments_and_budgets_rejected() {
        let mut config = Config::default();
        config.lod.segments = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.budget.frame_budget_ms = 0.0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.budget.dispatch_batch = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.workers.transport_budget_floats = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_placeholder_cannot_exceed_segments() {
        let mut config = Config::default();
        config.lod.placeholder_segments = config.lod.segments + 1;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.lod.max_level = 5;
        config.planet.kind = PlanetKind::Flat;
        config.planet.center = [1.0, 2.0, 3.0];

        config.save(dir.path()).unwrap();
        let loaded = Config::load_or_create(dir.path()).unwrap();
        assert_eq!(config, loaded);
    }

    #[test]
    fn test_load_creates_default_file() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_or_create(dir.path()).unwrap();
        assert_eq!(config, Config::default());
        assert!(dir.path().join("config.ron").exists());
    }

    #[test]
    fn test_reload_detects_changes() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::default();
        config.save(dir.path()).unwrap();

        let mut modified = config.clone();
        modified.budget.transitions_per_tick = 4;
        modified.save(dir.path()).unwrap();

        let result = config.reload(dir.path()).unwrap();
        assert_eq!(result.unwrap().budget.transitions_per_tick, 4);
    }

    #[test]
    fn test_reload_no_changes() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::default();
        config.save(dir.path()).unwrap();
        assert!(config.reload(dir.path()).unwrap().is_none());
    }

    #[test]
    fn test_invalid_ron_produces_error() {
        let result: Result<Config, _> = ron::from_str("{{not valid}}");
        assert!(result.is_err());
    }
}
