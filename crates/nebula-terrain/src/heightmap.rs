//! Multi-octave fractal noise used to displace and tint terrain vertices.
//!
//! [`TerrainNoise`] is the seam the generation workers sample through. The
//! stock implementation, [`PlanetNoise`], composites simplex fBm for height
//! and ridged fBm for the colour tint.

use glam::DVec3;
use noise::{NoiseFn, Simplex};

/// Height and colour noise as pure functions of a world-space point.
///
/// Implementations must be deterministic for a given construction and safe to
/// share between worker threads.
pub trait TerrainNoise: Send + Sync {
    /// Surface displacement in world units at `point`.
    fn height(&self, point: DVec3) -> f64;

    /// Colour tint in roughly `[-1, 1]` at `point`.
    fn color_noise(&self, point: DVec3) -> f64;

    /// Largest absolute displacement [`TerrainNoise::height`] can return.
    fn max_height(&self) -> f64 {
        1.0
    }
}

/// Configuration for multi-octave fBm noise.
#[derive(Clone, Debug)]
pub struct HeightmapParams {
    /// Seed for deterministic generation.
    pub seed: u32,
    /// Number of noise octaves to composite.
    pub octaves: u32,
    /// Frequency multiplier between successive octaves. Default: 2.0.
    pub lacunarity: f64,
    /// Amplitude multiplier between successive octaves. Default: 0.5.
    pub persistence: f64,
    /// Frequency of the first (lowest) octave, in cycles per world unit.
    pub base_frequency: f64,
    /// Amplitude of the first octave in world units.
    pub amplitude: f64,
}

impl Default for HeightmapParams {
    fn default() -> Self {
        Self {
            seed: 0,
            octaves: 4,
            lacunarity: 2.0,
            persistence: 0.5,
            base_frequency: 0.004,
            amplitude: 16.0,
        }
    }
}

/// Fractal Brownian motion over 3D simplex noise.
pub struct HeightmapSampler {
    noise: Simplex,
    params: HeightmapParams,
}

impl HeightmapSampler {
    /// Create a new sampler with the given parameters.
    pub fn new(params: HeightmapParams) -> Self {
        let noise = Simplex::new(params.seed);
        Self { noise, params }
    }

    /// Plain fBm: each octave doubles frequency and halves amplitude.
    pub fn sample_3d(&self, point: DVec3) -> f64 {
        self.accumulate(point, |n| n)
    }

    /// Ridged fBm: folds every octave around zero to form sharp crests.
    pub fn sample_ridged_3d(&self, point: DVec3) -> f64 {
        self.accumulate(point, |n| 1.0 - 2.0 * n.abs())
    }

    fn accumulate(&self, point: DVec3, shape: impl Fn(f64) -> f64) -> f64 {
        let mut total = 0.0;
        let mut frequency = self.params.base_frequency;
        let mut amplitude = self.params.amplitude;

        for _ in 0..self.params.octaves {
            let p = point * frequency;
            total += shape(self.noise.get([p.x, p.y, p.z])) * amplitude;

            frequency *= self.params.lacunarity;
            amplitude *= self.params.persistence;
        }

        total
    }

    /// Theoretical maximum absolute output (geometric series of amplitudes).
    pub fn max_amplitude(&self) -> f64 {
        let mut sum = 0.0;
        let mut amp = self.params.amplitude;
        for _ in 0..self.params.octaves {
            sum += amp;
            amp *= self.params.persistence;
        }
        sum
    }

    /// Return a reference to the current parameters.
    pub fn params(&self) -> &HeightmapParams {
        &self.params
    }
}

/// Settings for the stock planet noise.
#[derive(Clone, Debug)]
pub struct NoiseSettings {
    /// Seed of the height field.
    pub seed: u32,
    /// Octave count of the height field.
    pub octaves: u32,
    /// First-octave frequency in cycles per world unit.
    pub base_frequency: f64,
    /// First-octave displacement in world units.
    pub height_amplitude: f64,
    /// Seed of the colour tint field.
    pub color_seed: u32,
    /// First-octave frequency of the colour tint field.
    pub color_frequency: f64,
}

impl Default for NoiseSettings {
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

/// Height from simplex fBm, colour tint from ridged fBm.
pub struct PlanetNoise {
    height: HeightmapSampler,
    color: HeightmapSampler,
}

impl PlanetNoise {
    /// Build both samplers from `settings`.
    pub fn new(settings: &NoiseSettings) -> Self {
        let height = HeightmapSampler::new(HeightmapParams {
            seed: settings.seed,
            octaves: settings.octaves,
            base_frequency: settings.base_frequency,
            amplitude: settings.height_amplitude,
            ..Default::default()
        });
        let color = HeightmapSampler::new(HeightmapParams {
            seed: settings.color_seed,
            octaves: settings.octaves,
            base_frequency: settings.color_frequency,
            amplitude: 0.5,
            ..Default::default()
        });
        Self { height, color }
    }
}

impl TerrainNoise for PlanetNoise {
    fn height(&self, point: DVec3) -> f64 {
        self.height.sample_3d(point)
    }

    fn color_noise(&self, point: DVec3) -> f64 {
        self.color.sample_ridged_3d(point)
    }

    fn max_height(&self) -> f64 {
        self.height.max_amplitude()
    }
}

/// A flat field, useful where displacement would obscure what is under test.
#[derive(Clone, Copy, Debug, Default)]
pub struct FlatNoise;

impl TerrainNoise for FlatNoise {
    fn height(&self, _point: DVec3) -> f64 {
        0.0
    }

    fn color_noise(&self, _point: DVec3) -> f64 {
        0.0
    }
}
