//! Scripted viewer: a straight descent toward the surface, then an orbit.

use glam::DVec3;
use nebula_config::{Config, PlanetKind};

/// Where the path is anchored.
#[derive(Clone, Copy, Debug, PartialEq)]
enum Ground {
    Sphere { center: DVec3, radius: f64 },
    /// Flat terrain at `y = 0`, orbit of the given radius.
    Plane { orbit_radius: f64 },
}

/// Viewer position as a function of the tick number.
#[derive(Clone, Debug)]
pub struct ViewerPath {
    ground: Ground,
    start_altitude: f64,
    end_altitude: f64,
    descent_ticks: u64,
    orbit_speed: f64,
}

impl ViewerPath {
    pub fn from_config(config: &Config) -> Self {
        let planet = &config.planet;
        let ground = match planet.kind {
            PlanetKind::Sphere => Ground::Sphere {
                center: DVec3::from_array(planet.center),
                radius: planet.radius,
            },
            PlanetKind::Flat => Ground::Plane {
                orbit_radius: planet.flat_extent * 0.25,
            },
        };
        let sim = &config.sim;
        Self {
            ground,
            start_altitude: sim.start_altitude,
            end_altitude: sim.end_altitude,
            descent_ticks: (sim.ticks as f64 * sim.descent_fraction).round() as u64,
            orbit_speed: sim.orbit_speed,
        }
    }

    /// Altitude above the surface at `tick`.
    pub fn altitude(&self, tick: u64) -> f64 {
        if tick >= self.descent_ticks {
            return self.end_altitude;
        }
        let t = tick as f64 / self.descent_ticks as f64;
        // Ease out so the approach slows near the ground.
        let eased = 1.0 - (1.0 - t) * (1.0 - t);
        self.start_altitude + (self.end_altitude - self.start_altitude) * eased
    }

    pub fn position(&self, tick: u64) -> DVec3 {
        let altitude = self.altitude(tick);
        let angle = tick.saturating_sub(self.descent_ticks) as f64 * self.orbit_speed;
        match self.ground {
            Ground::Sphere { center, radius } => {
                // Tilted orbit so the path crosses several cube faces.
                let dir = DVec3::new(angle.cos(), 0.35, angle.sin()).normalize();
                center + dir * (radius + altitude)
            }
            Ground::Plane { orbit_radius } => {
                let ring = if tick < self.descent_ticks {
                    DVec3::new(orbit_radius, 0.0, 0.0)
                } else {
                    DVec3::new(angle.cos(), 0.0, angle.sin()) * orbit_radius
                };
                ring + DVec3::Y * altitude
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(kind: PlanetKind) -> Config {
        let mut config = Config::default();
        config.planet.kind = kind;
        config.sim.ticks = 100;
        config.sim.descent_fraction = 0.5;
        config
    }

    #[test]
    fn test_descent_reaches_end_altitude() {
        let path = ViewerPath::from_config(&config(PlanetKind::Sphere));
        let sim = Config::default().sim;
        assert!((path.altitude(0) - sim.start_altitude).abs() < 1e-9);
        assert!((path.altitude(50) - sim.end_altitude).abs() < 1e-9);
        assert!((path.altitude(99) - sim.end_altitude).abs() < 1e-9);
        for tick in 1..50 {
            assert!(path.altitude(tick) < path.altitude(tick - 1));
        }
    }

    #[test]
    fn test_sphere_orbit_keeps_altitude() {
        let config = config(PlanetKind::Sphere);
        let path = ViewerPath::from_config(&config);
        let expected = config.planet.radius + config.sim.end_altitude;
        for tick in 50..100 {
            assert!((path.position(tick).length() - expected).abs() < 1e-6);
        }
        assert_ne!(path.position(60), path.position(90));
    }

    #[test]
    fn test_flat_path_stays_above_plane() {
        let path = ViewerPath::from_config(&config(PlanetKind::Flat));
        for tick in 0..100 {
            assert!(path.position(tick).y >= Config::default().sim.end_altitude - 1e-9);
        }
    }

    #[test]
    fn test_zero_descent_starts_in_orbit() {
        let mut config = config(PlanetKind::Sphere);
        config.sim.descent_fraction = 0.0;
        let path = ViewerPath::from_config(&config);
        assert!((path.altitude(0) - config.sim.end_altitude).abs() < 1e-9);
    }
}
