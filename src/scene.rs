//! Animated SDF scenes.
//!
//! A scene maps a time to a pure [`Sdf`] tree. The ray marcher asks for the
//! tree once per frame and marches it; [`SdfScene::distance`] exists for
//! point queries and may be overridden with a closed form that skips the
//! allocation.

use std::f32::consts::TAU;

use glam::{Quat, Vec3};

use crate::error::{ensure_finite, ensure_non_negative, ensure_positive, ConfigError};
use crate::sdf::{op_smooth_union, sd_sphere, sd_torus, Sdf};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Something that can be rendered by the ray marcher.
pub trait SdfScene: Send + Sync {
    /// The distance tree at `time` seconds.
    fn at(&self, time: f32) -> Sdf;

    /// Signed distance from `p` at `time`.
    fn distance(&self, p: Vec3, time: f32) -> f32 {
        self.at(time).distance(p)
    }
}

/// A static tree is a scene that ignores time.
impl SdfScene for Sdf {
    fn at(&self, _time: f32) -> Sdf {
        self.clone()
    }

    fn distance(&self, p: Vec3, _time: f32) -> f32 {
        Sdf::distance(self, p)
    }
}

/// A bobbing core orb, satellites orbiting it and a spinning ring, all
/// blended with smooth unions.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct OrbitalScene {
    pub core_radius: f32,
    /// Vertical bob of the core.
    pub core_bob: f32,
    /// Angular speed of the core bob (rad/s).
    pub core_bob_speed: f32,

    pub satellite_count: u32,
    pub satellite_radius: f32,
    pub orbit_radius: f32,
    /// Angular speed of the orbit (rad/s).
    pub orbit_speed: f32,
    /// Vertical bob of each satellite.
    pub satellite_bob: f32,
    /// Smooth-union blend between core and satellites.
    pub satellite_blend: f32,

    pub ring_major: f32,
    pub ring_minor: f32,
    /// Ring spin about Y (rad/s).
    pub ring_spin: f32,
    /// Fixed ring tilt about X (rad).
    pub ring_tilt: f32,
    pub ring_blend: f32,

    /// Noise displacement of the core surface. Zero disables it.
    pub core_displacement: f32,
    pub displacement_frequency: f32,
}

impl Default for OrbitalScene {
    fn default() -> Self {
        Self {
            core_radius: 1.0,
            core_bob: 0.5,
            core_bob_speed: 0.5,
            satellite_count: 3,
            satellite_radius: 0.3,
            orbit_radius: 2.0,
            orbit_speed: 1.0,
            satellite_bob: 0.3,
            satellite_blend: 0.3,
            ring_major: 2.5,
            ring_minor: 0.1,
            ring_spin: 0.2,
            ring_tilt: 0.35,
            ring_blend: 0.2,
            core_displacement: 0.0,
            displacement_frequency: 1.5,
        }
    }
}

impl OrbitalScene {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set how many satellites orbit the core.
    pub fn with_satellites(mut self, count: u32, radius: f32, orbit_radius: f32) -> Self {
        self.satellite_count = count;
        self.satellite_radius = radius.max(0.0);
        self.orbit_radius = orbit_radius.max(0.0);
        self
    }

    /// Set the ring shape and motion.
    pub fn with_ring(mut self, major: f32, minor: f32, spin: f32, tilt: f32) -> Self {
        self.ring_major = major.max(0.0);
        self.ring_minor = minor.max(0.0);
        self.ring_spin = spin;
        self.ring_tilt = tilt;
        self
    }

    /// Enable animated noise displacement on the core.
    pub fn with_core_displacement(mut self, amplitude: f32, frequency: f32) -> Self {
        self.core_displacement = amplitude;
        self.displacement_frequency = frequency.max(0.0);
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        ensure_positive("core_radius", self.core_radius)?;
        ensure_finite("core_bob", self.core_bob)?;
        ensure_finite("core_bob_speed", self.core_bob_speed)?;
        ensure_non_negative("satellite_radius", self.satellite_radius)?;
        ensure_non_negative("orbit_radius", self.orbit_radius)?;
        ensure_finite("orbit_speed", self.orbit_speed)?;
        ensure_finite("satellite_bob", self.satellite_bob)?;
        ensure_non_negative("satellite_blend", self.satellite_blend)?;
        ensure_non_negative("ring_major", self.ring_major)?;
        ensure_non_negative("ring_minor", self.ring_minor)?;
        ensure_finite("ring_spin", self.ring_spin)?;
        ensure_finite("ring_tilt", self.ring_tilt)?;
        ensure_non_negative("ring_blend", self.ring_blend)?;
        ensure_finite("core_displacement", self.core_displacement)?;
        ensure_non_negative("displacement_frequency", self.displacement_frequency)?;
        Ok(())
    }

    /// Core centre at `time`.
    pub fn core_center(&self, time: f32) -> Vec3 {
        Vec3::new(0.0, (time * self.core_bob_speed).sin() * self.core_bob, 0.0)
    }

    /// Centre of satellite `i` at `time`.
    pub fn satellite_center(&self, i: u32, time: f32) -> Vec3 {
        let phase = i as f32 * TAU / self.satellite_count.max(1) as f32;
        let angle = time * self.orbit_speed + phase;
        Vec3::new(
            angle.cos() * self.orbit_radius,
            (time * 2.0 + i as f32).sin() * self.satellite_bob,
            angle.sin() * self.orbit_radius,
        )
    }

    /// Ring orientation at `time`.
    pub fn ring_rotation(&self, time: f32) -> Quat {
        Quat::from_rotation_y(time * self.ring_spin) * Quat::from_rotation_x(self.ring_tilt)
    }

    fn core_sdf(&self, time: f32) -> Sdf {
        let core = Sdf::sphere(self.core_radius);
        let core = if self.core_displacement != 0.0 {
            core.displace(self.core_displacement, self.displacement_frequency, time * 0.5)
        } else {
            core
        };
        core.translate(self.core_center(time))
    }
}

impl SdfScene for OrbitalScene {
    fn at(&self, time: f32) -> Sdf {
        let mut scene = self.core_sdf(time);
        for i in 0..self.satellite_count {
            let satellite = Sdf::sphere(self.satellite_radius).translate(self.satellite_center(i, time));
            scene = scene.smooth_union(satellite, self.satellite_blend);
        }
        let ring = Sdf::torus(self.ring_major, self.ring_minor).rotate(self.ring_rotation(time));
        scene.smooth_union(ring, self.ring_blend)
    }

    fn distance(&self, p: Vec3, time: f32) -> f32 {
        if self.core_displacement != 0.0 {
            return self.at(time).distance(p);
        }
        let mut d = sd_sphere(p - self.core_center(time), self.core_radius);
        for i in 0..self.satellite_count {
            let s = sd_sphere(p - self.satellite_center(i, time), self.satellite_radius);
            d = op_smooth_union(d, s, self.satellite_blend);
        }
        let local = self.ring_rotation(time).inverse() * p;
        op_smooth_union(d, sd_torus(local, self.ring_major, self.ring_minor), self.ring_blend)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::StdRng, Rng, SeedableRng};

    #[test]
    fn test_closed_form_matches_tree() {
        let scene = OrbitalScene::default();
        let mut rng = StdRng::seed_from_u64(21);
        for _ in 0..300 {
            let p = Vec3::new(
                rng.gen_range(-4.0..4.0),
                rng.gen_range(-4.0..4.0),
                rng.gen_range(-4.0..4.0),
            );
            let t = rng.gen_range(0.0..20.0);
            let tree = scene.at(t).distance(p);
            let direct = SdfScene::distance(&scene, p, t);
            assert!((tree - direct).abs() < 1e-4, "{} vs {} at {:?}", tree, direct, p);
        }
    }

    #[test]
    fn test_core_bobs() {
        let scene = OrbitalScene::default();
        let t = std::f32::consts::PI; // sin(pi * 0.5) = 1
        assert!((scene.core_center(t).y - 0.5).abs() < 1e-5);
        // Inside the core at its centre, whatever the time.
        assert!(SdfScene::distance(&scene, scene.core_center(t), t) < -0.9);
    }

    #[test]
    fn test_satellites_evenly_spaced() {
        let scene = OrbitalScene::default();
        let a = scene.satellite_center(0, 0.0);
        let b = scene.satellite_center(1, 0.0);
        let c = scene.satellite_center(2, 0.0);
        let flat = |v: Vec3| Vec3::new(v.x, 0.0, v.z);
        let ab = flat(a).distance(flat(b));
        let bc = flat(b).distance(flat(c));
        assert!((ab - bc).abs() < 1e-4);
        assert!((flat(a).length() - 2.0).abs() < 1e-5);
    }

    #[test]
    fn test_satellites_move() {
        let scene = OrbitalScene::default();
        assert!(scene.satellite_center(0, 0.0).distance(scene.satellite_center(0, 1.0)) > 0.5);
    }

    #[test]
    fn test_ring_surface() {
        let scene = OrbitalScene::default().with_satellites(0, 0.3, 2.0).with_ring(2.5, 0.1, 0.0, 0.0);
        // On the ring tube at rest, far from the core blend.
        let d = SdfScene::distance(&scene, Vec3::new(2.5, 0.0, 0.0), 0.0);
        assert!(d < 0.0);
    }

    #[test]
    fn test_static_tree_is_scene() {
        let sphere = Sdf::sphere(1.0);
        assert_eq!(SdfScene::distance(&sphere, Vec3::ZERO, 42.0), -1.0);
        assert_eq!(sphere.at(3.0), sphere);
    }

    #[test]
    fn test_displacement_uses_tree() {
        let plain = OrbitalScene::default();
        let wobbly = OrbitalScene::default().with_core_displacement(0.1, 2.0);
        let p = Vec3::new(0.0, 0.0, 1.05);
        let a = SdfScene::distance(&plain, p, 0.0);
        let b = SdfScene::distance(&wobbly, p, 0.0);
        assert!((a - b).abs() <= 0.2 + 1e-5);
        assert!(wobbly.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_zero_core() {
        let mut scene = OrbitalScene::default();
        scene.core_radius = 0.0;
        assert!(matches!(
            scene.validate(),
            Err(ConfigError::NonPositive { name: "core_radius", .. })
        ));
    }
}
