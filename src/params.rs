//! Per-frame parameter block for the particle kernel.
//!
//! [`SimulationParams`] is the CPU side of the uniform block. The
//! orchestrator owns the only mutable copy and stamps `delta_time` / `time`
//! into a fresh snapshot before each dispatch; the kernel only ever sees it
//! by shared reference.

use glam::{Vec3, Vec4};

use crate::error::{
    ensure_finite, ensure_finite_vec, ensure_in_range, ensure_non_negative, ensure_positive,
    ConfigError,
};
use crate::noise::MAX_OCTAVES;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Smallest mass the kernel divides by.
pub const MIN_MASS: f32 = 1e-4;

/// Particle simulation parameters.
///
/// # Example
///
/// ```
/// use backdrop::SimulationParams;
/// use glam::Vec3;
///
/// let params = SimulationParams::default()
///     .with_gravity(Vec3::new(0.0, -9.8, 0.0))
///     .with_damping(0.98)
///     .with_life_range(1.0, 3.0);
/// assert!(params.validate().is_ok());
/// ```
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct SimulationParams {
    /// Seconds advanced by this dispatch. Written by the orchestrator.
    pub delta_time: f32,
    /// Elapsed simulation time. Written by the orchestrator.
    pub time: f32,
    /// Size of the particle pool.
    pub particle_count: u32,

    /// Constant acceleration.
    pub gravity: Vec3,
    /// Per-step velocity multiplier in `[0, 1]`. `1.0` disables damping.
    pub damping: f32,

    /// Spatial frequency of the curl turbulence.
    pub turbulence_scale: f32,
    /// Turbulence force multiplier. `0.0` disables turbulence.
    pub turbulence_strength: f32,
    /// How fast the turbulence field drifts over time.
    pub turbulence_speed: f32,
    /// Octaves of the turbulence potential, `1..=8`.
    pub noise_octaves: u32,

    /// Half-extents of the simulation box, centred on the origin.
    pub bounds: Vec3,
    /// Fraction of speed kept after a wall bounce, `[0, 1]`.
    pub restitution: f32,

    /// Centre of the spherical spawn volume.
    pub emitter_position: Vec3,
    /// Radius of the spherical spawn volume.
    pub emitter_radius: f32,
    /// Particles per second while the pool warms up. `0.0` spawns the whole
    /// pool at once.
    pub emit_rate: f32,
    /// Speed of freshly spawned particles.
    pub initial_speed: f32,
    /// Mass of freshly spawned particles.
    pub mass: f32,

    /// Shortest lifetime in seconds.
    pub life_min: f32,
    /// Longest lifetime in seconds.
    pub life_max: f32,
    /// Size at birth and death.
    pub size_min: f32,
    /// Size at mid-life.
    pub size_max: f32,
    /// Seconds of alpha fade-in after spawn and fade-out before death.
    pub fade_time: f32,
    /// Radians of rotation per unit of distance travelled.
    pub rotation_rate: f32,

    /// Colour at birth.
    pub color_start: Vec4,
    /// Colour at death.
    pub color_end: Vec4,

    /// Relative share of `[Standard, Buoyant, Tracer]` slots in a new pool.
    pub kind_weights: [f32; 3],
}

impl Default for SimulationParams {
    fn default() -> Self {
        Self {
            delta_time: 0.0,
            time: 0.0,
            particle_count: 10_000,
            gravity: Vec3::new(0.0, -0.2, 0.0),
            damping: 0.99,
            turbulence_scale: 0.5,
            turbulence_strength: 1.0,
            turbulence_speed: 0.2,
            noise_octaves: 3,
            bounds: Vec3::new(10.0, 6.0, 10.0),
            restitution: 0.6,
            emitter_position: Vec3::ZERO,
            emitter_radius: 2.0,
            emit_rate: 0.0,
            initial_speed: 0.5,
            mass: 1.0,
            life_min: 2.0,
            life_max: 6.0,
            size_min: 0.02,
            size_max: 0.08,
            fade_time: 0.1,
            rotation_rate: 2.0,
            color_start: Vec4::new(0.545, 0.0, 1.0, 1.0),
            color_end: Vec4::new(1.0, 0.843, 0.0, 0.0),
            kind_weights: [1.0, 0.0, 0.0],
        }
    }
}

impl SimulationParams {
    /// Default parameters with `count` particles.
    pub fn new(count: u32) -> Self {
        Self {
            particle_count: count,
            ..Default::default()
        }
    }

    /// Set the pool size.
    pub fn with_particle_count(mut self, count: u32) -> Self {
        self.particle_count = count;
        self
    }

    /// Set gravity.
    pub fn with_gravity(mut self, gravity: Vec3) -> Self {
        self.gravity = gravity;
        self
    }

    /// Set damping (clamped to `[0, 1]`).
    pub fn with_damping(mut self, damping: f32) -> Self {
        self.damping = damping.clamp(0.0, 1.0);
        self
    }

    /// Set turbulence scale, strength and drift speed.
    pub fn with_turbulence(mut self, scale: f32, strength: f32, speed: f32) -> Self {
        self.turbulence_scale = scale;
        self.turbulence_strength = strength;
        self.turbulence_speed = speed;
        self
    }

    /// Set the turbulence octave count (clamped to `1..=8`).
    pub fn with_noise_octaves(mut self, octaves: u32) -> Self {
        self.noise_octaves = octaves.clamp(1, MAX_OCTAVES);
        self
    }

    /// Set the box half-extents.
    pub fn with_bounds(mut self, bounds: Vec3) -> Self {
        self.bounds = bounds;
        self
    }

    /// Set wall restitution (clamped to `[0, 1]`).
    pub fn with_restitution(mut self, restitution: f32) -> Self {
        self.restitution = restitution.clamp(0.0, 1.0);
        self
    }

    /// Set the spawn sphere.
    pub fn with_emitter(mut self, position: Vec3, radius: f32) -> Self {
        self.emitter_position = position;
        self.emitter_radius = radius;
        self
    }

    /// Set the warm-up emission rate.
    pub fn with_emit_rate(mut self, rate: f32) -> Self {
        self.emit_rate = rate.max(0.0);
        self
    }

    /// Set the spawn speed.
    pub fn with_initial_speed(mut self, speed: f32) -> Self {
        self.initial_speed = speed;
        self
    }

    /// Set the spawn mass (floored to [`MIN_MASS`]).
    pub fn with_mass(mut self, mass: f32) -> Self {
        self.mass = mass.max(MIN_MASS);
        self
    }

    /// Set the lifetime range.
    pub fn with_life_range(mut self, min: f32, max: f32) -> Self {
        self.life_min = min;
        self.life_max = max;
        self
    }

    /// Set the size range.
    pub fn with_size_range(mut self, min: f32, max: f32) -> Self {
        self.size_min = min;
        self.size_max = max;
        self
    }

    /// Set the start and end colours.
    pub fn with_colors(mut self, start: Vec4, end: Vec4) -> Self {
        self.color_start = start;
        self.color_end = end;
        self
    }

    /// Set the alpha fade window.
    pub fn with_fade_time(mut self, fade_time: f32) -> Self {
        self.fade_time = fade_time.max(0.0);
        self
    }

    /// Set relative kind weights `[standard, buoyant, tracer]`.
    pub fn with_kind_weights(mut self, weights: [f32; 3]) -> Self {
        self.kind_weights = weights.map(|w| w.max(0.0));
        self
    }

    /// Copy of these parameters with frame timing stamped in.
    pub fn snapshot(&self, delta_time: f32, time: f32) -> Self {
        Self {
            delta_time,
            time,
            ..self.clone()
        }
    }

    /// Check every parameter once, before any frame runs.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.particle_count == 0 {
            return Err(ConfigError::NoParticles);
        }
        ensure_non_negative("delta_time", self.delta_time)?;
        ensure_finite("time", self.time)?;

        ensure_finite_vec("gravity", self.gravity.to_array())?;
        ensure_in_range("damping", self.damping, 0.0, 1.0)?;

        ensure_finite("turbulence_scale", self.turbulence_scale)?;
        ensure_non_negative("turbulence_strength", self.turbulence_strength)?;
        ensure_finite("turbulence_speed", self.turbulence_speed)?;
        if !(1..=MAX_OCTAVES).contains(&self.noise_octaves) {
            return Err(ConfigError::Octaves {
                octaves: self.noise_octaves,
                max: MAX_OCTAVES,
            });
        }

        let axes = ["bounds.x", "bounds.y", "bounds.z"];
        for (axis, extent) in axes.into_iter().zip(self.bounds.to_array()) {
            ensure_positive(axis, extent)?;
        }
        ensure_in_range("restitution", self.restitution, 0.0, 1.0)?;

        ensure_finite_vec("emitter_position", self.emitter_position.to_array())?;
        ensure_non_negative("emitter_radius", self.emitter_radius)?;
        ensure_non_negative("emit_rate", self.emit_rate)?;
        ensure_non_negative("initial_speed", self.initial_speed)?;
        ensure_positive("mass", self.mass)?;

        ensure_positive("life_min", self.life_min)?;
        ensure_positive("life_max", self.life_max)?;
        if self.life_min > self.life_max {
            return Err(ConfigError::InvertedRange {
                name: "life",
                min: self.life_min,
                max: self.life_max,
            });
        }
        ensure_non_negative("size_min", self.size_min)?;
        ensure_non_negative("size_max", self.size_max)?;
        if self.size_min > self.size_max {
            return Err(ConfigError::InvertedRange {
                name: "size",
                min: self.size_min,
                max: self.size_max,
            });
        }
        ensure_non_negative("fade_time", self.fade_time)?;
        ensure_finite("rotation_rate", self.rotation_rate)?;

        ensure_finite_vec("color_start", self.color_start.to_array())?;
        ensure_finite_vec("color_end", self.color_end.to_array())?;
        for w in self.kind_weights {
            ensure_non_negative("kind_weights", w)?;
        }
        Ok(())
    }
}
