//! Point attractors and repulsors.
//!
//! Attractors are supplied fresh every frame by the caller (pointer position,
//! scripted hot spots) and read by the particle kernel. A negative strength
//! turns an attractor into a repulsor.

use glam::Vec3;

use crate::error::{ensure_finite, ensure_finite_vec, ensure_non_negative, ensure_positive, ConfigError};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Softening added to the squared distance so the force stays finite at the
/// attractor's centre.
pub const ATTRACTOR_SOFTENING: f32 = 0.01;

/// A point that pulls (or pushes) particles.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Attractor {
    /// World position.
    pub position: Vec3,
    /// Signed strength. Negative repels.
    pub strength: f32,
    /// Distance at which the pull has halved its near-field shape.
    pub radius: f32,
    /// Exponent shaping how quickly the pull fades past `radius`.
    pub falloff: f32,
}

impl Default for Attractor {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            strength: 1.0,
            radius: 5.0,
            falloff: 2.0,
        }
    }
}

impl Attractor {
    /// Attractor at `position` with the given strength and default shape.
    pub fn new(position: Vec3, strength: f32) -> Self {
        Self {
            position,
            strength,
            ..Default::default()
        }
    }

    /// Set the cutoff radius.
    pub fn with_radius(mut self, radius: f32) -> Self {
        self.radius = radius;
        self
    }

    /// Set the falloff exponent (clamped to be non-negative).
    pub fn with_falloff(mut self, falloff: f32) -> Self {
        self.falloff = falloff.max(0.0);
        self
    }

    /// Reject non-finite values, a non-positive radius or a negative falloff.
    pub fn validate(&self) -> Result<(), ConfigError> {
        ensure_finite_vec("attractor.position", self.position.to_array())?;
        ensure_finite("attractor.strength", self.strength)?;
        ensure_positive("attractor.radius", self.radius)?;
        ensure_non_negative("attractor.falloff", self.falloff)?;
        Ok(())
    }

    /// Force exerted on a particle at `point`.
    ///
    /// `dir * strength / (1 + (d / radius)^falloff) / (d² + ε)`: inverse
    /// square with a softened core and a smooth fade past `radius`. Zero at
    /// the attractor's exact position.
    #[inline]
    pub fn force_at(&self, point: Vec3) -> Vec3 {
        let to_attractor = self.position - point;
        let dist_sq = to_attractor.length_squared();
        let dist = dist_sq.sqrt();
        let shape = 1.0 + (dist / self.radius).powf(self.falloff);
        let magnitude = self.strength / shape / (dist_sq + ATTRACTOR_SOFTENING);
        to_attractor.normalize_or_zero() * magnitude
    }
}

/// Sum of every attractor's force at `point`.
pub fn total_force(attractors: &[Attractor], point: Vec3) -> Vec3 {
    attractors.iter().map(|a| a.force_at(point)).sum()
}
