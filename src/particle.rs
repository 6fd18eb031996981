//! The particle record and its behaviour variants.

use glam::{Vec3, Vec4};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Behaviour variant of a particle slot.
///
/// The kind decides which forces act on a particle. It belongs to the slot,
/// not to a single life, so respawning keeps it.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum ParticleKind {
    /// Gravity, attractors and turbulence.
    #[default]
    Standard,
    /// Rises against gravity; attractors and turbulence as usual.
    Buoyant,
    /// Carried only by turbulence, at double weight. Ignores gravity and attractors.
    Tracer,
}

impl ParticleKind {
    /// All kinds, in encoding order.
    pub const ALL: [ParticleKind; 3] = [Self::Standard, Self::Buoyant, Self::Tracer];

    /// Multiplier applied to gravity.
    pub fn gravity_scale(self) -> f32 {
        match self {
            Self::Standard => 1.0,
            Self::Buoyant => -1.0,
            Self::Tracer => 0.0,
        }
    }

    /// Multiplier applied to the summed attractor force.
    pub fn attractor_scale(self) -> f32 {
        match self {
            Self::Standard | Self::Buoyant => 1.0,
            Self::Tracer => 0.0,
        }
    }

    /// Multiplier applied to curl turbulence.
    pub fn turbulence_scale(self) -> f32 {
        match self {
            Self::Standard | Self::Buoyant => 1.0,
            Self::Tracer => 2.0,
        }
    }

    /// Float tag stored in the GPU layout.
    pub fn to_f32(self) -> f32 {
        match self {
            Self::Standard => 0.0,
            Self::Buoyant => 1.0,
            Self::Tracer => 2.0,
        }
    }

    /// Decode a GPU float tag. Unknown tags fall back to `Standard`.
    pub fn from_f32(tag: f32) -> Self {
        match tag.round() as i32 {
            1 => Self::Buoyant,
            2 => Self::Tracer,
            _ => Self::Standard,
        }
    }

    /// Pick a kind from relative `weights` (`[standard, buoyant, tracer]`)
    /// using `u` in `[0, 1)`. All-zero weights yield `Standard`.
    pub fn from_weights(weights: [f32; 3], u: f32) -> Self {
        let total: f32 = weights.iter().map(|w| w.max(0.0)).sum();
        if total <= 0.0 {
            return Self::Standard;
        }
        let mut threshold = u * total;
        for (kind, w) in Self::ALL.iter().zip(weights) {
            let w = w.max(0.0);
            if threshold < w {
                return *kind;
            }
            threshold -= w;
        }
        // Rounding can leave a sliver past the last bucket.
        Self::ALL
            .iter()
            .zip(weights)
            .rev()
            .find(|(_, w)| *w > 0.0)
            .map(|(k, _)| *k)
            .unwrap_or_default()
    }
}

/// A single simulated particle.
///
/// Identity is the slot index in the owning pool. `life` counts down in
/// seconds; reaching zero respawns the particle in place.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Particle {
    /// World position.
    pub position: Vec3,
    /// Seconds remaining.
    pub life: f32,
    /// World velocity.
    pub velocity: Vec3,
    /// Mass used for `force / mass`.
    pub mass: f32,
    /// RGBA colour, interpolated over the lifetime.
    pub color: Vec4,
    /// Visual size.
    pub size: f32,
    /// Accumulated rotation in radians.
    pub rotation: f32,
    /// Seconds since the last (re)spawn.
    pub age: f32,
    /// Behaviour variant.
    pub kind: ParticleKind,
}

impl Default for Particle {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            life: 0.0,
            velocity: Vec3::ZERO,
            mass: 1.0,
            color: Vec4::ONE,
            size: 1.0,
            rotation: 0.0,
            age: 0.0,
            kind: ParticleKind::Standard,
        }
    }
}

impl Particle {
    /// Particle at `position` moving with `velocity`, living `life` seconds.
    pub fn new(position: Vec3, velocity: Vec3, life: f32) -> Self {
        Self {
            position,
            velocity,
            life,
            ..Default::default()
        }
    }

    /// Set the mass.
    pub fn with_mass(mut self, mass: f32) -> Self {
        self.mass = mass;
        self
    }

    /// Set the behaviour variant.
    pub fn with_kind(mut self, kind: ParticleKind) -> Self {
        self.kind = kind;
        self
    }

    /// Whether the particle will respawn on its next step.
    #[inline]
    pub fn is_expired(&self) -> bool {
        self.life <= 0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_tag_round_trips() {
        for kind in ParticleKind::ALL {
            assert_eq!(ParticleKind::from_f32(kind.to_f32()), kind);
        }
        assert_eq!(ParticleKind::from_f32(17.0), ParticleKind::Standard);
    }

    #[test]
    fn test_kind_force_weights() {
        assert_eq!(ParticleKind::Buoyant.gravity_scale(), -1.0);
        assert_eq!(ParticleKind::Tracer.gravity_scale(), 0.0);
        assert_eq!(ParticleKind::Tracer.attractor_scale(), 0.0);
        assert_eq!(ParticleKind::Standard.turbulence_scale(), 1.0);
        assert_eq!(ParticleKind::Tracer.turbulence_scale(), 2.0);
    }

    #[test]
    fn test_kind_from_weights() {
        let w = [1.0, 1.0, 2.0];
        assert_eq!(ParticleKind::from_weights(w, 0.0), ParticleKind::Standard);
        assert_eq!(ParticleKind::from_weights(w, 0.3), ParticleKind::Buoyant);
        assert_eq!(ParticleKind::from_weights(w, 0.6), ParticleKind::Tracer);
        assert_eq!(ParticleKind::from_weights(w, 0.9999), ParticleKind::Tracer);
        assert_eq!(
            ParticleKind::from_weights([0.0, 0.0, 0.0], 0.5),
            ParticleKind::Standard
        );
        assert_eq!(
            ParticleKind::from_weights([0.0, 3.0, 0.0], 0.99),
            ParticleKind::Buoyant
        );
    }

    #[test]
    fn test_particle_builder() {
        let p = Particle::new(Vec3::ONE, Vec3::Y, 5.0)
            .with_mass(2.0)
            .with_kind(ParticleKind::Tracer);
        assert_eq!(p.mass, 2.0);
        assert_eq!(p.kind, ParticleKind::Tracer);
        assert!(!p.is_expired());
    }
}
