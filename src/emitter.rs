//! Spherical volume emitter.
//!
//! Respawn is a pure function of `(slot index, time bucket)`: no RNG state is
//! shared between slots, so any dispatch order (threads, GPU lanes) produces
//! the same pool.
//!
//! Seed layout, relative to [`respawn_seed`]:
//!
//! | Offset | Use |
//! |--------|-----|
//! | 0..=2 | position inside the ball |
//! | 3..=4 | velocity direction |
//! | 5 | lifetime |
//! | 6 | kind (initial pool only) |

use glam::Vec3;

use crate::noise::{hash2, hash_u32, rand01, random_in_ball, random_unit_vector};
use crate::params::SimulationParams;
use crate::particle::{Particle, ParticleKind};

/// Time buckets per second used when seeding respawns.
pub const TIME_BUCKETS_PER_SECOND: f32 = 1000.0;

/// Salt mixed into the seed when choosing a slot's kind.
const KIND_SALT: u32 = 0x6b69_6e64;

/// Quantise elapsed time into the bucket used for seeding.
#[inline]
pub fn time_bucket(time: f32) -> u32 {
    (time.max(0.0) * TIME_BUCKETS_PER_SECOND) as u32
}

/// Seed for respawning slot `index` at `time`.
#[inline]
pub fn respawn_seed(index: u32, time: f32) -> u32 {
    hash2(index, time_bucket(time))
}

/// Where and how a particle starts a new life.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SpawnSample {
    /// Position inside the emitter sphere.
    pub position: Vec3,
    /// Initial velocity.
    pub velocity: Vec3,
    /// Lifetime in `[life_min, life_max]`.
    pub life: f32,
}

/// Sphere that particles are born in.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Emitter {
    /// Centre of the sphere.
    pub position: Vec3,
    /// Radius of the sphere.
    pub radius: f32,
    /// Speed of newborn particles, in a uniformly random direction.
    pub speed: f32,
    /// Shortest lifetime.
    pub life_min: f32,
    /// Longest lifetime.
    pub life_max: f32,
}

impl Emitter {
    /// The emitter described by a parameter block.
    pub fn from_params(params: &SimulationParams) -> Self {
        Self {
            position: params.emitter_position,
            radius: params.emitter_radius,
            speed: params.initial_speed,
            life_min: params.life_min,
            life_max: params.life_max,
        }
    }

    /// Draw a spawn sample from `seed`.
    pub fn sample(&self, seed: u32) -> SpawnSample {
        let position = self.position + random_in_ball(seed, self.radius);
        let velocity = random_unit_vector(seed.wrapping_add(3)) * self.speed;
        let t = rand01(seed.wrapping_add(5));
        let life = self.life_min + (self.life_max - self.life_min) * t;
        SpawnSample {
            position,
            velocity,
            life,
        }
    }
}

/// Restart `particle` in slot `index` at the current parameter time.
///
/// Position, velocity, life, colour, mass, age and rotation are reset. The
/// slot's kind survives.
pub fn respawn(particle: &mut Particle, index: u32, params: &SimulationParams) {
    let sample = Emitter::from_params(params).sample(respawn_seed(index, params.time));
    particle.position = sample.position;
    particle.velocity = sample.velocity;
    particle.life = sample.life;
    particle.age = 0.0;
    particle.mass = params.mass;
    particle.color = params.color_start;
    particle.size = params.size_min;
    particle.rotation = 0.0;
}

/// Kind assigned to slot `index` when a pool is built.
pub fn initial_kind(index: u32, params: &SimulationParams) -> ParticleKind {
    let u = rand01(hash2(index, KIND_SALT));
    ParticleKind::from_weights(params.kind_weights, u)
}

/// Fresh particle for slot `index` of a new pool.
///
/// With a positive `emit_rate`, the lifetime of slot `i` is capped at
/// `(i + 1) / emit_rate` so the first respawns trickle out at that rate
/// instead of the whole pool turning over at once.
pub fn initial_particle(index: u32, params: &SimulationParams) -> Particle {
    let seed = respawn_seed(index, 0.0).wrapping_add(hash_u32(index));
    let sample = Emitter::from_params(params).sample(seed);
    let life = if params.emit_rate > 0.0 {
        sample.life.min((index + 1) as f32 / params.emit_rate)
    } else {
        sample.life
    };
    Particle {
        position: sample.position,
        life,
        velocity: sample.velocity,
        mass: params.mass,
        color: params.color_start,
        size: params.size_min,
        rotation: 0.0,
        age: 0.0,
        kind: initial_kind(index, params),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // ========================================================================
    // Seeding
    // ========================================================================

    #[test]
    fn test_seed_depends_on_index_and_time() {
        assert_eq!(respawn_seed(3, 1.0), respawn_seed(3, 1.0));
        assert_ne!(respawn_seed(3, 1.0), respawn_seed(4, 1.0));
        assert_ne!(respawn_seed(3, 1.0), respawn_seed(3, 2.0));
    }

    #[test]
    fn test_time_bucket_quantises() {
        assert_eq!(time_bucket(0.0), 0);
        assert_eq!(time_bucket(1.0), 1000);
        assert_eq!(time_bucket(1.0004), 1000);
        assert_eq!(time_bucket(-5.0), 0);
    }

    // ========================================================================
    // Sampling
    // ========================================================================

    #[test]
    fn test_samples_inside_sphere_and_life_range() {
        let emitter = Emitter {
            position: Vec3::new(1.0, 2.0, 3.0),
            radius: 0.5,
            speed: 4.0,
            life_min: 1.0,
            life_max: 2.0,
        };
        for i in 0..2000 {
            let s = emitter.sample(respawn_seed(i, 0.25));
            assert!(s.position.distance(emitter.position) <= 0.5 + 1e-4);
            assert!((s.velocity.length() - 4.0).abs() < 1e-3);
            assert!((1.0..=2.0).contains(&s.life));
        }
    }

    #[test]
    fn test_respawn_keeps_kind() {
        let params = SimulationParams::default().with_life_range(1.0, 1.5);
        let mut p = Particle::default().with_kind(ParticleKind::Tracer);
        p.life = -0.1;
        p.age = 9.0;
        respawn(&mut p, 11, &params);
        assert_eq!(p.kind, ParticleKind::Tracer);
        assert_eq!(p.age, 0.0);
        assert_eq!(p.color, params.color_start);
        assert!((1.0..=1.5).contains(&p.life));
    }

    #[test]
    fn test_initial_pool_staggered_by_emit_rate() {
        let params = SimulationParams::default()
            .with_life_range(5.0, 5.0)
            .with_emit_rate(100.0);
        let first = initial_particle(0, &params);
        let later = initial_particle(999, &params);
        assert!((first.life - 0.01).abs() < 1e-6);
        assert_eq!(later.life, 5.0);
    }

    #[test]
    fn test_initial_kind_follows_weights() {
        let params = SimulationParams::default().with_kind_weights([0.0, 0.0, 1.0]);
        for i in 0..50 {
            assert_eq!(initial_kind(i, &params), ParticleKind::Tracer);
        }
        let mixed = SimulationParams::default().with_kind_weights([1.0, 1.0, 1.0]);
        let tracers = (0..3000)
            .filter(|i| initial_kind(*i, &mixed) == ParticleKind::Tracer)
            .count();
        assert!((800..1200).contains(&tracers), "got {} tracers", tracers);
    }
}
