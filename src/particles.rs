//! CPU particle kernel.
//!
//! [`step`] advances every slot of a pool independently, so it runs across
//! the rayon thread pool with no synchronisation. The same algorithm runs on
//! the GPU in [`crate::gpu::GpuParticleSimulator`].
//!
//! Per particle and per frame:
//!
//! 1. `life -= dt`, `age += dt`
//! 2. respawn in place when `life <= 0`, then keep integrating this frame
//! 3. force = gravity + attractors + curl turbulence, weighted by kind
//! 4. semi-implicit Euler with damping
//! 5. clamp to the box and bounce with `-restitution`
//! 6. colour, size and rotation from the normalised lifetime

use glam::Vec3;
use log::debug;
use rayon::prelude::*;

use crate::attractor::{total_force, Attractor};
use crate::emitter::{initial_particle, respawn};
use crate::error::{ensure_finite_vec, ConfigError};
use crate::lifecycle::apply_visuals;
use crate::noise::curl3_octaves;
use crate::params::{SimulationParams, MIN_MASS};
use crate::particle::Particle;
use crate::uniforms::ParticleGpu;

/// Advance one particle in slot `index` by `dt`.
///
/// `params.time` seeds respawns. Mass is floored to [`MIN_MASS`] before the
/// division; callers should still keep masses sensible.
pub fn step_particle(
    index: u32,
    particle: &mut Particle,
    attractors: &[Attractor],
    params: &SimulationParams,
    dt: f32,
) {
    particle.life = (particle.life - dt).min(params.life_max);
    particle.age += dt;

    if particle.life <= 0.0 {
        respawn(particle, index, params);
    }

    let kind = particle.kind;
    let mut force = params.gravity * kind.gravity_scale();
    if !attractors.is_empty() {
        force += total_force(attractors, particle.position) * kind.attractor_scale();
    }
    if params.turbulence_strength != 0.0 {
        let sample = particle.position * params.turbulence_scale
            + Vec3::splat(params.time * params.turbulence_speed);
        force += curl3_octaves(sample, params.noise_octaves)
            * params.turbulence_strength
            * kind.turbulence_scale();
    }

    let mass = particle.mass.max(MIN_MASS);
    particle.velocity += force / mass * dt;
    particle.velocity *= params.damping;
    particle.position += particle.velocity * dt;

    collide_with_bounds(particle, params.bounds, params.restitution);
    apply_visuals(particle, params, dt);
}

/// Clamp each axis into `[-bounds, bounds]`, reflecting the velocity
/// component that crossed the wall.
#[inline]
pub fn collide_with_bounds(particle: &mut Particle, bounds: Vec3, restitution: f32) {
    for axis in 0..3 {
        let b = bounds[axis];
        let pos = particle.position[axis];
        if pos < -b {
            particle.position[axis] = -b;
            particle.velocity[axis] *= -restitution;
        } else if pos > b {
            particle.position[axis] = b;
            particle.velocity[axis] *= -restitution;
        }
    }
}

/// Advance a whole pool by `dt` in parallel.
///
/// The slot index doubles as the particle's identity for respawn seeding.
pub fn step(
    particles: &mut [Particle],
    attractors: &[Attractor],
    params: &SimulationParams,
    dt: f32,
) {
    particles
        .par_iter_mut()
        .enumerate()
        .for_each(|(index, particle)| {
            step_particle(index as u32, particle, attractors, params, dt);
        });
}

/// Owns a fixed-size particle pool.
///
/// The pool never grows or shrinks after construction; dead particles are
/// recycled in their own slot.
#[derive(Debug, Clone)]
pub struct ParticleSimulator {
    particles: Vec<Particle>,
}

impl ParticleSimulator {
    /// Build a pool of `params.particle_count` particles around the emitter.
    ///
    /// # Errors
    ///
    /// Returns the first parameter that fails [`SimulationParams::validate`].
    pub fn new(params: &SimulationParams) -> Result<Self, ConfigError> {
        params.validate()?;
        let particles = (0..params.particle_count)
            .into_par_iter()
            .map(|i| initial_particle(i, params))
            .collect();
        debug!(
            "particle pool: {} slots, emitter r={} at {:?}",
            params.particle_count, params.emitter_radius, params.emitter_position
        );
        Ok(Self { particles })
    }

    /// Adopt a caller-built pool.
    ///
    /// # Errors
    ///
    /// Rejects an empty pool, non-positive masses and non-finite state.
    pub fn from_particles(particles: Vec<Particle>) -> Result<Self, ConfigError> {
        if particles.is_empty() {
            return Err(ConfigError::NoParticles);
        }
        for p in &particles {
            ensure_finite_vec("particle.position", p.position.to_array())?;
            ensure_finite_vec("particle.velocity", p.velocity.to_array())?;
            if p.mass.is_nan() || p.mass <= 0.0 {
                return Err(ConfigError::NonPositive {
                    name: "particle.mass",
                    value: p.mass,
                });
            }
        }
        Ok(Self { particles })
    }

    /// Advance every particle by `dt`.
    pub fn step(&mut self, attractors: &[Attractor], params: &SimulationParams, dt: f32) {
        step(&mut self.particles, attractors, params, dt);
    }

    /// Rebuild the pool from `params`, discarding all particle state.
    pub fn reset(&mut self, params: &SimulationParams) -> Result<(), ConfigError> {
        *self = Self::new(params)?;
        Ok(())
    }

    /// Current particles, indexed by slot.
    pub fn particles(&self) -> &[Particle] {
        &self.particles
    }

    /// Mutable access to the pool, e.g. to seed a scripted state.
    pub fn particles_mut(&mut self) -> &mut [Particle] {
        &mut self.particles
    }

    /// Number of slots.
    pub fn len(&self) -> usize {
        self.particles.len()
    }

    /// Always false; a pool has at least one slot.
    pub fn is_empty(&self) -> bool {
        self.particles.is_empty()
    }

    /// Pool in the GPU storage layout, ready to upload.
    pub fn to_gpu(&self) -> Vec<ParticleGpu> {
        self.particles.iter().map(ParticleGpu::from).collect()
    }

    /// Slot indices sorted back to front as seen from `camera`, for alpha
    /// blending.
    pub fn depth_order(&self, camera: Vec3) -> Vec<u32> {
        let mut keyed: Vec<(f32, u32)> = self
            .particles
            .iter()
            .enumerate()
            .map(|(i, p)| (p.position.distance_squared(camera), i as u32))
            .collect();
        keyed.par_sort_unstable_by(|a, b| b.0.total_cmp(&a.0).then(a.1.cmp(&b.1)));
        keyed.into_iter().map(|(_, i)| i).collect()
    }
}
