//! GPU memory layouts.
//!
//! Plain `#[repr(C)]` mirrors of the CPU types, laid out to match the WGSL
//! structs in [`crate::gpu`] byte for byte. Every `vec3` is followed by a
//! scalar that fills its trailing four bytes, so the Rust and WGSL offsets
//! agree without hidden padding.

use bytemuck::{Pod, Zeroable};

use crate::attractor::Attractor;
use crate::params::SimulationParams;
use crate::particle::{Particle, ParticleKind};

/// One particle in the storage buffer (64 bytes).
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct ParticleGpu {
    /// xyz = position, w = life.
    pub position_life: [f32; 4],
    /// xyz = velocity, w = mass.
    pub velocity_mass: [f32; 4],
    /// RGBA.
    pub color: [f32; 4],
    /// x = size, y = rotation, z = age, w = kind tag.
    pub attributes: [f32; 4],
}

impl From<&Particle> for ParticleGpu {
    fn from(p: &Particle) -> Self {
        Self {
            position_life: p.position.extend(p.life).to_array(),
            velocity_mass: p.velocity.extend(p.mass).to_array(),
            color: p.color.to_array(),
            attributes: [p.size, p.rotation, p.age, p.kind.to_f32()],
        }
    }
}

impl From<ParticleGpu> for Particle {
    fn from(g: ParticleGpu) -> Self {
        let [px, py, pz, life] = g.position_life;
        let [vx, vy, vz, mass] = g.velocity_mass;
        let [size, rotation, age, kind] = g.attributes;
        Particle {
            position: glam::Vec3::new(px, py, pz),
            life,
            velocity: glam::Vec3::new(vx, vy, vz),
            mass,
            color: glam::Vec4::from_array(g.color),
            size,
            rotation,
            age,
            kind: ParticleKind::from_f32(kind),
        }
    }
}

/// One attractor in the storage buffer (32 bytes).
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct AttractorGpu {
    pub position: [f32; 3],
    pub strength: f32,
    pub radius: f32,
    pub falloff: f32,
    pub _pad: [f32; 2],
}

impl From<&Attractor> for AttractorGpu {
    fn from(a: &Attractor) -> Self {
        Self {
            position: a.position.to_array(),
            strength: a.strength,
            radius: a.radius,
            falloff: a.falloff,
            _pad: [0.0; 2],
        }
    }
}

/// Uniform block for the particle kernel (160 bytes).
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct SimulationParamsGpu {
    pub delta_time: f32,
    pub time: f32,
    pub particle_count: u32,
    pub attractor_count: u32,

    pub gravity: [f32; 3],
    pub damping: f32,

    pub turbulence_scale: f32,
    pub turbulence_strength: f32,
    pub turbulence_speed: f32,
    pub noise_octaves: u32,

    pub bounds: [f32; 3],
    pub restitution: f32,

    pub emitter_position: [f32; 3],
    pub emitter_radius: f32,

    pub emit_rate: f32,
    pub initial_speed: f32,
    pub life_min: f32,
    pub life_max: f32,

    pub size_min: f32,
    pub size_max: f32,
    pub fade_time: f32,
    pub rotation_rate: f32,

    pub color_start: [f32; 4],
    pub color_end: [f32; 4],

    pub mass: f32,
    pub _pad: [f32; 3],
}

impl SimulationParamsGpu {
    /// Pack a parameter snapshot for a dispatch over `attractor_count`
    /// attractors.
    pub fn new(params: &SimulationParams, attractor_count: u32) -> Self {
        Self {
            delta_time: params.delta_time,
            time: params.time,
            particle_count: params.particle_count,
            attractor_count,
            gravity: params.gravity.to_array(),
            damping: params.damping,
            turbulence_scale: params.turbulence_scale,
            turbulence_strength: params.turbulence_strength,
            turbulence_speed: params.turbulence_speed,
            noise_octaves: params.noise_octaves,
            bounds: params.bounds.to_array(),
            restitution: params.restitution,
            emitter_position: params.emitter_position.to_array(),
            emitter_radius: params.emitter_radius,
            emit_rate: params.emit_rate,
            initial_speed: params.initial_speed,
            life_min: params.life_min,
            life_max: params.life_max,
            size_min: params.size_min,
            size_max: params.size_max,
            fade_time: params.fade_time,
            rotation_rate: params.rotation_rate,
            color_start: params.color_start.to_array(),
            color_end: params.color_end.to_array(),
            mass: params.mass,
            _pad: [0.0; 3],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::{Vec3, Vec4};
    use std::mem::{offset_of, size_of};

    #[test]
    fn test_layout_sizes() {
        assert_eq!(size_of::<ParticleGpu>(), 64);
        assert_eq!(size_of::<AttractorGpu>(), 32);
        assert_eq!(size_of::<SimulationParamsGpu>(), 160);
    }

    #[test]
    fn test_params_offsets_match_wgsl() {
        assert_eq!(offset_of!(SimulationParamsGpu, gravity), 16);
        assert_eq!(offset_of!(SimulationParamsGpu, turbulence_scale), 32);
        assert_eq!(offset_of!(SimulationParamsGpu, bounds), 48);
        assert_eq!(offset_of!(SimulationParamsGpu, emitter_position), 64);
        assert_eq!(offset_of!(SimulationParamsGpu, emit_rate), 80);
        assert_eq!(offset_of!(SimulationParamsGpu, size_min), 96);
        assert_eq!(offset_of!(SimulationParamsGpu, color_start), 112);
        assert_eq!(offset_of!(SimulationParamsGpu, color_end), 128);
        assert_eq!(offset_of!(SimulationParamsGpu, mass), 144);
    }

    #[test]
    fn test_particle_round_trip_keeps_kind() {
        let mut p = Particle::new(Vec3::new(1.0, 2.0, 3.0), Vec3::new(-1.0, 0.5, 0.0), 2.5)
            .with_kind(ParticleKind::Buoyant)
            .with_mass(3.0);
        p.color = Vec4::new(0.2, 0.4, 0.6, 0.8);
        p.size = 0.3;
        p.rotation = 1.2;
        p.age = 0.7;
        assert_eq!(Particle::from(ParticleGpu::from(&p)), p);
    }

    #[test]
    fn test_params_pack() {
        let params = SimulationParams::new(77).snapshot(0.02, 1.5);
        let gpu = SimulationParamsGpu::new(&params, 3);
        assert_eq!(gpu.particle_count, 77);
        assert_eq!(gpu.attractor_count, 3);
        assert_eq!(gpu.delta_time, 0.02);
        assert_eq!(gpu.noise_octaves, params.noise_octaves);
        assert_eq!(bytemuck::bytes_of(&gpu).len(), 160);
    }
}
