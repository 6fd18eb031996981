//! Visual attributes derived from where a particle is in its life.
//!
//! All of these read the normalised lifetime `t = 1 - life / life_max`,
//! which runs from `0` at birth to `1` at death.

use glam::Vec4;

use crate::params::SimulationParams;
use crate::particle::Particle;

/// Hermite step between `edge0` and `edge1`, matching WGSL `smoothstep`.
#[inline]
pub fn smoothstep(edge0: f32, edge1: f32, x: f32) -> f32 {
    if edge1 <= edge0 {
        return if x < edge0 { 0.0 } else { 1.0 };
    }
    let t = ((x - edge0) / (edge1 - edge0)).clamp(0.0, 1.0);
    t * t * (3.0 - 2.0 * t)
}

/// Normalised lifetime in `[0, 1]`.
#[inline]
pub fn life_ratio(life: f32, life_max: f32) -> f32 {
    if life_max <= 0.0 {
        return 1.0;
    }
    (1.0 - life / life_max).clamp(0.0, 1.0)
}

/// Alpha window: fades in over `fade_time` after spawn and out over the last
/// `fade_time` seconds of life.
#[inline]
pub fn fade_window(age: f32, life: f32, fade_time: f32) -> f32 {
    smoothstep(0.0, fade_time, age) * smoothstep(0.0, fade_time, life)
}

/// Colour for normalised lifetime `t`, with alpha shaped by the fade window.
pub fn color_at(params: &SimulationParams, t: f32, age: f32, life: f32) -> Vec4 {
    let mut color = params.color_start.lerp(params.color_end, t);
    color.w *= fade_window(age, life, params.fade_time);
    color
}

/// Size for normalised lifetime `t`: `size_min` at birth and death,
/// `size_max` at mid-life.
#[inline]
pub fn size_at(params: &SimulationParams, t: f32) -> f32 {
    let shape = (t * std::f32::consts::PI).sin().max(0.0);
    params.size_min + (params.size_max - params.size_min) * shape
}

/// Refresh colour, size and rotation after a particle has moved.
pub fn apply_visuals(particle: &mut Particle, params: &SimulationParams, dt: f32) {
    let t = life_ratio(particle.life, params.life_max);
    particle.color = color_at(params, t, particle.age, particle.life);
    particle.size = size_at(params, t);
    particle.rotation += particle.velocity.length() * dt * params.rotation_rate;
}
