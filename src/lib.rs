//! # backdrop
//!
//! Animated backgrounds for dashboards and status pages: a particle system,
//! a 2D fluid and a ray-marched SDF scene, stepped together once per frame.
//!
//! The host drives everything through [`SimulationOrchestrator`]. It owns the
//! three subsystems, advances them with one clamped time step, and hands back
//! data ready for upload: a packed particle buffer, an RGBA float texture of
//! the fluid and a ray-marched color buffer.
//!
//! ## Quick Start
//!
//! ```no_run
//! use backdrop::prelude::*;
//!
//! let config = OrchestratorConfig {
//!     particles: SimulationParams::default().with_particle_count(2_000),
//!     fluid: FluidConfig::new(64, 64),
//!     ..Default::default()
//! };
//! let mut sim = SimulationOrchestrator::new(config)?;
//! sim.set_attractors(vec![Attractor::new(Vec3::ZERO, 4.0)])?;
//!
//! loop {
//!     sim.tick();
//!     let particles = sim.particle_gpu_buffer();
//!     let fluid = sim.fluid_texture();
//!     let frame = sim.render(&Camera::default(), 320, 180)?;
//!     // upload `particles`, `fluid` and `frame` to the compositor
//! #   let _ = (particles, fluid, frame);
//! #   break;
//! }
//! # Ok::<(), backdrop::ConfigError>(())
//! ```
//!
//! ## Subsystems
//!
//! ### Particles
//!
//! [`ParticleSimulator`] integrates attractor pull, gravity, damping and
//! curl-noise turbulence, bounces particles off an axis-aligned box and
//! respawns them deterministically from an [`Emitter`] when their life runs
//! out. Every particle is independent, so a step runs across all cores. The
//! same kernel is available as WGSL through [`gpu::GpuParticleSimulator`].
//!
//! ### Fluid
//!
//! [`FluidSolver`] is a stable-fluids solver on a collocated grid:
//! semi-Lagrangian advection, optional viscous diffusion, vorticity
//! confinement and a Jacobi pressure projection, all double buffered.
//!
//! ### Ray marching
//!
//! [`RayMarcher`] sphere-traces any [`SdfScene`] from a [`Camera`] and
//! shades hits with point lights, rim light and distance fog.
//! [`OrbitalScene`] is the built-in animated scene.
//!
//! ## Feature flags
//!
//! - `serde`: `Serialize`/`Deserialize` on every configuration type.

pub mod attractor;
pub mod buffer;
pub mod emitter;
pub mod error;
pub mod fluid;
pub mod gpu;
pub mod lifecycle;
pub mod noise;
pub mod orchestrator;
pub mod params;
pub mod particle;
pub mod particles;
pub mod raymarch;
pub mod scene;
pub mod sdf;
pub mod shader_utils;
pub mod time;
pub mod uniforms;

pub use bytemuck;
pub use glam;
pub use glam::{Quat, Vec2, Vec3, Vec4};

pub use attractor::Attractor;
pub use emitter::Emitter;
pub use error::{ConfigError, ExportError, GpuError};
pub use fluid::{
    BoundaryCondition, FluidConfig, FluidField, FluidPass, FluidSolver, FluidTexture, Impulse,
};
pub use orchestrator::{OrchestratorConfig, SimulationOrchestrator};
pub use params::SimulationParams;
pub use particle::{Particle, ParticleKind};
pub use particles::ParticleSimulator;
pub use raymarch::{Camera, ColorBuffer, MarchSettings, PointLight, RayMarcher, Shading};
pub use scene::{OrbitalScene, SdfScene};
pub use sdf::Sdf;
pub use time::FrameClock;
pub use uniforms::ParticleGpu;

/// Convenient re-exports for common usage.
///
/// ```
/// use backdrop::prelude::*;
/// ```
pub mod prelude {
    pub use crate::attractor::Attractor;
    pub use crate::emitter::Emitter;
    pub use crate::error::{ConfigError, ExportError, GpuError};
    pub use crate::fluid::{BoundaryCondition, FluidConfig, FluidSolver, Impulse};
    pub use crate::orchestrator::{OrchestratorConfig, SimulationOrchestrator};
    pub use crate::params::SimulationParams;
    pub use crate::particle::{Particle, ParticleKind};
    pub use crate::particles::ParticleSimulator;
    pub use crate::raymarch::{Camera, RayMarcher, Shading};
    pub use crate::scene::{OrbitalScene, SdfScene};
    pub use crate::sdf::Sdf;
    pub use crate::time::FrameClock;
    pub use glam::{Quat, Vec2, Vec3, Vec4};
}
