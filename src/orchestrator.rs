//! Frame orchestration.
//!
//! [`SimulationOrchestrator`] owns every subsystem and is the only writer of
//! their parameters. Each frame it snapshots [`SimulationParams`] with the
//! frame's `dt` and elapsed time, then advances the particle pool and the
//! fluid concurrently; the two share nothing mutable. The fluid is driven
//! pass by pass: each pass writes the back buffers and the orchestrator
//! swaps them before the next one. A zero-length frame (paused clock)
//! counts the frame and touches nothing. Ray-marched frames are rendered on
//! demand from the current scene time.
//!
//! Elapsed time is kept in `f64`. Kernels see it wrapped to
//! [`TIME_WRAP_PERIOD`] so `f32` keeps sub-millisecond resolution however
//! long the background runs.
//!
//! ```
//! use backdrop::prelude::*;
//!
//! let config = OrchestratorConfig {
//!     particles: SimulationParams::new(256),
//!     fluid: FluidConfig::new(32, 32),
//!     ..Default::default()
//! };
//! let mut sim = SimulationOrchestrator::new(config).unwrap();
//! sim.set_attractors(vec![Attractor::new(Vec3::ZERO, 2.0)]).unwrap();
//! for _ in 0..10 {
//!     sim.advance(1.0 / 60.0);
//! }
//! assert_eq!(sim.particles().len(), 256);
//! assert_eq!(sim.frame(), 10);
//! ```

use log::{debug, info};

use crate::attractor::Attractor;
use crate::error::{ensure_positive, ConfigError};
use crate::fluid::{FluidConfig, FluidPass, FluidSolver, FluidTexture, Impulse};
use crate::params::SimulationParams;
use crate::particle::Particle;
use crate::particles::ParticleSimulator;
use crate::raymarch::{Camera, ColorBuffer, RayMarcher};
use crate::scene::{OrbitalScene, SdfScene};
use crate::time::{FrameClock, DEFAULT_MAX_DELTA};
use crate::uniforms::ParticleGpu;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Period, in seconds, of the time handed to kernels and scenes.
pub const TIME_WRAP_PERIOD: f64 = 4096.0;

/// Run one fluid pass and commit it by swapping the buffers it wrote.
fn commit_fluid_pass(fluid: &mut FluidSolver, pass: FluidPass, dt: f32) {
    fluid.compute_pass(pass, dt);
    for &field in pass.writes() {
        fluid.swap(field);
    }
}

/// Everything the orchestrator is configured with.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct OrchestratorConfig {
    pub particles: SimulationParams,
    pub fluid: FluidConfig,
    pub marcher: RayMarcher,
    pub scene: OrbitalScene,
    /// Largest frame delta accepted by [`SimulationOrchestrator::tick`].
    pub max_delta: f32,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            particles: SimulationParams::default(),
            fluid: FluidConfig::default(),
            marcher: RayMarcher::default(),
            scene: OrbitalScene::default(),
            max_delta: DEFAULT_MAX_DELTA,
        }
    }
}

impl OrchestratorConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.particles.validate()?;
        self.fluid.validate()?;
        self.marcher.validate()?;
        self.scene.validate()?;
        ensure_positive("max_delta", self.max_delta)?;
        Ok(())
    }
}

/// Owns and advances the particle pool, the fluid and the SDF scene.
pub struct SimulationOrchestrator {
    params: SimulationParams,
    particles: ParticleSimulator,
    fluid: FluidSolver,
    marcher: RayMarcher,
    scene: Box<dyn SdfScene>,
    attractors: Vec<Attractor>,
    clock: FrameClock,
    time: f64,
    frame: u64,
}

impl SimulationOrchestrator {
    /// Validate `config` and build every subsystem.
    ///
    /// # Errors
    ///
    /// The first validation failure; no subsystem is built in that case.
    pub fn new(config: OrchestratorConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let OrchestratorConfig {
            particles: params,
            fluid,
            marcher,
            scene,
            max_delta,
        } = config;

        let particles = ParticleSimulator::new(&params)?;
        let fluid = FluidSolver::new(fluid)?;
        info!(
            "orchestrator ready: {} particles, {}x{} fluid grid",
            particles.len(),
            fluid.width(),
            fluid.height()
        );

        Ok(Self {
            params,
            particles,
            fluid,
            marcher,
            scene: Box::new(scene),
            attractors: Vec::new(),
            clock: FrameClock::new().with_max_delta(max_delta),
            time: 0.0,
            frame: 0,
        })
    }

    /// Replace the rendered scene.
    pub fn with_scene(mut self, scene: impl SdfScene + 'static) -> Self {
        self.scene = Box::new(scene);
        self
    }

    // ========================================================================
    // Frame loop
    // ========================================================================

    /// Measure the wall-clock interval and advance by it. Returns the delta
    /// used.
    pub fn tick(&mut self) -> f32 {
        let (_, dt) = self.clock.tick();
        self.advance(dt);
        dt
    }

    /// Advance particles and fluid by `dt` seconds.
    ///
    /// Negative and non-finite deltas are treated as zero. A zero delta
    /// counts the frame but dispatches nothing, so queued impulses wait for
    /// the next real frame.
    pub fn advance(&mut self, dt: f32) {
        let dt = if dt.is_finite() { dt.max(0.0) } else { 0.0 };
        self.frame += 1;
        if dt == 0.0 {
            return;
        }

        let snapshot = self.params.snapshot(dt, self.kernel_time());
        let passes = self.fluid.pass_sequence();

        let particles = &mut self.particles;
        let fluid = &mut self.fluid;
        let attractors = self.attractors.as_slice();
        rayon::join(
            || particles.step(attractors, &snapshot, dt),
            || {
                for &pass in &passes {
                    commit_fluid_pass(fluid, pass, dt);
                }
            },
        );

        self.time += f64::from(dt);
    }

    /// Run a single fluid pass outside the frame loop and swap the buffers
    /// it wrote.
    pub fn run_fluid_pass(&mut self, pass: FluidPass, dt: f32) {
        commit_fluid_pass(&mut self.fluid, pass, dt);
    }

    // ========================================================================
    // Inputs
    // ========================================================================

    /// Attractors used from the next frame on.
    pub fn set_attractors(&mut self, attractors: Vec<Attractor>) -> Result<(), ConfigError> {
        for attractor in &attractors {
            attractor.validate()?;
        }
        self.attractors = attractors;
        Ok(())
    }

    /// Queue a fluid splat for the next frame.
    pub fn push_impulse(&mut self, impulse: Impulse) {
        self.fluid.push_impulse(impulse);
    }

    /// Replace particle parameters. A different pool size rebuilds the pool.
    pub fn update_params(&mut self, params: SimulationParams) -> Result<(), ConfigError> {
        params.validate()?;
        if params.particle_count != self.params.particle_count {
            debug!(
                "particle count {} -> {}, rebuilding pool",
                self.params.particle_count, params.particle_count
            );
            self.particles.reset(&params)?;
        }
        self.params = params;
        Ok(())
    }

    /// Replace fluid tuning. The grid size cannot change.
    pub fn update_fluid(&mut self, config: FluidConfig) -> Result<(), ConfigError> {
        self.fluid.set_config(config)
    }

    /// Replace ray-marching settings and shading.
    pub fn update_marcher(&mut self, marcher: RayMarcher) -> Result<(), ConfigError> {
        marcher.validate()?;
        self.marcher = marcher;
        Ok(())
    }

    /// Re-initialise every buffer and restart time at zero.
    pub fn reset(&mut self) -> Result<(), ConfigError> {
        self.particles.reset(&self.params)?;
        self.fluid.reset();
        self.clock.reset();
        self.time = 0.0;
        self.frame = 0;
        info!("simulation reset");
        Ok(())
    }

    /// Frame clock, for pause and time scale.
    pub fn clock_mut(&mut self) -> &mut FrameClock {
        &mut self.clock
    }

    // ========================================================================
    // Outputs
    // ========================================================================

    /// Ray-march the scene at the current time.
    pub fn render(&self, camera: &Camera, width: u32, height: u32) -> Result<ColorBuffer, ConfigError> {
        self.render_at(self.kernel_time(), camera, width, height)
    }

    /// Ray-march the scene at an arbitrary time.
    pub fn render_at(
        &self,
        time: f32,
        camera: &Camera,
        width: u32,
        height: u32,
    ) -> Result<ColorBuffer, ConfigError> {
        self.marcher
            .render(self.scene.as_ref(), time, camera, width, height)
    }

    /// Particle pool, indexed by slot.
    pub fn particles(&self) -> &[Particle] {
        self.particles.particles()
    }

    /// Particle pool in the GPU storage layout.
    pub fn particle_gpu_buffer(&self) -> Vec<ParticleGpu> {
        self.particles.to_gpu()
    }

    /// Fluid density and velocity packed for display.
    pub fn fluid_texture(&self) -> FluidTexture {
        self.fluid.texture()
    }

    pub fn fluid(&self) -> &FluidSolver {
        &self.fluid
    }

    pub fn params(&self) -> &SimulationParams {
        &self.params
    }

    pub fn attractors(&self) -> &[Attractor] {
        &self.attractors
    }

    /// Simulation seconds since start or the last reset.
    pub fn time(&self) -> f64 {
        self.time
    }

    /// Elapsed time as seen by the kernels and the scene: wrapped to
    /// [`TIME_WRAP_PERIOD`] and narrowed to `f32`.
    pub fn kernel_time(&self) -> f32 {
        (self.time % TIME_WRAP_PERIOD) as f32
    }

    /// Frames advanced since start or the last reset.
    pub fn frame(&self) -> u64 {
        self.frame
    }
}
