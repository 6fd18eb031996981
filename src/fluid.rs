//! 2D Eulerian fluid solver.
//!
//! A stable-fluids style solver on a fixed `width × height` grid. Velocity,
//! pressure and dye live in [`PingPong`] buffers; every pass reads the
//! current side and writes the other. [`FluidSolver::compute_pass`] leaves
//! its output on the write side until [`FluidSolver::swap`] commits it, and
//! [`FluidSolver::run_pass`] does both. Vorticity and divergence are single
//! scratch fields written by one pass and read by the next.
//!
//! One [`FluidSolver::step`] runs, in order:
//!
//! | Pass | Effect |
//! |------|--------|
//! | [`FluidPass::Boundary`] | set the border ring from the interior |
//! | [`FluidPass::AdvectVelocity`] | semi-Lagrangian backtrace + dissipation |
//! | [`FluidPass::AdvectDye`] | same, through the advected velocity |
//! | [`FluidPass::Diffuse`] × n | one Jacobi sweep each (skipped when inviscid) |
//! | [`FluidPass::ComputeVorticity`] | scalar curl |
//! | [`FluidPass::ConfineVorticity`] | re-inject small-scale swirl |
//! | [`FluidPass::Boundary`] | border again before projection |
//! | [`FluidPass::ComputeDivergence`] | |
//! | [`FluidPass::PressureSweep`] × m | Jacobi sweeps of `∇²p = div` |
//! | [`FluidPass::SubtractGradient`] | `v -= ∇p` |
//! | [`FluidPass::Impulse`] | queued external splats |
//!
//! Grid coordinates are in cells, `x` to the right and `y` up; velocity is in
//! cells per second.
//!
//! ```
//! use backdrop::fluid::{FluidConfig, FluidSolver, Impulse};
//! use glam::{Vec2, Vec4};
//!
//! let mut fluid = FluidSolver::new(FluidConfig::new(32, 32)).unwrap();
//! fluid.push_impulse(Impulse::new(Vec2::new(16.0, 16.0), Vec2::new(20.0, 0.0), Vec4::ONE, 4.0));
//! fluid.step(1.0 / 60.0);
//! assert!(fluid.total_dye() > 0.0);
//! ```

use std::ops::{Add, Mul};
use std::path::Path;

use glam::{Vec2, Vec4};
use log::debug;
use rayon::prelude::*;

use crate::buffer::PingPong;
use crate::error::{ensure_non_negative, ensure_positive, ConfigError, ExportError};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Smallest grid extent per axis. Anything smaller has no room for a
/// confined interior.
pub const MIN_GRID_SIZE: usize = 4;

const GRADIENT_EPSILON: f32 = 1e-5;

/// What the outermost ring of velocity cells does.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum BoundaryCondition {
    /// Walls are sticky: the border cell cancels the adjacent velocity.
    #[default]
    NoSlip,
    /// Walls are slippery: only the wall-normal component is cancelled.
    FreeSlip,
}

/// Fluid solver configuration.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct FluidConfig {
    /// Cells along x, border included.
    pub width: usize,
    /// Cells along y, border included.
    pub height: usize,
    /// Kinematic viscosity. `0.0` skips diffusion entirely.
    pub viscosity: f32,
    /// Velocity decay rate per second.
    pub velocity_dissipation: f32,
    /// Dye decay rate per second.
    pub dye_dissipation: f32,
    /// Vorticity confinement strength.
    pub vorticity_strength: f32,
    /// Jacobi sweeps of the diffusion solve per step.
    pub diffusion_iterations: u32,
    /// Jacobi sweeps of the pressure solve per step.
    pub pressure_iterations: u32,
    /// Wall behaviour.
    pub boundary: BoundaryCondition,
    /// Velocity magnitude cap applied where energy is injected.
    pub max_velocity: f32,
}

impl Default for FluidConfig {
    fn default() -> Self {
        Self {
            width: 128,
            height: 128,
            viscosity: 0.0,
            velocity_dissipation: 0.2,
            dye_dissipation: 0.1,
            vorticity_strength: 30.0,
            diffusion_iterations: 4,
            pressure_iterations: 20,
            boundary: BoundaryCondition::NoSlip,
            max_velocity: 1000.0,
        }
    }
}

impl FluidConfig {
    /// Default tuning on a `width × height` grid.
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            ..Default::default()
        }
    }

    /// Set viscosity (clamped to be non-negative).
    pub fn with_viscosity(mut self, viscosity: f32) -> Self {
        self.viscosity = viscosity.max(0.0);
        self
    }

    /// Set velocity and dye dissipation rates.
    pub fn with_dissipation(mut self, velocity: f32, dye: f32) -> Self {
        self.velocity_dissipation = velocity.max(0.0);
        self.dye_dissipation = dye.max(0.0);
        self
    }

    /// Set vorticity confinement strength.
    pub fn with_vorticity(mut self, strength: f32) -> Self {
        self.vorticity_strength = strength.max(0.0);
        self
    }

    /// Set Jacobi sweep counts for diffusion and pressure.
    pub fn with_iterations(mut self, diffusion: u32, pressure: u32) -> Self {
        self.diffusion_iterations = diffusion;
        self.pressure_iterations = pressure;
        self
    }

    /// Set the wall behaviour.
    pub fn with_boundary(mut self, boundary: BoundaryCondition) -> Self {
        self.boundary = boundary;
        self
    }

    /// Check the grid size and every rate.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.width < MIN_GRID_SIZE || self.height < MIN_GRID_SIZE {
            return Err(ConfigError::GridTooSmall {
                width: self.width,
                height: self.height,
                min: MIN_GRID_SIZE,
            });
        }
        ensure_non_negative("viscosity", self.viscosity)?;
        ensure_non_negative("velocity_dissipation", self.velocity_dissipation)?;
        ensure_non_negative("dye_dissipation", self.dye_dissipation)?;
        ensure_non_negative("vorticity_strength", self.vorticity_strength)?;
        ensure_positive("max_velocity", self.max_velocity)?;
        Ok(())
    }

    /// Cells in the grid.
    pub fn cell_count(&self) -> usize {
        self.width * self.height
    }
}

/// A Gaussian splat of velocity and dye.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Impulse {
    /// Centre, in cells.
    pub position: Vec2,
    /// Velocity added at the centre, in cells per second.
    pub velocity: Vec2,
    /// Dye added at the centre.
    pub dye: Vec4,
    /// Cutoff radius, in cells.
    pub radius: f32,
}

impl Impulse {
    /// Splat at `position` with the given velocity, dye and radius.
    pub fn new(position: Vec2, velocity: Vec2, dye: Vec4, radius: f32) -> Self {
        Self {
            position,
            velocity,
            dye,
            radius,
        }
    }

    /// Gaussian weight at `cell`: `exp(-d² / (r² / 2))` inside the radius,
    /// zero outside.
    #[inline]
    pub fn weight_at(&self, cell: Vec2) -> f32 {
        let d = cell.distance(self.position);
        if self.radius <= 0.0 || d >= self.radius {
            return 0.0;
        }
        (-d * d / (self.radius * self.radius * 0.5)).exp()
    }
}

/// One pass of the solver.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FluidPass {
    Boundary,
    AdvectVelocity,
    AdvectDye,
    Diffuse,
    ComputeVorticity,
    ConfineVorticity,
    ComputeDivergence,
    PressureSweep,
    SubtractGradient,
    Impulse,
}

/// A double-buffered field of the solver.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FluidField {
    Velocity,
    Pressure,
    Dye,
}

impl FluidPass {
    /// Double-buffered fields this pass writes, and so must swap.
    pub fn writes(self) -> &'static [FluidField] {
        match self {
            Self::Boundary | Self::Impulse => &[FluidField::Velocity, FluidField::Dye],
            Self::AdvectVelocity
            | Self::Diffuse
            | Self::ConfineVorticity
            | Self::SubtractGradient => &[FluidField::Velocity],
            Self::AdvectDye => &[FluidField::Dye],
            Self::PressureSweep => &[FluidField::Pressure],
            Self::ComputeVorticity | Self::ComputeDivergence => &[],
        }
    }
}

/// Fluid state packed for display: per cell `[density, vx, vy, 0]`.
#[derive(Clone, Debug, PartialEq)]
pub struct FluidTexture {
    pub width: usize,
    pub height: usize,
    /// Row-major, row 0 at the bottom of the grid.
    pub texels: Vec<[f32; 4]>,
}

impl FluidTexture {
    /// Texel at `(x, y)`.
    pub fn get(&self, x: usize, y: usize) -> [f32; 4] {
        self.texels[y * self.width + x]
    }

    /// Raw bytes for a `Rgba32Float` texture upload.
    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.texels)
    }
}

/// Reinhard tone map followed by gamma 2.2, to an 8-bit channel.
#[inline]
fn display_channel(c: f32) -> u8 {
    let c = c.max(0.0);
    let mapped = (c / (1.0 + c)).powf(1.0 / 2.2);
    (mapped * 255.0 + 0.5) as u8
}

fn luminance(dye: Vec4) -> f32 {
    0.2126 * dye.x + 0.7152 * dye.y + 0.0722 * dye.z
}

fn sample_bilinear<T>(field: &[T], width: usize, height: usize, pos: Vec2) -> T
where
    T: Copy + Add<Output = T> + Mul<f32, Output = T>,
{
    let p = pos.clamp(
        Vec2::splat(0.5),
        Vec2::new(width as f32 - 1.5, height as f32 - 1.5),
    );
    let x0 = p.x.floor() as usize;
    let y0 = p.y.floor() as usize;
    let x1 = (x0 + 1).min(width - 1);
    let y1 = (y0 + 1).min(height - 1);
    let fx = p.x - x0 as f32;
    let fy = p.y - y0 as f32;

    let bottom = field[y0 * width + x0] * (1.0 - fx) + field[y0 * width + x1] * fx;
    let top = field[y1 * width + x0] * (1.0 - fx) + field[y1 * width + x1] * fx;
    bottom * (1.0 - fy) + top * fy
}

/// Run `cell` over the interior of `write`, copying the border ring from
/// `read` unchanged. Rows run in parallel.
fn interior_pass<T, F>(read: &[T], write: &mut [T], width: usize, height: usize, cell: F)
where
    T: Copy + Send + Sync,
    F: Fn(usize, usize) -> T + Sync,
{
    write
        .par_chunks_mut(width)
        .enumerate()
        .for_each(|(y, row)| {
            let src = &read[y * width..(y + 1) * width];
            if y == 0 || y == height - 1 {
                row.copy_from_slice(src);
                return;
            }
            row[0] = src[0];
            row[width - 1] = src[width - 1];
            for (x, out) in row.iter_mut().enumerate().take(width - 1).skip(1) {
                *out = cell(x, y);
            }
        });
}

/// Set the border ring of `write` from the interior of `read`.
///
/// `edge(value, normal_axis)` maps the adjacent interior value to the border
/// value; corners take the mean of their two border neighbours.
fn border_pass<T, F>(read: &[T], write: &mut [T], width: usize, height: usize, edge: F)
where
    T: Copy + Add<Output = T> + Mul<f32, Output = T>,
    F: Fn(T, usize) -> T,
{
    write.copy_from_slice(read);
    let (w, h) = (width, height);
    for x in 1..w - 1 {
        write[x] = edge(read[w + x], 1);
        write[(h - 1) * w + x] = edge(read[(h - 2) * w + x], 1);
    }
    for y in 1..h - 1 {
        write[y * w] = edge(read[y * w + 1], 0);
        write[y * w + w - 1] = edge(read[y * w + w - 2], 0);
    }
    write[0] = (write[1] + write[w]) * 0.5;
    write[w - 1] = (write[w - 2] + write[2 * w - 1]) * 0.5;
    write[(h - 1) * w] = (write[(h - 2) * w] + write[(h - 1) * w + 1]) * 0.5;
    write[h * w - 1] = (write[h * w - 2] + write[(h - 1) * w - 1]) * 0.5;
}

/// The fluid solver.
pub struct FluidSolver {
    config: FluidConfig,
    velocity: PingPong<Vec2>,
    pressure: PingPong<f32>,
    dye: PingPong<Vec4>,
    vorticity: Vec<f32>,
    divergence: Vec<f32>,
    impulses: Vec<Impulse>,
}

impl FluidSolver {
    /// Allocate a still, empty fluid.
    ///
    /// # Errors
    ///
    /// Returns the first failure from [`FluidConfig::validate`].
    pub fn new(config: FluidConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let cells = config.cell_count();
        debug!(
            "fluid grid {}x{}: {} diffusion + {} pressure sweeps per step",
            config.width, config.height, config.diffusion_iterations, config.pressure_iterations
        );
        Ok(Self {
            velocity: PingPong::new(cells, Vec2::ZERO),
            pressure: PingPong::new(cells, 0.0),
            dye: PingPong::new(cells, Vec4::ZERO),
            vorticity: vec![0.0; cells],
            divergence: vec![0.0; cells],
            impulses: Vec::new(),
            config,
        })
    }

    /// The configuration the solver was built with.
    pub fn config(&self) -> &FluidConfig {
        &self.config
    }

    /// Grid width in cells.
    pub fn width(&self) -> usize {
        self.config.width
    }

    /// Grid height in cells.
    pub fn height(&self) -> usize {
        self.config.height
    }

    #[inline]
    fn index(&self, x: usize, y: usize) -> usize {
        y * self.config.width + x
    }

    // ========================================================================
    // Inputs
    // ========================================================================

    /// Queue a splat for the next step's impulse pass.
    pub fn push_impulse(&mut self, impulse: Impulse) {
        self.impulses.push(impulse);
    }

    /// Splats waiting for the next step.
    pub fn pending_impulses(&self) -> &[Impulse] {
        &self.impulses
    }

    /// Replace tuning that does not change the grid size.
    ///
    /// # Errors
    ///
    /// Rejects a config that fails validation or resizes the grid.
    pub fn set_config(&mut self, config: FluidConfig) -> Result<(), ConfigError> {
        config.validate()?;
        if config.width != self.config.width || config.height != self.config.height {
            return Err(ConfigError::GridResize {
                width: self.config.width,
                height: self.config.height,
            });
        }
        self.config = config;
        Ok(())
    }

    /// Zero every field and drop queued impulses.
    pub fn reset(&mut self) {
        self.velocity.fill(Vec2::ZERO);
        self.pressure.fill(0.0);
        self.dye.fill(Vec4::ZERO);
        self.vorticity.fill(0.0);
        self.divergence.fill(0.0);
        self.impulses.clear();
    }

    // ========================================================================
    // Stepping
    // ========================================================================

    /// Passes that one [`step`](Self::step) runs, in order.
    pub fn pass_sequence(&self) -> Vec<FluidPass> {
        let diffusion = if self.config.viscosity > 0.0 {
            self.config.diffusion_iterations as usize
        } else {
            0
        };
        let mut passes = vec![
            FluidPass::Boundary,
            FluidPass::AdvectVelocity,
            FluidPass::AdvectDye,
        ];
        passes.extend(std::iter::repeat(FluidPass::Diffuse).take(diffusion));
        passes.extend([
            FluidPass::ComputeVorticity,
            FluidPass::ConfineVorticity,
            FluidPass::Boundary,
            FluidPass::ComputeDivergence,
        ]);
        passes.extend(
            std::iter::repeat(FluidPass::PressureSweep).take(self.config.pressure_iterations as usize),
        );
        passes.extend([FluidPass::SubtractGradient, FluidPass::Impulse]);
        passes
    }

    /// Advance the fluid by `dt` seconds and consume queued impulses.
    pub fn step(&mut self, dt: f32) {
        for pass in self.pass_sequence() {
            self.run_pass(pass, dt);
        }
    }

    /// Make the velocity field approximately divergence-free with
    /// `iterations` pressure sweeps.
    pub fn project(&mut self, iterations: u32) {
        self.run_pass(FluidPass::Boundary, 0.0);
        self.run_pass(FluidPass::ComputeDivergence, 0.0);
        for _ in 0..iterations {
            self.run_pass(FluidPass::PressureSweep, 0.0);
        }
        self.run_pass(FluidPass::SubtractGradient, 0.0);
    }

    /// Run a single pass and commit it.
    pub fn run_pass(&mut self, pass: FluidPass, dt: f32) {
        self.compute_pass(pass, dt);
        for &field in pass.writes() {
            self.swap(field);
        }
    }

    /// Make the write side of `field` current. Pointer flip, no copy.
    pub fn swap(&mut self, field: FluidField) {
        match field {
            FluidField::Velocity => self.velocity.swap(),
            FluidField::Pressure => self.pressure.swap(),
            FluidField::Dye => self.dye.swap(),
        }
    }

    /// Run a single pass into the write side of every field in
    /// [`FluidPass::writes`], without swapping. The caller must
    /// [`swap`](Self::swap) those fields before the next pass.
    pub fn compute_pass(&mut self, pass: FluidPass, dt: f32) {
        match pass {
            FluidPass::Boundary => self.apply_boundary(),
            FluidPass::AdvectVelocity => self.advect_velocity(dt),
            FluidPass::AdvectDye => self.advect_dye(dt),
            FluidPass::Diffuse => self.diffuse(dt),
            FluidPass::ComputeVorticity => self.compute_vorticity(),
            FluidPass::ConfineVorticity => self.confine_vorticity(dt),
            FluidPass::ComputeDivergence => self.compute_divergence(),
            FluidPass::PressureSweep => self.pressure_sweep(),
            FluidPass::SubtractGradient => self.subtract_gradient(),
            FluidPass::Impulse => self.apply_impulses(),
        }
    }

    /// Set the border ring of velocity and dye from the interior.
    pub fn apply_boundary(&mut self) {
        let (w, h) = (self.config.width, self.config.height);
        let boundary = self.config.boundary;

        let (read, write) = self.velocity.split();
        border_pass(read, write, w, h, |v: Vec2, normal_axis| match boundary {
            BoundaryCondition::NoSlip => -v,
            BoundaryCondition::FreeSlip if normal_axis == 0 => Vec2::new(-v.x, v.y),
            BoundaryCondition::FreeSlip => Vec2::new(v.x, -v.y),
        });

        let (read, write) = self.dye.split();
        border_pass(read, write, w, h, |d: Vec4, _| d);
    }

    fn advect_velocity(&mut self, dt: f32) {
        let (w, h) = (self.config.width, self.config.height);
        let keep = (1.0 - self.config.velocity_dissipation * dt).max(0.0);
        let (read, write) = self.velocity.split();
        interior_pass(read, write, w, h, |x, y| {
            let origin = Vec2::new(x as f32, y as f32) - read[y * w + x] * dt;
            sample_bilinear(read, w, h, origin) * keep
        });
    }

    fn advect_dye(&mut self, dt: f32) {
        let (w, h) = (self.config.width, self.config.height);
        let keep = (1.0 - self.config.dye_dissipation * dt).max(0.0);
        let velocity = self.velocity.read();
        let (read, write) = self.dye.split();
        interior_pass(read, write, w, h, |x, y| {
            let origin = Vec2::new(x as f32, y as f32) - velocity[y * w + x] * dt;
            sample_bilinear(read, w, h, origin) * keep
        });
    }

    /// One Jacobi sweep with `alpha = dt · ν · W · H`: each cell becomes
    /// `(L + R + B + T + alpha · C) / (4 + alpha)`.
    fn diffuse(&mut self, dt: f32) {
        let (w, h) = (self.config.width, self.config.height);
        let alpha = dt * self.config.viscosity * (w * h) as f32;
        let r_beta = 1.0 / (4.0 + alpha);
        let (read, write) = self.velocity.split();
        interior_pass(read, write, w, h, |x, y| {
            let i = y * w + x;
            (read[i - 1] + read[i + 1] + read[i - w] + read[i + w] + read[i] * alpha) * r_beta
        });
    }

    fn compute_vorticity(&mut self) {
        let (w, h) = (self.config.width, self.config.height);
        let velocity = self.velocity.read();
        self.vorticity
            .par_chunks_mut(w)
            .enumerate()
            .for_each(|(y, row)| {
                if y == 0 || y == h - 1 {
                    row.fill(0.0);
                    return;
                }
                row[0] = 0.0;
                row[w - 1] = 0.0;
                for x in 1..w - 1 {
                    let i = y * w + x;
                    let dvy_dx = velocity[i + 1].y - velocity[i - 1].y;
                    let dvx_dy = velocity[i + w].x - velocity[i - w].x;
                    row[x] = 0.5 * (dvy_dx - dvx_dy);
                }
            });
    }

    fn confine_vorticity(&mut self, dt: f32) {
        let (w, h) = (self.config.width, self.config.height);
        let strength = self.config.vorticity_strength;
        let max_velocity = self.config.max_velocity;
        let vorticity = &self.vorticity;
        let (read, write) = self.velocity.split();
        interior_pass(read, write, w, h, |x, y| {
            let i = y * w + x;
            // Needs a full vorticity stencil, which the first interior ring lacks.
            if x < 2 || y < 2 || x > w - 3 || y > h - 3 || strength == 0.0 {
                return read[i];
            }
            let grad = Vec2::new(
                vorticity[i + 1].abs() - vorticity[i - 1].abs(),
                vorticity[i + w].abs() - vorticity[i - w].abs(),
            ) * 0.5;
            let n = grad / (grad.length() + GRADIENT_EPSILON);
            let force = Vec2::new(n.y, -n.x) * strength * vorticity[i];
            (read[i] + force * dt).clamp_length_max(max_velocity)
        });
    }

    fn compute_divergence(&mut self) {
        let (w, h) = (self.config.width, self.config.height);
        let velocity = self.velocity.read();
        self.divergence
            .par_chunks_mut(w)
            .enumerate()
            .for_each(|(y, row)| {
                if y == 0 || y == h - 1 {
                    row.fill(0.0);
                    return;
                }
                row[0] = 0.0;
                row[w - 1] = 0.0;
                for x in 1..w - 1 {
                    let i = y * w + x;
                    row[x] = 0.5 * ((velocity[i + 1].x - velocity[i - 1].x)
                        + (velocity[i + w].y - velocity[i - w].y));
                }
            });
    }

    /// One Jacobi sweep of `∇²p = div`. The border ring stays at zero
    /// pressure.
    fn pressure_sweep(&mut self) {
        let (w, h) = (self.config.width, self.config.height);
        let divergence = &self.divergence;
        let (read, write) = self.pressure.split();
        interior_pass(read, write, w, h, |x, y| {
            let i = y * w + x;
            (read[i - 1] + read[i + 1] + read[i - w] + read[i + w] - divergence[i]) * 0.25
        });
    }

    fn subtract_gradient(&mut self) {
        let (w, h) = (self.config.width, self.config.height);
        let pressure = self.pressure.read();
        let (read, write) = self.velocity.split();
        interior_pass(read, write, w, h, |x, y| {
            let i = y * w + x;
            let grad = Vec2::new(pressure[i + 1] - pressure[i - 1], pressure[i + w] - pressure[i - w]);
            read[i] - grad * 0.5
        });
    }

    fn apply_impulses(&mut self) {
        let (w, h) = (self.config.width, self.config.height);
        let max_velocity = self.config.max_velocity;
        let impulses: Vec<Impulse> = std::mem::take(&mut self.impulses)
            .into_iter()
            .filter(|i| i.radius > 0.0)
            .collect();

        let (read, write) = self.velocity.split();
        interior_pass(read, write, w, h, |x, y| {
            let cell = Vec2::new(x as f32, y as f32);
            let added: Vec2 = impulses.iter().map(|imp| imp.velocity * imp.weight_at(cell)).sum();
            (read[y * w + x] + added).clamp_length_max(max_velocity)
        });

        let (read, write) = self.dye.split();
        interior_pass(read, write, w, h, |x, y| {
            let cell = Vec2::new(x as f32, y as f32);
            let added: Vec4 = impulses.iter().map(|imp| imp.dye * imp.weight_at(cell)).sum();
            read[y * w + x] + added
        });
    }

    // ========================================================================
    // Outputs
    // ========================================================================

    /// Current velocity, row-major.
    pub fn velocity(&self) -> &[Vec2] {
        self.velocity.read()
    }

    /// Current velocity for setting initial conditions.
    pub fn velocity_mut(&mut self) -> &mut [Vec2] {
        self.velocity.read_mut()
    }

    /// Current dye, row-major.
    pub fn dye(&self) -> &[Vec4] {
        self.dye.read()
    }

    /// Current dye for setting initial conditions.
    pub fn dye_mut(&mut self) -> &mut [Vec4] {
        self.dye.read_mut()
    }

    /// Current pressure, row-major.
    pub fn pressure(&self) -> &[f32] {
        self.pressure.read()
    }

    /// Vorticity from the last vorticity pass.
    pub fn vorticity(&self) -> &[f32] {
        &self.vorticity
    }

    /// Divergence from the last divergence pass.
    pub fn divergence(&self) -> &[f32] {
        &self.divergence
    }

    /// Velocity at cell `(x, y)`.
    pub fn velocity_at(&self, x: usize, y: usize) -> Vec2 {
        self.velocity.read()[self.index(x, y)]
    }

    /// Sum of every dye channel over the interior.
    pub fn total_dye(&self) -> f32 {
        let (w, h) = (self.config.width, self.config.height);
        let dye = self.dye.read();
        (1..h - 1)
            .into_par_iter()
            .map(|y| {
                dye[y * w + 1..y * w + w - 1]
                    .iter()
                    .map(|d| d.element_sum())
                    .sum::<f32>()
            })
            .sum()
    }

    /// Mean `|div v|` over the interior of the current velocity field.
    pub fn mean_abs_divergence(&self) -> f32 {
        let (w, h) = (self.config.width, self.config.height);
        let v = self.velocity.read();
        let total: f32 = (1..h - 1)
            .into_par_iter()
            .map(|y| {
                (1..w - 1)
                    .map(|x| {
                        let i = y * w + x;
                        (0.5 * ((v[i + 1].x - v[i - 1].x) + (v[i + w].y - v[i - w].y))).abs()
                    })
                    .sum::<f32>()
            })
            .sum();
        total / ((w - 2) * (h - 2)) as f32
    }

    /// `½ Σ |v|²` over the interior.
    pub fn kinetic_energy(&self) -> f32 {
        let (w, h) = (self.config.width, self.config.height);
        let v = self.velocity.read();
        0.5 * (1..h - 1)
            .into_par_iter()
            .map(|y| {
                v[y * w + 1..y * w + w - 1]
                    .iter()
                    .map(|c| c.length_squared())
                    .sum::<f32>()
            })
            .sum::<f32>()
    }

    /// Pack density and velocity for display.
    pub fn texture(&self) -> FluidTexture {
        let velocity = self.velocity.read();
        let dye = self.dye.read();
        let texels = velocity
            .par_iter()
            .zip(dye.par_iter())
            .map(|(v, d)| [luminance(*d), v.x, v.y, 0.0])
            .collect();
        FluidTexture {
            width: self.config.width,
            height: self.config.height,
            texels,
        }
    }

    /// Dye tone-mapped to an 8-bit image, top row first.
    pub fn to_rgba_image(&self) -> image::RgbaImage {
        let (w, h) = (self.config.width, self.config.height);
        let dye = self.dye.read();
        image::RgbaImage::from_fn(w as u32, h as u32, |px, py| {
            let y = h - 1 - py as usize;
            let d = dye[y * w + px as usize];
            image::Rgba([display_channel(d.x), display_channel(d.y), display_channel(d.z), 255])
        })
    }

    /// Write [`to_rgba_image`](Self::to_rgba_image) as a PNG.
    pub fn save_png(&self, path: impl AsRef<Path>) -> Result<(), ExportError> {
        self.to_rgba_image().save(path)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn still(width: usize, height: usize) -> FluidSolver {
        FluidSolver::new(FluidConfig::new(width, height)).unwrap()
    }

    fn add_dye_blob(fluid: &mut FluidSolver, centre: Vec2, radius: f32) {
        let w = fluid.width();
        for (i, d) in fluid.dye_mut().iter_mut().enumerate() {
            let cell = Vec2::new((i % w) as f32, (i / w) as f32);
            let r = cell.distance(centre);
            if r < radius {
                *d = Vec4::splat(1.0 - r / radius);
            }
        }
    }

    // ========================================================================
    // Configuration
    // ========================================================================

    #[test]
    fn test_rejects_small_grid() {
        assert!(matches!(
            FluidSolver::new(FluidConfig::new(3, 64)),
            Err(ConfigError::GridTooSmall { width: 3, .. })
        ));
        assert!(FluidSolver::new(FluidConfig::new(4, 4)).is_ok());
    }

    #[test]
    fn test_rejects_negative_rates() {
        let mut config = FluidConfig::new(16, 16);
        config.viscosity = -1.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_set_config_keeps_grid() {
        let mut fluid = still(16, 16);
        assert!(fluid.set_config(FluidConfig::new(16, 16).with_vorticity(5.0)).is_ok());
        assert_eq!(fluid.config().vorticity_strength, 5.0);
        assert!(matches!(
            fluid.set_config(FluidConfig::new(32, 16)),
            Err(ConfigError::GridResize { width: 16, height: 16 })
        ));
    }

    // ========================================================================
    // Pass ordering
    // ========================================================================

    #[test]
    fn test_pass_sequence_order() {
        let fluid = FluidSolver::new(
            FluidConfig::new(16, 16)
                .with_viscosity(0.1)
                .with_iterations(2, 3),
        )
        .unwrap();
        use FluidPass::*;
        assert_eq!(
            fluid.pass_sequence(),
            vec![
                Boundary,
                AdvectVelocity,
                AdvectDye,
                Diffuse,
                Diffuse,
                ComputeVorticity,
                ConfineVorticity,
                Boundary,
                ComputeDivergence,
                PressureSweep,
                PressureSweep,
                PressureSweep,
                SubtractGradient,
                Impulse,
            ]
        );
    }

    #[test]
    fn test_inviscid_skips_diffusion() {
        let fluid = still(16, 16);
        assert!(!fluid.pass_sequence().contains(&FluidPass::Diffuse));
    }

    #[test]
    fn test_passes_swap_buffers() {
        let mut fluid = still(8, 8);
        let before = fluid.velocity.read_is_b();
        fluid.run_pass(FluidPass::AdvectVelocity, 0.1);
        assert_ne!(fluid.velocity.read_is_b(), before);
        // Dye untouched by a velocity pass.
        assert!(!fluid.dye.read_is_b());
    }

    #[test]
    fn test_compute_pass_waits_for_swap() {
        let mut fluid = still(8, 8);
        fluid.velocity_mut()[3 * 8 + 3] = Vec2::new(2.0, 0.0);
        let before = fluid.velocity().to_vec();

        fluid.compute_pass(FluidPass::Diffuse, 0.1);
        assert_eq!(fluid.velocity(), &before[..]);
        assert!(!fluid.velocity.read_is_b());

        fluid.swap(FluidField::Velocity);
        assert!(fluid.velocity.read_is_b());
        assert_ne!(fluid.velocity(), &before[..]);
    }

    #[test]
    fn test_pass_writes_match_buffers() {
        for pass in [
            FluidPass::Boundary,
            FluidPass::AdvectVelocity,
            FluidPass::AdvectDye,
            FluidPass::Diffuse,
            FluidPass::ConfineVorticity,
            FluidPass::PressureSweep,
            FluidPass::SubtractGradient,
            FluidPass::Impulse,
        ] {
            let mut fluid = still(8, 8);
            fluid.run_pass(pass, 0.1);
            let flipped = [
                (FluidField::Velocity, fluid.velocity.read_is_b()),
                (FluidField::Pressure, fluid.pressure.read_is_b()),
                (FluidField::Dye, fluid.dye.read_is_b()),
            ];
            for (field, is_b) in flipped {
                assert_eq!(pass.writes().contains(&field), is_b, "{:?} / {:?}", pass, field);
            }
        }
        assert!(FluidPass::ComputeVorticity.writes().is_empty());
        assert!(FluidPass::ComputeDivergence.writes().is_empty());
    }

    // ========================================================================
    // Boundary
    // ========================================================================

    #[test]
    fn test_no_slip_cancels_wall_velocity() {
        let mut fluid = still(8, 8);
        fluid.velocity_mut().fill(Vec2::new(1.0, 2.0));
        fluid.apply_boundary();
        assert_eq!(fluid.velocity_at(0, 4), Vec2::new(-1.0, -2.0));
        assert_eq!(fluid.velocity_at(4, 7), Vec2::new(-1.0, -2.0));
        assert_eq!(fluid.velocity_at(4, 4), Vec2::new(1.0, 2.0));
    }

    #[test]
    fn test_free_slip_cancels_normal_only() {
        let mut fluid =
            FluidSolver::new(FluidConfig::new(8, 8).with_boundary(BoundaryCondition::FreeSlip))
                .unwrap();
        fluid.velocity_mut().fill(Vec2::new(1.0, 2.0));
        fluid.apply_boundary();
        assert_eq!(fluid.velocity_at(0, 4), Vec2::new(-1.0, 2.0));
        assert_eq!(fluid.velocity_at(4, 0), Vec2::new(1.0, -2.0));
    }

    #[test]
    fn test_interior_passes_leave_border() {
        let mut fluid = still(8, 8);
        fluid.velocity_mut()[3] = Vec2::new(9.0, 9.0);
        fluid.run_pass(FluidPass::AdvectVelocity, 0.1);
        assert_eq!(fluid.velocity_at(3, 0), Vec2::new(9.0, 9.0));
    }

    // ========================================================================
    // Advection & dye
    // ========================================================================

    #[test]
    fn test_dye_decreases_without_flow() {
        let mut fluid =
            FluidSolver::new(FluidConfig::new(32, 32).with_dissipation(0.2, 0.5)).unwrap();
        add_dye_blob(&mut fluid, Vec2::new(16.0, 16.0), 6.0);
        let mut last = fluid.total_dye();
        for _ in 0..20 {
            fluid.step(0.1);
            let now = fluid.total_dye();
            assert!(now < last, "dye grew from {} to {}", last, now);
            last = now;
        }
    }

    #[test]
    fn test_dye_never_increases_under_uniform_flow() {
        let mut fluid =
            FluidSolver::new(FluidConfig::new(32, 32).with_dissipation(0.0, 0.1)).unwrap();
        add_dye_blob(&mut fluid, Vec2::new(14.0, 15.0), 5.0);
        let mut last = fluid.total_dye();
        for _ in 0..15 {
            fluid.velocity_mut().fill(Vec2::new(3.0, 2.0));
            fluid.run_pass(FluidPass::AdvectDye, 0.1);
            let now = fluid.total_dye();
            assert!(now <= last + 1e-4, "dye grew from {} to {}", last, now);
            last = now;
        }
    }

    #[test]
    fn test_advection_transports_dye() {
        let mut fluid =
            FluidSolver::new(FluidConfig::new(32, 32).with_dissipation(0.0, 0.0)).unwrap();
        add_dye_blob(&mut fluid, Vec2::new(10.0, 16.0), 3.0);
        fluid.velocity_mut().fill(Vec2::new(10.0, 0.0));
        for _ in 0..5 {
            fluid.run_pass(FluidPass::AdvectDye, 0.1);
        }
        // Blob centre moved from x = 10 to x = 15.
        let w = fluid.width();
        let at = |x: usize| fluid.dye()[16 * w + x].x;
        assert!(at(15) > at(10));
    }

    // ========================================================================
    // Diffusion & vorticity
    // ========================================================================

    #[test]
    fn test_diffusion_smooths_spike() {
        let mut fluid = FluidSolver::new(FluidConfig::new(16, 16).with_viscosity(0.01)).unwrap();
        let i = fluid.index(8, 8);
        fluid.velocity_mut()[i] = Vec2::new(10.0, 0.0);
        fluid.run_pass(FluidPass::Diffuse, 0.1);
        assert!(fluid.velocity_at(8, 8).x < 10.0);
        assert!(fluid.velocity_at(9, 8).x > 0.0);
    }

    #[test]
    fn test_vorticity_of_rotation() {
        let mut fluid = still(16, 16);
        let w = fluid.width();
        for (i, v) in fluid.velocity_mut().iter_mut().enumerate() {
            let p = Vec2::new((i % w) as f32 - 8.0, (i / w) as f32 - 8.0);
            // Counter-clockwise solid rotation: curl = 2.
            *v = Vec2::new(-p.y, p.x);
        }
        fluid.run_pass(FluidPass::ComputeVorticity, 0.0);
        assert!((fluid.vorticity()[8 * w + 8] - 2.0).abs() < 1e-5);
    }

    #[test]
    fn test_confinement_adds_energy_to_vortex() {
        let mut fluid = still(32, 32);
        let w = fluid.width();
        for (i, v) in fluid.velocity_mut().iter_mut().enumerate() {
            let p = Vec2::new((i % w) as f32 - 16.0, (i / w) as f32 - 16.0);
            let falloff = (-p.length_squared() / 18.0).exp();
            *v = Vec2::new(-p.y, p.x) * falloff;
        }
        let before = fluid.kinetic_energy();
        fluid.run_pass(FluidPass::ComputeVorticity, 0.0);
        fluid.run_pass(FluidPass::ConfineVorticity, 0.05);
        assert!(fluid.kinetic_energy() > before);
    }

    // ========================================================================
    // Projection
    // ========================================================================

    #[test]
    fn test_projection_reduces_divergence() {
        let mut fluid = still(24, 24);
        let w = fluid.width();
        for (i, v) in fluid.velocity_mut().iter_mut().enumerate() {
            let p = Vec2::new((i % w) as f32 - 12.0, (i / w) as f32 - 12.0);
            *v = p * (-p.length_squared() / 18.0).exp();
        }
        fluid.apply_boundary();
        let before = fluid.mean_abs_divergence();
        fluid.project(80);
        fluid.apply_boundary();
        let after = fluid.mean_abs_divergence();
        assert!(after < before, "divergence {} -> {}", before, after);
    }

    #[test]
    fn test_more_sweeps_converge_further() {
        let build = || {
            let mut fluid = still(24, 24);
            let w = fluid.width();
            for (i, v) in fluid.velocity_mut().iter_mut().enumerate() {
                let p = Vec2::new((i % w) as f32 - 12.0, (i / w) as f32 - 12.0);
                *v = p * (-p.length_squared() / 18.0).exp();
            }
            fluid
        };
        let mut few = build();
        let mut many = build();
        few.project(5);
        many.project(100);
        assert!(many.mean_abs_divergence() < few.mean_abs_divergence());
    }

    // ========================================================================
    // Impulses & output
    // ========================================================================

    #[test]
    fn test_impulse_weight() {
        let imp = Impulse::new(Vec2::ZERO, Vec2::X, Vec4::ONE, 4.0);
        assert_eq!(imp.weight_at(Vec2::ZERO), 1.0);
        assert_eq!(imp.weight_at(Vec2::new(4.0, 0.0)), 0.0);
        assert!(imp.weight_at(Vec2::new(1.0, 0.0)) > imp.weight_at(Vec2::new(2.0, 0.0)));
    }

    #[test]
    fn test_impulses_are_consumed() {
        let mut fluid = still(16, 16);
        fluid.push_impulse(Impulse::new(Vec2::splat(8.0), Vec2::X, Vec4::ONE, 3.0));
        fluid.push_impulse(Impulse::new(Vec2::splat(4.0), Vec2::Y, Vec4::ONE, 2.0));
        fluid.step(0.016);
        assert!(fluid.pending_impulses().is_empty());
        assert!(fluid.velocity_at(8, 8).x > 0.0);
        assert!(fluid.velocity_at(4, 4).y > 0.0);
    }

    #[test]
    fn test_velocity_clamped() {
        let mut config = FluidConfig::new(16, 16);
        config.max_velocity = 5.0;
        let mut fluid = FluidSolver::new(config).unwrap();
        fluid.push_impulse(Impulse::new(Vec2::splat(8.0), Vec2::new(1e6, 0.0), Vec4::ONE, 3.0));
        fluid.step(0.016);
        assert!(fluid.velocity().iter().all(|v| v.length() <= 5.0 + 1e-3));
    }

    #[test]
    fn test_reset_clears_state() {
        let mut fluid = still(16, 16);
        fluid.push_impulse(Impulse::new(Vec2::splat(8.0), Vec2::X, Vec4::ONE, 3.0));
        fluid.step(0.016);
        fluid.reset();
        assert_eq!(fluid.total_dye(), 0.0);
        assert_eq!(fluid.kinetic_energy(), 0.0);
    }

    #[test]
    fn test_texture_packs_density_and_velocity() {
        let mut fluid = still(8, 8);
        let i = fluid.index(3, 4);
        fluid.velocity_mut()[i] = Vec2::new(1.5, -2.0);
        fluid.dye_mut()[i] = Vec4::new(1.0, 1.0, 1.0, 1.0);
        let tex = fluid.texture();
        let t = tex.get(3, 4);
        assert!((t[0] - 1.0).abs() < 1e-4);
        assert_eq!([t[1], t[2], t[3]], [1.5, -2.0, 0.0]);
        assert_eq!(tex.as_bytes().len(), 8 * 8 * 16);
    }

    #[test]
    fn test_image_is_tone_mapped_and_flipped() {
        let mut fluid = still(8, 8);
        let i = fluid.index(2, 0);
        fluid.dye_mut()[i] = Vec4::new(1e6, 0.0, 1.0, 1.0);
        let img = fluid.to_rgba_image();
        // Grid row 0 is the bottom image row.
        let px = img.get_pixel(2, 7);
        assert_eq!(px[0], 255);
        assert_eq!(px[1], 0);
        // 1 / (1 + 1) = 0.5, then gamma.
        assert_eq!(px[2], display_channel(1.0));
        assert_eq!(px[3], 255);
    }
}
