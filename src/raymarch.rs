//! Sphere-tracing renderer for [`Sdf`] scenes.
//!
//! One ray per pixel from a pinhole [`Camera`]. Each ray steps forward by
//! the distance the field reports until it lands within
//! [`MarchSettings::surface_epsilon`] of a surface, passes
//! [`MarchSettings::max_distance`], or runs out of
//! [`MarchSettings::max_steps`]. Hits are lit by coloured point lights
//! (Lambert diffuse + Blinn-Phong specular) with a Fresnel rim, optional
//! ambient occlusion and soft shadows, exponential fog and a final gamma.
//!
//! Rows render in parallel on the rayon pool.
//!
//! Marching assumes the field never overestimates distance. Displaced or
//! otherwise non-Lipschitz scenes still terminate but may render with holes.

use std::path::Path;

use glam::{Vec2, Vec3};
use log::debug;
use rayon::prelude::*;

use crate::error::{
    ensure_finite, ensure_finite_vec, ensure_non_negative, ensure_positive, ConfigError,
    ExportError,
};
use crate::scene::SdfScene;
use crate::sdf::{central_gradient, Sdf};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Default step budget per ray.
pub const MAX_STEPS: u32 = 128;
/// Default distance at which a ray is declared a miss.
pub const MAX_DISTANCE: f32 = 100.0;
/// Default hit threshold.
pub const SURFACE_EPSILON: f32 = 0.001;

const AO_SAMPLES: u32 = 5;
const SHADOW_STEPS: u32 = 32;
const SHADOW_MIN_T: f32 = 0.02;
const SHADOW_MAX_T: f32 = 5.0;

// ============================================================================
// Camera
// ============================================================================

/// Pinhole camera.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Camera {
    pub position: Vec3,
    pub target: Vec3,
    pub up: Vec3,
    /// Distance from the eye to the image plane, in units of image height.
    pub focal_length: f32,
}

impl Default for Camera {
    fn default() -> Self {
        Self::orbit(Vec3::ZERO, 0.0, 0.25, 7.0)
    }
}

impl Camera {
    /// Camera at `position` looking at `target`, Y up.
    pub fn new(position: Vec3, target: Vec3) -> Self {
        Self {
            position,
            target,
            up: Vec3::Y,
            focal_length: 1.5,
        }
    }

    /// Camera orbiting `target` at `distance`, `yaw` about Y and `pitch`
    /// above the XZ plane, both in radians.
    pub fn orbit(target: Vec3, yaw: f32, pitch: f32, distance: f32) -> Self {
        let x = distance * pitch.cos() * yaw.sin();
        let y = distance * pitch.sin();
        let z = distance * pitch.cos() * yaw.cos();
        Self::new(target + Vec3::new(x, y, z), target)
    }

    pub fn with_up(mut self, up: Vec3) -> Self {
        self.up = up;
        self
    }

    pub fn with_focal_length(mut self, focal_length: f32) -> Self {
        self.focal_length = focal_length;
        self
    }

    /// Orthonormal view basis.
    ///
    /// # Errors
    ///
    /// [`ConfigError::DegenerateCamera`] when the eye sits on the target or
    /// `up` is parallel to the view direction.
    pub fn basis(&self) -> Result<CameraBasis, ConfigError> {
        ensure_finite_vec("camera position", self.position.to_array())?;
        ensure_finite_vec("camera target", self.target.to_array())?;
        ensure_finite_vec("camera up", self.up.to_array())?;
        ensure_positive("focal_length", self.focal_length)?;

        let forward = (self.target - self.position)
            .try_normalize()
            .ok_or(ConfigError::DegenerateCamera)?;
        let right = forward
            .cross(self.up)
            .try_normalize()
            .ok_or(ConfigError::DegenerateCamera)?;
        let up = right.cross(forward);
        Ok(CameraBasis {
            origin: self.position,
            right,
            up,
            forward,
            focal_length: self.focal_length,
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.basis().map(|_| ())
    }
}

/// A validated camera frame, ready to generate rays.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CameraBasis {
    pub origin: Vec3,
    pub right: Vec3,
    pub up: Vec3,
    pub forward: Vec3,
    pub focal_length: f32,
}

impl CameraBasis {
    /// Unit direction through the centre of pixel `(x, y)`; row 0 is the
    /// top of the image.
    pub fn ray_direction(&self, x: u32, y: u32, width: u32, height: u32) -> Vec3 {
        let res = Vec2::new(width as f32, height as f32);
        let pixel = Vec2::new(x as f32 + 0.5, height as f32 - (y as f32 + 0.5));
        let uv = (pixel - 0.5 * res) / res.y;
        (uv.x * self.right + uv.y * self.up + self.focal_length * self.forward).normalize()
    }
}

// ============================================================================
// Settings
// ============================================================================

/// Termination bounds for a march.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct MarchSettings {
    pub max_steps: u32,
    pub max_distance: f32,
    pub surface_epsilon: f32,
    /// Finite-difference step for normals.
    pub normal_epsilon: f32,
}

impl Default for MarchSettings {
    fn default() -> Self {
        Self {
            max_steps: MAX_STEPS,
            max_distance: MAX_DISTANCE,
            surface_epsilon: SURFACE_EPSILON,
            normal_epsilon: 0.001,
        }
    }
}

impl MarchSettings {
    pub fn validate(&self) -> Result<(), ConfigError> {
        ensure_positive("max_distance", self.max_distance)?;
        ensure_positive("surface_epsilon", self.surface_epsilon)?;
        ensure_positive("normal_epsilon", self.normal_epsilon)?;
        Ok(())
    }
}

/// A coloured point light.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct PointLight {
    pub position: Vec3,
    pub color: Vec3,
    pub diffuse: f32,
    pub specular: f32,
}

impl PointLight {
    pub fn new(position: Vec3, color: Vec3, diffuse: f32, specular: f32) -> Self {
        Self {
            position,
            color,
            diffuse,
            specular,
        }
    }
}

/// Lighting and post-processing for hits and misses.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct Shading {
    pub lights: Vec<PointLight>,
    pub ambient: Vec3,
    pub specular_power: f32,
    pub rim_color: Vec3,
    pub rim_strength: f32,
    pub rim_power: f32,
    pub fog_density: f32,
    pub fog_color: Vec3,
    pub background: Vec3,
    /// Output exponent, applied last.
    pub gamma: f32,
    pub ambient_occlusion: bool,
    pub soft_shadows: bool,
    /// Penumbra sharpness; higher is harder.
    pub shadow_hardness: f32,
}

impl Default for Shading {
    fn default() -> Self {
        let violet = Vec3::new(0.545, 0.0, 1.0);
        Self {
            lights: vec![
                PointLight::new(Vec3::new(3.0, 4.0, 2.0), violet, 0.6, 0.8),
                PointLight::new(Vec3::new(-3.0, 2.0, -2.0), Vec3::new(1.0, 0.843, 0.0), 0.5, 0.6),
                PointLight::new(Vec3::new(0.0, -3.0, 3.0), Vec3::new(1.0, 0.078, 0.576), 0.4, 0.5),
            ],
            ambient: Vec3::splat(0.02),
            specular_power: 64.0,
            rim_color: violet,
            rim_strength: 0.5,
            rim_power: 3.0,
            fog_density: 0.05,
            fog_color: Vec3::ZERO,
            background: Vec3::ZERO,
            gamma: 0.4545,
            ambient_occlusion: false,
            soft_shadows: false,
            shadow_hardness: 16.0,
        }
    }
}

impl Shading {
    pub fn with_lights(mut self, lights: Vec<PointLight>) -> Self {
        self.lights = lights;
        self
    }

    pub fn with_fog(mut self, density: f32, color: Vec3) -> Self {
        self.fog_density = density.max(0.0);
        self.fog_color = color;
        self
    }

    pub fn with_background(mut self, background: Vec3) -> Self {
        self.background = background;
        self
    }

    pub fn with_ambient_occlusion(mut self, enabled: bool) -> Self {
        self.ambient_occlusion = enabled;
        self
    }

    pub fn with_soft_shadows(mut self, enabled: bool) -> Self {
        self.soft_shadows = enabled;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        for light in &self.lights {
            ensure_finite_vec("light position", light.position.to_array())?;
            ensure_finite_vec("light color", light.color.to_array())?;
            ensure_non_negative("light diffuse", light.diffuse)?;
            ensure_non_negative("light specular", light.specular)?;
        }
        ensure_positive("specular_power", self.specular_power)?;
        ensure_non_negative("rim_strength", self.rim_strength)?;
        ensure_positive("rim_power", self.rim_power)?;
        ensure_non_negative("fog_density", self.fog_density)?;
        ensure_positive("gamma", self.gamma)?;
        ensure_finite("shadow_hardness", self.shadow_hardness)?;
        Ok(())
    }
}

// ============================================================================
// Marching
// ============================================================================

/// Outcome of a single march.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum MarchResult {
    /// Reached a surface `distance` along the ray.
    Hit { distance: f32, steps: u32 },
    /// Escaped past the far bound, ran out of steps, or met a NaN.
    Miss { distance: f32, steps: u32 },
}

impl MarchResult {
    pub fn is_hit(&self) -> bool {
        matches!(self, MarchResult::Hit { .. })
    }

    pub fn distance(&self) -> f32 {
        match *self {
            MarchResult::Hit { distance, .. } | MarchResult::Miss { distance, .. } => distance,
        }
    }

    pub fn steps(&self) -> u32 {
        match *self {
            MarchResult::Hit { steps, .. } | MarchResult::Miss { steps, .. } => steps,
        }
    }
}

/// Sphere-trace along `dir` from `origin`. Never takes more than
/// `settings.max_steps` field evaluations.
pub fn march(sdf: &Sdf, origin: Vec3, dir: Vec3, settings: &MarchSettings) -> MarchResult {
    let mut distance = 0.0;
    for step in 1..=settings.max_steps {
        let ds = sdf.distance(origin + dir * distance);
        if ds.is_nan() {
            return MarchResult::Miss { distance, steps: step };
        }
        distance += ds;
        if distance > settings.max_distance {
            return MarchResult::Miss { distance, steps: step };
        }
        if ds.abs() < settings.surface_epsilon {
            return MarchResult::Hit { distance, steps: step };
        }
    }
    MarchResult::Miss {
        distance,
        steps: settings.max_steps,
    }
}

/// Ambient occlusion at `p` with normal `n`: 1 is fully open.
pub fn ambient_occlusion(sdf: &Sdf, p: Vec3, n: Vec3) -> f32 {
    let mut occlusion = 0.0;
    let mut scale = 1.0;
    for i in 0..AO_SAMPLES {
        let h = 0.01 + 0.12 * i as f32 / (AO_SAMPLES - 1) as f32;
        let d = sdf.distance(p + n * h);
        occlusion += (h - d) * scale;
        scale *= 0.95;
    }
    (1.0 - 3.0 * occlusion).clamp(0.0, 1.0)
}

/// Penumbra factor along `dir` from `origin`, up to `max_t`: 0 is fully
/// shadowed, 1 is fully lit.
pub fn soft_shadow(sdf: &Sdf, origin: Vec3, dir: Vec3, max_t: f32, hardness: f32) -> f32 {
    let mut res: f32 = 1.0;
    let mut t = SHADOW_MIN_T;
    for _ in 0..SHADOW_STEPS {
        if t >= max_t {
            break;
        }
        let h = sdf.distance(origin + dir * t);
        if h.is_nan() {
            break;
        }
        if h < SURFACE_EPSILON {
            return 0.0;
        }
        res = res.min(hardness * h / t);
        t += h;
    }
    res.clamp(0.0, 1.0)
}

// ============================================================================
// Renderer
// ============================================================================

/// Ray marcher: settings plus shading.
#[derive(Clone, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct RayMarcher {
    pub settings: MarchSettings,
    pub shading: Shading,
}

impl RayMarcher {
    pub fn new(settings: MarchSettings, shading: Shading) -> Self {
        Self { settings, shading }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.settings.validate()?;
        self.shading.validate()
    }

    /// Linear colour of a hit at `distance` along `dir`, before fog and gamma.
    pub fn shade(&self, sdf: &Sdf, origin: Vec3, dir: Vec3, distance: f32) -> Vec3 {
        let s = &self.shading;
        let p = origin + dir * distance;
        let n = central_gradient(|q| sdf.distance(q), p, self.settings.normal_epsilon)
            .normalize_or_zero();
        let view = -dir;

        let mut color = s.ambient;
        for light in &s.lights {
            let to_light = light.position - p;
            let l = to_light.normalize_or_zero();
            let diffuse = n.dot(l).max(0.0);
            let half = (l + view).normalize_or_zero();
            let specular = n.dot(half).max(0.0).powf(s.specular_power);
            let shadow = if s.soft_shadows {
                let reach = to_light.length().min(SHADOW_MAX_T);
                soft_shadow(sdf, p + n * SHADOW_MIN_T, l, reach, s.shadow_hardness)
            } else {
                1.0
            };
            color += light.color * (diffuse * light.diffuse + specular * light.specular) * shadow;
        }

        let fresnel = (1.0 - n.dot(view).max(0.0)).powf(s.rim_power);
        color += s.rim_color * fresnel * s.rim_strength;

        if s.ambient_occlusion {
            color *= ambient_occlusion(sdf, p, n);
        }
        color
    }

    /// Final colour for a ray, fog and gamma applied.
    pub fn trace(&self, sdf: &Sdf, origin: Vec3, dir: Vec3) -> Vec3 {
        let s = &self.shading;
        let linear = match march(sdf, origin, dir, &self.settings) {
            MarchResult::Hit { distance, .. } => {
                let lit = self.shade(sdf, origin, dir, distance);
                let fog = 1.0 - (-distance * s.fog_density).exp();
                lit.lerp(s.fog_color, fog)
            }
            MarchResult::Miss { .. } => s.background,
        };
        linear.max(Vec3::ZERO).powf(s.gamma)
    }

    /// Render `scene` at `time`.
    pub fn render(
        &self,
        scene: &dyn SdfScene,
        time: f32,
        camera: &Camera,
        width: u32,
        height: u32,
    ) -> Result<ColorBuffer, ConfigError> {
        self.render_sdf(&scene.at(time), camera, width, height)
    }

    /// Render a fixed tree.
    ///
    /// # Errors
    ///
    /// Zero resolution or a degenerate camera.
    pub fn render_sdf(
        &self,
        sdf: &Sdf,
        camera: &Camera,
        width: u32,
        height: u32,
    ) -> Result<ColorBuffer, ConfigError> {
        if width == 0 || height == 0 {
            return Err(ConfigError::EmptyResolution { width, height });
        }
        let basis = camera.basis()?;
        debug!(
            "ray marching {}x{}, {} SDF nodes, {} lights",
            width,
            height,
            sdf.node_count(),
            self.shading.lights.len()
        );

        let mut pixels = vec![Vec3::ZERO; width as usize * height as usize];
        pixels
            .par_chunks_mut(width as usize)
            .enumerate()
            .for_each(|(y, row)| {
                for (x, px) in row.iter_mut().enumerate() {
                    let dir = basis.ray_direction(x as u32, y as u32, width, height);
                    *px = self.trace(sdf, basis.origin, dir);
                }
            });

        Ok(ColorBuffer {
            width,
            height,
            pixels,
        })
    }
}

// ============================================================================
// Output
// ============================================================================

/// Rendered colours, row-major, top row first, already gamma-encoded.
#[derive(Clone, Debug, PartialEq)]
pub struct ColorBuffer {
    width: u32,
    height: u32,
    pixels: Vec<Vec3>,
}

impl ColorBuffer {
    /// Wrap existing pixels.
    pub fn from_pixels(width: u32, height: u32, pixels: Vec<Vec3>) -> Result<Self, ExportError> {
        if pixels.len() != width as usize * height as usize {
            return Err(ExportError::Dimensions {
                width,
                height,
                len: pixels.len(),
            });
        }
        Ok(Self {
            width,
            height,
            pixels,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn pixels(&self) -> &[Vec3] {
        &self.pixels
    }

    pub fn get(&self, x: u32, y: u32) -> Vec3 {
        self.pixels[y as usize * self.width as usize + x as usize]
    }

    /// Mean of the channel averages, for quick brightness checks.
    pub fn mean_intensity(&self) -> f32 {
        let total: f32 = self.pixels.par_iter().map(|p| p.element_sum() / 3.0).sum();
        total / self.pixels.len() as f32
    }

    /// 8-bit RGBA, channels clamped to `[0, 1]`.
    pub fn to_rgba_image(&self) -> image::RgbaImage {
        image::RgbaImage::from_fn(self.width, self.height, |x, y| {
            let c = (self.get(x, y).clamp(Vec3::ZERO, Vec3::ONE) * 255.0).round();
            image::Rgba([c.x as u8, c.y as u8, c.z as u8, 255])
        })
    }

    /// Write the buffer as a PNG.
    pub fn save_png(&self, path: impl AsRef<Path>) -> Result<(), ExportError> {
        self.to_rgba_image().save(path)?;
        Ok(())
    }
}
