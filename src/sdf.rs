//! Signed distance functions.
//!
//! An [`Sdf`] is an immutable tree of primitives and operators. Evaluation is
//! a pure recursive walk; animation is expressed by rebuilding the tree from
//! the current time (see [`crate::scene`]), never by mutating nodes.
//!
//! ```
//! use backdrop::sdf::Sdf;
//! use glam::Vec3;
//!
//! let blob = Sdf::sphere(1.0)
//!     .smooth_union(Sdf::sphere(0.5).translate(Vec3::new(1.2, 0.0, 0.0)), 0.3);
//! assert!(blob.distance(Vec3::ZERO) < 0.0);
//! assert!(blob.distance(Vec3::new(5.0, 0.0, 0.0)) > 0.0);
//! ```

use glam::{Quat, Vec2, Vec3};

use crate::error::{ensure_finite, ensure_finite_vec, ensure_non_negative, ConfigError};
use crate::noise::noise4;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

// ============================================================================
// Primitive distance functions
// ============================================================================

/// Sphere of `radius` at the origin.
#[inline]
pub fn sd_sphere(p: Vec3, radius: f32) -> f32 {
    p.length() - radius
}

/// Axis-aligned box with the given half extents.
#[inline]
pub fn sd_box(p: Vec3, half_extents: Vec3) -> f32 {
    let q = p.abs() - half_extents;
    q.max(Vec3::ZERO).length() + q.max_element().min(0.0)
}

/// Box with edges rounded by `radius`.
#[inline]
pub fn sd_round_box(p: Vec3, half_extents: Vec3, radius: f32) -> f32 {
    sd_box(p, half_extents) - radius
}

/// Torus in the XZ plane.
#[inline]
pub fn sd_torus(p: Vec3, major: f32, minor: f32) -> f32 {
    let q = Vec2::new(Vec2::new(p.x, p.z).length() - major, p.y);
    q.length() - minor
}

/// Capsule around segment `a`-`b`. A zero-length segment is a sphere.
#[inline]
pub fn sd_capsule(p: Vec3, a: Vec3, b: Vec3, radius: f32) -> f32 {
    let pa = p - a;
    let ba = b - a;
    let len_sq = ba.length_squared();
    let h = if len_sq > f32::EPSILON {
        (pa.dot(ba) / len_sq).clamp(0.0, 1.0)
    } else {
        0.0
    };
    (pa - ba * h).length() - radius
}

// ============================================================================
// Operators
// ============================================================================

/// Polynomial smooth minimum. `k <= 0` is a hard `min`.
#[inline]
pub fn op_smooth_union(d1: f32, d2: f32, k: f32) -> f32 {
    if k <= 0.0 {
        return d1.min(d2);
    }
    let h = (0.5 + 0.5 * (d2 - d1) / k).clamp(0.0, 1.0);
    d2 + (d1 - d2) * h - k * h * (1.0 - h)
}

/// `base` with `cut` carved out, blended over `k`.
#[inline]
pub fn op_smooth_subtraction(base: f32, cut: f32, k: f32) -> f32 {
    if k <= 0.0 {
        return base.max(-cut);
    }
    let h = (0.5 - 0.5 * (base + cut) / k).clamp(0.0, 1.0);
    base + (-cut - base) * h + k * h * (1.0 - h)
}

/// Smooth maximum. `k <= 0` is a hard `max`.
#[inline]
pub fn op_smooth_intersection(d1: f32, d2: f32, k: f32) -> f32 {
    if k <= 0.0 {
        return d1.max(d2);
    }
    let h = (0.5 - 0.5 * (d2 - d1) / k).clamp(0.0, 1.0);
    d2 + (d1 - d2) * h + k * h * (1.0 - h)
}

// ============================================================================
// Node tree
// ============================================================================

/// A node in a signed distance tree.
///
/// Only the primitives and the hard operators are exact distances. The
/// smooth operators underestimate slightly, which is safe to march;
/// [`Sdf::Displace`] can overestimate and is only marchable while
/// `amplitude * frequency` stays small.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Sdf {
    Sphere {
        radius: f32,
    },
    Cuboid {
        half_extents: Vec3,
    },
    RoundBox {
        half_extents: Vec3,
        radius: f32,
    },
    Torus {
        major: f32,
        minor: f32,
    },
    Capsule {
        a: Vec3,
        b: Vec3,
        radius: f32,
    },
    Union(Box<Sdf>, Box<Sdf>),
    SmoothUnion {
        a: Box<Sdf>,
        b: Box<Sdf>,
        k: f32,
    },
    /// `base` minus `cut`.
    Subtraction {
        base: Box<Sdf>,
        cut: Box<Sdf>,
    },
    SmoothSubtraction {
        base: Box<Sdf>,
        cut: Box<Sdf>,
        k: f32,
    },
    Intersection(Box<Sdf>, Box<Sdf>),
    SmoothIntersection {
        a: Box<Sdf>,
        b: Box<Sdf>,
        k: f32,
    },
    Translate {
        offset: Vec3,
        child: Box<Sdf>,
    },
    /// Child rotated by `rotation` about the origin.
    Rotate {
        rotation: Quat,
        child: Box<Sdf>,
    },
    /// Child surface pushed along its normal by 4D noise sampled at
    /// `(p * frequency, phase)`.
    Displace {
        amplitude: f32,
        frequency: f32,
        phase: f32,
        child: Box<Sdf>,
    },
}

impl Sdf {
    pub fn sphere(radius: f32) -> Self {
        Sdf::Sphere { radius }
    }

    pub fn cuboid(half_extents: Vec3) -> Self {
        Sdf::Cuboid { half_extents }
    }

    pub fn round_box(half_extents: Vec3, radius: f32) -> Self {
        Sdf::RoundBox {
            half_extents,
            radius,
        }
    }

    pub fn torus(major: f32, minor: f32) -> Self {
        Sdf::Torus { major, minor }
    }

    pub fn capsule(a: Vec3, b: Vec3, radius: f32) -> Self {
        Sdf::Capsule { a, b, radius }
    }

    pub fn union(self, other: Sdf) -> Self {
        Sdf::Union(Box::new(self), Box::new(other))
    }

    pub fn smooth_union(self, other: Sdf, k: f32) -> Self {
        Sdf::SmoothUnion {
            a: Box::new(self),
            b: Box::new(other),
            k,
        }
    }

    pub fn subtract(self, cut: Sdf) -> Self {
        Sdf::Subtraction {
            base: Box::new(self),
            cut: Box::new(cut),
        }
    }

    pub fn smooth_subtract(self, cut: Sdf, k: f32) -> Self {
        Sdf::SmoothSubtraction {
            base: Box::new(self),
            cut: Box::new(cut),
            k,
        }
    }

    pub fn intersect(self, other: Sdf) -> Self {
        Sdf::Intersection(Box::new(self), Box::new(other))
    }

    pub fn smooth_intersect(self, other: Sdf, k: f32) -> Self {
        Sdf::SmoothIntersection {
            a: Box::new(self),
            b: Box::new(other),
            k,
        }
    }

    pub fn translate(self, offset: Vec3) -> Self {
        Sdf::Translate {
            offset,
            child: Box::new(self),
        }
    }

    pub fn rotate(self, rotation: Quat) -> Self {
        Sdf::Rotate {
            rotation,
            child: Box::new(self),
        }
    }

    pub fn displace(self, amplitude: f32, frequency: f32, phase: f32) -> Self {
        Sdf::Displace {
            amplitude,
            frequency,
            phase,
            child: Box::new(self),
        }
    }

    /// Fold a list of shapes with hard unions. `None` when empty.
    pub fn union_all(shapes: impl IntoIterator<Item = Sdf>) -> Option<Self> {
        shapes.into_iter().reduce(Sdf::union)
    }

    /// Signed distance from `p` to the surface.
    pub fn distance(&self, p: Vec3) -> f32 {
        match self {
            Sdf::Sphere { radius } => sd_sphere(p, *radius),
            Sdf::Cuboid { half_extents } => sd_box(p, *half_extents),
            Sdf::RoundBox {
                half_extents,
                radius,
            } => sd_round_box(p, *half_extents, *radius),
            Sdf::Torus { major, minor } => sd_torus(p, *major, *minor),
            Sdf::Capsule { a, b, radius } => sd_capsule(p, *a, *b, *radius),
            Sdf::Union(a, b) => a.distance(p).min(b.distance(p)),
            Sdf::SmoothUnion { a, b, k } => op_smooth_union(a.distance(p), b.distance(p), *k),
            Sdf::Subtraction { base, cut } => base.distance(p).max(-cut.distance(p)),
            Sdf::SmoothSubtraction { base, cut, k } => {
                op_smooth_subtraction(base.distance(p), cut.distance(p), *k)
            }
            Sdf::Intersection(a, b) => a.distance(p).max(b.distance(p)),
            Sdf::SmoothIntersection { a, b, k } => {
                op_smooth_intersection(a.distance(p), b.distance(p), *k)
            }
            Sdf::Translate { offset, child } => child.distance(p - *offset),
            Sdf::Rotate { rotation, child } => child.distance(rotation.inverse() * p),
            Sdf::Displace {
                amplitude,
                frequency,
                phase,
                child,
            } => child.distance(p) + amplitude * noise4((p * *frequency).extend(*phase)),
        }
    }

    /// Surface normal by central differences with step `eps`.
    pub fn normal(&self, p: Vec3, eps: f32) -> Vec3 {
        central_gradient(|q| self.distance(q), p, eps).normalize_or_zero()
    }

    /// Nodes in the tree, this one included.
    pub fn node_count(&self) -> usize {
        1 + match self {
            Sdf::Sphere { .. }
            | Sdf::Cuboid { .. }
            | Sdf::RoundBox { .. }
            | Sdf::Torus { .. }
            | Sdf::Capsule { .. } => 0,
            Sdf::Union(a, b) | Sdf::Intersection(a, b) => a.node_count() + b.node_count(),
            Sdf::SmoothUnion { a, b, .. } | Sdf::SmoothIntersection { a, b, .. } => {
                a.node_count() + b.node_count()
            }
            Sdf::Subtraction { base, cut } | Sdf::SmoothSubtraction { base, cut, .. } => {
                base.node_count() + cut.node_count()
            }
            Sdf::Translate { child, .. } | Sdf::Rotate { child, .. } | Sdf::Displace { child, .. } => {
                child.node_count()
            }
        }
    }

    /// Reject negative sizes and non-finite parameters anywhere in the tree.
    pub fn validate(&self) -> Result<(), ConfigError> {
        match self {
            Sdf::Sphere { radius } => ensure_non_negative("sphere radius", *radius),
            Sdf::Cuboid { half_extents } => {
                ensure_finite_vec("box half extents", half_extents.to_array())?;
                ensure_non_negative("box half extent", half_extents.min_element())
            }
            Sdf::RoundBox {
                half_extents,
                radius,
            } => {
                ensure_finite_vec("round box half extents", half_extents.to_array())?;
                ensure_non_negative("round box half extent", half_extents.min_element())?;
                ensure_non_negative("round box radius", *radius)
            }
            Sdf::Torus { major, minor } => {
                ensure_non_negative("torus major radius", *major)?;
                ensure_non_negative("torus minor radius", *minor)
            }
            Sdf::Capsule { a, b, radius } => {
                ensure_finite_vec("capsule a", a.to_array())?;
                ensure_finite_vec("capsule b", b.to_array())?;
                ensure_non_negative("capsule radius", *radius)
            }
            Sdf::Union(a, b) | Sdf::Intersection(a, b) => {
                a.validate()?;
                b.validate()
            }
            Sdf::SmoothUnion { a, b, k } | Sdf::SmoothIntersection { a, b, k } => {
                ensure_finite("smoothing k", *k)?;
                a.validate()?;
                b.validate()
            }
            Sdf::Subtraction { base, cut } => {
                base.validate()?;
                cut.validate()
            }
            Sdf::SmoothSubtraction { base, cut, k } => {
                ensure_finite("smoothing k", *k)?;
                base.validate()?;
                cut.validate()
            }
            Sdf::Translate { offset, child } => {
                ensure_finite_vec("translation", offset.to_array())?;
                child.validate()
            }
            Sdf::Rotate { rotation, child } => {
                ensure_finite_vec("rotation", rotation.to_array())?;
                child.validate()
            }
            Sdf::Displace {
                amplitude,
                frequency,
                phase,
                child,
            } => {
                ensure_finite("displacement amplitude", *amplitude)?;
                ensure_non_negative("displacement frequency", *frequency)?;
                ensure_finite("displacement phase", *phase)?;
                child.validate()
            }
        }
    }
}

/// Central-difference gradient of `f` at `p`.
#[inline]
pub fn central_gradient(f: impl Fn(Vec3) -> f32, p: Vec3, eps: f32) -> Vec3 {
    let dx = Vec3::new(eps, 0.0, 0.0);
    let dy = Vec3::new(0.0, eps, 0.0);
    let dz = Vec3::new(0.0, 0.0, eps);
    Vec3::new(
        f(p + dx) - f(p - dx),
        f(p + dy) - f(p - dy),
        f(p + dz) - f(p - dz),
    ) / (2.0 * eps)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::StdRng, Rng, SeedableRng};

    fn random_point(rng: &mut StdRng, extent: f32) -> Vec3 {
        Vec3::new(
            rng.gen_range(-extent..extent),
            rng.gen_range(-extent..extent),
            rng.gen_range(-extent..extent),
        )
    }

    // ========================================================================
    // Primitives
    // ========================================================================

    #[test]
    fn test_sphere_distance() {
        let s = Sdf::sphere(1.0);
        assert_eq!(s.distance(Vec3::ZERO), -1.0);
        assert!((s.distance(Vec3::new(3.0, 0.0, 0.0)) - 2.0).abs() < 1e-6);
    }

    #[test]
    fn test_box_distance() {
        let b = Sdf::cuboid(Vec3::ONE);
        assert_eq!(b.distance(Vec3::ZERO), -1.0);
        assert!((b.distance(Vec3::new(2.0, 0.0, 0.0)) - 1.0).abs() < 1e-6);
        // Corner: distance to (1,1,1).
        let corner = b.distance(Vec3::splat(2.0));
        assert!((corner - 3.0f32.sqrt()).abs() < 1e-5);
    }

    #[test]
    fn test_round_box_shrinks_by_radius() {
        let p = Vec3::new(3.0, 0.0, 0.0);
        let hard = Sdf::cuboid(Vec3::ONE).distance(p);
        let round = Sdf::round_box(Vec3::ONE, 0.25).distance(p);
        assert!((hard - round - 0.25).abs() < 1e-6);
    }

    #[test]
    fn test_torus_distance() {
        let t = Sdf::torus(2.0, 0.5);
        // On the tube centre line.
        assert!((t.distance(Vec3::new(2.0, 0.0, 0.0)) + 0.5).abs() < 1e-6);
        // Hole in the middle.
        assert!((t.distance(Vec3::ZERO) - 1.5).abs() < 1e-6);
    }

    #[test]
    fn test_capsule_distance() {
        let c = Sdf::capsule(Vec3::ZERO, Vec3::new(0.0, 2.0, 0.0), 0.5);
        assert!((c.distance(Vec3::new(1.0, 1.0, 0.0)) - 0.5).abs() < 1e-6);
        assert!((c.distance(Vec3::new(0.0, 3.0, 0.0)) - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_degenerate_capsule_is_sphere() {
        let c = Sdf::capsule(Vec3::ONE, Vec3::ONE, 0.5);
        let d = c.distance(Vec3::new(1.0, 3.0, 1.0));
        assert!((d - 1.5).abs() < 1e-6);
        assert!(d.is_finite());
    }

    // ========================================================================
    // Operators
    // ========================================================================

    #[test]
    fn test_union_is_min() {
        let u = Sdf::sphere(1.0).union(Sdf::sphere(1.0).translate(Vec3::new(4.0, 0.0, 0.0)));
        assert!((u.distance(Vec3::new(4.0, 0.0, 0.0)) + 1.0).abs() < 1e-6);
        assert!((u.distance(Vec3::new(2.0, 0.0, 0.0)) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_smooth_union_never_exceeds_min() {
        let mut rng = StdRng::seed_from_u64(3);
        for _ in 0..200 {
            let a: f32 = rng.gen_range(-2.0..2.0);
            let b: f32 = rng.gen_range(-2.0..2.0);
            let k: f32 = rng.gen_range(0.01..1.0);
            assert!(op_smooth_union(a, b, k) <= a.min(b) + 1e-6);
        }
    }

    #[test]
    fn test_smooth_union_far_apart_matches_min() {
        assert!((op_smooth_union(0.0, 5.0, 0.3) - 0.0).abs() < 1e-6);
        assert!((op_smooth_union(5.0, -1.0, 0.3) + 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_smooth_union_is_continuous() {
        // No jump where the two inputs cross.
        let k = 0.5;
        let mut prev = op_smooth_union(-1.0, 1.0, k);
        for i in 1..=200 {
            let t = -1.0 + i as f32 * 0.01;
            let v = op_smooth_union(t, -t, k);
            assert!((v - prev).abs() < 0.03);
            prev = v;
        }
    }

    #[test]
    fn test_zero_k_falls_back_to_hard_ops() {
        assert_eq!(op_smooth_union(1.0, 2.0, 0.0), 1.0);
        assert_eq!(op_smooth_intersection(1.0, 2.0, 0.0), 2.0);
        assert_eq!(op_smooth_subtraction(1.0, 2.0, -1.0), 1.0f32.max(-2.0));
    }

    #[test]
    fn test_subtraction_carves() {
        let shell = Sdf::sphere(2.0).subtract(Sdf::sphere(1.0));
        assert!(shell.distance(Vec3::ZERO) > 0.0);
        assert!(shell.distance(Vec3::new(1.5, 0.0, 0.0)) < 0.0);
    }

    #[test]
    fn test_intersection_is_max() {
        let lens = Sdf::sphere(1.0)
            .translate(Vec3::new(0.5, 0.0, 0.0))
            .intersect(Sdf::sphere(1.0).translate(Vec3::new(-0.5, 0.0, 0.0)));
        assert!(lens.distance(Vec3::ZERO) < 0.0);
        assert!(lens.distance(Vec3::new(1.2, 0.0, 0.0)) > 0.0);
    }

    #[test]
    fn test_smooth_subtraction_and_intersection_bounded() {
        let mut rng = StdRng::seed_from_u64(11);
        for _ in 0..200 {
            let a: f32 = rng.gen_range(-2.0..2.0);
            let b: f32 = rng.gen_range(-2.0..2.0);
            let k: f32 = rng.gen_range(0.01..1.0);
            assert!(op_smooth_intersection(a, b, k) >= a.max(b) - 1e-6);
            assert!(op_smooth_subtraction(a, b, k) >= a.max(-b) - 1e-6);
        }
    }

    // ========================================================================
    // Transforms
    // ========================================================================

    #[test]
    fn test_translate_moves_surface() {
        let s = Sdf::sphere(1.0).translate(Vec3::new(0.0, 5.0, 0.0));
        assert!((s.distance(Vec3::new(0.0, 5.0, 0.0)) + 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_rotate_uses_inverse() {
        // A thin box along X rotated 90° about Z lies along Y.
        let rod = Sdf::cuboid(Vec3::new(2.0, 0.1, 0.1))
            .rotate(Quat::from_rotation_z(std::f32::consts::FRAC_PI_2));
        assert!(rod.distance(Vec3::new(0.0, 1.5, 0.0)) < 0.0);
        assert!(rod.distance(Vec3::new(1.5, 0.0, 0.0)) > 0.0);
    }

    #[test]
    fn test_displacement_bounded() {
        let base = Sdf::sphere(1.0);
        let wobbly = base.clone().displace(0.1, 2.0, 0.7);
        let mut rng = StdRng::seed_from_u64(5);
        for _ in 0..100 {
            let p = random_point(&mut rng, 3.0);
            // noise4 stays within [-2, 2].
            assert!((wobbly.distance(p) - base.distance(p)).abs() <= 0.2 + 1e-5);
        }
    }

    #[test]
    fn test_rigid_tree_is_lipschitz() {
        let scene = Sdf::sphere(1.0)
            .union(Sdf::torus(2.0, 0.2).rotate(Quat::from_rotation_x(0.4)))
            .smooth_union(Sdf::cuboid(Vec3::splat(0.5)).translate(Vec3::X * 2.0), 0.3);
        let mut rng = StdRng::seed_from_u64(17);
        for _ in 0..200 {
            let a = random_point(&mut rng, 4.0);
            let b = random_point(&mut rng, 4.0);
            let slope = (scene.distance(a) - scene.distance(b)).abs() / a.distance(b);
            assert!(slope <= 1.0 + 1e-3, "slope {}", slope);
        }
    }

    // ========================================================================
    // Utilities
    // ========================================================================

    #[test]
    fn test_normal_of_sphere_is_radial() {
        let n = Sdf::sphere(1.0).normal(Vec3::new(0.0, 1.0, 0.0), 1e-3);
        assert!((n - Vec3::Y).length() < 1e-3);
    }

    #[test]
    fn test_union_all() {
        assert!(Sdf::union_all(Vec::new()).is_none());
        let tree = Sdf::union_all((0..3).map(|i| Sdf::sphere(0.1).translate(Vec3::X * i as f32)))
            .unwrap();
        // Three spheres, three translates, two unions.
        assert_eq!(tree.node_count(), 8);
    }

    #[test]
    fn test_validate_rejects_negative_radius() {
        let bad = Sdf::sphere(1.0).union(Sdf::torus(1.0, -0.2));
        assert!(matches!(bad.validate(), Err(ConfigError::Negative { .. })));
        assert!(Sdf::sphere(1.0).displace(0.1, 1.0, 0.0).validate().is_ok());
    }
}
