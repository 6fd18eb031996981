//! Deterministic noise and hashing on the CPU.
//!
//! Everything here is a pure function of its arguments. The integer hash is
//! bit-identical to `hash` in [`crate::shader_utils::RANDOM_WGSL`], so seeds
//! derived on the CPU and on the GPU produce the same streams.
//!
//! # Functions
//!
//! - [`noise3`] / [`noise4`]: simplex gradient noise, roughly in `[-1, 1]`
//! - [`fbm3`]: fractal sum of `noise3` octaves
//! - [`fbm_ridged3`] / [`fbm_turbulent3`]: ridged and billowy fractal variants
//! - [`worley3`]: distance to the nearest cellular feature point
//! - [`curl3`]: divergence-free vector field built from `fbm3`
//!
//! ```
//! use backdrop::noise::{curl3, noise3};
//! use glam::Vec3;
//!
//! let n = noise3(Vec3::new(0.3, 1.7, -2.0));
//! assert!(n.abs() <= 1.5);
//! let flow = curl3(Vec3::new(0.3, 1.7, -2.0));
//! assert!(flow.is_finite());
//! ```

use glam::{Vec3, Vec4};

/// Largest octave count accepted by the fractal functions.
pub const MAX_OCTAVES: u32 = 8;

/// Octaves used by [`curl3`].
pub const CURL_OCTAVES: u32 = 4;

/// Finite-difference step used by [`curl3`].
pub const CURL_EPSILON: f32 = 0.01;

// ============================================================================
// Hashing
// ============================================================================

/// Hash a `u32` to a pseudo-random `u32`.
#[inline]
pub fn hash_u32(n: u32) -> u32 {
    let mut x = n;
    x ^= x >> 17;
    x = x.wrapping_mul(0xed5a_d4bb);
    x ^= x >> 11;
    x = x.wrapping_mul(0xac4c_1b51);
    x ^= x >> 15;
    x = x.wrapping_mul(0x3184_8bab);
    x ^= x >> 14;
    x
}

/// Hash two values into one.
#[inline]
pub fn hash2(a: u32, b: u32) -> u32 {
    hash_u32(a.wrapping_add(hash_u32(b)))
}

/// Hash three values into one.
#[inline]
pub fn hash3(a: u32, b: u32, c: u32) -> u32 {
    hash_u32(a.wrapping_add(hash_u32(b.wrapping_add(hash_u32(c)))))
}

#[inline]
fn hash4(a: u32, b: u32, c: u32, d: u32) -> u32 {
    hash_u32(a.wrapping_add(hash3(b, c, d)))
}

/// Uniform float in `[0, 1)` derived from a seed.
#[inline]
pub fn rand01(seed: u32) -> f32 {
    (hash_u32(seed) >> 8) as f32 * (1.0 / 16_777_216.0)
}

/// Direction uniformly distributed on the unit sphere.
///
/// Consumes the seeds `seed` and `seed + 1`.
pub fn random_unit_vector(seed: u32) -> Vec3 {
    let z = rand01(seed) * 2.0 - 1.0;
    let phi = rand01(seed.wrapping_add(1)) * std::f32::consts::TAU;
    let r = (1.0 - z * z).max(0.0).sqrt();
    Vec3::new(r * phi.cos(), r * phi.sin(), z)
}

/// Point uniformly distributed inside a ball of `radius` around the origin.
///
/// Consumes the seeds `seed` through `seed + 2`.
pub fn random_in_ball(seed: u32, radius: f32) -> Vec3 {
    let dir = random_unit_vector(seed);
    dir * radius * rand01(seed.wrapping_add(2)).cbrt()
}

// ============================================================================
// Simplex noise
// ============================================================================

const F3: f32 = 1.0 / 3.0;
const G3: f32 = 1.0 / 6.0;
const F4: f32 = 0.309_017; // (sqrt(5) - 1) / 4
const G4: f32 = 0.138_196_6; // (5 - sqrt(5)) / 20

const GRAD3: [Vec3; 12] = [
    Vec3::new(1.0, 1.0, 0.0),
    Vec3::new(-1.0, 1.0, 0.0),
    Vec3::new(1.0, -1.0, 0.0),
    Vec3::new(-1.0, -1.0, 0.0),
    Vec3::new(1.0, 0.0, 1.0),
    Vec3::new(-1.0, 0.0, 1.0),
    Vec3::new(1.0, 0.0, -1.0),
    Vec3::new(-1.0, 0.0, -1.0),
    Vec3::new(0.0, 1.0, 1.0),
    Vec3::new(0.0, -1.0, 1.0),
    Vec3::new(0.0, 1.0, -1.0),
    Vec3::new(0.0, -1.0, -1.0),
];

#[inline]
fn lattice_gradient3(i: i32, j: i32, k: i32) -> Vec3 {
    GRAD3[(hash3(i as u32, j as u32, k as u32) % 12) as usize]
}

/// 32 gradients: every vector with one zero and three `±1` components.
#[inline]
fn lattice_gradient4(i: i32, j: i32, k: i32, l: i32) -> Vec4 {
    let h = hash4(i as u32, j as u32, k as u32, l as u32) % 32;
    let zero_axis = h >> 3;
    let sign = |bit: u32| if h & bit == 0 { 1.0 } else { -1.0 };
    let (a, b, c) = (sign(1), sign(2), sign(4));
    match zero_axis {
        0 => Vec4::new(0.0, a, b, c),
        1 => Vec4::new(a, 0.0, b, c),
        2 => Vec4::new(a, b, 0.0, c),
        _ => Vec4::new(a, b, c, 0.0),
    }
}

/// Corner contribution with a radius of `sqrt(0.5)`, which keeps the sum
/// continuous across simplex boundaries.
#[inline]
fn corner3(offset: Vec3, gradient: Vec3) -> f32 {
    let t = 0.5 - offset.length_squared();
    if t <= 0.0 {
        0.0
    } else {
        let t2 = t * t;
        t2 * t2 * gradient.dot(offset)
    }
}

#[inline]
fn corner4(offset: Vec4, gradient: Vec4) -> f32 {
    let t = 0.5 - offset.length_squared();
    if t <= 0.0 {
        0.0
    } else {
        let t2 = t * t;
        t2 * t2 * gradient.dot(offset)
    }
}

/// 3D simplex noise, approximately in `[-1, 1]`.
pub fn noise3(p: Vec3) -> f32 {
    let s = (p.x + p.y + p.z) * F3;
    let i = (p.x + s).floor() as i32;
    let j = (p.y + s).floor() as i32;
    let k = (p.z + s).floor() as i32;

    let t = (i + j + k) as f32 * G3;
    let x0 = p - Vec3::new(i as f32 - t, j as f32 - t, k as f32 - t);

    let (o1, o2) = if x0.x >= x0.y {
        if x0.y >= x0.z {
            ([1, 0, 0], [1, 1, 0])
        } else if x0.x >= x0.z {
            ([1, 0, 0], [1, 0, 1])
        } else {
            ([0, 0, 1], [1, 0, 1])
        }
    } else if x0.y < x0.z {
        ([0, 0, 1], [0, 1, 1])
    } else if x0.x < x0.z {
        ([0, 1, 0], [0, 1, 1])
    } else {
        ([0, 1, 0], [1, 1, 0])
    };

    let as_vec = |o: [i32; 3]| Vec3::new(o[0] as f32, o[1] as f32, o[2] as f32);
    let x1 = x0 - as_vec(o1) + G3;
    let x2 = x0 - as_vec(o2) + 2.0 * G3;
    let x3 = x0 - 1.0 + 3.0 * G3;

    let n = corner3(x0, lattice_gradient3(i, j, k))
        + corner3(x1, lattice_gradient3(i + o1[0], j + o1[1], k + o1[2]))
        + corner3(x2, lattice_gradient3(i + o2[0], j + o2[1], k + o2[2]))
        + corner3(x3, lattice_gradient3(i + 1, j + 1, k + 1));

    74.0 * n
}

/// 4D simplex noise, approximately in `[-1, 1]`.
///
/// The fourth axis is normally time, giving noise that evolves smoothly
/// without drifting through space.
pub fn noise4(p: Vec4) -> f32 {
    let s = (p.x + p.y + p.z + p.w) * F4;
    let cell = (p + s).floor();
    let (i, j, k, l) = (cell.x as i32, cell.y as i32, cell.z as i32, cell.w as i32);

    let t = (i + j + k + l) as f32 * G4;
    let x0 = p - (cell - t);

    // Rank each axis by magnitude to pick the simplex traversal order.
    let mut rank = [0u8; 4];
    let c = x0.to_array();
    for a in 0..4 {
        for b in (a + 1)..4 {
            if c[a] > c[b] {
                rank[a] += 1;
            } else {
                rank[b] += 1;
            }
        }
    }
    let step = |threshold: u8| {
        let o = [
            (rank[0] >= threshold) as i32,
            (rank[1] >= threshold) as i32,
            (rank[2] >= threshold) as i32,
            (rank[3] >= threshold) as i32,
        ];
        (o, Vec4::new(o[0] as f32, o[1] as f32, o[2] as f32, o[3] as f32))
    };
    let (o1, v1) = step(3);
    let (o2, v2) = step(2);
    let (o3, v3) = step(1);

    let x1 = x0 - v1 + G4;
    let x2 = x0 - v2 + 2.0 * G4;
    let x3 = x0 - v3 + 3.0 * G4;
    let x4 = x0 - 1.0 + 4.0 * G4;

    let g = |o: [i32; 4]| lattice_gradient4(i + o[0], j + o[1], k + o[2], l + o[3]);
    let n = corner4(x0, g([0, 0, 0, 0]))
        + corner4(x1, g(o1))
        + corner4(x2, g(o2))
        + corner4(x3, g(o3))
        + corner4(x4, g([1, 1, 1, 1]));

    62.0 * n
}

// ============================================================================
// Fractal sums
// ============================================================================

/// Fractal Brownian motion: `octaves` layers of [`noise3`], each at double the
/// frequency and half the amplitude of the last.
///
/// `octaves` is capped at [`MAX_OCTAVES`]; zero octaves yields `0.0`.
pub fn fbm3(p: Vec3, octaves: u32) -> f32 {
    let mut value = 0.0;
    let mut amplitude = 0.5;
    let mut pos = p;
    for _ in 0..octaves.min(MAX_OCTAVES) {
        value += amplitude * noise3(pos);
        pos *= 2.0;
        amplitude *= 0.5;
    }
    value
}

/// Ridged multifractal. Sharp creases where the base noise crosses zero,
/// each octave weighted by the one before it.
pub fn fbm_ridged3(p: Vec3, octaves: u32, lacunarity: f32, gain: f32) -> f32 {
    let mut value = 0.0;
    let mut amplitude = 0.5;
    let mut frequency = 1.0;
    let mut weight = 1.0;
    for _ in 0..octaves.min(MAX_OCTAVES) {
        let mut n = 1.0 - noise3(p * frequency).abs();
        n = n * n * weight;
        value += n * amplitude;
        weight = (n * 2.0).clamp(0.0, 1.0);
        amplitude *= gain;
        frequency *= lacunarity;
    }
    value
}

/// Turbulence: normalised sum of `|noise3|` octaves, in `[0, 1]`.
pub fn fbm_turbulent3(p: Vec3, octaves: u32, lacunarity: f32, gain: f32) -> f32 {
    let mut value = 0.0;
    let mut amplitude = 0.5;
    let mut frequency = 1.0;
    let mut total = 0.0;
    for _ in 0..octaves.min(MAX_OCTAVES) {
        value += amplitude * noise3(p * frequency).abs();
        total += amplitude;
        amplitude *= gain;
        frequency *= lacunarity;
    }
    if total > 0.0 {
        value / total
    } else {
        0.0
    }
}

/// Cellular noise: distance from `p` to the nearest feature point, where each
/// unit cell holds one hashed feature point. Capped at `1.0`.
pub fn worley3(p: Vec3) -> f32 {
    let id = p.floor();
    let local = p - id;
    let (ix, iy, iz) = (id.x as i32, id.y as i32, id.z as i32);

    let mut min_dist: f32 = 1.0;
    for dz in -1..=1 {
        for dy in -1..=1 {
            for dx in -1..=1 {
                let (cx, cy, cz) = ((ix + dx) as u32, (iy + dy) as u32, (iz + dz) as u32);
                let seed = hash3(cx, cy, cz);
                let feature = Vec3::new(
                    rand01(seed),
                    rand01(seed.wrapping_add(1)),
                    rand01(seed.wrapping_add(2)),
                );
                let offset = Vec3::new(dx as f32, dy as f32, dz as f32);
                min_dist = min_dist.min((offset + feature - local).length());
            }
        }
    }
    min_dist
}

// ============================================================================
// Curl noise
// ============================================================================

/// Divergence-free turbulence field using [`CURL_OCTAVES`] octaves.
pub fn curl3(p: Vec3) -> Vec3 {
    curl3_octaves(p, CURL_OCTAVES)
}

/// Curl of the vector potential `(φ, φ, φ)` with `φ = fbm3(p, octaves)`.
///
/// Each partial derivative is a central difference over [`CURL_EPSILON`].
/// The result is `(∂φ/∂y - ∂φ/∂z, ∂φ/∂z - ∂φ/∂x, ∂φ/∂x - ∂φ/∂y)`, whose
/// divergence cancels term by term. It is deliberately not normalised:
/// rescaling per point would reintroduce divergence.
pub fn curl3_octaves(p: Vec3, octaves: u32) -> Vec3 {
    let e = CURL_EPSILON;
    let inv = 1.0 / (2.0 * e);
    let phi = |q: Vec3| fbm3(q, octaves);

    let dx = (phi(p + Vec3::X * e) - phi(p - Vec3::X * e)) * inv;
    let dy = (phi(p + Vec3::Y * e) - phi(p - Vec3::Y * e)) * inv;
    let dz = (phi(p + Vec3::Z * e) - phi(p - Vec3::Z * e)) * inv;

    Vec3::new(dy - dz, dz - dx, dx - dy)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{Rng, SeedableRng};

    fn sample_points(n: usize) -> Vec<Vec3> {
        let mut rng = rand::rngs::StdRng::seed_from_u64(0x5eed);
        (0..n)
            .map(|_| {
                Vec3::new(
                    rng.gen_range(-20.0..20.0),
                    rng.gen_range(-20.0..20.0),
                    rng.gen_range(-20.0..20.0),
                )
            })
            .collect()
    }

    // ========================================================================
    // Hashing
    // ========================================================================

    #[test]
    fn test_hash_known_values() {
        // Pinned so the CPU and WGSL hash cannot silently diverge.
        assert_eq!(hash_u32(0), 0);
        assert_eq!(hash_u32(1), 0x0427_41d6);
        assert_eq!(hash_u32(2), 0xf1df_e8e9);
        assert_eq!(hash_u32(12345), 0xf904_eb67);
    }

    #[test]
    fn test_rand01_range() {
        for seed in 0..10_000u32 {
            let r = rand01(seed.wrapping_mul(7919));
            assert!((0.0..1.0).contains(&r), "rand01 out of range: {}", r);
        }
    }

    #[test]
    fn test_random_unit_vector_is_unit() {
        for seed in 0..1000u32 {
            let v = random_unit_vector(seed * 3);
            assert!((v.length() - 1.0).abs() < 1e-4);
        }
    }

    #[test]
    fn test_random_in_ball_inside() {
        for seed in 0..1000u32 {
            let v = random_in_ball(seed * 5, 2.5);
            assert!(v.length() <= 2.5 + 1e-4);
        }
    }

    #[test]
    fn test_random_unit_vector_covers_sphere() {
        // Mean of uniformly distributed directions tends to zero.
        let mean = (0..4000u32)
            .map(|i| random_unit_vector(hash_u32(i)))
            .fold(Vec3::ZERO, |a, b| a + b)
            / 4000.0;
        assert!(mean.length() < 0.1, "biased directions: {:?}", mean);
    }

    // ========================================================================
    // Noise
    // ========================================================================

    #[test]
    fn test_noise3_deterministic() {
        let p = Vec3::new(1.3, -4.2, 7.7);
        assert_eq!(noise3(p), noise3(p));
    }

    #[test]
    fn test_noise3_range() {
        for p in sample_points(5000) {
            let n = noise3(p);
            assert!(n.abs() <= 1.5, "noise3({:?}) = {} out of range", p, n);
        }
    }

    #[test]
    fn test_noise3_varies() {
        let a = noise3(Vec3::new(0.1, 0.2, 0.3));
        let b = noise3(Vec3::new(1.7, 2.9, 0.4));
        let c = noise3(Vec3::new(5.5, -3.1, 2.2));
        assert!(a != b || b != c, "noise should vary");
    }

    #[test]
    fn test_noise3_continuous() {
        for p in sample_points(500) {
            let d = (noise3(p) - noise3(p + Vec3::splat(1e-4))).abs();
            assert!(d < 0.05, "jump of {} at {:?}", d, p);
        }
    }

    #[test]
    fn test_noise4_range() {
        for (i, p) in sample_points(3000).into_iter().enumerate() {
            let n = noise4(p.extend(i as f32 * 0.37));
            assert!(n.abs() <= 2.0, "noise4 out of range: {}", n);
        }
    }

    #[test]
    fn test_noise4_changes_with_time() {
        let p = Vec3::new(0.4, 0.9, -1.3);
        let a = noise4(p.extend(0.0));
        let b = noise4(p.extend(3.7));
        assert_ne!(a, b);
    }

    #[test]
    fn test_fbm_zero_octaves() {
        assert_eq!(fbm3(Vec3::ONE, 0), 0.0);
    }

    #[test]
    fn test_fbm_octaves_capped() {
        let p = Vec3::new(0.7, 0.1, 2.3);
        assert_eq!(fbm3(p, MAX_OCTAVES), fbm3(p, 64));
    }

    #[test]
    fn test_fbm_turbulent_normalised() {
        for p in sample_points(500) {
            let v = fbm_turbulent3(p, 5, 2.0, 0.5);
            assert!((0.0..=1.5).contains(&v));
        }
    }

    #[test]
    fn test_fbm_ridged_non_negative() {
        for p in sample_points(500) {
            assert!(fbm_ridged3(p, 5, 2.2, 0.45) >= 0.0);
        }
    }

    #[test]
    fn test_worley_bounded() {
        for p in sample_points(500) {
            let v = worley3(p);
            assert!((0.0..=1.0).contains(&v));
        }
    }

    // ========================================================================
    // Curl
    // ========================================================================

    #[test]
    fn test_curl_divergence_free() {
        let h = 1e-2;
        for p in sample_points(200) {
            let div = (curl3(p + Vec3::X * h).x - curl3(p - Vec3::X * h).x
                + curl3(p + Vec3::Y * h).y
                - curl3(p - Vec3::Y * h).y
                + curl3(p + Vec3::Z * h).z
                - curl3(p - Vec3::Z * h).z)
                / (2.0 * h);
            assert!(div.abs() < 1e-2, "divergence {} at {:?}", div, p);
        }
    }

    #[test]
    fn test_curl_not_trivial() {
        let total: f32 = sample_points(100).iter().map(|p| curl3(*p).length()).sum();
        assert!(total > 1.0, "curl field is flat");
    }
}
