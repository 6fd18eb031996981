//! WGSL counterparts of [`crate::noise`] for the GPU particle kernel.
//!
//! Every function here matches its CPU twin bit for bit in the integer paths
//! (hashing, seeding) and up to floating-point rounding in the noise paths,
//! so a particle pool advanced on either backend follows the same respawn
//! stream.
//!
//! # Available Functions
//!
//! ## Random & Hash
//! - `hash(n: u32) -> u32` - same mix as [`crate::noise::hash_u32`]
//! - `hash2(a: u32, b: u32) -> u32`
//! - `hash3(a: u32, b: u32, c: u32) -> u32`
//! - `rand01(seed: u32) -> f32` - uniform in `[0, 1)`
//! - `random_unit_vector(seed: u32) -> vec3<f32>`
//! - `random_in_ball(seed: u32, radius: f32) -> vec3<f32>`
//!
//! ## Noise
//! - `noise3(p: vec3<f32>) -> f32` - simplex noise, roughly `[-1, 1]`
//! - `fbm3(p: vec3<f32>, octaves: u32) -> f32`
//! - `curl3(p: vec3<f32>, octaves: u32) -> vec3<f32>` - divergence-free

/// WGSL code for random/hash functions.
pub const RANDOM_WGSL: &str = r#"
fn hash(n: u32) -> u32 {
    var x = n;
    x = x ^ (x >> 17u);
    x = x * 0xed5ad4bbu;
    x = x ^ (x >> 11u);
    x = x * 0xac4c1b51u;
    x = x ^ (x >> 15u);
    x = x * 0x31848babu;
    x = x ^ (x >> 14u);
    return x;
}

fn hash2(a: u32, b: u32) -> u32 {
    return hash(a + hash(b));
}

fn hash3(a: u32, b: u32, c: u32) -> u32 {
    return hash(a + hash(b + hash(c)));
}

// Uniform float in [0, 1)
fn rand01(seed: u32) -> f32 {
    return f32(hash(seed) >> 8u) * (1.0 / 16777216.0);
}

// Uniform on the unit sphere; consumes seed, seed + 1
fn random_unit_vector(seed: u32) -> vec3<f32> {
    let z = rand01(seed) * 2.0 - 1.0;
    let phi = rand01(seed + 1u) * 6.283185307;
    let r = sqrt(max(1.0 - z * z, 0.0));
    return vec3<f32>(r * cos(phi), r * sin(phi), z);
}

// Uniform inside a ball; consumes seed .. seed + 2
fn random_in_ball(seed: u32, radius: f32) -> vec3<f32> {
    return random_unit_vector(seed) * radius * pow(rand01(seed + 2u), 1.0 / 3.0);
}
"#;

/// WGSL code for simplex, fractal and curl noise.
pub const NOISE_WGSL: &str = r#"
fn lattice_gradient3(c: vec3<i32>) -> vec3<f32> {
    var grads = array<vec3<f32>, 12>(
        vec3<f32>(1.0, 1.0, 0.0), vec3<f32>(-1.0, 1.0, 0.0),
        vec3<f32>(1.0, -1.0, 0.0), vec3<f32>(-1.0, -1.0, 0.0),
        vec3<f32>(1.0, 0.0, 1.0), vec3<f32>(-1.0, 0.0, 1.0),
        vec3<f32>(1.0, 0.0, -1.0), vec3<f32>(-1.0, 0.0, -1.0),
        vec3<f32>(0.0, 1.0, 1.0), vec3<f32>(0.0, -1.0, 1.0),
        vec3<f32>(0.0, 1.0, -1.0), vec3<f32>(0.0, -1.0, -1.0)
    );
    let h = hash3(bitcast<u32>(c.x), bitcast<u32>(c.y), bitcast<u32>(c.z)) % 12u;
    return grads[h];
}

fn simplex_corner3(offset: vec3<f32>, gradient: vec3<f32>) -> f32 {
    let t = 0.5 - dot(offset, offset);
    if t <= 0.0 {
        return 0.0;
    }
    let t2 = t * t;
    return t2 * t2 * dot(gradient, offset);
}

// 3D simplex noise
fn noise3(p: vec3<f32>) -> f32 {
    let F3 = 1.0 / 3.0;
    let G3 = 1.0 / 6.0;

    let s = (p.x + p.y + p.z) * F3;
    let cell = vec3<i32>(floor(p + vec3<f32>(s)));
    let t = f32(cell.x + cell.y + cell.z) * G3;
    let x0 = p - (vec3<f32>(cell) - vec3<f32>(t));

    var o1: vec3<i32>;
    var o2: vec3<i32>;
    if x0.x >= x0.y {
        if x0.y >= x0.z {
            o1 = vec3<i32>(1, 0, 0); o2 = vec3<i32>(1, 1, 0);
        } else if x0.x >= x0.z {
            o1 = vec3<i32>(1, 0, 0); o2 = vec3<i32>(1, 0, 1);
        } else {
            o1 = vec3<i32>(0, 0, 1); o2 = vec3<i32>(1, 0, 1);
        }
    } else if x0.y < x0.z {
        o1 = vec3<i32>(0, 0, 1); o2 = vec3<i32>(0, 1, 1);
    } else if x0.x < x0.z {
        o1 = vec3<i32>(0, 1, 0); o2 = vec3<i32>(0, 1, 1);
    } else {
        o1 = vec3<i32>(0, 1, 0); o2 = vec3<i32>(1, 1, 0);
    }

    let x1 = x0 - vec3<f32>(o1) + vec3<f32>(G3);
    let x2 = x0 - vec3<f32>(o2) + vec3<f32>(2.0 * G3);
    let x3 = x0 - vec3<f32>(1.0) + vec3<f32>(3.0 * G3);

    let n = simplex_corner3(x0, lattice_gradient3(cell))
        + simplex_corner3(x1, lattice_gradient3(cell + o1))
        + simplex_corner3(x2, lattice_gradient3(cell + o2))
        + simplex_corner3(x3, lattice_gradient3(cell + vec3<i32>(1, 1, 1)));
    return 74.0 * n;
}

fn fbm3(p: vec3<f32>, octaves: u32) -> f32 {
    var value = 0.0;
    var amplitude = 0.5;
    var pos = p;
    for (var i = 0u; i < min(octaves, 8u); i++) {
        value += amplitude * noise3(pos);
        pos *= 2.0;
        amplitude *= 0.5;
    }
    return value;
}

// Curl of the potential (phi, phi, phi), phi = fbm3
fn curl3(p: vec3<f32>, octaves: u32) -> vec3<f32> {
    let e = 0.01;
    let inv = 1.0 / (2.0 * e);
    let dx = (fbm3(p + vec3<f32>(e, 0.0, 0.0), octaves) - fbm3(p - vec3<f32>(e, 0.0, 0.0), octaves)) * inv;
    let dy = (fbm3(p + vec3<f32>(0.0, e, 0.0), octaves) - fbm3(p - vec3<f32>(0.0, e, 0.0), octaves)) * inv;
    let dz = (fbm3(p + vec3<f32>(0.0, 0.0, e), octaves) - fbm3(p - vec3<f32>(0.0, 0.0, e), octaves)) * inv;
    return vec3<f32>(dy - dz, dz - dx, dx - dy);
}
"#;

/// All utility functions, ready to prepend to a kernel.
pub fn all_utils_wgsl() -> String {
    format!("// backdrop utility functions\n{}\n{}\n", RANDOM_WGSL, NOISE_WGSL)
}
