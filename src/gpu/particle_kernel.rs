//! WGSL particle kernel and its compute pipeline.
//!
//! The kernel is the GPU twin of [`crate::particles::step_particle`]: same
//! respawn seeding, same force law, same bounce and visual attributes.

use crate::shader_utils::all_utils_wgsl;

/// Threads per workgroup.
pub const WORKGROUP_SIZE: u32 = 256;

const KERNEL_WGSL: &str = r#"
struct Particle {
    position_life: vec4<f32>,
    velocity_mass: vec4<f32>,
    color: vec4<f32>,
    attributes: vec4<f32>,
};

struct Attractor {
    position: vec3<f32>,
    strength: f32,
    radius: f32,
    falloff: f32,
    _pad0: f32,
    _pad1: f32,
};

struct Params {
    delta_time: f32,
    time: f32,
    particle_count: u32,
    attractor_count: u32,
    gravity: vec3<f32>,
    damping: f32,
    turbulence_scale: f32,
    turbulence_strength: f32,
    turbulence_speed: f32,
    noise_octaves: u32,
    bounds: vec3<f32>,
    restitution: f32,
    emitter_position: vec3<f32>,
    emitter_radius: f32,
    emit_rate: f32,
    initial_speed: f32,
    life_min: f32,
    life_max: f32,
    size_min: f32,
    size_max: f32,
    fade_time: f32,
    rotation_rate: f32,
    color_start: vec4<f32>,
    color_end: vec4<f32>,
    mass: f32,
    _pad0: f32,
    _pad1: f32,
    _pad2: f32,
};

@group(0) @binding(0) var<storage, read_write> particles: array<Particle>;
@group(0) @binding(1) var<storage, read> attractors: array<Attractor>;
@group(0) @binding(2) var<uniform> params: Params;

const MIN_MASS: f32 = 0.0001;
const SOFTENING: f32 = 0.01;
const PI: f32 = 3.14159265;

// smoothstep(0, width, x), with a zero width acting as a hard step
fn window_step(width: f32, x: f32) -> f32 {
    if width <= 0.0 {
        return select(0.0, 1.0, x >= 0.0);
    }
    return smoothstep(0.0, width, x);
}

fn attractor_force(a: Attractor, point: vec3<f32>) -> vec3<f32> {
    let to_attractor = a.position - point;
    let dist_sq = dot(to_attractor, to_attractor);
    let dist = sqrt(dist_sq);
    if dist <= 0.0 {
        return vec3<f32>(0.0);
    }
    let shape = 1.0 + pow(dist / a.radius, a.falloff);
    let magnitude = a.strength / shape / (dist_sq + SOFTENING);
    return to_attractor / dist * magnitude;
}

@compute @workgroup_size(256)
fn main(@builtin(global_invocation_id) global_id: vec3<u32>) {
    let index = global_id.x;
    if index >= params.particle_count {
        return;
    }

    let p = particles[index];
    let dt = params.delta_time;

    var position = p.position_life.xyz;
    var life = min(p.position_life.w - dt, params.life_max);
    var velocity = p.velocity_mass.xyz;
    var mass = p.velocity_mass.w;
    var color = p.color;
    var rotation = p.attributes.y;
    var age = p.attributes.z + dt;
    let kind_tag = p.attributes.w;

    // Respawn in place; the fresh particle still integrates below.
    if life <= 0.0 {
        let seed = hash2(index, u32(max(params.time, 0.0) * 1000.0));
        position = params.emitter_position + random_in_ball(seed, params.emitter_radius);
        velocity = random_unit_vector(seed + 3u) * params.initial_speed;
        life = params.life_min + (params.life_max - params.life_min) * rand01(seed + 5u);
        age = 0.0;
        mass = params.mass;
        color = params.color_start;
        rotation = 0.0;
    }

    // 0 = standard, 1 = buoyant, 2 = tracer
    var gravity_scale = 1.0;
    var attractor_scale = 1.0;
    var turbulence_scale = 1.0;
    let kind = i32(round(kind_tag));
    if kind == 1 {
        gravity_scale = -1.0;
    } else if kind == 2 {
        gravity_scale = 0.0;
        attractor_scale = 0.0;
        turbulence_scale = 2.0;
    }

    var force = params.gravity * gravity_scale;
    var pull = vec3<f32>(0.0);
    for (var i = 0u; i < params.attractor_count; i++) {
        pull += attractor_force(attractors[i], position);
    }
    force += pull * attractor_scale;
    if params.turbulence_strength != 0.0 {
        let sample = position * params.turbulence_scale + vec3<f32>(params.time * params.turbulence_speed);
        force += curl3(sample, params.noise_octaves) * params.turbulence_strength * turbulence_scale;
    }

    velocity += force / max(mass, MIN_MASS) * dt;
    velocity *= params.damping;
    position += velocity * dt;

    for (var axis = 0; axis < 3; axis++) {
        let b = params.bounds[axis];
        if position[axis] < -b {
            position[axis] = -b;
            velocity[axis] *= -params.restitution;
        } else if position[axis] > b {
            position[axis] = b;
            velocity[axis] *= -params.restitution;
        }
    }

    var t = 1.0;
    if params.life_max > 0.0 {
        t = clamp(1.0 - life / params.life_max, 0.0, 1.0);
    }
    color = mix(params.color_start, params.color_end, t);
    color.a *= window_step(params.fade_time, age) * window_step(params.fade_time, life);
    let size = params.size_min + (params.size_max - params.size_min) * max(sin(t * PI), 0.0);
    rotation += length(velocity) * dt * params.rotation_rate;

    particles[index] = Particle(
        vec4<f32>(position, life),
        vec4<f32>(velocity, mass),
        color,
        vec4<f32>(size, rotation, age, kind_tag),
    );
}
"#;

/// Full kernel source: utility library followed by the particle kernel.
pub fn particle_kernel_wgsl() -> String {
    format!("{}\n{}", all_utils_wgsl(), KERNEL_WGSL)
}

fn storage_entry(binding: u32, read_only: bool) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::COMPUTE,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Storage { read_only },
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}

/// Build the particle pipeline and its bind group layout.
pub fn create_particle_pipeline(
    device: &wgpu::Device,
) -> (wgpu::ComputePipeline, wgpu::BindGroupLayout) {
    let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some("Particle Kernel Shader"),
        source: wgpu::ShaderSource::Wgsl(particle_kernel_wgsl().into()),
    });

    let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some("Particle Kernel Bind Group Layout"),
        entries: &[
            // Particles
            storage_entry(0, false),
            // Attractors
            storage_entry(1, true),
            // Params
            wgpu::BindGroupLayoutEntry {
                binding: 2,
                visibility: wgpu::ShaderStages::COMPUTE,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            },
        ],
    });

    let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
        label: Some("Particle Kernel Pipeline Layout"),
        bind_group_layouts: &[&bind_group_layout],
        push_constant_ranges: &[],
    });

    let pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
        label: Some("Particle Kernel Pipeline"),
        layout: Some(&pipeline_layout),
        module: &shader,
        entry_point: Some("main"),
        compilation_options: Default::default(),
        cache: None,
    });

    (pipeline, bind_group_layout)
}
