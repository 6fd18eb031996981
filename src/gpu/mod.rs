//! wgpu compute backend for the particle kernel.
//!
//! [`GpuParticleSimulator`] keeps the pool resident in a storage buffer and
//! advances it with one dispatch per frame. It is headless: no surface, no
//! window. A host renderer can bind [`GpuParticleSimulator::particle_buffer`]
//! directly as vertex or storage input.

mod particle_kernel;

use std::sync::mpsc;

use bytemuck::Zeroable;
use log::{debug, info};
use wgpu::util::DeviceExt;

use crate::attractor::Attractor;
use crate::error::GpuError;
use crate::params::SimulationParams;
use crate::particle::Particle;
use crate::particles::ParticleSimulator;
use crate::uniforms::{AttractorGpu, ParticleGpu, SimulationParamsGpu};

pub use particle_kernel::{create_particle_pipeline, particle_kernel_wgsl, WORKGROUP_SIZE};

/// A device and queue with no presentation surface.
pub struct GpuContext {
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
    pub adapter_info: wgpu::AdapterInfo,
}

impl GpuContext {
    /// Acquire a high-performance adapter and open a device on it.
    ///
    /// Blocks the calling thread until the device is ready.
    pub fn new_headless() -> Result<Self, GpuError> {
        pollster::block_on(Self::request())
    }

    async fn request() -> Result<Self, GpuError> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor::default());

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: None,
                force_fallback_adapter: false,
            })
            .await
            .ok_or(GpuError::NoAdapter)?;

        let adapter_info = adapter.get_info();
        debug!(
            "GPU adapter: {} ({:?}, {:?})",
            adapter_info.name, adapter_info.backend, adapter_info.device_type
        );

        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("backdrop device"),
                    required_features: wgpu::Features::empty(),
                    required_limits: wgpu::Limits::downlevel_defaults(),
                    memory_hints: wgpu::MemoryHints::Performance,
                },
                None,
            )
            .await?;

        Ok(Self {
            device,
            queue,
            adapter_info,
        })
    }
}

/// Particle pool advanced on the GPU.
pub struct GpuParticleSimulator {
    context: GpuContext,
    pipeline: wgpu::ComputePipeline,
    bind_group: wgpu::BindGroup,
    particle_buffer: wgpu::Buffer,
    attractor_buffer: wgpu::Buffer,
    params_buffer: wgpu::Buffer,
    staging_buffer: wgpu::Buffer,
    particle_count: u32,
    attractor_capacity: usize,
}

impl GpuParticleSimulator {
    /// Open a headless device and upload a fresh pool built from `params`.
    ///
    /// `attractor_capacity` bounds how many attractors a single
    /// [`step`](Self::step) may pass.
    pub fn new(params: &SimulationParams, attractor_capacity: usize) -> Result<Self, GpuError> {
        let pool = ParticleSimulator::new(params)?;
        let context = GpuContext::new_headless()?;
        Ok(Self::with_context(context, pool.particles(), attractor_capacity))
    }

    /// Build on an existing device from a CPU pool.
    pub fn with_context(
        context: GpuContext,
        particles: &[Particle],
        attractor_capacity: usize,
    ) -> Self {
        let device = &context.device;
        let gpu_particles: Vec<ParticleGpu> = particles.iter().map(ParticleGpu::from).collect();
        let particle_bytes = std::mem::size_of_val(gpu_particles.as_slice()) as u64;

        let particle_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Particle Buffer"),
            contents: bytemuck::cast_slice(&gpu_particles),
            usage: wgpu::BufferUsages::STORAGE
                | wgpu::BufferUsages::VERTEX
                | wgpu::BufferUsages::COPY_SRC
                | wgpu::BufferUsages::COPY_DST,
        });

        // Storage bindings cannot be empty.
        let attractor_slots = attractor_capacity.max(1);
        let attractor_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Attractor Buffer"),
            size: (attractor_slots * std::mem::size_of::<AttractorGpu>()) as u64,
            usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let params_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Particle Params Buffer"),
            contents: bytemuck::bytes_of(&SimulationParamsGpu::zeroed()),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });

        let staging_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Particle Staging Buffer"),
            size: particle_bytes,
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let (pipeline, bind_group_layout) = create_particle_pipeline(device);
        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Particle Kernel Bind Group"),
            layout: &bind_group_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: particle_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: attractor_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: params_buffer.as_entire_binding(),
                },
            ],
        });

        info!(
            "GPU particle pool ready: {} particles on {}",
            particles.len(),
            context.adapter_info.name
        );

        Self {
            context,
            pipeline,
            bind_group,
            particle_buffer,
            attractor_buffer,
            params_buffer,
            staging_buffer,
            particle_count: particles.len() as u32,
            attractor_capacity,
        }
    }

    /// Dispatch one frame. `params.delta_time` is the step size.
    ///
    /// # Errors
    ///
    /// Fails before touching the device if more attractors are passed than
    /// the buffer holds.
    pub fn step(
        &mut self,
        attractors: &[Attractor],
        params: &SimulationParams,
    ) -> Result<(), GpuError> {
        if attractors.len() > self.attractor_capacity {
            return Err(GpuError::AttractorCapacity {
                requested: attractors.len(),
                capacity: self.attractor_capacity,
            });
        }

        let queue = &self.context.queue;
        if !attractors.is_empty() {
            let packed: Vec<AttractorGpu> = attractors.iter().map(AttractorGpu::from).collect();
            queue.write_buffer(&self.attractor_buffer, 0, bytemuck::cast_slice(&packed));
        }

        let mut uniforms = SimulationParamsGpu::new(params, attractors.len() as u32);
        uniforms.particle_count = self.particle_count;
        queue.write_buffer(&self.params_buffer, 0, bytemuck::bytes_of(&uniforms));

        let mut encoder = self
            .context
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Particle Step Encoder"),
            });
        {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("Particle Step Pass"),
                timestamp_writes: None,
            });
            pass.set_pipeline(&self.pipeline);
            pass.set_bind_group(0, &self.bind_group, &[]);
            pass.dispatch_workgroups(self.particle_count.div_ceil(WORKGROUP_SIZE), 1, 1);
        }
        queue.submit(Some(encoder.finish()));
        Ok(())
    }

    /// Replace the resident pool.
    pub fn upload(&mut self, particles: &[Particle]) -> Result<(), GpuError> {
        if particles.len() != self.particle_count as usize {
            return Err(GpuError::ParticleCount {
                expected: self.particle_count as usize,
                actual: particles.len(),
            });
        }
        let packed: Vec<ParticleGpu> = particles.iter().map(ParticleGpu::from).collect();
        self.context
            .queue
            .write_buffer(&self.particle_buffer, 0, bytemuck::cast_slice(&packed));
        Ok(())
    }

    /// Copy the pool back to the CPU. Blocks until the GPU is idle.
    pub fn read_particles(&self) -> Result<Vec<Particle>, GpuError> {
        let device = &self.context.device;
        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("Particle Readback Encoder"),
        });
        encoder.copy_buffer_to_buffer(
            &self.particle_buffer,
            0,
            &self.staging_buffer,
            0,
            self.staging_buffer.size(),
        );
        self.context.queue.submit(Some(encoder.finish()));

        let buffer_slice = self.staging_buffer.slice(..);
        let (tx, rx) = mpsc::channel();
        buffer_slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = tx.send(result);
        });
        device.poll(wgpu::Maintain::Wait);

        rx.recv()
            .map_err(|e| GpuError::BufferMapping(e.to_string()))?
            .map_err(|e| GpuError::BufferMapping(e.to_string()))?;

        let particles = {
            let data = buffer_slice.get_mapped_range();
            bytemuck::cast_slice::<u8, ParticleGpu>(&data)
                .iter()
                .map(|g| Particle::from(*g))
                .collect()
        };
        self.staging_buffer.unmap();
        Ok(particles)
    }

    /// The resident particle buffer, laid out as [`ParticleGpu`].
    pub fn particle_buffer(&self) -> &wgpu::Buffer {
        &self.particle_buffer
    }

    /// Number of particle slots.
    pub fn particle_count(&self) -> u32 {
        self.particle_count
    }

    /// Device information, for diagnostics.
    pub fn adapter_info(&self) -> &wgpu::AdapterInfo {
        &self.context.adapter_info
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;

    #[test]
    #[ignore = "requires a GPU adapter"]
    fn test_gpu_step_matches_cpu_bounds() {
        let params = SimulationParams::new(1024)
            .with_bounds(Vec3::splat(1.0))
            .with_initial_speed(10.0);
        let mut sim = GpuParticleSimulator::new(&params, 4).expect("GPU available");
        let attractors = [Attractor::new(Vec3::Y, 5.0)];
        for frame in 0..10 {
            sim.step(&attractors, &params.snapshot(0.05, frame as f32 * 0.05))
                .unwrap();
        }
        let particles = sim.read_particles().unwrap();
        assert_eq!(particles.len(), 1024);
        for p in particles {
            assert!(p.position.abs().max_element() <= 1.0 + 1e-5);
        }
    }

    #[test]
    #[ignore = "requires a GPU adapter"]
    fn test_gpu_rejects_too_many_attractors() {
        let params = SimulationParams::new(16);
        let mut sim = GpuParticleSimulator::new(&params, 1).expect("GPU available");
        let attractors = [Attractor::default(); 2];
        assert!(matches!(
            sim.step(&attractors, &params),
            Err(GpuError::AttractorCapacity { requested: 2, capacity: 1 })
        ));
    }
}
