//! Whole-frame compute offload through wgpu.

use super::DeviceError;
use crate::compute::{Buffer, FrameBuffers, Viewport};

// Embed shader sources at compile time
const MANDEL_SHADER: &str = include_str!("shaders/mandel.wgsl");
const SCROLLUP_SHADER: &str = include_str!("shaders/scrollup.wgsl");

/// Workgroup edge length used by every shader.
const WORKGROUP: u32 = 16;

/// Kernels with a device implementation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceKernel {
    Mandel,
    ScrollUp,
}

impl DeviceKernel {
    /// Look up the device kernel for a kernel name.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "mandel" => Some(Self::Mandel),
            "scrollup" => Some(Self::ScrollUp),
            _ => None,
        }
    }

    fn source(self) -> &'static str {
        match self {
            Self::Mandel => MANDEL_SHADER,
            Self::ScrollUp => SCROLLUP_SHADER,
        }
    }
}

/// Parameters of one enqueued wave.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WaveParams {
    /// Viewing window of this iteration (ignored by kernels without one).
    pub viewport: Viewport,
    /// Per-pixel iteration cap.
    pub max_iter: u32,
}

/// Uniform buffer struct shared by every shader.
#[repr(C)]
#[derive(Copy, Clone, Debug, bytemuck::Pod, bytemuck::Zeroable)]
struct WaveUniforms {
    dim: u32,
    max_iter: u32,
    _pad0: u32,
    _pad1: u32,
    left_x: f32,
    x_step: f32,
    top_y: f32,
    y_step: f32,
}

/// A compute device holding a copy of the raster.
///
/// Each wave reads one device buffer and writes the other, then the roles
/// flip, so the device keeps its own double buffer.
pub struct DeviceOffload {
    device: wgpu::Device,
    queue: wgpu::Queue,
    kernel: DeviceKernel,
    dim: usize,

    pipeline: wgpu::ComputePipeline,
    params_buffer: wgpu::Buffer,
    frame_buffers: [wgpu::Buffer; 2],
    staging_buffer: wgpu::Buffer,
    /// `bind_groups[i]` reads `frame_buffers[i]` and writes the other one.
    bind_groups: [wgpu::BindGroup; 2],

    /// Index of the device buffer holding the latest frame.
    current: usize,
    enqueued: u64,
}

impl DeviceOffload {
    /// Open a device and build the pipeline of `kernel` for a `dim`×`dim` raster.
    pub async fn new(kernel: &str, dim: usize) -> Result<Self, DeviceError> {
        let kernel = DeviceKernel::from_name(kernel)
            .ok_or_else(|| DeviceError::UnsupportedKernel(kernel.to_string()))?;

        // 1. Create wgpu instance
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });

        // 2. Request adapter
        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: None,
                force_fallback_adapter: false,
            })
            .await
            .map_err(|_| DeviceError::NoAdapter)?;

        // 3. Request device and queue
        let (device, queue): (wgpu::Device, wgpu::Queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: Some("Raster Waves Device"),
                required_features: wgpu::Features::empty(),
                required_limits: wgpu::Limits::default(),
                ..Default::default()
            })
            .await?;

        // 4. Pipeline
        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Wave Shader"),
            source: wgpu::ShaderSource::Wgsl(kernel.source().into()),
        });
        let bind_group_layout = create_wave_bind_group_layout(&device);
        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Wave Pipeline Layout"),
            bind_group_layouts: &[&bind_group_layout],
            ..Default::default()
        });
        let pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
            label: Some("Wave Pipeline"),
            layout: Some(&pipeline_layout),
            module: &shader,
            entry_point: Some("main"),
            compilation_options: Default::default(),
            cache: None,
        });

        // 5. Buffers
        let frame_size = (dim * dim * std::mem::size_of::<u32>()) as u64;
        let params_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Wave Params"),
            size: std::mem::size_of::<WaveUniforms>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let create_frame = |label| {
            device.create_buffer(&wgpu::BufferDescriptor {
                label: Some(label),
                size: frame_size,
                usage: wgpu::BufferUsages::STORAGE
                    | wgpu::BufferUsages::COPY_DST
                    | wgpu::BufferUsages::COPY_SRC,
                mapped_at_creation: false,
            })
        };
        let frame_buffers = [create_frame("Frame Buffer A"), create_frame("Frame Buffer B")];
        let staging_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Staging Buffer"),
            size: frame_size,
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        // 6. One bind group per direction
        let create_bind_group = |src: &wgpu::Buffer, dst: &wgpu::Buffer| {
            device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("Wave Bind Group"),
                layout: &bind_group_layout,
                entries: &[
                    wgpu::BindGroupEntry {
                        binding: 0,
                        resource: params_buffer.as_entire_binding(),
                    },
                    wgpu::BindGroupEntry {
                        binding: 1,
                        resource: src.as_entire_binding(),
                    },
                    wgpu::BindGroupEntry {
                        binding: 2,
                        resource: dst.as_entire_binding(),
                    },
                ],
            })
        };
        let bind_groups = [
            create_bind_group(&frame_buffers[0], &frame_buffers[1]),
            create_bind_group(&frame_buffers[1], &frame_buffers[0]),
        ];

        log::debug!("Device offload ready for {:?} on a {}x{} raster", kernel, dim, dim);

        Ok(Self {
            device,
            queue,
            kernel,
            dim,
            pipeline,
            params_buffer,
            frame_buffers,
            staging_buffer,
            bind_groups,
            current: 0,
            enqueued: 0,
        })
    }

    /// Kernel this device runs.
    #[inline]
    pub fn kernel(&self) -> DeviceKernel {
        self.kernel
    }

    /// Number of waves enqueued so far.
    #[inline]
    pub fn enqueued(&self) -> u64 {
        self.enqueued
    }

    /// Upload the host's current buffer. Called once before iterating.
    pub fn send_full_frame(&mut self, frames: &FrameBuffers) {
        assert_eq!(frames.dim(), self.dim, "raster size changed after device setup");
        let data = frames.snapshot(Buffer::Current);
        self.queue.write_buffer(
            &self.frame_buffers[self.current],
            0,
            bytemuck::cast_slice(&data),
        );
    }

    /// Submit one whole-frame iteration. Does not block.
    pub fn enqueue_wave(&mut self, params: WaveParams) {
        let uniforms = WaveUniforms {
            dim: self.dim as u32,
            max_iter: params.max_iter,
            _pad0: 0,
            _pad1: 0,
            left_x: params.viewport.left_x,
            x_step: params.viewport.x_step,
            top_y: params.viewport.top_y,
            y_step: params.viewport.y_step,
        };
        self.queue
            .write_buffer(&self.params_buffer, 0, bytemuck::bytes_of(&uniforms));

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Wave Encoder"),
            });

        let workgroups = (self.dim as u32).div_ceil(WORKGROUP);
        {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("Wave Pass"),
                timestamp_writes: None,
            });
            pass.set_pipeline(&self.pipeline);
            pass.set_bind_group(0, &self.bind_groups[self.current], &[]);
            pass.dispatch_workgroups(workgroups, workgroups, 1);
        }

        self.queue.submit(std::iter::once(encoder.finish()));
        self.current ^= 1;
        self.enqueued += 1;
    }

    /// Block until every enqueued wave has completed and copy the latest
    /// frame into the host's current buffer. Does nothing before the first
    /// wave.
    pub fn wait(&mut self, frames: &FrameBuffers) -> Result<(), DeviceError> {
        // The host already holds the uploaded frame
        if self.enqueued == 0 {
            return Ok(());
        }

        let frame_size = (self.dim * self.dim * std::mem::size_of::<u32>()) as u64;

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Readback Encoder"),
            });
        encoder.copy_buffer_to_buffer(
            &self.frame_buffers[self.current],
            0,
            &self.staging_buffer,
            0,
            frame_size,
        );
        self.queue.submit(std::iter::once(encoder.finish()));

        let buffer_slice = self.staging_buffer.slice(..);
        let (tx, rx) = std::sync::mpsc::channel();
        buffer_slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = tx.send(result);
        });

        self.device.poll(wgpu::PollType::wait_indefinitely())?;
        rx.recv().map_err(|_| DeviceError::ReadbackLost)??;

        {
            let data = buffer_slice.get_mapped_range();
            frames.load(Buffer::Current, bytemuck::cast_slice(&data));
        }

        self.staging_buffer.unmap();
        Ok(())
    }
}

fn create_wave_bind_group_layout(device: &wgpu::Device) -> wgpu::BindGroupLayout {
    device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some("Wave Bind Group Layout"),
        entries: &[
            wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::COMPUTE,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            },
            wgpu::BindGroupLayoutEntry {
                binding: 1,
                visibility: wgpu::ShaderStages::COMPUTE,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Storage { read_only: true },
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            },
            wgpu::BindGroupLayoutEntry {
                binding: 2,
                visibility: wgpu::ShaderStages::COMPUTE,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Storage { read_only: false },
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            },
        ],
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::Seed;

    fn open(kernel: &str, dim: usize) -> Option<DeviceOffload> {
        match pollster::block_on(DeviceOffload::new(kernel, dim)) {
            Ok(device) => Some(device),
            Err(DeviceError::NoAdapter) => {
                eprintln!("Skipping GPU test: no adapter available");
                None
            }
            Err(e) => panic!("Failed to open device: {:?}", e),
        }
    }

    #[test]
    fn test_unknown_kernel_rejected() {
        let result = pollster::block_on(DeviceOffload::new("life", 16));
        assert!(matches!(result, Err(DeviceError::UnsupportedKernel(name)) if name == "life"));
    }

    #[test]
    fn test_device_scrollup_matches_host_rotation() {
        let dim = 32;
        let Some(mut device) = open("scrollup", dim) else {
            return;
        };

        let frames = FrameBuffers::allocate(dim);
        let initial = Seed::default().generate(dim).unwrap();
        frames.load(Buffer::Current, &initial);
        device.send_full_frame(&frames);

        let params = WaveParams {
            viewport: Viewport::initial(dim),
            max_iter: 0,
        };
        for _ in 0..3 {
            device.enqueue_wave(params);
        }
        device.wait(&frames).unwrap();
        assert_eq!(device.enqueued(), 3);

        let mut expected = initial.clone();
        expected.rotate_left(3 * dim);
        assert_eq!(frames.snapshot(Buffer::Current), expected);
    }
}
