//! GPU backend using wgpu.
//!
//! wgpu only advances callbacks while the host polls the device, so every
//! event issued here is pumped: status queries poll without blocking and
//! waits poll with `Maintain::Wait`.

use super::{
    BufferHandle, ComputeDevice, DeviceInfo, DeviceKind, Event, EventPump, KernelHandle,
    ProgramDescriptor, StagingBuffer,
};
use crate::error::{Error, Result};
use crate::fractal::LaunchParams;
use bytemuck::{Pod, Zeroable};
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;

const WORKGROUP_SIZE: u32 = 8;

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
struct GpuParams {
    origin: [f32; 2],
    step: [f32; 2],
    exponent: f32,
    max_iterations: u32,
    width: u32,
    height: u32,
}

struct Allocation {
    storage: wgpu::Buffer,
    readback: Arc<wgpu::Buffer>,
    len: usize,
}

type MapResult = Arc<Mutex<Option<std::result::Result<(), wgpu::BufferAsyncError>>>>;

struct PendingRead {
    readback: Arc<wgpu::Buffer>,
    bytes: u64,
    dest: StagingBuffer,
    event: Event,
    mapped: MapResult,
}

struct GpuPump {
    device: Arc<wgpu::Device>,
    reads: Mutex<Vec<PendingRead>>,
}

impl EventPump for GpuPump {
    fn pump(&self, block: bool) {
        let maintain = if block {
            wgpu::Maintain::Wait
        } else {
            wgpu::Maintain::Poll
        };
        let _ = self.device.poll(maintain);

        let mut reads = self.reads.lock();
        reads.retain(|read| {
            let outcome = match read.mapped.lock().take() {
                Some(outcome) => outcome,
                None => return true,
            };
            match outcome {
                Ok(()) => {
                    {
                        let view = read.readback.slice(0..read.bytes).get_mapped_range();
                        read.dest.write(bytemuck::cast_slice(&view[..]));
                    }
                    read.readback.unmap();
                    read.event.set_complete();
                }
                Err(e) => read.event.set_failed(format!("readback mapping failed: {}", e)),
            }
            false
        });
    }
}

/// One wgpu adapter with its own device and queue.
pub struct GpuDevice {
    info: DeviceInfo,
    device: Arc<wgpu::Device>,
    queue: wgpu::Queue,
    bind_group_layout: wgpu::BindGroupLayout,
    pipeline_layout: wgpu::PipelineLayout,
    params: wgpu::Buffer,
    kernels: Mutex<Vec<wgpu::ComputePipeline>>,
    buffers: Mutex<Vec<Allocation>>,
    pump: Arc<GpuPump>,
}

impl GpuDevice {
    /// Open every hardware adapter wgpu can see. Software rasterizers are
    /// skipped; adapters that fail to open are reported individually.
    pub fn enumerate() -> Vec<Result<GpuDevice>> {
        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });

        instance
            .enumerate_adapters(wgpu::Backends::all())
            .into_iter()
            .filter(|adapter| adapter.get_info().device_type != wgpu::DeviceType::Cpu)
            .map(|adapter| Self::with_adapter(&adapter))
            .collect()
    }

    pub fn with_adapter(adapter: &wgpu::Adapter) -> Result<Self> {
        let adapter_info = adapter.get_info();

        let (device, queue) = pollster::block_on(adapter.request_device(
            &wgpu::DeviceDescriptor {
                label: Some("fractile-gpu-device"),
                required_features: wgpu::Features::empty(),
                required_limits: adapter.limits(),
            },
            None,
        ))
        .map_err(|e| Error::Hardware(format!("failed to open {}: {}", adapter_info.name, e)))?;
        let device = Arc::new(device);

        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("fractile-escape-layout"),
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
                        ty: wgpu::BufferBindingType::Storage { read_only: false },
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
            ],
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("fractile-escape-pipeline-layout"),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });

        let params = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("fractile-escape-params"),
            size: std::mem::size_of::<GpuParams>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let info = DeviceInfo {
            name: format!("{} ({:?})", adapter_info.name, adapter_info.backend),
            kind: DeviceKind::Gpu,
            capabilities: vec!["fp32".to_string()],
            // wgpu does not report compute-unit counts
            compute_units: 1,
        };

        let pump = Arc::new(GpuPump {
            device: Arc::clone(&device),
            reads: Mutex::new(Vec::new()),
        });

        Ok(Self {
            info,
            device,
            queue,
            bind_group_layout,
            pipeline_layout,
            params,
            kernels: Mutex::new(Vec::new()),
            buffers: Mutex::new(Vec::new()),
            pump,
        })
    }

    fn new_event(&self) -> Event {
        Event::pumped(self.pump.clone())
    }
}

impl ComputeDevice for GpuDevice {
    fn info(&self) -> &DeviceInfo {
        &self.info
    }

    fn build_program(&self, program: &ProgramDescriptor) -> Result<KernelHandle> {
        let build_error = |log: String| Error::Build {
            device: self.info.name.clone(),
            program: program.name.clone(),
            flags: program.flags.clone(),
            log,
        };

        if let Some(missing) = program.missing_capability(&self.info) {
            return Err(build_error(format!(
                "device does not support required capability `{}`",
                missing
            )));
        }

        self.device.push_error_scope(wgpu::ErrorFilter::Validation);

        let module = self.device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("fractile-escape-shader"),
            source: wgpu::ShaderSource::Wgsl(program.source.into()),
        });

        let pipeline = self
            .device
            .create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
                label: Some(program.name.as_str()),
                layout: Some(&self.pipeline_layout),
                module: &module,
                entry_point: program.variant.entry_point(),
            });

        if let Some(err) = pollster::block_on(self.device.pop_error_scope()) {
            return Err(build_error(err.to_string()));
        }

        let mut kernels = self.kernels.lock();
        kernels.push(pipeline);
        Ok(KernelHandle(kernels.len() - 1))
    }

    fn create_buffer(&self, len: usize) -> Result<BufferHandle> {
        let bytes = (len.max(1) * std::mem::size_of::<f32>()) as u64;

        let storage = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("fractile-output"),
            size: bytes,
            usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_SRC,
            mapped_at_creation: false,
        });
        let readback = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("fractile-readback"),
            size: bytes,
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let mut buffers = self.buffers.lock();
        buffers.push(Allocation {
            storage,
            readback: Arc::new(readback),
            len,
        });
        Ok(BufferHandle(buffers.len() - 1))
    }

    fn enqueue_kernel(
        &self,
        kernel: KernelHandle,
        launch: &LaunchParams,
        output: BufferHandle,
    ) -> Result<Event> {
        let kernels = self.kernels.lock();
        let pipeline = kernels
            .get(kernel.0)
            .ok_or_else(|| Error::invalid_argument(format!("unknown kernel {:?}", kernel)))?;
        let buffers = self.buffers.lock();
        let allocation = buffers
            .get(output.0)
            .ok_or_else(|| Error::invalid_argument(format!("unknown buffer {:?}", output)))?;
        if launch.pixels() > allocation.len {
            return Err(Error::invalid_argument(format!(
                "launch of {} pixels overflows device buffer",
                launch.pixels()
            )));
        }

        let params = GpuParams {
            origin: [launch.origin.0 as f32, launch.origin.1 as f32],
            step: [launch.step.0 as f32, launch.step.1 as f32],
            exponent: launch.exponent as f32,
            max_iterations: launch.max_iterations,
            width: launch.width as u32,
            height: launch.height as u32,
        };
        self.queue
            .write_buffer(&self.params, 0, bytemuck::bytes_of(&params));

        let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("fractile-escape-bind-group"),
            layout: &self.bind_group_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: self.params.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: allocation.storage.as_entire_binding(),
                },
            ],
        });

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("fractile-escape-encoder"),
            });
        {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("fractile-escape-pass"),
                timestamp_writes: None,
            });
            pass.set_pipeline(pipeline);
            pass.set_bind_group(0, &bind_group, &[]);
            pass.dispatch_workgroups(
                (launch.width as u32 + WORKGROUP_SIZE - 1) / WORKGROUP_SIZE,
                (launch.height as u32 + WORKGROUP_SIZE - 1) / WORKGROUP_SIZE,
                1,
            );
        }

        let event = self.new_event();
        event.set_running();
        self.queue.submit(Some(encoder.finish()));

        let done = event.clone();
        self.queue.on_submitted_work_done(move || done.set_complete());
        Ok(event)
    }

    fn enqueue_read(
        &self,
        buffer: BufferHandle,
        len: usize,
        dest: &StagingBuffer,
    ) -> Result<Event> {
        let buffers = self.buffers.lock();
        let allocation = buffers
            .get(buffer.0)
            .ok_or_else(|| Error::invalid_argument(format!("unknown buffer {:?}", buffer)))?;
        if len > allocation.len || len > dest.capacity() {
            return Err(Error::invalid_argument(format!(
                "read of {} values exceeds buffer capacity",
                len
            )));
        }

        let event = self.new_event();
        if len == 0 {
            event.set_running();
            event.set_complete();
            return Ok(event);
        }

        // The queue is in order: the copy starts once everything submitted
        // before it, the kernel included, has finished.
        let start = event.clone();
        self.queue.on_submitted_work_done(move || start.set_running());

        let bytes = (len * std::mem::size_of::<f32>()) as u64;
        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("fractile-readback-encoder"),
            });
        encoder.copy_buffer_to_buffer(&allocation.storage, 0, &allocation.readback, 0, bytes);
        self.queue.submit(Some(encoder.finish()));

        let mapped: MapResult = Arc::new(Mutex::new(None));
        let slot = Arc::clone(&mapped);
        allocation
            .readback
            .slice(0..bytes)
            .map_async(wgpu::MapMode::Read, move |outcome| {
                *slot.lock() = Some(outcome);
            });

        self.pump.reads.lock().push(PendingRead {
            readback: Arc::clone(&allocation.readback),
            bytes,
            dest: dest.clone(),
            event: event.clone(),
            mapped,
        });
        Ok(event)
    }
}

impl fmt::Debug for GpuDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GpuDevice")
            .field("info", &self.info)
            .field("kernels", &self.kernels.lock().len())
            .field("buffers", &self.buffers.lock().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::Precision;
    use crate::fractal::{render_rows, KernelVariant};

    #[test]
    fn test_gpu_matches_host_quadratic() {
        // Requires a GPU; silently passes without one.
        let device = match GpuDevice::enumerate().into_iter().find_map(|d| d.ok()) {
            Some(device) => device,
            None => return,
        };

        let program = ProgramDescriptor::escape_time(KernelVariant::Quadratic, Precision::Single);
        let kernel = device.build_program(&program).unwrap();
        let buffer = device.create_buffer(256).unwrap();
        let staging = StagingBuffer::new(256);

        let launch = LaunchParams {
            origin: (-2.0, -2.0),
            step: (0.25, 0.25),
            width: 16,
            height: 16,
            exponent: 2.0,
            max_iterations: 32,
        };
        let compute = device.enqueue_kernel(kernel, &launch, buffer).unwrap();
        let copy = device.enqueue_read(buffer, 256, &staging).unwrap();
        copy.wait().unwrap();
        compute.wait().unwrap();

        // copy timing begins where kernel timing ends
        let copy_started = copy.started_at().unwrap();
        assert!(copy_started >= compute.finished_at().unwrap());
        let wall = copy.finished_at().unwrap() - compute.started_at().unwrap();
        let timed = compute.elapsed().unwrap() + copy.elapsed().unwrap();
        assert!(timed <= wall, "{:?} timed over {:?} wall", timed, wall);

        let mut expected = vec![0.0; 256];
        render_rows::<f32>(KernelVariant::Quadratic, &launch, 0, &mut expected);
        let view = staging.view(256);
        let mismatches = view
            .iter()
            .zip(&expected)
            .filter(|(a, b)| (**a - **b).abs() > 0.1)
            .count();
        assert!(mismatches < 8, "{} pixels disagree", mismatches);
    }

    #[test]
    fn test_gpu_rejects_double_precision() {
        let device = match GpuDevice::enumerate().into_iter().find_map(|d| d.ok()) {
            Some(device) => device,
            None => return,
        };
        let program = ProgramDescriptor::escape_time(KernelVariant::General, Precision::Double);
        assert!(matches!(
            device.build_program(&program),
            Err(Error::Build { .. })
        ));
    }
}
