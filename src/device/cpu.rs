//! Host CPU backend.
//!
//! Each [`CpuDevice`] owns one queue thread that drains commands in FIFO
//! order, so the device behaves like an in-order command queue. Kernel
//! launches fan their rows out over `compute_units` scoped threads.

use super::{
    BufferHandle, ComputeDevice, DeviceInfo, DeviceKind, Event, KernelHandle, Precision,
    ProgramDescriptor, StagingBuffer,
};
use crate::error::{Error, Result};
use crate::fractal::{render_rows, KernelVariant, LaunchParams};
use crossbeam_channel::{unbounded, Receiver, Sender};
use parking_lot::Mutex;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

type HostMemory = Arc<Mutex<Vec<f32>>>;

#[derive(Debug, Clone, Copy)]
struct CpuKernel {
    variant: KernelVariant,
    precision: Precision,
}

enum Command {
    Launch {
        kernel: CpuKernel,
        launch: LaunchParams,
        output: HostMemory,
        event: Event,
    },
    Read {
        source: HostMemory,
        len: usize,
        dest: StagingBuffer,
        event: Event,
    },
}

#[derive(Debug)]
pub struct CpuDevice {
    info: DeviceInfo,
    sender: Option<Sender<Command>>,
    queue_thread: Option<JoinHandle<()>>,
    kernels: Mutex<Vec<CpuKernel>>,
    buffers: Mutex<Vec<HostMemory>>,
}

impl CpuDevice {
    pub fn builder() -> CpuDeviceBuilder {
        CpuDeviceBuilder::new()
    }

    /// The whole host CPU.
    pub fn host() -> Result<Self> {
        Self::builder().build()
    }

    fn buffer(&self, handle: BufferHandle) -> Result<HostMemory> {
        self.buffers
            .lock()
            .get(handle.0)
            .cloned()
            .ok_or_else(|| Error::invalid_argument(format!("unknown buffer {:?}", handle)))
    }

    fn submit(&self, command: Command) -> Result<()> {
        let sender = self
            .sender
            .as_ref()
            .ok_or_else(|| Error::Hardware(format!("{} queue is shut down", self.info.name)))?;
        sender
            .send(command)
            .map_err(|_| Error::Hardware(format!("{} queue thread exited", self.info.name)))
    }
}

impl ComputeDevice for CpuDevice {
    fn info(&self) -> &DeviceInfo {
        &self.info
    }

    fn build_program(&self, program: &ProgramDescriptor) -> Result<KernelHandle> {
        if let Some(missing) = program.missing_capability(&self.info) {
            return Err(Error::Build {
                device: self.info.name.clone(),
                program: program.name.clone(),
                flags: program.flags.clone(),
                log: format!("device does not support required capability `{}`", missing),
            });
        }

        let mut kernels = self.kernels.lock();
        kernels.push(CpuKernel {
            variant: program.variant,
            precision: program.precision,
        });
        Ok(KernelHandle(kernels.len() - 1))
    }

    fn create_buffer(&self, len: usize) -> Result<BufferHandle> {
        let mut buffers = self.buffers.lock();
        buffers.push(Arc::new(Mutex::new(vec![0.0; len])));
        Ok(BufferHandle(buffers.len() - 1))
    }

    fn enqueue_kernel(
        &self,
        kernel: KernelHandle,
        launch: &LaunchParams,
        output: BufferHandle,
    ) -> Result<Event> {
        let compiled = self
            .kernels
            .lock()
            .get(kernel.0)
            .copied()
            .ok_or_else(|| Error::invalid_argument(format!("unknown kernel {:?}", kernel)))?;
        let output = self.buffer(output)?;

        if output.lock().len() < launch.pixels() {
            return Err(Error::invalid_argument(format!(
                "launch of {} pixels overflows device buffer",
                launch.pixels()
            )));
        }

        let event = Event::user();
        self.submit(Command::Launch {
            kernel: compiled,
            launch: *launch,
            output,
            event: event.clone(),
        })?;
        Ok(event)
    }

    fn enqueue_read(
        &self,
        buffer: BufferHandle,
        len: usize,
        dest: &StagingBuffer,
    ) -> Result<Event> {
        let source = self.buffer(buffer)?;
        if len > dest.capacity() || len > source.lock().len() {
            return Err(Error::invalid_argument(format!(
                "read of {} values exceeds buffer capacity",
                len
            )));
        }

        let event = Event::user();
        self.submit(Command::Read {
            source,
            len,
            dest: dest.clone(),
            event: event.clone(),
        })?;
        Ok(event)
    }

    fn split_by_compute_units(&self, counts: &[usize]) -> Result<Vec<Arc<dyn ComputeDevice>>> {
        let total: usize = counts.iter().sum();
        if counts.is_empty() || counts.contains(&0) || total > self.info.compute_units {
            return Err(Error::invalid_argument(format!(
                "cannot split {} compute units into {:?}",
                self.info.compute_units, counts
            )));
        }

        counts
            .iter()
            .enumerate()
            .map(|(i, &units)| {
                let device = CpuDevice::builder()
                    .name(format!("{} [part {}: {} units]", self.info.name, i, units))
                    .compute_units(units)
                    .capabilities(self.info.capabilities.clone())
                    .build()?;
                Ok(Arc::new(device) as Arc<dyn ComputeDevice>)
            })
            .collect()
    }
}

impl Drop for CpuDevice {
    fn drop(&mut self) {
        // closing the channel ends the queue loop once it is drained
        self.sender.take();
        if let Some(handle) = self.queue_thread.take() {
            let _ = handle.join();
        }
    }
}

#[derive(Debug, Clone)]
pub struct CpuDeviceBuilder {
    name: Option<String>,
    compute_units: Option<usize>,
    capabilities: Vec<String>,
    thread_name: String,
}

impl CpuDeviceBuilder {
    pub fn new() -> Self {
        Self {
            name: None,
            compute_units: None,
            capabilities: vec!["fp32".to_string(), "fp64".to_string()],
            thread_name: "fractile-cpu".to_string(),
        }
    }

    pub fn name<S: Into<String>>(mut self, name: S) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn compute_units(mut self, units: usize) -> Self {
        self.compute_units = Some(units);
        self
    }

    pub fn capabilities(mut self, capabilities: Vec<String>) -> Self {
        self.capabilities = capabilities;
        self
    }

    pub fn thread_name<S: Into<String>>(mut self, name: S) -> Self {
        self.thread_name = name.into();
        self
    }

    pub fn build(self) -> Result<CpuDevice> {
        let compute_units = self.compute_units.unwrap_or_else(num_cpus::get);
        if compute_units == 0 {
            return Err(Error::config("cpu device needs at least 1 compute unit"));
        }

        let info = DeviceInfo {
            name: self
                .name
                .unwrap_or_else(|| format!("Host CPU ({} units)", compute_units)),
            kind: DeviceKind::Cpu,
            capabilities: self.capabilities,
            compute_units,
        };

        let (sender, receiver) = unbounded();
        let queue_thread = thread::Builder::new()
            .name(self.thread_name)
            .spawn(move || run_queue(receiver, compute_units))
            .map_err(|e| Error::Hardware(format!("spawn failed: {}", e)))?;

        Ok(CpuDevice {
            info,
            sender: Some(sender),
            queue_thread: Some(queue_thread),
            kernels: Mutex::new(Vec::new()),
            buffers: Mutex::new(Vec::new()),
        })
    }
}

impl Default for CpuDeviceBuilder {
    fn default() -> Self {
        Self::new()
    }
}

fn run_queue(receiver: Receiver<Command>, compute_units: usize) {
    for command in receiver.iter() {
        match command {
            Command::Launch {
                kernel,
                launch,
                output,
                event,
            } => {
                event.set_running();
                let result = panic::catch_unwind(AssertUnwindSafe(|| {
                    let mut memory = output.lock();
                    execute_kernel(kernel, &launch, &mut memory[..launch.pixels()], compute_units);
                }));
                match result {
                    Ok(()) => event.set_complete(),
                    Err(_) => event.set_failed(format!(
                        "{:?} kernel panicked on {}x{} launch",
                        kernel.variant, launch.width, launch.height
                    )),
                }
            }
            Command::Read {
                source,
                len,
                dest,
                event,
            } => {
                event.set_running();
                dest.write(&source.lock()[..len]);
                event.set_complete();
            }
        }
    }
}

fn execute_kernel(kernel: CpuKernel, launch: &LaunchParams, out: &mut [f32], units: usize) {
    if launch.width == 0 || launch.height == 0 {
        return;
    }

    let render = |first_row: usize, rows: &mut [f32]| match kernel.precision {
        Precision::Single => render_rows::<f32>(kernel.variant, launch, first_row, rows),
        Precision::Double => render_rows::<f64>(kernel.variant, launch, first_row, rows),
    };

    let units = units.min(launch.height);
    if units <= 1 {
        render(0, out);
        return;
    }

    let rows_per_unit = (launch.height + units - 1) / units;
    thread::scope(|scope| {
        for (i, rows) in out.chunks_mut(rows_per_unit * launch.width).enumerate() {
            let render = &render;
            scope.spawn(move || render(i * rows_per_unit, rows));
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    fn launch(width: usize, height: usize) -> LaunchParams {
        LaunchParams {
            origin: (-2.0, -2.0),
            step: (4.0 / width as f64, 4.0 / height as f64),
            width,
            height,
            exponent: 2.0,
            max_iterations: 64,
        }
    }

    #[test]
    fn test_kernel_then_read() {
        let device = CpuDevice::builder().compute_units(3).build().unwrap();
        let program = ProgramDescriptor::escape_time(KernelVariant::Quadratic, Precision::Double);
        let kernel = device.build_program(&program).unwrap();
        let buffer = device.create_buffer(64).unwrap();
        let staging = StagingBuffer::new(64);

        let params = launch(8, 8);
        let compute = device.enqueue_kernel(kernel, &params, buffer).unwrap();
        let copy = device.enqueue_read(buffer, 64, &staging).unwrap();

        copy.wait().unwrap();
        // in-order queue: the copy cannot finish before the kernel
        assert!(compute.is_complete());
        assert!(compute.elapsed().is_some());
        // and its timing never overlaps the kernel's
        assert!(copy.started_at().unwrap() >= compute.finished_at().unwrap());
        let wall = copy.finished_at().unwrap() - compute.started_at().unwrap();
        assert!(compute.elapsed().unwrap() + copy.elapsed().unwrap() <= wall);

        let mut expected = vec![0.0; 64];
        render_rows::<f64>(KernelVariant::Quadratic, &params, 0, &mut expected);
        assert_eq!(&*staging.view(64), &expected[..]);
    }

    #[test]
    fn test_multi_unit_matches_single_unit() {
        let params = launch(13, 11);
        let kernel = CpuKernel {
            variant: KernelVariant::Cubic,
            precision: Precision::Single,
        };

        let mut single = vec![0.0; params.pixels()];
        let mut multi = vec![0.0; params.pixels()];
        execute_kernel(kernel, &params, &mut single, 1);
        execute_kernel(kernel, &params, &mut multi, 4);

        assert_eq!(single, multi);
    }

    #[test]
    fn test_missing_capability_fails_build() {
        let device = CpuDevice::builder()
            .capabilities(vec!["fp32".to_string()])
            .compute_units(1)
            .build()
            .unwrap();
        let program = ProgramDescriptor::escape_time(KernelVariant::General, Precision::Double);

        match device.build_program(&program) {
            Err(Error::Build { log, .. }) => assert!(log.contains("fp64")),
            other => panic!("expected build error, got {:?}", other),
        }
    }

    #[test]
    fn test_split_by_compute_units() {
        let device = CpuDevice::builder().compute_units(4).build().unwrap();
        let parts = device.split_by_compute_units(&[3, 1]).unwrap();

        assert_eq!(parts.len(), 2);
        assert_eq!(parts[0].info().compute_units, 3);
        assert_eq!(parts[1].info().compute_units, 1);
        assert!(device.split_by_compute_units(&[4, 1]).is_err());
        assert!(device.split_by_compute_units(&[0, 2]).is_err());
    }

    #[test]
    fn test_kernel_panic_fails_event() {
        let (sender, receiver) = unbounded();
        let queue = thread::spawn(move || run_queue(receiver, 2));

        // output shorter than the launch; enqueue_kernel would refuse this
        let launch_event = Event::user();
        sender
            .send(Command::Launch {
                kernel: CpuKernel {
                    variant: KernelVariant::Quadratic,
                    precision: Precision::Double,
                },
                launch: launch(8, 8),
                output: Arc::new(Mutex::new(vec![0.0; 10])),
                event: launch_event.clone(),
            })
            .unwrap();

        let staging = StagingBuffer::new(4);
        let read_event = Event::user();
        sender
            .send(Command::Read {
                source: Arc::new(Mutex::new(vec![1.0; 4])),
                len: 4,
                dest: staging.clone(),
                event: read_event.clone(),
            })
            .unwrap();

        match launch_event.wait() {
            Err(Error::Hardware(message)) => assert!(message.contains("panicked")),
            other => panic!("expected hardware error, got {:?}", other),
        }

        // the queue keeps serving after the panic
        read_event.wait().unwrap();
        assert_eq!(&*staging.view(4), &[1.0; 4]);

        drop(sender);
        queue.join().unwrap();
    }

    #[test]
    fn test_read_overflow_rejected() {
        let device = CpuDevice::builder().compute_units(1).build().unwrap();
        let buffer = device.create_buffer(4).unwrap();
        let staging = StagingBuffer::new(2);
        assert!(device.enqueue_read(buffer, 4, &staging).is_err());
    }
}
