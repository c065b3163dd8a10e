//! Device discovery and selection.

use super::{ComputeDevice, CpuDevice, DeviceId, DeviceKind};
use crate::config::Config;
use crate::error::Result;
use std::sync::Arc;
use tracing::{info, warn};

/// Arena of selected devices, indexed by [`DeviceId`].
#[derive(Debug, Default, Clone)]
pub struct DeviceRegistry {
    devices: Vec<Arc<dyn ComputeDevice>>,
}

impl DeviceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enumerate the host CPU and, when enabled, every GPU adapter, then
    /// apply [`select`](Self::select).
    pub fn discover(config: &Config) -> Result<Self> {
        let mut found: Vec<Arc<dyn ComputeDevice>> = Vec::new();

        let mut cpu = CpuDevice::builder();
        if let Some(units) = config.cpu_compute_units {
            cpu = cpu.compute_units(units);
        }
        found.push(Arc::new(cpu.build()?));

        #[cfg(feature = "gpu")]
        if config.enable_gpu {
            for device in super::GpuDevice::enumerate() {
                match device {
                    Ok(device) => found.push(Arc::new(device)),
                    Err(e) => warn!(error = %e, "skipping GPU adapter"),
                }
            }
        }

        Ok(Self::select(found, config.reserve_host_core))
    }

    /// Keep every CPU and GPU device. With `reserve_host_core`, the first
    /// CPU is split into `(units - 1, 1)` compute-unit shares and only the
    /// larger share is kept, leaving one unit to the controlling process.
    pub fn select(devices: Vec<Arc<dyn ComputeDevice>>, reserve_host_core: bool) -> Self {
        let mut registry = Self::new();
        let mut reserved = !reserve_host_core;

        for device in devices {
            let info = device.info();
            if info.kind == DeviceKind::Cpu && !reserved {
                reserved = true;
                let units = info.compute_units;
                if units > 1 {
                    match device.split_by_compute_units(&[units - 1, 1]) {
                        Ok(mut parts) => {
                            let share = parts.swap_remove(0);
                            info!(device = %share.info(), "reserved one compute unit for the host");
                            registry.register(share);
                            continue;
                        }
                        Err(e) => warn!(device = %info, error = %e, "could not reserve a host core"),
                    }
                } else {
                    warn!(device = %info, "single compute unit, no host core reserved");
                }
            }
            registry.register(device);
        }

        registry
    }

    /// Add `device` and return the id it is stored under.
    pub fn register(&mut self, device: Arc<dyn ComputeDevice>) -> DeviceId {
        self.devices.push(device);
        DeviceId(self.devices.len() - 1)
    }

    /// The device stored under `id`.
    pub fn get(&self, id: DeviceId) -> Option<&Arc<dyn ComputeDevice>> {
        self.devices.get(id.0)
    }

    /// Devices in registration order.
    pub fn iter(&self) -> impl Iterator<Item = (DeviceId, &Arc<dyn ComputeDevice>)> {
        self.devices
            .iter()
            .enumerate()
            .map(|(i, device)| (DeviceId(i), device))
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }
}
