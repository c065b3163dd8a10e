//! Host-side staging buffer shared between a calculator and its device queue.

use parking_lot::{MappedMutexGuard, Mutex, MutexGuard};
use std::sync::Arc;

/// Fixed-capacity host buffer that device copies write into.
///
/// The device queue holds a clone while a copy is outstanding; the owner
/// reads it only after the copy event completed.
#[derive(Debug, Clone)]
pub struct StagingBuffer {
    data: Arc<Mutex<Vec<f32>>>,
    capacity: usize,
}

impl StagingBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            data: Arc::new(Mutex::new(vec![0.0; capacity])),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Overwrite the first `src.len()` values.
    ///
    /// # Panics
    /// If `src` is longer than the capacity.
    pub fn write(&self, src: &[f32]) {
        self.data.lock()[..src.len()].copy_from_slice(src);
    }

    /// Read-only view of the first `len` values.
    pub fn view(&self, len: usize) -> MappedMutexGuard<'_, [f32]> {
        MutexGuard::map(self.data.lock(), |data| &mut data[..len])
    }
}
