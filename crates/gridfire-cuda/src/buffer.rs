//! Device memory buffers backed by CUDA allocations.

use std::any::Any;
use std::sync::Arc;

use cudarc::driver::{CudaSlice, CudaStream};
use parking_lot::{Mutex, MutexGuard};

use gridfire_core::{DeviceMemory, GridfireError, Result};

use crate::device::CudaDevice;

/// A device-resident allocation on the CUDA backend.
///
/// The slice sits behind a mutex so transfers can be issued through `&self`
/// while keeping the stream-ordering bookkeeping sound.
pub struct CudaBuffer {
    data: Mutex<CudaSlice<u8>>,
    size: usize,
    stream: Arc<CudaStream>,
}

impl CudaBuffer {
    /// Allocate `size` bytes of device memory.
    pub fn new(device: &CudaDevice, size: usize) -> Result<Self> {
        // Safety: the memory is uninitialized until the first copy_in; the
        // buffer contract requires a transfer before any read.
        let data = unsafe { device.stream().alloc::<u8>(size) }.map_err(|e| {
            GridfireError::allocation(size, e)
        })?;
        Ok(Self {
            data: Mutex::new(data),
            size,
            stream: Arc::clone(device.stream()),
        })
    }

    /// Lock the underlying slice for a kernel launch.
    pub(crate) fn lock_slice(&self) -> MutexGuard<'_, CudaSlice<u8>> {
        self.data.lock()
    }
}

impl DeviceMemory for CudaBuffer {
    fn size(&self) -> usize {
        self.size
    }

    fn copy_from_host(&self, data: &[u8]) -> Result<()> {
        if data.len() != self.size {
            return Err(GridfireError::Shape {
                expected: self.size,
                actual: data.len(),
            });
        }
        // Enqueued on the buffer's stream; ordering with prior copies and
        // later launches follows from stream order.
        let mut slice = self.data.lock();
        self.stream
            .memcpy_htod(data, &mut *slice)
            .map_err(|e| GridfireError::driver(format!("host to device copy failed: {e}")))
    }

    fn copy_to_host(&self, data: &mut [u8]) -> Result<()> {
        if data.len() != self.size {
            return Err(GridfireError::Shape {
                expected: self.size,
                actual: data.len(),
            });
        }
        let slice = self.data.lock();
        self.stream
            .memcpy_dtoh(&*slice, data)
            .map_err(|e| GridfireError::driver(format!("device to host copy failed: {e}")))?;
        // copy_out is synchronous: the caller observes committed results.
        self.stream
            .synchronize()
            .map_err(|e| GridfireError::driver(format!("stream synchronize failed: {e}")))
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gridfire_core::DeviceContext;

    #[test]
    #[ignore] // Requires CUDA hardware
    fn roundtrip() {
        let device = CudaDevice::new(0).unwrap();
        let buffer = device.allocate(1024).unwrap();

        let data = vec![42u8; 1024];
        buffer.copy_from_host(&data).unwrap();

        let mut readback = vec![0u8; 1024];
        buffer.copy_to_host(&mut readback).unwrap();
        assert_eq!(data, readback);
    }

    #[test]
    #[ignore] // Requires CUDA hardware
    fn size_mismatch_is_a_shape_error() {
        let device = CudaDevice::new(0).unwrap();
        let buffer = device.allocate(16).unwrap();
        let err = buffer.copy_from_host(&[0u8; 12]).unwrap_err();
        assert!(matches!(err, GridfireError::Shape { expected: 16, actual: 12 }));
    }
}
