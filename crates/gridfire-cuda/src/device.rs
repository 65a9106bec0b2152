//! CUDA device context.

use std::sync::Arc;

use cudarc::driver::sys::CUdevice_attribute;
use cudarc::driver::{CudaContext, CudaStream};
use tracing::info;

use gridfire_core::{
    ContextKind, DeviceContext, DeviceMemory, DeviceModule, DeviceTimer, GridfireError,
    LaunchLimits, Result,
};

use crate::buffer::CudaBuffer;
use crate::compile;
use crate::events::CudaTimer;
use crate::module::CudaKernelModule;

/// Wrapper around a `cudarc` context with the operations gridfire needs.
///
/// All work is issued to the device's default stream, so copies and
/// launches execute in issue order relative to each other.
pub struct CudaDevice {
    /// The underlying driver context.
    inner: Arc<CudaContext>,
    /// Default stream for copies and launches.
    stream: Arc<CudaStream>,
    /// Device ordinal.
    ordinal: usize,
    /// Device name.
    name: String,
    /// Compute capability (major, minor).
    compute_capability: (u32, u32),
}

impl CudaDevice {
    /// Create a context on the device with the given ordinal.
    pub fn new(ordinal: usize) -> Result<Self> {
        let inner = CudaContext::new(ordinal).map_err(|e| {
            GridfireError::driver(format!("failed to create CUDA context {ordinal}: {e}"))
        })?;

        let name = inner
            .name()
            .map_err(|e| GridfireError::driver(format!("failed to get device name: {e}")))?;

        let major = inner
            .attribute(CUdevice_attribute::CU_DEVICE_ATTRIBUTE_COMPUTE_CAPABILITY_MAJOR)
            .map_err(|e| GridfireError::driver(format!("failed to query compute capability: {e}")))?;
        let minor = inner
            .attribute(CUdevice_attribute::CU_DEVICE_ATTRIBUTE_COMPUTE_CAPABILITY_MINOR)
            .map_err(|e| GridfireError::driver(format!("failed to query compute capability: {e}")))?;

        let stream = inner.default_stream();

        info!(ordinal, name = %name, cc = format!("{major}.{minor}"), "CUDA device initialized");

        Ok(Self {
            inner,
            stream,
            ordinal,
            name,
            compute_capability: (major as u32, minor as u32),
        })
    }

    /// Device ordinal.
    pub fn ordinal(&self) -> usize {
        self.ordinal
    }

    /// Device name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Compute capability as (major, minor).
    pub fn compute_capability(&self) -> (u32, u32) {
        self.compute_capability
    }

    /// The underlying driver context.
    pub(crate) fn inner(&self) -> &Arc<CudaContext> {
        &self.inner
    }

    /// The default stream.
    pub(crate) fn stream(&self) -> &Arc<CudaStream> {
        &self.stream
    }
}

impl DeviceContext for CudaDevice {
    fn kind(&self) -> ContextKind {
        ContextKind::Cuda
    }

    fn allocate(&self, size: usize) -> Result<Box<dyn DeviceMemory>> {
        Ok(Box::new(CudaBuffer::new(self, size)?))
    }

    fn compile(&self, source: &str) -> Result<String> {
        compile::compile_to_ptx(source)
    }

    fn load_module(&self, image: &str, entry: &str) -> Result<Box<dyn DeviceModule>> {
        Ok(Box::new(CudaKernelModule::load(self, image, entry)?))
    }

    fn timer(&self) -> Result<Box<dyn DeviceTimer>> {
        Ok(Box::new(CudaTimer::new()?))
    }

    fn synchronize(&self) -> Result<()> {
        self.inner
            .synchronize()
            .map_err(|e| GridfireError::driver(format!("synchronize failed: {e}")))
    }

    fn limits(&self) -> LaunchLimits {
        LaunchLimits::CUDA
    }

    fn arch(&self) -> String {
        format!("sm_{}{}", self.compute_capability.0, self.compute_capability.1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[ignore] // Requires CUDA hardware
    fn device_reports_architecture() {
        let device = CudaDevice::new(0).unwrap();
        assert!(device.arch().starts_with("sm_"));
        assert!(!device.name().is_empty());
    }
}
