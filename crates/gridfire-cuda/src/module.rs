//! Loaded CUDA kernel modules.

use std::sync::Arc;

use cudarc::driver::{CudaFunction, CudaModule, CudaStream, LaunchConfig, PushKernelArg};
use cudarc::nvrtc::Ptx;

use gridfire_core::{DeviceMemory, DeviceModule, Dim3, GridfireError, Result};

use crate::buffer::CudaBuffer;
use crate::device::CudaDevice;

/// A PTX image loaded into a device module with its entry resolved.
pub struct CudaKernelModule {
    // The module must outlive the function resolved from it.
    #[allow(dead_code)]
    module: Arc<CudaModule>,
    func: CudaFunction,
    entry: String,
    stream: Arc<CudaStream>,
}

impl CudaKernelModule {
    /// Load `image` and resolve `entry` to a callable function.
    pub fn load(device: &CudaDevice, image: &str, entry: &str) -> Result<Self> {
        let ptx = Ptx::from_src(image);
        let module = device
            .inner()
            .load_module(ptx)
            .map_err(|e| GridfireError::Load(format!("PTX load failed: {e}")))?;

        let func = module
            .load_function(entry)
            .map_err(|e| GridfireError::Load(format!("entry symbol `{entry}` not found: {e}")))?;

        tracing::debug!(entry, "CUDA module loaded");

        Ok(Self {
            module,
            func,
            entry: entry.to_string(),
            stream: Arc::clone(device.stream()),
        })
    }
}

impl DeviceModule for CudaKernelModule {
    fn entry(&self) -> &str {
        &self.entry
    }

    fn launch(&self, grid: Dim3, block: Dim3, args: &[&dyn DeviceMemory]) -> Result<()> {
        let mut guards = Vec::with_capacity(args.len());
        for (position, arg) in args.iter().enumerate() {
            let buffer = arg.as_any().downcast_ref::<CudaBuffer>().ok_or_else(|| {
                GridfireError::launch(format!(
                    "argument {position} was not allocated by the CUDA backend"
                ))
            })?;
            guards.push(buffer.lock_slice());
        }

        let config = LaunchConfig {
            grid_dim: grid.as_tuple(),
            block_dim: block.as_tuple(),
            shared_mem_bytes: 0,
        };

        let mut builder = self.stream.launch_builder(&self.func);
        for guard in guards.iter_mut() {
            builder.arg(&mut **guard);
        }

        // Safety: argument count and types were validated against the
        // entry's parameter list before reaching this point.
        unsafe { builder.launch(config) }
            .map_err(|e| GridfireError::launch(format!("kernel launch failed: {e}")))?;
        Ok(())
    }
}
