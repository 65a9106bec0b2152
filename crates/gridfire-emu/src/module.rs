//! Emulated kernel modules.

use std::sync::Arc;

use gridfire_core::{DeviceMemory, DeviceModule, Dim3, GridfireError, Result};

use crate::mem::{AddressSpace, EmuBuffer};
use crate::ptx::parse::Kernel;
use crate::ptx::Interpreter;

/// A module that retains the parsed instruction stream and interprets it
/// on invocation.
///
/// Invocation receives the same ordered argument pointers and grid/block
/// shape the real driver would pass; the call returns after the kernel has
/// run, so its effects are immediately visible.
pub struct EmuModule {
    kernel: Kernel,
    space: Arc<AddressSpace>,
}

impl EmuModule {
    /// Wrap a parsed kernel for launching against `space`.
    pub fn new(kernel: Kernel, space: Arc<AddressSpace>) -> Self {
        Self { kernel, space }
    }
}

impl DeviceModule for EmuModule {
    fn entry(&self) -> &str {
        &self.kernel.name
    }

    fn launch(&self, grid: Dim3, block: Dim3, args: &[&dyn DeviceMemory]) -> Result<()> {
        let mut params = Vec::with_capacity(args.len());
        for (position, arg) in args.iter().enumerate() {
            let buffer = arg.as_any().downcast_ref::<EmuBuffer>().ok_or_else(|| {
                GridfireError::launch(format!(
                    "argument {position} was not allocated by the emulated backend"
                ))
            })?;
            params.push(buffer.base());
        }

        if params.len() != self.kernel.params.len() {
            return Err(GridfireError::launch(format!(
                "kernel `{}` declares {} parameters, {} arguments supplied",
                self.kernel.name,
                self.kernel.params.len(),
                params.len()
            )));
        }

        Interpreter::new(&self.kernel, &self.space, params, grid, block)
            .run()
            .map_err(|e| GridfireError::launch(format!("emulated execution fault: {e}")))
    }
}
