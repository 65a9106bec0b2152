//! Emulated device context.

use std::sync::Arc;

use tracing::debug;

use gridfire_core::{
    ContextKind, DeviceContext, DeviceMemory, DeviceModule, DeviceTimer, GridfireError,
    LaunchLimits, Result,
};

use crate::events::EmuTimer;
use crate::mem::AddressSpace;
use crate::module::EmuModule;
use crate::ptx;

/// Compute capability reported under emulation. No physical device
/// exists, so architecture queries return this fixed placeholder.
pub const COMPUTE_CAPABILITY: (u32, u32) = (3, 5);

/// Drop-in substitute for the driver-level primitives, backed by the CPU
/// interpreter.
///
/// Every operation available on the real context has a functionally
/// interchangeable counterpart here; callers cannot observe which variant
/// is active except through [`DeviceContext::kind`].
pub struct EmuDevice {
    space: Arc<AddressSpace>,
}

impl EmuDevice {
    /// Create an emulated device with an empty address space.
    pub fn new() -> Self {
        debug!("emulated device initialized");
        Self {
            space: AddressSpace::new(),
        }
    }
}

impl Default for EmuDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl DeviceContext for EmuDevice {
    fn kind(&self) -> ContextKind {
        ContextKind::Emulated
    }

    fn allocate(&self, size: usize) -> Result<Box<dyn DeviceMemory>> {
        Ok(Box::new(self.space.allocate(size)?))
    }

    fn compile(&self, source: &str) -> Result<String> {
        // The emulated dialect is the instruction stream itself: the
        // compile step parses it and surfaces diagnostics the way the
        // native compiler would.
        ptx::parse::parse(source).map_err(|e| GridfireError::Compile(e.to_string()))?;
        Ok(source.to_string())
    }

    fn load_module(&self, image: &str, entry: &str) -> Result<Box<dyn DeviceModule>> {
        let module =
            ptx::parse::parse(image).map_err(|e| GridfireError::Load(e.to_string()))?;
        let kernel = module
            .kernel(entry)
            .ok_or_else(|| GridfireError::Load(format!("entry symbol `{entry}` not found")))?
            .clone();
        Ok(Box::new(EmuModule::new(kernel, Arc::clone(&self.space))))
    }

    fn timer(&self) -> Result<Box<dyn DeviceTimer>> {
        Ok(Box::new(EmuTimer::new()))
    }

    fn synchronize(&self) -> Result<()> {
        // Interpretation is synchronous; there is never outstanding work.
        Ok(())
    }

    fn limits(&self) -> LaunchLimits {
        LaunchLimits::CUDA
    }

    fn arch(&self) -> String {
        format!("sm_{}{}", COMPUTE_CAPABILITY.0, COMPUTE_CAPABILITY.1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reports_placeholder_architecture() {
        let device = EmuDevice::new();
        assert_eq!(device.arch(), "sm_35");
        assert_eq!(device.kind(), ContextKind::Emulated);
    }

    #[test]
    fn compile_validates_the_stream() {
        let device = EmuDevice::new();
        assert!(device.compile(".visible .entry k()\n{\n ret;\n}\n").is_ok());

        let err = device.compile("definitely not ptx (").unwrap_err();
        assert!(matches!(err, GridfireError::Compile(_)));
    }

    #[test]
    fn load_module_rejects_missing_entries() {
        let device = EmuDevice::new();
        let err = device
            .load_module(".visible .entry k()\n{\n ret;\n}\n", "other")
            .err()
            .unwrap();
        assert!(matches!(err, GridfireError::Load(_)));
    }

    #[test]
    fn synchronize_is_a_no_op() {
        assert!(EmuDevice::new().synchronize().is_ok());
    }
}
