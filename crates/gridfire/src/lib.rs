//! # gridfire
//!
//! Device-execution backend for generated kernels: compiles textual kernel
//! source to device-executable form, resolves the entry symbol, moves data
//! between host and device memory, launches over a grid/block iteration
//! space, and optionally measures elapsed execution time.
//!
//! The same interface runs against the real CUDA driver or against a CPU
//! interpreter shim, selected once at process start; callers cannot tell
//! which is active.
//!
//! ## Quick Start
//!
//! ```no_run
//! use gridfire::{DType, ExecBackend};
//!
//! fn main() -> gridfire::Result<()> {
//!     let backend = ExecBackend::from_env()?;
//!
//!     let a = backend.alloc(1024, DType::F32)?;
//!     let b = backend.alloc(1024, DType::F32)?;
//!     let c = backend.alloc(1024, DType::F32)?;
//!
//!     let program = backend.build(KERNEL_SOURCE, false)?;
//!     let elapsed = backend.run(&program, 4, 256, &[&a, &b, &c], true)?;
//!     println!("kernel took {:?} s", elapsed);
//!     Ok(())
//! }
//! # const KERNEL_SOURCE: &str = "";
//! ```
//!
//! ## Backend selection
//!
//! Setting `GRIDFIRE_EMULATE=1` selects the interpreter shim. Otherwise
//! the CUDA driver is used when present, with a logged fallback to
//! emulation when it is not, so a process behaves identically on machines
//! without an accelerator.

#![warn(missing_docs)]
#![warn(clippy::all)]

use std::sync::Arc;

use tracing::info;

pub use gridfire_core::{
    ContextKind, DType, DebugConfig, DeviceBuffer, DeviceContext, DeviceMemory, DeviceModule,
    DeviceTimer, Dim3, EntryPoint, GridfireError, KernelProgram, LaunchLimits, Result,
};

pub use gridfire_cuda::{is_cuda_available, CudaDevice};
pub use gridfire_emu::EmuDevice;

/// Environment variable selecting the emulation shim at process start.
pub const EMULATE_ENV: &str = "GRIDFIRE_EMULATE";

/// Which backend to construct.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BackendKind {
    /// CUDA when available, emulation otherwise.
    #[default]
    Auto,
    /// The real CUDA driver; construction fails without one.
    Cuda,
    /// The CPU interpreter shim.
    Emulated,
}

/// The uniform interface consumed by the code generator.
///
/// Exposes exactly: allocate a buffer, build a program from source, run a
/// program over buffers with given dimensions, and synchronize the device.
/// Behavior is identical under the real driver and under emulation.
pub struct ExecBackend {
    ctx: Arc<dyn DeviceContext>,
    debug: DebugConfig,
}

impl ExecBackend {
    /// Start building a backend with explicit settings.
    pub fn builder() -> ExecBackendBuilder {
        ExecBackendBuilder::new()
    }

    /// Construct the backend selected by the process environment.
    ///
    /// `GRIDFIRE_EMULATE` picks the shim; the debug level comes from
    /// `GRIDFIRE_DEBUG`. This is the only runtime switch — the choice is
    /// made once, at process start.
    pub fn from_env() -> Result<Self> {
        let mut builder = Self::builder().debug(DebugConfig::from_env());
        if std::env::var(EMULATE_ENV).is_ok_and(|v| !v.is_empty() && v != "0") {
            builder = builder.backend(BackendKind::Emulated);
        }
        builder.build()
    }

    /// Wrap an existing context, e.g. one constructed directly in tests.
    pub fn with_context(ctx: Arc<dyn DeviceContext>, debug: DebugConfig) -> Self {
        Self { ctx, debug }
    }

    /// Which variant is active. Diagnostic only.
    pub fn kind(&self) -> ContextKind {
        self.ctx.kind()
    }

    /// The underlying device context.
    pub fn context(&self) -> &Arc<dyn DeviceContext> {
        &self.ctx
    }

    /// Launch maxima declared by the active backend.
    pub fn limits(&self) -> LaunchLimits {
        self.ctx.limits()
    }

    /// Allocate a buffer of `len` elements of `dtype`.
    pub fn alloc(&self, len: usize, dtype: DType) -> Result<DeviceBuffer> {
        DeviceBuffer::allocate(self.ctx.as_ref(), len, dtype)
    }

    /// Build a program from kernel source.
    ///
    /// `binary` marks source that is already a device instruction stream,
    /// skipping the compiler.
    pub fn build(&self, source: &str, binary: bool) -> Result<KernelProgram> {
        KernelProgram::compile(&self.ctx, source, binary, self.debug)
    }

    /// Run `program` over `buffers` with the given dimensions.
    ///
    /// With `wait` set, blocks until the kernel completes and returns the
    /// elapsed time in seconds; otherwise returns `None` immediately after
    /// enqueueing.
    pub fn run(
        &self,
        program: &KernelProgram,
        global_size: impl Into<Dim3>,
        local_size: impl Into<Dim3>,
        buffers: &[&DeviceBuffer],
        wait: bool,
    ) -> Result<Option<f64>> {
        program.launch(global_size.into(), local_size.into(), buffers, wait)
    }

    /// Block until all previously issued launches and asynchronous copies
    /// on this context have completed.
    pub fn synchronize(&self) -> Result<()> {
        self.ctx.synchronize()
    }
}

/// Builder for [`ExecBackend`].
pub struct ExecBackendBuilder {
    backend: BackendKind,
    device: usize,
    debug: DebugConfig,
}

impl ExecBackendBuilder {
    /// Create a builder with defaults: auto-selected backend, device 0,
    /// silent diagnostics.
    pub fn new() -> Self {
        Self {
            backend: BackendKind::Auto,
            device: 0,
            debug: DebugConfig::SILENT,
        }
    }

    /// Set the backend variant.
    pub fn backend(mut self, backend: BackendKind) -> Self {
        self.backend = backend;
        self
    }

    /// Set the device ordinal for the CUDA backend.
    pub fn device(mut self, ordinal: usize) -> Self {
        self.device = ordinal;
        self
    }

    /// Set the debug verbosity injected into program construction.
    pub fn debug(mut self, debug: DebugConfig) -> Self {
        self.debug = debug;
        self
    }

    /// Build the backend.
    pub fn build(self) -> Result<ExecBackend> {
        let ctx: Arc<dyn DeviceContext> = match self.backend {
            BackendKind::Cuda => Arc::new(CudaDevice::new(self.device)?),
            BackendKind::Emulated => {
                info!("selected emulated backend");
                Arc::new(EmuDevice::new())
            }
            BackendKind::Auto => {
                if is_cuda_available() {
                    info!("auto-selected CUDA backend");
                    Arc::new(CudaDevice::new(self.device)?)
                } else {
                    info!("no CUDA driver detected, auto-selected emulated backend");
                    Arc::new(EmuDevice::new())
                }
            }
        };
        Ok(ExecBackend {
            ctx,
            debug: self.debug,
        })
    }
}

impl Default for ExecBackendBuilder {
    fn default() -> Self {
        Self::new()
    }
}
