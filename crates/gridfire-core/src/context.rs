//! The polymorphic device-context capability set.
//!
//! The dual native/emulated backend is abstracted as one trait family,
//! selected once at process start and injected wherever device operations
//! are needed. Buffers and programs never branch on which variant is
//! active.

use std::any::Any;
use std::fmt;

use crate::dims::{Dim3, LaunchLimits};
use crate::error::Result;

/// Which driver variant backs a context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextKind {
    /// The real CUDA driver.
    Cuda,
    /// The CPU interpreter shim.
    Emulated,
}

impl fmt::Display for ContextKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cuda => f.write_str("cuda"),
            Self::Emulated => f.write_str("emulated"),
        }
    }
}

/// Driver-level operations on one device (or its emulation).
///
/// A context scopes allocations and synchronization. Work issued through a
/// context executes in issue order; the host blocks only at explicit
/// synchronization points.
pub trait DeviceContext: Send + Sync {
    /// Which variant this context is backed by. Diagnostic only; callers
    /// must not branch on it for correctness.
    fn kind(&self) -> ContextKind;

    /// Reserve `size` bytes of device memory.
    fn allocate(&self, size: usize) -> Result<Box<dyn DeviceMemory>>;

    /// Translate kernel source into the device instruction stream.
    ///
    /// Under the native variant this invokes the backend compiler; under
    /// emulation the instruction stream itself is the accepted dialect and
    /// this step validates it. Rejection surfaces as
    /// [`GridfireError::Compile`](crate::GridfireError::Compile) carrying
    /// the diagnostic.
    fn compile(&self, source: &str) -> Result<String>;

    /// Load a compiled instruction stream and resolve `entry` to a
    /// callable module.
    fn load_module(&self, image: &str, entry: &str) -> Result<Box<dyn DeviceModule>>;

    /// Create a timer whose markers are ordered with device work.
    fn timer(&self) -> Result<Box<dyn DeviceTimer>>;

    /// Block the calling thread until all previously issued work on this
    /// context has completed.
    fn synchronize(&self) -> Result<()>;

    /// Launch maxima declared by this backend.
    fn limits(&self) -> LaunchLimits;

    /// Target architecture identifier (e.g. `sm_86`), used only for
    /// optional native-lowering diagnostics.
    fn arch(&self) -> String;
}

/// One device-resident allocation, exclusively owned.
///
/// The handle stays valid for the value's entire lifetime and is released
/// on drop; no two values alias one handle.
pub trait DeviceMemory: Send + Sync {
    /// Allocation size in bytes.
    fn size(&self) -> usize;

    /// Enqueue a host-to-device transfer.
    ///
    /// May return before the copy completes, but is ordered after prior
    /// work touching this allocation and before any later launch using it.
    fn copy_from_host(&self, data: &[u8]) -> Result<()>;

    /// Transfer device data to the host, blocking until complete.
    fn copy_to_host(&self, data: &mut [u8]) -> Result<()>;

    /// Downcast hook so a backend can recover its concrete buffer type at
    /// the launch boundary.
    fn as_any(&self) -> &dyn Any;
}

/// A loaded kernel module with one resolved entry symbol.
pub trait DeviceModule: Send + Sync {
    /// Name of the resolved entry symbol.
    fn entry(&self) -> &str;

    /// Issue the kernel over `grid`/`block` with `args` bound as
    /// positional arguments, in order.
    ///
    /// Returns once the kernel is enqueued; completion is observed through
    /// a synchronizing operation.
    fn launch(&self, grid: Dim3, block: Dim3, args: &[&dyn DeviceMemory]) -> Result<()>;
}

/// Two opaque timestamp markers measuring elapsed device time.
///
/// The elapsed value is valid only after both markers have been recorded;
/// [`elapsed_secs`](DeviceTimer::elapsed_secs) synchronizes on the stop
/// marker before reading it.
pub trait DeviceTimer: Send {
    /// Record the start marker.
    fn record_start(&mut self) -> Result<()>;

    /// Record the stop marker.
    fn record_stop(&mut self) -> Result<()>;

    /// Synchronize the stop marker and return seconds between the markers.
    fn elapsed_secs(&mut self) -> Result<f64>;
}
