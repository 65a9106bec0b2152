//! # gridfire-core
//!
//! Core traits and types for the gridfire device-execution backend.
//!
//! This crate defines the polymorphic device-context capability set that
//! the CUDA driver backend and the CPU emulation shim both implement, plus
//! the buffer and program objects built on top of it. The backend variant
//! is chosen once at process start and injected; buffers and programs
//! never know which one is active.
//!
//! ## Core Abstractions
//!
//! - [`DeviceContext`] - driver-level operations on one device
//! - [`DeviceBuffer`] - a typed device-resident allocation
//! - [`KernelProgram`] - a compiled kernel with one resolved entry symbol
//! - [`LaunchLimits`] - backend-declared grid/block maxima
//! - [`DebugConfig`] - injected verbosity gating optional diagnostics

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod artifact;
pub mod buffer;
pub mod context;
pub mod debug;
pub mod diagnostics;
pub mod dims;
pub mod dtype;
pub mod error;
pub mod program;

pub use artifact::EntryPoint;
pub use buffer::DeviceBuffer;
pub use context::{ContextKind, DeviceContext, DeviceMemory, DeviceModule, DeviceTimer};
pub use debug::DebugConfig;
pub use dims::{Dim3, LaunchLimits};
pub use dtype::DType;
pub use error::{GridfireError, Result};
pub use program::KernelProgram;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::buffer::DeviceBuffer;
    pub use crate::context::{ContextKind, DeviceContext, DeviceMemory, DeviceModule, DeviceTimer};
    pub use crate::debug::DebugConfig;
    pub use crate::dims::{Dim3, LaunchLimits};
    pub use crate::dtype::DType;
    pub use crate::error::{GridfireError, Result};
    pub use crate::program::KernelProgram;
}
