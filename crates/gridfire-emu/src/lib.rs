//! # gridfire-emu
//!
//! CPU interpreter shim for gridfire.
//!
//! Selected once at process start, [`EmuDevice`] substitutes for the real
//! driver primitives: modules retain the instruction-stream text and
//! interpret it on invocation, events record host wall-clock timestamps,
//! and synchronization is a no-op because interpretation is synchronous.
//! Buffers, programs, and the code generator above them never know the
//! shim is active.
//!
//! Execution is deterministic: blocks and threads run sequentially (with
//! cooperative barrier scheduling inside a block), so the same compiled
//! source, inputs, and geometry always produce identical output buffers.

#![warn(missing_docs)]
#![warn(clippy::all)]

mod context;
mod events;
mod mem;
mod module;
pub mod ptx;

pub use context::{EmuDevice, COMPUTE_CAPABILITY};
pub use events::EmuTimer;
pub use mem::{AddressSpace, EmuBuffer};
pub use module::EmuModule;
