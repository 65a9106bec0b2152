//! Kernel compilation through NVRTC.

use gridfire_core::{GridfireError, Result};

/// Compile CUDA C kernel source to PTX.
///
/// The NVRTC diagnostic log is carried in the error on rejection; there is
/// no retry, since a malformed kernel will not compile differently a
/// second time.
pub fn compile_to_ptx(source: &str) -> Result<String> {
    let ptx = cudarc::nvrtc::compile_ptx(source)
        .map_err(|e| GridfireError::Compile(format!("{e}")))?;
    Ok(ptx.to_src().to_string())
}
