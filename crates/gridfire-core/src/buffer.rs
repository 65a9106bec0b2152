//! Typed device buffer owning one device-resident allocation.

use crate::context::{DeviceContext, DeviceMemory};
use crate::dtype::DType;
use crate::error::{GridfireError, Result};

/// A device-resident buffer with a fixed element type.
///
/// The underlying device handle is exclusively owned and released when the
/// buffer is dropped. Buffers are not internally synchronized; concurrent
/// use requires external coordination.
pub struct DeviceBuffer {
    raw: Box<dyn DeviceMemory>,
    dtype: DType,
    len: usize,
}

impl DeviceBuffer {
    /// Reserve device memory for `len` elements of `dtype`.
    pub fn allocate(ctx: &dyn DeviceContext, len: usize, dtype: DType) -> Result<Self> {
        let bytes = len
            .checked_mul(dtype.size())
            .ok_or_else(|| GridfireError::allocation(usize::MAX, "allocation size overflow"))?;
        if bytes == 0 {
            return Err(GridfireError::allocation(0, "zero-sized allocation"));
        }
        let raw = ctx.allocate(bytes)?;
        Ok(Self { raw, dtype, len })
    }

    /// Number of elements.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the buffer holds no elements.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Element type.
    pub fn dtype(&self) -> DType {
        self.dtype
    }

    /// Size in bytes.
    pub fn size_bytes(&self) -> usize {
        self.len * self.dtype.size()
    }

    /// Transfer host data into the buffer.
    ///
    /// The copy may be asynchronous relative to the calling thread but is
    /// ordered after prior operations on this buffer and before any later
    /// launch that binds it. Fails with a shape error when `host` does not
    /// match the buffer byte size.
    pub fn copy_in(&self, host: &[u8]) -> Result<()> {
        self.check_shape(host.len())?;
        self.raw.copy_from_host(host)
    }

    /// Transfer buffer contents to the host, blocking until the data is
    /// committed.
    pub fn copy_out(&self, host: &mut [u8]) -> Result<()> {
        self.check_shape(host.len())?;
        self.raw.copy_to_host(host)
    }

    /// The underlying device allocation, for binding as a kernel argument.
    pub fn raw(&self) -> &dyn DeviceMemory {
        self.raw.as_ref()
    }

    fn check_shape(&self, actual: usize) -> Result<()> {
        let expected = self.size_bytes();
        if actual != expected {
            return Err(GridfireError::Shape { expected, actual });
        }
        Ok(())
    }
}
