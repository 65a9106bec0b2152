//! Emulated device address space.
//!
//! Allocations live in host memory behind fake device addresses so the
//! interpreter can do the same pointer arithmetic a real kernel would. The
//! registry maps each base address to its backing storage; buffers own
//! their range exclusively and unregister on drop.

use std::any::Any;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

use gridfire_core::{DeviceMemory, GridfireError, Result};

/// First byte of the emulated global segment. Non-zero so a null pointer
/// never resolves.
const GLOBAL_BASE: u64 = 0x1_0000;

/// Allocation granularity, matching typical device alignment.
const ALIGN: u64 = 256;

struct Allocation {
    size: usize,
    data: Arc<RwLock<Vec<u8>>>,
}

/// Registry of live emulated allocations.
pub struct AddressSpace {
    allocations: Mutex<BTreeMap<u64, Allocation>>,
    next: AtomicU64,
}

impl AddressSpace {
    /// Create an empty address space.
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            allocations: Mutex::new(BTreeMap::new()),
            next: AtomicU64::new(GLOBAL_BASE),
        })
    }

    /// Reserve `size` bytes and register them under a fresh base address.
    pub fn allocate(self: &Arc<Self>, size: usize) -> Result<EmuBuffer> {
        let mut storage = Vec::new();
        storage
            .try_reserve_exact(size)
            .map_err(|e| GridfireError::allocation(size, e))?;
        storage.resize(size, 0);

        let span = (size as u64).div_ceil(ALIGN).max(1) * ALIGN;
        let base = self.next.fetch_add(span, Ordering::SeqCst);
        let data = Arc::new(RwLock::new(storage));

        self.allocations.lock().insert(
            base,
            Allocation {
                size,
                data: Arc::clone(&data),
            },
        );

        Ok(EmuBuffer {
            base,
            size,
            data,
            space: Arc::clone(self),
        })
    }

    /// Resolve an address to its backing storage.
    ///
    /// Returns the storage, the offset of `addr` within it, and the
    /// allocation size, or `None` when the address is not inside any live
    /// allocation.
    pub fn resolve(&self, addr: u64) -> Option<(Arc<RwLock<Vec<u8>>>, usize, usize)> {
        let allocations = self.allocations.lock();
        let (&base, alloc) = allocations.range(..=addr).next_back()?;
        let offset = (addr - base) as usize;
        if offset >= alloc.size {
            return None;
        }
        Some((Arc::clone(&alloc.data), offset, alloc.size))
    }

    fn release(&self, base: u64) {
        self.allocations.lock().remove(&base);
    }
}

/// One emulated device allocation.
pub struct EmuBuffer {
    base: u64,
    size: usize,
    data: Arc<RwLock<Vec<u8>>>,
    space: Arc<AddressSpace>,
}

impl EmuBuffer {
    /// The buffer's emulated device address, bound as a kernel argument.
    pub(crate) fn base(&self) -> u64 {
        self.base
    }
}

impl DeviceMemory for EmuBuffer {
    fn size(&self) -> usize {
        self.size
    }

    fn copy_from_host(&self, data: &[u8]) -> Result<()> {
        if data.len() != self.size {
            return Err(GridfireError::Shape {
                expected: self.size,
                actual: data.len(),
            });
        }
        self.data.write().copy_from_slice(data);
        Ok(())
    }

    fn copy_to_host(&self, data: &mut [u8]) -> Result<()> {
        if data.len() != self.size {
            return Err(GridfireError::Shape {
                expected: self.size,
                actual: data.len(),
            });
        }
        data.copy_from_slice(&self.data.read());
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl Drop for EmuBuffer {
    fn drop(&mut self) {
        self.space.release(self.base);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocations_do_not_alias() {
        let space = AddressSpace::new();
        let a = space.allocate(100).unwrap();
        let b = space.allocate(100).unwrap();
        assert_ne!(a.base(), b.base());
        assert!(b.base() >= a.base() + 100);
    }

    #[test]
    fn resolve_finds_interior_addresses() {
        let space = AddressSpace::new();
        let buf = space.allocate(64).unwrap();

        let (_, offset, size) = space.resolve(buf.base() + 12).unwrap();
        assert_eq!(offset, 12);
        assert_eq!(size, 64);

        assert!(space.resolve(buf.base() + 64).is_none());
        assert!(space.resolve(0).is_none());
    }

    #[test]
    fn dropped_buffers_unregister() {
        let space = AddressSpace::new();
        let buf = space.allocate(64).unwrap();
        let base = buf.base();
        drop(buf);
        assert!(space.resolve(base).is_none());
    }

    #[test]
    fn roundtrip() {
        let space = AddressSpace::new();
        let buf = space.allocate(8).unwrap();
        buf.copy_from_host(&[1, 2, 3, 4, 5, 6, 7, 8]).unwrap();
        let mut out = [0u8; 8];
        buf.copy_to_host(&mut out).unwrap();
        assert_eq!(out, [1, 2, 3, 4, 5, 6, 7, 8]);
    }

    #[test]
    fn size_mismatch_is_a_shape_error() {
        let space = AddressSpace::new();
        let buf = space.allocate(8).unwrap();
        let err = buf.copy_from_host(&[0u8; 4]).unwrap_err();
        assert!(matches!(err, GridfireError::Shape { expected: 8, actual: 4 }));
    }
}
