//! Device memory allocator contract.

use strata_core::{Platform, DEFAULT_POINTER_SIZE};

use crate::{DeviceMemory, MemoryError};

/// Source of device memory for shaped buffers.
///
/// Implementations decide how memory is obtained (driver calls, pools,
/// host memory); shaped buffers only ever ask for a number of bytes on a
/// device ordinal and hand the same handle back when done with it.
pub trait DeviceMemoryAllocator: Send + Sync {
    /// Platform whose devices this allocator serves.
    fn platform(&self) -> Platform;

    /// Allocate `size` bytes on `device_ordinal`.
    ///
    /// Zero-byte requests return [`DeviceMemory::NULL`] without allocating.
    /// `retry_on_failure` lets implementations that can reclaim memory (for
    /// example by flushing caches) try again before failing.
    fn allocate(
        &self,
        device_ordinal: usize,
        size: usize,
        retry_on_failure: bool,
    ) -> Result<DeviceMemory, MemoryError>;

    /// Return memory previously obtained from [`Self::allocate`].
    ///
    /// Deallocating the null handle is a no-op.
    fn deallocate(&self, device_ordinal: usize, mem: &DeviceMemory) -> Result<(), MemoryError>;

    /// Width of one element pointer in a tuple table.
    fn pointer_size(&self) -> usize {
        DEFAULT_POINTER_SIZE
    }

    /// Store the backend's representation of a tuple (the addresses of its
    /// element buffers) into the tuple's own buffer.
    ///
    /// Backends that build tuple tables lazily at launch time keep the
    /// default no-op.
    fn write_tuple_table(
        &self,
        _device_ordinal: usize,
        _tuple: &DeviceMemory,
        _elements: &[DeviceMemory],
    ) -> Result<(), MemoryError> {
        Ok(())
    }
}
