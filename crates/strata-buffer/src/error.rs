use strata_core::StrataError;

/// Failures reported by a [`crate::DeviceMemoryAllocator`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MemoryError {
    #[error("Out of memory on device {device_ordinal}: requested {requested} bytes, {available} available")]
    OutOfMemory {
        device_ordinal: usize,
        requested: usize,
        available: usize,
    },

    #[error("Invalid device ordinal {device_ordinal} (allocator serves {device_count} devices)")]
    InvalidDeviceOrdinal {
        device_ordinal: usize,
        device_count: usize,
    },

    #[error("No live allocation at {opaque:#x} on device {device_ordinal}")]
    UnknownAllocation { device_ordinal: usize, opaque: u64 },

    #[error("Access of {len} bytes at offset {offset} exceeds buffer of {size} bytes")]
    OutOfBounds { offset: usize, len: usize, size: usize },

    #[error("Address {opaque:#x} does not fit in a {pointer_size}-byte pointer")]
    PointerTooWide { opaque: u64, pointer_size: usize },

    #[error("Invalid allocator config: {0}")]
    InvalidConfig(String),
}

/// Errors from building or allocating shaped buffers.
#[derive(Debug, thiserror::Error)]
pub enum BufferError {
    #[error("Buffer of {actual} bytes is too small for shape {shape} ({required} bytes required)")]
    SizeMismatch {
        shape: String,
        required: usize,
        actual: usize,
    },

    #[error("Expected an array shape, got {0}")]
    NotAnArray(String),

    #[error("Failed to allocate {size} bytes on device {device_ordinal}: {source}")]
    AllocationFailure {
        device_ordinal: usize,
        size: usize,
        #[source]
        source: MemoryError,
    },

    #[error("Failed to write tuple table: {0}")]
    TupleTable(#[source] MemoryError),

    #[error(transparent)]
    Shape(#[from] StrataError),
}
