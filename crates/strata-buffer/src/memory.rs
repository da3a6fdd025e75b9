use std::fmt;

/// Untyped reference to a region of device memory.
///
/// A plain value: copying a handle never copies or frees the memory behind
/// it. Ownership is layered on top by [`crate::ScopedShapedBuffer`]. The null
/// handle (opaque 0, size 0) means "no memory assigned".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct DeviceMemory {
    opaque: u64,
    size: usize,
}

impl DeviceMemory {
    /// The null handle.
    pub const NULL: DeviceMemory = DeviceMemory { opaque: 0, size: 0 };

    /// Wrap a raw device address and its length in bytes.
    pub fn new(opaque: u64, size: usize) -> Self {
        Self { opaque, size }
    }

    pub fn null() -> Self {
        Self::NULL
    }

    pub fn is_null(&self) -> bool {
        self.opaque == 0
    }

    /// Raw device address or identifier.
    pub fn opaque(&self) -> u64 {
        self.opaque
    }

    /// Length in bytes.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Whether both handles point at the same device address.
    pub fn is_same_opaque(&self, other: &DeviceMemory) -> bool {
        self.opaque == other.opaque
    }
}

impl fmt::Display for DeviceMemory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_null() {
            write!(f, "null")
        } else {
            write!(f, "{:#x} ({} bytes)", self.opaque, self.size)
        }
    }
}
