//! # strata-buffer
//!
//! Device buffers for nested array/tuple shapes.
//!
//! Provides:
//! - `DeviceMemory` handles and the `DeviceMemoryAllocator` contract
//! - `HostMemoryAllocator`: host-backed devices with a per-device ledger
//! - `ShapedBuffer`: non-owning map from shape positions to buffers
//! - `ScopedShapedBuffer`: owning form that frees its buffers on drop

pub mod allocator;
pub mod config;
pub mod error;
pub mod host;
pub mod memory;
pub mod scoped;
pub mod shaped_buffer;

pub use allocator::DeviceMemoryAllocator;
pub use config::HostAllocatorConfig;
pub use error::{BufferError, MemoryError};
pub use host::{AllocatorStats, HostMemoryAllocator};
pub use memory::DeviceMemory;
pub use scoped::ScopedShapedBuffer;
pub use shaped_buffer::{ShapedBuffer, NO_BUFFER_ENTRY};

pub type Result<T> = std::result::Result<T, BufferError>;
