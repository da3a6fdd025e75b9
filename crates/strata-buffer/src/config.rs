//! Configuration for the host-memory allocator.

use serde::{Deserialize, Serialize};
use strata_core::DEFAULT_POINTER_SIZE;

use crate::MemoryError;

/// Configuration for [`crate::HostMemoryAllocator`].
///
/// Controls how many host-backed devices exist, how much each may hold, and
/// how allocations are laid out.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HostAllocatorConfig {
    /// Number of devices (ordinals `0..device_count`).
    pub device_count: usize,

    /// Maximum live bytes per device. 0 = unlimited.
    pub capacity_bytes: usize,

    /// Alignment of every allocation address. Must be a power of two.
    pub alignment: usize,

    /// Zero-fill new allocations.
    pub zero_initialize: bool,

    /// Width of one element pointer in tuple tables (4 or 8).
    pub pointer_size: usize,
}

impl Default for HostAllocatorConfig {
    fn default() -> Self {
        Self {
            device_count: 1,
            capacity_bytes: 0,
            alignment: 64,
            zero_initialize: true,
            pointer_size: DEFAULT_POINTER_SIZE,
        }
    }
}

impl HostAllocatorConfig {
    /// One unlimited device.
    pub fn single_device() -> Self {
        Self::default()
    }

    /// `device_count` devices, each limited to `capacity_bytes`.
    pub fn with_capacity(device_count: usize, capacity_bytes: usize) -> Self {
        Self {
            device_count,
            capacity_bytes,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<(), MemoryError> {
        if self.device_count == 0 {
            return Err(MemoryError::InvalidConfig(
                "device_count must be at least 1".into(),
            ));
        }
        if !self.alignment.is_power_of_two() {
            return Err(MemoryError::InvalidConfig(format!(
                "alignment {} is not a power of two",
                self.alignment
            )));
        }
        if self.pointer_size != 4 && self.pointer_size != 8 {
            return Err(MemoryError::InvalidConfig(format!(
                "pointer_size {} must be 4 or 8",
                self.pointer_size
            )));
        }
        Ok(())
    }
}
