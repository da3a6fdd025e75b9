use std::fmt;

use serde::{Deserialize, Serialize};

/// Class of compute device that owns a block of memory.
///
/// Compared by identity only; this crate never checks a platform against the
/// allocator that serves it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    /// Host memory standing in for device memory
    #[default]
    Host,
    /// NVIDIA GPUs
    Cuda,
    /// AMD GPUs via HIP
    Rocm,
}

impl Platform {
    /// Whether memory on this platform is directly host-addressable.
    pub fn is_host(&self) -> bool {
        matches!(self, Platform::Host)
    }

    /// Identify a specific device of this platform.
    pub fn device(self, ordinal: usize) -> DeviceId {
        DeviceId::new(self, ordinal)
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Platform::Host => write!(f, "host"),
            Platform::Cuda => write!(f, "cuda"),
            Platform::Rocm => write!(f, "rocm"),
        }
    }
}

/// A physical device: platform plus ordinal within that platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeviceId {
    pub platform: Platform,
    pub ordinal: usize,
}

impl DeviceId {
    pub fn new(platform: Platform, ordinal: usize) -> Self {
        Self { platform, ordinal }
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.platform, self.ordinal)
    }
}
