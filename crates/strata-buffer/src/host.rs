//! Host-memory allocator.
//!
//! Serves one or more "devices" whose memory is plain host memory. Each
//! device keeps a ledger of live allocations keyed by a synthetic aligned
//! address, so handles behave like real device pointers: they are unique per
//! device, never dereferenced directly, and must be returned exactly once.

use std::collections::HashMap;

use parking_lot::Mutex;
use strata_core::Platform;

use crate::{DeviceMemory, DeviceMemoryAllocator, HostAllocatorConfig, MemoryError};

/// Fill byte for allocations when zero-initialization is disabled.
const UNINIT_FILL: u8 = 0xAB;

/// Allocation counters for one device.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AllocatorStats {
    /// Successful non-empty allocations.
    pub allocations: u64,
    /// Successful deallocations of live buffers.
    pub deallocations: u64,
    /// Buffers currently allocated.
    pub live_buffers: usize,
    /// Bytes currently allocated.
    pub bytes_in_use: usize,
    /// High-water mark of `bytes_in_use`.
    pub peak_bytes: usize,
}

struct DeviceLedger {
    allocations: HashMap<u64, Vec<u8>>,
    next_address: u64,
    /// End of this device's address window.
    address_limit: u64,
    stats: AllocatorStats,
}

impl DeviceLedger {
    /// Each device owns the window `[(ordinal + 1) << shift, (ordinal + 2) << shift)`.
    /// The window is never at 0, so no live handle is null. With 8-byte
    /// pointers windows are 1 TiB; narrower pointers shrink them so that the
    /// addresses of the first devices still fit in a tuple table slot.
    fn new(device_ordinal: usize, pointer_size: usize) -> Self {
        let shift = if pointer_size >= 8 {
            40
        } else {
            (8 * pointer_size as u32).saturating_sub(4)
        };
        let base = (device_ordinal as u64 + 1)
            .checked_mul(1u64 << shift)
            .unwrap_or(u64::MAX);
        Self {
            allocations: HashMap::new(),
            next_address: base,
            address_limit: base.saturating_add(1u64 << shift),
            stats: AllocatorStats::default(),
        }
    }

    fn buffer(&self, device_ordinal: usize, mem: &DeviceMemory) -> Result<&Vec<u8>, MemoryError> {
        self.allocations
            .get(&mem.opaque())
            .ok_or(MemoryError::UnknownAllocation {
                device_ordinal,
                opaque: mem.opaque(),
            })
    }

    fn buffer_mut(
        &mut self,
        device_ordinal: usize,
        mem: &DeviceMemory,
    ) -> Result<&mut Vec<u8>, MemoryError> {
        self.allocations
            .get_mut(&mem.opaque())
            .ok_or(MemoryError::UnknownAllocation {
                device_ordinal,
                opaque: mem.opaque(),
            })
    }
}

/// [`DeviceMemoryAllocator`] for the host platform.
pub struct HostMemoryAllocator {
    config: HostAllocatorConfig,
    devices: Vec<Mutex<DeviceLedger>>,
}

impl std::fmt::Debug for HostMemoryAllocator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HostMemoryAllocator")
            .field("config", &self.config)
            .field("live_buffers", &self.total_stats().live_buffers)
            .finish()
    }
}

impl HostMemoryAllocator {
    pub fn new(config: HostAllocatorConfig) -> Result<Self, MemoryError> {
        config.validate()?;
        let devices = (0..config.device_count)
            .map(|ordinal| Mutex::new(DeviceLedger::new(ordinal, config.pointer_size)))
            .collect();
        Ok(Self { config, devices })
    }

    /// One unlimited device.
    pub fn single_device() -> Self {
        let config = HostAllocatorConfig::single_device();
        Self {
            devices: vec![Mutex::new(DeviceLedger::new(0, config.pointer_size))],
            config,
        }
    }

    pub fn config(&self) -> &HostAllocatorConfig {
        &self.config
    }

    pub fn device_count(&self) -> usize {
        self.devices.len()
    }

    fn ledger(&self, device_ordinal: usize) -> Result<&Mutex<DeviceLedger>, MemoryError> {
        self.devices
            .get(device_ordinal)
            .ok_or(MemoryError::InvalidDeviceOrdinal {
                device_ordinal,
                device_count: self.devices.len(),
            })
    }

    /// Counters for one device.
    pub fn stats(&self, device_ordinal: usize) -> Result<AllocatorStats, MemoryError> {
        Ok(self.ledger(device_ordinal)?.lock().stats)
    }

    /// Counters summed over every device (`peak_bytes` is the largest
    /// per-device peak).
    pub fn total_stats(&self) -> AllocatorStats {
        self.devices
            .iter()
            .map(|device| device.lock().stats)
            .fold(AllocatorStats::default(), |acc, s| AllocatorStats {
                allocations: acc.allocations + s.allocations,
                deallocations: acc.deallocations + s.deallocations,
                live_buffers: acc.live_buffers + s.live_buffers,
                bytes_in_use: acc.bytes_in_use + s.bytes_in_use,
                peak_bytes: acc.peak_bytes.max(s.peak_bytes),
            })
    }

    /// Whether `mem` is a live allocation on `device_ordinal`.
    pub fn is_live(&self, device_ordinal: usize, mem: &DeviceMemory) -> bool {
        self.ledger(device_ordinal)
            .map(|ledger| ledger.lock().allocations.contains_key(&mem.opaque()))
            .unwrap_or(false)
    }

    /// Copy a buffer's bytes back to the caller.
    pub fn to_host(&self, device_ordinal: usize, mem: &DeviceMemory) -> Result<Vec<u8>, MemoryError> {
        if mem.is_null() {
            return Ok(Vec::new());
        }
        let ledger = self.ledger(device_ordinal)?.lock();
        let bytes = ledger.buffer(device_ordinal, mem)?.clone();
        Ok(bytes)
    }

    /// Copy `data` into a buffer starting at `offset`.
    pub fn from_host(
        &self,
        device_ordinal: usize,
        mem: &DeviceMemory,
        offset: usize,
        data: &[u8],
    ) -> Result<(), MemoryError> {
        let mut ledger = self.ledger(device_ordinal)?.lock();
        let buf = ledger.buffer_mut(device_ordinal, mem)?;
        let end = offset
            .checked_add(data.len())
            .filter(|&end| end <= buf.len())
            .ok_or(MemoryError::OutOfBounds {
                offset,
                len: data.len(),
                size: buf.len(),
            })?;
        buf[offset..end].copy_from_slice(data);
        Ok(())
    }
}

impl DeviceMemoryAllocator for HostMemoryAllocator {
    fn platform(&self) -> Platform {
        Platform::Host
    }

    fn allocate(
        &self,
        device_ordinal: usize,
        size: usize,
        retry_on_failure: bool,
    ) -> Result<DeviceMemory, MemoryError> {
        let mut ledger = self.ledger(device_ordinal)?.lock();
        if size == 0 {
            return Ok(DeviceMemory::NULL);
        }

        // Nothing to reclaim on the host; a retry would fail the same way.
        let out_of_memory = |available: usize| {
            tracing::debug!(
                "host:{} out of memory for {} bytes (retry_on_failure={})",
                device_ordinal,
                size,
                retry_on_failure
            );
            MemoryError::OutOfMemory {
                device_ordinal,
                requested: size,
                available,
            }
        };

        let capacity = self.config.capacity_bytes;
        let in_use = ledger.stats.bytes_in_use;
        if capacity > 0 && in_use.checked_add(size).map_or(true, |total| total > capacity) {
            return Err(out_of_memory(capacity.saturating_sub(in_use)));
        }

        let alignment = self.config.alignment as u64;
        let limit = ledger.address_limit;
        let opaque = align_up(ledger.next_address, alignment);
        let end = opaque
            .zip(u64::try_from(size).ok())
            .and_then(|(start, len)| start.checked_add(len))
            .filter(|&end| end <= limit);
        let (opaque, end) = match (opaque, end) {
            (Some(opaque), Some(end)) => (opaque, end),
            (opaque, _) => {
                let available = opaque.map_or(0, |start| limit.saturating_sub(start));
                return Err(out_of_memory(usize::try_from(available).unwrap_or(usize::MAX)));
            }
        };

        let fill = if self.config.zero_initialize { 0 } else { UNINIT_FILL };
        let mut bytes = Vec::new();
        if bytes.try_reserve_exact(size).is_err() {
            return Err(out_of_memory(0));
        }
        bytes.resize(size, fill);

        ledger.next_address = end;
        ledger.allocations.insert(opaque, bytes);

        let stats = &mut ledger.stats;
        stats.allocations += 1;
        stats.live_buffers += 1;
        stats.bytes_in_use += size;
        stats.peak_bytes = stats.peak_bytes.max(stats.bytes_in_use);

        tracing::trace!("host:{} allocate {} bytes at {:#x}", device_ordinal, size, opaque);
        Ok(DeviceMemory::new(opaque, size))
    }

    fn deallocate(&self, device_ordinal: usize, mem: &DeviceMemory) -> Result<(), MemoryError> {
        let mut ledger = self.ledger(device_ordinal)?.lock();
        if mem.is_null() {
            return Ok(());
        }
        let buf = ledger
            .allocations
            .remove(&mem.opaque())
            .ok_or(MemoryError::UnknownAllocation {
                device_ordinal,
                opaque: mem.opaque(),
            })?;

        let stats = &mut ledger.stats;
        stats.deallocations += 1;
        stats.live_buffers -= 1;
        stats.bytes_in_use -= buf.len();

        tracing::trace!("host:{} deallocate {} bytes at {:#x}", device_ordinal, buf.len(), mem.opaque());
        Ok(())
    }

    fn pointer_size(&self) -> usize {
        self.config.pointer_size
    }

    /// Element addresses are stored little-endian in `pointer_size` bytes.
    /// An address that does not fit is an error, never truncated.
    fn write_tuple_table(
        &self,
        device_ordinal: usize,
        tuple: &DeviceMemory,
        elements: &[DeviceMemory],
    ) -> Result<(), MemoryError> {
        let pointer_size = self.config.pointer_size;
        let mut table = Vec::with_capacity(pointer_size * elements.len());
        for element in elements {
            let bytes = element.opaque().to_le_bytes();
            let (low, high) = bytes.split_at(pointer_size.min(bytes.len()));
            if high.iter().any(|&b| b != 0) {
                return Err(MemoryError::PointerTooWide {
                    opaque: element.opaque(),
                    pointer_size,
                });
            }
            table.extend_from_slice(low);
        }
        if table.is_empty() {
            return Ok(());
        }
        self.from_host(device_ordinal, tuple, 0, &table)
    }
}

fn align_up(n: u64, align: u64) -> Option<u64> {
    Some(n.checked_add(align - 1)? & !(align - 1))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn allocator(device_count: usize, capacity_bytes: usize) -> HostMemoryAllocator {
        HostMemoryAllocator::new(HostAllocatorConfig::with_capacity(device_count, capacity_bytes))
            .unwrap()
    }

    #[test]
    fn test_basic_alloc() {
        let alloc = HostMemoryAllocator::single_device();
        let mem = alloc.allocate(0, 16, false).unwrap();
        assert!(!mem.is_null());
        assert_eq!(mem.size(), 16);
        assert!(alloc.is_live(0, &mem));
        assert_eq!(alloc.to_host(0, &mem).unwrap(), vec![0u8; 16]);

        let stats = alloc.stats(0).unwrap();
        assert_eq!(stats.allocations, 1);
        assert_eq!(stats.live_buffers, 1);
        assert_eq!(stats.bytes_in_use, 16);
    }

    #[test]
    fn test_zero_size_returns_null() {
        let alloc = HostMemoryAllocator::single_device();
        let mem = alloc.allocate(0, 0, false).unwrap();
        assert!(mem.is_null());
        assert_eq!(alloc.stats(0).unwrap().allocations, 0);
        alloc.deallocate(0, &mem).unwrap();
        assert_eq!(alloc.stats(0).unwrap().deallocations, 0);
    }

    #[test]
    fn test_alignment_and_uniqueness() {
        let alloc = HostMemoryAllocator::single_device();
        let a = alloc.allocate(0, 1, false).unwrap();
        let b = alloc.allocate(0, 3, false).unwrap();
        assert_eq!(a.opaque() % 64, 0);
        assert_eq!(b.opaque() % 64, 0);
        assert!(!a.is_same_opaque(&b));
    }

    #[test]
    fn test_devices_are_disjoint() {
        let alloc = allocator(2, 0);
        let a = alloc.allocate(0, 8, false).unwrap();
        let b = alloc.allocate(1, 8, false).unwrap();
        assert!(!a.is_same_opaque(&b));
        assert!(!alloc.is_live(1, &a));
        assert!(matches!(
            alloc.deallocate(1, &a),
            Err(MemoryError::UnknownAllocation { device_ordinal: 1, .. })
        ));
    }

    #[test]
    fn test_invalid_ordinal() {
        let alloc = HostMemoryAllocator::single_device();
        assert_eq!(
            alloc.allocate(3, 8, false),
            Err(MemoryError::InvalidDeviceOrdinal {
                device_ordinal: 3,
                device_count: 1
            })
        );
    }

    #[test]
    fn test_capacity_exhaustion() {
        let alloc = allocator(1, 64);
        let a = alloc.allocate(0, 48, false).unwrap();
        assert_eq!(
            alloc.allocate(0, 32, true),
            Err(MemoryError::OutOfMemory {
                device_ordinal: 0,
                requested: 32,
                available: 16
            })
        );
        alloc.deallocate(0, &a).unwrap();
        assert!(alloc.allocate(0, 32, false).is_ok());
    }

    #[test]
    fn test_double_deallocate_is_rejected() {
        let alloc = HostMemoryAllocator::single_device();
        let mem = alloc.allocate(0, 4, false).unwrap();
        alloc.deallocate(0, &mem).unwrap();
        assert!(alloc.deallocate(0, &mem).is_err());
        let stats = alloc.stats(0).unwrap();
        assert_eq!(stats.deallocations, 1);
        assert_eq!(stats.live_buffers, 0);
        assert_eq!(stats.peak_bytes, 4);
    }

    #[test]
    fn test_uninitialized_fill() {
        let config = HostAllocatorConfig {
            zero_initialize: false,
            ..HostAllocatorConfig::default()
        };
        let alloc = HostMemoryAllocator::new(config).unwrap();
        let mem = alloc.allocate(0, 4, false).unwrap();
        assert_eq!(alloc.to_host(0, &mem).unwrap(), vec![UNINIT_FILL; 4]);
    }

    #[test]
    fn test_from_host_bounds() {
        let alloc = HostMemoryAllocator::single_device();
        let mem = alloc.allocate(0, 4, false).unwrap();
        alloc.from_host(0, &mem, 2, &[7, 9]).unwrap();
        assert_eq!(alloc.to_host(0, &mem).unwrap(), vec![0, 0, 7, 9]);
        assert_eq!(
            alloc.from_host(0, &mem, 3, &[1, 2]),
            Err(MemoryError::OutOfBounds {
                offset: 3,
                len: 2,
                size: 4
            })
        );
    }

    #[test]
    fn test_tuple_table() {
        let alloc = HostMemoryAllocator::single_device();
        let a = alloc.allocate(0, 16, false).unwrap();
        let b = alloc.allocate(0, 32, false).unwrap();
        let tuple = alloc.allocate(0, 16, false).unwrap();
        alloc.write_tuple_table(0, &tuple, &[a, b]).unwrap();

        let bytes = alloc.to_host(0, &tuple).unwrap();
        let first = u64::from_le_bytes(bytes[0..8].try_into().unwrap());
        let second = u64::from_le_bytes(bytes[8..16].try_into().unwrap());
        assert_eq!(first, a.opaque());
        assert_eq!(second, b.opaque());
    }

    #[test]
    fn test_huge_request_on_capped_device() {
        let alloc = allocator(1, 64);
        alloc.allocate(0, 32, false).unwrap();
        assert_eq!(
            alloc.allocate(0, usize::MAX, false),
            Err(MemoryError::OutOfMemory {
                device_ordinal: 0,
                requested: usize::MAX,
                available: 32
            })
        );
        assert_eq!(alloc.stats(0).unwrap().live_buffers, 1);
    }

    #[test]
    fn test_huge_request_on_unlimited_device() {
        let alloc = HostMemoryAllocator::single_device();
        assert!(matches!(
            alloc.allocate(0, usize::MAX, true),
            Err(MemoryError::OutOfMemory { device_ordinal: 0, .. })
        ));
        assert_eq!(alloc.stats(0).unwrap().allocations, 0);
        assert!(alloc.allocate(0, 8, false).is_ok());
    }

    #[test]
    fn test_four_byte_tuple_table() {
        let config = HostAllocatorConfig {
            device_count: 2,
            pointer_size: 4,
            ..HostAllocatorConfig::default()
        };
        let alloc = HostMemoryAllocator::new(config).unwrap();
        for device in 0..2 {
            let a = alloc.allocate(device, 16, false).unwrap();
            let b = alloc.allocate(device, 32, false).unwrap();
            let tuple = alloc.allocate(device, 8, false).unwrap();
            alloc.write_tuple_table(device, &tuple, &[a, b]).unwrap();

            let bytes = alloc.to_host(device, &tuple).unwrap();
            let first = u32::from_le_bytes(bytes[0..4].try_into().unwrap());
            let second = u32::from_le_bytes(bytes[4..8].try_into().unwrap());
            assert_ne!(first, 0);
            assert_eq!(u64::from(first), a.opaque());
            assert_eq!(u64::from(second), b.opaque());
        }
    }

    #[test]
    fn test_tuple_table_rejects_wide_address() {
        let config = HostAllocatorConfig {
            pointer_size: 4,
            ..HostAllocatorConfig::default()
        };
        let alloc = HostMemoryAllocator::new(config).unwrap();
        let tuple = alloc.allocate(0, 4, false).unwrap();
        let foreign = DeviceMemory::new(0x1_0000_0040, 16);
        assert_eq!(
            alloc.write_tuple_table(0, &tuple, &[foreign]),
            Err(MemoryError::PointerTooWide {
                opaque: 0x1_0000_0040,
                pointer_size: 4
            })
        );
        assert_eq!(alloc.to_host(0, &tuple).unwrap(), vec![0u8; 4]);
    }

    #[test]
    fn test_tuple_table_too_small() {
        let alloc = HostMemoryAllocator::single_device();
        let a = alloc.allocate(0, 16, false).unwrap();
        let tuple = alloc.allocate(0, 4, false).unwrap();
        assert!(matches!(
            alloc.write_tuple_table(0, &tuple, &[a]),
            Err(MemoryError::OutOfBounds { .. })
        ));
    }
}
