//! Allocator wrapper that records every call and can inject failures.

use std::sync::Arc;

use parking_lot::Mutex;
use strata_buffer::{DeviceMemory, DeviceMemoryAllocator, HostMemoryAllocator, MemoryError};
use strata_core::Platform;

#[derive(Debug, Default)]
struct Calls {
    requests: Vec<usize>,
    successes: usize,
    deallocations: Vec<DeviceMemory>,
}

pub struct CountingAllocator {
    inner: HostMemoryAllocator,
    /// 1-based request number that fails, if any.
    fail_on_request: Option<usize>,
    /// Reject every tuple table write.
    fail_tuple_tables: bool,
    calls: Mutex<Calls>,
}

#[allow(dead_code)]
impl CountingAllocator {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            inner: HostMemoryAllocator::single_device(),
            fail_on_request: None,
            fail_tuple_tables: false,
            calls: Mutex::new(Calls::default()),
        })
    }

    pub fn failing_on(request: usize) -> Arc<Self> {
        Arc::new(Self {
            inner: HostMemoryAllocator::single_device(),
            fail_on_request: Some(request),
            fail_tuple_tables: false,
            calls: Mutex::new(Calls::default()),
        })
    }

    pub fn failing_tuple_tables() -> Arc<Self> {
        Arc::new(Self {
            inner: HostMemoryAllocator::single_device(),
            fail_on_request: None,
            fail_tuple_tables: true,
            calls: Mutex::new(Calls::default()),
        })
    }

    /// Sizes of every allocation request, including failed ones.
    pub fn requests(&self) -> Vec<usize> {
        self.calls.lock().requests.clone()
    }

    pub fn successful_allocations(&self) -> usize {
        self.calls.lock().successes
    }

    pub fn deallocation_count(&self) -> usize {
        self.calls.lock().deallocations.len()
    }

    pub fn deallocated(&self) -> Vec<DeviceMemory> {
        self.calls.lock().deallocations.clone()
    }

    pub fn live_buffers(&self) -> usize {
        self.inner.total_stats().live_buffers
    }

    pub fn host(&self) -> &HostMemoryAllocator {
        &self.inner
    }
}

impl DeviceMemoryAllocator for CountingAllocator {
    fn platform(&self) -> Platform {
        self.inner.platform()
    }

    fn allocate(
        &self,
        device_ordinal: usize,
        size: usize,
        retry_on_failure: bool,
    ) -> Result<DeviceMemory, MemoryError> {
        let mut calls = self.calls.lock();
        calls.requests.push(size);
        if self.fail_on_request == Some(calls.requests.len()) {
            return Err(MemoryError::OutOfMemory {
                device_ordinal,
                requested: size,
                available: 0,
            });
        }
        let mem = self.inner.allocate(device_ordinal, size, retry_on_failure)?;
        calls.successes += 1;
        Ok(mem)
    }

    fn deallocate(&self, device_ordinal: usize, mem: &DeviceMemory) -> Result<(), MemoryError> {
        self.calls.lock().deallocations.push(*mem);
        self.inner.deallocate(device_ordinal, mem)
    }

    fn write_tuple_table(
        &self,
        device_ordinal: usize,
        tuple: &DeviceMemory,
        elements: &[DeviceMemory],
    ) -> Result<(), MemoryError> {
        if self.fail_tuple_tables {
            return Err(MemoryError::OutOfBounds {
                offset: 0,
                len: self.pointer_size() * elements.len(),
                size: 0,
            });
        }
        self.inner.write_tuple_table(device_ordinal, tuple, elements)
    }
}
