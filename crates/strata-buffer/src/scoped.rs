//! Owning shaped buffers.

use std::collections::HashSet;
use std::fmt;
use std::ops::Deref;
use std::sync::Arc;

use strata_core::{Shape, ShapeTree};

use crate::{BufferError, DeviceMemory, DeviceMemoryAllocator, Result, ShapedBuffer};

/// A [`ShapedBuffer`] that owns its device memory.
///
/// Every non-null buffer in the table was obtained from `allocator` for the
/// buffer's device ordinal and is returned to it exactly once when this value
/// is dropped, however many shape positions share it. Ownership leaves only
/// through [`ScopedShapedBuffer::release`], which consumes the scoped buffer,
/// so a released buffer can never be used or released again.
///
/// Read access goes through `Deref<Target = ShapedBuffer>`. There is no
/// mutable access: replacing an owned handle would leak it.
pub struct ScopedShapedBuffer {
    shaped: ShapedBuffer,
    allocator: Arc<dyn DeviceMemoryAllocator>,
}

impl ScopedShapedBuffer {
    /// Allocate a buffer for every node of `shape` on `device_ordinal`.
    ///
    /// Arrays get uninitialized buffers of their byte size. Tuples get a
    /// table of element pointers, written once all elements exist, so nodes
    /// are visited children first. A shape whose byte size overflows is
    /// rejected before anything is allocated. If any request fails, every
    /// buffer allocated so far is returned to `allocator` before the error is.
    pub fn allocate(
        shape: &Shape,
        allocator: Arc<dyn DeviceMemoryAllocator>,
        device_ordinal: usize,
    ) -> Result<Self> {
        let pointer_size = allocator.pointer_size();
        let sizes = ShapeTree::from_fn(shape, |_, subshape| {
            subshape
                .byte_size(pointer_size)
                .map(|size| (size, subshape.tuple_count()))
        });
        if let Some((_, Err(e))) = sizes.iter().find(|(_, node)| node.is_err()) {
            return Err(e.clone().into());
        }

        let mut shaped = ShapedBuffer::new(shape.clone(), allocator.platform(), device_ordinal);
        let mut txn = AllocationTxn::new(&*allocator, device_ordinal);

        for (index, node) in sizes.post_order() {
            let (size, tuple_count) = node.clone()?;
            let mem = txn.allocate(size)?;
            if tuple_count > 0 {
                let elements: Vec<DeviceMemory> = (0..tuple_count)
                    .map(|i| *shaped.buffer(&index.child(i)))
                    .collect();
                allocator
                    .write_tuple_table(device_ordinal, &mem, &elements)
                    .map_err(BufferError::TupleTable)?;
            }
            shaped.add_buffer_at_index(mem, index);
        }
        let count = txn.commit();

        tracing::debug!(
            "allocated {} buffer(s) for shape {} on {}",
            count,
            shape,
            shaped.device_id()
        );
        Ok(Self { shaped, allocator })
    }

    /// Take ownership of the memory referenced by `shaped_buffer`.
    ///
    /// Nothing is allocated. `shaped_buffer` is cleared so it no longer
    /// references the memory. The caller must ensure no other owner still
    /// holds it, and that `allocator` is where it came from.
    pub fn make_scoped(
        shaped_buffer: &mut ShapedBuffer,
        allocator: Arc<dyn DeviceMemoryAllocator>,
    ) -> Self {
        let shaped = shaped_buffer.clone();
        shaped_buffer.clear();
        tracing::debug!(
            "took ownership of {} buffer(s) for shape {} on {}",
            shaped.buffers().len(),
            shaped.shape(),
            shaped.device_id()
        );
        Self { shaped, allocator }
    }

    /// Allocator this buffer's memory is returned to.
    pub fn memory_allocator(&self) -> &Arc<dyn DeviceMemoryAllocator> {
        &self.allocator
    }

    /// Borrow the non-owning view.
    pub fn shaped_buffer(&self) -> &ShapedBuffer {
        &self.shaped
    }

    /// Number of distinct non-null buffers that will be freed on drop.
    pub fn owned_buffer_count(&self) -> usize {
        self.shaped
            .buffers()
            .iter()
            .filter(|mem| !mem.is_null())
            .map(DeviceMemory::opaque)
            .collect::<HashSet<_>>()
            .len()
    }

    /// Give up ownership without freeing anything.
    ///
    /// The returned `ShapedBuffer` references the same memory but does not
    /// own it; the caller becomes responsible for returning it.
    pub fn release(mut self) -> ShapedBuffer {
        let released = self.shaped.clone();
        self.shaped.clear();
        tracing::debug!(
            "released {} buffer(s) for shape {}",
            released.buffers().len(),
            released.shape()
        );
        released
    }
}

impl Deref for ScopedShapedBuffer {
    type Target = ShapedBuffer;

    fn deref(&self) -> &ShapedBuffer {
        &self.shaped
    }
}

impl fmt::Debug for ScopedShapedBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScopedShapedBuffer")
            .field("shaped", &self.shaped)
            .field("platform", &self.allocator.platform())
            .finish()
    }
}

impl Drop for ScopedShapedBuffer {
    fn drop(&mut self) {
        let device_ordinal = self.shaped.device_ordinal();
        let mut deallocated = HashSet::new();
        for mem in self.shaped.buffers() {
            if mem.is_null() {
                continue;
            }
            if !deallocated.insert(mem.opaque()) {
                tracing::warn!("buffer {} appears in more than one table entry", mem);
                continue;
            }
            if let Err(e) = self.allocator.deallocate(device_ordinal, mem) {
                tracing::error!(
                    "failed to deallocate {} on device {}: {}",
                    mem,
                    device_ordinal,
                    e
                );
            }
        }
    }
}

/// Buffers allocated by an in-progress [`ScopedShapedBuffer::allocate`].
///
/// Dropped without [`AllocationTxn::commit`], it returns every buffer it
/// holds to the allocator, newest first.
struct AllocationTxn<'a> {
    allocator: &'a dyn DeviceMemoryAllocator,
    device_ordinal: usize,
    allocated: Vec<DeviceMemory>,
}

impl<'a> AllocationTxn<'a> {
    fn new(allocator: &'a dyn DeviceMemoryAllocator, device_ordinal: usize) -> Self {
        Self {
            allocator,
            device_ordinal,
            allocated: Vec::new(),
        }
    }

    fn allocate(&mut self, size: usize) -> Result<DeviceMemory> {
        let mem = self
            .allocator
            .allocate(self.device_ordinal, size, true)
            .map_err(|source| BufferError::AllocationFailure {
                device_ordinal: self.device_ordinal,
                size,
                source,
            })?;
        if !mem.is_null() {
            self.allocated.push(mem);
        }
        Ok(mem)
    }

    /// Hand the buffers over to their new owner. Returns how many there were.
    fn commit(mut self) -> usize {
        std::mem::take(&mut self.allocated).len()
    }
}

impl Drop for AllocationTxn<'_> {
    fn drop(&mut self) {
        if self.allocated.is_empty() {
            return;
        }
        tracing::warn!(
            "rolling back {} buffer(s) on device {} after failed allocation",
            self.allocated.len(),
            self.device_ordinal
        );
        for mem in self.allocated.drain(..).rev() {
            if let Err(e) = self.allocator.deallocate(self.device_ordinal, &mem) {
                tracing::error!(
                    "failed to roll back {} on device {}: {}",
                    mem,
                    self.device_ordinal,
                    e
                );
            }
        }
    }
}
