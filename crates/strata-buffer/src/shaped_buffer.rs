use std::fmt;

use strata_core::{DeviceId, Platform, Shape, ShapeIndex, ShapeTree};

use crate::{BufferError, DeviceMemory, Result};

/// Index-map value for shape positions that have no buffer yet.
pub const NO_BUFFER_ENTRY: usize = usize::MAX;

/// The device buffers holding a value of some shape, without owning them.
///
/// Buffers are kept in a flat table; every node of the shape (arrays and
/// tuples) maps to one entry of that table through
/// [`ShapedBuffer::shape_index_to_buffer_entry`]. Several positions may share
/// an entry. Dropping a `ShapedBuffer` never frees device memory; see
/// [`crate::ScopedShapedBuffer`] for the owning form.
///
/// Looking up an index that is not a node of the shape is a caller bug and
/// panics.
#[derive(Debug, Clone, PartialEq)]
pub struct ShapedBuffer {
    shape: Shape,
    platform: Platform,
    device_ordinal: usize,
    buffers: Vec<DeviceMemory>,
    shape_index_to_buffer_entry: ShapeTree<usize>,
}

impl ShapedBuffer {
    /// Empty buffer table; every shape position maps to [`NO_BUFFER_ENTRY`].
    pub fn new(shape: Shape, platform: Platform, device_ordinal: usize) -> Self {
        let shape_index_to_buffer_entry = ShapeTree::with_value(&shape, NO_BUFFER_ENTRY);
        Self {
            shape,
            platform,
            device_ordinal,
            buffers: Vec::new(),
            shape_index_to_buffer_entry,
        }
    }

    /// Wrap a single buffer holding an array shape.
    ///
    /// Fails without constructing anything if `shape` is a tuple, its byte
    /// size overflows, or `buffer` is smaller than that size.
    pub fn make_array_shaped_buffer(
        shape: &Shape,
        platform: Platform,
        device_ordinal: usize,
        buffer: DeviceMemory,
    ) -> Result<Self> {
        let array = shape
            .as_array()
            .ok_or_else(|| BufferError::NotAnArray(shape.to_string()))?;
        let required = array.byte_size()?;
        if buffer.size() < required {
            return Err(BufferError::SizeMismatch {
                shape: shape.to_string(),
                required,
                actual: buffer.size(),
            });
        }
        let mut shaped_buffer = Self::new(shape.clone(), platform, device_ordinal);
        shaped_buffer.add_buffer_at_index(buffer, &ShapeIndex::new());
        Ok(shaped_buffer)
    }

    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    pub fn platform(&self) -> Platform {
        self.platform
    }

    pub fn device_ordinal(&self) -> usize {
        self.device_ordinal
    }

    pub fn device_id(&self) -> DeviceId {
        DeviceId::new(self.platform, self.device_ordinal)
    }

    /// Table entry for `index`, or `None` if no buffer was assigned.
    pub fn buffer_entry(&self, index: &ShapeIndex) -> Option<usize> {
        let entry = *self.shape_index_to_buffer_entry.element(index);
        if entry == NO_BUFFER_ENTRY {
            return None;
        }
        assert!(
            entry < self.buffers.len(),
            "shape index {index} maps to buffer entry {entry}, but the table has {} entries",
            self.buffers.len()
        );
        Some(entry)
    }

    /// Buffer at `index`; the null handle if none was assigned.
    pub fn buffer(&self, index: &ShapeIndex) -> &DeviceMemory {
        match self.buffer_entry(index) {
            Some(entry) => &self.buffers[entry],
            None => &DeviceMemory::NULL,
        }
    }

    /// Mutable buffer at `index`. Panics if no buffer was assigned there.
    pub fn buffer_mut(&mut self, index: &ShapeIndex) -> &mut DeviceMemory {
        match self.buffer_entry(index) {
            Some(entry) => &mut self.buffers[entry],
            None => panic!("no buffer assigned at shape index {index} of shape {}", self.shape),
        }
    }

    /// The flat buffer table.
    pub fn buffers(&self) -> &[DeviceMemory] {
        &self.buffers
    }

    pub fn buffers_mut(&mut self) -> &mut Vec<DeviceMemory> {
        &mut self.buffers
    }

    /// Map from shape position to buffer table entry.
    pub fn shape_index_to_buffer_entry(&self) -> &ShapeTree<usize> {
        &self.shape_index_to_buffer_entry
    }

    pub fn shape_index_to_buffer_entry_mut(&mut self) -> &mut ShapeTree<usize> {
        &mut self.shape_index_to_buffer_entry
    }

    /// Null out every table entry. Frees nothing.
    pub fn clear(&mut self) {
        for buffer in &mut self.buffers {
            *buffer = DeviceMemory::NULL;
        }
    }

    /// Append `buffer` to the table and point `shape_index` at it.
    pub fn add_buffer_at_index(&mut self, buffer: DeviceMemory, shape_index: &ShapeIndex) {
        let entry = self.buffers.len();
        *self.shape_index_to_buffer_entry.element_mut(shape_index) = entry;
        self.buffers.push(buffer);
    }

    /// Replace the buffer at `shape_index`, adding a table entry if the
    /// position has none. Positions sharing the entry see the new buffer.
    pub fn set_buffer(&mut self, buffer: DeviceMemory, shape_index: &ShapeIndex) {
        match self.buffer_entry(shape_index) {
            Some(entry) => self.buffers[entry] = buffer,
            None => self.add_buffer_at_index(buffer, shape_index),
        }
    }

    /// Non-owning view of the subtree rooted at `index`.
    ///
    /// The view has its own compacted table holding the same handles, in
    /// order of first use by the subtree.
    pub fn sub_shaped_buffer(&self, index: &ShapeIndex) -> ShapedBuffer {
        let entries = self.shape_index_to_buffer_entry.sub_tree(index);
        let mut sub = ShapedBuffer::new(entries.shape().clone(), self.platform, self.device_ordinal);
        let mut remap: Vec<(usize, usize)> = Vec::new();
        for (relative, &entry) in entries.iter() {
            if entry == NO_BUFFER_ENTRY {
                continue;
            }
            match remap.iter().find(|(old, _)| *old == entry) {
                Some(&(_, new)) => *sub.shape_index_to_buffer_entry.element_mut(relative) = new,
                None => {
                    remap.push((entry, sub.buffers.len()));
                    sub.add_buffer_at_index(self.buffers[entry], relative);
                }
            }
        }
        sub
    }
}

impl fmt::Display for ShapedBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "ShapedBuffer({}), shape {}, {} buffer(s):",
            self.device_id(),
            self.shape,
            self.buffers.len()
        )?;
        for (index, &entry) in self.shape_index_to_buffer_entry.iter() {
            let indent = "  ".repeat(index.len() + 1);
            let subshape = self
                .shape
                .subshape(index)
                .map(|s| s.to_string())
                .unwrap_or_default();
            if entry == NO_BUFFER_ENTRY {
                writeln!(f, "{indent}{index} {subshape}: unassigned")?;
                continue;
            }
            match self.buffers.get(entry) {
                Some(buffer) => writeln!(f, "{indent}{index} {subshape}: [{entry}] {buffer}")?,
                None => writeln!(f, "{indent}{index} {subshape}: [{entry}] dangling")?,
            }
        }
        Ok(())
    }
}
