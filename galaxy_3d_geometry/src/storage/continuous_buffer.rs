/// Growable element slab with first-fit free-list allocation
///
/// All allocations live in one contiguous `Vec<T>` so the whole slab can be
/// uploaded into a single GPU buffer object. Each allocation is described by a
/// SlotInfo (offset, capacity, used length) addressed by a stable handle that
/// survives growth of the backing array.
///
/// Deallocation merges the freed region with its free neighbours right away,
/// so the free list never holds two adjacent free regions. Metadata entries
/// that disappear in a merge are recycled for later slots.

use bytemuck::Pod;

use crate::engine_bail;
use crate::engine_err;
use crate::engine_debug;
use crate::engine_trace;
use crate::error::Result;
use crate::gpu::BufferObject;
use crate::storage::slot::StorageSlot;
use crate::storage::transaction::{BufferTransaction, TransactionKind};
use crate::utils::SlotAllocator;

/// Stable handle of a ContinuousBuffer allocation
pub type BufferHandle = u32;

/// Element count of a default-constructed buffer
pub const DEFAULT_INITIAL_SIZE: usize = 65536;

/// Smallest element count a buffer is created with
pub const MINIMUM_SIZE: usize = 16;

/// Number of distinct handles a buffer can hand out (31 bits, see StorageSlot)
pub const MAX_SLOT_COUNT: u32 = StorageSlot::MAX_HANDLE + 1;

const SOURCE: &str = "galaxy3d::ContinuousBuffer";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SlotState {
    Free,
    Occupied,
    /// Metadata entry merged away, waiting to be reused
    Recycled,
}

#[derive(Debug, Clone, Copy)]
struct SlotInfo {
    state: SlotState,
    offset: usize,
    size: usize,
    used: usize,
}

impl SlotInfo {
    const RECYCLED: SlotInfo = SlotInfo { state: SlotState::Recycled, offset: 0, size: 0, used: 0 };

    fn free(offset: usize, size: usize) -> Self {
        Self { state: SlotState::Free, offset, size, used: 0 }
    }

    fn end(&self) -> usize {
        self.offset + self.size
    }
}

/// Element range [first, end) touched since the last GPU sync
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ModifiedRange {
    first: usize,
    end: usize,
}

/// Growable array of `T` carved into independently sized slots
#[derive(Debug, Clone)]
pub struct ContinuousBuffer<T> {
    buffer: Vec<T>,
    slots: Vec<SlotInfo>,
    slot_ids: SlotAllocator,
    modified: Option<ModifiedRange>,
}

impl<T: Pod> ContinuousBuffer<T> {
    /// Create a buffer of `initial_size` elements (at least [`MINIMUM_SIZE`]),
    /// covered by a single free slot.
    pub fn new(initial_size: usize) -> Self {
        let size = initial_size.max(MINIMUM_SIZE);

        let mut buffer = Self {
            buffer: vec![T::zeroed(); size],
            slots: Vec::new(),
            slot_ids: SlotAllocator::with_limit(MAX_SLOT_COUNT),
            modified: None,
        };
        // The first entry always exists, the id space cannot be exhausted yet
        let _ = buffer.insert_slot_info(SlotInfo::free(0, size));
        buffer
    }

    // ===== ALLOCATION =====

    /// Reserve `size` elements and return the handle of the new slot.
    ///
    /// First fit over the free slots. When nothing fits, the buffer grows by
    /// `max(current size, requested size)` and the allocation is placed in
    /// the rightmost free region.
    pub fn allocate(&mut self, size: usize) -> Result<BufferHandle> {
        if size == 0 {
            engine_bail!(SOURCE, InvalidOperation, "Cannot allocate a zero-sized slot");
        }

        let handle = match self.find_free_slot(size) {
            Some(handle) => handle,
            None => {
                self.grow_for(size)?;
                self.find_free_slot(size).ok_or_else(|| engine_err!(SOURCE, ResourceExhaustion,
                    "No free region of {} elements after growing to {}", size, self.buffer.len()))?
            }
        };

        self.occupy(handle, size)?;
        Ok(handle)
    }

    /// Free a slot and merge it with adjacent free regions
    pub fn deallocate(&mut self, handle: BufferHandle) -> Result<()> {
        let index = self.occupied_index(handle)?;

        {
            let slot = &mut self.slots[index];
            slot.state = SlotState::Free;
            slot.used = 0;
        }

        let mut current = index;

        let left = self.slots.iter().position(|other| {
            other.state == SlotState::Free && other.end() == self.slots[current].offset
        });
        if let Some(left) = left {
            self.slots[left].size += self.slots[current].size;
            self.recycle_slot_info(current);
            current = left;
        }

        let end = self.slots[current].end();
        let right = self.slots.iter().enumerate().position(|(i, other)| {
            i != current && other.state == SlotState::Free && other.offset == end && other.size > 0
        });
        if let Some(right) = right {
            self.slots[current].size += self.slots[right].size;
            self.recycle_slot_info(right);
        }

        engine_trace!(SOURCE, "Deallocated slot {}", handle);
        Ok(())
    }

    // ===== DATA ACCESS =====

    /// Overwrite the slot's contents from its start; `used` becomes `data.len()`
    pub fn set_data(&mut self, handle: BufferHandle, data: &[T]) -> Result<()> {
        let index = self.occupied_index(handle)?;
        let slot = self.slots[index];

        if data.len() > slot.size {
            engine_bail!(SOURCE, CapacityViolation,
                "Cannot store {} elements in slot {} of capacity {}", data.len(), handle, slot.size);
        }

        self.buffer[slot.offset..slot.offset + data.len()].copy_from_slice(data);
        self.slots[index].used = data.len();
        self.mark_modified(slot.offset, data.len());
        Ok(())
    }

    /// Write `data` at `element_offset` within the slot.
    ///
    /// `used` grows to cover the written range but never shrinks.
    pub fn set_sub_data(&mut self, handle: BufferHandle, element_offset: usize, data: &[T]) -> Result<()> {
        let index = self.occupied_index(handle)?;
        let slot = self.slots[index];

        let end = element_offset.checked_add(data.len()).filter(|&end| end <= slot.size);
        let Some(end) = end else {
            engine_bail!(SOURCE, CapacityViolation,
                "Cannot write {} elements at offset {} in slot {} of capacity {}",
                data.len(), element_offset, handle, slot.size);
        };

        let start = slot.offset + element_offset;
        self.buffer[start..start + data.len()].copy_from_slice(data);
        self.slots[index].used = slot.used.max(end);
        self.mark_modified(start, data.len());
        Ok(())
    }

    /// Set the used length of a slot, within its capacity
    pub fn resize_data(&mut self, handle: BufferHandle, used: usize) -> Result<()> {
        let index = self.occupied_index(handle)?;
        let capacity = self.slots[index].size;

        if used > capacity {
            engine_bail!(SOURCE, CapacityViolation,
                "Cannot resize slot {} to {} elements, capacity is {}", handle, used, capacity);
        }

        self.slots[index].used = used;
        Ok(())
    }

    /// Element offset of the slot within the backing array
    pub fn offset(&self, handle: BufferHandle) -> Result<usize> {
        Ok(self.slots[self.occupied_index(handle)?].offset)
    }

    pub fn num_used_elements(&self, handle: BufferHandle) -> Result<usize> {
        Ok(self.slots[self.occupied_index(handle)?].used)
    }

    /// Number of elements reserved for the slot
    pub fn capacity(&self, handle: BufferHandle) -> Result<usize> {
        Ok(self.slots[self.occupied_index(handle)?].size)
    }

    /// Used elements of the slot
    pub fn slot_data(&self, handle: BufferHandle) -> Result<&[T]> {
        let slot = self.slots[self.occupied_index(handle)?];
        Ok(&self.buffer[slot.offset..slot.offset + slot.used])
    }

    pub fn is_allocated(&self, handle: BufferHandle) -> bool {
        self.occupied_index(handle).is_ok()
    }

    /// Total element count of the backing array
    pub fn size(&self) -> usize {
        self.buffer.len()
    }

    /// The whole backing array.
    ///
    /// Re-borrow after every mutating call: growth moves the storage.
    pub fn data(&self) -> &[T] {
        &self.buffer
    }

    /// Number of free regions (merged, so never adjacent to each other)
    pub fn free_slot_count(&self) -> usize {
        self.slots.iter().filter(|slot| slot.state == SlotState::Free && slot.size > 0).count()
    }

    pub fn occupied_slot_count(&self) -> usize {
        self.slots.iter().filter(|slot| slot.state == SlotState::Occupied).count()
    }

    // ===== GENERATION PROPAGATION =====

    /// Bring this buffer up to date with `other`, a newer generation.
    ///
    /// Slot metadata is copied wholesale, element data only for the slots named
    /// by `transactions`. `handle_of` maps a store slot to the handle it owns in
    /// this buffer, or `None` when the slot has no data here.
    pub fn apply_transactions<F>(
        &mut self,
        transactions: &[BufferTransaction],
        other: &ContinuousBuffer<T>,
        handle_of: F,
    ) -> Result<()>
    where
        F: Fn(StorageSlot) -> Option<BufferHandle>,
    {
        if self.buffer.len() < other.buffer.len() {
            let additional = other.buffer.len() - self.buffer.len();
            self.buffer.try_reserve_exact(additional).map_err(|error| engine_err!(SOURCE, ResourceExhaustion,
                "Failed to grow generation to {} elements: {}", other.buffer.len(), error))?;
            self.buffer.resize(other.buffer.len(), T::zeroed());
        }

        self.slots.clone_from(&other.slots);
        self.slot_ids.clone_from(&other.slot_ids);

        for transaction in transactions {
            if transaction.kind == TransactionKind::Deallocate {
                continue;
            }
            let Some(handle) = handle_of(transaction.slot) else {
                continue;
            };
            // Slots freed later in the frame are skipped, their region now
            // belongs to whatever allocation logged its own transaction
            let Some(slot) = self.slots.get(handle as usize).copied() else {
                continue;
            };
            if slot.state != SlotState::Occupied {
                continue;
            }

            let range = slot.offset..slot.end();
            self.buffer[range.clone()].copy_from_slice(&other.buffer[range]);
            self.mark_modified(slot.offset, slot.size);
        }

        Ok(())
    }

    /// Upload pending modifications into `buffer_object`.
    ///
    /// A size mismatch (first sync or growth) resizes the object and uploads
    /// everything, otherwise only the modified range is sent.
    pub fn sync_modifications_to_buffer_object(&mut self, buffer_object: &mut dyn BufferObject) -> Result<()> {
        let element_size = std::mem::size_of::<T>();
        let total_bytes = self.buffer.len() * element_size;

        if buffer_object.size() != total_bytes {
            buffer_object.resize(total_bytes)?;
            buffer_object.set_data(0, bytemuck::cast_slice(&self.buffer))?;
            engine_trace!(SOURCE, "Full upload of {} bytes", total_bytes);
        } else if let Some(range) = self.modified {
            let bytes: &[u8] = bytemuck::cast_slice(&self.buffer[range.first..range.end]);
            buffer_object.set_data(range.first * element_size, bytes)?;
        }

        self.modified = None;
        Ok(())
    }

    // ===== INTERNALS =====

    fn occupied_index(&self, handle: BufferHandle) -> Result<usize> {
        match self.slots.get(handle as usize) {
            Some(slot) if slot.state == SlotState::Occupied => Ok(handle as usize),
            _ => Err(engine_err!(SOURCE, InvalidHandle, "Slot {} is not allocated", handle)),
        }
    }

    fn find_free_slot(&self, size: usize) -> Option<BufferHandle> {
        self.slots
            .iter()
            .position(|slot| slot.state == SlotState::Free && slot.size >= size)
            .map(|index| index as BufferHandle)
    }

    /// Turn the free slot `handle` into an occupied one of `size` elements,
    /// splitting the remainder off into a new free slot.
    fn occupy(&mut self, handle: BufferHandle, size: usize) -> Result<()> {
        let index = handle as usize;
        let slot = self.slots[index];

        if slot.size > size {
            self.insert_slot_info(SlotInfo::free(slot.offset + size, slot.size - size))?;
        }

        self.slots[index] = SlotInfo { state: SlotState::Occupied, offset: slot.offset, size, used: 0 };
        Ok(())
    }

    fn insert_slot_info(&mut self, info: SlotInfo) -> Result<BufferHandle> {
        let Some(id) = self.slot_ids.alloc() else {
            engine_bail!(SOURCE, ResourceExhaustion, "All {} slot handles are in use", MAX_SLOT_COUNT);
        };

        match self.slots.get_mut(id as usize) {
            Some(entry) => *entry = info,
            None => self.slots.push(info),
        }
        Ok(id)
    }

    fn recycle_slot_info(&mut self, index: usize) {
        self.slots[index] = SlotInfo::RECYCLED;
        self.slot_ids.free(index as u32);
    }

    /// Grow the backing array by `max(current size, required)` elements
    fn grow_for(&mut self, required: usize) -> Result<()> {
        let current_size = self.buffer.len();

        let rightmost = self.slots.iter().position(|slot| {
            slot.state == SlotState::Free && slot.size > 0 && slot.end() == current_size
        });
        let growth = current_size.max(required);

        let new_size = current_size.checked_add(growth).ok_or_else(|| engine_err!(SOURCE, ResourceExhaustion,
            "Buffer size overflow growing {} by {} elements", current_size, growth))?;

        self.buffer.try_reserve_exact(growth).map_err(|error| engine_err!(SOURCE, ResourceExhaustion,
            "Failed to grow buffer from {} to {} elements: {}", current_size, new_size, error))?;

        // Metadata first: the only fallible step left must run before the
        // element array changes size
        match rightmost {
            Some(index) => self.slots[index].size += growth,
            None => {
                self.insert_slot_info(SlotInfo::free(current_size, growth))?;
            }
        }
        self.buffer.resize(new_size, T::zeroed());

        engine_debug!(SOURCE, "Grew buffer from {} to {} elements", current_size, new_size);
        Ok(())
    }

    fn mark_modified(&mut self, first: usize, len: usize) {
        if len == 0 {
            return;
        }
        let end = first + len;
        self.modified = Some(match self.modified {
            Some(range) => ModifiedRange { first: range.first.min(first), end: range.end.max(end) },
            None => ModifiedRange { first, end },
        });
    }
}

impl<T: Pod> Default for ContinuousBuffer<T> {
    fn default() -> Self {
        Self::new(DEFAULT_INITIAL_SIZE)
    }
}

#[cfg(test)]
#[path = "continuous_buffer_tests.rs"]
mod tests;
