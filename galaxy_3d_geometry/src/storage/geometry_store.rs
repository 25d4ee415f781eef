/// Frame-buffered vertex/index storage shared by all geometry renderers
///
/// A GeometryStore pairs a vertex ContinuousBuffer with an index ContinuousBuffer
/// and hands out composite [`StorageSlot`]s. It keeps `frame_buffer_count`
/// generations of both buffers: the CPU writes the current generation while
/// the GPU may still read older ones. Every mutation is logged as a
/// transaction for the other generations, which replay only the touched
/// slots when they become current again.
///
/// # Frame protocol
///
/// ```ignore
/// store.on_frame_start()?;        // switch generation, wait for its fence
/// // ... allocate / update / deallocate ...
/// store.sync_to_buffer_objects()?;
/// store.bind_buffer_objects();
/// // ... draw calls ...
/// store.on_frame_finished()?;     // fence the generation just drawn
/// ```

use std::sync::Arc;

use rustc_hash::FxHashMap;

use crate::engine_bail;
use crate::engine_err;
use crate::engine_debug;
use crate::engine_trace;
use crate::error::Result;
use crate::gpu::{BufferObject, BufferObjectProvider, BufferObjectType, SyncObject, SyncObjectProvider};
use crate::storage::bounds::AABB;
use crate::storage::continuous_buffer::{BufferHandle, ContinuousBuffer, DEFAULT_INITIAL_SIZE};
use crate::storage::slot::{SlotKind, StorageSlot};
use crate::storage::transaction::{BufferTransaction, TransactionKind};
use crate::storage::vertex::{GeometryVertex, RenderVertex};

const SOURCE: &str = "galaxy3d::GeometryStore";

// ===== CONFIGURATION =====

/// GeometryStore construction parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GeometryStoreConfig {
    /// Number of buffer generations (1 = no CPU/GPU overlap). Clamped to at least 1.
    pub frame_buffer_count: usize,
    /// Initial element count of every vertex buffer generation
    pub initial_vertex_capacity: usize,
    /// Initial element count of every index buffer generation
    pub initial_index_capacity: usize,
}

impl Default for GeometryStoreConfig {
    fn default() -> Self {
        Self {
            frame_buffer_count: 2,
            initial_vertex_capacity: DEFAULT_INITIAL_SIZE,
            initial_index_capacity: DEFAULT_INITIAL_SIZE,
        }
    }
}

/// Where a slot's data lives in the current generation, in elements
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderParameters {
    /// Base vertex added to every index of the slot
    pub first_vertex: usize,
    pub first_index: usize,
    pub index_count: usize,
}

// ===== FRAME BUFFER GENERATION =====

struct FrameBuffer<V> {
    vertices: ContinuousBuffer<V>,
    indices: ContinuousBuffer<u32>,
    vertex_buffer_object: Box<dyn BufferObject>,
    index_buffer_object: Box<dyn BufferObject>,
    /// Signalled once the GPU is done with this generation
    sync_object: Option<Box<dyn SyncObject>>,
    /// Transactions recorded in other generations since this one was current
    pending_transactions: Vec<BufferTransaction>,
}

impl<V: GeometryVertex> FrameBuffer<V> {
    /// Catch up with `newer`, the generation that was current until now
    fn apply_transactions(&mut self, newer: &FrameBuffer<V>) -> Result<()> {
        let transactions = std::mem::take(&mut self.pending_transactions);

        self.vertices.apply_transactions(&transactions, &newer.vertices, |slot| match slot.kind() {
            SlotKind::Regular => Some(slot.vertex_handle()),
            SlotKind::IndexRemap => None,
        })?;
        self.indices.apply_transactions(&transactions, &newer.indices, |slot| Some(slot.index_handle()))
    }
}

// ===== GEOMETRY STORE =====

/// Multi-buffered vertex and index storage
pub struct GeometryStore<V = RenderVertex> {
    frame_buffers: Vec<FrameBuffer<V>>,
    current: usize,
    sync_object_provider: Arc<dyn SyncObjectProvider>,
    bounds_cache: FxHashMap<StorageSlot, AABB>,
}

impl<V: GeometryVertex> GeometryStore<V> {
    /// Store with the default configuration (double buffered)
    pub fn new(
        sync_object_provider: Arc<dyn SyncObjectProvider>,
        buffer_object_provider: &dyn BufferObjectProvider,
    ) -> Result<Self> {
        Self::with_config(sync_object_provider, buffer_object_provider, GeometryStoreConfig::default())
    }

    pub fn with_config(
        sync_object_provider: Arc<dyn SyncObjectProvider>,
        buffer_object_provider: &dyn BufferObjectProvider,
        config: GeometryStoreConfig,
    ) -> Result<Self> {
        let count = config.frame_buffer_count.max(1);
        let mut frame_buffers = Vec::with_capacity(count);

        for _ in 0..count {
            frame_buffers.push(FrameBuffer {
                vertices: ContinuousBuffer::new(config.initial_vertex_capacity),
                indices: ContinuousBuffer::new(config.initial_index_capacity),
                vertex_buffer_object: buffer_object_provider.create_buffer_object(BufferObjectType::Vertex)?,
                index_buffer_object: buffer_object_provider.create_buffer_object(BufferObjectType::Index)?,
                sync_object: None,
                pending_transactions: Vec::new(),
            });
        }

        engine_debug!(SOURCE, "Created geometry store with {} frame buffers", count);

        Ok(Self {
            frame_buffers,
            current: 0,
            sync_object_provider,
            bounds_cache: FxHashMap::default(),
        })
    }

    // ===== FRAME LIFECYCLE =====

    /// Switch to the next generation.
    ///
    /// Blocks until the GPU signalled the fence of that generation, then
    /// replays every transaction recorded since it was last current.
    pub fn on_frame_start(&mut self) -> Result<()> {
        let previous = self.current;
        let next = (self.current + 1) % self.frame_buffers.len();

        if let Some(sync_object) = &self.frame_buffers[next].sync_object {
            sync_object.wait()?;
        }
        self.frame_buffers[next].sync_object = None;

        if next != previous {
            let (target, source) = pair_mut(&mut self.frame_buffers, next, previous);
            target.apply_transactions(source)?;
        }

        self.current = next;
        engine_trace!(SOURCE, "Frame start on generation {}", next);
        Ok(())
    }

    /// Fence the current generation; it is reused once the fence signals
    pub fn on_frame_finished(&mut self) -> Result<()> {
        let sync_object = self.sync_object_provider.create_sync_object()?;
        self.frame_buffers[self.current].sync_object = Some(sync_object);
        Ok(())
    }

    /// Upload the current generation's modifications to its GPU buffers
    pub fn sync_to_buffer_objects(&mut self) -> Result<()> {
        let current = &mut self.frame_buffers[self.current];
        current.vertices.sync_modifications_to_buffer_object(current.vertex_buffer_object.as_mut())?;
        current.indices.sync_modifications_to_buffer_object(current.index_buffer_object.as_mut())
    }

    pub fn bind_buffer_objects(&mut self) {
        let current = &mut self.frame_buffers[self.current];
        current.vertex_buffer_object.bind();
        current.index_buffer_object.bind();
    }

    pub fn unbind_buffer_objects(&mut self) {
        let current = &mut self.frame_buffers[self.current];
        current.index_buffer_object.unbind();
        current.vertex_buffer_object.unbind();
    }

    pub fn frame_buffer_count(&self) -> usize {
        self.frame_buffers.len()
    }

    /// Index of the generation currently written by the CPU
    pub fn current_generation(&self) -> usize {
        self.current
    }

    // ===== ALLOCATION =====

    /// Reserve room for `num_vertices` vertices and `num_indices` indices
    pub fn allocate_slot(&mut self, num_vertices: usize, num_indices: usize) -> Result<StorageSlot> {
        let current = &mut self.frame_buffers[self.current];

        let vertex_handle = current.vertices.allocate(num_vertices)?;
        let index_handle = match current.indices.allocate(num_indices) {
            Ok(handle) => handle,
            Err(error) => {
                current.vertices.deallocate(vertex_handle)?;
                return Err(error);
            }
        };

        let slot = StorageSlot::new(SlotKind::Regular, vertex_handle, index_handle);
        self.log_transaction(slot, TransactionKind::Allocate);
        Ok(slot)
    }

    /// Reserve an index range drawing from `primary`'s vertices.
    ///
    /// The new slot has no vertex storage of its own: vertex writes through it
    /// are rejected, and it becomes dangling once `primary` is deallocated.
    pub fn allocate_index_slot(&mut self, primary: StorageSlot, num_indices: usize) -> Result<StorageSlot> {
        if primary.kind() != SlotKind::Regular {
            engine_bail!(SOURCE, InvalidOperation,
                "Index remap slots need a regular primary slot, got {:?}", primary);
        }
        self.check_slot(primary)?;

        let current = &mut self.frame_buffers[self.current];
        let index_handle = current.indices.allocate(num_indices)?;

        let slot = StorageSlot::new(SlotKind::IndexRemap, primary.vertex_handle(), index_handle);
        self.log_transaction(slot, TransactionKind::Allocate);
        Ok(slot)
    }

    /// Free the slot's storage. Remap slots only release their indices, which
    /// also works once their primary is gone.
    pub fn deallocate_slot(&mut self, slot: StorageSlot) -> Result<()> {
        let current = &mut self.frame_buffers[self.current];
        let vertices_live = current.vertices.is_allocated(slot.vertex_handle());
        if !current.indices.is_allocated(slot.index_handle()) || (slot.kind() == SlotKind::Regular && !vertices_live) {
            engine_bail!(SOURCE, InvalidHandle, "{:?} is not allocated", slot);
        }

        current.indices.deallocate(slot.index_handle())?;
        if slot.kind() == SlotKind::Regular {
            current.vertices.deallocate(slot.vertex_handle())?;
            self.invalidate_vertex_bounds(slot.vertex_handle());
        }
        self.bounds_cache.remove(&slot);

        self.log_transaction(slot, TransactionKind::Deallocate);
        Ok(())
    }

    // ===== DATA =====

    /// Replace a slot's contents. Remap slots only accept an empty vertex set.
    pub fn update_data(&mut self, slot: StorageSlot, vertices: &[V], indices: &[u32]) -> Result<()> {
        self.check_vertex_write(slot, 0, vertices.len())?;
        self.check_index_write(slot, 0, indices.len())?;

        let current = &mut self.frame_buffers[self.current];
        if slot.kind() == SlotKind::Regular {
            current.vertices.set_data(slot.vertex_handle(), vertices)?;
        }
        current.indices.set_data(slot.index_handle(), indices)?;

        self.invalidate_bounds(slot);
        self.log_transaction(slot, TransactionKind::Update);
        Ok(())
    }

    /// Overwrite part of a slot's vertices and indices
    pub fn update_sub_data(
        &mut self,
        slot: StorageSlot,
        vertex_offset: usize,
        vertices: &[V],
        index_offset: usize,
        indices: &[u32],
    ) -> Result<()> {
        self.check_vertex_write(slot, vertex_offset, vertices.len())?;
        self.check_index_write(slot, index_offset, indices.len())?;

        let current = &mut self.frame_buffers[self.current];
        if slot.kind() == SlotKind::Regular {
            current.vertices.set_sub_data(slot.vertex_handle(), vertex_offset, vertices)?;
        }
        current.indices.set_sub_data(slot.index_handle(), index_offset, indices)?;

        self.invalidate_bounds(slot);
        self.log_transaction(slot, TransactionKind::Update);
        Ok(())
    }

    /// Replace only the indices, for regular and remap slots alike
    pub fn update_index_data(&mut self, slot: StorageSlot, indices: &[u32]) -> Result<()> {
        self.check_index_write(slot, 0, indices.len())?;

        self.frame_buffers[self.current].indices.set_data(slot.index_handle(), indices)?;

        self.bounds_cache.remove(&slot);
        self.log_transaction(slot, TransactionKind::Update);
        Ok(())
    }

    pub fn update_index_sub_data(&mut self, slot: StorageSlot, index_offset: usize, indices: &[u32]) -> Result<()> {
        self.check_index_write(slot, index_offset, indices.len())?;

        self.frame_buffers[self.current].indices.set_sub_data(slot.index_handle(), index_offset, indices)?;

        self.bounds_cache.remove(&slot);
        self.log_transaction(slot, TransactionKind::Update);
        Ok(())
    }

    /// Set the used vertex and index counts of a slot, within its capacity.
    /// Remap slots only accept a vertex count of zero.
    pub fn resize_data(&mut self, slot: StorageSlot, vertex_count: usize, index_count: usize) -> Result<()> {
        self.check_slot(slot)?;

        let current = &self.frame_buffers[self.current];
        match slot.kind() {
            SlotKind::Regular => {
                let capacity = current.vertices.capacity(slot.vertex_handle())?;
                if vertex_count > capacity {
                    engine_bail!(SOURCE, CapacityViolation,
                        "Cannot resize {:?} to {} vertices, capacity is {}", slot, vertex_count, capacity);
                }
            }
            SlotKind::IndexRemap => {
                if vertex_count > 0 {
                    engine_bail!(SOURCE, InvalidOperation,
                        "Cannot resize the vertices of index remap slot {:?}", slot);
                }
            }
        }
        let capacity = current.indices.capacity(slot.index_handle())?;
        if index_count > capacity {
            engine_bail!(SOURCE, CapacityViolation,
                "Cannot resize {:?} to {} indices, capacity is {}", slot, index_count, capacity);
        }

        let current = &mut self.frame_buffers[self.current];
        if slot.kind() == SlotKind::Regular {
            current.vertices.resize_data(slot.vertex_handle(), vertex_count)?;
        }
        current.indices.resize_data(slot.index_handle(), index_count)?;

        self.invalidate_bounds(slot);
        self.log_transaction(slot, TransactionKind::Update);
        Ok(())
    }

    // ===== QUERIES =====

    /// Element offsets and index count to draw `slot` from the current generation
    pub fn render_parameters(&self, slot: StorageSlot) -> Result<RenderParameters> {
        self.check_slot(slot)?;

        let current = &self.frame_buffers[self.current];
        Ok(RenderParameters {
            first_vertex: current.vertices.offset(slot.vertex_handle())?,
            first_index: current.indices.offset(slot.index_handle())?,
            index_count: current.indices.num_used_elements(slot.index_handle())?,
        })
    }

    /// Vertex capacity and index capacity of `slot` (0 vertices for remap slots)
    pub fn slot_capacity(&self, slot: StorageSlot) -> Result<(usize, usize)> {
        self.check_slot(slot)?;

        let current = &self.frame_buffers[self.current];
        let vertex_capacity = match slot.kind() {
            SlotKind::Regular => current.vertices.capacity(slot.vertex_handle())?,
            SlotKind::IndexRemap => 0,
        };
        Ok((vertex_capacity, current.indices.capacity(slot.index_handle())?))
    }

    /// Bounds of the vertices referenced by the slot's indices, cached until the
    /// slot (or, for remap slots, its primary) changes
    pub fn bounds(&mut self, slot: StorageSlot) -> Result<AABB> {
        if let Some(bounds) = self.bounds_cache.get(&slot) {
            return Ok(*bounds);
        }

        let parameters = self.render_parameters(slot)?;
        let current = &self.frame_buffers[self.current];
        let vertices = current.vertices.data();
        let indices = &current.indices.data()[parameters.first_index..parameters.first_index + parameters.index_count];

        let mut bounds = AABB::EMPTY;
        for &index in indices {
            let Some(vertex) = vertices.get(parameters.first_vertex + index as usize) else {
                engine_bail!(SOURCE, InvalidHandle,
                    "Index {} of {:?} points outside the vertex buffer", index, slot);
            };
            bounds.include_point(vertex.position());
        }

        self.bounds_cache.insert(slot, bounds);
        Ok(bounds)
    }

    /// Vertex array of the current generation. Re-borrow after any mutation.
    pub fn vertex_data(&self) -> &[V] {
        self.frame_buffers[self.current].vertices.data()
    }

    /// Index array of the current generation. Re-borrow after any mutation.
    pub fn index_data(&self) -> &[u32] {
        self.frame_buffers[self.current].indices.data()
    }

    /// Used vertices of a regular slot
    pub fn slot_vertices(&self, slot: StorageSlot) -> Result<&[V]> {
        self.check_slot(slot)?;
        self.frame_buffers[self.current].vertices.slot_data(slot.vertex_handle())
    }

    /// Used indices of a slot
    pub fn slot_indices(&self, slot: StorageSlot) -> Result<&[u32]> {
        self.check_slot(slot)?;
        self.frame_buffers[self.current].indices.slot_data(slot.index_handle())
    }

    pub fn is_allocated(&self, slot: StorageSlot) -> bool {
        self.check_slot(slot).is_ok()
    }

    // ===== INTERNALS =====

    fn check_slot(&self, slot: StorageSlot) -> Result<()> {
        let current = &self.frame_buffers[self.current];
        if !current.vertices.is_allocated(slot.vertex_handle()) || !current.indices.is_allocated(slot.index_handle()) {
            engine_bail!(SOURCE, InvalidHandle, "{:?} is not allocated", slot);
        }
        Ok(())
    }

    fn check_vertex_write(&self, slot: StorageSlot, offset: usize, len: usize) -> Result<()> {
        self.check_slot(slot)?;

        match slot.kind() {
            SlotKind::IndexRemap if len > 0 => {
                engine_bail!(SOURCE, InvalidOperation,
                    "Cannot write vertices through index remap slot {:?}", slot);
            }
            SlotKind::IndexRemap => Ok(()),
            SlotKind::Regular => {
                let capacity = self.frame_buffers[self.current].vertices.capacity(slot.vertex_handle())?;
                check_range(slot, "vertices", offset, len, capacity)
            }
        }
    }

    fn check_index_write(&self, slot: StorageSlot, offset: usize, len: usize) -> Result<()> {
        self.check_slot(slot)?;
        let capacity = self.frame_buffers[self.current].indices.capacity(slot.index_handle())?;
        check_range(slot, "indices", offset, len, capacity)
    }

    fn invalidate_bounds(&mut self, slot: StorageSlot) {
        match slot.kind() {
            SlotKind::Regular => self.invalidate_vertex_bounds(slot.vertex_handle()),
            SlotKind::IndexRemap => {
                self.bounds_cache.remove(&slot);
            }
        }
    }

    /// Drop the cached bounds of every slot reading from `vertex_handle`
    fn invalidate_vertex_bounds(&mut self, vertex_handle: BufferHandle) {
        self.bounds_cache.retain(|slot, _| slot.vertex_handle() != vertex_handle);
    }

    fn log_transaction(&mut self, slot: StorageSlot, kind: TransactionKind) {
        let current = self.current;
        for (generation, frame_buffer) in self.frame_buffers.iter_mut().enumerate() {
            if generation != current {
                frame_buffer.pending_transactions.push(BufferTransaction::new(slot, kind));
            }
        }
    }
}

fn check_range(slot: StorageSlot, what: &str, offset: usize, len: usize, capacity: usize) -> Result<()> {
    match offset.checked_add(len) {
        Some(end) if end <= capacity => Ok(()),
        _ => Err(engine_err!(SOURCE, CapacityViolation,
            "Cannot write {} {} at offset {} in {:?} of capacity {}", len, what, offset, slot, capacity)),
    }
}

/// Mutable access to `items[target]` alongside shared access to `items[source]`
fn pair_mut<T>(items: &mut [T], target: usize, source: usize) -> (&mut T, &T) {
    debug_assert_ne!(target, source);
    if target < source {
        let (left, right) = items.split_at_mut(source);
        (&mut left[target], &right[0])
    } else {
        let (left, right) = items.split_at_mut(target);
        (&mut right[0], &left[source])
    }
}

#[cfg(test)]
#[path = "geometry_store_tests.rs"]
mod tests;
