/// Brush face windings, bucketed by vertex count
///
/// Windings of the same size live in one CompactWindingVertexBuffer (a
/// bucket, index `size - 3`), mirrored into a single GeometryStore slot per
/// bucket. Clients hold a [`WindingSlot`] which maps to a bucket ordinal that
/// changes whenever the bucket is compacted.
///
/// Removal is deferred: removed ordinals are queued and either recycled by
/// the next `add_winding` of the same size or compacted away in
/// `prepare_for_rendering`, which also pushes every modified ordinal range to
/// the store.
///
/// With an indexer that supports it, windings tagged with the same
/// [`RenderEntityId`] form a per-entity surface: an index remap slot over the
/// bucket's vertex storage, rebuilt when its membership changes or the bucket
/// layout moves.

use std::collections::BTreeSet;

use rustc_hash::FxHashMap;

use crate::engine_bail;
use crate::engine_debug;
use crate::engine_err;
use crate::engine_trace;
use crate::error::Result;
use crate::gpu::{DrawCallIssuer, DrawCommand};
use crate::renderer::slot_draw_command;
use crate::storage::{AABB, GeometryStore, GeometryVertex, RenderVertex, StorageSlot};
use crate::winding::{CompactWindingVertexBuffer, SlotOffsetMap, WindingIndexer, WindingSlotNumber};

const SOURCE: &str = "galaxy3d::WindingRenderer";

/// Windings smaller than a triangle are rejected
const MIN_WINDING_SIZE: usize = 3;

/// Handle returned by [`WindingRenderer::add_winding`]
pub type WindingSlot = usize;

/// Identifies the scene entity owning a winding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RenderEntityId(pub u64);

type BucketIndex = u16;

/// Bucket index (high 16 bits) and ordinal within the bucket (low 48 bits)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct WindingLocation(u64);

impl WindingLocation {
    const ORDINAL_BITS: u32 = 48;
    const ORDINAL_MASK: u64 = (1 << Self::ORDINAL_BITS) - 1;

    fn new(bucket: BucketIndex, ordinal: WindingSlotNumber) -> Self {
        debug_assert!(ordinal as u64 <= Self::ORDINAL_MASK);
        Self((u64::from(bucket) << Self::ORDINAL_BITS) | (ordinal as u64 & Self::ORDINAL_MASK))
    }

    fn bucket(self) -> BucketIndex {
        (self.0 >> Self::ORDINAL_BITS) as BucketIndex
    }

    fn ordinal(self) -> WindingSlotNumber {
        (self.0 & Self::ORDINAL_MASK) as WindingSlotNumber
    }
}

#[derive(Debug, Clone, Copy)]
struct SlotMapping {
    location: WindingLocation,
    entity: Option<RenderEntityId>,
}

// ===== BUCKET =====

struct Bucket<V, I> {
    buffer: CompactWindingVertexBuffer<V, I>,
    /// Ordinals of removed windings, still present in `buffer`
    pending_deletions: Vec<WindingSlotNumber>,
    storage: Option<StorageSlot>,
    /// Number of windings `storage` can hold
    storage_capacity: usize,
    /// Ordinal range `[first, end)` changed since the last sync
    modified: Option<(usize, usize)>,
    /// Bumped whenever ordinals shift or the storage moves
    layout_generation: u64,
}

impl<V: GeometryVertex, I: WindingIndexer> Bucket<V, I> {
    fn new(winding_size: usize) -> Self {
        Self {
            buffer: CompactWindingVertexBuffer::new(winding_size),
            pending_deletions: Vec::new(),
            storage: None,
            storage_capacity: 0,
            modified: None,
            layout_generation: 0,
        }
    }

    fn mark_modified(&mut self, first: usize, end: usize) {
        self.modified = Some(match self.modified {
            Some((current_first, current_end)) => (current_first.min(first), current_end.max(end)),
            None => (first, end),
        });
    }

    /// Compact the buffer. The returned map renumbers surviving ordinals.
    fn commit_deletions(&mut self) -> Result<SlotOffsetMap> {
        let offsets = self.buffer.remove_windings(&self.pending_deletions)?;
        self.pending_deletions.clear();

        if let Some(&first) = offsets.removed().first() {
            // Every winding from the first removed one on has moved down
            self.mark_modified(first, usize::MAX);
            self.layout_generation += 1;
        }
        Ok(offsets)
    }

    /// Push the modified range to the store, reallocating when the bucket
    /// outgrew its storage and releasing the storage once the bucket is empty
    fn sync_with_geometry_store(&mut self, store: &mut GeometryStore<V>) -> Result<()> {
        let count = self.buffer.num_stored_windings();

        if count == 0 {
            if let Some(storage) = self.storage {
                store.deallocate_slot(storage)?;
                self.storage = None;
                self.storage_capacity = 0;
                self.layout_generation += 1;
            }
            self.modified = None;
            return Ok(());
        }

        let Some((first, end)) = self.modified else {
            return Ok(());
        };
        let end = end.min(count);
        let size = self.buffer.winding_size();
        let ipw = self.buffer.num_indices_per_winding();
        let vertices = self.buffer.vertices();
        let indices = self.buffer.indices();

        match self.storage {
            Some(storage) if self.storage_capacity >= count => {
                if first < end {
                    store.update_sub_data(
                        storage,
                        first * size,
                        &vertices[first * size..end * size],
                        first * ipw,
                        &indices[first * ipw..end * ipw],
                    )?;
                }
                store.resize_data(storage, count * size, count * ipw)?;
            }
            _ => {
                let storage = store.allocate_slot(vertices.len(), indices.len())?;
                if let Err(error) = store.update_data(storage, vertices, indices) {
                    store.deallocate_slot(storage)?;
                    return Err(error);
                }
                if let Some(old) = self.storage.replace(storage) {
                    store.deallocate_slot(old)?;
                }
                self.storage_capacity = count;
                self.layout_generation += 1;
                engine_debug!(SOURCE, "Bucket of size {} moved to {:?} ({} windings)", size, storage, count);
            }
        }

        self.modified = None;
        Ok(())
    }
}

// ===== ENTITY GROUPS =====

#[derive(Debug, Default)]
struct WindingGroup {
    members: BTreeSet<WindingSlot>,
    needs_rebuild: bool,
    /// Index remap slot over the bucket storage
    storage: Option<StorageSlot>,
    index_capacity: usize,
    /// Bucket storage and layout generation the indices were built against
    built_for: Option<(StorageSlot, u64)>,
}

impl WindingGroup {
    fn is_stale<V: GeometryVertex, I: WindingIndexer>(&self, bucket: &Bucket<V, I>) -> bool {
        self.needs_rebuild || self.built_for != bucket.storage.map(|storage| (storage, bucket.layout_generation))
    }
}

// ===== WINDING RENDERER =====

pub struct WindingRenderer<I, V = RenderVertex> {
    buckets: Vec<Bucket<V, I>>,
    slots: Vec<Option<SlotMapping>>,
    /// No free mapping below this index
    free_slot_hint: usize,
    winding_count: usize,
    groups: FxHashMap<(RenderEntityId, BucketIndex), WindingGroup>,
    /// Set by every change, cleared by `prepare_for_rendering`
    geometry_update_pending: bool,
}

impl<I: WindingIndexer, V: GeometryVertex> Default for WindingRenderer<I, V> {
    fn default() -> Self {
        Self {
            buckets: Vec::new(),
            slots: Vec::new(),
            free_slot_hint: 0,
            winding_count: 0,
            groups: FxHashMap::default(),
            geometry_update_pending: false,
        }
    }
}

impl<I: WindingIndexer, V: GeometryVertex> WindingRenderer<I, V> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn winding_count(&self) -> usize {
        self.winding_count
    }

    pub fn is_empty(&self) -> bool {
        self.winding_count == 0
    }

    /// Add a winding of at least 3 vertices.
    ///
    /// `entity` is ignored by indexers without entity surface support.
    /// Nothing reaches the store before the next `prepare_for_rendering`.
    pub fn add_winding(&mut self, vertices: &[V], entity: Option<RenderEntityId>) -> Result<WindingSlot> {
        let bucket_index = bucket_index_for_size(vertices.len())?;
        self.ensure_bucket(bucket_index);

        let bucket = &mut self.buckets[usize::from(bucket_index)];
        let ordinal = match bucket.pending_deletions.pop() {
            Some(ordinal) => {
                if let Err(error) = bucket.buffer.replace_winding(ordinal, vertices) {
                    bucket.pending_deletions.push(ordinal);
                    return Err(error);
                }
                ordinal
            }
            None => bucket.buffer.push_winding(vertices)?,
        };
        bucket.mark_modified(ordinal, ordinal + 1);

        let entity = entity.filter(|_| I::SUPPORTS_ENTITY_SURFACES);
        let slot = self.allocate_slot_mapping();
        self.slots[slot] = Some(SlotMapping {
            location: WindingLocation::new(bucket_index, ordinal),
            entity,
        });
        self.winding_count += 1;
        self.geometry_update_pending = true;

        if let Some(entity) = entity {
            let group = self.groups.entry((entity, bucket_index)).or_default();
            group.members.insert(slot);
            group.needs_rebuild = true;
        }

        Ok(slot)
    }

    /// Replace the vertices of a winding. The vertex count must not change.
    pub fn update_winding(&mut self, slot: WindingSlot, vertices: &[V]) -> Result<()> {
        let mapping = self.mapping(slot)?;
        let bucket = &mut self.buckets[usize::from(mapping.location.bucket())];

        if bucket.buffer.winding_size() != vertices.len() {
            engine_bail!(SOURCE, InvalidOperation,
                "Winding {} has {} vertices, cannot update it with {}",
                slot, bucket.buffer.winding_size(), vertices.len());
        }

        let ordinal = mapping.location.ordinal();
        bucket.buffer.replace_winding(ordinal, vertices)?;
        bucket.mark_modified(ordinal, ordinal + 1);
        // Entity surfaces index the bucket vertices, their indices stay valid
        self.geometry_update_pending = true;
        Ok(())
    }

    /// Remove a winding. Its bucket is compacted by the next
    /// `prepare_for_rendering` unless a new winding recycles its ordinal first.
    pub fn remove_winding(&mut self, store: &mut GeometryStore<V>, slot: WindingSlot) -> Result<()> {
        let mapping = self.mapping(slot)?;
        let bucket_index = mapping.location.bucket();

        if let Some(entity) = mapping.entity {
            let key = (entity, bucket_index);
            let emptied = self.groups
                .get(&key)
                .is_some_and(|group| group.members.len() == 1 && group.members.contains(&slot));

            if emptied {
                if let Some(storage) = self.groups.get(&key).and_then(|group| group.storage) {
                    store.deallocate_slot(storage)?;
                }
                self.groups.remove(&key);
            } else if let Some(group) = self.groups.get_mut(&key) {
                group.members.remove(&slot);
                group.needs_rebuild = true;
            }
        }

        self.buckets[usize::from(bucket_index)].pending_deletions.push(mapping.location.ordinal());
        self.slots[slot] = None;
        self.free_slot_hint = self.free_slot_hint.min(slot);
        self.winding_count -= 1;
        self.geometry_update_pending = true;

        if self.winding_count == 0 {
            // Nothing left to draw, release every bucket's storage right away
            for index in 0..self.buckets.len() {
                self.ready_bucket(store, index)?;
            }
            self.geometry_update_pending = false;
        }
        Ok(())
    }

    /// Vertices of a winding as currently stored on the CPU side
    pub fn winding_vertices(&self, slot: WindingSlot) -> Result<&[V]> {
        let mapping = self.mapping(slot)?;
        self.buckets[usize::from(mapping.location.bucket())]
            .buffer
            .winding_vertices(mapping.location.ordinal())
    }

    /// Commit deletions, sync every bucket to the store and rebuild stale
    /// entity surfaces. Required before rendering after any change.
    pub fn prepare_for_rendering(&mut self, store: &mut GeometryStore<V>) -> Result<()> {
        for index in 0..self.buckets.len() {
            self.ready_bucket(store, index)?;
        }

        let stale: Vec<_> = self.groups
            .iter()
            .filter(|((_, bucket), group)| group.is_stale(&self.buckets[usize::from(*bucket)]))
            .map(|(key, _)| *key)
            .collect();
        for key in stale {
            self.rebuild_group(store, key)?;
        }

        self.geometry_update_pending = false;
        Ok(())
    }

    /// Submit every bucket as one batch
    pub fn render_all_windings(&self, store: &GeometryStore<V>, issuer: &mut dyn DrawCallIssuer) -> Result<()> {
        self.check_prepared()?;

        let mut batch = Vec::with_capacity(self.buckets.len());
        for bucket in &self.buckets {
            let Some(storage) = bucket.storage else { continue };
            let command = slot_draw_command(store, storage, None)?;
            if command.index_count > 0 {
                batch.push(command);
            }
        }

        if batch.is_empty() {
            return Ok(());
        }
        issuer.draw_elements(I::PRIMITIVE_MODE, &batch)
    }

    /// Submit a single winding
    pub fn render_winding(
        &self,
        store: &GeometryStore<V>,
        slot: WindingSlot,
        issuer: &mut dyn DrawCallIssuer,
    ) -> Result<()> {
        self.check_prepared()?;

        let mapping = self.mapping(slot)?;
        let bucket = &self.buckets[usize::from(mapping.location.bucket())];
        let Some(storage) = bucket.storage else {
            engine_bail!(SOURCE, InvalidOperation, "Bucket of winding {} has no storage", slot);
        };

        let parameters = store.render_parameters(storage)?;
        let ipw = bucket.buffer.num_indices_per_winding();
        let command = DrawCommand {
            first_vertex: parameters.first_vertex,
            first_index: parameters.first_index + mapping.location.ordinal() * ipw,
            index_count: ipw,
            transform: None,
        };
        issuer.draw_elements(I::PRIMITIVE_MODE, &[command])
    }

    /// Storage slot of the surface formed by `entity`'s windings of the given
    /// size, None if the entity has no such windings
    pub fn entity_surface(
        &mut self,
        store: &mut GeometryStore<V>,
        entity: RenderEntityId,
        winding_size: usize,
    ) -> Result<Option<StorageSlot>> {
        let bucket_index = bucket_index_for_size(winding_size)?;
        let key = (entity, bucket_index);
        if !self.groups.contains_key(&key) {
            return Ok(None);
        }

        self.ready_bucket(store, usize::from(bucket_index))?;

        let bucket = &self.buckets[usize::from(bucket_index)];
        if self.groups.get(&key).is_some_and(|group| group.is_stale(bucket)) {
            self.rebuild_group(store, key)?;
        }
        Ok(self.groups.get(&key).and_then(|group| group.storage))
    }

    pub fn entity_surface_bounds(
        &mut self,
        store: &mut GeometryStore<V>,
        entity: RenderEntityId,
        winding_size: usize,
    ) -> Result<Option<AABB>> {
        match self.entity_surface(store, entity, winding_size)? {
            Some(storage) => Ok(Some(store.bounds(storage)?)),
            None => Ok(None),
        }
    }

    /// Number of surfaces (one per winding size) the entity currently has
    pub fn entity_surface_count(&self, entity: RenderEntityId) -> usize {
        self.groups.keys().filter(|(owner, _)| *owner == entity).count()
    }

    /// Free all storage and forget every winding
    pub fn release(&mut self, store: &mut GeometryStore<V>) -> Result<()> {
        for (_, group) in self.groups.drain() {
            if let Some(storage) = group.storage {
                store.deallocate_slot(storage)?;
            }
        }
        for bucket in self.buckets.drain(..) {
            if let Some(storage) = bucket.storage {
                store.deallocate_slot(storage)?;
            }
        }
        self.slots.clear();
        self.free_slot_hint = 0;
        self.winding_count = 0;
        self.geometry_update_pending = false;
        Ok(())
    }

    // ===== INTERNALS =====

    fn mapping(&self, slot: WindingSlot) -> Result<SlotMapping> {
        self.slots
            .get(slot)
            .copied()
            .flatten()
            .ok_or_else(|| engine_err!(SOURCE, InvalidHandle, "Winding slot {} is not in use", slot))
    }

    fn check_prepared(&self) -> Result<()> {
        if self.geometry_update_pending {
            engine_bail!(SOURCE, InvalidOperation, "Windings changed since the last prepare_for_rendering");
        }
        Ok(())
    }

    fn ensure_bucket(&mut self, bucket_index: BucketIndex) {
        while self.buckets.len() <= usize::from(bucket_index) {
            let winding_size = self.buckets.len() + MIN_WINDING_SIZE;
            engine_trace!(SOURCE, "Creating bucket for windings of size {}", winding_size);
            self.buckets.push(Bucket::new(winding_size));
        }
    }

    fn allocate_slot_mapping(&mut self) -> WindingSlot {
        let start = self.free_slot_hint.min(self.slots.len());
        let slot = match self.slots[start..].iter().position(Option::is_none) {
            Some(offset) => start + offset,
            None => {
                self.slots.push(None);
                self.slots.len() - 1
            }
        };
        self.free_slot_hint = slot + 1;
        slot
    }

    /// Commit the bucket's deletions, renumber its mappings and sync it
    fn ready_bucket(&mut self, store: &mut GeometryStore<V>, index: usize) -> Result<()> {
        let bucket = &mut self.buckets[index];

        if !bucket.pending_deletions.is_empty() {
            let offsets = bucket.commit_deletions()?;
            for mapping in self.slots.iter_mut().flatten() {
                let location = mapping.location;
                if usize::from(location.bucket()) != index {
                    continue;
                }
                if let Some(ordinal) = offsets.remap(location.ordinal()) {
                    mapping.location = WindingLocation::new(location.bucket(), ordinal);
                }
            }
        }

        bucket.sync_with_geometry_store(store)
    }

    /// Regenerate the group's indices against the current bucket layout
    fn rebuild_group(&mut self, store: &mut GeometryStore<V>, key: (RenderEntityId, BucketIndex)) -> Result<()> {
        let bucket = &self.buckets[usize::from(key.1)];
        let Some(primary) = bucket.storage else {
            return Ok(());
        };
        let Some(group) = self.groups.get_mut(&key) else {
            return Ok(());
        };

        let size = bucket.buffer.winding_size();
        let mut indices = Vec::with_capacity(group.members.len() * bucket.buffer.num_indices_per_winding());
        for &slot in &group.members {
            if let Some(Some(mapping)) = self.slots.get(slot) {
                I::generate_indices(&mut indices, size, (mapping.location.ordinal() * size) as u32);
            }
        }

        let reusable = match (group.storage, group.built_for) {
            (Some(storage), Some((built_primary, _)))
                if built_primary == primary && group.index_capacity >= indices.len() => Some(storage),
            _ => None,
        };
        let storage = match reusable {
            Some(storage) => storage,
            None => {
                let storage = store.allocate_index_slot(primary, indices.len())?;
                if let Some(old) = group.storage.replace(storage) {
                    store.deallocate_slot(old)?;
                }
                group.index_capacity = indices.len();
                storage
            }
        };
        store.update_index_data(storage, &indices)?;

        group.needs_rebuild = false;
        group.built_for = Some((primary, bucket.layout_generation));
        engine_trace!(SOURCE, "Rebuilt surface of {:?} for size {} ({} windings)", key.0, size, group.members.len());
        Ok(())
    }
}

fn bucket_index_for_size(winding_size: usize) -> Result<BucketIndex> {
    if winding_size < MIN_WINDING_SIZE {
        engine_bail!(SOURCE, InvalidOperation, "Windings need at least 3 vertices, got {}", winding_size);
    }
    match BucketIndex::try_from(winding_size - MIN_WINDING_SIZE) {
        Ok(index) if index < BucketIndex::MAX => Ok(index),
        _ => Err(engine_err!(SOURCE, InvalidOperation, "Winding of {} vertices is too large", winding_size)),
    }
}

#[cfg(test)]
#[path = "winding_renderer_tests.rs"]
mod tests;
