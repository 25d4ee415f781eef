/// Packed storage for windings of one fixed size
///
/// Winding `n` owns vertices `[n * size, (n + 1) * size)` and indices
/// `[n * ipw, (n + 1) * ipw)` where `ipw` is the indexer's index count per
/// winding. Since every winding shares the same index pattern relative to its
/// own block, removing winding `n` only needs to erase its vertex block and
/// drop one winding worth of indices from the tail. The bucket must stay
/// strictly size-homogeneous for this to hold.

use std::marker::PhantomData;

use crate::engine_bail;
use crate::error::Result;
use crate::winding::indexer::WindingIndexer;

/// Position of a winding within its buffer
pub type WindingSlotNumber = usize;

const SOURCE: &str = "galaxy3d::CompactWindingVertexBuffer";

/// Renumbering produced by a bulk removal
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SlotOffsetMap {
    removed: Vec<WindingSlotNumber>,
}

impl SlotOffsetMap {
    /// New position of a winding that was at `slot` before the removal,
    /// `None` if it was removed
    pub fn remap(&self, slot: WindingSlotNumber) -> Option<WindingSlotNumber> {
        match self.removed.binary_search(&slot) {
            Ok(_) => None,
            Err(shift) => Some(slot - shift),
        }
    }

    /// Removed slot numbers, ascending
    pub fn removed(&self) -> &[WindingSlotNumber] {
        &self.removed
    }

    pub fn is_empty(&self) -> bool {
        self.removed.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct CompactWindingVertexBuffer<V, I> {
    winding_size: usize,
    indices_per_winding: usize,
    vertices: Vec<V>,
    indices: Vec<u32>,
    _indexer: PhantomData<I>,
}

impl<V: Copy, I: WindingIndexer> CompactWindingVertexBuffer<V, I> {
    pub fn new(winding_size: usize) -> Self {
        Self {
            winding_size,
            indices_per_winding: I::num_indices_per_winding(winding_size),
            vertices: Vec::new(),
            indices: Vec::new(),
            _indexer: PhantomData,
        }
    }

    pub fn winding_size(&self) -> usize {
        self.winding_size
    }

    pub fn num_indices_per_winding(&self) -> usize {
        self.indices_per_winding
    }

    pub fn num_stored_windings(&self) -> usize {
        if self.winding_size == 0 {
            return 0;
        }
        self.vertices.len() / self.winding_size
    }

    pub fn vertices(&self) -> &[V] {
        &self.vertices
    }

    pub fn indices(&self) -> &[u32] {
        &self.indices
    }

    /// Vertices of one winding
    pub fn winding_vertices(&self, slot: WindingSlotNumber) -> Result<&[V]> {
        self.check_slot(slot)?;
        let start = slot * self.winding_size;
        Ok(&self.vertices[start..start + self.winding_size])
    }

    /// Append a winding and return its slot number
    pub fn push_winding(&mut self, vertices: &[V]) -> Result<WindingSlotNumber> {
        self.check_winding_size(vertices.len())?;

        let slot = self.num_stored_windings();
        let Ok(first_vertex) = u32::try_from(self.vertices.len()) else {
            engine_bail!(SOURCE, ResourceExhaustion,
                "Vertex position {} exceeds the 32-bit index range", self.vertices.len());
        };
        if u32::try_from(self.vertices.len() + self.winding_size).is_err() {
            engine_bail!(SOURCE, ResourceExhaustion,
                "Winding at vertex {} exceeds the 32-bit index range", first_vertex);
        }

        self.vertices.extend_from_slice(vertices);
        I::generate_indices(&mut self.indices, self.winding_size, first_vertex);
        Ok(slot)
    }

    /// Overwrite the vertices of an existing winding, indices stay as they are
    pub fn replace_winding(&mut self, slot: WindingSlotNumber, vertices: &[V]) -> Result<()> {
        self.check_winding_size(vertices.len())?;
        self.check_slot(slot)?;

        let start = slot * self.winding_size;
        self.vertices[start..start + self.winding_size].copy_from_slice(vertices);
        Ok(())
    }

    /// Remove one winding, shifting every following winding down by one.
    ///
    /// O(trailing windings): prefer [`remove_windings`](Self::remove_windings)
    /// for more than one removal.
    pub fn remove_winding(&mut self, slot: WindingSlotNumber) -> Result<()> {
        self.check_slot(slot)?;

        let start = slot * self.winding_size;
        self.vertices.drain(start..start + self.winding_size);
        self.indices.truncate(self.indices.len() - self.indices_per_winding);
        Ok(())
    }

    /// Remove several windings in one compaction pass.
    ///
    /// Duplicates are ignored. Fails before touching anything if a slot is out
    /// of range. The returned map tells where every surviving winding went.
    pub fn remove_windings(&mut self, slots: &[WindingSlotNumber]) -> Result<SlotOffsetMap> {
        let mut removed = slots.to_vec();
        removed.sort_unstable();
        removed.dedup();

        if let Some(&last) = removed.last() {
            self.check_slot(last)?;
        }

        let winding_size = self.winding_size;
        let mut next_removed = removed.iter().peekable();
        let mut write = 0;
        for slot in 0..self.num_stored_windings() {
            if next_removed.peek() == Some(&&slot) {
                next_removed.next();
                continue;
            }
            if write != slot {
                self.vertices.copy_within(slot * winding_size..(slot + 1) * winding_size, write * winding_size);
            }
            write += 1;
        }

        self.vertices.truncate(write * winding_size);
        self.indices.truncate(write * self.indices_per_winding);

        Ok(SlotOffsetMap { removed })
    }

    fn check_winding_size(&self, size: usize) -> Result<()> {
        if self.winding_size == 0 {
            engine_bail!(SOURCE, InvalidOperation, "Cannot store windings without vertices");
        }
        if size != self.winding_size {
            engine_bail!(SOURCE, InvalidOperation,
                "Winding has {} vertices, this buffer stores windings of size {}", size, self.winding_size);
        }
        Ok(())
    }

    fn check_slot(&self, slot: WindingSlotNumber) -> Result<()> {
        let count = self.num_stored_windings();
        if slot >= count {
            engine_bail!(SOURCE, InvalidHandle,
                "Winding slot {} out of range, buffer holds {} windings", slot, count);
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "compact_buffer_tests.rs"]
mod tests;
