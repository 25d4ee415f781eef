/// Composite GeometryStore slot handle

use crate::storage::continuous_buffer::BufferHandle;

/// Kind of a GeometryStore slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SlotKind {
    /// Owns a vertex range and an index range
    Regular,
    /// Owns an index range over another slot's vertices
    IndexRemap,
}

/// Opaque handle of a GeometryStore allocation.
///
/// Bit layout: bit 62 = kind, bits 31..62 = vertex buffer handle,
/// bits 0..31 = index buffer handle. Bit 63 is always zero.
/// For IndexRemap slots the vertex handle is the primary slot's.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StorageSlot(u64);

impl StorageSlot {
    /// Largest buffer handle that fits in a slot
    pub const MAX_HANDLE: BufferHandle = 0x7FFF_FFFF;

    const KIND_SHIFT: u32 = 62;
    const VERTEX_SHIFT: u32 = 31;

    pub(crate) fn new(kind: SlotKind, vertex_handle: BufferHandle, index_handle: BufferHandle) -> Self {
        debug_assert!(vertex_handle <= Self::MAX_HANDLE && index_handle <= Self::MAX_HANDLE);

        let kind_bits: u64 = match kind {
            SlotKind::Regular => 0,
            SlotKind::IndexRemap => 1,
        };

        Self(
            (kind_bits << Self::KIND_SHIFT)
                | ((u64::from(vertex_handle & Self::MAX_HANDLE)) << Self::VERTEX_SHIFT)
                | u64::from(index_handle & Self::MAX_HANDLE),
        )
    }

    pub fn kind(self) -> SlotKind {
        if (self.0 >> Self::KIND_SHIFT) & 1 == 1 {
            SlotKind::IndexRemap
        } else {
            SlotKind::Regular
        }
    }

    pub fn vertex_handle(self) -> BufferHandle {
        ((self.0 >> Self::VERTEX_SHIFT) as u32) & Self::MAX_HANDLE
    }

    pub fn index_handle(self) -> BufferHandle {
        (self.0 as u32) & Self::MAX_HANDLE
    }

    /// Raw 64-bit value, for storage in foreign bookkeeping
    pub fn to_raw(self) -> u64 {
        self.0
    }

    pub fn from_raw(raw: u64) -> Self {
        Self(raw & !(1 << 63))
    }
}
