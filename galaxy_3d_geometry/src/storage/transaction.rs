/// Transaction log entries replayed between frame buffer generations

use crate::storage::slot::StorageSlot;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionKind {
    Allocate,
    Update,
    Deallocate,
}

/// A slot touched while a generation was being written
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferTransaction {
    pub slot: StorageSlot,
    pub kind: TransactionKind,
}

impl BufferTransaction {
    pub fn new(slot: StorageSlot, kind: TransactionKind) -> Self {
        Self { slot, kind }
    }
}
