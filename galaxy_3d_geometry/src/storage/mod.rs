/// CPU-side geometry storage: slab allocator, frame-buffered store, bounds

pub mod bounds;
pub mod continuous_buffer;
pub mod geometry_store;
pub mod slot;
pub mod transaction;
pub mod vertex;

pub use bounds::AABB;
pub use continuous_buffer::{BufferHandle, ContinuousBuffer, DEFAULT_INITIAL_SIZE, MINIMUM_SIZE};
pub use geometry_store::{GeometryStore, GeometryStoreConfig, RenderParameters};
pub use slot::{SlotKind, StorageSlot};
pub use transaction::{BufferTransaction, TransactionKind};
pub use vertex::{GeometryVertex, RenderVertex};
