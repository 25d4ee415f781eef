/// Fixed-size polygon storage: indexers and the compact winding buffer

pub mod compact_buffer;
pub mod indexer;

pub use compact_buffer::{CompactWindingVertexBuffer, SlotOffsetMap, WindingSlotNumber};
pub use indexer::{LineIndexer, PolygonIndexer, TriangleIndexer, WindingIndexer};
