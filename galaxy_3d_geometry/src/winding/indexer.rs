/// Index generation strategies for fixed-size windings
///
/// Every winding in a bucket gets the same index pattern relative to its own
/// vertex block, which is what lets CompactWindingVertexBuffer drop a
/// winding by truncating the index tail.

use crate::gpu::PrimitiveMode;

/// Produces the index pattern of one winding
pub trait WindingIndexer {
    /// Primitive topology the generated indices are meant for
    const PRIMITIVE_MODE: PrimitiveMode;

    /// Whether windings can be grouped into per-entity surfaces
    const SUPPORTS_ENTITY_SURFACES: bool;

    fn num_indices_per_winding(winding_size: usize) -> usize;

    /// Append the indices of a winding whose first vertex is `first_vertex`
    fn generate_indices<E: Extend<u32>>(out: &mut E, winding_size: usize, first_vertex: u32);
}

/// Fan triangulation: N vertices give N-2 triangles sharing the first vertex
#[derive(Debug, Clone, Copy, Default)]
pub struct TriangleIndexer;

impl WindingIndexer for TriangleIndexer {
    const PRIMITIVE_MODE: PrimitiveMode = PrimitiveMode::Triangles;
    const SUPPORTS_ENTITY_SURFACES: bool = true;

    fn num_indices_per_winding(winding_size: usize) -> usize {
        3 * winding_size.saturating_sub(2)
    }

    fn generate_indices<E: Extend<u32>>(out: &mut E, winding_size: usize, first_vertex: u32) {
        // Last triangle first, keeps the winding order of the source polygon
        for i in (1..winding_size.saturating_sub(1) as u32).rev() {
            out.extend([first_vertex, first_vertex + i, first_vertex + i + 1]);
        }
    }
}

/// Closed edge loop for wireframe rendering
#[derive(Debug, Clone, Copy, Default)]
pub struct LineIndexer;

impl WindingIndexer for LineIndexer {
    const PRIMITIVE_MODE: PrimitiveMode = PrimitiveMode::Lines;
    const SUPPORTS_ENTITY_SURFACES: bool = false;

    fn num_indices_per_winding(winding_size: usize) -> usize {
        2 * winding_size
    }

    fn generate_indices<E: Extend<u32>>(out: &mut E, winding_size: usize, first_vertex: u32) {
        let size = winding_size as u32;
        for i in 0..size {
            out.extend([first_vertex + i, first_vertex + (i + 1) % size]);
        }
    }
}

/// Identity mapping for native polygon primitives
#[derive(Debug, Clone, Copy, Default)]
pub struct PolygonIndexer;

impl WindingIndexer for PolygonIndexer {
    const PRIMITIVE_MODE: PrimitiveMode = PrimitiveMode::Polygon;
    const SUPPORTS_ENTITY_SURFACES: bool = false;

    fn num_indices_per_winding(winding_size: usize) -> usize {
        winding_size
    }

    fn generate_indices<E: Extend<u32>>(out: &mut E, winding_size: usize, first_vertex: u32) {
        out.extend(first_vertex..first_vertex + winding_size as u32);
    }
}

#[cfg(test)]
#[path = "indexer_tests.rs"]
mod tests;
