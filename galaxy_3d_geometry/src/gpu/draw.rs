/// Draw submission types and the DrawCallIssuer trait

use glam::Mat4;
use crate::error::Result;

/// Primitive topology of a draw call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PrimitiveMode {
    Triangles,
    Quads,
    Lines,
    Points,
    Polygon,
}

/// One indexed draw over the GeometryStore buffers.
///
/// Offsets are element offsets into the currently bound vertex and
/// index buffer objects (glDrawElementsBaseVertex semantics).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DrawCommand {
    /// Base vertex added to every index
    pub first_vertex: usize,
    /// First index in the index buffer
    pub first_index: usize,
    /// Number of indices to draw
    pub index_count: usize,
    /// Object transform, None for identity
    pub transform: Option<Mat4>,
}

/// Issues draw calls against the bound geometry buffers.
///
/// A batch is submitted as a single multi-draw call when the backend
/// supports it (glMultiDrawElementsBaseVertex). Implementations must
/// not retain the slice.
pub trait DrawCallIssuer {
    /// Draw all commands of a batch with the same primitive mode
    fn draw_elements(&mut self, mode: PrimitiveMode, batch: &[DrawCommand]) -> Result<()>;
}
