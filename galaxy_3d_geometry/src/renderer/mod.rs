/// Renderer façades - map opaque handles to GeometryStore slots and batch draws
///
/// All three façades own no GPU state. They take the GeometryStore as a
/// parameter of every call that touches storage, and submit draws through a
/// DrawCallIssuer after the store has been synced and bound.

pub mod geometry_renderer;
pub mod surface_renderer;
pub mod winding_renderer;

pub use geometry_renderer::*;
pub use surface_renderer::*;
pub use winding_renderer::*;

use glam::Mat4;

use crate::error::Result;
use crate::gpu::DrawCommand;
use crate::storage::{GeometryStore, GeometryVertex, StorageSlot};

/// Draw command covering the whole used index range of `slot`
pub(crate) fn slot_draw_command<V: GeometryVertex>(
    store: &GeometryStore<V>,
    slot: StorageSlot,
    transform: Option<Mat4>,
) -> Result<DrawCommand> {
    let parameters = store.render_parameters(slot)?;
    Ok(DrawCommand {
        first_vertex: parameters.first_vertex,
        first_index: parameters.first_index,
        index_count: parameters.index_count,
        transform,
    })
}
