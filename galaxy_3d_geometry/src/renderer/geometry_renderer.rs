/// Arbitrary indexed geometry (overlays, debug shapes, patches)
///
/// Every geometry gets its own GeometryStore slot. Visible geometries of the
/// same type are submitted together, one batch per primitive type.

use crate::engine_bail;
use crate::engine_err;
use crate::engine_trace;
use crate::error::Result;
use crate::gpu::{DrawCallIssuer, PrimitiveMode};
use crate::renderer::slot_draw_command;
use crate::storage::{AABB, GeometryStore, GeometryVertex, StorageSlot};
use crate::utils::SlotAllocator;

const SOURCE: &str = "galaxy3d::GeometryRenderer";

/// Handle returned by [`GeometryRenderer::add_geometry`]
pub type GeometrySlot = u32;

/// Primitive type of a geometry's indices
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GeometryType {
    Triangles,
    Quads,
    Lines,
    Points,
}

impl GeometryType {
    /// Submission order of [`GeometryRenderer::render_all_visible`]
    pub const ALL: [GeometryType; 4] = [
        GeometryType::Triangles,
        GeometryType::Quads,
        GeometryType::Lines,
        GeometryType::Points,
    ];

    pub fn primitive_mode(self) -> PrimitiveMode {
        match self {
            GeometryType::Triangles => PrimitiveMode::Triangles,
            GeometryType::Quads => PrimitiveMode::Quads,
            GeometryType::Lines => PrimitiveMode::Lines,
            GeometryType::Points => PrimitiveMode::Points,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct GeometryInfo {
    geometry_type: GeometryType,
    storage: StorageSlot,
    vertex_capacity: usize,
    index_capacity: usize,
    visible: bool,
}

#[derive(Debug, Default)]
pub struct GeometryRenderer {
    geometries: Vec<Option<GeometryInfo>>,
    ids: SlotAllocator,
}

impl GeometryRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn geometry_count(&self) -> usize {
        self.ids.len() as usize
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Store a new geometry. It starts out visible.
    pub fn add_geometry<V: GeometryVertex>(
        &mut self,
        store: &mut GeometryStore<V>,
        geometry_type: GeometryType,
        vertices: &[V],
        indices: &[u32],
    ) -> Result<GeometrySlot> {
        let storage = store.allocate_slot(vertices.len(), indices.len())?;

        if let Err(error) = store.update_data(storage, vertices, indices) {
            store.deallocate_slot(storage)?;
            return Err(error);
        }

        let Some(slot) = self.ids.alloc() else {
            store.deallocate_slot(storage)?;
            engine_bail!(SOURCE, ResourceExhaustion, "Out of geometry slots");
        };

        let info = GeometryInfo {
            geometry_type,
            storage,
            vertex_capacity: vertices.len(),
            index_capacity: indices.len(),
            visible: true,
        };
        match self.geometries.get_mut(slot as usize) {
            Some(entry) => *entry = Some(info),
            None => self.geometries.push(Some(info)),
        }

        engine_trace!(SOURCE, "Added {:?} geometry {} ({} vertices, {} indices)",
            geometry_type, slot, vertices.len(), indices.len());
        Ok(slot)
    }

    /// Replace a geometry's data. Storage is reallocated when the new data
    /// does not fit the current allocation.
    pub fn update_geometry<V: GeometryVertex>(
        &mut self,
        store: &mut GeometryStore<V>,
        slot: GeometrySlot,
        vertices: &[V],
        indices: &[u32],
    ) -> Result<()> {
        let info = self.info(slot)?;

        if vertices.len() <= info.vertex_capacity && indices.len() <= info.index_capacity {
            return store.update_data(info.storage, vertices, indices);
        }

        let storage = store.allocate_slot(vertices.len(), indices.len())?;
        if let Err(error) = store.update_data(storage, vertices, indices) {
            store.deallocate_slot(storage)?;
            return Err(error);
        }
        store.deallocate_slot(info.storage)?;

        let entry = self.info_mut(slot)?;
        entry.storage = storage;
        entry.vertex_capacity = vertices.len();
        entry.index_capacity = indices.len();
        Ok(())
    }

    pub fn remove_geometry<V: GeometryVertex>(&mut self, store: &mut GeometryStore<V>, slot: GeometrySlot) -> Result<()> {
        let info = self.info(slot)?;
        store.deallocate_slot(info.storage)?;

        self.geometries[slot as usize] = None;
        self.ids.free(slot);
        Ok(())
    }

    /// Include the geometry in [`render_all_visible`](Self::render_all_visible)
    pub fn activate_geometry(&mut self, slot: GeometrySlot) -> Result<()> {
        self.info_mut(slot)?.visible = true;
        Ok(())
    }

    pub fn deactivate_geometry(&mut self, slot: GeometrySlot) -> Result<()> {
        self.info_mut(slot)?.visible = false;
        Ok(())
    }

    pub fn is_visible(&self, slot: GeometrySlot) -> Result<bool> {
        Ok(self.info(slot)?.visible)
    }

    /// Submit every visible geometry, one batch per geometry type
    pub fn render_all_visible<V: GeometryVertex>(
        &self,
        store: &GeometryStore<V>,
        issuer: &mut dyn DrawCallIssuer,
    ) -> Result<()> {
        for geometry_type in GeometryType::ALL {
            let mut batch = Vec::new();

            for info in self.geometries.iter().flatten() {
                if !info.visible || info.geometry_type != geometry_type {
                    continue;
                }
                let command = slot_draw_command(store, info.storage, None)?;
                if command.index_count > 0 {
                    batch.push(command);
                }
            }

            if !batch.is_empty() {
                issuer.draw_elements(geometry_type.primitive_mode(), &batch)?;
            }
        }
        Ok(())
    }

    /// Submit a single geometry, visible or not
    pub fn render_geometry<V: GeometryVertex>(
        &self,
        store: &GeometryStore<V>,
        slot: GeometrySlot,
        issuer: &mut dyn DrawCallIssuer,
    ) -> Result<()> {
        let info = self.info(slot)?;
        let command = slot_draw_command(store, info.storage, None)?;
        issuer.draw_elements(info.geometry_type.primitive_mode(), &[command])
    }

    pub fn geometry_bounds<V: GeometryVertex>(&self, store: &mut GeometryStore<V>, slot: GeometrySlot) -> Result<AABB> {
        store.bounds(self.info(slot)?.storage)
    }

    /// Storage slot backing the geometry. Changes when an update reallocates.
    pub fn storage_location(&self, slot: GeometrySlot) -> Result<StorageSlot> {
        Ok(self.info(slot)?.storage)
    }

    fn info(&self, slot: GeometrySlot) -> Result<GeometryInfo> {
        self.geometries
            .get(slot as usize)
            .copied()
            .flatten()
            .ok_or_else(|| engine_err!(SOURCE, InvalidHandle, "Geometry slot {} is not in use", slot))
    }

    fn info_mut(&mut self, slot: GeometrySlot) -> Result<&mut GeometryInfo> {
        self.geometries
            .get_mut(slot as usize)
            .and_then(Option::as_mut)
            .ok_or_else(|| engine_err!(SOURCE, InvalidHandle, "Geometry slot {} is not in use", slot))
    }
}

#[cfg(test)]
#[path = "geometry_renderer_tests.rs"]
mod tests;
