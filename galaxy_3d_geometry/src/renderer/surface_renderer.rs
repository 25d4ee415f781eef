/// Shared surfaces (meshes owned elsewhere) drawn with their own transform
///
/// Surfaces are registered once and pulled lazily: `update_surface` only
/// marks a surface dirty, `prepare_for_rendering` re-reads and uploads every
/// dirty surface in one pass.

use std::borrow::Cow;
use std::sync::Arc;

use glam::Mat4;

use crate::engine_bail;
use crate::engine_err;
use crate::engine_trace;
use crate::error::Result;
use crate::gpu::{DrawCallIssuer, DrawCommand, PrimitiveMode};
use crate::renderer::slot_draw_command;
use crate::storage::{AABB, GeometryStore, GeometryVertex, RenderVertex, StorageSlot};
use crate::utils::SlotAllocator;

const SOURCE: &str = "galaxy3d::SurfaceRenderer";

/// Handle returned by [`SurfaceRenderer::add_surface`]
pub type SurfaceSlot = u32;

/// Triangle mesh drawn by a [`SurfaceRenderer`]
pub trait RenderableSurface<V: Clone = RenderVertex> {
    fn vertices(&self) -> Cow<'_, [V]>;

    /// Triangle list indices, relative to [`vertices`](Self::vertices)
    fn indices(&self) -> Cow<'_, [u32]>;

    /// Object to world transform
    fn transform(&self) -> Mat4 {
        Mat4::IDENTITY
    }
}

struct SurfaceInfo<V: Clone> {
    surface: Arc<dyn RenderableSurface<V>>,
    /// None until the first upload, or while the surface has no indices
    storage: Option<StorageSlot>,
    vertex_capacity: usize,
    index_capacity: usize,
    data_changed: bool,
    visible: bool,
}

pub struct SurfaceRenderer<V: Clone = RenderVertex> {
    surfaces: Vec<Option<SurfaceInfo<V>>>,
    ids: SlotAllocator,
}

impl<V: GeometryVertex> Default for SurfaceRenderer<V> {
    fn default() -> Self {
        Self {
            surfaces: Vec::new(),
            ids: SlotAllocator::new(),
        }
    }
}

impl<V: GeometryVertex> SurfaceRenderer<V> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn surface_count(&self) -> usize {
        self.ids.len() as usize
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Register a surface. It is visible and gets uploaded by the next
    /// [`prepare_for_rendering`](Self::prepare_for_rendering).
    pub fn add_surface(&mut self, surface: Arc<dyn RenderableSurface<V>>) -> Result<SurfaceSlot> {
        let Some(slot) = self.ids.alloc() else {
            engine_bail!(SOURCE, ResourceExhaustion, "Out of surface slots");
        };

        let info = SurfaceInfo {
            surface,
            storage: None,
            vertex_capacity: 0,
            index_capacity: 0,
            data_changed: true,
            visible: true,
        };
        match self.surfaces.get_mut(slot as usize) {
            Some(entry) => *entry = Some(info),
            None => self.surfaces.push(Some(info)),
        }
        Ok(slot)
    }

    /// Flag the surface's data as changed
    pub fn update_surface(&mut self, slot: SurfaceSlot) -> Result<()> {
        self.info_mut(slot)?.data_changed = true;
        Ok(())
    }

    pub fn remove_surface(&mut self, store: &mut GeometryStore<V>, slot: SurfaceSlot) -> Result<()> {
        let storage = self.info(slot)?.storage;
        if let Some(storage) = storage {
            store.deallocate_slot(storage)?;
        }

        self.surfaces[slot as usize] = None;
        self.ids.free(slot);
        Ok(())
    }

    pub fn activate_surface(&mut self, slot: SurfaceSlot) -> Result<()> {
        self.info_mut(slot)?.visible = true;
        Ok(())
    }

    pub fn deactivate_surface(&mut self, slot: SurfaceSlot) -> Result<()> {
        self.info_mut(slot)?.visible = false;
        Ok(())
    }

    pub fn is_visible(&self, slot: SurfaceSlot) -> Result<bool> {
        Ok(self.info(slot)?.visible)
    }

    /// Storage slot holding the surface, None before the first upload
    pub fn storage_location(&self, slot: SurfaceSlot) -> Result<Option<StorageSlot>> {
        Ok(self.info(slot)?.storage)
    }

    /// Upload every dirty surface. Must run before any render call of the frame.
    pub fn prepare_for_rendering(&mut self, store: &mut GeometryStore<V>) -> Result<()> {
        for (slot, info) in self.surfaces.iter_mut().enumerate() {
            let Some(info) = info else { continue };
            if !info.data_changed {
                continue;
            }
            upload_surface(store, info)?;
            info.data_changed = false;
            engine_trace!(SOURCE, "Uploaded surface {} to {:?}", slot, info.storage);
        }
        Ok(())
    }

    /// Submit every visible surface as one triangle batch
    pub fn render_all_visible(&self, store: &GeometryStore<V>, issuer: &mut dyn DrawCallIssuer) -> Result<()> {
        let mut batch = Vec::new();
        for (slot, info) in self.surfaces.iter().enumerate() {
            let Some(info) = info else { continue };
            if !info.visible {
                continue;
            }
            if let Some(command) = self.draw_command(store, slot as SurfaceSlot, info)? {
                batch.push(command);
            }
        }

        if batch.is_empty() {
            return Ok(());
        }
        issuer.draw_elements(PrimitiveMode::Triangles, &batch)
    }

    /// Submit a single surface, visible or not
    pub fn render_surface(
        &self,
        store: &GeometryStore<V>,
        slot: SurfaceSlot,
        issuer: &mut dyn DrawCallIssuer,
    ) -> Result<()> {
        let info = self.info(slot)?;
        match self.draw_command(store, slot, info)? {
            Some(command) => issuer.draw_elements(PrimitiveMode::Triangles, &[command]),
            None => Ok(()),
        }
    }

    /// Object space bounds. Read from the store once uploaded, computed from
    /// the surface data otherwise.
    pub fn surface_bounds(&self, store: &mut GeometryStore<V>, slot: SurfaceSlot) -> Result<AABB> {
        let info = self.info(slot)?;
        if let (Some(storage), false) = (info.storage, info.data_changed) {
            return store.bounds(storage);
        }

        let vertices = info.surface.vertices();
        let mut bounds = AABB::EMPTY;
        for &index in info.surface.indices().iter() {
            let Some(vertex) = vertices.get(index as usize) else {
                engine_bail!(SOURCE, InvalidHandle,
                    "Surface {} index {} out of range ({} vertices)", slot, index, vertices.len());
            };
            bounds.include_point(vertex.position());
        }
        Ok(bounds)
    }

    /// Free the storage of every surface and forget them
    pub fn release(&mut self, store: &mut GeometryStore<V>) -> Result<()> {
        for info in self.surfaces.drain(..).flatten() {
            if let Some(storage) = info.storage {
                store.deallocate_slot(storage)?;
            }
        }
        self.ids = SlotAllocator::new();
        Ok(())
    }

    fn draw_command(
        &self,
        store: &GeometryStore<V>,
        slot: SurfaceSlot,
        info: &SurfaceInfo<V>,
    ) -> Result<Option<DrawCommand>> {
        if info.data_changed {
            engine_bail!(SOURCE, InvalidOperation,
                "Surface {} changed since the last prepare_for_rendering", slot);
        }
        let Some(storage) = info.storage else {
            return Ok(None);
        };
        let command = slot_draw_command(store, storage, Some(info.surface.transform()))?;
        Ok((command.index_count > 0).then_some(command))
    }

    fn info(&self, slot: SurfaceSlot) -> Result<&SurfaceInfo<V>> {
        self.surfaces
            .get(slot as usize)
            .and_then(Option::as_ref)
            .ok_or_else(|| engine_err!(SOURCE, InvalidHandle, "Surface slot {} is not in use", slot))
    }

    fn info_mut(&mut self, slot: SurfaceSlot) -> Result<&mut SurfaceInfo<V>> {
        self.surfaces
            .get_mut(slot as usize)
            .and_then(Option::as_mut)
            .ok_or_else(|| engine_err!(SOURCE, InvalidHandle, "Surface slot {} is not in use", slot))
    }
}

/// Write the surface's current data into its storage, reallocating when it
/// outgrew the slot and releasing the slot when there is nothing to draw
fn upload_surface<V: GeometryVertex>(store: &mut GeometryStore<V>, info: &mut SurfaceInfo<V>) -> Result<()> {
    let surface = Arc::clone(&info.surface);
    let vertices = surface.vertices();
    let indices = surface.indices();

    if vertices.is_empty() || indices.is_empty() {
        if let Some(storage) = info.storage.take() {
            store.deallocate_slot(storage)?;
        }
        info.vertex_capacity = 0;
        info.index_capacity = 0;
        return Ok(());
    }

    if let Some(storage) = info.storage {
        if vertices.len() <= info.vertex_capacity && indices.len() <= info.index_capacity {
            return store.update_data(storage, &vertices, &indices);
        }
    }

    let storage = store.allocate_slot(vertices.len(), indices.len())?;
    if let Err(error) = store.update_data(storage, &vertices, &indices) {
        store.deallocate_slot(storage)?;
        return Err(error);
    }
    if let Some(old) = info.storage.replace(storage) {
        store.deallocate_slot(old)?;
    }
    info.vertex_capacity = vertices.len();
    info.index_capacity = indices.len();
    Ok(())
}

#[cfg(test)]
#[path = "surface_renderer_tests.rs"]
mod tests;
