/// Vertex types stored in the GeometryStore

use bytemuck::{Pod, Zeroable};
use glam::{Vec2, Vec3, Vec4};

/// Element type accepted by the GeometryStore vertex buffer.
///
/// The store only needs the position (for bounds), everything else is
/// opaque bytes uploaded as-is.
pub trait GeometryVertex: Pod {
    /// Object-space position of this vertex
    fn position(&self) -> Vec3;
}

/// Interleaved vertex layout used by the editor renderers
///
/// Layout (48 bytes): position (12) | texcoord (8) | normal (12) | colour (16)
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Pod, Zeroable)]
pub struct RenderVertex {
    pub position: [f32; 3],
    pub texcoord: [f32; 2],
    pub normal: [f32; 3],
    pub colour: [f32; 4],
}

impl RenderVertex {
    /// Vertex with white colour
    pub fn new(position: Vec3, texcoord: Vec2, normal: Vec3) -> Self {
        Self::with_colour(position, texcoord, normal, Vec4::ONE)
    }

    pub fn with_colour(position: Vec3, texcoord: Vec2, normal: Vec3, colour: Vec4) -> Self {
        Self {
            position: position.to_array(),
            texcoord: texcoord.to_array(),
            normal: normal.to_array(),
            colour: colour.to_array(),
        }
    }

    pub fn texcoord(&self) -> Vec2 {
        Vec2::from_array(self.texcoord)
    }

    pub fn normal(&self) -> Vec3 {
        Vec3::from_array(self.normal)
    }

    pub fn colour(&self) -> Vec4 {
        Vec4::from_array(self.colour)
    }
}

impl GeometryVertex for RenderVertex {
    fn position(&self) -> Vec3 {
        Vec3::from_array(self.position)
    }
}
