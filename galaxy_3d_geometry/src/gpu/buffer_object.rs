/// BufferObject trait and its provider

use crate::error::Result;

/// Buffer object type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BufferObjectType {
    /// Vertex buffer (GL_ARRAY_BUFFER)
    Vertex,
    /// Index buffer (GL_ELEMENT_ARRAY_BUFFER)
    Index,
}

/// GPU-side buffer owned by exactly one CPU-side ContinuousBuffer generation.
///
/// Implemented by backend-specific types. The OpenGL realization issues
/// `glBufferData` on `resize`, `glBufferSubData` on `set_data` and
/// `glGetBufferSubData` on `get_data`.
pub trait BufferObject: Send {
    /// Bind this buffer to its target
    fn bind(&mut self);

    /// Unbind this buffer from its target
    fn unbind(&mut self);

    /// Upload bytes at the given byte offset
    ///
    /// # Arguments
    ///
    /// * `offset` - Offset into the buffer in bytes
    /// * `data` - Data to write
    fn set_data(&mut self, offset: usize, data: &[u8]) -> Result<()>;

    /// Read back `size` bytes starting at the given byte offset
    fn get_data(&self, offset: usize, size: usize) -> Result<Vec<u8>>;

    /// Reallocate the buffer to `size` bytes, discarding its contents
    fn resize(&mut self, size: usize) -> Result<()>;

    /// Current size in bytes
    fn size(&self) -> usize;
}

/// Factory for buffer objects
pub trait BufferObjectProvider {
    /// Create an empty buffer object of the given type
    fn create_buffer_object(&self, buffer_type: BufferObjectType) -> Result<Box<dyn BufferObject>>;
}
