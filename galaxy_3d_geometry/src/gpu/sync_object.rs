/// SyncObject trait (GPU fence) and its provider

use crate::error::Result;

/// GPU completion fence.
///
/// The OpenGL realization wraps `glFenceSync` / `glClientWaitSync`.
pub trait SyncObject: Send {
    /// Block until the GPU has passed this fence
    fn wait(&self) -> Result<()>;
}

/// Factory for fences
pub trait SyncObjectProvider {
    /// Insert a new fence into the GPU command stream
    fn create_sync_object(&self) -> Result<Box<dyn SyncObject>>;
}
