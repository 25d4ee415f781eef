/// In-memory GPU backend (no GPU required)
///
/// Buffer objects keep their bytes in a Vec, fences count their waits and
/// the draw-call issuer records every batch. Tests keep a handle on the
/// shared state to inspect what the geometry layer uploaded.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use crate::engine_bail;
use crate::error::Result;
use crate::gpu::{
    BufferObject, BufferObjectProvider, BufferObjectType,
    SyncObject, SyncObjectProvider,
    DrawCallIssuer, DrawCommand, PrimitiveMode,
};

// ============================================================================
// Mock BufferObject
// ============================================================================

/// Observable state of a mock buffer object
#[derive(Debug, Default)]
pub struct MockBufferState {
    pub data: Vec<u8>,
    pub bound: bool,
    /// (byte offset, byte length) of every set_data call
    pub uploads: Vec<(usize, usize)>,
    pub resize_count: usize,
}

#[derive(Debug)]
pub struct MockBufferObject {
    pub buffer_type: BufferObjectType,
    state: Arc<Mutex<MockBufferState>>,
}

impl MockBufferObject {
    pub fn new(buffer_type: BufferObjectType) -> Self {
        Self {
            buffer_type,
            state: Arc::new(Mutex::new(MockBufferState::default())),
        }
    }

    /// Shared handle on the buffer's state
    pub fn state(&self) -> Arc<Mutex<MockBufferState>> {
        self.state.clone()
    }
}

impl BufferObject for MockBufferObject {
    fn bind(&mut self) {
        self.state.lock().unwrap_or_else(PoisonError::into_inner).bound = true;
    }

    fn unbind(&mut self) {
        self.state.lock().unwrap_or_else(PoisonError::into_inner).bound = false;
    }

    fn set_data(&mut self, offset: usize, data: &[u8]) -> Result<()> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if offset + data.len() > state.data.len() {
            engine_bail!("galaxy3d::mock", BackendError,
                "Upload of {} bytes at offset {} exceeds buffer size {}",
                data.len(), offset, state.data.len());
        }
        state.data[offset..offset + data.len()].copy_from_slice(data);
        state.uploads.push((offset, data.len()));
        Ok(())
    }

    fn get_data(&self, offset: usize, size: usize) -> Result<Vec<u8>> {
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if offset + size > state.data.len() {
            engine_bail!("galaxy3d::mock", BackendError,
                "Readback of {} bytes at offset {} exceeds buffer size {}",
                size, offset, state.data.len());
        }
        Ok(state.data[offset..offset + size].to_vec())
    }

    fn resize(&mut self, size: usize) -> Result<()> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.data = vec![0; size];
        state.resize_count += 1;
        Ok(())
    }

    fn size(&self) -> usize {
        self.state.lock().unwrap_or_else(PoisonError::into_inner).data.len()
    }
}

/// Buffer object factory remembering every buffer it created
#[derive(Debug, Default)]
pub struct MockBufferObjectProvider {
    created: Mutex<Vec<(BufferObjectType, Arc<Mutex<MockBufferState>>)>>,
}

impl MockBufferObjectProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of buffer objects created so far
    pub fn created_count(&self) -> usize {
        self.created.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// State of the n-th created buffer object
    pub fn buffer_state(&self, index: usize) -> Option<Arc<Mutex<MockBufferState>>> {
        self.created.lock().unwrap_or_else(PoisonError::into_inner).get(index).map(|(_, state)| state.clone())
    }

    /// Type of the n-th created buffer object
    pub fn buffer_type(&self, index: usize) -> Option<BufferObjectType> {
        self.created.lock().unwrap_or_else(PoisonError::into_inner).get(index).map(|(buffer_type, _)| *buffer_type)
    }
}

impl BufferObjectProvider for MockBufferObjectProvider {
    fn create_buffer_object(&self, buffer_type: BufferObjectType) -> Result<Box<dyn BufferObject>> {
        let buffer = MockBufferObject::new(buffer_type);
        self.created.lock().unwrap_or_else(PoisonError::into_inner).push((buffer_type, buffer.state()));
        Ok(Box::new(buffer))
    }
}

// ============================================================================
// Mock SyncObject
// ============================================================================

#[derive(Debug)]
pub struct MockSyncObject {
    waits: Arc<AtomicUsize>,
}

impl SyncObject for MockSyncObject {
    fn wait(&self) -> Result<()> {
        self.waits.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Fence factory counting created fences and waits
#[derive(Debug, Default)]
pub struct MockSyncObjectProvider {
    created: AtomicUsize,
    waits: Arc<AtomicUsize>,
}

impl MockSyncObjectProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn created_count(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }

    pub fn wait_count(&self) -> usize {
        self.waits.load(Ordering::SeqCst)
    }
}

impl SyncObjectProvider for MockSyncObjectProvider {
    fn create_sync_object(&self) -> Result<Box<dyn SyncObject>> {
        self.created.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MockSyncObject { waits: self.waits.clone() }))
    }
}

// ============================================================================
// Recording DrawCallIssuer
// ============================================================================

/// Records every submitted batch
#[derive(Debug, Default)]
pub struct RecordingDrawCallIssuer {
    pub batches: Vec<(PrimitiveMode, Vec<DrawCommand>)>,
}

impl RecordingDrawCallIssuer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of draw commands over all batches
    pub fn command_count(&self) -> usize {
        self.batches.iter().map(|(_, batch)| batch.len()).sum()
    }

    pub fn clear(&mut self) {
        self.batches.clear();
    }
}

impl DrawCallIssuer for RecordingDrawCallIssuer {
    fn draw_elements(&mut self, mode: PrimitiveMode, batch: &[DrawCommand]) -> Result<()> {
        self.batches.push((mode, batch.to_vec()));
        Ok(())
    }
}

#[cfg(test)]
#[path = "mock_tests.rs"]
mod tests;
