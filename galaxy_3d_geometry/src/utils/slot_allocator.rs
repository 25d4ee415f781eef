/// Allocates and recycles unique `u32` identifiers.
///
/// Used for ContinuousBuffer slot metadata entries and for the handles
/// handed out by the renderer façades. Freed identifiers are recycled
/// (LIFO) before fresh ones are minted, so the backing vectors only grow
/// to the high water mark.
///
/// # Example
///
/// ```ignore
/// let mut ids = SlotAllocator::new();
/// let a = ids.alloc().unwrap();  // 0
/// let b = ids.alloc().unwrap();  // 1
/// ids.free(a);                    // 0 is now available
/// let c = ids.alloc().unwrap();  // 0 (recycled)
/// ```
#[derive(Debug, Clone)]
pub struct SlotAllocator {
    free_list: Vec<u32>,
    next_id: u32,
    len: u32,
    id_limit: u32,
}

impl SlotAllocator {
    /// Allocator over `0..u32::MAX`
    pub fn new() -> Self {
        Self::with_limit(u32::MAX)
    }

    /// Allocator handing out identifiers in `0..id_limit`
    pub fn with_limit(id_limit: u32) -> Self {
        Self {
            free_list: Vec::new(),
            next_id: 0,
            len: 0,
            id_limit,
        }
    }

    /// Allocate the next available identifier, `None` once the range is exhausted
    pub fn alloc(&mut self) -> Option<u32> {
        let id = match self.free_list.pop() {
            Some(id) => id,
            None => {
                if self.next_id >= self.id_limit {
                    return None;
                }
                let id = self.next_id;
                self.next_id += 1;
                id
            }
        };
        self.len += 1;
        Some(id)
    }

    /// Return an identifier to the pool.
    ///
    /// Returns false when `id` was never handed out.
    pub fn free(&mut self, id: u32) -> bool {
        if id >= self.next_id || self.len == 0 {
            return false;
        }
        self.len -= 1;
        self.free_list.push(id);
        true
    }

    /// Number of live identifiers
    pub fn len(&self) -> u32 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl Default for SlotAllocator {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
#[path = "slot_allocator_tests.rs"]
mod tests;
