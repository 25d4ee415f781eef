use super::*;
use crate::gpu::mock::MockBufferObject;
use crate::gpu::BufferObjectType;
use crate::storage::slot::SlotKind;
use crate::error::Error;
use proptest::prelude::*;

fn filled(len: usize, start: u32) -> Vec<u32> {
    (start..start + len as u32).collect()
}

fn occupied_ranges(buffer: &ContinuousBuffer<u32>) -> Vec<(usize, usize)> {
    buffer.slots.iter()
        .filter(|slot| slot.state == SlotState::Occupied)
        .map(|slot| (slot.offset, slot.end()))
        .collect()
}

// ============================================================================
// Construction
// ============================================================================

#[test]
fn test_zero_size_rounds_up_to_minimum() {
    let buffer = ContinuousBuffer::<u32>::new(0);
    assert_eq!(buffer.size(), MINIMUM_SIZE);
    assert_eq!(buffer.free_slot_count(), 1);
    assert_eq!(buffer.occupied_slot_count(), 0);
}

#[test]
fn test_default_size() {
    let buffer = ContinuousBuffer::<u32>::default();
    assert_eq!(buffer.size(), DEFAULT_INITIAL_SIZE);
}

// ============================================================================
// Allocation & data
// ============================================================================

#[test]
fn test_allocate_set_data_round_trip() {
    let mut buffer = ContinuousBuffer::<u32>::new(64);
    let handle = buffer.allocate(10).unwrap();
    let values = filled(10, 100);

    buffer.set_data(handle, &values).unwrap();

    let offset = buffer.offset(handle).unwrap();
    assert_eq!(&buffer.data()[offset..offset + 10], values.as_slice());
    assert_eq!(buffer.slot_data(handle).unwrap(), values.as_slice());
    assert_eq!(buffer.num_used_elements(handle).unwrap(), 10);
    assert_eq!(buffer.capacity(handle).unwrap(), 10);
}

#[test]
fn test_first_fit_places_slots_back_to_back() {
    let mut buffer = ContinuousBuffer::<u32>::new(64);
    let a = buffer.allocate(10).unwrap();
    let b = buffer.allocate(5).unwrap();
    assert_eq!(buffer.offset(a).unwrap(), 0);
    assert_eq!(buffer.offset(b).unwrap(), 10);
}

#[test]
fn test_zero_sized_allocation_is_rejected() {
    let mut buffer = ContinuousBuffer::<u32>::new(16);
    assert!(matches!(buffer.allocate(0), Err(Error::InvalidOperation(_))));
}

#[test]
fn test_growth_keeps_existing_data() {
    let mut buffer = ContinuousBuffer::<u32>::new(18);

    let first = buffer.allocate(16).unwrap();
    buffer.set_data(first, &filled(16, 0)).unwrap();

    // Only 2 elements left: growth doubles the buffer
    let second = buffer.allocate(8).unwrap();
    buffer.set_data(second, &filled(8, 1000)).unwrap();

    assert_eq!(buffer.size(), 36);
    assert_eq!(buffer.offset(first).unwrap(), 0);
    assert_eq!(buffer.offset(second).unwrap(), 16);
    assert_eq!(&buffer.data()[0..16], filled(16, 0).as_slice());
    assert_eq!(&buffer.data()[16..24], filled(8, 1000).as_slice());
}

#[test]
fn test_growth_covers_large_requests() {
    let mut buffer = ContinuousBuffer::<u32>::new(16);
    let handle = buffer.allocate(100).unwrap();

    // Grows by the full request, not only by the missing part
    assert_eq!(buffer.offset(handle).unwrap(), 0);
    assert_eq!(buffer.size(), 116);
    assert_eq!(buffer.free_slot_count(), 1);

    let tail = buffer.allocate(16).unwrap();
    assert_eq!(buffer.offset(tail).unwrap(), 100);
    assert_eq!(buffer.size(), 116);
}

#[test]
fn test_growth_without_trailing_free_region() {
    let mut buffer = ContinuousBuffer::<u32>::new(16);
    let first = buffer.allocate(16).unwrap();
    let second = buffer.allocate(4).unwrap();

    assert_eq!(buffer.size(), 32);
    assert_eq!(buffer.offset(first).unwrap(), 0);
    assert_eq!(buffer.offset(second).unwrap(), 16);
}

// ============================================================================
// Deallocation & coalescing
// ============================================================================

#[test]
fn test_adjacent_frees_merge() {
    let mut buffer = ContinuousBuffer::<u32>::new(32);
    let a = buffer.allocate(8).unwrap();
    let b = buffer.allocate(8).unwrap();
    let _c = buffer.allocate(16).unwrap();
    assert_eq!(buffer.free_slot_count(), 0);

    buffer.deallocate(a).unwrap();
    buffer.deallocate(b).unwrap();
    assert_eq!(buffer.free_slot_count(), 1);

    let merged = buffer.allocate(16).unwrap();
    assert_eq!(buffer.offset(merged).unwrap(), 0);
    assert_eq!(buffer.size(), 32, "merged region must be reused without growth");
}

#[test]
fn test_free_between_two_free_regions_merges_all_three() {
    let mut buffer = ContinuousBuffer::<u32>::new(24);
    let a = buffer.allocate(8).unwrap();
    let b = buffer.allocate(8).unwrap();
    let c = buffer.allocate(8).unwrap();

    buffer.deallocate(a).unwrap();
    buffer.deallocate(c).unwrap();
    assert_eq!(buffer.free_slot_count(), 2);

    buffer.deallocate(b).unwrap();
    assert_eq!(buffer.free_slot_count(), 1);
    assert_eq!(buffer.occupied_slot_count(), 0);

    let whole = buffer.allocate(24).unwrap();
    assert_eq!(buffer.offset(whole).unwrap(), 0);
    assert_eq!(buffer.size(), 24);
}

#[test]
fn test_metadata_entries_are_recycled() {
    let mut buffer = ContinuousBuffer::<u32>::new(256);

    for _ in 0..20 {
        let handles: Vec<_> = (0..8).map(|_| buffer.allocate(4).unwrap()).collect();
        for handle in handles {
            buffer.deallocate(handle).unwrap();
        }
    }

    assert_eq!(buffer.free_slot_count(), 1);
    assert!(buffer.slots.len() <= 10, "metadata grew to {} entries", buffer.slots.len());
}

#[test]
fn test_deallocated_handle_is_invalid() {
    let mut buffer = ContinuousBuffer::<u32>::new(32);
    let handle = buffer.allocate(4).unwrap();
    buffer.deallocate(handle).unwrap();

    assert!(!buffer.is_allocated(handle));
    assert!(matches!(buffer.deallocate(handle), Err(Error::InvalidHandle(_))));
    assert!(matches!(buffer.set_data(handle, &[1]), Err(Error::InvalidHandle(_))));
    assert!(matches!(buffer.offset(99), Err(Error::InvalidHandle(_))));
}

// ============================================================================
// Capacity checks
// ============================================================================

#[test]
fn test_set_data_beyond_capacity_fails_untouched() {
    let mut buffer = ContinuousBuffer::<u32>::new(32);
    let handle = buffer.allocate(4).unwrap();
    buffer.set_data(handle, &[1, 2]).unwrap();

    let result = buffer.set_data(handle, &filled(5, 0));
    assert!(matches!(result, Err(Error::CapacityViolation(_))));
    assert_eq!(buffer.slot_data(handle).unwrap(), &[1, 2]);
}

#[test]
fn test_set_sub_data_extends_used_but_never_shrinks() {
    let mut buffer = ContinuousBuffer::<u32>::new(32);
    let handle = buffer.allocate(10).unwrap();

    buffer.set_data(handle, &filled(6, 0)).unwrap();
    assert_eq!(buffer.num_used_elements(handle).unwrap(), 6);

    // Inside the used range: unchanged
    buffer.set_sub_data(handle, 1, &[50, 51]).unwrap();
    assert_eq!(buffer.num_used_elements(handle).unwrap(), 6);
    assert_eq!(buffer.slot_data(handle).unwrap(), &[0, 50, 51, 3, 4, 5]);

    // Past the used range: extended
    buffer.set_sub_data(handle, 7, &[70, 71]).unwrap();
    assert_eq!(buffer.num_used_elements(handle).unwrap(), 9);

    // Past capacity: rejected
    let result = buffer.set_sub_data(handle, 9, &[1, 2]);
    assert!(matches!(result, Err(Error::CapacityViolation(_))));
    assert_eq!(buffer.num_used_elements(handle).unwrap(), 9);
}

#[test]
fn test_resize_data_within_capacity_only() {
    let mut buffer = ContinuousBuffer::<u32>::new(32);
    let handle = buffer.allocate(8).unwrap();
    buffer.set_data(handle, &filled(8, 0)).unwrap();

    buffer.resize_data(handle, 3).unwrap();
    assert_eq!(buffer.num_used_elements(handle).unwrap(), 3);

    buffer.resize_data(handle, 8).unwrap();
    assert_eq!(buffer.num_used_elements(handle).unwrap(), 8);

    assert!(matches!(buffer.resize_data(handle, 9), Err(Error::CapacityViolation(_))));
    assert_eq!(buffer.num_used_elements(handle).unwrap(), 8);
}

// ============================================================================
// GPU sync
// ============================================================================

#[test]
fn test_sync_uploads_everything_then_only_modified_range() {
    let mut buffer = ContinuousBuffer::<u32>::new(16);
    let mut object = MockBufferObject::new(BufferObjectType::Index);
    let state = object.state();

    let a = buffer.allocate(4).unwrap();
    let b = buffer.allocate(4).unwrap();
    buffer.set_data(a, &[1, 2, 3, 4]).unwrap();

    buffer.sync_modifications_to_buffer_object(&mut object).unwrap();
    {
        let state = state.lock().unwrap();
        assert_eq!(state.data.len(), 16 * 4);
        assert_eq!(state.uploads, vec![(0, 64)]);
    }

    buffer.set_data(b, &[9, 9]).unwrap();
    buffer.sync_modifications_to_buffer_object(&mut object).unwrap();
    {
        let state = state.lock().unwrap();
        assert_eq!(state.uploads.last(), Some(&(16, 8)));
        let uploaded: &[u32] = bytemuck::cast_slice(&state.data);
        assert_eq!(&uploaded[0..6], &[1, 2, 3, 4, 9, 9]);
    }

    // Nothing modified: nothing uploaded
    buffer.sync_modifications_to_buffer_object(&mut object).unwrap();
    assert_eq!(state.lock().unwrap().uploads.len(), 2);
}

#[test]
fn test_sync_after_growth_reuploads_everything() {
    let mut buffer = ContinuousBuffer::<u32>::new(16);
    let mut object = MockBufferObject::new(BufferObjectType::Vertex);
    let state = object.state();

    buffer.sync_modifications_to_buffer_object(&mut object).unwrap();
    let handle = buffer.allocate(20).unwrap();
    buffer.set_data(handle, &filled(20, 5)).unwrap();
    buffer.sync_modifications_to_buffer_object(&mut object).unwrap();

    let state = state.lock().unwrap();
    assert_eq!(state.resize_count, 2);
    assert_eq!(state.data.len(), buffer.size() * 4);
    assert_eq!(state.uploads.last(), Some(&(0, buffer.size() * 4)));
}

// ============================================================================
// Generation propagation
// ============================================================================

#[test]
fn test_apply_transactions_copies_touched_slots() {
    let mut newer = ContinuousBuffer::<u32>::new(16);
    let mut older = newer.clone();

    let kept = newer.allocate(4).unwrap();
    let untouched = newer.allocate(4).unwrap();
    newer.set_data(kept, &[1, 2, 3, 4]).unwrap();
    newer.set_data(untouched, &[5, 6, 7, 8]).unwrap();
    let grown = newer.allocate(20).unwrap();
    newer.set_data(grown, &filled(20, 100)).unwrap();

    let slot_of = |handle| StorageSlot::new(SlotKind::Regular, handle, handle);
    let transactions = [
        BufferTransaction::new(slot_of(kept), TransactionKind::Update),
        BufferTransaction::new(slot_of(grown), TransactionKind::Allocate),
    ];

    older.apply_transactions(&transactions, &newer, |slot| Some(slot.index_handle())).unwrap();

    assert_eq!(older.size(), newer.size());
    assert_eq!(older.slot_data(kept).unwrap(), &[1, 2, 3, 4]);
    assert_eq!(older.slot_data(grown).unwrap(), filled(20, 100).as_slice());
    // Metadata is current, data of untouched slots is not replayed
    assert_eq!(older.num_used_elements(untouched).unwrap(), 4);
    assert_eq!(older.slot_data(untouched).unwrap(), &[0, 0, 0, 0]);
}

#[test]
fn test_apply_transactions_skips_freed_and_unmapped_slots() {
    let mut newer = ContinuousBuffer::<u32>::new(16);
    let mut older = newer.clone();

    let freed = newer.allocate(4).unwrap();
    let unmapped = newer.allocate(4).unwrap();
    newer.set_data(freed, &[1, 2, 3, 4]).unwrap();
    newer.set_data(unmapped, &[7, 7]).unwrap();
    newer.deallocate(freed).unwrap();

    let transactions = [
        BufferTransaction::new(StorageSlot::new(SlotKind::Regular, 0, freed), TransactionKind::Allocate),
        BufferTransaction::new(StorageSlot::new(SlotKind::Regular, 0, freed), TransactionKind::Deallocate),
        BufferTransaction::new(StorageSlot::new(SlotKind::IndexRemap, 0, unmapped), TransactionKind::Update),
    ];

    older.apply_transactions(&transactions, &newer, |slot| match slot.kind() {
        SlotKind::Regular => Some(slot.index_handle()),
        SlotKind::IndexRemap => None,
    }).unwrap();

    assert_eq!(older.occupied_slot_count(), 1);
    assert!(!older.is_allocated(freed));
    assert_eq!(older.slot_data(unmapped).unwrap(), &[0, 0]);
}

// ============================================================================
// Properties
// ============================================================================

#[derive(Debug, Clone)]
enum Op {
    Allocate(usize),
    Deallocate(usize),
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        (1usize..40).prop_map(Op::Allocate),
        (0usize..64).prop_map(Op::Deallocate),
    ]
}

proptest! {
    #[test]
    fn prop_occupied_slots_never_overlap(ops in prop::collection::vec(op_strategy(), 1..120)) {
        let mut buffer = ContinuousBuffer::<u32>::new(32);
        let mut live: Vec<(BufferHandle, u32)> = Vec::new();
        let mut tag = 0u32;

        for op in ops {
            match op {
                Op::Allocate(size) => {
                    let handle = buffer.allocate(size).unwrap();
                    tag += 1;
                    buffer.set_data(handle, &vec![tag; size]).unwrap();
                    live.push((handle, tag));
                }
                Op::Deallocate(pick) => {
                    if !live.is_empty() {
                        let (handle, _) = live.remove(pick % live.len());
                        buffer.deallocate(handle).unwrap();
                    }
                }
            }

            let mut ranges = occupied_ranges(&buffer);
            ranges.sort();
            for pair in ranges.windows(2) {
                prop_assert!(pair[0].1 <= pair[1].0, "overlap: {:?}", pair);
            }

            // No two free regions are ever adjacent
            let mut free: Vec<_> = buffer.slots.iter()
                .filter(|slot| slot.state == SlotState::Free && slot.size > 0)
                .map(|slot| (slot.offset, slot.end()))
                .collect();
            free.sort();
            for pair in free.windows(2) {
                prop_assert!(pair[0].1 != pair[1].0, "unmerged free regions: {:?}", pair);
            }
        }

        // Every live slot still holds its own data
        for (handle, tag) in live {
            prop_assert!(buffer.slot_data(handle).unwrap().iter().all(|&value| value == tag));
        }
    }
}
