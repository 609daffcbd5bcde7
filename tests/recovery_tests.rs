//! Tests for recovery at open
//!
//! These tests verify:
//! - Orphan needles past the last indexed record are indexed
//! - Tombstones are never resurrected
//! - A torn trailing write is ignored (or truncated on request)
//! - Unreadable and stale snapshots are repaired
//! - Id allocation resumes past every id in the store

mod common;

use std::sync::Arc;

use bytes::Bytes;
use common::{FaultyIndex, FaultyStore, MemoryFixture};
use needlestore::index::{Index, IndexFile, MemoryIndex};
use needlestore::record::{Needle, RecordState, HEADER_SIZE};
use needlestore::store::BackendStore;
use needlestore::{IndexLoadState, NeedleError, NeedleId, Volume, VolumeConfig};
use tempfile::TempDir;

fn id(raw: u64) -> NeedleId {
    NeedleId::new(raw)
}

fn encoded(raw_id: u64, payload: &[u8], state: RecordState) -> Bytes {
    Needle::new(id(raw_id), Bytes::copy_from_slice(payload))
        .with_state(state)
        .encode()
        .unwrap()
}

fn assert_not_found<T: std::fmt::Debug>(result: needlestore::Result<T>) {
    match result {
        Err(NeedleError::NotFound(_)) => {}
        other => panic!("expected NotFound, got {:?}", other),
    }
}

fn saved_entries(fixture: &MemoryFixture) -> usize {
    let index = MemoryIndex::new();
    IndexFile::new(fixture.index_path()).load(&index).unwrap();
    index.len()
}

// =============================================================================
// Scan Tests
// =============================================================================

#[test]
fn test_orphan_is_indexed_on_open() {
    let fixture = MemoryFixture::new();
    let volume = fixture.open();
    volume.put(b"indexed").unwrap();
    drop(volume);

    // Appended behind the index's back, as if we crashed before saving it
    fixture
        .store
        .append(&encoded(7, b"orphan", RecordState::Live))
        .unwrap();

    let volume = fixture.open();
    let report = volume.recovery_report();

    assert_eq!(report.index_state, IndexLoadState::Loaded);
    assert_eq!(report.needles_indexed, 1);
    assert_eq!(volume.get(id(7)).unwrap().as_ref(), b"orphan");
    assert_eq!(volume.get(id(1)).unwrap().as_ref(), b"indexed");
    assert_eq!(volume.next_id(), id(8));

    // The repaired index was saved
    assert_eq!(saved_entries(&fixture), 2);
}

#[test]
fn test_tombstone_is_not_resurrected() {
    let fixture = MemoryFixture::new();
    fixture
        .store
        .append(&encoded(1, b"live", RecordState::Live))
        .unwrap();
    fixture
        .store
        .append(&encoded(5, b"dead", RecordState::Tombstoned))
        .unwrap();

    let volume = fixture.open();
    let report = volume.recovery_report();

    assert_eq!(report.index_state, IndexLoadState::Missing);
    assert_eq!(report.needles_indexed, 1);
    assert_eq!(report.tombstones_skipped, 1);
    assert_eq!(report.scanned_bytes, fixture.store.size());
    assert_not_found(volume.get(id(5)));
    assert!(!volume.contains(id(5)).unwrap());
    assert_eq!(volume.next_id(), id(6));
}

#[test]
fn test_reopen_without_changes_does_not_scan() {
    let fixture = MemoryFixture::new();
    let volume = fixture.open();
    volume.put(b"a").unwrap();
    volume.put(b"b").unwrap();
    drop(volume);

    let volume = fixture.open();
    let report = volume.recovery_report();

    assert_eq!(report.index_state, IndexLoadState::Loaded);
    assert_eq!(report.checkpoint, fixture.store.size());
    assert_eq!(report.scanned_bytes, 0);
    assert!(!report.index_changed());
    assert_eq!(volume.len(), 2);
}

// =============================================================================
// Torn Tail Tests
// =============================================================================

fn setup_torn_tail(fixture: &MemoryFixture) -> (u64, usize) {
    let volume = fixture.open();
    let payloads: [&[u8]; 3] = [b"one", b"two", b"three"];
    for payload in payloads {
        volume.put(payload).unwrap();
    }
    drop(volume);
    fixture.remove_index();

    let intact = fixture.store.size();
    let torn = encoded(4, &[9u8; 100], RecordState::Live);
    let partial = &torn[..HEADER_SIZE + 10];
    fixture.store.append_raw(partial);
    (intact, partial.len())
}

#[test]
fn test_torn_tail_is_ignored() {
    let fixture = MemoryFixture::new();
    let (intact, torn_len) = setup_torn_tail(&fixture);

    let volume = fixture.open();
    let report = volume.recovery_report();

    assert_eq!(report.needles_indexed, 3);
    assert_eq!(report.scanned_bytes, intact);
    assert_eq!(report.torn_tail_bytes, torn_len as u64);
    assert!(!report.tail_truncated);
    assert_eq!(volume.store_size(), intact + torn_len as u64);

    assert_eq!(volume.get(id(1)).unwrap().as_ref(), b"one");
    assert_eq!(volume.get(id(3)).unwrap().as_ref(), b"three");
    assert_not_found(volume.get(id(4)));
    drop(volume);

    // The tail is still there, but the saved index already covers the rest
    let volume = fixture.open();
    let report = volume.recovery_report();
    assert_eq!(report.index_state, IndexLoadState::Loaded);
    assert_eq!(report.torn_tail_bytes, torn_len as u64);
    assert_eq!(report.scanned_bytes, 0);
    assert!(!report.index_changed());
}

#[test]
fn test_torn_tail_is_truncated_when_enabled() {
    let fixture = MemoryFixture::new();
    let (intact, torn_len) = setup_torn_tail(&fixture);

    let mut config = fixture.config();
    config.truncate_torn_tail = true;
    let volume = fixture.open_with(config);
    let report = volume.recovery_report().clone();

    assert_eq!(report.torn_tail_bytes, torn_len as u64);
    assert!(report.tail_truncated);
    assert_eq!(volume.store_size(), intact);

    // The next append lands where the torn record started
    let four = volume.put(b"four").unwrap();
    assert_eq!(volume.index().get(four).unwrap().unwrap().offset, intact);
    drop(volume);

    fixture.remove_index();
    let volume = fixture.open();
    assert_eq!(volume.recovery_report().torn_tail_bytes, 0);
    assert_eq!(volume.len(), 4);
    assert_eq!(volume.get(four).unwrap().as_ref(), b"four");
}

#[test]
fn test_garbage_tail_is_ignored() {
    let fixture = MemoryFixture::new();
    let volume = fixture.open();
    volume.put(b"good").unwrap();
    drop(volume);
    fixture.remove_index();

    fixture.store.append_raw(&[0xffu8; 40]);

    let volume = fixture.open();
    assert_eq!(volume.recovery_report().torn_tail_bytes, 40);
    assert_eq!(volume.get(id(1)).unwrap().as_ref(), b"good");
}

// =============================================================================
// Snapshot Repair Tests
// =============================================================================

#[test]
fn test_corrupt_index_is_discarded_and_rewritten() {
    let fixture = MemoryFixture::new();
    let volume = fixture.open();
    volume.put(b"a").unwrap();
    volume.put(b"b").unwrap();
    drop(volume);

    std::fs::write(fixture.index_path(), b"definitely not an index").unwrap();

    let volume = fixture.open();
    let report = volume.recovery_report();

    assert_eq!(report.index_state, IndexLoadState::Discarded);
    assert_eq!(report.checkpoint, 0);
    assert_eq!(report.needles_indexed, 2);
    assert_eq!(volume.get(id(2)).unwrap().as_ref(), b"b");
    assert_eq!(saved_entries(&fixture), 2);
}

#[test]
fn test_entries_past_end_of_store_are_dropped() {
    let fixture = MemoryFixture::new();
    let volume = fixture.open();
    volume.put(b"a").unwrap();
    let second = volume.put(b"b").unwrap();
    volume.put(b"c").unwrap();
    let keep_until = volume.index().get(second).unwrap().unwrap().end();
    drop(volume);

    // The snapshot outlived the tail of the data
    fixture.store.truncate(keep_until).unwrap();

    let volume = fixture.open();
    let report = volume.recovery_report();

    assert_eq!(report.index_state, IndexLoadState::Loaded);
    assert_eq!(report.entries_dropped, 1);
    assert_eq!(report.checkpoint, keep_until);
    assert_eq!(volume.len(), 2);
    assert_not_found(volume.get(id(3)));
    assert_eq!(volume.get(second).unwrap().as_ref(), b"b");
}

#[test]
fn test_restored_stale_snapshot_is_reconciled() {
    let fixture = MemoryFixture::new();
    let volume = fixture.open();
    let first = volume.put(b"first").unwrap();
    volume.put(b"second").unwrap();
    let old_snapshot = std::fs::read(fixture.index_path()).unwrap();

    let third = volume.put(b"third").unwrap();
    volume.delete(first).unwrap();
    drop(volume);

    std::fs::write(fixture.index_path(), old_snapshot).unwrap();

    let volume = fixture.open();
    assert_eq!(volume.recovery_report().needles_indexed, 1);
    assert_eq!(volume.get(third).unwrap().as_ref(), b"third");

    // The old snapshot still lists the deleted needle
    assert!(volume.contains(first).unwrap());
    assert_not_found(volume.get(first));
    assert_not_found(volume.delete(first));
    assert!(!volume.contains(first).unwrap());
}

// =============================================================================
// Index Failure Tests
// =============================================================================

fn store_with_orphan() -> Arc<FaultyStore> {
    let store = Arc::new(FaultyStore::new());
    store
        .append(&encoded(3, b"orphan", RecordState::Live))
        .unwrap();
    store
}

fn open_over(
    temp_dir: &TempDir,
    store: &Arc<FaultyStore>,
    index: &Arc<FaultyIndex>,
) -> Volume<Arc<FaultyStore>, Arc<FaultyIndex>> {
    let config = VolumeConfig::builder().data_dir(temp_dir.path()).build();
    Volume::with_parts(Arc::clone(store), Arc::clone(index), config).unwrap()
}

#[test]
fn test_failed_index_save_does_not_block_open() {
    let temp_dir = TempDir::new().unwrap();
    let store = store_with_orphan();
    let index = Arc::new(FaultyIndex::new());
    index.set_fail_persist(true);

    let volume = open_over(&temp_dir, &store, &index);

    assert!(volume.recovery_report().index_save_failed);
    assert_eq!(volume.recovery_report().needles_indexed, 1);
    assert_eq!(volume.get(id(3)).unwrap().as_ref(), b"orphan");
    assert!(!volume.index_path().exists());

    // The next save writes out the recovered entry
    index.set_fail_persist(false);
    volume.flush().unwrap();
    let saved = MemoryIndex::new();
    IndexFile::new(volume.index_path()).load(&saved).unwrap();
    assert!(saved.get(id(3)).unwrap().is_some());
}

#[test]
fn test_failed_index_insert_does_not_block_open() {
    let temp_dir = TempDir::new().unwrap();
    let store = store_with_orphan();
    let index = Arc::new(FaultyIndex::new());
    index.set_fail_set(true);

    let volume = open_over(&temp_dir, &store, &index);
    let report = volume.recovery_report();

    assert_eq!(report.index_errors, 1);
    assert_eq!(report.needles_indexed, 0);
    assert_not_found(volume.get(id(3)));
    // The id was still seen, so it is never handed out again
    assert_eq!(volume.next_id(), id(4));
    drop(volume);

    let volume = open_over(&temp_dir, &store, &Arc::new(FaultyIndex::new()));
    assert_eq!(volume.get(id(3)).unwrap().as_ref(), b"orphan");
}

// =============================================================================
// Id Allocation Tests
// =============================================================================

#[test]
fn test_ids_stay_unique_after_deleting_last_needle() {
    let fixture = MemoryFixture::new();
    let volume = fixture.open();
    volume.put(b"1").unwrap();
    volume.put(b"2").unwrap();
    let last = volume.put(b"3").unwrap();
    volume.delete(last).unwrap();
    drop(volume);

    let volume = fixture.open();
    assert_eq!(volume.recovery_report().tombstones_skipped, 1);

    let fresh = volume.put(b"4").unwrap();
    assert!(fresh > last);
    assert_not_found(volume.get(last));
}

#[test]
fn test_all_deleted_then_index_lost() {
    let fixture = MemoryFixture::new();
    let volume = fixture.open();
    let a = volume.put(b"a").unwrap();
    let b = volume.put(b"b").unwrap();
    volume.delete(a).unwrap();
    volume.delete(b).unwrap();
    drop(volume);
    fixture.remove_index();

    let volume = fixture.open();

    assert!(volume.is_empty());
    assert_eq!(volume.recovery_report().tombstones_skipped, 2);
    assert_eq!(volume.next_id(), id(3));
}

// =============================================================================
// Layout Tests
// =============================================================================

#[test]
fn test_offsets_increase_with_ids() {
    let fixture = MemoryFixture::new();
    let volume = fixture.open();

    for i in 0..20u32 {
        let id = volume.put(&vec![b'x'; i as usize * 3]).unwrap();
        if i % 3 == 0 {
            volume.delete(id).unwrap();
        }
    }

    let mut previous: Option<(NeedleId, u64)> = None;
    volume.index().ascending_visit(&mut |entry| {
        if let Some((prev_id, prev_end)) = previous {
            assert!(entry.id > prev_id);
            assert!(entry.offset >= prev_end);
        }
        assert_eq!(entry.offset % 8, 0);
        previous = Some((entry.id, entry.end()));
        true
    });
    assert!(previous.is_some());
}

// =============================================================================
// File-backed Recovery Tests
// =============================================================================

#[test]
fn test_file_volume_rebuilds_deleted_index() {
    let temp_dir = TempDir::new().unwrap();
    let index_path = temp_dir.path().join("volume.idx");

    let ids: Vec<NeedleId> = {
        let volume = Volume::open_path(temp_dir.path()).unwrap();
        let ids = (0..10u8).map(|i| volume.put(&[i; 33]).unwrap()).collect();
        volume.close().unwrap();
        ids
    };

    std::fs::remove_file(&index_path).unwrap();

    let volume = Volume::open_path(temp_dir.path()).unwrap();
    assert_eq!(volume.recovery_report().index_state, IndexLoadState::Missing);
    assert_eq!(volume.len(), 10);
    for (i, id) in ids.iter().enumerate() {
        assert_eq!(volume.get(*id).unwrap().as_ref(), &[i as u8; 33][..]);
    }
    assert!(index_path.exists());
}
