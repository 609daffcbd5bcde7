//! Volume Recovery
//!
//! Reconciles the index against the backend store at open.
//!
//! 1. Load the index snapshot (missing or unreadable → start empty)
//! 2. Drop entries that point past the end of the store
//! 3. Checkpoint = end of the entry with the greatest offset
//! 4. Parse headers from the checkpoint until the store ends or a header
//!    fails; index live needles, skip tombstones
//! 5. Optionally truncate the unparseable tail
//! 6. Persist the index once if anything changed
//!
//! Index failures never fail the open. They are logged, and the next save
//! repairs the snapshot.

use crate::error::Result;
use crate::id::IdAllocator;
use crate::index::{last_entry, Index, IndexFile};
use crate::record;
use crate::store::BackendStore;

/// What happened to the index snapshot at open
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum IndexLoadState {
    /// Snapshot read successfully
    Loaded,

    /// No snapshot on disk
    #[default]
    Missing,

    /// Snapshot existed but could not be read; started empty
    Discarded,
}

/// Result of a recovery pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecoveryReport {
    /// How the snapshot load went
    pub index_state: IndexLoadState,

    /// Entries removed because they reached past the end of the store
    pub entries_dropped: u64,

    /// Store offset the scan started from
    pub checkpoint: u64,

    /// Bytes of well-formed records parsed by the scan
    pub scanned_bytes: u64,

    /// Live needles added to the index by the scan
    pub needles_indexed: u64,

    /// Tombstoned needles the scan passed over
    pub tombstones_skipped: u64,

    /// Unparseable bytes found at the end of the store
    pub torn_tail_bytes: u64,

    /// Whether those bytes were cut off
    pub tail_truncated: bool,

    /// Index inserts/removals that failed during recovery
    pub index_errors: u64,

    /// The repaired index could not be saved; it is still dirty
    pub index_save_failed: bool,
}

impl RecoveryReport {
    /// Whether the index differs from the snapshot that was loaded
    pub fn index_changed(&self) -> bool {
        self.entries_dropped > 0
            || self.scanned_bytes > 0
            || self.index_state == IndexLoadState::Discarded
    }
}

/// Run recovery against `store`, rebuilding `index` and seeding `ids`
pub(crate) fn recover<S, I>(
    store: &S,
    index: &I,
    index_file: &IndexFile,
    ids: &IdAllocator,
    truncate_torn_tail: bool,
) -> Result<RecoveryReport>
where
    S: BackendStore + ?Sized,
    I: Index + ?Sized,
{
    let mut report = RecoveryReport {
        index_state: load_index(index, index_file),
        ..RecoveryReport::default()
    };

    let store_size = store.size();

    // Step 2: entries the store cannot back are stale
    let mut stale = Vec::new();
    index.ascending_visit(&mut |entry| {
        if entry.end() > store_size {
            stale.push(entry.id);
        } else {
            ids.observe(entry.id);
        }
        true
    });
    for id in stale {
        match index.delete(id) {
            Ok(_) => report.entries_dropped += 1,
            Err(e) => {
                report.index_errors += 1;
                tracing::warn!("Failed to drop stale index entry for needle {}: {}", id, e);
            }
        }
    }
    if report.entries_dropped > 0 {
        tracing::warn!(
            "Dropped {} index entries reaching past end of store ({} bytes)",
            report.entries_dropped,
            store_size
        );
    }

    // Step 3
    let checkpoint = last_entry(index).map(|entry| entry.end()).unwrap_or(0);
    report.checkpoint = checkpoint;

    // Step 4
    let mut cursor = checkpoint;
    while cursor < store_size {
        let header = match record::read_header(store, cursor) {
            Ok(header) => header,
            Err(e) => {
                report.torn_tail_bytes = store_size - cursor;
                tracing::warn!(
                    "Ignoring {} trailing bytes at offset {}: {}",
                    report.torn_tail_bytes,
                    cursor,
                    e
                );
                break;
            }
        };

        ids.observe(header.id);
        let size = header.actual_size();

        if header.state.is_tombstoned() {
            report.tombstones_skipped += 1;
        } else {
            match index.set(header.id, cursor, size) {
                Ok(()) => report.needles_indexed += 1,
                Err(e) => {
                    report.index_errors += 1;
                    tracing::warn!(
                        "Failed to index needle {} at offset {}: {}",
                        header.id,
                        cursor,
                        e
                    );
                }
            }
        }

        cursor += size as u64;
    }
    report.scanned_bytes = cursor - checkpoint;

    // Step 5
    if truncate_torn_tail && report.torn_tail_bytes > 0 {
        store.truncate(cursor)?;
        report.tail_truncated = true;
        tracing::warn!("Truncated store to {} bytes", cursor);
    }

    // Step 6
    if report.index_changed() {
        if let Err(e) = index_file.save(index) {
            report.index_save_failed = true;
            tracing::warn!(
                "Failed to save recovered index to {}: {}",
                index_file.path().display(),
                e
            );
        }
    }

    Ok(report)
}

fn load_index<I: Index + ?Sized>(index: &I, index_file: &IndexFile) -> IndexLoadState {
    match index_file.load(index) {
        Ok(true) => {
            tracing::debug!(
                "Loaded {} index entries from {}",
                index.len(),
                index_file.path().display()
            );
            IndexLoadState::Loaded
        }
        Ok(false) => {
            tracing::info!(
                "No index at {}, rebuilding from data",
                index_file.path().display()
            );
            IndexLoadState::Missing
        }
        Err(e) => {
            tracing::warn!(
                "Discarding unreadable index {}: {}",
                index_file.path().display(),
                e
            );
            index.clear();
            IndexLoadState::Discarded
        }
    }
}
