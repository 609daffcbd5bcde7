//! Volume Module
//!
//! The volume manager that coordinates the record codec, backend store and
//! index.
//!
//! ## Responsibilities
//! - Get/put/delete needles by id
//! - Run recovery before serving requests
//! - Decide when the index is persisted
//!
//! ## Crash Windows
//! - Crash after append, before the index save: the needle is an orphan and
//!   the next recovery scan indexes it.
//! - Crash after the flag rewrite, before the index save: the stale entry
//!   points at a tombstone, which `get` filters and `delete` cleans up.

mod recovery;
mod saver;

use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::Mutex;

use crate::config::{IndexSaveStrategy, VolumeConfig};
use crate::error::{NeedleError, Result};
use crate::id::{IdAllocator, NeedleId};
use crate::index::{Index, IndexFile, MemoryIndex};
use crate::record::{self, Needle, RecordState};
use crate::store::{BackendStore, FileStore};

pub use recovery::{IndexLoadState, RecoveryReport};

use saver::IndexSaver;

/// A single append-only needle volume
///
/// ## Concurrency Model: Single-Writer / Multiple-Reader
///
/// - **Writes** (put/delete/flush): serialized by `write_lock`, so the
///   store's append cursor and the index only ever see one mutation at a time
/// - **Reads** (get): take no volume lock; the store serializes each
///   individual read against flag rewrites
pub struct Volume<S, I: Index + 'static = MemoryIndex> {
    /// Volume configuration
    config: VolumeConfig,

    /// Append-only data
    store: S,

    /// Id → location cache (shared with the background saver)
    index: Arc<I>,

    /// Where the index snapshot lives
    index_file: Arc<IndexFile>,

    /// Source of fresh needle ids
    ids: IdAllocator,

    /// Serializes mutations
    write_lock: Mutex<()>,

    /// Set when the index has unsaved changes (interval saving only)
    dirty: Arc<AtomicBool>,

    /// Background saver thread, if interval saving is on
    saver: Option<IndexSaver>,

    /// What recovery found at open
    recovery: RecoveryReport,
}

impl Volume<FileStore, MemoryIndex> {
    /// Open or create a file-backed volume under `config.data_dir`
    pub fn open(config: VolumeConfig) -> Result<Self> {
        config.validate()?;
        fs::create_dir_all(&config.data_dir)?;

        let store = FileStore::open(config.data_path(), config.data_sync)?;
        Self::with_parts(store, MemoryIndex::new(), config)
    }

    /// Open with a path (convenience method)
    ///
    /// Uses default config with the specified data directory
    pub fn open_path(path: &Path) -> Result<Self> {
        let config = VolumeConfig::builder().data_dir(path).build();
        Self::open(config)
    }
}

impl<S: BackendStore, I: Index + 'static> Volume<S, I> {
    /// Assemble a volume from explicit collaborators
    ///
    /// Loads the index snapshot from `config.index_path()` into `index`, then
    /// runs recovery against `store`. `config.data_dir` and `config.data_sync`
    /// are ignored here; they only shape the store `open` creates.
    pub fn with_parts(store: S, index: I, config: VolumeConfig) -> Result<Self> {
        config.validate()?;

        let index = Arc::new(index);
        let index_file = Arc::new(IndexFile::new(config.index_path()));
        let ids = IdAllocator::new();

        let recovery = recovery::recover(
            &store,
            &*index,
            &index_file,
            &ids,
            config.truncate_torn_tail,
        )?;

        tracing::info!(
            "Volume open: {} needles indexed, store {} bytes, next id {} \
             (checkpoint={}, recovered={}, tombstones={}, torn_tail={})",
            index.len(),
            store.size(),
            ids.peek(),
            recovery.checkpoint,
            recovery.needles_indexed,
            recovery.tombstones_skipped,
            recovery.torn_tail_bytes
        );

        // A failed recovery save is retried by the next save of any kind
        let dirty = Arc::new(AtomicBool::new(recovery.index_save_failed));
        let saver = match config.save_strategy {
            IndexSaveStrategy::EveryWrite => None,
            IndexSaveStrategy::Interval(interval) => Some(IndexSaver::spawn(
                Arc::clone(&index),
                Arc::clone(&index_file),
                Arc::clone(&dirty),
                interval,
            )?),
        };

        Ok(Self {
            config,
            store,
            index,
            index_file,
            ids,
            write_lock: Mutex::new(()),
            dirty,
            saver,
            recovery,
        })
    }

    /// Get a needle's payload
    ///
    /// Returns `NotFound` for unknown ids and for ids whose record has been
    /// tombstoned, even if the index still points at it.
    pub fn get(&self, id: NeedleId) -> Result<Bytes> {
        let entry = self.index.get(id)?.ok_or(NeedleError::NotFound(id))?;

        let needle = record::read_full(&self.store, entry.offset, entry.size)?;
        if needle.id() != id {
            return Err(NeedleError::corrupt(
                entry.offset,
                format!("index entry for needle {} points at needle {}", id, needle.id()),
            ));
        }

        if needle.is_tombstoned() {
            tracing::trace!("Needle {} at offset {} is tombstoned", id, entry.offset);
            return Err(NeedleError::NotFound(id));
        }

        Ok(needle.into_payload())
    }

    /// Store a payload and return its new id
    ///
    /// Steps:
    /// 1. Acquire write lock
    /// 2. Append the encoded needle to the store
    /// 3. Record its location in the index
    /// 4. Persist the index (or mark it dirty)
    ///
    /// If step 3 or 4 fails the needle is an orphan; it becomes visible after
    /// the next open.
    pub fn put(&self, payload: &[u8]) -> Result<NeedleId> {
        if payload.len() > self.config.max_payload_size {
            return Err(NeedleError::PayloadTooLarge {
                size: payload.len(),
                max: self.config.max_payload_size,
            });
        }

        let _write_guard = self.write_lock.lock();

        let needle = Needle::new(self.ids.allocate(), Bytes::copy_from_slice(payload));
        let encoded = needle.encode()?;

        let (offset, size) = self.store.append(&encoded)?;
        self.index.set(needle.id(), offset, size)?;
        self.index_changed()?;

        tracing::debug!(
            "Put needle {} ({} bytes) at offset {}",
            needle.id(),
            payload.len(),
            offset
        );
        Ok(needle.id())
    }

    /// Tombstone a needle
    ///
    /// Steps:
    /// 1. Acquire write lock
    /// 2. Look up the entry and check the header it points at
    /// 3. Rewrite the flags byte to tombstoned
    /// 4. Remove the entry and persist the index (or mark it dirty)
    ///
    /// A failed flag rewrite leaves the needle live and indexed.
    pub fn delete(&self, id: NeedleId) -> Result<()> {
        let _write_guard = self.write_lock.lock();

        let entry = self.index.get(id)?.ok_or(NeedleError::NotFound(id))?;

        let header = record::read_header(&self.store, entry.offset)?;
        if header.id != id || header.actual_size() != entry.size {
            return Err(NeedleError::corrupt(
                entry.offset,
                format!(
                    "index entry for needle {} ({} bytes) points at needle {} ({} bytes)",
                    id,
                    entry.size,
                    header.id,
                    header.actual_size()
                ),
            ));
        }

        if header.state.is_tombstoned() {
            // Left over from a delete interrupted before its index save
            tracing::debug!("Removing stale index entry for tombstoned needle {}", id);
            self.index.delete(id)?;
            self.index_changed()?;
            return Err(NeedleError::NotFound(id));
        }

        record::rewrite_flags(&self.store, entry.offset, RecordState::Tombstoned)?;
        self.index.delete(id)?;
        self.index_changed()?;

        tracing::debug!("Deleted needle {} at offset {}", id, entry.offset);
        Ok(())
    }

    /// Whether the index has an entry for `id`
    ///
    /// Does not read the store, so a stale entry for a tombstoned needle
    /// still counts.
    pub fn contains(&self, id: NeedleId) -> Result<bool> {
        Ok(self.index.get(id)?.is_some())
    }

    /// Sync the store and persist the index now
    pub fn flush(&self) -> Result<()> {
        let _write_guard = self.write_lock.lock();

        self.store.sync()?;
        self.dirty.store(false, Ordering::Release);
        if let Err(e) = self.index_file.save(&*self.index) {
            self.dirty.store(true, Ordering::Release);
            return Err(e);
        }
        Ok(())
    }

    /// Close the volume gracefully
    ///
    /// Syncs the store, persists the index and stops the background saver.
    pub fn close(mut self) -> Result<()> {
        self.flush()?;
        // Nothing dirty is left, so the saver's shutdown pass is a no-op
        drop(self.saver.take());
        Ok(())
    }

    fn index_changed(&self) -> Result<()> {
        match self.config.save_strategy {
            IndexSaveStrategy::EveryWrite => {
                self.index_file.save(&*self.index)?;
                self.dirty.store(false, Ordering::Release);
                Ok(())
            }
            IndexSaveStrategy::Interval(_) => {
                self.dirty.store(true, Ordering::Release);
                Ok(())
            }
        }
    }

    // =========================================================================
    // Accessors (for testing and debugging)
    // =========================================================================

    /// Number of indexed needles
    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Current size of the backend store in bytes
    pub fn store_size(&self) -> u64 {
        self.store.size()
    }

    /// The id the next `put` will be assigned
    pub fn next_id(&self) -> NeedleId {
        self.ids.peek()
    }

    /// What recovery found when this volume was opened
    pub fn recovery_report(&self) -> &RecoveryReport {
        &self.recovery
    }

    /// Get the configuration
    pub fn config(&self) -> &VolumeConfig {
        &self.config
    }

    /// Path of the index snapshot
    pub fn index_path(&self) -> &Path {
        self.index_file.path()
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn index(&self) -> &I {
        &self.index
    }
}
