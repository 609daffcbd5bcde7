//! Index Module
//!
//! Maps needle ids to where their records live in the backend store.
//!
//! ## Responsibilities
//! - Point lookup, insert/overwrite and removal by id
//! - Traversal in ascending **offset** order (recovery uses the last entry
//!   to find where the unindexed suffix of the store begins)
//! - Full snapshot persist/load
//!
//! ## Snapshot Format
//! ```text
//! ┌──────────┬────────────┬──────────┬──────────────────────┬─────────┐
//! │Magic (4) │Version (2) │ Len (4)  │ bincode(Vec<Entry>)  │ CRC (4) │
//! └──────────┴────────────┴──────────┴──────────────────────┴─────────┘
//! ```
//!
//! The index is only a cache of the store. Losing it costs a longer scan at
//! the next open, nothing more.

mod file;
mod memory;
mod snapshot;

use std::io::{Read, Write};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::id::NeedleId;

pub use file::IndexFile;
pub use memory::MemoryIndex;
pub use snapshot::{read_snapshot, write_snapshot, SNAPSHOT_MAGIC, SNAPSHOT_VERSION};

/// Location of one record in the backend store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexEntry {
    pub id: NeedleId,
    /// Byte position of the record's header
    pub offset: u64,
    /// Actual on-disk size of the record (header + payload + padding)
    pub size: u32,
}

impl IndexEntry {
    pub fn new(id: NeedleId, offset: u64, size: u32) -> Self {
        Self { id, offset, size }
    }

    /// First byte past the record
    pub fn end(&self) -> u64 {
        self.offset + self.size as u64
    }

    /// An all-zero location means "no entry"
    pub fn is_valid(&self) -> bool {
        !(self.offset == 0 && self.size == 0)
    }
}

/// Id → location mapping used by a volume
///
/// Implementations use interior mutability; every method takes `&self`.
pub trait Index: Send + Sync {
    /// Look up an entry. Invalid (all-zero) entries are reported as absent.
    fn get(&self, id: NeedleId) -> Result<Option<IndexEntry>>;

    /// Insert or overwrite the entry for `id`
    fn set(&self, id: NeedleId, offset: u64, size: u32) -> Result<()>;

    /// Remove the entry for `id`, failing if there is none
    fn delete(&self, id: NeedleId) -> Result<IndexEntry>;

    /// Visit entries in ascending offset order until `visitor` returns false
    ///
    /// The visitor must not call back into the index.
    fn ascending_visit(&self, visitor: &mut dyn FnMut(&IndexEntry) -> bool);

    /// Write a full snapshot to `sink`
    fn persist(&self, sink: &mut dyn Write) -> Result<()>;

    /// Replace the in-memory contents with the snapshot in `source`
    fn load(&self, source: &mut dyn Read) -> Result<()>;

    /// Number of entries
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every entry
    fn clear(&self);
}

impl<T: Index + ?Sized> Index for Arc<T> {
    fn get(&self, id: NeedleId) -> Result<Option<IndexEntry>> {
        (**self).get(id)
    }

    fn set(&self, id: NeedleId, offset: u64, size: u32) -> Result<()> {
        (**self).set(id, offset, size)
    }

    fn delete(&self, id: NeedleId) -> Result<IndexEntry> {
        (**self).delete(id)
    }

    fn ascending_visit(&self, visitor: &mut dyn FnMut(&IndexEntry) -> bool) {
        (**self).ascending_visit(visitor)
    }

    fn persist(&self, sink: &mut dyn Write) -> Result<()> {
        (**self).persist(sink)
    }

    fn load(&self, source: &mut dyn Read) -> Result<()> {
        (**self).load(source)
    }

    fn len(&self) -> usize {
        (**self).len()
    }

    fn clear(&self) {
        (**self).clear()
    }
}

/// Entry with the greatest offset, if any
pub fn last_entry<I: Index + ?Sized>(index: &I) -> Option<IndexEntry> {
    let mut last = None;
    index.ascending_visit(&mut |entry| {
        last = Some(*entry);
        true
    });
    last
}
