//! In-memory index
//!
//! Hash map for point lookups plus a BTreeMap keyed by offset for ordered
//! traversal, both behind one RwLock so they never disagree.

use std::collections::{BTreeMap, HashMap};
use std::io::{Read, Write};

use parking_lot::RwLock;

use crate::error::{NeedleError, Result};
use crate::id::NeedleId;

use super::{read_snapshot, write_snapshot, Index, IndexEntry};

/// Reference `Index` implementation
#[derive(Debug, Default)]
pub struct MemoryIndex {
    inner: RwLock<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    by_id: HashMap<NeedleId, IndexEntry>,
    by_offset: BTreeMap<u64, NeedleId>,
}

impl Inner {
    fn insert(&mut self, entry: IndexEntry) {
        if let Some(old) = self.by_id.insert(entry.id, entry) {
            if old.offset != entry.offset {
                self.by_offset.remove(&old.offset);
            }
        }
        // Two ids can only share an offset through a corrupt snapshot; the
        // newer one wins and the displaced id is dropped from both maps.
        if let Some(displaced) = self.by_offset.insert(entry.offset, entry.id) {
            if displaced != entry.id {
                self.by_id.remove(&displaced);
            }
        }
    }
}

impl MemoryIndex {
    /// Create an empty index
    pub fn new() -> Self {
        Self::default()
    }

    /// All entries in ascending offset order
    pub fn entries(&self) -> Vec<IndexEntry> {
        let inner = self.inner.read();
        inner
            .by_offset
            .values()
            .filter_map(|id| inner.by_id.get(id).copied())
            .collect()
    }
}

impl Index for MemoryIndex {
    fn get(&self, id: NeedleId) -> Result<Option<IndexEntry>> {
        let inner = self.inner.read();
        Ok(inner.by_id.get(&id).copied().filter(IndexEntry::is_valid))
    }

    fn set(&self, id: NeedleId, offset: u64, size: u32) -> Result<()> {
        if size == 0 {
            return Err(NeedleError::Index(format!(
                "refusing zero-sized entry for needle {}",
                id
            )));
        }

        self.inner.write().insert(IndexEntry::new(id, offset, size));
        Ok(())
    }

    fn delete(&self, id: NeedleId) -> Result<IndexEntry> {
        let mut inner = self.inner.write();
        let entry = inner
            .by_id
            .remove(&id)
            .ok_or_else(|| NeedleError::Index(format!("no entry for needle {}", id)))?;
        inner.by_offset.remove(&entry.offset);
        Ok(entry)
    }

    fn ascending_visit(&self, visitor: &mut dyn FnMut(&IndexEntry) -> bool) {
        let inner = self.inner.read();
        for id in inner.by_offset.values() {
            if let Some(entry) = inner.by_id.get(id) {
                if !visitor(entry) {
                    break;
                }
            }
        }
    }

    fn persist(&self, sink: &mut dyn Write) -> Result<()> {
        write_snapshot(sink, &self.entries())
    }

    fn load(&self, source: &mut dyn Read) -> Result<()> {
        let entries = read_snapshot(source)?;

        let mut fresh = Inner::default();
        for entry in entries.into_iter().filter(IndexEntry::is_valid) {
            fresh.insert(entry);
        }

        *self.inner.write() = fresh;
        Ok(())
    }

    fn len(&self) -> usize {
        self.inner.read().by_id.len()
    }

    fn clear(&self) {
        let mut inner = self.inner.write();
        inner.by_id.clear();
        inner.by_offset.clear();
    }
}
