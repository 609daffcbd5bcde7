//! In-memory store
//!
//! `Vec<u8>` behind a RwLock. Used by tests and benchmarks, and handy for
//! crafting torn tails or hand-built records.

use parking_lot::RwLock;

use crate::error::Result;

use super::{append_len, check_range, BackendStore};

/// Volatile store backed by a growable buffer
#[derive(Debug, Default)]
pub struct MemoryStore {
    data: RwLock<Vec<u8>>,
}

impl MemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store pre-filled with `bytes`
    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            data: RwLock::new(bytes.into()),
        }
    }

    /// Copy of the full contents
    pub fn to_vec(&self) -> Vec<u8> {
        self.data.read().clone()
    }

    /// Append raw bytes without framing (simulates a torn write)
    pub fn append_raw(&self, bytes: &[u8]) {
        self.data.write().extend_from_slice(bytes);
    }
}

impl BackendStore for MemoryStore {
    fn size(&self) -> u64 {
        self.data.read().len() as u64
    }

    fn append(&self, buf: &[u8]) -> Result<(u64, u32)> {
        let size = append_len(buf.len())?;
        let mut data = self.data.write();
        let offset = data.len() as u64;
        data.extend_from_slice(buf);
        Ok((offset, size))
    }

    fn read_at(&self, offset: u64, len: usize) -> Result<Vec<u8>> {
        let data = self.data.read();
        check_range(data.len() as u64, offset, len)?;

        let start = offset as usize;
        Ok(data[start..start + len].to_vec())
    }

    fn write_at(&self, offset: u64, buf: &[u8]) -> Result<()> {
        let mut data = self.data.write();
        check_range(data.len() as u64, offset, buf.len())?;

        let start = offset as usize;
        data[start..start + buf.len()].copy_from_slice(buf);
        Ok(())
    }

    fn sync(&self) -> Result<()> {
        Ok(())
    }

    fn truncate(&self, len: u64) -> Result<()> {
        let mut data = self.data.write();
        if len < data.len() as u64 {
            data.truncate(len as usize);
        }
        Ok(())
    }
}
