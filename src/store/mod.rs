//! Backend Store Module
//!
//! Append-only byte medium that holds the needles of one volume.
//!
//! ## Responsibilities
//! - Report the current logical size
//! - Append a buffer and return where it landed
//! - Read an arbitrary byte range
//! - Overwrite a byte range in place (only ever the 1-byte flags field)
//! - Drop a torn tail left by an interrupted append
//!
//! ## Contract
//! Bytes, once appended, are never relocated. `write_at` never extends the
//! store. Each call is atomic with respect to the others on the same store,
//! so a reader racing a flag rewrite sees the old or the new byte, never a
//! torn header.

mod file;
mod memory;

use std::sync::Arc;

use crate::error::Result;

pub use file::FileStore;
pub use memory::MemoryStore;

/// Append-only byte store backing a volume
pub trait BackendStore: Send + Sync {
    /// Current size in bytes
    fn size(&self) -> u64;

    /// Append `buf` at the end, returning `(offset, size)` of the written range
    fn append(&self, buf: &[u8]) -> Result<(u64, u32)>;

    /// Read exactly `len` bytes starting at `offset`
    fn read_at(&self, offset: u64, len: usize) -> Result<Vec<u8>>;

    /// Overwrite bytes in place. Fails if the range passes the end.
    fn write_at(&self, offset: u64, buf: &[u8]) -> Result<()>;

    /// Flush buffered writes to durable storage
    fn sync(&self) -> Result<()>;

    /// Cut the store down to `len` bytes (only used to drop a torn tail)
    fn truncate(&self, len: u64) -> Result<()>;
}

impl<T: BackendStore + ?Sized> BackendStore for Arc<T> {
    fn size(&self) -> u64 {
        (**self).size()
    }

    fn append(&self, buf: &[u8]) -> Result<(u64, u32)> {
        (**self).append(buf)
    }

    fn read_at(&self, offset: u64, len: usize) -> Result<Vec<u8>> {
        (**self).read_at(offset, len)
    }

    fn write_at(&self, offset: u64, buf: &[u8]) -> Result<()> {
        (**self).write_at(offset, buf)
    }

    fn sync(&self) -> Result<()> {
        (**self).sync()
    }

    fn truncate(&self, len: u64) -> Result<()> {
        (**self).truncate(len)
    }
}

/// Shared bounds check for `read_at`/`write_at`
pub(crate) fn check_range(store_size: u64, offset: u64, len: usize) -> std::io::Result<()> {
    let end = offset.checked_add(len as u64);
    match end {
        Some(end) if end <= store_size => Ok(()),
        _ => Err(std::io::Error::new(
            std::io::ErrorKind::UnexpectedEof,
            format!(
                "range {}..{} is past the end of the store ({} bytes)",
                offset,
                offset.saturating_add(len as u64),
                store_size
            ),
        )),
    }
}

/// Convert an append length to the `u32` the index stores
pub(crate) fn append_len(len: usize) -> std::io::Result<u32> {
    u32::try_from(len).map_err(|_| {
        std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            format!("append of {} bytes exceeds u32 range", len),
        )
    })
}
