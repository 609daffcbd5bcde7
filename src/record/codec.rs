//! Store-facing record operations
//!
//! Everything here goes through a [`BackendStore`]. Header reads never touch
//! the payload, which keeps the recovery scan cheap.

use bytes::Bytes;

use crate::error::{NeedleError, Result};
use crate::store::BackendStore;

use super::{Needle, RecordHeader, RecordState, FLAGS_OFFSET, HEADER_SIZE};

/// Parse the header of the record at `offset`
///
/// Returns `CorruptRecord` when fewer than `HEADER_SIZE` bytes remain, when
/// the header is malformed, or when the record it describes would run past
/// the end of the store (a torn append).
pub fn read_header<S: BackendStore + ?Sized>(store: &S, offset: u64) -> Result<RecordHeader> {
    let remaining = store.size().saturating_sub(offset);
    if remaining < HEADER_SIZE as u64 {
        return Err(NeedleError::corrupt(
            offset,
            format!("truncated header: {} of {} bytes", remaining, HEADER_SIZE),
        ));
    }

    let bytes = store.read_at(offset, HEADER_SIZE)?;
    let header = RecordHeader::decode(&bytes, offset)?;

    if header.actual_size() as u64 > remaining {
        return Err(NeedleError::corrupt(
            offset,
            format!(
                "record of {} bytes extends past end of store ({} bytes left)",
                header.actual_size(),
                remaining
            ),
        ));
    }

    Ok(header)
}

/// Read and verify the whole record at `offset`, expected to be `size` bytes
pub fn read_full<S: BackendStore + ?Sized>(store: &S, offset: u64, size: u32) -> Result<Needle> {
    if (size as usize) < HEADER_SIZE {
        return Err(NeedleError::corrupt(
            offset,
            format!("size {} is smaller than a record header", size),
        ));
    }

    let bytes = store.read_at(offset, size as usize)?;
    Needle::decode(Bytes::from(bytes), offset)
}

/// Overwrite the flags byte of the record at `offset`
///
/// Header fields and payload are left untouched.
pub fn rewrite_flags<S: BackendStore + ?Sized>(
    store: &S,
    offset: u64,
    state: RecordState,
) -> Result<()> {
    store.write_at(offset + FLAGS_OFFSET, &[state.flags()])
}
