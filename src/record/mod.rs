//! Record Module
//!
//! On-disk framing of one needle, and the only code that interprets or
//! mutates the flags byte.
//!
//! ## Responsibilities
//! - Encode a needle into header + payload + padding
//! - Parse just the header (recovery scan) or the whole record (reads)
//! - Tombstone a record by rewriting its flags byte in place
//!
//! ## Record Format
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │ Header (24 bytes, little-endian)                             │
//! │ ┌──────────┬─────────┬─────────┬────────┬─────────┬────────┐ │
//! │ │Magic (4) │Flags (1)│ Rsvd (3)│ Id (8) │ Len (4) │ CRC (4)│ │
//! │ └──────────┴─────────┴─────────┴────────┴─────────┴────────┘ │
//! ├──────────────────────────────────────────────────────────────┤
//! │ Payload (Len bytes)                                          │
//! ├──────────────────────────────────────────────────────────────┤
//! │ Zero padding up to the next multiple of 8                    │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! The CRC covers id, length and payload but not the flags byte, so a
//! tombstoned record still verifies.

mod codec;
mod needle;

use bytes::Buf;

use crate::error::{NeedleError, Result};
use crate::id::NeedleId;

pub use codec::{read_full, read_header, rewrite_flags};
pub use needle::Needle;

// =============================================================================
// Format Constants
// =============================================================================

/// Magic bytes at the start of every record
pub const MAGIC: &[u8; 4] = b"NDLE";

/// Header size: Magic (4) + Flags (1) + Reserved (3) + Id (8) + Len (4) + CRC (4)
pub const HEADER_SIZE: usize = 24;

/// Position of the flags byte within the header
pub const FLAGS_OFFSET: u64 = 4;

/// Every record length is a multiple of this
pub const ALIGNMENT: u64 = 8;

/// Largest payload whose padded record still fits the index's `u32` size
pub const MAX_PAYLOAD_LEN: u32 = (u32::MAX & !(ALIGNMENT as u32 - 1)) - HEADER_SIZE as u32;

/// On-disk footprint of a record carrying `payload_len` bytes
pub fn actual_size(payload_len: u32) -> u32 {
    let unpadded = HEADER_SIZE as u64 + payload_len as u64;
    let padded = (unpadded + ALIGNMENT - 1) & !(ALIGNMENT - 1);
    padded as u32
}

/// `actual_size` for an in-memory payload, `None` past `MAX_PAYLOAD_LEN`
pub fn checked_actual_size(payload_len: usize) -> Option<u32> {
    u32::try_from(payload_len)
        .ok()
        .filter(|&len| len <= MAX_PAYLOAD_LEN)
        .map(actual_size)
}

// =============================================================================
// Record State
// =============================================================================

/// Liveness of a stored record, kept in the flags byte
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum RecordState {
    Live = 0,
    Tombstoned = 1,
}

impl RecordState {
    /// Raw flags byte for this state
    pub fn flags(self) -> u8 {
        self as u8
    }

    /// Parse a flags byte; anything other than 0 or 1 is rejected
    pub fn from_flags(flags: u8) -> Option<Self> {
        match flags {
            0 => Some(RecordState::Live),
            1 => Some(RecordState::Tombstoned),
            _ => None,
        }
    }

    pub fn is_tombstoned(self) -> bool {
        self == RecordState::Tombstoned
    }
}

// =============================================================================
// Record Header
// =============================================================================

/// Parsed fixed-size header of a record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordHeader {
    pub id: NeedleId,
    pub state: RecordState,
    pub payload_len: u32,
    pub checksum: u32,
}

impl RecordHeader {
    /// Total on-disk size of the record this header starts
    pub fn actual_size(&self) -> u32 {
        actual_size(self.payload_len)
    }

    /// Parse a header from the first `HEADER_SIZE` bytes of `buf`
    ///
    /// `offset` is only used for error reporting.
    pub fn decode(mut buf: &[u8], offset: u64) -> Result<Self> {
        if buf.len() < HEADER_SIZE {
            return Err(NeedleError::corrupt(
                offset,
                format!("truncated header: {} of {} bytes", buf.len(), HEADER_SIZE),
            ));
        }

        let mut magic = [0u8; 4];
        buf.copy_to_slice(&mut magic);
        if &magic != MAGIC {
            return Err(NeedleError::corrupt(
                offset,
                format!("bad magic {:02x?}", magic),
            ));
        }

        let flags = buf.get_u8();
        let state = RecordState::from_flags(flags).ok_or_else(|| {
            NeedleError::corrupt(offset, format!("invalid flags byte 0x{:02x}", flags))
        })?;

        let mut reserved = [0u8; 3];
        buf.copy_to_slice(&mut reserved);
        if reserved != [0u8; 3] {
            return Err(NeedleError::corrupt(offset, "reserved header bytes are not zero"));
        }

        let id = NeedleId::new(buf.get_u64_le());
        if id.is_none() {
            return Err(NeedleError::corrupt(offset, "record carries the reserved id 0"));
        }

        let payload_len = buf.get_u32_le();
        if payload_len > MAX_PAYLOAD_LEN {
            return Err(NeedleError::corrupt(
                offset,
                format!("declared payload length {} is out of range", payload_len),
            ));
        }

        let checksum = buf.get_u32_le();

        Ok(Self {
            id,
            state,
            payload_len,
            checksum,
        })
    }
}

/// CRC32 over the fields a record's checksum protects
pub(crate) fn checksum(id: NeedleId, payload: &[u8]) -> u32 {
    let mut hasher = crc32fast::Hasher::new();
    hasher.update(&id.get().to_le_bytes());
    hasher.update(&(payload.len() as u32).to_le_bytes());
    hasher.update(payload);
    hasher.finalize()
}
