//! Needle: one blob plus its framing metadata

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::{NeedleError, Result};
use crate::id::NeedleId;

use super::{
    checked_actual_size, checksum, RecordHeader, RecordState, HEADER_SIZE, MAGIC, MAX_PAYLOAD_LEN,
};

/// A decoded (or about to be encoded) record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Needle {
    id: NeedleId,
    state: RecordState,
    payload: Bytes,
}

impl Needle {
    /// Create a live needle
    pub fn new(id: NeedleId, payload: impl Into<Bytes>) -> Self {
        Self {
            id,
            state: RecordState::Live,
            payload: payload.into(),
        }
    }

    /// Same needle with a different state (for building test fixtures)
    pub fn with_state(mut self, state: RecordState) -> Self {
        self.state = state;
        self
    }

    pub fn id(&self) -> NeedleId {
        self.id
    }

    pub fn state(&self) -> RecordState {
        self.state
    }

    pub fn is_tombstoned(&self) -> bool {
        self.state.is_tombstoned()
    }

    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    pub fn into_payload(self) -> Bytes {
        self.payload
    }

    /// On-disk size once encoded
    ///
    /// Fails with `PayloadTooLarge` when the record would not fit the
    /// index's `u32` size field.
    pub fn actual_size(&self) -> Result<u32> {
        checked_actual_size(self.payload.len()).ok_or(NeedleError::PayloadTooLarge {
            size: self.payload.len(),
            max: MAX_PAYLOAD_LEN as usize,
        })
    }

    /// Encode into header + payload + zero padding
    pub fn encode(&self) -> Result<Bytes> {
        let total = self.actual_size()? as usize;
        let mut buf = BytesMut::with_capacity(total);

        buf.put_slice(MAGIC);
        buf.put_u8(self.state.flags());
        buf.put_bytes(0, 3);
        buf.put_u64_le(self.id.get());
        buf.put_u32_le(self.payload.len() as u32);
        buf.put_u32_le(checksum(self.id, &self.payload));
        buf.put_slice(&self.payload);
        buf.put_bytes(0, total - HEADER_SIZE - self.payload.len());

        Ok(buf.freeze())
    }

    /// Decode a complete record occupying all of `buf`
    ///
    /// Fails if the header's actual size disagrees with `buf.len()` or the
    /// checksum does not match. `offset` is only used for error reporting.
    pub fn decode(buf: Bytes, offset: u64) -> Result<Self> {
        let header = RecordHeader::decode(&buf, offset)?;

        let declared = header.actual_size() as usize;
        if declared != buf.len() {
            return Err(NeedleError::corrupt(
                offset,
                format!(
                    "size mismatch: expected {} bytes, header declares {}",
                    buf.len(),
                    declared
                ),
            ));
        }

        let payload = buf.slice(HEADER_SIZE..HEADER_SIZE + header.payload_len as usize);
        let computed = checksum(header.id, &payload);
        if computed != header.checksum {
            return Err(NeedleError::corrupt(
                offset,
                format!(
                    "checksum mismatch: stored 0x{:08x}, computed 0x{:08x}",
                    header.checksum, computed
                ),
            ));
        }

        Ok(Self {
            id: header.id,
            state: header.state,
            payload,
        })
    }
}
