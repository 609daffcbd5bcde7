//! Index snapshot encoding
//!
//! Header and trailer are fixed little-endian fields; the entry list in
//! between is bincode.

use std::io::{Read, Write};

use crate::error::{NeedleError, Result};

use super::IndexEntry;

/// Magic bytes identifying an index snapshot
pub const SNAPSHOT_MAGIC: &[u8; 4] = b"NIDX";

/// Current snapshot format version
pub const SNAPSHOT_VERSION: u16 = 1;

/// Magic (4) + Version (2) + BodyLen (4)
const PREAMBLE_SIZE: usize = 10;

/// Write `entries` as a snapshot
pub fn write_snapshot(sink: &mut dyn Write, entries: &[IndexEntry]) -> Result<()> {
    let body =
        bincode::serialize(entries).map_err(|e| NeedleError::Serialization(e.to_string()))?;
    let body_len = u32::try_from(body.len()).map_err(|_| {
        NeedleError::Serialization(format!("index snapshot too large: {} bytes", body.len()))
    })?;

    let mut hasher = crc32fast::Hasher::new();
    hasher.update(&body);
    let crc = hasher.finalize();

    sink.write_all(SNAPSHOT_MAGIC)?;
    sink.write_all(&SNAPSHOT_VERSION.to_le_bytes())?;
    sink.write_all(&body_len.to_le_bytes())?;
    sink.write_all(&body)?;
    sink.write_all(&crc.to_le_bytes())?;
    sink.flush()?;
    Ok(())
}

/// Read a snapshot written by [`write_snapshot`]
pub fn read_snapshot(source: &mut dyn Read) -> Result<Vec<IndexEntry>> {
    let mut preamble = [0u8; PREAMBLE_SIZE];
    source.read_exact(&mut preamble)?;

    if &preamble[0..4] != SNAPSHOT_MAGIC {
        return Err(NeedleError::Serialization(format!(
            "Invalid index snapshot magic: expected NIDX, got {:?}",
            &preamble[0..4]
        )));
    }

    let version = u16::from_le_bytes([preamble[4], preamble[5]]);
    if version != SNAPSHOT_VERSION {
        return Err(NeedleError::Serialization(format!(
            "Unsupported index snapshot version: {}",
            version
        )));
    }

    let body_len = u32::from_le_bytes([preamble[6], preamble[7], preamble[8], preamble[9]]);

    // `take` keeps a corrupt length from turning into a huge allocation
    let mut body = Vec::new();
    Read::take(&mut *source, body_len as u64).read_to_end(&mut body)?;
    if body.len() != body_len as usize {
        return Err(NeedleError::Serialization(format!(
            "Truncated index snapshot: expected {} body bytes, got {}",
            body_len,
            body.len()
        )));
    }

    let mut crc_bytes = [0u8; 4];
    source.read_exact(&mut crc_bytes)?;
    let stored_crc = u32::from_le_bytes(crc_bytes);

    let mut hasher = crc32fast::Hasher::new();
    hasher.update(&body);
    if hasher.finalize() != stored_crc {
        return Err(NeedleError::Serialization(
            "Index snapshot checksum mismatch".to_string(),
        ));
    }

    bincode::deserialize(&body).map_err(|e| NeedleError::Serialization(e.to_string()))
}
