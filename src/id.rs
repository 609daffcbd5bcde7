//! Needle identifiers
//!
//! Identifiers are `u64` values allocated from a per-volume counter.
//! `0` is reserved and never handed out.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

/// Opaque identifier naming one stored needle
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NeedleId(u64);

impl NeedleId {
    /// The "no identifier" sentinel
    pub const NONE: NeedleId = NeedleId(0);

    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub const fn get(self) -> u64 {
        self.0
    }

    pub const fn is_none(self) -> bool {
        self.0 == 0
    }
}

impl From<u64> for NeedleId {
    fn from(raw: u64) -> Self {
        Self(raw)
    }
}

impl fmt::Display for NeedleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Monotonic identifier source for one volume
///
/// Uniqueness across reopens comes from `observe`: recovery feeds every id it
/// sees (indexed or scanned) so allocation resumes past the highest one.
#[derive(Debug)]
pub struct IdAllocator {
    next: AtomicU64,
}

impl IdAllocator {
    /// Start allocating at 1
    pub fn new() -> Self {
        Self {
            next: AtomicU64::new(1),
        }
    }

    /// Hand out the next identifier
    pub fn allocate(&self) -> NeedleId {
        NeedleId(self.next.fetch_add(1, Ordering::SeqCst))
    }

    /// Make sure future allocations are greater than `id`
    pub fn observe(&self, id: NeedleId) {
        self.next.fetch_max(id.0.saturating_add(1), Ordering::SeqCst);
    }

    /// The id the next `allocate` call will return
    pub fn peek(&self) -> NeedleId {
        NeedleId(self.next.load(Ordering::SeqCst))
    }
}

impl Default for IdAllocator {
    fn default() -> Self {
        Self::new()
    }
}
