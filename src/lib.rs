//! # needlestore
//!
//! A single-volume, append-only needle store with:
//! - Append-only needle records with per-record checksums
//! - Soft deletes through an in-place tombstone flag
//! - An id → location index that rebuilds itself from the data file
//! - Crash recovery that tolerates a torn trailing write
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        Volume                                │
//! │         get / put / delete, recovery at open                 │
//! │            (Single Writer / Multi Reader)                    │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │
//!          ┌────────────┼────────────────────┐
//!          │            │                    │
//!          ▼            ▼                    ▼
//!   ┌─────────────┐ ┌─────────────┐  ┌─────────────┐
//!   │   Record    │ │   Backend   │  │    Index    │
//!   │   Codec     │─▶    Store    │  │  (RwLock)   │
//!   └─────────────┘ │  (Append)   │  └──────┬──────┘
//!                   └─────────────┘         │
//!                                           ▼
//!                                   ┌─────────────┐
//!                                   │ Index File  │
//!                                   │ (snapshot)  │
//!                                   └─────────────┘
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;
pub mod id;

pub mod record;
pub mod store;
pub mod index;
pub mod volume;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use error::{NeedleError, Result};
pub use config::{DataSyncStrategy, IndexSaveStrategy, VolumeConfig};
pub use id::NeedleId;
pub use volume::{IndexLoadState, RecoveryReport, Volume};

// =============================================================================
// Version Info
// =============================================================================

/// Current version of needlestore
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
