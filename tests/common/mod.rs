//! Shared helpers for volume and recovery tests
#![allow(dead_code)]

use std::io::{self, Read, Write};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use needlestore::index::{Index, IndexEntry, MemoryIndex};
use needlestore::store::{BackendStore, MemoryStore};
use needlestore::{NeedleError, NeedleId, Result, Volume, VolumeConfig};
use tempfile::TempDir;
use tracing_subscriber::EnvFilter;

/// Route volume logs to the test harness (`RUST_LOG=needlestore=debug`)
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

// =============================================================================
// Memory-backed Volumes
// =============================================================================

pub type MemoryVolume = Volume<Arc<MemoryStore>, MemoryIndex>;

/// Temp dir holding the index snapshot of a memory-backed volume
pub struct MemoryFixture {
    pub temp_dir: TempDir,
    pub store: Arc<MemoryStore>,
}

impl MemoryFixture {
    pub fn new() -> Self {
        init_tracing();
        Self {
            temp_dir: TempDir::new().unwrap(),
            store: Arc::new(MemoryStore::new()),
        }
    }

    pub fn index_path(&self) -> PathBuf {
        self.temp_dir.path().join("volume.idx")
    }

    pub fn config(&self) -> VolumeConfig {
        VolumeConfig::builder()
            .data_dir(self.temp_dir.path())
            .index_path(self.index_path())
            .build()
    }

    /// Open (or reopen) a volume over the shared store
    pub fn open(&self) -> MemoryVolume {
        self.open_with(self.config())
    }

    pub fn open_with(&self, config: VolumeConfig) -> MemoryVolume {
        Volume::with_parts(Arc::clone(&self.store), MemoryIndex::new(), config).unwrap()
    }

    /// Simulate losing the index snapshot
    pub fn remove_index(&self) {
        std::fs::remove_file(self.index_path()).unwrap();
    }
}

// =============================================================================
// Fault Injection
// =============================================================================

fn injected(what: &str) -> NeedleError {
    NeedleError::Io(io::Error::new(
        io::ErrorKind::Other,
        format!("injected {} failure", what),
    ))
}

/// MemoryStore whose writes can be made to fail on demand
#[derive(Default)]
pub struct FaultyStore {
    pub inner: MemoryStore,
    pub fail_append: AtomicBool,
    pub fail_write_at: AtomicBool,
}

impl FaultyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_fail_append(&self, fail: bool) {
        self.fail_append.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_write_at(&self, fail: bool) {
        self.fail_write_at.store(fail, Ordering::SeqCst);
    }
}

impl BackendStore for FaultyStore {
    fn size(&self) -> u64 {
        self.inner.size()
    }

    fn append(&self, buf: &[u8]) -> Result<(u64, u32)> {
        if self.fail_append.load(Ordering::SeqCst) {
            return Err(injected("append"));
        }
        self.inner.append(buf)
    }

    fn read_at(&self, offset: u64, len: usize) -> Result<Vec<u8>> {
        self.inner.read_at(offset, len)
    }

    fn write_at(&self, offset: u64, buf: &[u8]) -> Result<()> {
        if self.fail_write_at.load(Ordering::SeqCst) {
            return Err(injected("write_at"));
        }
        self.inner.write_at(offset, buf)
    }

    fn sync(&self) -> Result<()> {
        self.inner.sync()
    }

    fn truncate(&self, len: u64) -> Result<()> {
        self.inner.truncate(len)
    }
}

/// MemoryIndex whose mutations and saves can be made to fail on demand
#[derive(Default)]
pub struct FaultyIndex {
    pub inner: MemoryIndex,
    pub fail_set: AtomicBool,
    pub fail_delete: AtomicBool,
    pub fail_persist: AtomicBool,
}

impl FaultyIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_fail_set(&self, fail: bool) {
        self.fail_set.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_delete(&self, fail: bool) {
        self.fail_delete.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_persist(&self, fail: bool) {
        self.fail_persist.store(fail, Ordering::SeqCst);
    }
}

impl Index for FaultyIndex {
    fn get(&self, id: NeedleId) -> Result<Option<IndexEntry>> {
        self.inner.get(id)
    }

    fn set(&self, id: NeedleId, offset: u64, size: u32) -> Result<()> {
        if self.fail_set.load(Ordering::SeqCst) {
            return Err(NeedleError::Index("injected set failure".to_string()));
        }
        self.inner.set(id, offset, size)
    }

    fn delete(&self, id: NeedleId) -> Result<IndexEntry> {
        if self.fail_delete.load(Ordering::SeqCst) {
            return Err(NeedleError::Index("injected delete failure".to_string()));
        }
        self.inner.delete(id)
    }

    fn ascending_visit(&self, visitor: &mut dyn FnMut(&IndexEntry) -> bool) {
        self.inner.ascending_visit(visitor)
    }

    fn persist(&self, sink: &mut dyn Write) -> Result<()> {
        if self.fail_persist.load(Ordering::SeqCst) {
            return Err(injected("persist"));
        }
        self.inner.persist(sink)
    }

    fn load(&self, source: &mut dyn Read) -> Result<()> {
        self.inner.load(source)
    }

    fn len(&self) -> usize {
        self.inner.len()
    }

    fn clear(&self) {
        self.inner.clear()
    }
}

pub type FaultyVolume = Volume<Arc<FaultyStore>, Arc<FaultyIndex>>;

/// Open a volume over fault-injecting parts, returning handles to both
pub fn open_faulty(temp_dir: &TempDir) -> (Arc<FaultyStore>, Arc<FaultyIndex>, FaultyVolume) {
    init_tracing();
    let store = Arc::new(FaultyStore::new());
    let index = Arc::new(FaultyIndex::new());
    let config = VolumeConfig::builder()
        .data_dir(temp_dir.path())
        .build();
    let volume = Volume::with_parts(Arc::clone(&store), Arc::clone(&index), config).unwrap();
    (store, index, volume)
}
