//! File-backed store
//!
//! Single data file, one handle guarded by a mutex. Reads seek and
//! `read_exact` under the same lock as writes.

use std::fs::{self, File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use parking_lot::Mutex;

use crate::config::DataSyncStrategy;
use crate::error::Result;

use super::{append_len, check_range, BackendStore};

/// Persistent store over a single data file
pub struct FileStore {
    /// Path to the data file
    path: PathBuf,
    /// File handle plus the logical length (end of the last good append)
    state: Mutex<FileState>,
    /// When to fsync
    sync_strategy: DataSyncStrategy,
}

struct FileState {
    file: File,
    len: u64,
}

impl FileStore {
    /// Open or create the data file at `path`
    ///
    /// Parent directories are created if missing. Existing contents are kept.
    pub fn open(path: impl AsRef<Path>, sync_strategy: DataSyncStrategy) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;
        let len = file.metadata()?.len();

        tracing::debug!("Opened data file {} ({} bytes)", path.display(), len);

        Ok(Self {
            path: path.to_path_buf(),
            state: Mutex::new(FileState { file, len }),
            sync_strategy,
        })
    }

    /// Path of the underlying data file
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn sync_after_write(&self, file: &File) -> std::io::Result<()> {
        match self.sync_strategy {
            DataSyncStrategy::EveryWrite => file.sync_data(),
            DataSyncStrategy::Manual => Ok(()),
        }
    }
}

impl BackendStore for FileStore {
    fn size(&self) -> u64 {
        self.state.lock().len
    }

    fn append(&self, buf: &[u8]) -> Result<(u64, u32)> {
        let size = append_len(buf.len())?;
        let mut state = self.state.lock();
        let offset = state.len;

        let written = write_range(&mut state.file, offset, buf)
            .and_then(|_| self.sync_after_write(&state.file));

        if let Err(e) = written {
            // Cut off whatever part of `buf` made it out so the torn bytes
            // cannot end up in the middle of the file.
            if let Err(trunc) = state.file.set_len(offset) {
                tracing::warn!(
                    "Failed to truncate {} back to {} after failed append: {}",
                    self.path.display(),
                    offset,
                    trunc
                );
            }
            return Err(e.into());
        }

        state.len = offset + buf.len() as u64;
        Ok((offset, size))
    }

    fn read_at(&self, offset: u64, len: usize) -> Result<Vec<u8>> {
        let mut state = self.state.lock();
        check_range(state.len, offset, len)?;

        let mut buf = vec![0u8; len];
        state.file.seek(SeekFrom::Start(offset))?;
        state.file.read_exact(&mut buf)?;
        Ok(buf)
    }

    fn write_at(&self, offset: u64, buf: &[u8]) -> Result<()> {
        let mut state = self.state.lock();
        check_range(state.len, offset, buf.len())?;

        write_range(&mut state.file, offset, buf)?;
        self.sync_after_write(&state.file)?;
        Ok(())
    }

    fn sync(&self) -> Result<()> {
        let state = self.state.lock();
        state.file.sync_all()?;
        Ok(())
    }

    fn truncate(&self, len: u64) -> Result<()> {
        let mut state = self.state.lock();
        if len >= state.len {
            return Ok(());
        }

        state.file.set_len(len)?;
        self.sync_after_write(&state.file)?;
        state.len = len;
        Ok(())
    }
}

fn write_range(file: &mut File, offset: u64, buf: &[u8]) -> std::io::Result<()> {
    file.seek(SeekFrom::Start(offset))?;
    file.write_all(buf)
}
