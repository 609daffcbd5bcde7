//! Index file persistence
//!
//! Snapshots are written to `<path>.tmp`, fsynced, then renamed over
//! `<path>`, so a crash mid-save leaves the previous snapshot intact.

use std::ffi::OsString;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, ErrorKind};
use std::path::{Path, PathBuf};

use parking_lot::Mutex;

use crate::error::{NeedleError, Result};

use super::Index;

/// On-disk home of an index snapshot
#[derive(Debug)]
pub struct IndexFile {
    path: PathBuf,
    tmp_path: PathBuf,
    /// Serializes saves from the write path and the background saver
    save_lock: Mutex<()>,
}

impl IndexFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let mut tmp: OsString = path.clone().into_os_string();
        tmp.push(".tmp");

        Self {
            path,
            tmp_path: PathBuf::from(tmp),
            save_lock: Mutex::new(()),
        }
    }

    /// Path of the live snapshot
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Persist `index` atomically
    pub fn save<I: Index + ?Sized>(&self, index: &I) -> Result<()> {
        let _guard = self.save_lock.lock();

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let mut writer = BufWriter::new(File::create(&self.tmp_path)?);
        index.persist(&mut writer)?;
        let file = writer
            .into_inner()
            .map_err(|e| NeedleError::Io(e.into_error()))?;
        file.sync_all()?;
        drop(file);

        fs::rename(&self.tmp_path, &self.path)?;
        sync_parent_dir(&self.path);

        tracing::trace!("Saved index ({} entries) to {}", index.len(), self.path.display());
        Ok(())
    }

    /// Load the snapshot into `index`
    ///
    /// Returns `Ok(false)` and leaves `index` empty when no snapshot exists.
    pub fn load<I: Index + ?Sized>(&self, index: &I) -> Result<bool> {
        let file = match File::open(&self.path) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                index.clear();
                return Ok(false);
            }
            Err(e) => return Err(e.into()),
        };

        index.load(&mut BufReader::new(file))?;
        Ok(true)
    }
}

/// Make the rename durable. Not every platform lets a directory be opened
/// and synced; failures are ignored.
fn sync_parent_dir(path: &Path) {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        if let Ok(dir) = File::open(parent) {
            let _ = dir.sync_all();
        }
    }
}
