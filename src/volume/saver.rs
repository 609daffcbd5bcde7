//! Background index saver
//!
//! Used with `IndexSaveStrategy::Interval`. Mutations only set a dirty flag;
//! this thread persists the index on each tick when the flag is set, and
//! once more on shutdown.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam::channel::{bounded, tick, Sender};

use crate::error::Result;
use crate::index::{Index, IndexFile};

/// Handle to the saver thread; dropping it stops the thread
pub(crate) struct IndexSaver {
    shutdown: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl IndexSaver {
    pub(crate) fn spawn<I>(
        index: Arc<I>,
        index_file: Arc<IndexFile>,
        dirty: Arc<AtomicBool>,
        interval: Duration,
    ) -> Result<Self>
    where
        I: Index + ?Sized + 'static,
    {
        let (shutdown_tx, shutdown_rx) = bounded::<()>(0);

        let handle = thread::Builder::new()
            .name("needlestore-index-saver".to_string())
            .spawn(move || {
                let ticker = tick(interval);
                loop {
                    crossbeam::select! {
                        recv(ticker) -> _ => save_if_dirty(&*index, &index_file, &dirty),
                        // Disconnected when the handle is dropped
                        recv(shutdown_rx) -> _ => break,
                    }
                }
                save_if_dirty(&*index, &index_file, &dirty);
                tracing::debug!("Index saver stopped");
            })?;

        tracing::debug!("Index saver started (interval {:?})", interval);

        Ok(Self {
            shutdown: Some(shutdown_tx),
            handle: Some(handle),
        })
    }
}

impl Drop for IndexSaver {
    fn drop(&mut self) {
        drop(self.shutdown.take());
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                tracing::warn!("Index saver thread panicked");
            }
        }
    }
}

/// Persist the index if it changed since the last save
pub(crate) fn save_if_dirty<I: Index + ?Sized>(index: &I, index_file: &IndexFile, dirty: &AtomicBool) {
    if !dirty.swap(false, Ordering::AcqRel) {
        return;
    }

    if let Err(e) = index_file.save(index) {
        dirty.store(true, Ordering::Release);
        tracing::warn!("Background index save failed: {}", e);
    }
}
