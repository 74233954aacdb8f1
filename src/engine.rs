//! The torrent arena.
//!
//! Sessions refer to their torrent by info-hash instead of holding a
//! reference; the engine resolves that key. Each torrent runs on its own
//! logical task, so contexts sit behind a mutex and only the map itself
//! is shared between workers.

use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::Mutex;
use tracing::debug;

use crate::torrent::{InfoHash, TorrentContext};

/// Shared handle to one torrent's context.
pub type TorrentHandle = Arc<Mutex<TorrentContext>>;

/// Owns every torrent context, keyed by info-hash.
#[derive(Default)]
pub struct Engine {
    torrents: DashMap<InfoHash, TorrentHandle>,
}

impl Engine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a torrent. Returns the existing handle when the
    /// info-hash is already present.
    pub fn insert(&self, context: TorrentContext) -> TorrentHandle {
        let info_hash = context.info_hash;
        let handle = self
            .torrents
            .entry(info_hash)
            .or_insert_with(|| Arc::new(Mutex::new(context)))
            .value()
            .clone();
        debug!(torrent = %info_hash, "torrent registered");
        handle
    }

    pub fn get(&self, info_hash: &InfoHash) -> Option<TorrentHandle> {
        self.torrents.get(info_hash).map(|entry| entry.value().clone())
    }

    pub fn remove(&self, info_hash: &InfoHash) -> Option<TorrentHandle> {
        self.torrents.remove(info_hash).map(|(_, handle)| handle)
    }

    pub fn len(&self) -> usize {
        self.torrents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.torrents.is_empty()
    }

    /// Runs `f` against the torrent with this info-hash, if registered.
    pub fn with<R>(&self, info_hash: &InfoHash, f: impl FnOnce(&mut TorrentContext) -> R) -> Option<R> {
        let handle = self.get(info_hash)?;
        let mut context = handle.lock();
        Some(f(&mut context))
    }
}
